//! Agent Protocol Layer
//!
//! One TCP connection per request. Every message is a single JSON object
//! terminated by `\n`. Supported actions: `execute_test`, `get_logs`,
//! `subscribe`.

pub mod codec;
pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use error::ProtocolError;
pub use handler::{AgentHandler, Reply};
pub use server::{AgentServer, AgentServerConfig};
