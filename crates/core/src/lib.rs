// Perf Agent Core - Domain Logic, Ports & Job Orchestration
// NO infrastructure dependencies: adapters are injected through the ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
