//! Perf Agent SDK - Rust Client Library
//!
//! Talks to a running agent over its newline-delimited JSON protocol.
//!
//! # Example
//!
//! ```no_run
//! use perfagent_sdk::{AgentClient, ExecuteTestRequest};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AgentClient::new("127.0.0.1:9999");
//!
//!     let request = ExecuteTestRequest::new("bench-42", "cargo bench --no-run\n./target/release/bench")
//!         .with_profiling(["cpu_sampler"]);
//!     let ack = client.execute_test(&request).await?;
//!     println!("Job accepted, results in {}", ack.result_dir);
//!
//!     let done = client
//!         .wait_for_completion(&ack.job_id, Duration::from_secs(1), None)
//!         .await?;
//!     println!("{} finished: {}", done.job_id, done.status);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::{AgentClient, RetryPolicy, Subscription};
pub use error::{Result, SdkError};
pub use types::{
    Completion, ExecuteTestRequest, ExecuteTestResponse, GetLogsResponse, JobStatus,
    ProfilingConfig, StatusEvent,
};
