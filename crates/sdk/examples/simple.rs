//! Simple SDK Example
//!
//! Submits a small profiled script and streams its logs.
//!
//! # Usage
//!
//! 1. Start the agent:
//!    ```bash
//!    cargo run --package perfagent-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --package perfagent-sdk --example simple
//!    ```

use perfagent_sdk::{AgentClient, ExecuteTestRequest};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Perf Agent SDK - Simple Example");
    println!("===============================\n");

    let client = AgentClient::new("127.0.0.1:9999");

    // 1. Check the agent is up
    println!("1. Connecting to agent...");
    if !client.ping().await {
        return Err(format!("agent at {} is not reachable", client.addr()).into());
    }
    println!("   ✓ Connected\n");

    // 2. Submit a job
    println!("2. Submitting a job...");
    let request = ExecuteTestRequest::new(
        "simple-example",
        "echo warming up\nsleep 1\necho done",
    )
    .with_profiling(["cpu_sampler"]);
    let ack = client.execute_test(&request).await?;
    println!("   ✓ Job accepted: {}", ack.job_id);
    println!("   Results: {}\n", ack.result_dir);

    // 3. Stream logs until the job finishes
    println!("3. Streaming logs...");
    loop {
        let logs = client.get_logs(&ack.job_id).await?;
        if logs.status.is_terminal() {
            println!("\n   Job finished: {}", logs.status);
            println!("   Full log has {} lines", logs.logs.len());
            break;
        }
        for line in &logs.logs {
            println!("   {}", line);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Ok(())
}
