//! perfctl - Command-line interface for the Perf Agent

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use perfagent_sdk::{AgentClient, ExecuteTestRequest, JobStatus, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_AGENT_ADDR: &str = "127.0.0.1:9999";

#[derive(Parser)]
#[command(name = "perfctl")]
#[command(about = "Perf Agent CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Agent address (host:port)
    #[arg(long, env = "PERFAGENT_ADDR", default_value = DEFAULT_AGENT_ADDR)]
    addr: String,

    /// Attempts per request
    #[arg(long, default_value = "3")]
    retries: u32,

    /// Per-attempt timeout in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a script for execution
    Submit {
        /// Job ID (also names the result directory)
        job_id: String,

        /// Script text, one command per line
        #[arg(short, long, conflicts_with = "script_file")]
        command: Option<String>,

        /// Read the script from a file
        #[arg(short = 'f', long)]
        script_file: Option<PathBuf>,

        /// Enable profiling with the given tools (cpu_sampler, mem_checker, call_graph)
        #[arg(short, long, num_args = 0.., value_delimiter = ',')]
        profile: Option<Vec<String>>,

        /// Wait for the job to finish and print its log
        #[arg(short, long)]
        wait: bool,
    },

    /// Fetch logs (new lines while running, the full log once finished)
    Logs {
        /// Job ID
        job_id: String,
    },

    /// Wait until a job finishes
    Wait {
        /// Job ID
        job_id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Give up after this many seconds
        #[arg(long)]
        max_wait: Option<u64>,
    },

    /// Stream job status events
    Watch {
        /// Only events for this job
        job_id: Option<String>,
    },

    /// Check that the agent is reachable
    Ping,
}

#[derive(Tabled)]
struct SubmissionRow {
    job_id: String,
    status: String,
    result_dir: String,
    profiling: bool,
    accepted_at: String,
}

fn status_label(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Running => status.as_str().cyan().bold(),
        JobStatus::Success => status.as_str().green().bold(),
        JobStatus::Failed => status.as_str().red().bold(),
        JobStatus::Unknown => status.as_str().yellow().bold(),
    }
}

fn log_line(line: &str) -> ColoredString {
    if line.starts_with("[ERROR]") || line.starts_with("[STDERR]") {
        line.red()
    } else if line.starts_with("[COMMAND]") {
        line.bold()
    } else if line.starts_with("[PROFILE]") {
        line.blue()
    } else {
        line.normal()
    }
}

fn load_script(command: Option<String>, script_file: Option<PathBuf>) -> Result<String> {
    match (command, script_file) {
        (Some(command), _) => Ok(command),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read script {}", path.display())),
        (None, None) => anyhow::bail!("either --command or --script-file is required"),
    }
}

async fn wait_and_print(
    client: &AgentClient,
    job_id: &str,
    interval: Duration,
    max_wait: Option<Duration>,
) -> Result<JobStatus> {
    let done = client
        .wait_for_completion(job_id, interval, max_wait)
        .await
        .with_context(|| format!("Failed while waiting for job {}", job_id))?;

    for line in &done.logs {
        println!("{}", log_line(line));
    }
    println!();
    println!("Job {} finished: {}", done.job_id, status_label(done.status));
    Ok(done.status)
}

fn exit_for(status: JobStatus) {
    if status != JobStatus::Success {
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = AgentClient::new(&cli.addr).with_policy(RetryPolicy {
        max_retries: cli.retries,
        timeout: Duration::from_secs(cli.timeout),
        ..Default::default()
    });

    match cli.command {
        Commands::Submit {
            job_id,
            command,
            script_file,
            profile,
            wait,
        } => {
            let script = load_script(command, script_file)?;
            let mut request = ExecuteTestRequest::new(job_id, script);
            if let Some(tools) = profile {
                request = request.with_profiling(tools);
            }

            let ack = client
                .execute_test(&request)
                .await
                .context("Failed to submit job")?;

            println!("{}", "✓ Job accepted".green().bold());
            println!();
            let row = SubmissionRow {
                job_id: ack.job_id.clone(),
                status: ack.status.to_string(),
                result_dir: ack.result_dir,
                profiling: ack.profiling_enabled,
                accepted_at: ack.timestamp,
            };
            println!("{}", Table::new(vec![row]));

            if wait {
                println!();
                let status =
                    wait_and_print(&client, &ack.job_id, Duration::from_secs(1), None).await?;
                exit_for(status);
            }
        }

        Commands::Logs { job_id } => {
            let logs = client.get_logs(&job_id).await?;
            println!(
                "{}",
                format!("Logs for job {} ({}):", logs.job_id, logs.status)
                    .cyan()
                    .bold()
            );
            if logs.logs.is_empty() {
                println!("{}", "No new lines".yellow());
            }
            for line in &logs.logs {
                println!("{}", log_line(line));
            }
        }

        Commands::Wait {
            job_id,
            interval_ms,
            max_wait,
        } => {
            let status = wait_and_print(
                &client,
                &job_id,
                Duration::from_millis(interval_ms),
                max_wait.map(Duration::from_secs),
            )
            .await?;
            exit_for(status);
        }

        Commands::Watch { job_id } => {
            let mut events = client
                .subscribe(job_id.as_deref())
                .await
                .context("Failed to subscribe")?;
            println!("{}", "Watching job events (Ctrl+C to stop)".cyan().bold());

            while let Some(event) = events.next_event().await? {
                println!(
                    "{} {:<24} {:<8} {}",
                    event.timestamp.dimmed(),
                    event.job_id,
                    status_label(event.status),
                    event.result_dir
                );
            }
            println!("{}", "Agent closed the stream".yellow());
        }

        Commands::Ping => {
            if client.ping().await {
                println!("{}", format!("✓ Agent at {} is reachable", cli.addr).green().bold());
            } else {
                println!("{}", format!("✗ Agent at {} is not reachable", cli.addr).red().bold());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
