// Command Runner Port
// Abstraction for executing one script line while streaming its output

use crate::domain::LogLine;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Destination for streamed output lines
pub type LogSink = mpsc::UnboundedSender<LogLine>;

/// Explicit result of one executed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub duration_ms: i64,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human readable exit description used in failure messages
    pub fn exit_description(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "termination by signal".to_string(),
        }
    }
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Command Runner trait
///
/// Implementations:
/// - ShellExecutor: runs the line through `sh -c` (infra-system)
/// - mocks::ScriptedCommandRunner: canned outcomes for tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a single shell line to completion.
    ///
    /// Every stdout/stderr line is sent to `sink` as it is read, and also
    /// collected into the returned outcome.
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the process cannot be started
    /// - ExecutionError::IoError if waiting on the process fails
    async fn run(&self, command: &str, sink: &LogSink) -> Result<CommandOutcome, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Canned behavior for one command
    #[derive(Debug, Clone)]
    pub struct ScriptedCommand {
        pub exit_code: Option<i32>,
        pub stdout: Vec<String>,
        pub stderr: Vec<String>,
        pub delay: Duration,
    }

    impl ScriptedCommand {
        pub fn ok(stdout: &[&str]) -> Self {
            Self {
                exit_code: Some(0),
                stdout: stdout.iter().map(|s| s.to_string()).collect(),
                stderr: Vec::new(),
                delay: Duration::ZERO,
            }
        }

        pub fn exit(code: i32) -> Self {
            Self {
                exit_code: Some(code),
                stdout: Vec::new(),
                stderr: Vec::new(),
                delay: Duration::ZERO,
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    /// Mock runner: unknown commands succeed silently
    #[derive(Default)]
    pub struct ScriptedCommandRunner {
        scripted: HashMap<String, ScriptedCommand>,
        spawn_failures: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedCommandRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, command: &str, behavior: ScriptedCommand) -> Self {
            self.scripted.insert(command.to_string(), behavior);
            self
        }

        pub fn failing_spawn(mut self, command: &str) -> Self {
            self.spawn_failures.push(command.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedCommandRunner {
        async fn run(
            &self,
            command: &str,
            sink: &LogSink,
        ) -> Result<CommandOutcome, ExecutionError> {
            self.calls.lock().unwrap().push(command.to_string());

            if self.spawn_failures.iter().any(|c| c == command) {
                return Err(ExecutionError::SpawnFailed(format!(
                    "mock spawn failure for '{}'",
                    command
                )));
            }

            let behavior = self
                .scripted
                .get(command)
                .cloned()
                .unwrap_or_else(|| ScriptedCommand::ok(&[]));

            if !behavior.delay.is_zero() {
                tokio::time::sleep(behavior.delay).await;
            }
            for line in &behavior.stdout {
                let _ = sink.send(LogLine::stdout(line.clone()));
            }
            for line in &behavior.stderr {
                let _ = sink.send(LogLine::stderr(line.clone()));
            }

            Ok(CommandOutcome {
                exit_code: behavior.exit_code,
                duration_ms: behavior.delay.as_millis() as i64,
                stdout_lines: behavior.stdout,
                stderr_lines: behavior.stderr,
            })
        }
    }
}
