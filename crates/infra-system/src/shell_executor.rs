// Shell executor implementation
// reason: tokio::process for async child management, one reader task per stream
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use perfagent_core::domain::{LogLine, LogStream};
use perfagent_core::port::command_runner::{CommandOutcome, CommandRunner, ExecutionError, LogSink};
use perfagent_core::port::TimeProvider;

use crate::process::ProcessEnv;

/// Runs one script line through `sh -c`, streaming stdout and stderr
/// concurrently into the job log.
pub struct ShellExecutor {
    time_provider: Arc<dyn TimeProvider>,
    env: ProcessEnv,
}

impl ShellExecutor {
    /// Create a new shell executor
    ///
    /// # Arguments
    /// * `time_provider` - Time provider for duration tracking
    /// * `env` - Allowlisted environment and working directory
    ///
    /// # Example
    /// ```ignore
    /// let executor = ShellExecutor::new(Arc::new(SystemTimeProvider), ProcessEnv::default());
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>, env: ProcessEnv) -> Self {
        Self { time_provider, env }
    }
}

/// Read `reader` line by line (lossy UTF-8), forwarding each line to the sink
fn spawn_reader<R>(reader: R, stream: LogStream, sink: LogSink) -> JoinHandle<std::io::Result<Vec<String>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut lines = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&buf)
                .trim_end_matches(&['\r', '\n'][..])
                .to_string();
            let _ = sink.send(LogLine::new(stream, text.clone()));
            lines.push(text);
        }
        Ok(lines)
    })
}

async fn join_reader(
    handle: JoinHandle<std::io::Result<Vec<String>>>,
) -> Result<Vec<String>, ExecutionError> {
    match handle.await {
        Ok(Ok(lines)) => Ok(lines),
        Ok(Err(e)) => Err(ExecutionError::IoError(e.to_string())),
        Err(e) => Err(ExecutionError::IoError(format!("reader task failed: {}", e))),
    }
}

#[async_trait]
impl CommandRunner for ShellExecutor {
    async fn run(&self, command: &str, sink: &LogSink) -> Result<CommandOutcome, ExecutionError> {
        let start = self.time_provider.now_millis();
        debug!(command = %command, working_dir = %self.env.working_dir().display(), "Spawning shell command");

        let mut child = self
            .env
            .shell(command)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::IoError("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::IoError("stderr was not captured".to_string()))?;

        let stdout_task = spawn_reader(stdout, LogStream::Stdout, sink.clone());
        let stderr_task = spawn_reader(stderr, LogStream::Stderr, sink.clone());

        let status = child
            .wait()
            .await
            .map_err(|e| ExecutionError::IoError(e.to_string()))?;

        let stdout_lines = join_reader(stdout_task).await?;
        let stderr_lines = join_reader(stderr_task).await?;
        let duration_ms = self.time_provider.now_millis() - start;

        info!(
            command = %command,
            duration_ms = %duration_ms,
            exit_code = ?status.code(),
            stdout_lines = stdout_lines.len(),
            stderr_lines = stderr_lines.len(),
            "Shell command completed"
        );

        Ok(CommandOutcome {
            exit_code: status.code(),
            duration_ms,
            stdout_lines,
            stderr_lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfagent_core::port::time_provider::SystemTimeProvider;
    use tokio::sync::mpsc;

    fn executor(env: ProcessEnv) -> ShellExecutor {
        ShellExecutor::new(Arc::new(SystemTimeProvider), env)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<LogLine>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line.to_string());
        }
        lines
    }

    #[tokio::test]
    async fn test_streams_both_outputs() {
        let (sink, mut rx) = mpsc::unbounded_channel();
        let outcome = executor(ProcessEnv::default())
            .run("echo hello; echo oops 1>&2; echo bye", &sink)
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout_lines, vec!["hello", "bye"]);
        assert_eq!(outcome.stderr_lines, vec!["oops"]);

        let mut streamed = drain(&mut rx);
        streamed.sort();
        assert_eq!(streamed, vec!["[STDERR] oops", "[STDOUT] bye", "[STDOUT] hello"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_outcome() {
        let (sink, _rx) = mpsc::unbounded_channel();
        let outcome = executor(ProcessEnv::default())
            .run("exit 3", &sink)
            .await
            .unwrap();

        assert!(!outcome.succeeded());
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.exit_description(), "exit code 3");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let (sink, _rx) = mpsc::unbounded_channel();
        let outcome = executor(ProcessEnv::default())
            .run(r"printf 'a\377b\n'", &sink)
            .await
            .unwrap();
        assert_eq!(outcome.stdout_lines, vec!["a\u{FFFD}b"]);
    }

    #[tokio::test]
    async fn test_environment_is_allowlisted() {
        std::env::set_var("PERFAGENT_TEST_SECRET", "leaked");
        let (sink, _rx) = mpsc::unbounded_channel();
        let env = ProcessEnv::new(vec!["PATH".to_string()], ".");
        let outcome = executor(env)
            .run("echo ${PERFAGENT_TEST_SECRET:-hidden}", &sink)
            .await
            .unwrap();
        assert_eq!(outcome.stdout_lines, vec!["hidden"]);
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), b"here").unwrap();
        let (sink, _rx) = mpsc::unbounded_channel();

        let outcome = executor(ProcessEnv::new(vec!["PATH".to_string()], tmp.path()))
            .run("cat marker.txt", &sink)
            .await
            .unwrap();
        assert_eq!(outcome.stdout_lines, vec!["here"]);
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_spawn_failure() {
        let (sink, _rx) = mpsc::unbounded_channel();
        let env = ProcessEnv::new(vec!["PATH".to_string()], "/definitely/not/here");
        let result = executor(env).run("true", &sink).await;
        assert!(matches!(result, Err(ExecutionError::SpawnFailed(_))));
    }
}
