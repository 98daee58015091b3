// Child process environment shared by the executor and the profilers
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Default variables passed through to child processes
pub const DEFAULT_ENV_ALLOWLIST: [&str; 5] = ["PATH", "HOME", "USER", "LANG", "TMPDIR"];

/// Environment and working directory every spawned process gets.
///
/// The agent environment is cleared and only allowlisted variables are
/// forwarded.
#[derive(Debug, Clone)]
pub struct ProcessEnv {
    env_allowlist: Vec<String>,
    working_dir: PathBuf,
}

impl ProcessEnv {
    pub fn new(env_allowlist: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            env_allowlist,
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn allowed_vars(&self) -> Vec<(String, String)> {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .filter(|(k, _)| self.env_allowlist.iter().any(|allowed| allowed == k))
            .collect()
    }

    /// Command for `program` with the filtered environment, stdin closed and
    /// both output streams piped
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(program);
        cmd.env_clear()
            .envs(self.allowed_vars())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// `sh -c <line>`
    pub fn shell(&self, line: &str) -> Command {
        let mut cmd = self.command("sh");
        cmd.arg("-c").arg(line);
        cmd
    }
}

impl Default for ProcessEnv {
    fn default() -> Self {
        Self::new(
            DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            ".",
        )
    }
}

/// Quote a value for safe interpolation into a `sh -c` pipeline
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("a b;rm -rf /"), "'a b;rm -rf /'");
    }

    #[tokio::test]
    async fn test_quoted_value_survives_the_shell() {
        let env = ProcessEnv::default();
        let tricky = "it's $HOME `x` \"y\"";
        let output = env
            .shell(&format!("printf '%s' {}", shell_quote(tricky)))
            .output()
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), tricky);
    }
}
