// Job log lines

use std::fmt;

/// Origin of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Agent-generated lines (command echo, failures, profiling notes)
    Command,
    Error,
    Profile,
}

impl LogStream {
    pub fn tag(&self) -> &'static str {
        match self {
            LogStream::Stdout => "STDOUT",
            LogStream::Stderr => "STDERR",
            LogStream::Command => "COMMAND",
            LogStream::Error => "ERROR",
            LogStream::Profile => "PROFILE",
        }
    }
}

/// A single line destined for both the log file and the live log channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub stream: LogStream,
    pub text: String,
}

impl LogLine {
    pub fn new(stream: LogStream, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }

    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(LogStream::Stdout, text)
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(LogStream::Stderr, text)
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stream.tag(), self.text)
    }
}
