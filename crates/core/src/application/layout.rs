// Result directory layout
//
// results/<YYYYMMDD_HHMMSS>_<job_id>/
//   status.txt  output.log  performance.json
//   profile/<idx>_<artifact>  profile/profiling_results.json

use crate::application::constants::{RESULT_DIR_TIMESTAMP_FORMAT, RESULT_DIR_TIMESTAMP_LEN};
use crate::domain::{JobRequest, JobStatus, ObservedStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const STATUS_FILE: &str = "status.txt";
pub const LOG_FILE: &str = "output.log";
pub const METRICS_FILE: &str = "performance.json";
pub const PROFILE_DIR: &str = "profile";
pub const MANIFEST_FILE: &str = "profiling_results.json";

const STATUS_KEY: &str = "status: ";

/// Paths of one job's result directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    root: PathBuf,
}

impl JobLayout {
    /// `<timestamp>_<job_id>`
    pub fn dir_name(job_id: &str, start: DateTime<Utc>) -> String {
        format!("{}_{}", start.format(RESULT_DIR_TIMESTAMP_FORMAT), job_id)
    }

    /// Create the result directory for a new job
    pub async fn create(results_root: &Path, job_id: &str, start: DateTime<Utc>) -> io::Result<Self> {
        let root = results_root.join(Self::dir_name(job_id, start));
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Wrap an existing directory
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Most recent result directory of a job (greatest timestamp prefix)
    pub async fn find_latest(results_root: &Path, job_id: &str) -> io::Result<Option<Self>> {
        let mut entries = match tokio::fs::read_dir(results_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let suffix = format!("_{}", job_id);
        let expected_len = RESULT_DIR_TIMESTAMP_LEN + suffix.len();
        let mut latest: Option<String> = None;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            // exact length check keeps job "b" from matching "<ts>_a_b"
            if name.len() != expected_len || !name.ends_with(&suffix) {
                continue;
            }
            if latest.as_ref().map_or(true, |current| name > *current) {
                latest = Some(name);
            }
        }

        Ok(latest.map(|name| Self::open(results_root.join(name))))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn status_file(&self) -> PathBuf {
        self.root.join(STATUS_FILE)
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn metrics_file(&self) -> PathBuf {
        self.root.join(METRICS_FILE)
    }

    pub fn profile_dir(&self) -> PathBuf {
        self.root.join(PROFILE_DIR)
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.profile_dir().join(MANIFEST_FILE)
    }

    /// Status header: job id, start time, profiling settings and the script
    pub async fn write_status_header(&self, request: &JobRequest, start: DateTime<Utc>) -> io::Result<()> {
        let tools: Vec<&str> = request.profiling_tools.iter().map(|t| t.as_str()).collect();
        let header = format!(
            "job_id: {}\nstart_time: {}\nprofiling_enabled: {}\nprofiling_tools: {}\nscript:\n{}\n---\n",
            request.job_id,
            start.to_rfc3339(),
            request.profiling_enabled,
            tools.join(","),
            request.script_text(),
        );
        tokio::fs::write(self.status_file(), header).await
    }

    /// Terminal footer, optionally preceded by the failure reason
    pub async fn append_status_footer(
        &self,
        status: JobStatus,
        end: DateTime<Utc>,
        error: Option<&str>,
    ) -> io::Result<()> {
        let mut footer = String::new();
        if let Some(error) = error {
            footer.push_str(&format!("error: {}\n", error));
        }
        footer.push_str(&format!("end_time: {}\n{}{}\n", end.to_rfc3339(), STATUS_KEY, status));
        append(&self.status_file(), footer.as_bytes()).await
    }

    /// Status recorded in the status file, `Unknown` when none was written
    pub async fn read_status(&self) -> ObservedStatus {
        let Ok(content) = tokio::fs::read_to_string(self.status_file()).await else {
            return ObservedStatus::Unknown;
        };
        content
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(STATUS_KEY))
            .and_then(|value| value.parse().ok())
            .unwrap_or(ObservedStatus::Unknown)
    }

    /// Full persisted log, one entry per line; empty when nothing was written
    pub async fn read_log_lines(&self) -> io::Result<Vec<String>> {
        match tokio::fs::read_to_string(self.log_file()).await {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

async fn append(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await
}

/// Overwrite `path` with pretty JSON via a temp file + rename, so readers
/// never observe a partially written document.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_dir_name_format() {
        let start = Utc.with_ymd_and_hms(2025, 1, 23, 10, 50, 3).single().unwrap();
        assert_eq!(JobLayout::dir_name("11", start), "20250123_105003_11");
    }

    #[tokio::test]
    async fn test_find_latest_picks_greatest_timestamp_for_exact_id() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        JobLayout::create(root, "7", at(1_000)).await.unwrap();
        let newest = JobLayout::create(root, "7", at(90_000)).await.unwrap();
        JobLayout::create(root, "17", at(200_000)).await.unwrap();
        JobLayout::create(root, "x_7", at(300_000)).await.unwrap();
        // newer name, but a plain file
        std::fs::write(root.join("19700106_185320_7"), b"not a dir").unwrap();

        let found = JobLayout::find_latest(root, "7").await.unwrap().unwrap();
        assert_eq!(found, newest);

        assert!(JobLayout::find_latest(root, "8").await.unwrap().is_none());
        assert!(JobLayout::find_latest(&root.join("missing"), "7")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_status_file_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = JobLayout::create(tmp.path(), "9", at(0)).await.unwrap();
        let request = JobRequest::new("9", "echo hi\nexit 3", false, []).unwrap();

        layout.write_status_header(&request, at(0)).await.unwrap();
        assert_eq!(layout.read_status().await, ObservedStatus::Unknown);

        layout
            .append_status_footer(JobStatus::Failed, at(5), Some("Command 'exit 3' failed"))
            .await
            .unwrap();
        assert_eq!(layout.read_status().await, ObservedStatus::Failed);

        let content = std::fs::read_to_string(layout.status_file()).unwrap();
        assert!(content.contains("script:\necho hi\nexit 3\n"));
        assert!(content.contains("error: Command 'exit 3' failed"));
    }

    #[tokio::test]
    async fn test_write_json_atomic_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(METRICS_FILE);

        write_json_atomic(&path, &vec![1, 2]).await.unwrap();
        write_json_atomic(&path, &vec![1, 2, 3]).await.unwrap();

        let parsed: Vec<i32> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
