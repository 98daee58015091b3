//! End-to-end: SDK -> TCP -> agent -> sh, with real result directories

mod common;

use common::TestAgent;
use perfagent_sdk::{ExecuteTestRequest, JobStatus, SdkError};
use std::path::PathBuf;
use std::time::Duration;

#[tokio::test]
async fn test_script_runs_to_success() {
    let agent = TestAgent::start().await;

    let ack = agent
        .client
        .execute_test(&ExecuteTestRequest::new("e2e-ok", "echo hello\n\necho oops 1>&2"))
        .await
        .unwrap();
    assert_eq!(ack.status, JobStatus::Running);
    assert!(!ack.profiling_enabled);

    let done = agent.wait("e2e-ok").await;
    assert_eq!(done.status, JobStatus::Success);
    assert_eq!(
        done.logs,
        vec![
            "[COMMAND] echo hello",
            "[STDOUT] hello",
            "[COMMAND] echo oops 1>&2",
            "[STDERR] oops",
        ]
    );

    let dir = PathBuf::from(&ack.result_dir);
    assert!(dir.starts_with(agent.results_root()));
    assert!(dir.file_name().unwrap().to_str().unwrap().ends_with("_e2e-ok"));

    let status = std::fs::read_to_string(dir.join("status.txt")).unwrap();
    assert!(status.contains("echo hello\necho oops 1>&2"));
    assert!(status.trim_end().ends_with("status: success"));

    let log = std::fs::read_to_string(dir.join("output.log")).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), done.logs);

    let metrics: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("performance.json")).unwrap())
            .unwrap();
    assert!(metrics.is_array());
    assert!(!dir.join("profile").exists());
}

#[tokio::test]
async fn test_first_failure_halts_script() {
    let agent = TestAgent::start().await;

    agent
        .client
        .execute_test(&ExecuteTestRequest::new(
            "e2e-fail",
            "echo before\nexit 3\necho never",
        ))
        .await
        .unwrap();

    let done = agent.wait("e2e-fail").await;
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(
        done.logs.last().map(String::as_str),
        Some("[ERROR] Command 'exit 3' failed with exit code 3")
    );
    assert!(!done.logs.iter().any(|line| line.contains("never")));
}

#[tokio::test]
async fn test_live_lines_are_delivered_once_in_order() {
    let agent = TestAgent::start().await;

    agent
        .client
        .execute_test(&ExecuteTestRequest::new(
            "e2e-live",
            "echo one\nsleep 0.3\necho two\nsleep 0.3\necho three",
        ))
        .await
        .unwrap();

    let mut drained = Vec::new();
    let full = loop {
        let logs = agent.client.get_logs("e2e-live").await.unwrap();
        if logs.status.is_terminal() {
            break logs;
        }
        drained.extend(logs.logs);
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(full.status, JobStatus::Success);
    assert_eq!(full.logs.len(), 8);
    // everything drained while running is a prefix of the persisted log
    assert_eq!(drained[..], full.logs[..drained.len()]);
}

#[tokio::test]
async fn test_logs_remain_readable_after_eviction() {
    let agent = TestAgent::start().await;

    agent
        .client
        .execute_test(&ExecuteTestRequest::new("e2e-evict", "echo kept"))
        .await
        .unwrap();
    let done = agent.wait("e2e-evict").await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(agent.evict_finished(), 1);
    assert!(agent.service.registry().is_empty());

    let logs = agent.client.get_logs("e2e-evict").await.unwrap();
    assert_eq!(logs.status, JobStatus::Success);
    assert_eq!(logs.logs, done.logs);
}

#[tokio::test]
async fn test_duplicate_running_job_is_rejected() {
    let agent = TestAgent::start().await;
    let request = ExecuteTestRequest::new("e2e-dup", "sleep 1");

    agent.client.execute_test(&request).await.unwrap();
    let err = agent.client.execute_test(&request).await.unwrap_err();
    assert_eq!(err.remote_code(), Some("conflict"));

    // a finished job id can be reused
    agent.wait("e2e-dup").await;
    agent.client.execute_test(&request).await.unwrap();
}

#[tokio::test]
async fn test_request_errors() {
    let agent = TestAgent::start().await;

    let err = agent.client.get_logs("never-submitted").await.unwrap_err();
    assert_eq!(err.remote_code(), Some("not_found"));

    let err = agent
        .client
        .execute_test(&ExecuteTestRequest::new("../escape", "true"))
        .await
        .unwrap_err();
    assert_eq!(err.remote_code(), Some("validation_error"));

    let err = agent
        .client
        .submit(&serde_json::json!({"action": "cancel", "job_id": "x"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::Remote { ref code, .. } if code == "unknown_action"));
}

#[tokio::test]
async fn test_subscription_reports_status_changes() {
    let agent = TestAgent::start().await;

    let mut events = agent.client.subscribe(Some("e2e-sub")).await.unwrap();
    agent
        .client
        .execute_test(&ExecuteTestRequest::new("e2e-other", "true"))
        .await
        .unwrap();
    agent
        .client
        .execute_test(&ExecuteTestRequest::new("e2e-sub", "exit 1"))
        .await
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(Duration::from_secs(10), events.next_event())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.job_id, "e2e-sub");
        seen.push(event.status);
    }
    assert_eq!(seen, vec![JobStatus::Running, JobStatus::Failed]);
}

#[tokio::test]
async fn test_ping() {
    let agent = TestAgent::start().await;
    assert!(agent.client.ping().await);
}
