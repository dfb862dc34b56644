//! Single-service pipeline tests against fake hosts, scheduler and probes

mod common;

use std::sync::Arc;

use common::*;
use fleet_deploy::deploy::attempt::Stage;
use fleet_deploy::errors::DeployError;
use fleet_deploy::fleet::services::ServiceRegistry;

const GATEWAY_HOST: &str = "gateway.fleet.internal";
const GATEWAY_URL: &str = "http://gateway.fleet.internal:8080";
const GATEWAY_BIN: &str = "/usr/local/bin/gateway";

#[tokio::test(start_paused = true)]
async fn test_native_deploy_installs_and_verifies() {
    let journal = Journal::default();
    let host = Arc::new(
        FakeHost::new(journal.clone()).with_file(GATEWAY_HOST, GATEWAY_BIN, b"gateway-v1"),
    );
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        host.clone(),
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let attempt = fleet.deploy_one("gateway").await.unwrap();
    assert_eq!(attempt.stage(), Stage::Deployed);
    assert_eq!(attempt.expected_commit(), COMMIT);
    assert!(attempt.backup_taken());

    assert_eq!(host.file(GATEWAY_HOST, GATEWAY_BIN), Some(artifact_bytes("gateway")));
    assert_eq!(
        host.file(GATEWAY_HOST, "/usr/local/bin/gateway.prev"),
        Some(b"gateway-v1".to_vec())
    );
    assert_eq!(host.file(GATEWAY_HOST, "/usr/local/bin/gateway.new"), None);

    let order: Vec<String> = journal
        .entries()
        .into_iter()
        .filter(|e| !e.starts_with("health") && !e.starts_with("version"))
        .collect();
    assert_eq!(
        order,
        vec![
            "build gateway",
            "backup gateway.fleet.internal",
            "upload gateway.fleet.internal",
            "install gateway.fleet.internal",
            "restart gateway.service",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_deploy_submits_job_and_never_restarts() {
    let journal = Journal::default();
    let host = Arc::new(FakeHost::new(journal.clone()));
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        host,
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let attempt = fleet.deploy_one("worker").await.unwrap();
    assert_eq!(attempt.stage(), Stage::Deployed);
    // First deploy onto a fresh host
    assert!(!attempt.backup_taken());

    assert_eq!(journal.count_prefix("submit"), 1);
    assert!(journal
        .entries()
        .iter()
        .any(|e| e.ends_with("deploy/jobs/worker.nomad.hcl")));
    assert_eq!(journal.count_prefix("restart"), 0);
    assert_eq!(journal.count_prefix("health"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_native_deploy_never_touches_scheduler() {
    let journal = Journal::default();
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        Arc::new(FakeHost::new(journal.clone())),
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    fleet.deploy_one("ai-coordinator").await.unwrap();

    assert_eq!(journal.count_prefix("submit"), 0);
    assert_eq!(journal.count_prefix("job-status"), 0);
    assert_eq!(journal.count_prefix("restart com.fleet.ai-coordinator"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_native_timeout_restores_previous_binary() {
    let journal = Journal::default();
    let host = Arc::new(
        FakeHost::new(journal.clone()).with_file(GATEWAY_HOST, GATEWAY_BIN, b"gateway-v1"),
    );
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        host.clone(),
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()).down(GATEWAY_URL),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let err = fleet.deploy_one("gateway").await.unwrap_err();
    match &err {
        DeployError::RolledBack { service, cause } => {
            assert_eq!(service, "gateway");
            assert!(matches!(**cause, DeployError::VerificationTimeout { .. }));
        }
        other => panic!("expected a rollback, got {other:?}"),
    }
    assert!(err.is_timeout());

    // Live path is byte-for-byte the pre-deploy binary
    assert_eq!(host.file(GATEWAY_HOST, GATEWAY_BIN), Some(b"gateway-v1".to_vec()));
    assert_eq!(host.file(GATEWAY_HOST, "/usr/local/bin/gateway.prev"), None);

    let entries = journal.entries();
    let restore = entries.iter().position(|e| e.starts_with("restore")).unwrap();
    let last_restart = entries.iter().rposition(|e| e.starts_with("restart")).unwrap();
    assert!(restore < last_restart);
    assert_eq!(journal.count_prefix("restart gateway.service"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_commit_mismatch_rolls_back() {
    let journal = Journal::default();
    let host = Arc::new(
        FakeHost::new(journal.clone()).with_file(GATEWAY_HOST, GATEWAY_BIN, b"gateway-v1"),
    );
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        host.clone(),
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()).serving(GATEWAY_URL, OLD_COMMIT),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let err = fleet.deploy_one("gateway").await.unwrap_err();
    match err {
        DeployError::RolledBack { cause, .. } => match *cause {
            DeployError::CommitMismatch { expected, actual, .. } => {
                assert_eq!(expected, COMMIT);
                assert_eq!(actual, OLD_COMMIT);
            }
            other => panic!("expected a commit mismatch, got {other:?}"),
        },
        other => panic!("expected a rollback, got {other:?}"),
    }
    assert_eq!(host.file(GATEWAY_HOST, GATEWAY_BIN), Some(b"gateway-v1".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_rollback_reports_both_errors() {
    let journal = Journal::default();
    let host = Arc::new(
        FakeHost::new(journal.clone())
            .with_file(GATEWAY_HOST, GATEWAY_BIN, b"gateway-v1")
            .failing_restore(),
    );
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        host,
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()).down(GATEWAY_URL),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let err = fleet.deploy_one("gateway").await.unwrap_err();
    assert!(matches!(err, DeployError::RollbackFailed { .. }));

    let message = err.to_string();
    assert!(message.contains("failed AND rollback failed"));
    assert!(message.contains("timed out after 30s"));
    assert!(message.contains("Permission denied"));
}

#[tokio::test(start_paused = true)]
async fn test_first_deploy_failure_has_nothing_to_restore() {
    let journal = Journal::default();
    let host = Arc::new(FakeHost::new(journal.clone()));
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        host,
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()).down(GATEWAY_URL),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let err = fleet.deploy_one("gateway").await.unwrap_err();
    assert!(matches!(err, DeployError::RollbackFailed { .. }));
    assert_eq!(journal.count_prefix("restore"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_timeout_is_not_rolled_back() {
    let journal = Journal::default();
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        Arc::new(FakeHost::new(journal.clone())),
        FakeScheduler::new(journal.clone()).with_status("worker", "pending"),
        FakeProbe::new(journal.clone()),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let err = fleet.deploy_one("worker").await.unwrap_err();
    match &err {
        DeployError::VerificationTimeout { service, bound } => {
            assert_eq!(service, "worker");
            assert_eq!(bound.as_secs(), 60);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert!(journal.count_prefix("job-status") > 1);
    assert_eq!(journal.count_prefix("restore"), 0);
    assert_eq!(journal.count_prefix("restart"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_build_failure_aborts_before_transfer() {
    let journal = Journal::default();
    let caps = capabilities(
        FakeBuilder::new(journal.clone()).failing_for("gateway"),
        Arc::new(FakeHost::new(journal.clone())),
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let err = fleet.deploy_one("gateway").await.unwrap_err();
    match &err {
        DeployError::Stage { stage, source, .. } => {
            assert_eq!(*stage, Stage::Building);
            assert!(matches!(**source, DeployError::BuildError { .. }));
        }
        other => panic!("expected a build stage failure, got {other:?}"),
    }
    assert!(err.to_string().contains("undefined: frobnicate"));
    assert_eq!(journal.entries(), vec!["build gateway"]);
}

#[tokio::test]
async fn test_unknown_service_is_rejected_before_any_work() {
    let journal = Journal::default();
    let caps = capabilities(
        FakeBuilder::new(journal.clone()),
        Arc::new(FakeHost::new(journal.clone())),
        FakeScheduler::new(journal.clone()),
        FakeProbe::new(journal.clone()),
    );
    let fleet = orchestrator(ServiceRegistry::builtin(), caps);

    let err = fleet.deploy_one("billing").await.unwrap_err();
    assert!(matches!(err, DeployError::UnknownService { .. }));
    assert!(journal.entries().is_empty());
}
