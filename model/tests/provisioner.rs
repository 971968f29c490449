pub(crate) mod mock;

use lococtl_model::cluster::Error;
use lococtl_model::{ClusterProvisioner, ClusterStatus, DestroyOutcome, Presence, Strategy};
use mock::runner::{Reply, ScriptedRunner};
use std::time::Duration;
use tempfile::TempDir;

const CLUSTER: &str = "loco-test";
const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn primary_timeout_falls_back_after_cleanup() {
    mock::init_logger();
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new().on("kind create cluster", Reply::Timeout);
    let provisioner = ClusterProvisioner::new(&config, runner.clone());

    let handle = provisioner
        .create(CLUSTER, &[Strategy::Primary, Strategy::Fallback], TIMEOUT)
        .await
        .unwrap();
    assert_eq!(handle.chosen_strategy, Strategy::Fallback);

    let kind_create = runner.position("kind create cluster").unwrap();
    let kind_delete = runner.position("kind delete cluster --name loco-test").unwrap();
    let minikube_start = runner.position("minikube start --profile loco-test").unwrap();
    assert!(kind_create < kind_delete);
    assert!(kind_delete < minikube_start);
    assert_eq!(
        std::fs::read_to_string(provisioner.handle_path(CLUSTER))
            .unwrap()
            .trim(),
        "fallback"
    );
}

#[tokio::test]
async fn strategies_run_in_the_given_order() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new().on("minikube start", Reply::fail(80, "driver failed"));
    let provisioner = ClusterProvisioner::new(&config, runner.clone());

    let handle = provisioner
        .create(CLUSTER, &[Strategy::Fallback, Strategy::Primary], TIMEOUT)
        .await
        .unwrap();
    assert_eq!(handle.chosen_strategy, Strategy::Primary);

    let creates: Vec<String> = runner
        .calls()
        .into_iter()
        .filter(|call| call.contains("create cluster") || call.contains("start --profile"))
        .collect();
    assert_eq!(creates.len(), 2);
    assert!(creates[0].starts_with("minikube"));
    assert!(creates[1].starts_with("kind"));
    assert!(runner.position("minikube delete").unwrap() < runner.position("kind create").unwrap());
}

#[tokio::test]
async fn success_stops_at_the_first_strategy() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new();
    let provisioner = ClusterProvisioner::new(&config, runner.clone());

    let handle = provisioner.create_default().await.unwrap();
    assert_eq!(handle.chosen_strategy, Strategy::Primary);
    assert_eq!(runner.count("minikube"), 0);
    assert_eq!(runner.count("delete"), 0);
}

#[tokio::test]
async fn exhaustion_writes_diagnostics() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new()
        .on("kind create", Reply::fail(1, "node image pull failed"))
        .on("minikube start", Reply::Timeout)
        .on("docker info", Reply::fail(1, "Cannot connect to the Docker daemon"));
    let provisioner = ClusterProvisioner::new(&config, runner.clone());

    let error = provisioner
        .create(CLUSTER, &[Strategy::Primary, Strategy::Fallback], TIMEOUT)
        .await
        .unwrap_err();
    match &error {
        Error::ProvisioningExhausted {
            attempted,
            last_errors,
            ..
        } => {
            assert_eq!(attempted, &vec![Strategy::Primary, Strategy::Fallback]);
            assert!(last_errors[0].contains("node image pull failed"));
            assert!(last_errors[1].contains("did not finish"));
        }
        other => panic!("unexpected error: {}", other),
    }

    let report = error.diagnostics_path().unwrap();
    let text = std::fs::read_to_string(report).unwrap();
    assert!(!text.is_empty());
    assert!(text.contains("== docker info =="));
    assert!(text.contains("<unavailable>"));
    assert!(text.contains("== kind version =="));
    assert!(!provisioner.handle_path(CLUSTER).exists());
}

#[tokio::test]
async fn repeated_strategies_are_tried_once() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new().on("kind create", Reply::fail(1, "boom"));
    let provisioner = ClusterProvisioner::new(&config, runner.clone());

    let error = provisioner
        .create(CLUSTER, &[Strategy::Primary, Strategy::Primary], TIMEOUT)
        .await
        .unwrap_err();
    match error {
        Error::ProvisioningExhausted { attempted, .. } => {
            assert_eq!(attempted, vec![Strategy::Primary])
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(runner.count("kind create"), 1);
}

#[tokio::test]
async fn existing_cluster_is_reused() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new().on("kind get clusters", Reply::ok("other\nloco-test\n"));
    let provisioner = ClusterProvisioner::new(&config, runner.clone());

    provisioner.create_default().await.unwrap();
    let handle = provisioner.create_default().await.unwrap();
    assert_eq!(handle.chosen_strategy, Strategy::Primary);
    assert_eq!(runner.count("kind create"), 1);
}

#[tokio::test]
async fn stale_record_is_replaced() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new();
    let provisioner = ClusterProvisioner::new(&config, runner.clone());

    // `kind get clusters` prints nothing, so the recorded cluster is gone.
    provisioner.create_default().await.unwrap();
    provisioner.create_default().await.unwrap();
    assert_eq!(runner.count("kind create"), 2);
    assert!(provisioner.handle_path(CLUSTER).exists());
}

#[tokio::test]
async fn destroy_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new();
    let provisioner = ClusterProvisioner::new(&config, runner.clone());
    provisioner.create_default().await.unwrap();

    let first = provisioner.destroy(CLUSTER).await;
    assert_eq!(
        first,
        DestroyOutcome::Recorded {
            strategy: Strategy::Primary,
            clean: true
        }
    );
    assert!(!provisioner.handle_path(CLUSTER).exists());

    let second = provisioner.destroy(CLUSTER).await;
    assert_eq!(
        second,
        DestroyOutcome::Unrecorded {
            attempted: Strategy::ALL.to_vec(),
            succeeded: Strategy::ALL.to_vec(),
        }
    );
    assert!(!provisioner.handle_path(CLUSTER).exists());
    assert_eq!(runner.count("docker image prune -f"), 2);
}

#[tokio::test]
async fn unreadable_record_is_removed_by_destroy() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new();
    let provisioner = ClusterProvisioner::new(&config, runner.clone());
    let record = provisioner.handle_path(CLUSTER);
    std::fs::create_dir_all(record.parent().unwrap()).unwrap();
    std::fs::write(&record, "sideways\n").unwrap();

    let outcome = provisioner.destroy(CLUSTER).await;
    assert!(matches!(outcome, DestroyOutcome::Unrecorded { .. }));
    assert!(!record.exists());
    assert_eq!(runner.count("kind delete"), 1);
    assert_eq!(runner.count("minikube delete"), 1);
}

#[tokio::test]
async fn failed_destroy_still_forgets_the_cluster() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new()
        .on("kind delete", Reply::Timeout)
        .on("docker image prune", Reply::fail(1, "permission denied"));
    let provisioner = ClusterProvisioner::new(&config, runner.clone());
    provisioner.create_default().await.unwrap();

    let outcome = provisioner.destroy(CLUSTER).await;
    assert_eq!(
        outcome,
        DestroyOutcome::Recorded {
            strategy: Strategy::Primary,
            clean: false
        }
    );
    assert!(!provisioner.handle_path(CLUSTER).exists());
    // Only the recorded strategy is used.
    assert_eq!(runner.count("minikube delete"), 0);
}

#[tokio::test]
async fn status_prefers_the_record() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());
    let runner = ScriptedRunner::new()
        .on("minikube start", Reply::ok(""))
        .on("kind create", Reply::fail(1, "boom"))
        .on("minikube status", Reply::ok("Stopped\n"))
        .on("kind get clusters", Reply::ok("loco-test\n"));
    let provisioner = ClusterProvisioner::new(&config, runner);
    provisioner.create_default().await.unwrap();

    assert_eq!(
        provisioner.status(CLUSTER).await,
        ClusterStatus::Recorded {
            strategy: Strategy::Fallback,
            presence: Presence::Present { running: false },
        }
    );
}

#[tokio::test]
async fn status_reports_the_first_match_without_a_record() {
    let dir = TempDir::new().unwrap();
    let config = mock::config(dir.path());

    let both = ScriptedRunner::new()
        .on("kind get clusters", Reply::ok("loco-test\n"))
        .on("minikube status", Reply::ok("Running\n"));
    assert_eq!(
        ClusterProvisioner::new(&config, both).status(CLUSTER).await,
        ClusterStatus::Discovered {
            strategy: Strategy::Primary,
            presence: Presence::Present { running: true },
        }
    );

    let fallback_only = ScriptedRunner::new()
        .on("kind get clusters", Reply::ok("other\n"))
        .on("minikube status", Reply::ok("Running\n"));
    assert_eq!(
        ClusterProvisioner::new(&config, fallback_only)
            .status(CLUSTER)
            .await,
        ClusterStatus::Discovered {
            strategy: Strategy::Fallback,
            presence: Presence::Present { running: true },
        }
    );

    let none = ScriptedRunner::new().on(
        "minikube status",
        Reply::fail(85, "Profile \"loco-test\" not found"),
    );
    let status = ClusterProvisioner::new(&config, none).status(CLUSTER).await;
    assert_eq!(status, ClusterStatus::NotFound);
    assert_eq!(status.to_string(), "none found");
}
