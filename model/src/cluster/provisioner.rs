use super::error::{self, Result};
use super::{
    ClusterHandle, ClusterTooling, DiagnosticsCollector, Presence, Strategy, StrategyAttempt,
};
use crate::command::CommandRunner;
use crate::configuration::HarnessConfig;
use crate::state::{ClusterHandleStore, StateDir};
use log::{error, info, warn};
use serde::Serialize;
use snafu::ResultExt;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// What `destroy` did. Destroy never fails, so this is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum DestroyOutcome {
    /// A cluster record existed and the recorded strategy was used. `clean` is `false` if the
    /// destroy command failed; the record was removed regardless.
    Recorded { strategy: Strategy, clean: bool },
    /// No record existed, so every known strategy was asked to destroy the cluster. `succeeded`
    /// lists the strategies whose destroy command exited cleanly.
    Unrecorded {
        attempted: Vec<Strategy>,
        succeeded: Vec<Strategy>,
    },
}

/// What `status` found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "source")]
pub enum ClusterStatus {
    /// A cluster record exists; `presence` is what the recorded strategy reports.
    Recorded {
        strategy: Strategy,
        presence: Presence,
    },
    /// No record exists but a strategy's native lookup found the cluster. When several would
    /// match, the first in priority order is reported.
    Discovered {
        strategy: Strategy,
        presence: Presence,
    },
    NotFound,
}

impl Display for ClusterStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let describe = |presence: &Presence| match presence {
            Presence::Absent => "absent",
            Presence::Present { running: true } => "running",
            Presence::Present { running: false } => "present, not running",
        };
        match self {
            ClusterStatus::Recorded { strategy, presence } => write!(
                f,
                "recorded with the {} strategy ({}): {}",
                strategy,
                strategy.tool(),
                describe(presence)
            ),
            ClusterStatus::Discovered { strategy, presence } => write!(
                f,
                "not recorded, found by the {} strategy ({}): {}",
                strategy,
                strategy.tool(),
                describe(presence)
            ),
            ClusterStatus::NotFound => write!(f, "none found"),
        }
    }
}

/// # Cluster Provisioner
///
/// Creates a cluster by running [`StrategyAttempt`]s strictly in priority order, recording which
/// strategy succeeded in a [`ClusterHandle`], and destroys it symmetrically with the recorded
/// strategy.
///
/// A failed or timed out attempt is destroyed before the next strategy starts, so two strategies
/// never compete for ports or names. Every command is bounded by a timeout, so neither `create`
/// nor `destroy` can hang on a misbehaving tool.
///
/// Two provisioners must not operate on the same cluster name at the same time; this is not
/// enforced.
#[derive(Debug, Clone)]
pub struct ClusterProvisioner<R>
where
    R: CommandRunner,
{
    runner: R,
    tooling: ClusterTooling,
    handles: ClusterHandleStore,
    diagnostics: DiagnosticsCollector<R>,
    config: HarnessConfig,
}

impl<R> ClusterProvisioner<R>
where
    R: CommandRunner,
{
    pub fn new(config: &HarnessConfig, runner: R) -> Self {
        Self {
            tooling: ClusterTooling::from_config(config),
            handles: StateDir::new(config.state_dir()).cluster_handles(),
            diagnostics: DiagnosticsCollector::new(config, runner.clone()),
            runner,
            config: config.clone(),
        }
    }

    /// Create the cluster with the configured strategies and attempt timeout.
    pub async fn create_default(&self) -> Result<ClusterHandle> {
        self.create(
            &self.config.cluster_name,
            &self.config.strategies,
            self.config.attempt_timeout(),
        )
        .await
    }

    /// Try `strategies` in order until one creates `cluster_name`.
    ///
    /// On success exactly one [`ClusterHandle`] exists for `cluster_name`. If every strategy
    /// fails, a diagnostics report is written and
    /// [`ProvisioningExhausted`](super::Error::ProvisioningExhausted) is returned with no handle
    /// left behind.
    pub async fn create(
        &self,
        cluster_name: &str,
        strategies: &[Strategy],
        per_attempt_timeout: Duration,
    ) -> Result<ClusterHandle> {
        if let Some(handle) = self.handles.read(cluster_name).await {
            let presence = self.lookup(handle.chosen_strategy, cluster_name).await;
            if presence.is_present() {
                info!(
                    "Cluster '{}' already exists (created with the {} strategy)",
                    cluster_name, handle.chosen_strategy
                );
                return Ok(handle);
            }
            warn!(
                "Removing stale record for cluster '{}': the {} strategy no longer finds it",
                cluster_name, handle.chosen_strategy
            );
            self.delete_handle(cluster_name).await;
        }

        let log_dir = self.config.log_dir();
        let mut attempted: Vec<Strategy> = Vec::new();
        let mut last_errors = Vec::new();
        for &strategy in strategies {
            if attempted.contains(&strategy) {
                warn!("Skipping the {} strategy, it was already tried", strategy);
                continue;
            }
            let attempt =
                StrategyAttempt::new(strategy, cluster_name, per_attempt_timeout, &log_dir);
            let result = attempt.run(&self.runner, &self.tooling).await;
            attempted.push(strategy);

            if result.succeeded {
                let handle = ClusterHandle::new(cluster_name, strategy);
                if let Err(e) = self.handles.write(&handle).await {
                    error!(
                        "Cluster '{}' was created but cannot be recorded, destroying it",
                        cluster_name
                    );
                    self.destroy_with(strategy, cluster_name).await;
                    return Err(e).context(error::StateSnafu {
                        action: "record the provisioned cluster",
                    });
                }
                return Ok(handle);
            }

            last_errors.push(result.failure_message());
            info!(
                "Cleaning up after the failed {} strategy before continuing",
                strategy
            );
            self.destroy_with(strategy, cluster_name).await;
        }

        error!(
            "Every provisioning strategy failed for cluster '{}', collecting diagnostics",
            cluster_name
        );
        let diagnostics = self.diagnostics.collect(&attempted, &log_dir).await;
        error::ProvisioningExhaustedSnafu {
            cluster: cluster_name,
            attempted,
            last_errors,
            diagnostics,
        }
        .fail()
    }

    /// Destroy `cluster_name`. This is best-effort and always terminates: it never returns an
    /// error and calling it again converges on the same end state.
    pub async fn destroy(&self, cluster_name: &str) -> DestroyOutcome {
        let outcome = match self.handles.read(cluster_name).await {
            Some(handle) => {
                let strategy = handle.chosen_strategy;
                info!(
                    "Destroying cluster '{}' with the recorded {} strategy",
                    cluster_name, strategy
                );
                let clean = self.destroy_with(strategy, cluster_name).await;
                // The record goes even if destroy failed, so teardown cannot get stuck on it.
                self.delete_handle(cluster_name).await;
                DestroyOutcome::Recorded { strategy, clean }
            }
            None => {
                info!(
                    "No record for cluster '{}', destroying with every known strategy",
                    cluster_name
                );
                let mut succeeded = Vec::new();
                for strategy in Strategy::ALL {
                    if self.destroy_with(strategy, cluster_name).await {
                        succeeded.push(strategy);
                    }
                }
                // An unreadable record is not a handle, but it must not outlive the cluster.
                self.delete_handle(cluster_name).await;
                DestroyOutcome::Unrecorded {
                    attempted: Strategy::ALL.to_vec(),
                    succeeded,
                }
            }
        };
        self.reclaim().await;
        outcome
    }

    /// Report on `cluster_name`, preferring the recorded strategy.
    pub async fn status(&self, cluster_name: &str) -> ClusterStatus {
        if let Some(handle) = self.handles.read(cluster_name).await {
            let presence = self.lookup(handle.chosen_strategy, cluster_name).await;
            return ClusterStatus::Recorded {
                strategy: handle.chosen_strategy,
                presence,
            };
        }
        for strategy in Strategy::ALL {
            let presence = self.lookup(strategy, cluster_name).await;
            if presence.is_present() {
                return ClusterStatus::Discovered { strategy, presence };
            }
        }
        ClusterStatus::NotFound
    }

    /// The path of the persisted record for `cluster_name`.
    pub fn handle_path(&self, cluster_name: &str) -> PathBuf {
        self.handles.path(cluster_name)
    }

    async fn lookup(&self, strategy: Strategy, cluster_name: &str) -> Presence {
        let spec = self
            .tooling
            .lookup(strategy, cluster_name)
            .timeout(self.config.query_timeout());
        match self.runner.run(&spec).await {
            Ok(output) => self
                .tooling
                .interpret_lookup(strategy, cluster_name, &output),
            Err(e) => {
                warn!("Unable to look up cluster with the {} strategy: {}", strategy, e);
                Presence::Absent
            }
        }
    }

    /// Returns `true` if the destroy command exited cleanly.
    async fn destroy_with(&self, strategy: Strategy, cluster_name: &str) -> bool {
        let spec = self
            .tooling
            .destroy(strategy, cluster_name)
            .timeout(self.config.destroy_timeout())
            .log_to(self.config.log_dir().join(format!("destroy-{}.log", strategy)));
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!(
                    "Destroying cluster '{}' with the {} strategy failed: {}",
                    cluster_name,
                    strategy,
                    output.failure_summary()
                );
                false
            }
            Err(e) => {
                warn!(
                    "Destroying cluster '{}' with the {} strategy failed: {}",
                    cluster_name, strategy, e
                );
                false
            }
        }
    }

    async fn delete_handle(&self, cluster_name: &str) {
        if let Err(e) = self.handles.delete(cluster_name).await {
            warn!("{}", e);
        }
    }

    /// The generic resource reclamation pass. Always attempted, never fatal.
    async fn reclaim(&self) {
        let spec = match self.config.reclaim_spec() {
            Some(spec) => spec.timeout(self.config.destroy_timeout()),
            None => return,
        };
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => info!("Reclaimed resources with '{}'", spec),
            Ok(output) => warn!("'{}' failed: {}", spec, output.failure_summary()),
            Err(e) => warn!("'{}' failed: {}", spec, e),
        }
    }
}
