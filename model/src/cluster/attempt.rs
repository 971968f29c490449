use super::error::Error;
use super::{ClusterTooling, Strategy};
use crate::command::CommandRunner;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// The outcome of one [`StrategyAttempt`]. It is consumed immediately by the provisioner and never
/// persisted.
#[derive(Debug)]
pub struct AttemptResult {
    pub strategy: Strategy,
    pub succeeded: bool,
    /// `true` if the attempt was cut off by its timeout.
    pub timed_out: bool,
    /// The log file holding the attempt's command output.
    pub diagnostics_path: Option<PathBuf>,
    /// Either [`Error::AttemptTimeout`] or [`Error::AttemptFailed`] when `succeeded` is `false`.
    pub failure: Option<Error>,
}

/// One provisioning strategy run as a bounded unit of work. When the timeout elapses the tool is
/// killed; cleaning up whatever it left behind is the provisioner's job.
#[derive(Debug, Clone)]
pub struct StrategyAttempt {
    strategy: Strategy,
    cluster_name: String,
    timeout: Duration,
    log_path: PathBuf,
}

impl StrategyAttempt {
    pub fn new<S>(strategy: Strategy, cluster_name: S, timeout: Duration, log_dir: &Path) -> Self
    where
        S: Into<String>,
    {
        Self {
            strategy,
            cluster_name: cluster_name.into(),
            timeout,
            log_path: log_dir.join(format!("create-{}.log", strategy)),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub async fn run<R>(&self, runner: &R, tooling: &ClusterTooling) -> AttemptResult
    where
        R: CommandRunner,
    {
        let spec = tooling
            .create(self.strategy, &self.cluster_name)
            .timeout(self.timeout)
            .log_to(&self.log_path);
        info!(
            "Creating cluster '{}' with {} ({} strategy), timeout {:?}",
            self.cluster_name,
            self.strategy.tool(),
            self.strategy,
            self.timeout
        );
        let start = Instant::now();
        let failure = match runner.run(&spec).await {
            Ok(output) if output.success() => None,
            Ok(output) => Some(Error::AttemptFailed {
                strategy: self.strategy,
                reason: output.failure_summary(),
            }),
            Err(e) if e.is_timeout() => Some(Error::AttemptTimeout {
                strategy: self.strategy,
                timeout: self.timeout,
            }),
            Err(e) => Some(Error::AttemptFailed {
                strategy: self.strategy,
                reason: e.to_string(),
            }),
        };

        match &failure {
            None => info!(
                "The {} strategy created cluster '{}' in {:?}",
                self.strategy,
                self.cluster_name,
                start.elapsed()
            ),
            Some(e) => warn!("{} (log: {})", e, self.log_path.display()),
        }

        AttemptResult {
            strategy: self.strategy,
            succeeded: failure.is_none(),
            timed_out: matches!(failure, Some(Error::AttemptTimeout { .. })),
            diagnostics_path: Some(self.log_path.clone()),
            failure,
        }
    }
}

impl AttemptResult {
    /// A printable reason for a failed attempt.
    pub fn failure_message(&self) -> String {
        self.failure
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}
