use super::error;
use super::{ProcessControl, Termination};
use crate::command::{CommandRunner, CommandSpec};
use crate::configuration::HarnessConfig;
use crate::constants::TUNNEL_LOG_PREFIX;
use crate::state::{remove_if_present, StateDir};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What [`SessionTeardown::stop`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// No session state was found; nothing was done.
    pub already_clean: bool,
    /// Exited after the graceful signal.
    pub terminated: Vec<u32>,
    /// Exited only after the forced signal.
    pub forced: Vec<u32>,
    /// Still alive after the forced signal.
    pub survivors: Vec<u32>,
    /// Matched the orphan pattern without being in the recorded set.
    pub orphans: Vec<u32>,
}

/// Stops a tunnel session using only what was persisted, so it works from a different process
/// than the one that called `start`. Every step is best-effort and `stop` never fails; running it
/// again after an interrupted run finishes the job.
#[derive(Debug, Clone)]
pub struct SessionTeardown<R, P>
where
    R: CommandRunner,
    P: ProcessControl,
{
    runner: R,
    control: P,
    state: StateDir,
    log_dir: PathBuf,
    grace: Duration,
    orphan_pattern: String,
    cleanup: Option<CommandSpec>,
}

impl<R, P> SessionTeardown<R, P>
where
    R: CommandRunner,
    P: ProcessControl,
{
    pub fn new(config: &HarnessConfig, runner: R, control: P) -> Self {
        Self {
            runner,
            control,
            state: StateDir::new(config.state_dir()),
            log_dir: config.log_dir(),
            grace: config.grace_interval(),
            orphan_pattern: config.orphan_pattern(),
            cleanup: config
                .session_cleanup_spec()
                .map(|spec| spec.timeout(config.destroy_timeout())),
        }
    }

    pub async fn stop(&self) -> TeardownReport {
        let pid_set = self.state.pid_set();
        let pids = match pid_set.read().await {
            Ok(Some(pids)) => pids,
            Ok(None) => {
                info!("No tunnel session is recorded, nothing to stop");
                return TeardownReport {
                    already_clean: true,
                    ..Default::default()
                };
            }
            Err(e) => {
                warn!("{}, stopping orphans only", e);
                Vec::new()
            }
        };
        let mut report = TeardownReport::default();

        let alive: Vec<u32> = pids
            .iter()
            .copied()
            .filter(|pid| self.control.is_alive(*pid))
            .collect();
        debug!("{} of {} recorded tunnel(s) alive", alive.len(), pids.len());
        self.signal_all(&alive, Termination::Graceful);
        let stragglers = self.wait_for_exit(&alive).await;
        report.terminated = without(&alive, &stragglers);

        if !stragglers.is_empty() {
            warn!(
                "{} tunnel(s) ignored the graceful signal, forcing them",
                stragglers.len()
            );
            self.signal_all(&stragglers, Termination::Forced);
            report.survivors = self.wait_for_exit(&stragglers).await;
            report.forced = without(&stragglers, &report.survivors);
        }
        for pid in report.terminated.iter().chain(&report.forced) {
            info!("Tunnel process {} terminated", pid);
        }
        if !report.survivors.is_empty() {
            let partial = error::Error::TeardownPartial {
                pids: report.survivors.clone(),
            };
            error!("{}", partial);
        }

        report.orphans = self.sweep_orphans(&pids).await;
        self.run_cleanup().await;
        self.delete_state().await;
        report
    }

    fn signal_all(&self, pids: &[u32], termination: Termination) {
        for &pid in pids {
            if let Err(e) = self.control.signal(pid, termination) {
                warn!("{}", e);
            }
        }
    }

    /// Wait up to one grace interval for all of `pids` to exit. Returns the ones still alive.
    async fn wait_for_exit(&self, pids: &[u32]) -> Vec<u32> {
        let deadline = Instant::now() + self.grace;
        loop {
            let alive: Vec<u32> = pids
                .iter()
                .copied()
                .filter(|pid| self.control.is_alive(*pid))
                .collect();
            if alive.is_empty() || Instant::now() >= deadline {
                return alive;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn sweep_orphans(&self, recorded: &[u32]) -> Vec<u32> {
        let found = match self.control.find_matching(&self.orphan_pattern).await {
            Ok(found) => found,
            Err(e) => {
                warn!("{}", e);
                return Vec::new();
            }
        };
        let orphans = without(&found, recorded);
        for &pid in &orphans {
            warn!(
                "Stopping orphaned tunnel process {} matching '{}'",
                pid, self.orphan_pattern
            );
            if let Err(e) = self.control.signal(pid, Termination::Graceful) {
                warn!("{}", e);
            }
        }
        orphans
    }

    async fn run_cleanup(&self) {
        let spec = match &self.cleanup {
            Some(spec) => spec,
            None => return,
        };
        match self.runner.run(spec).await {
            Ok(output) if output.success() => info!("Ran '{}'", spec),
            Ok(output) => warn!("'{}' failed: {}", spec, output.failure_summary()),
            Err(e) => warn!("'{}' failed: {}", spec, e),
        }
    }

    /// The PID set goes last so that an interrupted teardown is retried in full.
    async fn delete_state(&self) {
        if let Err(e) = self.state.registry().delete().await {
            warn!("{}", e);
        }
        for path in self.tunnel_logs().await {
            if let Err(e) = remove_if_present(&path, "delete tunnel log").await {
                warn!("{}", e);
            }
        }
        if let Err(e) = self.state.pid_set().delete().await {
            warn!("{}", e);
        }
    }

    async fn tunnel_logs(&self) -> Vec<PathBuf> {
        let mut logs = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.log_dir).await {
            Ok(entries) => entries,
            Err(_) => return logs,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(TUNNEL_LOG_PREFIX)
            {
                logs.push(entry.path());
            }
        }
        logs
    }
}

fn without(pids: &[u32], excluded: &[u32]) -> Vec<u32> {
    pids.iter()
        .copied()
        .filter(|pid| !excluded.contains(pid))
        .collect()
}
