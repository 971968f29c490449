use super::error::{self, Result};
use super::target::{declared_targets, local_url};
use super::{
    EndpointTarget, LivenessProber, ProbeOutcome, RegistryEntry, ReplicaSource, SessionRegistry,
    TunnelChild, TunnelProcess, TunnelSpawner, TunnelState, WorkerSpec,
};
use crate::command::{CommandRunner, CommandSpec};
use crate::configuration::{HarnessConfig, StaticTargetSpec};
use crate::constants::TUNNEL_LOG_PREFIX;
use crate::state::{PidSetFile, StateDir};
use futures::future::join_all;
use log::{error, info, warn};
use serde::Serialize;
use snafu::ResultExt;
use std::path::PathBuf;
use std::time::Duration;

/// The result of [`TunnelSessionManager::start`].
#[derive(Debug, Clone, Serialize)]
pub struct TunnelSession {
    /// The worker replica count the session was built for.
    pub replicas: u32,
    /// Every target in declared order, including those whose tunnel failed.
    pub processes: Vec<TunnelProcess>,
    pub registry: SessionRegistry,
    pub probes: Vec<ProbeOutcome>,
}

impl TunnelSession {
    pub fn running(&self) -> impl Iterator<Item = &TunnelProcess> {
        self.processes.iter().filter(|process| process.is_running())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TunnelProcess> {
        self.processes
            .iter()
            .filter(|process| process.state() == TunnelState::Failed)
    }
}

/// Starts one tunnel per static target and per worker replica, records every tunnel PID as soon
/// as it is known, and publishes the [`SessionRegistry`] of the tunnels that came up.
///
/// Callers must not start two sessions against the same state directory at once.
#[derive(Debug, Clone)]
pub struct TunnelSessionManager<R, S>
where
    R: CommandRunner,
    S: TunnelSpawner,
{
    runner: R,
    spawner: S,
    state: StateDir,
    log_dir: PathBuf,
    kubectl_path: String,
    namespace: String,
    query_timeout: Duration,
    settle: Duration,
    probe_timeout: Option<Duration>,
}

impl<R, S> TunnelSessionManager<R, S>
where
    R: CommandRunner,
    S: TunnelSpawner,
{
    pub fn new(config: &HarnessConfig, runner: R, spawner: S) -> Self {
        Self {
            runner,
            spawner,
            state: StateDir::new(config.state_dir()),
            log_dir: config.log_dir(),
            kubectl_path: config.kubectl_path.clone(),
            namespace: config.namespace.clone(),
            query_timeout: config.query_timeout(),
            settle: config.settle_interval(),
            probe_timeout: config.probe.then(|| config.probe_timeout()),
        }
    }

    /// Start the session. This only fails if the registry cannot be persisted; tunnels that do not
    /// come up are logged and left out of the registry.
    pub async fn start(
        &self,
        static_targets: &[StaticTargetSpec],
        worker: &WorkerSpec,
    ) -> Result<TunnelSession> {
        let replicas = match self.replica_count(worker).await {
            Ok(replicas) => replicas,
            Err(e) => {
                warn!("{}, continuing without workers", e);
                0
            }
        };
        let targets = declared_targets(static_targets, worker, replicas);

        let pid_set = self.state.pid_set();
        match pid_set.read().await {
            Ok(Some(pids)) if !pids.is_empty() => warn!(
                "'{}' already lists {} tunnel(s) from an earlier session, adding to it",
                pid_set.path().display(),
                pids.len()
            ),
            Ok(_) => {}
            Err(e) => warn!("{}", e),
        }

        info!("Starting {} tunnel(s)", targets.len());
        let mut launched =
            join_all(targets.into_iter().map(|target| self.launch(target, &pid_set))).await;

        if launched.iter().any(|(_, child)| child.is_some()) {
            tokio::time::sleep(self.settle).await;
        }
        for (process, child) in launched.iter_mut() {
            let alive = child.as_mut().map(|child| child.is_running()).unwrap_or(false);
            let next = if alive {
                TunnelState::Running
            } else {
                TunnelState::Failed
            };
            if let Err(e) = process.transition(next) {
                warn!("{}", e);
            }
        }
        let processes: Vec<TunnelProcess> =
            launched.into_iter().map(|(process, _)| process).collect();
        self.forget_failed(&pid_set, &processes).await;

        let mut entries: Vec<RegistryEntry> = processes
            .iter()
            .filter(|process| process.is_running())
            .map(|process| RegistryEntry::new(&process.target.id, process.target.local_port))
            .collect();
        if replicas == 0 {
            entries.push(RegistryEntry {
                id: worker.placeholder_id(),
                stream_url: local_url(worker.base_port),
            });
        }
        let registry = SessionRegistry::new(entries);
        let registry_file = self.state.registry();
        registry_file
            .write(&registry)
            .await
            .context(error::StateSnafu {
                action: "publish the session registry",
            })?;
        info!(
            "{} of {} tunnel(s) running, registry written to '{}'",
            processes.iter().filter(|process| process.is_running()).count(),
            processes.len(),
            registry_file.path().display()
        );

        let probes = self.probe(&registry, &processes).await;
        Ok(TunnelSession {
            replicas,
            processes,
            registry,
            probes,
        })
    }

    /// Resolve the worker replica count, clamped to `max_replicas`. A workload that does not exist
    /// has zero replicas.
    pub async fn replica_count(&self, worker: &WorkerSpec) -> Result<u32> {
        let count = match worker.replicas {
            ReplicaSource::Fixed(count) => count,
            ReplicaSource::Workload => self.query_replicas(&worker.workload).await?,
        };
        let max = u32::from(worker.max_replicas);
        if count > max {
            warn!(
                "'{}' declares {} replicas, only the first {} get tunnels",
                worker.workload, count, max
            );
            return Ok(max);
        }
        Ok(count)
    }

    async fn query_replicas(&self, workload: &str) -> Result<u32> {
        let spec = CommandSpec::new(&self.kubectl_path)
            .args(["get", "statefulset", workload, "-n", &self.namespace])
            .args(["-o", "jsonpath={.spec.replicas}"])
            .timeout(self.query_timeout);
        let unresolvable = |reason: String| error::TargetUnresolvableSnafu { workload, reason };
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| unresolvable(e.to_string()).build())?;
        if !output.success() {
            if output.contains("NotFound") {
                info!("Workload '{}' does not exist, no workers", workload);
                return Ok(0);
            }
            return unresolvable(output.failure_summary()).fail();
        }
        let text = output.stdout.trim();
        text.parse()
            .map_err(|_| unresolvable(format!("unexpected replica count '{}'", text)).build())
    }

    /// Spawn the tunnel for `target` and persist its PID before returning. A tunnel whose PID
    /// cannot be persisted is killed.
    async fn launch(
        &self,
        target: EndpointTarget,
        pid_set: &PidSetFile,
    ) -> (TunnelProcess, Option<S::Child>) {
        let log_path = self
            .log_dir
            .join(format!("{}{}.log", TUNNEL_LOG_PREFIX, target.id));
        let mut child = match self.spawner.spawn(&target, &log_path).await {
            Ok(child) => child,
            Err(e) => {
                error!("{}", e);
                return (TunnelProcess::new(target, None, log_path), None);
            }
        };
        let pid = child.pid();
        let process = TunnelProcess::new(target, Some(pid), log_path);
        if let Err(e) = pid_set.append(pid).await {
            error!(
                "Stopping tunnel '{}' because its pid cannot be recorded: {}",
                process.target.id, e
            );
            child.kill();
            return (process, None);
        }
        (process, Some(child))
    }

    /// Drop the PIDs of tunnels that already exited. Teardown must not signal a process that has
    /// since reused one of them.
    async fn forget_failed(&self, pid_set: &PidSetFile, processes: &[TunnelProcess]) {
        let dead: Vec<u32> = processes
            .iter()
            .filter(|process| process.state() == TunnelState::Failed)
            .filter_map(|process| process.pid)
            .collect();
        if dead.is_empty() {
            return;
        }
        match pid_set.remove(&dead).await {
            Ok(_) => info!("Forgot {} exited tunnel pid(s) {:?}", dead.len(), dead),
            Err(e) => warn!("{}", e),
        }
    }

    async fn probe(
        &self,
        registry: &SessionRegistry,
        processes: &[TunnelProcess],
    ) -> Vec<ProbeOutcome> {
        let timeout = match self.probe_timeout {
            Some(timeout) => timeout,
            None => return Vec::new(),
        };
        let prober = match LivenessProber::new(timeout) {
            Ok(prober) => prober,
            Err(e) => {
                warn!("{}", e);
                return Vec::new();
            }
        };
        let mut targets: Vec<(String, String)> = registry
            .entries()
            .iter()
            .map(|entry| (entry.id.clone(), entry.stream_url.clone()))
            .collect();
        targets.extend(processes.iter().filter_map(|process| {
            process.target.probe_path.as_ref().map(|path| {
                (
                    process.target.id.clone(),
                    format!("{}{}", process.target.stream_url(), path),
                )
            })
        }));
        prober.probe_all(targets).await
    }
}
