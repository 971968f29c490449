use crate::configuration::{HarnessConfig, StaticTargetSpec};
use crate::constants::LOCALHOST;
use serde::Serialize;

/// What an [`EndpointTarget`] forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    StaticService,
    /// The replica with this index.
    WorkerReplica(u32),
}

/// One endpoint that gets its own tunnel. Local ports are deterministic: static services use their
/// configured port and worker replica `i` uses `base_port + i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointTarget {
    pub id: String,
    pub kind: TargetKind,
    /// The `kubectl port-forward` resource, e.g. `svc/frontend` or `pod/workers-0`.
    pub resource: String,
    pub local_port: u16,
    pub remote_port: u16,
    pub probe_path: Option<String>,
}

impl EndpointTarget {
    pub fn from_static(spec: &StaticTargetSpec) -> Self {
        Self {
            id: spec.id.clone(),
            kind: TargetKind::StaticService,
            resource: spec.resource.clone(),
            local_port: spec.local_port,
            remote_port: spec.remote_port,
            probe_path: spec.probe_path.clone(),
        }
    }

    /// The target for replica `index`, or `None` if its local port would be out of range.
    pub fn worker(spec: &WorkerSpec, index: u32) -> Option<Self> {
        let local_port = u16::try_from(u32::from(spec.base_port) + index).ok()?;
        Some(Self {
            id: format!("{}-{}", spec.id_prefix, index),
            kind: TargetKind::WorkerReplica(index),
            resource: format!("pod/{}-{}", spec.workload, index),
            local_port,
            remote_port: spec.remote_port,
            probe_path: None,
        })
    }

    /// The locally reachable URL of this target.
    pub fn stream_url(&self) -> String {
        local_url(self.local_port)
    }
}

pub(crate) fn local_url(port: u16) -> String {
    format!("http://{}:{}", LOCALHOST, port)
}

/// Where the number of worker replicas comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaSource {
    Fixed(u32),
    /// The declared replica count of the worker StatefulSet.
    Workload,
}

/// The homogeneous pool of worker replicas to tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// The StatefulSet name. Replica `i` is the pod `<workload>-<i>`.
    pub workload: String,
    pub replicas: ReplicaSource,
    pub remote_port: u16,
    pub id_prefix: String,
    pub base_port: u16,
    pub max_replicas: u16,
}

impl WorkerSpec {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            workload: config.worker_workload.clone(),
            replicas: match config.worker_replicas {
                Some(count) => ReplicaSource::Fixed(count),
                None => ReplicaSource::Workload,
            },
            remote_port: config.worker_remote_port,
            id_prefix: config.worker_id_prefix.clone(),
            base_port: config.base_port,
            max_replicas: config.max_replicas,
        }
    }

    /// The id of the registry entry emitted when there are no replicas.
    pub fn placeholder_id(&self) -> String {
        format!("{}-placeholder", self.id_prefix)
    }
}

/// Every target in declared order: static targets first, then workers by index.
pub(crate) fn declared_targets(
    static_targets: &[StaticTargetSpec],
    worker: &WorkerSpec,
    replicas: u32,
) -> Vec<EndpointTarget> {
    static_targets
        .iter()
        .map(EndpointTarget::from_static)
        .chain((0..replicas).filter_map(|index| EndpointTarget::worker(worker, index)))
        .collect()
}
