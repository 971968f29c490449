/*!

This library drives an ephemeral Kubernetes test cluster and the local tunnels that expose its
services. It provides:

- a [`ClusterProvisioner`] which creates a cluster by trying provisioning strategies in priority
  order, and destroys it symmetrically with the strategy that was recorded,
- a [`TunnelSessionManager`] which starts one port-forward per endpoint and publishes the
  resulting [`SessionRegistry`],
- a [`SessionTeardown`] which can stop a session from persisted state alone, even after the
  process that started it has exited.

Every external tool is reached through the [`CommandRunner`] trait so that the orchestration logic
can be exercised without a cluster.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use cluster::{
    AttemptResult, ClusterHandle, ClusterProvisioner, ClusterStatus, ClusterTooling,
    DestroyOutcome, DiagnosticsCollector, Presence, Strategy, StrategyAttempt,
};
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use configuration::{HarnessConfig, StaticTargetSpec};
pub use state::{ClusterHandleStore, PidSetFile, RegistryFile, StateDir};
pub use tunnel::{
    EndpointTarget, LivenessProber, ProcessControl, ProbeOutcome, RegistryEntry, ReplicaSource,
    SessionRegistry, SessionTeardown, SystemProcessControl, SystemTunnelSpawner, TargetKind,
    TeardownReport, Termination, TunnelChild, TunnelProcess, TunnelSession,
    TunnelSessionManager, TunnelSpawner, TunnelState, WorkerSpec,
};

pub mod cluster;
pub mod command;
pub mod configuration;
pub mod constants;
pub mod state;
pub mod tunnel;
