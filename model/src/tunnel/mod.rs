/*!

The `tunnel` module exposes cluster services on localhost. [`TunnelSessionManager`] starts one
`kubectl port-forward` per endpoint and publishes a [`SessionRegistry`]; [`SessionTeardown`] stops
them later, possibly from another process, using only the persisted PID set.

!*/

mod control;
mod error;
mod manager;
mod probe;
mod process;
mod registry;
mod spawner;
mod target;
mod teardown;

pub use control::{ProcessControl, SystemProcessControl, Termination};
pub use error::{Error, Result};
pub use manager::{TunnelSession, TunnelSessionManager};
pub use probe::{LivenessProber, ProbeOutcome};
pub use process::{TunnelProcess, TunnelState};
pub use registry::{RegistryEntry, SessionRegistry};
pub use spawner::{SystemTunnelChild, SystemTunnelSpawner, TunnelChild, TunnelSpawner};
pub use target::{EndpointTarget, ReplicaSource, TargetKind, WorkerSpec};
pub use teardown::{SessionTeardown, TeardownReport};
