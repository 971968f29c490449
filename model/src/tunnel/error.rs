use super::TunnelState;
use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for tunnel sessions. Apart from `State`, which is returned when the registry
/// cannot be persisted, these are logged and absorbed rather than returned to callers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to determine the replica count of '{}': {}", workload, reason))]
    TargetUnresolvable { workload: String, reason: String },

    #[snafu(display("Unable to start the tunnel for '{}': {}", id, source))]
    TunnelSpawnFailed { id: String, source: std::io::Error },

    #[snafu(display("Tunnel '{}' cannot go from {} to {}", id, from, to))]
    InvalidTransition {
        id: String,
        from: TunnelState,
        to: TunnelState,
    },

    #[snafu(display("Tunnel processes survived forced termination: {:?}", pids))]
    TeardownPartial { pids: Vec<u32> },

    #[snafu(display("Unable to signal process {}: {}", pid, source))]
    Signal { pid: u32, source: nix::Error },

    #[snafu(display("'{}' is not a valid process id", pid))]
    InvalidPid { pid: u32 },

    #[snafu(display("Unable to search for processes matching '{}': {}", pattern, reason))]
    Sweep { pattern: String, reason: String },

    #[snafu(display("Unable to build the HTTP client for liveness probes: {}", source))]
    HttpClient { source: reqwest::Error },

    #[snafu(display("Unable to {}: {}", action, source))]
    State {
        action: String,
        source: crate::state::Error,
    },
}
