/// Helper macro to avoid retyping the name prefix of the files we keep in the state directory.
/// When given no parameters, this returns the prefix. When given a string literal parameter it
/// adds `-parameter` to the end.
macro_rules! lococtl {
    () => {
        "lococtl"
    };
    ($s:literal) => {
        concat!(lococtl!(), "-", $s)
    };
}

// System identifiers
pub const ENV_PREFIX: &str = "LOCO_";

// Defaults
pub const DEFAULT_CLUSTER_NAME: &str = "loco-test";
pub const DEFAULT_NAMESPACE: &str = "loco";
pub const DEFAULT_WORKER_WORKLOAD: &str = "loco-loco-emulator";
pub const DEFAULT_WORKER_ID_PREFIX: &str = "emulator";
pub const DEFAULT_WORKER_REMOTE_PORT: u16 = 6080;
pub const DEFAULT_BASE_PORT: u16 = 6090;
pub const DEFAULT_MAX_REPLICAS: u16 = 32;
pub const DEFAULT_STATIC_TARGETS: &str =
    "frontend=svc/loco-loco-frontend:3000:3000,backend=svc/loco-loco-backend:3001:3001/health";
pub const DEFAULT_STATE_DIR: &str = ".lococtl";
pub const DEFAULT_RECLAIM_COMMAND: &str = "docker,image,prune,-f";

// Timeouts and intervals, in seconds
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_DESTROY_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SETTLE_SECS: u64 = 3;
pub const DEFAULT_GRACE_SECS: u64 = 5;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 3;

// Persisted files
pub const PID_SET_FILENAME: &str = "tunnels.pids";
pub const REGISTRY_FILENAME: &str = "instances.json";
pub const LOG_DIRNAME: &str = "logs";
pub const CLUSTER_HANDLE_EXTENSION: &str = "strategy";
pub const TUNNEL_LOG_PREFIX: &str = "tunnel-";
pub const DIAGNOSTICS_PREFIX: &str = "diagnostics-";

// Written at the top of every diagnostics report
pub const DIAGNOSTICS_TITLE: &str = lococtl!("diagnostics");

// Placeholder text for a diagnostics fact that could not be gathered
pub const UNAVAILABLE: &str = "<unavailable>";

// Number of log files listed in a diagnostics report
pub const DIAGNOSTICS_RECENT_LOGS: usize = 10;

// Only the loopback interface is used for tunnels
pub const LOCALHOST: &str = "localhost";
pub const TUNNEL_BIND_ADDRESS: &str = "127.0.0.1";
