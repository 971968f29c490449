/*!

`HarnessConfig` is the single configuration object handed to every component. It is read from
`LOCO_`-prefixed environment variables; every field has a default so that an empty environment is
a valid configuration.

!*/

use crate::cluster::Strategy;
use crate::command::CommandSpec;
use crate::constants::*;
use serde::Deserialize;
use serde_plain::derive_deserialize_from_fromstr;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to read configuration from the environment: {}", source))]
    Env { source: envy::Error },

    #[snafu(display("Invalid static target '{}': {}", value, reason))]
    ParseStaticTarget { value: String, reason: String },

    #[snafu(display("Invalid configuration: {}", reason))]
    Invalid { reason: String },
}

/// A service that is always tunneled, independent of the worker replica count.
///
/// The text form is `id=resource:local_port:remote_port[/probe/path]`, for example
/// `backend=svc/loco-loco-backend:3001:3001/health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTargetSpec {
    pub id: String,
    /// The `kubectl port-forward` resource, e.g. `svc/my-service`.
    pub resource: String,
    pub local_port: u16,
    pub remote_port: u16,
    /// If present, the liveness probe requests `http://localhost:<local_port><probe_path>`.
    pub probe_path: Option<String>,
}

impl FromStr for StaticTargetSpec {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = |reason: &str| ParseStaticTargetSnafu {
            value,
            reason: reason.to_string(),
        };
        let (id, rest) = value
            .trim()
            .split_once('=')
            .with_context(|| invalid("expected 'id=resource:local:remote'"))?;
        let mut parts = rest.splitn(3, ':');
        let resource = parts.next().unwrap_or_default();
        let local = parts
            .next()
            .with_context(|| invalid("missing local port"))?;
        let remote = parts
            .next()
            .with_context(|| invalid("missing remote port"))?;
        let (remote, probe_path) = match remote.split_once('/') {
            Some((port, path)) => (port, Some(format!("/{}", path))),
            None => (remote, None),
        };
        ensure!(!id.is_empty(), invalid("empty id"));
        ensure!(!resource.is_empty(), invalid("empty resource"));
        Ok(Self {
            id: id.to_string(),
            resource: resource.to_string(),
            local_port: local
                .parse()
                .ok()
                .with_context(|| invalid("local port is not a port number"))?,
            remote_port: remote
                .parse()
                .ok()
                .with_context(|| invalid("remote port is not a port number"))?,
            probe_path,
        })
    }
}

derive_deserialize_from_fromstr!(StaticTargetSpec, "a static target 'id=resource:local:remote'");

impl Display for StaticTargetSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}={}:{}:{}{}",
            self.id,
            self.resource,
            self.local_port,
            self.remote_port,
            self.probe_path.as_deref().unwrap_or_default()
        )
    }
}

/// Configuration for cluster provisioning and tunnel sessions. See the `LOCO_*` environment
/// variables documented on each field.
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessConfig {
    /// `LOCO_CLUSTER_NAME`
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
    /// `LOCO_STRATEGIES`, comma separated, in priority order.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<Strategy>,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_destroy_timeout_secs")]
    pub destroy_timeout_secs: u64,
    /// Bound for status lookups, replica queries and diagnostics facts.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    #[serde(default = "default_kind_path")]
    pub kind_path: String,
    #[serde(default = "default_minikube_path")]
    pub minikube_path: String,
    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,
    #[serde(default = "default_docker_path")]
    pub docker_path: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// The StatefulSet whose replicas are tunneled as workers.
    #[serde(default = "default_worker_workload")]
    pub worker_workload: String,
    /// `LOCO_WORKER_REPLICAS` overrides the replica count read from the workload.
    #[serde(default)]
    pub worker_replicas: Option<u32>,
    #[serde(default = "default_worker_remote_port")]
    pub worker_remote_port: u16,
    #[serde(default = "default_worker_id_prefix")]
    pub worker_id_prefix: String,
    /// Worker `i` is forwarded from local port `base_port + i`.
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u16,
    #[serde(default = "default_static_targets")]
    pub static_targets: Vec<StaticTargetSpec>,

    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_probe")]
    pub probe: bool,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Defaults to `<state_dir>/logs`.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Run after every cluster destroy, e.g. to prune dangling images. Empty disables it.
    #[serde(default = "default_reclaim_command")]
    pub reclaim_command: Vec<String>,
    /// Run by `stop` after the tunnels are gone. Empty disables it.
    #[serde(default)]
    pub session_cleanup_command: Vec<String>,
    /// `pgrep -f` pattern identifying tunnel processes left behind by a crashed session.
    #[serde(default)]
    pub orphan_pattern: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            strategies: default_strategies(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            destroy_timeout_secs: default_destroy_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            kind_path: default_kind_path(),
            minikube_path: default_minikube_path(),
            kubectl_path: default_kubectl_path(),
            docker_path: default_docker_path(),
            namespace: default_namespace(),
            worker_workload: default_worker_workload(),
            worker_replicas: None,
            worker_remote_port: default_worker_remote_port(),
            worker_id_prefix: default_worker_id_prefix(),
            base_port: default_base_port(),
            max_replicas: default_max_replicas(),
            static_targets: default_static_targets(),
            settle_secs: default_settle_secs(),
            grace_secs: default_grace_secs(),
            probe: default_probe(),
            probe_timeout_secs: default_probe_timeout_secs(),
            state_dir: default_state_dir(),
            log_dir: None,
            reclaim_command: default_reclaim_command(),
            session_cleanup_command: Vec::new(),
            orphan_pattern: None,
        }
    }
}

impl HarnessConfig {
    /// Read and validate the configuration from `LOCO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed(ENV_PREFIX).from_env().context(EnvSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate the configuration from `(key, value)` pairs, as if they were the
    /// environment.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context(EnvSnafu)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.cluster_name.trim().is_empty(),
            InvalidSnafu {
                reason: "the cluster name is empty"
            }
        );
        ensure!(
            !self.cluster_name.contains('/') && !self.cluster_name.starts_with('.'),
            InvalidSnafu {
                reason: format!(
                    "the cluster name '{}' must not contain '/' or start with '.'",
                    self.cluster_name
                )
            }
        );
        ensure!(
            !self.strategies.is_empty(),
            InvalidSnafu {
                reason: "no provisioning strategies are configured"
            }
        );
        let unique: HashSet<_> = self.strategies.iter().collect();
        ensure!(
            unique.len() == self.strategies.len(),
            InvalidSnafu {
                reason: "a provisioning strategy is listed more than once"
            }
        );
        ensure!(
            self.max_replicas > 0,
            InvalidSnafu {
                reason: "max replicas must be at least 1"
            }
        );
        ensure!(
            u32::from(self.base_port) + u32::from(self.max_replicas) <= u32::from(u16::MAX) + 1,
            InvalidSnafu {
                reason: format!(
                    "worker ports {}..{} exceed the port range",
                    self.base_port,
                    u32::from(self.base_port) + u32::from(self.max_replicas)
                )
            }
        );

        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        for target in &self.static_targets {
            ensure!(
                ids.insert(target.id.as_str()),
                InvalidSnafu {
                    reason: format!("static target id '{}' is used twice", target.id)
                }
            );
            ensure!(
                ports.insert(target.local_port),
                InvalidSnafu {
                    reason: format!("local port {} is used twice", target.local_port)
                }
            );
            ensure!(
                !self.worker_ports().contains(&u32::from(target.local_port)),
                InvalidSnafu {
                    reason: format!(
                        "static target '{}' uses local port {} inside the worker range {:?}",
                        target.id,
                        target.local_port,
                        self.worker_ports()
                    )
                }
            );
        }
        Ok(())
    }

    /// The local ports reserved for worker replicas.
    pub fn worker_ports(&self) -> std::ops::Range<u32> {
        let start = u32::from(self.base_port);
        start..start + u32::from(self.max_replicas)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_secs(self.destroy_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn grace_interval(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join(LOG_DIRNAME))
    }

    /// The resource reclamation command run after every destroy, if one is configured.
    pub fn reclaim_spec(&self) -> Option<CommandSpec> {
        CommandSpec::from_argv(&self.reclaim_command)
    }

    /// The external cleanup run at the end of `stop`, if one is configured.
    pub fn session_cleanup_spec(&self) -> Option<CommandSpec> {
        CommandSpec::from_argv(&self.session_cleanup_command)
    }

    pub fn orphan_pattern(&self) -> String {
        self.orphan_pattern
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "port-forward --address {} -n {}",
                    TUNNEL_BIND_ADDRESS, self.namespace
                )
            })
    }
}

fn default_cluster_name() -> String {
    DEFAULT_CLUSTER_NAME.to_string()
}

fn default_strategies() -> Vec<Strategy> {
    vec![Strategy::Primary, Strategy::Fallback]
}

fn default_attempt_timeout_secs() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT_SECS
}

fn default_destroy_timeout_secs() -> u64 {
    DEFAULT_DESTROY_TIMEOUT_SECS
}

fn default_query_timeout_secs() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

fn default_kind_path() -> String {
    String::from("kind")
}

fn default_minikube_path() -> String {
    String::from("minikube")
}

fn default_kubectl_path() -> String {
    String::from("kubectl")
}

fn default_docker_path() -> String {
    String::from("docker")
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_worker_workload() -> String {
    DEFAULT_WORKER_WORKLOAD.to_string()
}

fn default_worker_remote_port() -> u16 {
    DEFAULT_WORKER_REMOTE_PORT
}

fn default_worker_id_prefix() -> String {
    DEFAULT_WORKER_ID_PREFIX.to_string()
}

fn default_base_port() -> u16 {
    DEFAULT_BASE_PORT
}

fn default_max_replicas() -> u16 {
    DEFAULT_MAX_REPLICAS
}

fn default_static_targets() -> Vec<StaticTargetSpec> {
    DEFAULT_STATIC_TARGETS
        .split(',')
        .filter_map(|target| target.parse().ok())
        .collect()
}

fn default_settle_secs() -> u64 {
    DEFAULT_SETTLE_SECS
}

fn default_grace_secs() -> u64 {
    DEFAULT_GRACE_SECS
}

fn default_probe() -> bool {
    true
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_reclaim_command() -> Vec<String> {
    DEFAULT_RECLAIM_COMMAND
        .split(',')
        .map(String::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_environment_is_valid() {
        let config = HarnessConfig::from_vars(vec![]).unwrap();
        assert_eq!(config.cluster_name, DEFAULT_CLUSTER_NAME);
        assert_eq!(config.strategies, vec![Strategy::Primary, Strategy::Fallback]);
        assert_eq!(config.static_targets.len(), 2);
        assert_eq!(config.static_targets[1].probe_path.as_deref(), Some("/health"));
        assert_eq!(config.log_dir(), PathBuf::from(".lococtl/logs"));
        assert_eq!(
            config.orphan_pattern(),
            "port-forward --address 127.0.0.1 -n loco"
        );
        assert_eq!(
            config.reclaim_command,
            vec!["docker", "image", "prune", "-f"]
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = HarnessConfig::from_vars(vars(&[
            ("LOCO_CLUSTER_NAME", "ci-1"),
            ("LOCO_STRATEGIES", "fallback,primary"),
            ("LOCO_WORKER_REPLICAS", "4"),
            ("LOCO_BASE_PORT", "7000"),
            ("LOCO_STATIC_TARGETS", "api=svc/api:8080:80/ready"),
            ("LOCO_RECLAIM_COMMAND", ""),
        ]))
        .unwrap();
        assert_eq!(config.cluster_name, "ci-1");
        assert_eq!(config.strategies, vec![Strategy::Fallback, Strategy::Primary]);
        assert_eq!(config.worker_replicas, Some(4));
        assert!(config.reclaim_spec().is_none());
        assert_eq!(config.base_port, 7000);
        assert_eq!(
            config.static_targets,
            vec![StaticTargetSpec {
                id: "api".into(),
                resource: "svc/api".into(),
                local_port: 8080,
                remote_port: 80,
                probe_path: Some("/ready".into()),
            }]
        );
    }

    #[test]
    fn static_target_inside_worker_range_is_rejected() {
        let error = HarnessConfig::from_vars(vars(&[
            ("LOCO_BASE_PORT", "3000"),
            ("LOCO_MAX_REPLICAS", "4"),
        ]))
        .unwrap_err();
        assert!(error.to_string().contains("inside the worker range"));
    }

    #[test]
    fn last_port_is_still_a_worker_port() {
        let error = HarnessConfig::from_vars(vars(&[
            ("LOCO_BASE_PORT", "65535"),
            ("LOCO_MAX_REPLICAS", "1"),
            ("LOCO_STATIC_TARGETS", "web=svc/web:65535:80"),
        ]))
        .unwrap_err();
        assert!(error.to_string().contains("inside the worker range"));

        let config = HarnessConfig::from_vars(vars(&[
            ("LOCO_BASE_PORT", "65535"),
            ("LOCO_MAX_REPLICAS", "1"),
        ]))
        .unwrap();
        assert_eq!(config.worker_ports(), 65535..65536);
    }

    #[test]
    fn cluster_name_stays_inside_the_state_dir() {
        for name in ["../x", "a/b", ".hidden"] {
            let error =
                HarnessConfig::from_vars(vars(&[("LOCO_CLUSTER_NAME", name)])).unwrap_err();
            assert!(matches!(error, Error::Invalid { .. }), "{}", name);
        }
    }

    #[test]
    fn duplicate_strategies_are_rejected() {
        let error =
            HarnessConfig::from_vars(vars(&[("LOCO_STRATEGIES", "primary,primary")])).unwrap_err();
        assert!(matches!(error, Error::Invalid { .. }));
    }

    #[test]
    fn static_target_text_form() {
        let target: StaticTargetSpec = "web=svc/web:3000:80".parse().unwrap();
        assert_eq!(target.probe_path, None);
        assert_eq!(target.to_string(), "web=svc/web:3000:80");
        assert!("web=svc/web:3000".parse::<StaticTargetSpec>().is_err());
        assert!("svc/web:3000:80".parse::<StaticTargetSpec>().is_err());
        assert!("web=svc/web:x:80".parse::<StaticTargetSpec>().is_err());
    }
}
