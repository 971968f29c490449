use crate::command::{CommandOutput, CommandSpec};
use crate::configuration::HarnessConfig;
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};

/// A method of provisioning a cluster. The variants are ordered by default priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fast but less tolerant: a `kind` cluster running in docker.
    Primary,
    /// Slower but more robust: a `minikube` profile using the docker driver.
    Fallback,
}

derive_display_from_serialize!(Strategy);
derive_fromstr_from_deserialize!(Strategy);

impl Strategy {
    /// Every known strategy in priority order.
    pub const ALL: [Strategy; 2] = [Strategy::Primary, Strategy::Fallback];

    /// The name of the tool that implements the strategy.
    pub fn tool(&self) -> &'static str {
        match self {
            Strategy::Primary => "kind",
            Strategy::Fallback => "minikube",
        }
    }
}

/// Whether a strategy's native lookup found the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "presence")]
pub enum Presence {
    Absent,
    Present { running: bool },
}

impl Presence {
    pub fn is_present(&self) -> bool {
        matches!(self, Presence::Present { .. })
    }
}

/// Maps each [`Strategy`] onto the command lines of its native tool.
#[derive(Debug, Clone)]
pub struct ClusterTooling {
    kind_path: String,
    minikube_path: String,
}

impl ClusterTooling {
    pub fn new<S1, S2>(kind_path: S1, minikube_path: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            kind_path: kind_path.into(),
            minikube_path: minikube_path.into(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(&config.kind_path, &config.minikube_path)
    }

    pub fn create(&self, strategy: Strategy, cluster_name: &str) -> CommandSpec {
        match strategy {
            Strategy::Primary => CommandSpec::new(&self.kind_path).args([
                "create",
                "cluster",
                "--name",
                cluster_name,
                "--wait",
                "300s",
            ]),
            Strategy::Fallback => CommandSpec::new(&self.minikube_path).args([
                "start",
                "--profile",
                cluster_name,
                "--driver=docker",
                "--wait=all",
            ]),
        }
    }

    pub fn destroy(&self, strategy: Strategy, cluster_name: &str) -> CommandSpec {
        match strategy {
            Strategy::Primary => CommandSpec::new(&self.kind_path).args([
                "delete",
                "cluster",
                "--name",
                cluster_name,
            ]),
            Strategy::Fallback => {
                CommandSpec::new(&self.minikube_path).args(["delete", "--profile", cluster_name])
            }
        }
    }

    /// The native mechanism used to find an existing cluster.
    pub fn lookup(&self, strategy: Strategy, cluster_name: &str) -> CommandSpec {
        match strategy {
            Strategy::Primary => CommandSpec::new(&self.kind_path).args(["get", "clusters"]),
            Strategy::Fallback => CommandSpec::new(&self.minikube_path).args([
                "status",
                "--profile",
                cluster_name,
                "--format",
                "{{.Host}}",
            ]),
        }
    }

    /// Interpret the output of [`ClusterTooling::lookup`]. `kind` lists cluster names one per
    /// line; `minikube` prints the host state or a "not found" message. Both are line and
    /// substring checks only.
    pub fn interpret_lookup(
        &self,
        strategy: Strategy,
        cluster_name: &str,
        output: &CommandOutput,
    ) -> Presence {
        match strategy {
            Strategy::Primary => {
                if output.success() && output.stdout_lines().any(|line| line == cluster_name) {
                    Presence::Present { running: true }
                } else {
                    Presence::Absent
                }
            }
            Strategy::Fallback => {
                if output.contains("not found") || output.stdout.trim().is_empty() {
                    Presence::Absent
                } else {
                    Presence::Present {
                        running: output.stdout_lines().any(|line| line == "Running"),
                    }
                }
            }
        }
    }

    pub fn version(&self, strategy: Strategy) -> CommandSpec {
        CommandSpec::new(self.path(strategy)).arg("version")
    }

    /// Lists every cluster the tool knows about, for diagnostics.
    pub fn listing(&self, strategy: Strategy) -> CommandSpec {
        match strategy {
            Strategy::Primary => CommandSpec::new(&self.kind_path).args(["get", "clusters"]),
            Strategy::Fallback => CommandSpec::new(&self.minikube_path).args(["profile", "list"]),
        }
    }

    fn path(&self, strategy: Strategy) -> &str {
        match strategy {
            Strategy::Primary => &self.kind_path,
            Strategy::Fallback => &self.minikube_path,
        }
    }
}
