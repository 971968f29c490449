use super::error::{self, Result};
use super::EndpointTarget;
use crate::configuration::HarnessConfig;
use crate::constants::TUNNEL_BIND_ADDRESS;
use log::{debug, warn};
use snafu::ResultExt;
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// A started tunnel subprocess. Dropping it leaves the subprocess running; only teardown stops a
/// healthy tunnel.
pub trait TunnelChild: Debug + Send + 'static {
    fn pid(&self) -> u32;

    /// Returns `false` once the subprocess has exited.
    fn is_running(&mut self) -> bool;

    /// Stop a subprocess that must not outlive this session, e.g. because its PID could not be
    /// persisted.
    fn kill(&mut self);
}

/// Starts one long-running forwarding subprocess per [`EndpointTarget`].
#[async_trait::async_trait]
pub trait TunnelSpawner: Clone + Send + Sync + 'static {
    type Child: TunnelChild;

    /// Start forwarding `localhost:<local_port>` to the target's remote port, writing the
    /// subprocess output to `log_path`.
    async fn spawn(&self, target: &EndpointTarget, log_path: &Path) -> Result<Self::Child>;
}

/// Runs `kubectl port-forward` bound to the loopback interface.
#[derive(Debug, Clone)]
pub struct SystemTunnelSpawner {
    kubectl_path: String,
    namespace: String,
}

impl SystemTunnelSpawner {
    pub fn new<S1, S2>(kubectl_path: S1, namespace: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            kubectl_path: kubectl_path.into(),
            namespace: namespace.into(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(&config.kubectl_path, &config.namespace)
    }

    pub(crate) fn command(&self, target: &EndpointTarget) -> Command {
        let mut command = Command::new(&self.kubectl_path);
        command.args([
            "port-forward",
            "--address",
            TUNNEL_BIND_ADDRESS,
            "-n",
            &self.namespace,
            &target.resource,
            &format!("{}:{}", target.local_port, target.remote_port),
        ]);
        command
    }
}

#[async_trait::async_trait]
impl TunnelSpawner for SystemTunnelSpawner {
    type Child = SystemTunnelChild;

    async fn spawn(&self, target: &EndpointTarget, log_path: &Path) -> Result<Self::Child> {
        let context = error::TunnelSpawnFailedSnafu { id: &target.id };
        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent).await.context(context)?;
        }
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .context(context)?;
        let stderr = stdout.try_clone().context(context)?;

        let mut command = self.command(target);
        command
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            // Tunnels outlive this process and must not see signals sent to its group.
            .process_group(0);
        debug!("Running {:?}", command);
        let child = command.spawn().context(context)?;
        Ok(SystemTunnelChild { child })
    }
}

#[derive(Debug)]
pub struct SystemTunnelChild {
    child: Child,
}

impl TunnelChild for SystemTunnelChild {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!("Unable to kill tunnel process {}: {}", self.child.id(), e);
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::configuration::StaticTargetSpec;

    #[test]
    fn port_forward_arguments() {
        let spec: StaticTargetSpec = "web=svc/web:3000:80".parse().unwrap();
        let command =
            SystemTunnelSpawner::new("kubectl", "loco").command(&EndpointTarget::from_static(&spec));
        let args: Vec<_> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "port-forward",
                "--address",
                "127.0.0.1",
                "-n",
                "loco",
                "svc/web",
                "3000:80"
            ]
        );
    }

    #[tokio::test]
    async fn child_state_is_observable() {
        let dir = tempfile::TempDir::new().unwrap();
        // `sleep` rejects the port-forward arguments and exits right away.
        let spawner = SystemTunnelSpawner::new("sleep", "loco");
        let spec: StaticTargetSpec = "web=svc/web:3000:80".parse().unwrap();
        let log = dir.path().join("logs").join("tunnel-web.log");
        let mut child = spawner
            .spawn(&EndpointTarget::from_static(&spec), &log)
            .await
            .unwrap();
        assert!(child.pid() > 0);
        for _ in 0..50 {
            if !child.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        assert!(!child.is_running());
        assert!(log.exists());
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let dir = tempfile::TempDir::new().unwrap();
        let spawner = SystemTunnelSpawner::new("/nonexistent/kubectl", "loco");
        let spec: StaticTargetSpec = "web=svc/web:3000:80".parse().unwrap();
        let error = spawner
            .spawn(&EndpointTarget::from_static(&spec), &dir.path().join("t.log"))
            .await
            .unwrap_err();
        assert!(matches!(error, error::Error::TunnelSpawnFailed { .. }));
    }
}
