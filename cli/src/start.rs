use anyhow::Result;
use clap::Parser;
use lococtl_model::{
    HarnessConfig, ReplicaSource, SystemCommandRunner, SystemTunnelSpawner, TunnelSessionManager,
    WorkerSpec,
};

/// Start the tunnels and publish the registry. Tunnels that fail to come up are logged and left
/// out of the registry.
#[derive(Debug, Parser)]
pub(crate) struct Start {
    /// Tunnel this many worker replicas instead of reading the workload's replica count.
    #[clap(long = "replicas")]
    replicas: Option<u32>,

    /// Output the session in JSON format.
    #[clap(long = "json")]
    json: bool,
}

impl Start {
    pub(crate) async fn run(self, config: HarnessConfig) -> Result<()> {
        let mut worker = WorkerSpec::from_config(&config);
        if let Some(replicas) = self.replicas {
            worker.replicas = ReplicaSource::Fixed(replicas);
        }
        let manager = TunnelSessionManager::new(
            &config,
            SystemCommandRunner::new(),
            SystemTunnelSpawner::from_config(&config),
        );
        let session = manager.start(&config.static_targets, &worker).await?;

        if self.json {
            return crate::print_json(&session);
        }
        println!("{}", session.registry);
        for process in session.failed() {
            println!(
                "Tunnel '{}' did not start, see '{}'",
                process.target.id,
                process.log_path.display()
            );
        }
        Ok(())
    }
}
