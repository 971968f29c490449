use anyhow::Result;
use clap::Parser;
use lococtl_model::{ClusterProvisioner, HarnessConfig, SystemCommandRunner};

/// Check the status of the cluster.
#[derive(Debug, Parser)]
pub(crate) struct Status {
    /// Output the results in JSON format.
    #[clap(long = "json")]
    json: bool,
}

impl Status {
    pub(crate) async fn run(self, config: HarnessConfig) -> Result<()> {
        let provisioner = ClusterProvisioner::new(&config, SystemCommandRunner::new());
        let status = provisioner.status(&config.cluster_name).await;
        if self.json {
            crate::print_json(&status)
        } else {
            println!("Cluster '{}': {}", config.cluster_name, status);
            Ok(())
        }
    }
}
