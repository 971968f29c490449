use anyhow::Result;
use clap::Parser;
use lococtl_model::{ClusterProvisioner, DestroyOutcome, HarnessConfig, SystemCommandRunner};

/// Destroy the cluster. This always succeeds; problems are logged.
#[derive(Debug, Parser)]
pub(crate) struct Destroy {
    /// Output the outcome in JSON format.
    #[clap(long = "json")]
    json: bool,
}

impl Destroy {
    pub(crate) async fn run(self, config: HarnessConfig) -> Result<()> {
        let provisioner = ClusterProvisioner::new(&config, SystemCommandRunner::new());
        let outcome = provisioner.destroy(&config.cluster_name).await;
        if self.json {
            return crate::print_json(&outcome);
        }
        match outcome {
            DestroyOutcome::Recorded { strategy, clean } => println!(
                "Cluster '{}' destroyed with the {} strategy{}.",
                config.cluster_name,
                strategy,
                if clean { "" } else { " (with errors, see the log)" }
            ),
            DestroyOutcome::Unrecorded { succeeded, .. } => println!(
                "Cluster '{}' was not recorded; destroy succeeded for {} of the known strategies.",
                config.cluster_name,
                succeeded.len()
            ),
        }
        Ok(())
    }
}
