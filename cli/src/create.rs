use anyhow::Result;
use clap::Parser;
use lococtl_model::{ClusterProvisioner, HarnessConfig, Strategy, SystemCommandRunner};
use std::time::Duration;

/// Create the cluster. Exits non-zero, naming the diagnostics report, if every strategy fails.
#[derive(Debug, Parser)]
pub(crate) struct Create {
    /// Strategies to try, in order. Overrides `LOCO_STRATEGIES`.
    #[clap(long = "strategy")]
    strategies: Vec<Strategy>,

    /// Seconds each strategy may take. Overrides `LOCO_ATTEMPT_TIMEOUT_SECS`.
    #[clap(long = "timeout")]
    timeout_secs: Option<u64>,
}

impl Create {
    pub(crate) async fn run(self, config: HarnessConfig) -> Result<()> {
        let strategies = if self.strategies.is_empty() {
            config.strategies.clone()
        } else {
            self.strategies
        };
        let timeout = self
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.attempt_timeout());

        let provisioner = ClusterProvisioner::new(&config, SystemCommandRunner::new());
        let handle = provisioner
            .create(&config.cluster_name, &strategies, timeout)
            .await?;
        println!(
            "Cluster '{}' is ready, created with the {} strategy ({}).",
            handle.name,
            handle.chosen_strategy,
            handle.chosen_strategy.tool()
        );
        Ok(())
    }
}
