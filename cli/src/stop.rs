use anyhow::Result;
use clap::Parser;
use lococtl_model::{HarnessConfig, SessionTeardown, SystemCommandRunner, SystemProcessControl};

/// Stop every recorded tunnel and remove the session state. This always succeeds; problems are
/// logged.
#[derive(Debug, Parser)]
pub(crate) struct Stop {
    /// Output the teardown report in JSON format.
    #[clap(long = "json")]
    json: bool,
}

impl Stop {
    pub(crate) async fn run(self, config: HarnessConfig) -> Result<()> {
        let runner = SystemCommandRunner::new();
        let control = SystemProcessControl::new(runner.clone(), config.query_timeout());
        let report = SessionTeardown::new(&config, runner, control).stop().await;
        if self.json {
            return crate::print_json(&report);
        }
        if report.already_clean {
            println!("No tunnel session is running.");
        } else {
            println!(
                "Stopped {} tunnel(s) ({} forced), {} orphan(s); {} could not be stopped.",
                report.terminated.len() + report.forced.len(),
                report.forced.len(),
                report.orphans.len(),
                report.survivors.len()
            );
        }
        Ok(())
    }
}
