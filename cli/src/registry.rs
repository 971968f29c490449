use anyhow::{Context, Result};
use clap::Parser;
use lococtl_model::{HarnessConfig, StateDir};

/// Print the registry published by `start`.
#[derive(Debug, Parser)]
pub(crate) struct Registry {
    /// Output the registry exactly as consumers read it.
    #[clap(long = "json")]
    json: bool,
}

impl Registry {
    pub(crate) async fn run(self, config: HarnessConfig) -> Result<()> {
        let file = StateDir::new(config.state_dir()).registry();
        let registry = file.read().await?.with_context(|| {
            format!(
                "No registry at '{}', has a session been started?",
                file.path().display()
            )
        })?;
        if self.json {
            crate::print_json(&registry)
        } else {
            println!("{}", registry);
            Ok(())
        }
    }
}
