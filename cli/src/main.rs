/*!

This is the command line interface for provisioning the Loco test cluster and managing the tunnels
that expose its services on localhost.

Configuration comes from `LOCO_*` environment variables; see `HarnessConfig`.

!*/

mod create;
mod destroy;
mod registry;
mod start;
mod status;
mod stop;

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use lococtl_model::HarnessConfig;

/// The command line interface for the Loco test cluster and its tunnels.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Create the cluster, falling back through the configured strategies.
    Create(create::Create),
    /// Destroy the cluster with the strategy that created it.
    Destroy(destroy::Destroy),
    /// Report whether the cluster exists and which strategy owns it.
    Status(status::Status),
    /// Start a tunnel for every service and worker replica and publish the registry.
    Start(start::Start),
    /// Stop every tunnel recorded by `start`.
    Stop(stop::Stop),
    /// Print the published registry.
    Registry(registry::Registry),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = HarnessConfig::from_env()?;
    match args.command {
        Command::Create(create) => create.run(config).await,
        Command::Destroy(destroy) => destroy.run(config).await,
        Command::Status(status) => status.run(config).await,
        Command::Start(start) => start.run(config).await,
        Command::Stop(stop) => stop.run(config).await,
        Command::Registry(registry) => registry.run(config).await,
    }
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use default log level for this workspace only.
            Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level)
                .filter(Some("lococtl_model"), level)
                .init();
        }
    }
}

/// Render `value` as pretty JSON on stdout.
pub(crate) fn print_json<T>(value: &T) -> Result<()>
where
    T: serde::Serialize + ?Sized,
{
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
