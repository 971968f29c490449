use super::Strategy;
use snafu::Snafu;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for cluster provisioning.
///
/// `AttemptTimeout` and `AttemptFailed` describe a single strategy attempt and are absorbed by the
/// [`ClusterProvisioner`](super::ClusterProvisioner); only `ProvisioningExhausted` and `State`
/// reach callers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("The {} strategy did not finish within {:?}", strategy, timeout))]
    AttemptTimeout { strategy: Strategy, timeout: Duration },

    #[snafu(display("The {} strategy failed: {}", strategy, reason))]
    AttemptFailed { strategy: Strategy, reason: String },

    #[snafu(display(
        "Unable to provision cluster '{}', tried {}: {} (diagnostics: {})",
        cluster,
        join(attempted),
        last_errors.join("; "),
        diagnostics
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "not written".to_string())
    ))]
    ProvisioningExhausted {
        cluster: String,
        attempted: Vec<Strategy>,
        last_errors: Vec<String>,
        diagnostics: Option<PathBuf>,
    },

    #[snafu(display("Unable to {}: {}", action, source))]
    State {
        action: String,
        source: crate::state::Error,
    },
}

impl Error {
    /// The diagnostics report written when every strategy failed.
    pub fn diagnostics_path(&self) -> Option<&Path> {
        match self {
            Error::ProvisioningExhausted { diagnostics, .. } => diagnostics.as_deref(),
            _ => None,
        }
    }
}

fn join(strategies: &[Strategy]) -> String {
    strategies
        .iter()
        .map(Strategy::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
