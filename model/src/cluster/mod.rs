/*!

The `cluster` module provisions and destroys the test cluster.

!*/

mod attempt;
mod diagnostics;
mod error;
mod provisioner;
mod strategy;

pub use attempt::{AttemptResult, StrategyAttempt};
pub use diagnostics::DiagnosticsCollector;
pub use error::{Error, Result};
pub use provisioner::{ClusterProvisioner, ClusterStatus, DestroyOutcome};
use serde::Serialize;
pub use strategy::{ClusterTooling, Presence, Strategy};

/// The durable record of a cluster provisioned by this orchestrator. Its existence means the
/// cluster was created with `chosen_strategy`; a cluster without a record has no chosen strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterHandle {
    pub name: String,
    pub chosen_strategy: Strategy,
}

impl ClusterHandle {
    pub fn new<S>(name: S, chosen_strategy: Strategy) -> Self
    where
        S: Into<String>,
    {
        Self {
            name: name.into(),
            chosen_strategy,
        }
    }
}
