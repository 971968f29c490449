use super::error::{self, Result};
use super::EndpointTarget;
use log::{info, warn};
use serde::Serialize;
use serde_plain::derive_display_from_serialize;
use std::path::PathBuf;

/// The lifecycle of one tunnel subprocess.
///
/// `Starting -> Running -> Terminated` is the normal path; a tunnel that exits before the settle
/// interval ends goes `Starting -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelState {
    Starting,
    Running,
    Failed,
    Terminated,
}

derive_display_from_serialize!(TunnelState);

impl TunnelState {
    pub fn can_become(self, next: TunnelState) -> bool {
        matches!(
            (self, next),
            (TunnelState::Starting, TunnelState::Running)
                | (TunnelState::Starting, TunnelState::Failed)
                | (TunnelState::Running, TunnelState::Terminated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TunnelState::Failed | TunnelState::Terminated)
    }
}

/// A tunnel subprocess and the target it forwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelProcess {
    pub target: EndpointTarget,
    /// `None` if the subprocess could not be started.
    pub pid: Option<u32>,
    pub log_path: PathBuf,
    state: TunnelState,
}

impl TunnelProcess {
    pub fn new(target: EndpointTarget, pid: Option<u32>, log_path: PathBuf) -> Self {
        info!(
            "Tunnel '{}' ({} -> localhost:{}) is {}, pid {:?}",
            target.id,
            target.resource,
            target.local_port,
            TunnelState::Starting,
            pid
        );
        Self {
            target,
            pid,
            log_path,
            state: TunnelState::Starting,
        }
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TunnelState::Running
    }

    /// Move to `next`, logging the change. Transitions other than those described on
    /// [`TunnelState`] are rejected and leave the state unchanged.
    pub fn transition(&mut self, next: TunnelState) -> Result<()> {
        snafu::ensure!(
            self.state.can_become(next),
            error::InvalidTransitionSnafu {
                id: &self.target.id,
                from: self.state,
                to: next,
            }
        );
        let message = format!(
            "Tunnel '{}' (pid {:?}) {} -> {}",
            self.target.id, self.pid, self.state, next
        );
        if next == TunnelState::Failed {
            warn!("{} (log: {})", message, self.log_path.display());
        } else {
            info!("{}", message);
        }
        self.state = next;
        Ok(())
    }
}
