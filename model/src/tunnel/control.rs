use super::error::{self, Result};
use crate::command::{CommandRunner, CommandSpec};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use snafu::{OptionExt, ResultExt};
use std::time::Duration;

/// The two phases of tunnel termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `SIGTERM`
    Graceful,
    /// `SIGKILL`
    Forced,
}

impl Termination {
    fn signal(self) -> Signal {
        match self {
            Termination::Graceful => Signal::SIGTERM,
            Termination::Forced => Signal::SIGKILL,
        }
    }
}

/// Observes and signals processes by PID. Teardown runs in a process that did not start the
/// tunnels, so it cannot rely on child handles.
#[async_trait::async_trait]
pub trait ProcessControl: Clone + Send + Sync + 'static {
    fn is_alive(&self, pid: u32) -> bool;

    /// Signalling a process that has already exited is not an error.
    fn signal(&self, pid: u32, termination: Termination) -> Result<()>;

    /// PIDs of processes, other than this one, whose command line matches `pattern`.
    async fn find_matching(&self, pattern: &str) -> Result<Vec<u32>>;
}

/// Signals processes with `kill(2)` and searches for them with `pgrep -f`.
#[derive(Debug, Clone)]
pub struct SystemProcessControl<R>
where
    R: CommandRunner,
{
    runner: R,
    query_timeout: Duration,
}

impl<R> SystemProcessControl<R>
where
    R: CommandRunner,
{
    pub fn new(runner: R, query_timeout: Duration) -> Self {
        Self {
            runner,
            query_timeout,
        }
    }
}

fn to_pid(pid: u32) -> Result<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
        .context(error::InvalidPidSnafu { pid })
}

#[async_trait::async_trait]
impl<R> ProcessControl for SystemProcessControl<R>
where
    R: CommandRunner,
{
    fn is_alive(&self, pid: u32) -> bool {
        match to_pid(pid) {
            // Signal 0 checks for existence. EPERM means it exists but belongs to someone else.
            Ok(pid) => matches!(kill(pid, None), Ok(()) | Err(Errno::EPERM)),
            Err(_) => false,
        }
    }

    fn signal(&self, pid: u32, termination: Termination) -> Result<()> {
        match kill(to_pid(pid)?, termination.signal()) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e).context(error::SignalSnafu { pid }),
        }
    }

    async fn find_matching(&self, pattern: &str) -> Result<Vec<u32>> {
        let spec = CommandSpec::new("pgrep")
            .args(["-f", pattern])
            .timeout(self.query_timeout);
        let sweep = |reason: String| error::SweepSnafu { pattern, reason };
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| sweep(e.to_string()).build())?;
        match output.code {
            Some(0) => {}
            // pgrep exits 1 when nothing matches.
            Some(1) => return Ok(Vec::new()),
            _ => return sweep(output.failure_summary()).fail(),
        }
        let own_pid = std::process::id();
        Ok(output
            .stdout_lines()
            .filter_map(|line| line.parse::<u32>().ok())
            .filter(|pid| *pid != own_pid)
            .collect())
    }
}
