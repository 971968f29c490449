use lococtl_model::tunnel::Result;
use lococtl_model::{ProcessControl, Termination};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How a fake process reacts to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    ExitsOnTerm,
    ExitsOnKill,
    /// Survives even `SIGKILL`, e.g. a process stuck in uninterruptible sleep.
    Immortal,
}

/// A process table. Processes not in the table are not alive.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeProcessControl {
    processes: Arc<Mutex<HashMap<u32, Behavior>>>,
    signals: Arc<Mutex<Vec<(u32, Termination)>>>,
    matching: Vec<u32>,
}

impl FakeProcessControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, pid: u32, behavior: Behavior) -> Self {
        self.processes.lock().unwrap().insert(pid, behavior);
        self
    }

    /// PIDs returned by the orphan sweep.
    pub(crate) fn matching(mut self, pids: &[u32]) -> Self {
        self.matching = pids.to_vec();
        self
    }

    pub(crate) fn signals(&self) -> Vec<(u32, Termination)> {
        self.signals.lock().unwrap().clone()
    }

    pub(crate) fn alive(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.processes.lock().unwrap().keys().copied().collect();
        pids.sort_unstable();
        pids
    }
}

#[async_trait::async_trait]
impl ProcessControl for FakeProcessControl {
    fn is_alive(&self, pid: u32) -> bool {
        self.processes.lock().unwrap().contains_key(&pid)
    }

    fn signal(&self, pid: u32, termination: Termination) -> Result<()> {
        self.signals.lock().unwrap().push((pid, termination));
        let mut processes = self.processes.lock().unwrap();
        let exits = match processes.get(&pid) {
            Some(Behavior::ExitsOnTerm) => true,
            Some(Behavior::ExitsOnKill) => termination == Termination::Forced,
            Some(Behavior::Immortal) | None => false,
        };
        if exits {
            processes.remove(&pid);
        }
        Ok(())
    }

    async fn find_matching(&self, _pattern: &str) -> Result<Vec<u32>> {
        Ok(self.matching.clone())
    }
}
