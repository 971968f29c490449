use lococtl_model::tunnel::{Error, Result};
use lococtl_model::{EndpointTarget, TunnelChild, TunnelSpawner};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Pretends to start tunnels. Targets listed in `fail` cannot be started and targets listed in
/// `die` exit before the settle interval ends.
#[derive(Debug, Clone)]
pub(crate) struct FakeSpawner {
    next_pid: Arc<AtomicU32>,
    fail: HashSet<String>,
    die: HashSet<String>,
    spawned: Arc<Mutex<Vec<(String, u32)>>>,
    killed: Arc<Mutex<Vec<u32>>>,
}

impl FakeSpawner {
    pub(crate) fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(1000)),
            fail: HashSet::new(),
            die: HashSet::new(),
            spawned: Default::default(),
            killed: Default::default(),
        }
    }

    pub(crate) fn failing(mut self, id: &str) -> Self {
        self.fail.insert(id.to_string());
        self
    }

    pub(crate) fn dying(mut self, id: &str) -> Self {
        self.die.insert(id.to_string());
        self
    }

    /// `(target id, pid)` of every started tunnel.
    pub(crate) fn spawned(&self) -> Vec<(String, u32)> {
        self.spawned.lock().unwrap().clone()
    }

    pub(crate) fn killed(&self) -> Vec<u32> {
        self.killed.lock().unwrap().clone()
    }
}

#[derive(Debug)]
pub(crate) struct FakeChild {
    pid: u32,
    running: bool,
    killed: Arc<Mutex<Vec<u32>>>,
}

impl TunnelChild for FakeChild {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_running(&mut self) -> bool {
        self.running
    }

    fn kill(&mut self) {
        self.running = false;
        self.killed.lock().unwrap().push(self.pid);
    }
}

#[async_trait::async_trait]
impl TunnelSpawner for FakeSpawner {
    type Child = FakeChild;

    async fn spawn(&self, target: &EndpointTarget, _log_path: &Path) -> Result<Self::Child> {
        if self.fail.contains(&target.id) {
            return Err(Error::TunnelSpawnFailed {
                id: target.id.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            });
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.spawned.lock().unwrap().push((target.id.clone(), pid));
        Ok(FakeChild {
            pid,
            running: !self.die.contains(&target.id),
            killed: self.killed.clone(),
        })
    }
}
