/*!

Mock implementations of [`CommandRunner`], [`TunnelSpawner`] and [`ProcessControl`] so that the
provisioning and tunnel logic can be tested without `kind`, `minikube`, `kubectl` or a cluster.

!*/

#![allow(dead_code)]

pub(crate) mod process_control;
pub(crate) mod runner;
pub(crate) mod spawner;

use lococtl_model::HarnessConfig;
use std::path::Path;

/// A configuration whose state lives in `dir` and which never waits.
pub(crate) fn config(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        state_dir: dir.join("state"),
        settle_secs: 0,
        grace_secs: 0,
        probe: false,
        ..Default::default()
    }
}

/// Lets `RUST_LOG` show library logs while debugging a test.
pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
