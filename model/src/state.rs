/*!

Durable, file-backed records. The orchestrator commonly exits between provisioning and teardown
(for example at a CI step boundary), so everything teardown depends on lives here rather than in
memory.

!*/

use crate::cluster::{ClusterHandle, Strategy};
use crate::constants::{
    CLUSTER_HANDLE_EXTENSION, PID_SET_FILENAME, REGISTRY_FILENAME,
};
use crate::tunnel::SessionRegistry;
use log::{debug, warn};
use snafu::{ResultExt, Snafu};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to {} '{}': {}", action, path.display(), source))]
    Io {
        action: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to serialize '{}': {}", path.display(), source))]
    JsonSerialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Unable to parse '{}': {}", path.display(), source))]
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// The directory holding every persisted record.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new<P>(root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cluster_handles(&self) -> ClusterHandleStore {
        ClusterHandleStore::new(&self.root)
    }

    pub fn pid_set(&self) -> PidSetFile {
        PidSetFile::new(self.root.join(PID_SET_FILENAME))
    }

    pub fn registry(&self) -> RegistryFile {
        RegistryFile::new(self.root.join(REGISTRY_FILENAME))
    }
}

/// Stores one [`ClusterHandle`] per cluster name as `cluster-<name>.strategy`, containing the
/// strategy text (e.g. `fallback`).
#[derive(Debug, Clone)]
pub struct ClusterHandleStore {
    dir: PathBuf,
}

impl ClusterHandleStore {
    pub fn new<P>(dir: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { dir: dir.into() }
    }

    pub fn path(&self, cluster_name: &str) -> PathBuf {
        self.dir.join(format!(
            "cluster-{}.{}",
            cluster_name, CLUSTER_HANDLE_EXTENSION
        ))
    }

    /// Read the handle for `cluster_name`. A record that cannot be read or does not name a known
    /// strategy is reported as absent.
    pub async fn read(&self, cluster_name: &str) -> Option<ClusterHandle> {
        let path = self.path(cluster_name);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Unable to read cluster record '{}': {}", path.display(), e);
                return None;
            }
        };
        match text.trim().parse::<Strategy>() {
            Ok(strategy) => Some(ClusterHandle::new(cluster_name, strategy)),
            Err(e) => {
                warn!(
                    "Ignoring cluster record '{}' with unknown strategy '{}': {}",
                    path.display(),
                    text.trim(),
                    e
                );
                None
            }
        }
    }

    pub async fn write(&self, handle: &ClusterHandle) -> Result<()> {
        let path = self.path(&handle.name);
        create_parent(&path).await?;
        tokio::fs::write(&path, format!("{}\n", handle.chosen_strategy))
            .await
            .context(IoSnafu {
                action: "write cluster record",
                path: &path,
            })?;
        debug!("Recorded cluster '{}' in '{}'", handle.name, path.display());
        Ok(())
    }

    /// Remove the record. Returns `false` if there was nothing to remove.
    pub async fn delete(&self, cluster_name: &str) -> Result<bool> {
        remove_if_present(&self.path(cluster_name), "delete cluster record").await
    }
}

/// The whitespace-separated list of tunnel PIDs. This is the only state that session teardown
/// depends on.
///
/// Clones share a single writer lock, so concurrent appends from one process never interleave or
/// truncate the set.
#[derive(Debug, Clone)]
pub struct PidSetFile {
    path: PathBuf,
    writer: Arc<Mutex<()>>,
}

impl PidSetFile {
    pub fn new<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            path: path.into(),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a single PID and flush it to disk before returning.
    pub async fn append(&self, pid: u32) -> Result<()> {
        let _guard = self.writer.lock().await;
        create_parent(&self.path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(IoSnafu {
                action: "open pid set",
                path: &self.path,
            })?;
        file.write_all(format!("{}\n", pid).as_bytes())
            .await
            .context(IoSnafu {
                action: "append to pid set",
                path: &self.path,
            })?;
        file.sync_data().await.context(IoSnafu {
            action: "sync pid set",
            path: &self.path,
        })
    }

    /// Returns `None` if no PID set has been persisted.
    pub async fn read(&self) -> Result<Option<Vec<u32>>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).context(IoSnafu {
                    action: "read pid set",
                    path: &self.path,
                })
            }
        };
        let mut pids = Vec::new();
        for token in text.split_whitespace() {
            match token.parse::<u32>() {
                Ok(pid) if pid > 0 => {
                    if !pids.contains(&pid) {
                        pids.push(pid)
                    }
                }
                _ => warn!(
                    "Ignoring invalid pid '{}' in '{}'",
                    token,
                    self.path.display()
                ),
            }
        }
        Ok(Some(pids))
    }

    /// Drop `pids` from the set, rewriting it whole. Returns the PIDs that remain.
    pub async fn remove(&self, pids: &[u32]) -> Result<Vec<u32>> {
        let _guard = self.writer.lock().await;
        let kept: Vec<u32> = match self.read().await? {
            Some(recorded) => recorded
                .into_iter()
                .filter(|pid| !pids.contains(pid))
                .collect(),
            None => return Ok(Vec::new()),
        };
        let text: String = kept.iter().map(|pid| format!("{}\n", pid)).collect();
        let tmp = self.path.with_extension("pids.tmp");
        tokio::fs::write(&tmp, text).await.context(IoSnafu {
            action: "write pid set",
            path: &tmp,
        })?;
        tokio::fs::rename(&tmp, &self.path).await.context(IoSnafu {
            action: "replace pid set",
            path: &self.path,
        })?;
        Ok(kept)
    }

    pub async fn delete(&self) -> Result<bool> {
        let _guard = self.writer.lock().await;
        remove_if_present(&self.path, "delete pid set").await
    }
}

/// The externally consumed endpoint directory, a JSON array of `{id, streamUrl}` objects.
#[derive(Debug, Clone)]
pub struct RegistryFile {
    path: PathBuf,
}

impl RegistryFile {
    pub fn new<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the registry through a temporary file so that readers never observe a partial
    /// directory.
    pub async fn write(&self, registry: &SessionRegistry) -> Result<()> {
        create_parent(&self.path).await?;
        let json = serde_json::to_string_pretty(registry).context(JsonSerializeSnafu {
            path: &self.path,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.context(IoSnafu {
            action: "write registry",
            path: &tmp,
        })?;
        tokio::fs::rename(&tmp, &self.path).await.context(IoSnafu {
            action: "replace registry",
            path: &self.path,
        })
    }

    pub async fn read(&self) -> Result<Option<SessionRegistry>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).context(IoSnafu {
                    action: "read registry",
                    path: &self.path,
                })
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .context(JsonParseSnafu { path: &self.path })
    }

    pub async fn delete(&self) -> Result<bool> {
        remove_if_present(&self.path, "delete registry").await
    }
}

async fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .context(IoSnafu {
                action: "create directory",
                path: parent,
            }),
        _ => Ok(()),
    }
}

pub(crate) async fn remove_if_present(path: &Path, action: &str) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(IoSnafu { action, path }),
    }
}
