use super::{ClusterTooling, Strategy};
use crate::command::{CommandRunner, CommandSpec};
use crate::configuration::HarnessConfig;
use crate::constants::{
    DIAGNOSTICS_PREFIX, DIAGNOSTICS_RECENT_LOGS, DIAGNOSTICS_TITLE, UNAVAILABLE,
};
use chrono::Utc;
use log::{error, info, warn};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Gathers a fixed set of host and cluster facts into one report after every provisioning
/// strategy has failed. Each fact is gathered independently; one that cannot be gathered is
/// replaced by a placeholder.
#[derive(Debug, Clone)]
pub struct DiagnosticsCollector<R>
where
    R: CommandRunner,
{
    runner: R,
    tooling: ClusterTooling,
    docker_path: String,
    query_timeout: Duration,
}

impl<R> DiagnosticsCollector<R>
where
    R: CommandRunner,
{
    pub fn new(config: &HarnessConfig, runner: R) -> Self {
        Self {
            runner,
            tooling: ClusterTooling::from_config(config),
            docker_path: config.docker_path.clone(),
            query_timeout: config.query_timeout(),
        }
    }

    /// Write a timestamped report into `output_dir` and return its path. This never fails; if the
    /// report itself cannot be written the problem is logged and `None` is returned.
    pub async fn collect(&self, strategies: &[Strategy], output_dir: &Path) -> Option<PathBuf> {
        let now = Utc::now();
        let mut report = String::new();
        let _ = writeln!(report, "{}", DIAGNOSTICS_TITLE);
        let _ = writeln!(report, "generated: {}", now.to_rfc3339());
        let _ = writeln!(
            report,
            "strategies: {}",
            strategies
                .iter()
                .map(|strategy| format!("{} ({})", strategy, strategy.tool()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        for spec in self.facts(strategies) {
            let body = self.query(&spec).await;
            let _ = write!(report, "\n== {} ==\n{}\n", spec, body.trim_end());
        }

        let _ = write!(
            report,
            "\n== recent files in {} ==\n{}\n",
            output_dir.display(),
            recent_files(output_dir).await
        );

        let path = output_dir.join(format!(
            "{}{}.txt",
            DIAGNOSTICS_PREFIX,
            now.format("%Y%m%dT%H%M%SZ")
        ));
        if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
            error!(
                "Unable to create diagnostics directory '{}': {}",
                output_dir.display(),
                e
            );
            return None;
        }
        match tokio::fs::write(&path, report).await {
            Ok(()) => {
                info!("Wrote diagnostics report '{}'", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Unable to write diagnostics report '{}': {}", path.display(), e);
                None
            }
        }
    }

    fn facts(&self, strategies: &[Strategy]) -> Vec<CommandSpec> {
        let mut facts = Vec::new();
        for &strategy in strategies {
            facts.push(self.tooling.listing(strategy));
            facts.push(self.tooling.version(strategy));
        }
        facts.push(CommandSpec::new(&self.docker_path).arg("info"));
        facts.push(CommandSpec::new(&self.docker_path).args(["ps", "-a"]));
        facts.push(CommandSpec::new("df").arg("-h"));
        facts.push(CommandSpec::new("free").arg("-m"));
        facts
    }

    async fn query(&self, spec: &CommandSpec) -> String {
        let spec = spec.clone().timeout(self.query_timeout);
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => output.stdout,
            Ok(output) => {
                warn!("Diagnostics query '{}' failed: {}", spec, output.failure_summary());
                format!(
                    "{} {}\n{}{}",
                    UNAVAILABLE,
                    output.failure_summary(),
                    output.stdout,
                    output.stderr
                )
            }
            Err(e) => {
                warn!("Diagnostics query '{}' failed: {}", spec, e);
                format!("{} {}", UNAVAILABLE, e)
            }
        }
    }
}

/// The most recently modified files in `dir`, newest first.
async fn recent_files(dir: &Path) -> String {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => return format!("{} {}", UNAVAILABLE, e),
    };
    let mut files = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let modified = match entry.metadata().await {
                    Ok(metadata) if metadata.is_file() => {
                        metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)
                    }
                    _ => continue,
                };
                files.push((modified, entry.file_name().to_string_lossy().into_owned()));
            }
            Ok(None) => break,
            Err(e) => return format!("{} {}", UNAVAILABLE, e),
        }
    }
    if files.is_empty() {
        return "(none)".to_string();
    }
    files.sort_by(|a, b| b.0.cmp(&a.0));
    files
        .into_iter()
        .take(DIAGNOSTICS_RECENT_LOGS)
        .map(|(modified, name)| {
            let modified: chrono::DateTime<Utc> = modified.into();
            format!("{}  {}", modified.to_rfc3339(), name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
