/*!

The `command` module is the narrow interface through which every external tool (`kind`,
`minikube`, `kubectl`, `docker`, ...) is invoked. Callers describe an invocation with a
[`CommandSpec`] and receive a [`CommandOutput`]; they never see the process itself.

!*/

mod error;

pub use error::{Error, Result};
use log::{debug, trace, warn};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

/// Describes one invocation of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added to (not replacing) the environment of the calling process.
    pub env: BTreeMap<String, String>,
    /// When `None` the runner waits for as long as the program runs.
    pub timeout: Option<Duration>,
    /// When present, the command line and its output are appended to this file.
    pub log_path: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<S>(program: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Build a `CommandSpec` from a full argument vector, skipping empty entries. Returns `None`
    /// when nothing is left.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let mut argv = argv.iter().filter(|arg| !arg.trim().is_empty());
        let program = argv.next()?;
        Some(Self::new(program).args(argv))
    }

    pub fn arg<S>(mut self, arg: S) -> Self
    where
        S: Into<String>,
    {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn log_to<P>(mut self, path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        self.log_path = Some(path.into());
        self
    }

    /// The program and its arguments joined by spaces, for logging.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.command_line(), f)
    }
}

/// What an external program left behind once it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` if the program was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new<S1, S2>(code: i32, stdout: S1, stderr: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Non-empty, trimmed lines of stdout.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// Substring search over both output streams. Tools without structured output are only ever
    /// checked this way, and a match is a best-effort signal, not a contract.
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }

    /// A one-line description of a failed invocation.
    pub fn failure_summary(&self) -> String {
        let code = self
            .code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        match self.stderr.lines().rev().find(|line| !line.trim().is_empty()) {
            Some(line) => format!("exit {}: {}", code, line.trim()),
            None => format!("exit {}", code),
        }
    }
}

/// The interface through which every external command is executed.
#[async_trait::async_trait]
pub trait CommandRunner: Clone + Send + Sync + 'static {
    /// Run `spec` to completion. If `spec.timeout` elapses the program is killed and
    /// [`Error::Timeout`] is returned.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait::async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Running '{}'", spec);
        let child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout kills the program.
            .kill_on_drop(true)
            .spawn()
            .context(error::SpawnSnafu {
                program: &spec.program,
            })?;

        let wait = child.wait_with_output();
        let output = match spec.timeout {
            None => wait.await,
            Some(duration) => match timeout(duration, wait).await {
                Ok(output) => output,
                Err(_) => {
                    warn!("'{}' timed out after {:?}", spec, duration);
                    if let Some(path) = &spec.log_path {
                        let note = format!("$ {}\n<timed out after {:?}>\n", spec, duration);
                        append_log(path, &note).await?;
                    }
                    return error::TimeoutSnafu {
                        program: &spec.program,
                        duration,
                    }
                    .fail();
                }
            },
        }
        .context(error::WaitSnafu {
            program: &spec.program,
        })?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(
            "'{}' exited with {:?}\nstdout:\n{}\nstderr:\n{}",
            spec,
            output.code,
            output.stdout,
            output.stderr
        );
        if let Some(path) = &spec.log_path {
            append_log(path, &render_log_entry(spec, &output)).await?;
        }
        Ok(output)
    }
}

fn render_log_entry(spec: &CommandSpec, output: &CommandOutput) -> String {
    format!(
        "$ {}\n<exit {:?}>\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
        spec, output.code, output.stdout, output.stderr
    )
}

async fn append_log(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context(error::LogSnafu { path })?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .context(error::LogSnafu { path })?;
    file.write_all(text.as_bytes())
        .await
        .context(error::LogSnafu { path })?;
    file.flush().await.context(error::LogSnafu { path })
}
