use lococtl_model::command::{Error, Result};
use lococtl_model::{CommandOutput, CommandRunner, CommandSpec};
use std::sync::{Arc, Mutex};

/// How the [`ScriptedRunner`] answers a command.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
}

impl Reply {
    pub(crate) fn ok(stdout: &str) -> Self {
        Reply::Exit {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub(crate) fn fail(code: i32, stderr: &str) -> Self {
        Reply::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<(String, Reply)>,
    calls: Vec<String>,
}

/// Answers each command with the reply of the first rule whose text appears in the command line,
/// or a successful empty exit if none does. Every command line is recorded.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, needle: &str, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .rules
            .push((needle.to_string(), reply));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    /// The index of the first recorded command line containing `needle`.
    pub(crate) fn position(&self, needle: &str) -> Option<usize> {
        self.calls().iter().position(|call| call.contains(needle))
    }

    pub(crate) fn count(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }
}

#[async_trait::async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let command_line = spec.command_line();
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(command_line.clone());
            script
                .rules
                .iter()
                .find(|(needle, _)| command_line.contains(needle.as_str()))
                .map(|(_, reply)| reply.clone())
        };
        match reply.unwrap_or_else(|| Reply::ok("")) {
            Reply::Exit {
                code,
                stdout,
                stderr,
            } => Ok(CommandOutput::new(code, stdout, stderr)),
            Reply::Timeout => Err(Error::Timeout {
                program: spec.program.clone(),
                duration: spec.timeout.unwrap_or_default(),
            }),
        }
    }
}
