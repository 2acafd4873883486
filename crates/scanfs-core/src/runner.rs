//! External command execution boundary.
//!
//! Every external tool the pipeline touches (cp, losetup, kpartx, the LVM
//! suite, mount, blkid, the check utilities) goes through the
//! [`CommandRunner`] trait with an explicit argument vector. No shell is
//! ever involved; the exit status is the sole success signal.

use scanfs_common::{Error, Result};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::process::Command;

/// Captured outcome of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Raw exit status; -1 if the process died to a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful empty output, the common case for device-mapper tools.
    pub fn ok() -> Self {
        Self::with_stdout("")
    }

    /// Successful output with canned stdout.
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        CommandOutput {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failing output with the given status.
    pub fn failed(status: i32) -> Self {
        CommandOutput {
            status,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Whitespace-separated stdout fields.
    pub fn fields(&self) -> Vec<String> {
        self.stdout.split_whitespace().map(str::to_string).collect()
    }
}

/// Trait for running external commands (the sole side-effect boundary).
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runner backed by real processes.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| Error::CommandSpawn {
                program: program.to_string(),
                source,
            })?;
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Scripted runner (used for tests and scaffolding).
///
/// Responses are keyed by the full command line; unmatched commands
/// succeed with empty output. Every invocation is recorded so tests can
/// assert on ordering and resource balance.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: RefCell<HashMap<String, VecDeque<CommandOutput>>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned response for an exact command line.
    ///
    /// Repeated calls for the same line queue responses in order; once the
    /// queue drains, the last response repeats.
    pub fn respond(&self, command_line: &str, output: CommandOutput) {
        self.responses
            .borrow_mut()
            .entry(command_line.to_string())
            .or_default()
            .push_back(output);
    }

    /// All recorded command lines, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of recorded invocations whose command line starts with `prefix`.
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut line = String::from(program);
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.calls.borrow_mut().push(line.clone());

        let mut responses = self.responses.borrow_mut();
        match responses.get_mut(&line) {
            Some(queue) => {
                let output = if queue.len() > 1 {
                    queue.pop_front().unwrap_or_else(CommandOutput::ok)
                } else {
                    queue.front().cloned().unwrap_or_else(CommandOutput::ok)
                };
                Ok(output)
            }
            None => Ok(CommandOutput::ok()),
        }
    }
}
