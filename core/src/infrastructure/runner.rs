//! Command runner abstraction for executing external tools.
//!
//! `CommandRunner` is the trait every swarm component uses to invoke
//! docker-machine, docker-compose and docker. `ProcessRunner` is the
//! production implementation; `MockRunner` (in `mock`) is the test double.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

use crate::error::{Error, Result};

use super::args::split_args;


// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

/// How a single invocation should behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Fail with `Error::Command` on a non-zero exit. When false the captured
    /// output is returned regardless of the exit code.
    pub raise_on_error: bool,
    /// Hand `"<program> <args>"` to `sh -c` instead of splitting `args`.
    pub use_shell: bool,
    /// Echo every output line to stdout as it arrives.
    pub stream_output: bool,
    /// Variables added to the inherited environment.
    pub extra_env: Vec<(String, String)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            raise_on_error: true,
            use_shell: false,
            stream_output: true,
            extra_env: Vec::new(),
        }
    }
}

impl RunOptions {
    /// Raise on error, do not stream.
    pub fn quiet() -> Self {
        RunOptions {
            stream_output: false,
            ..Self::default()
        }
    }

    pub fn tolerant(mut self) -> Self {
        self.raise_on_error = false;
        self
    }

    pub fn shell(mut self) -> Self {
        self.use_shell = true;
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.extra_env = env;
        self
    }
}


// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

/// Trait for executing an external program and capturing its output.
pub trait CommandRunner {
    /// Run `program` with `args` and return its trimmed combined output.
    fn run(&self, program: &Path, args: &str, opts: &RunOptions) -> Result<String>;
}

/// Production runner that spawns the program and captures stdout and stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &Path, args: &str, opts: &RunOptions) -> Result<String> {
        let program_name = program.display().to_string();
        let mut command = if opts.use_shell {
            let mut c = Command::new("sh");
            c.arg("-c").arg(format!("{} {}", program_name, args));
            c
        } else {
            let mut c = Command::new(program);
            c.args(split_args(args));
            c
        };
        command
            .envs(opts.extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(program = %program_name, args = %args, shell = opts.use_shell, "running command");

        let spawn_err = |source| Error::Spawn {
            program: program_name.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;

        // Drain stderr on its own thread so a chatty tool cannot block on a
        // full pipe while stdout is being read.
        let stream = opts.stream_output;
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| thread::spawn(move || read_lines(stderr, stream)));

        let mut lines = child
            .stdout
            .take()
            .map(|stdout| read_lines(stdout, stream))
            .unwrap_or_default();
        if let Some(handle) = stderr_reader {
            if let Ok(err_lines) = handle.join() {
                lines.extend(err_lines);
            }
        }

        let status = child.wait().map_err(spawn_err)?;
        let output = lines.join("\n").trim().to_string();

        if !status.success() && opts.raise_on_error {
            return Err(Error::Command {
                program: program_name,
                code: status.code(),
                output,
            });
        }
        Ok(output)
    }
}

/// Read `pipe` to EOF, one lossily decoded line at a time. A read error ends
/// the stream early but never fails the command.
fn read_lines(pipe: impl Read, stream: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for chunk in BufReader::new(pipe).split(b'\n') {
        let Ok(bytes) = chunk else { break };
        let line = String::from_utf8_lossy(&bytes).trim_end_matches('\r').to_string();
        if stream {
            println!("++ {}", line);
        }
        lines.push(line);
    }
    lines
}
