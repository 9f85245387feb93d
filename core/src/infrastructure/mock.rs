//! Mock command runner for testing.
//!
//! Records every invocation and serves scripted responses, making it easy to
//! write deterministic tests for the provisioning and orchestration code
//! without any of the external tools installed.

use std::cell::RefCell;
use std::path::Path;

use crate::error::{Error, Result};

use super::runner::{CommandRunner, RunOptions};

/// A scripted outcome: `Ok(output)` or `Err(output)` for a non-zero exit.
pub type MockResponse = std::result::Result<String, String>;

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: String,
    pub use_shell: bool,
    pub extra_env: Vec<(String, String)>,
}

impl Invocation {
    /// `"<program> <args>"`.
    pub fn command_line(&self) -> String {
        format!("{} {}", self.program, self.args)
    }

    /// The command line prefixed with its `KEY=value` environment overlay,
    /// which is what rules are matched against.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.extra_env {
            out.push_str(&format!("{}={} ", key, value));
        }
        out.push_str(&self.command_line());
        out
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.extra_env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

type Hook = Box<dyn Fn(&Invocation)>;

/// Test-double runner.
///
/// Responses are resolved in this order: the first rule whose pattern is a
/// substring of `Invocation::describe`, then the next queued response, then an
/// empty success.
pub struct MockRunner {
    rules: Vec<(String, MockResponse)>,
    responses: RefCell<Vec<MockResponse>>,
    invocations: RefCell<Vec<Invocation>>,
    hooks: Vec<Hook>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner {
            rules: Vec::new(),
            responses: RefCell::new(Vec::new()),
            invocations: RefCell::new(Vec::new()),
            hooks: Vec::new(),
        }
    }

    /// Serve `responses` in order to calls that match no rule.
    pub fn with_responses(responses: Vec<MockResponse>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        MockRunner {
            responses: RefCell::new(reversed),
            ..Self::new()
        }
    }

    /// Answer every call whose description contains `pattern`.
    pub fn on(mut self, pattern: &str, response: MockResponse) -> Self {
        self.rules.push((pattern.to_string(), response));
        self
    }

    /// Run `hook` on every invocation, before the response is chosen.
    pub fn with_hook(mut self, hook: impl Fn(&Invocation) + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.borrow().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    /// Number of recorded calls whose command line contains `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.invocations
            .borrow()
            .iter()
            .filter(|i| i.command_line().contains(pattern))
            .count()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, program: &Path, args: &str, opts: &RunOptions) -> Result<String> {
        let invocation = Invocation {
            program: program.display().to_string(),
            args: args.to_string(),
            use_shell: opts.use_shell,
            extra_env: opts.extra_env.clone(),
        };
        for hook in &self.hooks {
            hook(&invocation);
        }

        let line = invocation.describe();
        let response = self
            .rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .or_else(|| self.responses.borrow_mut().pop())
            .unwrap_or_else(|| Ok(String::new()));
        self.invocations.borrow_mut().push(invocation);

        match response {
            Ok(output) => Ok(output),
            Err(output) if !opts.raise_on_error => Ok(output),
            Err(output) => Err(Error::Command {
                program: program.display().to_string(),
                code: Some(1),
                output,
            }),
        }
    }
}
