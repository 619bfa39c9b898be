//! Scripted command runner (testing only)
//!
//! `ScriptedRunner` records every invocation and answers from a list of
//! rules, so build sequences can be tested without a toolchain.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use buildcmp_core::error::Result;

use crate::runner::{CommandRunner, Invocation, InvocationOutput};

type Matcher = Box<dyn Fn(&Invocation) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&Invocation) -> InvocationOutput + Send + Sync>;

/// Answers invocations from scripted rules; unmatched ones succeed silently.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<(Matcher, Responder)>,
    programs: HashSet<String>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations accepted by `matcher` with `responder`.
    ///
    /// Rules are tried in the order they were added.
    pub fn on<M, R>(mut self, matcher: M, responder: R) -> Self
    where
        M: Fn(&Invocation) -> bool + Send + Sync + 'static,
        R: Fn(&Invocation) -> InvocationOutput + Send + Sync + 'static,
    {
        self.rules.push((Box::new(matcher), Box::new(responder)));
        self
    }

    /// Fail every invocation whose command line starts with `prefix`.
    pub fn fail_on(self, prefix: &str, exit_code: i32) -> Self {
        let prefix = prefix.to_string();
        self.on(
            move |inv| inv.command_line().starts_with(&prefix),
            move |_| InvocationOutput::failed(exit_code, "scripted failure"),
        )
    }

    /// Report `program` as present on `PATH`.
    pub fn with_program(mut self, program: &str) -> Self {
        self.programs.insert(program.to_string());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Invocation>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.lock().clone()
    }

    /// Command lines of every invocation so far.
    pub fn command_lines(&self) -> Vec<String> {
        self.lock().iter().map(Invocation::command_line).collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<InvocationOutput> {
        self.lock().push(invocation.clone());
        let output = self
            .rules
            .iter()
            .find(|(matcher, _)| matcher(invocation))
            .map(|(_, responder)| responder(invocation))
            .unwrap_or_else(|| InvocationOutput::ok(""));
        Ok(output)
    }

    fn has_program(&self, program: &str) -> bool {
        self.programs.contains(program)
    }
}
