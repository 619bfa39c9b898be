//! Subprocess execution.
//!
//! Every external program (git, make, objcopy, objdump, rsync, the configure
//! scripts) is launched through a [`CommandRunner`], so the build sequence can
//! be exercised against [`crate::fakes::ScriptedRunner`] in tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use buildcmp_core::config::{shell_join, Tool};
use buildcmp_core::error::{CompareError, Result};
use tokio::process::Command;
use tracing::{debug, error};

/// One child process to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; the staged tree root for build steps.
    pub cwd: Option<PathBuf>,
    /// Extra environment, on top of the inherited one.
    pub env: Vec<(String, String)>,
    /// Capture stdout instead of passing it through.
    pub capture: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            capture: false,
        }
    }

    /// Start from a configured tool, keeping its leading arguments.
    pub fn tool(tool: &Tool) -> Self {
        Self::new(tool.program.clone()).args(tool.args.iter().cloned())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
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

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs(mut self, env: &[(String, String)]) -> Self {
        self.env.extend(env.iter().cloned());
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture = true;
        self
    }

    /// The shell-quoted command line, for logs and error messages.
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_join(&words)
    }
}

/// Result of a finished child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout; empty unless the invocation asked for capture.
    pub stdout: String,

    /// Captured stderr; empty unless the invocation asked for capture.
    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl InvocationOutput {
    /// A successful exit with `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            success: true,
            ..Self::default()
        }
    }

    /// A failed exit with `exit_code` and `stderr`.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            success: false,
            ..Self::default()
        }
    }

    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Launches child processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` to completion. A non-zero exit is not an error here.
    async fn run(&self, invocation: &Invocation) -> Result<InvocationOutput>;

    /// Whether `program` can be found on `PATH`.
    fn has_program(&self, program: &str) -> bool;
}

/// Runs real processes on the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<InvocationOutput> {
        let start = Instant::now();
        debug!(command = %invocation.command_line(), "Running");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        if invocation.capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        let child = cmd.spawn().map_err(|e| CompareError::SubprocessFailure {
            command: invocation.command_line(),
            status: format!("spawn error: {e}"),
        })?;
        let output = child.wait_with_output().await?;

        Ok(InvocationOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: output.status.success(),
        })
    }

    fn has_program(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Run `invocation` and turn a non-zero exit into [`CompareError::SubprocessFailure`].
///
/// The failing command line is logged at error level before returning.
pub async fn check(runner: &dyn CommandRunner, invocation: &Invocation) -> Result<InvocationOutput> {
    let output = runner.run(invocation).await?;
    if output.passed() {
        return Ok(output);
    }
    let command = invocation.command_line();
    error!("Command failed: {command}");
    Err(CompareError::SubprocessFailure {
        command,
        status: format!("exit code {}", output.exit_code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_arguments() {
        let inv = Invocation::new("git")
            .args(["apply", "/tmp/my patches/strip.patch"])
            .current_dir("/tmp/repo");
        let line = inv.command_line();
        assert!(line.starts_with("git apply "));
        assert!(line.contains("my patches"));
        assert_ne!(line, "git apply /tmp/my patches/strip.patch");
    }

    #[test]
    fn test_tool_keeps_leading_args() {
        let tool = Tool::parse("rsync -v").unwrap();
        let inv = Invocation::tool(&tool).arg("-r");
        assert_eq!(inv.program, "rsync");
        assert_eq!(inv.args, vec!["-v".to_string(), "-r".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let inv = Invocation::new("echo").arg("hello").capture_stdout();
        let out = SystemRunner.run(&inv).await.expect("run failed");
        assert!(out.passed());
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_env_and_cwd_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let inv = Invocation::new("sh")
            .args(["-c", "pwd; echo $QT_RCC_SOURCE_DATE_OVERRIDE"])
            .current_dir(dir.path())
            .envs(&[("QT_RCC_SOURCE_DATE_OVERRIDE".to_string(), "1".to_string())])
            .capture_stdout();
        let out = SystemRunner.run(&inv).await.unwrap();
        let mut lines = out.stdout.lines();
        let pwd = lines.next().unwrap();
        assert_eq!(
            std::fs::canonicalize(pwd).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
        assert_eq!(lines.next(), Some("1"));
    }

    #[tokio::test]
    async fn test_check_failing_command() {
        let inv = Invocation::new("false");
        match check(&SystemRunner, &inv).await {
            Err(CompareError::SubprocessFailure { command, .. }) => assert_eq!(command, "false"),
            other => panic!("expected SubprocessFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_subprocess_failure() {
        let inv = Invocation::new("buildcmp-definitely-not-installed");
        assert!(matches!(
            SystemRunner.run(&inv).await,
            Err(CompareError::SubprocessFailure { .. })
        ));
        assert!(!SystemRunner.has_program("buildcmp-definitely-not-installed"));
    }
}
