//! External command execution.
//!
//! Every cloud and source-hosting operation goes through the `az` and `gh`
//! command-line tools. Operations take a [`CommandRunner`] so tests can swap
//! real processes for scripted responses.

use crate::{DashopsError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Executes a command and returns stdout as a string.
///
/// # Errors
///
/// - [`DashopsError::ToolNotInstalled`] if the program is not on `PATH`
/// - [`DashopsError::CommandFailed`] if the exit code is non-zero (stderr is
///   included in the message)
pub async fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output().await.map_err(|e| spawn_error(program, e))?;
    finish(program, output)
}

/// Executes a command with stdin input.
///
/// Used to hand secret values to `gh secret set` without putting them on the
/// command line.
pub async fn run_command_with_stdin(program: &str, args: &[&str], stdin_data: &str) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| spawn_error(program, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(stdin_data.as_bytes()).await?;
        stdin.flush().await?;
    }

    let output = child.wait_with_output().await?;
    finish(program, output)
}

/// Checks if a command-line tool is available in PATH.
pub async fn check_command_exists(program: &str) -> Result<bool> {
    let status = Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    Ok(status.success())
}

fn spawn_error(program: &str, e: std::io::Error) -> DashopsError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DashopsError::ToolNotInstalled(format!("{} command not found", program))
    } else {
        DashopsError::Io(e)
    }
}

fn finish(program: &str, output: std::process::Output) -> Result<String> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DashopsError::CommandFailed(format!(
            "{} failed with exit code {}: {}",
            program,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| {
        DashopsError::Other(anyhow::anyhow!("Invalid UTF-8 in command output: {}", e))
    })
}

/// Runs external commands on behalf of stores and provisioning steps.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and returns stdout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Runs `program` with `args`, writing `stdin` to its standard input.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &str) -> Result<String>;

    /// Returns true if `program` is installed.
    async fn exists(&self, program: &str) -> Result<bool>;
}

/// Runs real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        debug!(program, args = %redact(args), "running command");
        run_command(program, args).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &str) -> Result<String> {
        debug!(program, args = %redact(args), "running command with stdin");
        run_command_with_stdin(program, args, stdin).await
    }

    async fn exists(&self, program: &str) -> Result<bool> {
        check_command_exists(program).await
    }
}

/// Joins arguments for logging, hiding values that follow secret-bearing flags.
pub fn redact(args: &[&str]) -> String {
    const SECRET_FLAGS: &[&str] = &["--value", "--body", "--account-key", "--parameters"];

    let mut out = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        if hide_next {
            out.push("***");
            hide_next = false;
        } else {
            out.push(*arg);
            hide_next = SECRET_FLAGS.contains(arg);
        }
    }
    out.join(" ")
}

/// Status cache with time-to-live for login checks.
///
/// `az account show` takes the better part of a second; a provisioning run
/// asks several times, so the answer is cached for a few seconds.
///
/// # Example
///
/// ```
/// use dashops::cli::StatusCache;
/// use std::time::Duration;
///
/// let mut cache = StatusCache::new(Duration::from_secs(5));
/// assert!(cache.get().is_none());
///
/// cache.set(true);
/// assert_eq!(cache.get(), Some(true));
/// ```
#[derive(Debug)]
pub struct StatusCache {
    authenticated: bool,
    timestamp: Option<Instant>,
    ttl: Duration,
}

impl StatusCache {
    /// Creates a new status cache with the specified TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            authenticated: false,
            timestamp: None,
            ttl,
        }
    }

    /// Gets the cached status if still valid.
    pub fn get(&self) -> Option<bool> {
        match self.timestamp {
            Some(ts) if ts.elapsed() < self.ttl => Some(self.authenticated),
            _ => None,
        }
    }

    /// Sets the status and updates the timestamp.
    pub fn set(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
        self.timestamp = Some(Instant::now());
    }

    /// Invalidates the cache.
    pub fn invalidate(&mut self) {
        self.timestamp = None;
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(feature = "mock")]
pub use scripted::{Invocation, ScriptedRunner};

#[cfg(feature = "mock")]
mod scripted {
    use super::CommandRunner;
    use crate::{DashopsError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// One recorded command.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Invocation {
        /// Program plus arguments, space separated
        pub command: String,
        /// Data written to stdin, if any
        pub stdin: Option<String>,
    }

    #[derive(Debug, Clone)]
    struct Rule {
        prefix: String,
        outcome: std::result::Result<String, String>,
    }

    /// Command runner that answers from canned responses.
    ///
    /// Rules match on a prefix of the full command line (`"az group exists"`);
    /// the most recently added matching rule wins, so a test can override a
    /// general rule with a narrower one. Unmatched commands succeed with
    /// empty output. Every invocation is recorded.
    ///
    /// # Example
    ///
    /// ```
    /// use dashops::cli::{CommandRunner, ScriptedRunner};
    ///
    /// #[tokio::main]
    /// async fn main() -> dashops::Result<()> {
    ///     let runner = ScriptedRunner::new()
    ///         .respond("az group exists", "false")
    ///         .fail("az keyvault show", "ResourceNotFound");
    ///
    ///     assert_eq!(runner.run("az", &["group", "exists", "--name", "abcd-rg"]).await?, "false");
    ///     assert!(runner.run("az", &["keyvault", "show", "--name", "abcd-kv"]).await.is_err());
    ///     assert_eq!(runner.commands().len(), 2);
    ///     Ok(())
    /// }
    /// ```
    #[derive(Debug, Default)]
    pub struct ScriptedRunner {
        rules: Vec<Rule>,
        missing: Vec<String>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        /// Creates a runner with no rules.
        pub fn new() -> Self {
            Self::default()
        }

        /// Answers commands starting with `prefix` with `stdout`.
        pub fn respond(mut self, prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
            self.rules.push(Rule {
                prefix: prefix.into(),
                outcome: Ok(stdout.into()),
            });
            self
        }

        /// Fails commands starting with `prefix`, reporting `stderr`.
        pub fn fail(mut self, prefix: impl Into<String>, stderr: impl Into<String>) -> Self {
            self.rules.push(Rule {
                prefix: prefix.into(),
                outcome: Err(stderr.into()),
            });
            self
        }

        /// Reports `program` as not installed.
        pub fn without_tool(mut self, program: impl Into<String>) -> Self {
            self.missing.push(program.into());
            self
        }

        /// All recorded invocations, in order.
        pub fn invocations(&self) -> Vec<Invocation> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// Recorded command lines, in order.
        pub fn commands(&self) -> Vec<String> {
            self.invocations().into_iter().map(|i| i.command).collect()
        }

        /// Recorded command lines starting with `prefix`.
        pub fn commands_matching(&self, prefix: &str) -> Vec<String> {
            self.commands()
                .into_iter()
                .filter(|c| c.starts_with(prefix))
                .collect()
        }

        fn answer(&self, program: &str, args: &[&str], stdin: Option<&str>) -> Result<String> {
            if self.missing.iter().any(|m| m == program) {
                return Err(DashopsError::ToolNotInstalled(format!(
                    "{} command not found",
                    program
                )));
            }

            let command = std::iter::once(program)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .join(" ");

            if let Ok(mut calls) = self.calls.lock() {
                calls.push(Invocation {
                    command: command.clone(),
                    stdin: stdin.map(str::to_string),
                });
            }

            let rule = self
                .rules
                .iter()
                .rev()
                .find(|r| command.starts_with(&r.prefix));

            match rule.map(|r| &r.outcome) {
                Some(Ok(stdout)) => Ok(stdout.clone()),
                Some(Err(stderr)) => Err(DashopsError::CommandFailed(format!(
                    "{} failed with exit code 1: {}",
                    program, stderr
                ))),
                None => Ok(String::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
            self.answer(program, args, None)
        }

        async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &str) -> Result<String> {
            self.answer(program, args, Some(stdin))
        }

        async fn exists(&self, program: &str) -> Result<bool> {
            Ok(!self.missing.iter().any(|m| m == program))
        }
    }
}
