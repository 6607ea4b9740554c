//! External process execution.
//!
//! [`ProcessExecutor::run`] never fails: spawn errors, nonzero exits and
//! timeouts all produce an [`ExecutionResult`] with `successful = false` and
//! whatever output was captured.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use lantern_core::ExecutionResult;

/// Environment forced onto every playbook run. Wins over profile values.
pub const PLAYBOOK_ENV: &[(&str, &str)] = &[
    ("ANSIBLE_STDOUT_CALLBACK", "json"),
    ("ANSIBLE_COMMAND_WARNINGS", "0"),
    ("ANSIBLE_RETRY_FILES_ENABLED", "0"),
    ("ANSIBLE_GATHERING", "explicit"),
];

/// How long to wait for pipe readers once a timed-out child has been killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Bytes read from one pipe so far, readable while the reader still runs.
type Captured = Arc<Mutex<Vec<u8>>>;

/// Layer `forced` over `profile_env`. The daemon's own environment is the
/// implicit base layer, inherited by every child.
pub fn merge_env(
    profile_env: &BTreeMap<String, String>,
    forced: &[(&str, &str)],
) -> BTreeMap<String, String> {
    let mut env = profile_env.clone();
    for (key, value) in forced {
        env.insert((*key).to_string(), (*value).to_string());
    }
    env
}

/// Runs engine processes in a fixed working directory with an optional timeout.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// `timeout_ms == 0` disables the timeout.
    pub fn new(cwd: Option<PathBuf>, timeout_ms: u64) -> Self {
        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        Self { cwd, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> ExecutionResult {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The working directory alone does not update PWD for the child.
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd).env("PWD", cwd);
        }
        // Own process group, so a timeout also reaches forked workers.
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!(command, ?args, ?env, cwd = ?self.cwd, "running engine process");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(command, error = %err, "failed to spawn engine process");
                return ExecutionResult {
                    successful: false,
                    stdout: String::new(),
                    stderr: format!("failed to spawn '{command}': {err}"),
                };
            }
        };

        let stdout_buf = Captured::default();
        let stderr_buf = Captured::default();
        let stdout_reader = tokio::spawn(capture(child.stdout.take(), stdout_buf.clone()));
        let stderr_reader = tokio::spawn(capture(child.stderr.take(), stderr_buf.clone()));

        let (status, timed_out) = match self.timeout {
            None => (child.wait().await, false),
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => (status, false),
                Err(_) => {
                    terminate(&mut child, command).await;
                    (child.wait().await, true)
                }
            },
        };

        let grace = timed_out.then_some(DRAIN_GRACE);
        settle(stdout_reader, grace).await;
        settle(stderr_reader, grace).await;
        let stdout = contents(&stdout_buf);
        let stderr = contents(&stderr_buf);

        if !stderr.is_empty() {
            tracing::debug!(command, %stderr, "engine process stderr");
        }

        let mut result = ExecutionResult {
            successful: false,
            stdout,
            stderr,
        };
        match status {
            _ if timed_out => {
                let limit = self.timeout.unwrap_or_default();
                tracing::warn!(command, timeout_ms = limit.as_millis(), "engine process timed out");
                append_line(&mut result.stderr, &format!("process timed out after {} ms", limit.as_millis()));
            }
            Ok(status) if status.success() => result.successful = true,
            Ok(status) => {
                tracing::debug!(command, %status, "engine process exited unsuccessfully");
                append_line(&mut result.stderr, &format!("process exited with {status}"));
            }
            Err(err) => append_line(&mut result.stderr, &format!("failed to wait for process: {err}")),
        }
        result
    }
}

async fn capture<R>(reader: Option<R>, sink: Captured)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else { return };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]),
            Err(err) => {
                tracing::debug!(error = %err, "engine process pipe read failed");
                break;
            }
        }
    }
}

/// Wait for a pipe reader. With a grace period, a reader still blocked after
/// it (a survivor holds the pipe open) is aborted.
async fn settle(mut reader: JoinHandle<()>, grace: Option<Duration>) {
    match grace {
        None => {
            let _ = reader.await;
        }
        Some(grace) => {
            if tokio::time::timeout(grace, &mut reader).await.is_err() {
                reader.abort();
            }
        }
    }
}

fn contents(buf: &Captured) -> String {
    String::from_utf8_lossy(&buf.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
}

/// Kill the child's whole process group, then the child itself.
async fn terminate(child: &mut Child, command: &str) {
    kill_group(child, command);
    if let Err(err) = child.kill().await {
        tracing::warn!(command, error = %err, "failed to kill timed-out process");
    }
}

#[cfg(unix)]
fn kill_group(child: &Child, command: &str) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(command, error = %err, "failed to kill process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child, _command: &str) {}

fn append_line(buf: &mut String, line: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(line);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn forced_env_wins_over_profile_env() {
        let mut profile = BTreeMap::new();
        profile.insert("ANSIBLE_STDOUT_CALLBACK".to_string(), "yaml".to_string());
        profile.insert("ANSIBLE_CONFIG".to_string(), "ansible.cfg".to_string());

        let env = merge_env(&profile, PLAYBOOK_ENV);
        assert_eq!(env["ANSIBLE_STDOUT_CALLBACK"], "json");
        assert_eq!(env["ANSIBLE_CONFIG"], "ansible.cfg");
        assert_eq!(env["ANSIBLE_GATHERING"], "explicit");
    }

    #[test]
    fn zero_timeout_means_none() {
        assert!(ProcessExecutor::new(None, 0).timeout().is_none());
        assert_eq!(
            ProcessExecutor::new(None, 250).timeout(),
            Some(Duration::from_millis(250))
        );
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let result = ProcessExecutor::default()
            .run("/bin/sh", &sh("echo out; echo err >&2"), &BTreeMap::new())
            .await;
        assert!(result.successful);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_captured_not_raised() {
        let result = ProcessExecutor::default()
            .run("/bin/sh", &sh("echo partial; exit 3"), &BTreeMap::new())
            .await;
        assert!(!result.successful);
        assert_eq!(result.stdout, "partial\n");
        assert!(result.stderr.contains("exit status: 3"), "got: {}", result.stderr);
    }

    #[tokio::test]
    async fn spawn_failure_is_captured_not_raised() {
        let result = ProcessExecutor::default()
            .run("/definitely/not/here", &[], &BTreeMap::new())
            .await;
        assert!(!result.successful);
        assert!(result.stdout.is_empty());
        assert!(result.stderr.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn timeout_kills_process_and_keeps_partial_output() {
        let executor = ProcessExecutor::new(None, 200);
        let started = std::time::Instant::now();
        let result = executor
            .run("/bin/sh", &sh("echo early; exec sleep 10"), &BTreeMap::new())
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!result.successful);
        assert_eq!(result.stdout, "early\n");
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn timeout_keeps_output_when_a_forked_worker_holds_the_pipe() {
        let executor = ProcessExecutor::new(None, 200);
        let started = std::time::Instant::now();
        // `sleep` runs as a separate process that inherits stdout.
        let result = executor
            .run("/bin/sh", &sh("echo early; sleep 3; echo late"), &BTreeMap::new())
            .await;
        assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
        assert!(!result.successful);
        assert_eq!(result.stdout, "early\n");
        assert!(result.stderr.contains("process timed out after 200 ms"), "got: {}", result.stderr);
    }

    #[tokio::test]
    async fn timeout_keeps_buffered_output_of_an_escaped_worker() {
        let executor = ProcessExecutor::new(None, 200);
        let started = std::time::Instant::now();
        // The background worker leaves the process group and keeps stdout open.
        let script = "echo early; if command -v setsid >/dev/null; then setsid sleep 5 & fi; sleep 5";
        let result = executor.run("/bin/sh", &sh(script), &BTreeMap::new()).await;
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
        assert_eq!(result.stdout, "early\n");
    }

    #[tokio::test]
    async fn env_and_cwd_reach_the_child() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let cwd = std::fs::canonicalize(dir.path()).expect("canonical");
        let mut env = BTreeMap::new();
        env.insert("LANTERN_PROBE".to_string(), "yes".to_string());

        let result = ProcessExecutor::new(Some(cwd.clone()), 0)
            .run("/bin/sh", &sh("echo \"$LANTERN_PROBE\"; echo \"$PWD\"; pwd -P"), &env)
            .await;
        let lines: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(lines[0], "yes");
        assert_eq!(lines[1], cwd.display().to_string());
        assert_eq!(lines[2], cwd.display().to_string());
    }
}
