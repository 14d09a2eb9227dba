//! Julia session management (spawn, communicate, lifecycle).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::program::Program;
use crate::protocol::{DRIVER, Reply, encode_request};
use crate::runtime::Runtime;

/// Default Julia executable, resolved through `PATH`.
pub const DEFAULT_EXECUTABLE: &str = "julia";

/// How to launch the Julia driver process.
///
/// Every location is an explicit field; the host process environment is
/// never modified.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub executable: PathBuf,
    pub project: PathBuf,
    pub depot: PathBuf,
    /// Value for `--threads`, e.g. `auto` or `4`.
    pub threads: String,
    pub env: HashMap<String, String>,
}

struct Channel {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Handle to a running Julia driver process.
///
/// One request/response exchange holds the channel lock for its whole
/// duration, so concurrent callers are served one at a time.
pub struct JuliaSession {
    config: SessionConfig,
    process: Mutex<Child>,
    channel: Mutex<Channel>,
    threads: OnceCell<usize>,
}

impl JuliaSession {
    /// Spawn the driver process.
    pub async fn spawn(config: SessionConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.executable);
        cmd.arg("--startup-file=no")
            .arg(format!("--threads={}", config.threads))
            .arg(format!("--project={}", config.project.display()))
            .arg("-e")
            .arg(DRIVER)
            .env("JULIA_DEPOT_PATH", &config.depot)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        if let Some(stderr) = process.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "julia", "{line}");
                }
            });
        }

        info!(
            executable = %config.executable.display(),
            project = %config.project.display(),
            "julia session started"
        );

        Ok(Self {
            config,
            process: Mutex::new(process),
            channel: Mutex::new(Channel {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            threads: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Evaluate raw source text. Solver code goes through [`Runtime::eval`]
    /// with a [`Program`] instead.
    async fn exchange(&self, source: &str) -> Result<Value> {
        let frame = encode_request(source);
        let mut channel = self.channel.lock().await;

        channel.stdin.write_all(&frame).await?;
        channel.stdin.flush().await?;

        let mut line = String::new();
        let bytes_read = channel.stdout.read_line(&mut line).await?;
        if bytes_read == 0 {
            return Err(Error::SessionExited);
        }

        Reply::parse(&line)?.into_result()
    }

    /// Check if the process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Terminate the process.
    pub async fn shutdown(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if matches!(process.try_wait(), Ok(None)) {
            process.kill().await?;
            info!("julia session stopped");
        }
        Ok(())
    }
}

impl Runtime for JuliaSession {
    async fn eval(&self, program: &Program) -> Result<Value> {
        let source = program.source();
        debug!(bytes = source.len(), "evaluating program");
        self.exchange(&source).await
    }

    async fn threads(&self) -> Result<usize> {
        self.threads
            .get_or_try_init(|| async {
                let value = self.exchange("Threads.nthreads()").await?;
                Ok::<_, Error>(serde_json::from_value(value)?)
            })
            .await
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_reports_missing_executable() {
        let config = SessionConfig {
            executable: "/nonexistent/julia-binary".into(),
            project: "/tmp".into(),
            depot: "/tmp".into(),
            threads: "auto".into(),
            env: HashMap::new(),
        };
        let err = JuliaSession::spawn(config).await.err().unwrap();
        assert!(matches!(err, Error::Spawn(_)));
    }
}
