//! Stdio transport: a child process with JSON-RPC over its stdin/stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::protocol::{self, InitializeResult};
use crate::transport::Transport;
use crate::transport::channel::RpcChannel;

use toolgate_core::EnvVar;

/// Grace window between SIGTERM and SIGKILL on close.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// A spawned MCP server process with a JSON-RPC channel on its pipes.
pub struct StdioTransport {
    channel: RpcChannel,
    child: Mutex<Option<Child>>,
    server_name: String,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Spawn the child, wire up the channel, and run the `initialize`
    /// handshake followed by the `notifications/initialized` notification.
    pub(crate) async fn spawn(
        server_name: &str,
        command: &str,
        args: &[String],
        env: &[EnvVar],
        working_dir: Option<&str>,
        handshake_timeout: Duration,
    ) -> Result<(Self, InitializeResult), TransportError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        for entry in env {
            cmd.env(&entry.key, &entry.value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            TransportError::Spawn(format!(
                "Failed to spawn '{command}': {e}\nArgs: {args:?}\nCwd: {working_dir:?}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Spawn("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Spawn("Failed to get stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr, server_name.to_string()));
        }

        let transport = Self {
            channel: RpcChannel::new(stdout, stdin, server_name),
            child: Mutex::new(Some(child)),
            server_name: server_name.to_string(),
        };

        let info = transport.initialize(handshake_timeout).await?;
        Ok((transport, info))
    }

    /// Send the initialize request to establish the MCP session.
    async fn initialize(&self, deadline: Duration) -> Result<InitializeResult, TransportError> {
        let result = self
            .channel
            .call("initialize", Some(protocol::initialize_params()), deadline)
            .await
            .map_err(|e| match e {
                TransportError::Timeout => {
                    TransportError::Handshake("No initialize response before deadline".to_string())
                }
                other => TransportError::Handshake(other.to_string()),
            })?;

        let info: InitializeResult = serde_json::from_value(result)
            .map_err(|e| TransportError::Handshake(format!("Bad initialize result: {e}")))?;

        self.channel
            .notify("notifications/initialized", None)
            .await?;

        tracing::debug!(
            server = %self.server_name,
            peer = %info.server_info.name,
            protocol = %info.protocol_version,
            "MCP session initialized"
        );

        Ok(info)
    }

    /// Terminate the child: SIGTERM, grace window, then kill.
    async fn terminate(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            #[allow(clippy::cast_possible_wrap)] // PIDs fit in i32
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);

            match tokio::time::timeout(TERM_GRACE, child.wait()).await {
                Ok(_) => {
                    tracing::debug!(server = %self.server_name, "Server process exited on SIGTERM");
                    return;
                }
                Err(_) => {
                    tracing::warn!(
                        server = %self.server_name,
                        "Server process ignored SIGTERM, killing"
                    );
                }
            }
        }

        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, TransportError> {
        self.channel.call(method, params, deadline).await
    }

    async fn close(&self) {
        self.channel.close().await;
        self.terminate().await;
    }
}

/// Forward child stderr lines to tracing so server noise is diagnosable.
async fn drain_stderr<R>(stderr: R, server_name: String)
where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(server = %server_name, line = %line, "server stderr");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_reported_with_context() {
        let result = StdioTransport::spawn(
            "ghost",
            "/nonexistent/tool-server",
            &["--stdio".to_string()],
            &[],
            None,
            Duration::from_secs(1),
        )
        .await;

        match result {
            Err(TransportError::Spawn(msg)) => {
                assert!(msg.contains("/nonexistent/tool-server"));
                assert!(msg.contains("--stdio"));
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handshake_timeout_when_child_stays_silent() {
        // `cat` echoes nothing valid and never answers initialize.
        let result = StdioTransport::spawn(
            "silent",
            "cat",
            &[],
            &[],
            None,
            Duration::from_millis(200),
        )
        .await;

        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }
}
