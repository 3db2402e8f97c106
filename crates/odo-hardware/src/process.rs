//! Proxmark3 client driven as a child process.
//!
//! The client is an interactive shell: it prints a prompt, reads one command
//! per line, prints the command output, and prints the prompt again. The
//! driver writes a command, then collects everything up to the next prompt.
//!
//! ```text
//! driver ──"hf iclass encode ...\n"──▶ stdin
//! driver ◀── "[+] Write block 6/0x06 ( ok )\n ... pm3 --> " ── stdout
//! ```

use crate::{
    error::{HardwareError, Result},
    traits::CommandDriver,
};
use odo_core::constants::DEFAULT_DRIVER_TIMEOUT_SECS;
use regex::Regex;
use std::{process::Stdio, sync::LazyLock, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, ChildStdout, Command},
};
use tracing::{debug, info, warn};

/// Prompt printed by the client when it is ready for a command.
pub const PM3_PROMPT: &str = "pm3 --> ";

/// Program started when no other is configured.
pub const PM3_PROGRAM: &str = "pm3";

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\x1B[@-Z\\-_]|[\x80-\x9A\x9C-\x9F]|(?:\x1B\[|\x9B)[0-?]*[ -/]*[@-~])")
        .expect("invalid ANSI escape pattern")
});

/// Remove terminal escape sequences (colors, cursor movement) from `text`.
///
/// ```
/// use odo_hardware::process::strip_ansi;
///
/// assert_eq!(strip_ansi("\x1b[32m[+]\x1b[0m ok"), "[+] ok");
/// ```
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Launch settings for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pm3Config {
    /// Program to start.
    pub program: String,

    /// Serial port passed with `-p`, if any.
    pub port: Option<String>,

    /// Bound on every wait for a prompt.
    pub timeout: Duration,
}

impl Default for Pm3Config {
    fn default() -> Self {
        Self {
            program: PM3_PROGRAM.to_string(),
            port: None,
            timeout: Duration::from_secs(DEFAULT_DRIVER_TIMEOUT_SECS),
        }
    }
}

impl Pm3Config {
    fn args(&self) -> Vec<String> {
        match &self.port {
            Some(port) => vec!["-p".to_string(), port.clone()],
            None => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    buffer: Vec<u8>,
}

/// Proxmark3 client process.
#[derive(Debug)]
pub struct Pm3Process {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    session: Option<Session>,
}

impl Pm3Process {
    pub fn new(config: Pm3Config) -> Self {
        Self::with_command(config.program.clone(), config.args(), config.timeout)
    }

    /// Drive an arbitrary program that speaks the client's prompt protocol.
    pub fn with_command(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            session: None,
        }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Read until the next prompt, within the configured timeout.
    async fn read_until_prompt(&mut self) -> Result<String> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let program = self.program.clone();
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HardwareError::disconnected(&program))?;

        match tokio::time::timeout(timeout, read_prompted(session, &program)).await {
            Ok(result) => result,
            Err(_) => Err(HardwareError::timeout(timeout_ms)),
        }
    }
}

async fn read_prompted(session: &mut Session, program: &str) -> Result<String> {
    let prompt = PM3_PROMPT.as_bytes();
    let mut chunk = [0u8; 1024];

    loop {
        if let Some(pos) = session
            .buffer
            .windows(prompt.len())
            .position(|window| window == prompt)
        {
            let output: Vec<u8> = session.buffer.drain(..pos + prompt.len()).collect();
            let text = String::from_utf8_lossy(&output[..pos]);
            return Ok(strip_ansi(&text));
        }

        let n = session.stdout.read(&mut chunk).await?;
        if n == 0 {
            return Err(HardwareError::stream_closed(program));
        }
        session.buffer.extend_from_slice(&chunk[..n]);
    }
}

impl CommandDriver for Pm3Process {
    async fn open(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        info!(command = %self.command_line(), "Starting client");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HardwareError::initialization_failed(format!(
                    "failed to start '{}': {e}",
                    self.command_line()
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(HardwareError::initialization_failed("client stdio not piped"));
        };

        self.session = Some(Session {
            child,
            stdin,
            stdout,
            buffer: Vec::new(),
        });

        match self.read_until_prompt().await {
            Ok(banner) => {
                debug!(banner = %banner.trim(), "Client ready");
                Ok(())
            }
            Err(error) => {
                if let Some(mut session) = self.session.take() {
                    let _ = session.child.kill().await;
                }
                // A silent client may come up later; a dead one will not.
                Err(match error {
                    HardwareError::Timeout { duration_ms } => HardwareError::unreachable(format!(
                        "no prompt from client within {duration_ms}ms"
                    )),
                    HardwareError::StreamClosed { .. } => HardwareError::initialization_failed(
                        "client exited before its first prompt",
                    ),
                    other => other,
                })
            }
        }
    }

    async fn execute(&mut self, command: &str) -> Result<String> {
        let program = self.program.clone();
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| HardwareError::disconnected(&program))?;

        let line = format!("{command}\n");
        if let Err(e) = session.stdin.write_all(line.as_bytes()).await {
            warn!(error = %e, "Client stdin closed");
            return Err(HardwareError::stream_closed(program));
        }
        session
            .stdin
            .flush()
            .await
            .map_err(|_| HardwareError::stream_closed(&program))?;

        self.read_until_prompt().await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        if session.child.try_wait()?.is_none() {
            let _ = session.stdin.write_all(b"quit\n").await;
            let _ = session.stdin.flush().await;

            match tokio::time::timeout(self.timeout, session.child.wait()).await {
                Ok(Ok(status)) => info!(%status, "Client closed cleanly"),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    warn!("Client ignored quit, killing it");
                    session.child.kill().await?;
                }
            }
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }
}
