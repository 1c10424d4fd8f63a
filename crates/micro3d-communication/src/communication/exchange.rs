//! Command/response coordinator
//!
//! Turns the line stream of a [`SerialChannel`] into sequential request/response
//! round trips: write one command, then collect reply lines until the
//! completion token line arrives or the deadline passes. A single async mutex
//! guards the channel, so concurrent callers queue and never interleave.

use crate::communication::channel::{LineSubscription, SerialChannel};
use crate::communication::ConnectionParams;
use micro3d_core::constants::{COMMAND_PREFIXES, COMPLETION_TOKEN};
use micro3d_core::{Error, ExchangeError, Result, ValidationError};
use std::io;
use std::time::Duration;
use tokio::sync::Mutex;

/// Default deadline for a single exchange
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Check a command and return the line to put on the wire
///
/// Trailing line breaks are stripped and exactly one `\n` appended. The command
/// must start with `G` or `M`; anything else never reaches the device.
pub fn validate_command(command: &str) -> std::result::Result<String, ValidationError> {
    let trimmed = command.trim_end_matches(['\r', '\n']).trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyCommand);
    }
    if trimmed.contains(['\r', '\n']) {
        return Err(ValidationError::EmbeddedNewline {
            command: trimmed.to_string(),
        });
    }
    let accepted = trimmed
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .is_some_and(|c| COMMAND_PREFIXES.contains(&c));
    if !accepted {
        return Err(ValidationError::InvalidPrefix {
            command: trimmed.to_string(),
        });
    }
    Ok(format!("{}\n", trimmed))
}

/// One command awaiting its completion token
#[derive(Debug, Clone)]
pub struct PendingExchange {
    command: String,
    completion_token: String,
    timeout: Duration,
    received: Vec<String>,
}

impl PendingExchange {
    /// New exchange waiting for `ok` within the default deadline
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            completion_token: COMPLETION_TOKEN.to_string(),
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
            received: Vec::new(),
        }
    }

    /// Wait for a different completion line
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.completion_token = token.into();
        self
    }

    /// Set the deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn completion_token(&self) -> &str {
        &self.completion_token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Lines collected so far, token excluded
    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Record one reply line; true when it completes the exchange
    ///
    /// Only a line equal to the token counts. `ok T:21.3` or `echo:ok` do not.
    pub fn accept(&mut self, line: String) -> bool {
        if line.trim_end() == self.completion_token {
            return true;
        }
        self.received.push(line);
        false
    }

    fn command_label(&self) -> String {
        self.command.trim_end().to_string()
    }

    fn timeout_error(self) -> ExchangeError {
        ExchangeError::Timeout {
            command: self.command_label(),
            token: self.completion_token,
            timeout_ms: self.timeout.as_millis() as u64,
            partial: self.received,
        }
    }
}

struct Link {
    channel: SerialChannel,
    lines: LineSubscription,
    closed: bool,
}

enum Ending {
    Token,
    StreamEnded,
}

impl Link {
    async fn run(&mut self, mut pending: PendingExchange, wire: String) -> Result<Vec<String>> {
        let label = pending.command_label();

        match self.lines.drain_ready() {
            Ok(stale) => {
                for line in stale {
                    tracing::warn!(direction = "recv", "Discarding stale line before `{}`: {}", label, line);
                }
            }
            Err(e) => return Err(io_error(&label, e)),
        }

        tracing::debug!(direction = "send", "{}", label);
        self.channel
            .write(wire.as_bytes())
            .map_err(|e| io_error(&label, e))?;

        let lines = &mut self.lines;
        let collected = &mut pending;
        let outcome = tokio::time::timeout(collected.timeout, async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        tracing::debug!(direction = "recv", "{}", line);
                        if collected.accept(line) {
                            return Ok::<Ending, io::Error>(Ending::Token);
                        }
                    }
                    Ok(None) => return Ok(Ending::StreamEnded),
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(Ending::Token)) => Ok(pending.received),
            Ok(Ok(Ending::StreamEnded)) => {
                tracing::error!("Line stream ended while waiting on `{}`", label);
                Err(ExchangeError::StreamClosed {
                    command: label,
                    partial: pending.received,
                }
                .into())
            }
            Ok(Err(e)) => {
                tracing::error!("Serial read failed during `{}`: {}", label, e);
                Err(io_error(&label, e))
            }
            Err(_) => {
                let err = pending.timeout_error();
                tracing::warn!("{}", err);
                Err(err.into())
            }
        }
    }
}

fn io_error(command: &str, e: io::Error) -> Error {
    ExchangeError::Io {
        command: command.to_string(),
        reason: e.to_string(),
    }
    .into()
}

/// Serializes command/response round trips over one channel
pub struct ExchangeCoordinator {
    port_name: String,
    link: Mutex<Link>,
}

impl ExchangeCoordinator {
    /// Take over an open channel and its line stream
    pub fn new(mut channel: SerialChannel) -> Result<Self> {
        let lines = channel.subscribe_lines()?;
        Ok(Self {
            port_name: channel.name().to_string(),
            link: Mutex::new(Link {
                channel,
                lines,
                closed: false,
            }),
        })
    }

    /// Open a hardware port and coordinate it
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        Self::new(SerialChannel::open(params)?)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Send `command` and wait for a line equal to `completion_token`
    ///
    /// Returns the reply lines without the token. On timeout the lines that did
    /// arrive travel inside [`ExchangeError::Timeout`]. Invalid commands are
    /// rejected before anything is written.
    pub async fn exchange(
        &self,
        command: &str,
        completion_token: &str,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let pending = PendingExchange::new(command)
            .with_token(completion_token)
            .with_timeout(timeout);
        self.exchange_pending(pending).await
    }

    /// [`exchange`](Self::exchange) with the `ok` token
    pub async fn send(&self, command: &str, timeout: Duration) -> Result<Vec<String>> {
        self.exchange(command, COMPLETION_TOKEN, timeout).await
    }

    /// Run a prepared exchange
    pub async fn exchange_pending(&self, pending: PendingExchange) -> Result<Vec<String>> {
        let wire = validate_command(pending.command())?;
        let mut link = self.link.lock().await;
        if link.closed {
            return Err(ExchangeError::Closed.into());
        }
        link.run(pending, wire).await
    }

    /// Drop everything the controller has sent so far
    pub async fn purge(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.closed {
            return Err(ExchangeError::Closed.into());
        }
        link.channel.purge()?;
        let dropped = link.lines.drain_ready()?.len();
        tracing::debug!(port = %self.port_name, lines = dropped, "Purged controller output");
        Ok(())
    }

    /// Stop accepting commands and release the port
    ///
    /// Waits for an in-flight exchange, then sends `disable_command` (usually
    /// `M84`) once without caring whether it is acknowledged. Later calls are
    /// no-ops.
    pub async fn close(&self, disable_command: Option<&str>, timeout: Duration) {
        let mut link = self.link.lock().await;
        if link.closed {
            return;
        }
        link.closed = true;

        if let Some(command) = disable_command {
            match validate_command(command) {
                Ok(wire) => {
                    let pending = PendingExchange::new(command).with_timeout(timeout);
                    if let Err(e) = link.run(pending, wire).await {
                        tracing::warn!("Shutdown command `{}` failed: {}", command, e);
                    }
                }
                Err(e) => tracing::warn!("Shutdown command rejected: {}", e),
            }
        }

        link.channel.close();
        tracing::info!(port = %self.port_name, "Coordinator closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.link.lock().await.closed
    }
}
