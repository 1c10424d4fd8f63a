//! Serial channel
//!
//! Owns one open port. A dedicated pump thread performs the blocking reads and
//! pushes raw chunks into a bounded queue; the single [`LineSubscription`] pulls
//! chunks off that queue and frames them into lines. Writes go straight to the
//! port and are flushed before returning.

use crate::communication::framer::LineFramer;
use crate::communication::serial::{RealSerialPort, SerialPort};
use crate::communication::ConnectionParams;
use micro3d_core::{ConnectionError, Error, Result};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

const READ_BUFFER_SIZE: usize = 1024;
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(5);

/// What the pump thread hands to the line consumer
#[derive(Debug)]
enum PortEvent {
    /// Bytes read while the purge generation was `generation`
    Data { generation: u64, bytes: Vec<u8> },
    /// The port failed; the pump has stopped
    Failed(String),
}

/// One open serial connection
pub struct SerialChannel {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    shutdown: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    pump: Option<JoinHandle<()>>,
    subscription: Option<LineSubscription>,
}

impl SerialChannel {
    /// Open a hardware port and start pumping it
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let port = RealSerialPort::open(params)?;
        Self::from_port(Box::new(port), params.queue_capacity)
    }

    /// Start pumping an already open port
    ///
    /// `capacity` bounds the number of unread chunks; when it is reached the
    /// pump stops reading and the driver's own buffering and XON/XOFF take over.
    pub fn from_port(port: Box<dyn SerialPort>, capacity: usize) -> Result<Self> {
        let name = port.name();
        let mut reader = match port.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                let mut port = port;
                let _ = port.close();
                return Err(ConnectionError::FailedToOpen {
                    port: name,
                    reason: format!("cannot clone port for reading: {}", e),
                }
                .into());
            }
        };

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(AtomicU64::new(0));

        let pump = {
            let shutdown = Arc::clone(&shutdown);
            let generation = Arc::clone(&generation);
            let port_name = name.clone();
            std::thread::Builder::new()
                .name(format!("serial-pump:{}", name))
                .spawn(move || {
                    pump_port(reader.as_mut(), &tx, &shutdown, &generation, &port_name);
                    let _ = reader.close();
                })
                .map_err(|e| ConnectionError::FailedToOpen {
                    port: name.clone(),
                    reason: format!("cannot start reader thread: {}", e),
                })?
        };

        let subscription = LineSubscription {
            rx,
            framer: LineFramer::new(),
            ready: VecDeque::new(),
            generation: Arc::clone(&generation),
            seen_generation: 0,
            ended: false,
        };

        Ok(Self {
            name,
            port: Some(port),
            shutdown,
            generation,
            pump: Some(pump),
            subscription: Some(subscription),
        })
    }

    /// Port name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the port is still held
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Write raw bytes and flush them to the device
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is closed"))?;
        port.write_all(data)
    }

    /// Take the line stream of this connection
    ///
    /// There is exactly one stream per connection; a second call fails.
    pub fn subscribe_lines(&mut self) -> Result<LineSubscription> {
        self.subscription
            .take()
            .ok_or_else(|| Error::other(format!("lines of {} are already subscribed", self.name)))
    }

    /// Discard everything received so far
    ///
    /// Clears the driver buffers and invalidates chunks already queued, along
    /// with any partial line the subscriber holds.
    pub fn purge(&mut self) -> io::Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel is closed"))?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        port.purge()?;
        tracing::debug!(port = %self.name, "Purged serial input");
        Ok(())
    }

    /// Release the port; safe to call any number of times
    pub fn close(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.close() {
                tracing::warn!(port = %self.name, "Error closing port: {}", e);
            }
            tracing::info!(port = %self.name, "Serial port closed");
        }
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                tracing::error!(port = %self.name, "Serial pump thread panicked");
            }
        }
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn pump_port(
    reader: &mut dyn SerialPort,
    tx: &mpsc::Sender<PortEvent>,
    shutdown: &AtomicBool,
    generation: &AtomicU64,
    port_name: &str,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    while !shutdown.load(Ordering::SeqCst) {
        match reader.read(&mut buf) {
            Ok(0) => {
                tracing::debug!(port = %port_name, "Serial port reached end of stream");
                break;
            }
            Ok(n) => {
                let event = PortEvent::Data {
                    generation: generation.load(Ordering::SeqCst),
                    bytes: buf[..n].to_vec(),
                };
                if !forward(tx, event, shutdown) {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                if !shutdown.load(Ordering::SeqCst) {
                    tracing::error!(port = %port_name, "Serial read failed: {}", e);
                    forward(tx, PortEvent::Failed(e.to_string()), shutdown);
                }
                break;
            }
        }
    }
}

/// Queue one event, waiting while the consumer is behind
///
/// Returns false when the consumer is gone or the channel is shutting down.
fn forward(tx: &mpsc::Sender<PortEvent>, mut event: PortEvent, shutdown: &AtomicBool) -> bool {
    loop {
        match tx.try_send(event) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(back)) => {
                if shutdown.load(Ordering::SeqCst) {
                    return false;
                }
                event = back;
                std::thread::sleep(QUEUE_FULL_BACKOFF);
            }
        }
    }
}

/// Framed lines of one connection, in arrival order
pub struct LineSubscription {
    rx: mpsc::Receiver<PortEvent>,
    framer: LineFramer,
    ready: VecDeque<String>,
    generation: Arc<AtomicU64>,
    seen_generation: u64,
    ended: bool,
}

impl LineSubscription {
    /// Wait for the next complete line
    ///
    /// Returns `Ok(None)` once the connection is closed; a trailing fragment
    /// without newline is dropped at that point. Cancel safe: no line is lost
    /// if the returned future is dropped.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            self.apply_purge();
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.ended {
                return Ok(None);
            }
            let event = self.rx.recv().await;
            self.handle(event)?;
        }
    }

    /// Lines that are already available, without waiting
    pub fn drain_ready(&mut self) -> io::Result<Vec<String>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => self.handle(Some(event))?,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.handle(None)?;
                    break;
                }
            }
        }
        self.apply_purge();
        Ok(self.ready.drain(..).collect())
    }

    fn handle(&mut self, event: Option<PortEvent>) -> io::Result<()> {
        match event {
            Some(PortEvent::Data { generation, bytes }) => {
                self.apply_purge();
                if generation < self.seen_generation {
                    tracing::trace!(bytes = bytes.len(), "Dropping purged chunk");
                    return Ok(());
                }
                self.ready.extend(self.framer.push(&bytes));
                Ok(())
            }
            Some(PortEvent::Failed(reason)) => {
                self.ended = true;
                self.framer.finish();
                Err(io::Error::new(io::ErrorKind::BrokenPipe, reason))
            }
            None => {
                self.ended = true;
                self.framer.finish();
                Ok(())
            }
        }
    }

    fn apply_purge(&mut self) {
        let current = self.generation.load(Ordering::SeqCst);
        if current != self.seen_generation {
            self.seen_generation = current;
            self.ready.clear();
            self.framer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::virtual_port::VirtualPort;

    fn ok_device(line: &str) -> Vec<String> {
        if line.starts_with("M114") {
            vec!["X:1.00 Y:2.00 Z:3.00".to_string(), "ok".to_string()]
        } else {
            vec!["ok".to_string()]
        }
    }

    #[tokio::test]
    async fn test_lines_arrive_in_order() {
        let port = VirtualPort::new("virtual", ok_device).with_max_read(4);
        let mut channel = SerialChannel::from_port(Box::new(port), 8).unwrap();
        let mut lines = channel.subscribe_lines().unwrap();

        channel.write(b"M114\nG28\n").unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("X:1.00 Y:2.00 Z:3.00"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ok"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ok"));
        channel.close();
    }

    #[tokio::test]
    async fn test_single_subscription() {
        let port = VirtualPort::new("virtual", ok_device);
        let mut channel = SerialChannel::from_port(Box::new(port), 8).unwrap();
        assert!(channel.subscribe_lines().is_ok());
        assert!(channel.subscribe_lines().is_err());
    }

    #[tokio::test]
    async fn test_purge_drops_queued_lines() {
        let port = VirtualPort::new("virtual", ok_device);
        let handle = port.clone();
        let mut channel = SerialChannel::from_port(Box::new(port), 8).unwrap();
        let mut lines = channel.subscribe_lines().unwrap();

        handle.inject(b"start\necho:boot\npartial");
        tokio::time::sleep(Duration::from_millis(60)).await;
        channel.purge().unwrap();
        assert!(lines.drain_ready().unwrap().is_empty());

        channel.write(b"G28\n").unwrap();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_ends_stream() {
        let port = VirtualPort::new("virtual", ok_device);
        let mut channel = SerialChannel::from_port(Box::new(port), 8).unwrap();
        let mut lines = channel.subscribe_lines().unwrap();

        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert!(channel.write(b"G28\n").is_err());
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
