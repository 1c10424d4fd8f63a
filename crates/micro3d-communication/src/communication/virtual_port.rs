//! In-memory serial port
//!
//! A [`VirtualPort`] behaves like a real port to the rest of the stack but is
//! wired to a [`VirtualDevice`] that answers each command line. It backs the
//! `--simulate` mode and the protocol tests.

use crate::communication::framer::LineFramer;
use crate::communication::serial::SerialPort;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Device on the far side of a virtual port
pub trait VirtualDevice: Send {
    /// Lines the device prints right after the port opens
    fn boot_banner(&mut self) -> Vec<String> {
        Vec::new()
    }

    /// Answer one received command line
    fn on_line(&mut self, line: &str) -> Vec<String>;
}

impl<F> VirtualDevice for F
where
    F: FnMut(&str) -> Vec<String> + Send,
{
    fn on_line(&mut self, line: &str) -> Vec<String> {
        self(line)
    }
}

struct Link {
    device: Mutex<DeviceSide>,
    inbound: Mutex<VecDeque<u8>>,
    data_ready: Condvar,
    closed: Mutex<bool>,
}

struct DeviceSide {
    device: Box<dyn VirtualDevice>,
    framer: LineFramer,
    received: Vec<String>,
}

/// Handle to an in-memory port
///
/// Clones share the same link, the way two OS handles share one tty.
pub struct VirtualPort {
    name: String,
    link: Arc<Link>,
    read_timeout: Duration,
    max_read: usize,
}

impl VirtualPort {
    /// Connect a new port to `device`; its boot banner is queued immediately
    pub fn new(name: impl Into<String>, device: impl VirtualDevice + 'static) -> Self {
        let mut device: Box<dyn VirtualDevice> = Box::new(device);
        let banner = device.boot_banner();
        let link = Arc::new(Link {
            device: Mutex::new(DeviceSide {
                device,
                framer: LineFramer::new(),
                received: Vec::new(),
            }),
            inbound: Mutex::new(VecDeque::new()),
            data_ready: Condvar::new(),
            closed: Mutex::new(false),
        });
        let port = Self {
            name: name.into(),
            link,
            read_timeout: Duration::from_millis(20),
            max_read: usize::MAX,
        };
        port.inject_lines(&banner);
        port
    }

    /// Limit every read to at most `max` bytes, to exercise chunked framing
    pub fn with_max_read(mut self, max: usize) -> Self {
        self.max_read = max.max(1);
        self
    }

    /// Set how long a read waits for data before reporting a timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Push raw bytes towards the host as if the device had sent them
    pub fn inject(&self, bytes: &[u8]) {
        self.link.inbound.lock().extend(bytes.iter().copied());
        self.link.data_ready.notify_all();
    }

    /// Push whole lines towards the host
    pub fn inject_lines(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let mut bytes = Vec::new();
        for line in lines {
            bytes.extend_from_slice(line.as_bytes());
            bytes.push(b'\n');
        }
        self.inject(&bytes);
    }

    /// Every command line the device has received so far
    pub fn received_lines(&self) -> Vec<String> {
        self.link.device.lock().received.clone()
    }

    /// Bytes waiting to be read by the host
    pub fn pending_input(&self) -> usize {
        self.link.inbound.lock().len()
    }

    /// Whether any handle has closed the link
    pub fn is_closed(&self) -> bool {
        *self.link.closed.lock()
    }
}

impl Clone for VirtualPort {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            link: Arc::clone(&self.link),
            read_timeout: self.read_timeout,
            max_read: self.max_read,
        }
    }
}

impl SerialPort for VirtualPort {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port is closed"));
        }
        let replies = {
            let mut side = self.link.device.lock();
            let lines = side.framer.push(data);
            let mut replies = Vec::new();
            for line in lines {
                side.received.push(line.clone());
                replies.extend(side.device.on_line(&line));
            }
            replies
        };
        self.inject_lines(&replies);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbound = self.link.inbound.lock();
        if inbound.is_empty() {
            if self.is_closed() {
                return Ok(0);
            }
            let _ = self.link.data_ready.wait_for(&mut inbound, self.read_timeout);
            if inbound.is_empty() {
                if self.is_closed() {
                    return Ok(0);
                }
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
        }
        let count = inbound.len().min(buf.len()).min(self.max_read);
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn purge(&mut self) -> io::Result<()> {
        let dropped = {
            let mut inbound = self.link.inbound.lock();
            let dropped = inbound.len();
            inbound.clear();
            dropped
        };
        tracing::debug!(port = %self.name, bytes = dropped, "Purged virtual port input");
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn SerialPort>> {
        Ok(Box::new(self.clone()))
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        *self.link.closed.lock() = true;
        self.link.data_ready.notify_all();
        Ok(())
    }
}
