//! Byte-stream transport abstraction
//!
//! The ANC350 speaks its telegram protocol over either TCP or a serial
//! line. [`Transport`] is the seam between the protocol client and the
//! actual connection: blocking writes, bounded-timeout reads, and a way to
//! discard stale input left over from an abandoned exchange.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Default TCP port of the ANC350's telegram interface.
pub const DEFAULT_PORT: u16 = 2101;

/// Default per-call read/write timeout.
///
/// Kept sub-second: the surrounding poller re-issues requests every cycle,
/// so a stuck exchange should fail fast rather than stall the poll loop.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Errors reported by a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Low-level I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish the connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Serial port fault.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,
}

/// A byte-stream connection to a controller.
///
/// `read` returns `Ok(0)` when nothing arrived before the configured
/// timeout; the protocol layer counts that against its read-attempt budget.
/// Any `Err` is a transport fault.
pub trait Transport: Send {
    /// Write `bytes`, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `buf.len()` bytes, waiting at most the configured
    /// timeout. `Ok(0)` means the timeout expired with nothing received.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Throw away any bytes already received but not yet read.
    fn discard_input(&mut self) -> Result<(), TransportError>;

    /// Change the per-call read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;
}

/// TCP transport for controllers on the network.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to a controller at the given socket address.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(&addr)
            .map_err(|e| TransportError::ConnectionFailed(format!("TCP connect failed: {e}")))?;
        stream.set_read_timeout(Some(DEFAULT_TIMEOUT))?;
        stream.set_write_timeout(Some(DEFAULT_TIMEOUT))?;
        stream.set_nodelay(true)?;
        debug!("connected to controller via TCP");
        Ok(Self { stream })
    }

    /// Connect using the default telegram port.
    pub fn connect_default_port(ip: &str) -> Result<Self, TransportError> {
        Self::connect(format!("{ip}:{DEFAULT_PORT}"))
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let sent = self.stream.write(bytes)?;
        self.stream.flush()?;
        Ok(sent)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.stream.read(buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        // Drain without blocking; stale bytes here are replies to exchanges
        // that were already given up on.
        self.stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 256];
        let result = loop {
            match self.stream.read(&mut scratch) {
                Ok(0) => break Err(TransportError::Closed),
                Ok(n) => {
                    debug!("discarded {n} stale bytes");
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e.into()),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }
}

/// Serial transport for controllers on an RS-232 line.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open the given serial device at `baud`.
    pub fn open(path: &str, baud: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;
        debug!("opened controller serial port {path} at {baud} baud");
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let sent = self.port.write(bytes)?;
        self.port.flush()?;
        Ok(sent)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }
}
