//! attocube ANC350 Piezo Motion Controller Driver
//!
//! This crate drives the ANC350 over its binary telegram protocol
//! (see [`ucprotocol`]) on a TCP or serial byte stream.
//!
//! # Overview
//!
//! Two layers are exposed:
//!
//! - [`ProtocolClient`]: one request/reply exchange at a time against a
//!   [`Transport`]: encode a Get or Set telegram, recover the matching Ack
//!   by correlation number, with the bounded retry discipline the
//!   controller needs on a stream with no framing beyond a length prefix.
//! - [`Anc350`]: a controller instance owning a set of axes and a
//!   background poller that derives motion-control state (position,
//!   direction, homed, hard limits, moving/done, communication health)
//!   from periodic protocol reads, publishing snapshots through a
//!   callback.
//!
//! # Example
//!
//! ```no_run
//! use anc350::{Anc350, ControllerConfig, TcpTransport};
//! use ucprotocol::CorrelationCounter;
//!
//! let transport = TcpTransport::connect_default_port("192.168.1.50")?;
//! let controller = Anc350::new(
//!     ControllerConfig::new(0, 3),
//!     Box::new(transport),
//!     CorrelationCounter::new(),
//! )?;
//! controller.start(Box::new(|axis| {
//!     println!("axis {} at {} (done={})", axis.axis, axis.position, axis.done);
//! }))?;
//!
//! controller.move_to(1, 250_000, false)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Concurrency
//!
//! One poller thread runs per controller. Motion commands execute on the
//! caller's thread, take the target axis's lock, and wake the poller so
//! status follows promptly. A controller-level lock around the protocol
//! client keeps exactly one exchange in flight per transport.

mod axis;
mod client;
mod controller;
mod health;
mod poller;
mod registry;
mod transport;

pub use axis::{AxisState, Direction, DIRECTION_DEADBAND, POSITION_SCALE};
pub use client::{ProtocolClient, ProtocolError, ProtocolResult};
pub use controller::{
    Anc350, ControllerConfig, DriverError, PollIntervals, StatusCallback,
    DEFAULT_IDLE_POLL_INTERVAL, DEFAULT_MOVING_POLL_INTERVAL,
};
pub use health::{CommHealth, COMM_FAILURE_THRESHOLD};
pub use registry::{ControllerRegistry, RegistryError};
pub use transport::{SerialTransport, TcpTransport, Transport, TransportError, DEFAULT_PORT};
