//! Slotbus Drivers - Device vocabularies over the command/status exchange
//!
//! # Purpose
//! Thin, device-specific drivers for the peripherals a Slotbus program talks
//! to: the filesystem behind the global FS ports, the camera, the message
//! sender and the message receiver on the expansion bus.
//!
//! # Integration Points
//! - Depends on: `slotbus-bus` (register ports, discovery, exchange)
//! - Provides to: applications, the message daemon
//! - Hardware touched: FS ports, slots named `CAMERA`, `MSGSNDR`, `MSGRECV`
//!
//! # Architecture
//! Every operation is one [`CommandExchange`](slotbus_bus::CommandExchange).
//! The filesystem ports are global and shared with the interrupt handler, so
//! each filesystem exchange (including follow-up reads of the size
//! registers) runs with interrupts disabled. Camera and sender commands are
//! fire-and-forget: the hardware offers no completion signal through them.
//!
//! # Testing Strategy
//! - Unit tests: status decoding, name validation, scratch checks
//! - Integration tests: every driver against the simulated machine

#![no_std]

extern crate alloc;

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod camera;
pub mod fs;
pub mod receiver;
pub mod sender;

pub use camera::Camera;
pub use fs::{
    DirEntries, FileMeta, FileTime, Filesystem, FreeSpace, FsCommand, FsPorts, FsStatus, Scratch,
};
pub use receiver::MessageReceiver;
pub use sender::MessageSender;

use slotbus_bus::BusError;
use thiserror::Error;

/// Driver error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("{command:?} failed: {status}")]
    Fs { command: FsCommand, status: FsStatus },

    #[error("file name must be 1..=16 bytes without NUL")]
    InvalidFileName,

    #[error("recipient must be non-empty and free of NUL bytes")]
    InvalidRecipient,

    #[error("{size} bytes do not fit a {capacity}-byte buffer")]
    BufferTooSmall { size: usize, capacity: usize },

    #[error("invalid scratch region: {0}")]
    InvalidScratch(&'static str),
}

pub type Result<T> = core::result::Result<T, DriverError>;
