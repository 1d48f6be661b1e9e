//! Slotbus Simulator - A host-side stand-in for the Slotbus machine
//!
//! # Purpose
//! Lets drivers, the message daemon and the CLI run on a development host
//! without the real hardware. [`Machine`] implements the same
//! [`RegisterBus`](slotbus_bus::RegisterBus),
//! [`InterruptControl`](slotbus_bus::InterruptControl) and
//! [`WaitForInterrupt`](slotbus_bus::WaitForInterrupt) traits as the real
//! machine, so code under test cannot tell the difference.
//!
//! # Memory map
//! - 64 KiB of RAM everywhere not listed below
//! - the 16-slot expansion table (unoccupied slots read as zero)
//! - the interrupt-mask register (read = pending, write = clear bits)
//! - six consecutive filesystem ports backed by a [`VirtualDisk`]
//!
//! # Devices
//! [`peripherals`] provides a camera, a message sender and a message
//! receiver that can be plugged into any slot.

pub mod clock;
pub mod disk;
mod fs_device;
mod machine;
pub mod peripherals;

pub use clock::Timestamp;
pub use disk::{VirtualDisk, MAX_DISK_BYTES};
pub use machine::{Core, DeviceContext, Machine, MachineConfig};
pub use peripherals::Peripheral;

use thiserror::Error;

/// Virtual disk error types
#[derive(Debug, Error)]
pub enum DiskError {
    #[error("file not found")]
    NotFound,

    #[error("invalid filename")]
    InvalidName,

    #[error("disk quota exceeded")]
    QuotaExceeded,

    #[error("host storage: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, DiskError>;
