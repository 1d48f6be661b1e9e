//! Slotbus Runtime - Register-level access to the expansion bus
//!
//! # Purpose
//! Provides the primitives every Slotbus driver is built on: typed register
//! ports, the 16-slot peripheral table, name-based peripheral discovery, the
//! generic command/status exchange and the shared interrupt-mask register.
//!
//! # Integration Points
//! - Depends on: a [`RegisterBus`] implementation (real MMIO or simulated)
//! - Provides to: device drivers, the message daemon
//! - Hardware touched: expansion slot table, interrupt-mask register
//!
//! # Architecture
//! All register traffic funnels through [`RegisterBus`]. [`MmioBus`] talks to
//! real memory with volatile accesses; hosts substitute a simulated machine
//! that implements the same trait. Nothing in this crate caches bus state:
//! every discovery call re-reads the slot table.
//!
//! # Testing Strategy
//! - Unit tests: slot addressing, name matching, exchange ordering, mask
//!   clearing against an in-memory bus
//! - Integration tests: drivers and daemon against the simulated machine

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod discovery;
mod exchange;
mod interrupts;
mod layout;
pub mod mailbox;
mod name;
mod port;
mod slot;

#[cfg(test)]
pub(crate) mod testing;

pub use discovery::find_peripheral;
pub use exchange::{CommandExchange, Status, MAX_PARAMS};
pub use interrupts::{
    without_interrupts, IntMask, InterruptControl, InterruptRegister, WaitForInterrupt,
};
pub use layout::{BusLayout, NAME_LEN, SLOT_COUNT};
pub use name::PeripheralName;
pub use port::{MmioBus, RegisterAddress, RegisterBus, RegisterPort, Word};
pub use slot::{Occupants, ParamRegister, PeripheralHandle, SlotIndex, SlotTable};

use thiserror::Error;

/// Bus-level error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("device not found: {name}")]
    DeviceNotFound { name: PeripheralName },

    #[error("invalid peripheral name")]
    InvalidName,

    #[error("slot index {index} out of range")]
    SlotOutOfRange { index: usize },

    #[error("address {addr:#06x} is not a slot base")]
    NotASlot { addr: u16 },

    #[error("invalid bus layout: {0}")]
    InvalidLayout(&'static str),
}

pub type Result<T> = core::result::Result<T, BusError>;
