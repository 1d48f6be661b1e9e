//! Simulated expansion-bus devices
//!
//! A device only sees offsets relative to its slot base. The machine serves
//! the name field itself from [`Peripheral::name`]; every other offset is
//! routed to the device.

pub mod camera;
pub mod receiver;
pub mod sender;

pub use camera::CameraDevice;
pub use receiver::{enqueue_message, MessageReceiverDevice, QUEUE_FILE};
pub use sender::{Envelope, MessageSenderDevice};

use slotbus_bus::{PeripheralName, Word};

use crate::DeviceContext;

pub trait Peripheral: Send {
    /// Name advertised in the slot's name field
    fn name(&self) -> PeripheralName;

    fn read_word(&self, offset: u16) -> Word;

    fn write_word(&mut self, offset: u16, value: Word, ctx: &mut DeviceContext<'_>);

    /// Called whenever the machine lets time pass
    fn step(&mut self, _ctx: &mut DeviceContext<'_>) {}
}

/// Word at byte `offset` of a name field: two ASCII bytes, low byte first
pub fn encode_name_word(name: &PeripheralName, offset: u16) -> Word {
    let bytes = name.as_bytes();
    let at = |i: usize| bytes.get(i).copied().unwrap_or(0) as Word;
    let i = (offset & !1) as usize;
    at(i) | (at(i + 1) << 8)
}
