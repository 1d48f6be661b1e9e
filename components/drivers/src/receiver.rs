//! Message receiver driver
//!
//! The receiver materializes the head of its queue as the mailbox files and
//! raises its interrupt bit. Command 1 acknowledges the current mailbox so
//! the device may move on to the next queued message.

use slotbus_bus::{
    find_peripheral, BusLayout, CommandExchange, PeripheralHandle, PeripheralName, RegisterBus,
    SlotIndex,
};

use crate::Result;

/// Name the message receiver advertises in its slot
pub const MSGRECV: PeripheralName = PeripheralName::from_static(b"MSGRECV");

const CMD_ACK: u16 = 1;

pub struct MessageReceiver<'b, B: ?Sized> {
    bus: &'b B,
    handle: PeripheralHandle,
}

impl<'b, B: RegisterBus + ?Sized> MessageReceiver<'b, B> {
    pub fn new(bus: &'b B, handle: PeripheralHandle) -> Self {
        Self { bus, handle }
    }

    pub fn find(bus: &'b B, layout: &BusLayout) -> Result<Self> {
        let handle = find_peripheral(bus, layout, &MSGRECV)?;
        Ok(Self::new(bus, handle))
    }

    pub fn handle(&self) -> PeripheralHandle {
        self.handle
    }

    /// Slot whose interrupt bit belongs to this receiver
    pub fn slot(&self) -> SlotIndex {
        self.handle.slot()
    }

    /// Tell the device the current mailbox was consumed
    pub fn acknowledge(&self) {
        CommandExchange::new(self.bus, self.handle.command_register()).fire(CMD_ACK);
    }
}
