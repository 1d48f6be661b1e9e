//! Message sender driver
//!
//! Parameter 1 holds the address of the NUL-terminated recipient, 2 the body
//! address and 3 the body length. Command 1 sends. Delivery is not
//! observable: no status is read back.

use slotbus_bus::{
    find_peripheral, BusLayout, CommandExchange, ParamRegister, PeripheralHandle, PeripheralName,
    RegisterAddress, RegisterBus,
};

use crate::{DriverError, Result, Scratch};

/// Name the message sender advertises in its slot
pub const MSGSNDR: PeripheralName = PeripheralName::from_static(b"MSGSNDR");

const CMD_SEND: u16 = 1;

pub struct MessageSender<'b, B: ?Sized> {
    bus: &'b B,
    handle: PeripheralHandle,
}

impl<'b, B: RegisterBus + ?Sized> MessageSender<'b, B> {
    pub fn new(bus: &'b B, handle: PeripheralHandle) -> Self {
        Self { bus, handle }
    }

    pub fn find(bus: &'b B, layout: &BusLayout) -> Result<Self> {
        let handle = find_peripheral(bus, layout, &MSGSNDR)?;
        Ok(Self::new(bus, handle))
    }

    pub fn handle(&self) -> PeripheralHandle {
        self.handle
    }

    /// Send `len` bytes at `body` to the recipient string at `recipient`
    pub fn send(&self, recipient: RegisterAddress, body: RegisterAddress, len: u16) {
        log::debug!("sender: {} bytes at {} to recipient at {}", len, body, recipient);
        CommandExchange::new(self.bus, self.handle.command_register())
            .param(self.handle.param_register(ParamRegister::First), recipient.get())
            .param(self.handle.param_register(ParamRegister::Second), body.get())
            .param(self.handle.param_register(ParamRegister::Third), len)
            .fire(CMD_SEND);
    }

    /// Copy recipient and body into `scratch` and send them
    ///
    /// The recipient (plus terminator) lands at the start of the data
    /// region, the body right after it.
    pub fn send_staged(&self, scratch: &Scratch, recipient: &str, body: &[u8]) -> Result<()> {
        let to = recipient.as_bytes();
        if to.is_empty() || to.contains(&0) {
            return Err(DriverError::InvalidRecipient);
        }
        let needed = to.len() + 1 + body.len();
        if needed > scratch.capacity as usize {
            return Err(DriverError::BufferTooSmall {
                size: needed,
                capacity: scratch.capacity as usize,
            });
        }

        let to_addr = scratch.data;
        let body_addr = scratch.data.offset(to.len() as u16 + 1);
        self.bus.write_bytes(to_addr, to);
        self.bus.write_byte(to_addr.offset(to.len() as u16), 0);
        self.bus.write_bytes(body_addr, body);

        self.send(to_addr, body_addr, body.len() as u16);
        Ok(())
    }
}
