//! Simulated message sender
//!
//! On command 1 the device reads the recipient string and the body out of
//! RAM and hands them to whoever holds the other end of its channel.

use crossbeam::channel::{self, Receiver, Sender};
use slotbus_bus::{PeripheralName, Word};

use super::Peripheral;
use crate::DeviceContext;

const REG_COMMAND: u16 = 0x00;
const REG_RECIPIENT: u16 = 0x02;
const REG_BODY: u16 = 0x04;
const REG_LENGTH: u16 = 0x06;

const CMD_SEND: Word = 1;

/// Longest recipient the device reads, excluding the terminator
const RECIPIENT_MAX: usize = 255;

/// One outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub recipient: String,
    pub body: Vec<u8>,
}

pub struct MessageSenderDevice {
    recipient: Word,
    body: Word,
    length: Word,
    outbox: Sender<Envelope>,
}

impl MessageSenderDevice {
    /// A device plus the receiving end of its outbox
    pub fn new() -> (Self, Receiver<Envelope>) {
        let (outbox, inbox) = channel::unbounded();
        (Self { recipient: 0, body: 0, length: 0, outbox }, inbox)
    }

    fn send(&self, ctx: &mut DeviceContext<'_>) {
        let Some(recipient) = ctx.core.read_c_string(self.recipient, RECIPIENT_MAX) else {
            log::warn!("sim: sender could not read recipient at {:#06x}", self.recipient);
            return;
        };
        let envelope = Envelope {
            recipient: String::from_utf8_lossy(&recipient).into_owned(),
            body: ctx.core.read_wrapping(self.body, self.length as usize),
        };
        log::debug!("sim: sender dispatching {} bytes to {}", envelope.body.len(), envelope.recipient);
        if self.outbox.send(envelope).is_err() {
            log::debug!("sim: sender outbox has no reader, message dropped");
        }
    }
}

impl Peripheral for MessageSenderDevice {
    fn name(&self) -> PeripheralName {
        PeripheralName::from_static(b"MSGSNDR")
    }

    fn read_word(&self, offset: u16) -> Word {
        match offset {
            REG_RECIPIENT => self.recipient,
            REG_BODY => self.body,
            REG_LENGTH => self.length,
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u16, value: Word, ctx: &mut DeviceContext<'_>) {
        match offset {
            REG_COMMAND if value == CMD_SEND => self.send(ctx),
            REG_RECIPIENT => self.recipient = value,
            REG_BODY => self.body = value,
            REG_LENGTH => self.length = value,
            _ => {}
        }
    }
}
