//! Simulated message receiver
//!
//! Incoming messages wait in the queue file [`QUEUE_FILE`] as records of
//! `[sender_len u8][sender][body_len u16 LE][body]`. While idle, each step
//! materializes the head record as `SENDER.MSG` / `INBOX.MSG`, raises the
//! interrupt and waits. Command 1 acknowledges: the head record is popped
//! and the device goes idle again. A queue that cannot be parsed is deleted.

use slotbus_bus::mailbox::{INBOX_FILE, SENDER_FILE};
use slotbus_bus::{PeripheralName, Word};

use super::Peripheral;
use crate::{DeviceContext, DiskError, VirtualDisk};

/// Queue of undelivered messages on the virtual disk
pub const QUEUE_FILE: &str = ".msgq.sys";


const REG_COMMAND: u16 = 0x00;
const CMD_ACK: Word = 1;

const STATE_IDLE: Word = 0;
const STATE_WAITING: Word = 1;

/// Append a message to the receiver's queue
///
/// Senders longer than 255 bytes are truncated to fit the length byte.
pub fn enqueue_message(disk: &mut VirtualDisk, sender: &[u8], body: &[u8]) -> crate::Result<()> {
    let sender = &sender[..sender.len().min(u8::MAX as usize)];
    let body_len = u16::try_from(body.len()).map_err(|_| DiskError::QuotaExceeded)?;

    let mut queue = match disk.read(QUEUE_FILE) {
        Ok(data) => data.to_vec(),
        Err(DiskError::NotFound) => Vec::new(),
        Err(err) => return Err(err),
    };
    queue.push(sender.len() as u8);
    queue.extend_from_slice(sender);
    queue.extend_from_slice(&body_len.to_le_bytes());
    queue.extend_from_slice(body);
    disk.write(QUEUE_FILE, &queue)
}

enum Head<'q> {
    Message { sender: &'q [u8], body: &'q [u8], len: usize },
    /// Header present, body cut short
    Incomplete,
    Corrupt,
}

fn parse_head(queue: &[u8]) -> Head<'_> {
    let Some((&sender_len, rest)) = queue.split_first() else {
        return Head::Corrupt;
    };
    let sender_len = sender_len as usize;
    if rest.len() < sender_len + 2 {
        return Head::Corrupt;
    }
    let (sender, rest) = rest.split_at(sender_len);
    let body_len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
    let rest = &rest[2..];
    if rest.len() < body_len {
        return Head::Incomplete;
    }
    Head::Message { sender, body: &rest[..body_len], len: 1 + sender_len + 2 + body_len }
}

pub struct MessageReceiverDevice {
    state: Word,
}

impl MessageReceiverDevice {
    pub fn new() -> Self {
        Self { state: STATE_IDLE }
    }

    fn acknowledge(&mut self, disk: &mut VirtualDisk) {
        self.state = STATE_IDLE;
        let queue = match disk.read(QUEUE_FILE) {
            Ok(data) => data.to_vec(),
            Err(DiskError::NotFound) => return,
            Err(err) => {
                log::warn!("sim: receiver cannot read queue on ack: {}", err);
                return;
            }
        };
        let outcome = match parse_head(&queue) {
            Head::Message { len, .. } if len == queue.len() => disk.delete(QUEUE_FILE),
            Head::Message { len, .. } => disk.write(QUEUE_FILE, &queue[len..]),
            Head::Incomplete | Head::Corrupt => disk.delete(QUEUE_FILE),
        };
        if let Err(err) = outcome {
            log::warn!("sim: receiver cannot update queue: {}", err);
        }
    }

    fn deliver_head(&mut self, ctx: &mut DeviceContext<'_>) {
        let disk = ctx.core.disk_mut();
        let queue = match disk.read(QUEUE_FILE) {
            Ok(data) => data.to_vec(),
            Err(DiskError::NotFound) => return,
            Err(err) => {
                log::warn!("sim: receiver cannot read queue: {}", err);
                return;
            }
        };
        match parse_head(&queue) {
            Head::Message { sender, body, .. } => {
                if let Err(err) = disk.write(SENDER_FILE, sender).and_then(|()| disk.write(INBOX_FILE, body)) {
                    log::warn!("sim: receiver cannot materialize mailbox: {}", err);
                    return;
                }
            }
            Head::Incomplete => {
                log::warn!("sim: receiver found an incomplete message in its queue");
                return;
            }
            Head::Corrupt => {
                log::warn!("sim: receiver queue is corrupt, discarding it");
                if let Err(err) = disk.delete(QUEUE_FILE) {
                    log::warn!("sim: receiver cannot discard corrupt queue: {}", err);
                }
                return;
            }
        }
        self.state = STATE_WAITING;
        ctx.raise_interrupt();
    }
}

impl Default for MessageReceiverDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for MessageReceiverDevice {
    fn name(&self) -> PeripheralName {
        PeripheralName::from_static(b"MSGRECV")
    }

    fn read_word(&self, offset: u16) -> Word {
        match offset {
            REG_COMMAND => self.state,
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u16, value: Word, ctx: &mut DeviceContext<'_>) {
        if offset == REG_COMMAND && value == CMD_ACK {
            self.acknowledge(ctx.core.disk_mut());
        }
    }

    fn step(&mut self, ctx: &mut DeviceContext<'_>) {
        if self.state == STATE_IDLE {
            self.deliver_head(ctx);
        }
    }
}
