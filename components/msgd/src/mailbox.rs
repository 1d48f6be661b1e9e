//! Mailbox files and the store they live in

use alloc::borrow::Cow;
use alloc::string::String;
use core::fmt;

use slotbus_bus::{InterruptControl, RegisterBus};
use slotbus_drivers::{Filesystem, Result};

pub use slotbus_bus::mailbox::{INBOX_FILE, SENDER_FILE};

/// Size of each receive buffer, terminator included
pub const MAILBOX_CAPACITY: usize = 256;

/// Mailbox files at or above this size are rejected, leaving room for the
/// terminator
pub const MAX_CONTENT: usize = MAILBOX_CAPACITY - 1;

/// Where the mailbox files are read from and deleted
pub trait MailboxStore {
    /// Size of `name`, or `None` if it cannot be determined
    fn size(&mut self, name: &str) -> Option<u16>;

    /// Read all of `name` into `buf`, returning its length
    fn read_into(&mut self, name: &str, buf: &mut [u8]) -> Result<usize>;

    fn delete(&mut self, name: &str) -> Result<()>;
}

impl<B: RegisterBus + InterruptControl + ?Sized> MailboxStore for Filesystem<'_, B> {
    fn size(&mut self, name: &str) -> Option<u16> {
        Filesystem::size(self, name)
    }

    fn read_into(&mut self, name: &str, buf: &mut [u8]) -> Result<usize> {
        Filesystem::read_into(self, name, buf)
    }

    fn delete(&mut self, name: &str) -> Result<()> {
        Filesystem::delete(self, name)
    }
}

/// One delivered message
///
/// Both parts sit in fixed buffers with a NUL right after the content.
#[derive(Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    sender: [u8; MAILBOX_CAPACITY],
    sender_len: usize,
    body: [u8; MAILBOX_CAPACITY],
    body_len: usize,
}

impl MailboxMessage {
    pub(crate) fn empty() -> Self {
        Self {
            sender: [0; MAILBOX_CAPACITY],
            sender_len: 0,
            body: [0; MAILBOX_CAPACITY],
            body_len: 0,
        }
    }

    pub(crate) fn sender_buf(&mut self) -> &mut [u8; MAILBOX_CAPACITY] {
        &mut self.sender
    }

    pub(crate) fn body_buf(&mut self) -> &mut [u8; MAILBOX_CAPACITY] {
        &mut self.body
    }

    /// Fix the content lengths and write the terminators
    ///
    /// Both lengths must be below [`MAILBOX_CAPACITY`].
    pub(crate) fn terminate(&mut self, sender_len: usize, body_len: usize) {
        self.sender_len = sender_len;
        self.body_len = body_len;
        self.sender[sender_len] = 0;
        self.body[body_len] = 0;
    }

    pub fn sender(&self) -> &[u8] {
        &self.sender[..self.sender_len]
    }

    pub fn body(&self) -> &[u8] {
        &self.body[..self.body_len]
    }

    /// Sender including its terminator
    pub fn sender_with_nul(&self) -> &[u8] {
        &self.sender[..=self.sender_len]
    }

    /// Body including its terminator
    pub fn body_with_nul(&self) -> &[u8] {
        &self.body[..=self.body_len]
    }

    pub fn sender_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.sender())
    }

    pub fn body_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.body())
    }
}

impl fmt::Debug for MailboxMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxMessage")
            .field("sender", &self.sender_lossy())
            .field("body", &self.body_lossy())
            .finish()
    }
}
