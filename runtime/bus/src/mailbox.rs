//! Mailbox file names
//!
//! The message receiver hands each incoming message over as two files on
//! the filesystem device. Both the device side and the consuming daemon
//! agree on these names.

/// Mailbox file holding the message body
pub const INBOX_FILE: &str = "INBOX.MSG";

/// Mailbox file holding the sender identity
pub const SENDER_FILE: &str = "SENDER.MSG";
