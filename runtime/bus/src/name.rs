//! Peripheral identities
//!
//! A slot advertises its occupant through an 8-byte, NUL-terminated name
//! field. Matching is exact byte-wise equality up to the terminator; the end
//! of the field terminates a name that uses all 8 bytes.

use core::fmt;

use crate::{BusError, Result, NAME_LEN};

/// Name of a peripheral as it appears in a slot's name field
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeripheralName {
    bytes: [u8; NAME_LEN],
    len: u8,
}

impl PeripheralName {
    /// Build a name for use at compile time
    ///
    /// # Panics
    /// Panics (at compile time in const context) if `name` is empty, longer
    /// than 8 bytes or contains a NUL.
    pub const fn from_static(name: &'static [u8]) -> Self {
        assert!(!name.is_empty() && name.len() <= NAME_LEN, "peripheral name must be 1..=8 bytes");
        let mut bytes = [0u8; NAME_LEN];
        let mut i = 0;
        while i < name.len() {
            assert!(name[i] != 0, "peripheral name must not contain NUL");
            bytes[i] = name[i];
            i += 1;
        }
        Self { bytes, len: name.len() as u8 }
    }

    /// Validate a runtime query name
    pub fn new(name: &[u8]) -> Result<Self> {
        if name.is_empty() || name.len() > NAME_LEN || name.contains(&0) {
            return Err(BusError::InvalidName);
        }
        let mut bytes = [0u8; NAME_LEN];
        bytes[..name.len()].copy_from_slice(name);
        Ok(Self { bytes, len: name.len() as u8 })
    }

    /// Decode a raw name field; an unoccupied slot yields an empty name
    pub fn from_field(field: [u8; NAME_LEN]) -> Self {
        let len = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let mut bytes = [0u8; NAME_LEN];
        bytes[..len].copy_from_slice(&field[..len]);
        Self { bytes, len: len as u8 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Does a raw name field spell exactly this name?
    pub fn matches_field(&self, field: &[u8; NAME_LEN]) -> bool {
        PeripheralName::from_field(*field) == *self
    }
}

impl fmt::Display for PeripheralName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.as_bytes() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PeripheralName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeripheralName(\"{}\")", self)
    }
}

impl TryFrom<&str> for PeripheralName {
    type Error = BusError;

    fn try_from(name: &str) -> Result<Self> {
        Self::new(name.as_bytes())
    }
}
