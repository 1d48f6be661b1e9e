//! Expansion bus geometry
//!
//! Where the slot table and the interrupt-mask register live is configuration;
//! how a slot is subdivided is protocol. [`BusLayout::validate`] is what keeps
//! a configured layout from producing aliasing slots.

use static_assertions::const_assert;

use crate::{BusError, RegisterAddress, Result};

/// Number of slots on the expansion bus
pub const SLOT_COUNT: usize = 16;

/// Bytes in a slot's name field
pub const NAME_LEN: usize = 8;

/// Bytes taken by the command register and the three parameter registers
pub(crate) const REGISTER_SPAN: u16 = 8;

// One interrupt-mask bit per slot, in a single 16-bit register
const_assert!(SLOT_COUNT <= u16::BITS as usize);
const_assert!(NAME_LEN % 2 == 0);

/// Placement of the slot table and interrupt register in the address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct BusLayout {
    /// Address of slot 0
    pub bus_base: RegisterAddress,
    /// Bytes between consecutive slot bases
    pub slot_stride: u16,
    /// Offset of the name field inside a slot
    pub name_offset: u16,
    /// The process-wide interrupt-mask register
    pub interrupt_mask: RegisterAddress,
}

impl BusLayout {
    pub const DEFAULT: Self = Self {
        bus_base: RegisterAddress::new(0xFC00),
        slot_stride: 16,
        name_offset: 8,
        interrupt_mask: RegisterAddress::new(0xFF09),
    };

    /// Check that slots are disjoint, fit in the address space and do not
    /// swallow the interrupt register
    pub fn validate(&self) -> Result<()> {
        if self.slot_stride % 2 != 0 {
            return Err(BusError::InvalidLayout("slot stride must be even"));
        }
        if self.name_offset < REGISTER_SPAN {
            return Err(BusError::InvalidLayout(
                "name field overlaps the command/parameter registers",
            ));
        }
        if self.name_offset as usize + NAME_LEN > self.slot_stride as usize {
            return Err(BusError::InvalidLayout("name field does not fit inside a slot"));
        }
        let end = self.table_end();
        if end > 0x1_0000 {
            return Err(BusError::InvalidLayout("slot table runs past the address space"));
        }
        let mask = self.interrupt_mask.get() as usize;
        if mask + 2 > self.bus_base.get() as usize && mask < end {
            return Err(BusError::InvalidLayout("interrupt register inside the slot table"));
        }
        Ok(())
    }

    /// First address past the last slot
    pub fn table_end(&self) -> usize {
        self.bus_base.get() as usize + SLOT_COUNT * self.slot_stride as usize
    }

    /// Does `addr` fall anywhere inside the slot table?
    pub fn contains(&self, addr: RegisterAddress) -> bool {
        let addr = addr.get() as usize;
        addr >= self.bus_base.get() as usize && addr < self.table_end()
    }
}

impl Default for BusLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}
