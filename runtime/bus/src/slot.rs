//! The 16-slot peripheral table
//!
//! Slot `i` starts at `bus_base + i * slot_stride`. Inside a slot the command
//! register sits at offset 0, parameter register `n` at offset `2 * n` and
//! the name field at the layout's name offset.

use crate::layout::NAME_LEN;
use crate::{
    BusError, BusLayout, PeripheralName, RegisterAddress, RegisterBus, RegisterPort, Result,
    SLOT_COUNT,
};

/// Index of one expansion slot, always in `0..16`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub fn new(index: usize) -> Result<Self> {
        if index < SLOT_COUNT {
            Ok(Self(index as u8))
        } else {
            Err(BusError::SlotOutOfRange { index })
        }
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// Every slot in ascending order
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (0..SLOT_COUNT as u8).map(SlotIndex)
    }
}

impl core::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Device-specific parameter registers following the command register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ParamRegister {
    First = 1,
    Second = 2,
    Third = 3,
}

/// Resolved base of an occupied slot
///
/// A plain value: copying it grants no exclusive use of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralHandle {
    slot: SlotIndex,
    base: RegisterAddress,
}

impl PeripheralHandle {
    /// # Errors
    /// [`BusError::InvalidLayout`] if `layout` fails [`BusLayout::validate`]
    pub fn new(layout: &BusLayout, slot: SlotIndex) -> Result<Self> {
        layout.validate()?;
        Ok(Self::in_table(layout, slot))
    }

    /// `layout` must already be validated, so the table fits below 0x10000
    fn in_table(layout: &BusLayout, slot: SlotIndex) -> Self {
        let offset = slot.get() * layout.slot_stride as usize;
        let base = layout.bus_base.offset(offset as u16);
        Self { slot, base }
    }

    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn base(&self) -> RegisterAddress {
        self.base
    }

    pub fn command_register(&self) -> RegisterAddress {
        self.base
    }

    pub fn param_register(&self, param: ParamRegister) -> RegisterAddress {
        self.base.offset(2 * param as u16)
    }
}

/// Read-only view of the slot table on a bus
pub struct SlotTable<'b, B: ?Sized> {
    bus: &'b B,
    layout: BusLayout,
}

impl<'b, B: RegisterBus + ?Sized> SlotTable<'b, B> {
    pub fn new(bus: &'b B, layout: BusLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self { bus, layout })
    }

    pub fn layout(&self) -> &BusLayout {
        &self.layout
    }

    pub fn handle(&self, slot: SlotIndex) -> PeripheralHandle {
        PeripheralHandle::in_table(&self.layout, slot)
    }

    pub fn base(&self, slot: SlotIndex) -> RegisterAddress {
        self.handle(slot).base()
    }

    pub fn command_port(&self, slot: SlotIndex) -> RegisterPort<'b, B> {
        RegisterPort::new(self.bus, self.handle(slot).command_register())
    }

    /// Raw contents of a slot's name field
    pub fn name_field(&self, slot: SlotIndex) -> [u8; NAME_LEN] {
        let mut field = [0u8; NAME_LEN];
        let addr = self.base(slot).offset(self.layout.name_offset);
        self.bus.read_bytes(addr, &mut field);
        field
    }

    pub fn name(&self, slot: SlotIndex) -> PeripheralName {
        PeripheralName::from_field(self.name_field(slot))
    }

    /// Map a slot base address back to its index
    pub fn slot_of(&self, addr: RegisterAddress) -> Result<SlotIndex> {
        if !self.layout.contains(addr) {
            return Err(BusError::NotASlot { addr: addr.get() });
        }
        let offset = addr.get() - self.layout.bus_base.get();
        if offset % self.layout.slot_stride != 0 {
            return Err(BusError::NotASlot { addr: addr.get() });
        }
        SlotIndex::new((offset / self.layout.slot_stride) as usize)
    }

    /// Occupied slots in ascending order, re-read on every call
    pub fn occupants(&self) -> Occupants<'_, 'b, B> {
        Occupants { table: self, next: 0 }
    }
}

/// Iterator over occupied slots, see [`SlotTable::occupants`]
pub struct Occupants<'t, 'b, B: ?Sized> {
    table: &'t SlotTable<'b, B>,
    next: usize,
}

impl<B: RegisterBus + ?Sized> Iterator for Occupants<'_, '_, B> {
    type Item = (SlotIndex, PeripheralName);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < SLOT_COUNT {
            let slot = SlotIndex(self.next as u8);
            self.next += 1;
            let name = self.table.name(slot);
            if !name.is_empty() {
                return Some((slot, name));
            }
        }
        None
    }
}
