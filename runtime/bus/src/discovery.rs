//! Peripheral discovery
//!
//! Scans slots 0 through 15 in ascending order and returns the first slot
//! whose name field equals the query. Duplicate names are legal: the lowest
//! index wins. Nothing is cached, so a hot-swapped device shows up (or
//! disappears) on the very next call.

use crate::{BusError, BusLayout, PeripheralHandle, PeripheralName, RegisterBus, Result, SlotTable};

/// Find the first slot advertising `name`
///
/// # Errors
/// - [`BusError::InvalidLayout`] if `layout` would produce aliasing slots
/// - [`BusError::DeviceNotFound`] once all 16 slots were examined without a
///   match
pub fn find_peripheral<B: RegisterBus + ?Sized>(
    bus: &B,
    layout: &BusLayout,
    name: &PeripheralName,
) -> Result<PeripheralHandle> {
    let table = SlotTable::new(bus, *layout)?;

    for slot in crate::SlotIndex::all() {
        let field = table.name_field(slot);
        if name.matches_field(&field) {
            let handle = table.handle(slot);
            log::debug!("discovery: {} at slot {} (base {})", name, slot, handle.base());
            return Ok(handle);
        }
    }

    log::warn!("discovery: no slot advertises {}", name);
    Err(BusError::DeviceNotFound { name: *name })
}
