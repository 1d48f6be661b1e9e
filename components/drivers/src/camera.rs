//! Camera driver
//!
//! Parameter 1 holds the frame buffer address, 2 the width and 3 the height.
//! Command 1 captures one RGB332 frame, one byte per pixel.
//!
//! There is no status read-back: the device signals completion only through
//! its interrupt bit. The caller must not touch the destination buffer until
//! it knows the capture finished.

use slotbus_bus::{
    find_peripheral, BusLayout, CommandExchange, ParamRegister, PeripheralHandle, PeripheralName,
    RegisterAddress, RegisterBus,
};

use crate::Result;

/// Name the camera advertises in its slot
pub const CAMERA: PeripheralName = PeripheralName::from_static(b"CAMERA");

/// Default frame width in pixels
pub const FRAME_WIDTH: u16 = 128;

/// Default frame height in pixels
pub const FRAME_HEIGHT: u16 = 128;

const CMD_CAPTURE: u16 = 1;

pub struct Camera<'b, B: ?Sized> {
    bus: &'b B,
    handle: PeripheralHandle,
}

impl<'b, B: RegisterBus + ?Sized> Camera<'b, B> {
    pub fn new(bus: &'b B, handle: PeripheralHandle) -> Self {
        Self { bus, handle }
    }

    /// Locate the first camera on the bus
    pub fn find(bus: &'b B, layout: &BusLayout) -> Result<Self> {
        let handle = find_peripheral(bus, layout, &CAMERA)?;
        Ok(Self::new(bus, handle))
    }

    pub fn handle(&self) -> PeripheralHandle {
        self.handle
    }

    /// Start a capture of `width * height` bytes into `buffer`
    pub fn capture(&self, buffer: RegisterAddress, width: u16, height: u16) {
        log::debug!("camera: capture {}x{} into {}", width, height, buffer);
        CommandExchange::new(self.bus, self.handle.command_register())
            .param(self.handle.param_register(ParamRegister::First), buffer.get())
            .param(self.handle.param_register(ParamRegister::Second), width)
            .param(self.handle.param_register(ParamRegister::Third), height)
            .fire(CMD_CAPTURE);
    }

    /// Capture a default-sized frame
    pub fn capture_frame(&self, buffer: RegisterAddress) {
        self.capture(buffer, FRAME_WIDTH, FRAME_HEIGHT);
    }
}
