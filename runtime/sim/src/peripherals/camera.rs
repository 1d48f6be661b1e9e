//! Simulated camera
//!
//! Writes a deterministic RGB332 test card instead of sampling a sensor:
//! a dark blue vertical gradient with a red square in the top-left corner
//! and a yellow one in the top-right.

use slotbus_bus::{PeripheralName, Word};

use super::Peripheral;
use crate::DeviceContext;

const REG_COMMAND: u16 = 0x00;
const REG_BUFFER: u16 = 0x02;
const REG_WIDTH: u16 = 0x04;
const REG_HEIGHT: u16 = 0x06;

const CMD_CAPTURE: Word = 1;

pub struct CameraDevice {
    buffer: Word,
    width: Word,
    height: Word,
}

impl CameraDevice {
    pub fn new() -> Self {
        Self { buffer: 0, width: 128, height: 128 }
    }

    fn capture(&mut self, ctx: &mut DeviceContext<'_>) {
        let (w, h) = (self.width as usize, self.height as usize);
        if w == 0 || h == 0 {
            return;
        }
        let ram = ctx.core.ram_mut();
        let mut addr = self.buffer;
        for y in 0..h {
            for x in 0..w {
                ram[addr as usize] = test_card_pixel(x, y, w, h);
                addr = addr.wrapping_add(1);
            }
        }
        log::debug!("sim: camera captured {}x{} at {:#06x}", w, h, self.buffer);
        ctx.raise_interrupt();
    }
}

impl Default for CameraDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for CameraDevice {
    fn name(&self) -> PeripheralName {
        PeripheralName::from_static(b"CAMERA")
    }

    fn read_word(&self, offset: u16) -> Word {
        match offset {
            REG_BUFFER => self.buffer,
            REG_WIDTH => self.width,
            REG_HEIGHT => self.height,
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u16, value: Word, ctx: &mut DeviceContext<'_>) {
        match offset {
            REG_COMMAND if value == CMD_CAPTURE => self.capture(ctx),
            REG_BUFFER => self.buffer = value,
            REG_WIDTH => self.width = value,
            REG_HEIGHT => self.height = value,
            _ => {}
        }
    }
}

/// Pack 8-bit channels into RRRGGGBB
pub fn rgb332(r: u8, g: u8, b: u8) -> u8 {
    let r3 = (r as u16 * 7 + 127) / 255;
    let g3 = (g as u16 * 7 + 127) / 255;
    let b2 = (b as u16 * 3 + 127) / 255;
    ((r3 << 5) | (g3 << 2) | b2) as u8
}

/// Pixel of the test card at (x, y) for a `w` x `h` frame
pub fn test_card_pixel(x: usize, y: usize, w: usize, h: usize) -> u8 {
    let square = (w / 8).max(4);
    let in_top_band = y >= 4 && y < 4 + square;
    if in_top_band && x >= 4 && x < 4 + square {
        return rgb332(220, 30, 30);
    }
    if in_top_band && x + 4 + square >= w && x + 4 < w {
        return rgb332(220, 200, 20);
    }
    rgb332(0, 0, (y * 80 / h) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb332_corners() {
        assert_eq!(rgb332(0, 0, 0), 0x00);
        assert_eq!(rgb332(255, 255, 255), 0xFF);
        assert_eq!(rgb332(255, 0, 0), 0xE0);
        assert_eq!(rgb332(0, 255, 0), 0x1C);
        assert_eq!(rgb332(0, 0, 255), 0x03);
    }

    #[test]
    fn test_card_layout() {
        let red = rgb332(220, 30, 30);
        let yellow = rgb332(220, 200, 20);
        assert_eq!(test_card_pixel(4, 4, 128, 128), red);
        assert_eq!(test_card_pixel(123, 4, 128, 128), yellow);
        assert_eq!(test_card_pixel(64, 64, 128, 128), rgb332(0, 0, 40));
    }
}
