//! Memory-mapped peripherals.

pub mod keyboard;
pub mod screen;
pub mod sound;

pub use keyboard::{Keyboard, KeyboardHandle};
pub use screen::Screen;
pub use sound::{Sound, Tone};

/// A peripheral occupying `size()` bytes of the address space.
///
/// Offsets passed to the device are relative to the base address it was
/// attached at.
pub trait HardwareDevice: Send {
    fn name(&self) -> &'static str;

    fn size(&self) -> u16;

    /// Read without side effects.
    fn inspect(&self, offset: u16) -> u8;

    /// Read on behalf of the CPU. Devices with read side effects override this.
    fn peek(&mut self, offset: u16) -> u8 {
        self.inspect(offset)
    }

    fn poke(&mut self, offset: u16, value: u8);
}
