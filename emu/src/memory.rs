use thiserror::Error;

use crate::device::HardwareDevice;

pub const MEMORY_SIZE: usize = 0x10000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("{name} at ${base:04X} overlaps {other} at ${other_base:04X}")]
    Overlap {
        name: &'static str,
        base: u16,
        other: &'static str,
        other_base: u16,
    },
    #[error("{name} at ${base:04X} runs past the end of memory")]
    OutOfRange { name: &'static str, base: u16 },
    #[error("{len} bytes do not fit at ${origin:04X}")]
    ProgramTooLarge { origin: u16, len: usize },
}

struct Mapping {
    base: u16,
    /// Exclusive.
    end: u32,
    device: Box<dyn HardwareDevice>,
}

impl Mapping {
    fn contains(&self, address: u16) -> bool {
        address >= self.base && (address as u32) < self.end
    }
}

/// 64 KiB of RAM with devices mapped over parts of it.
pub struct MemoryBus {
    ram: Box<[u8]>,
    devices: Vec<Mapping>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        MemoryBus {
            ram: vec![0; MEMORY_SIZE].into_boxed_slice(),
            devices: Vec::new(),
        }
    }

    pub fn attach(
        &mut self,
        base: u16,
        device: Box<dyn HardwareDevice>,
    ) -> Result<(), MemoryError> {
        let end = base as u32 + device.size() as u32;
        if end > MEMORY_SIZE as u32 {
            return Err(MemoryError::OutOfRange {
                name: device.name(),
                base,
            });
        }
        if let Some(other) = self
            .devices
            .iter()
            .find(|m| (base as u32) < m.end && end > m.base as u32)
        {
            return Err(MemoryError::Overlap {
                name: device.name(),
                base,
                other: other.device.name(),
                other_base: other.base,
            });
        }
        self.devices.push(Mapping { base, end, device });
        Ok(())
    }

    /// Name, first and last address of every attached device.
    pub fn device_map(&self) -> Vec<(&'static str, u16, u16)> {
        self.devices
            .iter()
            .map(|m| (m.device.name(), m.base, (m.end - 1) as u16))
            .collect()
    }

    fn find(&self, address: u16) -> Option<&Mapping> {
        self.devices.iter().find(|m| m.contains(address))
    }

    fn find_mut(&mut self, address: u16) -> Option<&mut Mapping> {
        self.devices.iter_mut().find(|m| m.contains(address))
    }

    /// Read a byte. With `bypass_hardware` no device side effect is triggered.
    pub fn peek(&mut self, address: u16, bypass_hardware: bool) -> u8 {
        if bypass_hardware {
            return self.inspect(address);
        }
        match self.find_mut(address) {
            Some(m) => m.device.peek(address - m.base),
            None => self.ram[address as usize],
        }
    }

    pub fn inspect(&self, address: u16) -> u8 {
        match self.find(address) {
            Some(m) => m.device.inspect(address - m.base),
            None => self.ram[address as usize],
        }
    }

    pub fn poke(&mut self, address: u16, value: u8) {
        match self.find_mut(address) {
            Some(m) => m.device.poke(address - m.base, value),
            None => self.ram[address as usize] = value,
        }
    }

    pub fn peek_word(&mut self, address: u16, bypass_hardware: bool) -> u16 {
        let lo = self.peek(address, bypass_hardware);
        let hi = self.peek(address.wrapping_add(1), bypass_hardware);
        u16::from_le_bytes([lo, hi])
    }

    pub fn inspect_word(&self, address: u16) -> u16 {
        u16::from_le_bytes([self.inspect(address), self.inspect(address.wrapping_add(1))])
    }

    pub fn poke_word(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.poke(address, lo);
        self.poke(address.wrapping_add(1), hi);
    }

    /// Copy a program image to `origin`, through the device map.
    pub fn load(&mut self, origin: u16, bytes: &[u8]) -> Result<(), MemoryError> {
        if origin as usize + bytes.len() > MEMORY_SIZE {
            return Err(MemoryError::ProgramTooLarge {
                origin,
                len: bytes.len(),
            });
        }
        for (i, b) in bytes.iter().enumerate() {
            self.poke(origin + i as u16, *b);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Screen;

    struct Counter(u8);

    impl HardwareDevice for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }
        fn size(&self) -> u16 {
            1
        }
        fn inspect(&self, _offset: u16) -> u8 {
            self.0
        }
        fn peek(&mut self, _offset: u16) -> u8 {
            self.0 += 1;
            self.0
        }
        fn poke(&mut self, _offset: u16, value: u8) {
            self.0 = value;
        }
    }

    #[test]
    fn ram_words_are_little_endian() {
        let mut bus = MemoryBus::new();
        bus.poke_word(0x4000, 0x1234);
        assert_eq!(bus.inspect(0x4000), 0x34);
        assert_eq!(bus.inspect(0x4001), 0x12);
        assert_eq!(bus.peek_word(0x4000, false), 0x1234);
        bus.poke_word(0xFFFF, 0xABCD);
        assert_eq!(bus.inspect(0x0000), 0xAB);
    }

    #[test]
    fn bypass_skips_side_effects() {
        let mut bus = MemoryBus::new();
        bus.attach(0x8000, Box::new(Counter(5))).unwrap();
        assert_eq!(bus.peek(0x8000, true), 5);
        assert_eq!(bus.peek(0x8000, true), 5);
        assert_eq!(bus.peek(0x8000, false), 6);
        assert_eq!(bus.inspect(0x8000), 6);
        bus.poke(0x8000, 1);
        assert_eq!(bus.inspect(0x8000), 1);
        assert_eq!(bus.inspect(0x8001), 0);
    }

    #[test]
    fn overlapping_devices_are_rejected() {
        let mut bus = MemoryBus::new();
        bus.attach(0xE000, Box::new(Screen::new("screen1"))).unwrap();
        let err = bus.attach(0xEFA2, Box::new(Counter(0))).unwrap_err();
        assert!(matches!(err, MemoryError::Overlap { other: "screen1", .. }));
        bus.attach(0xEFA3, Box::new(Counter(0))).unwrap();
        assert!(matches!(
            bus.attach(0xFFFF, Box::new(Screen::new("screen2"))),
            Err(MemoryError::OutOfRange { .. })
        ));
        assert_eq!(bus.device_map().len(), 2);
    }

    #[test]
    fn load_checks_bounds() {
        let mut bus = MemoryBus::new();
        bus.load(0xFFFE, &[1, 2]).unwrap();
        assert_eq!(bus.inspect(0xFFFF), 2);
        assert!(bus.load(0xFFFF, &[1, 2]).is_err());
    }
}
