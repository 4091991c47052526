use b33arch::MONITOR2_START;

use super::HardwareDevice;
use crate::memory::MemoryBus;

pub const MONITOR1_START: u16 = 0xE000;

pub const COLUMNS: usize = 80;
pub const ROWS: usize = 25;

const CELLS: u16 = (COLUMNS * ROWS) as u16;
const CURSOR_VISIBLE: u16 = CELLS * 2;
const CURSOR_POS: u16 = CURSOR_VISIBLE + 1;

/// 80x25 text framebuffer: a character byte then an attribute byte per cell,
/// followed by the cursor visibility byte and the cursor cell index (LE).
pub struct Screen {
    name: &'static str,
    mem: Vec<u8>,
}

impl Screen {
    pub const SIZE: u16 = CURSOR_POS + 2;

    pub fn new(name: &'static str) -> Self {
        Screen {
            name,
            mem: vec![0; Self::SIZE as usize],
        }
    }

    /// Base address of monitor 1 or 2.
    pub fn base(monitor: u8) -> Option<u16> {
        match monitor {
            1 => Some(MONITOR1_START),
            2 => Some(MONITOR2_START),
            _ => None,
        }
    }
}

impl HardwareDevice for Screen {
    fn name(&self) -> &'static str {
        self.name
    }

    fn size(&self) -> u16 {
        Self::SIZE
    }

    fn inspect(&self, offset: u16) -> u8 {
        self.mem.get(offset as usize).copied().unwrap_or(0)
    }

    fn poke(&mut self, offset: u16, value: u8) {
        if let Some(cell) = self.mem.get_mut(offset as usize) {
            *cell = value;
        }
    }
}

fn glyph(byte: u8) -> char {
    match byte {
        0 => ' ',
        0x20..=0x7E => byte as char,
        _ => '.',
    }
}

/// Character rows of the framebuffer at `base`, trailing blanks trimmed.
pub fn text(bus: &MemoryBus, base: u16) -> Vec<String> {
    (0..ROWS)
        .map(|row| {
            let line: String = (0..COLUMNS)
                .map(|col| {
                    let cell = (row * COLUMNS + col) as u16 * 2;
                    glyph(bus.inspect(base.wrapping_add(cell)))
                })
                .collect();
            line.trim_end().to_string()
        })
        .collect()
}

/// Cursor cell index, when the cursor is visible.
pub fn cursor(bus: &MemoryBus, base: u16) -> Option<u16> {
    if bus.inspect(base.wrapping_add(CURSOR_VISIBLE)) == 0 {
        return None;
    }
    Some(bus.inspect_word(base.wrapping_add(CURSOR_POS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(Screen::SIZE, 0xFA3);
        assert_eq!(MONITOR1_START + Screen::SIZE - 1, 0xEFA2);
        assert_eq!(MONITOR2_START + Screen::SIZE - 1, b33arch::MONITOR2_END);
    }

    #[test]
    fn renders_rows() {
        let mut bus = MemoryBus::new();
        bus.attach(MONITOR1_START, Box::new(Screen::new("screen1")))
            .unwrap();
        for (i, c) in b"Hi!".iter().enumerate() {
            bus.poke(MONITOR1_START + i as u16 * 2, *c);
            bus.poke(MONITOR1_START + i as u16 * 2 + 1, 0x07);
        }
        bus.poke(MONITOR1_START + (COLUMNS as u16) * 2, 0x01);
        let rows = text(&bus, MONITOR1_START);
        assert_eq!(rows.len(), ROWS);
        assert_eq!(rows[0], "Hi!");
        assert_eq!(rows[1], ".");
        assert_eq!(rows[2], "");
    }

    #[test]
    fn cursor_bytes() {
        let mut bus = MemoryBus::new();
        bus.attach(MONITOR2_START, Box::new(Screen::new("screen2")))
            .unwrap();
        assert_eq!(cursor(&bus, MONITOR2_START), None);
        bus.poke(0xFFA0, 1);
        bus.poke_word(0xFFA1, 81);
        assert_eq!(cursor(&bus, MONITOR2_START), Some(81));
    }
}
