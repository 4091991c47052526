use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::HardwareDevice;

pub const KEYBOARD_START: u16 = 0xFFFE;

const COUNT: u16 = 0;
const DATA: u16 = 1;

/// Host side of the key buffer. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct KeyboardHandle {
    keys: Arc<Mutex<VecDeque<u8>>>,
}

impl KeyboardHandle {
    pub fn press(&self, key: u8) {
        self.keys.lock().push_back(key);
    }

    /// Queues each byte of `text`; newlines become carriage returns.
    pub fn type_text(&self, text: &str) {
        let mut keys = self.keys.lock();
        keys.extend(text.bytes().map(|b| if b == b'\n' { b'\r' } else { b }));
    }

    pub fn pending(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn clear(&self) {
        self.keys.lock().clear();
    }
}

/// `$FFFE` reads the number of buffered keys, `$FFFF` pops the next one.
pub struct Keyboard {
    handle: KeyboardHandle,
}

impl Keyboard {
    pub fn new(handle: KeyboardHandle) -> Self {
        Keyboard { handle }
    }
}

impl HardwareDevice for Keyboard {
    fn name(&self) -> &'static str {
        "keyboard"
    }

    fn size(&self) -> u16 {
        2
    }

    fn inspect(&self, offset: u16) -> u8 {
        let keys = self.handle.keys.lock();
        match offset {
            COUNT => keys.len().min(u8::MAX as usize) as u8,
            DATA => keys.front().copied().unwrap_or(0),
            _ => 0,
        }
    }

    fn peek(&mut self, offset: u16) -> u8 {
        match offset {
            DATA => self.handle.keys.lock().pop_front().unwrap_or(0),
            _ => self.inspect(offset),
        }
    }

    fn poke(&mut self, offset: u16, value: u8) {
        if offset == COUNT && value == 0 {
            self.handle.clear();
        }
    }
}
