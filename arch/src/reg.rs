use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
)]
pub enum Reg {
    A,
    B,
    D,
    X,
    Y,
}

impl Reg {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(r) => Ok(r),
            Err(_) => Err(format!("Unknown reg name: {s}")),
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, Reg::D | Reg::X | Reg::Y)
    }
}

/// Condition-code bits of the `cc` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, EnumIter)]
#[repr(u8)]
pub enum Flag {
    Carry = 0x01,
    Zero = 0x02,
    Negative = 0x04,
    Overflow = 0x08,
}

/// Register file of the B33.
///
/// `D` is not stored: it is the 16-bit composite of `A` (high byte) and `B`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub b: u8,
    pub x: u16,
    pub y: u16,
    pub pc: u16,
    pub cc: u8,
}

impl Registers {
    pub fn d(&self) -> u16 {
        u16::from_be_bytes([self.a, self.b])
    }

    pub fn set_d(&mut self, value: u16) {
        [self.a, self.b] = value.to_be_bytes();
    }

    pub fn get(&self, reg: Reg) -> u16 {
        match reg {
            Reg::A => self.a as u16,
            Reg::B => self.b as u16,
            Reg::D => self.d(),
            Reg::X => self.x,
            Reg::Y => self.y,
        }
    }

    /// 8-bit registers take the low byte of `value`.
    pub fn set(&mut self, reg: Reg, value: u16) {
        match reg {
            Reg::A => self.a = value as u8,
            Reg::B => self.b = value as u8,
            Reg::D => self.set_d(value),
            Reg::X => self.x = value,
            Reg::Y => self.y = value,
        }
    }

    pub fn flag(&self, flag: Flag) -> bool {
        self.cc & u8::from(flag) != 0
    }

    pub fn set_flag(&mut self, flag: Flag, on: bool) {
        if on {
            self.cc |= u8::from(flag);
        } else {
            self.cc &= !u8::from(flag);
        }
    }

    /// Flags in `NVZC` order, `-` for a clear bit.
    pub fn flags_string(&self) -> String {
        [
            (Flag::Negative, 'N'),
            (Flag::Overflow, 'V'),
            (Flag::Zero, 'Z'),
            (Flag::Carry, 'C'),
        ]
        .iter()
        .map(|(f, c)| if self.flag(*f) { *c } else { '-' })
        .collect()
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "A={:02X} B={:02X} D={:04X} X={:04X} Y={:04X} PC={:04X} CC={}",
            self.a,
            self.b,
            self.d(),
            self.x,
            self.y,
            self.pc,
            self.flags_string()
        )
    }
}
