use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::reg::{Flag, Reg};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
pub enum Alu {
    Add,
    Sub,
    And,
    Or,
    Eor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    pub fn of(reg: Reg) -> Self {
        if reg.is_wide() {
            Width::Word
        } else {
            Width::Byte
        }
    }

    fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
        }
    }

    fn sign(self) -> u32 {
        match self {
            Width::Byte => 0x80,
            Width::Word => 0x8000,
        }
    }
}

/// Condition-code changes of one operation. `None` leaves the bit untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagUpdate {
    pub c: Option<bool>,
    pub z: Option<bool>,
    pub n: Option<bool>,
    pub v: Option<bool>,
}

impl FlagUpdate {
    pub fn apply(&self, cc: u8) -> u8 {
        [
            (Flag::Carry, self.c),
            (Flag::Zero, self.z),
            (Flag::Negative, self.n),
            (Flag::Overflow, self.v),
        ]
        .iter()
        .fold(cc, |cc, (flag, bit)| match bit {
            Some(true) => cc | u8::from(*flag),
            Some(false) => cc & !u8::from(*flag),
            None => cc,
        })
    }

    fn zn(width: Width, value: u32) -> Self {
        FlagUpdate {
            z: Some(value & width.mask() == 0),
            n: Some(value & width.sign() != 0),
            ..Default::default()
        }
    }
}

/// Flags of a register load: Z, N, V cleared.
pub fn load(width: Width, value: u16) -> FlagUpdate {
    FlagUpdate {
        v: Some(false),
        ..FlagUpdate::zn(width, value as u32)
    }
}

pub fn alu(op: Alu, width: Width, a: u16, b: u16) -> (u16, FlagUpdate) {
    let (a, b) = (a as u32 & width.mask(), b as u32 & width.mask());
    let sign = width.sign();
    match op {
        Alu::Add => {
            let raw = a + b;
            let res = raw & width.mask();
            let v = (!(a ^ b) & (a ^ res) & sign) != 0;
            let flags = FlagUpdate {
                c: Some(raw > width.mask()),
                v: Some(v),
                ..FlagUpdate::zn(width, res)
            };
            (res as u16, flags)
        }
        Alu::Sub => {
            let res = a.wrapping_sub(b) & width.mask();
            let v = ((a ^ b) & (a ^ res) & sign) != 0;
            let flags = FlagUpdate {
                c: Some(a < b),
                v: Some(v),
                ..FlagUpdate::zn(width, res)
            };
            (res as u16, flags)
        }
        Alu::And | Alu::Or | Alu::Eor => {
            let res = match op {
                Alu::And => a & b,
                Alu::Or => a | b,
                _ => a ^ b,
            };
            (res as u16, load(width, res as u16))
        }
    }
}

pub fn inc(width: Width, a: u16) -> (u16, FlagUpdate) {
    let a = a as u32 & width.mask();
    let res = (a + 1) & width.mask();
    let flags = FlagUpdate {
        v: Some(a == width.sign() - 1),
        ..FlagUpdate::zn(width, res)
    };
    (res as u16, flags)
}

pub fn dec(width: Width, a: u16) -> (u16, FlagUpdate) {
    let a = a as u32 & width.mask();
    let res = a.wrapping_sub(1) & width.mask();
    let flags = FlagUpdate {
        v: Some(a == width.sign()),
        ..FlagUpdate::zn(width, res)
    };
    (res as u16, flags)
}

pub fn clr() -> (u16, FlagUpdate) {
    let flags = FlagUpdate {
        c: Some(false),
        z: Some(true),
        n: Some(false),
        v: Some(false),
    };
    (0, flags)
}

pub fn com(a: u8) -> (u8, FlagUpdate) {
    let res = !a;
    let flags = FlagUpdate {
        c: Some(true),
        v: Some(false),
        ..FlagUpdate::zn(Width::Byte, res as u32)
    };
    (res, flags)
}

pub fn lsl(a: u8) -> (u8, FlagUpdate) {
    let res = a << 1;
    let c = a & 0x80 != 0;
    let n = res & 0x80 != 0;
    let flags = FlagUpdate {
        c: Some(c),
        v: Some(n ^ c),
        ..FlagUpdate::zn(Width::Byte, res as u32)
    };
    (res, flags)
}

pub fn lsr(a: u8) -> (u8, FlagUpdate) {
    let res = a >> 1;
    let flags = FlagUpdate {
        c: Some(a & 0x01 != 0),
        ..FlagUpdate::zn(Width::Byte, res as u32)
    };
    (res, flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cc(update: FlagUpdate) -> u8 {
        update.apply(0)
    }

    #[test]
    fn add_carry_and_overflow() {
        let (r, f) = alu(Alu::Add, Width::Byte, 0xFF, 0x01);
        assert_eq!(r, 0x00);
        assert_eq!(cc(f), 0x01 | 0x02);

        let (r, f) = alu(Alu::Add, Width::Byte, 0x7F, 0x01);
        assert_eq!(r, 0x80);
        assert_eq!(cc(f), 0x04 | 0x08);

        let (r, f) = alu(Alu::Add, Width::Word, 0xFFFF, 0x0002);
        assert_eq!(r, 0x0001);
        assert_eq!(cc(f), 0x01);
    }

    #[test]
    fn sub_borrow_and_overflow() {
        let (r, f) = alu(Alu::Sub, Width::Byte, 0x00, 0x01);
        assert_eq!(r, 0xFF);
        assert_eq!(cc(f), 0x01 | 0x04);

        let (r, f) = alu(Alu::Sub, Width::Byte, 0x80, 0x01);
        assert_eq!(r, 0x7F);
        assert_eq!(cc(f), 0x08);

        let (r, f) = alu(Alu::Sub, Width::Word, 0x1234, 0x1234);
        assert_eq!(r, 0);
        assert_eq!(cc(f), 0x02);
    }

    #[test]
    fn logic_clears_overflow_keeps_carry() {
        let (r, f) = alu(Alu::Eor, Width::Byte, 0xF0, 0xFF);
        assert_eq!(r, 0x0F);
        assert_eq!(f.apply(0x09), 0x01);
    }

    #[test]
    fn inc_dec_overflow() {
        let (r, f) = inc(Width::Byte, 0x7F);
        assert_eq!(r, 0x80);
        assert_eq!(f.apply(0x01), 0x01 | 0x04 | 0x08);

        let (r, f) = dec(Width::Word, 0x8000);
        assert_eq!(r, 0x7FFF);
        assert_eq!(cc(f), 0x08);

        let (r, f) = inc(Width::Word, 0xFFFF);
        assert_eq!(r, 0);
        assert_eq!(cc(f), 0x02);
    }

    #[test]
    fn unary_ops() {
        assert_eq!(cc(clr().1), 0x02);
        assert_eq!(clr().1.apply(0x0D), 0x02);

        let (r, f) = com(0x0F);
        assert_eq!(r, 0xF0);
        assert_eq!(cc(f), 0x01 | 0x04);

        let (r, f) = lsl(0x81);
        assert_eq!(r, 0x02);
        assert_eq!(cc(f), 0x01 | 0x08);

        let (r, f) = lsr(0x01);
        assert_eq!(r, 0x00);
        assert_eq!(cc(f), 0x01 | 0x02);
    }

    #[test]
    fn load_flags() {
        assert_eq!(load(Width::Byte, 0x80).apply(0x08), 0x04);
        assert_eq!(load(Width::Word, 0x0080).apply(0x01), 0x01);
    }
}
