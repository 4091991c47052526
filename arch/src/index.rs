use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reg::Reg;

const OFS_A: u8 = 0x01;
const OFS_B: u8 = 0x02;
const OFS_D: u8 = 0x04;
const IDX_X: u8 = 0x08;
const IDX_Y: u8 = 0x10;
const INC: u8 = 0x20;
const DEC: u8 = 0x40;
const TWO: u8 = 0x80;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    #[error("Illegal index byte: ${0:02X}")]
    IllegalByte(u8),
    #[error("Index register must be X or Y, found {0}")]
    NotIndexRegister(Reg),
    #[error("Offset register must be A, B or D, found {0}")]
    NotOffsetRegister(Reg),
    #[error("Increment/decrement amount must be 1 or 2, found {0}")]
    Amount(u8),
}

/// Pre-decrement / post-increment applied to the index register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Step {
    #[default]
    None,
    PostInc(u8),
    PreDec(u8),
}

/// Decoded form of the operand byte of an indexed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexByte {
    pub index: Reg,
    pub offset: Option<Reg>,
    pub step: Step,
}

impl IndexByte {
    pub fn new(index: Reg, offset: Option<Reg>, step: Step) -> Result<Self, IndexError> {
        let ib = IndexByte {
            index,
            offset,
            step,
        };
        ib.validate()?;
        Ok(ib)
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if !matches!(self.index, Reg::X | Reg::Y) {
            return Err(IndexError::NotIndexRegister(self.index));
        }
        if let Some(ofs) = self.offset {
            if !matches!(ofs, Reg::A | Reg::B | Reg::D) {
                return Err(IndexError::NotOffsetRegister(ofs));
            }
        }
        match self.step {
            Step::PostInc(n) | Step::PreDec(n) if n != 1 && n != 2 => Err(IndexError::Amount(n)),
            _ => Ok(()),
        }
    }

    pub fn encode(&self) -> u8 {
        let mut byte = match self.index {
            Reg::Y => IDX_Y,
            _ => IDX_X,
        };
        byte |= match self.offset {
            Some(Reg::A) => OFS_A,
            Some(Reg::B) => OFS_B,
            Some(Reg::D) => OFS_D,
            _ => 0,
        };
        byte |= match self.step {
            Step::None => 0,
            Step::PostInc(1) => INC,
            Step::PostInc(_) => INC | TWO,
            Step::PreDec(1) => DEC,
            Step::PreDec(_) => DEC | TWO,
        };
        byte
    }

    pub fn decode(byte: u8) -> Result<Self, IndexError> {
        let err = IndexError::IllegalByte(byte);

        let index = match byte & (IDX_X | IDX_Y) {
            IDX_X => Reg::X,
            IDX_Y => Reg::Y,
            _ => return Err(err),
        };
        let offset = match byte & (OFS_A | OFS_B | OFS_D) {
            0 => None,
            OFS_A => Some(Reg::A),
            OFS_B => Some(Reg::B),
            OFS_D => Some(Reg::D),
            _ => return Err(err),
        };
        let amount = if byte & TWO != 0 { 2 } else { 1 };
        let step = match byte & (INC | DEC) {
            0 if byte & TWO != 0 => return Err(err),
            0 => Step::None,
            INC => Step::PostInc(amount),
            DEC => Step::PreDec(amount),
            _ => return Err(err),
        };

        Ok(IndexByte {
            index,
            offset,
            step,
        })
    }
}

/// Assembly syntax: `,X` `,X+` `,X++` `,-X` `,--X` `A,X` `B,Y+` ...
impl fmt::Display for IndexByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ofs) = self.offset {
            write!(f, "{ofs}")?;
        }
        write!(f, ",")?;
        match self.step {
            Step::None => write!(f, "{}", self.index),
            Step::PostInc(n) => write!(f, "{}{}", self.index, "+".repeat(n as usize)),
            Step::PreDec(n) => write!(f, "{}{}", "-".repeat(n as usize), self.index),
        }
    }
}
