use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::reg::Reg;

#[allow(clippy::upper_case_acronyms)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, EnumIter, Display,
)]
pub enum Mnemonic {
    HLT,
    NOP,
    RET,
    CLC,
    SEC,

    LDA,
    LDB,
    LDD,
    LDX,
    LDY,
    STA,
    STB,
    STD,
    STX,
    STY,

    ADDA,
    ADDB,
    ADDD,
    SUBA,
    SUBB,
    SUBD,
    ANDA,
    ANDB,
    ORA,
    ORB,
    EORA,
    EORB,
    CMPA,
    CMPB,
    CMPD,
    CMPX,
    CMPY,

    JMP,
    CALL,

    INCA,
    INCB,
    INCD,
    INCX,
    INCY,
    DECA,
    DECB,
    DECD,
    DECX,
    DECY,
    CLRA,
    CLRB,
    CLRD,
    COMA,
    COMB,
    LSLA,
    LSLB,
    LSRA,
    LSRB,

    TAB,
    TBA,
    TXY,
    TYX,
    TDX,
    TXD,
    TDY,
    TYD,

    PUSHA,
    PUSHB,
    PUSHD,
    PUSHX,
    PUSHY,
    POPA,
    POPB,
    POPD,
    POPX,
    POPY,

    BRA,
    BEQ,
    BNE,
    BCS,
    BCC,
    BMI,
    BPL,
    BVS,
    BVC,
    BGT,
    BLT,
    BGE,
    BLE,
}

impl Mnemonic {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_ascii_uppercase().parse::<Self>() {
            Ok(m) => Ok(m),
            Err(_) => Err(format!("Undefined mnemonic: {s}")),
        }
    }

    pub fn is_branch(&self) -> bool {
        use Mnemonic::*;
        matches!(
            self,
            BRA | BEQ | BNE | BCS | BCC | BMI | BPL | BVS | BVC | BGT | BLT | BGE | BLE
        )
    }

    /// Register the instruction reads or writes, for the families that are
    /// parameterised by one.
    pub fn register(&self) -> Option<Reg> {
        use Mnemonic::*;
        match self {
            LDA | STA | ADDA | SUBA | ANDA | ORA | EORA | CMPA | INCA | DECA | CLRA | COMA
            | LSLA | LSRA | PUSHA | POPA => Some(Reg::A),
            LDB | STB | ADDB | SUBB | ANDB | ORB | EORB | CMPB | INCB | DECB | CLRB | COMB
            | LSLB | LSRB | PUSHB | POPB => Some(Reg::B),
            LDD | STD | ADDD | SUBD | CMPD | INCD | DECD | CLRD | PUSHD | POPD => Some(Reg::D),
            LDX | STX | CMPX | INCX | DECX | PUSHX | POPX => Some(Reg::X),
            LDY | STY | CMPY | INCY | DECY | PUSHY | POPY => Some(Reg::Y),
            _ => None,
        }
    }

    /// Source and destination of a register transfer.
    pub fn transfer(&self) -> Option<(Reg, Reg)> {
        use Mnemonic::*;
        match self {
            TAB => Some((Reg::A, Reg::B)),
            TBA => Some((Reg::B, Reg::A)),
            TXY => Some((Reg::X, Reg::Y)),
            TYX => Some((Reg::Y, Reg::X)),
            TDX => Some((Reg::D, Reg::X)),
            TXD => Some((Reg::X, Reg::D)),
            TDY => Some((Reg::D, Reg::Y)),
            TYD => Some((Reg::Y, Reg::D)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Mnemonic::parse("lda"), Ok(Mnemonic::LDA));
        assert_eq!(Mnemonic::parse("PushX"), Ok(Mnemonic::PUSHX));
        assert!(Mnemonic::parse("hoge").is_err());
    }

    #[test]
    fn display_round_trips() {
        for m in Mnemonic::iter() {
            assert_eq!(Mnemonic::parse(&m.to_string()), Ok(m));
        }
    }

    #[test]
    fn branches() {
        assert!(Mnemonic::BNE.is_branch());
        assert!(!Mnemonic::JMP.is_branch());
        assert_eq!(Mnemonic::BLE.register(), None);
    }

    #[test]
    fn transfers() {
        assert_eq!(Mnemonic::TDX.transfer(), Some((Reg::D, Reg::X)));
        assert_eq!(Mnemonic::LDA.transfer(), None);
    }
}
