use bimap::BiMap;
use once_cell::sync::Lazy;

use crate::{mode::AddressingMode, op::Mnemonic};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    pub opcode: u8,
    /// Bytes following the opcode.
    pub operand_len: u8,
    /// Human readable description; `{0}` stands for the operand text.
    pub template: &'static str,
}

impl Instruction {
    /// Encoded length including the opcode byte.
    pub fn len(&self) -> u16 {
        1 + self.operand_len as u16
    }

    pub fn describe(&self, operand: &str) -> String {
        self.template.replace("{0}", operand)
    }
}

use Mnemonic::*;

// Families with immediate (+0), extended (+1) and indexed (+2) forms.
const DATA: &[(Mnemonic, u8, &str)] = &[
    (LDA, 0x10, "Load A with {0}"),
    (LDB, 0x14, "Load B with {0}"),
    (LDD, 0x18, "Load D with {0}"),
    (LDX, 0x1C, "Load X with {0}"),
    (LDY, 0x20, "Load Y with {0}"),
    (ADDA, 0x38, "Add {0} to A"),
    (ADDB, 0x3C, "Add {0} to B"),
    (ADDD, 0x40, "Add {0} to D"),
    (SUBA, 0x44, "Subtract {0} from A"),
    (SUBB, 0x48, "Subtract {0} from B"),
    (SUBD, 0x4C, "Subtract {0} from D"),
    (ANDA, 0x50, "Bitwise AND A with {0}"),
    (ANDB, 0x54, "Bitwise AND B with {0}"),
    (ORA, 0x58, "Bitwise OR A with {0}"),
    (ORB, 0x5C, "Bitwise OR B with {0}"),
    (EORA, 0x60, "Bitwise XOR A with {0}"),
    (EORB, 0x64, "Bitwise XOR B with {0}"),
    (CMPA, 0x68, "Compare A with {0}"),
    (CMPB, 0x6C, "Compare B with {0}"),
    (CMPD, 0x70, "Compare D with {0}"),
    (CMPX, 0x74, "Compare X with {0}"),
    (CMPY, 0x78, "Compare Y with {0}"),
];

// Families with extended (+1) and indexed (+2) forms only.
const ADDRESS: &[(Mnemonic, u8, &str)] = &[
    (STA, 0x24, "Store A at {0}"),
    (STB, 0x28, "Store B at {0}"),
    (STD, 0x2C, "Store D at {0}"),
    (STX, 0x30, "Store X at {0}"),
    (STY, 0x34, "Store Y at {0}"),
    (JMP, 0x7C, "Jump to {0}"),
    (CALL, 0x80, "Call subroutine at {0}"),
];

const INHERENT: &[(Mnemonic, u8, &str)] = &[
    (HLT, 0x01, "Halt the processor"),
    (NOP, 0x02, "No operation"),
    (RET, 0x03, "Return from subroutine"),
    (CLC, 0x04, "Clear carry"),
    (SEC, 0x05, "Set carry"),
    (INCA, 0x90, "Increment A"),
    (INCB, 0x91, "Increment B"),
    (INCD, 0x92, "Increment D"),
    (INCX, 0x93, "Increment X"),
    (INCY, 0x94, "Increment Y"),
    (DECA, 0x95, "Decrement A"),
    (DECB, 0x96, "Decrement B"),
    (DECD, 0x97, "Decrement D"),
    (DECX, 0x98, "Decrement X"),
    (DECY, 0x99, "Decrement Y"),
    (CLRA, 0x9A, "Clear A"),
    (CLRB, 0x9B, "Clear B"),
    (CLRD, 0x9C, "Clear D"),
    (COMA, 0x9D, "Complement A"),
    (COMB, 0x9E, "Complement B"),
    (LSLA, 0x9F, "Shift A left"),
    (LSLB, 0xA0, "Shift B left"),
    (LSRA, 0xA1, "Shift A right"),
    (LSRB, 0xA2, "Shift B right"),
    (TAB, 0xA8, "Copy A to B"),
    (TBA, 0xA9, "Copy B to A"),
    (TXY, 0xAA, "Copy X to Y"),
    (TYX, 0xAB, "Copy Y to X"),
    (TDX, 0xAC, "Copy D to X"),
    (TXD, 0xAD, "Copy X to D"),
    (TDY, 0xAE, "Copy D to Y"),
    (TYD, 0xAF, "Copy Y to D"),
    (PUSHA, 0xB0, "Push A"),
    (PUSHB, 0xB1, "Push B"),
    (PUSHD, 0xB2, "Push D"),
    (PUSHX, 0xB3, "Push X"),
    (PUSHY, 0xB4, "Push Y"),
    (POPA, 0xB5, "Pop A"),
    (POPB, 0xB6, "Pop B"),
    (POPD, 0xB7, "Pop D"),
    (POPX, 0xB8, "Pop X"),
    (POPY, 0xB9, "Pop Y"),
];

const RELATIVE: &[(Mnemonic, u8, &str)] = &[
    (BRA, 0xC0, "Branch to {0}"),
    (BEQ, 0xC1, "Branch to {0} if equal"),
    (BNE, 0xC2, "Branch to {0} if not equal"),
    (BCS, 0xC3, "Branch to {0} if carry set"),
    (BCC, 0xC4, "Branch to {0} if carry clear"),
    (BMI, 0xC5, "Branch to {0} if negative"),
    (BPL, 0xC6, "Branch to {0} if positive"),
    (BVS, 0xC7, "Branch to {0} if overflow set"),
    (BVC, 0xC8, "Branch to {0} if overflow clear"),
    (BGT, 0xC9, "Branch to {0} if greater"),
    (BLT, 0xCA, "Branch to {0} if less"),
    (BGE, 0xCB, "Branch to {0} if greater or equal"),
    (BLE, 0xCC, "Branch to {0} if less or equal"),
];

/// The instruction set, indexed both ways.
pub struct InstructionTable {
    instructions: Vec<Instruction>,
    codes: BiMap<(Mnemonic, AddressingMode), u8>,
    by_opcode: Vec<Option<usize>>,
}

static TABLE: Lazy<InstructionTable> = Lazy::new(InstructionTable::build);

impl InstructionTable {
    pub fn get() -> &'static InstructionTable {
        &TABLE
    }

    fn build() -> Self {
        use AddressingMode::*;

        let mut instructions = vec![];
        let mut push = |mnemonic, mode, opcode, operand_len, template| {
            instructions.push(Instruction {
                mnemonic,
                mode,
                opcode,
                operand_len,
                template,
            })
        };

        for &(m, base, template) in DATA {
            let wide = m.register().map(|r| r.is_wide()).unwrap_or(false);
            push(m, Immediate, base, if wide { 2 } else { 1 }, template);
            push(m, Extended, base + 1, 2, template);
            push(m, Indexed, base + 2, 1, template);
        }
        for &(m, base, template) in ADDRESS {
            push(m, Extended, base + 1, 2, template);
            push(m, Indexed, base + 2, 1, template);
        }
        for &(m, opcode, template) in INHERENT {
            push(m, Inherent, opcode, 0, template);
        }
        for &(m, opcode, template) in RELATIVE {
            push(m, Relative, opcode, 1, template);
        }

        let mut codes = BiMap::new();
        let mut by_opcode = vec![None; 256];
        for (idx, inst) in instructions.iter().enumerate() {
            codes.insert((inst.mnemonic, inst.mode), inst.opcode);
            by_opcode[inst.opcode as usize] = Some(idx);
        }

        InstructionTable {
            instructions,
            codes,
            by_opcode,
        }
    }

    pub fn lookup(&self, mnemonic: Mnemonic, mode: AddressingMode) -> Option<&Instruction> {
        let opcode = self.codes.get_by_left(&(mnemonic, mode))?;
        self.decode(*opcode)
    }

    pub fn decode(&self, opcode: u8) -> Option<&Instruction> {
        self.by_opcode[opcode as usize].map(|idx| &self.instructions[idx])
    }

    pub fn modes(&self, mnemonic: Mnemonic) -> Vec<AddressingMode> {
        self.instructions
            .iter()
            .filter(|inst| inst.mnemonic == mnemonic)
            .map(|inst| inst.mode)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn opcodes_are_unique() {
        let table = InstructionTable::get();
        let mut seen = HashSet::new();
        for inst in table.iter() {
            assert!(seen.insert(inst.opcode), "duplicate opcode {:02X}", inst.opcode);
        }
        assert!(!seen.contains(&0x00));
    }

    #[test]
    fn every_mnemonic_has_an_encoding() {
        let table = InstructionTable::get();
        for m in Mnemonic::iter() {
            assert!(!table.modes(m).is_empty(), "{m} has no encoding");
        }
    }

    #[test]
    fn lookup_and_decode_agree() {
        let table = InstructionTable::get();
        for inst in table.iter() {
            assert_eq!(table.decode(inst.opcode), Some(inst));
            assert_eq!(table.lookup(inst.mnemonic, inst.mode), Some(inst));
        }
    }

    macro_rules! test_encoding {
        ($($name:ident: $m:ident $mode:ident => $opcode:expr, $len:expr;)*) => {
            $(
                #[test]
                fn $name() {
                    let inst = InstructionTable::get()
                        .lookup(Mnemonic::$m, AddressingMode::$mode)
                        .unwrap();
                    assert_eq!(inst.opcode, $opcode);
                    assert_eq!(inst.len(), $len);
                }
            )*
        }
    }

    test_encoding! {
        lda_imm: LDA Immediate => 0x10, 2;
        ldx_imm: LDX Immediate => 0x1C, 3;
        ldd_ext: LDD Extended => 0x19, 3;
        sta_ext: STA Extended => 0x25, 3;
        stx_idx: STX Indexed => 0x32, 2;
        cmpy_imm: CMPY Immediate => 0x78, 3;
        call_ext: CALL Extended => 0x81, 3;
        ret_inh: RET Inherent => 0x03, 1;
        hlt_inh: HLT Inherent => 0x01, 1;
        ble_rel: BLE Relative => 0xCC, 2;
    }

    #[test]
    fn stores_have_no_immediate() {
        let table = InstructionTable::get();
        assert!(table.lookup(Mnemonic::STA, AddressingMode::Immediate).is_none());
        assert!(table.lookup(Mnemonic::JMP, AddressingMode::Immediate).is_none());
    }

    #[test]
    fn describe_fills_operand() {
        let inst = InstructionTable::get()
            .lookup(Mnemonic::LDA, AddressingMode::Immediate)
            .unwrap();
        assert_eq!(inst.describe("#$10"), "Load A with #$10");
    }
}
