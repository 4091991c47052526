//! Instruction set of the B33 8/16-bit CPU, shared by the assembler and the
//! emulator.

pub mod alu;
pub mod index;
pub mod inst;
pub mod label;
pub mod mode;
pub mod op;
pub mod program;
pub mod reg;

pub use index::{IndexByte, IndexError, Step};
pub use inst::{Instruction, InstructionTable};
pub use label::LabelTable;
pub use mode::AddressingMode;
pub use op::Mnemonic;
pub use program::{B33Program, DebugEntry, FormatError, OutputType};
pub use reg::{Flag, Reg, Registers};

/// First address of the second monitor's framebuffer.
pub const MONITOR2_START: u16 = 0xF000;
/// Last address of the second monitor (cursor position high byte).
pub const MONITOR2_END: u16 = 0xFFA2;

pub const DEFAULT_ORIGIN: u16 = 0x4000;

/// Address as written on a command line: `$4000`, `0x4000`, `&H4000` or decimal.
pub fn parse_address(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let (digits, radix) = if let Some(h) = s.strip_prefix('$') {
        (h, 16)
    } else if let Some(h) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (h, 16)
    } else if let Some(h) = s.strip_prefix("&H").or_else(|| s.strip_prefix("&h")) {
        (h, 16)
    } else {
        (s, 10)
    };
    u16::from_str_radix(digits, radix).map_err(|_| format!("Invalid address: {s}"))
}
