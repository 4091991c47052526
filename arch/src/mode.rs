use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, Display)]
pub enum AddressingMode {
    /// `#value`, the operand is the value itself.
    Immediate,
    /// Absolute 16-bit address.
    Extended,
    /// One index byte, see [`crate::index::IndexByte`].
    Indexed,
    /// No operand.
    Inherent,
    /// Signed 8-bit displacement from the next instruction.
    Relative,
}
