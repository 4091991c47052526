use b33arch::{AddressingMode, IndexError, Mnemonic};
use color_print::cprintln;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unknown mnemonic: `{0}`")]
    UnknownMnemonic(String),

    #[error("Unrecognized mnemonic/operand combination: {0} ({1})")]
    InvalidOperand(Mnemonic, AddressingMode),

    #[error("Invalid number: `{0}`")]
    InvalidNumber(String),

    #[error("Unterminated string")]
    UnterminatedString,

    #[error("Undefined label: `{0}`")]
    UndefinedLabel(String),

    #[error("Re-defined label: `{0}` (first defined at ${1:04X})")]
    RedefinedLabel(String, u16),

    #[error("Value {value} out of range {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },

    #[error("Invalid directive: {0}")]
    InvalidDirective(String),

    #[error("Illegal index operand: {0}")]
    Index(#[from] IndexError),

    #[error("Program runs past $FFFF")]
    AddressOverflow,

    #[error("Program is larger than 65535 bytes")]
    ProgramTooLarge,

    #[error("Failed to open file: {0}")]
    FileOpen(String, #[source] std::io::Error),

    #[error("Failed to create file: {0}")]
    FileCreate(String, #[source] std::io::Error),
}

impl Error {
    pub fn at(self, line: usize) -> AsmError {
        AsmError { line, error: self }
    }
}

/// An [`Error`] tied to the 1-based source line that caused it.
#[derive(Error, Debug)]
#[error("Line {line}: {error}")]
pub struct AsmError {
    pub line: usize,
    pub error: Error,
}

impl AsmError {
    /// Print error with the offending source line
    pub fn print_diag(&self, file: &str, source: &str) {
        cprintln!("<red,bold>error</>: {}", self.error);
        cprintln!("     <blue>--></> <underline>{}:{}</>", file, self.line);
        cprintln!("      <blue>|</>");

        let line_content = source
            .lines()
            .nth(self.line.saturating_sub(1))
            .unwrap_or("");

        cprintln!(" <blue>{:>4} |</> {}", self.line, line_content);
        cprintln!("      <blue>|</>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_line_number() {
        let err = Error::UndefinedLabel("Nowhere".to_string()).at(3);
        assert_eq!(err.to_string(), "Line 3: Undefined label: `Nowhere`");
    }

    #[test]
    fn range_message() {
        let err = Error::OutOfRange {
            value: 300,
            min: -128,
            max: 255,
        };
        assert_eq!(err.to_string(), "Value 300 out of range -128..=255");
    }
}
