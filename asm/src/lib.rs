pub mod analyzer;
pub mod assembler;
pub mod error;
pub mod lexer;
pub mod listing;
pub mod parser;

pub use analyzer::{AnalyzedLine, Analyzer};
pub use assembler::{Assembler, ListingLine};
pub use error::{AsmError, Error};
