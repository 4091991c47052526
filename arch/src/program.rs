use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::label::LabelTable;

pub const SIGNATURE: &[u8; 3] = b"B33";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 11;

const FLAG_DUAL_MONITOR: u8 = 0x01;
const FLAG_DEBUG: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputType {
    RawBinary,
    #[default]
    B33Executable,
}

/// Source line that produced the bytes starting at `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugEntry {
    pub address: u16,
    pub line: u16,
    pub source: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Not a B33 executable (bad signature)")]
    BadSignature,
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),
    #[error("Program of {len} bytes does not fit at origin ${origin:04X}")]
    OriginOutOfRange { origin: u16, len: usize },
    #[error("Execution address ${0:04X} is outside the program")]
    ExecutionAddress(u16),
    #[error("Unexpected end of file")]
    Truncated,
    #[error("{0} trailing bytes after the program")]
    TrailingData(usize),
    #[error("Debug text is not valid UTF-8")]
    InvalidText,
    #[error("Too many {field} for the executable format: {len}")]
    TooLarge { field: &'static str, len: usize },
    #[error("Label `{0}` is recorded twice")]
    DuplicateLabel(String),
}

/// A fully assembled program plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct B33Program {
    pub bytes: Vec<u8>,
    pub origin: u16,
    pub execution_address: u16,
    pub labels: LabelTable,
    pub has_debug_info: bool,
    pub debug_data: Vec<DebugEntry>,
    pub requires_dual_monitors: bool,
    pub output_type: OutputType,
}

impl B33Program {
    pub fn new(bytes: Vec<u8>, origin: u16, execution_address: u16) -> Self {
        B33Program {
            bytes,
            origin,
            execution_address,
            labels: LabelTable::new(),
            has_debug_info: false,
            debug_data: vec![],
            requires_dual_monitors: false,
            output_type: OutputType::RawBinary,
        }
    }

    /// The output form selected at assembly time.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        match self.output_type {
            OutputType::RawBinary => Ok(self.bytes.clone()),
            OutputType::B33Executable => self.to_executable(),
        }
    }

    /// Every length and count is stored as a `u16`; anything larger is
    /// rejected rather than truncated.
    pub fn to_executable(&self) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.bytes.len());
        out.extend_from_slice(SIGNATURE);
        out.push(VERSION);
        out.extend_from_slice(&self.origin.to_le_bytes());
        out.extend_from_slice(&self.execution_address.to_le_bytes());

        let mut flags = 0;
        if self.requires_dual_monitors {
            flags |= FLAG_DUAL_MONITOR;
        }
        if self.has_debug_info {
            flags |= FLAG_DEBUG;
        }
        out.push(flags);
        out.extend_from_slice(&len16("program bytes", self.bytes.len())?.to_le_bytes());
        out.extend_from_slice(&self.bytes);

        if self.has_debug_info {
            out.extend_from_slice(&len16("debug entries", self.debug_data.len())?.to_le_bytes());
            for entry in &self.debug_data {
                let text = clip(&entry.source, u16::MAX as usize);
                out.extend_from_slice(&entry.address.to_le_bytes());
                out.extend_from_slice(&entry.line.to_le_bytes());
                out.extend_from_slice(&(text.len() as u16).to_le_bytes());
                out.extend_from_slice(text.as_bytes());
            }
            out.extend_from_slice(&len16("labels", self.labels.len())?.to_le_bytes());
            for (name, addr) in self.labels.iter() {
                let name = clip(name, u8::MAX as usize);
                out.extend_from_slice(&addr.to_le_bytes());
                out.push(name.len() as u8);
                out.extend_from_slice(name.as_bytes());
            }
        }
        Ok(out)
    }

    pub fn from_executable(data: &[u8]) -> Result<Self, FormatError> {
        let mut rd = Reader { data, pos: 0 };

        if rd.take(3).map_err(|_| FormatError::BadSignature)? != SIGNATURE {
            return Err(FormatError::BadSignature);
        }
        let version = rd.u8()?;
        if version != VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let origin = rd.u16()?;
        let execution_address = rd.u16()?;
        let flags = rd.u8()?;
        let len = rd.u16()? as usize;
        if origin as usize + len > 0x10000 {
            return Err(FormatError::OriginOutOfRange { origin, len });
        }
        if len > 0 && !(origin..=origin + (len - 1) as u16).contains(&execution_address) {
            return Err(FormatError::ExecutionAddress(execution_address));
        }
        let bytes = rd.take(len)?.to_vec();

        let mut program = B33Program::new(bytes, origin, execution_address);
        program.output_type = OutputType::B33Executable;
        program.requires_dual_monitors = flags & FLAG_DUAL_MONITOR != 0;
        program.has_debug_info = flags & FLAG_DEBUG != 0;

        if program.has_debug_info {
            for _ in 0..rd.u16()? {
                let address = rd.u16()?;
                let line = rd.u16()?;
                let text_len = rd.u16()? as usize;
                let source = rd.text(text_len)?;
                program.debug_data.push(DebugEntry {
                    address,
                    line,
                    source,
                });
            }
            for _ in 0..rd.u16()? {
                let address = rd.u16()?;
                let name_len = rd.u8()? as usize;
                let name = rd.text(name_len)?;
                if program.labels.insert(&name, address).is_err() {
                    return Err(FormatError::DuplicateLabel(name));
                }
            }
        }

        match data.len() - rd.pos {
            0 => Ok(program),
            n => Err(FormatError::TrailingData(n)),
        }
    }

    /// A file image: a B33 executable when it starts with the signature,
    /// otherwise raw bytes loaded and entered at `raw_origin`. A signed image
    /// that fails validation is an error, never raw code.
    pub fn from_image(data: Vec<u8>, raw_origin: u16) -> Result<Self, FormatError> {
        if data.starts_with(SIGNATURE) {
            return Self::from_executable(&data);
        }
        if raw_origin as usize + data.len() > 0x10000 {
            return Err(FormatError::OriginOutOfRange {
                origin: raw_origin,
                len: data.len(),
            });
        }
        Ok(B33Program::new(data, raw_origin, raw_origin))
    }

    pub fn is_valid_file(data: &[u8]) -> bool {
        Self::from_executable(data).is_ok()
    }

    /// Debug entry covering `address`, if the program carries debug info.
    pub fn source_at(&self, address: u16) -> Option<&DebugEntry> {
        self.debug_data.iter().find(|e| e.address == address)
    }

    pub fn end(&self) -> u32 {
        self.origin as u32 + self.bytes.len() as u32
    }
}

fn len16(field: &'static str, len: usize) -> Result<u16, FormatError> {
    u16::try_from(len).map_err(|_| FormatError::TooLarge { field, len })
}

fn clip(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(n).ok_or(FormatError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(FormatError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, FormatError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn text(&mut self, n: usize) -> Result<String, FormatError> {
        let b = self.take(n)?;
        String::from_utf8(b.to_vec()).map_err(|_| FormatError::InvalidText)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> B33Program {
        let mut p = B33Program::new(vec![0x10, 0x63, 0x01], 0x4000, 0x4000);
        p.output_type = OutputType::B33Executable;
        p
    }

    #[test]
    fn header_layout() {
        let exe = sample().to_executable().unwrap();
        assert_eq!(
            exe,
            vec![b'B', b'3', b'3', 1, 0x00, 0x40, 0x00, 0x40, 0x00, 0x03, 0x00, 0x10, 0x63, 0x01]
        );
    }

    #[test]
    fn raw_output_has_no_header() {
        let mut p = sample();
        p.output_type = OutputType::RawBinary;
        assert_eq!(p.to_bytes().unwrap(), vec![0x10, 0x63, 0x01]);
    }

    #[test]
    fn debug_section_round_trips() {
        let mut p = sample();
        p.has_debug_info = true;
        p.requires_dual_monitors = true;
        p.debug_data.push(DebugEntry {
            address: 0x4000,
            line: 1,
            source: "Start LDA #99".to_string(),
        });
        p.labels.insert("Start", 0x4000).unwrap();
        let exe = p.to_executable().unwrap();
        assert_eq!(exe[8], 0x03);
        assert_eq!(B33Program::from_executable(&exe), Ok(p));
    }

    #[test]
    fn validation() {
        let exe = sample().to_executable().unwrap();
        assert!(B33Program::is_valid_file(&exe));

        assert_eq!(
            B33Program::from_executable(b"B34\x01"),
            Err(FormatError::BadSignature)
        );
        assert_eq!(
            B33Program::from_executable(&exe[..exe.len() - 1]),
            Err(FormatError::Truncated)
        );

        let mut trailing = exe.clone();
        trailing.push(0);
        assert_eq!(
            B33Program::from_executable(&trailing),
            Err(FormatError::TrailingData(1))
        );

        let mut version = exe.clone();
        version[3] = 2;
        assert_eq!(
            B33Program::from_executable(&version),
            Err(FormatError::UnsupportedVersion(2))
        );

        let mut entry = exe.clone();
        entry[6] = 0x10;
        assert_eq!(
            B33Program::from_executable(&entry),
            Err(FormatError::ExecutionAddress(0x4010))
        );

        let mut origin = exe;
        origin[4..6].copy_from_slice(&0xFFFFu16.to_le_bytes());
        origin[6..8].copy_from_slice(&0xFFFFu16.to_le_bytes());
        assert!(matches!(
            B33Program::from_executable(&origin),
            Err(FormatError::OriginOutOfRange { .. })
        ));
    }

    #[test]
    fn image_is_chosen_by_signature() {
        let exe = sample().to_executable().unwrap();
        assert_eq!(B33Program::from_image(exe.clone(), 0x1000), Ok(sample()));

        let mut damaged = exe;
        damaged.push(0);
        assert_eq!(
            B33Program::from_image(damaged, 0x1000),
            Err(FormatError::TrailingData(1))
        );

        let raw = B33Program::from_image(vec![0x10, 0x05, 0x01], 0x1000).unwrap();
        assert_eq!((raw.origin, raw.execution_address), (0x1000, 0x1000));
        assert_eq!(raw.output_type, OutputType::RawBinary);
        assert!(matches!(
            B33Program::from_image(vec![0; 2], 0xFFFF),
            Err(FormatError::OriginOutOfRange { .. })
        ));
    }

    #[test]
    fn oversized_program_is_rejected() {
        let p = B33Program::new(vec![0; 0x10000], 0, 0);
        assert_eq!(
            p.to_executable(),
            Err(FormatError::TooLarge {
                field: "program bytes",
                len: 0x10000
            })
        );

        let p = B33Program::new(vec![0; 0xFFFF], 0, 0);
        let exe = p.to_executable().unwrap();
        assert_eq!(&exe[9..11], &[0xFF, 0xFF]);
        assert_eq!(B33Program::from_executable(&exe).unwrap().bytes.len(), 0xFFFF);
    }

    #[test]
    fn duplicate_debug_label_is_rejected() {
        let mut p = sample();
        p.has_debug_info = true;
        p.labels.insert("Start", 0x4000).unwrap();
        let mut exe = p.to_executable().unwrap();
        // Append a second record for the same name and bump the count.
        let count_at = exe.len() - (2 + 1 + "Start".len()) - 2;
        exe[count_at] = 2;
        exe.extend_from_slice(&0x4001u16.to_le_bytes());
        exe.push(5);
        exe.extend_from_slice(b"start");
        assert_eq!(
            B33Program::from_executable(&exe),
            Err(FormatError::DuplicateLabel("start".to_string()))
        );
    }

    #[test]
    fn clip_respects_char_boundary() {
        assert_eq!(clip("abc", 2), "ab");
        assert_eq!(clip("aé", 2), "a");
    }

    proptest! {
        #[test]
        fn executable_round_trip(
            bytes in proptest::collection::vec(any::<u8>(), 1..64),
            origin in 0u16..0x8000,
            entry_ofs in any::<prop::sample::Index>(),
            dual in any::<bool>(),
            lines in proptest::collection::vec(("[a-z ]{0,20}", 1u16..500), 0..5),
        ) {
            let entry = origin + entry_ofs.index(bytes.len()) as u16;
            let mut p = B33Program::new(bytes, origin, entry);
            p.output_type = OutputType::B33Executable;
            p.requires_dual_monitors = dual;
            p.has_debug_info = !lines.is_empty();
            for (i, (text, line)) in lines.into_iter().enumerate() {
                p.debug_data.push(DebugEntry { address: origin + i as u16, line, source: text });
                p.labels.insert(&format!("L{i}"), origin + i as u16).unwrap();
            }
            prop_assert_eq!(B33Program::from_executable(&p.to_executable().unwrap()), Ok(p));
        }
    }
}
