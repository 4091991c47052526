use std::collections::BTreeSet;

use b33arch::{
    AddressingMode, B33Program, IndexByte, Instruction, InstructionTable, Mnemonic,
};

/// One decoded instruction (or undecodable data byte) of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedLine {
    pub address: u16,
    pub bytes: Vec<u8>,
    pub label: Option<String>,
    /// Assembly text, without label or comment.
    pub text: String,
    /// Plain-language description of what the instruction does.
    pub description: String,
    /// Original source line, when the program carries debug info.
    pub source: Option<String>,
}

enum Decoded<'a> {
    Inst(&'a Instruction, Vec<u8>),
    Data(u8),
}

/// Reconstructs assembly source from a [`B33Program`].
///
/// The output re-assembles, at the program's origin, to the same bytes.
pub struct Analyzer<'a> {
    program: &'a B33Program,
}

impl<'a> Analyzer<'a> {
    pub fn new(program: &'a B33Program) -> Self {
        Analyzer { program }
    }

    fn decode_at(&self, offset: usize) -> Decoded<'static> {
        let bytes = &self.program.bytes;
        let opcode = bytes[offset];
        let Some(inst) = InstructionTable::get().decode(opcode) else {
            return Decoded::Data(opcode);
        };
        let end = offset + inst.len() as usize;
        if end > bytes.len() {
            return Decoded::Data(opcode);
        }
        if inst.mode == AddressingMode::Indexed && IndexByte::decode(bytes[offset + 1]).is_err() {
            return Decoded::Data(opcode);
        }
        Decoded::Inst(inst, bytes[offset..end].to_vec())
    }

    fn walk(&self) -> Vec<(u16, Decoded<'static>)> {
        let mut out = vec![];
        let mut offset = 0;
        while offset < self.program.bytes.len() {
            let decoded = self.decode_at(offset);
            let len = match &decoded {
                Decoded::Inst(inst, _) => inst.len() as usize,
                Decoded::Data(_) => 1,
            };
            out.push((self.program.origin.wrapping_add(offset as u16), decoded));
            offset += len;
        }
        out
    }

    pub fn analyze(&self) -> Vec<AnalyzedLine> {
        let walked = self.walk();
        let boundaries: BTreeSet<u16> = walked.iter().map(|(addr, _)| *addr).collect();
        // A label can only be placed where a line starts.
        let placed = |addr: u16| -> Option<String> {
            if boundaries.contains(&addr) {
                self.program.labels.name_at(addr).map(str::to_string)
            } else {
                None
            }
        };

        walked
            .into_iter()
            .map(|(address, decoded)| {
                let (bytes, text, description) = match decoded {
                    Decoded::Data(byte) => (
                        vec![byte],
                        format!("CHR ${byte:02X}"),
                        "Data byte".to_string(),
                    ),
                    Decoded::Inst(inst, bytes) => {
                        let operand = self.operand(inst, address, &bytes, &placed);
                        let text = if operand.is_empty() {
                            inst.mnemonic.to_string()
                        } else {
                            format!("{} {}", inst.mnemonic, operand)
                        };
                        (bytes, text, inst.describe(&operand))
                    }
                };
                AnalyzedLine {
                    address,
                    bytes,
                    label: placed(address),
                    text,
                    description,
                    source: self.program.source_at(address).map(|e| e.source.clone()),
                }
            })
            .collect()
    }

    fn operand(
        &self,
        inst: &Instruction,
        address: u16,
        bytes: &[u8],
        placed: &impl Fn(u16) -> Option<String>,
    ) -> String {
        let word = || u16::from_le_bytes([bytes[1], bytes[2]]);
        let target = |addr: u16| placed(addr).unwrap_or_else(|| format!("${addr:04X}"));
        match inst.mode {
            AddressingMode::Inherent => String::new(),
            AddressingMode::Immediate if inst.operand_len == 1 => format!("#${:02X}", bytes[1]),
            AddressingMode::Immediate => format!("#${:04X}", word()),
            AddressingMode::Extended => target(word()),
            AddressingMode::Relative => {
                let next = address.wrapping_add(inst.len());
                target(next.wrapping_add(bytes[1] as i8 as u16))
            }
            AddressingMode::Indexed => match IndexByte::decode(bytes[1]) {
                Ok(ib) => ib.to_string(),
                Err(_) => format!("${:02X}", bytes[1]),
            },
        }
    }

    /// Assembly text for the whole program.
    ///
    /// A trailing `HLT` becomes `END <entry>` so the execution address
    /// survives re-assembly. The entry is named by its label when one is
    /// placed there and written as `$XXXX` otherwise. A program that starts
    /// away from its origin without a trailing `HLT` keeps its bytes, and
    /// its entry is only noted in the header comment.
    pub fn to_source(&self) -> String {
        let mut lines = self.analyze();
        let program = self.program;
        let mut out = format!(
            "; origin ${:04X}, entry ${:04X}\n",
            program.origin, program.execution_address
        );

        let entry = lines
            .iter()
            .find(|l| l.address == program.execution_address)
            .and_then(|l| l.label.clone());
        let entry = match entry {
            Some(label) => Some(label),
            None if program.execution_address != program.origin => {
                Some(format!("${:04X}", program.execution_address))
            }
            None => None,
        };
        if let (Some(entry), Some(last)) = (entry, lines.last_mut()) {
            let is_hlt = last.bytes.len() == 1
                && InstructionTable::get().decode(last.bytes[0]).map(|i| i.mnemonic)
                    == Some(Mnemonic::HLT);
            if is_hlt {
                last.text = format!("END {entry}");
            }
        }

        for line in &lines {
            if let Some(label) = &line.label {
                out.push_str(label);
                out.push('\n');
            }
            out.push_str(&format!("    {:<16}", line.text));
            match &line.source {
                Some(src) => out.push_str(&format!("; {src}")),
                None => out.push_str(&format!("; {}", line.description)),
            }
            out.truncate(out.trim_end().len());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use b33arch::OutputType;

    fn program(bytes: Vec<u8>) -> B33Program {
        B33Program::new(bytes, 0x4000, 0x4000)
    }

    #[test]
    fn decodes_each_mode() {
        let p = program(vec![
            0x10, 0x63, 0x1C, 0x34, 0x12, 0x25, 0x00, 0xE0, 0x26, 0xA8, 0xC0, 0xFE,
        ]);
        let texts: Vec<_> = Analyzer::new(&p).analyze().into_iter().map(|l| l.text).collect();
        assert_eq!(
            texts,
            vec!["LDA #$63", "LDX #$1234", "STA $E000", "STA ,X++", "BRA $400A"]
        );
    }

    #[test]
    fn undecodable_bytes_become_data() {
        let p = program(vec![0x00, 0x26, 0x00, 0x1C, 0x01]);
        let texts: Vec<_> = Analyzer::new(&p).analyze().into_iter().map(|l| l.text).collect();
        assert_eq!(
            texts,
            vec!["CHR $00", "CHR $26", "CHR $00", "CHR $1C", "HLT"]
        );
    }

    #[test]
    fn uses_labels_and_templates() {
        let mut p = program(vec![0x81, 0x04, 0x40, 0x01, 0x03]);
        p.labels.insert("MySub", 0x4004).unwrap();
        p.labels.insert("Inside", 0x4001).unwrap();
        let lines = Analyzer::new(&p).analyze();
        assert_eq!(lines[0].text, "CALL MySub");
        assert_eq!(lines[0].description, "Call subroutine at MySub");
        assert_eq!(lines[2].label.as_deref(), Some("MySub"));
        assert!(lines.iter().all(|l| l.label.as_deref() != Some("Inside")));
    }

    #[test]
    fn end_replaces_trailing_hlt() {
        let mut p = program(vec![0x02, 0x01]);
        p.labels.insert("Start", 0x4000).unwrap();
        p.output_type = OutputType::RawBinary;
        let src = Analyzer::new(&p).to_source();
        assert!(src.contains("END Start"));
        assert!(src.starts_with("; origin $4000"));
    }
}
