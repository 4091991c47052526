use b33arch::{
    AddressingMode, B33Program, DebugEntry, Instruction, InstructionTable, LabelTable, Mnemonic,
    OutputType, DEFAULT_ORIGIN, MONITOR2_END, MONITOR2_START,
};
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::{
    error::{AsmError, Error},
    parser::{Expr, Line, Operand, Stmt},
};

/// One source line after pass 1, with the bytes pass 2 produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    pub line: Line,
    pub address: u16,
    pub bytes: Vec<u8>,
}

/// Two-pass assembler for B33 source text.
///
/// ```
/// use b33arch::OutputType;
/// use b33asm::Assembler;
///
/// let mut asm = Assembler::new("Start LDA #99\n END Start");
/// let program = asm.assemble(OutputType::RawBinary).unwrap();
/// assert_eq!(program.bytes, vec![0x10, 99, 0x01]);
/// assert!(asm.successful());
/// ```
pub struct Assembler {
    source: String,
    origin: u16,
    include_debug_information: bool,
    dual_monitor: bool,
    successful: bool,
    error_message: String,
    listing: Vec<ListingLine>,
}

struct Layout {
    lines: Vec<(Line, u16)>,
    labels: LabelTable,
    constants: IndexMap<String, i64>,
    end: u32,
}

impl Assembler {
    pub fn new(source: impl Into<String>) -> Self {
        Assembler {
            source: source.into(),
            origin: DEFAULT_ORIGIN,
            include_debug_information: false,
            dual_monitor: false,
            successful: false,
            error_message: String::new(),
            listing: vec![],
        }
    }

    pub fn origin(mut self, origin: u16) -> Self {
        self.origin = origin;
        self
    }

    pub fn include_debug_information(mut self, on: bool) -> Self {
        self.include_debug_information = on;
        self
    }

    /// Force the dual-monitor flag even when no operand addresses monitor 2.
    pub fn dual_monitor(mut self, on: bool) -> Self {
        self.dual_monitor = on;
        self
    }

    pub fn successful(&self) -> bool {
        self.successful
    }

    /// `Line N: message` of the last failed run, empty otherwise.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Lines of the last successful run.
    pub fn listing(&self) -> &[ListingLine] {
        &self.listing
    }

    pub fn assemble(&mut self, output_type: OutputType) -> Result<B33Program, AsmError> {
        self.listing.clear();
        match self.run(output_type) {
            Ok(program) => {
                self.successful = true;
                self.error_message.clear();
                Ok(program)
            }
            Err(err) => {
                self.listing.clear();
                self.successful = false;
                self.error_message = err.to_string();
                Err(err)
            }
        }
    }

    fn run(&mut self, output_type: OutputType) -> Result<B33Program, AsmError> {
        let layout = self.pass1()?;
        debug!(
            "pass 1: {} lines, {} labels, {} constants, ends at ${:04X}",
            layout.lines.len(),
            layout.labels.len(),
            layout.constants.len(),
            layout.end
        );

        let program = self.pass2(layout, output_type)?;
        info!(
            "assembled {} bytes at ${:04X}, entry ${:04X}",
            program.bytes.len(),
            program.origin,
            program.execution_address
        );
        Ok(program)
    }

    // ------------------------------------------------------------------------
    // Pass 1: addresses and symbols

    fn pass1(&self) -> Result<Layout, AsmError> {
        let mut layout = Layout {
            lines: vec![],
            labels: LabelTable::new(),
            constants: IndexMap::new(),
            end: self.origin as u32,
        };
        let mut address = self.origin as u32;

        for (idx, text) in self.source.lines().enumerate() {
            let number = idx + 1;
            let line = Line::parse(number, text)?;

            let size = match &line.stmt {
                Some(Stmt::Equ(expr)) => {
                    let name = line.label.clone().unwrap_or_default();
                    let value = expr
                        .eval(|s| lookup(&layout.labels, &layout.constants, s))
                        .map_err(|e| e.at(number))?;
                    check_range(value, -32768, 0xFFFF).map_err(|e| e.at(number))?;
                    define(&mut layout, &name, None, value).map_err(|e| e.at(number))?;
                    layout.lines.push((line, address as u16));
                    continue;
                }
                Some(stmt) => size_of(stmt, &layout).map_err(|e| e.at(number))?,
                None => 0,
            };

            if address + size > 0x10000 || (line.label.is_some() && address > 0xFFFF) {
                return Err(Error::AddressOverflow.at(number));
            }
            if address + size - self.origin as u32 > u16::MAX as u32 {
                return Err(Error::ProgramTooLarge.at(number));
            }
            if let Some(name) = &line.label {
                define(&mut layout, name, Some(address as u16), address as i64)
                    .map_err(|e| e.at(number))?;
            }

            let is_end = matches!(line.stmt, Some(Stmt::End(_)));
            layout.lines.push((line, address as u16));
            address += size;
            if is_end {
                break;
            }
        }

        layout.end = address;
        Ok(layout)
    }

    // ------------------------------------------------------------------------
    // Pass 2: code generation

    fn pass2(&mut self, layout: Layout, output_type: OutputType) -> Result<B33Program, AsmError> {
        let mut bytes = Vec::with_capacity((layout.end - self.origin as u32) as usize);
        let mut debug_data = vec![];
        let mut execution_address = self.origin;
        let mut requires_dual_monitors = self.dual_monitor;

        let resolve = |expr: &Expr| expr.eval(|s| lookup(&layout.labels, &layout.constants, s));

        for (line, address) in &layout.lines {
            let number = line.number;
            let at = |e: Error| e.at(number);
            let mut out = vec![];

            match &line.stmt {
                None | Some(Stmt::Equ(_)) => {}
                Some(Stmt::Op(mnemonic, operand)) => {
                    let inst = instruction(*mnemonic, operand).map_err(at)?;
                    out.push(inst.opcode);
                    match operand {
                        Operand::Inherent => {}
                        Operand::Immediate(expr) => {
                            let value = resolve(expr).map_err(at)?;
                            if inst.operand_len == 1 {
                                check_range(value, -128, 0xFF).map_err(at)?;
                                out.push(value as u8);
                            } else {
                                check_range(value, -32768, 0xFFFF).map_err(at)?;
                                out.extend_from_slice(&(value as u16).to_le_bytes());
                            }
                        }
                        Operand::Address(expr) if inst.mode == AddressingMode::Relative => {
                            let target = resolve(expr).map_err(at)?;
                            let next = *address as i64 + inst.len() as i64;
                            let offset = target - next;
                            check_range(offset, -128, 127).map_err(at)?;
                            out.push(offset as u8);
                        }
                        Operand::Address(expr) => {
                            let value = resolve(expr).map_err(at)?;
                            check_range(value, 0, 0xFFFF).map_err(at)?;
                            if (MONITOR2_START as i64..=MONITOR2_END as i64).contains(&value) {
                                requires_dual_monitors = true;
                            }
                            out.extend_from_slice(&(value as u16).to_le_bytes());
                        }
                        Operand::Indexed(ib) => out.push(ib.encode()),
                    }
                }
                Some(Stmt::Rmb(expr)) => {
                    let n = resolve(expr).map_err(at)?;
                    out.resize(n as usize, 0);
                }
                Some(Stmt::Str(text)) => {
                    out.extend_from_slice(text.as_bytes());
                    out.push(0);
                }
                Some(Stmt::Chr(values)) => {
                    for expr in values {
                        let value = resolve(expr).map_err(at)?;
                        check_range(value, -128, 0xFF).map_err(at)?;
                        out.push(value as u8);
                    }
                }
                Some(Stmt::End(target)) => {
                    if let Some(expr) = target {
                        let value = resolve(expr).map_err(at)?;
                        check_range(value, 0, 0xFFFF).map_err(at)?;
                        execution_address = value as u16;
                    }
                    out.push(hlt_opcode());
                }
            }

            if self.include_debug_information && !out.is_empty() {
                debug_data.push(DebugEntry {
                    address: *address,
                    line: number.min(u16::MAX as usize) as u16,
                    source: line.source.trim().to_string(),
                });
            }
            bytes.extend_from_slice(&out);
            self.listing.push(ListingLine {
                line: line.clone(),
                address: *address,
                bytes: out,
            });
        }

        let mut program = B33Program::new(bytes, self.origin, execution_address);
        program.labels = layout.labels;
        program.has_debug_info = self.include_debug_information;
        program.debug_data = debug_data;
        program.requires_dual_monitors = requires_dual_monitors;
        program.output_type = output_type;
        Ok(program)
    }
}

fn lookup(labels: &LabelTable, constants: &IndexMap<String, i64>, name: &str) -> Option<i64> {
    labels
        .get(name)
        .map(|a| a as i64)
        .or_else(|| constants.get(&name.to_ascii_uppercase()).copied())
}

/// Labels and EQU constants share one namespace.
fn define(layout: &mut Layout, name: &str, address: Option<u16>, value: i64) -> Result<(), Error> {
    let key = name.to_ascii_uppercase();
    if let Some(prev) = lookup(&layout.labels, &layout.constants, name) {
        return Err(Error::RedefinedLabel(name.to_string(), prev as u16));
    }
    match address {
        Some(addr) => layout
            .labels
            .insert(name, addr)
            .map_err(|prev| Error::RedefinedLabel(name.to_string(), prev)),
        None => {
            layout.constants.insert(key, value);
            Ok(())
        }
    }
}

fn instruction(mnemonic: Mnemonic, operand: &Operand) -> Result<&'static Instruction, Error> {
    let mode = operand.mode(mnemonic);
    InstructionTable::get()
        .lookup(mnemonic, mode)
        .ok_or(Error::InvalidOperand(mnemonic, mode))
}

fn hlt_opcode() -> u8 {
    InstructionTable::get()
        .lookup(Mnemonic::HLT, AddressingMode::Inherent)
        .map_or(0x01, |i| i.opcode)
}

fn size_of(stmt: &Stmt, layout: &Layout) -> Result<u32, Error> {
    Ok(match stmt {
        Stmt::Op(mnemonic, operand) => instruction(*mnemonic, operand)?.len() as u32,
        Stmt::Rmb(expr) => {
            let n = expr.eval(|s| lookup(&layout.labels, &layout.constants, s))?;
            check_range(n, 0, 0xFFFF)?;
            n as u32
        }
        Stmt::Str(text) => text.len() as u32 + 1,
        Stmt::Chr(values) => values.len() as u32,
        Stmt::End(_) => 1,
        Stmt::Equ(_) => 0,
    })
}

fn check_range(value: i64, min: i64, max: i64) -> Result<(), Error> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::OutOfRange { value, min, max })
    }
}
