use b33arch::{
    alu::{self, Alu, FlagUpdate, Width},
    index, AddressingMode, Flag, IndexByte, Instruction, InstructionTable, Mnemonic, Reg,
    Registers,
};
use crossbeam_channel::Receiver;
use thiserror::Error;
use tracing::trace;

use crate::device::{
    keyboard::KEYBOARD_START, sound::SOUND_START, Keyboard, KeyboardHandle, Screen, Sound, Tone,
};
use crate::memory::{MemoryBus, MemoryError};

pub const STACK_DEPTH: usize = 256;

/// Conditions that end execution abnormally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("Unknown opcode ${opcode:02X} at ${address:04X}")]
    UnknownOpcode { opcode: u8, address: u16 },
    #[error("Illegal index byte ${byte:02X} at ${address:04X}")]
    IllegalIndex { byte: u8, address: u16 },
    #[error("Stack overflow at ${address:04X}")]
    StackOverflow { address: u16 },
    #[error("Stack underflow at ${address:04X}")]
    StackUnderflow { address: u16 },
}

/// Outcome of one executed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Address of the opcode.
    pub address: u16,
    pub instruction: &'static Instruction,
    /// First byte written by a store.
    pub store: Option<u16>,
    pub halted: bool,
}

/// Host-side ends of the standard devices.
pub struct Peripherals {
    pub keyboard: KeyboardHandle,
    pub tones: Receiver<Tone>,
}

/// Registers, stack and memory of one B33, stepped by the caller.
pub struct Processor {
    regs: Registers,
    stack: Vec<u16>,
    bus: MemoryBus,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(MemoryBus::new())
    }
}

impl Processor {
    pub fn new(bus: MemoryBus) -> Self {
        Processor {
            regs: Registers::default(),
            stack: Vec::with_capacity(STACK_DEPTH),
            bus,
        }
    }

    /// Processor with both monitors, the sound device and the keyboard attached.
    pub fn with_devices() -> Result<(Self, Peripherals), MemoryError> {
        let keyboard = KeyboardHandle::default();
        let (tx, tones) = crossbeam_channel::unbounded();
        let mut bus = MemoryBus::new();
        for monitor in [1u8, 2] {
            let name = if monitor == 1 { "screen1" } else { "screen2" };
            if let Some(base) = Screen::base(monitor) {
                bus.attach(base, Box::new(Screen::new(name)))?;
            }
        }
        bus.attach(SOUND_START, Box::new(Sound::new(tx)))?;
        bus.attach(KEYBOARD_START, Box::new(Keyboard::new(keyboard.clone())))?;
        Ok((Self::new(bus), Peripherals { keyboard, tones }))
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut MemoryBus {
        &mut self.bus
    }

    /// Stack entries, bottom first.
    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    /// Clear registers and stack, and point `pc` at `entry`.
    pub fn reset(&mut self, entry: u16) {
        self.regs = Registers {
            pc: entry,
            ..Registers::default()
        };
        self.stack.clear();
    }

    pub fn load(&mut self, origin: u16, bytes: &[u8], entry: u16) -> Result<(), MemoryError> {
        self.bus.load(origin, bytes)?;
        self.reset(entry);
        Ok(())
    }

    /// Execute until `HLT` or `max` instructions. Returns the number executed.
    pub fn run(&mut self, max: usize) -> Result<(usize, bool), Fault> {
        for n in 1..=max {
            if self.step()?.halted {
                return Ok((n, true));
            }
        }
        Ok((max, false))
    }

    fn fetch(&mut self) -> u8 {
        let b = self.bus.peek(self.regs.pc, false);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        b
    }

    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch();
        let hi = self.fetch();
        u16::from_le_bytes([lo, hi])
    }

    fn push(&mut self, value: u16, address: u16) -> Result<(), Fault> {
        if self.stack.len() >= STACK_DEPTH {
            return Err(Fault::StackOverflow { address });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, address: u16) -> Result<u16, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow { address })
    }

    fn flags(&mut self, update: FlagUpdate) {
        self.regs.cc = update.apply(self.regs.cc);
    }

    fn read(&mut self, address: u16, width: Width) -> u16 {
        match width {
            Width::Byte => self.bus.peek(address, false) as u16,
            Width::Word => self.bus.peek_word(address, false),
        }
    }

    fn write(&mut self, address: u16, width: Width, value: u16) {
        match width {
            Width::Byte => self.bus.poke(address, value as u8),
            Width::Word => self.bus.poke_word(address, value),
        }
    }

    /// Pre-decrement, form the address, post-increment.
    fn indexed(&mut self, byte: u8, address: u16) -> Result<u16, Fault> {
        let ib = IndexByte::decode(byte).map_err(|_| Fault::IllegalIndex { byte, address })?;
        let reg = ib.index;
        if let index::Step::PreDec(n) = ib.step {
            let v = self.regs.get(reg).wrapping_sub(n as u16);
            self.regs.set(reg, v);
        }
        let offset = ib.offset.map_or(0, |r| self.regs.get(r));
        let ea = self.regs.get(reg).wrapping_add(offset);
        if let index::Step::PostInc(n) = ib.step {
            let v = self.regs.get(reg).wrapping_add(n as u16);
            self.regs.set(reg, v);
        }
        Ok(ea)
    }

    fn branch_taken(&self, mnemonic: Mnemonic) -> bool {
        use Mnemonic::*;
        let r = &self.regs;
        let (c, z, n, v) = (
            r.flag(Flag::Carry),
            r.flag(Flag::Zero),
            r.flag(Flag::Negative),
            r.flag(Flag::Overflow),
        );
        match mnemonic {
            BRA => true,
            BEQ => z,
            BNE => !z,
            BCS => c,
            BCC => !c,
            BMI => n,
            BPL => !n,
            BVS => v,
            BVC => !v,
            BGT => !z && n == v,
            BLT => n != v,
            BGE => n == v,
            BLE => z || n != v,
            _ => false,
        }
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(&mut self) -> Result<Step, Fault> {
        use Mnemonic::*;

        let address = self.regs.pc;
        let opcode = self.fetch();
        let inst = InstructionTable::get()
            .decode(opcode)
            .ok_or(Fault::UnknownOpcode { opcode, address })?;
        let reg = inst.mnemonic.register();
        let width = reg.map_or(Width::Byte, Width::of);

        // Operand: immediate value, or effective address.
        let mut imm = None;
        let mut ea = 0;
        match inst.mode {
            AddressingMode::Immediate => {
                imm = Some(match inst.operand_len {
                    1 => self.fetch() as u16,
                    _ => self.fetch_word(),
                })
            }
            AddressingMode::Extended => ea = self.fetch_word(),
            AddressingMode::Indexed => {
                let byte = self.fetch();
                ea = self.indexed(byte, address)?;
            }
            AddressingMode::Relative => {
                let rel = self.fetch() as i8;
                ea = self.regs.pc.wrapping_add(rel as u16);
            }
            AddressingMode::Inherent => {}
        }
        trace!(
            "{:04X}: {} {:?} ea={:04X}",
            address,
            inst.mnemonic,
            inst.mode,
            ea
        );

        let mut store = None;
        let mut halted = false;
        let operand = |cpu: &mut Self| match imm {
            Some(v) => v,
            None => cpu.read(ea, width),
        };

        match (inst.mnemonic, reg) {
            (HLT, _) => halted = true,
            (NOP, _) => {}
            (CLC, _) => self.regs.set_flag(Flag::Carry, false),
            (SEC, _) => self.regs.set_flag(Flag::Carry, true),
            (RET, _) => self.regs.pc = self.pop(address)?,
            (JMP, _) => self.regs.pc = ea,
            (CALL, _) => {
                self.push(self.regs.pc, address)?;
                self.regs.pc = ea;
            }

            (LDA | LDB | LDD | LDX | LDY, Some(r)) => {
                let v = operand(self);
                self.regs.set(r, v);
                self.flags(alu::load(width, v));
            }
            (STA | STB | STD | STX | STY, Some(r)) => {
                self.write(ea, width, self.regs.get(r));
                store = Some(ea);
            }
            (
                ADDA | ADDB | ADDD | SUBA | SUBB | SUBD | ANDA | ANDB | ORA | ORB | EORA | EORB,
                Some(r),
            ) => {
                let op = match inst.mnemonic {
                    ADDA | ADDB | ADDD => Alu::Add,
                    SUBA | SUBB | SUBD => Alu::Sub,
                    ANDA | ANDB => Alu::And,
                    ORA | ORB => Alu::Or,
                    _ => Alu::Eor,
                };
                let v = operand(self);
                let (res, f) = alu::alu(op, width, self.regs.get(r), v);
                self.regs.set(r, res);
                self.flags(f);
            }
            (CMPA | CMPB | CMPD | CMPX | CMPY, Some(r)) => {
                let v = operand(self);
                let (_, f) = alu::alu(Alu::Sub, width, self.regs.get(r), v);
                self.flags(f);
            }

            (INCA | INCB | INCD | INCX | INCY, Some(r)) => {
                let (res, f) = alu::inc(width, self.regs.get(r));
                self.regs.set(r, res);
                self.flags(f);
            }
            (DECA | DECB | DECD | DECX | DECY, Some(r)) => {
                let (res, f) = alu::dec(width, self.regs.get(r));
                self.regs.set(r, res);
                self.flags(f);
            }
            (CLRA | CLRB | CLRD, Some(r)) => {
                let (res, f) = alu::clr();
                self.regs.set(r, res);
                self.flags(f);
            }
            (COMA | COMB | LSLA | LSLB | LSRA | LSRB, Some(r)) => {
                let a = self.regs.get(r) as u8;
                let (res, f) = match inst.mnemonic {
                    COMA | COMB => alu::com(a),
                    LSLA | LSLB => alu::lsl(a),
                    _ => alu::lsr(a),
                };
                self.regs.set(r, res as u16);
                self.flags(f);
            }

            (PUSHA | PUSHB | PUSHD | PUSHX | PUSHY, Some(r)) => {
                self.push(self.regs.get(r), address)?;
            }
            (POPA | POPB | POPD | POPX | POPY, Some(r)) => {
                let v = self.pop(address)?;
                self.regs.set(r, v);
            }

            (m, _) if m.is_branch() => {
                if self.branch_taken(m) {
                    self.regs.pc = ea;
                }
            }
            (m, _) => {
                if let Some((src, dst)) = m.transfer() {
                    let v = self.regs.get(src);
                    self.regs.set(dst, v);
                }
            }
        }

        Ok(Step {
            address,
            instruction: inst,
            store,
            halted,
        })
    }
}

/// Register named in a dump or command line: `A B D X Y PC CC`.
pub fn register_value(regs: &Registers, name: &str) -> Option<u16> {
    match name.to_ascii_uppercase().as_str() {
        "PC" => Some(regs.pc),
        "CC" => Some(regs.cc as u16),
        other => Reg::parse(other).ok().map(|r| regs.get(r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(bytes: &[u8]) -> Processor {
        let mut cpu = Processor::default();
        cpu.load(0x4000, bytes, 0x4000).unwrap();
        let (_, halted) = cpu.run(1000).unwrap();
        assert!(halted);
        cpu
    }

    #[test]
    fn loads_set_flags() {
        let cpu = run(&[0x10, 0x80, 0x01]);
        assert_eq!(cpu.registers().a, 0x80);
        assert_eq!(cpu.registers().cc, 0x04);
        assert_eq!(cpu.registers().pc, 0x4003);

        let cpu = run(&[0x18, 0x00, 0x00, 0x01]);
        assert_eq!(cpu.registers().cc, 0x02);
    }

    #[test]
    fn store_reports_address() {
        let mut cpu = Processor::default();
        cpu.load(0x4000, &[0x14, 0x42, 0x29, 0x00, 0x50, 0x01], 0x4000)
            .unwrap();
        cpu.step().unwrap();
        let step = cpu.step().unwrap();
        assert_eq!(step.store, Some(0x5000));
        assert_eq!(step.instruction.mnemonic, Mnemonic::STB);
        assert_eq!(cpu.bus().inspect(0x5000), 0x42);
        assert!(cpu.step().unwrap().halted);
    }

    #[test]
    fn indexed_steps() {
        let mut cpu = Processor::default();
        // STA ,X++ ; STA ,-Y ; LDB A,X
        cpu.load(0x4000, &[0x26, 0xA8, 0x26, 0x50, 0x16, 0x09, 0x01], 0x4000)
            .unwrap();
        cpu.registers_mut().a = 0x07;
        cpu.registers_mut().x = 0x2000;
        cpu.registers_mut().y = 0x3000;
        cpu.run(10).unwrap();
        let regs = cpu.registers();
        assert_eq!(cpu.bus().inspect(0x2000), 0x07);
        assert_eq!(cpu.bus().inspect(0x2FFF), 0x07);
        assert_eq!(regs.y, 0x2FFF);
        assert_eq!(regs.x, 0x2002);
        assert_eq!(regs.b, cpu.bus().inspect(0x2009));
    }

    #[test]
    fn call_and_ret() {
        // CALL $4005 ; HLT ; NOP ; LDA #1 ; RET
        let cpu = run(&[0x81, 0x05, 0x40, 0x01, 0x02, 0x10, 0x01, 0x03]);
        assert_eq!(cpu.registers().a, 1);
        assert_eq!(cpu.registers().pc, 0x4004);
        assert!(cpu.stack().is_empty());
    }

    #[test]
    fn branch_conditions() {
        let mut cpu = Processor::default();
        let cases = [
            (Mnemonic::BGT, 0x00, true),
            (Mnemonic::BGT, 0x02, false),
            (Mnemonic::BLT, 0x04, true),
            (Mnemonic::BLT, 0x0C, false),
            (Mnemonic::BGE, 0x0C, true),
            (Mnemonic::BLE, 0x08, true),
            (Mnemonic::BCC, 0x01, false),
            (Mnemonic::BVC, 0x00, true),
        ];
        for (m, cc, taken) in cases {
            cpu.registers_mut().cc = cc;
            assert_eq!(cpu.branch_taken(m), taken, "{m} with cc={cc:02X}");
        }
    }

    #[test]
    fn backward_branch() {
        // LDA #3 ; loop: DECA ; BNE loop ; HLT
        let mut cpu = Processor::default();
        cpu.load(0x4000, &[0x10, 0x03, 0x95, 0xC2, 0xFD, 0x01], 0x4000)
            .unwrap();
        let (n, halted) = cpu.run(100).unwrap();
        assert!(halted);
        assert_eq!(n, 1 + 3 * 2 + 1);
        assert_eq!(cpu.registers().a, 0);
    }

    #[test]
    fn faults() {
        let mut cpu = Processor::default();
        cpu.load(0x4000, &[0x00], 0x4000).unwrap();
        assert_eq!(
            cpu.step(),
            Err(Fault::UnknownOpcode {
                opcode: 0,
                address: 0x4000
            })
        );

        cpu.load(0x4000, &[0x12, 0x03], 0x4000).unwrap();
        assert!(matches!(cpu.step(), Err(Fault::IllegalIndex { byte: 0x03, .. })));

        cpu.load(0x4000, &[0x03], 0x4000).unwrap();
        assert!(matches!(cpu.step(), Err(Fault::StackUnderflow { .. })));

        // PUSHA ; BRA -3
        cpu.load(0x4000, &[0xB0, 0xC0, 0xFD], 0x4000).unwrap();
        assert!(matches!(
            cpu.run(10_000),
            Err(Fault::StackOverflow { address: 0x4000 })
        ));
        assert_eq!(cpu.stack().len(), STACK_DEPTH);
    }

    #[test]
    fn narrow_push_pop() {
        // LDX #$1234 ; PUSHX ; POPA ; PUSHA ; POPD
        let cpu = run(&[0x1C, 0x34, 0x12, 0xB3, 0xB5, 0xB0, 0xB7, 0x01]);
        assert_eq!(cpu.registers().d(), 0x0034);
    }

    #[test]
    fn named_registers() {
        let regs = Registers {
            pc: 0x4000,
            cc: 0x02,
            a: 1,
            b: 2,
            ..Registers::default()
        };
        assert_eq!(register_value(&regs, "pc"), Some(0x4000));
        assert_eq!(register_value(&regs, "D"), Some(0x0102));
        assert_eq!(register_value(&regs, "CC"), Some(2));
        assert_eq!(register_value(&regs, "sp"), None);
    }
}
