use b33arch::{AddressingMode, IndexByte, InstructionTable};
use tracing::{info, trace};

use super::Hook;
use crate::{breakpoint::BreakpointHit, cpu::StopReason, processor::Processor};

/// Logs every instruction at `trace` level and loop events at `info`.
#[derive(Debug, Default)]
pub struct Trace;

/// Assembly text of the instruction at `address`, read without side effects.
pub fn disassemble(cpu: &Processor, address: u16) -> String {
    let bus = cpu.bus();
    let opcode = bus.inspect(address);
    let Some(inst) = InstructionTable::get().decode(opcode) else {
        return format!("??? ${opcode:02X}");
    };
    let next = address.wrapping_add(1);
    let operand = match inst.mode {
        AddressingMode::Inherent => return inst.mnemonic.to_string(),
        AddressingMode::Immediate if inst.operand_len == 1 => {
            format!("#${:02X}", bus.inspect(next))
        }
        AddressingMode::Immediate => format!("#${:04X}", bus.inspect_word(next)),
        AddressingMode::Extended => format!("${:04X}", bus.inspect_word(next)),
        AddressingMode::Relative => {
            let rel = bus.inspect(next) as i8;
            format!("${:04X}", address.wrapping_add(2).wrapping_add(rel as u16))
        }
        AddressingMode::Indexed => match IndexByte::decode(bus.inspect(next)) {
            Ok(ib) => ib.to_string(),
            Err(e) => e.to_string(),
        },
    };
    format!("{} {}", inst.mnemonic, operand)
}

impl Hook for Trace {
    fn pre_opcode(&mut self, cpu: &Processor, _is_store: bool, address: u16) {
        trace!("{:04X}  {:<14} {}", address, disassemble(cpu, address), cpu.registers());
    }

    fn post_opcode(&mut self, cpu: &Processor, _is_store: bool, address: u16) {
        trace!("store ${:04X} = ${:02X}", address, cpu.bus().inspect(address));
    }

    fn breakpoint_hit(&mut self, cpu: &Processor, hit: BreakpointHit) {
        info!(kind = ?hit.kind, "breakpoint at ${:04X}: {}", hit.address, cpu.registers());
    }

    fn stopped(&mut self, cpu: &Processor, reason: &StopReason) {
        info!(%reason, "stopped at ${:04X}", cpu.registers().pc);
    }
}
