use b33arch::Registers;
use crossbeam_channel::{Receiver, Sender};

use super::Hook;
use crate::{breakpoint::BreakpointHit, cpu::StopReason, processor::Processor};

/// Hook events as owned values, for hosts that consume them off the CPU thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuEvent {
    RegistersChanged(Registers),
    PreOpcode { is_store: bool, address: u16 },
    PostOpcode { is_store: bool, address: u16 },
    BreakpointHit { hit: BreakpointHit, registers: Registers },
    Stopped { reason: StopReason, registers: Registers },
}

pub struct ChannelHook {
    tx: Sender<CpuEvent>,
    per_instruction: bool,
}

impl ChannelHook {
    pub fn new() -> (Self, Receiver<CpuEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let hook = ChannelHook {
            tx,
            per_instruction: true,
        };
        (hook, rx)
    }

    /// Only forward breakpoint and stop events.
    pub fn control_only(mut self) -> Self {
        self.per_instruction = false;
        self
    }

    fn send(&self, event: CpuEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl Hook for ChannelHook {
    fn registers_changed(&mut self, cpu: &Processor) {
        if self.per_instruction {
            self.send(CpuEvent::RegistersChanged(*cpu.registers()));
        }
    }

    fn pre_opcode(&mut self, _cpu: &Processor, is_store: bool, address: u16) {
        if self.per_instruction {
            self.send(CpuEvent::PreOpcode { is_store, address });
        }
    }

    fn post_opcode(&mut self, _cpu: &Processor, is_store: bool, address: u16) {
        if self.per_instruction {
            self.send(CpuEvent::PostOpcode { is_store, address });
        }
    }

    fn breakpoint_hit(&mut self, cpu: &Processor, hit: BreakpointHit) {
        self.send(CpuEvent::BreakpointHit {
            hit,
            registers: *cpu.registers(),
        });
    }

    fn stopped(&mut self, cpu: &Processor, reason: &StopReason) {
        self.send(CpuEvent::Stopped {
            reason: reason.clone(),
            registers: *cpu.registers(),
        });
    }
}
