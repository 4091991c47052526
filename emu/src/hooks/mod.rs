pub mod channel;
pub mod dump;
pub mod trace;

use crate::{breakpoint::BreakpointHit, cpu::StopReason, processor::Processor};

pub use channel::{ChannelHook, CpuEvent};
pub use dump::Dump;
pub use trace::Trace;

/// Observer of the CPU loop. Called on the CPU thread, in order, between
/// instructions; must not call back into the owning `B33Cpu`.
pub trait Hook: Send {
    fn registers_changed(&mut self, _cpu: &Processor) {}

    fn pre_opcode(&mut self, _cpu: &Processor, _is_store: bool, _address: u16) {}

    fn post_opcode(&mut self, _cpu: &Processor, _is_store: bool, _address: u16) {}

    fn breakpoint_hit(&mut self, _cpu: &Processor, _hit: BreakpointHit) {}

    fn stopped(&mut self, _cpu: &Processor, _reason: &StopReason) {}
}
