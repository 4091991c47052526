//! Emulator for the B33 CPU: a synchronous [`Processor`] and the threaded
//! [`B33Cpu`] controller around it.

pub mod breakpoint;
pub mod config;
pub mod cpu;
pub mod device;
pub mod hooks;
pub mod memory;
pub mod processor;

pub use breakpoint::{BreakpointHit, BreakpointKind, Breakpoints};
pub use config::EmuConfig;
pub use cpu::{B33Cpu, CpuError, State, StopReason};
pub use device::{HardwareDevice, KeyboardHandle, Tone};
pub use hooks::{ChannelHook, CpuEvent, Hook};
pub use memory::{MemoryBus, MemoryError};
pub use processor::{Fault, Processor, Step};
