use std::collections::HashMap;

use b33arch::Registers;
use serde::{Deserialize, Serialize};

use super::Hook;
use crate::config::Addr;
use crate::processor::Processor;

/// What to print when execution reaches an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpEntry {
    #[serde(default = "yes")]
    pub registers: bool,
    #[serde(default)]
    pub stack: bool,
    #[serde(default)]
    pub memory: Vec<Addr>,
}

fn yes() -> bool {
    true
}

impl Default for DumpEntry {
    fn default() -> Self {
        DumpEntry {
            registers: true,
            stack: false,
            memory: vec![],
        }
    }
}

#[derive(Debug, Default)]
pub struct Dump {
    all: bool,
    list: HashMap<u16, DumpEntry>,
}

impl Dump {
    pub fn new(list: HashMap<u16, DumpEntry>, all: bool) -> Self {
        Dump { all, list }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    fn get(&self, pc: u16) -> Option<&DumpEntry> {
        self.list.get(&pc)
    }
}

impl Hook for Dump {
    fn pre_opcode(&mut self, cpu: &Processor, _is_store: bool, address: u16) {
        if let Some(cfg) = self.get(address) {
            if cfg.registers {
                print_registers(cpu.registers());
            }
            if cfg.stack {
                print_stack(cpu.stack());
            }
            if !cfg.memory.is_empty() {
                print_memory(cpu, &cfg.memory);
            }
        } else if self.all {
            print_registers(cpu.registers());
        }
    }
}

pub fn print_registers(regs: &Registers) {
    println!(" +-----------+---------+---------+---------+");
    println!(
        " |  pc: {:04X} |  a: {:02X}   |  b: {:02X}   | cc: {} |",
        regs.pc,
        regs.a,
        regs.b,
        regs.flags_string()
    );
    println!(
        " |   d: {:04X} |  x: {:04X} |  y: {:04X} |         |",
        regs.d(),
        regs.x,
        regs.y
    );
    println!(" +-----------+---------+---------+---------+");
}

/// Top of stack first.
pub fn print_stack(stack: &[u16]) {
    for (depth, value) in stack.iter().rev().enumerate() {
        println!(" | sp-{:<3} : {:04X}                          |", depth, value);
    }
    println!(" +-----------------------------------------+");
}

fn print_memory(cpu: &Processor, addrs: &[Addr]) {
    for addr in addrs {
        println!(
            " | {:04X} : {:02X}                              |",
            addr.0,
            cpu.bus().inspect(addr.0)
        );
    }
    println!(" +-----------------------------------------+");
}
