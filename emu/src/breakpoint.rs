use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakpointKind {
    /// Execution is about to reach the address.
    Execution,
    /// A store wrote to the address.
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointHit {
    pub kind: BreakpointKind,
    pub address: u16,
}

#[derive(Debug, Default, Clone)]
pub struct Breakpoints {
    execution: BTreeSet<u16>,
    store: BTreeSet<u16>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, kind: BreakpointKind) -> &mut BTreeSet<u16> {
        match kind {
            BreakpointKind::Execution => &mut self.execution,
            BreakpointKind::Store => &mut self.store,
        }
    }

    /// Returns false when the breakpoint was already armed.
    pub fn add(&mut self, kind: BreakpointKind, address: u16) -> bool {
        self.set(kind).insert(address)
    }

    pub fn remove(&mut self, kind: BreakpointKind, address: u16) -> bool {
        self.set(kind).remove(&address)
    }

    pub fn clear(&mut self) {
        self.execution.clear();
        self.store.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.execution.is_empty() && self.store.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BreakpointKind, u16)> + '_ {
        self.execution
            .iter()
            .map(|a| (BreakpointKind::Execution, *a))
            .chain(self.store.iter().map(|a| (BreakpointKind::Store, *a)))
    }

    /// Breakpoint triggered by an instruction that left `pc` at `next` and
    /// possibly stored at `store`. Execution breakpoints take precedence.
    pub fn check(&self, next: u16, store: Option<u16>) -> Option<BreakpointHit> {
        if self.execution.contains(&next) {
            return Some(BreakpointHit {
                kind: BreakpointKind::Execution,
                address: next,
            });
        }
        store
            .filter(|a| self.store.contains(a))
            .map(|address| BreakpointHit {
                kind: BreakpointKind::Store,
                address,
            })
    }
}
