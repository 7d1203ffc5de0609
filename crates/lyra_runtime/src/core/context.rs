//! Execution contexts: named reference slots visible to executors.
//!
//! A context never owns the collector; the two are threaded through
//! `InstrQueue::execute` separately, so a context can serve as a root
//! set while the collector is borrowed for a pass.

use crate::core::collector::{RootSet, VarId};
use crate::core::reference::Reference;
use crate::core::value::{FastHashMap, fast_map_new};

pub struct ExecContext {
    slots: FastHashMap<String, Reference>,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecContext {
    pub fn new() -> Self {
        Self {
            slots: fast_map_new(),
        }
    }

    /// Binds `name`, replacing and returning any previous binding.
    pub fn bind_slot(&mut self, name: impl Into<String>, reference: Reference) -> Option<Reference> {
        self.slots.insert(name.into(), reference)
    }

    pub fn get_slot(&self, name: &str) -> Option<&Reference> {
        self.slots.get(name)
    }

    pub fn slot_mut(&mut self, name: &str) -> Option<&mut Reference> {
        self.slots.get_mut(name)
    }

    pub fn unbind_slot(&mut self, name: &str) -> Option<Reference> {
        self.slots.remove(name)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Visits every variable handle reachable from any slot.
    pub fn enumerate_variables(&self, visit: &mut dyn FnMut(VarId)) {
        for reference in self.slots.values() {
            reference.enumerate_variables(visit);
        }
    }
}

impl RootSet for ExecContext {
    fn enumerate_roots(&self, visit: &mut dyn FnMut(VarId)) {
        self.enumerate_variables(visit);
    }
}
