use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use smallvec::SmallVec;

use crate::config::arch_config::WordType;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TriggerOps: u8 {
        const EXECUTE = 1 << 0;
        const LOAD    = 1 << 1;
        const STORE   = 1 << 2;
    }
}

/// What a matching trigger does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TriggerAction {
    /// Raise a breakpoint exception.
    DebugException = 0,
    /// Enter debug mode.
    DebugMode = 1,
}

/// Which triggers may fire in the current hart state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerGate {
    /// Debug mode: no trigger fires.
    Closed,
    /// M-mode with `mstatus.MIE` clear: only debug-mode actions fire, so a breakpoint
    /// exception cannot re-trigger inside its own handler.
    DebugModeOnly,
    Open,
}

impl TriggerGate {
    pub fn allows(self, action: TriggerAction) -> bool {
        match self {
            TriggerGate::Closed => false,
            TriggerGate::DebugModeOnly => action == TriggerAction::DebugMode,
            TriggerGate::Open => true,
        }
    }
}

/// An address-match trigger covering `[address, address + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub address: WordType,
    pub size: WordType,
    pub ops: TriggerOps,
    pub action: TriggerAction,
}

impl Trigger {
    pub fn execute(address: WordType, action: TriggerAction) -> Self {
        Self {
            address,
            size: 4,
            ops: TriggerOps::EXECUTE,
            action,
        }
    }

    pub fn data(address: WordType, size: WordType, ops: TriggerOps, action: TriggerAction) -> Self {
        Self {
            address,
            size,
            ops,
            action,
        }
    }

    fn overlaps(&self, addr: WordType, len: WordType) -> bool {
        addr < self.address.wrapping_add(self.size) && self.address < addr.wrapping_add(len)
    }
}

/// A trigger hit, carried out of the instruction that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerMatch {
    pub index: usize,
    pub op: TriggerOps,
    pub address: WordType,
    pub action: TriggerAction,
}

#[derive(Debug, Default)]
pub struct TriggerModule {
    slots: SmallVec<[Trigger; 4]>,
}

impl TriggerModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trigger: Trigger) -> usize {
        self.slots.push(trigger);
        self.slots.len() - 1
    }

    /// Remove every trigger starting at `address`; returns how many were removed.
    pub fn remove(&mut self, address: WordType) -> usize {
        let before = self.slots.len();
        self.slots.retain(|t| t.address != address);
        before - self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.slots.iter()
    }

    /// Whether any trigger watching `op` overlaps `[addr, addr + len)`, whatever the gate.
    pub fn covers(&self, op: TriggerOps, addr: WordType, len: WordType) -> bool {
        self.slots
            .iter()
            .any(|t| t.ops.contains(op) && t.overlaps(addr, len))
    }

    /// First trigger watching `op` that overlaps `[addr, addr + len)` and may fire under `gate`.
    pub fn find_match(
        &self,
        op: TriggerOps,
        addr: WordType,
        len: WordType,
        gate: TriggerGate,
    ) -> Option<TriggerMatch> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, t)| t.ops.contains(op) && t.overlaps(addr, len) && gate.allows(t.action))
            .map(|(index, t)| TriggerMatch {
                index,
                op,
                address: addr,
                action: t.action,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_by_op_and_range() {
        let mut tm = TriggerModule::new();
        tm.insert(Trigger::execute(0x8000_0010, TriggerAction::DebugMode));
        tm.insert(Trigger::data(
            0x9000,
            8,
            TriggerOps::LOAD | TriggerOps::STORE,
            TriggerAction::DebugException,
        ));

        let m = tm.find_match(TriggerOps::EXECUTE, 0x8000_0010, 4, TriggerGate::Open).unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.action, TriggerAction::DebugMode);
        assert!(tm.find_match(TriggerOps::LOAD, 0x8000_0010, 4, TriggerGate::Open).is_none());

        let m = tm.find_match(TriggerOps::STORE, 0x9004, 4, TriggerGate::Open).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.address, 0x9004);
        assert!(tm.find_match(TriggerOps::LOAD, 0x9008, 4, TriggerGate::Open).is_none());
        assert!(tm.find_match(TriggerOps::LOAD, 0x8ffc, 4, TriggerGate::Open).is_none());
        assert!(tm.find_match(TriggerOps::LOAD, 0x8ffc, 8, TriggerGate::Open).is_some());
    }

    #[test]
    fn test_gate_filters_by_action() {
        let mut tm = TriggerModule::new();
        tm.insert(Trigger::execute(0x100, TriggerAction::DebugException));
        tm.insert(Trigger::execute(0x200, TriggerAction::DebugMode));

        assert!(tm.find_match(TriggerOps::EXECUTE, 0x100, 4, TriggerGate::Open).is_some());
        assert!(
            tm.find_match(TriggerOps::EXECUTE, 0x100, 4, TriggerGate::DebugModeOnly)
                .is_none()
        );
        assert!(
            tm.find_match(TriggerOps::EXECUTE, 0x200, 4, TriggerGate::DebugModeOnly)
                .is_some()
        );
        assert!(tm.find_match(TriggerOps::EXECUTE, 0x200, 4, TriggerGate::Closed).is_none());
        // a closed gate still reports the address as watched
        assert!(tm.covers(TriggerOps::EXECUTE, 0x100, 4));
        assert!(!tm.covers(TriggerOps::LOAD, 0x100, 4));
    }

    #[test]
    fn test_remove_and_clear() {
        let mut tm = TriggerModule::new();
        tm.insert(Trigger::execute(0x10, TriggerAction::DebugMode));
        tm.insert(Trigger::execute(0x20, TriggerAction::DebugMode));
        assert_eq!(tm.remove(0x10), 1);
        assert_eq!(tm.iter().count(), 1);
        tm.clear();
        assert!(tm.is_empty());
    }
}
