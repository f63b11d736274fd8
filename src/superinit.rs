//! The super-init routine and program entry sequence (spec.md #4.9).

use crate::ids::FuncId;

/// Tracks the per-module initializer functions registered so far — one
/// per compiled module and one per hard-linked library (spec.md #4.9:
/// "each library append registers one; each compiled module registers
/// one").
#[derive(Debug, Clone, Default)]
pub struct SuperInitRegistry {
    initializers: Vec<(String, FuncId)>,
}

impl SuperInitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module_name: impl Into<String>, initializer: FuncId) {
        self.initializers.push((module_name.into(), initializer));
    }

    /// The super-init body: one `call` to every registered initializer,
    /// in registration order.
    pub fn calls(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.initializers.iter().map(|(_, f)| *f)
    }

    pub fn len(&self) -> usize {
        self.initializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initializers.is_empty()
    }
}

/// One step of the program entry point's fixed call sequence (spec.md
/// #4.9: "calls the super-init before calling `main`, then unlocks
/// machine-managed scopes ..., then calls `main`, then issues a
/// `program-exit` system call").
#[derive(Debug, Clone, Copy)]
pub enum EntryStep {
    CallSuperInit,
    UnlockManagedScopes,
    CallMain,
    ProgramExitSysCall,
}

/// The fixed entry-point plan, parameterized only by which functions
/// `main` and super-init resolved to.
pub fn entry_sequence() -> [EntryStep; 4] {
    [EntryStep::CallSuperInit, EntryStep::UnlockManagedScopes, EntryStep::CallMain, EntryStep::ProgramExitSysCall]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_init_calls_every_registered_module_in_order() {
        let mut reg = SuperInitRegistry::new();
        reg.register("core", FuncId(0));
        reg.register("mathlib", FuncId(5));
        let calls: Vec<FuncId> = reg.calls().collect();
        assert_eq!(calls, vec![FuncId(0), FuncId(5)]);
    }

    #[test]
    fn entry_sequence_calls_super_init_before_main() {
        let seq = entry_sequence();
        let super_init_pos = seq.iter().position(|s| matches!(s, EntryStep::CallSuperInit)).unwrap();
        let main_pos = seq.iter().position(|s| matches!(s, EntryStep::CallMain)).unwrap();
        assert!(super_init_pos < main_pos);
    }
}
