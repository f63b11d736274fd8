//! Pending jump origins/destinations and scope-close backpatching
//! (spec.md #4.6).

use crate::buffers::ByteBuffer;
use crate::error::{CoreError, CoreResult};

/// A `jump`/`jump_if_false` argument recorded as a label reference,
/// awaiting its destination.
#[derive(Debug, Clone)]
struct JumpOrigin {
    label: String,
    scope_depth: i32,
    /// Byte offset of the displacement slot reserved in the code buffer.
    patch_addr: usize,
    /// Byte offset of the jump instruction itself (displacement is
    /// relative to this).
    instr_addr: usize,
}

/// A label destination registered at a code address.
#[derive(Debug, Clone)]
struct JumpDest {
    label: String,
    scope_depth: i32,
    addr: usize,
}

/// Keeps two parallel views spec.md #4.6 calls for: origins/destinations
/// looked up by label (for resolution) and destinations looked up by
/// address (so multiple labels pointing at the same instruction are all
/// attached to the emitted assembler line).
#[derive(Debug, Clone, Default)]
pub struct JumpResolver {
    origins: Vec<JumpOrigin>,
    destinations: Vec<JumpDest>,
}

impl JumpResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_origin(&mut self, label: impl Into<String>, scope_depth: i32, patch_addr: usize, instr_addr: usize) {
        self.origins.push(JumpOrigin { label: label.into(), scope_depth, patch_addr, instr_addr });
    }

    pub fn register_destination(&mut self, label: impl Into<String>, scope_depth: i32, addr: usize) {
        self.destinations.push(JumpDest { label: label.into(), scope_depth, addr });
    }

    /// All labels currently registered at `addr`, for attaching to the
    /// assembler line being emitted there.
    pub fn labels_at(&self, addr: usize) -> Vec<&str> {
        self.destinations.iter().filter(|d| d.addr == addr).map(|d| d.label.as_str()).collect()
    }

    /// Resolves and purges every origin/destination recorded at
    /// `scope_depth`: each origin's displacement (`dest.addr -
    /// origin.instr_addr`, signed, two bytes) is patched into `code` at
    /// its recorded slot. Unresolved origins raise
    /// [`CoreError::UnresolvedJump`].
    pub fn resolve_depth(&mut self, scope_depth: i32, code: &mut ByteBuffer) -> CoreResult<()> {
        let (closing, remaining): (Vec<_>, Vec<_>) = self.origins.drain(..).partition(|o| o.scope_depth == scope_depth);
        self.origins = remaining;

        for origin in &closing {
            let dest = self
                .destinations
                .iter()
                .find(|d| d.label == origin.label && d.scope_depth == scope_depth)
                .ok_or_else(|| CoreError::UnresolvedJump { label: origin.label.clone(), scope_depth })?;
            let displacement = dest.addr as i64 - origin.instr_addr as i64;
            code.patch_i16(origin.patch_addr, displacement as i16);
        }

        self.destinations.retain(|d| d.scope_depth != scope_depth);
        Ok(())
    }

    /// Shifts every recorded address at or beyond `from` by `delta`
    /// (spec.md #4.7 init-merge fan-out: "jump destination tables, jump
    /// origin table").
    pub fn shift_from(&mut self, from: usize, delta: usize) {
        for o in &mut self.origins {
            if o.patch_addr >= from {
                o.patch_addr += delta;
            }
            if o.instr_addr >= from {
                o.instr_addr += delta;
            }
        }
        for d in &mut self.destinations {
            if d.addr >= from {
                d.addr += delta;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_displacement_is_relative_to_the_jump_instruction() {
        let mut resolver = JumpResolver::new();
        let mut code = ByteBuffer::new();
        let instr_addr = code.append(&[0u8; 1]);
        let patch_addr = code.append_zeros(2);
        code.append(&[0u8; 10]);

        resolver.register_origin("loop_start", 1, patch_addr, instr_addr);
        resolver.register_destination("loop_start", 1, instr_addr + 13);

        resolver.resolve_depth(1, &mut code).unwrap();
        let got = i16::from_le_bytes(code.as_slice()[patch_addr..patch_addr + 2].try_into().unwrap());
        assert_eq!(got, 13);
    }

    #[test]
    fn unresolved_origin_raises_a_diagnosable_error() {
        let mut resolver = JumpResolver::new();
        let mut code = ByteBuffer::new();
        resolver.register_origin("nowhere", 2, 0, 0);
        let err = resolver.resolve_depth(2, &mut code).unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedJump { .. }));
    }

    #[test]
    fn multiple_labels_at_the_same_address_are_all_reported() {
        let mut resolver = JumpResolver::new();
        resolver.register_destination("a", 0, 100);
        resolver.register_destination("b", 0, 100);
        let mut labels = resolver.labels_at(100);
        labels.sort();
        assert_eq!(labels, vec!["a", "b"]);
    }
}
