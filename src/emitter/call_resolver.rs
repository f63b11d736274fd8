//! Forward function-call backpatching (spec.md #4.6): same shape as
//! [`super::jump_resolver::JumpResolver`] but keyed by mangled function id
//! and patching an absolute address rather than a relative displacement.

use crate::buffers::ByteBuffer;
use crate::error::{CoreError, CoreResult};
use crate::ids::FuncId;

#[derive(Debug, Clone)]
struct CallOrigin {
    mangled_id: String,
    scope_depth: i32,
    patch_addr: usize,
    /// True for a call inside a nested local function: its patch address
    /// must keep tracking the enclosing function's init-merge shifts even
    /// after this call itself resolves (spec.md #4.6 "Nested local
    /// functions").
    nested: bool,
}

#[derive(Debug, Clone)]
struct CallDest {
    mangled_id: String,
    scope_depth: i32,
    func: FuncId,
    addr: usize,
}

/// One resolved entry, as handed to the assembler listing's footer
/// section (spec.md #4.6: "emits the resolved addresses to a footer
/// section of the assembler listing").
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub mangled_id: String,
    pub addr: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CallResolver {
    origins: Vec<CallOrigin>,
    destinations: Vec<CallDest>,
}

impl CallResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_origin(&mut self, mangled_id: impl Into<String>, scope_depth: i32, patch_addr: usize, nested: bool) {
        self.origins.push(CallOrigin { mangled_id: mangled_id.into(), scope_depth, patch_addr, nested });
    }

    pub fn register_destination(&mut self, mangled_id: impl Into<String>, scope_depth: i32, func: FuncId, addr: usize) {
        self.destinations.push(CallDest { mangled_id: mangled_id.into(), scope_depth, func, addr });
    }

    /// Resolves and purges every call recorded at `scope_depth`, patching
    /// the function's absolute code address in and returning the
    /// resolved entries for the assembler listing footer.
    pub fn resolve_depth(&mut self, scope_depth: i32, code: &mut ByteBuffer, arch: crate::value::Arch) -> CoreResult<Vec<ResolvedCall>> {
        let (closing, remaining): (Vec<_>, Vec<_>) = self.origins.drain(..).partition(|o| o.scope_depth == scope_depth);
        self.origins = remaining;

        let mut resolved = Vec::with_capacity(closing.len());
        for origin in &closing {
            let dest = self
                .destinations
                .iter()
                .find(|d| d.mangled_id == origin.mangled_id && d.scope_depth == scope_depth)
                .ok_or_else(|| CoreError::UnresolvedCall { mangled_id: origin.mangled_id.clone(), scope_depth })?;
            let bytes = match arch {
                crate::value::Arch::Bits32 => (dest.addr as u32).to_le_bytes().to_vec(),
                crate::value::Arch::Bits64 => (dest.addr as u64).to_le_bytes().to_vec(),
            };
            code.patch(origin.patch_addr, &bytes);
            resolved.push(ResolvedCall { mangled_id: origin.mangled_id.clone(), addr: dest.addr });
        }

        self.destinations.retain(|d| d.scope_depth != scope_depth);
        Ok(resolved)
    }

    /// Shifts every address at or beyond `from` by `delta`. Nested-call
    /// patch addresses always participate, matching spec.md #4.6: their
    /// addresses are relative to the enclosing function and must keep
    /// moving with every later merge of that function's own init buffer.
    pub fn shift_from(&mut self, from: usize, delta: usize) {
        for o in &mut self.origins {
            if o.patch_addr >= from || o.nested {
                o.patch_addr += delta;
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
    use crate::value::Arch;

    #[test]
    fn resolves_absolute_function_address() {
        let mut r = CallResolver::new();
        let mut code = ByteBuffer::new();
        let patch_addr = code.append_zeros(4);

        r.register_origin("f$int", 0, patch_addr, false);
        r.register_destination("f$int", 0, FuncId(3), 0x1000);

        let resolved = r.resolve_depth(0, &mut code, Arch::Bits32).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].addr, 0x1000);
        let got = u32::from_le_bytes(code.as_slice()[patch_addr..patch_addr + 4].try_into().unwrap());
        assert_eq!(got, 0x1000);
    }

    #[test]
    fn unresolved_forward_call_is_an_error() {
        let mut r = CallResolver::new();
        let mut code = ByteBuffer::new();
        r.register_origin("missing", 0, 0, false);
        let err = r.resolve_depth(0, &mut code, Arch::Bits32).unwrap_err();
        assert!(matches!(err, CoreError::UnresolvedCall { .. }));
    }
}
