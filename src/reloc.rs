//! Per-binary relocation records (spec.md #4.2, #6.2), the mechanism that
//! lets [`crate::linker::LibraryLinker`] re-home a library's addresses
//! against the importing program's state.

use crate::ids::BlockId;

/// spec.md #6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    FunctionAddress,
    GlobalAddress,
    FixArrayGeometry,
    DynLibCallId,
    BlockInGlobal,
    BlockInBlock,
}

/// One relocation entry (spec.md #6.2: "kind, a location address, an
/// optional location block (for `BlockInBlock`), originating module name,
/// object name, and a copy-count").
#[derive(Debug, Clone)]
pub struct RelocItem {
    pub kind: RelocKind,
    pub location_addr: usize,
    pub location_block: Option<BlockId>,
    pub module_name: String,
    pub object_name: String,
    /// 0 when originally emitted; incremented on each library import that
    /// re-carries it (spec.md #6.2).
    pub copy_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RelocTable {
    items: Vec<RelocItem>,
}

impl RelocTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: RelocItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelocItem> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RelocItem> {
        self.items.iter_mut()
    }

    /// Appends `other`'s entries with their copy-count incremented by one
    /// (spec.md #4.8 hard-link step 6: "Copy library's relocation table
    /// (with copy-count incremented) into the current relocation table").
    pub fn absorb(&mut self, other: impl IntoIterator<Item = RelocItem>) {
        for mut item in other {
            item.copy_count += 1;
            self.items.push(item);
        }
    }

    /// Rewrites every `kind`-matching entry's `location_addr` by adding
    /// `delta` — the per-kind relocation pass spec.md #4.8 step 1
    /// describes ("code address gets `+= current_code_length`" etc.).
    pub fn relocate_kind(&mut self, kind: RelocKind, delta: i64) {
        for item in &mut self.items {
            if item.kind == kind {
                item.location_addr = (item.location_addr as i64 + delta) as usize;
            }
        }
    }

    /// Shifts every code-side entry's `location_addr` at or beyond `from`
    /// by `delta` (spec.md #4.7 init-merge fan-out: "relocation table
    /// entries whose kind is code-side"). `FunctionAddress` is the only
    /// kind that addresses the code buffer directly — `GlobalAddress`
    /// lives in the glob buffer and the rest index geometry/dl-call/block
    /// tables, none of which an init-merge splice moves.
    pub fn shift_from(&mut self, from: usize, delta: usize) {
        for item in &mut self.items {
            if item.kind == RelocKind::FunctionAddress && item.location_addr >= from {
                item.location_addr += delta;
            }
        }
    }
}
