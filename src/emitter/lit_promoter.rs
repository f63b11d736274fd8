//! Literal-to-variable promotion (spec.md #4.5): records every literal
//! written into an argument slot that doesn't accept literals directly,
//! then — at scope close for locals, or at binary finalization for
//! globals — collapses them by fingerprint into one backing variable each.

use std::collections::BTreeMap;

use crate::value::CpuValue;

/// Whether a promoted literal's backing variable should live in the
/// global buffer or the enclosing local frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredScope {
    Global,
    Local,
}

/// One literal awaiting promotion.
#[derive(Debug, Clone)]
pub struct PendingLiteral {
    pub scope_depth: i32,
    pub desired: DesiredScope,
    pub value: CpuValue,
    /// Byte offset in the code buffer where the backing variable's
    /// address must be patched in once allocated.
    pub patch_addr: usize,
    /// Tag placed in the assembler listing line at emission time, to be
    /// substituted with the variable's printed name once it's allocated.
    pub replacement_tag: String,
}

/// The literals that collapsed onto one fingerprint, ready for one
/// variable allocation.
#[derive(Debug, Clone)]
pub struct PromotionGroup {
    pub fingerprint: String,
    pub value: CpuValue,
    pub desired: DesiredScope,
    pub sites: Vec<(usize, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct LitPromoter {
    pending: Vec<PendingLiteral>,
    next_tag: u32,
}

impl LitPromoter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a literal for promotion and returns its assembler
    /// replacement tag.
    pub fn register(&mut self, scope_depth: i32, desired: DesiredScope, value: CpuValue, patch_addr: usize) -> String {
        let tag = format!("%LIT{}", self.next_tag);
        self.next_tag += 1;
        self.pending.push(PendingLiteral { scope_depth, desired, value, patch_addr, replacement_tag: tag.clone() });
        tag
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Removes and groups every literal recorded at `scope_depth` by
    /// fingerprint (spec.md #4.5: "for each distinct fingerprint
    /// allocates one backing variable (reuse across records with the
    /// same fingerprint)"), preserving first-seen order.
    pub fn drain_depth(&mut self, scope_depth: i32) -> Vec<PromotionGroup> {
        let (closing, remaining): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|p| p.scope_depth == scope_depth);
        self.pending = remaining;
        Self::group(closing)
    }

    /// Same grouping, for every literal still pending regardless of
    /// depth — used at binary finalization for global-desired literals
    /// that outlive every scope.
    pub fn drain_all(&mut self) -> Vec<PromotionGroup> {
        let all = std::mem::take(&mut self.pending);
        Self::group(all)
    }

    fn group(records: Vec<PendingLiteral>) -> Vec<PromotionGroup> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, PromotionGroup> = BTreeMap::new();
        for p in records {
            let fp = p.value.fingerprint();
            groups
                .entry(fp.clone())
                .or_insert_with(|| {
                    order.push(fp.clone());
                    PromotionGroup { fingerprint: fp.clone(), value: p.value.clone(), desired: p.desired, sites: Vec::new() }
                })
                .sites
                .push((p.patch_addr, p.replacement_tag));
        }
        order.into_iter().map(|fp| groups.remove(&fp).unwrap()).collect()
    }

    /// Shifts every recorded patch address at or beyond `from` by `delta`
    /// (spec.md #4.7 init-merge fan-out).
    pub fn shift_from(&mut self, from: usize, delta: usize) {
        for p in &mut self.pending {
            if p.patch_addr >= from {
                p.patch_addr += delta;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_literals_collapse_into_one_group() {
        let mut lp = LitPromoter::new();
        lp.register(0, DesiredScope::Local, CpuValue::int(7), 10);
        lp.register(0, DesiredScope::Local, CpuValue::int(7), 20);
        lp.register(0, DesiredScope::Local, CpuValue::int(8), 30);

        let groups = lp.drain_depth(0);
        assert_eq!(groups.len(), 2, "literal promoter must de-duplicate by fingerprint");
        let seven = groups.iter().find(|g| g.value == CpuValue::int(7)).unwrap();
        assert_eq!(seven.sites.len(), 2);
    }

    #[test]
    fn drain_depth_only_takes_its_own_scope() {
        let mut lp = LitPromoter::new();
        lp.register(0, DesiredScope::Global, CpuValue::int(1), 0);
        lp.register(1, DesiredScope::Local, CpuValue::int(2), 0);
        let depth1 = lp.drain_depth(1);
        assert_eq!(depth1.len(), 1);
        assert_eq!(lp.pending_count(), 1, "depth-0 literal must remain pending");
    }
}
