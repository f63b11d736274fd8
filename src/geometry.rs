//! Fixed- and dynamic-array shape records (spec.md #4.2).

use crate::ids::GeomId;

/// A fixed-array shape: known dimension count and per-dimension sizes at
/// compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixGeom {
    pub dim_sizes: Vec<u32>,
    pub cell_size: u32,
}

impl FixGeom {
    pub fn dim_count(&self) -> usize {
        self.dim_sizes.len()
    }

    pub fn element_count(&self) -> u64 {
        self.dim_sizes.iter().map(|&d| d as u64).product()
    }
}

/// A dynamic-array shape attached to a block representing a literal array
/// value: like [`FixGeom`] but tagged onto block storage rather than a
/// `FixArray` type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynGeom {
    pub dim_sizes: Vec<u32>,
    pub cell_size: u32,
}

/// Hands out stable geometry indices. Index 0 is reserved to mean
/// "unresolved" (spec.md #3.2, testable property 1), so the first global
/// slot is padded and `GeomId`s are 1-based.
#[derive(Debug, Clone, Default)]
pub struct GeometryTable {
    global_fix: Vec<FixGeom>,
    local_fix: Vec<FixGeom>,
    dynamic: Vec<DynGeom>,
}

impl GeometryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_global_fix_geom(&mut self, geom: FixGeom) -> GeomId {
        self.global_fix.push(geom);
        GeomId(self.global_fix.len() as u32)
    }

    pub fn new_local_fix_geom(&mut self, geom: FixGeom) -> GeomId {
        self.local_fix.push(geom);
        GeomId(self.local_fix.len() as u32)
    }

    pub fn global_fix_geom(&self, id: GeomId) -> Option<&FixGeom> {
        id.is_resolved().then(|| self.global_fix.get(id.0 as usize - 1)).flatten()
    }

    pub fn local_fix_geom(&self, id: GeomId) -> Option<&FixGeom> {
        id.is_resolved().then(|| self.local_fix.get(id.0 as usize - 1)).flatten()
    }

    pub fn global_count(&self) -> usize {
        self.global_fix.len()
    }

    pub fn local_count(&self) -> usize {
        self.local_fix.len()
    }

    /// Drops every local geometry at or beyond `from` (used when a local
    /// scope closes and purges its entities, spec.md #4.3 "Scope
    /// open/close").
    pub fn purge_local_from(&mut self, from: usize) {
        self.local_fix.truncate(from);
    }

    pub fn attach_dynamic(&mut self, geom: DynGeom) -> usize {
        self.dynamic.push(geom);
        self.dynamic.len() - 1
    }

    pub fn dynamic_geom(&self, index: usize) -> Option<&DynGeom> {
        self.dynamic.get(index)
    }

    pub fn dynamic_count(&self) -> usize {
        self.dynamic.len()
    }

    pub fn iter_global(&self) -> impl Iterator<Item = (GeomId, &FixGeom)> {
        self.global_fix.iter().enumerate().map(|(i, g)| (GeomId((i + 1) as u32), g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_global_index_is_not_the_unresolved_sentinel() {
        let mut t = GeometryTable::new();
        let id = t.new_global_fix_geom(FixGeom { dim_sizes: vec![4], cell_size: 4 });
        assert!(id.is_resolved());
        assert_eq!(id, GeomId(1));
    }

    #[test]
    fn local_geometries_purge_on_scope_close() {
        let mut t = GeometryTable::new();
        t.new_local_fix_geom(FixGeom { dim_sizes: vec![2], cell_size: 4 });
        t.new_local_fix_geom(FixGeom { dim_sizes: vec![3], cell_size: 4 });
        t.purge_local_from(1);
        assert_eq!(t.local_count(), 1);
    }

    #[test]
    fn element_count_is_the_product_of_dims() {
        let g = FixGeom { dim_sizes: vec![2, 3, 4], cell_size: 1 };
        assert_eq!(g.element_count(), 24);
    }
}
