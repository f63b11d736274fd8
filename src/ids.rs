//! Dense integer identifiers handed out by [`crate::master::MasterTable`] and
//! friends. Every entity is owned by exactly one table and referenced
//! elsewhere only by one of these newtypes, following this codebase's
//! existing `bsharp_vm_ir::ids` convention (`FunctionId(pub u32)` etc.)
//! rather than storing pointers between records.

macro_rules! dense_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: $name = $name(u32::MAX);

            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl From<usize> for $name {
            fn from(v: usize) -> Self {
                $name(v as u32)
            }
        }
    };
}

dense_id!(ModuleId);
dense_id!(TrackerId);
dense_id!(TypeId);
dense_id!(VarId);
dense_id!(FieldId);
dense_id!(FuncId);
dense_id!(ParamId);
dense_id!(GrantId);
dense_id!(DimId);

/// Geometry index. `GeomId(0)` is reserved to mean "unresolved" (spec.md
/// #3.2 / #8 invariant 1), so it is *not* a valid table slot; geometry
/// table row `i` is addressed by `GeomId(i as u32 + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeomId(pub u32);

impl GeomId {
    pub const UNRESOLVED: GeomId = GeomId(0);

    pub fn is_resolved(self) -> bool {
        self.0 != 0
    }
}

/// Block handle. `BlockId(0)` is reserved to mean "unresolved" (spec.md
/// #3.2 / #8 invariant 2), mirroring [`GeomId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const UNRESOLVED: BlockId = BlockId(0);

    pub fn is_resolved(self) -> bool {
        self.0 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_and_block_zero_are_unresolved() {
        assert!(!GeomId::UNRESOLVED.is_resolved());
        assert!(!BlockId::UNRESOLVED.is_resolved());
        assert!(GeomId(1).is_resolved());
        assert!(BlockId(1).is_resolved());
    }

    #[test]
    fn dense_ids_round_trip_through_usize() {
        let id: TypeId = 7usize.into();
        assert_eq!(id.index(), 7);
        assert!(id.is_valid());
        assert!(!TypeId::INVALID.is_valid());
    }
}
