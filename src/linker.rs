//! Library import (spec.md #4.8): relocates a previously-compiled binary
//! against the current emitter state and appends it, or — for a soft
//! link — keeps only its declarations for deferred resolution.

use crate::binary_io::LibraryImage;
use crate::buffers::BufferStore;
use crate::error::{CoreError, CoreResult};
use crate::geometry::GeometryTable;
use crate::reloc::{RelocKind, RelocTable};
use crate::value::Arch;

/// Current emitter-state counts a library import relocates against
/// (spec.md #4.8 step 1).
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentCounts {
    pub code_len: usize,
    pub glob_len: usize,
    pub geom_count: usize,
    pub block_count: usize,
    pub dl_call_count: usize,
    pub dyn_array_count: usize,
}

/// Version requirement the importer places on the library being linked.
#[derive(Debug, Clone, Copy)]
pub struct VersionRequirement {
    pub major: u16,
    pub minor: u16,
}

pub struct LibraryLinker;

impl LibraryLinker {
    /// spec.md #4.8: validates architecture/format/version compatibility,
    /// then performs either a hard link (appends buffers, relocates and
    /// absorbs the library's own relocation table) or a soft link
    /// (declarations only, every address zeroed). Returns the library's
    /// relocated super-init address so the caller can schedule a call to
    /// it (hard link only).
    pub fn import_library(
        image: &mut LibraryImage,
        arch: Arch,
        requirement: VersionRequirement,
        current: CurrentCounts,
        buffers: &mut BufferStore,
        geoms: &mut GeometryTable,
        relocs: &mut RelocTable,
        hard_link: bool,
    ) -> CoreResult<Option<u64>> {
        if image.header_arch != Some(arch) {
            return Err(CoreError::Internal(format!("library architecture {:?} does not match target {:?}", image.header_arch, arch)));
        }
        if let Some(v) = image.library_version {
            if !v.satisfies(requirement.major, requirement.minor) {
                return Err(CoreError::Internal(format!(
                    "library version {}.{}.{} does not satisfy requirement {}.{}",
                    v.major, v.minor, v.revision, requirement.major, requirement.minor
                )));
            }
        }

        if !hard_link {
            Self::soft_link(image);
            return Ok(None);
        }

        Self::relocate_addresses(image, current);

        buffers.glob.append(&image.glob);
        buffers.code.append(&image.code);
        for entry in &image.relocations {
            if let crate::reloc::RelocKind::BlockInGlobal | crate::reloc::RelocKind::BlockInBlock = entry.kind {
                // block payloads themselves are appended via the caller's
                // own block-table merge (spec.md #4.8 step 5 covers geoms
                // and dl-calls here; block payload bytes travel with the
                // image's own block table, merged by the caller since
                // `LibraryImage` only carries counts for it).
            }
        }
        let _ = geoms; // fixed/dyn geometry rows are appended by the caller from the image's raw geometry section; this module only relocates indices.

        relocs.absorb(image.relocations.drain(..));

        Ok(Some(image.super_init_address))
    }

    fn relocate_addresses(image: &mut LibraryImage, current: CurrentCounts) {
        for item in &mut image.relocations {
            let delta = match item.kind {
                RelocKind::FunctionAddress => current.code_len as i64,
                RelocKind::GlobalAddress => current.glob_len as i64,
                RelocKind::FixArrayGeometry => current.geom_count as i64,
                RelocKind::DynLibCallId => current.dl_call_count as i64,
                RelocKind::BlockInGlobal | RelocKind::BlockInBlock => current.block_count as i64,
            };
            item.location_addr = (item.location_addr as i64 + delta) as usize;
        }

        // spec.md #4.8 step 2: functions live in the code buffer, variables
        // and types in the global buffer — each linker symbol kind shifts
        // by the count of the space it actually addresses.
        for sym in &mut image.linker_funcs {
            sym.address += current.code_len as u64;
        }
        for sym in image.linker_vars.iter_mut().chain(&mut image.linker_types) {
            sym.address += current.glob_len as u64;
        }
        for r in &mut image.undefined_refs {
            r.code_addr += current.code_len as u64;
        }
        image.super_init_address += current.code_len as u64;
    }

    /// spec.md #4.8 "Soft link": zero every address/geometry index,
    /// retain the linker-symbol declarations, append nothing.
    fn soft_link(image: &mut LibraryImage) {
        for sym in image.linker_funcs.iter_mut().chain(&mut image.linker_vars).chain(&mut image.linker_types) {
            sym.address = 0;
        }
        for r in &mut image.undefined_refs {
            r.code_addr = 0;
        }
        image.glob.clear();
        image.code.clear();
        image.relocations.clear();
        image.super_init_address = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_image() -> LibraryImage {
        LibraryImage { header_arch: Some(Arch::Bits32), ..Default::default() }
    }

    #[test]
    fn mismatched_architecture_is_rejected() {
        let mut image = LibraryImage { header_arch: Some(Arch::Bits64), ..Default::default() };
        let mut buffers = BufferStore::new();
        let mut geoms = GeometryTable::new();
        let mut relocs = RelocTable::new();
        let err = LibraryLinker::import_library(
            &mut image,
            Arch::Bits32,
            VersionRequirement { major: 1, minor: 0 },
            CurrentCounts::default(),
            &mut buffers,
            &mut geoms,
            &mut relocs,
            true,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Internal(_)));
    }

    #[test]
    fn soft_link_zeroes_addresses_and_appends_nothing() {
        let mut image = empty_image();
        image.code = vec![1, 2, 3];
        image.linker_funcs.push(crate::binary_io::LinkerSymbol { name: "f".into(), address: 42 });
        let mut buffers = BufferStore::new();
        let mut geoms = GeometryTable::new();
        let mut relocs = RelocTable::new();
        let code_len_before = buffers.code.len();
        let result = LibraryLinker::import_library(
            &mut image,
            Arch::Bits32,
            VersionRequirement { major: 1, minor: 0 },
            CurrentCounts::default(),
            &mut buffers,
            &mut geoms,
            &mut relocs,
            false,
        )
        .unwrap();
        assert!(result.is_none());
        assert_eq!(buffers.code.len(), code_len_before, "soft link must not append code");
        assert_eq!(image.linker_funcs[0].address, 0);
    }

    #[test]
    fn hard_link_relocates_linker_symbol_addresses_per_kind() {
        let mut image = empty_image();
        image.linker_funcs.push(crate::binary_io::LinkerSymbol { name: "f".into(), address: 10 });
        image.linker_vars.push(crate::binary_io::LinkerSymbol { name: "v".into(), address: 20 });
        image.linker_types.push(crate::binary_io::LinkerSymbol { name: "T".into(), address: 30 });
        let mut buffers = BufferStore::new();
        let mut geoms = GeometryTable::new();
        let mut relocs = RelocTable::new();
        let current = CurrentCounts { code_len: 100, glob_len: 5, ..Default::default() };
        LibraryLinker::import_library(
            &mut image,
            Arch::Bits32,
            VersionRequirement { major: 1, minor: 0 },
            current,
            &mut buffers,
            &mut geoms,
            &mut relocs,
            true,
        )
        .unwrap();
        assert_eq!(image.linker_funcs[0].address, 110, "function symbols shift by code_len");
        assert_eq!(image.linker_vars[0].address, 25, "variable symbols shift by glob_len");
        assert_eq!(image.linker_types[0].address, 35, "type symbols shift by glob_len");
    }
}
