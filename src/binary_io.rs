//! Binary container serialization (spec.md #4.10, #6.1): a fixed header
//! followed by labeled, order-fixed sections written with explicit
//! little-endian, architecture-width-matched encoding — the same
//! low-level discipline this codebase's VM_IR module uses for its own
//! on-disk format, generalized to the full section list spec.md #6.1
//! lists.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CoreError, CoreResult};
use crate::reloc::{RelocItem, RelocKind};
use crate::value::Arch;

/// Maximum length of a fixed-width, null-padded ASCII identifier field
/// inside a binary record (spec.md #6.1).
pub const MAX_IDENT_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMark {
    Library,
    Executable,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryManagerConfig {
    pub memory_unit_size: u32,
    pub starting_mem_units: u32,
    pub chunk_mem_units: u32,
    pub block_max: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryVersion {
    pub major: u16,
    pub minor: u16,
    pub revision: u16,
}

impl LibraryVersion {
    /// spec.md #4.8: a hard/soft link checks the importer's version
    /// requirement against the library's own triple.
    pub fn satisfies(&self, required_major: u16, required_minor: u16) -> bool {
        self.major == required_major && self.minor >= required_minor
    }
}

#[derive(Debug, Clone, Default)]
pub struct SectionCounts {
    pub glob_len: u32,
    pub code_len: u32,
    pub farr: u32,
    pub darr: u32,
    pub blck: u32,
    pub dlca: u32,
    pub depn: u32,
    pub uref: u32,
    pub relo: u32,
    pub sdim: u32,
    pub styp: u32,
    pub svar: u32,
    pub sfld: u32,
    pub sfun: u32,
    pub spar: u32,
    pub dmod: u32,
    pub dtyp: u32,
    pub dvar: u32,
    pub dfld: u32,
    pub dfun: u32,
    pub dpar: u32,
    pub dlin: u32,
}

#[derive(Debug, Clone)]
pub struct BinaryHeader {
    pub file_mark: FileMark,
    pub format_version: u16,
    pub arch: Arch,
    pub system_version: String,
    pub build_date: String,
    pub build_time: String,
    pub is_library: bool,
    pub has_debug_symbols: bool,
    pub mem_config: Option<MemoryManagerConfig>,
    pub library_version: Option<LibraryVersion>,
    pub super_init_address: u64,
    pub counts: SectionCounts,
}

#[derive(Debug, Clone)]
pub struct DlCallRecord {
    pub library: String,
    pub function: String,
}

#[derive(Debug, Clone)]
pub struct Dependency {
    pub module_name: String,
}

#[derive(Debug, Clone)]
pub struct UndefinedRef {
    pub module: String,
    pub kind: u8,
    pub code_addr: u64,
    pub name: String,
}

/// A linker symbol: name plus the address spec.md #4.8 step 2 says must be
/// relocated (type metadata, variable, or function address, depending on
/// which `SxxX` section it came from).
#[derive(Debug, Clone)]
pub struct LinkerSymbol {
    pub name: String,
    pub address: u64,
}

/// A debug symbol: variable/function/source-line ranges (spec.md #4.8
/// step 2); `end` is unused for single-address symbols.
#[derive(Debug, Clone)]
pub struct DebugSymbol {
    pub name: String,
    pub begin: u64,
    pub end: u64,
}

/// Everything `BinaryIO::read` parses out of one container (spec.md
/// #6.1). Executables leave the library-only sections empty; libraries
/// leave `mem_config` unset on the header.
#[derive(Debug, Clone, Default)]
pub struct LibraryImage {
    pub header_arch: Option<Arch>,
    pub super_init_address: u64,
    pub library_version: Option<LibraryVersion>,
    pub glob: Vec<u8>,
    pub code: Vec<u8>,
    pub farr_count: u32,
    pub darr_count: u32,
    pub blck_count: u32,
    pub dlca: Vec<DlCallRecord>,
    pub dependencies: Vec<Dependency>,
    pub undefined_refs: Vec<UndefinedRef>,
    pub relocations: Vec<RelocItem>,
    pub linker_types: Vec<LinkerSymbol>,
    pub linker_vars: Vec<LinkerSymbol>,
    pub linker_funcs: Vec<LinkerSymbol>,
}

fn write_fixed_str<W: Write>(w: &mut W, s: &str, position: u64) -> CoreResult<()> {
    let mut buf = [0u8; MAX_IDENT_LEN];
    let bytes = s.as_bytes();
    let n = bytes.len().min(MAX_IDENT_LEN);
    buf[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&buf).map_err(|e| io_err("identifier", position, e))
}

fn read_fixed_str<R: Read>(r: &mut R, position: u64) -> CoreResult<String> {
    let mut buf = [0u8; MAX_IDENT_LEN];
    r.read_exact(&mut buf).map_err(|e| io_err("identifier", position, e))?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(MAX_IDENT_LEN);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

fn io_err(file_mark: &'static str, position: u64, source: io::Error) -> CoreError {
    CoreError::Io { file_mark, position, source }
}

/// Reads/writes the binary container. Library vs executable differ only
/// in the file-mark tag and which optional sections are populated
/// (spec.md #4.10).
pub struct BinaryIo;

impl BinaryIo {
    pub fn write_header<W: Write>(w: &mut W, header: &BinaryHeader) -> CoreResult<()> {
        let mark = match header.file_mark {
            FileMark::Library => b"BSLB",
            FileMark::Executable => b"BSEX",
        };
        w.write_all(mark).map_err(|e| io_err("header", 0, e))?;
        w.write_u16::<LittleEndian>(header.format_version).map_err(|e| io_err("header", 4, e))?;
        w.write_u8(match header.arch {
            Arch::Bits32 => 32,
            Arch::Bits64 => 64,
        })
        .map_err(|e| io_err("header", 6, e))?;
        write_fixed_str(w, &header.system_version, 7)?;
        write_fixed_str(w, &header.build_date, 7 + MAX_IDENT_LEN as u64)?;
        write_fixed_str(w, &header.build_time, 7 + 2 * MAX_IDENT_LEN as u64)?;
        w.write_u8(header.is_library as u8).map_err(|e| io_err("header", 0, e))?;
        w.write_u8(header.has_debug_symbols as u8).map_err(|e| io_err("header", 0, e))?;

        if let Some(mem) = header.mem_config {
            w.write_u32::<LittleEndian>(mem.memory_unit_size).map_err(|e| io_err("header.mem", 0, e))?;
            w.write_u32::<LittleEndian>(mem.starting_mem_units).map_err(|e| io_err("header.mem", 0, e))?;
            w.write_u32::<LittleEndian>(mem.chunk_mem_units).map_err(|e| io_err("header.mem", 0, e))?;
            w.write_u32::<LittleEndian>(mem.block_max).map_err(|e| io_err("header.mem", 0, e))?;
        }
        if let Some(v) = header.library_version {
            w.write_u16::<LittleEndian>(v.major).map_err(|e| io_err("header.version", 0, e))?;
            w.write_u16::<LittleEndian>(v.minor).map_err(|e| io_err("header.version", 0, e))?;
            w.write_u16::<LittleEndian>(v.revision).map_err(|e| io_err("header.version", 0, e))?;
        }
        w.write_u64::<LittleEndian>(header.super_init_address).map_err(|e| io_err("header", 0, e))?;
        Self::write_counts(w, &header.counts)?;
        Ok(())
    }

    fn write_counts<W: Write>(w: &mut W, c: &SectionCounts) -> CoreResult<()> {
        for n in [
            c.glob_len, c.code_len, c.farr, c.darr, c.blck, c.dlca, c.depn, c.uref, c.relo, c.sdim, c.styp, c.svar, c.sfld, c.sfun,
            c.spar, c.dmod, c.dtyp, c.dvar, c.dfld, c.dfun, c.dpar, c.dlin,
        ] {
            w.write_u32::<LittleEndian>(n).map_err(|e| io_err("header.counts", 0, e))?;
        }
        Ok(())
    }

    pub fn write_section<W: Write>(w: &mut W, tag: &[u8; 4], bytes: &[u8]) -> CoreResult<()> {
        w.write_all(tag).map_err(|e| io_err("section-tag", 0, e))?;
        w.write_all(bytes).map_err(|e| io_err("section-body", 0, e))?;
        Ok(())
    }

    pub fn write_reloc<W: Write>(w: &mut W, item: &RelocItem) -> CoreResult<()> {
        let kind = match item.kind {
            RelocKind::FunctionAddress => 0u8,
            RelocKind::GlobalAddress => 1,
            RelocKind::FixArrayGeometry => 2,
            RelocKind::DynLibCallId => 3,
            RelocKind::BlockInGlobal => 4,
            RelocKind::BlockInBlock => 5,
        };
        w.write_u8(kind).map_err(|e| io_err("RELO", 0, e))?;
        w.write_u64::<LittleEndian>(item.location_addr as u64).map_err(|e| io_err("RELO", 0, e))?;
        w.write_u32::<LittleEndian>(item.location_block.map(|b| b.0).unwrap_or(0)).map_err(|e| io_err("RELO", 0, e))?;
        write_fixed_str(w, &item.module_name, 0)?;
        write_fixed_str(w, &item.object_name, 0)?;
        w.write_u32::<LittleEndian>(item.copy_count).map_err(|e| io_err("RELO", 0, e))?;
        Ok(())
    }

    pub fn read_reloc<R: Read>(r: &mut R) -> CoreResult<RelocItem> {
        let kind = match r.read_u8().map_err(|e| io_err("RELO", 0, e))? {
            0 => RelocKind::FunctionAddress,
            1 => RelocKind::GlobalAddress,
            2 => RelocKind::FixArrayGeometry,
            3 => RelocKind::DynLibCallId,
            4 => RelocKind::BlockInGlobal,
            _ => RelocKind::BlockInBlock,
        };
        let location_addr = r.read_u64::<LittleEndian>().map_err(|e| io_err("RELO", 0, e))? as usize;
        let block_raw = r.read_u32::<LittleEndian>().map_err(|e| io_err("RELO", 0, e))?;
        let module_name = read_fixed_str(r, 0)?;
        let object_name = read_fixed_str(r, 0)?;
        let copy_count = r.read_u32::<LittleEndian>().map_err(|e| io_err("RELO", 0, e))?;
        Ok(RelocItem {
            kind,
            location_addr,
            location_block: (block_raw != 0).then(|| crate::ids::BlockId(block_raw)),
            module_name,
            object_name,
            copy_count,
        })
    }

    pub fn write_linker_symbol<W: Write>(w: &mut W, sym: &LinkerSymbol) -> CoreResult<()> {
        write_fixed_str(w, &sym.name, 0)?;
        w.write_u64::<LittleEndian>(sym.address).map_err(|e| io_err("linker-symbol", 0, e))?;
        Ok(())
    }

    pub fn read_linker_symbol<R: Read>(r: &mut R) -> CoreResult<LinkerSymbol> {
        let name = read_fixed_str(r, 0)?;
        let address = r.read_u64::<LittleEndian>().map_err(|e| io_err("linker-symbol", 0, e))?;
        Ok(LinkerSymbol { name, address })
    }
}
