//! Append-only byte buffers for code, globals, the per-function init
//! scratch stream, and variable-length blocks (spec.md #4.1).
//!
//! Every buffer hands back a stable byte offset on append, mirroring the
//! `IrModuleBuilder`/`IrFunctionBuilder` pattern elsewhere in this
//! codebase (monotonically increasing index counters wrapped in small
//! dense-id newtypes) but applied to raw bytes instead of IR records.

use byteorder::{ByteOrder, LittleEndian};

use crate::ids::BlockId;

/// A single append-only byte stream with patch/rewind support.
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Appends `data` and returns the byte offset at which it starts.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let addr = self.bytes.len();
        self.bytes.extend_from_slice(data);
        addr
    }

    /// Appends `len` zero bytes, returning the starting offset. Used to
    /// reserve a slot (e.g. the instruction-length word, or a jump
    /// displacement) that gets `patch`ed in once its value is known.
    pub fn append_zeros(&mut self, len: usize) -> usize {
        let addr = self.bytes.len();
        self.bytes.resize(self.bytes.len() + len, 0);
        addr
    }

    /// Overwrites `data` in place starting at `addr`.
    pub fn patch(&mut self, addr: usize, data: &[u8]) {
        let end = addr + data.len();
        assert!(end <= self.bytes.len(), "patch out of bounds: {addr}..{end} > {}", self.bytes.len());
        self.bytes[addr..end].copy_from_slice(data);
    }

    pub fn patch_i16(&mut self, addr: usize, value: i16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_i16(&mut buf, value);
        self.patch(addr, &buf);
    }

    /// Truncates the buffer by `n` bytes (spec.md #4.1 `rewind`), used
    /// when a compile-time-computed constant's storage was already
    /// reserved at declaration time and needs to be given back.
    pub fn rewind(&mut self, n: usize) {
        let new_len = self.bytes.len().saturating_sub(n);
        self.bytes.truncate(new_len);
    }

    /// Splices `other` into this buffer at `at`, returning the spliced
    /// length (spec.md #4.1/#4.7 `merge_init_into_code`). Callers are
    /// responsible for shifting every table that stores an address at or
    /// beyond `at` by the returned length.
    pub fn splice_in(&mut self, at: usize, other: &[u8]) -> usize {
        assert!(at <= self.bytes.len());
        self.bytes.splice(at..at, other.iter().copied());
        other.len()
    }
}

/// One entry in the block table: an optional dynamic-array geometry index
/// (for literal array blocks) plus the raw payload (spec.md #3.1
/// "Block").
#[derive(Debug, Clone)]
pub struct BlockEntry {
    pub dyn_array_geom: Option<u32>,
    pub payload: Vec<u8>,
}

/// Indexed variable-length payload table backing literal strings and
/// literal array storage. Slot 0 is padded so that `BlockId(0)` can mean
/// "unresolved" (spec.md #3.2, testable property 2).
#[derive(Debug, Clone)]
pub struct BlockTable {
    entries: Vec<BlockEntry>,
}

impl Default for BlockTable {
    fn default() -> Self {
        let mut t = BlockTable { entries: Vec::new() };
        t.entries.push(BlockEntry { dyn_array_geom: None, payload: Vec::new() });
        t
    }
}

impl BlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn push(&mut self, entry: BlockEntry) -> BlockId {
        self.entries.push(entry);
        BlockId((self.entries.len() - 1) as u32)
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &BlockEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (BlockId(i as u32), e))
    }
}

/// The four append-only streams spec.md #4.1 describes: code, process
/// globals, the per-function init scratch stream, and the block table.
#[derive(Debug, Clone, Default)]
pub struct BufferStore {
    pub code: ByteBuffer,
    pub glob: ByteBuffer,
    pub init: ByteBuffer,
    pub blocks: BlockTable,
}

impl BufferStore {
    /// Globals buffer starts with one padding byte (spec.md #3.2: "the
    /// first byte of the global buffer [is] padded to preserve [the
    /// geometry/block zero] convention").
    pub fn new() -> Self {
        let mut store = BufferStore::default();
        store.glob.append(&[0]);
        store
    }

    /// Splices the init buffer into the code buffer at `function_start`
    /// and clears the init buffer, returning the number of bytes
    /// inserted. This is the mechanical half of spec.md #4.7; the caller
    /// (the emitter/scope machinery) is responsible for shifting every
    /// other address-bearing table by the returned amount.
    pub fn merge_init_into_code(&mut self, function_start: usize) -> usize {
        let init_bytes = std::mem::take(&mut self.init);
        let shift = self.code.splice_in(function_start, init_bytes.as_slice());
        shift
    }
}
