//! Instruction opcodes, operand addressing modes, and argument encoding
//! (spec.md #4.4).

use crate::ids::{FuncId, GeomId};
use crate::value::{Arch, CpuValue, MasterType};

/// Concrete VM opcode. A small representative set; `MetaOp` resolves to
/// one of the typed variants (`AddInt`, `AddFloat`, ...) at emission time
/// via `emit_meta` (spec.md #4.4: "resolves a type-polymorphic meta-opcode
/// to a concrete opcode using the data type of the indicated argument").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Nop = 0,
    Move = 1,
    LoadLiteral = 2,
    AddInt = 3,
    AddFloat = 4,
    SubInt = 5,
    SubFloat = 6,
    Cmp = 7,
    Jump = 8,
    JumpIfFalse = 9,
    Call = 10,
    Return = 11,
    DecodeGlobal = 12,
    DecodeIndirect = 13,
    SysCall = 14,
}

impl Opcode {
    /// The concrete load opcode a literal-source `move` rewrites to
    /// (spec.md #4.4 step 1).
    pub fn move_to_load(self) -> Opcode {
        match self {
            Opcode::Move => Opcode::LoadLiteral,
            other => other,
        }
    }

    /// Number of declared argument slots, for the validation pass
    /// (spec.md #4.4 step 4).
    pub fn arity(self) -> usize {
        match self {
            Opcode::Nop | Opcode::Return => 0,
            Opcode::Jump => 1,
            Opcode::Move | Opcode::LoadLiteral | Opcode::JumpIfFalse | Opcode::DecodeGlobal | Opcode::DecodeIndirect => 2,
            Opcode::AddInt | Opcode::AddFloat | Opcode::SubInt | Opcode::SubFloat | Opcode::Cmp => 3,
            Opcode::Call | Opcode::SysCall => 2,
        }
    }

    /// Whether argument slot `index` accepts a literal operand directly,
    /// or requires literal promotion first (spec.md #4.4 step 2).
    pub fn accepts_literal(self, index: usize) -> bool {
        match self {
            Opcode::Move => index == 1,
            Opcode::LoadLiteral => index == 1,
            Opcode::Cmp | Opcode::JumpIfFalse => false,
            _ => false,
        }
    }

    /// A meta-opcode's typed variant, driven by the data type of one of
    /// its arguments.
    pub fn resolve_meta(meta: MetaOp, driver_type: MasterType) -> Opcode {
        match (meta, driver_type) {
            (MetaOp::Add, MasterType::Float) => Opcode::AddFloat,
            (MetaOp::Add, _) => Opcode::AddInt,
            (MetaOp::Sub, MasterType::Float) => Opcode::SubFloat,
            (MetaOp::Sub, _) => Opcode::SubInt,
        }
    }
}

/// Type-polymorphic meta-opcode passed to `emit_meta` (spec.md #4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaOp {
    Add,
    Sub,
}

/// Where an argument's storage lives, independent of its master type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrSpace {
    Global,
    Local,
}

/// One instruction argument (spec.md #4.4 "Argument encoding distinguishes
/// literal values ..., addresses ..., and indirection").
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// An immediate value, little-endian width-matched to its master type.
    Literal(CpuValue),
    /// An absolute offset into code/global, or a stack-frame-relative
    /// offset for locals.
    Address { space: AddrSpace, offset: i64 },
    /// A pointer operand: dereference the address held at `offset`.
    Indirect { space: AddrSpace, offset: i64 },
    /// A label not yet resolved to a code address (recorded as a jump
    /// origin by the emitter).
    JumpLabel(String),
    /// A function reference whose address may still be 0 (recorded as a
    /// forward-call entry by the emitter).
    FuncRef(FuncId, i64),
    /// An unresolved fixed-array geometry index.
    Geometry(GeomId),
}

impl Arg {
    pub fn master_type_tag(&self, arch: Arch) -> Option<MasterType> {
        match self {
            Arg::Literal(v) => Some(v.ty),
            _ => {
                let _ = arch;
                None
            }
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Arg::Literal(_))
    }

    /// Byte encoding of this argument, little-endian and width-matched to
    /// `arch` for address/indirect operands (spec.md #4.4: "Literal
    /// encoding is little-endian width-matched to the cpu type").
    pub fn encode(&self, arch: Arch) -> Vec<u8> {
        match self {
            Arg::Literal(v) => v.bytes.clone(),
            Arg::Address { offset, .. } | Arg::Indirect { offset, .. } => encode_word(*offset, arch),
            Arg::FuncRef(id, addr) => {
                let _ = id;
                encode_word(*addr, arch)
            }
            Arg::Geometry(id) => encode_word(id.0 as i64, arch),
            Arg::JumpLabel(_) => encode_word(0, arch),
        }
    }
}

fn encode_word(value: i64, arch: Arch) -> Vec<u8> {
    match arch {
        Arch::Bits32 => (value as i32).to_le_bytes().to_vec(),
        Arch::Bits64 => value.to_le_bytes().to_vec(),
    }
}
