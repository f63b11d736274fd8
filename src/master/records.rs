//! Entity record types owned by [`super::MasterTable`]. Every record is
//! referenced elsewhere only by its dense id (spec.md #9: "no record holds
//! a pointer to another record").

use bitflags::bitflags;

use crate::ids::{DimId, FieldId, FuncId, GeomId, ModuleId, ParamId, TypeId, VarId};
use crate::value::MasterType;

/// A lexical scope kind (spec.md GLOSSARY "Scope").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTag {
    Public,
    Private,
    Local,
}

/// Secondary within-class visibility inside a scope (spec.md GLOSSARY
/// "Sub-scope").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubScope {
    None,
    PublicClassBody(TypeId),
    PrivateClassBody(TypeId),
}

impl SubScope {
    pub fn class(self) -> Option<TypeId> {
        match self {
            SubScope::None => None,
            SubScope::PublicClassBody(t) | SubScope::PrivateClassBody(t) => Some(t),
        }
    }

    pub fn is_private(self) -> bool {
        matches!(self, SubScope::PrivateClassBody(_))
    }
}

/// A named compilation unit (spec.md #3.1 "Module").
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub source_path: String,
    pub is_library: bool,
    pub debug_symbol_index: Option<u32>,
}

/// An alias introduced by an import, mapping a local name to a module
/// (spec.md #3.1 "Tracker"). Private to the public scope it was declared
/// in.
#[derive(Debug, Clone)]
pub struct Tracker {
    pub local_name: String,
    pub module: ModuleId,
    pub owner_scope_depth: i32,
}

/// A compile-time array shape record attached to a `FixArray` type
/// (spec.md #3.1 "Dimension").
#[derive(Debug, Clone)]
pub struct Dimension {
    pub sizes: Vec<u32>,
    pub geom: GeomId,
    pub owner_scope_depth: i32,
}

/// A master-type variant plus the metadata spec.md #3.1 "Type" lists.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub master_type: MasterType,
    pub owner_scope_depth: i32,
    /// The enclosing class, for a type declared inside a class body.
    pub sub_scope: SubScope,
    pub typedef_origin: Option<TypeId>,
    pub system_defined: bool,
    pub byte_len: u64,
    pub dim_count: u8,
    pub elem_type: Option<TypeId>,
    pub dim_index: Option<DimId>,
    pub field_range: Option<(u32, u32)>,
    pub method_range: Option<(u32, u32)>,
    pub meta_name_addr: Option<usize>,
    pub meta_field_names_addr: Option<usize>,
    pub meta_field_types_addr: Option<usize>,
    pub dl_native_name: Option<String>,
    pub dl_alias: Option<String>,
}

bitflags! {
    /// Variable flags (spec.md #3.1 "Variable").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VarFlags: u16 {
        const CONST             = 1 << 0;
        const COMPUTED          = 1 << 1;
        const STATIC            = 1 << 2;
        const PARAMETER         = 1 << 3;
        const REFERENCE         = 1 << 4;
        const TEMPORARY         = 1 << 5;
        const LITERAL_CONSTANT  = 1 << 6;
        const SYSTEM_DEFINED    = 1 << 7;
        const TEMP_LOCKED       = 1 << 8;
        const SOURCE_USED       = 1 << 9;
        const INITIALIZED       = 1 << 10;
        const HIDDEN            = 1 << 11;
    }
}

/// Where a variable's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// Byte offset into the global buffer.
    Global(usize),
    /// Byte offset from the current stack frame base.
    Local(usize),
}

impl Address {
    pub fn offset(self) -> usize {
        match self {
            Address::Global(a) | Address::Local(a) => a,
        }
    }

    pub fn is_global(self) -> bool {
        matches!(self, Address::Global(_))
    }
}

/// spec.md #3.1 "Variable".
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub owner_scope_depth: i32,
    /// Block-scoped locals created inside if/for bodies carry a code-block
    /// tag and an optional flow label they're only valid within.
    pub code_block_tag: Option<u32>,
    pub flow_label_tag: Option<String>,
    pub ty: TypeId,
    pub address: Address,
    pub flags: VarFlags,
    pub metadata_name_addr: Option<usize>,
}

/// Sub-scope visibility of a class/enum member (spec.md #3.1 "Field").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldVisibility {
    Public,
    Private,
}

/// A class/enum member (spec.md #3.1 "Field").
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub owner_type: TypeId,
    pub ty: TypeId,
    pub offset: u64,
    pub visibility: FieldVisibility,
    pub is_static: bool,
    pub enum_value: Option<i64>,
    pub owner_scope_depth: i32,
}

/// spec.md #3.1 "Function" kind variants.
#[derive(Debug, Clone)]
pub enum FuncKind {
    Function,
    MasterMethod { master_type: MasterType, method_id: u16 },
    MemberMethod,
    SystemCall { number: u32 },
    SystemInstruction { opcode: u16 },
    DynamicLibFn { library: String, function: String },
    Operator,
}

/// spec.md #3.1 "Function".
#[derive(Debug, Clone)]
pub struct Function {
    pub kind: FuncKind,
    pub name: String,
    pub qualified_name: String,
    pub mangled_id: String,
    pub owner_scope_depth: i32,
    pub sub_scope: Option<TypeId>,
    pub code_addr: Option<usize>,
    pub return_type: Option<TypeId>,
    pub is_void: bool,
    pub nested: bool,
    pub is_defined: bool,
    pub is_initializer: bool,
    pub is_meta_method: bool,
    pub param_range: (u32, u32),
}

impl Function {
    pub fn param_count(&self) -> u32 {
        self.param_range.1 - self.param_range.0
    }

    pub fn is_system_defined(&self) -> bool {
        matches!(
            self.kind,
            FuncKind::MasterMethod { .. } | FuncKind::SystemCall { .. } | FuncKind::SystemInstruction { .. }
        )
    }
}

/// spec.md #3.1 "Parameter".
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub func: FuncId,
    pub ty: TypeId,
    pub is_const: bool,
    pub is_reference: bool,
    pub order: u32,
    /// Assigned when the function body is entered (spec.md #3.1).
    pub address: Option<i64>,
}

/// Which entity kind a grant's "from"/"to" side names (spec.md #3.1
/// "Grant": "variants form a grid of (from-kind) x (to-kind)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantPartyKind {
    Class,
    Function,
    Member,
    Operator,
}

/// An explicit visibility exception (spec.md #3.1 "Grant").
#[derive(Debug, Clone)]
pub struct Grant {
    pub from_kind: GrantPartyKind,
    pub from_name: String,
    pub to_kind: GrantPartyKind,
    pub to_type: TypeId,
    /// Optional field/function selectors narrowing the grant to specific
    /// members; empty means "all members of `to_type`".
    pub to_selectors: Vec<String>,
    pub owner_scope_depth: i32,
    pub from_validated: bool,
}
