//! Error kinds produced by the core, grouped the way spec.md #7 enumerates them.

use std::io;
use thiserror::Error;

use crate::ids::{BlockId, FuncId, GeomId, ModuleId, TypeId, VarId};

/// Top-level error type returned by fallible core operations.
///
/// Command-line and syntax errors are produced upstream of this crate; the
/// core only forwards their already-formatted messages through
/// [`crate::diag::Diagnostic`]. This enum covers the remaining kinds: file
/// I/O, semantic violations the core itself detects, and internal
/// invariant breaks.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error on {file_mark} at stream position {position}: {source}")]
    Io {
        file_mark: &'static str,
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("duplicate declaration of `{name}` in scope depth {scope_depth}")]
    DuplicateDeclaration { name: String, scope_depth: i32 },

    #[error("unresolved reference to `{name}`")]
    UnresolvedReference { name: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("visibility violation: `{member}` is not visible from this scope")]
    VisibilityViolation { member: String },

    #[error("grant validation failed: `{from}` does not resolve to a grantor")]
    GrantValidationFailed { from: String },

    #[error("literal value overflow for type {ty}: `{text}`")]
    LiteralOverflow { ty: String, text: String },

    #[error("arithmetic exception during constant folding: {0}")]
    ArithmeticException(String),

    #[error("unresolved jump origin for label `{label}` at scope depth {scope_depth}")]
    UnresolvedJump { label: String, scope_depth: i32 },

    #[error("unresolved forward call to `{mangled_id}` at scope depth {scope_depth}")]
    UnresolvedCall { mangled_id: String, scope_depth: i32 },

    #[error("geometry index {0:?} referenced but never resolved")]
    UnresolvedGeometry(GeomId),

    #[error("block handle {0:?} referenced but never resolved")]
    UnresolvedBlock(BlockId),

    #[error("module {0:?} not found")]
    UnknownModule(ModuleId),

    #[error("type {0:?} not found")]
    UnknownType(TypeId),

    #[error("function {0:?} not found")]
    UnknownFunction(FuncId),

    #[error("variable {0:?} not found")]
    UnknownVariable(VarId),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// True for errors that indicate a bug in the core itself rather than
    /// a problem with the compiled program.
    pub fn is_internal(&self) -> bool {
        matches!(self, CoreError::Internal(_))
    }
}
