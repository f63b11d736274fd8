//! Narrow collaborator traits at the core's boundary (SPEC_FULL.md #6.3).
//! The tokenizer, parser, driver CLI, VM, and dynamic-library loader are
//! out of scope; these traits are the entire surface through which such
//! components would interact with this core.

use std::io::{Read, Seek, Write};

/// Minimal source-location tagging attached to diagnostics.
pub trait SourceLocationProvider {
    fn file(&self) -> &str;
    fn line(&self) -> u32;
    fn column(&self) -> u32;
}

/// A fixed location, for tests and any driver that doesn't need to track
/// a live cursor.
#[derive(Debug, Clone)]
pub struct FixedLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocationProvider for FixedLocation {
    fn file(&self) -> &str {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn column(&self) -> u32 {
        self.column
    }
}

/// Blanket bound `BinaryIo` reads/writes against — satisfied by
/// `std::io::Cursor<Vec<u8>>` in tests and by real files in a driver.
pub trait BinaryStream: Read + Write + Seek {}
impl<T: Read + Write + Seek> BinaryStream for T {}

/// Resolves a dynamic-library function's parameter/return type metadata
/// by (library name, function name); consulted only to validate dl-call
/// signatures (SPEC_FULL.md #6.3).
pub trait DlMetadataProvider {
    fn resolve(&self, library: &str, function: &str) -> Option<DlSignature>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlSignature {
    pub param_master_types: Vec<String>,
    pub return_master_type: Option<String>,
}

/// A stub provider for tests: returns whatever signature was registered
/// for a (library, function) pair, or `None`.
#[derive(Debug, Clone, Default)]
pub struct StubDlMetadataProvider {
    entries: std::collections::HashMap<(String, String), DlSignature>,
}

impl StubDlMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, library: &str, function: &str, sig: DlSignature) {
        self.entries.insert((library.to_string(), function.to_string()), sig);
    }
}

impl DlMetadataProvider for StubDlMetadataProvider {
    fn resolve(&self, library: &str, function: &str) -> Option<DlSignature> {
        self.entries.get(&(library.to_string(), function.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cursor_over_vec_satisfies_binary_stream() {
        fn accepts<S: BinaryStream>(_s: &S) {}
        let cursor = Cursor::new(Vec::<u8>::new());
        accepts(&cursor);
    }

    #[test]
    fn stub_dl_provider_resolves_registered_signatures() {
        let mut stub = StubDlMetadataProvider::new();
        stub.register("mathlib", "sqrt", DlSignature { param_master_types: vec!["float".into()], return_master_type: Some("float".into()) });
        assert!(stub.resolve("mathlib", "sqrt").is_some());
        assert!(stub.resolve("mathlib", "missing").is_none());
    }
}
