//! The lexical scope stack (spec.md #4.3 "ScopeStack"): one frame per open
//! scope, each carrying its own per-kind search indices, a temp-variable
//! reuse pool, and label generators, plus the table-length "marks" needed
//! to purge a scope's entities from the back of every `MasterTable` vector
//! on close.

use std::collections::HashMap;

use crate::ids::{FuncId, GrantId, ModuleId, TrackerId, TypeId, VarId};

use super::records::{ScopeTag, SubScope};

/// What a plain name lookup inside one frame can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameBinding {
    Module(ModuleId),
    Tracker(TrackerId),
    Type(TypeId),
    Variable(VarId),
}

/// Overload-resolution key for the "convertible parameter list" search
/// (spec.md #4.3: "numeric types collapse to one placeholder, strings
/// likewise").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConvKey {
    Numeric,
    Str,
    Exact(TypeId),
}

/// Snapshot of every `MasterTable` vector's length at the moment a scope
/// opened. Closing the scope truncates each vector back to its mark, in
/// the strict reverse-insertion purge order spec.md #4.3 specifies:
/// grants, fields, dimensions, parameters, functions, variables, types,
/// trackers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableMarks {
    pub trackers: usize,
    pub types: usize,
    pub variables: usize,
    pub functions: usize,
    pub parameters: usize,
    pub dimensions: usize,
    pub fields: usize,
    pub grants: usize,
}

#[derive(Debug, Clone, Default)]
struct TempKey {
    ty: Option<TypeId>,
    is_reference: bool,
    category: String,
}

#[derive(Debug, Clone)]
pub struct ScopeFrame {
    pub tag: ScopeTag,
    pub module: ModuleId,
    pub function: Option<FuncId>,
    pub depth: i32,
    pub sub_scope: SubScope,
    pub marks: TableMarks,

    by_name: HashMap<String, Vec<NameBinding>>,
    functions_exact: HashMap<(String, Vec<TypeId>), FuncId>,
    functions_conv: HashMap<(String, Vec<ConvKey>), Vec<FuncId>>,
    fields_via_type: HashMap<TypeId, HashMap<String, VarId>>,
    grants: Vec<GrantId>,

    /// Cumulative local-stack size counter; reset when a Local scope opens
    /// (spec.md #4.3 "Scope open/close").
    pub stack_size: u64,
    label_counter: u32,
    temp_counters: HashMap<String, u32>,
}

impl ScopeFrame {
    pub fn new(tag: ScopeTag, module: ModuleId, function: Option<FuncId>, depth: i32, sub_scope: SubScope, marks: TableMarks) -> Self {
        ScopeFrame {
            tag,
            module,
            function,
            depth,
            sub_scope,
            marks,
            by_name: HashMap::new(),
            functions_exact: HashMap::new(),
            functions_conv: HashMap::new(),
            fields_via_type: HashMap::new(),
            grants: Vec::new(),
            stack_size: 0,
            label_counter: 0,
            temp_counters: HashMap::new(),
        }
    }

    pub fn bind_name(&mut self, name: &str, binding: NameBinding) {
        self.by_name.entry(name.to_string()).or_default().push(binding);
    }

    pub fn lookup_name(&self, name: &str) -> &[NameBinding] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bind_function_exact(&mut self, name: &str, sig: Vec<TypeId>, id: FuncId) {
        self.functions_exact.insert((name.to_string(), sig), id);
    }

    pub fn lookup_function_exact(&self, name: &str, sig: &[TypeId]) -> Option<FuncId> {
        self.functions_exact.get(&(name.to_string(), sig.to_vec())).copied()
    }

    pub fn bind_function_conv(&mut self, name: &str, conv_sig: Vec<ConvKey>, id: FuncId) {
        self.functions_conv.entry((name.to_string(), conv_sig)).or_default().push(id);
    }

    pub fn lookup_function_conv(&self, name: &str, conv_sig: &[ConvKey]) -> &[FuncId] {
        self.functions_conv.get(&(name.to_string(), conv_sig.to_vec())).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_functions_named(&self, name: &str) -> Vec<FuncId> {
        self.functions_exact
            .iter()
            .filter(|((n, _), _)| n == name)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn bind_field(&mut self, owner_type: TypeId, name: &str, field_var: VarId) {
        self.fields_via_type.entry(owner_type).or_default().insert(name.to_string(), field_var);
    }

    pub fn lookup_field(&self, owner_type: TypeId, name: &str) -> Option<VarId> {
        self.fields_via_type.get(&owner_type).and_then(|m| m.get(name)).copied()
    }

    pub fn push_grant(&mut self, id: GrantId) {
        self.grants.push(id);
    }

    pub fn grants(&self) -> &[GrantId] {
        &self.grants
    }

    pub fn next_label(&mut self) -> String {
        let n = self.label_counter;
        self.label_counter += 1;
        format!("__L{n}")
    }

    pub fn next_temp_name(&mut self, category: &str) -> String {
        let counter = self.temp_counters.entry(category.to_string()).or_insert(0);
        let name = format!("__t_{category}_{counter}");
        *counter += 1;
        name
    }

    /// Re-exports every name `other` declared into `self` (spec.md #4.3: a
    /// closing Public scope "optionally copies indices to the enclosing
    /// Public scope" instead of purging them, since "modules are never
    /// destroyed").
    pub fn merge_exports_from(&mut self, other: &ScopeFrame) {
        for (name, bindings) in &other.by_name {
            self.by_name.entry(name.clone()).or_default().extend(bindings.iter().copied());
        }
        for (key, id) in &other.functions_exact {
            self.functions_exact.insert(key.clone(), *id);
        }
        for (key, ids) in &other.functions_conv {
            self.functions_conv.entry(key.clone()).or_default().extend(ids.iter().copied());
        }
        for (ty, fields) in &other.fields_via_type {
            let dst = self.fields_via_type.entry(*ty).or_default();
            for (name, var) in fields {
                dst.insert(name.clone(), *var);
            }
        }
    }
}

/// The stack of open lexical scopes.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> i32 {
        self.frames.len() as i32 - 1
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, frame: ScopeFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ScopeFrame> {
        self.frames.pop()
    }

    pub fn current(&self) -> Option<&ScopeFrame> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut ScopeFrame> {
        self.frames.last_mut()
    }

    pub fn root_public(&self) -> Option<&ScopeFrame> {
        self.frames.iter().find(|f| matches!(f.tag, ScopeTag::Public))
    }

    pub fn root_public_mut(&mut self) -> Option<&mut ScopeFrame> {
        self.frames.iter_mut().find(|f| matches!(f.tag, ScopeTag::Public))
    }

    /// Finds the Public frame nearest the top of the stack: the frame a
    /// closing Public scope's declarations re-export into, as opposed to
    /// [`Self::root_public_mut`]'s outermost one.
    pub fn nearest_public_mut(&mut self) -> Option<&mut ScopeFrame> {
        self.frames.iter_mut().rev().find(|f| matches!(f.tag, ScopeTag::Public))
    }

    /// True if a Local scope is currently open somewhere on the stack
    /// beneath the very top frame — i.e. the current local function call
    /// is nested inside another local scope (spec.md #4.3 "if closing a
    /// local scope and no parent local is open").
    pub fn has_parent_local(&self) -> bool {
        if self.frames.len() < 2 {
            return false;
        }
        self.frames[..self.frames.len() - 1].iter().any(|f| matches!(f.tag, ScopeTag::Local))
    }

    /// Iterates frames from the top of the stack downward, stopping after
    /// (and including) the first Public frame — the search discipline
    /// from spec.md #4.3.
    pub fn search_chain(&self) -> impl Iterator<Item = &ScopeFrame> {
        let mut done = false;
        self.frames.iter().rev().take_while(move |f| {
            if done {
                return false;
            }
            if matches!(f.tag, ScopeTag::Public) {
                done = true;
            }
            true
        })
    }
}
