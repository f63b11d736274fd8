//! The master symbol table (spec.md #3, #4.2, #4.3): flat per-kind storage
//! for every entity, a name-search discipline layered over [`scope::ScopeStack`],
//! and the scope open/close sequence that purges an inner scope's entities
//! back off every table on close.

pub mod records;
pub mod scope;

use crate::error::{CoreError, CoreResult};
use crate::ids::{DimId, FieldId, FuncId, GrantId, ModuleId, ParamId, TrackerId, TypeId, VarId};
use crate::value::MasterType;

use records::{
    Dimension, Field, FieldVisibility, Function, FuncKind, Grant, GrantPartyKind, Module, Parameter, ScopeTag, SubScope,
    Tracker, Type, VarFlags, Variable,
};
use scope::{ConvKey, NameBinding, ScopeFrame, ScopeStack, TableMarks};

/// The whole symbol table: one flat `Vec` per entity kind, addressed only
/// by dense id (spec.md #9: "no record holds a pointer to another
/// record"), plus the open-scope stack that drives name search and purge.
#[derive(Debug, Clone, Default)]
pub struct MasterTable {
    modules: Vec<Module>,
    trackers: Vec<Tracker>,
    dimensions: Vec<Dimension>,
    types: Vec<Type>,
    variables: Vec<Variable>,
    fields: Vec<Field>,
    functions: Vec<Function>,
    parameters: Vec<Parameter>,
    grants: Vec<Grant>,

    scopes: ScopeStack,
}

impl MasterTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn marks(&self) -> TableMarks {
        TableMarks {
            trackers: self.trackers.len(),
            types: self.types.len(),
            variables: self.variables.len(),
            functions: self.functions.len(),
            parameters: self.parameters.len(),
            dimensions: self.dimensions.len(),
            fields: self.fields.len(),
            grants: self.grants.len(),
        }
    }

    // ---- scope open/close (spec.md #4.3) ----------------------------

    pub fn scope_open(&mut self, tag: ScopeTag, module: ModuleId, function: Option<FuncId>, sub_scope: SubScope) {
        let depth = self.scopes.depth() + 1;
        let marks = self.marks();
        self.scopes.push(ScopeFrame::new(tag, module, function, depth, sub_scope, marks));
    }

    /// Step 1 of scope close (spec.md #4.3): pops the innermost scope and
    /// validates every grant declared in it still resolves. Does **not**
    /// purge yet — the caller (`CompilationContext::close_scope`) still
    /// has to run the JumpResolver/CallResolver/init-merge steps that sit
    /// between grant validation and the final purge.
    pub fn pop_scope_validated(&mut self) -> CoreResult<ScopeFrame> {
        let frame = self.scopes.pop().ok_or_else(|| CoreError::Internal("scope_close with no open scope".into()))?;

        for &gid in frame.grants() {
            let grant = &self.grants[gid.index()];
            if !grant.from_validated {
                return Err(CoreError::GrantValidationFailed { from: grant.from_name.clone() });
            }
        }

        Ok(frame)
    }

    /// Step 6 of scope close (spec.md #4.3): purges every entity the
    /// given frame owns from the back of every table, in the strict
    /// reverse-insertion order the spec requires. Only valid for
    /// Private/Local frames — a Public frame's declarations outlive it
    /// (spec.md #3.1 "Modules are never destroyed") and must go through
    /// [`Self::close_frame`] instead.
    pub fn purge_frame(&mut self, frame: &ScopeFrame) {
        self.grants.truncate(frame.marks.grants);
        self.fields.truncate(frame.marks.fields);
        self.dimensions.truncate(frame.marks.dimensions);
        self.parameters.truncate(frame.marks.parameters);
        self.functions.truncate(frame.marks.functions);
        self.variables.truncate(frame.marks.variables);
        self.types.truncate(frame.marks.types);
        self.trackers.truncate(frame.marks.trackers);
    }

    /// Closes `frame` the way its tag demands (spec.md #4.3): Private and
    /// Local frames purge every entity they declared; a Public frame
    /// instead re-exports its declarations into the nearest still-open
    /// enclosing Public frame, so a module's own declarations survive its
    /// outer scope closing. A Public frame with no enclosing Public frame
    /// left open (the outermost module scope) has nowhere to re-export
    /// to, so its entities simply stay in the flat tables untouched.
    pub fn close_frame(&mut self, frame: &ScopeFrame) {
        if !matches!(frame.tag, ScopeTag::Public) {
            self.purge_frame(frame);
            return;
        }
        if let Some(enclosing) = self.scopes.nearest_public_mut() {
            enclosing.merge_exports_from(frame);
        }
    }

    /// Convenience wrapper used where nothing needs to happen between
    /// grant validation and close (e.g. unit tests, or a scope with no
    /// pending local resolution).
    pub fn scope_close(&mut self) -> CoreResult<ScopeFrame> {
        let frame = self.pop_scope_validated()?;
        self.close_frame(&frame);
        Ok(frame)
    }

    pub fn scope_depth(&self) -> i32 {
        self.scopes.depth()
    }

    pub fn current_scope(&self) -> Option<&ScopeFrame> {
        self.scopes.current()
    }

    fn current_scope_mut(&mut self) -> CoreResult<&mut ScopeFrame> {
        self.scopes.current_mut().ok_or_else(|| CoreError::Internal("no open scope".into()))
    }

    // ---- store_* (spec.md #3.1) --------------------------------------

    pub fn store_module(&mut self, module: Module) -> ModuleId {
        self.modules.push(module);
        ModuleId((self.modules.len() - 1) as u32)
    }

    pub fn store_tracker(&mut self, local_name: String, module: ModuleId) -> CoreResult<TrackerId> {
        let depth = self.scopes.depth();
        self.trackers.push(Tracker { local_name: local_name.clone(), module, owner_scope_depth: depth });
        let id = TrackerId((self.trackers.len() - 1) as u32);
        self.current_scope_mut()?.bind_name(&local_name, NameBinding::Tracker(id));
        Ok(id)
    }

    pub fn store_dimension(&mut self, dim: Dimension) -> DimId {
        self.dimensions.push(dim);
        DimId((self.dimensions.len() - 1) as u32)
    }

    pub fn store_type(&mut self, ty: Type) -> CoreResult<TypeId> {
        let name = ty.name.clone();
        self.types.push(ty);
        let id = TypeId((self.types.len() - 1) as u32);
        self.current_scope_mut()?.bind_name(&name, NameBinding::Type(id));
        Ok(id)
    }

    pub fn store_variable(&mut self, var: Variable) -> CoreResult<VarId> {
        let name = var.name.clone();
        self.variables.push(var);
        let id = VarId((self.variables.len() - 1) as u32);
        self.current_scope_mut()?.bind_name(&name, NameBinding::Variable(id));
        Ok(id)
    }

    /// Stores a synthetic variable (e.g. a promoted literal's backing
    /// storage, spec.md #4.5) without binding it into any scope's name
    /// index. These are only ever referenced by patched address, never
    /// looked up by name, and may need to be stored after every scope has
    /// already closed (binary-finalization literal resolution), when
    /// `current_scope_mut` would have nothing to bind into.
    pub fn store_system_variable(&mut self, var: Variable) -> VarId {
        self.variables.push(var);
        VarId((self.variables.len() - 1) as u32)
    }

    /// Bumps the innermost open scope's local-stack counter by `width`
    /// bytes and returns the offset it was allocated at, for a local
    /// variable that needs storage but not a name binding.
    pub fn allocate_local_slot(&mut self, width: usize) -> CoreResult<usize> {
        let frame = self.current_scope_mut()?;
        let offset = frame.stack_size;
        frame.stack_size += width as u64;
        Ok(offset as usize)
    }

    /// Stores a class/enum field and also binds it under its owner type in
    /// the innermost class-body sub-scope so member lookup
    /// (spec.md #4.3 "class-scoped field search") finds it.
    pub fn store_field(&mut self, owner_type: TypeId, field: Field) -> CoreResult<FieldId> {
        let name = field.name.clone();
        self.fields.push(field);
        let id = FieldId((self.fields.len() - 1) as u32);
        // `Field`'s offset is a field within the type's storage, but the
        // lookup table binds by the variable-shaped name the parser side
        // would have created for it; store the field id as a variable name
        // isn't applicable here, so record the mapping via a dedicated
        // index the scope frame keeps per owner type, keyed by a synthetic
        // VarId-free binding.
        self.current_scope_mut()?.bind_field(owner_type, &name, VarId(id.0));
        Ok(id)
    }

    pub fn store_function(&mut self, func: Function) -> CoreResult<FuncId> {
        let name = func.name.clone();
        let sig = self.param_types_for(&func);
        self.functions.push(func);
        let id = FuncId((self.functions.len() - 1) as u32);

        let frame = self.current_scope_mut()?;
        frame.bind_function_exact(&name, sig.clone(), id);
        let conv_sig: Vec<ConvKey> = sig.iter().map(|&t| ConvKey::Exact(t)).collect();
        frame.bind_function_conv(&name, conv_sig, id);
        Ok(id)
    }

    fn param_types_for(&self, func: &Function) -> Vec<TypeId> {
        let (lo, hi) = func.param_range;
        (lo..hi)
            .map(|i| self.parameters.get(i as usize).map(|p| p.ty).unwrap_or(TypeId::INVALID))
            .collect()
    }

    pub fn store_parameter(&mut self, param: Parameter) -> ParamId {
        self.parameters.push(param);
        ParamId((self.parameters.len() - 1) as u32)
    }

    pub fn store_grant(&mut self, grant: Grant) -> CoreResult<GrantId> {
        self.grants.push(grant);
        let id = GrantId((self.grants.len() - 1) as u32);
        self.current_scope_mut()?.push_grant(id);
        Ok(id)
    }

    pub fn mark_grant_validated(&mut self, id: GrantId) {
        if let Some(g) = self.grants.get_mut(id.index()) {
            g.from_validated = true;
        }
    }

    // ---- search_* (spec.md #4.3) --------------------------------------

    /// Searches the open-scope chain top-down for a name, stopping after
    /// (and including) the innermost `Public` frame.
    pub fn search_name(&self, name: &str) -> Option<NameBinding> {
        self.scopes.search_chain().find_map(|f| f.lookup_name(name).first().copied())
    }

    pub fn search_type(&self, name: &str) -> Option<TypeId> {
        self.search_name(name).and_then(|b| match b {
            NameBinding::Type(t) => Some(t),
            _ => None,
        })
    }

    pub fn search_variable(&self, name: &str) -> Option<VarId> {
        self.search_name(name).and_then(|b| match b {
            NameBinding::Variable(v) => Some(v),
            _ => None,
        })
    }

    /// Exact-signature overload search, then (if nothing matched) the
    /// convertible-signature search that collapses numeric types and
    /// strings to shared placeholders (spec.md #4.3). `Err` surfaces an
    /// ambiguous convertible match rather than silently picking one
    /// (spec.md #8 testable property 9(c)): a convertible search that
    /// turns up more than one candidate at the same frame is a genuine
    /// ambiguity the caller must diagnose, not an open design question.
    pub fn search_function(&self, name: &str, args: &[TypeId]) -> Result<Option<FuncId>, Vec<FuncId>> {
        for frame in self.scopes.search_chain() {
            if let Some(id) = frame.lookup_function_exact(name, args) {
                return Ok(Some(id));
            }
        }
        let conv_sig: Vec<ConvKey> = args.iter().map(|&t| self.conv_key_for(t)).collect();
        for frame in self.scopes.search_chain() {
            let matches = frame.lookup_function_conv(name, &conv_sig);
            match matches.len() {
                0 => continue,
                1 => return Ok(Some(matches[0])),
                _ => return Err(matches.to_vec()),
            }
        }
        Ok(None)
    }

    fn conv_key_for(&self, ty: TypeId) -> ConvKey {
        match self.types.get(ty.index()) {
            Some(t) if t.master_type.is_numeric() => ConvKey::Numeric,
            Some(t) if t.master_type == MasterType::String => ConvKey::Str,
            _ => ConvKey::Exact(ty),
        }
    }

    pub fn search_field(&self, owner_type: TypeId, name: &str) -> Option<FieldId> {
        self.scopes
            .search_chain()
            .find_map(|f| f.lookup_field(owner_type, name))
            .map(|v| FieldId(v.0))
    }

    // ---- accessors ------------------------------------------------------

    pub fn module(&self, id: ModuleId) -> CoreResult<&Module> {
        self.modules.get(id.index()).ok_or(CoreError::UnknownModule(id))
    }

    pub fn ty(&self, id: TypeId) -> CoreResult<&Type> {
        self.types.get(id.index()).ok_or(CoreError::UnknownType(id))
    }

    pub fn variable(&self, id: VarId) -> CoreResult<&Variable> {
        self.variables.get(id.index()).ok_or(CoreError::UnknownVariable(id))
    }

    pub fn variable_mut(&mut self, id: VarId) -> CoreResult<&mut Variable> {
        self.variables.get_mut(id.index()).ok_or(CoreError::UnknownVariable(id))
    }

    pub fn function(&self, id: FuncId) -> CoreResult<&Function> {
        self.functions.get(id.index()).ok_or(CoreError::UnknownFunction(id))
    }

    pub fn function_mut(&mut self, id: FuncId) -> CoreResult<&mut Function> {
        self.functions.get_mut(id.index()).ok_or(CoreError::UnknownFunction(id))
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id.index())
    }

    pub fn parameter(&self, id: ParamId) -> Option<&Parameter> {
        self.parameters.get(id.index())
    }

    pub fn dimension(&self, id: DimId) -> Option<&Dimension> {
        self.dimensions.get(id.index())
    }

    pub fn types_iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i as u32), t))
    }

    pub fn functions_iter(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions.iter().enumerate().map(|(i, f)| (FuncId(i as u32), f))
    }

    /// Orders every stored type so each one's element type and field
    /// types precede it (spec.md #3.1: "Type order in the table is
    /// topological w.r.t. type dependencies... dimensions for a FixArray
    /// type precede the type"). Used when a caller needs to serialize the
    /// type/metadata section in dependency order regardless of the order
    /// types happened to be declared in.
    pub fn topological_type_order(&self) -> CoreResult<Vec<TypeId>> {
        use petgraph::algo::toposort;
        use petgraph::graph::DiGraph;

        let mut graph = DiGraph::<TypeId, ()>::with_capacity(self.types.len(), 0);
        let nodes: Vec<_> = (0..self.types.len()).map(|i| graph.add_node(TypeId(i as u32))).collect();

        for (i, ty) in self.types.iter().enumerate() {
            if let Some(elem) = ty.elem_type {
                if elem.index() < nodes.len() {
                    graph.add_edge(nodes[elem.index()], nodes[i], ());
                }
            }
            if let Some((lo, hi)) = ty.field_range {
                let lo = lo as usize;
                let hi = (hi as usize).min(self.fields.len());
                if lo <= hi {
                    for field in &self.fields[lo..hi] {
                        if field.ty.index() < nodes.len() && field.ty.index() != i {
                            graph.add_edge(nodes[field.ty.index()], nodes[i], ());
                        }
                    }
                }
            }
        }

        toposort(&graph, None)
            .map(|order| order.into_iter().map(|n| graph[n]).collect())
            .map_err(|cycle| CoreError::Internal(format!("type dependency cycle involving type #{}", graph[cycle.node_id()].index())))
    }
}

/// Helper for the grant-validation check spec.md #3.1 "Grant" describes:
/// a grant whose `from` side names a class resolves via type search, a
/// function/operator/member grant via function search.
pub fn validate_grant_from(table: &MasterTable, grant: &Grant) -> bool {
    match grant.from_kind {
        GrantPartyKind::Class => table.search_type(&grant.from_name).is_some(),
        GrantPartyKind::Function | GrantPartyKind::Member | GrantPartyKind::Operator => {
            table.scopes.search_chain().any(|f| !f.all_functions_named(&grant.from_name).is_empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Arch;

    fn int_type() -> Type {
        Type {
            name: "int".into(),
            master_type: MasterType::Int,
            owner_scope_depth: 0,
            sub_scope: SubScope::None,
            typedef_origin: None,
            system_defined: true,
            byte_len: 4,
            dim_count: 0,
            elem_type: None,
            dim_index: None,
            field_range: None,
            method_range: None,
            meta_name_addr: None,
            meta_field_names_addr: None,
            meta_field_types_addr: None,
            dl_native_name: None,
            dl_alias: None,
        }
    }

    #[test]
    fn scope_close_purges_entities_declared_inside_it() {
        let mut t = MasterTable::new();
        let m = t.store_module(Module { name: "main".into(), source_path: "main.ds".into(), is_library: false, debug_symbol_index: None });
        t.scope_open(ScopeTag::Public, m, None, SubScope::None);
        t.store_type(int_type()).unwrap();
        assert_eq!(t.types.len(), 1);

        t.scope_open(ScopeTag::Local, m, None, SubScope::None);
        t.store_variable(Variable {
            name: "x".into(),
            owner_scope_depth: t.scope_depth(),
            code_block_tag: None,
            flow_label_tag: None,
            ty: TypeId(0),
            address: records::Address::Local(0),
            flags: VarFlags::empty(),
            metadata_name_addr: None,
        })
        .unwrap();
        assert_eq!(t.variables.len(), 1);

        t.scope_close().unwrap();
        assert_eq!(t.variables.len(), 0, "local variable must be purged on scope close");
        assert_eq!(t.types.len(), 1, "outer type must survive the inner scope closing");
    }

    #[test]
    fn name_search_does_not_cross_past_the_nearest_public_frame() {
        let mut t = MasterTable::new();
        let m = t.store_module(Module { name: "main".into(), source_path: "main.ds".into(), is_library: false, debug_symbol_index: None });
        t.scope_open(ScopeTag::Public, m, None, SubScope::None);
        t.store_type(int_type()).unwrap();
        t.scope_open(ScopeTag::Public, m, None, SubScope::None);
        assert!(t.search_type("int").is_some());
    }

    #[test]
    fn overload_search_falls_back_to_convertible_signature() {
        let mut t = MasterTable::new();
        let m = t.store_module(Module { name: "main".into(), source_path: "main.ds".into(), is_library: false, debug_symbol_index: None });
        t.scope_open(ScopeTag::Public, m, None, SubScope::None);
        let int_id = t.store_type(int_type()).unwrap();
        let mut long_ty = int_type();
        long_ty.name = "long".into();
        long_ty.master_type = MasterType::Long;
        let long_id = t.store_type(long_ty).unwrap();

        t.store_parameter(Parameter { name: "n".into(), func: FuncId(0), ty: int_id, is_const: false, is_reference: false, order: 0, address: None });
        t.store_function(Function {
            kind: FuncKind::Function,
            name: "f".into(),
            qualified_name: "f".into(),
            mangled_id: "f$int".into(),
            owner_scope_depth: t.scope_depth(),
            sub_scope: None,
            code_addr: None,
            return_type: None,
            is_void: true,
            nested: false,
            is_defined: true,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 1),
        })
        .unwrap();

        // exact match
        assert!(matches!(t.search_function("f", &[int_id]), Ok(Some(_))));
        // convertible: long collapses onto the same numeric placeholder as int
        assert!(matches!(t.search_function("f", &[long_id]), Ok(Some(_))));
        let _ = Arch::Bits32;
    }

    #[test]
    fn overload_search_reports_ambiguity_when_multiple_functions_convert() {
        let mut t = MasterTable::new();
        let m = t.store_module(Module { name: "main".into(), source_path: "main.ds".into(), is_library: false, debug_symbol_index: None });
        t.scope_open(ScopeTag::Public, m, None, SubScope::None);
        let int_id = t.store_type(int_type()).unwrap();
        let mut long_ty = int_type();
        long_ty.name = "long".into();
        long_ty.master_type = MasterType::Long;
        let long_id = t.store_type(long_ty).unwrap();
        let mut short_ty = int_type();
        short_ty.name = "short".into();
        short_ty.master_type = MasterType::Short;
        let short_id = t.store_type(short_ty).unwrap();

        t.store_parameter(Parameter { name: "n".into(), func: FuncId(0), ty: int_id, is_const: false, is_reference: false, order: 0, address: None });
        t.store_function(Function {
            kind: FuncKind::Function,
            name: "f".into(),
            qualified_name: "f".into(),
            mangled_id: "f$int".into(),
            owner_scope_depth: t.scope_depth(),
            sub_scope: None,
            code_addr: None,
            return_type: None,
            is_void: true,
            nested: false,
            is_defined: true,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 1),
        })
        .unwrap();

        t.store_parameter(Parameter { name: "n".into(), func: FuncId(1), ty: long_id, is_const: false, is_reference: false, order: 0, address: None });
        t.store_function(Function {
            kind: FuncKind::Function,
            name: "f".into(),
            qualified_name: "f".into(),
            mangled_id: "f$long".into(),
            owner_scope_depth: t.scope_depth(),
            sub_scope: None,
            code_addr: None,
            return_type: None,
            is_void: true,
            nested: false,
            is_defined: true,
            is_initializer: false,
            is_meta_method: false,
            param_range: (1, 2),
        })
        .unwrap();

        // neither overload matches `short` exactly, but both convert from it
        match t.search_function("f", &[short_id]) {
            Err(matches) => assert_eq!(matches.len(), 2, "ambiguous convertible match must report every candidate"),
            other => panic!("expected an ambiguity error, got {other:?}"),
        }
    }

    #[test]
    fn public_scope_close_reexports_declarations_into_the_enclosing_public_scope() {
        let mut t = MasterTable::new();
        let m = t.store_module(Module { name: "main".into(), source_path: "main.ds".into(), is_library: false, debug_symbol_index: None });
        t.scope_open(ScopeTag::Public, m, None, SubScope::None);

        t.scope_open(ScopeTag::Public, m, None, SubScope::None);
        t.store_type(int_type()).unwrap();
        assert_eq!(t.types.len(), 1);

        t.scope_close().unwrap();
        // the type must still be there (never purged) and still resolve
        // by name through the enclosing Public frame's re-exported index.
        assert_eq!(t.types.len(), 1, "a Public scope's own declarations must never be purged");
        assert!(t.search_type("int").is_some(), "re-exported name must resolve from the enclosing Public scope");
    }

    #[test]
    fn topological_type_order_places_element_type_before_array() {
        let mut t = MasterTable::new();
        let m = t.store_module(Module { name: "main".into(), source_path: "main.ds".into(), is_library: false, debug_symbol_index: None });
        t.scope_open(ScopeTag::Public, m, None, SubScope::None);
        let int_id = t.store_type(int_type()).unwrap();
        let mut arr_ty = int_type();
        arr_ty.name = "int[]".into();
        arr_ty.master_type = MasterType::FixArray;
        arr_ty.elem_type = Some(int_id);
        let arr_id = t.store_type(arr_ty).unwrap();

        let order = t.topological_type_order().unwrap();
        let int_pos = order.iter().position(|&id| id == int_id).unwrap();
        let arr_pos = order.iter().position(|&id| id == arr_id).unwrap();
        assert!(int_pos < arr_pos, "element type must precede the array type that depends on it");
    }
}
