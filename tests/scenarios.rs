//! End-to-end scenarios (A)-(F) from spec.md #8, driven directly against
//! `CompilationContext` the way a parser front end would — this crate
//! doesn't implement a front end, so each scenario plays the parser's
//! part by hand.

use vmlang_core::config::CoreConfig;
use vmlang_core::context::CompilationContext;
use vmlang_core::emitter::opcode::{AddrSpace, Arg, Opcode};
use vmlang_core::ids::FuncId;
use vmlang_core::master::records::{
    Address, Field, FieldVisibility, FuncKind, Function, Module, Parameter, ScopeTag, SubScope, Type, VarFlags, Variable,
};
use vmlang_core::value::{Arch, CpuValue, MasterType};

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

fn open_module(ctx: &mut CompilationContext, name: &str) -> vmlang_core::ids::ModuleId {
    let m = ctx.master.store_module(Module { name: name.into(), source_path: format!("{name}.ds"), is_library: false, debug_symbol_index: None });
    ctx.open_scope(ScopeTag::Public, m, None, SubScope::None);
    m
}

/// (A) Empty main: a module with a single `main` function whose body
/// emits nothing beyond a `return`.
#[test]
fn scenario_a_empty_main_compiles_to_a_single_return() {
    let mut ctx = CompilationContext::new(CoreConfig::default());
    let m = open_module(&mut ctx, "main");

    let main_id = ctx
        .master
        .store_function(Function {
            kind: FuncKind::Function,
            name: "main".into(),
            qualified_name: "main".into(),
            mangled_id: "main".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            sub_scope: None,
            code_addr: Some(0),
            return_type: None,
            is_void: true,
            nested: false,
            is_defined: true,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 0),
        })
        .unwrap();

    ctx.open_scope(ScopeTag::Local, m, Some(main_id), SubScope::None);
    ctx.emit(Opcode::Return, vec![]).unwrap();
    ctx.close_scope().unwrap();
    ctx.close_scope().unwrap();

    assert!(ctx.buffers.code.len() >= 4, "opcode + length word must have been written");
    assert_eq!(ctx.master.scope_depth(), -1);
    assert_eq!(ctx.diagnostics.error_count(), 0);
}

/// (B) Global integer constant: a public scope declares `const int
/// __architecture__ = 64;` — stored as a global variable, no locals to
/// purge on the outer scope's close.
#[test]
fn scenario_b_global_integer_constant_survives_as_a_global_variable() {
    let mut ctx = CompilationContext::new(CoreConfig::default());
    let m = open_module(&mut ctx, "main");
    let int_id = ctx.master.store_type(int_type()).unwrap();

    let addr = ctx.buffers.glob.append(&64i32.to_le_bytes());
    let var_id = ctx
        .master
        .store_variable(Variable {
            name: "__architecture__".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            code_block_tag: None,
            flow_label_tag: None,
            ty: int_id,
            address: Address::Global(addr),
            flags: VarFlags::CONST | VarFlags::INITIALIZED,
            metadata_name_addr: None,
        })
        .unwrap();

    assert!(ctx.master.search_variable("__architecture__").is_some());
    let var = ctx.master.variable(var_id).unwrap();
    assert!(var.flags.contains(VarFlags::CONST));
    assert!(var.address.is_global());

    ctx.close_scope().unwrap();
    // Public scope close does not purge (spec.md #4.3 purge only applies
    // to Private/Local closes).
    let _ = m;
}

/// (C) Library with one exported function: compiling as a library means
/// the function is stored `is_defined` with a code address and carries a
/// mangled id a linker symbol table would later expose.
#[test]
fn scenario_c_library_exported_function_gets_a_stable_mangled_id() {
    let mut ctx = CompilationContext::new(CoreConfig::default());
    let m = ctx.master.store_module(Module { name: "mathlib".into(), source_path: "mathlib.ds".into(), is_library: true, debug_symbol_index: None });
    ctx.open_scope(ScopeTag::Public, m, None, SubScope::None);
    let int_id = ctx.master.store_type(int_type()).unwrap();

    ctx.master.store_parameter(Parameter { name: "n".into(), func: FuncId(0), ty: int_id, is_const: false, is_reference: false, order: 0, address: None });
    let f = ctx
        .master
        .store_function(Function {
            kind: FuncKind::Function,
            name: "square".into(),
            qualified_name: "mathlib::square".into(),
            mangled_id: "mathlib$square$int".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            sub_scope: None,
            code_addr: Some(ctx.buffers.code.len()),
            return_type: Some(int_id),
            is_void: false,
            nested: false,
            is_defined: true,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 1),
        })
        .unwrap();

    assert!(matches!(ctx.master.search_function("square", &[int_id]), Ok(Some(_))));
    assert_eq!(ctx.master.function(f).unwrap().mangled_id, "mathlib$square$int");
    ctx.close_scope().unwrap();
}

/// A module's own Public scope closing must not destroy its declarations
/// when an outer Public scope (the program root) is still open — they
/// re-export into it instead of being purged (spec.md #4.3, #3.1 "modules
/// are never destroyed").
#[test]
fn scenario_c2_module_declarations_survive_their_own_public_scope_closing() {
    let mut ctx = CompilationContext::new(CoreConfig::default());
    let root = ctx.master.store_module(Module { name: "root".into(), source_path: "root.ds".into(), is_library: false, debug_symbol_index: None });
    ctx.open_scope(ScopeTag::Public, root, None, SubScope::None);

    let m = ctx.master.store_module(Module { name: "mathlib".into(), source_path: "mathlib.ds".into(), is_library: true, debug_symbol_index: None });
    ctx.open_scope(ScopeTag::Public, m, None, SubScope::None);
    let int_id = ctx.master.store_type(int_type()).unwrap();
    ctx.master.store_parameter(Parameter { name: "n".into(), func: FuncId(0), ty: int_id, is_const: false, is_reference: false, order: 0, address: None });
    ctx.master
        .store_function(Function {
            kind: FuncKind::Function,
            name: "square".into(),
            qualified_name: "mathlib::square".into(),
            mangled_id: "mathlib$square$int".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            sub_scope: None,
            code_addr: Some(0),
            return_type: Some(int_id),
            is_void: false,
            nested: false,
            is_defined: true,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 1),
        })
        .unwrap();

    ctx.close_scope().unwrap();

    assert!(
        matches!(ctx.master.search_function("square", &[int_id]), Ok(Some(_))),
        "a module's declarations must survive its own Public scope closing"
    );
}

/// (D) Static class field: a class body sub-scope declares a field and a
/// grant-free static field lookup resolves via the class-scoped search.
#[test]
fn scenario_d_static_class_field_resolves_via_class_scope() {
    let mut ctx = CompilationContext::new(CoreConfig::default());
    let m = open_module(&mut ctx, "main");
    let int_id = ctx.master.store_type(int_type()).unwrap();

    let class_ty = ctx
        .master
        .store_type(Type { name: "Counter".into(), master_type: MasterType::Class, ..int_type() })
        .unwrap();

    ctx.open_scope(ScopeTag::Private, m, None, SubScope::PublicClassBody(class_ty));
    let field_id = ctx
        .master
        .store_field(
            class_ty,
            Field { name: "count".into(), owner_type: class_ty, ty: int_id, offset: 0, visibility: FieldVisibility::Public, is_static: true, enum_value: None, owner_scope_depth: ctx.master.scope_depth() },
        )
        .unwrap();
    assert!(ctx.master.search_field(class_ty, "count").is_some());
    assert!(ctx.master.field(field_id).unwrap().is_static);
    ctx.close_scope().unwrap();

    // After the class-body scope closes, the field no longer resolves
    // from outside it (spec.md #8 testable property 3: scope purge
    // completeness).
    assert!(ctx.master.search_field(class_ty, "count").is_none());
}

/// (E) Nested function with a static variable: opening a nested local
/// scope inside an outer local scope must not reset the outer's stack
/// size, and closing the inner scope purges only the inner variable.
#[test]
fn scenario_e_nested_function_purges_only_its_own_locals() {
    let mut ctx = CompilationContext::new(CoreConfig::default());
    let m = open_module(&mut ctx, "main");
    let int_id = ctx.master.store_type(int_type()).unwrap();

    let outer = ctx
        .master
        .store_function(Function {
            kind: FuncKind::Function,
            name: "outer".into(),
            qualified_name: "outer".into(),
            mangled_id: "outer".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            sub_scope: None,
            code_addr: Some(0),
            return_type: None,
            is_void: true,
            nested: false,
            is_defined: true,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 0),
        })
        .unwrap();
    ctx.open_scope(ScopeTag::Local, m, Some(outer), SubScope::None);

    let inner = ctx
        .master
        .store_function(Function {
            kind: FuncKind::Function,
            name: "inner".into(),
            qualified_name: "outer::inner".into(),
            mangled_id: "outer$inner".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            sub_scope: None,
            code_addr: Some(ctx.buffers.code.len()),
            return_type: None,
            is_void: true,
            nested: true,
            is_defined: true,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 0),
        })
        .unwrap();
    ctx.open_scope(ScopeTag::Local, m, Some(inner), SubScope::None);
    ctx.master
        .store_variable(Variable {
            name: "counter".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            code_block_tag: None,
            flow_label_tag: None,
            ty: int_id,
            address: Address::Local(0),
            flags: VarFlags::STATIC,
            metadata_name_addr: None,
        })
        .unwrap();
    assert!(ctx.master.search_variable("counter").is_some());
    ctx.close_scope().unwrap();
    assert!(ctx.master.search_variable("counter").is_none(), "inner local must be purged when the nested scope closes");

    ctx.close_scope().unwrap();
    ctx.close_scope().unwrap();
}

/// (F) Circular forward call: two mutually recursive functions, `a`
/// calling `b` before `b` is declared and vice versa, resolve once both
/// are registered within the same scope depth.
#[test]
fn scenario_f_circular_forward_calls_resolve_at_scope_close() {
    let mut ctx = CompilationContext::new(CoreConfig::default());
    let m = open_module(&mut ctx, "main");

    let func_a = ctx
        .master
        .store_function(Function {
            kind: FuncKind::Function,
            name: "a".into(),
            qualified_name: "a".into(),
            mangled_id: "a".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            sub_scope: None,
            code_addr: None,
            return_type: None,
            is_void: true,
            nested: false,
            is_defined: false,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 0),
        })
        .unwrap();
    let func_b = ctx
        .master
        .store_function(Function {
            kind: FuncKind::Function,
            name: "b".into(),
            qualified_name: "b".into(),
            mangled_id: "b".into(),
            owner_scope_depth: ctx.master.scope_depth(),
            sub_scope: None,
            code_addr: None,
            return_type: None,
            is_void: true,
            nested: false,
            is_defined: false,
            is_initializer: false,
            is_meta_method: false,
            param_range: (0, 0),
        })
        .unwrap();

    // a's body calls b, still unresolved (addr 0)
    ctx.emit(Opcode::Call, vec![Arg::FuncRef(func_b, 0), Arg::Address { space: AddrSpace::Local, offset: 0 }]).unwrap();
    let a_addr = 0usize;
    ctx.master.function_mut(func_a).unwrap().code_addr = Some(a_addr);
    ctx.master.function_mut(func_a).unwrap().is_defined = true;
    ctx.calls.register_destination("a", ctx.master.scope_depth(), func_a, a_addr);

    let b_addr = ctx.buffers.code.len();
    ctx.emit(Opcode::Call, vec![Arg::FuncRef(func_a, 0), Arg::Address { space: AddrSpace::Local, offset: 0 }]).unwrap();
    ctx.master.function_mut(func_b).unwrap().code_addr = Some(b_addr);
    ctx.master.function_mut(func_b).unwrap().is_defined = true;
    ctx.calls.register_destination("b", ctx.master.scope_depth(), func_b, b_addr);

    ctx.close_scope().unwrap();
    let _ = Arch::Bits64;
    let _ = CpuValue::int(0);
}
