//! `CompilationContext`: the facade that owns every table and coordinates
//! them across the emitter's `emit`/`emit_init` writes and the scope
//! open/close sequence (SPEC_FULL.md #4.15).

use crate::asm_listing::{AsmListing, Section};
use crate::buffers::BufferStore;
use crate::config::CoreConfig;
use crate::diag::DiagnosticSink;
use crate::emitter::lit_promoter::{DesiredScope, PromotionGroup};
use crate::emitter::opcode::{AddrSpace, Arg, MetaOp, Opcode};
use crate::emitter::{CallResolver, EmitTarget, JumpResolver, LitPromoter};
use crate::error::{CoreError, CoreResult};
use crate::geometry::GeometryTable;
use crate::ids::{FuncId, TypeId};
use crate::master::records::{Address, ScopeTag, SubScope, VarFlags, Variable};
use crate::master::MasterTable;
use crate::reloc::{RelocItem, RelocKind, RelocTable};
use crate::superinit::SuperInitRegistry;
use crate::value::CpuValue;

/// Owns one instance each of the tables spec.md #4 describes, plus
/// configuration, and exposes the emitter's write/scope operations as
/// inherent methods so they can coordinate every table in lockstep
/// (SPEC_FULL.md #4.15).
pub struct CompilationContext {
    pub config: CoreConfig,
    pub buffers: BufferStore,
    pub geoms: GeometryTable,
    pub master: MasterTable,
    pub jumps: JumpResolver,
    pub calls: CallResolver,
    pub lits: LitPromoter,
    pub relocs: RelocTable,
    pub diagnostics: DiagnosticSink,
    pub listing: AsmListing,
    pub super_init: SuperInitRegistry,
}

impl CompilationContext {
    pub fn new(config: CoreConfig) -> Self {
        let diagnostics = DiagnosticSink::new(config.diagnostic_limits);
        CompilationContext {
            config,
            buffers: BufferStore::new(),
            geoms: GeometryTable::new(),
            master: MasterTable::new(),
            jumps: JumpResolver::new(),
            calls: CallResolver::new(),
            lits: LitPromoter::new(),
            relocs: RelocTable::new(),
            diagnostics,
            listing: AsmListing::new(),
            super_init: SuperInitRegistry::new(),
        }
    }

    // ---- scope open/close (spec.md #4.3) -------------------------------

    pub fn open_scope(&mut self, tag: ScopeTag, module: crate::ids::ModuleId, function: Option<FuncId>, sub_scope: SubScope) {
        self.master.scope_open(tag, module, function, sub_scope);
        self.listing.push_scope();
    }

    /// Runs the full scope-close sequence spec.md #4.3 describes: grant
    /// validation, jump resolution, (for the innermost local scope) init-
    /// merge fan-out and literal-variable resolution, call resolution,
    /// and finally purge.
    pub fn close_scope(&mut self) -> CoreResult<()> {
        let frame = self.master.pop_scope_validated()?;
        let depth = frame.depth;

        self.jumps.resolve_depth(depth, &mut self.buffers.code)?;

        let is_innermost_local = matches!(frame.tag, ScopeTag::Local) && !self.master_has_open_local();
        if is_innermost_local {
            // literals must resolve before the init-merge runs: resolving
            // emits a `load` initializer into InitBuffer, which has to
            // still be there for the splice below to carry it along.
            self.resolve_literals(depth)?;
            self.merge_init_fanout(frame.marks.functions)?;
        }

        let resolved_calls = self.calls.resolve_depth(depth, &mut self.buffers.code, self.config.arch)?;
        for rc in resolved_calls {
            self.listing.emit_line(Section::Foot, format!("call {} -> {{{:X}}}", rc.mangled_id, rc.addr));
        }

        self.master.close_frame(&frame);
        self.listing.pop_scope();
        Ok(())
    }

    fn master_has_open_local(&self) -> bool {
        self.master.current_scope().map(|f| matches!(f.tag, ScopeTag::Local)).unwrap_or(false)
    }

    /// spec.md #4.7: splices InitBuffer into CodeBuffer and shifts every
    /// code-address-bearing table at or beyond the merge point.
    fn merge_init_fanout(&mut self, function_start: usize) -> CoreResult<()> {
        if self.buffers.init.is_empty() {
            return Ok(());
        }
        let shift = self.buffers.merge_init_into_code(function_start);
        self.jumps.shift_from(function_start, shift);
        self.calls.shift_from(function_start, shift);
        self.lits.shift_from(function_start, shift);
        self.relocs.shift_from(function_start, shift);
        self.listing.shift_embedded_addresses(function_start, shift);
        Ok(())
    }

    /// spec.md #4.5: walks the literals recorded at `depth`, allocating one
    /// backing variable per fingerprint.
    fn resolve_literals(&mut self, depth: i32) -> CoreResult<()> {
        let groups = self.lits.drain_depth(depth);
        self.resolve_literal_groups(groups, depth)
    }

    /// Drains every literal still pending regardless of scope — the
    /// global-desired literals that outlive every local scope — and
    /// resolves them the same way, then merges whatever `load`
    /// initializers that produced into the tail of the code buffer. Must
    /// run once, after every scope has closed.
    pub fn finalize(&mut self) -> CoreResult<()> {
        let groups = self.lits.drain_all();
        let tail = self.buffers.code.len();
        self.resolve_literal_groups(groups, self.master.scope_depth())?;
        self.merge_init_fanout(tail)
    }

    /// Shared by [`Self::resolve_literals`] and [`Self::finalize`]:
    /// allocates one backing variable per promotion group, emits its
    /// `load` initializer into the init stream, and patches every
    /// recorded site in the code buffer with the variable's address
    /// (spec.md #4.5).
    fn resolve_literal_groups(&mut self, groups: Vec<PromotionGroup>, owner_scope_depth: i32) -> CoreResult<()> {
        for group in groups {
            let var_name = format!("__lit_{}", group.fingerprint.replace([':'], "_"));

            let address = match group.desired {
                DesiredScope::Global => Address::Global(self.buffers.glob.append_zeros(group.value.bytes.len())),
                DesiredScope::Local => Address::Local(self.master.allocate_local_slot(group.value.bytes.len())?),
            };

            self.master.store_system_variable(Variable {
                name: var_name.clone(),
                owner_scope_depth,
                code_block_tag: None,
                flow_label_tag: None,
                ty: TypeId::INVALID,
                address,
                flags: VarFlags::CONST | VarFlags::LITERAL_CONSTANT | VarFlags::SYSTEM_DEFINED | VarFlags::INITIALIZED,
                metadata_name_addr: None,
            });

            let space = if address.is_global() { AddrSpace::Global } else { AddrSpace::Local };
            self.emit_init(Opcode::LoadLiteral, vec![Arg::Address { space, offset: address.offset() as i64 }, Arg::Literal(group.value.clone())])?;

            let patch_bytes = Arg::Address { space, offset: address.offset() as i64 }.encode(self.config.arch);
            for (addr, tag) in &group.sites {
                self.buffers.code.patch(*addr, &patch_bytes);
                self.listing.substitute_tag(tag, &var_name);
            }
        }
        Ok(())
    }

    // ---- emitter entry points (spec.md #4.4) ---------------------------

    /// Writes `opcode` with `args` into the body code buffer.
    pub fn emit(&mut self, opcode: Opcode, args: Vec<Arg>) -> CoreResult<usize> {
        self.emit_into(EmitTarget::Body, opcode, args)
    }

    /// Writes into the per-function init scratch stream.
    pub fn emit_init(&mut self, opcode: Opcode, args: Vec<Arg>) -> CoreResult<usize> {
        self.emit_into(EmitTarget::Init, opcode, args)
    }

    /// Resolves a type-polymorphic meta-opcode using the master type of
    /// `args[driver_index]`, then emits the concrete opcode.
    pub fn emit_meta(&mut self, meta: MetaOp, driver_index: usize, args: Vec<Arg>) -> CoreResult<usize> {
        let driver_ty = args
            .get(driver_index)
            .and_then(|a| a.master_type_tag(self.config.arch))
            .ok_or_else(|| CoreError::Internal("emit_meta driver argument is not a literal/typed operand".into()))?;
        let opcode = Opcode::resolve_meta(meta, driver_ty);
        self.emit(opcode, args)
    }

    fn emit_into(&mut self, target: EmitTarget, opcode: Opcode, mut args: Vec<Arg>) -> CoreResult<usize> {
        if args.len() != opcode.arity() {
            return Err(CoreError::Internal(format!("{opcode:?} expects {} args, got {}", opcode.arity(), args.len())));
        }

        // step 1: opcode rewriting (move w/ literal source -> load).
        let opcode = if matches!(opcode, Opcode::Move) && args.get(1).map(Arg::is_literal).unwrap_or(false) {
            opcode.move_to_load()
        } else {
            opcode
        };

        // step 4 (validation, run early so a rejected instruction never
        // leaves a partial write behind): a literal the opcode doesn't
        // accept directly must be promotable. Only the body stream
        // promotes (step 2, below) — the init stream is the emitter's own
        // bookkeeping and only ever uses literal-accepting slots.
        for (i, arg) in args.iter().enumerate() {
            if arg.is_literal() && !opcode.accepts_literal(i) && !matches!(target, EmitTarget::Body) {
                return Err(CoreError::Internal(format!("{opcode:?} argument {i} does not accept a literal operand directly")));
            }
        }

        let scope_depth = self.master.scope_depth();
        let desired = if scope_depth <= 0 { DesiredScope::Global } else { DesiredScope::Local };

        let buf = match target {
            EmitTarget::Body => &mut self.buffers.code,
            EmitTarget::Init => &mut self.buffers.init,
        };
        let instr_addr = buf.len();

        let labels = self.jumps.labels_at(instr_addr);
        let labels: Vec<String> = labels.into_iter().map(String::from).collect();

        let buf = match target {
            EmitTarget::Body => &mut self.buffers.code,
            EmitTarget::Init => &mut self.buffers.init,
        };
        buf.append(&(opcode as u16).to_le_bytes());
        let len_slot = buf.append_zeros(2);

        let module_name = self
            .master
            .current_scope()
            .map(|f| f.module)
            .and_then(|m| self.master.module(m).ok())
            .map(|m| m.name.clone())
            .unwrap_or_default();

        for (i, arg) in args.drain(..).enumerate() {
            match arg {
                // step 2: literal promotion — hoist into a backing variable
                // and leave this operand slot reserved for its address.
                Arg::Literal(value) if !opcode.accepts_literal(i) => {
                    self.promote_literal(scope_depth, desired, value);
                }
                Arg::JumpLabel(label) => {
                    let patch_addr = match target {
                        EmitTarget::Body => self.buffers.code.append_zeros(2),
                        EmitTarget::Init => self.buffers.init.append_zeros(2),
                    };
                    self.jumps.register_origin(label, self.master.scope_depth(), patch_addr, instr_addr);
                }
                Arg::FuncRef(func, 0) => {
                    let patch_addr = match target {
                        EmitTarget::Body => self.buffers.code.len(),
                        EmitTarget::Init => self.buffers.init.len(),
                    };
                    let width = self.config.arch.word_bytes();
                    match target {
                        EmitTarget::Body => {
                            self.buffers.code.append_zeros(width);
                        }
                        EmitTarget::Init => {
                            self.buffers.init.append_zeros(width);
                        }
                    }
                    if let Ok(f) = self.master.function(func) {
                        let mangled = f.mangled_id.clone();
                        let nested = f.nested;
                        self.calls.register_origin(mangled.clone(), self.master.scope_depth(), patch_addr, nested);
                        self.relocs.push(RelocItem {
                            kind: RelocKind::FunctionAddress,
                            location_addr: patch_addr,
                            location_block: None,
                            module_name: module_name.clone(),
                            object_name: mangled,
                            copy_count: 0,
                        });
                    }
                }
                other => {
                    let bytes = other.encode(self.config.arch);
                    let patch_addr = match target {
                        EmitTarget::Body => self.buffers.code.len(),
                        EmitTarget::Init => self.buffers.init.len(),
                    };
                    match &other {
                        Arg::Address { space: AddrSpace::Global, offset } | Arg::Indirect { space: AddrSpace::Global, offset } => {
                            self.relocs.push(RelocItem {
                                kind: RelocKind::GlobalAddress,
                                location_addr: patch_addr,
                                location_block: None,
                                module_name: module_name.clone(),
                                object_name: format!("glob{offset}"),
                                copy_count: 0,
                            });
                        }
                        Arg::Geometry(id) => {
                            self.relocs.push(RelocItem {
                                kind: RelocKind::FixArrayGeometry,
                                location_addr: patch_addr,
                                location_block: None,
                                module_name: module_name.clone(),
                                object_name: format!("geom{}", id.0),
                                copy_count: 0,
                            });
                        }
                        _ => {}
                    }
                    match target {
                        EmitTarget::Body => {
                            self.buffers.code.append(&bytes);
                        }
                        EmitTarget::Init => {
                            self.buffers.init.append(&bytes);
                        }
                    }
                }
            }
        }

        let instr_len = match target {
            EmitTarget::Body => self.buffers.code.len() - len_slot - 2,
            EmitTarget::Init => self.buffers.init.len() - len_slot - 2,
        };
        match target {
            EmitTarget::Body => self.buffers.code.patch_i16(len_slot, instr_len as i16),
            EmitTarget::Init => self.buffers.init.patch_i16(len_slot, instr_len as i16),
        }

        let section = match target {
            EmitTarget::Body => Section::Body,
            EmitTarget::Init => Section::Init,
        };
        let mut text = format!("{opcode:?}");
        if !labels.is_empty() {
            text = format!("{}: {text}", labels.join(", "));
        }
        self.listing.emit_line(section, text);

        Ok(instr_addr)
    }

    /// Promotes a literal argument into a pending backing variable
    /// (spec.md #4.4 step 2 / #4.5): the argument slot it occupies is
    /// reserved address-width right where it stands in the instruction
    /// (not a separately allocated slot), to be patched in place once
    /// `resolve_literal_groups` allocates the backing variable.
    fn promote_literal(&mut self, scope_depth: i32, desired: DesiredScope, value: CpuValue) {
        let width = self.config.arch.word_bytes();
        let patch_addr = self.buffers.code.len();
        self.buffers.code.append_zeros(width);
        let tag = self.lits.register(scope_depth, desired, value, patch_addr);
        self.listing.emit_line(Section::DLit, format!("load {tag}"));
    }
}
