use fdinstr::builder::FunctionBuilder;
use fdinstr::modules::instructions::{FdInstr, IAdd, ICmpOp};
use fdinstr::modules::control_flow::Terminator;
use fdinstr::modules::global::{Const, CtorEntry, GlobalVariable, ThreadLocalMode};
use fdinstr::modules::operand::{ConstFieldAddr, Label, Name, Operand};
use fdinstr::modules::{Function, Linkage, Module};
use fdinstr::types::TypeRegistry;
use fdharden::{ArgOrder, Error, HardenConfig, PolicyMap, PolicyTag, harden_module};
use smallvec::smallvec;
use uuid::Uuid;

// Helpers

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn declare_handler(module: &mut Module) -> Uuid {
    module.declare_external("data_corruption_handler", vec![], None)
}

fn find_fn<'a>(module: &'a Module, name: &str) -> &'a Function {
    module
        .function_by_name(name)
        .unwrap_or_else(|| panic!("function {name} not found"))
}

fn count_instrs(function: &Function, pred: impl Fn(&FdInstr) -> bool) -> usize {
    function
        .body
        .values()
        .flat_map(|bb| bb.instructions.iter())
        .filter(|node| pred(&node.instr))
        .count()
}

fn simple_global(registry: &TypeRegistry, name: &str, initializer: Option<Const>) -> GlobalVariable {
    GlobalVariable {
        uuid: Uuid::new_v4(),
        name: name.to_owned(),
        demangled_name: None,
        ty: registry.int(32),
        linkage: Linkage::Internal,
        constant: false,
        initializer,
        section: None,
        alignment: None,
        thread_local: ThreadLocalMode::NotThreadLocal,
        externally_initialized: false,
    }
}

/// `compute(a) { slot = alloca; v = a + 1; *slot = v; return *slot }`
fn compute_module(registry: &TypeRegistry) -> (Module, Uuid) {
    let i32_ty = registry.int(32);
    let mut b = FunctionBuilder::new(registry, "compute")
        .linkage(Linkage::Internal)
        .returns(i32_ty);
    let a = b.param(i32_ty);
    let slot = b.alloca(i32_ty);
    let one = b.const_int(1, 32);
    let v = b
        .push(IAdd {
            dest: Name(0),
            ty: i32_ty,
            lhs: Operand::Reg(a),
            rhs: one,
        })
        .unwrap();
    b.store(Operand::Reg(slot), Operand::Reg(v));
    let out = b.load(i32_ty, Operand::Reg(slot));
    b.ret(Some(Operand::Reg(out)));
    let function = b.finish();
    let uuid = function.uuid;

    let mut module = Module::default();
    module.functions.insert(uuid, function);
    (module, uuid)
}

#[test]
fn computation_is_duplicated_with_a_check_and_fault_block() {
    init_logs();
    let registry = TypeRegistry::new();
    let (mut module, compute) = compute_module(&registry);
    let handler = declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(compute, PolicyTag::ToHarden);
    let config = HardenConfig::default();
    let report = harden_module(&mut module, &registry, &mut policy, &config).unwrap();

    assert_eq!(report.compiled(), ["compute"]);
    assert!(module.check_ssa().is_ok());

    // The original function is untouched.
    let original = find_fn(&module, "compute");
    assert_eq!(count_instrs(original, |i| matches!(i, FdInstr::IAdd(_))), 1);

    let shadow = find_fn(&module, "compute_dup");
    assert_eq!(shadow.params.len(), 2);
    assert_eq!(count_instrs(shadow, |i| matches!(i, FdInstr::MAlloca(_))), 2);
    assert_eq!(count_instrs(shadow, |i| matches!(i, FdInstr::IAdd(_))), 2);
    assert_eq!(count_instrs(shadow, |i| matches!(i, FdInstr::MStore(_))), 2);
    assert_eq!(count_instrs(shadow, |i| matches!(i, FdInstr::MLoad(_))), 2);

    // One check compares the stored value pair and branches to a fault
    // block that calls the handler and traps.
    let mut fault_targets = Vec::new();
    for bb in shadow.body.values() {
        if let Terminator::CBranch { else_target, .. } = &bb.terminator {
            fault_targets.push(*else_target);
        }
    }
    assert_eq!(fault_targets.len(), 1);
    let fault = &shadow.body[&fault_targets[0]];
    assert!(matches!(fault.terminator, Terminator::Trap));
    assert!(fault.instructions.iter().any(|n| {
        matches!(&n.instr, FdInstr::Call(c) if c.static_callee() == Some(handler))
    }));
}

#[test]
fn missing_handler_aborts_the_run() {
    init_logs();
    let registry = TypeRegistry::new();
    let (mut module, compute) = compute_module(&registry);

    let mut policy = PolicyMap::new();
    policy.set(compute, PolicyTag::ToHarden);
    let result = harden_module(&mut module, &registry, &mut policy, &HardenConfig::default());
    assert!(matches!(result, Err(Error::MissingFaultHandler { .. })));
}

#[test]
fn callees_join_the_closure_and_calls_are_redirected() {
    init_logs();
    let registry = TypeRegistry::new();
    let i32_ty = registry.int(32);

    let mut b = FunctionBuilder::new(&registry, "helper")
        .linkage(Linkage::Internal)
        .returns(i32_ty);
    let x = b.param(i32_ty);
    b.ret(Some(Operand::Reg(x)));
    let helper = b.finish();
    let helper_uuid = helper.uuid;

    let mut b = FunctionBuilder::new(&registry, "main")
        .linkage(Linkage::Internal)
        .returns(i32_ty);
    let a = b.param(i32_ty);
    let r = b
        .call(Some(i32_ty), Operand::Func(helper_uuid), vec![Operand::Reg(a)])
        .unwrap();
    b.ret(Some(Operand::Reg(r)));
    let main = b.finish();
    let main_uuid = main.uuid;

    let mut module = Module::default();
    module.functions.insert(helper_uuid, helper);
    module.functions.insert(main_uuid, main);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(main_uuid, PolicyTag::ToHarden);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    assert!(module.check_ssa().is_ok());
    let helper_dup = find_fn(&module, "helper_dup");
    let main_dup = find_fn(&module, "main_dup");

    // The original single-argument call is superseded by a doubled call to
    // the shadow callee.
    let calls: Vec<_> = main_dup
        .body
        .values()
        .flat_map(|bb| bb.instructions.iter())
        .filter_map(|n| match &n.instr {
            FdInstr::Call(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].static_callee(), Some(helper_dup.uuid));
    assert_eq!(calls[0].args.len(), 2);
}

#[test]
fn calls_reached_through_operand_chains_are_redirected_once() {
    init_logs();
    let registry = TypeRegistry::new();
    let i32_ty = registry.int(32);

    let mut b = FunctionBuilder::new(&registry, "helper")
        .linkage(Linkage::Internal)
        .returns(i32_ty);
    let x = b.param(i32_ty);
    b.ret(Some(Operand::Reg(x)));
    let helper = b.finish();
    let helper_uuid = helper.uuid;

    // The block holding the call carries a later label than the block
    // using its result, so the sweep reaches the call through operand
    // recursion before reaching it by identity.
    let mut b = FunctionBuilder::new(&registry, "main")
        .linkage(Linkage::Internal)
        .returns(i32_ty);
    let a = b.param(i32_ty);
    let use_block = b.reserve_label();
    let call_block = b.reserve_label();
    b.jump(call_block);

    b.switch_to(call_block);
    let r = b
        .call(Some(i32_ty), Operand::Func(helper_uuid), vec![Operand::Reg(a)])
        .unwrap();
    b.jump(use_block);

    b.switch_to(use_block);
    let one = b.const_int(1, 32);
    let s = b
        .push(IAdd {
            dest: Name(0),
            ty: i32_ty,
            lhs: Operand::Reg(r),
            rhs: one,
        })
        .unwrap();
    b.ret(Some(Operand::Reg(s)));
    let main = b.finish();
    let main_uuid = main.uuid;

    let mut module = Module::default();
    module.functions.insert(helper_uuid, helper);
    module.functions.insert(main_uuid, main);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(main_uuid, PolicyTag::ToHarden);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    assert!(module.check_ssa().is_ok());
    let helper_dup = find_fn(&module, "helper_dup");
    let main_dup = find_fn(&module, "main_dup");
    assert_eq!(
        count_instrs(main_dup, |i| {
            matches!(i, FdInstr::Call(c) if c.static_callee() == Some(helper_dup.uuid))
        }),
        1
    );
    assert_eq!(count_instrs(main_dup, |i| matches!(i, FdInstr::Call(_))), 1);
}

#[test]
fn mutual_recursion_redirects_both_directions() {
    init_logs();
    let registry = TypeRegistry::new();
    let i32_ty = registry.int(32);

    let mut b = FunctionBuilder::new(&registry, "ping")
        .linkage(Linkage::Internal)
        .returns(i32_ty);
    let x = b.param(i32_ty);
    let r = b
        .call(Some(i32_ty), Operand::Func(Uuid::nil()), vec![Operand::Reg(x)])
        .unwrap();
    b.ret(Some(Operand::Reg(r)));
    let mut ping = b.finish();
    let ping_uuid = ping.uuid;

    let mut b = FunctionBuilder::new(&registry, "pong")
        .linkage(Linkage::Internal)
        .returns(i32_ty);
    let y = b.param(i32_ty);
    let s = b
        .call(Some(i32_ty), Operand::Func(ping_uuid), vec![Operand::Reg(y)])
        .unwrap();
    b.ret(Some(Operand::Reg(s)));
    let pong = b.finish();
    let pong_uuid = pong.uuid;

    // Close the cycle.
    for bb in ping.body.values_mut() {
        for node in bb.instructions.iter_mut() {
            if let FdInstr::Call(call) = &mut node.instr {
                call.callee = Operand::Func(pong_uuid);
            }
        }
    }

    let mut module = Module::default();
    module.functions.insert(ping_uuid, ping);
    module.functions.insert(pong_uuid, pong);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(ping_uuid, PolicyTag::ToHarden);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    assert!(module.check_ssa().is_ok());
    let ping_dup = find_fn(&module, "ping_dup");
    let pong_dup = find_fn(&module, "pong_dup");

    let redirected = |f: &Function, target: Uuid| {
        f.body
            .values()
            .flat_map(|bb| bb.instructions.iter())
            .filter_map(|n| match &n.instr {
                FdInstr::Call(c) => Some(c),
                _ => None,
            })
            .filter(|c| {
                assert_eq!(c.args.len(), 2);
                c.static_callee() == Some(target)
            })
            .count()
    };
    assert_eq!(redirected(ping_dup, pong_dup.uuid), 1);
    assert_eq!(redirected(pong_dup, ping_dup.uuid), 1);
    assert_eq!(count_instrs(ping_dup, |i| matches!(i, FdInstr::Call(_))), 1);
    assert_eq!(count_instrs(pong_dup, |i| matches!(i, FdInstr::Call(_))), 1);
}

#[test]
fn shadow_instructions_keep_their_original_types() {
    init_logs();
    let registry = TypeRegistry::new();
    let i32_ty = registry.int(32);
    let (mut module, compute) = compute_module(&registry);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(compute, PolicyTag::ToHarden);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    let original = find_fn(&module, "compute");
    let shadow = find_fn(&module, "compute_dup");
    assert_eq!(shadow.return_type, original.return_type);
    for param in &shadow.params {
        assert_eq!(param.ty, i32_ty);
    }
    for bb in shadow.body.values() {
        for node in &bb.instructions {
            match &node.instr {
                FdInstr::MAlloca(a) => assert_eq!(a.ty, i32_ty),
                FdInstr::IAdd(add) => assert_eq!(add.ty, i32_ty),
                FdInstr::MLoad(load) => assert_eq!(load.ty, i32_ty),
                _ => {}
            }
        }
    }
}

#[test]
fn interleaved_ordering_alternates_parameter_halves() {
    init_logs();
    let registry = TypeRegistry::new();
    let i32_ty = registry.int(32);
    let mut b = FunctionBuilder::new(&registry, "f").returns(i32_ty);
    let a = b.param(i32_ty);
    let c = b.param(i32_ty);
    b.ret(Some(Operand::Reg(a)));
    let function = b.finish();

    let config = HardenConfig {
        arg_order: ArgOrder::Interleaved,
        ..HardenConfig::default()
    };
    let (shadow, pairs) = fdharden::globals::duplicate_fn_args(&function, &config);
    assert_eq!(shadow.params.len(), 4);
    assert_eq!(shadow.params[0].name, a);
    assert_eq!(shadow.params[1].name, pairs[0].1);
    assert_eq!(shadow.params[2].name, c);
    assert_eq!(shadow.params[3].name, pairs[1].1);
}

#[test]
fn globals_are_shadowed_into_the_duplicate_section() {
    init_logs();
    let registry = TypeRegistry::new();
    let mut module = Module::default();

    let bss = simple_global(&registry, "counter", None);
    let bss_uuid = bss.uuid;
    let mut constant = simple_global(&registry, "table", Some(Const::Int {
        value: 7,
        ty: registry.int(32),
    }));
    constant.constant = true;
    let constant_uuid = constant.uuid;
    let excluded = simple_global(&registry, "mmio", None);
    let excluded_uuid = excluded.uuid;
    module.globals.insert(bss_uuid, bss);
    module.globals.insert(constant_uuid, constant);
    module.globals.insert(excluded_uuid, excluded);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(excluded_uuid, PolicyTag::Exclude);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    let shadow = module
        .globals
        .values()
        .find(|g| g.name == "counter_dup")
        .expect("counter shadow");
    assert_eq!(shadow.section.as_deref(), Some(".duplicated_data"));
    assert!(!shadow.constant);
    assert!(!module.globals.values().any(|g| g.name == "table_dup"));
    assert!(!module.globals.values().any(|g| g.name == "mmio_dup"));
}

#[test]
fn identical_store_duplicates_are_pruned() {
    init_logs();
    let registry = TypeRegistry::new();
    let mut module = Module::default();

    // Excluded global: never duplicated, so the shadow store into it comes
    // out operand-identical and must be dropped.
    let mmio = simple_global(&registry, "mmio", None);
    let mmio_uuid = mmio.uuid;
    module.globals.insert(mmio_uuid, mmio);

    let mut b = FunctionBuilder::new(&registry, "poke").linkage(Linkage::Internal);
    let flag = b.const_int(1, 32);
    b.store(Operand::Global(mmio_uuid), flag);
    b.ret(None);
    let poke = b.finish();
    let poke_uuid = poke.uuid;
    module.functions.insert(poke_uuid, poke);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(poke_uuid, PolicyTag::ToHarden);
    policy.set(mmio_uuid, PolicyTag::Exclude);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    let shadow = find_fn(&module, "poke_dup");
    assert_eq!(count_instrs(shadow, |i| matches!(i, FdInstr::MStore(_))), 1);
}

#[test]
fn opaque_calls_resynchronize_pointer_arguments() {
    init_logs();
    let registry = TypeRegistry::new();
    let i32_ty = registry.int(32);
    let mut module = Module::default();
    let fill = module.declare_external("fill", vec![registry.ptr()], None);

    let mut b = FunctionBuilder::new(&registry, "consume").linkage(Linkage::Internal);
    let slot = b.alloca(i32_ty);
    b.call(None, Operand::Func(fill), vec![Operand::Reg(slot)]);
    let out = b.load(i32_ty, Operand::Reg(slot));
    b.store(Operand::Reg(slot), Operand::Reg(out));
    b.ret(None);
    let consume = b.finish();
    let consume_uuid = consume.uuid;
    module.functions.insert(consume_uuid, consume);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(consume_uuid, PolicyTag::ToHarden);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    assert!(module.check_ssa().is_ok());
    let shadow = find_fn(&module, "consume_dup");

    // The external call stays single, and right after it the original slot
    // is reloaded and copied into the shadow slot.
    let entry = shadow.entry().expect("entry block");
    let call_at = entry
        .instructions
        .iter()
        .position(|n| matches!(&n.instr, FdInstr::Call(c) if c.static_callee() == Some(fill)))
        .expect("external call");
    assert!(matches!(
        entry.instructions[call_at + 1].instr,
        FdInstr::MLoad(_)
    ));
    assert!(matches!(
        entry.instructions[call_at + 2].instr,
        FdInstr::MStore(_)
    ));
    assert_eq!(
        count_instrs(shadow, |i| {
            matches!(i, FdInstr::Call(c) if c.static_callee() == Some(fill))
        }),
        1
    );
}

#[test]
fn indirect_calls_are_doubled_through_a_cast() {
    init_logs();
    let registry = TypeRegistry::new();
    let i32_ty = registry.int(32);
    let mut module = Module::default();

    let mut b = FunctionBuilder::new(&registry, "dispatch").linkage(Linkage::Internal);
    let table = b.param(registry.ptr());
    let arg = b.param(i32_ty);
    let target = b.load(registry.ptr(), Operand::Reg(table));
    b.call(Some(i32_ty), Operand::Reg(target), vec![Operand::Reg(arg)]);
    b.ret(None);
    let dispatch = b.finish();
    let dispatch_uuid = dispatch.uuid;
    module.functions.insert(dispatch_uuid, dispatch);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(dispatch_uuid, PolicyTag::ToHarden);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    assert!(module.check_ssa().is_ok());
    let shadow = find_fn(&module, "dispatch_dup");
    let calls: Vec<_> = shadow
        .body
        .values()
        .flat_map(|bb| bb.instructions.iter())
        .filter_map(|n| match &n.instr {
            FdInstr::Call(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args.len(), 2);
    assert!(matches!(calls[0].callee, Operand::Reg(_)));
    assert_eq!(count_instrs(shadow, |i| matches!(i, FdInstr::Cast(_))), 1);
}

#[test]
fn looping_dataflow_terminates_and_stays_well_formed() {
    init_logs();
    let registry = TypeRegistry::new();
    let i32_ty = registry.int(32);

    let mut b = FunctionBuilder::new(&registry, "count_up")
        .linkage(Linkage::Internal)
        .returns(i32_ty);
    let header = b.reserve_label();
    let exit = b.reserve_label();
    b.jump(header);

    b.switch_to(header);
    // Phi over its own block's increment: a genuine operand cycle.
    let zero = b.const_int(0, 32);
    let one = b.const_int(1, 32);
    let ten = b.const_int(10, 32);
    let i = b.phi(i32_ty, vec![(Label::NIL, zero)]);
    let next = b
        .push(IAdd {
            dest: Name(0),
            ty: i32_ty,
            lhs: Operand::Reg(i),
            rhs: one,
        })
        .unwrap();
    let done = b.icmp(ICmpOp::Sge, i32_ty, Operand::Reg(next), ten);
    b.cbranch(Operand::Reg(done), exit, header);

    b.switch_to(exit);
    b.ret(Some(Operand::Reg(next)));
    let mut count_up = b.finish();
    // Close the cycle: the back edge feeds the phi.
    if let Some(bb) = count_up.body.get_mut(&header) {
        if let FdInstr::Phi(phi) = &mut bb.instructions[0].instr {
            phi.values.push((header, Operand::Reg(next)));
        }
    }
    let count_up_uuid = count_up.uuid;

    let mut module = Module::default();
    module.functions.insert(count_up_uuid, count_up);
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(count_up_uuid, PolicyTag::ToHarden);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    assert!(module.check_ssa().is_ok());
    let shadow = find_fn(&module, "count_up_dup");
    assert_eq!(count_instrs(shadow, |i| matches!(i, FdInstr::Phi(_))), 2);
    assert_eq!(count_instrs(shadow, |i| matches!(i, FdInstr::IAdd(_))), 2);
}

#[test]
fn constructors_install_the_shadow_dispatch_table() {
    init_logs();
    let registry = TypeRegistry::new();
    let mut module = Module::default();

    // The virtual method the table points at.
    let mut b = FunctionBuilder::new(&registry, "_ZN6Widget4drawEv")
        .linkage(Linkage::Internal)
        .demangled("Widget::draw()");
    b.ret(None);
    let draw = b.finish();
    let draw_uuid = draw.uuid;
    module.functions.insert(draw_uuid, draw);

    let vtable = GlobalVariable {
        uuid: Uuid::new_v4(),
        name: "_ZTV6Widget".to_owned(),
        demangled_name: Some("vtable for Widget".to_owned()),
        ty: registry.ptr(),
        linkage: Linkage::Internal,
        constant: true,
        initializer: Some(Const::Struct {
            elems: vec![Const::Array {
                elem_ty: registry.ptr(),
                elems: vec![Const::Func(draw_uuid)],
            }],
        }),
        section: None,
        alignment: None,
        thread_local: ThreadLocalMode::NotThreadLocal,
        externally_initialized: false,
    };
    let vtable_uuid = vtable.uuid;
    module.globals.insert(vtable_uuid, vtable);

    // Constructor stores the table address into the object under
    // construction.
    let mut b = FunctionBuilder::new(&registry, "_ZN6WidgetC2Ev")
        .linkage(Linkage::Internal)
        .demangled("Widget::Widget()");
    let this = b.param(registry.ptr());
    b.store(
        Operand::Reg(this),
        Operand::FieldAddr(ConstFieldAddr {
            base: Box::new(Operand::Global(vtable_uuid)),
            indices: smallvec![0, 2],
        }),
    );
    b.ret(None);
    let ctor = b.finish();
    let ctor_uuid = ctor.uuid;
    module.functions.insert(ctor_uuid, ctor);
    module.static_ctors.push(CtorEntry {
        priority: 65535,
        func: ctor_uuid,
        data: None,
    });
    declare_handler(&mut module);

    let mut policy = PolicyMap::new();
    policy.set(ctor_uuid, PolicyTag::ToHarden);
    harden_module(&mut module, &registry, &mut policy, &HardenConfig::default()).unwrap();

    // The virtual method joined the closure and got a shadow.
    let draw_dup = find_fn(&module, "_ZN6Widget4drawEv_dup");

    // The shadow table exists and points at the shadow method.
    let shadow_table = module
        .globals
        .values()
        .find(|g| g.name == "_ZTV6Widget_dup")
        .expect("shadow dispatch table");
    match &shadow_table.initializer {
        Some(Const::Struct { elems }) => match &elems[0] {
            Const::Array { elems, .. } => {
                assert_eq!(elems[0], Const::Func(draw_dup.uuid));
            }
            other => panic!("unexpected table field {other:?}"),
        },
        other => panic!("unexpected initializer {other:?}"),
    }

    // The shadow constructor installs the shadow table; the original keeps
    // the original one.
    let ctor_dup = find_fn(&module, "_ZN6WidgetC2Ev_dup");
    let installs_shadow = ctor_dup.body.values().flat_map(|bb| &bb.instructions).any(|n| {
        matches!(
            &n.instr,
            FdInstr::MStore(s)
                if matches!(&s.value, Operand::FieldAddr(fa)
                    if *fa.base == Operand::Global(shadow_table.uuid))
        )
    });
    assert!(installs_shadow);

    // The static-initializer entry now runs the shadow constructor.
    assert_eq!(module.static_ctors[0].func, ctor_dup.uuid);
}

#[test]
fn hardening_report_is_persisted() {
    init_logs();
    let registry = TypeRegistry::new();
    let (mut module, compute) = compute_module(&registry);
    declare_handler(&mut module);

    let dir = std::env::temp_dir().join("fdharden-integration");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("compiled-{}.txt", Uuid::new_v4()));

    let mut policy = PolicyMap::new();
    policy.set(compute, PolicyTag::ToHarden);
    let config = HardenConfig {
        export_path: Some(path.clone()),
        ..HardenConfig::default()
    };
    harden_module(&mut module, &registry, &mut policy, &config).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.trim(), "compute");
    std::fs::remove_file(&path).unwrap();
}
