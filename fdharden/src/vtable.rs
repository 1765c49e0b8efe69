//! Virtual-dispatch and constructor fixup.
//!
//! A hardened constructor installs a pointer into its class's dispatch
//! table; the shadow constructor must install a shadow table instead, so
//! that shadow objects invoke shadow virtual methods.
use std::collections::BTreeSet;

use fdinstr::modules::{
    Function, Module,
    global::{Const, GlobalVariable},
    instructions::{FdInstr, MStore},
    operand::Operand,
};
use log::{debug, warn};
use uuid::Uuid;

use crate::{globals, resolver::Resolution};

/// Marker substring identifying a dispatch-table symbol in its demangled
/// name. A narrow heuristic; replaceable by a structural marker should the
/// front end ever provide one.
const DISPATCH_TABLE_MARKER: &str = "vtable";

/// If `store` installs a dispatch-table pointer, the table's global.
///
/// The installed value is a field address into the table, either inline as
/// a constant expression or produced by a standalone address computation.
pub(crate) fn dispatch_table_target(
    module: &Module,
    function: &Function,
    store: &MStore,
) -> Option<Uuid> {
    let base_global = match &store.value {
        Operand::FieldAddr(fa) => match fa.base.as_ref() {
            Operand::Global(uuid) => Some(*uuid),
            _ => None,
        },
        Operand::Reg(name) => function.body.values().find_map(|bb| {
            bb.instructions.iter().find_map(|node| match &node.instr {
                FdInstr::MFieldAddr(addr) if addr.dest == *name => match &addr.base {
                    Operand::Global(uuid) => Some(*uuid),
                    _ => None,
                },
                _ => None,
            })
        }),
        _ => None,
    }?;

    let global = module.globals.get(&base_global)?;
    global
        .display_name()
        .contains(DISPATCH_TABLE_MARKER)
        .then_some(base_global)
}

/// First dispatch-table store in `function`, with the table it references.
fn find_dispatch_store(module: &Module, function: &Function) -> Option<Uuid> {
    for bb in function.body.values() {
        for node in &bb.instructions {
            if let FdInstr::MStore(store) = &node.instr {
                if let Some(table) = dispatch_table_target(module, function, store) {
                    return Some(table);
                }
            }
        }
    }
    None
}

/// Function entries of the table's initializer. Expected shape: a struct
/// with a single array field holding function pointers.
fn table_entries(table: &GlobalVariable) -> Option<Vec<Const>> {
    let Some(Const::Struct { elems }) = &table.initializer else {
        warn!(
            "dispatch table {} initializer is not a struct",
            table.name
        );
        return None;
    };
    if elems.len() != 1 {
        warn!(
            "dispatch table {} has {} fields, expected one",
            table.name,
            elems.len()
        );
        return None;
    }
    let Const::Array { elems: entries, .. } = &elems[0] else {
        warn!("dispatch table {} field is not an array", table.name);
        return None;
    };
    Some(entries.clone())
}

/// Virtual methods reachable from the dispatch-table store inside a
/// constructor. Used by the resolver to union them into the hardening set.
pub(crate) fn virtual_methods_from_constructor(
    module: &Module,
    function: &Function,
) -> BTreeSet<Uuid> {
    let mut methods = BTreeSet::new();
    let Some(table_uuid) = find_dispatch_store(module, function) else {
        return methods;
    };
    let Some(table) = module.globals.get(&table_uuid) else {
        return methods;
    };
    let Some(entries) = table_entries(table) else {
        return methods;
    };
    for entry in entries {
        if let Const::Func(method) = entry {
            debug!(
                "virtual method {} found in {}",
                module.symbol_name(method).unwrap_or("<unknown>"),
                function.name
            );
            methods.insert(method);
        }
    }
    methods
}

/// For every hardened constructor with a shadow, build the shadow dispatch
/// table and rewrite the shadow constructor's install store to reference
/// it. Anomalies degrade to a diagnostic plus skip.
pub fn fix_constructors(module: &mut Module, resolution: &Resolution) {
    for ctor in resolution.constructors() {
        let Some(function) = module.functions.get(&ctor) else {
            continue;
        };
        let Some(shadow_ctor) = globals::function_duplicate(module, ctor) else {
            warn!(
                "no shadow version of constructor {}",
                function.name
            );
            continue;
        };
        let Some(table_uuid) = find_dispatch_store(module, function) else {
            warn!("no dispatch-table store in constructor {}", function.name);
            continue;
        };
        let table = &module.globals[&table_uuid];
        let Some(entries) = table_entries(table) else {
            continue;
        };

        // Shadow entries where a shadow method exists, originals otherwise.
        let shadow_entries: Vec<Const> = entries
            .iter()
            .map(|entry| match entry {
                Const::Func(method) => {
                    let name = module.symbol_name(*method).unwrap_or_default();
                    match module.function_by_name(&globals::shadow_name(name)) {
                        Some(dup) => Const::Func(dup.uuid),
                        None => {
                            warn!("missing shadow function for {name}");
                            entry.clone()
                        }
                    }
                }
                other => other.clone(),
            })
            .collect();

        let mut initializer = table.initializer.clone();
        if let Some(Const::Struct { elems }) = &mut initializer {
            if let Some(Const::Array { elems: slot, .. }) = elems.first_mut() {
                *slot = shadow_entries;
            }
        }

        let new_table = GlobalVariable {
            uuid: Uuid::new_v4(),
            name: globals::shadow_name(&table.name),
            demangled_name: table.demangled_name.as_deref().map(globals::shadow_name),
            ty: table.ty,
            linkage: fdinstr::modules::Linkage::External,
            constant: table.constant,
            initializer,
            section: table.section.clone(),
            alignment: table.alignment,
            thread_local: table.thread_local,
            externally_initialized: false,
        };
        let new_table_uuid = new_table.uuid;
        debug!("created shadow dispatch table {}", new_table.name);
        module.globals.insert(new_table_uuid, new_table);

        // Rewrite the install store inside the shadow constructor. Only the
        // inline constant form is rewritten; the standalone-instruction
        // form is reported and left alone.
        let Some(shadow_fn) = module.functions.get_mut(&shadow_ctor) else {
            warn!("shadow constructor is not defined in this module");
            continue;
        };
        for bb in shadow_fn.body.values_mut() {
            for node in bb.instructions.iter_mut() {
                let FdInstr::MStore(store) = &mut node.instr else {
                    continue;
                };
                match &mut store.value {
                    Operand::FieldAddr(fa) => {
                        if fa.base.as_ref() == &Operand::Global(table_uuid) {
                            fa.base = Box::new(Operand::Global(new_table_uuid));
                            debug!("redirected dispatch-table store to shadow table");
                        }
                    }
                    Operand::Reg(_) => {}
                    _ => {}
                }
            }
        }
    }
}
