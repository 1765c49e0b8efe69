//! Hardening-set resolver.
//!
//! Computes the closure of functions and global variables that require
//! duplication, starting from explicit `to_harden` tags and propagating
//! through data dependencies (stores and loads of hardened variables) and
//! the call graph. The result is immutable: every later phase reads the
//! [`Resolution`] by reference and never grows it.
use std::collections::BTreeSet;

use fdinstr::modules::{
    Instruction, Module,
    instructions::FdInstr,
    operand::{Name, Operand},
};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::{
    policy::{PolicyMap, PolicyTag},
    vtable,
};

/// The hardening sets, computed once by [`resolve`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    functions: BTreeSet<Uuid>,
    globals: BTreeSet<Uuid>,
    constructors: BTreeSet<Uuid>,
}

impl Resolution {
    pub fn is_hardened_function(&self, uuid: Uuid) -> bool {
        self.functions.contains(&uuid)
    }

    pub fn is_hardened_global(&self, uuid: Uuid) -> bool {
        self.globals.contains(&uuid)
    }

    pub fn hardened_functions(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.functions.iter().copied()
    }

    pub fn hardened_globals(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.globals.iter().copied()
    }

    pub fn constructors(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.constructors.iter().copied()
    }
}

/// Matches `Class::Class(args)` shapes. The `regex` crate has no
/// backreferences, so the repeated-identifier condition is checked on the
/// captures instead.
static CONSTRUCTOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)::(\w+)\(.*\)$").expect("constructor regex"));

/// Demangled-name heuristic for class constructors: the class name repeated
/// as both scope and method name.
pub fn is_constructor(demangled: &str) -> bool {
    CONSTRUCTOR_RE
        .captures(demangled)
        .is_some_and(|caps| caps[1] == caps[2])
}

/// Replace every reference to a function alias with the aliasee, then drop
/// the aliases. Must run before any analysis so that callee resolution and
/// shadow lookup see one name per function.
pub fn normalize_aliases(module: &mut Module) {
    if module.aliases.is_empty() {
        return;
    }
    let targets: Vec<(Uuid, Uuid)> = module
        .aliases
        .values()
        .filter(|a| module.functions.contains_key(&a.target))
        .map(|a| (a.uuid, a.target))
        .collect();

    for (alias, target) in &targets {
        debug!(
            "replacing uses of alias {} with {}",
            alias.simple(),
            target.simple()
        );
        for function in module.functions.values_mut() {
            for bb in function.body.values_mut() {
                for node in bb.instructions.iter_mut() {
                    node.instr.remap_operands(|op| {
                        if let Operand::Func(u) = op {
                            if u == alias {
                                *u = *target;
                            }
                        }
                    });
                }
            }
        }
        for entry in module.static_ctors.iter_mut() {
            if entry.func == *alias {
                entry.func = *target;
            }
        }
    }
    module.aliases.clear();
}

/// A value the variable closure is tracking: a global, or an SSA register
/// local to one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum VarRef {
    Global(Uuid),
    Local { function: Uuid, name: Name },
}

fn operand_matches(op: &Operand, var: VarRef) -> bool {
    match (op, var) {
        (Operand::Global(u), VarRef::Global(g)) => *u == g,
        (Operand::Reg(r), VarRef::Local { name, .. }) => *r == name,
        (Operand::FieldAddr(fa), _) => operand_matches(&fa.base, var),
        _ => false,
    }
}

/// Compute the hardening sets for `module` under `policy`.
pub fn resolve(module: &Module, policy: &PolicyMap) -> Resolution {
    let mut resolution = Resolution::default();

    // Seed from explicit tags.
    let mut var_frontier: BTreeSet<VarRef> = BTreeSet::new();
    for (entity, tag) in policy.iter() {
        if tag != PolicyTag::ToHarden {
            continue;
        }
        if module.functions.contains_key(&entity) || module.external_functions.contains_key(&entity)
        {
            debug!("function to harden: {}", entity.simple());
            resolution.functions.insert(entity);
        } else if module.globals.contains_key(&entity) {
            debug!("global to harden: {}", entity.simple());
            var_frontier.insert(VarRef::Global(entity));
        }
    }

    // Fixed point over data dependencies: a value stored into a hardened
    // variable, or loaded out of one, joins the frontier; a statically
    // resolved call using one joins the function set.
    let mut seen_vars: BTreeSet<VarRef> = BTreeSet::new();
    while !var_frontier.is_empty() {
        let mut next: BTreeSet<VarRef> = BTreeSet::new();
        for var in &var_frontier {
            let scope: Box<dyn Iterator<Item = (&Uuid, _)>> = match var {
                VarRef::Global(_) => Box::new(module.functions.iter()),
                VarRef::Local { function, .. } => {
                    Box::new(module.functions.get_key_value(function).into_iter())
                }
            };
            for (fn_uuid, function) in scope {
                for bb in function.body.values() {
                    for node in &bb.instructions {
                        match &node.instr {
                            FdInstr::MStore(store) if operand_matches(&store.addr, *var) => {
                                match &store.value {
                                    Operand::Reg(r) => {
                                        let v = VarRef::Local {
                                            function: *fn_uuid,
                                            name: *r,
                                        };
                                        if !seen_vars.contains(&v) && !var_frontier.contains(&v) {
                                            next.insert(v);
                                        }
                                    }
                                    Operand::Global(g) => {
                                        let v = VarRef::Global(*g);
                                        if !seen_vars.contains(&v) && !var_frontier.contains(&v) {
                                            next.insert(v);
                                        }
                                    }
                                    _ => {}
                                }
                            }
                            FdInstr::MLoad(load) if operand_matches(&load.addr, *var) => {
                                let v = VarRef::Local {
                                    function: *fn_uuid,
                                    name: load.dest,
                                };
                                if !seen_vars.contains(&v) && !var_frontier.contains(&v) {
                                    next.insert(v);
                                }
                            }
                            FdInstr::Call(call)
                                if call.operands().any(|op| operand_matches(op, *var)) =>
                            {
                                match call.static_callee() {
                                    Some(callee) => {
                                        debug!(
                                            "function hardened through variable use: {}",
                                            module.symbol_name(callee).unwrap_or("<unknown>")
                                        );
                                        resolution.functions.insert(callee);
                                    }
                                    None => debug!(
                                        "indirect call over hardened variable in {}",
                                        function.name
                                    ),
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        seen_vars.extend(var_frontier.iter().copied());
        var_frontier = next;
    }
    for var in &seen_vars {
        if let VarRef::Global(g) = var {
            resolution.globals.insert(*g);
        }
    }

    // Fixed point over the call graph, with constructor detection.
    let mut just_added: BTreeSet<Uuid> = resolution.functions.clone();
    while !just_added.is_empty() {
        let mut to_add: BTreeSet<Uuid> = BTreeSet::new();
        for fn_uuid in &just_added {
            let Some(function) = module.functions.get(fn_uuid) else {
                continue;
            };

            if is_constructor(function.display_name()) {
                debug!(
                    "constructor: {} -> {}",
                    function.name,
                    function.display_name()
                );
                resolution.constructors.insert(*fn_uuid);
                for method in vtable::virtual_methods_from_constructor(module, function) {
                    if !resolution.functions.contains(&method) && !just_added.contains(&method) {
                        to_add.insert(method);
                    }
                }
            }

            for bb in function.body.values() {
                for node in &bb.instructions {
                    let FdInstr::Call(call) = &node.instr else {
                        continue;
                    };
                    match call.static_callee() {
                        Some(callee) => {
                            let tag = policy.tag(callee);
                            let to_harden = !matches!(
                                tag,
                                Some(PolicyTag::Exclude) | Some(PolicyTag::ToDuplicate)
                            );
                            if to_harden
                                && !resolution.functions.contains(&callee)
                                && !just_added.contains(&callee)
                            {
                                to_add.insert(callee);
                            }
                        }
                        None => {
                            debug!(
                                "indirect call in {}; caller-side doubling will apply",
                                function.name
                            );
                        }
                    }
                }
            }
        }
        resolution.functions.extend(just_added.iter().copied());
        just_added = to_add;
    }

    resolution
}
