//! Whole-program hardening by instruction duplication.
//!
//! `fdharden` transforms an [`fdinstr`](fdinstr) module so that every
//! hardened computation runs twice over disjoint state, with consistency
//! checks at synchronization points that branch into fault blocks on
//! divergence. The pipeline:
//!
//! 1. Alias normalization, so every function has exactly one name.
//! 2. Exclusion marking of untagged linker-visible definitions.
//! 3. Resolution of the hardening closure from `to_harden` tags, through
//!    data dependencies and the call graph.
//! 4. Duplication of global state and of function signatures.
//! 5. Constructor fixup, wiring shadow objects to shadow dispatch tables.
//! 6. Per-function instruction duplication, check insertion and fault-block
//!    materialization.
//! 7. Static-initializer fixup and the hardening report.
//!
//! The entry point is [`harden_module`].
use std::path::PathBuf;

use fdinstr::{
    modules::{
        Function, Module,
        operand::{Label, Name},
    },
    types::TypeRegistry,
};
use log::{debug, info};
use thiserror::Error as ThisError;
use uuid::Uuid;

pub mod checks;
pub mod duplicate;
pub mod dupmap;
pub mod errblock;
pub mod finalize;
pub mod globals;
pub mod policy;
pub mod report;
pub mod resolver;
pub mod vtable;

pub use dupmap::{DuplicateMap, ValueRef};
pub use policy::{PolicyMap, PolicyTag};
pub use report::HardenReport;
pub use resolver::{Resolution, resolve};

#[derive(Debug, ThisError)]
pub enum Error {
    /// The configured fault handler is not defined or declared in the
    /// module. Hardening without a fault sink would silently lose every
    /// detection, so this aborts the whole run.
    #[error("fault handler `{symbol}` not found in module")]
    MissingFaultHandler { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Placement of shadow parameters relative to their originals.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ArgOrder {
    /// All originals first, then all shadows.
    #[default]
    Sequential,
    /// Each shadow directly after its original.
    Interleaved,
}

/// Knobs of the hardening engine.
#[derive(Debug, Clone)]
pub struct HardenConfig {
    /// Symbol invoked by fault blocks on detected divergence.
    pub handler_symbol: String,
    pub arg_order: ArgOrder,
    /// Shadow allocations and globals next to their originals instead of
    /// grouped; also disables the duplicate data section.
    pub alternate_layout: bool,
    pub check_stores: bool,
    pub check_calls: bool,
    pub check_branches: bool,
    /// Restrict checks to blocks ending in a multi-way transfer.
    pub selective_checking: bool,
    /// Section for shadow globals without an initializer, so a linker
    /// script can map them to a distinct memory bank.
    pub duplicate_section: String,
    /// When set, the hardening report is appended to this file.
    pub export_path: Option<PathBuf>,
}

impl Default for HardenConfig {
    fn default() -> Self {
        HardenConfig {
            handler_symbol: "data_corruption_handler".to_owned(),
            arg_order: ArgOrder::Sequential,
            alternate_layout: false,
            check_stores: true,
            check_calls: false,
            check_branches: false,
            selective_checking: false,
            duplicate_section: ".duplicated_data".to_owned(),
            export_path: None,
        }
    }
}

impl HardenConfig {
    pub fn interleaved_args(&self) -> bool {
        self.arg_order == ArgOrder::Interleaved
    }
}

/// Entry instructions without a source location inherit the function's
/// first known one, so faults raised out of prologue code still map to a
/// line.
fn fix_entry_locs(function: &mut Function) {
    let first_loc = function
        .body
        .values()
        .flat_map(|bb| bb.instructions.iter())
        .find_map(|n| n.loc.clone());
    let Some(loc) = first_loc else { return };
    if let Some(entry) = function.body.get_mut(&Label::NIL) {
        for node in entry.instructions.iter_mut() {
            if node.loc.is_none() {
                node.loc = Some(loc.clone());
            }
        }
    }
}

/// Harden `module` in place. Returns the report of compiled functions.
pub fn harden_module(
    module: &mut Module,
    registry: &TypeRegistry,
    policy: &mut PolicyMap,
    config: &HardenConfig,
) -> Result<HardenReport, Error> {
    resolver::normalize_aliases(module);
    policy::mark_linker_visible_excluded(policy, module);
    let resolution = resolver::resolve(module, policy);

    let handler = module
        .function_by_name(&config.handler_symbol)
        .map(|f| f.uuid)
        .or_else(|| {
            module
                .external_by_name(&config.handler_symbol)
                .map(|f| f.uuid)
        })
        .ok_or_else(|| Error::MissingFaultHandler {
            symbol: config.handler_symbol.clone(),
        })?;

    let global_pairs = globals::duplicate_globals(module, policy, config);

    // Shadow signatures for every hardened defined function that is not
    // itself a shadow. Bodies are cloned as-is; the per-function pass below
    // does the actual instruction work.
    let mut shadow_args: Vec<(Uuid, Vec<(Name, Name)>)> = Vec::new();
    let mut report = HardenReport::default();
    let targets: Vec<Uuid> = resolution
        .hardened_functions()
        .filter(|uuid| {
            module
                .functions
                .get(uuid)
                .is_some_and(|f| !globals::has_shadow_suffix(&f.name))
        })
        .collect();
    for uuid in &targets {
        if let Some(function) = module.functions.get_mut(uuid) {
            fix_entry_locs(function);
        }
        let Some(function) = module.functions.get(uuid) else {
            continue;
        };
        report.record(function.name.clone());
        let (shadow, arg_pairs) = globals::duplicate_fn_args(function, config);
        let shadow_uuid = shadow.uuid;
        module.functions.insert(shadow_uuid, shadow);
        shadow_args.push((shadow_uuid, arg_pairs));
    }
    info!("hardening {} function(s)", shadow_args.len());

    vtable::fix_constructors(module, &resolution);

    for (shadow_uuid, arg_pairs) in shadow_args {
        let Some(mut function) = module.functions.remove(&shadow_uuid) else {
            continue;
        };
        debug!("duplicating instructions of {}", function.name);

        let mut map = DuplicateMap::default();
        for (original, shadow) in &global_pairs {
            map.insert_value(ValueRef::Global(*original), ValueRef::Global(*shadow));
        }
        for (original, shadow) in &arg_pairs {
            map.insert_value(ValueRef::Reg(*original), ValueRef::Reg(*shadow));
        }

        let err_label = errblock::create_template(&mut function);
        let mut pass =
            duplicate::FnPass::new(module, registry, config, policy, function, err_label, map);
        pass.run()?;
        let (mut function, _map, removals) = pass.finish();

        for id in removals {
            if let Some((label, index)) = function.find_instr(id) {
                if let Some(bb) = function.body.get_mut(&label) {
                    bb.instructions.remove(index);
                }
            }
        }
        errblock::materialize(&mut function, err_label, handler);
        module.functions.insert(shadow_uuid, function);
    }

    finalize::fix_static_ctors(module);

    if let Some(path) = &config.export_path {
        report.persist(path)?;
    }
    Ok(report)
}
