//! Global & signature duplicator.
//!
//! Creates shadow copies of qualifying global variables and shadow
//! (argument-doubled) versions of hardened functions, before any
//! instruction is touched.
use fdinstr::modules::{
    Function, Module, ParamAttrs,
    global::GlobalVariable,
    operand::Name,
};
use log::debug;
use uuid::Uuid;

use crate::{
    HardenConfig,
    policy::{PolicyMap, PolicyTag},
};

/// Suffix carried by shadow entities.
pub const SHADOW_SUFFIX: &str = "_dup";
/// Secondary suffix for functions whose return mechanism changed.
pub const SHADOW_RET_SUFFIX: &str = "_ret_dup";

pub fn shadow_name(name: &str) -> String {
    format!("{name}{SHADOW_SUFFIX}")
}

pub fn has_shadow_suffix(name: &str) -> bool {
    name.ends_with(SHADOW_SUFFIX)
}

/// Inverse of the naming convention: strips either shadow suffix.
pub fn strip_shadow_suffix(name: &str) -> Option<&str> {
    name.strip_suffix(SHADOW_RET_SUFFIX)
        .or_else(|| name.strip_suffix(SHADOW_SUFFIX))
}

/// The argument-doubled version of the function behind `uuid`, or `uuid`
/// itself when it already is one.
pub fn function_duplicate(module: &Module, uuid: Uuid) -> Option<Uuid> {
    let name = module.symbol_name(uuid)?;
    if has_shadow_suffix(name) {
        return Some(uuid);
    }
    let dup = format!("{name}{SHADOW_SUFFIX}");
    let ret_dup = format!("{name}{SHADOW_RET_SUFFIX}");
    module
        .function_by_name(&dup)
        .or_else(|| module.function_by_name(&ret_dup))
        .map(|f| f.uuid)
        .or_else(|| {
            module
                .external_by_name(&dup)
                .or_else(|| module.external_by_name(&ret_dup))
                .map(|f| f.uuid)
        })
}

/// The plain version of the function behind `uuid`, or `uuid` itself when
/// it does not carry a shadow suffix.
pub fn function_from_duplicate(module: &Module, uuid: Uuid) -> Option<Uuid> {
    let name = module.symbol_name(uuid)?;
    match strip_shadow_suffix(name) {
        None => Some(uuid),
        Some(base) => module
            .function_by_name(base)
            .map(|f| f.uuid)
            .or_else(|| module.external_by_name(base).map(|f| f.uuid)),
    }
}

fn is_reserved(global: &GlobalVariable) -> bool {
    global.name.starts_with("llvm.") || global.section.as_deref() == Some("llvm.metadata")
}

/// Duplicate every qualifying global variable, returning the
/// original-to-shadow pairs used to seed each function's duplicate map.
///
/// A global is duplicated iff it is not read-only, does not already carry
/// the shadow suffix, is not a reserved or metadata-section symbol, and is
/// not excluded. Runtime-signature variables are skipped entirely; they are
/// maintained by a different mechanism.
pub fn duplicate_globals(
    module: &mut Module,
    policy: &PolicyMap,
    config: &HardenConfig,
) -> Vec<(Uuid, Uuid)> {
    let mut pairs = Vec::new();
    let originals: Vec<Uuid> = module.globals.keys().copied().collect();

    for uuid in originals {
        let global = &module.globals[&uuid];
        match policy.tag(uuid) {
            Some(PolicyTag::RuntimeSig) | Some(PolicyTag::RunAdjSig) => continue,
            _ => {}
        }
        let excluded = policy.is(uuid, PolicyTag::Exclude);
        if global.constant || has_shadow_suffix(&global.name) || is_reserved(global) || excluded {
            continue;
        }

        let mut copy = GlobalVariable {
            uuid: Uuid::new_v4(),
            name: shadow_name(&global.name),
            demangled_name: global.demangled_name.as_deref().map(shadow_name),
            ty: global.ty,
            linkage: global.linkage,
            constant: false,
            initializer: global.initializer.clone(),
            section: global.section.clone(),
            alignment: global.alignment,
            thread_local: global.thread_local,
            externally_initialized: global.externally_initialized,
        };
        // Shadow state without a section or an initializer goes to the
        // configured duplicate data section, so a linker script can map it
        // to a distinct memory bank.
        if !config.alternate_layout && global.section.is_none() && !global.has_initializer() {
            copy.section = Some(config.duplicate_section.clone());
        }
        debug!("duplicating global {} as {}", global.name, copy.name);
        pairs.push((uuid, copy.uuid));
        module.globals.insert(copy.uuid, copy);
    }

    pairs
}

/// Shadow version of `function`: same return type, doubled parameter list
/// per the configured ordering, body cloned as-is (the original parameter
/// names keep their slots, so the body needs no remapping), and the
/// returned-via-hidden-pointer attribute stripped from both halves of the
/// formerly `sret` argument.
///
/// Returns the shadow function plus the (original, shadow) parameter pairs.
pub fn duplicate_fn_args(
    function: &Function,
    config: &HardenConfig,
) -> (Function, Vec<(Name, Name)>) {
    let mut next = function.next_available_name().0;
    let mut params = Vec::with_capacity(function.params.len() * 2);
    let mut arg_pairs = Vec::with_capacity(function.params.len());

    let mut shadows = Vec::with_capacity(function.params.len());
    for param in &function.params {
        let mut original = *param;
        original.attrs.remove(ParamAttrs::SRET);
        let shadow = fdinstr::modules::Param {
            name: Name(next),
            ty: param.ty,
            attrs: original.attrs,
        };
        next += 1;
        arg_pairs.push((original.name, shadow.name));
        shadows.push((original, shadow));
    }

    if config.interleaved_args() {
        for (original, shadow) in shadows {
            params.push(original);
            params.push(shadow);
        }
    } else {
        params.extend(shadows.iter().map(|(o, _)| *o));
        params.extend(shadows.iter().map(|(_, s)| *s));
    }

    let shadow_fn = Function {
        uuid: Uuid::new_v4(),
        name: shadow_name(&function.name),
        demangled_name: function.demangled_name.as_deref().map(shadow_name),
        params,
        return_type: function.return_type,
        body: function.body.clone(),
        linkage: function.linkage,
    };
    debug!("created shadow function {}", shadow_fn.name);

    (shadow_fn, arg_pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdinstr::{builder::FunctionBuilder, modules::operand::Operand, types::TypeRegistry};

    #[test]
    fn suffix_roundtrip() {
        assert_eq!(shadow_name("counter"), "counter_dup");
        assert_eq!(strip_shadow_suffix("counter_dup"), Some("counter"));
        assert_eq!(strip_shadow_suffix("f_ret_dup"), Some("f"));
        assert_eq!(strip_shadow_suffix("counter"), None);
    }

    #[test]
    fn fn_args_doubled_sequentially() {
        let registry = TypeRegistry::new();
        let i32_ty = registry.int(32);
        let mut b = FunctionBuilder::new(&registry, "sum").returns(i32_ty);
        let a = b.param(i32_ty);
        let c = b.param(i32_ty);
        let r = b.push(fdinstr::modules::instructions::IAdd {
            dest: Name(0),
            ty: i32_ty,
            lhs: Operand::Reg(a),
            rhs: Operand::Reg(c),
        });
        b.ret(r.map(Operand::Reg));
        let function = b.finish();

        let config = HardenConfig::default();
        let (shadow, pairs) = duplicate_fn_args(&function, &config);
        assert_eq!(shadow.name, "sum_dup");
        assert_eq!(shadow.params.len(), 4);
        // Originals keep the first half, so the cloned body still resolves.
        assert_eq!(shadow.params[0].name, a);
        assert_eq!(shadow.params[1].name, c);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, a);
        assert!(shadow.check_ssa().is_ok());
    }

    #[test]
    fn sret_is_stripped_from_both_halves() {
        let registry = TypeRegistry::new();
        let mut b = FunctionBuilder::new(&registry, "build");
        b.param_with_attrs(registry.ptr(), ParamAttrs::SRET);
        b.ret(None);
        let function = b.finish();

        let (shadow, _) = duplicate_fn_args(&function, &HardenConfig::default());
        assert!(
            shadow
                .params
                .iter()
                .all(|p| !p.attrs.contains(ParamAttrs::SRET))
        );
    }
}
