//! Duplication policy model.
//!
//! The mapping from program entities to policy tags is produced by an
//! external annotation-discovery collaborator and injected as a prebuilt
//! [`PolicyMap`]. The engine never derives tags itself, with one exception:
//! [`mark_linker_visible_excluded`], the companion pass that fences off
//! externally visible code the closure should not silently pull in.
use std::collections::BTreeMap;

use fdinstr::modules::{Linkage, Module};
use log::debug;
use uuid::Uuid;

/// Policy tag attached to a function or global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyTag {
    /// Seed of the hardening closure.
    ToHarden,
    /// Never hardened; calls to it are not followed by the closure.
    Exclude,
    /// Calls to it are cloned wholesale instead of redirected to a shadow.
    ToDuplicate,
    /// Runtime-signature variable, maintained by a different mechanism.
    RuntimeSig,
    /// Runtime adjusted-signature variable, likewise out of scope.
    RunAdjSig,
}

/// Entity-to-tag mapping, keyed by the entity's module-level UUID.
#[derive(Debug, Clone, Default)]
pub struct PolicyMap {
    tags: BTreeMap<Uuid, PolicyTag>,
}

impl PolicyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, entity: Uuid, tag: PolicyTag) {
        self.tags.insert(entity, tag);
    }

    pub fn tag(&self, entity: Uuid) -> Option<PolicyTag> {
        self.tags.get(&entity).copied()
    }

    pub fn is(&self, entity: Uuid, tag: PolicyTag) -> bool {
        self.tag(entity) == Some(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Uuid, PolicyTag)> + '_ {
        self.tags.iter().map(|(u, t)| (*u, *t))
    }
}

fn is_reserved_name(name: &str) -> bool {
    name.starts_with("llvm.")
}

/// Companion pass run before the engine: every externally linkable
/// function or global definition that carries no
/// `to_harden`/`to_duplicate`/`exclude` tag is retroactively tagged
/// `exclude`, so that the closure does not pull in unrelated externally
/// visible code or state.
pub fn mark_linker_visible_excluded(policy: &mut PolicyMap, module: &Module) {
    for function in module.functions.values() {
        let is_definition = !function.body.is_empty();
        if function.linkage == Linkage::External
            && is_definition
            && !is_reserved_name(&function.name)
            && policy.tag(function.uuid).is_none()
        {
            debug!("excluding linker-visible function {}", function.name);
            policy.set(function.uuid, PolicyTag::Exclude);
        }
    }
    for global in module.globals.values() {
        let is_definition = global.initializer.is_some();
        if global.linkage == Linkage::External
            && is_definition
            && !is_reserved_name(&global.name)
            && policy.tag(global.uuid).is_none()
        {
            debug!("excluding linker-visible global {}", global.name);
            policy.set(global.uuid, PolicyTag::Exclude);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdinstr::modules::global::{Const, GlobalVariable, ThreadLocalMode};
    use fdinstr::{builder::FunctionBuilder, types::TypeRegistry};
    use uuid::Uuid;

    fn global(registry: &TypeRegistry, name: &str, linkage: Linkage, defined: bool) -> GlobalVariable {
        let ty = registry.int(32);
        GlobalVariable {
            uuid: Uuid::new_v4(),
            name: name.to_owned(),
            demangled_name: None,
            ty,
            linkage,
            constant: false,
            initializer: defined.then_some(Const::Int { value: 0, ty }),
            section: None,
            alignment: None,
            thread_local: ThreadLocalMode::NotThreadLocal,
            externally_initialized: false,
        }
    }

    #[test]
    fn linker_visible_definitions_get_excluded() {
        let registry = TypeRegistry::new();
        let mut b = FunctionBuilder::new(&registry, "api_entry").linkage(Linkage::External);
        b.ret(None);
        let function = b.finish();
        let uuid = function.uuid;

        let mut module = Module::default();
        module.functions.insert(uuid, function);

        let mut policy = PolicyMap::new();
        mark_linker_visible_excluded(&mut policy, &module);
        assert_eq!(policy.tag(uuid), Some(PolicyTag::Exclude));
    }

    #[test]
    fn linker_visible_global_definitions_get_excluded() {
        let registry = TypeRegistry::new();
        let mut module = Module::default();
        let exported = global(&registry, "exported_state", Linkage::External, true);
        let declared = global(&registry, "imported_state", Linkage::External, false);
        let private = global(&registry, "private_state", Linkage::Internal, true);
        let (exported_uuid, declared_uuid, private_uuid) =
            (exported.uuid, declared.uuid, private.uuid);
        module.globals.insert(exported_uuid, exported);
        module.globals.insert(declared_uuid, declared);
        module.globals.insert(private_uuid, private);

        let mut policy = PolicyMap::new();
        mark_linker_visible_excluded(&mut policy, &module);
        assert_eq!(policy.tag(exported_uuid), Some(PolicyTag::Exclude));
        assert_eq!(policy.tag(declared_uuid), None);
        assert_eq!(policy.tag(private_uuid), None);
    }

    #[test]
    fn tagged_entities_keep_their_tag() {
        let registry = TypeRegistry::new();
        let mut b = FunctionBuilder::new(&registry, "hot_loop").linkage(Linkage::External);
        b.ret(None);
        let function = b.finish();
        let uuid = function.uuid;

        let mut module = Module::default();
        module.functions.insert(uuid, function);

        let mut policy = PolicyMap::new();
        policy.set(uuid, PolicyTag::ToHarden);
        mark_linker_visible_excluded(&mut policy, &module);
        assert_eq!(policy.tag(uuid), Some(PolicyTag::ToHarden));
    }
}
