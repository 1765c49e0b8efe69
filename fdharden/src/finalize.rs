//! Static-initializer fixup.
//!
//! After duplication the static-initializer list still names the original
//! constructors. Hardened constructors are replaced by their shadow
//! versions. The list has appending linkage semantics, so it is rebuilt as
//! a fresh aggregate rather than patched in place.
use fdinstr::modules::{Module, global::CtorEntry};
use log::debug;

use crate::globals;

pub fn fix_static_ctors(module: &mut Module) {
    if module.static_ctors.is_empty() {
        return;
    }
    let rebuilt: Vec<CtorEntry> = module
        .static_ctors
        .iter()
        .map(|entry| {
            let func = match globals::function_duplicate(module, entry.func) {
                Some(dup) if dup != entry.func => {
                    debug!(
                        "static initializer {} replaced by its shadow",
                        module.symbol_name(entry.func).unwrap_or("<unknown>")
                    );
                    dup
                }
                _ => entry.func,
            };
            CtorEntry {
                priority: entry.priority,
                func,
                data: entry.data,
            }
        })
        .collect();
    module.static_ctors = rebuilt;
    module.static_ctors.sort_by_key(|entry| entry.priority);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdinstr::{builder::FunctionBuilder, types::TypeRegistry};

    #[test]
    fn hardened_initializers_swap_to_their_shadow() {
        let registry = TypeRegistry::new();
        let mut module = Module::default();

        let mut b = FunctionBuilder::new(&registry, "init");
        b.ret(None);
        let init = b.finish();
        let init_uuid = init.uuid;

        let mut b = FunctionBuilder::new(&registry, "init_dup");
        b.ret(None);
        let shadow = b.finish();
        let shadow_uuid = shadow.uuid;

        let mut b = FunctionBuilder::new(&registry, "other");
        b.ret(None);
        let other = b.finish();
        let other_uuid = other.uuid;

        module.functions.insert(init_uuid, init);
        module.functions.insert(shadow_uuid, shadow);
        module.functions.insert(other_uuid, other);
        module.static_ctors = vec![
            CtorEntry {
                priority: 200,
                func: other_uuid,
                data: None,
            },
            CtorEntry {
                priority: 100,
                func: init_uuid,
                data: None,
            },
        ];

        fix_static_ctors(&mut module);
        assert_eq!(module.static_ctors[0].priority, 100);
        assert_eq!(module.static_ctors[0].func, shadow_uuid);
        assert_eq!(module.static_ctors[1].func, other_uuid);
    }
}
