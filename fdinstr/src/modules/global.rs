//! Module-level data: global variables, constant initializers, function
//! aliases and the static-initializer list.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::{EnumIs, EnumTryAs};
use uuid::Uuid;

use crate::{modules::Linkage, types::Typeref};

/// A compile-time constant value, used for global initializers and
/// immediate operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs, EnumTryAs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Const {
    Int { value: i128, ty: Typeref },
    /// Floating-point constant stored as its raw bit pattern so that `Eq`
    /// and `Hash` are well-defined.
    Fp { bits: u64, ty: Typeref },
    NullPtr,
    /// Zero-initializer for the given type.
    Zero(Typeref),
    Array { elem_ty: Typeref, elems: Vec<Const> },
    Struct { elems: Vec<Const> },
    /// Address of a global variable.
    Global(Uuid),
    /// Address of a function.
    Func(Uuid),
}

/// Thread-local storage mode of a global variable.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ThreadLocalMode {
    #[default]
    NotThreadLocal,
    GeneralDynamic,
    LocalExec,
}

/// A module-level global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlobalVariable {
    pub uuid: Uuid,
    /// Linker-level (possibly mangled) symbol name.
    pub name: String,
    /// Human-readable form of `name`, when the producer demangled it.
    pub demangled_name: Option<String>,
    /// Type of the stored value, not of the address.
    pub ty: Typeref,
    pub linkage: Linkage,
    /// `true` for read-only data.
    pub constant: bool,
    pub initializer: Option<Const>,
    pub section: Option<String>,
    pub alignment: Option<u32>,
    pub thread_local: ThreadLocalMode,
    /// Defined here but initialized by another unit at load time.
    pub externally_initialized: bool,
}

impl GlobalVariable {
    pub fn has_initializer(&self) -> bool {
        self.initializer.is_some()
    }

    /// Name-based classification works on the demangled form when one is
    /// available, falling back to the raw symbol.
    pub fn display_name(&self) -> &str {
        self.demangled_name.as_deref().unwrap_or(&self.name)
    }
}

/// A function alias. The hardening engine normalizes these away before any
/// analysis by replacing every use with the aliasee.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Alias {
    pub uuid: Uuid,
    pub name: String,
    /// UUID of the aliased function.
    pub target: Uuid,
}

/// One entry of the module's static-initializer list.
///
/// Entries run in ascending `priority` order before `main`. The list itself
/// demands appending linkage, so rewrites must rebuild it as a fresh
/// aggregate rather than mutate it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CtorEntry {
    pub priority: u16,
    pub func: Uuid,
    /// Optional associated data symbol used by the runtime to key the entry.
    pub data: Option<Uuid>,
}
