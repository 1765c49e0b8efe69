//! Fault-detection instruction IR.
//!
//! `fdinstr` is the in-memory program representation consumed and mutated by
//! the `fdharden` duplication engine. It models a whole program unit as a
//! [`modules::Module`] owning functions, global variables and a
//! static-initializer list, with typed instructions, explicit terminators and
//! an interning [`types::TypeRegistry`].

pub mod builder;
pub mod modules;
pub mod types;
pub mod utils;
