//! Block terminators.
//!
//! Every basic block ends with exactly one [`Terminator`]. Terminators are
//! kept out of the instruction enum: they never produce an SSA value and the
//! transformations that rewrite instruction streams treat them separately.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum::EnumIs;

use crate::modules::operand::{Label, Operand};

/// Terminator of a basic block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Terminator {
    /// Conditional branch on a boolean operand.
    CBranch {
        condition: Operand,
        then_target: Label,
        else_target: Label,
    },
    /// Unconditional branch.
    Jump { target: Label },
    /// Multi-way branch on an integer operand. Targets are `(case value,
    /// label)` pairs; `default` is taken when no case matches.
    Switch {
        value: Operand,
        default: Label,
        targets: Vec<(i128, Label)>,
    },
    /// Indirect branch through a computed address. `possible_targets` lists
    /// every label the address may resolve to.
    IndirectBr {
        address: Operand,
        possible_targets: Vec<Label>,
    },
    /// Return from the function, with an optional value.
    Ret { value: Option<Operand> },
    /// Abnormal program termination. Has no successors.
    Trap,
}

impl Terminator {
    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        match self {
            Terminator::CBranch { condition, .. } => Some(condition).into_iter(),
            Terminator::Jump { .. } => None.into_iter(),
            Terminator::Switch { value, .. } => Some(value).into_iter(),
            Terminator::IndirectBr { address, .. } => Some(address).into_iter(),
            Terminator::Ret { value } => value.as_ref().into_iter(),
            Terminator::Trap => None.into_iter(),
        }
    }

    pub fn operands_mut(&mut self) -> impl Iterator<Item = &mut Operand> {
        match self {
            Terminator::CBranch { condition, .. } => Some(condition).into_iter(),
            Terminator::Jump { .. } => None.into_iter(),
            Terminator::Switch { value, .. } => Some(value).into_iter(),
            Terminator::IndirectBr { address, .. } => Some(address).into_iter(),
            Terminator::Ret { value } => value.as_mut().into_iter(),
            Terminator::Trap => None.into_iter(),
        }
    }

    /// All labels this terminator may transfer control to.
    #[auto_enums::auto_enum(Iterator)]
    pub fn successors(&self) -> impl Iterator<Item = Label> + '_ {
        match self {
            Terminator::CBranch {
                then_target,
                else_target,
                ..
            } => [*then_target, *else_target].into_iter(),
            Terminator::Jump { target } => std::iter::once(*target),
            Terminator::Switch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().map(|(_, l)| *l)),
            Terminator::IndirectBr {
                possible_targets, ..
            } => possible_targets.iter().copied(),
            Terminator::Ret { .. } | Terminator::Trap => std::iter::empty(),
        }
    }

    /// Replaces every successor equal to `from` with `to`.
    pub fn retarget(&mut self, from: Label, to: Label) {
        let redirect = |l: &mut Label| {
            if *l == from {
                *l = to;
            }
        };
        match self {
            Terminator::CBranch {
                then_target,
                else_target,
                ..
            } => {
                redirect(then_target);
                redirect(else_target);
            }
            Terminator::Jump { target } => redirect(target),
            Terminator::Switch {
                default, targets, ..
            } => {
                redirect(default);
                for (_, l) in targets.iter_mut() {
                    redirect(l);
                }
            }
            Terminator::IndirectBr {
                possible_targets, ..
            } => {
                for l in possible_targets.iter_mut() {
                    redirect(l);
                }
            }
            Terminator::Ret { .. } | Terminator::Trap => {}
        }
    }
}
