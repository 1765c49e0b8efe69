//! Consistency-check insertion.
//!
//! Before a synchronization point (a store, optionally a call or a branchy
//! terminator) the original and shadow computation streams are compared.
//! The block is split, a fresh check block compares every eligible operand
//! pair, conjoins the comparisons and conditionally branches to the fault
//! block on mismatch.
use std::collections::BTreeSet;

use fdinstr::modules::{
    BasicBlock, InstrId, InstrNode, Instruction, SrcLoc,
    control_flow::Terminator,
    instructions::{ExtractValue, FCmp, FCmpOp, FdInstr, IAnd, ICmp, ICmpOp, MLoad},
    operand::{Label, Name, Operand},
};
use fdinstr::types::Typeref;
use log::debug;

use crate::{
    Error,
    duplicate::FnPass,
    dupmap::ValueRef,
};

impl<'m> FnPass<'m> {
    /// Insert a check block in front of the instruction `sync_id`.
    pub(crate) fn insert_check_before(&mut self, sync_id: InstrId) -> Result<(), Error> {
        let Some((label, index)) = self.function.find_instr(sync_id) else {
            return Ok(());
        };
        let node = &self.function.body[&label].instructions[index];
        let operands: Vec<Operand> = node.instr.operands().cloned().collect();
        let loc = node.loc.clone();
        self.insert_check(label, index, operands, loc, Some(sync_id))
    }

    /// Insert a check block in front of the terminator of `label`.
    pub(crate) fn insert_check_before_terminator(&mut self, label: Label) -> Result<(), Error> {
        let Some(bb) = self.function.body.get(&label) else {
            return Ok(());
        };
        let operands: Vec<Operand> = bb.terminator.operands().cloned().collect();
        let index = bb.instructions.len();
        let loc = bb.instructions.last().and_then(|n| n.loc.clone());
        self.insert_check(label, index, operands, loc, None)
    }

    fn insert_check(
        &mut self,
        label: Label,
        index: usize,
        operands: Vec<Operand>,
        loc: Option<SrcLoc>,
        sync_id: Option<InstrId>,
    ) -> Result<(), Error> {
        let (check_label, tail_label) = self.split_before(label, index);

        let mut instrs: Vec<InstrNode> = Vec::new();
        let mut cmps: Vec<Name> = Vec::new();
        for op in &operands {
            // Only instruction-produced values are checked; immediates and
            // parameters cannot have silently diverged.
            let Operand::Reg(r) = op else { continue };
            if self.find_def(*r).is_none() {
                continue;
            }
            let Some(ty) = self.value_type(*r) else {
                continue;
            };
            if self.registry.is_pointer(ty) && !self.feeds_a_store(*r, sync_id) {
                continue;
            }
            let Some(shadow) = self.map.reg(*r) else {
                continue;
            };

            if self.registry.is_pointer(ty) {
                if let Some(cmp) = self.compare_ptrs(*r, shadow, &loc, &mut instrs) {
                    cmps.push(cmp);
                }
            } else if let Some(array) = self.registry.as_array(ty) {
                if !self.registry.is_aggregate(array.elem) {
                    self.compare_arrays(
                        *r,
                        shadow,
                        array.elem,
                        array.len,
                        &loc,
                        &mut instrs,
                        &mut cmps,
                    );
                }
            } else {
                cmps.push(self.emit_value_cmp(
                    Operand::Reg(*r),
                    Operand::Reg(shadow),
                    ty,
                    &loc,
                    &mut instrs,
                ));
            }
        }

        let terminator = match self.conjoin(&mut instrs, &cmps, &loc) {
            Some(cond) => {
                debug!("check block {check_label} guards {} pair(s)", cmps.len());
                Terminator::CBranch {
                    condition: Operand::Reg(cond),
                    then_target: tail_label,
                    else_target: self.err_label,
                }
            }
            // Nothing comparable survived the filters; the split block
            // simply falls through.
            None => Terminator::Jump { target: tail_label },
        };
        // Self-pairs keep the terminator sweep from duplicating the check
        // instructions themselves.
        for node in &instrs {
            self.map.insert_instr(node.id, node.id);
        }
        self.function.body.insert(
            check_label,
            BasicBlock {
                instructions: instrs,
                terminator,
            },
        );
        Ok(())
    }

    /// Fold the individual equality bits into one condition.
    fn conjoin(
        &mut self,
        instrs: &mut Vec<InstrNode>,
        cmps: &[Name],
        loc: &Option<SrcLoc>,
    ) -> Option<Name> {
        let mut cond = *cmps.first()?;
        for &next in &cmps[1..] {
            let dest = self.fresh_name();
            instrs.push(
                InstrNode::new(
                    self.fresh_id(),
                    IAnd {
                        dest,
                        ty: self.registry.boolean(),
                        lhs: Operand::Reg(cond),
                        rhs: Operand::Reg(next),
                    },
                )
                .with_loc(loc.clone()),
            );
            cond = dest;
        }
        Some(cond)
    }

    fn emit_value_cmp(
        &mut self,
        lhs: Operand,
        rhs: Operand,
        ty: Typeref,
        loc: &Option<SrcLoc>,
        instrs: &mut Vec<InstrNode>,
    ) -> Name {
        let dest = self.fresh_name();
        let boolean = self.registry.boolean();
        let instr: FdInstr = if self.registry.is_float(ty) {
            // Unordered equality: NaN lanes must not be reported as faults.
            FCmp {
                dest,
                dest_ty: boolean,
                ty,
                op: FCmpOp::Ueq,
                lhs,
                rhs,
            }
            .into()
        } else {
            ICmp {
                dest,
                dest_ty: boolean,
                ty,
                op: ICmpOp::Eq,
                lhs,
                rhs,
            }
            .into()
        };
        instrs.push(InstrNode::new(self.fresh_id(), instr).with_loc(loc.clone()));
        dest
    }

    /// Element-wise comparison of a scalar-element array pair. The extracted
    /// element pairs are registered in the duplicate map like any other
    /// original/shadow value pair.
    #[allow(clippy::too_many_arguments)]
    fn compare_arrays(
        &mut self,
        original: Name,
        shadow: Name,
        elem_ty: Typeref,
        len: u64,
        loc: &Option<SrcLoc>,
        instrs: &mut Vec<InstrNode>,
        cmps: &mut Vec<Name>,
    ) {
        for i in 0..len {
            let oe = self.fresh_name();
            instrs.push(
                InstrNode::new(
                    self.fresh_id(),
                    ExtractValue {
                        dest: oe,
                        ty: elem_ty,
                        aggregate: Operand::Reg(original),
                        indices: vec![i as u32],
                    },
                )
                .with_loc(loc.clone()),
            );
            let se = self.fresh_name();
            instrs.push(
                InstrNode::new(
                    self.fresh_id(),
                    ExtractValue {
                        dest: se,
                        ty: elem_ty,
                        aggregate: Operand::Reg(shadow),
                        indices: vec![i as u32],
                    },
                )
                .with_loc(loc.clone()),
            );
            self.map
                .insert_value(ValueRef::Reg(oe), ValueRef::Reg(se));

            if self.registry.is_pointer(elem_ty) {
                if let Some(cmp) = self.compare_ptrs(oe, se, loc, instrs) {
                    cmps.push(cmp);
                }
            } else {
                cmps.push(self.emit_value_cmp(
                    Operand::Reg(oe),
                    Operand::Reg(se),
                    elem_ty,
                    loc,
                    instrs,
                ));
            }
        }
    }

    /// Compare a pointer pair by content. Both sides are chased through
    /// store chains down to the scalar actually held, then that value is
    /// loaded from each side and compared.
    fn compare_ptrs(
        &mut self,
        original: Name,
        shadow: Name,
        loc: &Option<SrcLoc>,
        instrs: &mut Vec<InstrNode>,
    ) -> Option<Name> {
        let (orig_final, orig_ty) = self.chase_to_scalar(original)?;
        let (shadow_final, shadow_ty) = self.chase_to_scalar(shadow)?;
        if self.registry.is_aggregate(orig_ty) || self.registry.is_aggregate(shadow_ty) {
            return None;
        }
        let lhs = self.fresh_name();
        instrs.push(
            InstrNode::new(
                self.fresh_id(),
                MLoad {
                    dest: lhs,
                    ty: orig_ty,
                    addr: Operand::Reg(orig_final),
                    alignment: None,
                    ordering: None,
                    volatile: false,
                },
            )
            .with_loc(loc.clone()),
        );
        let rhs = self.fresh_name();
        instrs.push(
            InstrNode::new(
                self.fresh_id(),
                MLoad {
                    dest: rhs,
                    ty: shadow_ty,
                    addr: Operand::Reg(shadow_final),
                    alignment: None,
                    ordering: None,
                    volatile: false,
                },
            )
            .with_loc(loc.clone()),
        );
        Some(self.emit_value_cmp(Operand::Reg(lhs), Operand::Reg(rhs), orig_ty, loc, instrs))
    }

    /// Follow the chain of pointers stored into pointers until reaching a
    /// pointer whose stored value is a scalar, yielding that pointer and the
    /// scalar's type. A visited set breaks store cycles.
    fn chase_to_scalar(&self, start: Name) -> Option<(Name, Typeref)> {
        let mut cur = start;
        let mut visited: BTreeSet<Name> = BTreeSet::new();
        loop {
            if !visited.insert(cur) {
                return None;
            }
            let mut stored: Option<&Operand> = None;
            for bb in self.function.body.values() {
                for node in &bb.instructions {
                    if let FdInstr::MStore(store) = &node.instr {
                        if store.addr == Operand::Reg(cur) {
                            stored = Some(&store.value);
                        }
                    }
                }
            }
            let value = stored?;
            let ty = self.operand_type(value)?;
            if !self.registry.is_pointer(ty) {
                return Some((cur, ty));
            }
            match value {
                Operand::Reg(next) => cur = *next,
                _ => return None,
            }
        }
    }

    /// Whether some store writes the pointer `reg` to memory on a path
    /// that leads back to the pointer's definition. The walk starts at the
    /// store's block and follows successors toward the defining block, so
    /// loop-carried stores count while stores only reachable after the
    /// synchronization point do not. Pointers that never feed such a store
    /// carry no comparable state and are skipped.
    fn feeds_a_store(&self, reg: Name, sync_id: Option<InstrId>) -> bool {
        for (label, bb) in &self.function.body {
            for node in &bb.instructions {
                if Some(node.id) == sync_id {
                    continue;
                }
                let FdInstr::MStore(store) = &node.instr else {
                    continue;
                };
                if store.value != Operand::Reg(reg) {
                    continue;
                }
                if let Some(def) = self.find_def(reg) {
                    if let Some((def_label, _)) = self.function.find_instr(def) {
                        if self.reaches(*label, def_label) {
                            return true;
                        }
                    }
                } else {
                    return true;
                }
            }
        }
        false
    }

    /// Breadth-first reachability over block successors, with a visited set
    /// so looping control flow terminates.
    fn reaches(&self, from: Label, to: Label) -> bool {
        if from == to {
            return true;
        }
        let mut visited: BTreeSet<Label> = BTreeSet::new();
        let mut queue: Vec<Label> = vec![from];
        while let Some(label) = queue.pop() {
            if !visited.insert(label) {
                continue;
            }
            let Some(bb) = self.function.body.get(&label) else {
                continue;
            };
            for succ in bb.terminator.successors() {
                if succ == to {
                    return true;
                }
                if !visited.contains(&succ) {
                    queue.push(succ);
                }
            }
        }
        false
    }
}
