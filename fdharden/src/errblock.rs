//! Fault block construction.
//!
//! During duplication every check branches to a single placeholder block.
//! Once a function is fully transformed the placeholder is materialized:
//! each predecessor gets its own fault block invoking the fault handler,
//! carrying the nearest source location of the faulting site, and the
//! placeholder is deleted.
use fdinstr::modules::{
    BasicBlock, Function, InstrId, InstrNode, SrcLoc,
    control_flow::Terminator,
    instructions::Call,
    operand::{Label, Operand},
};
use log::debug;
use uuid::Uuid;

/// Insert the placeholder block every check targets. It carries no
/// instructions; [`materialize`] replaces it per predecessor.
pub fn create_template(function: &mut Function) -> Label {
    let label = function.next_available_label();
    function.body.insert(
        label,
        BasicBlock {
            instructions: Vec::new(),
            terminator: Terminator::Trap,
        },
    );
    label
}

/// Source location attributed to a fault raised out of `pred`: the last
/// located instruction of the block, else the nearest one in an earlier
/// block.
fn nearest_loc(function: &Function, pred: Label) -> Option<SrcLoc> {
    if let Some(bb) = function.body.get(&pred) {
        if let Some(loc) = bb.instructions.iter().rev().find_map(|n| n.loc.clone()) {
            return Some(loc);
        }
    }
    function
        .body
        .range(..pred)
        .rev()
        .find_map(|(_, bb)| bb.instructions.iter().rev().find_map(|n| n.loc.clone()))
}

/// Expand the placeholder into one fault block per predecessor, each
/// calling `handler` and trapping, then delete the placeholder.
pub fn materialize(function: &mut Function, err_label: Label, handler: Uuid) {
    let preds = function.predecessors(err_label);
    if preds.is_empty() {
        function.body.remove(&err_label);
        return;
    }
    debug!(
        "materializing {} fault block(s) in {}",
        preds.len(),
        function.name
    );

    let mut next_label = function.next_available_label().0;
    let mut next_id = function.next_available_instr_id().0;
    for pred in preds {
        let loc = nearest_loc(function, pred);
        let label = Label(next_label);
        next_label += 1;
        let call = InstrNode::new(
            InstrId(next_id),
            Call {
                dest: None,
                ty: None,
                callee: Operand::Func(handler),
                args: Vec::new(),
                arg_attrs: Vec::new(),
            },
        )
        .with_loc(loc);
        next_id += 1;
        function.body.insert(
            label,
            BasicBlock {
                instructions: vec![call],
                terminator: Terminator::Trap,
            },
        );
        if let Some(pb) = function.body.get_mut(&pred) {
            pb.terminator.retarget(err_label, label);
        }
    }
    function.body.remove(&err_label);
}
