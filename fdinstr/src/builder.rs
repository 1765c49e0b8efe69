//! Function builder API.
//!
//! Constructing a [`Function`] by hand means hand-allocating SSA names,
//! labels and instruction identities. The builder does that bookkeeping:
//! each emitted instruction gets a fresh [`InstrId`], value-producing
//! instructions get a fresh destination [`Name`], and blocks are closed
//! explicitly with a terminator before the next one opens.
use std::collections::BTreeMap;

use uuid::Uuid;

use crate::{
    modules::{
        BasicBlock, Function, InstrId, InstrNode, Instruction, Linkage, Param, ParamAttrs,
        control_flow::Terminator,
        global::Const,
        instructions::{
            Call, Cast, CastKind, FCmp, FCmpOp, FdInstr, ICmp, ICmpOp, MAlloca, MFieldAddr, MLoad,
            MStore, Phi,
        },
        operand::{Label, Name, Operand},
    },
    types::{TypeRegistry, Typeref},
};

pub struct FunctionBuilder<'a> {
    registry: &'a TypeRegistry,
    function: Function,
    current: Option<Label>,
    pending: Vec<InstrNode>,
    next_name: u32,
    next_label: u32,
    next_id: u32,
}

impl<'a> FunctionBuilder<'a> {
    pub fn new(registry: &'a TypeRegistry, name: impl Into<String>) -> Self {
        FunctionBuilder {
            registry,
            function: Function {
                uuid: Uuid::new_v4(),
                name: name.into(),
                demangled_name: None,
                params: Vec::new(),
                return_type: None,
                body: BTreeMap::new(),
                linkage: Linkage::External,
            },
            current: Some(Label::NIL),
            pending: Vec::new(),
            next_name: 0,
            next_label: 1,
            next_id: 0,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    pub fn demangled(mut self, name: impl Into<String>) -> Self {
        self.function.demangled_name = Some(name.into());
        self
    }

    pub fn linkage(mut self, linkage: Linkage) -> Self {
        self.function.linkage = linkage;
        self
    }

    pub fn returns(mut self, ty: Typeref) -> Self {
        self.function.return_type = Some(ty);
        self
    }

    /// Declare a parameter, returning the name bound to it.
    pub fn param(&mut self, ty: Typeref) -> Name {
        self.param_with_attrs(ty, ParamAttrs::empty())
    }

    pub fn param_with_attrs(&mut self, ty: Typeref, attrs: ParamAttrs) -> Name {
        let name = self.fresh_name();
        self.function.params.push(Param { name, ty, attrs });
        name
    }

    fn fresh_name(&mut self) -> Name {
        let name = Name(self.next_name);
        self.next_name += 1;
        name
    }

    /// Reserve a label for a block to be filled in later.
    pub fn reserve_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Start emitting into the block at `label`. The previous block must
    /// have been closed with a terminator.
    pub fn switch_to(&mut self, label: Label) {
        assert!(
            self.current.is_none(),
            "previous block was not closed with a terminator"
        );
        self.current = Some(label);
    }

    /// Append a pre-built instruction, allocating a fresh destination when
    /// the instruction produces a value. Returns that destination.
    pub fn push(&mut self, instr: impl Into<FdInstr>) -> Option<Name> {
        let mut instr = instr.into();
        let dest = instr.destination().map(|_| {
            let name = self.fresh_name();
            instr.set_destination(name);
            name
        });
        let id = InstrId(self.next_id);
        self.next_id += 1;
        self.pending.push(InstrNode::new(id, instr));
        dest
    }

    pub fn const_int(&self, value: i128, bits: u16) -> Operand {
        Operand::Imm(Const::Int {
            value,
            ty: self.registry.int(bits),
        })
    }

    pub fn load(&mut self, ty: Typeref, addr: Operand) -> Name {
        self.push(MLoad {
            dest: Name(0),
            ty,
            addr,
            alignment: None,
            ordering: None,
            volatile: false,
        })
        .unwrap()
    }

    pub fn store(&mut self, addr: Operand, value: Operand) {
        self.push(MStore {
            addr,
            value,
            alignment: None,
            ordering: None,
            volatile: false,
        });
    }

    pub fn alloca(&mut self, ty: Typeref) -> Name {
        let count = self.const_int(1, 32);
        self.push(MAlloca {
            dest: Name(0),
            dest_ty: self.registry.ptr(),
            ty,
            count,
            alignment: None,
        })
        .unwrap()
    }

    pub fn field_addr(&mut self, base_ty: Typeref, base: Operand, indices: Vec<Operand>) -> Name {
        self.push(MFieldAddr {
            dest: Name(0),
            dest_ty: self.registry.ptr(),
            base_ty,
            base,
            indices,
        })
        .unwrap()
    }

    pub fn icmp(&mut self, op: ICmpOp, ty: Typeref, lhs: Operand, rhs: Operand) -> Name {
        self.push(ICmp {
            dest: Name(0),
            dest_ty: self.registry.boolean(),
            ty,
            op,
            lhs,
            rhs,
        })
        .unwrap()
    }

    pub fn fcmp(&mut self, op: FCmpOp, ty: Typeref, lhs: Operand, rhs: Operand) -> Name {
        self.push(FCmp {
            dest: Name(0),
            dest_ty: self.registry.boolean(),
            ty,
            op,
            lhs,
            rhs,
        })
        .unwrap()
    }

    pub fn cast(&mut self, kind: CastKind, ty: Typeref, value: Operand) -> Name {
        self.push(Cast {
            dest: Name(0),
            ty,
            kind,
            value,
        })
        .unwrap()
    }

    /// Direct or indirect call. Returns the destination when `ty` is some.
    pub fn call(&mut self, ty: Option<Typeref>, callee: Operand, args: Vec<Operand>) -> Option<Name> {
        let arg_attrs = vec![ParamAttrs::empty(); args.len()];
        let dest = ty.map(|_| Name(0));
        self.push(Call {
            dest,
            ty,
            callee,
            args,
            arg_attrs,
        })
    }

    pub fn phi(&mut self, ty: Typeref, values: Vec<(Label, Operand)>) -> Name {
        self.push(Phi {
            dest: Name(0),
            ty,
            values,
        })
        .unwrap()
    }

    fn close(&mut self, terminator: Terminator) {
        let label = self
            .current
            .take()
            .expect("no block is open; call switch_to first");
        let instructions = std::mem::take(&mut self.pending);
        self.function.body.insert(
            label,
            BasicBlock {
                instructions,
                terminator,
            },
        );
    }

    pub fn ret(&mut self, value: Option<Operand>) {
        self.close(Terminator::Ret { value });
    }

    pub fn jump(&mut self, target: Label) {
        self.close(Terminator::Jump { target });
    }

    pub fn cbranch(&mut self, condition: Operand, then_target: Label, else_target: Label) {
        self.close(Terminator::CBranch {
            condition,
            then_target,
            else_target,
        });
    }

    pub fn trap(&mut self) {
        self.close(Terminator::Trap);
    }

    /// Finish the function. Panics if a block is still open.
    pub fn finish(self) -> Function {
        assert!(
            self.current.is_none(),
            "open block was not closed with a terminator"
        );
        self.function
    }
}
