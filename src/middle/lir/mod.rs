//! LIR (Low-level Intermediate Representation). In this form loops and
//! conditionals are simplified to labels and branches, and expression trees are
//! flattened into a linked stream of nodes where every value is produced by
//! exactly one node and referenced by that node's [`NodeId`].

use std::collections::BTreeMap;

use crate::{
    index::simple_index,
    middle::{
        hir::{BinaryOp, CompareOp, UnaryOp},
        ty::{ModifiedType, SignatureId, TypeId},
    },
    span::Span,
};

pub mod body;
pub mod hir_lowering;
pub mod pretty_print;

pub use body::Body;
pub use crate::middle::hir::Literal;

simple_index! {
    /// Identifies a node in a [`Body`]. Also names the value the node produces.
    pub struct NodeId;
}

simple_index! {
    /// Identifies a label within a method
    pub struct LabelId;
}

simple_index! {
    /// Identifies a local variable, parameter or temporary of a method
    pub struct VariableId;
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Type of the produced value, `None` for nodes which produce nothing
    pub ty: Option<ModifiedType>,
    /// Span of the innermost statement the node was lowered from
    pub span: Span,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    /// Cleared once the node is unlinked from the stream
    pub linked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Literal(Literal),
    Load(Place),
    Store {
        place: Place,
        value: NodeId,
        /// First store to a place nothing could have written yet, e.g. the
        /// elements of a nested array while it is being allocated
        initializing: bool,
    },
    Unary {
        operator: UnaryOp,
        operand: NodeId,
    },
    Binary {
        operator: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Compare {
        operator: CompareOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// Conversion to the type of the node
    Cast {
        value: NodeId,
    },
    Call {
        signature: SignatureId,
        receiver: NodeId,
        arguments: Vec<NodeId>,
        kind: CallKind,
    },
    /// Several values carried as one operand, e.g. multiple return values.
    /// Typed with a sequence type.
    Sequence(Vec<NodeId>),
    Branch(Branch),
    Label(LabelId),
    /// Selects a value of `variable` depending on the predecessor block
    /// control arrived from. `incoming` is filled by phi placement.
    Phi {
        label: LabelId,
        variable: VariableId,
        incoming: BTreeMap<LabelId, NodeId>,
    },
    Return {
        value: Option<NodeId>,
        /// Added because control fell off the end of the method
        implicit: bool,
    },
    Throw {
        exception: NodeId,
    },
    Allocate {
        class: TypeId,
    },
    /// Array of the node's type with one size per dimension
    AllocateArray {
        sizes: Vec<NodeId>,
    },
    Length {
        array: NodeId,
    },
    /// The exception caught on entry to a handler
    LandingPad,
    /// Runs a finally continuation, then resumes at `resume`. Without a resume
    /// label the continuation leaves the method.
    EnterFinally {
        continuation: usize,
        resume: Option<LabelId>,
    },
    /// Returns from a finally continuation to one of the places it was
    /// entered from
    ExitFinally {
        targets: Vec<LabelId>,
    },
    /// Counts a new holder of `value`. On a sequence this applies to each of
    /// its reference elements, and a null is left alone.
    Increment {
        value: NodeId,
    },
    Decrement {
        value: NodeId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Normal,
    /// `this(...)` from a create
    Delegate,
    /// `super(...)` from a create
    Super,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Branch {
    Unconditional(LabelId),
    Conditional {
        condition: NodeId,
        on_true: LabelId,
        on_false: LabelId,
    },
    Indirect {
        address: NodeId,
        targets: Vec<LabelId>,
    },
}

impl Branch {
    pub fn targets(&self) -> Vec<LabelId> {
        match self {
            Branch::Unconditional(target) => vec![*target],
            Branch::Conditional {
                on_true, on_false, ..
            } => vec![*on_true, *on_false],
            Branch::Indirect { targets, .. } => targets.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Local(VariableId),
    Field { object: NodeId, name: String },
    /// An element of an array. Nested array levels are addressed by a single
    /// flattened index.
    Element { array: NodeId, indices: Vec<NodeId> },
    Constant { owner: TypeId, name: String },
}

impl Place {
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Place::Local(_) | Place::Constant { .. } => Vec::new(),
            Place::Field { object, .. } => vec![*object],
            Place::Element { array, indices } => {
                let mut operands = vec![*array];
                operands.extend(indices.iter().copied());
                operands
            }
        }
    }

    fn operands_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            Place::Local(_) | Place::Constant { .. } => Vec::new(),
            Place::Field { object, .. } => vec![object],
            Place::Element { array, indices } => {
                let mut operands = vec![array];
                operands.extend(indices.iter_mut());
                operands
            }
        }
    }
}

impl NodeKind {
    /// Whether the node ends a basic block
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            NodeKind::Branch(_)
                | NodeKind::Return { .. }
                | NodeKind::Throw { .. }
                | NodeKind::EnterFinally { .. }
                | NodeKind::ExitFinally { .. }
        )
    }

    /// Labels control can continue at after this node, when it is a terminator
    pub fn successors(&self) -> Vec<LabelId> {
        match self {
            NodeKind::Branch(branch) => branch.targets(),
            NodeKind::EnterFinally { resume, .. } => resume.iter().copied().collect(),
            NodeKind::ExitFinally { targets } => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Values this node consumes, in evaluation order
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Literal(_)
            | NodeKind::Label(_)
            | NodeKind::Allocate { .. }
            | NodeKind::LandingPad
            | NodeKind::EnterFinally { .. }
            | NodeKind::ExitFinally { .. } => Vec::new(),
            NodeKind::Load(place) => place.operands(),
            NodeKind::Store { place, value, .. } => {
                let mut operands = place.operands();
                operands.push(*value);
                operands
            }
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::Binary { lhs, rhs, .. } | NodeKind::Compare { lhs, rhs, .. } => {
                vec![*lhs, *rhs]
            }
            NodeKind::Cast { value }
            | NodeKind::Increment { value }
            | NodeKind::Decrement { value } => vec![*value],
            NodeKind::Call {
                receiver,
                arguments,
                ..
            } => {
                let mut operands = vec![*receiver];
                operands.extend(arguments.iter().copied());
                operands
            }
            NodeKind::Sequence(values) => values.clone(),
            NodeKind::AllocateArray { sizes } => sizes.clone(),
            NodeKind::Branch(Branch::Conditional { condition, .. }) => vec![*condition],
            NodeKind::Branch(Branch::Indirect { address, .. }) => vec![*address],
            NodeKind::Branch(Branch::Unconditional(_)) => Vec::new(),
            NodeKind::Phi { incoming, .. } => incoming.values().copied().collect(),
            NodeKind::Return { value, .. } => value.iter().copied().collect(),
            NodeKind::Throw { exception } => vec![*exception],
            NodeKind::Length { array } => vec![*array],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            NodeKind::Literal(_)
            | NodeKind::Label(_)
            | NodeKind::Allocate { .. }
            | NodeKind::LandingPad
            | NodeKind::EnterFinally { .. }
            | NodeKind::ExitFinally { .. }
            | NodeKind::Branch(Branch::Unconditional(_)) => Vec::new(),
            NodeKind::Load(place) => place.operands_mut(),
            NodeKind::Store { place, value, .. } => {
                let mut operands = place.operands_mut();
                operands.push(value);
                operands
            }
            NodeKind::Unary { operand, .. } => vec![operand],
            NodeKind::Binary { lhs, rhs, .. } | NodeKind::Compare { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            NodeKind::Cast { value }
            | NodeKind::Increment { value }
            | NodeKind::Decrement { value } => vec![value],
            NodeKind::Call {
                receiver,
                arguments,
                ..
            } => {
                let mut operands = vec![receiver];
                operands.extend(arguments.iter_mut());
                operands
            }
            NodeKind::Sequence(values) | NodeKind::AllocateArray { sizes: values } => {
                values.iter_mut().collect()
            }
            NodeKind::Branch(Branch::Conditional { condition, .. }) => vec![condition],
            NodeKind::Branch(Branch::Indirect { address, .. }) => vec![address],
            NodeKind::Phi { incoming, .. } => incoming.values_mut().collect(),
            NodeKind::Return { value, .. } => value.iter_mut().collect(),
            NodeKind::Throw { exception } => vec![exception],
            NodeKind::Length { array } => vec![array],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Label {
    /// The label node, once defined
    pub node: Option<NodeId>,
    /// Branch registry filled during lowering. For every predecessor label
    /// whose block branches here, the last value stored to each threaded
    /// variable in that block. Variables missing from the inner map hold
    /// whatever reached the predecessor's own label.
    pub incoming: BTreeMap<LabelId, BTreeMap<VariableId, NodeId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    This,
    Parameter,
    Local,
    /// Introduced by lowering, e.g. the merge variable of a conditional
    Temporary,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: ModifiedType,
    pub kind: VariableKind,
    /// Primitive locals and temporaries. Their loads are resolved to values by
    /// phi placement instead of going through memory.
    pub threaded: bool,
    /// Reference typed locals, temporaries and parameters other than `this`
    pub reference_counted: bool,
}
