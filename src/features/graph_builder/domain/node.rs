//! DataNode and the small zoo of record types around it (§3). Nodes are
//! allocated in a per-method arena and referenced by index rather than by
//! pointer/Rc, so that merge nodes can form cycles across blocks without
//! any cyclic ownership (§9 "Graph cycles across blocks").

use once_cell::sync::Lazy;

use crate::features::graph_builder::ports::{FieldRef, MethodRef};
use crate::shared::VerificationType;

/// Index of a node within one `MethodDataGraph`'s arena.
pub type ArenaIndex = u32;

/// A reference to a DataNode: either local to the owning method's arena,
/// or one of the immutable process-wide flyweight constants (§9
/// "Flyweight constants"), which have no owning arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Arena(ArenaIndex),
    Flyweight(FlyweightKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlyweightKind {
    /// `int 0..5` inclusive.
    IntConst(u8),
    LongConst0,
    LongConst1,
    Null,
}

/// The operation tag identifying the bytecode that produced a node, or a
/// synthetic tag for constants/merges/parameters (§9 "Polymorphism over
/// node kinds" — a tagged variant replaces the source's subclass tree).
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Parameter(u32),
    Constant,
    Merge,
    /// A real opcode mnemonic that composes its inputs into a new value
    /// (arithmetic, array load, `NEW`/`NEWARRAY`, `ATHROW`, `IINC`, a
    /// narrowing conversion, `INSTANCEOF`) or passes one input through
    /// unchanged for coloring purposes (`CHECKCAST`, a widening
    /// conversion). `is_identity()` tells brushes which.
    Bytecode(&'static str),
    GetField(FieldRef),
    GetStatic(FieldRef),
    /// The result value of an `INVOKE*` instruction, if the descriptor's
    /// return type is not void. The full call record lives separately as
    /// an `Invocation` on the owning `BlockDataGraph`.
    InvocationResult(MethodRef),
}

impl Operation {
    /// Mnemonics that are identity pass-through for coloring purposes
    /// (§4.4 CopierBrush): `CHECKCAST` and the widening numeric
    /// conversions. Narrowing conversions (`I2B`, `I2S`, `I2C`, `D2I`, …)
    /// are composition nodes instead — precision loss is not an identity.
    pub fn is_identity(&self) -> bool {
        matches!(
            self,
            Operation::Bytecode(
                "CHECKCAST" | "I2L" | "I2F" | "I2D" | "F2D" | "L2D"
            )
        )
    }

    pub fn is_composition(&self) -> bool {
        matches!(self, Operation::Bytecode(_)) && !self.is_identity()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataNode {
    pub label: String,
    pub ty: VerificationType,
    pub op: Operation,
    pub inputs: Vec<NodeId>,
}

impl DataNode {
    pub fn new(label: impl Into<String>, ty: VerificationType, op: Operation, inputs: Vec<NodeId>) -> Self {
        DataNode { label: label.into(), ty, op, inputs }
    }
}

/// A synthetic DataNode at a control-flow join (§4.2): one per (slot,
/// target-block) where predecessors disagree. `inputs` are the
/// corresponding outgoing nodes from each predecessor, in predecessor
/// order, so `inputs.len() == predecessors.len()` is an invariant (§8).
#[derive(Debug, Clone, PartialEq)]
pub struct MergeNode {
    pub ty: VerificationType,
    pub inputs: Vec<NodeId>,
}

/// Record of a call site (§3). Static calls have no receiver in
/// `parameters[0]`; virtual/special/interface calls do.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub target: MethodRef,
    pub parameters: Vec<NodeId>,
    pub result: Option<NodeId>,
    pub is_static: bool,
    /// Set for `INVOKEDYNAMIC` call sites, which carry a name-and-type but
    /// no declaring class to resolve a concrete callee against (§4.4
    /// InvokeDynamicBrush never calls `resolve_callee` for these).
    pub is_dynamic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetFieldRecord {
    pub field: FieldRef,
    pub receiver: NodeId,
    pub result: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetStaticRecord {
    pub field: FieldRef,
    pub result: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutFieldRecord {
    pub field: FieldRef,
    pub receiver: NodeId,
    pub value: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PutStaticRecord {
    pub field: FieldRef,
    pub value: NodeId,
}

fn flyweight_table() -> &'static Lazy<Vec<(FlyweightKind, DataNode)>> {
    static TABLE: Lazy<Vec<(FlyweightKind, DataNode)>> = Lazy::new(|| {
        let mut table = Vec::new();
        for v in 0..=5u8 {
            table.push((
                FlyweightKind::IntConst(v),
                DataNode::new(format!("int {v}"), VerificationType::IntLike, Operation::Constant, vec![]),
            ));
        }
        table.push((
            FlyweightKind::LongConst0,
            DataNode::new("long 0", VerificationType::Long, Operation::Constant, vec![]),
        ));
        table.push((
            FlyweightKind::LongConst1,
            DataNode::new("long 1", VerificationType::Long, Operation::Constant, vec![]),
        ));
        table.push((
            FlyweightKind::Null,
            DataNode::new("null", VerificationType::Null, Operation::Constant, vec![]),
        ));
        table
    });
    &TABLE
}

/// Look up the shared immutable node for a flyweight constant. Panics on
/// an out-of-range `IntConst` (callers only construct these from literal
/// opcode handlers for 0..=5, never from untrusted input).
pub fn flyweight_node(kind: FlyweightKind) -> &'static DataNode {
    flyweight_table()
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, node)| node)
        .expect("flyweight constant out of range")
}
