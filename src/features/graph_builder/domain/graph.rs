//! BlockDataGraph and MethodDataGraph (§3): the colorless data-flow graph
//! a method is compiled down to.

use ahash::{AHashMap, AHashSet};

use super::node::{
    flyweight_node, ArenaIndex, DataNode, FlyweightKind, GetFieldRecord, GetStaticRecord,
    Invocation, MergeNode, NodeId, Operation, PutFieldRecord, PutStaticRecord,
};
use crate::features::graph_builder::ports::MethodRef;
use crate::shared::VerificationType;

/// One basic block's worth of symbolic execution output (§3). Locals are
/// keyed by raw JVM slot index (a category-2 value's second slot is
/// simply absent, "part of a wide neighbor" per §4.1); stacks are
/// expressed bottom-to-top, matching `VerificationFrame`, so `.last()` is
/// top-of-stack.
#[derive(Debug, Clone, Default)]
pub struct BlockDataGraph {
    pub block_id: u32,
    pub produced: Vec<ArenaIndex>,
    pub entry_locals: AHashMap<u32, NodeId>,
    pub entry_stack: Vec<NodeId>,
    pub exit_locals: AHashMap<u32, NodeId>,
    pub exit_stack: Vec<NodeId>,
    pub invocations: Vec<Invocation>,
    pub get_fields: Vec<GetFieldRecord>,
    pub get_statics: Vec<GetStaticRecord>,
    pub put_fields: Vec<PutFieldRecord>,
    pub put_statics: Vec<PutStaticRecord>,
    /// Set when the block ends in a value-returning `?RETURN`.
    pub return_node: Option<NodeId>,
    /// Set when the block ends in a void `RETURN`.
    pub returns_void: bool,
}

impl BlockDataGraph {
    pub fn new(block_id: u32) -> Self {
        BlockDataGraph { block_id, ..Default::default() }
    }
}

/// A structural fingerprint of a node's subgraph that ignores arena
/// indices (§S4 supplement #4), used to compare two independently built
/// graphs "up to node identity" (§8 round-trip property). Cycles through
/// back-edges are cut with a `BackEdge` marker rather than followed
/// forever.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    Constant(String),
    Parameter(u32, String),
    Merge(Vec<Signature>),
    Bytecode(&'static str, String, Vec<Signature>),
    GetField(String, String),
    GetStatic(String, String),
    InvocationResult(String, String),
    BackEdge,
}

/// The union of a method's BlockDataGraphs plus merge nodes connecting
/// them (§3). All non-flyweight nodes live in a single per-method arena
/// so merge-node cycles across blocks need no cyclic ownership (§9).
#[derive(Debug, Clone)]
pub struct MethodDataGraph {
    pub method: MethodRef,
    arena: Vec<DataNode>,
    pub blocks: AHashMap<u32, BlockDataGraph>,
    pub parameters: Vec<NodeId>,
    pub results: Vec<NodeId>,
}

impl MethodDataGraph {
    pub fn new(method: MethodRef) -> Self {
        MethodDataGraph {
            method,
            arena: Vec::new(),
            blocks: AHashMap::default(),
            parameters: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn alloc(&mut self, node: DataNode) -> NodeId {
        let idx = self.arena.len() as ArenaIndex;
        self.arena.push(node);
        NodeId::Arena(idx)
    }

    pub fn alloc_merge(&mut self, merge: MergeNode) -> NodeId {
        self.alloc(DataNode::new("merge", merge.ty, Operation::Merge, merge.inputs))
    }

    pub fn node(&self, id: NodeId) -> &DataNode {
        match id {
            NodeId::Arena(i) => &self.arena[i as usize],
            NodeId::Flyweight(k) => flyweight_node(k),
        }
    }

    pub fn type_of(&self, id: NodeId) -> &VerificationType {
        &self.node(id).ty
    }

    pub fn block(&self, id: u32) -> Option<&BlockDataGraph> {
        self.blocks.get(&id)
    }

    /// Every node's id, in arena allocation order. Flyweight constants are
    /// excluded — they're shared, typeless-of-taint leaves that no brush
    /// ever colors (a color on the literal `int 0` would bleed into every
    /// other use of that same flyweight across the whole process).
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.arena.len() as ArenaIndex).map(NodeId::Arena)
    }

    pub fn canonical_signature(&self, id: NodeId) -> Signature {
        let mut visiting = AHashSet::default();
        self.signature_rec(id, &mut visiting)
    }

    fn signature_rec(&self, id: NodeId, visiting: &mut AHashSet<NodeId>) -> Signature {
        if !visiting.insert(id) {
            return Signature::BackEdge;
        }
        let node = self.node(id);
        let sig = match &node.op {
            Operation::Constant => Signature::Constant(node.label.clone()),
            Operation::Parameter(i) => Signature::Parameter(*i, node.ty.to_string()),
            Operation::Merge => Signature::Merge(
                node.inputs.iter().map(|i| self.signature_rec(*i, visiting)).collect(),
            ),
            Operation::Bytecode(m) => Signature::Bytecode(
                m,
                node.ty.to_string(),
                node.inputs.iter().map(|i| self.signature_rec(*i, visiting)).collect(),
            ),
            Operation::GetField(f) => {
                Signature::GetField(format!("{}.{}:{}", f.class, f.name, f.descriptor), node.ty.to_string())
            }
            Operation::GetStatic(f) => {
                Signature::GetStatic(format!("{}.{}:{}", f.class, f.name, f.descriptor), node.ty.to_string())
            }
            Operation::InvocationResult(m) => {
                Signature::InvocationResult(m.to_string(), node.ty.to_string())
            }
        };
        visiting.remove(&id);
        sig
    }
}
