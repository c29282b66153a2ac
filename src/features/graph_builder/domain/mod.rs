//! Colorless data-flow graph types (§3): DataNode and its arena, the
//! call/field-access records, and the per-block and per-method graphs.

mod graph;
mod node;

pub use graph::{BlockDataGraph, MethodDataGraph, Signature};
pub use node::{
    flyweight_node, ArenaIndex, DataNode, FlyweightKind, GetFieldRecord, GetStaticRecord,
    Invocation, MergeNode, NodeId, Operation, PutFieldRecord, PutStaticRecord,
};
