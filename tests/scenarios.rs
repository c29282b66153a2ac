//! End-to-end scenarios against a hand-built fixture resolver, exercising
//! the full `analyze()` pipeline (L1 graph build, L2 brush fixpoint, L3
//! interprocedural worklist) the way a caller outside this crate would.
//!
//! Each fixture method is a minimal synthetic bytecode body: just enough
//! instructions to exercise the scenario, not a realistic compiled class.
//! Operand-bearing opcodes that the interpreter actually decodes
//! (BIPUSH/SIPUSH/LDC/wide xLOAD/xSTORE/IINC/NEW/ANEWARRAY/CHECKCAST) are
//! avoided throughout; every call site and field access is instead
//! resolved by `(method, offset)` lookup on the fixture resolver, so
//! instruction `operands` never need real constant-pool bytes.

use std::sync::Mutex;

use ahash::AHashMap;
use taintgraph::config::EngineConfig;
use taintgraph::errors::{EngineError, Result};
use taintgraph::features::coloring::domain::{ColorTag, TraceItem};
use taintgraph::features::coloring::ports::{IntersectionSink, MethodRules, RuleProvider};
use taintgraph::features::graph_builder::ports::{
    BasicBlockInfo, ClassResolver, CodeIterator, ControlFlowAnalyzer, FieldRef, Instruction,
    LdcConstant, MethodBody, MethodRef, Verifier, VerificationFrame,
};
use taintgraph::shared::VerificationType;

// Mirrors the subset of `graph_builder::infrastructure`'s private opcode
// table this suite's fixtures need; that table isn't part of the crate's
// public surface, so integration tests can't reach it directly.
mod opcode {
    pub const ILOAD_0: u8 = 0x1a;
    pub const ALOAD_0: u8 = 0x2a;
    pub const ALOAD_1: u8 = 0x2b;
    pub const ALOAD_2: u8 = 0x2c;
    pub const ALOAD_3: u8 = 0x2d;
    pub const IFEQ: u8 = 0x99;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEDYNAMIC: u8 = 0xba;
}

fn instr(offset: u32, opcode: u8) -> Instruction {
    Instruction { offset, opcode, operands: vec![] }
}

fn frame_of_depth(depth: usize) -> VerificationFrame {
    VerificationFrame { locals: vec![], stack: vec![VerificationType::Top; depth] }
}

struct MethodFixture {
    is_static: bool,
    param_types: Vec<VerificationType>,
    return_type: Option<VerificationType>,
    instructions: Vec<Instruction>,
    frames: AHashMap<u32, VerificationFrame>,
    blocks: Vec<BasicBlockInfo>,
    entry_block: u32,
    methodrefs: AHashMap<u32, (MethodRef, bool)>,
    invokedynamics: AHashMap<u32, (String, String)>,
}

impl CodeIterator for MethodFixture {
    fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl Verifier for MethodFixture {
    fn frame_at(&self, offset: u32) -> Option<&VerificationFrame> {
        self.frames.get(&offset)
    }
}

impl ControlFlowAnalyzer for MethodFixture {
    fn blocks(&self) -> &[BasicBlockInfo] {
        &self.blocks
    }

    fn entry_block(&self) -> u32 {
        self.entry_block
    }
}

/// A `ClassResolver` backed entirely by in-memory fixtures, plus a table
/// of method-level rules for the `RuleProvider` side of the same scenario.
#[derive(Default)]
struct FixtureResolver {
    methods: AHashMap<MethodRef, MethodFixture>,
    rules: AHashMap<MethodRef, MethodRules>,
}

impl FixtureResolver {
    fn with_method(mut self, method: MethodRef, fixture: MethodFixture) -> Self {
        self.methods.insert(method, fixture);
        self
    }

    fn with_rule(mut self, method: MethodRef, rule: MethodRules) -> Self {
        self.rules.insert(method, rule);
        self
    }
}

impl ClassResolver for FixtureResolver {
    fn load_class(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn get_field(&self, _class: &str, _name: &str, _descriptor: &str) -> Result<FieldRef> {
        Err(EngineError::ClassNotFound("fixture resolver has no fields".into()))
    }

    fn get_method(&self, class: &str, name: &str, descriptor: &str) -> Result<MethodRef> {
        Ok(MethodRef { class: class.to_string(), name: name.to_string(), descriptor: descriptor.to_string() })
    }

    fn get_constructor(&self, _class: &str, _descriptor: &str) -> Result<MethodRef> {
        Err(EngineError::ClassNotFound("fixture resolver has no constructors".into()))
    }

    fn ldc_constant(&self, method: &MethodRef, _pool_index: u16) -> Result<LdcConstant> {
        Err(EngineError::bad_bytecode(method.to_string(), "fixture resolver has no constant pool"))
    }

    fn fieldref_at(&self, method: &MethodRef, offset: u32) -> Result<FieldRef> {
        Err(EngineError::bad_bytecode(method.to_string(), format!("no field ref fixture at offset {offset}")))
    }

    fn methodref_at(&self, method: &MethodRef, offset: u32) -> Result<(MethodRef, bool)> {
        self.methods
            .get(method)
            .and_then(|f| f.methodrefs.get(&offset))
            .cloned()
            .ok_or_else(|| EngineError::bad_bytecode(method.to_string(), format!("no methodref fixture at offset {offset}")))
    }

    fn invokedynamic_at(&self, method: &MethodRef, offset: u32) -> Result<(String, String)> {
        self.methods
            .get(method)
            .and_then(|f| f.invokedynamics.get(&offset))
            .cloned()
            .ok_or_else(|| EngineError::bad_bytecode(method.to_string(), format!("no invokedynamic fixture at offset {offset}")))
    }

    fn method_body<'a>(&'a self, method: &MethodRef) -> Result<Option<MethodBody<'a>>> {
        let Some(fixture) = self.methods.get(method) else { return Ok(None) };
        Ok(Some(MethodBody {
            method: method.clone(),
            is_static: fixture.is_static,
            param_types: fixture.param_types.clone(),
            return_type: fixture.return_type.clone(),
            code: fixture,
            verifier: fixture,
            cfg: fixture,
        }))
    }
}

impl RuleProvider for FixtureResolver {
    fn method_rules(&self, class: &str, name: &str, descriptor: &str) -> Option<MethodRules> {
        self.rules.get(&MethodRef { class: class.to_string(), name: name.to_string(), descriptor: descriptor.to_string() }).cloned()
    }

    fn field_rules(&self, _class: &str, _name: &str) -> Option<ColorTag> {
        None
    }
}

#[derive(Default)]
struct RecordingSink {
    hits: Mutex<Vec<(String, String)>>,
}

impl IntersectionSink for RecordingSink {
    fn on_source_sink_intersection(&self, source_trace: &TraceItem, sink_trace: &TraceItem) {
        self.hits.lock().unwrap().push((source_trace.to_string(), sink_trace.to_string()));
    }
}

fn method_ref(class: &str, name: &str, descriptor: &str) -> MethodRef {
    MethodRef { class: class.into(), name: name.into(), descriptor: descriptor.into() }
}

fn object_type() -> VerificationType {
    VerificationType::Reference("java/lang/Object".to_string())
}

fn single_block(end_offset: u32) -> Vec<BasicBlockInfo> {
    vec![BasicBlockInfo { id: 0, start_offset: 0, end_offset, predecessors: vec![], successors: vec![] }]
}

/// `append(this, buffer, a, b)`, `void`. No real appending happens (the
/// coloring engine never looks at a method's bytecode to decide its own
/// parameter colors — only `MethodParameterImplicitColorer`'s rule lookup
/// does), so the body is just `return`.
#[test]
fn scenario_append_stamps_declared_source_parameters() {
    let target = method_ref("Append", "append", "(Ljava/lang/Object;Ljava/lang/Object;Ljava/lang/Object;)V");
    let fixture = MethodFixture {
        is_static: false,
        param_types: vec![object_type(), object_type(), object_type()],
        return_type: None,
        instructions: vec![instr(0, opcode::RETURN)],
        frames: [(0, frame_of_depth(0))].into_iter().collect(),
        blocks: single_block(1),
        entry_block: 0,
        methodrefs: AHashMap::default(),
        invokedynamics: AHashMap::default(),
    };
    let rule = MethodRules { param_colors: vec![None, Some(ColorTag::SourceData), Some(ColorTag::SourceData)], result_color: None };
    let resolver = FixtureResolver::default().with_method(target.clone(), fixture).with_rule(target.clone(), rule);
    let sink = RecordingSink::default();
    let config = EngineConfig::default();

    let (ins, outs) = taintgraph::analyze(&resolver, &resolver, &sink, &config, &target, vec![None; 4], vec![])
        .expect("analyze must not error")
        .expect("append has a non-empty body");

    assert!(ins[0].is_empty(), "receiver carries no color");
    assert!(ins[1].is_empty(), "buffer has no declared rule");
    assert_eq!(ins[2].by_class.values().next().unwrap().color, ColorTag::SourceData);
    assert_eq!(ins[3].by_class.values().next().unwrap().color, ColorTag::SourceData);
    assert!(outs.is_empty(), "void methods produce outs = []");
    assert!(sink.hits.lock().unwrap().is_empty());
}

/// `concatenate(this, unused, a, b)` returning the `invokedynamic`-style
/// join of `a` and `b` (how modern string concatenation actually
/// compiles), so the result inherits the LUB of its two inputs'
/// colorings via `InvokeDynamicBrush`.
#[test]
fn scenario_concatenation_joins_both_inputs_into_the_result() {
    use opcode::*;
    let target = method_ref("Concat", "concatenate", "(Ljava/lang/Object;Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;");
    let fixture = MethodFixture {
        is_static: false,
        param_types: vec![object_type(), object_type(), object_type()],
        return_type: Some(object_type()),
        instructions: vec![instr(0, ALOAD_2), instr(1, ALOAD_3), instr(2, INVOKEDYNAMIC), instr(3, ARETURN)],
        frames: [(0, frame_of_depth(0)), (1, frame_of_depth(1)), (2, frame_of_depth(2)), (3, frame_of_depth(1))].into_iter().collect(),
        blocks: single_block(4),
        entry_block: 0,
        methodrefs: AHashMap::default(),
        invokedynamics: [(2, ("makeConcat".to_string(), "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;".to_string()))]
            .into_iter()
            .collect(),
    };
    let rule = MethodRules { param_colors: vec![None, Some(ColorTag::SourceData), Some(ColorTag::SourceData)], result_color: None };
    let resolver = FixtureResolver::default().with_method(target.clone(), fixture).with_rule(target.clone(), rule);
    let sink = RecordingSink::default();
    let config = EngineConfig::default();

    let (ins, outs) = taintgraph::analyze(&resolver, &resolver, &sink, &config, &target, vec![None; 4], vec![None])
        .unwrap()
        .unwrap();

    assert!(ins[1].is_empty());
    assert_eq!(ins[2].by_class.values().next().unwrap().color, ColorTag::SourceData);
    assert_eq!(ins[3].by_class.values().next().unwrap().color, ColorTag::SourceData);
    assert_eq!(outs[0].by_class.values().next().unwrap().color, ColorTag::SourceData);
}

/// `prepareStatement(this, sql, unused, tainted)` forwards `tainted` into
/// a declared-sink static method and returns the unrelated `sql`
/// parameter untouched. The sink's own parameter is colored
/// `SinkTarget` via that method's `MethodParameterImplicitColorer`
/// pass; `resolve_callee` folding that cached result back into the
/// caller is what raises the intersection — not the call site's own
/// `InvocationsImplicitColorer` stamp.
#[test]
fn scenario_prepare_statement_detects_source_sink_intersection() {
    use opcode::*;

    let executor = method_ref("Executor", "execute", "(Ljava/lang/Object;)V");
    let executor_fixture = MethodFixture {
        is_static: true,
        param_types: vec![object_type()],
        return_type: None,
        instructions: vec![instr(0, RETURN)],
        frames: [(0, frame_of_depth(0))].into_iter().collect(),
        blocks: single_block(1),
        entry_block: 0,
        methodrefs: AHashMap::default(),
        invokedynamics: AHashMap::default(),
    };
    let executor_rule = MethodRules { param_colors: vec![Some(ColorTag::SinkTarget)], result_color: None };

    let target = method_ref("PrepareStatement", "prepareStatement", "(Ljava/lang/Object;Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;");
    let fixture = MethodFixture {
        is_static: false,
        param_types: vec![object_type(), object_type(), object_type()],
        return_type: Some(object_type()),
        instructions: vec![instr(0, ALOAD_3), instr(1, INVOKESTATIC), instr(2, ALOAD_1), instr(3, ARETURN)],
        frames: [(0, frame_of_depth(0)), (1, frame_of_depth(1)), (2, frame_of_depth(0)), (3, frame_of_depth(1))].into_iter().collect(),
        blocks: single_block(4),
        entry_block: 0,
        methodrefs: [(1, (executor.clone(), true))].into_iter().collect(),
        invokedynamics: AHashMap::default(),
    };

    let resolver = FixtureResolver::default()
        .with_method(executor.clone(), executor_fixture)
        .with_rule(executor.clone(), executor_rule)
        .with_method(target.clone(), fixture);
    let sink = RecordingSink::default();
    let config = EngineConfig::default();

    let ins_seed = vec![None, None, None, Some(ColorTag::SourceData)];
    let (ins, outs) = taintgraph::analyze(&resolver, &resolver, &sink, &config, &target, ins_seed, vec![None]).unwrap().unwrap();

    assert!(ins[1].is_empty(), "the sql parameter is unused");
    assert!(ins[2].is_empty(), "the second unused parameter stays uncolored");
    assert_eq!(ins[3].by_class.values().next().unwrap().color, ColorTag::SourceData, "the seed survives the collision (tie keeps the caller's side)");
    assert!(outs[0].is_empty(), "the returned sql parameter carries no color");

    let hits = sink.hits.lock().unwrap();
    assert_eq!(hits.len(), 1);
}

/// `identity(x) { return x; }`, static — no receiver slot.
#[test]
fn scenario_identity_preserves_the_seed() {
    use opcode::*;
    let target = method_ref("Identity", "identity", "(Ljava/lang/Object;)Ljava/lang/Object;");
    let fixture = MethodFixture {
        is_static: true,
        param_types: vec![object_type()],
        return_type: Some(object_type()),
        instructions: vec![instr(0, ALOAD_0), instr(1, ARETURN)],
        frames: [(0, frame_of_depth(0)), (1, frame_of_depth(1))].into_iter().collect(),
        blocks: single_block(2),
        entry_block: 0,
        methodrefs: AHashMap::default(),
        invokedynamics: AHashMap::default(),
    };
    let resolver = FixtureResolver::default().with_method(target.clone(), fixture);
    let sink = RecordingSink::default();
    let config = EngineConfig::default();

    let (_, outs) =
        taintgraph::analyze(&resolver, &resolver, &sink, &config, &target, vec![Some(ColorTag::SourceData)], vec![None]).unwrap().unwrap();
    assert_eq!(outs[0].by_class.values().next().unwrap().color, ColorTag::SourceData);

    let (_, outs_null) = taintgraph::analyze(&resolver, &resolver, &sink, &config, &target, vec![None], vec![None]).unwrap().unwrap();
    assert!(outs_null[0].is_empty());
}

/// `branchMerge(c, a, b) { if (c) return a; else return b; }`, static.
/// The two `ARETURN`s feed a single merge node at the method's result;
/// `CompositionNodeBrush` treats a merge like any other composing node.
#[test]
fn scenario_branch_merge_lubs_both_arms() {
    use opcode::*;
    let target = method_ref("Branch", "branchMerge", "(ILjava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;");
    let fixture = MethodFixture {
        is_static: true,
        param_types: vec![VerificationType::IntLike, object_type(), object_type()],
        return_type: Some(object_type()),
        instructions: vec![
            instr(0, ILOAD_0),
            instr(1, IFEQ),
            instr(2, ALOAD_1),
            instr(3, ARETURN),
            instr(4, ALOAD_2),
            instr(5, ARETURN),
        ],
        frames: [
            (0, frame_of_depth(0)),
            (1, frame_of_depth(1)),
            (2, frame_of_depth(0)),
            (3, frame_of_depth(1)),
            (4, frame_of_depth(0)),
            (5, frame_of_depth(1)),
        ]
        .into_iter()
        .collect(),
        blocks: vec![
            BasicBlockInfo { id: 0, start_offset: 0, end_offset: 2, predecessors: vec![], successors: vec![1, 2] },
            BasicBlockInfo { id: 1, start_offset: 2, end_offset: 4, predecessors: vec![0], successors: vec![] },
            BasicBlockInfo { id: 2, start_offset: 4, end_offset: 6, predecessors: vec![0], successors: vec![] },
        ],
        entry_block: 0,
        methodrefs: AHashMap::default(),
        invokedynamics: AHashMap::default(),
    };
    let resolver = FixtureResolver::default().with_method(target.clone(), fixture);
    let sink = RecordingSink::default();
    let config = EngineConfig::default();

    let ins = vec![None, Some(ColorTag::SourceData), None];
    let (_, outs) = taintgraph::analyze(&resolver, &resolver, &sink, &config, &target, ins, vec![None]).unwrap().unwrap();
    assert_eq!(outs[0].by_class.values().next().unwrap().color, ColorTag::SourceData);
}

/// Mutually recursive `f -> g -> f`, neither side declaring a source or
/// sink. The worklist must still terminate (§8 "painting worklist
/// terminates for any finite program"): the ping-pong dependency settles
/// once each task has a cached, unchanging result, after which the
/// freshness check in `queue` stops re-queueing.
#[test]
fn scenario_recursive_terminates_with_no_intersections() {
    use opcode::*;
    let f = method_ref("Recursive", "f", "(Ljava/lang/Object;)Ljava/lang/Object;");
    let g = method_ref("Recursive", "g", "(Ljava/lang/Object;)Ljava/lang/Object;");

    let body = |callee: MethodRef| MethodFixture {
        is_static: true,
        param_types: vec![object_type()],
        return_type: Some(object_type()),
        instructions: vec![instr(0, ALOAD_0), instr(1, INVOKESTATIC), instr(2, ARETURN)],
        frames: [(0, frame_of_depth(0)), (1, frame_of_depth(1)), (2, frame_of_depth(1))].into_iter().collect(),
        blocks: single_block(3),
        entry_block: 0,
        methodrefs: [(1, (callee, true))].into_iter().collect(),
        invokedynamics: AHashMap::default(),
    };

    let resolver = FixtureResolver::default().with_method(f.clone(), body(g.clone())).with_method(g.clone(), body(f.clone()));
    let sink = RecordingSink::default();
    let mut config = EngineConfig::default();
    config.task_execution_cap = 16;

    let (ins, outs) = taintgraph::analyze(&resolver, &resolver, &sink, &config, &f, vec![None], vec![None]).unwrap().unwrap();
    assert!(ins[0].is_empty());
    assert!(outs[0].is_empty());
    assert!(sink.hits.lock().unwrap().is_empty());
}
