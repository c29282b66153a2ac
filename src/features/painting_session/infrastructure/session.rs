//! The interprocedural worklist (§4.5, §5): one `PaintingTask` per
//! `(method, ins, outs)` key, driven to a fixpoint by a pool of parallel
//! workers that repeatedly drain and process whatever is currently
//! queued. Polling-based rather than work-stealing (the whole worklist is
//! drained into a batch, processed with `rayon`, and any newly queued
//! work starts the next round) — the same shape as this codebase's other
//! Mutex-worklist-plus-rayon-batch solvers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::{AHashMap, AHashSet};
use dashmap::DashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{error, warn};

use crate::config::{EngineConfig, MergeVariant};
use crate::errors::{EngineError, Result};
use crate::features::coloring::domain::{merge_lub, merge_most_dangerous, ColorTag, ColoredObject, Intersection};
use crate::features::coloring::infrastructure::color;
use crate::features::coloring::ports::{CalleeResolver, IntersectionSink, RuleProvider};
use crate::features::graph_builder::domain::{Invocation, MethodDataGraph, NodeId};
use crate::features::graph_builder::infrastructure::build_method_data_graph;
use crate::features::graph_builder::ports::{ClassResolver, MethodRef};
use crate::features::painting_session::domain::{PaintingResult, PaintingTask, TaskKey, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueReason {
    Initial,
    NewDependency,
    DependencyUpdate,
}

/// Owns all state for one analysis run: the task table, the colorless
/// graph cache (graphs don't depend on `ins`/`outs`, only on the method,
/// so they're cached independently of tasks), and the worklist.
pub struct PaintingSession<'a> {
    resolver: &'a dyn ClassResolver,
    rule_provider: &'a dyn RuleProvider,
    intersection_sink: &'a dyn IntersectionSink,
    config: &'a EngineConfig,
    tasks: DashMap<TaskKey, std::sync::Arc<PaintingTask>>,
    graphs: DashMap<MethodRef, Option<std::sync::Arc<MethodDataGraph>>>,
    heap_version: AtomicU64,
    worklist: Mutex<VecDeque<TaskKey>>,
}

impl<'a> PaintingSession<'a> {
    pub fn new(
        resolver: &'a dyn ClassResolver,
        rule_provider: &'a dyn RuleProvider,
        intersection_sink: &'a dyn IntersectionSink,
        config: &'a EngineConfig,
    ) -> Self {
        PaintingSession {
            resolver,
            rule_provider,
            intersection_sink,
            config,
            tasks: DashMap::new(),
            graphs: DashMap::new(),
            heap_version: AtomicU64::new(0),
            worklist: Mutex::new(VecDeque::new()),
        }
    }

    /// Runs the whole method's interprocedural analysis from `entry`,
    /// seeded with `ins`/`outs`, and returns the entry task's final
    /// result once the worklist drains (§4.5 "Termination").
    pub fn analyze(
        &self,
        entry: &MethodRef,
        ins: Vec<Option<ColorTag>>,
        outs: Vec<Option<ColorTag>>,
    ) -> Result<PaintingResult> {
        let key = TaskKey::new(entry.clone(), ins, outs);
        self.queue(key.clone(), QueueReason::Initial);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count())
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        pool.install(|| self.drain());

        self.tasks
            .get(&key)
            .and_then(|t| t.result())
            .ok_or_else(|| EngineError::bad_bytecode(entry.to_string(), "entry method produced no analysis result"))
    }

    fn get_or_create_task(&self, key: &TaskKey) -> std::sync::Arc<PaintingTask> {
        self.tasks.entry(key.clone()).or_insert_with(|| std::sync::Arc::new(PaintingTask::new(key.clone()))).clone()
    }

    /// §4.5 "Queueing policy": skip re-queueing a task that already has a
    /// fresh result, unless the reason is a dependency update.
    fn queue(&self, key: TaskKey, reason: QueueReason) {
        let task = self.get_or_create_task(&key);
        if reason != QueueReason::DependencyUpdate {
            if let Some(result) = task.result() {
                if result.heap_version == self.heap_version.load(Ordering::SeqCst) {
                    return;
                }
            }
        }
        task.set_state(TaskState::Queued);
        self.worklist.lock().push_back(key);
    }

    /// Drains the worklist in batches, processing each batch's tasks in
    /// parallel within the scoped pool `analyze` installs (sized from
    /// `config.worker_count()`), until a round produces no more work.
    fn drain(&self) {
        loop {
            let batch: Vec<TaskKey> = {
                let mut worklist = self.worklist.lock();
                if worklist.is_empty() {
                    break;
                }
                worklist.drain(..).collect()
            };
            let to_queue: Vec<(TaskKey, QueueReason)> =
                batch.par_iter().flat_map_iter(|key| self.execute_task(key)).collect();
            for (key, reason) in to_queue {
                self.queue(key, reason);
            }
        }
    }

    /// One task execution (§4.5 "Lifecycle of one task execution"):
    /// colors the method, diffs dependencies, and returns whatever should
    /// be queued next (new dependencies, and dependants if the result
    /// changed).
    fn execute_task(&self, key: &TaskKey) -> Vec<(TaskKey, QueueReason)> {
        let task = self.get_or_create_task(key);
        task.set_state(TaskState::Running);

        if task.increment_executions() > self.config.task_execution_cap {
            warn!(method = %key.method, cap = self.config.task_execution_cap, "per-task execution cap exceeded, abandoning task");
            task.set_state(TaskState::Idle);
            self.settle_empty(&task);
            return vec![];
        }

        let graph = match self.graph_for(&key.method) {
            Some(g) => g,
            None => {
                // Either a genuinely empty body (§7 EmptyMethod) or a body
                // abandoned on BadBytecode/UnsupportedOpcode, already
                // logged inside `graph_for`. Either way no error escapes
                // `analyze` (§7): the task settles on an empty result.
                task.set_state(TaskState::Idle);
                self.settle_empty(&task);
                return vec![];
            }
        };

        let new_dependencies: Mutex<AHashSet<TaskKey>> = Mutex::new(AHashSet::default());
        let ctx = TaskContext { session: self, new_dependencies: &new_dependencies };
        let sink = self.intersection_sink;
        let (ins, outs) = color(
            &graph,
            &key.ins,
            &key.outs,
            self.rule_provider,
            &ctx,
            &mut |i: Intersection| sink.on_source_sink_intersection(&i.source_trace, &i.sink_trace),
            self.config.brush_iteration_cap,
        );

        let new_deps = new_dependencies.into_inner();
        let (added, removed) = task.replace_dependencies(new_deps.clone());
        for dep in &removed {
            if let Some(dep_task) = self.tasks.get(dep) {
                dep_task.remove_dependant(key.clone());
            }
        }
        for dep in &added {
            self.get_or_create_task(dep).add_dependant(key.clone());
        }

        let new_result = PaintingResult { ins, outs, heap_version: self.heap_version.load(Ordering::SeqCst) };
        let previous = task.result();
        let mut to_queue: Vec<(TaskKey, QueueReason)> =
            new_deps.into_iter().map(|d| (d, QueueReason::NewDependency)).collect();

        if previous.as_ref() != Some(&new_result) {
            let should_wake = new_result.has_any_color();
            task.set_result(new_result);
            if should_wake {
                to_queue.extend(task.dependants().into_iter().map(|d| (d, QueueReason::DependencyUpdate)));
            }
        }
        task.set_state(TaskState::Idle);
        to_queue
    }

    /// Records an empty result for a task whose method has no graph to
    /// color (empty body or abandoned bytecode), so dependants and the
    /// top-level `analyze` caller always find *some* result rather than
    /// having to distinguish "no result yet" from "never will have one".
    fn settle_empty(&self, task: &PaintingTask) {
        if task.result().is_none() {
            task.set_result(PaintingResult { ins: vec![], outs: vec![], heap_version: self.heap_version.load(Ordering::SeqCst) });
        }
    }

    /// Builds (or fetches the cached) colorless graph for `method`.
    /// `ClassNotFound`/`MethodNotFound` are elided per §7 (the call site
    /// is simply skipped); any other error abandons this method's graph
    /// for the session, logged at error level.
    fn graph_for(&self, method: &MethodRef) -> Option<std::sync::Arc<MethodDataGraph>> {
        if let Some(cached) = self.graphs.get(method) {
            return cached.clone();
        }
        let built = match build_method_data_graph(self.resolver, method) {
            Ok(Some(g)) => Some(std::sync::Arc::new(g)),
            Ok(None) => None,
            Err(e) if e.is_elidable() => {
                warn!(method = %method, error = %e, "eliding call site: class or method not found");
                None
            }
            Err(e) => {
                error!(method = %method, error = %e, "abandoning painting task");
                None
            }
        };
        self.graphs.insert(method.clone(), built.clone());
        built
    }

    /// §4.5 `resolve_callee`. Refines the receiver by demultiplexing its
    /// observed classes one at a time (the only axis the worked example
    /// in §4.3 exercises; demultiplexing the non-receiver parameters too
    /// would only multiply task keys without changing which method body
    /// gets colored, so this narrows the general combinator to that one
    /// axis — noted in the design ledger). Static and dynamic-free calls
    /// with no receiver skip straight to a single variant.
    fn resolve_callee_impl(
        &self,
        new_dependencies: &Mutex<AHashSet<TaskKey>>,
        invocation: &Invocation,
        ins: &[ColoredObject],
        outs: &[ColoredObject],
    ) -> AHashMap<NodeId, ColoredObject> {
        let mut updated_ins: Vec<ColoredObject> = ins.to_vec();
        let mut updated_outs: Vec<ColoredObject> = outs.to_vec();

        let receiver_classes: Vec<String> = if !invocation.is_static {
            ins.first().map(|c| c.observed_classes().cloned().collect()).unwrap_or_default()
        } else {
            Vec::new()
        };

        let ins_summary = summarize(ins);
        let outs_summary = summarize(outs);

        let mut visit_variant = |callee: MethodRef| {
            // An empty body (abstract/native/zero-instruction) has no graph
            // to color; `resolve_callee` contributes nothing for it (§4.5
            // step 2).
            if self.graph_for(&callee).is_none() {
                return;
            }
            let callee_key = TaskKey::new(callee, ins_summary.clone(), outs_summary.clone());
            new_dependencies.lock().insert(callee_key.clone());

            if let Some(result) = self.get_or_create_task(&callee_key).result() {
                let sink = self.intersection_sink;
                let mut report = |i: Intersection| sink.on_source_sink_intersection(&i.source_trace, &i.sink_trace);
                let variant = self.config.callee_merge_variant;
                for (u, r) in updated_ins.iter_mut().zip(result.ins.iter()) {
                    *u = merge_with_variant(variant, u, r, &mut report);
                }
                for (u, r) in updated_outs.iter_mut().zip(result.outs.iter()) {
                    *u = merge_with_variant(variant, u, r, &mut report);
                }
            }
        };

        if receiver_classes.is_empty() {
            visit_variant(invocation.target.clone());
        } else {
            for class in receiver_classes {
                let refined = self
                    .resolver
                    .get_method(&class, &invocation.target.name, &invocation.target.descriptor)
                    .unwrap_or_else(|_| invocation.target.clone());
                visit_variant(refined);
            }
        }

        let mut out = AHashMap::default();
        for (param_id, colored) in invocation.parameters.iter().zip(updated_ins.iter()) {
            out.insert(*param_id, colored.clone());
        }
        if let (Some(result_id), Some(colored)) = (invocation.result, updated_outs.first()) {
            out.insert(result_id, colored.clone());
        }
        out
    }
}

/// §4.5 step 3 names `merge_most_dangerous` explicitly for joining a
/// callee's cached result in; `MergeVariant::Lub` is the configurable
/// fallback (§9 "Merging semantics") for deployments that want callee
/// results folded in without intersection detection at this edge.
fn merge_with_variant(
    variant: MergeVariant,
    a: &ColoredObject,
    b: &ColoredObject,
    on_intersection: &mut dyn FnMut(Intersection),
) -> ColoredObject {
    match variant {
        MergeVariant::MostDangerous => merge_most_dangerous(a, b, on_intersection),
        MergeVariant::Lub => merge_lub(a, b),
    }
}

/// Collapses a node's current `ColoredObject` into the single dominant
/// `ColorTag` used for task-key summaries (§4.5 "input/output-coloring
/// summary"). Ties between equal-confidence classes pick an arbitrary
/// but deterministic-enough-for-caching winner; at worst a tie produces
/// an extra cache miss, never a wrong answer, since tasks are keyed by
/// summary but colored from the full graph regardless.
fn summarize_one(colored: &ColoredObject) -> Option<ColorTag> {
    colored.by_class.values().max_by_key(|p| p.confidence).map(|p| p.color.clone())
}

fn summarize(colorings: &[ColoredObject]) -> Vec<Option<ColorTag>> {
    colorings.iter().map(summarize_one).collect()
}

/// Bridges `CalleeResolver` (consumed by L2's `InvocationsBrush`) to this
/// session's `resolve_callee`, accumulating the current task's newly
/// discovered dependencies without any thread-local state (§9 REDESIGN
/// FLAGS "Thread-local current-task").
struct TaskContext<'a, 'b> {
    session: &'a PaintingSession<'b>,
    new_dependencies: &'a Mutex<AHashSet<TaskKey>>,
}

impl CalleeResolver for TaskContext<'_, '_> {
    fn resolve_callee(
        &self,
        invocation: &Invocation,
        ins: &[ColoredObject],
        outs: &[ColoredObject],
    ) -> AHashMap<NodeId, ColoredObject> {
        self.session.resolve_callee_impl(self.new_dependencies, invocation, ins, outs)
    }
}
