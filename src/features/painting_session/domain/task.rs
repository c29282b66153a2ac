//! PaintingTask and its key (§4.5): one unit of interprocedural work.

use ahash::AHashSet;
use parking_lot::Mutex;

use crate::features::coloring::domain::{ColorTag, ColoredObject};
use crate::features::graph_builder::ports::MethodRef;

/// (method reference, input-coloring-summary, output-coloring-summary)
/// (§4.5). Two tasks with the same key share state. The summaries are the
/// per-slot `ColorTag` seeds a caller asked for — not the full
/// `ColoredObject` lattice value — so the key stays small and hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub method: MethodRef,
    pub ins: Vec<Option<ColorTag>>,
    pub outs: Vec<Option<ColorTag>>,
}

impl TaskKey {
    pub fn new(method: MethodRef, ins: Vec<Option<ColorTag>>, outs: Vec<Option<ColorTag>>) -> Self {
        TaskKey { method, ins, outs }
    }
}

/// {NEW, QUEUED, RUNNING, IDLE} (§4.5 "State machine of a task").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    New,
    Queued,
    Running,
    Idle,
}

/// The most recently computed outcome of coloring a task's method (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct PaintingResult {
    pub ins: Vec<ColoredObject>,
    pub outs: Vec<ColoredObject>,
    pub heap_version: u64,
}

impl PaintingResult {
    /// Whether any slot in this result carries a non-empty coloring —
    /// used to decide whether to wake dependants on a fresh result (§4.5
    /// step 5: "if the new result has any non-null coloring").
    pub fn has_any_color(&self) -> bool {
        self.ins.iter().chain(self.outs.iter()).any(|c| !c.is_empty())
    }
}

/// One interprocedural unit of work, keyed by `(method, ins, outs)`.
/// Created on first demand, updated on each execution, never destroyed
/// within a session (§3 Glossary "PaintingTask").
pub struct PaintingTask {
    pub key: TaskKey,
    state: Mutex<TaskState>,
    result: Mutex<Option<PaintingResult>>,
    dependencies: Mutex<AHashSet<TaskKey>>,
    dependants: Mutex<AHashSet<TaskKey>>,
    executions: std::sync::atomic::AtomicU32,
}

impl PaintingTask {
    pub fn new(key: TaskKey) -> Self {
        PaintingTask {
            key,
            state: Mutex::new(TaskState::New),
            result: Mutex::new(None),
            dependencies: Mutex::new(AHashSet::default()),
            dependants: Mutex::new(AHashSet::default()),
            executions: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Bumps and returns this task's execution count, for the per-task
    /// execution cap safety valve (§4.5).
    pub fn increment_executions(&self) -> u32 {
        self.executions.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TaskState) {
        *self.state.lock() = state;
    }

    pub fn result(&self) -> Option<PaintingResult> {
        self.result.lock().clone()
    }

    pub fn set_result(&self, result: PaintingResult) {
        *self.result.lock() = Some(result);
    }

    pub fn add_dependant(&self, dependant: TaskKey) {
        self.dependants.lock().insert(dependant);
    }

    pub fn remove_dependant(&self, dependant: &TaskKey) {
        self.dependants.lock().remove(dependant);
    }

    pub fn dependants(&self) -> Vec<TaskKey> {
        self.dependants.lock().iter().cloned().collect()
    }

    /// Diffs `new_deps` against the previously recorded dependency set,
    /// returning (added, removed), and stores `new_deps` as current
    /// (§4.5 step 3).
    pub fn replace_dependencies(&self, new_deps: AHashSet<TaskKey>) -> (Vec<TaskKey>, Vec<TaskKey>) {
        let mut deps = self.dependencies.lock();
        let added: Vec<TaskKey> = new_deps.difference(&deps).cloned().collect();
        let removed: Vec<TaskKey> = deps.difference(&new_deps).cloned().collect();
        *deps = new_deps;
        (added, removed)
    }
}
