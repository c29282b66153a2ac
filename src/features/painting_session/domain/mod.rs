pub mod task;

pub use task::{PaintingResult, PaintingTask, TaskKey, TaskState};
