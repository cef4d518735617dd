//! Task model: records, the two-level tree, per-tool views and the builder

pub mod builder;
pub mod task;
pub mod tree;
pub mod view;

pub use builder::{BuildStrategy, ModelBuilder};
pub use task::{Invocation, Task, TaskReport};
pub use tree::{NodeId, TaskRef, Tree};
pub use view::ToolView;
