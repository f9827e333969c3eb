pub mod reorder;
pub mod task_ops;
pub mod undo;
