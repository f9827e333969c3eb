//! Hierarchical task list with due-date sections, a focus queue and
//! undo/redo history.
//!
//! The [`view`] module turns a flat task list into render trees. The
//! [`ops`] module mutates a [`store::TaskStore`] and records every change
//! in a bounded, reversible [`ops::undo::HistoryManager`].

pub mod cli;
pub mod io;
pub mod model;
pub mod ops;
pub mod store;
pub mod telemetry;
pub mod util;
pub mod view;
