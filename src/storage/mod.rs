//! Read-only graph access consumed by the traversal core.
//!
//! [`GraphManager`] is the capability every executor is generic over. Its
//! cursors are ascending and duplicate-free so executors can join them by
//! sort-merge. [`MemoryGraph`] is an in-memory snapshot for embedding and
//! tests.

/// Sorted cursors and their combinators.
pub mod cursor;
/// The graph capability trait and schema helpers.
pub mod manager;
/// In-memory graph snapshot.
pub mod memory;

pub use cursor::{BoxCursor, SortedCursor};
pub use manager::{
    ancestors, descendants, DataEdge, Dir, GraphManager, SchemaEdge, ThingCursor, TypeCursor,
};
pub use memory::{CursorStats, MemoryGraph};
