//! Penumbra: the traversal core of a typed graph database.
//!
//! A query planner compiles a pattern into a [`traversal::Procedure`]. The
//! [`traversal::GraphIterator`] runs it as a backtracking search over any
//! [`storage::GraphManager`] and yields one [`traversal::VertexMap`] per
//! answer. Type-only procedures can instead be narrowed to their feasible
//! type combinations with [`traversal::CombinationFinder`].

#![warn(missing_docs)]

pub mod storage;
pub mod traversal;
pub mod types;
