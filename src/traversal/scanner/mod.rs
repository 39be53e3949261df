//! Executors over compiled procedures.

mod combination;
mod graph_iterator;
mod traverser;

pub use combination::{Combination, CombinationFinder};
pub use graph_iterator::GraphIterator;
