//! Pattern search over a [`GraphManager`](crate::storage::GraphManager).
//!
//! A planner hands over a [`Procedure`]: vertices in visiting order joined by
//! directed constraints. [`GraphIterator`] enumerates its answers lazily and
//! [`CombinationFinder`] narrows the feasible types of a type-only procedure.

pub mod identifier;
pub mod options;
pub mod params;
pub mod procedure;
pub mod scope;

mod profile;
mod scanner;
mod vertex_map;

pub use identifier::{Identifier, Variable};
pub use options::{OptionsError, TraversalOptions};
pub use params::{Modifiers, Order, ParamId, Parameters, Sorting};
pub use procedure::{Procedure, ProcedureBuilder};
pub use profile::{profile_snapshot, TraversalProfileSnapshot};
pub use scanner::{Combination, CombinationFinder, GraphIterator};
pub use vertex_map::VertexMap;
