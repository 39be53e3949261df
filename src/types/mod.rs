//! Identifiers, vertex handles and the crate-wide error type.

use std::fmt;

pub mod value;

pub use value::{Comparator, Value, ValueKind};

/// Schema type identity. Ordered by the store's canonical type order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct TypeId(pub u32);

/// Data instance identity. Ordered by the store's canonical thing order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ThingId(pub u64);

/// A concrete graph vertex bound to a query variable.
///
/// Every type vertex sorts before every thing vertex, so a sorted stream of
/// type ids or thing ids stays sorted once wrapped.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Vertex {
    /// A schema type.
    Type(TypeId),
    /// A data instance.
    Thing(ThingId),
}

impl Vertex {
    /// Returns the vertex kind tag.
    pub fn kind(self) -> VertexKind {
        match self {
            Vertex::Type(_) => VertexKind::Type,
            Vertex::Thing(_) => VertexKind::Thing,
        }
    }

    /// Returns the type id when this is a type vertex.
    pub fn as_type(self) -> Option<TypeId> {
        match self {
            Vertex::Type(ty) => Some(ty),
            Vertex::Thing(_) => None,
        }
    }

    /// Returns the thing id when this is a thing vertex.
    pub fn as_thing(self) -> Option<ThingId> {
        match self {
            Vertex::Thing(thing) => Some(thing),
            Vertex::Type(_) => None,
        }
    }

    pub(crate) fn expect_type(self) -> Result<TypeId> {
        self.as_type()
            .ok_or(TraversalError::IllegalState("expected a type vertex"))
    }

    pub(crate) fn expect_thing(self) -> Result<ThingId> {
        self.as_thing()
            .ok_or(TraversalError::IllegalState("expected a thing vertex"))
    }
}

/// Discriminates schema vertices from data vertices.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum VertexKind {
    /// Schema type vertex.
    Type,
    /// Data instance vertex.
    Thing,
}

/// Category of a schema type.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum TypeKind {
    /// Entity type.
    Entity,
    /// Relation type.
    Relation,
    /// Attribute type.
    Attribute,
    /// Role type declared by a relation type.
    Role,
}

/// Errors raised by the traversal core and the graph capability it consumes.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TraversalError {
    /// The underlying store or transaction was closed mid-iteration.
    #[error("resource closed: {0}")]
    ResourceClosed(&'static str),
    /// A programming-contract violation.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    /// `next` was called without a pending answer.
    #[error("iterator exhausted")]
    Exhausted,
    /// The planner produced a procedure that cannot be executed.
    #[error("invalid procedure: {0}")]
    InvalidProcedure(String),
    /// A parameter referenced by the procedure was not supplied.
    #[error("missing parameter: {0}")]
    MissingParameter(String),
    /// A store lookup referenced an unknown id.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// A store or builder call received a bad argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

impl TraversalError {
    /// Returns `true` when the error reports a closed store or transaction.
    pub fn is_resource_closed(&self) -> bool {
        matches!(self, TraversalError::ResourceClosed(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TraversalError>;

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Type(ty) => write!(f, "type:{ty}"),
            Vertex::Thing(thing) => write!(f, "thing:{thing}"),
        }
    }
}

impl From<u32> for TypeId {
    fn from(value: u32) -> Self {
        TypeId(value)
    }
}

impl From<TypeId> for u32 {
    fn from(value: TypeId) -> Self {
        value.0
    }
}

impl From<u64> for ThingId {
    fn from(value: u64) -> Self {
        ThingId(value)
    }
}

impl From<TypeId> for Vertex {
    fn from(value: TypeId) -> Self {
        Vertex::Type(value)
    }
}

impl From<ThingId> for Vertex {
    fn from(value: ThingId) -> Self {
        Vertex::Thing(value)
    }
}
