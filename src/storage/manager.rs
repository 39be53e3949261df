//! The read-only graph capability consumed by the traversal core.

use std::sync::Arc;

use crate::types::{Result, ThingId, TypeId, TypeKind, Value, ValueKind};

use super::cursor::{BoxCursor, SortedCursor};

/// Ascending cursor over schema types.
pub type TypeCursor<'a> = BoxCursor<'a, TypeId>;
/// Ascending cursor over data instances.
pub type ThingCursor<'a> = BoxCursor<'a, ThingId>;

/// Direction of an adjacency lookup.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Dir {
    /// Follow the edge from its source.
    Out,
    /// Follow the edge back from its target.
    In,
}

impl Dir {
    /// The opposite direction.
    pub fn flip(self) -> Self {
        match self {
            Dir::Out => Dir::In,
            Dir::In => Dir::Out,
        }
    }
}

/// Declared schema edges between types.
///
/// Only direct declarations are stored; inheritance is resolved by callers
/// walking [`SchemaEdge::Sub`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SchemaEdge {
    /// Subtype to its direct supertype.
    Sub,
    /// Owner type to a declared attribute type, keys included.
    Owns,
    /// Owner type to an attribute type declared as its key.
    OwnsKey,
    /// Player type to a declared role type.
    Plays,
    /// Relation type to a declared role type.
    Relates,
}

/// Instance-level edges between things.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DataEdge {
    /// Owner to attribute.
    Has,
    /// Player to role instance.
    Playing,
    /// Relation to role instance.
    Relating,
}

/// Read-only access to a graph snapshot.
///
/// Every cursor is ascending and duplicate-free. A store or transaction that
/// has been closed answers [`TraversalError::ResourceClosed`] from any call,
/// including calls on cursors that are already open.
///
/// [`TraversalError::ResourceClosed`]: crate::types::TraversalError::ResourceClosed
pub trait GraphManager {
    /// Every schema type in the snapshot.
    fn all_types(&self) -> Result<TypeCursor<'_>>;

    /// Resolves a type label.
    fn type_by_label(&self, label: &str) -> Result<Option<TypeId>>;

    /// Label of a type.
    fn type_label(&self, ty: TypeId) -> Result<Arc<str>>;

    /// Category of a type.
    fn type_kind(&self, ty: TypeId) -> Result<TypeKind>;

    /// Whether the type is abstract.
    fn is_abstract(&self, ty: TypeId) -> Result<bool>;

    /// Value kind of an attribute type, `None` for other types.
    fn value_kind(&self, ty: TypeId) -> Result<Option<ValueKind>>;

    /// Direct schema neighbours of `ty`.
    fn type_neighbours(&self, ty: TypeId, edge: SchemaEdge, dir: Dir) -> Result<TypeCursor<'_>>;

    /// Direct instances of `ty`, excluding instances of its subtypes.
    fn instances(&self, ty: TypeId) -> Result<ThingCursor<'_>>;

    /// Type of a thing.
    fn thing_type(&self, thing: ThingId) -> Result<TypeId>;

    /// Value of an attribute, `None` for other things.
    fn attribute_value(&self, thing: ThingId) -> Result<Option<Value>>;

    /// Instance-level neighbours of `thing`.
    fn thing_neighbours(
        &self,
        thing: ThingId,
        edge: DataEdge,
        dir: Dir,
    ) -> Result<ThingCursor<'_>>;
}

/// Supertype chain of `ty`, starting with `ty` itself.
pub fn ancestors<G: GraphManager + ?Sized>(graph: &G, ty: TypeId) -> Result<Vec<TypeId>> {
    let mut chain = vec![ty];
    let mut current = ty;
    loop {
        let mut supers = graph.type_neighbours(current, SchemaEdge::Sub, Dir::Out)?;
        match supers.next()? {
            Some(parent) if !chain.contains(&parent) => {
                chain.push(parent);
                current = parent;
            }
            _ => return Ok(chain),
        }
    }
}

/// `ty` and every transitive subtype, ascending.
pub fn descendants<G: GraphManager + ?Sized>(graph: &G, ty: TypeId) -> Result<Vec<TypeId>> {
    let mut out = vec![ty];
    let mut frontier = vec![ty];
    while let Some(current) = frontier.pop() {
        let mut subs = graph.type_neighbours(current, SchemaEdge::Sub, Dir::In)?;
        while let Some(sub) = subs.next()? {
            if !out.contains(&sub) {
                out.push(sub);
                frontier.push(sub);
            }
        }
    }
    out.sort_unstable();
    Ok(out)
}
