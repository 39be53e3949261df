//! In-memory reference implementation of [`GraphManager`].
//!
//! Types and things get dense ids in creation order. Every cursor handed out is
//! counted when opened and when dropped, so callers can assert that a search
//! released everything it acquired.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::types::{Result, ThingId, TraversalError, TypeId, TypeKind, Value, ValueKind};

use super::cursor::{SortedCursor, VecCursor};
use super::manager::{ancestors, DataEdge, Dir, GraphManager, SchemaEdge, ThingCursor, TypeCursor};

/// Counters for cursors opened and released by a [`MemoryGraph`].
#[derive(Default, Debug)]
pub struct CursorStats {
    /// Cursors created.
    pub opened: AtomicU64,
    /// Cursors dropped.
    pub released: AtomicU64,
}

impl CursorStats {
    /// Cursors created and not yet dropped.
    pub fn open(&self) -> u64 {
        let opened = self.opened.load(Ordering::Relaxed);
        opened.saturating_sub(self.released.load(Ordering::Relaxed))
    }

    /// Total cursors created so far.
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct TypeDef {
    label: Arc<str>,
    kind: TypeKind,
    value_kind: Option<ValueKind>,
    is_abstract: bool,
    supertype: Option<TypeId>,
    subtypes: BTreeSet<TypeId>,
    owns: BTreeSet<TypeId>,
    owned_by: BTreeSet<TypeId>,
    keys: BTreeSet<TypeId>,
    keyed_by: BTreeSet<TypeId>,
    plays: BTreeSet<TypeId>,
    played_by: BTreeSet<TypeId>,
    relates: BTreeSet<TypeId>,
    related_by: BTreeSet<TypeId>,
    instances: BTreeSet<ThingId>,
}

#[derive(Debug)]
struct ThingDef {
    ty: TypeId,
    value: Option<Value>,
    has: BTreeSet<ThingId>,
    owners: BTreeSet<ThingId>,
    playing: BTreeSet<ThingId>,
    relating: BTreeSet<ThingId>,
    player: Option<ThingId>,
    relation: Option<ThingId>,
}

impl ThingDef {
    fn new(ty: TypeId, value: Option<Value>) -> Self {
        Self {
            ty,
            value,
            has: BTreeSet::new(),
            owners: BTreeSet::new(),
            playing: BTreeSet::new(),
            relating: BTreeSet::new(),
            player: None,
            relation: None,
        }
    }
}

/// Graph snapshot held entirely in memory.
///
/// Schema and data are built through `&mut self` methods; reads go through
/// [`GraphManager`]. [`MemoryGraph::close`] takes `&self` so a store shared
/// with running searches can be closed underneath them.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    types: Vec<TypeDef>,
    labels: FxHashMap<Arc<str>, TypeId>,
    things: Vec<ThingDef>,
    closed: AtomicBool,
    stats: CursorStats,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor accounting for this graph.
    pub fn cursor_stats(&self) -> &CursorStats {
        &self.stats
    }

    /// Marks the graph closed. Later reads, including reads through cursors
    /// that are already open, fail with `ResourceClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!(open_cursors = self.stats.open(), "memory_graph.closed");
    }

    /// Whether [`MemoryGraph::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Defines an entity type.
    pub fn define_entity(&mut self, label: &str) -> Result<TypeId> {
        self.define_type(label, TypeKind::Entity, None)
    }

    /// Defines a relation type.
    pub fn define_relation(&mut self, label: &str) -> Result<TypeId> {
        self.define_type(label, TypeKind::Relation, None)
    }

    /// Defines an attribute type holding values of `value_kind`.
    pub fn define_attribute(&mut self, label: &str, value_kind: ValueKind) -> Result<TypeId> {
        self.define_type(label, TypeKind::Attribute, Some(value_kind))
    }

    /// Defines the role `name` on `relation`, labelled `relation:name`.
    pub fn define_role(&mut self, relation: TypeId, name: &str) -> Result<TypeId> {
        if self.type_def(relation)?.kind != TypeKind::Relation {
            return Err(TraversalError::Invalid("roles are declared by relation types"));
        }
        let label = format!("{}:{}", self.type_def(relation)?.label, name);
        let role = self.define_type(&label, TypeKind::Role, None)?;
        self.type_def_mut(relation)?.relates.insert(role);
        self.type_def_mut(role)?.related_by.insert(relation);
        Ok(role)
    }

    /// Makes `sup` the direct supertype of `sub`.
    pub fn set_supertype(&mut self, sub: TypeId, sup: TypeId) -> Result<()> {
        let (sub_def, sup_def) = (self.type_def(sub)?, self.type_def(sup)?);
        if sub_def.kind != sup_def.kind {
            return Err(TraversalError::Invalid("supertype must have the same kind"));
        }
        if sub_def.value_kind != sup_def.value_kind {
            return Err(TraversalError::Invalid("supertype must have the same value kind"));
        }
        if ancestors(self, sup)?.contains(&sub) {
            return Err(TraversalError::Invalid("supertype would form a cycle"));
        }
        if let Some(previous) = self.type_def(sub)?.supertype {
            self.type_def_mut(previous)?.subtypes.remove(&sub);
        }
        self.type_def_mut(sub)?.supertype = Some(sup);
        self.type_def_mut(sup)?.subtypes.insert(sub);
        Ok(())
    }

    /// Marks a type abstract or concrete.
    pub fn set_abstract(&mut self, ty: TypeId, is_abstract: bool) -> Result<()> {
        self.type_def_mut(ty)?.is_abstract = is_abstract;
        Ok(())
    }

    /// Declares that `owner` owns `attribute`.
    pub fn set_owns(&mut self, owner: TypeId, attribute: TypeId) -> Result<()> {
        self.declare_owns(owner, attribute, false)
    }

    /// Declares that `owner` owns `attribute` as a key. A key is also an
    /// ordinary ownership.
    pub fn set_owns_key(&mut self, owner: TypeId, attribute: TypeId) -> Result<()> {
        self.declare_owns(owner, attribute, true)
    }

    fn declare_owns(&mut self, owner: TypeId, attribute: TypeId, key: bool) -> Result<()> {
        if self.type_def(attribute)?.kind != TypeKind::Attribute {
            return Err(TraversalError::Invalid("only attribute types can be owned"));
        }
        if self.type_def(owner)?.kind == TypeKind::Role {
            return Err(TraversalError::Invalid("role types cannot own attributes"));
        }
        self.type_def_mut(owner)?.owns.insert(attribute);
        self.type_def_mut(attribute)?.owned_by.insert(owner);
        if key {
            self.type_def_mut(owner)?.keys.insert(attribute);
            self.type_def_mut(attribute)?.keyed_by.insert(owner);
        }
        Ok(())
    }

    /// Declares that `player` plays `role`.
    pub fn set_plays(&mut self, player: TypeId, role: TypeId) -> Result<()> {
        if self.type_def(role)?.kind != TypeKind::Role {
            return Err(TraversalError::Invalid("only role types can be played"));
        }
        if self.type_def(player)?.kind == TypeKind::Role {
            return Err(TraversalError::Invalid("role types cannot play roles"));
        }
        self.type_def_mut(player)?.plays.insert(role);
        self.type_def_mut(role)?.played_by.insert(player);
        Ok(())
    }

    /// Creates an entity of type `ty`.
    pub fn insert_entity(&mut self, ty: TypeId) -> Result<ThingId> {
        self.insert_thing(ty, TypeKind::Entity, None)
    }

    /// Creates a relation of type `ty` with no role players yet.
    pub fn insert_relation(&mut self, ty: TypeId) -> Result<ThingId> {
        self.insert_thing(ty, TypeKind::Relation, None)
    }

    /// Returns the attribute of type `ty` holding `value`, creating it if needed.
    pub fn insert_attribute(&mut self, ty: TypeId, value: Value) -> Result<ThingId> {
        if self.type_def(ty)?.value_kind != Some(value.kind()) {
            return Err(TraversalError::Invalid("value kind does not match attribute type"));
        }
        let existing = self
            .type_def(ty)?
            .instances
            .iter()
            .copied()
            .find(|thing| self.things[thing.0 as usize].value.as_ref() == Some(&value));
        match existing {
            Some(thing) => Ok(thing),
            None => self.insert_thing(ty, TypeKind::Attribute, Some(value)),
        }
    }

    /// Adds `player` to `relation` in `role`, returning the new role instance.
    pub fn add_role_player(
        &mut self,
        relation: ThingId,
        role: TypeId,
        player: ThingId,
    ) -> Result<ThingId> {
        let relation_type = self.thing_def(relation)?.ty;
        let player_type = self.thing_def(player)?.ty;
        if self.type_def(role)?.kind != TypeKind::Role {
            return Err(TraversalError::Invalid("role player needs a role type"));
        }
        if !self.inherits(relation_type, role, |def| &def.relates)? {
            return Err(TraversalError::Invalid("relation type does not relate role"));
        }
        if !self.inherits(player_type, role, |def| &def.plays)? {
            return Err(TraversalError::Invalid("player type does not play role"));
        }
        let instance = self.insert_thing(role, TypeKind::Role, None)?;
        {
            let def = self.thing_def_mut(instance)?;
            def.player = Some(player);
            def.relation = Some(relation);
        }
        self.thing_def_mut(relation)?.relating.insert(instance);
        self.thing_def_mut(player)?.playing.insert(instance);
        Ok(instance)
    }

    /// Attaches `attribute` to `owner`.
    pub fn add_has(&mut self, owner: ThingId, attribute: ThingId) -> Result<()> {
        let owner_type = self.thing_def(owner)?.ty;
        let attribute_type = self.thing_def(attribute)?.ty;
        if self.type_def(attribute_type)?.kind != TypeKind::Attribute {
            return Err(TraversalError::Invalid("only attributes can be owned"));
        }
        if !self.inherits(owner_type, attribute_type, |def| &def.owns)? {
            return Err(TraversalError::Invalid("owner type does not own attribute type"));
        }
        self.thing_def_mut(owner)?.has.insert(attribute);
        self.thing_def_mut(attribute)?.owners.insert(owner);
        Ok(())
    }

    /// Looks up a type by label without touching the closed flag.
    pub fn type_id(&self, label: &str) -> Option<TypeId> {
        self.labels.get(label).copied()
    }

    /// Number of things created so far.
    pub fn thing_count(&self) -> usize {
        self.things.len()
    }

    fn define_type(
        &mut self,
        label: &str,
        kind: TypeKind,
        value_kind: Option<ValueKind>,
    ) -> Result<TypeId> {
        if label.is_empty() {
            return Err(TraversalError::Invalid("type label must not be empty"));
        }
        if self.labels.contains_key(label) {
            return Err(TraversalError::Invalid("duplicate type label"));
        }
        let id = TypeId(
            u32::try_from(self.types.len())
                .map_err(|_| TraversalError::Invalid("too many types"))?,
        );
        let label: Arc<str> = Arc::from(label);
        self.labels.insert(label.clone(), id);
        self.types.push(TypeDef {
            label,
            kind,
            value_kind,
            is_abstract: false,
            supertype: None,
            subtypes: BTreeSet::new(),
            owns: BTreeSet::new(),
            owned_by: BTreeSet::new(),
            keys: BTreeSet::new(),
            keyed_by: BTreeSet::new(),
            plays: BTreeSet::new(),
            played_by: BTreeSet::new(),
            relates: BTreeSet::new(),
            related_by: BTreeSet::new(),
            instances: BTreeSet::new(),
        });
        Ok(id)
    }

    fn insert_thing(
        &mut self,
        ty: TypeId,
        expected: TypeKind,
        value: Option<Value>,
    ) -> Result<ThingId> {
        let def = self.type_def(ty)?;
        if def.kind != expected {
            return Err(TraversalError::Invalid("type kind does not match instance kind"));
        }
        if def.is_abstract {
            return Err(TraversalError::Invalid("abstract types cannot have instances"));
        }
        let id = ThingId(self.things.len() as u64);
        self.things.push(ThingDef::new(ty, value));
        self.type_def_mut(ty)?.instances.insert(id);
        Ok(id)
    }

    fn inherits(
        &self,
        ty: TypeId,
        target: TypeId,
        declared: impl Fn(&TypeDef) -> &BTreeSet<TypeId>,
    ) -> Result<bool> {
        for ancestor in ancestors(self, ty)? {
            if declared(self.type_def(ancestor)?).contains(&target) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(TraversalError::ResourceClosed("graph"))
        } else {
            Ok(())
        }
    }

    fn type_def(&self, ty: TypeId) -> Result<&TypeDef> {
        self.types
            .get(ty.0 as usize)
            .ok_or(TraversalError::NotFound("type"))
    }

    fn type_def_mut(&mut self, ty: TypeId) -> Result<&mut TypeDef> {
        self.types
            .get_mut(ty.0 as usize)
            .ok_or(TraversalError::NotFound("type"))
    }

    fn thing_def(&self, thing: ThingId) -> Result<&ThingDef> {
        usize::try_from(thing.0)
            .ok()
            .and_then(|idx| self.things.get(idx))
            .ok_or(TraversalError::NotFound("thing"))
    }

    fn thing_def_mut(&mut self, thing: ThingId) -> Result<&mut ThingDef> {
        usize::try_from(thing.0)
            .ok()
            .and_then(|idx| self.things.get_mut(idx))
            .ok_or(TraversalError::NotFound("thing"))
    }

    fn cursor<T: Copy + Ord + 'static>(
        &self,
        items: impl IntoIterator<Item = T>,
    ) -> TrackedCursor<'_, T> {
        self.stats.opened.fetch_add(1, Ordering::Relaxed);
        TrackedCursor {
            inner: VecCursor::from_unsorted(items.into_iter().collect()),
            graph: self,
        }
    }
}

struct TrackedCursor<'a, T> {
    inner: VecCursor<T>,
    graph: &'a MemoryGraph,
}

impl<T: Copy + Ord> SortedCursor for TrackedCursor<'_, T> {
    type Item = T;

    fn peek(&mut self) -> Result<Option<T>> {
        self.graph.ensure_open()?;
        self.inner.peek()
    }

    fn next(&mut self) -> Result<Option<T>> {
        self.graph.ensure_open()?;
        self.inner.next()
    }

    fn seek(&mut self, target: T) -> Result<()> {
        self.graph.ensure_open()?;
        self.inner.seek(target)
    }
}

impl<T> Drop for TrackedCursor<'_, T> {
    fn drop(&mut self) {
        self.graph.stats.released.fetch_add(1, Ordering::Relaxed);
    }
}

impl GraphManager for MemoryGraph {
    fn all_types(&self) -> Result<TypeCursor<'_>> {
        self.ensure_open()?;
        let count = self.types.len() as u32;
        Ok(Box::new(self.cursor((0..count).map(TypeId))))
    }

    fn type_by_label(&self, label: &str) -> Result<Option<TypeId>> {
        self.ensure_open()?;
        Ok(self.type_id(label))
    }

    fn type_label(&self, ty: TypeId) -> Result<Arc<str>> {
        self.ensure_open()?;
        Ok(self.type_def(ty)?.label.clone())
    }

    fn type_kind(&self, ty: TypeId) -> Result<TypeKind> {
        self.ensure_open()?;
        Ok(self.type_def(ty)?.kind)
    }

    fn is_abstract(&self, ty: TypeId) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.type_def(ty)?.is_abstract)
    }

    fn value_kind(&self, ty: TypeId) -> Result<Option<ValueKind>> {
        self.ensure_open()?;
        Ok(self.type_def(ty)?.value_kind)
    }

    fn type_neighbours(&self, ty: TypeId, edge: SchemaEdge, dir: Dir) -> Result<TypeCursor<'_>> {
        self.ensure_open()?;
        let def = self.type_def(ty)?;
        let items: Vec<TypeId> = match (edge, dir) {
            (SchemaEdge::Sub, Dir::Out) => def.supertype.into_iter().collect(),
            (SchemaEdge::Sub, Dir::In) => def.subtypes.iter().copied().collect(),
            (SchemaEdge::Owns, Dir::Out) => def.owns.iter().copied().collect(),
            (SchemaEdge::Owns, Dir::In) => def.owned_by.iter().copied().collect(),
            (SchemaEdge::OwnsKey, Dir::Out) => def.keys.iter().copied().collect(),
            (SchemaEdge::OwnsKey, Dir::In) => def.keyed_by.iter().copied().collect(),
            (SchemaEdge::Plays, Dir::Out) => def.plays.iter().copied().collect(),
            (SchemaEdge::Plays, Dir::In) => def.played_by.iter().copied().collect(),
            (SchemaEdge::Relates, Dir::Out) => def.relates.iter().copied().collect(),
            (SchemaEdge::Relates, Dir::In) => def.related_by.iter().copied().collect(),
        };
        Ok(Box::new(self.cursor(items)))
    }

    fn instances(&self, ty: TypeId) -> Result<ThingCursor<'_>> {
        self.ensure_open()?;
        let items: Vec<ThingId> = self.type_def(ty)?.instances.iter().copied().collect();
        Ok(Box::new(self.cursor(items)))
    }

    fn thing_type(&self, thing: ThingId) -> Result<TypeId> {
        self.ensure_open()?;
        Ok(self.thing_def(thing)?.ty)
    }

    fn attribute_value(&self, thing: ThingId) -> Result<Option<Value>> {
        self.ensure_open()?;
        Ok(self.thing_def(thing)?.value.clone())
    }

    fn thing_neighbours(
        &self,
        thing: ThingId,
        edge: DataEdge,
        dir: Dir,
    ) -> Result<ThingCursor<'_>> {
        self.ensure_open()?;
        let def = self.thing_def(thing)?;
        let items: Vec<ThingId> = match (edge, dir) {
            (DataEdge::Has, Dir::Out) => def.has.iter().copied().collect(),
            (DataEdge::Has, Dir::In) => def.owners.iter().copied().collect(),
            (DataEdge::Playing, Dir::Out) => def.playing.iter().copied().collect(),
            (DataEdge::Playing, Dir::In) => def.player.into_iter().collect(),
            (DataEdge::Relating, Dir::Out) => def.relating.iter().copied().collect(),
            (DataEdge::Relating, Dir::In) => def.relation.into_iter().collect(),
        };
        Ok(Box::new(self.cursor(items)))
    }
}
