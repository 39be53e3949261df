use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::storage::cursor::{
    collect, BoxCursor, EmptyCursor, FilterCursor, MergeCursor, SortedCursor, ThingVertexCursor,
    TypeVertexCursor, VecCursor,
};
use crate::storage::manager::{
    ancestors, descendants, DataEdge, Dir, GraphManager, SchemaEdge, ThingCursor, TypeCursor,
};
use crate::traversal::params::Parameters;
use crate::traversal::scope::ScopeIndex;
use crate::types::{
    Comparator, Result, ThingId, TraversalError, TypeId, TypeKind, Value, Vertex, VertexKind,
};

use super::vertex::{resolve_types, ProcedureVertex, VertexProps};

/// Semantic kind of a binary constraint.
///
/// Kinds are stated in their forward reading: `Isa` runs thing to type,
/// `Has` owner to attribute, `RolePlayer` relation to player, and so on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    /// Both endpoints are the same vertex.
    Equal,
    /// Attribute value comparison, `from <op> to` in forward reading.
    Predicate(Comparator),
    /// Subtype to supertype; transitive includes the type itself.
    Sub {
        /// Follow the whole hierarchy instead of one step.
        transitive: bool,
    },
    /// Owner type to owned attribute type.
    Owns {
        /// Only match ownerships declared as keys.
        key: bool,
    },
    /// Player type to role type.
    Plays,
    /// Relation type to role type.
    Relates,
    /// Thing to its type.
    Isa {
        /// Also match supertypes of the direct type.
        transitive: bool,
    },
    /// Owner to attribute.
    Has,
    /// Player to role instance.
    Playing,
    /// Relation to role instance.
    Relating,
    /// Relation to player through a role instance of one of `role_types`.
    RolePlayer {
        /// Allowed role type labels; empty allows any role.
        role_types: BTreeSet<Arc<str>>,
    },
}

impl EdgeKind {
    /// Vertex kinds of the semantic source and target.
    pub fn endpoint_kinds(&self) -> Option<(VertexKind, VertexKind)> {
        match self {
            EdgeKind::Equal => None,
            EdgeKind::Sub { .. } | EdgeKind::Owns { .. } | EdgeKind::Plays | EdgeKind::Relates => {
                Some((VertexKind::Type, VertexKind::Type))
            }
            EdgeKind::Isa { .. } => Some((VertexKind::Thing, VertexKind::Type)),
            EdgeKind::Predicate(_)
            | EdgeKind::Has
            | EdgeKind::Playing
            | EdgeKind::Relating
            | EdgeKind::RolePlayer { .. } => Some((VertexKind::Thing, VertexKind::Thing)),
        }
    }

    fn schema_edge(&self) -> Option<SchemaEdge> {
        match self {
            EdgeKind::Owns { key: false } => Some(SchemaEdge::Owns),
            EdgeKind::Owns { key: true } => Some(SchemaEdge::OwnsKey),
            EdgeKind::Plays => Some(SchemaEdge::Plays),
            EdgeKind::Relates => Some(SchemaEdge::Relates),
            _ => None,
        }
    }

    fn data_edge(&self) -> Option<DataEdge> {
        match self {
            EdgeKind::Has => Some(DataEdge::Has),
            EdgeKind::Playing => Some(DataEdge::Playing),
            EdgeKind::Relating => Some(DataEdge::Relating),
            _ => None,
        }
    }
}

/// Whether an edge is walked in its semantic direction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// `from` is the semantic source.
    Forward,
    /// `from` is the semantic target.
    Backward,
}

impl Direction {
    /// The other direction.
    pub fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    fn is_forward(self) -> bool {
        self == Direction::Forward
    }
}

/// One binary constraint of a procedure.
#[derive(Clone, Debug)]
pub struct ProcedureEdge {
    pub(crate) index: usize,
    pub(crate) from: usize,
    pub(crate) to: usize,
    pub(crate) kind: EdgeKind,
    pub(crate) direction: Direction,
    pub(crate) scope: Option<ScopeIndex>,
}

impl ProcedureEdge {
    /// Dense index within the procedure.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Order of the vertex bound first.
    pub fn from(&self) -> usize {
        self.from
    }

    /// Order of the vertex whose candidates this edge produces.
    pub fn to(&self) -> usize {
        self.to
    }

    /// Semantic kind.
    pub fn kind(&self) -> &EdgeKind {
        &self.kind
    }

    /// Walking direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Scope of the relation variable, for role-player edges.
    pub fn scope(&self) -> Option<ScopeIndex> {
        self.scope
    }

    /// Whether this edge constrains a vertex against itself.
    pub fn is_loop(&self) -> bool {
        self.from == self.to
    }

    /// Whether this is a role-player edge.
    pub fn is_role_player(&self) -> bool {
        matches!(self.kind, EdgeKind::RolePlayer { .. })
    }

    /// The same constraint walked from `to` back to `from`.
    pub fn reversed(&self) -> ProcedureEdge {
        ProcedureEdge {
            index: self.index,
            from: self.to,
            to: self.from,
            kind: self.kind.clone(),
            direction: self.direction.flip(),
            scope: self.scope,
        }
    }

    /// Ascending candidates for `to` given the bound `from_value`, filtered
    /// by the props of `to_vertex`.
    pub fn branch<'a, G: GraphManager + ?Sized>(
        &'a self,
        graph: &'a G,
        to_vertex: &'a ProcedureVertex,
        from_value: Vertex,
        params: &'a Parameters,
    ) -> Result<BoxCursor<'a, Vertex>> {
        let raw: BoxCursor<'a, Vertex> = match &self.kind {
            EdgeKind::Equal => Box::new(VecCursor::single(from_value)),
            EdgeKind::Predicate(op) => {
                self.predicate_candidates(graph, to_vertex, *op, from_value, params)?
            }
            EdgeKind::Sub { transitive } => {
                let ty = from_value.expect_type()?;
                let types = match (self.direction, *transitive) {
                    (Direction::Forward, true) => ancestors(graph, ty)?,
                    (Direction::Forward, false) => {
                        collect_types(graph.type_neighbours(ty, SchemaEdge::Sub, Dir::Out)?)?
                    }
                    (Direction::Backward, true) => descendants(graph, ty)?,
                    (Direction::Backward, false) => {
                        collect_types(graph.type_neighbours(ty, SchemaEdge::Sub, Dir::In)?)?
                    }
                };
                type_cursor(types)
            }
            EdgeKind::Owns { .. } | EdgeKind::Plays | EdgeKind::Relates => {
                let ty = from_value.expect_type()?;
                let edge = self
                    .kind
                    .schema_edge()
                    .ok_or(TraversalError::IllegalState("schema edge without schema kind"))?;
                type_cursor(inherited_declarations(graph, ty, edge, self.direction)?)
            }
            EdgeKind::Isa { transitive } => match self.direction {
                Direction::Forward => {
                    let ty = graph.thing_type(from_value.expect_thing()?)?;
                    if *transitive {
                        type_cursor(ancestors(graph, ty)?)
                    } else {
                        Box::new(TypeVertexCursor(VecCursor::single(ty)))
                    }
                }
                Direction::Backward => {
                    let ty = from_value.expect_type()?;
                    let types = if *transitive { descendants(graph, ty)? } else { vec![ty] };
                    let mut inputs: Vec<ThingCursor<'a>> = Vec::with_capacity(types.len());
                    for ty in types {
                        inputs.push(graph.instances(ty)?);
                    }
                    Box::new(ThingVertexCursor(MergeCursor::new(inputs)))
                }
            },
            EdgeKind::Has | EdgeKind::Playing | EdgeKind::Relating => {
                let thing = from_value.expect_thing()?;
                let edge = self
                    .kind
                    .data_edge()
                    .ok_or(TraversalError::IllegalState("data edge without data kind"))?;
                let dir = if self.direction.is_forward() { Dir::Out } else { Dir::In };
                Box::new(ThingVertexCursor(graph.thing_neighbours(thing, edge, dir)?))
            }
            EdgeKind::RolePlayer { .. } => {
                let branch = self.role_player_branch(graph, to_vertex, from_value, params)?;
                return Ok(Box::new(branch));
            }
        };
        Ok(Box::new(FilterCursor::new(raw, move |vertex| {
            to_vertex.accepts(graph, vertex, params)
        })))
    }

    /// Whether the constraint holds between two bound values.
    ///
    /// Role-player edges answer without regard to scope claims.
    pub fn is_closure<G: GraphManager + ?Sized>(
        &self,
        graph: &G,
        to_vertex: &ProcedureVertex,
        from_value: Vertex,
        to_value: Vertex,
        params: &Parameters,
    ) -> Result<bool> {
        match &self.kind {
            EdgeKind::Equal => Ok(from_value == to_value),
            EdgeKind::Predicate(op) => {
                let from = graph.attribute_value(from_value.expect_thing()?)?;
                let to = graph.attribute_value(to_value.expect_thing()?)?;
                Ok(match (from, to) {
                    (Some(from), Some(to)) => self.compare(*op, &from, &to),
                    _ => false,
                })
            }
            EdgeKind::RolePlayer { .. } => {
                let branch = self.role_player_branch(graph, to_vertex, from_value, params)?;
                let found = branch.roles(to_value).next().is_some();
                Ok(found)
            }
            _ => {
                let mut candidates = self.branch(graph, to_vertex, from_value, params)?;
                candidates.seek(to_value)?;
                Ok(candidates.peek()? == Some(to_value))
            }
        }
    }

    /// Every (target, role instance) pair reachable from `from_value`,
    /// restricted to targets accepted by `to_vertex`.
    pub fn role_player_branch<G: GraphManager + ?Sized>(
        &self,
        graph: &G,
        to_vertex: &ProcedureVertex,
        from_value: Vertex,
        params: &Parameters,
    ) -> Result<RolePlayerBranch> {
        let EdgeKind::RolePlayer { role_types } = &self.kind else {
            return Err(TraversalError::IllegalState("role-player branch on another edge kind"));
        };
        let role_filter: Option<Vec<TypeId>> = if role_types.is_empty() {
            None
        } else {
            Some(resolve_types(graph, role_types)?)
        };
        let thing = from_value.expect_thing()?;
        let (to_roles, to_target) = if self.direction.is_forward() {
            ((DataEdge::Relating, Dir::Out), (DataEdge::Playing, Dir::In))
        } else {
            ((DataEdge::Playing, Dir::Out), (DataEdge::Relating, Dir::In))
        };
        let mut pairs = Vec::new();
        let mut roles = graph.thing_neighbours(thing, to_roles.0, to_roles.1)?;
        while let Some(role) = roles.next()? {
            if let Some(filter) = &role_filter {
                if filter.binary_search(&graph.thing_type(role)?).is_err() {
                    continue;
                }
            }
            let mut targets = graph.thing_neighbours(role, to_target.0, to_target.1)?;
            while let Some(target) = targets.next()? {
                let target = Vertex::Thing(target);
                if to_vertex.accepts(graph, target, params)? {
                    pairs.push((target, role));
                }
            }
        }
        Ok(RolePlayerBranch::new(pairs))
    }

    fn predicate_candidates<'a, G: GraphManager + ?Sized>(
        &'a self,
        graph: &'a G,
        to_vertex: &'a ProcedureVertex,
        op: Comparator,
        from_value: Vertex,
        params: &'a Parameters,
    ) -> Result<BoxCursor<'a, Vertex>> {
        let Some(from) = graph.attribute_value(from_value.expect_thing()?)? else {
            return Ok(Box::new(EmptyCursor::new()));
        };
        let VertexProps::Thing(props) = to_vertex.props() else {
            return Err(TraversalError::IllegalState("predicate edge into a type vertex"));
        };
        let candidates: BoxCursor<'a, Vertex> = if props.has_iid {
            Box::new(ThingVertexCursor(VecCursor::single(params.iid(to_vertex.id())?)))
        } else {
            let types = if props.types.is_empty() {
                let mut comparable = Vec::new();
                for ty in resolve_types(graph, &props.types)? {
                    if graph.type_kind(ty)? != TypeKind::Attribute {
                        continue;
                    }
                    if let Some(kind) = graph.value_kind(ty)? {
                        if kind.is_comparable_to(from.kind()) {
                            comparable.push(ty);
                        }
                    }
                }
                comparable
            } else {
                resolve_types(graph, &props.types)?
            };
            let mut inputs: Vec<ThingCursor<'a>> = Vec::with_capacity(types.len());
            for ty in types {
                inputs.push(graph.instances(ty)?);
            }
            Box::new(ThingVertexCursor(MergeCursor::new(inputs)))
        };
        Ok(Box::new(FilterCursor::new(candidates, move |vertex| {
            let Some(to) = graph.attribute_value(vertex.expect_thing()?)? else {
                return Ok(false);
            };
            Ok(self.compare(op, &from, &to))
        })))
    }

    fn compare(&self, op: Comparator, from: &Value, to: &Value) -> bool {
        if self.direction.is_forward() {
            op.apply(from, to)
        } else {
            op.apply(to, from)
        }
    }
}

/// Materialised (target, role instance) pairs of a role-player edge, sorted
/// by target. As a cursor it yields each target once.
#[derive(Clone, Debug)]
pub struct RolePlayerBranch {
    pairs: Vec<(Vertex, ThingId)>,
    pos: usize,
}

impl RolePlayerBranch {
    fn new(mut pairs: Vec<(Vertex, ThingId)>) -> Self {
        pairs.sort_unstable();
        pairs.dedup();
        Self { pairs, pos: 0 }
    }

    /// Role instances through which `target` is reached, ascending.
    pub fn roles(&self, target: Vertex) -> impl Iterator<Item = ThingId> + '_ {
        let start = self.pairs.partition_point(|(vertex, _)| *vertex < target);
        self.pairs[start..]
            .iter()
            .take_while(move |(vertex, _)| *vertex == target)
            .map(|(_, role)| *role)
    }

    /// Whether no pair was found.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl SortedCursor for RolePlayerBranch {
    type Item = Vertex;

    fn peek(&mut self) -> Result<Option<Vertex>> {
        Ok(self.pairs.get(self.pos).map(|(vertex, _)| *vertex))
    }

    fn next(&mut self) -> Result<Option<Vertex>> {
        let Some(&(target, _)) = self.pairs.get(self.pos) else {
            return Ok(None);
        };
        while matches!(self.pairs.get(self.pos), Some((vertex, _)) if *vertex == target) {
            self.pos += 1;
        }
        Ok(Some(target))
    }

    fn seek(&mut self, target: Vertex) -> Result<()> {
        let rest = &self.pairs[self.pos..];
        self.pos += rest.partition_point(|(vertex, _)| *vertex < target);
        Ok(())
    }
}

fn type_cursor<'a>(types: Vec<TypeId>) -> BoxCursor<'a, Vertex> {
    Box::new(TypeVertexCursor(VecCursor::from_unsorted(types)))
}

fn collect_types(mut cursor: TypeCursor<'_>) -> Result<Vec<TypeId>> {
    collect(&mut cursor)
}

/// Declarations of `edge` reachable from `ty` once inheritance is applied.
///
/// Forward: everything `ty` or an ancestor declares. Backward: every type
/// that declares `ty`, together with all of its subtypes.
fn inherited_declarations<G: GraphManager + ?Sized>(
    graph: &G,
    ty: TypeId,
    edge: SchemaEdge,
    direction: Direction,
) -> Result<Vec<TypeId>> {
    let mut out = Vec::new();
    match direction {
        Direction::Forward => {
            for ancestor in ancestors(graph, ty)? {
                out.extend(collect_types(graph.type_neighbours(ancestor, edge, Dir::Out)?)?);
            }
        }
        Direction::Backward => {
            for declarer in collect_types(graph.type_neighbours(ty, edge, Dir::In)?)? {
                out.extend(descendants(graph, declarer)?);
            }
        }
    }
    Ok(out)
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Equal => f.write_str("equal"),
            EdgeKind::Predicate(op) => write!(f, "predicate({})", op.symbol()),
            EdgeKind::Sub { transitive: true } => f.write_str("sub"),
            EdgeKind::Sub { transitive: false } => f.write_str("sub!"),
            EdgeKind::Owns { key: false } => f.write_str("owns"),
            EdgeKind::Owns { key: true } => f.write_str("owns@key"),
            EdgeKind::Plays => f.write_str("plays"),
            EdgeKind::Relates => f.write_str("relates"),
            EdgeKind::Isa { transitive: true } => f.write_str("isa"),
            EdgeKind::Isa { transitive: false } => f.write_str("isa!"),
            EdgeKind::Has => f.write_str("has"),
            EdgeKind::Playing => f.write_str("playing"),
            EdgeKind::Relating => f.write_str("relating"),
            EdgeKind::RolePlayer { role_types } => {
                f.write_str("roleplayer")?;
                if !role_types.is_empty() {
                    let labels: Vec<&str> = role_types.iter().map(|label| label.as_ref()).collect();
                    write!(f, "[{}]", labels.join(","))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for ProcedureEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            Direction::Forward => "->",
            Direction::Backward => "<-",
        };
        write!(f, "#{} {} --{}{}-- {}", self.index, self.from, self.kind, arrow, self.to)?;
        if let Some(scope) = self.scope {
            write!(f, " ({scope})")?;
        }
        Ok(())
    }
}
