//! Compiled query plans: ordered vertices joined by directed constraints.

mod edge;
mod vertex;

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::types::{Result, TraversalError};

pub use edge::{Direction, EdgeKind, ProcedureEdge, RolePlayerBranch};
pub use vertex::{ProcedureVertex, ThingProps, TypeProps, ValuePredicate, VertexProps};

use super::identifier::{Identifier, Variable};
use super::scope::ScopeIndex;

/// An immutable, validated plan.
///
/// Vertex orders are dense from zero and every non-loop edge runs from a
/// lower order to a higher one.
#[derive(Clone, Debug)]
pub struct Procedure {
    vertices: Vec<ProcedureVertex>,
    edges: Vec<ProcedureEdge>,
    scopes: Vec<Variable>,
}

impl Procedure {
    /// Starts a new plan.
    pub fn builder() -> ProcedureBuilder {
        ProcedureBuilder::default()
    }

    /// Vertex at `order`.
    ///
    /// # Panics
    ///
    /// Panics if `order` is not below [`Procedure::vertex_count`].
    pub fn vertex(&self, order: usize) -> &ProcedureVertex {
        &self.vertices[order]
    }

    /// Edge at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Procedure::edge_count`].
    pub fn edge(&self, index: usize) -> &ProcedureEdge {
        &self.edges[index]
    }

    /// Vertices in visiting order.
    pub fn vertices(&self) -> &[ProcedureVertex] {
        &self.vertices
    }

    /// Edges by index.
    pub fn edges(&self) -> &[ProcedureEdge] {
        &self.edges
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges, loops included.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Vertices without incoming edges.
    pub fn start_vertices(&self) -> impl Iterator<Item = &ProcedureVertex> {
        self.vertices.iter().filter(|vertex| vertex.is_start())
    }

    /// Vertices without outgoing edges.
    pub fn end_vertices(&self) -> impl Iterator<Item = &ProcedureVertex> {
        self.vertices.iter().filter(|vertex| vertex.is_end())
    }

    /// The vertex visited first, which receives the caller's initial value.
    pub fn initial_vertex(&self) -> &ProcedureVertex {
        &self.vertices[0]
    }

    /// Highest vertex order.
    pub fn last(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Number of distinct scope variables.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Relation variable owning `scope`.
    pub fn scope_variable(&self, scope: ScopeIndex) -> Option<&Variable> {
        self.scopes.get(scope.0)
    }

    /// Vertex named `id`.
    pub fn find(&self, id: &Identifier) -> Option<&ProcedureVertex> {
        self.vertices.iter().find(|vertex| vertex.id() == id)
    }

    /// Whether every vertex is a type vertex.
    pub fn is_type_only(&self) -> bool {
        self.vertices.iter().all(ProcedureVertex::is_type)
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Procedure {{")?;
        for vertex in &self.vertices {
            writeln!(f, "  {vertex}")?;
        }
        for edge in &self.edges {
            writeln!(f, "  {edge}")?;
        }
        write!(f, "}}")
    }
}

#[derive(Clone, Debug)]
struct PendingEdge {
    from: usize,
    to: usize,
    kind: EdgeKind,
    direction: Direction,
}

/// Assembles and validates a [`Procedure`].
///
/// Vertices receive orders in insertion order; edges receive indices in
/// insertion order.
#[derive(Clone, Debug, Default)]
pub struct ProcedureBuilder {
    vertices: Vec<(Identifier, VertexProps)>,
    edges: Vec<PendingEdge>,
}

impl ProcedureBuilder {
    /// Adds a type vertex and returns its order.
    pub fn type_vertex(&mut self, id: Identifier, props: TypeProps) -> usize {
        self.vertices.push((id, VertexProps::Type(props)));
        self.vertices.len() - 1
    }

    /// Adds a thing vertex and returns its order.
    pub fn thing_vertex(&mut self, id: Identifier, props: ThingProps) -> usize {
        self.vertices.push((id, VertexProps::Thing(props)));
        self.vertices.len() - 1
    }

    /// Adds an edge and returns its index.
    pub fn edge(&mut self, from: usize, to: usize, kind: EdgeKind, direction: Direction) -> usize {
        self.edges.push(PendingEdge {
            from,
            to,
            kind,
            direction,
        });
        self.edges.len() - 1
    }

    /// Validates the plan and precomputes dependency sets.
    pub fn build(self) -> Result<Procedure> {
        if self.vertices.is_empty() {
            return Err(invalid("procedure has no vertices"));
        }
        let mut seen = BTreeSet::new();
        for (id, _) in &self.vertices {
            if !seen.insert(id) {
                return Err(invalid(format!("duplicate vertex {id}")));
            }
        }

        let mut scope_lookup: FxHashMap<Variable, ScopeIndex> = FxHashMap::default();
        let mut scopes: Vec<Variable> = Vec::new();
        let mut scope_of = |variable: &Variable| -> ScopeIndex {
            *scope_lookup.entry(variable.clone()).or_insert_with(|| {
                scopes.push(variable.clone());
                ScopeIndex(scopes.len() - 1)
            })
        };

        let mut vertices: Vec<ProcedureVertex> = Vec::with_capacity(self.vertices.len());
        for (order, (id, props)) in self.vertices.into_iter().enumerate() {
            let scope = id.scope().map(&mut scope_of);
            vertices.push(ProcedureVertex {
                order,
                id,
                props,
                ins: SmallVec::new(),
                outs: SmallVec::new(),
                loops: SmallVec::new(),
                dependees: Vec::new(),
                implicit_dependees: Vec::new(),
                last_dependee: None,
                scope,
                participation: Vec::new(),
            });
        }

        let mut edges = Vec::with_capacity(self.edges.len());
        for (index, pending) in self.edges.into_iter().enumerate() {
            let PendingEdge {
                from,
                to,
                kind,
                direction,
            } = pending;
            if from >= vertices.len() || to >= vertices.len() {
                return Err(invalid(format!("edge #{index} references a missing vertex")));
            }
            if from > to {
                return Err(invalid(format!(
                    "edge #{index} runs from order {from} back to order {to}"
                )));
            }
            let (from_kind, to_kind) = (vertices[from].props.kind(), vertices[to].props.kind());
            let compatible = match kind.endpoint_kinds() {
                None => from_kind == to_kind,
                Some((source, target)) => match direction {
                    Direction::Forward => from_kind == source && to_kind == target,
                    Direction::Backward => from_kind == target && to_kind == source,
                },
            };
            if !compatible {
                return Err(invalid(format!(
                    "edge #{index} ({kind}) cannot join {} and {}",
                    vertices[from].id, vertices[to].id
                )));
            }
            let scope = if matches!(kind, EdgeKind::RolePlayer { .. }) {
                let relation = match direction {
                    Direction::Forward => &vertices[from].id,
                    Direction::Backward => &vertices[to].id,
                };
                match relation {
                    Identifier::Variable(variable) => Some(scope_of(variable)),
                    Identifier::Scoped { .. } => {
                        return Err(invalid(format!(
                            "edge #{index} uses role instance {relation} as a relation"
                        )))
                    }
                }
            } else {
                None
            };
            if from == to {
                vertices[from].loops.push(index);
            } else {
                vertices[from].outs.push(index);
                vertices[to].ins.push(index);
            }
            edges.push(ProcedureEdge {
                index,
                from,
                to,
                kind,
                direction,
                scope,
            });
        }

        for vertex in &vertices {
            if vertex.is_start() {
                if let VertexProps::Thing(props) = &vertex.props {
                    if !props.has_iid && props.types.is_empty() {
                        return Err(invalid(format!(
                            "start vertex {} has neither an iid nor types",
                            vertex.id
                        )));
                    }
                }
            }
        }

        compute_dependees(&mut vertices, &edges);
        trace!(
            vertices = vertices.len(),
            edges = edges.len(),
            scopes = scopes.len(),
            "procedure.built"
        );
        Ok(Procedure {
            vertices,
            edges,
            scopes,
        })
    }
}

/// Fills explicit dependees from incoming edges and implicit dependees from
/// shared scopes.
///
/// A vertex takes part in a scope when it is a scoped role-instance vertex or
/// when one of its incoming or loop edges is a role-player edge of that scope.
/// Every lower-order participant of a shared scope is an implicit dependee.
fn compute_dependees(vertices: &mut [ProcedureVertex], edges: &[ProcedureEdge]) {
    let participation: Vec<BTreeSet<ScopeIndex>> = vertices
        .iter()
        .map(|vertex| {
            let mut scopes: BTreeSet<ScopeIndex> = vertex.scope.into_iter().collect();
            for &index in vertex.ins.iter().chain(vertex.loops.iter()) {
                if let Some(scope) = edges[index].scope {
                    scopes.insert(scope);
                }
            }
            scopes
        })
        .collect();

    for order in 0..vertices.len() {
        let mut dependees: Vec<usize> = vertices[order]
            .ins
            .iter()
            .map(|&index| edges[index].from)
            .collect();
        dependees.sort_unstable();
        dependees.dedup();

        let implicit: Vec<usize> = (0..order)
            .filter(|&lower| !participation[order].is_disjoint(&participation[lower]))
            .collect();

        let last = dependees.iter().chain(implicit.iter()).copied().max();
        let vertex = &mut vertices[order];
        vertex.dependees = dependees;
        vertex.implicit_dependees = implicit;
        vertex.last_dependee = last;
        vertex.participation = participation[order].iter().copied().collect();
    }
}

fn invalid(message: impl Into<String>) -> TraversalError {
    TraversalError::InvalidProcedure(message.into())
}
