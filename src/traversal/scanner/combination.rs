//! Type-level feasibility of a type-only procedure.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::storage::cursor::SortedCursor;
use crate::storage::manager::GraphManager;
use crate::traversal::identifier::Identifier;
use crate::traversal::params::Parameters;
use crate::traversal::procedure::{Procedure, ProcedureEdge, ProcedureVertex};
use crate::types::{Result, TraversalError, TypeId, Vertex};

/// Per-variable candidate type sets.
pub type Combination = BTreeMap<Identifier, BTreeSet<TypeId>>;

/// Narrows the candidate types of every vertex by propagating edge
/// constraints forward and backward until nothing changes.
///
/// Sets only ever shrink once seeded, so the fixpoint terminates.
pub struct CombinationFinder<'a, G: GraphManager + ?Sized> {
    graph: &'a G,
    procedure: &'a Procedure,
    filter: BTreeSet<Identifier>,
    concrete: BTreeSet<Identifier>,
    params: Parameters,
}

impl<'a, G: GraphManager + ?Sized> CombinationFinder<'a, G> {
    /// Prepares a search over `procedure`, which must contain only type
    /// vertices. Variables in `concrete` never keep abstract types.
    pub fn new(
        graph: &'a G,
        procedure: &'a Procedure,
        filter: impl IntoIterator<Item = Identifier>,
        concrete: impl IntoIterator<Item = Identifier>,
    ) -> Result<Self> {
        if !procedure.is_type_only() {
            return Err(TraversalError::IllegalState(
                "combination search over a procedure with thing vertices",
            ));
        }
        Ok(Self {
            graph,
            procedure,
            filter: filter.into_iter().collect(),
            concrete: concrete.into_iter().collect(),
            params: Parameters::new(),
        })
    }

    /// Surviving type sets of the filtered variables, or `None` when some
    /// variable has no admissible type left.
    pub fn combination(&self) -> Result<Option<Combination>> {
        let procedure = self.procedure;
        let mut sets: Vec<Option<BTreeSet<TypeId>>> = vec![None; procedure.vertex_count()];
        for vertex in procedure.start_vertices() {
            let mut seeded = BTreeSet::new();
            let mut candidates = vertex.iterate(self.graph, &self.params)?;
            while let Some(candidate) = candidates.next()? {
                seeded.insert(candidate.expect_type()?);
            }
            sets[vertex.order()] = Some(self.concrete_only(vertex, seeded)?);
        }

        let mut rounds = 0usize;
        loop {
            rounds += 1;
            let mut changed = false;
            for vertex in procedure.vertices() {
                changed |= self.forward(vertex, &mut sets)?;
            }
            for vertex in procedure.vertices().iter().rev() {
                changed |= self.backward(vertex, &mut sets)?;
            }
            if sets.iter().flatten().any(BTreeSet::is_empty) {
                debug!(rounds, "combination.unsatisfiable");
                return Ok(None);
            }
            if !changed {
                break;
            }
        }
        debug!(rounds, "combination.fixpoint");

        let mut combination = Combination::new();
        for (vertex, set) in procedure.vertices().iter().zip(sets) {
            if self.filter.contains(vertex.id()) {
                combination.insert(vertex.id().clone(), set.unwrap_or_default());
            }
        }
        Ok(Some(combination))
    }

    fn forward(&self, vertex: &ProcedureVertex, sets: &mut [Option<BTreeSet<TypeId>>]) -> Result<bool> {
        let procedure = self.procedure;
        let Some(current) = sets[vertex.order()].clone() else {
            return Ok(false);
        };
        let mut changed = false;
        if !vertex.loops().is_empty() {
            let mut kept = BTreeSet::new();
            for &ty in &current {
                let mut closed = true;
                for &index in vertex.loops() {
                    let edge = procedure.edge(index);
                    let value = Vertex::Type(ty);
                    if !edge.is_closure(self.graph, vertex, value, value, &self.params)? {
                        closed = false;
                        break;
                    }
                }
                if closed {
                    kept.insert(ty);
                }
            }
            changed |= narrow(&mut sets[vertex.order()], kept);
        }
        for &index in vertex.outs() {
            let edge = procedure.edge(index);
            let source = sets[vertex.order()].clone().unwrap_or_default();
            let reachable = self.reachable(edge, procedure.vertex(edge.to()), &source)?;
            let reachable = self.concrete_only(procedure.vertex(edge.to()), reachable)?;
            changed |= narrow(&mut sets[edge.to()], reachable);
        }
        Ok(changed)
    }

    fn backward(&self, vertex: &ProcedureVertex, sets: &mut [Option<BTreeSet<TypeId>>]) -> Result<bool> {
        let procedure = self.procedure;
        let mut changed = false;
        for &index in vertex.ins() {
            let Some(current) = sets[vertex.order()].clone() else {
                return Ok(changed);
            };
            let reversed = procedure.edge(index).reversed();
            let target = procedure.vertex(reversed.to());
            let reachable = self.reachable(&reversed, target, &current)?;
            let reachable = self.concrete_only(target, reachable)?;
            changed |= narrow(&mut sets[target.order()], reachable);
        }
        Ok(changed)
    }

    fn reachable(
        &self,
        edge: &ProcedureEdge,
        target: &ProcedureVertex,
        from: &BTreeSet<TypeId>,
    ) -> Result<BTreeSet<TypeId>> {
        let mut reachable = BTreeSet::new();
        for &ty in from {
            let mut branch = edge.branch(self.graph, target, Vertex::Type(ty), &self.params)?;
            while let Some(next) = branch.next()? {
                reachable.insert(next.expect_type()?);
            }
        }
        trace!(edge = %edge, from = from.len(), reachable = reachable.len(), "combination.edge");
        Ok(reachable)
    }

    fn concrete_only(
        &self,
        vertex: &ProcedureVertex,
        mut types: BTreeSet<TypeId>,
    ) -> Result<BTreeSet<TypeId>> {
        if !self.concrete.contains(vertex.id()) {
            return Ok(types);
        }
        let mut abstract_types = Vec::new();
        for &ty in &types {
            if self.graph.is_abstract(ty)? {
                abstract_types.push(ty);
            }
        }
        for ty in abstract_types {
            types.remove(&ty);
        }
        Ok(types)
    }
}

/// Seeds `slot` with `candidates` or intersects it with them. Returns whether
/// the slot changed.
fn narrow(slot: &mut Option<BTreeSet<TypeId>>, candidates: BTreeSet<TypeId>) -> bool {
    match slot {
        None => {
            *slot = Some(candidates);
            true
        }
        Some(current) => {
            let before = current.len();
            current.retain(|ty| candidates.contains(ty));
            current.len() != before
        }
    }
}
