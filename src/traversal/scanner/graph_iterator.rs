//! Lazy answer enumeration over a [`Procedure`].
//!
//! The search binds vertices in procedure order. Each vertex draws candidates
//! from its own props (start vertices) or from the sort-merge intersection of
//! its incoming edge branches. When a vertex runs dry the search backjumps to
//! the highest vertex its candidates depend on, structurally or through a
//! shared relation scope.

use std::collections::{BTreeMap, BTreeSet};
use std::iter::FusedIterator;

use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::storage::cursor::{FilterCursor, IntersectCursor, VecCursor};
use crate::storage::manager::GraphManager;
use crate::traversal::options::TraversalOptions;
use crate::traversal::params::{Modifiers, Parameters};
use crate::traversal::procedure::{Procedure, ProcedureVertex};
use crate::traversal::profile::{
    profile_timer, record_candidate_build, record_profile_event, TraversalProfileKind,
};
use crate::traversal::scope::{assign_roles, ScopeIndex, Scopes, Source};
use crate::traversal::vertex_map::VertexMap;
use crate::types::{Result, ThingId, TraversalError, Vertex};

use super::traverser::{
    CandidateSource, CandidateState, Candidates, InputBranch, VertexTraverser,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum IteratorState {
    Init,
    Empty,
    Fetched,
    Completed,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SearchDirection {
    Traverse,
    Revisit,
}

type EdgeRoles = SmallVec<[(usize, SmallVec<[ThingId; 4]>); 2]>;

/// Lazy, single-pass sequence of answers to a procedure.
///
/// Call [`GraphIterator::has_next`] before [`GraphIterator::next_answer`], or
/// use the [`Iterator`] impl, which does both. Any error ends the sequence and
/// releases every cursor the search holds. Dropping the iterator early
/// releases them as well.
pub struct GraphIterator<'a, G: GraphManager + ?Sized> {
    graph: &'a G,
    procedure: &'a Procedure,
    params: &'a Parameters,
    modifiers: Modifiers,
    options: TraversalOptions,
    initial: Option<Vertex>,
    traversers: Vec<VertexTraverser<'a>>,
    scopes: Scopes,
    to_traverse: BTreeSet<usize>,
    to_revisit: BTreeSet<usize>,
    direction: SearchDirection,
    state: IteratorState,
}

impl<'a, G: GraphManager + ?Sized> GraphIterator<'a, G> {
    /// Searches `procedure` with default options.
    ///
    /// `initial`, when set, is the only candidate for vertex 0.
    pub fn new(
        graph: &'a G,
        initial: Option<Vertex>,
        procedure: &'a Procedure,
        params: &'a Parameters,
        modifiers: Modifiers,
    ) -> Result<Self> {
        Self::with_options(
            graph,
            initial,
            procedure,
            params,
            modifiers,
            TraversalOptions::default(),
        )
    }

    /// Searches `procedure` with explicit options.
    pub fn with_options(
        graph: &'a G,
        initial: Option<Vertex>,
        procedure: &'a Procedure,
        params: &'a Parameters,
        modifiers: Modifiers,
        options: TraversalOptions,
    ) -> Result<Self> {
        if let Some(sorting) = &modifiers.sorting {
            if let Some(missing) = sorting.variables().find(|id| procedure.find(id).is_none()) {
                return Err(TraversalError::InvalidProcedure(format!(
                    "sorted variable {missing} is not in the procedure"
                )));
            }
        }
        let traversers = procedure
            .vertices()
            .iter()
            .map(|vertex| {
                let single_answer =
                    options.single_answer_leaves && is_single_answer_leaf(vertex, &modifiers);
                VertexTraverser::new(vertex.order(), modifiers.order(vertex.id()), single_answer)
            })
            .collect();
        let scopes = Scopes::new(
            procedure.scope_count(),
            procedure.vertex_count(),
            procedure.edge_count(),
        );
        debug!(
            vertices = procedure.vertex_count(),
            edges = procedure.edge_count(),
            scopes = procedure.scope_count(),
            seeded = initial.is_some(),
            "graph_iterator.created"
        );
        Ok(Self {
            graph,
            procedure,
            params,
            modifiers,
            options,
            initial,
            traversers,
            scopes,
            to_traverse: BTreeSet::new(),
            to_revisit: BTreeSet::new(),
            direction: SearchDirection::Traverse,
            state: IteratorState::Init,
        })
    }

    /// Computes the next answer if none is pending.
    ///
    /// Returns `Ok(false)` once the search is exhausted. An error aborts the
    /// search for good.
    pub fn has_next(&mut self) -> Result<bool> {
        match self.state {
            IteratorState::Completed => return Ok(false),
            IteratorState::Fetched => return Ok(true),
            IteratorState::Init => {
                self.to_traverse.insert(0);
                self.direction = SearchDirection::Traverse;
            }
            IteratorState::Empty => {
                let ends = self.procedure.end_vertices().map(ProcedureVertex::order);
                self.to_revisit.extend(ends);
                self.direction = SearchDirection::Revisit;
            }
        }
        match self.compute_answer() {
            Ok(true) => {
                self.state = IteratorState::Fetched;
                record_profile_event(TraversalProfileKind::Answer);
                Ok(true)
            }
            Ok(false) => {
                debug!("graph_iterator.completed");
                self.recycle();
                Ok(false)
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    /// Takes the pending answer.
    ///
    /// Fails with [`TraversalError::Exhausted`] unless the last call to
    /// [`GraphIterator::has_next`] returned `true`.
    pub fn next_answer(&mut self) -> Result<VertexMap> {
        if self.state != IteratorState::Fetched {
            return Err(TraversalError::Exhausted);
        }
        self.state = IteratorState::Empty;
        self.answer()
    }

    /// Ends the sequence, releasing every cursor and scope claim held by the
    /// search.
    pub fn recycle(&mut self) {
        self.state = IteratorState::Completed;
        for traverser in &mut self.traversers {
            traverser.clear();
        }
        self.scopes.clear();
        self.to_traverse.clear();
        self.to_revisit.clear();
    }

    fn abort(&mut self, err: &TraversalError) {
        if err.is_resource_closed() {
            debug!(error = %err, "graph_iterator.resource_closed");
        } else if self.options.log_procedure_on_error {
            error!(
                error = %err,
                params = %self.params,
                procedure = %self.procedure,
                "graph_iterator.failed"
            );
        } else {
            error!(error = %err, "graph_iterator.failed");
        }
        self.recycle();
    }

    fn compute_answer(&mut self) -> Result<bool> {
        loop {
            match self.direction {
                SearchDirection::Traverse => match self.to_traverse.pop_first() {
                    Some(pos) => self.traverse(pos)?,
                    None => return Ok(true),
                },
                SearchDirection::Revisit => match self.to_revisit.pop_last() {
                    Some(pos) => self.revisit(pos),
                    None => return Ok(false),
                },
            }
        }
    }

    fn traverse(&mut self, pos: usize) -> Result<()> {
        record_profile_event(TraversalProfileKind::Traverse);
        match self.next_candidate(pos)? {
            Some(vertex) => {
                trace!(pos, %vertex, "graph_iterator.bound");
                if pos < self.procedure.last() {
                    self.clear_traverser(pos + 1);
                    self.to_traverse.insert(pos + 1);
                }
            }
            None => self.failed(pos),
        }
        Ok(())
    }

    fn failed(&mut self, pos: usize) {
        let procedure = self.procedure;
        let vertex = procedure.vertex(pos);
        let any_answer_found = self.traversers[pos].any_answer_found;
        self.release_claims(pos);
        self.traversers[pos].exhaust();
        self.to_revisit.extend(vertex.dependees().iter().copied());
        self.to_revisit.extend(vertex.implicit_dependees().iter().copied());
        if self.options.short_circuit && !any_answer_found && !vertex.is_start() {
            if let Some(last) = vertex.last_dependee() {
                for skipped in last + 1..pos {
                    self.to_revisit.remove(&skipped);
                    self.clear_traverser(skipped);
                }
                trace!(pos, last, "graph_iterator.short_circuit");
            }
        }
        trace!(pos, any_answer_found, "graph_iterator.failed_vertex");
        self.direction = SearchDirection::Revisit;
    }

    fn revisit(&mut self, pos: usize) {
        record_profile_event(TraversalProfileKind::Revisit);
        trace!(pos, "graph_iterator.revisit");
        for higher in pos + 1..self.traversers.len() {
            self.clear_traverser(higher);
        }
        self.to_traverse.insert(pos);
        self.direction = SearchDirection::Traverse;
    }

    fn next_candidate(&mut self, pos: usize) -> Result<Option<Vertex>> {
        if self.traversers[pos].is_exhausted() {
            return Ok(None);
        }
        if self.traversers[pos].state == CandidateState::Fresh {
            let start = profile_timer();
            let candidates = self.create_candidates(pos)?;
            record_candidate_build(start);
            let traverser = &mut self.traversers[pos];
            traverser.candidates = Some(candidates);
            traverser.state = CandidateState::Active;
        }
        loop {
            let next = match self.traversers[pos].candidates.as_mut() {
                Some(candidates) => candidates.next()?,
                None => None,
            };
            let Some(candidate) = next else {
                return Ok(None);
            };
            if self.accept(pos, candidate)? {
                let traverser = &mut self.traversers[pos];
                traverser.vertex = Some(candidate);
                traverser.any_answer_found = true;
                return Ok(Some(candidate));
            }
            record_profile_event(TraversalProfileKind::Rejected);
            trace!(pos, %candidate, "graph_iterator.rejected");
        }
    }

    fn create_candidates(&self, pos: usize) -> Result<Candidates<'a>> {
        let (graph, procedure, params) = (self.graph, self.procedure, self.params);
        let vertex = procedure.vertex(pos);
        let source = match self.initial {
            Some(initial) if pos == 0 => CandidateSource::Own(Box::new(FilterCursor::new(
                VecCursor::single(initial),
                move |value| vertex.accepts(graph, value, params),
            ))),
            _ if vertex.is_start() => CandidateSource::Own(vertex.iterate(graph, params)?),
            _ => {
                let mut edges = SmallVec::new();
                let mut inputs = Vec::with_capacity(vertex.ins().len());
                for &index in vertex.ins() {
                    let edge = procedure.edge(index);
                    let from = self.traversers[edge.from()]
                        .vertex
                        .ok_or(TraversalError::IllegalState("edge from an unbound vertex"))?;
                    let input = if edge.is_role_player() {
                        InputBranch::RolePlayer(edge.role_player_branch(graph, vertex, from, params)?)
                    } else {
                        InputBranch::Edge(edge.branch(graph, vertex, from, params)?)
                    };
                    edges.push(index);
                    inputs.push(input);
                }
                CandidateSource::Joined {
                    edges,
                    cursor: IntersectCursor::new(inputs),
                }
            }
        };
        Candidates::new(source, self.traversers[pos].sort)
    }

    /// Checks loops and scope claims for `candidate`, committing its claims
    /// when it is accepted.
    fn accept(&mut self, pos: usize, candidate: Vertex) -> Result<bool> {
        let (graph, procedure, params) = (self.graph, self.procedure, self.params);
        let vertex = procedure.vertex(pos);
        self.release_claims(pos);

        for &index in vertex.loops() {
            let edge = procedure.edge(index);
            if !edge.is_role_player()
                && !edge.is_closure(graph, vertex, candidate, candidate, params)?
            {
                return Ok(false);
            }
        }

        let mut own_roles: EdgeRoles = SmallVec::new();
        for &index in vertex.ins() {
            if procedure.edge(index).is_role_player() {
                let roles = self.traversers[pos]
                    .candidates
                    .as_ref()
                    .map(|candidates| candidates.roles(index, candidate))
                    .unwrap_or_default();
                own_roles.push((index, roles));
            }
        }
        for &index in vertex.loops() {
            let edge = procedure.edge(index);
            if edge.is_role_player() {
                let branch = edge.role_player_branch(graph, vertex, candidate, params)?;
                own_roles.push((index, branch.roles(candidate).collect()));
            }
        }
        if own_roles.iter().any(|(_, roles)| roles.is_empty()) {
            return Ok(false);
        }

        let own_claim = match vertex.scope() {
            Some(scope) => {
                let role = candidate.expect_thing()?;
                if self.scopes.held_by_vertex(scope, role, pos) {
                    return Ok(false);
                }
                Some((scope, role))
            }
            None => None,
        };

        let mut assignments: SmallVec<[(ScopeIndex, Vec<(usize, ThingId)>); 2]> = SmallVec::new();
        for &scope in vertex.participation() {
            let mut claimants: Vec<(usize, &[ThingId])> = Vec::new();
            for traverser in &self.traversers[..pos] {
                for (index, roles) in &traverser.edge_roles {
                    if procedure.edge(*index).scope() == Some(scope) {
                        claimants.push((*index, roles.as_slice()));
                    }
                }
            }
            for (index, roles) in &own_roles {
                if procedure.edge(*index).scope() == Some(scope) {
                    claimants.push((*index, roles.as_slice()));
                }
            }
            let reserved = own_claim
                .filter(|(own_scope, _)| *own_scope == scope)
                .map(|(_, role)| role);
            let scopes = &self.scopes;
            let forbidden =
                |role: ThingId| Some(role) == reserved || scopes.held_by_vertex(scope, role, pos);
            let lists: Vec<&[ThingId]> = claimants.iter().map(|(_, roles)| *roles).collect();
            let Some(picked) = assign_roles(&lists, &forbidden) else {
                return Ok(false);
            };
            let edges = claimants.iter().map(|(index, _)| *index);
            assignments.push((scope, edges.zip(picked).collect()));
        }

        let vertex_slot = self.scopes.slot(Source::Vertex(pos));
        for (scope, picked) in assignments {
            let slots: Vec<(usize, ThingId)> = picked
                .into_iter()
                .map(|(index, role)| (self.scopes.slot(Source::Edge(index)), role))
                .collect();
            let ledger = self
                .scopes
                .get_mut(scope)
                .ok_or(TraversalError::IllegalState("unknown scope"))?;
            for (slot, _) in &slots {
                ledger.release(*slot);
            }
            if let Some((own_scope, role)) = own_claim {
                if own_scope == scope && !ledger.claim(vertex_slot, role) {
                    return Err(TraversalError::IllegalState("role instance claimed twice"));
                }
            }
            for (slot, role) in slots {
                if !ledger.claim(slot, role) {
                    return Err(TraversalError::IllegalState("role instance claimed twice"));
                }
            }
        }
        self.traversers[pos].edge_roles = own_roles;
        Ok(true)
    }

    fn release_claims(&mut self, pos: usize) {
        let procedure = self.procedure;
        let vertex = procedure.vertex(pos);
        let vertex_slot = self.scopes.slot(Source::Vertex(pos));
        for &scope in vertex.participation() {
            let edge_slots: SmallVec<[usize; 4]> = vertex
                .ins()
                .iter()
                .chain(vertex.loops())
                .filter(|&&index| procedure.edge(index).scope() == Some(scope))
                .map(|&index| self.scopes.slot(Source::Edge(index)))
                .collect();
            if let Some(ledger) = self.scopes.get_mut(scope) {
                ledger.release(vertex_slot);
                for slot in edge_slots {
                    ledger.release(slot);
                }
            }
        }
        self.traversers[pos].edge_roles.clear();
    }

    fn clear_traverser(&mut self, pos: usize) {
        self.release_claims(pos);
        self.traversers[pos].clear();
    }

    fn answer(&self) -> Result<VertexMap> {
        let mut bindings = BTreeMap::new();
        for (vertex, traverser) in self.procedure.vertices().iter().zip(&self.traversers) {
            let id = vertex.id();
            if id.is_retrievable() && self.modifiers.filter.contains(id) {
                let bound = traverser
                    .vertex
                    .ok_or(TraversalError::IllegalState("answer with an unbound vertex"))?;
                bindings.insert(id.clone(), bound);
            }
        }
        Ok(VertexMap::new(bindings))
    }
}

impl<G: GraphManager + ?Sized> Iterator for GraphIterator<'_, G> {
    type Item = Result<VertexMap>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_answer()),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl<G: GraphManager + ?Sized> FusedIterator for GraphIterator<'_, G> {}

/// An unprojected, unnamed leaf that only needs one witness per binding of
/// its single parent.
fn is_single_answer_leaf(vertex: &ProcedureVertex, modifiers: &Modifiers) -> bool {
    !vertex.id().is_name()
        && !modifiers.filter.contains(vertex.id())
        && vertex.ins().len() == 1
        && vertex.outs().is_empty()
        && vertex.loops().is_empty()
        && vertex.participation().is_empty()
}
