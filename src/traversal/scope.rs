//! Role-instance claim ledgers, one per relation variable.
//!
//! A claimant ("source") is either a scoped procedure vertex or a role-player
//! edge. Sources are addressed by a dense slot: the vertex order, or the vertex
//! count plus the edge index.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::ThingId;

/// Dense index of a scope variable within a procedure.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ScopeIndex(pub usize);

/// Something that can claim a role instance.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Source {
    /// Scoped vertex, by order.
    Vertex(usize),
    /// Role-player edge, by index.
    Edge(usize),
}

/// Claims within one scope.
#[derive(Clone, Debug)]
pub struct Scope {
    claims: Vec<Option<ThingId>>,
    holders: FxHashMap<ThingId, usize>,
}

impl Scope {
    fn new(slots: usize) -> Self {
        Self {
            claims: vec![None; slots],
            holders: FxHashMap::default(),
        }
    }

    /// Slot currently holding `role`.
    pub fn holder(&self, role: ThingId) -> Option<usize> {
        self.holders.get(&role).copied()
    }

    /// Role currently claimed by `slot`.
    pub fn claimed(&self, slot: usize) -> Option<ThingId> {
        self.claims.get(slot).copied().flatten()
    }

    /// Claims `role` for `slot`, replacing the slot's previous claim.
    ///
    /// Returns `false` and changes nothing when another slot holds `role`.
    pub fn claim(&mut self, slot: usize, role: ThingId) -> bool {
        match self.holder(role) {
            Some(holder) if holder != slot => return false,
            Some(_) => return true,
            None => {}
        }
        self.release(slot);
        self.claims[slot] = Some(role);
        self.holders.insert(role, slot);
        true
    }

    /// Drops whatever `slot` holds.
    pub fn release(&mut self, slot: usize) {
        if let Some(role) = self.claims.get_mut(slot).and_then(Option::take) {
            self.holders.remove(&role);
        }
    }

    /// Number of live claims.
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// Whether nothing is claimed.
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

/// Every scope of one search, owned by a single iterator.
#[derive(Clone, Debug)]
pub struct Scopes {
    scopes: Vec<Scope>,
    vertex_count: usize,
}

impl Scopes {
    /// Ledgers for `scope_count` scopes over a procedure with the given
    /// vertex and edge counts.
    pub fn new(scope_count: usize, vertex_count: usize, edge_count: usize) -> Self {
        let slots = vertex_count + edge_count;
        Self {
            scopes: (0..scope_count).map(|_| Scope::new(slots)).collect(),
            vertex_count,
        }
    }

    /// Dense slot of `source`.
    pub fn slot(&self, source: Source) -> usize {
        match source {
            Source::Vertex(order) => order,
            Source::Edge(index) => self.vertex_count + index,
        }
    }

    /// Ledger of `scope`.
    pub fn get(&self, scope: ScopeIndex) -> Option<&Scope> {
        self.scopes.get(scope.0)
    }

    /// Mutable ledger of `scope`.
    pub fn get_mut(&mut self, scope: ScopeIndex) -> Option<&mut Scope> {
        self.scopes.get_mut(scope.0)
    }

    /// Whether `role` is held in `scope` by a scoped vertex other than `except`.
    pub fn held_by_vertex(&self, scope: ScopeIndex, role: ThingId, except: usize) -> bool {
        self.get(scope)
            .and_then(|scope| scope.holder(role))
            .is_some_and(|holder| holder < self.vertex_count && holder != except)
    }

    /// Releases every claim in every scope.
    pub fn clear(&mut self) {
        for scope in &mut self.scopes {
            scope.claims.iter_mut().for_each(|claim| *claim = None);
            scope.holders.clear();
        }
    }

    /// Total live claims.
    pub fn claim_count(&self) -> usize {
        self.scopes.iter().map(Scope::len).sum()
    }
}

/// Picks one distinct role per claimant, each from its own candidate list.
///
/// Roles for which `forbidden` returns `true` are never picked. Returns the
/// picked role per claimant, or `None` when no injective assignment exists.
/// Candidate lists are tried in ascending order, so the result is
/// deterministic.
pub(crate) fn assign_roles(
    candidates: &[&[ThingId]],
    forbidden: &dyn Fn(ThingId) -> bool,
) -> Option<Vec<ThingId>> {
    let mut owner: FxHashMap<ThingId, usize> = FxHashMap::default();
    for claimant in 0..candidates.len() {
        let mut visited = FxHashSet::default();
        if !augment(claimant, candidates, forbidden, &mut owner, &mut visited) {
            return None;
        }
    }
    let mut picked = vec![None; candidates.len()];
    for (role, claimant) in owner {
        picked[claimant] = Some(role);
    }
    picked.into_iter().collect()
}

fn augment(
    claimant: usize,
    candidates: &[&[ThingId]],
    forbidden: &dyn Fn(ThingId) -> bool,
    owner: &mut FxHashMap<ThingId, usize>,
    visited: &mut FxHashSet<ThingId>,
) -> bool {
    for &role in candidates[claimant] {
        if forbidden(role) || !visited.insert(role) {
            continue;
        }
        let free = match owner.get(&role).copied() {
            None => true,
            Some(other) => augment(other, candidates, forbidden, owner, visited),
        };
        if free {
            owner.insert(role, claimant);
            return true;
        }
    }
    false
}

impl fmt::Display for ScopeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}
