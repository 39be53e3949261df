//! Per-vertex search state.

use smallvec::SmallVec;

use crate::storage::cursor::{collect, BoxCursor, IntersectCursor, SortedCursor};
use crate::traversal::params::Order;
use crate::traversal::procedure::RolePlayerBranch;
use crate::types::{Result, ThingId, Vertex};

/// One input of a sort-merge join: a plain edge branch, or a role-player
/// branch that can also report the role instances behind each target.
pub(crate) enum InputBranch<'a> {
    Edge(BoxCursor<'a, Vertex>),
    RolePlayer(RolePlayerBranch),
}

impl SortedCursor for InputBranch<'_> {
    type Item = Vertex;

    fn peek(&mut self) -> Result<Option<Vertex>> {
        match self {
            InputBranch::Edge(cursor) => cursor.peek(),
            InputBranch::RolePlayer(branch) => branch.peek(),
        }
    }

    fn next(&mut self) -> Result<Option<Vertex>> {
        match self {
            InputBranch::Edge(cursor) => cursor.next(),
            InputBranch::RolePlayer(branch) => branch.next(),
        }
    }

    fn seek(&mut self, target: Vertex) -> Result<()> {
        match self {
            InputBranch::Edge(cursor) => cursor.seek(target),
            InputBranch::RolePlayer(branch) => branch.seek(target),
        }
    }
}

pub(crate) enum CandidateSource<'a> {
    /// Candidates from the vertex itself: the initial value or its own props.
    Own(BoxCursor<'a, Vertex>),
    /// Intersection of incoming edge branches, keyed by edge index.
    Joined {
        edges: SmallVec<[usize; 4]>,
        cursor: IntersectCursor<InputBranch<'a>>,
    },
}

/// Candidate stream of a traverser. Descending order drains the source and
/// replays it backwards; the drained branches stay around for role lookups.
pub(crate) struct Candidates<'a> {
    source: CandidateSource<'a>,
    descending: Option<std::iter::Rev<std::vec::IntoIter<Vertex>>>,
}

impl<'a> Candidates<'a> {
    pub(crate) fn new(source: CandidateSource<'a>, order: Order) -> Result<Self> {
        let mut candidates = Self {
            source,
            descending: None,
        };
        if order == Order::Desc {
            let drained = match &mut candidates.source {
                CandidateSource::Own(cursor) => collect(cursor)?,
                CandidateSource::Joined { cursor, .. } => collect(cursor)?,
            };
            candidates.descending = Some(drained.into_iter().rev());
        }
        Ok(candidates)
    }

    pub(crate) fn next(&mut self) -> Result<Option<Vertex>> {
        if let Some(descending) = &mut self.descending {
            return Ok(descending.next());
        }
        match &mut self.source {
            CandidateSource::Own(cursor) => cursor.next(),
            CandidateSource::Joined { cursor, .. } => cursor.next(),
        }
    }

    /// Role instances linking `target` through the role-player in-edge `edge`.
    pub(crate) fn roles(&self, edge: usize, target: Vertex) -> SmallVec<[ThingId; 4]> {
        let CandidateSource::Joined { edges, cursor } = &self.source else {
            return SmallVec::new();
        };
        edges
            .iter()
            .zip(cursor.inputs())
            .find_map(|(index, input)| match input {
                InputBranch::RolePlayer(branch) if *index == edge => {
                    Some(branch.roles(target).collect())
                }
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum CandidateState {
    Fresh,
    Active,
    Exhausted,
}

/// Search state of one procedure vertex.
pub(crate) struct VertexTraverser<'a> {
    pub(crate) order: usize,
    pub(crate) state: CandidateState,
    pub(crate) candidates: Option<Candidates<'a>>,
    pub(crate) vertex: Option<Vertex>,
    pub(crate) any_answer_found: bool,
    pub(crate) sort: Order,
    pub(crate) single_answer: bool,
    /// Role candidates of the bound value, per role-player in-edge or loop.
    pub(crate) edge_roles: SmallVec<[(usize, SmallVec<[ThingId; 4]>); 2]>,
}

impl<'a> VertexTraverser<'a> {
    pub(crate) fn new(order: usize, sort: Order, single_answer: bool) -> Self {
        Self {
            order,
            state: CandidateState::Fresh,
            candidates: None,
            vertex: None,
            any_answer_found: false,
            sort,
            single_answer,
            edge_roles: SmallVec::new(),
        }
    }

    /// Whether the traverser can yield nothing more until it is cleared.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.state == CandidateState::Exhausted
            || (self.single_answer && self.any_answer_found)
    }

    /// Marks the candidate stream exhausted and drops it.
    pub(crate) fn exhaust(&mut self) {
        self.state = CandidateState::Exhausted;
        self.candidates = None;
        self.vertex = None;
        self.edge_roles.clear();
    }

    /// Forgets everything, releasing the candidate cursor.
    pub(crate) fn clear(&mut self) {
        self.state = CandidateState::Fresh;
        self.candidates = None;
        self.vertex = None;
        self.any_answer_found = false;
        self.edge_roles.clear();
    }
}
