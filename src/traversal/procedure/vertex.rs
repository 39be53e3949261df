use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::storage::cursor::{
    BoxCursor, FilterCursor, MergeCursor, SortedCursor, ThingVertexCursor, TypeVertexCursor,
    VecCursor,
};
use crate::storage::manager::{GraphManager, ThingCursor};
use crate::traversal::identifier::Identifier;
use crate::traversal::params::{ParamId, Parameters};
use crate::traversal::scope::ScopeIndex;
use crate::types::{Comparator, Result, ThingId, TypeId, ValueKind, Vertex, VertexKind};

/// Constraints a type vertex places on its own candidates.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TypeProps {
    /// Allowed labels; empty allows every type.
    pub labels: BTreeSet<Arc<str>>,
    /// Allowed attribute value kinds; empty allows every type.
    pub value_kinds: BTreeSet<ValueKind>,
    /// Only abstract types qualify.
    pub abstract_only: bool,
}

impl TypeProps {
    /// Props allowing exactly the given labels.
    pub fn of_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// `value <op> $param` constraint on an attribute vertex.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ValuePredicate {
    /// Comparison applied with the attribute value on the left.
    pub op: Comparator,
    /// Literal on the right.
    pub param: ParamId,
}

/// Constraints a thing vertex places on its own candidates.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ThingProps {
    /// The vertex is bound to the thing supplied as its iid parameter.
    pub has_iid: bool,
    /// Allowed type labels, already expanded to subtypes; empty allows any.
    pub types: BTreeSet<Arc<str>>,
    /// Value constraints; a non-attribute never satisfies one.
    pub predicates: Vec<ValuePredicate>,
}

impl ThingProps {
    /// Props allowing instances of the given type labels.
    pub fn of_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Props bound to the vertex's iid parameter.
    pub fn with_iid() -> Self {
        Self {
            has_iid: true,
            ..Self::default()
        }
    }

    /// Adds a value predicate.
    pub fn predicate(mut self, op: Comparator, param: ParamId) -> Self {
        self.predicates.push(ValuePredicate { op, param });
        self
    }
}

/// Vertex-local constraints, one variant per vertex kind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VertexProps {
    /// Schema type vertex.
    Type(TypeProps),
    /// Data instance vertex.
    Thing(ThingProps),
}

impl VertexProps {
    /// Kind of the vertices this props block accepts.
    pub fn kind(&self) -> VertexKind {
        match self {
            VertexProps::Type(_) => VertexKind::Type,
            VertexProps::Thing(_) => VertexKind::Thing,
        }
    }
}

/// One query variable of a procedure.
#[derive(Clone, Debug)]
pub struct ProcedureVertex {
    pub(crate) order: usize,
    pub(crate) id: Identifier,
    pub(crate) props: VertexProps,
    pub(crate) ins: SmallVec<[usize; 4]>,
    pub(crate) outs: SmallVec<[usize; 4]>,
    pub(crate) loops: SmallVec<[usize; 2]>,
    pub(crate) dependees: Vec<usize>,
    pub(crate) implicit_dependees: Vec<usize>,
    pub(crate) last_dependee: Option<usize>,
    pub(crate) scope: Option<ScopeIndex>,
    pub(crate) participation: Vec<ScopeIndex>,
}

impl ProcedureVertex {
    /// Position in the visiting order.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Identifier of the variable.
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// Vertex-local constraints.
    pub fn props(&self) -> &VertexProps {
        &self.props
    }

    /// Whether this is a type vertex.
    pub fn is_type(&self) -> bool {
        self.props.kind() == VertexKind::Type
    }

    /// Indices of edges arriving from lower-order vertices.
    pub fn ins(&self) -> &[usize] {
        &self.ins
    }

    /// Indices of edges leaving towards higher-order vertices.
    pub fn outs(&self) -> &[usize] {
        &self.outs
    }

    /// Indices of self edges.
    pub fn loops(&self) -> &[usize] {
        &self.loops
    }

    /// Orders of the `from` vertices of [`ProcedureVertex::ins`], ascending.
    pub fn dependees(&self) -> &[usize] {
        &self.dependees
    }

    /// Lower-order vertices competing with this one for role instances.
    pub fn implicit_dependees(&self) -> &[usize] {
        &self.implicit_dependees
    }

    /// Highest order among explicit and implicit dependees.
    pub fn last_dependee(&self) -> Option<usize> {
        self.last_dependee
    }

    /// Whether the vertex has no incoming edges.
    pub fn is_start(&self) -> bool {
        self.ins.is_empty()
    }

    /// Whether the vertex has no outgoing edges.
    pub fn is_end(&self) -> bool {
        self.outs.is_empty()
    }

    /// Scope this role-instance vertex belongs to.
    pub fn scope(&self) -> Option<ScopeIndex> {
        self.scope
    }

    /// Scopes this vertex claims role instances in, through its own scope or
    /// through incoming and loop role-player edges. Ascending.
    pub fn participation(&self) -> &[ScopeIndex] {
        &self.participation
    }

    /// Candidates of a start vertex, derived from its own props.
    pub fn iterate<'a, G: GraphManager + ?Sized>(
        &'a self,
        graph: &'a G,
        params: &'a Parameters,
    ) -> Result<BoxCursor<'a, Vertex>> {
        let candidates: BoxCursor<'a, Vertex> = match &self.props {
            VertexProps::Type(props) => Box::new(TypeVertexCursor(VecCursor::from_sorted(
                resolve_types(graph, &props.labels)?,
            ))),
            VertexProps::Thing(props) => {
                if props.has_iid {
                    let thing = params.iid(&self.id)?;
                    Box::new(ThingVertexCursor(VecCursor::single(thing)))
                } else {
                    let types = resolve_types(graph, &props.types)?;
                    let mut inputs: Vec<ThingCursor<'a>> = Vec::with_capacity(types.len());
                    for ty in types {
                        inputs.push(graph.instances(ty)?);
                    }
                    Box::new(ThingVertexCursor(MergeCursor::new(inputs)))
                }
            }
        };
        Ok(Box::new(FilterCursor::new(candidates, move |vertex| {
            self.accepts(graph, vertex, params)
        })))
    }

    /// Whether `vertex` satisfies this vertex's own props.
    pub fn accepts<G: GraphManager + ?Sized>(
        &self,
        graph: &G,
        vertex: Vertex,
        params: &Parameters,
    ) -> Result<bool> {
        match (&self.props, vertex) {
            (VertexProps::Type(props), Vertex::Type(ty)) => accepts_type(graph, props, ty),
            (VertexProps::Thing(props), Vertex::Thing(thing)) => {
                self.accepts_thing(graph, props, thing, params)
            }
            _ => Ok(false),
        }
    }

    fn accepts_thing<G: GraphManager + ?Sized>(
        &self,
        graph: &G,
        props: &ThingProps,
        thing: ThingId,
        params: &Parameters,
    ) -> Result<bool> {
        if props.has_iid && params.iid(&self.id)? != thing {
            return Ok(false);
        }
        if !props.types.is_empty() {
            let label = graph.type_label(graph.thing_type(thing)?)?;
            if !props.types.contains(&label) {
                return Ok(false);
            }
        }
        if props.predicates.is_empty() {
            return Ok(true);
        }
        let Some(value) = graph.attribute_value(thing)? else {
            return Ok(false);
        };
        for predicate in &props.predicates {
            if !predicate.op.apply(&value, params.value(predicate.param)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn accepts_type<G: GraphManager + ?Sized>(graph: &G, props: &TypeProps, ty: TypeId) -> Result<bool> {
    if !props.labels.is_empty() && !props.labels.contains(&graph.type_label(ty)?) {
        return Ok(false);
    }
    if !props.value_kinds.is_empty() {
        match graph.value_kind(ty)? {
            Some(kind) if props.value_kinds.contains(&kind) => {}
            _ => return Ok(false),
        }
    }
    if props.abstract_only && !graph.is_abstract(ty)? {
        return Ok(false);
    }
    Ok(true)
}

/// Resolves type labels, or every type when `labels` is empty. Unknown
/// labels resolve to nothing.
pub(crate) fn resolve_types<G: GraphManager + ?Sized>(
    graph: &G,
    labels: &BTreeSet<Arc<str>>,
) -> Result<Vec<TypeId>> {
    if labels.is_empty() {
        let mut all = graph.all_types()?;
        let mut out = Vec::new();
        while let Some(ty) = all.next()? {
            out.push(ty);
        }
        return Ok(out);
    }
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        if let Some(ty) = graph.type_by_label(label)? {
            out.push(ty);
        }
    }
    out.sort_unstable();
    Ok(out)
}

impl fmt::Display for ProcedureVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.order, self.id)?;
        match &self.props {
            VertexProps::Type(props) => {
                f.write_str(" [type")?;
                if !props.labels.is_empty() {
                    write!(f, " labels={:?}", props.labels)?;
                }
                if !props.value_kinds.is_empty() {
                    write!(f, " value_kinds={:?}", props.value_kinds)?;
                }
                if props.abstract_only {
                    f.write_str(" abstract")?;
                }
            }
            VertexProps::Thing(props) => {
                f.write_str(" [thing")?;
                if props.has_iid {
                    f.write_str(" iid")?;
                }
                if !props.types.is_empty() {
                    write!(f, " types={:?}", props.types)?;
                }
                for predicate in &props.predicates {
                    write!(f, " {} #{}", predicate.op.symbol(), predicate.param.0)?;
                }
            }
        }
        f.write_str("]")
    }
}
