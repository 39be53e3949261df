use std::collections::BTreeMap;
use std::fmt;

use crate::types::Vertex;

use super::identifier::Identifier;

/// One answer: projected identifiers bound to graph vertices.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VertexMap {
    bindings: BTreeMap<Identifier, Vertex>,
}

impl VertexMap {
    /// Wraps already-projected bindings.
    pub fn new(bindings: BTreeMap<Identifier, Vertex>) -> Self {
        Self { bindings }
    }

    /// Vertex bound to `id`.
    pub fn get(&self, id: &Identifier) -> Option<Vertex> {
        self.bindings.get(id).copied()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Vertex)> {
        self.bindings.iter()
    }

    /// Consumes the answer.
    pub fn into_inner(self) -> BTreeMap<Identifier, Vertex> {
        self.bindings
    }
}

impl FromIterator<(Identifier, Vertex)> for VertexMap {
    fn from_iter<T: IntoIterator<Item = (Identifier, Vertex)>>(iter: T) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for VertexMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (id, vertex)) in self.bindings.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id} -> {vertex}")?;
        }
        f.write_str("}")
    }
}
