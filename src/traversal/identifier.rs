//! Names of procedure vertices.

use std::fmt;
use std::sync::Arc;

/// A query variable.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Variable {
    /// Named variable written by the user, e.g. `$p`.
    Name(Arc<str>),
    /// Variable generated by the planner for an unnamed pattern element.
    Anonymous(u32),
    /// A type referenced by label; never part of an answer.
    Label(Arc<str>),
}

/// Identifier of a procedure vertex.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Identifier {
    /// A plain variable.
    Variable(Variable),
    /// A role instance living in the relation bound to `scope`.
    Scoped {
        /// Relation variable owning the role instance.
        scope: Variable,
        /// Planner-assigned discriminator within the scope.
        id: u32,
    },
}

impl Identifier {
    /// Named variable `$name`.
    pub fn name(name: &str) -> Self {
        Identifier::Variable(Variable::Name(Arc::from(name)))
    }

    /// Anonymous variable `$_id`.
    pub fn anon(id: u32) -> Self {
        Identifier::Variable(Variable::Anonymous(id))
    }

    /// Type label.
    pub fn label(label: &str) -> Self {
        Identifier::Variable(Variable::Label(Arc::from(label)))
    }

    /// Role instance `id` inside the relation bound to `scope`.
    pub fn scoped(scope: Identifier, id: u32) -> Option<Self> {
        match scope {
            Identifier::Variable(variable) => Some(Identifier::Scoped { scope: variable, id }),
            Identifier::Scoped { .. } => None,
        }
    }

    /// Whether answers may carry this identifier.
    pub fn is_retrievable(&self) -> bool {
        matches!(
            self,
            Identifier::Variable(Variable::Name(_)) | Identifier::Variable(Variable::Anonymous(_))
        )
    }

    /// Whether this is a user-named variable.
    pub fn is_name(&self) -> bool {
        matches!(self, Identifier::Variable(Variable::Name(_)))
    }

    /// The relation variable of a scoped identifier.
    pub fn scope(&self) -> Option<&Variable> {
        match self {
            Identifier::Scoped { scope, .. } => Some(scope),
            Identifier::Variable(_) => None,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Name(name) => write!(f, "${name}"),
            Variable::Anonymous(id) => write!(f, "$_{id}"),
            Variable::Label(label) => f.write_str(label),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Variable(variable) => variable.fmt(f),
            Identifier::Scoped { scope, id } => write!(f, "{scope}:role:{id}"),
        }
    }
}

impl From<Variable> for Identifier {
    fn from(value: Variable) -> Self {
        Identifier::Variable(value)
    }
}
