//! Bound parameters and answer modifiers supplied alongside a procedure.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::types::{Result, ThingId, TraversalError, Value};

use super::identifier::Identifier;

/// Index of a literal value referenced by a value predicate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(transparent)]
pub struct ParamId(pub u32);

/// Literal bindings referenced by a procedure.
#[derive(Clone, Debug, Default)]
pub struct Parameters {
    iids: FxHashMap<Identifier, ThingId>,
    values: FxHashMap<ParamId, Value>,
}

impl Parameters {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the vertex `id` to a known thing.
    pub fn with_iid(mut self, id: Identifier, thing: ThingId) -> Self {
        self.iids.insert(id, thing);
        self
    }

    /// Binds literal `param` to `value`.
    pub fn with_value(mut self, param: ParamId, value: Value) -> Self {
        self.values.insert(param, value);
        self
    }

    /// Thing bound to `id`.
    pub fn iid(&self, id: &Identifier) -> Result<ThingId> {
        self.iids
            .get(id)
            .copied()
            .ok_or_else(|| TraversalError::MissingParameter(format!("iid of {id}")))
    }

    /// Literal bound to `param`.
    pub fn value(&self, param: ParamId) -> Result<&Value> {
        self.values
            .get(&param)
            .ok_or_else(|| TraversalError::MissingParameter(format!("value #{}", param.0)))
    }

    /// Parses a parameter file. Iids bind named variables.
    ///
    /// ```toml
    /// [[iid]]
    /// var = "x"
    /// thing = 3
    ///
    /// [[value]]
    /// param = 0
    /// value = { t = "Long", v = 4 }
    /// ```
    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: ParametersFile = toml::from_str(contents)?;
        let mut params = Parameters::new();
        for entry in file.iid {
            params = params.with_iid(Identifier::name(&entry.var), ThingId(entry.thing));
        }
        for entry in file.value {
            params = params.with_value(entry.param, entry.value);
        }
        Ok(params)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ParametersFile {
    #[serde(default)]
    iid: Vec<IidEntry>,
    #[serde(default)]
    value: Vec<ValueEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IidEntry {
    var: String,
    thing: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ValueEntry {
    param: ParamId,
    value: Value,
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iids: Vec<_> = self.iids.iter().collect();
        iids.sort();
        let mut values: Vec<_> = self.values.iter().collect();
        values.sort_by_key(|(param, _)| **param);
        f.write_str("{")?;
        let mut first = true;
        for (id, thing) in iids {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{id} iid {thing}")?;
        }
        for (param, value) in values {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "#{} = {value}", param.0)?;
        }
        f.write_str("}")
    }
}

/// Requested direction for a sorted variable.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Ascending store order.
    #[default]
    Asc,
    /// Descending store order.
    Desc,
}

/// Per-variable sort requests, in priority order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Sorting {
    variables: Vec<(Identifier, Order)>,
}

impl Sorting {
    /// Sorting over `variables`.
    pub fn new(variables: Vec<(Identifier, Order)>) -> Self {
        Self { variables }
    }

    /// Requested order for `id`, if it is sorted.
    pub fn order(&self, id: &Identifier) -> Option<Order> {
        self.variables
            .iter()
            .find(|(variable, _)| variable == id)
            .map(|(_, order)| *order)
    }

    /// Sorted variables in priority order.
    pub fn variables(&self) -> impl Iterator<Item = &Identifier> {
        self.variables.iter().map(|(id, _)| id)
    }

    /// Parses named sort requests, kept in file order.
    ///
    /// ```toml
    /// [[sort]]
    /// var = "x"
    /// order = "desc"
    /// ```
    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct SortingFile {
            #[serde(default)]
            sort: Vec<SortEntry>,
        }

        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct SortEntry {
            var: String,
            #[serde(default)]
            order: Order,
        }

        let file: SortingFile = toml::from_str(contents)?;
        Ok(Sorting::new(
            file.sort
                .into_iter()
                .map(|entry| (Identifier::name(&entry.var), entry.order))
                .collect(),
        ))
    }
}

/// Projection and ordering applied to answers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Modifiers {
    /// Identifiers kept in each answer.
    pub filter: BTreeSet<Identifier>,
    /// Optional sort request.
    pub sorting: Option<Sorting>,
}

impl Modifiers {
    /// Modifiers projecting onto `filter`.
    pub fn new(filter: impl IntoIterator<Item = Identifier>) -> Self {
        Self {
            filter: filter.into_iter().collect(),
            sorting: None,
        }
    }

    /// Adds a sort request.
    pub fn with_sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = Some(sorting);
        self
    }

    /// Requested order for `id`, ascending when unsorted.
    pub fn order(&self, id: &Identifier) -> Order {
        self.sorting
            .as_ref()
            .and_then(|sorting| sorting.order(id))
            .unwrap_or_default()
    }
}
