//! Attribute values and the comparisons that value predicates evaluate.
use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;

/// Attribute value tagged with its kind so parameter files stay unambiguous.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Boolean value.
    Boolean(bool),
    /// Signed 64-bit integer value.
    Long(i64),
    /// 64-bit floating point value.
    Double(f64),
    /// UTF-8 string value.
    String(String),
    /// Milliseconds since Unix epoch in UTC.
    #[serde(deserialize_with = "serde_datetime::deserialize")]
    DateTime(i64),
}

/// Kind tag of a [`Value`], also declared by attribute types.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ValueKind {
    /// Boolean values.
    Boolean,
    /// Integer values.
    Long,
    /// Floating point values.
    Double,
    /// String values.
    String,
    /// Timestamps.
    DateTime,
}

impl ValueKind {
    /// Value kinds whose values can be compared against values of `self`.
    pub fn comparables(self) -> &'static [ValueKind] {
        match self {
            ValueKind::Boolean => &[ValueKind::Boolean],
            ValueKind::Long | ValueKind::Double => &[ValueKind::Long, ValueKind::Double],
            ValueKind::String => &[ValueKind::String],
            ValueKind::DateTime => &[ValueKind::DateTime],
        }
    }

    /// Returns `true` when values of both kinds can be compared.
    pub fn is_comparable_to(self, other: ValueKind) -> bool {
        self.comparables().contains(&other)
    }
}

impl Value {
    /// Returns the kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Long(_) => ValueKind::Long,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::DateTime(_) => ValueKind::DateTime,
        }
    }

    /// Orders two values, or returns `None` when their kinds are incomparable.
    ///
    /// Longs and doubles compare numerically with each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Long(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Long(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Binary comparison applied by value predicates and predicate edges.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Comparator {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Strictly greater.
    Gt,
    /// Greater or equal.
    Gte,
    /// Strictly less.
    Lt,
    /// Less or equal.
    Lte,
    /// Left string contains the right string, case-insensitively.
    Contains,
}

impl Comparator {
    /// Evaluates `lhs <op> rhs`. Incomparable kinds never satisfy a comparator.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> bool {
        let expected: &[Ordering] = match self {
            Comparator::Contains => {
                return match (lhs, rhs) {
                    (Value::String(haystack), Value::String(needle)) => haystack
                        .to_lowercase()
                        .contains(needle.to_lowercase().as_str()),
                    _ => false,
                };
            }
            Comparator::Eq => &[Ordering::Equal],
            Comparator::Neq => &[Ordering::Less, Ordering::Greater],
            Comparator::Gt => &[Ordering::Greater],
            Comparator::Gte => &[Ordering::Greater, Ordering::Equal],
            Comparator::Lt => &[Ordering::Less],
            Comparator::Lte => &[Ordering::Less, Ordering::Equal],
        };
        lhs.compare(rhs)
            .is_some_and(|ordering| expected.contains(&ordering))
    }

    /// Symbol used when rendering procedures.
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Neq => "!=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
            Comparator::Contains => "contains",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::DateTime(v) => write!(f, "@{v}"),
        }
    }
}

mod serde_datetime {
    use serde::de::{self, Deserializer, Visitor};
    use std::fmt;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DateTimeVisitor;

        impl<'de> Visitor<'de> for DateTimeVisitor {
            type Value = i64;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a string or number of milliseconds since Unix epoch")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                i64::try_from(value)
                    .map_err(|_| E::custom(format!("datetime literal {value} out of range")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse::<i64>()
                    .map_err(|err| E::custom(format!("invalid datetime literal '{value}': {err}")))
            }
        }

        deserializer.deserialize_any(DateTimeVisitor)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longs_and_doubles_compare_numerically() {
        assert!(Comparator::Lt.apply(&Value::Long(2), &Value::Double(2.5)));
        assert!(Comparator::Eq.apply(&Value::Double(3.0), &Value::Long(3)));
        assert_eq!(ValueKind::Long.comparables(), ValueKind::Double.comparables());
    }

    #[test]
    fn incomparable_kinds_never_match() {
        assert!(!Comparator::Neq.apply(&Value::Long(1), &Value::from("1")));
        assert!(!Comparator::Contains.apply(&Value::Long(1), &Value::Long(1)));
    }

    #[test]
    fn contains_ignores_case() {
        assert!(Comparator::Contains.apply(&Value::from("Admin@OpenCTI"), &Value::from("opencti")));
    }

    #[test]
    fn datetime_accepts_string_literal() {
        let parsed: Value = toml::from_str::<Wrapper>("value = { t = \"DateTime\", v = \"1700\" }")
            .expect("parse datetime")
            .value;
        assert_eq!(parsed, Value::DateTime(1700));
    }

    #[derive(Deserialize)]
    struct Wrapper {
        value: Value,
    }
}
