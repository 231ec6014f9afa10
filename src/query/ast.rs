//! Condition tree for CRUD request filters.

use super::field_path::FieldPath;
use crate::core::{CrudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single comparable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Null, also standing in for an absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String literal
    String(String),
    /// Timestamp, serialized as RFC 3339
    Date(DateTime<Utc>),
}

impl Scalar {
    /// Convert a JSON value; arrays and objects are not scalars.
    pub fn from_json(value: &serde_json::Value) -> Option<Scalar> {
        use serde_json::Value;
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Scalar::Int(i)),
                None => n.as_f64().map(Scalar::Float),
            },
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert back into a plain JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::String(s) => Value::String(s.clone()),
            Scalar::Date(d) => Value::String(d.to_rfc3339()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// String form used for pattern building (LIKE, regex, begins_with).
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::String(s) => s.clone(),
            Scalar::Date(d) => d.to_rfc3339(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<i32> for Scalar {
    fn from(i: i32) -> Self {
        Scalar::Int(i64::from(i))
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(d: DateTime<Utc>) -> Self {
        Scalar::Date(d)
    }
}

/// Value attached to a field condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhereValue {
    /// A single scalar
    Scalar(Scalar),
    /// A list of scalars (`in`, `not_in`, `between`, ...)
    List(Vec<Scalar>),
}

impl Default for WhereValue {
    fn default() -> Self {
        WhereValue::Scalar(Scalar::Null)
    }
}

impl WhereValue {
    /// Convert a JSON value, accepting scalars and arrays of scalars.
    pub fn from_json(value: &serde_json::Value) -> Option<WhereValue> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(Scalar::from_json)
                .collect::<Option<Vec<_>>>()
                .map(WhereValue::List),
            other => Scalar::from_json(other).map(WhereValue::Scalar),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            WhereValue::Scalar(s) => Some(s),
            WhereValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            WhereValue::List(items) => Some(items),
            WhereValue::Scalar(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            WhereValue::Scalar(s) => s.to_json(),
            WhereValue::List(items) => {
                serde_json::Value::Array(items.iter().map(Scalar::to_json).collect())
            },
        }
    }
}

macro_rules! where_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for WhereValue {
                fn from(value: $ty) -> Self {
                    WhereValue::Scalar(value.into())
                }
            }

            impl From<Vec<$ty>> for WhereValue {
                fn from(values: Vec<$ty>) -> Self {
                    WhereValue::List(values.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

where_value_from!(&str, String, i64, i32, f64, bool, DateTime<Utc>);

impl From<Scalar> for WhereValue {
    fn from(value: Scalar) -> Self {
        WhereValue::Scalar(value)
    }
}

impl From<Vec<Scalar>> for WhereValue {
    fn from(values: Vec<Scalar>) -> Self {
        WhereValue::List(values)
    }
}

/// Shape of value an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// One scalar, null allowed
    Primitive,
    /// A non-empty list of scalars
    Array,
    /// Null or `true`
    Empty,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Starts,
    Ends,
    Contains,
    NotContains,
    In,
    NotIn,
    Between,
    IsNull,
    NotNull,
    EqLower,
    NeqLower,
    StartsLower,
    EndsLower,
    ContainsLower,
    NotContainsLower,
    InLower,
    NotInLower,
}

impl Operator {
    /// Every operator, in declaration order.
    pub const ALL: [Operator; 23] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::Starts,
        Operator::Ends,
        Operator::Contains,
        Operator::NotContains,
        Operator::In,
        Operator::NotIn,
        Operator::Between,
        Operator::IsNull,
        Operator::NotNull,
        Operator::EqLower,
        Operator::NeqLower,
        Operator::StartsLower,
        Operator::EndsLower,
        Operator::ContainsLower,
        Operator::NotContainsLower,
        Operator::InLower,
        Operator::NotInLower,
    ];

    pub fn value_kind(self) -> ValueKind {
        match self {
            Operator::In
            | Operator::NotIn
            | Operator::Between
            | Operator::InLower
            | Operator::NotInLower => ValueKind::Array,
            Operator::IsNull | Operator::NotNull => ValueKind::Empty,
            _ => ValueKind::Primitive,
        }
    }

    /// Canonical snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Starts => "starts",
            Operator::Ends => "ends",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Between => "between",
            Operator::IsNull => "is_null",
            Operator::NotNull => "not_null",
            Operator::EqLower => "eq_lower",
            Operator::NeqLower => "neq_lower",
            Operator::StartsLower => "starts_lower",
            Operator::EndsLower => "ends_lower",
            Operator::ContainsLower => "contains_lower",
            Operator::NotContainsLower => "not_contains_lower",
            Operator::InLower => "in_lower",
            Operator::NotInLower => "not_in_lower",
        }
    }

    /// Look an operator up by its `$`-prefixed search token (`$eq`, `$contL`, ...).
    pub fn from_search_token(token: &str) -> Option<Operator> {
        let op = match token {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Neq,
            "$gt" => Operator::Gt,
            "$lt" => Operator::Lt,
            "$gte" => Operator::Gte,
            "$lte" => Operator::Lte,
            "$starts" => Operator::Starts,
            "$ends" => Operator::Ends,
            "$cont" => Operator::Contains,
            "$excl" => Operator::NotContains,
            "$in" => Operator::In,
            "$notin" => Operator::NotIn,
            "$between" => Operator::Between,
            "$isnull" => Operator::IsNull,
            "$notnull" => Operator::NotNull,
            "$eqL" => Operator::EqLower,
            "$neL" => Operator::NeqLower,
            "$startsL" => Operator::StartsLower,
            "$endsL" => Operator::EndsLower,
            "$contL" => Operator::ContainsLower,
            "$exclL" => Operator::NotContainsLower,
            "$inL" => Operator::InLower,
            "$notinL" => Operator::NotInLower,
            _ => return None,
        };
        Some(op)
    }

    /// Check that `value` has the shape this operator accepts.
    pub fn validate(self, value: &WhereValue) -> Result<()> {
        match (self.value_kind(), value) {
            (ValueKind::Primitive, WhereValue::Scalar(_)) => Ok(()),
            (ValueKind::Primitive, WhereValue::List(_)) => {
                Err(CrudError::invalid_value(self, "expected a primitive value"))
            },
            (ValueKind::Array, WhereValue::List(items)) => {
                if self == Operator::Between && items.len() != 2 {
                    return Err(CrudError::invalid_value(
                        self,
                        format!("expected exactly 2 values, got {}", items.len()),
                    ));
                }
                if items.is_empty() {
                    return Err(CrudError::invalid_value(self, "expected a non-empty array"));
                }
                Ok(())
            },
            (ValueKind::Array, WhereValue::Scalar(_)) => {
                Err(CrudError::invalid_value(self, "expected an array value"))
            },
            (ValueKind::Empty, WhereValue::Scalar(Scalar::Null | Scalar::Bool(true))) => Ok(()),
            (ValueKind::Empty, _) => Err(CrudError::invalid_value(
                self,
                "expected no value, null or true",
            )),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "AND"),
            LogicalOp::Or => write!(f, "OR"),
        }
    }
}

/// A leaf comparison: `field operator value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub field: FieldPath,
    pub operator: Operator,
    #[serde(default)]
    pub value: WhereValue,
}

impl FieldCondition {
    /// Build a validated leaf.
    pub fn new(field: FieldPath, operator: Operator, value: WhereValue) -> Result<Self> {
        operator.validate(&value)?;
        Ok(Self {
            field,
            operator,
            value,
        })
    }
}

/// Recursive boolean filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Where {
    /// All children must hold
    And { and: Vec<Where> },
    /// At least one child must hold
    Or { or: Vec<Where> },
    /// Single comparison
    Field(FieldCondition),
}

impl Default for Where {
    fn default() -> Self {
        Where::And { and: Vec::new() }
    }
}

impl Where {
    pub fn and(children: Vec<Where>) -> Self {
        Where::And { and: children }
    }

    pub fn or(children: Vec<Where>) -> Self {
        Where::Or { or: children }
    }

    /// Leaf constructor that validates the value shape.
    pub fn field<P, V>(path: P, operator: Operator, value: V) -> Result<Self>
    where
        P: Into<FieldPath>,
        V: Into<WhereValue>,
    {
        FieldCondition::new(path.into(), operator, value.into()).map(Where::Field)
    }

    /// True for an AND/OR with no children.
    pub fn is_empty(&self) -> bool {
        match self {
            Where::And { and } => and.is_empty(),
            Where::Or { or } => or.is_empty(),
            Where::Field(_) => false,
        }
    }

    /// Visit every leaf in document order.
    pub fn leaves(&self) -> Vec<&FieldCondition> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a FieldCondition>) {
        match self {
            Where::And { and: children } | Where::Or { or: children } => {
                for child in children {
                    child.collect_leaves(out);
                }
            },
            Where::Field(condition) => out.push(condition),
        }
    }

    /// Keep only leaves accepted by `keep`; brackets are preserved even when emptied.
    /// A rejected leaf at the root leaves an empty AND.
    pub fn retain_leaves<F>(&mut self, keep: &F)
    where
        F: Fn(&FieldCondition) -> bool,
    {
        match self {
            Where::And { and: children } | Where::Or { or: children } => {
                children.retain(|child| match child {
                    Where::Field(condition) => keep(condition),
                    _ => true,
                });
                for child in children.iter_mut() {
                    child.retain_leaves(keep);
                }
            },
            Where::Field(condition) => {
                if !keep(condition) {
                    *self = Where::default();
                }
            },
        }
    }
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Where::And { and: children } | Where::Or { or: children } => {
                let op = if matches!(self, Where::And { .. }) {
                    LogicalOp::And
                } else {
                    LogicalOp::Or
                };
                let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(&format!(" {} ", op)))
            },
            Where::Field(c) => write!(f, "{} {} {}", c.field, c.operator, c.value.to_json()),
        }
    }
}
