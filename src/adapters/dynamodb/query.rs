//! Request inputs for GetItem, Query and Scan, and the typed attribute
//! values they carry.

use crate::query::{FieldPath, Scalar};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

/// Typed attribute value in DynamoDB JSON form (`{"N": "3"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    L(Vec<AttributeValue>),
    M(BTreeMap<String, AttributeValue>),
}

/// One stored item.
pub type Item = BTreeMap<String, AttributeValue>;

impl AttributeValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null(true),
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => AttributeValue::N(n.to_string()),
            Value::String(s) => AttributeValue::S(s.clone()),
            Value::Array(items) => AttributeValue::L(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => AttributeValue::M(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::S(s) => Value::String(s.clone()),
            AttributeValue::N(n) => parse_number(n),
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Null(_) => Value::Null,
            AttributeValue::L(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            AttributeValue::M(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&Scalar> for AttributeValue {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Null => AttributeValue::Null(true),
            Scalar::Bool(b) => AttributeValue::Bool(*b),
            Scalar::Int(i) => AttributeValue::N(i.to_string()),
            Scalar::Float(f) => AttributeValue::N(f.to_string()),
            Scalar::String(s) => AttributeValue::S(s.clone()),
            Scalar::Date(d) => AttributeValue::S(d.to_rfc3339()),
        }
    }
}

fn parse_number(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Convert an item into a plain JSON object.
pub fn unmarshall(item: &Item) -> Value {
    Value::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<Map<String, Value>>(),
    )
}

/// Values returned by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Select {
    AllAttributes,
    AllProjectedAttributes,
    SpecificAttributes,
    Count,
}

/// Which API a query is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    GetItem,
    Query,
    Scan,
}

/// Output of a Query or Scan call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    pub count: u64,
    /// Set when the read stopped at the 1 MB page boundary.
    pub last_evaluated_key: Option<Item>,
}

/// Shared input of GetItem, Query and Scan. Which call it is follows from
/// `key` and `key_condition_expression`, see [`DynamoQuery::kind`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DynamoQuery {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_condition_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_expression: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expression_attribute_names: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expression_attribute_values: BTreeMap<String, AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_index_forward: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Select>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive_start_key: Option<Item>,
}

/// Placeholder shared by every null comparison.
pub const NULL_PLACEHOLDER: &str = ":null";

fn sanitize(path: &FieldPath) -> String {
    path.to_string()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// How a value placeholder gets bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueBinding {
    /// The placeholder itself.
    Single,
    /// `_start` and `_end`.
    Range,
    /// `_0` through `_{n-1}`.
    List(usize),
}

impl ValueBinding {
    /// Names bound from `placeholder`.
    pub fn names(self, placeholder: &str) -> Vec<String> {
        match self {
            ValueBinding::Single => vec![placeholder.to_string()],
            ValueBinding::Range => vec![format!("{}_start", placeholder), format!("{}_end", placeholder)],
            ValueBinding::List(len) => (0..len).map(|i| format!("{}_{}", placeholder, i)).collect(),
        }
    }
}

impl DynamoQuery {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            ..Self::default()
        }
    }

    pub fn kind(&self) -> QueryKind {
        if self.key.is_some() {
            QueryKind::GetItem
        } else if self.key_condition_expression.is_some() {
            QueryKind::Query
        } else {
            QueryKind::Scan
        }
    }

    /// Name token for `path`. The same path always gets the same token; a
    /// different path that sanitizes to a taken token gets a numeric suffix.
    pub fn register_attribute(&mut self, path: &FieldPath) -> String {
        let field = path.to_string();
        let base = format!("#{}", sanitize(path));

        let mut name = base.clone();
        let mut i = 1;
        while let Some(existing) = self.expression_attribute_names.get(&name) {
            if *existing == field {
                return name;
            }
            name = format!("{}{}", base, i);
            i += 1;
        }

        self.expression_attribute_names.insert(name.clone(), field);
        name
    }

    fn is_placeholder_taken(&self, name: &str, binding: ValueBinding) -> bool {
        let values = &self.expression_attribute_values;
        name == NULL_PLACEHOLDER
            || values.contains_key(name)
            || values.contains_key(&format!("{}_start", name))
            || values.contains_key(&format!("{}_0", name))
            || binding.names(name).iter().any(|bound| values.contains_key(bound))
    }

    /// Free value placeholder derived from `path`. Nothing is bound yet;
    /// every name `binding` will produce from it is free.
    pub fn value_placeholder(&self, path: &FieldPath, binding: ValueBinding) -> String {
        let base = format!(":{}", sanitize(path));
        if !self.is_placeholder_taken(&base, binding) {
            return base;
        }
        (1..)
            .map(|i| format!("{}{}", base, i))
            .find(|name| !self.is_placeholder_taken(name, binding))
            .unwrap_or(base)
    }

    pub fn bind(&mut self, placeholder: String, value: AttributeValue) {
        self.expression_attribute_values.insert(placeholder, value);
    }

    /// Register and bind one value for `path`.
    pub fn register_value(&mut self, path: &FieldPath, value: &Scalar) -> String {
        let placeholder = self.value_placeholder(path, ValueBinding::Single);
        self.bind(placeholder.clone(), value.into());
        placeholder
    }

    /// The shared `:null` placeholder, bound on first use.
    pub fn null_value(&mut self) -> &'static str {
        self.expression_attribute_values
            .entry(NULL_PLACEHOLDER.to_string())
            .or_insert(AttributeValue::Null(true));
        NULL_PLACEHOLDER
    }

    /// AND an expression onto the existing filter.
    pub fn add_filter(&mut self, expression: String) {
        self.filter_expression = Some(match self.filter_expression.take() {
            Some(existing) => format!("({}) AND ({})", existing, expression),
            None => expression,
        });
    }

    /// Append attributes to the projection, keeping existing entries first.
    pub fn add_projection(&mut self, attributes: Vec<String>) {
        let mut seen = HashSet::new();
        let merged: Vec<String> = self
            .projection_expression
            .iter()
            .flat_map(|existing| existing.split(','))
            .map(str::trim)
            .filter(|expression| !expression.is_empty())
            .map(str::to_string)
            .chain(attributes)
            .filter(|expression| seen.insert(expression.clone()))
            .collect();
        self.projection_expression = Some(merged.join(", "));
    }

    /// Sibling request that only counts: projection and limit stripped,
    /// unreferenced names and values dropped.
    pub fn count_request(&self) -> Self {
        let mut count = Self {
            projection_expression: None,
            limit: None,
            select: Some(Select::Count),
            ..self.clone()
        };
        count.prune_expression_attributes();
        count
    }

    fn prune_expression_attributes(&mut self) {
        static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(token) = TOKEN.get_or_init(|| Regex::new(r"[#:][A-Za-z0-9_]+").ok()) else {
            return;
        };

        let used: HashSet<&str> = [
            &self.key_condition_expression,
            &self.filter_expression,
            &self.projection_expression,
        ]
        .into_iter()
        .flatten()
        .flat_map(|expression| token.find_iter(expression).map(|m| m.as_str()))
        .collect();

        let names = self
            .expression_attribute_names
            .keys()
            .filter(|name| !used.contains(name.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        let values = self
            .expression_attribute_values
            .keys()
            .filter(|value| !used.contains(value.as_str()))
            .cloned()
            .collect::<Vec<_>>();

        for name in names {
            self.expression_attribute_names.remove(&name);
        }
        for value in values {
            self.expression_attribute_values.remove(&value);
        }
    }
}
