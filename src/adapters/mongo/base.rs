//! Request to MongoDB filter/projection/sort translation shared by the
//! cursor and model adapters.

use crate::adapters::walk::{compile_where, Scope, WhereCompiler};
use crate::core::{CrudError, Result};
use crate::query::{CrudRequest, FieldCondition, LogicalOp, Operator, Scalar, Where, WhereValue};
use serde_json::{json, Map, Value};

/// A MongoDB document, key order preserved.
pub type Document = Map<String, Value>;

/// Sort specification as `[path, 1 | -1]` pairs.
pub type SortSpec = Vec<(String, i32)>;

/// Compile the condition tree into a filter document; an empty tree gives `{}`.
pub fn build_filter(tree: &Where) -> Result<Document> {
    match compile_where(&mut FilterCompiler, tree)? {
        Some(Value::Object(filter)) => Ok(filter),
        Some(other) => Err(CrudError::InvalidWhereState(format!(
            "filter compiled to a non-document value: {}",
            other
        ))),
        None => Ok(Document::new()),
    }
}

/// `{path: 1}` for every selected field, `None` when nothing is selected.
pub fn build_projection(request: &CrudRequest) -> Option<Document> {
    if request.select.is_empty() {
        return None;
    }
    Some(
        request
            .select
            .iter()
            .map(|field| (field.to_string(), Value::from(1)))
            .collect(),
    )
}

pub fn build_sort(request: &CrudRequest) -> SortSpec {
    request
        .order
        .iter()
        .map(|order| {
            let direction = if order.order.is_ascending() { 1 } else { -1 };
            (order.field.to_string(), direction)
        })
        .collect()
}

pub fn build_skip(request: &CrudRequest) -> u64 {
    request.effective_offset()
}

/// Extended JSON form of a scalar; dates become `{"$date": ...}`.
fn to_bson_json(value: &Scalar) -> Value {
    match value {
        Scalar::Date(date) => json!({ "$date": date.to_rfc3339() }),
        other => other.to_json(),
    }
}

fn list_to_json(items: &[Scalar]) -> Value {
    Value::Array(items.iter().map(to_bson_json).collect())
}

fn require_text(operator: Operator, value: &Scalar) -> Result<String> {
    match value {
        Scalar::String(s) => Ok(regex::escape(s)),
        _ => Err(CrudError::invalid_value(operator, "expected a string value")),
    }
}

fn require_scalar(operator: Operator, value: &WhereValue) -> Result<&Scalar> {
    value
        .as_scalar()
        .ok_or_else(|| CrudError::invalid_value(operator, "expected a primitive value"))
}

fn require_list(operator: Operator, value: &WhereValue) -> Result<&[Scalar]> {
    value
        .as_list()
        .ok_or_else(|| CrudError::invalid_value(operator, "expected an array value"))
}

/// `{$regex, $options}` condition, case-insensitive when `lower`.
fn regex_condition(pattern: String, lower: bool) -> Value {
    if lower {
        json!({ "$regex": pattern, "$options": "i" })
    } else {
        json!({ "$regex": pattern })
    }
}

/// Case-insensitive exact match usable inside `$in`/`$nin`.
fn regular_expression(operator: Operator, item: &Scalar) -> Result<Value> {
    let pattern = format!("^{}$", require_text(operator, item)?);
    Ok(json!({ "$regularExpression": { "pattern": pattern, "options": "i" } }))
}

/// Condition document (or literal) for one operator.
pub(crate) fn map_condition(operator: Operator, value: &WhereValue) -> Result<Value> {
    operator.validate(value)?;

    let condition = match operator {
        Operator::Eq => to_bson_json(require_scalar(operator, value)?),
        Operator::Neq => json!({ "$ne": to_bson_json(require_scalar(operator, value)?) }),
        Operator::Gt => json!({ "$gt": to_bson_json(require_scalar(operator, value)?) }),
        Operator::Gte => json!({ "$gte": to_bson_json(require_scalar(operator, value)?) }),
        Operator::Lt => json!({ "$lt": to_bson_json(require_scalar(operator, value)?) }),
        Operator::Lte => json!({ "$lte": to_bson_json(require_scalar(operator, value)?) }),
        Operator::In => json!({ "$in": list_to_json(require_list(operator, value)?) }),
        Operator::NotIn => json!({ "$nin": list_to_json(require_list(operator, value)?) }),
        Operator::IsNull => json!({ "$eq": null }),
        Operator::NotNull => json!({ "$ne": null }),
        Operator::Between => {
            let bounds = require_list(operator, value)?;
            json!({ "$gte": to_bson_json(&bounds[0]), "$lte": to_bson_json(&bounds[1]) })
        },
        Operator::Contains | Operator::ContainsLower => {
            let text = require_text(operator, require_scalar(operator, value)?)?;
            regex_condition(text, operator == Operator::ContainsLower)
        },
        Operator::NotContains | Operator::NotContainsLower => {
            let text = require_text(operator, require_scalar(operator, value)?)?;
            json!({ "$not": regex_condition(text, operator == Operator::NotContainsLower) })
        },
        Operator::Starts | Operator::StartsLower => {
            let text = require_text(operator, require_scalar(operator, value)?)?;
            regex_condition(format!("^{}", text), operator == Operator::StartsLower)
        },
        Operator::Ends | Operator::EndsLower => {
            let text = require_text(operator, require_scalar(operator, value)?)?;
            regex_condition(format!("{}$", text), operator == Operator::EndsLower)
        },
        Operator::EqLower => {
            let text = require_text(operator, require_scalar(operator, value)?)?;
            regex_condition(format!("^{}$", text), true)
        },
        Operator::NeqLower => {
            let text = require_text(operator, require_scalar(operator, value)?)?;
            json!({ "$not": regex_condition(format!("^{}$", text), true) })
        },
        Operator::InLower | Operator::NotInLower => {
            let patterns = require_list(operator, value)?
                .iter()
                .map(|item| regular_expression(operator, item))
                .collect::<Result<Vec<_>>>()?;
            let key = if operator == Operator::InLower { "$in" } else { "$nin" };
            json!({ key: patterns })
        },
    };

    Ok(condition)
}

struct FilterCompiler;

impl WhereCompiler for FilterCompiler {
    type Fragment = Value;

    fn compile_field(&mut self, condition: &FieldCondition, _scope: Scope) -> Result<Option<Value>> {
        let mut document = Document::new();
        document.insert(
            condition.field.to_string(),
            map_condition(condition.operator, &condition.value)?,
        );
        Ok(Some(Value::Object(document)))
    }

    fn join(&mut self, op: LogicalOp, fragments: Vec<Value>, _scope: Scope) -> Value {
        match op {
            LogicalOp::And => json!({ "$and": fragments }),
            LogicalOp::Or => json!({ "$or": fragments }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FieldPath, Order};
    use pretty_assertions::assert_eq;

    fn condition(operator: Operator, value: impl Into<WhereValue>) -> Value {
        map_condition(operator, &value.into()).unwrap()
    }

    #[test]
    fn test_basic_operators() {
        let cases = vec![
            (Operator::Eq, WhereValue::from(10), json!(10)),
            (Operator::Neq, WhereValue::from(10), json!({"$ne": 10})),
            (Operator::Gt, WhereValue::from(10), json!({"$gt": 10})),
            (Operator::Gte, WhereValue::from(10), json!({"$gte": 10})),
            (Operator::Lt, WhereValue::from(10), json!({"$lt": 10})),
            (Operator::Lte, WhereValue::from(10), json!({"$lte": 10})),
            (Operator::In, WhereValue::from(vec![2, 4]), json!({"$in": [2, 4]})),
            (Operator::NotIn, WhereValue::from(vec![2, 4]), json!({"$nin": [2, 4]})),
            (Operator::IsNull, WhereValue::default(), json!({"$eq": null})),
            (Operator::NotNull, WhereValue::default(), json!({"$ne": null})),
            (Operator::Between, WhereValue::from(vec![2, 4]), json!({"$gte": 2, "$lte": 4})),
            (Operator::Contains, WhereValue::from("foo"), json!({"$regex": "foo"})),
            (
                Operator::NotContains,
                WhereValue::from("foo"),
                json!({"$not": {"$regex": "foo"}}),
            ),
            (Operator::Starts, WhereValue::from("foo"), json!({"$regex": "^foo"})),
            (Operator::Ends, WhereValue::from("foo"), json!({"$regex": "foo$"})),
            (
                Operator::EqLower,
                WhereValue::from("foo"),
                json!({"$regex": "^foo$", "$options": "i"}),
            ),
            (
                Operator::NeqLower,
                WhereValue::from("foo"),
                json!({"$not": {"$regex": "^foo$", "$options": "i"}}),
            ),
            (
                Operator::ContainsLower,
                WhereValue::from("foo"),
                json!({"$regex": "foo", "$options": "i"}),
            ),
            (
                Operator::NotContainsLower,
                WhereValue::from("foo"),
                json!({"$not": {"$regex": "foo", "$options": "i"}}),
            ),
            (
                Operator::StartsLower,
                WhereValue::from("foo"),
                json!({"$regex": "^foo", "$options": "i"}),
            ),
            (
                Operator::EndsLower,
                WhereValue::from("foo"),
                json!({"$regex": "foo$", "$options": "i"}),
            ),
            (
                Operator::InLower,
                WhereValue::from(vec!["foo", "bar"]),
                json!({"$in": [
                    {"$regularExpression": {"pattern": "^foo$", "options": "i"}},
                    {"$regularExpression": {"pattern": "^bar$", "options": "i"}},
                ]}),
            ),
            (
                Operator::NotInLower,
                WhereValue::from(vec!["foo"]),
                json!({"$nin": [{"$regularExpression": {"pattern": "^foo$", "options": "i"}}]}),
            ),
        ];

        assert_eq!(cases.len(), Operator::ALL.len());
        for (operator, value, expected) in cases {
            assert_eq!(map_condition(operator, &value).unwrap(), expected, "{}", operator);
        }
    }

    #[test]
    fn test_regex_input_is_escaped() {
        assert_eq!(condition(Operator::Contains, "a.b*"), json!({"$regex": "a\\.b\\*"}));
    }

    #[test]
    fn test_string_operators_need_strings() {
        let err = map_condition(Operator::Starts, &WhereValue::from(1)).unwrap_err();
        assert!(matches!(err, CrudError::InvalidOperatorValue { .. }));
        assert!(map_condition(Operator::InLower, &WhereValue::from(vec![1])).is_err());
    }

    #[test]
    fn test_dates_use_extended_json() {
        let date = chrono::DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(
            condition(Operator::Gt, date),
            json!({"$gt": {"$date": "2024-01-02T03:04:05+00:00"}})
        );
    }

    #[test]
    fn test_filter_tree() {
        let tree = Where::and(vec![
            Where::field("title", Operator::NotNull, Scalar::Null).unwrap(),
            Where::field("category.name", Operator::Eq, "Sports").unwrap(),
            Where::or(vec![
                Where::field("isActive", Operator::Eq, true).unwrap(),
                Where::field("id", Operator::Lte, 1).unwrap(),
            ]),
        ]);
        assert_eq!(
            Value::Object(build_filter(&tree).unwrap()),
            json!({"$and": [
                {"title": {"$ne": null}},
                {"category.name": "Sports"},
                {"$or": [{"isActive": true}, {"id": {"$lte": 1}}]},
            ]})
        );
        assert!(build_filter(&Where::default()).unwrap().is_empty());
        assert_eq!(
            Value::Object(build_filter(&Where::and(vec![Where::or(vec![tree.clone()])])).unwrap()),
            Value::Object(build_filter(&tree).unwrap())
        );
    }

    #[test]
    fn test_projection_and_sort() {
        let request = CrudRequest {
            select: vec![FieldPath::parse("id"), FieldPath::parse("category.name")],
            order: vec![Order::desc("id"), Order::asc("title")],
            ..CrudRequest::default()
        };
        assert_eq!(
            build_projection(&request).map(Value::Object),
            Some(json!({"id": 1, "category.name": 1}))
        );
        assert_eq!(
            serde_json::to_value(build_sort(&request)).unwrap(),
            json!([["id", -1], ["title", 1]])
        );
        assert_eq!(build_projection(&CrudRequest::default()), None);
    }
}
