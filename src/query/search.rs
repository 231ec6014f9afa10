//! Search-syntax normalization.
//!
//! Two request grammars feed the [`WhereBuilder`]:
//!
//! - the JSON search object (`s` parameter), e.g.
//!   `{"$or": [{"id": 10}, {"isActive": true}], "age": {"$gte": 18}}`
//! - the legacy `filter` / `or` lists of `field||$op||value` strings
//!
//! Both are reduced to builder calls so every downstream adapter only ever
//! sees one canonical tree.

use super::ast::{Operator, Scalar, ValueKind, WhereValue};
use super::builder::{Cursor, WhereBuilder};
use super::field_path::FieldPath;
use crate::core::{CrudError, Result};
use nom::{
    bytes::complete::{tag, take_until},
    combinator::{opt, rest},
    sequence::{preceded, tuple},
    IResult,
};
use serde_json::{Map, Value};

/// Fold a JSON search condition into the bracket at `at`.
///
/// `context` is prepended to every field path, which is how nested
/// `{"field": [{...}]}` conditions scope their inner keys.
pub fn parse_crud_search(
    builder: &mut WhereBuilder,
    at: Cursor,
    condition: &Value,
    context: &FieldPath,
) -> Result<()> {
    let object = match condition {
        Value::Object(object) if !object.is_empty() => object,
        _ => return Ok(()),
    };

    let and = object.get("$and");
    let or = object.get("$or");

    if let Some(and) = and {
        let items = as_condition_list("$and", and)?;
        let target = if items.len() > 1 || object.len() > 1 {
            builder.add_and(at)?
        } else {
            at
        };

        for item in items {
            parse_crud_search(builder, target, item, context)?;
        }
        return parse_fields(builder, target, object, context);
    }

    if let Some(or) = or {
        let items = as_condition_list("$or", or)?;

        if object.len() == 1 {
            let target = if items.len() > 1 {
                builder.add_or(at)?
            } else {
                at
            };
            for item in items {
                parse_crud_search(builder, target, item, context)?;
            }
            return Ok(());
        }

        // Open the OR bracket before the sibling fields so it keeps its place.
        let and_target = builder.add_and(at)?;
        let or_target = if items.len() > 1 {
            builder.add_or(and_target)?
        } else {
            and_target
        };

        parse_fields(builder, and_target, object, context)?;
        for item in items {
            parse_crud_search(builder, or_target, item, context)?;
        }
        return Ok(());
    }

    let target = if object.len() > 1 {
        builder.add_and(at)?
    } else {
        at
    };
    parse_fields(builder, target, object, context)
}

fn as_condition_list<'a>(key: &str, value: &'a Value) -> Result<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(CrudError::parse(format!("{} must be an array of conditions", key))),
    }
}

/// Every key except `$and` / `$or` is a field.
fn parse_fields(
    builder: &mut WhereBuilder,
    at: Cursor,
    object: &Map<String, Value>,
    context: &FieldPath,
) -> Result<()> {
    for (name, value) in object {
        if name == "$and" || name == "$or" || value.is_null() {
            continue;
        }

        let path = context.join(&FieldPath::parse(name));

        if let Value::Array(items) = value {
            for item in items {
                parse_crud_search(builder, at, item, &path)?;
            }
            continue;
        }

        parse_field(builder, at, &path, value)?;
    }
    Ok(())
}

fn parse_field(builder: &mut WhereBuilder, at: Cursor, path: &FieldPath, value: &Value) -> Result<()> {
    let operators = match value {
        Value::Object(operators) => operators,
        other => {
            let value = WhereValue::from_json(other)
                .ok_or_else(|| CrudError::parse(format!("unsupported value for {}", path)))?;
            builder.add_field(at, path.clone(), Operator::Eq, value)?;
            return Ok(());
        },
    };

    for (token, operand) in operators {
        let Some(operator) = Operator::from_search_token(token) else {
            continue;
        };
        add_operand(builder, at, path, operator, operand)?;
    }

    // { level: { $or: { $gt: 10, $lt: 5 } } }
    if let Some(nested) = operators.get("$or").filter(|v| !v.is_null()) {
        let or = builder.add_or(at)?;
        parse_field(builder, or, path, nested)?;
    }
    Ok(())
}

fn add_operand(
    builder: &mut WhereBuilder,
    at: Cursor,
    path: &FieldPath,
    operator: Operator,
    operand: &Value,
) -> Result<()> {
    // A list given to a single-value operator fans out into one leaf per item.
    if let (ValueKind::Primitive, Value::Array(items)) = (operator.value_kind(), operand) {
        for item in items {
            add_operand(builder, at, path, operator, item)?;
        }
        return Ok(());
    }

    let value = WhereValue::from_json(operand).ok_or_else(|| {
        CrudError::invalid_value(operator, format!("unsupported value for {}", path))
    })?;
    builder.add_field(at, path.clone(), operator, value)?;
    Ok(())
}

/// Fold the legacy `filter` (AND) and `or` lists into the bracket at `at`.
///
/// With both lists present, each becomes an AND group and the two groups are
/// OR-ed together.
pub fn parse_crud_filters(
    builder: &mut WhereBuilder,
    at: Cursor,
    and_filters: &[String],
    or_filters: &[String],
) -> Result<()> {
    match (and_filters.is_empty(), or_filters.is_empty()) {
        (false, false) => {
            let or = builder.add_or(at)?;
            let first = builder.add_and(or)?;
            parse_filter_items(builder, first, and_filters)?;
            // add_and on an OR cursor always opens a fresh bracket
            let second = builder.add_and(or)?;
            parse_filter_items(builder, second, or_filters)
        },
        (true, false) => {
            let or = builder.add_or(at)?;
            parse_filter_items(builder, or, or_filters)
        },
        (false, true) => {
            let and = builder.add_and(at)?;
            parse_filter_items(builder, and, and_filters)
        },
        (true, true) => Ok(()),
    }
}

fn parse_filter_items(builder: &mut WhereBuilder, at: Cursor, items: &[String]) -> Result<()> {
    for item in items {
        let (field, token, raw) = match filter_item(item) {
            Ok((_, parts)) => parts,
            Err(_) => (item.as_str(), "", None),
        };

        let Some(operator) = Operator::from_search_token(token) else {
            tracing::debug!(filter = %item, "Skipping filter with unknown operator");
            continue;
        };

        builder.add_field(at, FieldPath::parse(field), operator, legacy_value(operator, raw))?;
    }
    Ok(())
}

/// `field||$op||value`, value optional. Anything after the second separator
/// belongs to the value.
fn filter_item(input: &str) -> IResult<&str, (&str, &str, Option<&str>)> {
    let (input, (field, _)) = tuple((take_until("||"), tag("||")))(input)?;
    let (input, token) = match take_until::<_, _, nom::error::Error<&str>>("||")(input) {
        Ok(parsed) => parsed,
        Err(_) => rest(input)?,
    };
    let (input, value) = opt(preceded(tag("||"), rest))(input)?;
    Ok((input, (field, token, value)))
}

fn legacy_value(operator: Operator, raw: Option<&str>) -> WhereValue {
    match (operator.value_kind(), raw) {
        (ValueKind::Empty, _) | (_, None) => WhereValue::Scalar(Scalar::Null),
        (ValueKind::Array, Some(raw)) => {
            WhereValue::List(raw.split(',').map(|v| Scalar::String(v.to_string())).collect())
        },
        (ValueKind::Primitive, Some(raw)) => WhereValue::Scalar(Scalar::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn search(condition: Value) -> Value {
        let mut builder = WhereBuilder::new();
        let root = builder.root();
        parse_crud_search(&mut builder, root, &condition, &FieldPath::new(Vec::<String>::new()))
            .unwrap();
        serde_json::to_value(builder.build()).unwrap()
    }

    fn leaf(field: &[&str], operator: &str, value: Value) -> Value {
        json!({"field": field, "operator": operator, "value": value})
    }

    #[test]
    fn test_empty_and_non_object_are_noops() {
        assert_eq!(search(json!({})), json!({"and": []}));
        assert_eq!(search(json!(42)), json!({"and": []}));
        assert_eq!(search(json!("x")), json!({"and": []}));
    }

    #[test]
    fn test_plain_fields_become_eq_leaves_in_key_order() {
        assert_eq!(
            search(json!({"isActive": true, "id": 10})),
            json!({"and": [
                leaf(&["isActive"], "eq", json!(true)),
                leaf(&["id"], "eq", json!(10))
            ]})
        );
    }

    #[test]
    fn test_single_field_goes_straight_into_root() {
        assert_eq!(
            search(json!({"category.name": {"$cont": "news"}})),
            json!({"and": [leaf(&["category", "name"], "contains", json!("news"))]})
        );
    }

    #[test]
    fn test_or_with_siblings_keeps_or_first() {
        assert_eq!(
            search(json!({"$or": [{"id": 10}, {"isActive": true}], "age": {"$gte": 18}})),
            json!({"and": [
                {"or": [
                    leaf(&["id"], "eq", json!(10)),
                    leaf(&["isActive"], "eq", json!(true))
                ]},
                leaf(&["age"], "gte", json!(18))
            ]})
        );
    }

    #[test]
    fn test_single_or_with_siblings_is_flattened() {
        assert_eq!(
            search(json!({"$or": [{"id": 10}], "age": 18})),
            json!({"and": [
                leaf(&["age"], "eq", json!(18)),
                leaf(&["id"], "eq", json!(10))
            ]})
        );
    }

    #[test]
    fn test_lone_or() {
        assert_eq!(
            search(json!({"$or": [{"id": 1}, {"id": 2}]})),
            json!({"and": [{"or": [
                leaf(&["id"], "eq", json!(1)),
                leaf(&["id"], "eq", json!(2))
            ]}]})
        );
    }

    #[test]
    fn test_and_with_siblings() {
        assert_eq!(
            search(json!({"$and": [{"a": 1}], "b": {"$lt": 3}})),
            json!({"and": [
                leaf(&["a"], "eq", json!(1)),
                leaf(&["b"], "lt", json!(3))
            ]})
        );
    }

    #[test]
    fn test_nested_and_inside_or() {
        assert_eq!(
            search(json!({"$or": [{"a": 1, "b": 2}, {"c": 3}]})),
            json!({"and": [{"or": [
                {"and": [leaf(&["a"], "eq", json!(1)), leaf(&["b"], "eq", json!(2))]},
                leaf(&["c"], "eq", json!(3))
            ]}]})
        );
    }

    #[test]
    fn test_field_level_or() {
        assert_eq!(
            search(json!({"level": {"$or": {"$lte": 5, "$gte": 20}}})),
            json!({"and": [{"or": [
                leaf(&["level"], "lte", json!(5)),
                leaf(&["level"], "gte", json!(20))
            ]}]})
        );
    }

    #[test]
    fn test_array_value_scopes_context() {
        assert_eq!(
            search(json!({"meta": [{"$or": [{"a": 1}, {"b": 2}]}]})),
            json!({"and": [{"or": [
                leaf(&["meta", "a"], "eq", json!(1)),
                leaf(&["meta", "b"], "eq", json!(2))
            ]}]})
        );
    }

    #[test]
    fn test_operator_arrays() {
        assert_eq!(
            search(json!({"id": {"$in": [1, 2], "$ne": [3, 4]}})),
            json!({"and": [
                leaf(&["id"], "in", json!([1, 2])),
                leaf(&["id"], "neq", json!(3)),
                leaf(&["id"], "neq", json!(4))
            ]})
        );
    }

    #[test]
    fn test_nulls_and_unknown_operators_are_skipped() {
        assert_eq!(
            search(json!({"a": null, "b": {"$regex": "x", "$isnull": true}})),
            json!({"and": [leaf(&["b"], "is_null", json!(true))]})
        );
    }

    #[test]
    fn test_invalid_operator_value_propagates() {
        let mut builder = WhereBuilder::new();
        let root = builder.root();
        let err = parse_crud_search(
            &mut builder,
            root,
            &json!({"id": {"$between": [1]}}),
            &FieldPath::new(Vec::<String>::new()),
        )
        .unwrap_err();
        assert!(matches!(err, CrudError::InvalidOperatorValue { .. }));
    }

    fn filters(and: &[&str], or: &[&str]) -> Value {
        let and: Vec<String> = and.iter().map(|s| s.to_string()).collect();
        let or: Vec<String> = or.iter().map(|s| s.to_string()).collect();
        let mut builder = WhereBuilder::new();
        let root = builder.root();
        parse_crud_filters(&mut builder, root, &and, &or).unwrap();
        serde_json::to_value(builder.build()).unwrap()
    }

    #[test]
    fn test_legacy_filter_only() {
        assert_eq!(
            filters(&["name||$eq||john", "age||$gte||18"], &[]),
            json!({"and": [
                leaf(&["name"], "eq", json!("john")),
                leaf(&["age"], "gte", json!("18"))
            ]})
        );
    }

    #[test]
    fn test_legacy_or_only() {
        assert_eq!(
            filters(&[], &["a||$eq||1", "b||$eq||2"]),
            json!({"and": [{"or": [
                leaf(&["a"], "eq", json!("1")),
                leaf(&["b"], "eq", json!("2"))
            ]}]})
        );
    }

    #[test]
    fn test_legacy_both_lists() {
        assert_eq!(
            filters(&["a||$eq||1"], &["b||$eq||2"]),
            json!({"and": [{"or": [
                {"and": [leaf(&["a"], "eq", json!("1"))]},
                {"and": [leaf(&["b"], "eq", json!("2"))]}
            ]}]})
        );
    }

    #[test]
    fn test_legacy_value_shapes() {
        assert_eq!(
            filters(&["id||$in||1,2", "deletedAt||$isnull", "bad||$nope||1", "note||$cont||a||b"], &[]),
            json!({"and": [
                leaf(&["id"], "in", json!(["1", "2"])),
                leaf(&["deletedAt"], "is_null", Value::Null),
                leaf(&["note"], "contains", json!("a||b"))
            ]})
        );
    }

    #[test]
    fn test_filter_item_parser() {
        assert_eq!(filter_item("a.b||$eq||x").unwrap().1, ("a.b", "$eq", Some("x")));
        assert_eq!(filter_item("a||$isnull").unwrap().1, ("a", "$isnull", None));
        assert!(filter_item("no-separator").is_err());
    }
}
