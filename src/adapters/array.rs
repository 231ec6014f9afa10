//! In-memory adapter over JSON documents.
//!
//! Useful for tests, fixtures and small static datasets. The condition tree is
//! compiled once into a predicate closure and then applied to every document.

use super::walk::{compile_where, Scope, WhereCompiler};
use super::QueryAdapter;
use crate::core::Result;
use crate::query::{
    shape_result, CrudRequest, FieldCondition, FieldPath, GetManyResult, LogicalOp, Operator,
    Order, Scalar, SortDirection, Where, WhereValue,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Compiled document predicate.
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Factory for the objects select projections are written into.
pub type EntityFactory = Arc<dyn Fn() -> Map<String, Value> + Send + Sync>;

/// Adapter over `Vec<serde_json::Value>`.
#[derive(Clone, Default)]
pub struct ArrayQueryAdapter {
    create_empty_entity: Option<EntityFactory>,
}

impl std::fmt::Debug for ArrayQueryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayQueryAdapter")
            .field("create_empty_entity", &self.create_empty_entity.is_some())
            .finish()
    }
}

impl ArrayQueryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `factory` for the base object of every projected row.
    pub fn with_entity_factory(mut self, factory: EntityFactory) -> Self {
        self.create_empty_entity = Some(factory);
        self
    }

    /// Compile a condition tree into a predicate. An empty tree matches everything.
    pub fn compile(&self, tree: &Where) -> Result<Predicate> {
        Ok(compile_where(&mut PredicateCompiler, tree)?.unwrap_or_else(|| Box::new(|_: &Value| true)))
    }

    fn filter_and_sort(&self, data: Vec<Value>, request: &CrudRequest) -> Result<Vec<Value>> {
        let predicate = self.compile(&request.where_)?;
        let mut data: Vec<Value> = data.into_iter().filter(|item| predicate(item)).collect();
        apply_order(&mut data, &request.order);
        Ok(data)
    }

    fn apply_select(&self, data: Vec<Value>, select: &[FieldPath]) -> Vec<Value> {
        if select.is_empty() {
            return data;
        }

        data.into_iter()
            .map(|item| {
                let mut object = match &self.create_empty_entity {
                    Some(factory) => factory(),
                    None => Map::new(),
                };
                for field in select {
                    let value = path_get(&item, field).cloned().unwrap_or(Value::Null);
                    path_set(&mut object, field.segments(), value);
                }
                Value::Object(object)
            })
            .collect()
    }
}

#[async_trait]
impl QueryAdapter for ArrayQueryAdapter {
    type Query = Vec<Value>;
    type Entity = Value;

    fn build(&self, data: Vec<Value>, request: &CrudRequest) -> Result<Vec<Value>> {
        let data = self.filter_and_sort(data, request)?;
        let data = apply_limits(data, request.effective_offset(), request.limit);
        Ok(self.apply_select(data, &request.select))
    }

    async fn get_one(&self, data: Vec<Value>, request: &CrudRequest) -> Result<Option<Value>> {
        let mut data = self.filter_and_sort(data, request)?;
        data.truncate(1);
        Ok(self.apply_select(data, &request.select).pop())
    }

    async fn get_many(&self, data: Vec<Value>, request: &CrudRequest) -> Result<GetManyResult<Value>> {
        let data = self.filter_and_sort(data, request)?;
        let total = data.len() as u64;
        let offset = request.effective_offset();

        let data = apply_limits(data, offset, request.limit);
        let data = self.apply_select(data, &request.select);
        Ok(shape_result(data, total, offset, request.limit))
    }
}

fn apply_limits(data: Vec<Value>, offset: u64, limit: Option<u64>) -> Vec<Value> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let iter = data.into_iter().skip(offset);
    match limit.map(|l| usize::try_from(l).unwrap_or(usize::MAX)) {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

fn apply_order(data: &mut [Value], order: &[Order]) {
    if order.is_empty() {
        return;
    }
    data.sort_by(|a, b| {
        for o in order {
            let ordering = compare_for_sort(path_get(a, &o.field), path_get(b, &o.field));
            let ordering = match o.order {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Same-typed values compare naturally, anything else is a tie.
fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn path_get<'a>(item: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(item, |current, segment| current.as_object()?.get(segment))
}

fn path_set(object: &mut Map<String, Value>, segments: &[String], value: Value) {
    match segments {
        [] => {},
        [last] => {
            object.insert(last.clone(), value);
        },
        [head, rest @ ..] => {
            let entry = object
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                path_set(child, rest, value);
            }
        },
    }
}

/// Compare a document value against a condition scalar.
fn compare(item: &Value, scalar: &Scalar) -> Option<Ordering> {
    match (item, scalar.to_json()) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

fn matches_ordering(item: Option<&Value>, scalar: &Scalar, accept: fn(Ordering) -> bool) -> bool {
    item.and_then(|v| compare(v, scalar)).map_or(false, accept)
}

fn is_equal(item: Option<&Value>, scalar: &Scalar) -> bool {
    match item {
        None => scalar.is_null(),
        Some(v) => compare(v, scalar) == Some(Ordering::Equal),
    }
}

/// Membership of the item, or of any element when the item is an array.
fn is_member(item: Option<&Value>, list: &[Scalar], lower: bool) -> bool {
    let contains = |v: &Value| {
        list.iter().any(|s| {
            if lower {
                match (v.as_str(), s) {
                    (Some(text), Scalar::String(candidate)) => {
                        text.to_lowercase() == candidate.to_lowercase()
                    },
                    _ => false,
                }
            } else {
                is_equal(Some(v), s)
            }
        })
    };
    match item {
        Some(Value::Array(items)) => items.iter().any(contains),
        Some(v) => contains(v),
        None => false,
    }
}

fn text_test(item: Option<&Value>, needle: &Scalar, lower: bool, test: fn(&str, &str) -> bool) -> bool {
    match item.and_then(Value::as_str) {
        Some(text) if lower => test(&text.to_lowercase(), &needle.as_text().to_lowercase()),
        Some(text) => test(text, &needle.as_text()),
        None => false,
    }
}

fn evaluate(item: Option<&Value>, operator: Operator, value: &WhereValue) -> bool {
    let null = Scalar::Null;
    let scalar = value.as_scalar().unwrap_or(&null);
    let list = value.as_list().unwrap_or_default();

    match operator {
        Operator::Eq => is_equal(item, scalar),
        Operator::Neq => !is_equal(item, scalar),
        Operator::Gt => matches_ordering(item, scalar, Ordering::is_gt),
        Operator::Gte => matches_ordering(item, scalar, Ordering::is_ge),
        Operator::Lt => matches_ordering(item, scalar, Ordering::is_lt),
        Operator::Lte => matches_ordering(item, scalar, Ordering::is_le),
        Operator::Between => match list {
            [low, high] => {
                matches_ordering(item, low, Ordering::is_ge)
                    && matches_ordering(item, high, Ordering::is_le)
            },
            _ => false,
        },
        Operator::IsNull => item.map_or(true, Value::is_null),
        Operator::NotNull => item.map_or(false, |v| !v.is_null()),
        Operator::Starts => text_test(item, scalar, false, |t, n| t.starts_with(n)),
        Operator::Ends => text_test(item, scalar, false, |t, n| t.ends_with(n)),
        Operator::Contains => text_test(item, scalar, false, |t, n| t.contains(n)),
        Operator::NotContains => !text_test(item, scalar, false, |t, n| t.contains(n)),
        Operator::In => is_member(item, list, false),
        Operator::NotIn => !is_member(item, list, false),
        Operator::EqLower => text_test(item, scalar, true, |t, n| t == n),
        Operator::NeqLower => !text_test(item, scalar, true, |t, n| t == n),
        Operator::StartsLower => text_test(item, scalar, true, |t, n| t.starts_with(n)),
        Operator::EndsLower => text_test(item, scalar, true, |t, n| t.ends_with(n)),
        Operator::ContainsLower => text_test(item, scalar, true, |t, n| t.contains(n)),
        Operator::NotContainsLower => !text_test(item, scalar, true, |t, n| t.contains(n)),
        Operator::InLower => is_member(item, list, true),
        Operator::NotInLower => !is_member(item, list, true),
    }
}

struct PredicateCompiler;

impl WhereCompiler for PredicateCompiler {
    type Fragment = Predicate;

    fn compile_field(&mut self, condition: &FieldCondition, _scope: Scope) -> Result<Option<Predicate>> {
        condition.operator.validate(&condition.value)?;
        let FieldCondition {
            field,
            operator,
            value,
        } = condition.clone();
        let predicate: Predicate =
            Box::new(move |item: &Value| evaluate(path_get(item, &field), operator, &value));
        Ok(Some(predicate))
    }

    fn join(&mut self, op: LogicalOp, fragments: Vec<Predicate>, _scope: Scope) -> Predicate {
        match op {
            LogicalOp::And => Box::new(move |item: &Value| fragments.iter().all(|p| p(item))),
            LogicalOp::Or => Box::new(move |item: &Value| fragments.iter().any(|p| p(item))),
        }
    }
}
