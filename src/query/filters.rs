//! Request rewrites applied between parsing and query building.

use super::ast::{Operator, Scalar, Where, WhereValue};
use super::field_path::FieldPath;
use super::request::CrudRequest;
use crate::core::{CrudError, Result};
use serde_json::{Map, Value};

/// Force `condition` onto the request. An AND root gets it appended, any
/// other root is wrapped as `AND[condition, where]`.
pub fn ensure_condition(mut request: CrudRequest, condition: Where) -> CrudRequest {
    request.where_ = match request.where_ {
        Where::And { mut and } => {
            and.push(condition);
            Where::and(and)
        },
        other => Where::and(vec![condition, other]),
    };
    request
}

/// Force `property = value` for every leaf of `entity`. Nested objects extend
/// the path, arrays are compared as a whole.
pub fn ensure_eq_condition(
    mut request: CrudRequest,
    entity: &Map<String, Value>,
    base: &FieldPath,
) -> Result<CrudRequest> {
    for (key, value) in entity {
        let path = base.child(key);

        if let Value::Object(nested) = value {
            request = ensure_eq_condition(request, nested, &path)?;
            continue;
        }

        let value = WhereValue::from_json(value).ok_or_else(|| {
            CrudError::invalid_value(Operator::Eq, format!("unsupported value for {}", path))
        })?;
        // Arrays are only meaningful with `in`
        let operator = match value {
            WhereValue::List(_) => Operator::In,
            WhereValue::Scalar(_) => Operator::Eq,
        };

        let condition = Where::field(path, operator, value)?;
        request = ensure_condition(request, condition);
    }
    Ok(request)
}

/// Restrict select, where, order and relations to an allowlist of dotted
/// property paths. An empty select becomes the allowlist itself.
pub fn filter_properties(mut request: CrudRequest, allowed: &[&str]) -> CrudRequest {
    let is_allowed = |path: &FieldPath| allowed.contains(&path.to_string().as_str());

    if request.select.is_empty() {
        request.select = allowed.iter().map(|p| FieldPath::parse(p)).collect();
    } else {
        request.select.retain(|f| is_allowed(f));
    }

    request.where_.retain_leaves(&|c| is_allowed(&c.field));
    request.order.retain(|o| is_allowed(&o.field));
    request.relations.retain(|r| is_allowed(&r.field));
    request
}

/// Restrict joined relations to an allowlist of dotted paths.
pub fn filter_relations(mut request: CrudRequest, allowed: &[&str]) -> CrudRequest {
    request
        .relations
        .retain(|r| allowed.contains(&r.field.to_string().as_str()));
    request
}

/// Clamp the limit to `1..=max`, using `default` when the request has none.
pub fn ensure_limit(mut request: CrudRequest, default: u64, max: u64) -> CrudRequest {
    request.limit = Some(request.limit.unwrap_or(default).max(1).min(max));
    request
}

/// Convenience for tenancy-style filters: `field = value`.
pub fn ensure_eq(request: CrudRequest, field: &str, value: impl Into<Scalar>) -> Result<CrudRequest> {
    let value: Scalar = value.into();
    let condition = Where::field(field, Operator::Eq, value)?;
    Ok(ensure_condition(request, condition))
}
