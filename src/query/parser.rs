//! Raw query parameters to [`CrudRequest`].
//!
//! Understands the common CRUD query-string conventions:
//!
//! | param              | example                               |
//! |--------------------|---------------------------------------|
//! | `fields`/`select`  | `id,title,category.name`              |
//! | `join`             | `category\|\|id,name`                 |
//! | `sort`             | `createdAt,DESC`                      |
//! | `s`                | `{"title": {"$cont": "rust"}}`        |
//! | `filter` / `or`    | `title\|\|$cont\|\|rust`              |
//! | `limit`, `offset`, `page` | `25`                           |

use super::ast::Where;
use super::builder::WhereBuilder;
use super::field_path::FieldPath;
use super::request::{CrudRequest, Order, Relation, SortDirection};
use super::search::{parse_crud_filters, parse_crud_search};
use crate::core::{CrudError, Result};
use nom::{
    bytes::complete::{tag, take_until},
    combinator::rest,
    sequence::separated_pair,
    IResult,
};
use std::collections::HashMap;

/// A query parameter given once or repeated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl ParamValue {
    /// Every value, with repeated params kept in order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            ParamValue::Single(v) => vec![v.as_str()],
            ParamValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
        }
    }

    /// First value only.
    pub fn first(&self) -> Option<&str> {
        match self {
            ParamValue::Single(v) => Some(v.as_str()),
            ParamValue::Multi(vs) => vs.first().map(String::as_str),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Single(v.to_string())
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(vs: Vec<&str>) -> Self {
        ParamValue::Multi(vs.into_iter().map(str::to_string).collect())
    }
}

/// Parsed query string.
pub type RequestParams = HashMap<String, ParamValue>;

/// Collect `key=value` pairs, turning repeated keys into [`ParamValue::Multi`].
pub fn params_from_pairs<I, K, V>(pairs: I) -> RequestParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut params = RequestParams::new();
    for (key, value) in pairs {
        let key: String = key.into();
        let value: String = value.into();
        match params.remove(&key) {
            None => {
                params.insert(key, ParamValue::Single(value));
            },
            Some(ParamValue::Single(first)) => {
                params.insert(key, ParamValue::Multi(vec![first, value]));
            },
            Some(ParamValue::Multi(mut values)) => {
                values.push(value);
                params.insert(key, ParamValue::Multi(values));
            },
        }
    }
    params
}

/// Parser for the CRUD query-string format.
#[derive(Debug, Clone, Default)]
pub struct CrudRequestParser;

impl CrudRequestParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw params into a request. Fails only on malformed search JSON
    /// or on operator values of the wrong shape.
    pub fn parse(&self, params: &RequestParams) -> Result<CrudRequest> {
        let mut request = CrudRequest::new();

        let select = params.get("fields").or_else(|| params.get("select"));
        if let Some(select) = select {
            self.parse_select(&mut request, select);
        }
        if let Some(join) = params.get("join") {
            self.parse_join(&mut request, join);
        }
        if let Some(sort) = params.get("sort") {
            self.parse_order(&mut request, sort);
        }

        request.where_ = self.parse_where(params)?;
        request.limit = parse_number(params.get("limit"));
        request.offset = parse_number(params.get("offset"));
        request.page = parse_number(params.get("page"));

        tracing::trace!(?request, "Parsed CRUD request");
        Ok(request)
    }

    fn parse_select(&self, request: &mut CrudRequest, raw: &ParamValue) {
        for value in raw.values() {
            request.select.extend(
                value
                    .split(',')
                    .filter(|f| !f.is_empty())
                    .map(FieldPath::parse),
            );
        }
    }

    fn parse_join(&self, request: &mut CrudRequest, raw: &ParamValue) {
        for value in raw.values() {
            let (field, select) = match join_item(value) {
                Ok((_, (field, select))) => (field, Some(select)),
                Err(_) => (value, None),
            };
            if field.is_empty() {
                continue;
            }

            let path = FieldPath::parse(field);
            for name in select.into_iter().flat_map(|s| s.split(',')).filter(|f| !f.is_empty()) {
                request.select.push(path.child(name));
            }
            request.relations.push(Relation {
                field: path,
                alias: None,
            });
        }
    }

    fn parse_order(&self, request: &mut CrudRequest, raw: &ParamValue) {
        for value in raw.values() {
            let mut parts = value.splitn(2, ',');
            let field = parts.next().unwrap_or_default();
            if field.is_empty() {
                continue;
            }
            let order = parts
                .next()
                .and_then(SortDirection::parse)
                .unwrap_or(SortDirection::Asc);
            request.order.push(Order {
                field: FieldPath::parse(field),
                order,
            });
        }
    }

    fn parse_where(&self, params: &RequestParams) -> Result<Where> {
        let mut builder = WhereBuilder::new();
        let root = builder.root();

        let search = params.get("s").and_then(ParamValue::first).filter(|s| !s.is_empty());
        if let Some(raw) = search {
            let condition: serde_json::Value = serde_json::from_str(raw)
                .map_err(|e| CrudError::parse(format!("Invalid search condition: {}", e)))?;
            parse_crud_search(&mut builder, root, &condition, &FieldPath::default())?;
        } else {
            let collect = |key: &str| -> Vec<String> {
                params
                    .get(key)
                    .map(|p| p.values().into_iter().map(str::to_string).collect())
                    .unwrap_or_default()
            };
            parse_crud_filters(&mut builder, root, &collect("filter"), &collect("or"))?;
        }

        Ok(builder.build())
    }
}

fn join_item(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_until("||"), tag("||"), rest)(input)
}

fn parse_number(raw: Option<&ParamValue>) -> Option<u64> {
    raw.and_then(ParamValue::first)
        .and_then(|v| v.trim().parse::<u64>().ok())
}
