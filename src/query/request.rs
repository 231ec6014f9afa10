//! Normalized CRUD list request.

use super::ast::Where;
use super::field_path::FieldPath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse `ASC`/`DESC` case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(SortDirection::Asc),
            "DESC" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn is_ascending(self) -> bool {
        self == SortDirection::Asc
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: FieldPath,
    pub order: SortDirection,
}

impl Order {
    pub fn asc(field: &str) -> Self {
        Self {
            field: FieldPath::parse(field),
            order: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: FieldPath::parse(field),
            order: SortDirection::Desc,
        }
    }
}

/// A related entity to join, optionally under an explicit alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub field: FieldPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Relation {
    pub fn new(field: &str) -> Self {
        Self {
            field: FieldPath::parse(field),
            alias: None,
        }
    }

    pub fn with_alias(field: &str, alias: &str) -> Self {
        Self {
            field: FieldPath::parse(field),
            alias: Some(alias.to_string()),
        }
    }
}

/// Everything a list/get request asks of a store.
///
/// `offset` wins over `page` when both are set, and `page` only has an effect
/// together with `limit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudRequest {
    pub select: Vec<FieldPath>,
    pub relations: Vec<Relation>,
    pub order: Vec<Order>,
    #[serde(rename = "where")]
    pub where_: Where,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
}

impl CrudRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset after resolving `page` against `limit`.
    pub fn effective_offset(&self) -> u64 {
        super::pagination::effective_offset(self.offset, self.limit, self.page)
    }
}
