//! Native select query for the relational adapter.
//!
//! [`SelectQuery`] mirrors what an ORM query builder holds: a main entity
//! under an alias, selections, left joins, one combined WHERE fragment with
//! named parameters, ordering and pagination. [`SelectQuery::to_sql`] renders
//! it in the `:name` / `:...name` placeholder style, leaving parameter
//! expansion to the driver.

use crate::query::{Scalar, SortDirection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Database engine behind an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    Postgres,
    AuroraPostgres,
    MySql,
    Sqlite,
    MsSql,
    #[default]
    Other,
}

impl Dialect {
    /// Whether the engine understands `ILIKE`.
    pub fn supports_ilike(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::AuroraPostgres)
    }
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Scalar(Scalar),
    /// Expanded by the driver for `IN (:...name)`
    List(Vec<Scalar>),
}

impl From<Scalar> for SqlParam {
    fn from(value: Scalar) -> Self {
        SqlParam::Scalar(value)
    }
}

impl From<Vec<Scalar>> for SqlParam {
    fn from(values: Vec<Scalar>) -> Self {
        SqlParam::List(values)
    }
}

/// `LEFT JOIN relation_path alias`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    /// `parent_alias.property`
    pub relation_path: String,
    pub alias: String,
    /// Whether every column of the joined entity is selected
    pub select_all: bool,
}

/// Select query over one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectQuery {
    pub entity: String,
    pub table: String,
    pub alias: String,
    pub selections: Vec<String>,
    pub joins: Vec<Join>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<String>,
    pub parameters: BTreeMap<String, SqlParam>,
    pub order_by: Vec<(String, SortDirection)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl SelectQuery {
    /// Query selecting every column of `entity` under `alias`.
    pub fn new(entity: &str, alias: &str) -> Self {
        Self {
            entity: entity.to_string(),
            table: entity.to_string(),
            alias: alias.to_string(),
            selections: vec![alias.to_string()],
            joins: Vec::new(),
            where_clause: None,
            parameters: BTreeMap::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// AND a condition onto the existing WHERE fragment.
    pub fn and_where(mut self, condition: &str, parameters: BTreeMap<String, SqlParam>) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => format!("({}) AND ({})", existing, condition),
            None => condition.to_string(),
        });
        self.parameters.extend(parameters);
        self
    }

    /// Same query without LIMIT/OFFSET, used for counting.
    pub fn without_pagination(&self) -> Self {
        Self {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }

    /// Whether a bind parameter name is taken, including `between` pairs.
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
            || self.parameters.contains_key(&format!("{}_start", name))
    }

    /// Render the statement with named placeholders.
    pub fn to_sql(&self) -> String {
        let selections = if self.selections.is_empty() {
            "*".to_string()
        } else {
            self.selections.join(", ")
        };
        let mut sql = format!("SELECT {} FROM {} {}", selections, self.table, self.alias);

        for join in &self.joins {
            sql.push_str(&format!(" LEFT JOIN {} {}", join.relation_path, join.alias));
        }
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sql())
    }
}
