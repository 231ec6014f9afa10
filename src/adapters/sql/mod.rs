//! Relational adapter.
//!
//! Applies a [`CrudRequest`] to a [`SelectQuery`]: selections and left joins
//! are resolved against [`EntityRegistry`] metadata, the condition tree is
//! compiled into one parenthesized WHERE fragment with named parameters, and
//! order fields are mapped onto their relation aliases. Every field path is
//! checked against the metadata and handled per the configured
//! [`InvalidFieldPolicy`] for its clause.

pub mod metadata;
pub mod query;

pub use metadata::{EntityMetadata, EntityRegistry};
pub use query::{Dialect, Join, SelectQuery, SqlParam};

use super::walk::{compile_where, Scope, WhereCompiler};
use super::QueryAdapter;
use crate::core::{CrudError, InvalidFieldPolicy, Result, SqlConfig};
use crate::query::{
    shape_result, CrudRequest, FieldCondition, FieldPath, GetManyResult, LogicalOp, Operator,
    Relation, Scalar, WhereValue,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs select queries against a relational database.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn fetch_many(&self, query: &SelectQuery) -> Result<Vec<Value>>;

    async fn fetch_one(&self, query: &SelectQuery) -> Result<Option<Value>>;

    /// Count rows matched by `query`, ignoring its pagination.
    async fn count(&self, query: &SelectQuery) -> Result<u64>;
}

/// Clause a field path appears in, used for policy lookup and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Select,
    Order,
    Where,
    Relations,
}

impl Clause {
    fn as_str(self) -> &'static str {
        match self {
            Clause::Select => "select",
            Clause::Order => "order",
            Clause::Where => "where",
            Clause::Relations => "relations",
        }
    }
}

/// Relational [`QueryAdapter`] over [`SelectQuery`].
#[derive(Clone)]
pub struct SqlQueryAdapter {
    registry: Arc<EntityRegistry>,
    config: SqlConfig,
    executor: Option<Arc<dyn SqlExecutor>>,
    dialect: Dialect,
}

impl std::fmt::Debug for SqlQueryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlQueryAdapter")
            .field("config", &self.config)
            .field("dialect", &self.dialect())
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

impl SqlQueryAdapter {
    pub fn new(registry: Arc<EntityRegistry>, config: SqlConfig) -> Self {
        Self {
            registry,
            config,
            executor: None,
            dialect: Dialect::default(),
        }
    }

    /// Adapter whose metadata comes from `config.entities`.
    pub fn from_config(config: SqlConfig) -> Self {
        let registry = Arc::new(EntityRegistry::from_config(&config.entities));
        Self::new(registry, config)
    }

    pub fn with_executor(mut self, executor: Arc<dyn SqlExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Dialect used for ILIKE detection when no executor is attached.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.executor
            .as_ref()
            .map_or(self.dialect, |executor| executor.dialect())
    }

    fn ilike_enabled(&self) -> bool {
        self.config
            .case_insensitive_like
            .unwrap_or_else(|| self.dialect().supports_ilike())
    }

    fn executor(&self) -> Result<&Arc<dyn SqlExecutor>> {
        self.executor
            .as_ref()
            .ok_or_else(|| CrudError::config("No SQL executor attached to the adapter"))
    }

    fn policy(&self, clause: Clause) -> InvalidFieldPolicy {
        let policies = &self.config.invalid_fields;
        match clause {
            Clause::Select => policies.select,
            Clause::Order => policies.order,
            Clause::Where => policies.r#where,
            Clause::Relations => policies.relations,
        }
    }

    /// Check a path against metadata. `Ok(false)` means drop it.
    fn validate_field(&self, entity: &str, path: &FieldPath, clause: Clause) -> Result<bool> {
        let valid = match clause {
            Clause::Relations => self.registry.is_relation(entity, path.segments()),
            _ => self.registry.is_column(entity, path.segments()),
        };
        if valid {
            return Ok(true);
        }

        match self.policy(clause) {
            InvalidFieldPolicy::AllowUnsafe => Ok(true),
            InvalidFieldPolicy::Deny => Err(CrudError::invalid_field(clause.as_str(), path)),
            InvalidFieldPolicy::Ignore => {
                warn!(clause = clause.as_str(), field = %path, "Ignoring invalid field");
                Ok(false)
            },
        }
    }

    /// Selections, joins, WHERE and ORDER BY, without pagination.
    fn create_base_query(&self, mut query: SelectQuery, request: &CrudRequest) -> Result<SelectQuery> {
        if let Some(metadata) = self.registry.get(&query.entity) {
            query.table = metadata.table.clone();
        }

        self.adapt_select(&mut query, request)?;
        self.adapt_relations(&mut query, request)?;
        let mut query = self.adapt_where(query, request)?;
        self.adapt_order(&mut query, request)?;

        Ok(query)
    }

    fn adapt_select(&self, query: &mut SelectQuery, request: &CrudRequest) -> Result<()> {
        if request.select.is_empty() {
            return Ok(());
        }

        let mut selections = Vec::new();
        for field in request.select.iter().filter(|f| f.len() == 1) {
            if self.validate_field(&query.entity, field, Clause::Select)? {
                selections.push(format!("{}.{}", query.alias, field));
            }
        }
        query.selections = selections;
        Ok(())
    }

    fn adapt_relations(&self, query: &mut SelectQuery, request: &CrudRequest) -> Result<()> {
        for relation in &request.relations {
            if relation.field.is_empty()
                || !self.validate_field(&query.entity, &relation.field, Clause::Relations)?
            {
                continue;
            }

            let parent = alias_path(&query.alias, relation.field.base());
            let alias = relation
                .alias
                .clone()
                .unwrap_or_else(|| format!("{}_{}", parent, relation.field.name()));

            let mut fields = Vec::new();
            for field in request
                .select
                .iter()
                .filter(|f| f.has_base(relation.field.segments()))
            {
                if self.validate_field(&query.entity, field, Clause::Select)? {
                    fields.push(format!("{}.{}", alias, field.name()));
                }
            }

            let select_all = fields.is_empty();
            if select_all {
                query.selections.push(alias.clone());
            } else {
                query.selections.extend(fields);
            }
            query.joins.push(Join {
                relation_path: format!("{}.{}", parent, relation.field.name()),
                alias,
                select_all,
            });
        }
        Ok(())
    }

    fn adapt_where(&self, query: SelectQuery, request: &CrudRequest) -> Result<SelectQuery> {
        let mut compiler = SqlCompiler {
            adapter: self,
            query: &query,
            relations: &request.relations,
            ilike: self.ilike_enabled(),
            parameters: BTreeMap::new(),
        };

        let condition = compile_where(&mut compiler, &request.where_)?;
        let parameters = compiler.parameters;
        Ok(match condition {
            Some(condition) => query.and_where(&condition, parameters),
            None => query,
        })
    }

    fn adapt_order(&self, query: &mut SelectQuery, request: &CrudRequest) -> Result<()> {
        for order in &request.order {
            if !self.validate_field(&query.entity, &order.field, Clause::Order)? {
                continue;
            }
            let alias = field_alias(&query.alias, &request.relations, order.field.base());
            query
                .order_by
                .push((format!("{}.{}", alias, order.field.name()), order.order));
        }
        Ok(())
    }

    fn paginate(&self, mut query: SelectQuery, request: &CrudRequest) -> SelectQuery {
        let offset = request.effective_offset();
        query.limit = request.limit;
        query.offset = (offset > 0).then_some(offset);
        query
    }
}

#[async_trait]
impl QueryAdapter for SqlQueryAdapter {
    type Query = SelectQuery;
    type Entity = Value;

    fn build(&self, query: SelectQuery, request: &CrudRequest) -> Result<SelectQuery> {
        let query = self.create_base_query(query, request)?;
        let query = self.paginate(query, request);
        debug!(sql = %query, "Built SQL query");
        Ok(query)
    }

    async fn get_one(&self, query: SelectQuery, request: &CrudRequest) -> Result<Option<Value>> {
        let executor = self.executor()?;
        let query = self.create_base_query(query, request)?;
        debug!(sql = %query, "Fetching one row");
        executor.fetch_one(&query).await
    }

    async fn get_many(&self, query: SelectQuery, request: &CrudRequest) -> Result<GetManyResult<Value>> {
        let executor = self.executor()?;
        let full = self.create_base_query(query, request)?;
        let paginated = self.paginate(full.clone(), request);
        debug!(sql = %paginated, "Fetching rows");

        let (data, total) = tokio::try_join!(executor.fetch_many(&paginated), executor.count(&full))?;
        Ok(shape_result(data, total, request.effective_offset(), request.limit))
    }
}

/// `{main}_{base...}`, or the main alias for an empty base.
fn alias_path(main: &str, base: &[String]) -> String {
    std::iter::once(main)
        .chain(base.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join("_")
}

/// Alias a column with base path `base` is reachable under.
fn field_alias(main: &str, relations: &[Relation], base: &[String]) -> String {
    if base.is_empty() {
        return main.to_string();
    }
    relations
        .iter()
        .find(|r| r.field.segments() == base)
        .and_then(|r| r.alias.clone())
        .unwrap_or_else(|| alias_path(main, base))
}

/// Compiles leaves into `alias.column <op> :param` fragments.
struct SqlCompiler<'a> {
    adapter: &'a SqlQueryAdapter,
    query: &'a SelectQuery,
    relations: &'a [Relation],
    ilike: bool,
    parameters: BTreeMap<String, SqlParam>,
}

impl SqlCompiler<'_> {
    /// `{name}_{n}` with the smallest `n` not used by the query or this compilation.
    fn create_param(&mut self, field: &FieldPath) -> String {
        (0..)
            .map(|n| format!("{}_{}", field.name(), n))
            .find(|name| {
                !self.query.has_parameter(name)
                    && !self.parameters.contains_key(name)
                    && !self.parameters.contains_key(&format!("{}_start", name))
            })
            .unwrap_or_default()
    }

    fn bind(&mut self, name: String, value: impl Into<SqlParam>) {
        self.parameters.insert(name, value.into());
    }

    fn lower_like(&self, column: &str, negate: bool) -> String {
        match (self.ilike, negate) {
            (true, false) => format!("{} ILIKE", column),
            (true, true) => format!("{} NOT ILIKE", column),
            (false, false) => format!("LOWER({}) LIKE", column),
            (false, true) => format!("LOWER({}) NOT LIKE", column),
        }
    }
}

impl WhereCompiler for SqlCompiler<'_> {
    type Fragment = String;

    fn compile_field(&mut self, condition: &FieldCondition, _scope: Scope) -> Result<Option<String>> {
        let FieldCondition {
            field,
            operator,
            value,
        } = condition;

        if !self
            .adapter
            .validate_field(&self.query.entity, field, Clause::Where)?
        {
            return Ok(None);
        }
        operator.validate(value)?;

        let alias = field_alias(&self.query.alias, self.relations, field.base());
        let column = format!("{}.{}", alias, field.name());
        let param = self.create_param(field);

        let (scalar, list) = match value {
            WhereValue::Scalar(scalar) => (Some(scalar.clone()), Vec::new()),
            WhereValue::List(items) => (None, items.clone()),
        };
        let text = scalar.as_ref().map(|s| s.as_text()).unwrap_or_default();
        let scalar = scalar.unwrap_or(Scalar::Null);

        let fragment = match operator {
            Operator::Eq => format!("{} = :{}", column, param),
            Operator::Neq => format!("{} != :{}", column, param),
            Operator::Gt => format!("{} > :{}", column, param),
            Operator::Gte => format!("{} >= :{}", column, param),
            Operator::Lt => format!("{} < :{}", column, param),
            Operator::Lte => format!("{} <= :{}", column, param),
            Operator::Starts | Operator::Ends | Operator::Contains => {
                format!("{} LIKE :{}", column, param)
            },
            Operator::NotContains => format!("{} NOT LIKE :{}", column, param),
            Operator::In => format!("{} IN (:...{})", column, param),
            Operator::NotIn => format!("{} NOT IN (:...{})", column, param),
            Operator::Between => {
                format!("{} BETWEEN :{}_start AND :{}_end", column, param, param)
            },
            Operator::IsNull => format!("{} IS NULL", column),
            Operator::NotNull => format!("{} IS NOT NULL", column),
            Operator::EqLower => format!("LOWER({}) = :{}", column, param),
            Operator::NeqLower => format!("LOWER({}) != :{}", column, param),
            Operator::StartsLower | Operator::EndsLower | Operator::ContainsLower => {
                format!("{} :{}", self.lower_like(&column, false), param)
            },
            Operator::NotContainsLower => format!("{} :{}", self.lower_like(&column, true), param),
            Operator::InLower => format!("LOWER({}) IN (:...{})", column, param),
            Operator::NotInLower => format!("LOWER({}) NOT IN (:...{})", column, param),
        };

        match operator {
            Operator::Eq
            | Operator::Neq
            | Operator::Gt
            | Operator::Gte
            | Operator::Lt
            | Operator::Lte
            | Operator::EqLower
            | Operator::NeqLower => self.bind(param, scalar),
            Operator::Starts | Operator::StartsLower => {
                self.bind(param, Scalar::String(format!("{}%", text)))
            },
            Operator::Ends | Operator::EndsLower => {
                self.bind(param, Scalar::String(format!("%{}", text)))
            },
            Operator::Contains
            | Operator::NotContains
            | Operator::ContainsLower
            | Operator::NotContainsLower => {
                self.bind(param, Scalar::String(format!("%{}%", text)))
            },
            Operator::In | Operator::NotIn | Operator::InLower | Operator::NotInLower => {
                self.bind(param, list)
            },
            Operator::Between => {
                let mut bounds = list.into_iter();
                let start = bounds.next().unwrap_or(Scalar::Null);
                let end = bounds.next().unwrap_or(Scalar::Null);
                self.bind(format!("{}_start", param), start);
                self.bind(format!("{}_end", param), end);
            },
            Operator::IsNull | Operator::NotNull => {},
        }

        Ok(Some(fragment))
    }

    fn join(&mut self, op: LogicalOp, fragments: Vec<String>, _scope: Scope) -> String {
        fragments
            .iter()
            .map(|fragment| format!("({})", fragment))
            .collect::<Vec<_>>()
            .join(&format!(" {} ", op))
    }
}
