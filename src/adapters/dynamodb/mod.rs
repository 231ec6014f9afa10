//! Partitioned key-value adapter.
//!
//! Compiles a request into a GetItem, Query or Scan input. Leaves of the
//! top-level AND chain that pin the partition key (`eq`) or constrain the
//! sort key are pulled out of the filter and used as the key:
//!
//! - partition key eq, sort key eq (or no sort key), nothing else: point lookup
//! - partition key eq otherwise: range query with a key condition
//! - no partition key: full scan, with every leaf kept in the filter
//!
//! Predicates under an OR never pin a key, since they do not always apply.
//! Offsets are not supported by the store and are ignored.

pub mod query;

pub use query::{
    unmarshall, AttributeValue, DynamoQuery, Item, QueryKind, QueryOutput, Select, ValueBinding,
};

use super::walk::{compile_where, Scope, WhereCompiler};
use super::QueryAdapter;
use crate::core::{CrudError, DynamoDbConfig, Result};
use crate::query::{
    shape_result, CrudRequest, FieldCondition, FieldPath, GetManyResult, LogicalOp, Operator,
    Scalar, WhereValue,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const ADAPTER: &str = "dynamodb";

/// The three read calls the adapter issues.
#[async_trait]
pub trait DynamoDbClient: Send + Sync {
    async fn get_item(&self, input: &DynamoQuery) -> Result<Option<Item>>;

    async fn query(&self, input: &DynamoQuery) -> Result<QueryOutput>;

    async fn scan(&self, input: &DynamoQuery) -> Result<QueryOutput>;
}

/// Key predicates pulled out of the top-level AND chain.
#[derive(Debug, Default)]
struct KeyPredicates {
    partition: Option<Scalar>,
    sort: Option<FieldCondition>,
}

/// [`QueryAdapter`] over [`DynamoQuery`].
#[derive(Clone)]
pub struct DynamoDbQueryAdapter {
    config: DynamoDbConfig,
    partition_key: FieldPath,
    sort_key: Option<FieldPath>,
    client: Option<Arc<dyn DynamoDbClient>>,
}

impl std::fmt::Debug for DynamoDbQueryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbQueryAdapter")
            .field("config", &self.config)
            .field("has_client", &self.client.is_some())
            .finish()
    }
}

impl DynamoDbQueryAdapter {
    pub fn new(config: DynamoDbConfig) -> Self {
        Self {
            partition_key: FieldPath::parse(&config.partition_key),
            sort_key: config.sort_key.as_deref().map(FieldPath::parse),
            config,
            client: None,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn DynamoDbClient>) -> Self {
        self.client = Some(client);
        self
    }

    fn client(&self) -> Result<&Arc<dyn DynamoDbClient>> {
        self.client
            .as_ref()
            .ok_or_else(|| CrudError::config("No DynamoDB client attached to the adapter"))
    }

    /// Projection, filter and limit, collecting key predicates when
    /// `allow_key_splitting` is set.
    fn compile_pass(
        &self,
        mut query: DynamoQuery,
        request: &CrudRequest,
        allow_key_splitting: bool,
    ) -> Result<(DynamoQuery, KeyPredicates)> {
        if query.table_name.is_empty() {
            query.table_name = self.config.table_name.clone();
        }

        if !request.select.is_empty() {
            let attributes = request
                .select
                .iter()
                .map(|field| query.register_attribute(field))
                .collect();
            query.add_projection(attributes);
        }

        let mut compiler = ExpressionCompiler {
            adapter: self,
            query,
            allow_key_splitting,
            keys: KeyPredicates::default(),
        };
        let filter = compile_where(&mut compiler, &request.where_)?;
        let ExpressionCompiler { mut query, keys, .. } = compiler;

        if let Some(filter) = filter {
            query.add_filter(filter);
        }
        if let Some(limit) = request.limit.filter(|limit| *limit > 0) {
            query.limit = Some(limit);
        }

        Ok((query, keys))
    }

    fn adapt_order(&self, query: &mut DynamoQuery, request: &CrudRequest) {
        let Some(sort_key) = &self.sort_key else {
            return;
        };
        if let Some(order) = request.order.iter().find(|o| &o.field == sort_key) {
            query.scan_index_forward = Some(order.order.is_ascending());
        }
    }

    fn marshall_key(&self, partition: &Scalar, sort: Option<&FieldCondition>) -> Item {
        let mut key = Item::new();
        key.insert(self.partition_key.to_string(), partition.into());
        if let Some(sort) = sort {
            if let Some(value) = sort.value.as_scalar() {
                key.insert(sort.field.to_string(), value.into());
            }
        }
        key
    }

    fn adapt_key_condition(&self, query: &mut DynamoQuery, keys: &KeyPredicates, partition: &Scalar) -> Result<()> {
        let name = query.register_attribute(&self.partition_key);
        let value = query.register_value(&self.partition_key, partition);
        let mut conditions = vec![format!("{} = {}", name, value)];

        if let Some(sort) = &keys.sort {
            conditions.push(sort_key_condition(query, sort)?);
        }

        query.key_condition_expression = Some(conditions.join(" AND "));
        Ok(())
    }

    fn compile(&self, base: DynamoQuery, request: &CrudRequest) -> Result<DynamoQuery> {
        match base.kind() {
            QueryKind::GetItem => self.compile_pinned_lookup(base, request),
            QueryKind::Query => {
                let (mut query, _) = self.compile_pass(base, request, false)?;
                self.adapt_order(&mut query, request);
                Ok(query)
            },
            QueryKind::Scan => self.compile_free(base, request),
        }
    }

    /// A base carrying a `Key` stays a point lookup; extracted key leaves
    /// overwrite key attributes and anything else is rejected.
    fn compile_pinned_lookup(&self, base: DynamoQuery, request: &CrudRequest) -> Result<DynamoQuery> {
        let base_filter = base.filter_expression.clone();
        let (mut query, keys) = self.compile_pass(base, request, true)?;
        if query.filter_expression != base_filter || keys.sort.as_ref().is_some_and(|s| s.operator != Operator::Eq) {
            return Err(CrudError::InvalidWhereState(
                "a point lookup cannot apply conditions beyond its key".to_string(),
            ));
        }

        let mut key = query.key.take().unwrap_or_default();
        if let Some(partition) = &keys.partition {
            key.insert(self.partition_key.to_string(), partition.into());
        }
        if let Some(value) = keys.sort.as_ref().and_then(|s| s.value.as_scalar()) {
            if let Some(sort_key) = &self.sort_key {
                key.insert(sort_key.to_string(), value.into());
            }
        }
        query.key = Some(key);
        query.limit = None;
        Ok(query)
    }

    fn compile_free(&self, base: DynamoQuery, request: &CrudRequest) -> Result<DynamoQuery> {
        let (mut query, keys) = self.compile_pass(base.clone(), request, true)?;

        let Some(partition) = keys.partition.clone() else {
            if keys.sort.is_none() {
                return Ok(query);
            }
            // A sort key leaf without its partition is not usable as a key.
            let (query, _) = self.compile_pass(base, request, false)?;
            return Ok(query);
        };

        let exact_sort = match (&self.sort_key, &keys.sort) {
            (None, _) => true,
            (Some(_), Some(sort)) => sort.operator == Operator::Eq,
            (Some(_), None) => false,
        };

        if exact_sort && query.filter_expression.is_none() {
            query.key = Some(self.marshall_key(&partition, keys.sort.as_ref()));
            query.limit = None;
            return Ok(query);
        }

        self.adapt_key_condition(&mut query, &keys, &partition)?;
        self.adapt_order(&mut query, request);
        Ok(query)
    }

    fn ensure_scan_allowed(&self, query: &DynamoQuery) -> Result<()> {
        if query.kind() == QueryKind::Scan && self.config.disable_scan {
            return Err(CrudError::ScanDisabled {
                table: query.table_name.clone(),
            });
        }
        Ok(())
    }

    async fn run(&self, client: &dyn DynamoDbClient, query: &DynamoQuery) -> Result<QueryOutput> {
        match query.kind() {
            QueryKind::Query => client.query(query).await,
            _ => client.scan(query).await,
        }
    }

    async fn count(&self, client: &dyn DynamoDbClient, query: &DynamoQuery) -> Result<u64> {
        if self.config.disable_count {
            return Ok(0);
        }

        let mut request = query.count_request();
        let mut total = 0;
        loop {
            let page = self.run(client, &request).await?;
            total += page.count;
            match page.last_evaluated_key {
                Some(key) => request.exclusive_start_key = Some(key),
                None => return Ok(total),
            }
        }
    }
}

/// Key condition for the sort key leaf.
fn sort_key_condition(query: &mut DynamoQuery, sort: &FieldCondition) -> Result<String> {
    let name = query.register_attribute(&sort.field);
    let binding = match sort.operator {
        Operator::Between => ValueBinding::Range,
        _ => ValueBinding::Single,
    };
    let placeholder = query.value_placeholder(&sort.field, binding);

    let comparison = |query: &mut DynamoQuery, symbol: &str| -> Result<String> {
        let value = scalar(sort.operator, &sort.value)?;
        query.bind(placeholder.clone(), value.into());
        Ok(format!("{} {} {}", name, symbol, placeholder))
    };

    match sort.operator {
        Operator::Eq => comparison(query, "="),
        Operator::Lt => comparison(query, "<"),
        Operator::Lte => comparison(query, "<="),
        Operator::Gt => comparison(query, ">"),
        Operator::Gte => comparison(query, ">="),
        Operator::Between => between(query, &name, &placeholder, sort),
        Operator::Starts => {
            let value = scalar(sort.operator, &sort.value)?;
            query.bind(placeholder.clone(), value.into());
            Ok(format!("begins_with({}, {})", name, placeholder))
        },
        other => Err(CrudError::unsupported(other, ADAPTER)),
    }
}

fn is_key_condition_operator(operator: Operator) -> bool {
    matches!(
        operator,
        Operator::Eq
            | Operator::Lt
            | Operator::Lte
            | Operator::Gt
            | Operator::Gte
            | Operator::Between
            | Operator::Starts
    )
}

fn scalar(operator: Operator, value: &WhereValue) -> Result<&Scalar> {
    value
        .as_scalar()
        .ok_or_else(|| CrudError::invalid_value(operator, "expected a primitive value"))
}

fn list(operator: Operator, value: &WhereValue) -> Result<&[Scalar]> {
    value
        .as_list()
        .ok_or_else(|| CrudError::invalid_value(operator, "expected an array value"))
}

fn between(query: &mut DynamoQuery, name: &str, placeholder: &str, condition: &FieldCondition) -> Result<String> {
    let bounds = list(condition.operator, &condition.value)?;
    let (start, end) = match bounds {
        [start, end] => (start, end),
        _ => return Err(CrudError::invalid_value(condition.operator, "expected exactly 2 values")),
    };
    query.bind(format!("{}_start", placeholder), start.into());
    query.bind(format!("{}_end", placeholder), end.into());
    Ok(format!("{} BETWEEN {}_start AND {}_end", name, placeholder, placeholder))
}

/// Compiles filter leaves into condition expressions, registering names and
/// values on the query as it goes.
struct ExpressionCompiler<'a> {
    adapter: &'a DynamoDbQueryAdapter,
    query: DynamoQuery,
    allow_key_splitting: bool,
    keys: KeyPredicates,
}

impl ExpressionCompiler<'_> {
    /// Take the leaf as a key predicate if it is the first one of its kind.
    fn extract_key(&mut self, condition: &FieldCondition, scope: Scope) -> bool {
        if !self.allow_key_splitting || !scope.top_level_and {
            return false;
        }

        if condition.field == self.adapter.partition_key
            && condition.operator == Operator::Eq
            && self.keys.partition.is_none()
        {
            if let Some(value) = condition.value.as_scalar() {
                self.keys.partition = Some(value.clone());
                return true;
            }
        }

        let is_sort_key = self.adapter.sort_key.as_ref() == Some(&condition.field);
        if is_sort_key && is_key_condition_operator(condition.operator) && self.keys.sort.is_none() {
            self.keys.sort = Some(condition.clone());
            return true;
        }

        false
    }
}

impl WhereCompiler for ExpressionCompiler<'_> {
    type Fragment = String;

    fn compile_field(&mut self, condition: &FieldCondition, scope: Scope) -> Result<Option<String>> {
        let FieldCondition {
            field,
            operator,
            value,
        } = condition;
        operator.validate(value)?;

        if self.extract_key(condition, scope) {
            return Ok(None);
        }

        let query = &mut self.query;
        let name = query.register_attribute(field);

        let expression = match operator {
            Operator::Eq | Operator::Neq | Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                let symbol = match operator {
                    Operator::Eq => "=",
                    Operator::Neq => "<>",
                    Operator::Lt => "<",
                    Operator::Lte => "<=",
                    Operator::Gt => ">",
                    _ => ">=",
                };
                let placeholder = query.register_value(field, scalar(*operator, value)?);
                format!("{} {} {}", name, symbol, placeholder)
            },
            Operator::Starts => {
                let placeholder = query.register_value(field, scalar(*operator, value)?);
                format!("begins_with({}, {})", name, placeholder)
            },
            Operator::Contains => {
                let placeholder = query.register_value(field, scalar(*operator, value)?);
                format!("contains({}, {})", name, placeholder)
            },
            Operator::NotContains => {
                let placeholder = query.register_value(field, scalar(*operator, value)?);
                format!("NOT contains({}, {})", name, placeholder)
            },
            Operator::Between => {
                let placeholder = query.value_placeholder(field, ValueBinding::Range);
                between(query, &name, &placeholder, condition)?
            },
            Operator::In | Operator::NotIn => {
                let values = list(*operator, value)?;
                let placeholder = query.value_placeholder(field, ValueBinding::List(values.len()));
                let items: Vec<String> = values
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let item_placeholder = format!("{}_{}", placeholder, i);
                        query.bind(item_placeholder.clone(), item.into());
                        item_placeholder
                    })
                    .collect();
                let membership = format!("{} IN ({})", name, items.join(", "));
                if *operator == Operator::In {
                    membership
                } else {
                    format!("NOT ({})", membership)
                }
            },
            Operator::IsNull => {
                let null = query.null_value();
                format!("(attribute_not_exists({}) OR {} = {})", name, name, null)
            },
            Operator::NotNull => {
                let null = query.null_value();
                format!("(attribute_exists({}) AND {} <> {})", name, name, null)
            },
            Operator::Ends
            | Operator::EqLower
            | Operator::NeqLower
            | Operator::StartsLower
            | Operator::EndsLower
            | Operator::ContainsLower
            | Operator::NotContainsLower
            | Operator::InLower
            | Operator::NotInLower => return Err(CrudError::unsupported(operator, ADAPTER)),
        };

        Ok(Some(expression))
    }

    fn join(&mut self, op: LogicalOp, fragments: Vec<String>, scope: Scope) -> String {
        let joined = fragments.join(&format!(" {} ", op));
        if scope.depth > 0 {
            format!("({})", joined)
        } else {
            joined
        }
    }
}

#[async_trait]
impl QueryAdapter for DynamoDbQueryAdapter {
    type Query = DynamoQuery;
    type Entity = Value;

    fn build(&self, base: DynamoQuery, request: &CrudRequest) -> Result<DynamoQuery> {
        let query = self.compile(base, request)?;
        debug!(kind = ?query.kind(), table = %query.table_name, "Built DynamoDB request");
        Ok(query)
    }

    async fn get_one(&self, base: DynamoQuery, request: &CrudRequest) -> Result<Option<Value>> {
        let client = self.client()?;
        let mut query = self.build(base, request)?;

        if query.kind() == QueryKind::GetItem {
            return Ok(client.get_item(&query).await?.as_ref().map(unmarshall));
        }

        self.ensure_scan_allowed(&query)?;
        // Limit applies before filtering, so only cap unfiltered reads.
        if query.filter_expression.is_none() {
            query.limit = Some(1);
        }
        let output = self.run(client.as_ref(), &query).await?;
        Ok(output.items.first().map(unmarshall))
    }

    async fn get_many(&self, base: DynamoQuery, request: &CrudRequest) -> Result<GetManyResult<Value>> {
        let client = self.client()?;
        let query = self.build(base, request)?;

        if query.kind() == QueryKind::GetItem {
            let data: Vec<Value> = client.get_item(&query).await?.iter().map(unmarshall).collect();
            let total = data.len() as u64;
            return Ok(shape_result(data, total, 0, request.limit));
        }

        self.ensure_scan_allowed(&query)?;
        let (output, total) = tokio::try_join!(
            self.run(client.as_ref(), &query),
            self.count(client.as_ref(), &query)
        )?;
        let data = output.items.iter().map(unmarshall).collect();
        Ok(shape_result(data, total, 0, request.limit))
    }
}
