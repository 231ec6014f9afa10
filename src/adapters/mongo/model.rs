//! Adapter over ODM-style model queries.
//!
//! A [`ModelQuery`] accumulates conditions the way a model's `where()`
//! chain does, so a caller can scope the base query (tenant, soft delete)
//! and the request filter is ANDed on top instead of replacing it.

use super::base::{build_filter, build_projection, build_skip, build_sort, Document, SortSpec};
use crate::adapters::QueryAdapter;
use crate::core::{CrudError, MongoConfig, Result};
use crate::query::{shape_result, CrudRequest, GetManyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Clonable model query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelQuery {
    pub conditions: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: SortSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl ModelQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition; empty documents are skipped.
    pub fn where_(mut self, condition: Document) -> Self {
        if !condition.is_empty() {
            self.conditions.push(condition);
        }
        self
    }

    /// All conditions merged: `{}`, the single condition, or `{$and: [...]}`.
    pub fn filter(&self) -> Document {
        match self.conditions.as_slice() {
            [] => Document::new(),
            [only] => only.clone(),
            all => {
                let mut filter = Document::new();
                filter.insert(
                    "$and".to_string(),
                    Value::Array(all.iter().cloned().map(Value::Object).collect()),
                );
                filter
            },
        }
    }
}

/// Executes model queries.
#[async_trait]
pub trait ModelExecutor: Send + Sync {
    async fn exec(&self, query: &ModelQuery) -> Result<Vec<Value>>;

    /// Count documents matching `query`'s conditions.
    async fn count_documents(&self, query: &ModelQuery) -> Result<u64>;
}

/// [`QueryAdapter`] over [`ModelQuery`].
#[derive(Clone, Default)]
pub struct ModelQueryAdapter {
    config: MongoConfig,
    executor: Option<Arc<dyn ModelExecutor>>,
}

impl std::fmt::Debug for ModelQueryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelQueryAdapter")
            .field("config", &self.config)
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

impl ModelQueryAdapter {
    pub fn new(config: MongoConfig) -> Self {
        Self {
            config,
            executor: None,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ModelExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    fn executor(&self) -> Result<&Arc<dyn ModelExecutor>> {
        self.executor
            .as_ref()
            .ok_or_else(|| CrudError::config("No model executor attached to the adapter"))
    }

    fn adapt_filter(&self, query: ModelQuery, request: &CrudRequest) -> Result<ModelQuery> {
        Ok(query.where_(build_filter(&request.where_)?))
    }

    fn adapt_projection_and_sort(&self, mut query: ModelQuery, request: &CrudRequest) -> ModelQuery {
        if let Some(projection) = build_projection(request) {
            query.projection = Some(projection);
        }
        if !request.order.is_empty() {
            query.sort = build_sort(request);
        }
        query
    }

    fn paginate(&self, mut query: ModelQuery, request: &CrudRequest) -> ModelQuery {
        let skip = build_skip(request);
        if skip > 0 {
            query.skip = Some(skip);
        }
        if let Some(limit) = request.limit {
            query.limit = Some(limit);
        }
        query
    }

    async fn count(&self, executor: &dyn ModelExecutor, query: &ModelQuery) -> Result<u64> {
        if self.config.disable_count {
            return Ok(0);
        }
        executor.count_documents(query).await
    }
}

#[async_trait]
impl QueryAdapter for ModelQueryAdapter {
    type Query = ModelQuery;
    type Entity = Value;

    fn build(&self, query: ModelQuery, request: &CrudRequest) -> Result<ModelQuery> {
        let query = self.adapt_filter(query, request)?;
        let query = self.adapt_projection_and_sort(query, request);
        let query = self.paginate(query, request);
        let filter = Value::Object(query.filter());
        debug!(filter = %filter, "Built model query");
        Ok(query)
    }

    async fn get_one(&self, query: ModelQuery, request: &CrudRequest) -> Result<Option<Value>> {
        let executor = self.executor()?;
        let mut query = self.adapt_filter(query, request)?;
        query = self.adapt_projection_and_sort(query, request);
        query.limit = Some(1);
        Ok(executor.exec(&query).await?.into_iter().next())
    }

    async fn get_many(&self, query: ModelQuery, request: &CrudRequest) -> Result<GetManyResult<Value>> {
        let executor = self.executor()?;
        let count_query = self.adapt_filter(query, request)?;
        let query = self.adapt_projection_and_sort(count_query.clone(), request);
        let query = self.paginate(query, request);

        let (data, total) = tokio::try_join!(
            executor.exec(&query),
            self.count(executor.as_ref(), &count_query)
        )?;
        Ok(shape_result(data, total, build_skip(request), request.limit))
    }
}
