//! Adapter over driver-style find cursors.

use super::base::{build_filter, build_projection, build_skip, build_sort, Document, SortSpec};
use crate::adapters::QueryAdapter;
use crate::core::{CrudError, MongoConfig, Result};
use crate::query::{shape_result, CrudRequest, GetManyResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Options of a `find` call against one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindCursor {
    pub filter: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: SortSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl FindCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    pub fn project(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A collection that can run find cursors.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    async fn find(&self, cursor: &FindCursor) -> Result<Vec<Value>>;

    async fn find_one(&self, cursor: &FindCursor) -> Result<Option<Value>>;

    async fn count_documents(&self, filter: &Document) -> Result<u64>;
}

/// [`QueryAdapter`] over [`FindCursor`]. The request filter replaces the
/// cursor's filter.
#[derive(Clone, Default)]
pub struct MongoDbQueryAdapter {
    config: MongoConfig,
    collection: Option<Arc<dyn DocumentCollection>>,
}

impl std::fmt::Debug for MongoDbQueryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDbQueryAdapter")
            .field("config", &self.config)
            .field("has_collection", &self.collection.is_some())
            .finish()
    }
}

impl MongoDbQueryAdapter {
    pub fn new(config: MongoConfig) -> Self {
        Self {
            config,
            collection: None,
        }
    }

    pub fn with_collection(mut self, collection: Arc<dyn DocumentCollection>) -> Self {
        self.collection = Some(collection);
        self
    }

    fn collection(&self) -> Result<&Arc<dyn DocumentCollection>> {
        self.collection
            .as_ref()
            .ok_or_else(|| CrudError::config("No collection attached to the adapter"))
    }

    /// Filter, projection and sort, without skip/limit.
    fn adapt(&self, cursor: FindCursor, request: &CrudRequest) -> Result<FindCursor> {
        let mut cursor = cursor.filter(build_filter(&request.where_)?);
        if let Some(projection) = build_projection(request) {
            cursor = cursor.project(projection);
        }
        if !request.order.is_empty() {
            cursor = cursor.sort(build_sort(request));
        }
        Ok(cursor)
    }

    fn paginate(&self, mut cursor: FindCursor, request: &CrudRequest) -> FindCursor {
        let skip = build_skip(request);
        if skip > 0 {
            cursor = cursor.skip(skip);
        }
        if let Some(limit) = request.limit {
            cursor = cursor.limit(limit);
        }
        cursor
    }

    async fn count(&self, collection: &dyn DocumentCollection, filter: &Document) -> Result<u64> {
        if self.config.disable_count {
            return Ok(0);
        }
        collection.count_documents(filter).await
    }
}

#[async_trait]
impl QueryAdapter for MongoDbQueryAdapter {
    type Query = FindCursor;
    type Entity = Value;

    fn build(&self, cursor: FindCursor, request: &CrudRequest) -> Result<FindCursor> {
        let cursor = self.adapt(cursor, request)?;
        let cursor = self.paginate(cursor, request);
        let filter = Value::Object(cursor.filter.clone());
        debug!(filter = %filter, "Built find cursor");
        Ok(cursor)
    }

    async fn get_one(&self, cursor: FindCursor, request: &CrudRequest) -> Result<Option<Value>> {
        let collection = self.collection()?;
        let cursor = self.build(cursor, request)?;
        collection.find_one(&cursor).await
    }

    async fn get_many(&self, cursor: FindCursor, request: &CrudRequest) -> Result<GetManyResult<Value>> {
        let collection = self.collection()?;
        let cursor = self.build(cursor, request)?;

        let (data, total) = tokio::try_join!(
            collection.find(&cursor),
            self.count(collection.as_ref(), &cursor.filter)
        )?;
        Ok(shape_result(data, total, build_skip(request), request.limit))
    }
}
