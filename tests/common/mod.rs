//! In-memory store doubles shared by the adapter integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use crudql::adapters::dynamodb::{
    AttributeValue, DynamoDbClient, DynamoQuery, Item, QueryOutput, Select,
};
use crudql::adapters::mongo::{Document, DocumentCollection, FindCursor, ModelExecutor, ModelQuery};
use crudql::adapters::sql::{Dialect, SelectQuery, SqlExecutor};
use crudql::core::{CrudError, Result};
use serde_json::{json, Value};
use tokio::sync::Mutex;

/// Sample rows used across the adapter tests.
pub fn posts() -> Vec<Value> {
    vec![
        json!({"id": 1, "title": "Rust", "isActive": true, "category": {"id": 3, "name": "Tech"}}),
        json!({"id": 2, "title": "Tokio", "isActive": false, "category": {"id": 3, "name": "Tech"}}),
        json!({"id": 3, "title": "Ski", "isActive": true, "category": {"id": 4, "name": "Sports"}}),
    ]
}

/// Error type for failing stores.
#[derive(Debug)]
pub struct StoreDown;

impl std::fmt::Display for StoreDown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store unavailable")
    }
}

impl std::error::Error for StoreDown {}

/// Relational executor returning fixed rows and recording every query.
pub struct MockSqlExecutor {
    pub dialect: Dialect,
    pub rows: Vec<Value>,
    pub total: u64,
    pub fail: bool,
    pub queries: Mutex<Vec<SelectQuery>>,
    pub counts: Mutex<Vec<SelectQuery>>,
}

impl MockSqlExecutor {
    pub fn new(dialect: Dialect, rows: Vec<Value>, total: u64) -> Self {
        Self {
            dialect,
            rows,
            total,
            fail: false,
            queries: Mutex::new(Vec::new()),
            counts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Dialect::Postgres, Vec::new(), 0)
        }
    }
}

#[async_trait]
impl SqlExecutor for MockSqlExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn fetch_many(&self, query: &SelectQuery) -> Result<Vec<Value>> {
        if self.fail {
            return Err(CrudError::store(StoreDown));
        }
        self.queries.lock().await.push(query.clone());
        Ok(self.rows.clone())
    }

    async fn fetch_one(&self, query: &SelectQuery) -> Result<Option<Value>> {
        self.queries.lock().await.push(query.clone());
        Ok(self.rows.first().cloned())
    }

    async fn count(&self, query: &SelectQuery) -> Result<u64> {
        self.counts.lock().await.push(query.clone());
        Ok(self.total)
    }
}

/// Collection returning fixed documents.
pub struct MockCollection {
    pub documents: Vec<Value>,
    pub cursors: Mutex<Vec<FindCursor>>,
    pub counted: Mutex<Vec<Document>>,
}

impl MockCollection {
    pub fn new(documents: Vec<Value>) -> Self {
        Self {
            documents,
            cursors: Mutex::new(Vec::new()),
            counted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DocumentCollection for MockCollection {
    async fn find(&self, cursor: &FindCursor) -> Result<Vec<Value>> {
        self.cursors.lock().await.push(cursor.clone());
        let limit = cursor.limit.map_or(usize::MAX, |l| l as usize);
        Ok(self.documents.iter().take(limit).cloned().collect())
    }

    async fn find_one(&self, cursor: &FindCursor) -> Result<Option<Value>> {
        self.cursors.lock().await.push(cursor.clone());
        Ok(self.documents.first().cloned())
    }

    async fn count_documents(&self, filter: &Document) -> Result<u64> {
        self.counted.lock().await.push(filter.clone());
        Ok(self.documents.len() as u64)
    }
}

/// Model executor returning fixed documents.
pub struct MockModelExecutor {
    pub documents: Vec<Value>,
    pub queries: Mutex<Vec<ModelQuery>>,
    pub counted: Mutex<Vec<ModelQuery>>,
}

impl MockModelExecutor {
    pub fn new(documents: Vec<Value>) -> Self {
        Self {
            documents,
            queries: Mutex::new(Vec::new()),
            counted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelExecutor for MockModelExecutor {
    async fn exec(&self, query: &ModelQuery) -> Result<Vec<Value>> {
        self.queries.lock().await.push(query.clone());
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(self.documents.iter().take(limit).cloned().collect())
    }

    async fn count_documents(&self, query: &ModelQuery) -> Result<u64> {
        self.counted.lock().await.push(query.clone());
        Ok(self.documents.len() as u64)
    }
}

/// Key-value client returning fixed items for every call.
pub struct MockDynamoDb {
    pub items: Vec<Item>,
    /// Items counted per COUNT page; `None` counts everything at once.
    pub count_page: Option<usize>,
    pub calls: Mutex<Vec<(&'static str, DynamoQuery)>>,
}

impl MockDynamoDb {
    pub fn new(documents: &[Value]) -> Self {
        let items = documents
            .iter()
            .filter_map(|document| match AttributeValue::from_json(document) {
                AttributeValue::M(item) => Some(item),
                _ => None,
            })
            .collect();
        Self {
            items,
            count_page: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_count_page(mut self, size: usize) -> Self {
        self.count_page = Some(size);
        self
    }

    pub async fn calls(&self) -> Vec<(&'static str, DynamoQuery)> {
        self.calls.lock().await.clone()
    }

    fn output(&self, input: &DynamoQuery) -> QueryOutput {
        if input.select != Some(Select::Count) {
            return QueryOutput {
                items: self.items.clone(),
                count: self.items.len() as u64,
                last_evaluated_key: None,
            };
        }

        // Pages resume after the last counted item, addressed by its position.
        let start = input
            .exclusive_start_key
            .as_ref()
            .and_then(|key| key.get("position"))
            .and_then(|position| match position {
                AttributeValue::N(n) => n.parse::<usize>().ok(),
                _ => None,
            })
            .unwrap_or(0);
        let end = match self.count_page {
            Some(size) => (start + size).min(self.items.len()),
            None => self.items.len(),
        };
        let last_evaluated_key = (end < self.items.len()).then(|| {
            let mut key = Item::new();
            key.insert("position".to_string(), AttributeValue::N(end.to_string()));
            key
        });

        QueryOutput {
            items: Vec::new(),
            count: (end - start) as u64,
            last_evaluated_key,
        }
    }
}

#[async_trait]
impl DynamoDbClient for MockDynamoDb {
    async fn get_item(&self, input: &DynamoQuery) -> Result<Option<Item>> {
        self.calls.lock().await.push(("get_item", input.clone()));
        Ok(self.items.first().cloned())
    }

    async fn query(&self, input: &DynamoQuery) -> Result<QueryOutput> {
        self.calls.lock().await.push(("query", input.clone()));
        Ok(self.output(input))
    }

    async fn scan(&self, input: &DynamoQuery) -> Result<QueryOutput> {
        self.calls.lock().await.push(("scan", input.clone()));
        Ok(self.output(input))
    }
}
