//! Document-store adapter execution tests.

mod common;

use common::{posts, MockCollection, MockModelExecutor};
use crudql::adapters::mongo::{FindCursor, ModelQuery, ModelQueryAdapter, MongoDbQueryAdapter};
use crudql::adapters::QueryAdapter;
use crudql::core::{CrudError, MongoConfig};
use crudql::query::{params_from_pairs, CrudRequest, CrudRequestParser};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn request(pairs: &[(&str, &str)]) -> CrudRequest {
    CrudRequestParser::new()
        .parse(&params_from_pairs(pairs.iter().copied()))
        .unwrap()
}

#[tokio::test]
async fn test_cursor_get_many() {
    let collection = Arc::new(MockCollection::new(posts()));
    let adapter = MongoDbQueryAdapter::new(MongoConfig::default()).with_collection(collection.clone());

    let request = request(&[("s", r#"{"category.id": 3}"#), ("limit", "2")]);
    let result = adapter.get_many(FindCursor::new(), &request).await.unwrap();

    assert_eq!(result.count, 2);
    assert_eq!(result.total, 3);
    assert_eq!(result.page, 1);
    assert_eq!(result.page_count, 2);

    let counted = collection.counted.lock().await;
    assert_eq!(Value::Object(counted[0].clone()), json!({"category.id": 3}));
}

#[tokio::test]
async fn test_cursor_filter_replaces_existing() {
    let collection = Arc::new(MockCollection::new(posts()));
    let adapter = MongoDbQueryAdapter::new(MongoConfig::default()).with_collection(collection.clone());

    let mut stale = serde_json::Map::new();
    stale.insert("deleted".to_string(), json!(true));
    let cursor = FindCursor::new().filter(stale);

    adapter
        .get_one(cursor, &request(&[("s", r#"{"id": {"$in": [1, 2]}}"#)]))
        .await
        .unwrap();

    let cursors = collection.cursors.lock().await;
    assert_eq!(Value::Object(cursors[0].filter.clone()), json!({"id": {"$in": [1, 2]}}));
}

#[tokio::test]
async fn test_disable_count_reports_zero_total() {
    let collection = Arc::new(MockCollection::new(posts()));
    let adapter = MongoDbQueryAdapter::new(MongoConfig {
        disable_count: true,
    })
    .with_collection(collection.clone());

    let result = adapter
        .get_many(FindCursor::new(), &CrudRequest::default())
        .await
        .unwrap();

    assert_eq!(result.count, 3);
    assert_eq!(result.total, 0);
    assert!(collection.counted.lock().await.is_empty());
}

#[tokio::test]
async fn test_model_query_keeps_scope() {
    let executor = Arc::new(MockModelExecutor::new(posts()));
    let adapter = ModelQueryAdapter::new(MongoConfig::default()).with_executor(executor.clone());

    let mut tenant = serde_json::Map::new();
    tenant.insert("tenant".to_string(), json!("acme"));
    let scoped = ModelQuery::new().where_(tenant);

    let request = request(&[("s", r#"{"isActive": true}"#), ("limit", "1"), ("offset", "1")]);
    let result = adapter.get_many(scoped, &request).await.unwrap();

    assert_eq!(result.count, 1);
    assert_eq!(result.total, 3);
    assert_eq!(result.page, 2);

    let expected_filter = json!({"$and": [{"tenant": "acme"}, {"isActive": true}]});
    let queries = executor.queries.lock().await;
    assert_eq!(Value::Object(queries[0].filter()), expected_filter);
    assert_eq!(queries[0].skip, Some(1));
    assert_eq!(queries[0].limit, Some(1));

    let counted = executor.counted.lock().await;
    assert_eq!(Value::Object(counted[0].filter()), expected_filter);
    assert_eq!(counted[0].skip, None);
    assert_eq!(counted[0].limit, None);
}

#[tokio::test]
async fn test_model_get_one_limits_to_one() {
    let executor = Arc::new(MockModelExecutor::new(posts()));
    let adapter = ModelQueryAdapter::new(MongoConfig::default()).with_executor(executor.clone());

    let row = adapter
        .get_one(ModelQuery::new(), &CrudRequest::default())
        .await
        .unwrap();

    assert_eq!(row, posts().first().cloned());
    assert_eq!(executor.queries.lock().await[0].limit, Some(1));
}

#[tokio::test]
async fn test_unsupported_value_fails_before_io() {
    let collection = Arc::new(MockCollection::new(posts()));
    let adapter = MongoDbQueryAdapter::new(MongoConfig::default()).with_collection(collection.clone());

    let err = adapter
        .get_many(FindCursor::new(), &request(&[("s", r#"{"title": {"$starts": 5}}"#)]))
        .await
        .unwrap_err();

    assert!(matches!(err, CrudError::InvalidOperatorValue { .. }));
    assert!(collection.cursors.lock().await.is_empty());
}
