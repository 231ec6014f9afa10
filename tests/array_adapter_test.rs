//! End-to-end tests: query parameters through the parser into the in-memory adapter.

mod common;

use common::posts;
use crudql::adapters::array::ArrayQueryAdapter;
use crudql::adapters::QueryAdapter;
use crudql::query::filters::{ensure_eq, filter_properties};
use crudql::query::{
    params_from_pairs, CrudRequest, CrudRequestParser, FieldPath, Operator, WhereBuilder,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn request(pairs: &[(&str, &str)]) -> CrudRequest {
    CrudRequestParser::new()
        .parse(&params_from_pairs(pairs.iter().copied()))
        .unwrap()
}

#[tokio::test]
async fn test_search_sort_and_page() {
    let request = request(&[
        ("fields", "id,title"),
        ("s", r#"{"$or": [{"category.name": "Tech"}, {"id": {"$gte": 3}}]}"#),
        ("sort", "id,DESC"),
        ("limit", "2"),
        ("page", "1"),
    ]);

    let result = ArrayQueryAdapter::new().get_many(posts(), &request).await.unwrap();

    assert_eq!(result.data, vec![json!({"id": 1, "title": "Rust"})]);
    assert_eq!(result.count, 1);
    assert_eq!(result.total, 3);
    assert_eq!(result.page, 2);
    assert_eq!(result.page_count, 2);
}

#[tokio::test]
async fn test_legacy_filters() {
    let request = request(&[("filter", "category.name||$eq||Tech"), ("filter", "title||$startsL||to")]);

    let result = ArrayQueryAdapter::new().get_many(posts(), &request).await.unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.data[0]["id"], json!(2));
}

#[tokio::test]
async fn test_server_side_restrictions() {
    let request = request(&[("s", r#"{"isActive": true, "secret": 1}"#)]);
    let request = filter_properties(request, &["id", "title", "isActive", "category.id"]);
    let request = ensure_eq(request, "category.id", 4).unwrap();

    let row = ArrayQueryAdapter::new().get_one(posts(), &request).await.unwrap();

    assert_eq!(
        row,
        Some(json!({"id": 3, "title": "Ski", "isActive": true, "category": {"id": 4}}))
    );
}

#[tokio::test]
async fn test_builder_tree() {
    let mut builder = WhereBuilder::new();
    let root = builder.root();
    let or = builder.add_or(root).unwrap();
    builder
        .add_field(or, FieldPath::parse("isActive"), Operator::Eq, true.into())
        .unwrap();
    builder
        .add_field(or, FieldPath::parse("id"), Operator::Eq, 2.into())
        .unwrap();
    let request = CrudRequest {
        where_: builder.build(),
        ..CrudRequest::default()
    };

    let result = ArrayQueryAdapter::new().get_many(posts(), &request).await.unwrap();
    assert_eq!(result.total, 3);
    assert_eq!(result.page_count, 1);
}
