//! Benchmarks for request parsing and per-adapter condition compilation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crudql::adapters::array::ArrayQueryAdapter;
use crudql::adapters::dynamodb::{DynamoDbQueryAdapter, DynamoQuery};
use crudql::adapters::mongo::build_filter;
use crudql::adapters::sql::{SelectQuery, SqlQueryAdapter};
use crudql::adapters::QueryAdapter;
use crudql::core::{DynamoDbConfig, InvalidFieldPolicy, SqlConfig};
use crudql::query::{params_from_pairs, CrudRequest, CrudRequestParser};
use serde_json::json;

/// Search filter with `width` OR-ed groups of three leaves each.
fn search(width: usize) -> String {
    let groups: Vec<_> = (0..width)
        .map(|i| {
            json!({
                "id": {"$gte": i},
                "title": {"$cont": format!("term{}", i)},
                "category.id": {"$in": [i, i + 1]},
            })
        })
        .collect();
    json!({"isActive": true, "$or": groups}).to_string()
}

fn request(width: usize) -> CrudRequest {
    let search = search(width);
    let params = params_from_pairs([
        ("fields", "id,title"),
        ("sort", "id,DESC"),
        ("limit", "25"),
        ("s", search.as_str()),
    ]);
    CrudRequestParser::new().parse(&params).unwrap()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for width in [1, 10, 100] {
        let search = search(width);
        let params = params_from_pairs([("s", search.as_str()), ("limit", "25")]);
        group.bench_with_input(BenchmarkId::from_parameter(width), &params, |b, params| {
            let parser = CrudRequestParser::new();
            b.iter(|| black_box(parser.parse(black_box(params)).unwrap()));
        });
    }

    group.finish();
}

fn bench_adapters(c: &mut Criterion) {
    let sql = SqlQueryAdapter::from_config(SqlConfig {
        invalid_fields: crudql::core::InvalidFieldsConfig {
            select: InvalidFieldPolicy::AllowUnsafe,
            order: InvalidFieldPolicy::AllowUnsafe,
            r#where: InvalidFieldPolicy::AllowUnsafe,
            relations: InvalidFieldPolicy::AllowUnsafe,
        },
        ..SqlConfig::default()
    });
    let dynamodb = DynamoDbQueryAdapter::new(DynamoDbConfig {
        table_name: "posts".to_string(),
        partition_key: "category.id".to_string(),
        sort_key: Some("id".to_string()),
        ..DynamoDbConfig::default()
    });
    let array = ArrayQueryAdapter::new();

    let mut group = c.benchmark_group("compile_where");

    for width in [1, 10, 100] {
        let request = request(width);

        group.bench_with_input(BenchmarkId::new("sql", width), &request, |b, request| {
            b.iter(|| black_box(sql.build(SelectQuery::new("post", "post"), request).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("mongo", width), &request, |b, request| {
            b.iter(|| black_box(build_filter(&request.where_).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("dynamodb", width), &request, |b, request| {
            b.iter(|| black_box(dynamodb.build(DynamoQuery::default(), request).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("array", width), &request, |b, request| {
            b.iter(|| black_box(array.compile(&request.where_).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_adapters);
criterion_main!(benches);
