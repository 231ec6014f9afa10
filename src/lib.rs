//! crudql - CRUD request to native query translation.
//!
//! crudql turns the parameters of a CRUD list endpoint (field selection,
//! relation joins, sorting, pagination and a JSON search filter) into a
//! store-independent [`CrudRequest`](query::CrudRequest), then compiles that
//! request into the native query of a concrete store.
//!
//! # Features
//!
//! - **Request parsing**: `fields`, `join`, `sort`, `s`, `filter`/`or`, `limit`, `offset`, `page`
//! - **Condition trees**: a cursor builder with bracket flattening and operator validation
//! - **Adapters**: in-memory arrays, relational select queries, document-store
//!   cursors and model queries, partitioned key-value GetItem/Query/Scan
//! - **Result shaping**: page and page count from offset, limit and total
//!
//! # Architecture
//!
//! - `query`: request model, condition tree, builder and parsers
//! - `adapters`: one module per store, sharing the condition walker
//! - `core`: errors and configuration
//! - `cli`: command-line front end printing compiled queries
//!
//! # Example
//!
//! ```no_run
//! use crudql::adapters::sql::{SelectQuery, SqlQueryAdapter};
//! use crudql::adapters::QueryAdapter;
//! use crudql::core::SqlConfig;
//! use crudql::query::{params_from_pairs, CrudRequestParser};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = params_from_pairs([("s", r#"{"id": {"$gt": 10}}"#), ("limit", "5")]);
//!     let request = CrudRequestParser::new().parse(&params)?;
//!
//!     let adapter = SqlQueryAdapter::from_config(SqlConfig::default());
//!     let query = adapter.build(SelectQuery::new("post", "post"), &request)?;
//!     println!("{}", query.to_sql());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod adapters;
pub mod cli;
pub mod core;
pub mod query;

// Re-export core types for convenience
pub use crate::adapters::QueryAdapter;
pub use crate::core::{Config, CrudError, Result};
pub use crate::query::{CrudRequest, CrudRequestParser, GetManyResult, Where};
