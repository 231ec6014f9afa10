//! Query adapters.
//!
//! Each adapter translates a [`CrudRequest`] into one store's native query
//! value and, given a store handle, executes it. Building is synchronous and
//! never touches the store; `get_one`/`get_many` add execution and result
//! shaping on top.
//!
//! | adapter      | native query                  | store trait            |
//! |--------------|-------------------------------|------------------------|
//! | `array`      | `Vec<serde_json::Value>`      | none (in memory)       |
//! | `sql`        | [`sql::SelectQuery`]          | [`sql::SqlExecutor`]   |
//! | `mongo`      | [`mongo::FindCursor`], [`mongo::ModelQuery`] | [`mongo::DocumentCollection`], [`mongo::ModelExecutor`] |
//! | `dynamodb`   | [`dynamodb::DynamoQuery`]     | [`dynamodb::DynamoDbClient`] |

pub mod array;
pub mod dynamodb;
pub mod mongo;
pub mod sql;
pub mod walk;

use crate::core::Result;
use crate::query::{CrudRequest, GetManyResult};
use async_trait::async_trait;

pub use walk::{compile_where, Scope, WhereCompiler};

/// Translate requests into a native query and run them.
#[async_trait]
pub trait QueryAdapter: Send + Sync {
    /// Native query value the request is applied to
    type Query: Send;
    /// Row type returned by the store
    type Entity: Send;

    /// Apply the request to `query` without executing anything.
    fn build(&self, query: Self::Query, request: &CrudRequest) -> Result<Self::Query>;

    /// Fetch the first matching row.
    async fn get_one(&self, query: Self::Query, request: &CrudRequest) -> Result<Option<Self::Entity>>;

    /// Fetch one page of rows plus the unpaginated total.
    async fn get_many(
        &self,
        query: Self::Query,
        request: &CrudRequest,
    ) -> Result<GetManyResult<Self::Entity>>;
}
