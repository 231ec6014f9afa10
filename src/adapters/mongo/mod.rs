//! Document-store adapters.
//!
//! Both adapters share the translation in [`base`] and differ only in the
//! native query they build on:
//! - [`MongoDbQueryAdapter`] fills a driver [`FindCursor`], replacing its filter
//! - [`ModelQueryAdapter`] extends a [`ModelQuery`], ANDing onto its conditions

pub mod base;
pub mod cursor;
pub mod model;

pub use base::{build_filter, build_projection, build_skip, build_sort, Document, SortSpec};
pub use cursor::{DocumentCollection, FindCursor, MongoDbQueryAdapter};
pub use model::{ModelExecutor, ModelQuery, ModelQueryAdapter};
