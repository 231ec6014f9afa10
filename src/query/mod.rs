//! Request model and condition tree.
//!
//! Raw query parameters go through [`CrudRequestParser`], which uses the
//! search normalizer and [`WhereBuilder`] to produce a [`CrudRequest`] with a
//! canonical [`Where`] tree. Adapters in [`crate::adapters`] consume that
//! request.

pub mod ast;
pub mod builder;
pub mod field_path;
pub mod filters;
pub mod pagination;
pub mod parser;
pub mod request;
pub mod search;

pub use ast::{FieldCondition, LogicalOp, Operator, Scalar, ValueKind, Where, WhereValue};
pub use builder::{Cursor, WhereBuilder};
pub use field_path::FieldPath;
pub use pagination::{effective_offset, shape_result, GetManyResult};
pub use parser::{params_from_pairs, CrudRequestParser, ParamValue, RequestParams};
pub use request::{CrudRequest, Order, Relation, SortDirection};
pub use search::{parse_crud_filters, parse_crud_search};
