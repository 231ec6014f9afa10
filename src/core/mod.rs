//! Errors and configuration shared by every crudql component.

#![warn(missing_docs)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{
    Config, ConfigBuilder, DynamoDbConfig, EntityConfig, InvalidFieldPolicy, InvalidFieldsConfig,
    LogLevel, MongoConfig, SqlConfig,
};
pub use error::{CrudError, Result};
