//! Configuration management for crudql.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults

use crate::core::{CrudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete configuration for crudql
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relational adapter configuration
    pub sql: SqlConfig,
    /// Document-store adapter configuration
    pub mongo: MongoConfig,
    /// Partitioned key-value adapter configuration, absent when unused
    pub dynamodb: Option<DynamoDbConfig>,
    /// Request parsing limits
    pub parser: ParserConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// How a clause treats a field path that does not resolve against metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidFieldPolicy {
    /// Drop the field silently
    Ignore,
    /// Fail the request
    Deny,
    /// Pass the field through unchecked
    AllowUnsafe,
}

/// Invalid field policy per clause
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidFieldsConfig {
    /// Select list
    pub select: InvalidFieldPolicy,
    /// Sort keys
    pub order: InvalidFieldPolicy,
    /// Filter leaves
    pub r#where: InvalidFieldPolicy,
    /// Joined relations
    pub relations: InvalidFieldPolicy,
}

/// Column and relation names of one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Table name, defaults to the entity name
    pub table: Option<String>,
    /// Column names
    pub columns: Vec<String>,
    /// Relation property name to target entity name
    pub relations: BTreeMap<String, String>,
}

/// Relational adapter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// Use ILIKE for case-insensitive matching; detected from the dialect when unset
    pub case_insensitive_like: Option<bool>,
    /// Invalid field handling
    pub invalid_fields: InvalidFieldsConfig,
    /// Entity metadata keyed by entity name
    pub entities: BTreeMap<String, EntityConfig>,
}

/// Document-store adapter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Skip the count query; totals are reported as 0
    pub disable_count: bool,
}

/// Partitioned key-value adapter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamoDbConfig {
    /// Table name
    pub table_name: String,
    /// Dotted path of the partition key attribute
    pub partition_key: String,
    /// Dotted path of the sort key attribute
    pub sort_key: Option<String>,
    /// Skip the count request; totals are reported as 0
    pub disable_count: bool,
    /// Fail requests that would need a full table scan
    pub disable_scan: bool,
}

/// Request parsing limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Limit applied when a request has none
    pub default_limit: Option<u64>,
    /// Upper bound for any requested limit
    pub max_limit: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for InvalidFieldsConfig {
    fn default() -> Self {
        InvalidFieldsConfig {
            select: InvalidFieldPolicy::Ignore,
            order: InvalidFieldPolicy::Ignore,
            r#where: InvalidFieldPolicy::Deny,
            relations: InvalidFieldPolicy::Ignore,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Entity validation
        for (name, entity) in &self.sql.entities {
            for (relation, target) in &entity.relations {
                if !self.sql.entities.contains_key(target) {
                    return Err(CrudError::config(format!(
                        "Relation '{}.{}' targets unknown entity '{}'",
                        name, relation, target
                    )));
                }
            }
        }

        // Key-value validation
        if let Some(dynamodb) = &self.dynamodb {
            if dynamodb.table_name.is_empty() {
                return Err(CrudError::config("dynamodb.table_name must not be empty"));
            }
            if dynamodb.partition_key.is_empty() {
                return Err(CrudError::config("dynamodb.partition_key must not be empty"));
            }
            if dynamodb.sort_key.as_deref() == Some(dynamodb.partition_key.as_str()) {
                return Err(CrudError::config(format!(
                    "Partition and sort key must be different: both set to {}",
                    dynamodb.partition_key
                )));
            }
        }

        // Limit validation
        if self.parser.default_limit == Some(0) || self.parser.max_limit == Some(0) {
            return Err(CrudError::config("Limits must be greater than 0"));
        }
        if let (Some(default), Some(max)) = (self.parser.default_limit, self.parser.max_limit) {
            if default > max {
                return Err(CrudError::config(format!(
                    "default_limit {} exceeds max_limit {}",
                    default, max
                )));
            }
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| CrudError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Configure the key-value adapter table
    pub fn dynamodb_table(mut self, table_name: &str, partition_key: &str, sort_key: Option<&str>) -> Self {
        let dynamodb = self.config.dynamodb.get_or_insert_with(DynamoDbConfig::default);
        dynamodb.table_name = table_name.to_string();
        dynamodb.partition_key = partition_key.to_string();
        dynamodb.sort_key = sort_key.map(str::to_string);
        self
    }

    /// Forbid full table scans
    pub fn disable_scan(mut self, disable: bool) -> Self {
        if let Some(dynamodb) = self.config.dynamodb.as_mut() {
            dynamodb.disable_scan = disable;
        }
        self
    }

    /// Skip count queries in every adapter that supports it
    pub fn disable_count(mut self, disable: bool) -> Self {
        self.config.mongo.disable_count = disable;
        if let Some(dynamodb) = self.config.dynamodb.as_mut() {
            dynamodb.disable_count = disable;
        }
        self
    }

    /// Force ILIKE on or off
    pub fn case_insensitive_like(mut self, enabled: bool) -> Self {
        self.config.sql.case_insensitive_like = Some(enabled);
        self
    }

    /// Register an entity for the relational adapter
    pub fn entity(mut self, name: &str, entity: EntityConfig) -> Self {
        self.config.sql.entities.insert(name.to_string(), entity);
        self
    }

    /// Set default and maximum limits
    pub fn limits(mut self, default_limit: Option<u64>, max_limit: Option<u64>) -> Self {
        self.config.parser.default_limit = default_limit;
        self.config.parser.max_limit = max_limit;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sql.invalid_fields.r#where, InvalidFieldPolicy::Deny);
        assert_eq!(config.sql.invalid_fields.select, InvalidFieldPolicy::Ignore);
    }

    #[test]
    fn test_key_conflict() {
        let config = ConfigBuilder::new()
            .dynamodb_table("posts", "id", Some("id"))
            .build();
        assert!(config.is_err());
    }

    #[test]
    fn test_limits() {
        assert!(ConfigBuilder::new().limits(Some(50), Some(10)).build().is_err());
        assert!(ConfigBuilder::new().limits(Some(0), None).build().is_err());
        assert!(ConfigBuilder::new().limits(Some(10), Some(50)).build().is_ok());
    }

    #[test]
    fn test_unknown_relation_target() {
        let mut relations = BTreeMap::new();
        relations.insert("category".to_string(), "category".to_string());
        let config = ConfigBuilder::new()
            .entity(
                "post",
                EntityConfig {
                    columns: vec!["id".to_string()],
                    relations,
                    ..EntityConfig::default()
                },
            )
            .build();
        assert!(config.is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .dynamodb_table("posts", "category.id", Some("id"))
            .disable_scan(true)
            .disable_count(true)
            .case_insensitive_like(false)
            .debug(true)
            .build()
            .unwrap();

        let dynamodb = config.dynamodb.unwrap();
        assert_eq!(dynamodb.table_name, "posts");
        assert!(dynamodb.disable_scan);
        assert!(dynamodb.disable_count);
        assert!(config.mongo.disable_count);
        assert_eq!(config.sql.case_insensitive_like, Some(false));
        assert!(config.debug);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
sql:
  invalid_fields:
    where: ignore
  entities:
    post:
      columns: [id, title, isActive]
      relations:
        category: category
    category:
      columns: [id, name]
dynamodb:
  table_name: posts
  partition_key: category.id
  sort_key: id
  disable_scan: true
logging:
  level: debug
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.sql.invalid_fields.r#where, InvalidFieldPolicy::Ignore);
        assert_eq!(config.sql.invalid_fields.order, InvalidFieldPolicy::Ignore);
        assert_eq!(config.sql.entities["post"].columns.len(), 3);
        let dynamodb = config.dynamodb.unwrap();
        assert_eq!(dynamodb.sort_key.as_deref(), Some("id"));
        assert!(dynamodb.disable_scan);
        assert!(!dynamodb.disable_count);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }
}
