//! Command-line interface for crudql.
//!
//! Parses CRUD query parameters the way an HTTP endpoint would receive them
//! and prints the native query an adapter compiles them into:
//!
//! ```text
//! crudql --adapter sql --entity post -p 'fields=id,title' -p 's={"id":{"$gt":10}}'
//! ```

use crate::adapters::array::ArrayQueryAdapter;
use crate::adapters::dynamodb::{DynamoDbQueryAdapter, DynamoQuery};
use crate::adapters::mongo::{FindCursor, MongoDbQueryAdapter};
use crate::adapters::sql::{SelectQuery, SqlQueryAdapter};
use crate::adapters::QueryAdapter;
use crate::core::config::{ConfigBuilder, ParserConfig};
use crate::core::{Config, CrudError, Result};
use crate::query::filters::ensure_limit;
use crate::query::{params_from_pairs, CrudRequest, CrudRequestParser};
use clap::{Parser, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;

/// Store a request is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterKind {
    /// In-memory JSON documents
    Array,
    /// Relational select query
    Sql,
    /// Document-store find cursor
    Mongo,
    /// Partitioned key-value GetItem/Query/Scan
    Dynamodb,
}

/// Translate CRUD request parameters into native store queries.
#[derive(Parser, Debug)]
#[command(name = "crudql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Adapter to compile the request with
    #[arg(short, long, value_enum, env = "CRUDQL_ADAPTER", default_value = "sql")]
    pub adapter: AdapterKind,

    /// Main entity name and alias for the relational adapter
    #[arg(short, long, env = "CRUDQL_ENTITY", default_value = "entity")]
    pub entity: String,

    /// Request parameter as key=value, repeatable
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// JSON array of documents to run the array adapter against
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Configuration file path (default: ~/.config/crudql/config.yaml)
    #[arg(short, long, env = "CRUDQL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "CRUDQL_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Config file
    /// 3. Defaults (lowest priority)
    pub async fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("crudql").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/crudql/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return builder.debug(self.debug).build();
            }
        };

        match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(CrudError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        builder.debug(self.debug).build()
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let env_log_level = std::env::var("CRUDQL_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
        let log_level = if self.debug {
            "debug"
        } else {
            env_log_level.as_str()
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        // Logs go to stderr so stdout stays valid JSON.
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(self.debug)
            .compact();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| CrudError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }

    /// Parse the `--param` pairs into a request, applying configured limits.
    pub fn request(&self, parser: &ParserConfig) -> Result<CrudRequest> {
        let params = params_from_pairs(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let request = CrudRequestParser::new().parse(&params)?;

        Ok(match (parser.default_limit, parser.max_limit) {
            (None, None) => request,
            (default, max) => {
                let max = max.unwrap_or(u64::MAX);
                ensure_limit(request, default.unwrap_or(max), max)
            },
        })
    }
}

/// Compile (and for in-memory data, run) the request; returns what the CLI prints.
pub async fn run(cli: &Cli, config: &Config) -> Result<Value> {
    let request = cli.request(&config.parser)?;

    match cli.adapter {
        AdapterKind::Sql => {
            let adapter = SqlQueryAdapter::from_config(config.sql.clone());
            let query = adapter.build(SelectQuery::new(&cli.entity, &cli.entity), &request)?;
            let mut output = serde_json::to_value(&query)?;
            if let Value::Object(map) = &mut output {
                map.insert("sql".to_string(), Value::String(query.to_sql()));
            }
            Ok(output)
        },
        AdapterKind::Mongo => {
            let adapter = MongoDbQueryAdapter::new(config.mongo.clone());
            Ok(serde_json::to_value(adapter.build(FindCursor::new(), &request)?)?)
        },
        AdapterKind::Dynamodb => {
            let dynamodb = config
                .dynamodb
                .clone()
                .ok_or_else(|| CrudError::config("The dynamodb adapter needs a dynamodb section in the config"))?;
            let adapter = DynamoDbQueryAdapter::new(dynamodb);
            Ok(serde_json::to_value(adapter.build(DynamoQuery::default(), &request)?)?)
        },
        AdapterKind::Array => {
            let Some(path) = &cli.data else {
                return Ok(serde_json::to_value(&request)?);
            };
            let content = tokio::fs::read_to_string(path).await?;
            let data: Vec<Value> = serde_json::from_str(&content)?;
            let result = ArrayQueryAdapter::new().get_many(data, &request).await?;
            Ok(serde_json::to_value(result)?)
        },
    }
}

/// Execute the crudql command.
pub async fn execute(cli: Cli) -> Result<()> {
    cli.init_logging()?;

    let config = cli.load_config().await?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration is valid!");
        println!("  SQL entities: {}", config.sql.entities.len());
        if let Some(dynamodb) = &config.dynamodb {
            println!("  DynamoDB table: {}", dynamodb.table_name);
        }
        return Ok(());
    }

    tracing::info!(adapter = ?cli.adapter, "Compiling request");
    let output = run(&cli, &config).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
