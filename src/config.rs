use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub collection: CollectionConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,

    /// Run a single monitoring cycle and exit (CLI only).
    #[serde(skip)]
    pub run_once: bool,
}

/// Connection settings for the monitored PostgreSQL instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database used when no explicit target list is configured
    pub database: String,
    /// Managed/restricted deployment (cloud service with a reduced catalog)
    pub managed: bool,
    /// Per-statement timeout applied at the query-issuance boundary
    pub statement_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            managed: false,
            statement_timeout_ms: 10_000,
        }
    }
}

/// Collection pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Target databases; defaults to the connection database when empty
    pub databases: Vec<String>,
    /// Row-count threshold bound into the collection templates (capped at 30)
    pub query_count_threshold: i64,
    /// Minimum per-call response time (ms) for individual query samples
    pub query_response_time_threshold: i64,
    /// Collection interval in seconds (default: 60)
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub interval_secs: u64,
    /// Whether to enable the collector at startup (default: true)
    pub enabled: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            query_count_threshold: 20,
            query_response_time_threshold: 500,
            interval_secs: 60,
            enabled: true,
        }
    }
}

/// Telemetry emission configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Integration name stamped on every payload
    pub integration_name: String,
    /// HTTP sink; payloads go to stdout when unset
    pub endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { integration_name: "com.pgpulse.postgresql".to_string(), endpoint: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,pgpulse=debug".to_string(), file: Some("logs/pgpulse.log".to_string()) }
    }
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "pgpulse")]
#[command(version, about = "pgpulse - PostgreSQL query performance telemetry collector")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// PostgreSQL host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub hostname: Option<String>,

    /// PostgreSQL port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// PostgreSQL user (overrides config file)
    #[arg(long, value_name = "USER")]
    pub username: Option<String>,

    /// PostgreSQL password (overrides config file)
    #[arg(long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Comma-separated target database list (overrides config file)
    #[arg(long, value_name = "DATABASES")]
    pub databases: Option<String>,

    /// Treat the instance as a managed/restricted deployment
    #[arg(long, value_name = "BOOL")]
    pub managed: Option<bool>,

    /// Collection interval (overrides config file, e.g., "60s", "5m")
    #[arg(long, value_name = "DURATION")]
    pub collection_interval: Option<String>,

    /// Row-count threshold for collection queries (overrides config file)
    #[arg(long, value_name = "COUNT")]
    pub query_count_threshold: Option<i64>,

    /// Response-time threshold in ms for individual queries (overrides config file)
    #[arg(long, value_name = "MS")]
    pub query_response_time_threshold: Option<i64>,

    /// Telemetry HTTP endpoint (overrides config file; stdout when unset)
    #[arg(long, value_name = "URL")]
    pub telemetry_endpoint: Option<String>,

    /// Logging level (overrides config file, e.g., "info,pgpulse=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Run one monitoring cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();
        Self::load_with_args(&cli_args)
    }

    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        // 1. Load from config file (use CLI --config if provided, otherwise find default)
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        // 2. Override with environment variables
        config.apply_env_overrides();

        // 3. Override with command line arguments (highest priority)
        config.apply_cli_overrides(cli_args);

        // 4. Validate and fill derived defaults
        config.validate()?;

        Ok(config)
    }

    /// The `<hostname>:<port>` identity scoping every emitted metric set.
    pub fn entity_name(&self) -> String {
        format!("{}:{}", self.connection.host, self.connection.port)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_DB_HOST / APP_DB_PORT / APP_DB_USER / APP_DB_PASSWORD
    /// - APP_DB_DATABASE: Default database
    /// - APP_TARGET_DATABASES: Comma-separated target database list
    /// - APP_DB_MANAGED: Managed deployment flag (true/false)
    /// - APP_COLLECTION_INTERVAL: Interval (accepts "60s", "5m", "1h")
    /// - APP_COLLECTION_ENABLED: Enable/disable the collector (true/false)
    /// - APP_TELEMETRY_ENDPOINT: HTTP sink URL
    /// - APP_LOG_LEVEL: Logging level
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_DB_HOST") {
            self.connection.host = host;
            tracing::info!("Override connection.host from env: {}", self.connection.host);
        }

        if let Ok(port) = std::env::var("APP_DB_PORT")
            && let Ok(port) = port.parse()
        {
            self.connection.port = port;
            tracing::info!("Override connection.port from env: {}", self.connection.port);
        }

        if let Ok(user) = std::env::var("APP_DB_USER") {
            self.connection.username = user;
            tracing::info!("Override connection.username from env");
        }

        if let Ok(password) = std::env::var("APP_DB_PASSWORD") {
            self.connection.password = password;
            tracing::info!("Override connection.password from env");
        }

        if let Ok(database) = std::env::var("APP_DB_DATABASE") {
            self.connection.database = database;
            tracing::info!("Override connection.database from env: {}", self.connection.database);
        }

        if let Ok(databases) = std::env::var("APP_TARGET_DATABASES") {
            self.collection.databases = split_database_list(&databases);
            tracing::info!(
                "Override collection.databases from env: {:?}",
                self.collection.databases
            );
        }

        if let Ok(managed) = std::env::var("APP_DB_MANAGED")
            && let Ok(val) = managed.parse()
        {
            self.connection.managed = val;
            tracing::info!("Override connection.managed from env: {}", self.connection.managed);
        }

        if let Ok(interval) = std::env::var("APP_COLLECTION_INTERVAL") {
            match parse_duration_to_secs(&interval) {
                Ok(val) => {
                    self.collection.interval_secs = val;
                    tracing::info!(
                        "Override collection.interval_secs from env: {}",
                        self.collection.interval_secs
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_COLLECTION_INTERVAL '{}': {} (keep {})",
                    interval,
                    e,
                    self.collection.interval_secs
                ),
            }
        }

        if let Ok(enabled) = std::env::var("APP_COLLECTION_ENABLED")
            && let Ok(val) = enabled.parse()
        {
            self.collection.enabled = val;
            tracing::info!("Override collection.enabled from env: {}", self.collection.enabled);
        }

        if let Ok(endpoint) = std::env::var("APP_TELEMETRY_ENDPOINT") {
            self.telemetry.endpoint = Some(endpoint);
            tracing::info!("Override telemetry.endpoint from env");
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.hostname {
            self.connection.host = host.clone();
            tracing::info!("Override connection.host from CLI: {}", self.connection.host);
        }

        if let Some(port) = args.port {
            self.connection.port = port;
            tracing::info!("Override connection.port from CLI: {}", self.connection.port);
        }

        if let Some(user) = &args.username {
            self.connection.username = user.clone();
            tracing::info!("Override connection.username from CLI");
        }

        if let Some(password) = &args.password {
            self.connection.password = password.clone();
            tracing::info!("Override connection.password from CLI");
        }

        if let Some(databases) = &args.databases {
            self.collection.databases = split_database_list(databases);
            tracing::info!(
                "Override collection.databases from CLI: {:?}",
                self.collection.databases
            );
        }

        if let Some(managed) = args.managed {
            self.connection.managed = managed;
            tracing::info!("Override connection.managed from CLI: {}", self.connection.managed);
        }

        if let Some(interval) = &args.collection_interval {
            match parse_duration_to_secs(interval) {
                Ok(val) => {
                    self.collection.interval_secs = val;
                    tracing::info!(
                        "Override collection.interval_secs from CLI: {}",
                        self.collection.interval_secs
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid --collection-interval '{}': {} (keep {})",
                    interval,
                    e,
                    self.collection.interval_secs
                ),
            }
        }

        if let Some(threshold) = args.query_count_threshold {
            self.collection.query_count_threshold = threshold;
            tracing::info!("Override collection.query_count_threshold from CLI: {}", threshold);
        }

        if let Some(threshold) = args.query_response_time_threshold {
            self.collection.query_response_time_threshold = threshold;
            tracing::info!(
                "Override collection.query_response_time_threshold from CLI: {}",
                threshold
            );
        }

        if let Some(endpoint) = &args.telemetry_endpoint {
            self.telemetry.endpoint = Some(endpoint.clone());
            tracing::info!("Override telemetry.endpoint from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        self.run_once = args.once;
    }

    /// Validate configuration and fill derived defaults
    fn validate(&mut self) -> Result<(), anyhow::Error> {
        if self.connection.host.is_empty() {
            anyhow::bail!("Connection host cannot be empty");
        }

        if self.connection.port == 0 {
            anyhow::bail!("Connection port cannot be 0");
        }

        if self.collection.databases.is_empty() {
            self.collection.databases = vec![self.connection.database.clone()];
        }

        if self.collection.interval_secs == 0 {
            anyhow::bail!("collection.interval_secs must be > 0");
        }

        if self.collection.query_count_threshold < 0 {
            anyhow::bail!("collection.query_count_threshold must be >= 0");
        }

        if self.collection.query_response_time_threshold < 0 {
            anyhow::bail!("collection.query_response_time_threshold must be >= 0");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

fn split_database_list(raw: &str) -> Vec<String> {
    use crate::utils::StringExt;

    raw.split(',').filter_map(|name| name.clean()).collect()
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    // Accept plain numbers (treated as seconds)
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

// Custom serde deserializer to support numeric or human-friendly string values
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}
