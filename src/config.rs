use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub historic: HistoricConfig,
    pub detection: DetectionConfig,
    pub logging: LoggingConfig,
    pub push_channel: PushChannelConfig,
    pub simplejson: SimpleJsonConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request deadline applied by the request-id/deadline middleware.
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub request_deadline_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub conn_max_lifetime_secs: u64,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub connect_timeout_secs: u64,
}

/// H1 retention and artifact-storage knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoricConfig {
    pub enabled: bool,
    pub historic_path: String,
    #[serde(deserialize_with = "deserialize_days_i64")]
    pub retention_days: i64,
}

/// H4 regression-detection defaults (per-metric thresholds still live in
/// `ThresholdTable`; these are the statistical-gate defaults).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub significance_level: f64,
    pub min_sample_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// H5 WebSocket push channel defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushChannelConfig {
    pub queue_capacity: usize,
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub ping_interval_secs: u64,
    pub missed_pong_limit: u32,
}

/// H5 SimpleJSON serving-surface defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimpleJsonConfig {
    pub max_data_points: usize,
}

/// Command line arguments for configuration overrides.
#[derive(Parser, Debug, Clone)]
#[command(name = "bench-historian")]
#[command(version, about = "Historic tracking and regression analysis for benchmark runs")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Logging level (overrides config file, e.g., "info,bench_historian=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Historic store retention window (overrides config file, e.g., "30d", "12w")
    #[arg(long, value_name = "DAYS")]
    pub retention_days: Option<String>,

    /// Enable/disable the historic store (overrides config file)
    #[arg(long, value_name = "BOOL")]
    pub historic_enabled: Option<bool>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support.
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST, APP_SERVER_PORT
    /// - APP_DATABASE_URL
    /// - APP_LOG_LEVEL
    /// - APP_HISTORIC_RETENTION_DAYS, APP_HISTORIC_ENABLED
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(retention) = std::env::var("APP_HISTORIC_RETENTION_DAYS") {
            match parse_days_to_i64(&retention) {
                Ok(val) => {
                    self.historic.retention_days = val;
                    tracing::info!(
                        "Override historic.retention_days from env: {}",
                        self.historic.retention_days
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_HISTORIC_RETENTION_DAYS '{}': {} (keep {})",
                    retention,
                    e,
                    self.historic.retention_days
                ),
            }
        }

        if let Ok(enabled) = std::env::var("APP_HISTORIC_ENABLED")
            && let Ok(val) = enabled.parse()
        {
            self.historic.enabled = val;
            tracing::info!("Override historic.enabled from env: {}", self.historic.enabled);
        }
    }

    /// Apply command line argument overrides (highest priority).
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(retention) = &args.retention_days {
            match parse_days_to_i64(retention) {
                Ok(val) => {
                    self.historic.retention_days = val;
                    tracing::info!(
                        "Override historic.retention_days from CLI: {}",
                        self.historic.retention_days
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid --retention-days '{}': {} (keep {})",
                    retention,
                    e,
                    self.historic.retention_days
                ),
            }
        }

        if let Some(enabled) = args.historic_enabled {
            self.historic.enabled = enabled;
            tracing::info!("Override historic.enabled from CLI: {}", self.historic.enabled);
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.historic.enabled && self.historic.historic_path.is_empty() {
            anyhow::bail!("historic.historic_path cannot be empty while historic.enabled is true");
        }
        if self.historic.retention_days <= 0 {
            anyhow::bail!("historic.retention_days must be > 0");
        }
        if self.push_channel.queue_capacity == 0 {
            anyhow::bail!("push_channel.queue_capacity must be > 0");
        }
        if self.push_channel.ping_interval_secs == 0 {
            anyhow::bail!("push_channel.ping_interval_secs must be > 0");
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

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8081, request_deadline_secs: 30 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/bench-historian.db".to_string(),
            max_open_conns: 10,
            max_idle_conns: 5,
            conn_max_lifetime_secs: 3600,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for HistoricConfig {
    fn default() -> Self {
        Self { enabled: true, historic_path: "data/artifacts".to_string(), retention_days: 90 }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { significance_level: 0.05, min_sample_size: 30 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,bench_historian=debug".to_string(),
            file: Some("logs/bench-historian.log".to_string()),
        }
    }
}

impl Default for PushChannelConfig {
    fn default() -> Self {
        Self { queue_capacity: 256, ping_interval_secs: 30, missed_pong_limit: 2 }
    }
}

impl Default for SimpleJsonConfig {
    fn default() -> Self {
        Self { max_data_points: 1000 }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
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

fn parse_days_to_i64(input: &str) -> Result<i64, String> {
    if let Ok(val) = input.parse::<i64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: i64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "d" | "day" | "days" => Ok(n),
        "w" | "week" | "weeks" => Ok(n * 7),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

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

fn deserialize_days_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = i64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of days or a string like '7d' or '2w'")
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v as i64)
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_days_to_i64(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_days_to_i64(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_human_durations() {
        assert_eq!(parse_duration_to_secs("30s").unwrap(), 30);
        assert_eq!(parse_duration_to_secs("5m").unwrap(), 300);
        assert_eq!(parse_duration_to_secs("1h").unwrap(), 3600);
        assert_eq!(parse_duration_to_secs("42").unwrap(), 42);
    }

    #[test]
    fn parses_human_days() {
        assert_eq!(parse_days_to_i64("7d").unwrap(), 7);
        assert_eq!(parse_days_to_i64("2w").unwrap(), 14);
    }
}
