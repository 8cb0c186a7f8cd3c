use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub monitor: MonitorConfig,
    pub retention: RetentionConfig,
    pub export: ExportConfig,
    /// Seconds between retention sweeps.
    pub retention_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub buffer_capacity: usize,
    pub suspicious_threshold: usize,
    pub suspicious_window_secs: i64,
    pub failure_threshold: u32,
    pub failure_window_secs: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            suspicious_threshold: 10,
            suspicious_window_secs: 60,
            failure_threshold: 5,
            failure_window_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub archive_age_days: i64,
    pub delete_age_days: i64,
    pub compress_age_days: i64,
    pub chunk_size: usize,
    pub archive_dir: PathBuf,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            archive_age_days: 90,
            delete_age_days: 365,
            compress_age_days: 30,
            chunk_size: 10_000,
            archive_dir: PathBuf::from("./archives"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub batch_size: i64,
    /// Accumulate export output in memory instead of a temp file. Meant for
    /// constrained environments and tests.
    pub in_memory: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            in_memory: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;

        let host: IpAddr = env_or("TALENTHUB_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid TALENTHUB_HOST: {e}"))?;

        let port: u16 = env_or("TALENTHUB_PORT", "3000")
            .parse()
            .map_err(|e| format!("Invalid TALENTHUB_PORT: {e}"))?;

        let log_level = env_or("TALENTHUB_LOG_LEVEL", "info");

        let monitor = MonitorConfig {
            buffer_capacity: env_parsed("TALENTHUB_BUFFER_CAPACITY", "1000")?,
            suspicious_threshold: env_parsed("TALENTHUB_SUSPICIOUS_THRESHOLD", "10")?,
            suspicious_window_secs: env_parsed("TALENTHUB_SUSPICIOUS_WINDOW_SECS", "60")?,
            failure_threshold: env_parsed("TALENTHUB_FAILURE_THRESHOLD", "5")?,
            failure_window_secs: env_parsed("TALENTHUB_FAILURE_WINDOW_SECS", "60")?,
        };

        let retention = RetentionConfig {
            archive_age_days: env_parsed("TALENTHUB_ARCHIVE_AGE_DAYS", "90")?,
            delete_age_days: env_parsed("TALENTHUB_DELETE_AGE_DAYS", "365")?,
            compress_age_days: env_parsed("TALENTHUB_COMPRESS_AGE_DAYS", "30")?,
            chunk_size: env_parsed("TALENTHUB_ARCHIVE_CHUNK_SIZE", "10000")?,
            archive_dir: PathBuf::from(env_or("TALENTHUB_ARCHIVE_DIR", "./archives")),
        };

        let export = ExportConfig {
            batch_size: env_parsed("TALENTHUB_EXPORT_BATCH_SIZE", "5000")?,
            in_memory: env_or("TALENTHUB_EXPORT_IN_MEMORY", "false") == "true",
        };

        let retention_interval_secs = env_parsed("TALENTHUB_RETENTION_INTERVAL_SECS", "3600")?;

        Ok(Config {
            database_url,
            host,
            port,
            log_level,
            monitor,
            retention,
            export,
            retention_interval_secs,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}
