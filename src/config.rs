use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_listing_url")]
    pub listing_url: String,
    /// Origin that relative anchors on the listing page resolve against.
    #[serde(default = "default_base_origin")]
    pub base_origin: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_extract_dir")]
    pub extract_dir: PathBuf,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            base_origin: default_base_origin(),
            file_prefix: default_file_prefix(),
            download_dir: default_download_dir(),
            extract_dir: default_extract_dir(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_listing_url() -> String {
    "https://www.dnit.gov.py/web/portal-institucional/listado-de-ruc-con-sus-equivalencias?maps=todos"
        .to_string()
}
fn default_base_origin() -> String {
    "https://www.dnit.gov.py".to_string()
}
fn default_file_prefix() -> String {
    "ruc".to_string()
}
fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}
fn default_extract_dir() -> PathBuf {
    PathBuf::from("./data/extracted")
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_batch_size() -> usize {
    1000
}
fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            run_on_startup: default_run_on_startup(),
        }
    }
}

/// One year.
pub const MAX_INTERVAL_HOURS: u64 = 24 * 366;

fn default_interval_hours() -> u64 {
    24
}
fn default_run_on_startup() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Append-only run log. `None` logs to stdout only.
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("./download.log"))
}
fn default_log_filter() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate fetch
    if config.fetch.max_attempts == 0 {
        anyhow::bail!("fetch.max_attempts must be >= 1");
    }
    if config.fetch.file_prefix.is_empty() {
        anyhow::bail!("fetch.file_prefix must not be empty");
    }
    Url::parse(&config.fetch.listing_url)
        .with_context(|| format!("fetch.listing_url is not a URL: {}", config.fetch.listing_url))?;
    Url::parse(&config.fetch.base_origin)
        .with_context(|| format!("fetch.base_origin is not a URL: {}", config.fetch.base_origin))?;

    // Validate ingest
    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be > 0");
    }
    if config.ingest.include_globs.is_empty() {
        anyhow::bail!("ingest.include_globs must list at least one pattern");
    }

    // Validate schedule
    if config.schedule.interval_hours == 0 || config.schedule.interval_hours > MAX_INTERVAL_HOURS {
        anyhow::bail!(
            "schedule.interval_hours must be between 1 and {}",
            MAX_INTERVAL_HOURS
        );
    }

    Ok(())
}
