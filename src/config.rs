//! Configuration loading.
//!
//! Settings come from built-in defaults overlaid with an optional
//! `config.json`. The runner-config directory (sequence files) defaults to
//! `config/` and can be redirected with `CRAWL_CONFIG_PATH`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::services::CrawlOptions;

/// Environment variable redirecting the runner-config directory.
pub const CRAWL_CONFIG_PATH: &str = "CRAWL_CONFIG_PATH";

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4610,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub max_age_days: i64,
    pub refresh_404_days: i64,
    pub retry_4xx_days: i64,
    pub rate_limit_ms: u64,
    pub concurrency: usize,
    pub patterns_per_place: usize,
    pub place_limit: usize,
    pub fetch_timeout_ms: u64,
    pub max_downloads: Option<u64>,
    pub user_agent: Option<String>,
    pub allow_multi_jobs: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        let options = CrawlOptions::default();
        Self {
            max_age_days: options.max_age_days,
            refresh_404_days: options.refresh_404_days,
            retry_4xx_days: options.retry_4xx_days,
            rate_limit_ms: options.rate_limit_ms,
            concurrency: options.concurrency,
            patterns_per_place: options.patterns_per_place,
            place_limit: options.place_limit,
            fetch_timeout_ms: options.fetch_timeout_ms,
            max_downloads: None,
            user_agent: None,
            allow_multi_jobs: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Runner-config directory holding sequence files.
    pub config_dir: PathBuf,
    pub server: ServerSettings,
    pub crawl: CrawlSettings,
    pub feature_flags: serde_json::Value,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            db_path: data_dir.join("news.db"),
            data_dir,
            config_dir: PathBuf::from("config"),
            server: ServerSettings::default(),
            crawl: CrawlSettings::default(),
            feature_flags: serde_json::json!({}),
        }
    }
}

/// On-disk shape of `config.json`; everything optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<String>,
    db_path: Option<String>,
    config_dir: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    max_age_days: Option<i64>,
    refresh_404_days: Option<i64>,
    retry_4xx_days: Option<i64>,
    rate_limit_ms: Option<u64>,
    concurrency: Option<usize>,
    patterns_per_place: Option<usize>,
    place_limit: Option<usize>,
    fetch_timeout_ms: Option<u64>,
    max_downloads: Option<u64>,
    user_agent: Option<String>,
    allow_multi_jobs: Option<bool>,
    feature_flags: Option<serde_json::Value>,
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load settings: defaults, then `config.json` (explicit path or the
/// working directory), then environment and CLI overrides.
pub fn load_settings(
    config_path: Option<&Path>,
    data_dir_override: Option<&Path>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("config.json"));
    if path.is_file() {
        let raw = std::fs::read_to_string(&path)?;
        let file: FileConfig = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid {}: {}", path.display(), e))?;
        apply_file(&mut settings, file);
    }

    if let Ok(dir) = std::env::var(CRAWL_CONFIG_PATH) {
        if !dir.trim().is_empty() {
            settings.config_dir = expand(&dir);
        }
    }

    if let Some(dir) = data_dir_override {
        settings.data_dir = dir.to_path_buf();
        settings.db_path = settings.data_dir.join("news.db");
    }

    validate(&settings)?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file: FileConfig) {
    if let Some(v) = file.data_dir {
        settings.data_dir = expand(&v);
        settings.db_path = settings.data_dir.join("news.db");
    }
    if let Some(v) = file.db_path {
        settings.db_path = expand(&v);
    }
    if let Some(v) = file.config_dir {
        settings.config_dir = expand(&v);
    }
    if let Some(v) = file.host {
        settings.server.host = v;
    }
    if let Some(v) = file.port {
        settings.server.port = v;
    }
    if let Some(v) = file.max_age_days {
        settings.crawl.max_age_days = v;
    }
    if let Some(v) = file.refresh_404_days {
        settings.crawl.refresh_404_days = v;
    }
    if let Some(v) = file.retry_4xx_days {
        settings.crawl.retry_4xx_days = v;
    }
    if let Some(v) = file.rate_limit_ms {
        settings.crawl.rate_limit_ms = v;
    }
    if let Some(v) = file.concurrency {
        settings.crawl.concurrency = v;
    }
    if let Some(v) = file.patterns_per_place {
        settings.crawl.patterns_per_place = v;
    }
    if let Some(v) = file.place_limit {
        settings.crawl.place_limit = v;
    }
    if let Some(v) = file.fetch_timeout_ms {
        settings.crawl.fetch_timeout_ms = v;
    }
    if let Some(v) = file.max_downloads {
        settings.crawl.max_downloads = Some(v);
    }
    if let Some(v) = file.user_agent {
        settings.crawl.user_agent = Some(v);
    }
    if let Some(v) = file.allow_multi_jobs {
        settings.crawl.allow_multi_jobs = v;
    }
    if let Some(v) = file.feature_flags {
        settings.feature_flags = v;
    }
}

/// Positive-integer semantics on every numeric knob.
fn validate(settings: &Settings) -> anyhow::Result<()> {
    let crawl = &settings.crawl;
    for (name, value) in [
        ("maxAgeDays", crawl.max_age_days),
        ("refresh404Days", crawl.refresh_404_days),
        ("retry4xxDays", crawl.retry_4xx_days),
    ] {
        if value <= 0 {
            anyhow::bail!("{} must be a positive integer", name);
        }
    }
    for (name, value) in [
        ("rateLimitMs", crawl.rate_limit_ms as i64),
        ("concurrency", crawl.concurrency as i64),
        ("patternsPerPlace", crawl.patterns_per_place as i64),
        ("placeLimit", crawl.place_limit as i64),
        ("fetchTimeoutMs", crawl.fetch_timeout_ms as i64),
    ] {
        if value <= 0 {
            anyhow::bail!("{} must be a positive integer", name);
        }
    }
    if crawl.max_downloads == Some(0) {
        anyhow::bail!("maxDownloads must be a positive integer");
    }
    Ok(())
}

impl Settings {
    /// Base crawl options derived from configuration.
    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            max_age_days: self.crawl.max_age_days,
            refresh_404_days: self.crawl.refresh_404_days,
            retry_4xx_days: self.crawl.retry_4xx_days,
            rate_limit_ms: self.crawl.rate_limit_ms,
            concurrency: self.crawl.concurrency,
            patterns_per_place: self.crawl.patterns_per_place,
            place_limit: self.crawl.place_limit,
            fetch_timeout_ms: self.crawl.fetch_timeout_ms,
            max_downloads: self.crawl.max_downloads,
            ..CrawlOptions::default()
        }
    }

    /// Snapshot handed to the `@config` token resolver.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "dataDir": self.data_dir,
            "dbPath": self.db_path,
            "featureFlags": self.feature_flags,
            "crawl": {
                "rateLimitMs": self.crawl.rate_limit_ms,
                "concurrency": self.crawl.concurrency,
                "patternsPerPlace": self.crawl.patterns_per_place,
                "placeLimit": self.crawl.place_limit,
            },
        })
    }
}
