use anyhow::{ensure, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "kingdomscout.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listing site crawl settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Random pause after each listings page, in seconds
    pub page_delay_secs: (f64, f64),
    /// Random pause after each details page, in seconds
    pub detail_delay_secs: (f64, f64),
    /// Fixed pause between cities
    pub city_pause_secs: u64,
    pub max_pages: u32,
    pub scrape_details: bool,
    /// Render pages with headless Chrome instead of plain HTTP
    pub use_browser: bool,
    /// Dump every browser-rendered page here (HTML and screenshot)
    pub browser_debug_dir: Option<PathBuf>,
    pub user_agents: Vec<String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sa.aqar.fm".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            page_delay_secs: (1.0, 3.0),
            detail_delay_secs: (1.0, 2.0),
            city_pause_secs: 5,
            max_pages: 2,
            scrape_details: true,
            use_browser: false,
            browser_debug_dir: None,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15".to_string(),
            ],
        }
    }
}

impl ScraperConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Deal scoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Used when a city has no price history yet
    pub fallback_avg_price_per_sqm: f64,
    pub hot_deal_ratio: f64,
    pub good_deal_ratio: f64,
    /// Annual gross yield in percent, keyed by English city name
    pub city_yields: HashMap<String, f64>,
    pub default_yield: f64,
    /// Yield multiplier keyed by property type slug
    pub type_multipliers: HashMap<String, f64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fallback_avg_price_per_sqm: 5000.0,
            hot_deal_ratio: 0.70,
            good_deal_ratio: 0.85,
            city_yields: HashMap::from([
                ("Riyadh".to_string(), 6.5),
                ("Jeddah".to_string(), 7.0),
            ]),
            default_yield: 7.5,
            type_multipliers: HashMap::from([
                ("apartment".to_string(), 1.0),
                ("villa".to_string(), 0.9),
                ("building".to_string(), 1.2),
                ("commercial".to_string(), 1.3),
                ("office".to_string(), 1.1),
                ("shop".to_string(), 1.25),
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageConfig {
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.json")
    }
}

/// Image cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub cache_dir: PathBuf,
    /// URL prefix the cached files are served under
    pub public_prefix: String,
    pub referer: String,
    pub user_agent: String,
    pub max_per_property: usize,
    pub batch_delay_ms: u64,
    pub max_batch: usize,
    pub timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("public/images/properties"),
            public_prefix: "/images/properties".to_string(),
            referer: "https://sa.aqar.fm/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
            max_per_property: 10,
            batch_delay_ms: 100,
            max_batch: 100,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base: String,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_api_base: String,
    pub email_from: String,
    pub admin_chat_id: Option<String>,
    pub site_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_api_base: "https://api.telegram.org".to_string(),
            sendgrid_api_key: None,
            sendgrid_api_base: "https://api.sendgrid.com".to_string(),
            email_from: "alerts@propertyscout.sa".to_string(),
            admin_chat_id: None,
            site_url: "https://propertyscout.sa".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// Include internal error details in 500 responses
    pub expose_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            expose_errors: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration: defaults, then the TOML file, then `KS_*` environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env is the common case
        let _ = dotenvy::dotenv();

        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&file))
            .merge(Env::prefixed("KS_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", file.display()))?;

        config.apply_legacy_env();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later, at serve or crawl time.
    pub fn validate(&self) -> Result<()> {
        let prefix = self.images.public_prefix.trim_end_matches('/');
        ensure!(
            prefix.starts_with('/') && prefix.len() > 1,
            "images.public_prefix must be a path below the root such as /images, got {:?}",
            self.images.public_prefix
        );

        for (name, (min, max)) in [
            ("scraper.page_delay_secs", self.scraper.page_delay_secs),
            ("scraper.detail_delay_secs", self.scraper.detail_delay_secs),
        ] {
            ensure!(
                min.is_finite() && max.is_finite() && min >= 0.0 && max >= 0.0,
                "{} must be two finite, non-negative numbers, got ({}, {})",
                name,
                min,
                max
            );
        }
        Ok(())
    }

    /// Honour the unprefixed secret names the deployment already sets.
    fn apply_legacy_env(&mut self) {
        let n = &mut self.notifications;
        if n.telegram_bot_token.is_none() {
            n.telegram_bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        }
        if n.sendgrid_api_key.is_none() {
            n.sendgrid_api_key = std::env::var("SENDGRID_API_KEY").ok();
        }
        if n.admin_chat_id.is_none() {
            n.admin_chat_id = std::env::var("ADMIN_TELEGRAM_CHAT_ID").ok();
        }
    }
}
