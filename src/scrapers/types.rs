use crate::config::ScraperConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on a single pause
const MAX_PAUSE_SECS: f64 = 3600.0;

fn bounded(secs: f64) -> f64 {
    if secs.is_nan() {
        0.0
    } else {
        secs.clamp(0.0, MAX_PAUSE_SECS)
    }
}

/// Random pause bounds in seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Jitter {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Jitter {
    pub const NONE: Jitter = Jitter {
        min_secs: 0.0,
        max_secs: 0.0,
    };

    pub fn new((min_secs, max_secs): (f64, f64)) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn sample(&self) -> Duration {
        let lo = bounded(self.min_secs);
        let hi = bounded(self.max_secs);
        if hi <= lo {
            return Duration::from_secs_f64(lo);
        }
        Duration::from_secs_f64(rand::thread_rng().gen_range(lo..hi))
    }
}

/// Crawl parameters for a single city
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeParams {
    /// Maximum number of result pages
    pub max_pages: u32,
    /// Visit each listing's page for full description and images
    pub scrape_details: bool,
    /// Pause after each results page
    pub page_delay: Jitter,
    /// Pause after each details page
    pub detail_delay: Jitter,
}

impl Default for ScrapeParams {
    fn default() -> Self {
        Self::from_config(&ScraperConfig::default())
    }
}

impl ScrapeParams {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            scrape_details: config.scrape_details,
            page_delay: Jitter::new(config.page_delay_secs),
            detail_delay: Jitter::new(config.detail_delay_secs),
        }
    }
}
