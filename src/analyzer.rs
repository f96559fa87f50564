use crate::config::AnalyzerConfig;
use crate::models::{Analysis, DealType, Listing, PropertyType};
use tracing::debug;

/// Scores listings against the market price per square meter
#[derive(Debug, Clone)]
pub struct DealAnalyzer {
    config: AnalyzerConfig,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Truncate toward zero, ignoring float noise such as 72.99999999999999
fn truncate(value: f64) -> i64 {
    round_to(value, 6).trunc() as i64
}

impl DealAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn price_per_sqm(price: f64, size_sqm: Option<f64>) -> Option<f64> {
        match size_sqm {
            Some(size) if size > 0.0 => Some(round_to(price / size, 2)),
            _ => None,
        }
    }

    /// Deal type and score for a price-per-sqm to market-average ratio
    pub fn classify(&self, ratio: f64) -> (DealType, u8) {
        let discount = 1.0 - ratio;
        let (deal_type, score) = if ratio < self.config.hot_deal_ratio {
            (DealType::HotDeal, truncate(85.0 + discount * 30.0).min(95))
        } else if ratio < self.config.good_deal_ratio {
            (DealType::GoodDeal, truncate(65.0 + discount * 40.0).min(84))
        } else if ratio < 1.0 {
            (DealType::FairPrice, truncate(45.0 + discount * 80.0).min(64))
        } else {
            (DealType::Overpriced, truncate(50.0 - (ratio - 1.0) * 40.0).max(20))
        };
        (deal_type, score.clamp(0, 100) as u8)
    }

    /// Annual gross yield in percent for a city (English name) and property type
    pub fn yield_percent(&self, city_en: &str, property_type: Option<PropertyType>) -> f64 {
        let base = self
            .config
            .city_yields
            .get(city_en)
            .copied()
            .unwrap_or(self.config.default_yield);
        let multiplier = property_type
            .and_then(|t| self.config.type_multipliers.get(t.slug()).copied())
            .unwrap_or(1.0);
        round_to(base * multiplier, 2)
    }

    /// Monthly rent and annual yield estimate
    pub fn estimate_rent(
        &self,
        city_en: &str,
        property_type: Option<PropertyType>,
        price: f64,
    ) -> (f64, f64) {
        let yield_percent = self.yield_percent(city_en, property_type);
        let monthly = price * yield_percent / 100.0 / 12.0;
        (round_to(monthly, 2), yield_percent)
    }

    /// Analyze a listing. `city_avg` is the observed city average price per sqm,
    /// if there is enough data; the configured fallback is used otherwise.
    pub fn analyze(&self, listing: &Listing, city_en: &str, city_avg: Option<f64>) -> Analysis {
        let Some(price) = listing.price.filter(|p| *p > 0.0) else {
            return Analysis::default();
        };
        let Some(price_per_sqm) = Self::price_per_sqm(price, listing.size_sqm) else {
            return Analysis::default();
        };

        let avg = city_avg
            .filter(|a| *a > 0.0)
            .unwrap_or(self.config.fallback_avg_price_per_sqm);
        let ratio = price_per_sqm / avg;
        let (deal_type, investment_score) = self.classify(ratio);
        let (monthly_rent, yield_percent) = self.estimate_rent(city_en, listing.property_type, price);

        debug!(
            "Analysis for {}: score={}, type={}, ratio={:.2}",
            listing.external_id, investment_score, deal_type, ratio
        );

        Analysis {
            price_per_sqm: Some(price_per_sqm),
            district_avg_price_per_sqm: Some(round_to(avg, 2)),
            price_vs_market_percent: Some(round_to((ratio - 1.0) * 100.0, 1)),
            investment_score,
            deal_type,
            estimated_monthly_rent: Some(monthly_rent),
            estimated_annual_yield_percent: Some(yield_percent),
        }
    }
}

impl Default for DealAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
