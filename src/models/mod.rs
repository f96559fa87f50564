use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cities;

pub use cities::{find_city, CityInfo, SAUDI_CITIES};

/// Source of the property listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Aqar,
}

/// Kind of property as classified by the listing site
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    Villa,
    Building,
    Land,
    Commercial,
    Farm,
    Chalet,
    Office,
    Shop,
    Warehouse,
}

impl PropertyType {
    pub const ALL: [PropertyType; 10] = [
        PropertyType::Apartment,
        PropertyType::Villa,
        PropertyType::Building,
        PropertyType::Land,
        PropertyType::Commercial,
        PropertyType::Farm,
        PropertyType::Chalet,
        PropertyType::Office,
        PropertyType::Shop,
        PropertyType::Warehouse,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::Villa => "villa",
            PropertyType::Building => "building",
            PropertyType::Land => "land",
            PropertyType::Commercial => "commercial",
            PropertyType::Farm => "farm",
            PropertyType::Chalet => "chalet",
            PropertyType::Office => "office",
            PropertyType::Shop => "shop",
            PropertyType::Warehouse => "warehouse",
        }
    }

    /// Category word used by Saudi listing sites (plural form)
    pub fn arabic_name(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "شقق",
            PropertyType::Villa => "فلل",
            PropertyType::Building => "عماير",
            PropertyType::Land => "أراضي",
            PropertyType::Commercial => "تجاري",
            PropertyType::Farm => "مزارع",
            PropertyType::Chalet => "استراحات",
            PropertyType::Office => "مكاتب",
            PropertyType::Shop => "محلات",
            PropertyType::Warehouse => "مستودعات",
        }
    }

    /// Singular words that show up in listing titles, e.g. "شقة للبيع"
    fn title_keywords(&self) -> &'static [&'static str] {
        match self {
            PropertyType::Apartment => &["شقة", "شقق", "apartment"],
            PropertyType::Villa => &["فيلا", "فلل", "villa"],
            PropertyType::Building => &["عمارة", "عماير", "building"],
            PropertyType::Land => &["أرض", "ارض", "أراضي", "land"],
            PropertyType::Commercial => &["تجاري", "commercial"],
            PropertyType::Farm => &["مزرعة", "مزارع", "farm"],
            PropertyType::Chalet => &["استراحة", "استراحات", "شاليه", "chalet"],
            PropertyType::Office => &["مكتب", "مكاتب", "office"],
            PropertyType::Shop => &["محل", "محلات", "shop"],
            PropertyType::Warehouse => &["مستودع", "مستودعات", "warehouse"],
        }
    }

    /// Infer the type from free text such as a listing title.
    pub fn infer_from_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.title_keywords().iter().any(|k| lower.contains(k)))
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Deal classification relative to the market average
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DealType {
    HotDeal,
    GoodDeal,
    FairPrice,
    Overpriced,
}

impl DealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealType::HotDeal => "hot_deal",
            DealType::GoodDeal => "good_deal",
            DealType::FairPrice => "fair_price",
            DealType::Overpriced => "overpriced",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            DealType::HotDeal => "🔥",
            DealType::GoodDeal => "✅",
            _ => "🏠",
        }
    }
}

impl fmt::Display for DealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    #[default]
    Active,
    Inactive,
}

/// Location information for a property
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    /// City name as used on the listing site (Arabic)
    pub city: String,
    pub district: Option<String>,
    pub full_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A listing as scraped, before analysis and storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub external_id: String,
    pub source: Source,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    /// Asking price in SAR
    pub price: Option<f64>,
    pub size_sqm: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub location: Location,
    pub property_type: Option<PropertyType>,
    pub main_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub scraped_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
}

/// Derived pricing metrics for a listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub price_per_sqm: Option<f64>,
    pub district_avg_price_per_sqm: Option<f64>,
    pub price_vs_market_percent: Option<f64>,
    /// 0..=100
    pub investment_score: u8,
    pub deal_type: DealType,
    pub estimated_monthly_rent: Option<f64>,
    pub estimated_annual_yield_percent: Option<f64>,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            price_per_sqm: None,
            district_avg_price_per_sqm: None,
            price_vs_market_percent: None,
            investment_score: 50,
            deal_type: DealType::FairPrice,
            estimated_monthly_rent: None,
            estimated_annual_yield_percent: None,
        }
    }
}
