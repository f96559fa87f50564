use crate::models::DealType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Search criteria; every field that is set must match
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    /// Arabic name, English name or slug
    pub cities: Option<Vec<String>>,
    pub districts: Option<Vec<String>>,
    /// Property type slugs
    pub property_types: Option<Vec<String>>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_size: Option<f64>,
    pub max_size: Option<f64>,
    /// Exact bedroom count
    pub bedrooms: Option<u32>,
    pub min_score: Option<u8>,
    pub deal_types: Option<Vec<DealType>>,
}

/// A user's saved search with its delivery settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub filters: SearchFilters,
    pub email: Option<String>,
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_true")]
    pub email_alerts: bool,
    #[serde(default)]
    pub telegram_alerts: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// New deals are owed from here until the first successful delivery
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Price drops whose alert has not been delivered yet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_price_drops: Vec<PriceDrop>,
}

/// A stored property whose price went down
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceDrop {
    pub property_id: Uuid,
    pub old_price: f64,
    pub new_price: f64,
}

fn default_true() -> bool {
    true
}

impl SavedSearch {
    pub fn wants_email(&self) -> bool {
        self.email_alerts && self.email.as_deref().is_some_and(|e| !e.is_empty())
    }

    pub fn wants_telegram(&self) -> bool {
        self.telegram_alerts && self.telegram_chat_id.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Start of the window of properties this search has not been alerted about
    pub fn alerts_since(&self) -> DateTime<Utc> {
        self.last_notified_at.unwrap_or(self.created_at)
    }
}

/// Denormalized property as shown in alerts and matched against searches
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AlertProperty {
    pub id: Uuid,
    pub title: String,
    pub price: Option<f64>,
    pub size_sqm: Option<f64>,
    pub bedrooms: Option<u32>,
    pub price_vs_market_percent: Option<f64>,
    pub investment_score: u8,
    pub deal_type: DealType,
    pub city: String,
    pub city_en: Option<String>,
    pub city_slug: Option<String>,
    pub district: Option<String>,
    pub property_type: Option<String>,
    pub source_url: String,
    pub main_image_url: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

fn in_list(list: &Option<Vec<String>>, candidates: &[Option<&str>]) -> bool {
    match list {
        None => true,
        Some(list) if list.is_empty() => true,
        Some(list) => list.iter().any(|wanted| {
            candidates
                .iter()
                .flatten()
                .any(|c| c.eq_ignore_ascii_case(wanted.trim()))
        }),
    }
}

fn at_least(min: Option<f64>, value: Option<f64>) -> bool {
    min.is_none_or(|min| value.is_some_and(|v| v >= min))
}

fn at_most(max: Option<f64>, value: Option<f64>) -> bool {
    max.is_none_or(|max| value.is_some_and(|v| v <= max))
}

impl SearchFilters {
    pub fn matches(&self, property: &AlertProperty) -> bool {
        in_list(
            &self.cities,
            &[
                Some(property.city.as_str()),
                property.city_en.as_deref(),
                property.city_slug.as_deref(),
            ],
        ) && in_list(&self.districts, &[property.district.as_deref()])
            && in_list(&self.property_types, &[property.property_type.as_deref()])
            && at_least(self.min_price, property.price)
            && at_most(self.max_price, property.price)
            && at_least(self.min_size, property.size_sqm)
            && at_most(self.max_size, property.size_sqm)
            && self.bedrooms.is_none_or(|b| property.bedrooms == Some(b))
            && self.min_score.is_none_or(|s| property.investment_score >= s)
            && self
                .deal_types
                .as_ref()
                .is_none_or(|types| types.is_empty() || types.contains(&property.deal_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property() -> AlertProperty {
        AlertProperty {
            id: Uuid::nil(),
            title: "شقة للبيع".to_string(),
            price: Some(750_000.0),
            size_sqm: Some(150.0),
            bedrooms: Some(3),
            price_vs_market_percent: Some(-18.0),
            investment_score: 80,
            deal_type: DealType::GoodDeal,
            city: "الرياض".to_string(),
            city_en: Some("Riyadh".to_string()),
            city_slug: Some("riyadh".to_string()),
            district: Some("النرجس".to_string()),
            property_type: Some("apartment".to_string()),
            source_url: "https://sa.aqar.fm/x-1".to_string(),
            main_image_url: None,
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn empty_filters_match_everything() {
        assert!(SearchFilters::default().matches(&property()));
    }

    #[test]
    fn city_matches_any_name_form() {
        let mut filters = SearchFilters {
            cities: Some(vec!["riyadh".to_string()]),
            ..Default::default()
        };
        assert!(filters.matches(&property()));
        filters.cities = Some(vec!["الرياض".to_string()]);
        assert!(filters.matches(&property()));
        filters.cities = Some(vec!["Jeddah".to_string()]);
        assert!(!filters.matches(&property()));
    }

    #[test]
    fn ranges_are_inclusive_and_require_a_value() {
        let filters = SearchFilters {
            min_price: Some(750_000.0),
            max_size: Some(150.0),
            ..Default::default()
        };
        assert!(filters.matches(&property()));

        let mut no_price = property();
        no_price.price = None;
        assert!(!filters.matches(&no_price));
    }

    #[test]
    fn score_deal_type_and_bedrooms() {
        let filters = SearchFilters {
            min_score: Some(81),
            ..Default::default()
        };
        assert!(!filters.matches(&property()));

        let filters = SearchFilters {
            deal_types: Some(vec![DealType::HotDeal, DealType::GoodDeal]),
            bedrooms: Some(3),
            ..Default::default()
        };
        assert!(filters.matches(&property()));

        let filters = SearchFilters {
            bedrooms: Some(4),
            ..Default::default()
        };
        assert!(!filters.matches(&property()));
    }

    #[test]
    fn saved_search_deserializes_with_defaults() {
        let search: SavedSearch = serde_json::from_str(
            r#"{"name":"Riyadh deals","email":"a@b.sa","filters":{"cities":["riyadh"],"minScore":70}}"#,
        )
        .unwrap();
        assert!(search.is_active);
        assert!(search.wants_email());
        assert!(!search.wants_telegram());
        assert_eq!(search.filters.min_score, Some(70));
    }
}
