use crate::models::{Analysis, ListingStatus, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct City {
    pub id: Uuid,
    pub name_ar: String,
    pub name_en: String,
    pub slug: String,
    pub region: Option<String>,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct District {
    pub id: Uuid,
    pub city_id: Uuid,
    pub name_ar: String,
    pub name_en: String,
    pub slug: String,
    pub avg_price_per_sqm: Option<f64>,
    pub price_data_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyTypeRecord {
    pub id: Uuid,
    pub name_ar: String,
    pub name_en: String,
    pub slug: String,
}

/// Foreign keys resolved for a listing before it is saved
#[derive(Debug, Clone, Copy)]
pub struct PropertyRefs {
    pub city_id: Uuid,
    pub district_id: Option<Uuid>,
    pub property_type_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub id: Uuid,
    pub external_id: String,
    pub source: Source,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub size_sqm: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub full_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub analysis: Analysis,
    pub main_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub local_main_image_url: Option<String>,
    pub local_image_urls: Vec<String>,
    pub city_id: Uuid,
    pub district_id: Option<Uuid>,
    pub property_type_id: Option<Uuid>,
    pub status: ListingStatus,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    InitialScrape,
    ScraperUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceHistoryEntry {
    pub id: Uuid,
    pub property_id: Uuid,
    pub price: f64,
    pub price_per_sqm: Option<f64>,
    pub source: PriceSource,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobCounts {
    pub found: usize,
    pub new: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScraperJob {
    pub id: Uuid,
    pub city_id: Uuid,
    pub status: JobStatus,
    #[serde(flatten)]
    pub counts: JobCounts,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Result of an upsert by external id
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SaveOutcome {
    Created { id: Uuid },
    Updated { id: Uuid, previous_price: Option<f64> },
}

impl SaveOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            SaveOutcome::Created { id } | SaveOutcome::Updated { id, .. } => *id,
        }
    }
}

/// Image URLs of a property still to be copied locally
#[derive(Debug, Clone, PartialEq)]
pub struct ImageJob {
    pub property_id: Uuid,
    pub main_image_url: Option<String>,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageStats {
    pub total_properties: usize,
    pub with_remote_images: usize,
    pub with_local_images: usize,
    pub pending_download: usize,
}
