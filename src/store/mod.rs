//! JSON-file catalog of cities, districts, properties and their price history.
//!
//! The whole catalog is loaded into memory and written back atomically, so a
//! crash mid-write never leaves a truncated file behind. Uniqueness rules:
//! one property per external listing id, one city per slug, one district per
//! (city, slug), one property type per slug.

use crate::alerts::{AlertProperty, PriceDrop, SavedSearch};
use crate::error::{ScoutError, ScoutResult};
use crate::models::{Analysis, Listing, ListingStatus};
use crate::scrapers::parse::slugify;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub mod records;

pub use records::{
    City, District, ImageJob, ImageStats, JobCounts, JobStatus, PriceHistoryEntry, PriceSource,
    PropertyRecord, PropertyRefs, PropertyTypeRecord, SaveOutcome, ScraperJob,
};

/// Districts need this many priced listings before an average is published
const MIN_DISTRICT_SAMPLES: usize = 3;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(skip)]
    path: Option<PathBuf>,
    #[serde(default)]
    cities: Vec<City>,
    #[serde(default)]
    districts: Vec<District>,
    #[serde(default)]
    property_types: Vec<PropertyTypeRecord>,
    /// Keyed by external listing id
    #[serde(default)]
    properties: BTreeMap<String, PropertyRecord>,
    #[serde(default)]
    price_history: Vec<PriceHistoryEntry>,
    #[serde(default)]
    scraper_jobs: Vec<ScraperJob>,
    #[serde(default)]
    saved_searches: Vec<SavedSearch>,
}

impl Catalog {
    /// In-memory catalog that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the catalog at `path`; a missing file gives an empty catalog.
    pub async fn load(path: impl AsRef<Path>) -> ScoutResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut catalog = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Catalog>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No catalog at {}, starting empty", path.display());
                Catalog::default()
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            "Loaded catalog: {} cities, {} properties",
            catalog.cities.len(),
            catalog.properties.len()
        );
        catalog.path = Some(path);
        Ok(catalog)
    }

    /// Write the catalog back to where it was loaded from (no-op in memory).
    pub async fn save(&self) -> ScoutResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Saved catalog to {}", path.display());
        Ok(())
    }

    pub fn get_or_create_city(
        &mut self,
        name_ar: &str,
        slug: Option<&str>,
        name_en: Option<&str>,
        region: Option<&str>,
        priority: u32,
    ) -> Uuid {
        let slug = slug.map(str::to_string).unwrap_or_else(|| slugify(name_ar));
        if let Some(city) = self
            .cities
            .iter_mut()
            .find(|c| c.slug == slug || c.name_ar == name_ar)
        {
            // Later runs may know more about the city than the first one did
            if let Some(name_en) = name_en {
                city.name_en = name_en.to_string();
            }
            if region.is_some() {
                city.region = region.map(str::to_string);
            }
            return city.id;
        }

        let city = City {
            id: Uuid::new_v4(),
            name_ar: name_ar.to_string(),
            name_en: name_en.unwrap_or(name_ar).to_string(),
            slug,
            region: region.map(str::to_string),
            priority,
        };
        let id = city.id;
        self.cities.push(city);
        id
    }

    pub fn get_or_create_district(&mut self, city_id: Uuid, name: &str) -> Uuid {
        let slug = slugify(name);
        if let Some(district) = self
            .districts
            .iter()
            .find(|d| d.city_id == city_id && (d.slug == slug || d.name_ar == name))
        {
            return district.id;
        }

        let district = District {
            id: Uuid::new_v4(),
            city_id,
            name_ar: name.to_string(),
            name_en: name.to_string(),
            slug,
            avg_price_per_sqm: None,
            price_data_updated_at: None,
        };
        let id = district.id;
        self.districts.push(district);
        id
    }

    pub fn get_or_create_property_type(&mut self, name: &str, slug: Option<&str>) -> Uuid {
        let slug = slug.map(str::to_string).unwrap_or_else(|| slugify(name));
        if let Some(existing) = self.property_types.iter().find(|t| t.slug == slug) {
            return existing.id;
        }

        let record = PropertyTypeRecord {
            id: Uuid::new_v4(),
            name_ar: name.to_string(),
            name_en: name.to_string(),
            slug,
        };
        let id = record.id;
        self.property_types.push(record);
        id
    }

    pub fn city(&self, id: Uuid) -> Option<&City> {
        self.cities.iter().find(|c| c.id == id)
    }

    pub fn district(&self, id: Uuid) -> Option<&District> {
        self.districts.iter().find(|d| d.id == id)
    }

    pub fn property_type(&self, id: Uuid) -> Option<&PropertyTypeRecord> {
        self.property_types.iter().find(|t| t.id == id)
    }

    pub fn property_by_external_id(&self, external_id: &str) -> Option<&PropertyRecord> {
        self.properties.get(external_id)
    }

    /// Look a property up by its catalog id, falling back to its external id
    pub fn find_property(&self, key: &str) -> Option<&PropertyRecord> {
        match Uuid::parse_str(key) {
            Ok(id) => self.properties.values().find(|p| p.id == id),
            Err(_) => self.properties.get(key),
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyRecord> {
        self.properties.values()
    }

    pub fn price_history(&self, property_id: Uuid) -> Vec<&PriceHistoryEntry> {
        self.price_history
            .iter()
            .filter(|h| h.property_id == property_id)
            .collect()
    }

    /// Insert or update a property keyed by its external id.
    ///
    /// Fields missing from the new scrape keep their stored value. A price
    /// history row is recorded on insert and on every price change.
    pub fn save_property(
        &mut self,
        listing: &Listing,
        analysis: &Analysis,
        refs: PropertyRefs,
    ) -> SaveOutcome {
        let now = Utc::now();

        if let Some(existing) = self.properties.get_mut(&listing.external_id) {
            let previous_price = existing.price;

            existing.title = listing.title.clone();
            existing.source_url = listing.source_url.clone();
            overwrite(&mut existing.description, &listing.description);
            overwrite(&mut existing.price, &listing.price);
            overwrite(&mut existing.size_sqm, &listing.size_sqm);
            overwrite(&mut existing.bedrooms, &listing.bedrooms);
            overwrite(&mut existing.bathrooms, &listing.bathrooms);
            overwrite(&mut existing.full_address, &listing.location.full_address);
            overwrite(&mut existing.latitude, &listing.location.latitude);
            overwrite(&mut existing.longitude, &listing.location.longitude);
            overwrite(&mut existing.main_image_url, &listing.main_image_url);
            if !listing.image_urls.is_empty() {
                existing.image_urls = listing.image_urls.clone();
            }
            existing.analysis = analysis.clone();
            existing.city_id = refs.city_id;
            overwrite(&mut existing.district_id, &refs.district_id);
            overwrite(&mut existing.property_type_id, &refs.property_type_id);
            existing.status = ListingStatus::Active;
            existing.last_seen_at = now;
            existing.updated_at = now;

            let id = existing.id;
            let price_changed = match (previous_price, listing.price) {
                (Some(old), Some(new)) => old != new,
                _ => false,
            };
            if let (true, Some(price)) = (price_changed, listing.price) {
                self.record_price(id, price, analysis.price_per_sqm, PriceSource::ScraperUpdate, now);
            }
            return SaveOutcome::Updated { id, previous_price };
        }

        let record = PropertyRecord {
            id: Uuid::new_v4(),
            external_id: listing.external_id.clone(),
            source: listing.source,
            source_url: listing.source_url.clone(),
            title: listing.title.clone(),
            description: listing.description.clone(),
            price: listing.price,
            size_sqm: listing.size_sqm,
            bedrooms: listing.bedrooms,
            bathrooms: listing.bathrooms,
            full_address: listing.location.full_address.clone(),
            latitude: listing.location.latitude,
            longitude: listing.location.longitude,
            analysis: analysis.clone(),
            main_image_url: listing.main_image_url.clone(),
            image_urls: listing.image_urls.clone(),
            local_main_image_url: None,
            local_image_urls: Vec::new(),
            city_id: refs.city_id,
            district_id: refs.district_id,
            property_type_id: refs.property_type_id,
            status: ListingStatus::Active,
            scraped_at: listing.scraped_at,
            created_at: now,
            updated_at: now,
            last_seen_at: now,
        };
        let id = record.id;
        self.properties.insert(listing.external_id.clone(), record);

        if let Some(price) = listing.price {
            self.record_price(id, price, analysis.price_per_sqm, PriceSource::InitialScrape, now);
        }
        SaveOutcome::Created { id }
    }

    fn record_price(
        &mut self,
        property_id: Uuid,
        price: f64,
        price_per_sqm: Option<f64>,
        source: PriceSource,
        at: DateTime<Utc>,
    ) {
        self.price_history.push(PriceHistoryEntry {
            id: Uuid::new_v4(),
            property_id,
            price,
            price_per_sqm,
            source,
            recorded_at: at,
        });
    }

    fn priced_active(&self) -> impl Iterator<Item = (&PropertyRecord, f64)> {
        self.properties.values().filter_map(|p| {
            let ppsqm = p.analysis.price_per_sqm?;
            (p.status == ListingStatus::Active && ppsqm > 0.0).then_some((p, ppsqm))
        })
    }

    /// Average price per sqm over the city's active listings
    pub fn city_average_price_per_sqm(&self, city_id: Uuid) -> Option<f64> {
        let values: Vec<f64> = self
            .priced_active()
            .filter(|(p, _)| p.city_id == city_id)
            .map(|(_, v)| v)
            .collect();
        mean(&values)
    }

    /// Recompute district averages; returns how many districts were updated
    pub fn update_district_averages(&mut self) -> usize {
        let mut samples: HashMap<Uuid, Vec<f64>> = HashMap::new();
        for (property, ppsqm) in self.priced_active() {
            if let Some(district_id) = property.district_id {
                samples.entry(district_id).or_default().push(ppsqm);
            }
        }

        let now = Utc::now();
        let mut updated = 0;
        for district in &mut self.districts {
            let Some(values) = samples.get(&district.id) else {
                continue;
            };
            if values.len() < MIN_DISTRICT_SAMPLES {
                continue;
            }
            district.avg_price_per_sqm = mean(values);
            district.price_data_updated_at = Some(now);
            updated += 1;
        }
        info!("Updated district averages ({} districts)", updated);
        updated
    }

    pub fn log_scraper_job(
        &mut self,
        city_id: Uuid,
        status: JobStatus,
        counts: JobCounts,
        error_message: Option<String>,
    ) {
        self.scraper_jobs.push(ScraperJob {
            id: Uuid::new_v4(),
            city_id,
            status,
            counts,
            error_message,
            completed_at: Utc::now(),
        });
    }

    pub fn scraper_jobs(&self) -> &[ScraperJob] {
        &self.scraper_jobs
    }

    /// Active properties first scraped at or after `since`, best score first
    pub fn properties_since(&self, since: DateTime<Utc>) -> Vec<&PropertyRecord> {
        let mut found: Vec<&PropertyRecord> = self
            .properties
            .values()
            .filter(|p| p.status == ListingStatus::Active && p.scraped_at >= since)
            .collect();
        found.sort_by(|a, b| b.analysis.investment_score.cmp(&a.analysis.investment_score));
        found
    }

    pub fn alert_view(&self, property: &PropertyRecord) -> AlertProperty {
        let city = self.city(property.city_id);
        AlertProperty {
            id: property.id,
            title: property.title.clone(),
            price: property.price,
            size_sqm: property.size_sqm,
            bedrooms: property.bedrooms,
            price_vs_market_percent: property.analysis.price_vs_market_percent,
            investment_score: property.analysis.investment_score,
            deal_type: property.analysis.deal_type,
            city: city.map(|c| c.name_ar.clone()).unwrap_or_default(),
            city_en: city.map(|c| c.name_en.clone()),
            city_slug: city.map(|c| c.slug.clone()),
            district: property
                .district_id
                .and_then(|id| self.district(id))
                .map(|d| d.name_ar.clone()),
            property_type: property
                .property_type_id
                .and_then(|id| self.property_type(id))
                .map(|t| t.slug.clone()),
            source_url: property.source_url.clone(),
            main_image_url: property.main_image_url.clone(),
            scraped_at: property.scraped_at,
        }
    }

    /// Properties with a remote main image but no local copy yet
    pub fn pending_image_downloads(&self, limit: usize) -> Vec<ImageJob> {
        self.properties
            .values()
            .filter(|p| p.main_image_url.is_some() && p.local_main_image_url.is_none())
            .take(limit)
            .map(|p| ImageJob {
                property_id: p.id,
                main_image_url: p.main_image_url.clone(),
                image_urls: p.image_urls.clone(),
            })
            .collect()
    }

    pub fn image_job(&self, key: &str) -> Option<ImageJob> {
        self.find_property(key).map(|p| ImageJob {
            property_id: p.id,
            main_image_url: p.main_image_url.clone(),
            image_urls: p.image_urls.clone(),
        })
    }

    pub fn set_local_images(
        &mut self,
        property_id: Uuid,
        local_main: Option<String>,
        local_images: Vec<String>,
    ) -> ScoutResult<()> {
        let property = self
            .properties
            .values_mut()
            .find(|p| p.id == property_id)
            .ok_or_else(|| ScoutError::PropertyNotFound(property_id.to_string()))?;
        property.local_main_image_url = local_main;
        property.local_image_urls = local_images;
        property.updated_at = Utc::now();
        Ok(())
    }

    pub fn image_stats(&self) -> ImageStats {
        let total_properties = self.properties.len();
        let with_remote_images = self
            .properties
            .values()
            .filter(|p| p.main_image_url.is_some())
            .count();
        let with_local_images = self
            .properties
            .values()
            .filter(|p| p.local_main_image_url.is_some())
            .count();
        ImageStats {
            total_properties,
            with_remote_images,
            with_local_images,
            pending_download: with_remote_images.saturating_sub(with_local_images),
        }
    }

    pub fn add_saved_search(&mut self, search: SavedSearch) {
        match self.saved_searches.iter_mut().find(|s| s.id == search.id) {
            Some(existing) => *existing = search,
            None => self.saved_searches.push(search),
        }
    }

    pub fn saved_searches(&self) -> &[SavedSearch] {
        &self.saved_searches
    }

    pub fn active_saved_searches(&self) -> Vec<SavedSearch> {
        self.saved_searches
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect()
    }

    pub fn mark_notified(&mut self, search_id: Uuid, at: DateTime<Utc>) {
        if let Some(search) = self.saved_searches.iter_mut().find(|s| s.id == search_id) {
            search.last_notified_at = Some(at);
            search.pending_price_drops.clear();
        }
    }

    /// Keep undelivered price drops on the search until a later run delivers them
    pub fn defer_price_drops(&mut self, search_id: Uuid, drops: Vec<PriceDrop>) {
        if let Some(search) = self.saved_searches.iter_mut().find(|s| s.id == search_id) {
            search.pending_price_drops = drops;
        }
    }

    /// Write every property to `dir/properties.json` and `dir/raw/<external_id>.json`
    pub async fn export(&self, dir: impl AsRef<Path>) -> ScoutResult<usize> {
        let dir = dir.as_ref();
        let raw_dir = dir.join("raw");
        tokio::fs::create_dir_all(&raw_dir).await?;

        let all: Vec<&PropertyRecord> = self.properties.values().collect();
        tokio::fs::write(dir.join("properties.json"), serde_json::to_vec_pretty(&all)?).await?;

        for property in &all {
            // External ids are digits, but never trust them as path components
            let name: String = property
                .external_id
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect();
            let json = serde_json::to_vec_pretty(property)?;
            tokio::fs::write(raw_dir.join(format!("{}.json", name)), json).await?;
        }
        Ok(all.len())
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DealType, Location, Source};
    use pretty_assertions::assert_eq;

    fn listing(external_id: &str, price: Option<f64>) -> Listing {
        Listing {
            external_id: external_id.to_string(),
            source: Source::Aqar,
            source_url: format!("https://sa.aqar.fm/x-{}", external_id),
            title: "شقة للبيع".to_string(),
            description: Some("وصف".to_string()),
            price,
            size_sqm: Some(100.0),
            bedrooms: Some(3),
            bathrooms: None,
            location: Location {
                city: "الرياض".to_string(),
                district: Some("النرجس".to_string()),
                ..Location::default()
            },
            property_type: None,
            main_image_url: Some(format!("https://img.aqar.fm/{}.jpg", external_id)),
            image_urls: vec![],
            scraped_at: Utc::now(),
            raw_data: serde_json::Value::Null,
        }
    }

    fn analysis(ppsqm: f64) -> Analysis {
        Analysis {
            price_per_sqm: Some(ppsqm),
            investment_score: 70,
            deal_type: DealType::GoodDeal,
            ..Analysis::default()
        }
    }

    fn refs(catalog: &mut Catalog) -> PropertyRefs {
        let city_id = catalog.get_or_create_city("الرياض", Some("riyadh"), Some("Riyadh"), None, 1);
        let district_id = catalog.get_or_create_district(city_id, "النرجس");
        PropertyRefs {
            city_id,
            district_id: Some(district_id),
            property_type_id: None,
        }
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut catalog = Catalog::in_memory();
        let a = catalog.get_or_create_city("جدة", Some("jeddah"), None, None, 2);
        let b = catalog.get_or_create_city("جدة", None, Some("Jeddah"), Some("Makkah Region"), 2);
        assert_eq!(a, b);
        assert_eq!(catalog.city(a).unwrap().name_en, "Jeddah");

        let d1 = catalog.get_or_create_district(a, "Al Rawdah");
        let d2 = catalog.get_or_create_district(a, "al rawdah");
        assert_eq!(d1, d2);
        assert_eq!(catalog.district(d1).unwrap().slug, "al-rawdah");

        let other_city = catalog.get_or_create_city("الدمام", Some("dammam"), None, None, 5);
        assert_ne!(catalog.get_or_create_district(other_city, "Al Rawdah"), d1);

        let t1 = catalog.get_or_create_property_type("villa", Some("villa"));
        assert_eq!(catalog.get_or_create_property_type("فيلا", Some("villa")), t1);
    }

    #[test]
    fn insert_records_initial_price() {
        let mut catalog = Catalog::in_memory();
        let refs = refs(&mut catalog);
        let outcome = catalog.save_property(&listing("1", Some(500_000.0)), &analysis(5000.0), refs);

        let SaveOutcome::Created { id } = outcome else {
            panic!("expected a new property");
        };
        let history = catalog.price_history(id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].source, PriceSource::InitialScrape);
        assert_eq!(history[0].price, 500_000.0);
    }

    #[test]
    fn update_keeps_known_fields_and_tracks_price_change() {
        let mut catalog = Catalog::in_memory();
        let refs = refs(&mut catalog);
        let first = catalog.save_property(&listing("1", Some(500_000.0)), &analysis(5000.0), refs);

        let mut rescrape = listing("1", Some(450_000.0));
        rescrape.description = None;
        let second = catalog.save_property(&rescrape, &analysis(4500.0), refs);

        assert_eq!(
            second,
            SaveOutcome::Updated {
                id: first.id(),
                previous_price: Some(500_000.0)
            }
        );
        let stored = catalog.property_by_external_id("1").unwrap();
        assert_eq!(stored.price, Some(450_000.0));
        assert_eq!(stored.description.as_deref(), Some("وصف"));

        let history = catalog.price_history(first.id());
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].source, PriceSource::ScraperUpdate);

        // Same price again: no new history row
        catalog.save_property(&listing("1", Some(450_000.0)), &analysis(4500.0), refs);
        assert_eq!(catalog.price_history(first.id()).len(), 2);
        assert_eq!(catalog.properties().count(), 1);
    }

    #[test]
    fn averages_need_enough_samples() {
        let mut catalog = Catalog::in_memory();
        let refs = refs(&mut catalog);
        catalog.save_property(&listing("1", Some(1.0)), &analysis(4000.0), refs);
        catalog.save_property(&listing("2", Some(1.0)), &analysis(5000.0), refs);

        assert_eq!(catalog.city_average_price_per_sqm(refs.city_id), Some(4500.0));
        assert_eq!(catalog.update_district_averages(), 0);

        catalog.save_property(&listing("3", Some(1.0)), &analysis(6000.0), refs);
        assert_eq!(catalog.update_district_averages(), 1);
        let district = catalog.district(refs.district_id.unwrap()).unwrap();
        assert_eq!(district.avg_price_per_sqm, Some(5000.0));
        assert!(district.price_data_updated_at.is_some());
    }

    #[test]
    fn image_bookkeeping() {
        let mut catalog = Catalog::in_memory();
        let refs = refs(&mut catalog);
        let a = catalog.save_property(&listing("1", Some(1.0)), &analysis(1.0), refs);
        let mut no_image = listing("2", Some(1.0));
        no_image.main_image_url = None;
        catalog.save_property(&no_image, &analysis(1.0), refs);

        let pending = catalog.pending_image_downloads(50);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].property_id, a.id());

        catalog
            .set_local_images(a.id(), Some("/images/properties/x.jpg".to_string()), vec![])
            .unwrap();
        assert!(catalog.pending_image_downloads(50).is_empty());
        assert_eq!(
            catalog.image_stats(),
            ImageStats {
                total_properties: 2,
                with_remote_images: 1,
                with_local_images: 1,
                pending_download: 0,
            }
        );
        assert!(catalog.set_local_images(Uuid::new_v4(), None, vec![]).is_err());
        assert_eq!(catalog.find_property(&a.id().to_string()).unwrap().external_id, "1");
        assert_eq!(catalog.find_property("1").unwrap().id, a.id());
    }

    #[tokio::test]
    async fn save_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.json");

        let mut catalog = Catalog::load(&path).await.unwrap();
        let refs = refs(&mut catalog);
        catalog.save_property(&listing("77", Some(900_000.0)), &analysis(9000.0), refs);
        catalog.save().await.unwrap();

        let reloaded = Catalog::load(&path).await.unwrap();
        assert_eq!(reloaded.properties().count(), 1);
        assert_eq!(reloaded.city(refs.city_id).unwrap().slug, "riyadh");
        assert!(!path.with_extension("json.tmp").exists());

        let exported = reloaded.export(dir.path().join("export")).await.unwrap();
        assert_eq!(exported, 1);
        assert!(dir.path().join("export/raw/77.json").exists());
    }
}
