pub use crate::alerts::PriceDrop;
use crate::alerts::{AlertProperty, SavedSearch};
use crate::analyzer::DealAnalyzer;
use crate::models::{find_city, CityInfo, Listing, SAUDI_CITIES};
use crate::notifications::Notifier;
use crate::scrapers::{ListingSource, ScrapeParams};
use crate::store::{Catalog, JobCounts, JobStatus, PropertyRefs, SaveOutcome};
use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of scraping one city
#[derive(Debug, Clone, Default, Serialize)]
pub struct CityReport {
    pub city: String,
    pub city_en: String,
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    /// Listings dropped for having no price
    pub skipped: usize,
    pub errors: usize,
    /// Set when the crawl itself failed
    pub error: Option<String>,
    pub price_drops: Vec<PriceDrop>,
}

impl CityReport {
    fn new(city: &CityInfo) -> Self {
        Self {
            city: city.name_ar.to_string(),
            city_en: city.name_en.to_string(),
            ..Self::default()
        }
    }

    pub fn saved(&self) -> usize {
        self.created + self.updated
    }
}

/// Alerts owed to one saved search
struct AlertPlan {
    search: SavedSearch,
    new_deals: Vec<AlertProperty>,
    price_drops: Vec<(AlertProperty, PriceDrop)>,
}

/// Drives a source over the configured cities and feeds the catalog
pub struct ScraperRunner {
    source: Arc<dyn ListingSource>,
    analyzer: DealAnalyzer,
    catalog: Arc<Mutex<Catalog>>,
    notifier: Notifier,
    params: ScrapeParams,
    city_pause: Duration,
}

impl ScraperRunner {
    pub fn new(
        source: Arc<dyn ListingSource>,
        analyzer: DealAnalyzer,
        catalog: Arc<Mutex<Catalog>>,
        notifier: Notifier,
        params: ScrapeParams,
    ) -> Self {
        Self {
            source,
            analyzer,
            catalog,
            notifier,
            params,
            city_pause: Duration::from_secs(5),
        }
    }

    pub fn with_city_pause(mut self, pause: Duration) -> Self {
        self.city_pause = pause;
        self
    }

    /// Analyze and store one listing. Listings without a price are skipped (`Ok(None)`).
    pub fn process_listing(
        &self,
        catalog: &mut Catalog,
        listing: &Listing,
        city: &CityInfo,
        city_id: Uuid,
        city_avg: Option<f64>,
    ) -> Result<Option<SaveOutcome>> {
        if listing.external_id.is_empty() {
            bail!("listing {} has no external id", listing.source_url);
        }
        if listing.price.is_none() {
            debug!("Skipping {} without price", listing.external_id);
            return Ok(None);
        }

        let district_id = listing
            .location
            .district
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| catalog.get_or_create_district(city_id, d));
        let property_type_id = listing
            .property_type
            .map(|t| catalog.get_or_create_property_type(t.arabic_name(), Some(t.slug())));

        let analysis = self.analyzer.analyze(listing, city.name_en, city_avg);
        let refs = PropertyRefs {
            city_id,
            district_id,
            property_type_id,
        };
        Ok(Some(catalog.save_property(listing, &analysis, refs)))
    }

    /// Scrape one city and store what was found. `pages` overrides the configured page count.
    pub async fn scrape_city(&self, city: &CityInfo, pages: Option<u32>) -> CityReport {
        let mut report = CityReport::new(city);

        let (city_id, city_avg) = {
            let mut catalog = self.catalog.lock().await;
            let id = catalog.get_or_create_city(
                city.name_ar,
                Some(city.slug),
                Some(city.name_en),
                Some(city.region),
                city.priority,
            );
            (id, catalog.city_average_price_per_sqm(id))
        };

        let mut params = self.params.clone();
        if let Some(pages) = pages {
            params.max_pages = pages;
        }

        let listings = match self.source.scrape_city(city.name_ar, &params).await {
            Ok(listings) => listings,
            Err(e) => {
                error!("❌ Scrape failed for {}: {:#}", city.name_en, e);
                report.errors = 1;
                report.error = Some(format!("{:#}", e));
                self.catalog.lock().await.log_scraper_job(
                    city_id,
                    JobStatus::Failed,
                    JobCounts::default(),
                    report.error.clone(),
                );
                return report;
            }
        };
        report.found = listings.len();

        let mut catalog = self.catalog.lock().await;
        for listing in &listings {
            match self.process_listing(&mut catalog, listing, city, city_id, city_avg) {
                Ok(None) => report.skipped += 1,
                Ok(Some(SaveOutcome::Created { .. })) => report.created += 1,
                Ok(Some(SaveOutcome::Updated { id, previous_price })) => {
                    report.updated += 1;
                    if let (Some(old), Some(new)) = (previous_price, listing.price) {
                        if new < old {
                            info!("📉 Price drop on {}: {} -> {}", listing.external_id, old, new);
                            report.price_drops.push(PriceDrop {
                                property_id: id,
                                old_price: old,
                                new_price: new,
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to process listing: {:#}", e);
                    report.errors += 1;
                }
            }
        }

        let status = if report.errors == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Partial
        };
        let counts = JobCounts {
            found: report.found,
            new: report.created,
            updated: report.updated,
        };
        catalog.log_scraper_job(city_id, status, counts, None);

        info!(
            "✅ Done {}: {} found, {} saved, {} errors",
            city.name_en,
            report.found,
            report.saved(),
            report.errors
        );
        report
    }

    /// Scrape the given cities (all known cities when `None`), then run the post-run steps.
    pub async fn run_all_cities(&self, pages: Option<u32>, cities: Option<&[String]>) -> Vec<CityReport> {
        let selected: Vec<&CityInfo> = match cities {
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    let found = find_city(name);
                    if found.is_none() {
                        warn!("Unknown city: {}", name);
                    }
                    found
                })
                .collect(),
            None => SAUDI_CITIES.iter().collect(),
        };

        info!("🚀 Starting scrape of {} cities", selected.len());
        let mut reports = Vec::with_capacity(selected.len());
        for (i, city) in selected.iter().enumerate() {
            info!("🏙️ Scraping {} ({})", city.name_en, city.name_ar);
            reports.push(self.scrape_city(city, pages).await);

            if i + 1 < selected.len() && !self.city_pause.is_zero() {
                tokio::time::sleep(self.city_pause).await;
            }
        }

        self.finish_run(&reports).await;
        reports
    }

    /// District averages, persistence, admin summary, then saved-search alerts.
    async fn finish_run(&self, reports: &[CityReport]) {
        {
            let mut catalog = self.catalog.lock().await;
            catalog.update_district_averages();
            if let Err(e) = catalog.save().await {
                error!("Failed to save catalog: {}", e);
            }
        }

        if !self.notifier.send_scrape_summary(reports).await {
            warn!("Failed to deliver scrape summary");
        }

        let notified = self.dispatch_alerts(reports).await;
        info!("🔔 Notified {} saved searches", notified);
    }

    /// New deals since each search's last delivery, plus this run's price drops
    /// merged with the ones still pending on the search.
    fn plan_alerts(catalog: &Catalog, reports: &[CityReport]) -> Vec<AlertPlan> {
        let drops: Vec<&PriceDrop> = reports.iter().flat_map(|r| &r.price_drops).collect();

        catalog
            .active_saved_searches()
            .into_iter()
            .filter_map(|search| {
                let new_deals: Vec<AlertProperty> = catalog
                    .properties_since(search.alerts_since())
                    .into_iter()
                    .map(|p| catalog.alert_view(p))
                    .filter(|p| search.filters.matches(p))
                    .collect();

                let mut owed: Vec<PriceDrop> = search.pending_price_drops.clone();
                for &fresh in &drops {
                    match owed.iter_mut().find(|d| d.property_id == fresh.property_id) {
                        // Keep the price the user last heard about
                        Some(pending) => pending.new_price = fresh.new_price,
                        None => owed.push(fresh.clone()),
                    }
                }
                let price_drops: Vec<(AlertProperty, PriceDrop)> = owed
                    .into_iter()
                    .filter_map(|d| {
                        let property = catalog.find_property(&d.property_id.to_string())?;
                        let view = catalog.alert_view(property);
                        search.filters.matches(&view).then_some((view, d))
                    })
                    .collect();

                (!new_deals.is_empty() || !price_drops.is_empty()).then_some(AlertPlan {
                    search,
                    new_deals,
                    price_drops,
                })
            })
            .collect()
    }

    /// Send digests and price-drop alerts; returns how many searches were marked notified.
    ///
    /// A search is only marked when every send succeeded. Otherwise its deal window
    /// stays open and its price drops are kept on it for the next run.
    pub async fn dispatch_alerts(&self, reports: &[CityReport]) -> usize {
        let (plans, planned_at) = {
            let catalog = self.catalog.lock().await;
            (Self::plan_alerts(&catalog, reports), Utc::now())
        };

        let mut delivered = Vec::new();
        let mut deferred = Vec::new();
        for plan in plans {
            let mut ok = self
                .notifier
                .send_new_deals_digest(&plan.search, &plan.new_deals)
                .await;
            for (property, drop) in &plan.price_drops {
                ok &= self
                    .notifier
                    .send_price_drop_alert(&plan.search, property, drop.old_price, drop.new_price)
                    .await;
            }
            if ok {
                delivered.push(plan.search.id);
            } else {
                warn!("Alerts for saved search '{}' not fully delivered", plan.search.name);
                let drops = plan.price_drops.into_iter().map(|(_, d)| d).collect();
                deferred.push((plan.search.id, drops));
            }
        }

        if delivered.is_empty() && deferred.is_empty() {
            return 0;
        }
        let mut catalog = self.catalog.lock().await;
        for id in &delivered {
            catalog.mark_notified(*id, planned_at);
        }
        for (id, drops) in deferred {
            catalog.defer_price_drops(id, drops);
        }
        if let Err(e) = catalog.save().await {
            error!("Failed to save catalog: {}", e);
        }
        delivered.len()
    }

    /// Run now, then every `interval` until Ctrl+C
    pub async fn run_continuous(
        &self,
        pages: Option<u32>,
        cities: Option<&[String]>,
        interval: Duration,
    ) -> Result<()> {
        info!("Running continuously every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reports = self.run_all_cities(pages, cities).await;
                    let found: usize = reports.iter().map(|r| r.found).sum();
                    info!("Run complete: {} listings over {} cities", found, reports.len());
                }
                _ = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
            }
        }
    }
}
