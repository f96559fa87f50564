use crate::models::Listing;
use crate::scrapers::types::ScrapeParams;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Fetches a page and returns its HTML
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Common trait for all listing sources
/// New sites (Bayut, Haraj, ...) plug in by implementing the page and detail steps
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Scrape one page of search results for a city (Arabic name)
    async fn scrape_page(&self, city: &str, page: u32) -> Result<Vec<Listing>>;

    /// Enrich a listing from its details page
    async fn scrape_details(&self, listing: &mut Listing) -> Result<()>;

    /// Get the name of the listing source
    fn source_name(&self) -> &'static str;

    /// Crawl up to `params.max_pages` result pages, stopping at the first empty one.
    ///
    /// A failure on the first page is returned; a failure on a later page ends
    /// the crawl with what was collected so far. Detail failures leave the
    /// listing as scraped from the results page.
    async fn scrape_city(&self, city: &str, params: &ScrapeParams) -> Result<Vec<Listing>> {
        info!("Starting {} scrape for city: {}", self.source_name(), city);
        let mut all = Vec::new();

        for page in 1..=params.max_pages {
            let mut listings = match self.scrape_page(city, page).await {
                Ok(listings) => listings,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!("Page {} failed for {}: {:#}", page, city, e);
                    break;
                }
            };
            tokio::time::sleep(params.page_delay.sample()).await;

            if listings.is_empty() {
                info!("No listings found on page {}, stopping", page);
                break;
            }

            if params.scrape_details {
                let total = listings.len();
                for (i, listing) in listings.iter_mut().enumerate() {
                    info!("Scraping details for listing {}/{} on page {}", i + 1, total, page);
                    if let Err(e) = self.scrape_details(listing).await {
                        warn!("Details failed for {}: {:#}", listing.source_url, e);
                    }
                    tokio::time::sleep(params.detail_delay.sample()).await;
                }
            }

            info!("Scraped page {}: {} listings", page, listings.len());
            all.extend(listings);
        }

        info!("Total listings scraped for {}: {}", city, all.len());
        Ok(all)
    }
}
