use crate::config::ScraperConfig;
use crate::models::{Listing, Location, PropertyType, Source};
use crate::scrapers::browser::BrowserFetcher;
use crate::scrapers::fetch::HttpFetcher;
use crate::scrapers::parse::{extract_id_from_url, first_integer, parse_price, parse_size};
use crate::scrapers::traits::{ListingSource, PageFetcher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const DESCRIPTION_SELECTORS: [&str; 3] = [
    "._description__zVaD6 p",
    ".description",
    "[data-testid=\"description\"]",
];
const IMAGE_SELECTORS: [&str; 3] = [
    "._imageWrapper__ZiYzs img",
    ".gallery img",
    "[data-testid=\"image\"]",
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// Collapsed text of an element, like the site renders it
fn text_of(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect::<String>()
}

/// Selectors for one listing card, parsed once per page
struct CardSelectors {
    cards: Selector,
    fallback_cards: Selector,
    anchor: Selector,
    title: Selector,
    price: Selector,
    spec: Selector,
    footer_span: Selector,
    description: Selector,
    image: Selector,
}

impl CardSelectors {
    fn new() -> Self {
        Self {
            cards: selector("._listingCard__PoR_B"),
            fallback_cards: selector("div[class*=\"listing\"]"),
            anchor: selector("a[href]"),
            title: selector("._titleRow__1AWv1 h4"),
            price: selector("._price__X51mi"),
            spec: selector("._specs__nbsgm ._spec__SIJiK"),
            footer_span: selector("._footer__CnldH p span"),
            description: selector("._description__zVaD6 p"),
            image: selector("._imageWrapper__ZiYzs img"),
        }
    }
}

/// Scraper for sa.aqar.fm
pub struct AqarScraper {
    fetcher: Arc<dyn PageFetcher>,
    base_url: Url,
}

impl AqarScraper {
    /// Create a scraper using plain HTTP or headless Chrome, per configuration
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let fetcher: Arc<dyn PageFetcher> = if config.use_browser {
            let browser = BrowserFetcher::new()?;
            match &config.browser_debug_dir {
                Some(dir) => Arc::new(browser.with_debug_dir(dir)),
                None => Arc::new(browser),
            }
        } else {
            Arc::new(HttpFetcher::new(config)?)
        };
        Self::with_fetcher(&config.base_url, fetcher)
    }

    pub fn with_fetcher(base_url: &str, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid base URL: {}", base_url))?;
        Ok(Self { fetcher, base_url })
    }

    /// Search results URL: `/عقارات/{city}` with `/{page}` appended after the first page
    pub fn listings_url(&self, city: &str, page: u32) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = format!("{}/عقارات/{}", base, city);
        if page > 1 {
            url.push_str(&format!("/{}", page));
        }
        url
    }

    fn absolute(&self, href: &str) -> Option<String> {
        if href.starts_with("http") {
            return Some(href.to_string());
        }
        self.base_url.join(href).ok().map(String::from)
    }

    /// Parse every listing card on a results page
    pub fn parse_listings_page(&self, html: &str, city: &str) -> Vec<Listing> {
        let document = Html::parse_document(html);
        let sel = CardSelectors::new();

        let mut cards: Vec<ElementRef<'_>> = document.select(&sel.cards).collect();
        info!("Found {} listing cards", cards.len());

        if cards.is_empty() {
            cards = document.select(&sel.fallback_cards).collect();
            info!("Fallback found {} listings", cards.len());
        }

        let listings: Vec<Listing> = cards
            .into_iter()
            .filter_map(|card| self.parse_card(card, city, &sel))
            .collect();

        info!("Successfully extracted {} listings from page", listings.len());
        listings
    }

    fn parse_card(&self, card: ElementRef<'_>, city: &str, sel: &CardSelectors) -> Option<Listing> {
        // Cards are usually wrapped in their link; otherwise the link is inside
        let link = card
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "a")
            .or_else(|| card.select(&sel.anchor).next())?;
        let href = link.value().attr("href")?;
        let source_url = self.absolute(href)?;

        let Some(external_id) = extract_id_from_url(&source_url) else {
            debug!("Skipping card without listing id: {}", source_url);
            return None;
        };

        let title = card
            .select(&sel.title)
            .next()
            .map(text_of)
            .unwrap_or_else(|| "No Title".to_string());

        let price = card
            .select(&sel.price)
            .next()
            .and_then(|el| parse_price(&text_of(el)));

        let mut size_sqm = None;
        let mut bedrooms = None;
        for spec in card.select(&sel.spec) {
            let text = text_of(spec);
            let markup = spec.html();
            if size_sqm.is_none()
                && (text.contains("م²")
                    || (markup.to_lowercase().contains("area") && markup.contains("المساحة")))
            {
                size_sqm = parse_size(&text);
            }
            if bedrooms.is_none() && (markup.contains("bed-king") || text.contains("غرف")) {
                bedrooms = first_integer(&text);
            }
        }

        // Footer reads <span>City</span><span>-District</span>
        let district = card
            .select(&sel.footer_span)
            .nth(1)
            .map(|span| text_of(span).trim_start_matches('-').trim().to_string())
            .filter(|d| !d.is_empty());

        let description = card.select(&sel.description).next().map(text_of);

        let main_image_url = card
            .select(&sel.image)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| self.absolute(src));

        Some(Listing {
            property_type: PropertyType::infer_from_text(&title),
            raw_data: json!({
                "scraped_from": "listing_page",
                "aqar_id": external_id,
                "city": city,
            }),
            external_id,
            source: Source::Aqar,
            source_url,
            title,
            description,
            price,
            size_sqm,
            bedrooms,
            bathrooms: None,
            location: Location {
                city: city.to_string(),
                district,
                ..Location::default()
            },
            main_image_url,
            image_urls: Vec::new(),
            scraped_at: Utc::now(),
        })
    }

    /// Fill description and gallery from a listing's own page
    pub fn apply_details(&self, html: &str, listing: &mut Listing) {
        let document = Html::parse_document(html);

        for css in DESCRIPTION_SELECTORS {
            if let Some(el) = document.select(&selector(css)).next() {
                let text = text_of(el);
                if !text.is_empty() {
                    listing.description = Some(text);
                    break;
                }
            }
        }

        let mut images: Vec<String> = Vec::new();
        for css in IMAGE_SELECTORS {
            for img in document.select(&selector(css)) {
                if let Some(src) = img.value().attr("src").and_then(|s| self.absolute(s)) {
                    if !images.contains(&src) {
                        images.push(src);
                    }
                }
            }
            if !images.is_empty() {
                break;
            }
        }

        if !images.is_empty() {
            if listing.main_image_url.is_none() {
                listing.main_image_url = images.first().cloned();
            }
            listing.image_urls = images;
        }
    }
}

#[async_trait]
impl ListingSource for AqarScraper {
    async fn scrape_page(&self, city: &str, page: u32) -> Result<Vec<Listing>> {
        let url = self.listings_url(city, page);
        info!("Scraping listings page: {}", url);

        let html = self.fetcher.fetch(&url).await?;
        let listings = self.parse_listings_page(&html, city);
        if listings.is_empty() {
            warn!("No listings parsed from {} ({} bytes)", url, html.len());
        }
        Ok(listings)
    }

    async fn scrape_details(&self, listing: &mut Listing) -> Result<()> {
        info!("Scraping details: {}", listing.source_url);
        let html = self.fetcher.fetch(&listing.source_url).await?;
        self.apply_details(&html, listing);
        Ok(())
    }

    fn source_name(&self) -> &'static str {
        "aqar.fm"
    }
}
