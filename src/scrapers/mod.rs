pub mod aqar;
pub mod browser;
pub mod fetch;
pub mod parse;
pub mod traits;
pub mod types;

pub use aqar::AqarScraper;
pub use browser::BrowserFetcher;
pub use fetch::HttpFetcher;
pub use traits::{ListingSource, PageFetcher};
pub use types::{Jitter, ScrapeParams};
