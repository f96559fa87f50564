//! KingdomScout: scrapes Saudi real-estate listings, scores them against the
//! local market and alerts saved searches about good deals.

pub mod alerts;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod images;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod runner;
pub mod scrapers;
pub mod server;
pub mod store;

pub use error::{ScoutError, ScoutResult};
