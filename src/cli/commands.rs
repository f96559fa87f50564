use anyhow::{bail, Context, Result};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    alerts::SavedSearch,
    analyzer::DealAnalyzer,
    config::Config,
    images::ImageCache,
    models::{find_city, SAUDI_CITIES},
    notifications::Notifier,
    runner::{CityReport, ScraperRunner},
    scrapers::{AqarScraper, ScrapeParams},
    server::{self, AppState},
    store::Catalog,
};

use super::{Commands, ImageCommand, ScrapeArgs, SearchCommand};

/// Handle CLI subcommands
pub async fn handle_command(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Scrape(args) => scrape(args, config).await,
        Commands::Serve { bind } => {
            let catalog = load_catalog(&config).await?;
            let images = ImageCache::new(&config.images).context("Failed to prepare image cache")?;
            let state = AppState::new(catalog, images, config.server.expose_errors);
            let bind = bind.unwrap_or(config.server.bind);
            server::serve(&bind, state).await
        }
        Commands::Images { action } => images(action, &config).await,
        Commands::Export { out } => {
            let catalog = load_catalog(&config).await?;
            let count = catalog.lock().await.export(&out).await?;
            println!("Exported {} properties to {}", count, out.display());
            Ok(())
        }
        Commands::Cities => {
            list_cities();
            Ok(())
        }
        Commands::Searches { action } => searches(action, &config).await,
    }
}

async fn load_catalog(config: &Config) -> Result<Arc<Mutex<Catalog>>> {
    let path = config.storage.catalog_path();
    let catalog = Catalog::load(&path)
        .await
        .with_context(|| format!("Failed to load catalog {}", path.display()))?;
    Ok(Arc::new(Mutex::new(catalog)))
}

async fn scrape(args: ScrapeArgs, mut config: Config) -> Result<()> {
    if args.no_details {
        config.scraper.scrape_details = false;
    }
    if args.browser {
        config.scraper.use_browser = true;
    }

    let unknown: Vec<&String> = args.cities.iter().filter(|c| find_city(c).is_none()).collect();
    if !args.cities.is_empty() && unknown.len() == args.cities.len() {
        let available: Vec<&str> = SAUDI_CITIES.iter().map(|c| c.name_ar).collect();
        bail!(
            "Unknown city: {}\nAvailable: {}",
            args.cities.join(", "),
            available.join(", ")
        );
    }

    let catalog = load_catalog(&config).await?;
    let source = Arc::new(AqarScraper::new(&config.scraper)?);
    let notifier = Notifier::new(config.notifications.clone())?;
    let runner = ScraperRunner::new(
        source,
        DealAnalyzer::new(config.analyzer.clone()),
        catalog,
        notifier,
        ScrapeParams::from_config(&config.scraper),
    )
    .with_city_pause(Duration::from_secs(config.scraper.city_pause_secs));

    let cities = (!args.cities.is_empty()).then_some(args.cities.as_slice());

    if args.continuous {
        let interval = Duration::from_secs(args.interval.max(1) * 3600);
        return runner.run_continuous(args.pages, cities, interval).await;
    }

    let reports = runner.run_all_cities(args.pages, cities).await;
    print!("{}", summary_table(&reports));
    Ok(())
}

/// Plain-text run summary printed at the end of a one-off scrape
pub fn summary_table(reports: &[CityReport]) -> String {
    let rule = "=".repeat(60);
    let mut out = format!("\n{}\nSCRAPE SUMMARY\n{}\n", rule, rule);

    for r in reports {
        let status = if r.errors == 0 { "OK" } else { "WARN" };
        let _ = writeln!(
            out,
            "  [{}] {}: {} found, {} saved, {} errors",
            status,
            r.city_en,
            r.found,
            r.saved(),
            r.errors
        );
    }

    let total_found: usize = reports.iter().map(|r| r.found).sum();
    let total_saved: usize = reports.iter().map(CityReport::saved).sum();
    let total_errors: usize = reports.iter().map(|r| r.errors).sum();
    let _ = writeln!(out, "{}", "-".repeat(60));
    let _ = writeln!(
        out,
        "  Total: {} found, {} saved, {} errors",
        total_found, total_saved, total_errors
    );
    let _ = writeln!(out, "{}", rule);
    out
}

async fn images(action: ImageCommand, config: &Config) -> Result<()> {
    let cache = ImageCache::new(&config.images).context("Failed to prepare image cache")?;
    match action {
        ImageCommand::Batch { limit } => {
            let catalog = load_catalog(config).await?;
            let report = cache.download_batch(&catalog, limit).await;
            println!(
                "Processed {}: {} downloaded, {} failed",
                report.processed, report.downloaded, report.failed
            );
        }
        ImageCommand::Fetch { url } => match cache.download(&url).await {
            Some(local) => println!("{}", local),
            None => bail!("Failed to download image: {}", url),
        },
    }
    Ok(())
}

fn list_cities() {
    println!("{:<4} {:<16} {:<16} {}", "#", "City", "Slug", "Region");
    for city in SAUDI_CITIES.iter() {
        println!(
            "{:<4} {:<16} {:<16} {} ({})",
            city.priority, city.name_en, city.slug, city.region, city.name_ar
        );
    }
}

async fn searches(action: SearchCommand, config: &Config) -> Result<()> {
    let catalog = load_catalog(config).await?;
    let mut catalog = catalog.lock().await;

    match action {
        SearchCommand::Import { file } => {
            let searches = read_searches(&file).await?;
            let count = searches.len();
            for search in searches {
                info!("Importing saved search '{}'", search.name);
                catalog.add_saved_search(search);
            }
            catalog.save().await?;
            println!("Imported {} saved searches", count);
        }
        SearchCommand::List => {
            for search in catalog.saved_searches() {
                let last = search
                    .last_notified_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{} {} [{}] email={} telegram={} last notified: {}",
                    search.id,
                    search.name,
                    if search.is_active { "active" } else { "paused" },
                    search.wants_email(),
                    search.wants_telegram(),
                    last
                );
            }
        }
    }
    Ok(())
}

async fn read_searches(path: &Path) -> Result<Vec<SavedSearch>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let searches = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(searches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_table_flags_cities_with_errors() {
        let reports = vec![
            CityReport {
                city_en: "Riyadh".to_string(),
                found: 40,
                created: 30,
                updated: 8,
                ..CityReport::default()
            },
            CityReport {
                city_en: "Jeddah".to_string(),
                found: 0,
                errors: 1,
                ..CityReport::default()
            },
        ];
        let table = summary_table(&reports);
        assert!(table.contains("  [OK] Riyadh: 40 found, 38 saved, 0 errors\n"));
        assert!(table.contains("  [WARN] Jeddah: 0 found, 0 saved, 1 errors\n"));
        assert!(table.contains("  Total: 40 found, 38 saved, 1 errors\n"));
    }

    #[tokio::test]
    async fn reads_one_or_many_searches() {
        let dir = tempfile::tempdir().unwrap();

        let one = dir.path().join("one.json");
        tokio::fs::write(&one, r#"{"name":"villas","filters":{"propertyTypes":["villa"]}}"#)
            .await
            .unwrap();
        let searches = read_searches(&one).await.unwrap();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].filters.property_types, Some(vec!["villa".to_string()]));

        let many = dir.path().join("many.json");
        tokio::fs::write(&many, r#"[{"name":"a"},{"name":"b","isActive":false}]"#)
            .await
            .unwrap();
        let searches = read_searches(&many).await.unwrap();
        assert_eq!(searches.len(), 2);
        assert!(!searches[1].is_active);
    }
}
