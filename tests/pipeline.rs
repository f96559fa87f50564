use axum::{
    extract::Path,
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use kingdom_scout::{
    analyzer::DealAnalyzer,
    config::Config,
    images::ImageCache,
    models::DealType,
    notifications::Notifier,
    runner::ScraperRunner,
    scrapers::{AqarScraper, ScrapeParams},
    store::Catalog,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn card(base: &str, id: &str, title: &str, price: &str, size: &str) -> String {
    format!(
        r#"<a href="/{title}-الرياض-النرجس-{id}">
          <div class="_listingCard__PoR_B">
            <div class="_imageWrapper__ZiYzs"><img src="{base}/img/{id}.jpg"></div>
            <div class="_titleRow__1AWv1"><h4>{title}</h4></div>
            <div class="_price__X51mi">{price}</div>
            <div class="_specs__nbsgm"><div class="_spec__SIJiK">{size} م²</div></div>
            <div class="_footer__CnldH"><p><span>الرياض</span><span>-النرجس</span></p></div>
          </div>
        </a>"#
    )
}

/// Fake listing site: any path is the Riyadh results page, images under /img
async fn listing_site() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let page = format!(
        "<html><body>{}{}</body></html>",
        card(&base, "7000001", "شقة للبيع", "300,000 ريال", "100"),
        card(&base, "7000002", "فيلا للبيع", "1.2 مليون", "200"),
    );
    let app = Router::new()
        .route(
            "/img/{name}",
            get(|Path(name): Path<String>| async move {
                ([(header::CONTENT_TYPE, "image/jpeg")], format!("jpeg:{}", name)).into_response()
            }),
        )
        .fallback(move || {
            let page = page.clone();
            async move { Html(page) }
        });

    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    base
}

#[tokio::test]
async fn scrape_store_cache_and_export() {
    let base = listing_site().await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.scraper.base_url = base.clone();
    config.scraper.max_pages = 1;
    config.scraper.scrape_details = false;
    config.scraper.page_delay_secs = (0.0, 0.0);
    config.storage.data_dir = dir.path().join("data");
    config.images.cache_dir = dir.path().join("images");
    config.images.batch_delay_ms = 0;

    let catalog_path = config.storage.catalog_path();
    let catalog = Arc::new(Mutex::new(Catalog::load(&catalog_path).await.unwrap()));

    let runner = ScraperRunner::new(
        Arc::new(AqarScraper::new(&config.scraper).unwrap()),
        DealAnalyzer::new(config.analyzer.clone()),
        catalog.clone(),
        Notifier::new(config.notifications.clone()).unwrap(),
        ScrapeParams::from_config(&config.scraper),
    )
    .with_city_pause(Duration::ZERO);

    let reports = runner
        .run_all_cities(None, Some(&["riyadh".to_string()]))
        .await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].found, 2);
    assert_eq!(reports[0].created, 2);
    assert!(catalog_path.exists());

    {
        let catalog = catalog.lock().await;
        // 3000/sqm and 6000/sqm against the 5000 fallback average
        let apartment = catalog.property_by_external_id("7000001").unwrap();
        assert_eq!(apartment.analysis.deal_type, DealType::HotDeal);
        let villa = catalog.property_by_external_id("7000002").unwrap();
        assert_eq!(villa.analysis.deal_type, DealType::Overpriced);
        assert_eq!(villa.analysis.price_vs_market_percent, Some(20.0));
    }

    let images = ImageCache::new(&config.images).unwrap();
    let report = images.download_batch(&catalog, 10).await;
    assert_eq!(report.processed, 2);
    assert_eq!(report.downloaded, 2);

    let reloaded = Catalog::load(&catalog_path).await.unwrap();
    let stats = reloaded.image_stats();
    assert_eq!(stats.with_local_images, 2);
    assert_eq!(stats.pending_download, 0);

    let exported = reloaded.export(dir.path().join("export")).await.unwrap();
    assert_eq!(exported, 2);
    assert!(dir.path().join("export/raw/7000002.json").exists());
}
