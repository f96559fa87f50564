//! HTTP surface for the image cache.

use anyhow::{Context, Result};
use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info};

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use routes::{
    download_batch_handler, download_property_handler, health_handler, proxy_handler, stats_handler,
};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let public_prefix = state.images.public_prefix().to_string();
    let files = ServeDir::new(state.images.dir());

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/images/proxy", get(proxy_handler))
        .route("/api/images/download/{property_id}", post(download_property_handler))
        .route("/api/images/download-batch", post(download_batch_handler))
        .route("/api/images/stats", get(stats_handler))
        .nest_service(&public_prefix, files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM
pub async fn serve(bind: &str, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("🚀 Server running on {}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::tests::{cache_in, image_host, PNG_BYTES};
    use crate::models::{Analysis, Listing, Location, Source};
    use crate::store::{Catalog, PropertyRefs};
    use chrono::Utc;
    use serde_json::Value;
    use tokio::sync::Mutex;

    struct TestServer {
        base: String,
        catalog: Arc<Mutex<Catalog>>,
        _dir: tempfile::TempDir,
    }

    async fn start(catalog: Catalog) -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Mutex::new(catalog));
        let state = AppState::new(catalog.clone(), cache_in(dir.path()), false);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
        TestServer {
            base: format!("http://{}", addr),
            catalog,
            _dir: dir,
        }
    }

    fn catalog_with_image(image_url: &str) -> Catalog {
        let mut catalog = Catalog::in_memory();
        let city_id = catalog.get_or_create_city("الرياض", Some("riyadh"), Some("Riyadh"), None, 1);
        let listing = Listing {
            external_id: "6100001".to_string(),
            source: Source::Aqar,
            source_url: "https://sa.aqar.fm/x-6100001".to_string(),
            title: "شقة".to_string(),
            description: None,
            price: Some(500_000.0),
            size_sqm: Some(100.0),
            bedrooms: None,
            bathrooms: None,
            location: Location {
                city: "الرياض".to_string(),
                ..Location::default()
            },
            property_type: None,
            main_image_url: Some(image_url.to_string()),
            image_urls: vec![image_url.to_string()],
            scraped_at: Utc::now(),
            raw_data: Value::Null,
        };
        let refs = PropertyRefs {
            city_id,
            district_id: None,
            property_type_id: None,
        };
        catalog.save_property(&listing, &Analysis::default(), refs);
        catalog
    }

    #[tokio::test]
    async fn health_is_ok() {
        let server = start(Catalog::in_memory()).await;
        let body: Value = reqwest::get(format!("{}/health", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn proxy_requires_url() {
        let server = start(Catalog::in_memory()).await;
        let response = reqwest::get(format!("{}/api/images/proxy", server.base))
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["message"], "URL parameter required");
    }

    #[tokio::test]
    async fn proxy_caches_and_serves_image() {
        let (host, _) = image_host().await;
        let server = start(Catalog::in_memory()).await;
        let image_url = format!("{}/img/a.png", host);

        let body: Value = reqwest::Client::new()
            .get(format!("{}/api/images/proxy", server.base))
            .query(&[("url", image_url.as_str())])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["originalUrl"], image_url.as_str());
        let local = body["localUrl"].as_str().unwrap();
        assert!(local.starts_with("/images/properties/"));
        assert!(local.ends_with(".png"));

        let bytes = reqwest::get(format!("{}{}", server.base, local))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(&bytes[..], PNG_BYTES);
    }

    #[tokio::test]
    async fn failed_download_is_500_without_details() {
        let (host, _) = image_host().await;
        let server = start(Catalog::in_memory()).await;

        let response = reqwest::Client::new()
            .get(format!("{}/api/images/proxy", server.base))
            .query(&[("url", format!("{}/missing.jpg", host))])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert!(body["message"].is_null());
    }

    #[tokio::test]
    async fn unknown_property_is_404() {
        let server = start(Catalog::in_memory()).await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/images/download/nope", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn property_download_updates_stats() {
        let (host, _) = image_host().await;
        let server = start(catalog_with_image(&format!("{}/img/a.png", host))).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{}/api/images/download/6100001", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["localImagesCount"], 1);

        let stats: Value = client
            .get(format!("{}/api/images/stats", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["totalProperties"], 1);
        assert_eq!(stats["withLocalImages"], 1);
        assert_eq!(stats["pendingDownload"], 0);

        let catalog = server.catalog.lock().await;
        assert!(catalog.find_property("6100001").unwrap().local_main_image_url.is_some());
    }

    #[tokio::test]
    async fn batch_accepts_empty_body() {
        let (host, _) = image_host().await;
        let server = start(catalog_with_image(&format!("{}/img/a.png", host))).await;
        let client = reqwest::Client::new();

        let report: Value = client
            .post(format!("{}/api/images/download-batch", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["processed"], 1);
        assert_eq!(report["downloaded"], 1);

        let response = client
            .post(format!("{}/api/images/download-batch", server.base))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }
}
