//! Local copies of listing images.
//!
//! Files are named after the MD5 of their source URL, so a URL is fetched at
//! most once per cache directory. There is no eviction and no size bound.
//! Downloads land in a temp file that is renamed into place, so a reader never
//! sees a partial image even when two requests race for the same URL.

use crate::config::ImageConfig;
use crate::error::{ScoutError, ScoutResult};
use crate::store::{Catalog, ImageJob};
use md5::{Digest, Md5};
use reqwest::header::{LOCATION, REFERER, USER_AGENT};
use reqwest::{redirect, Client, StatusCode};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

const DEFAULT_EXTENSION: &str = ".jpg";

/// Local image URLs for one property
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyImages {
    pub local_main_image: Option<String>,
    pub local_images: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub downloaded: usize,
    pub failed: usize,
}

pub struct ImageCache {
    client: Client,
    dir: PathBuf,
    public_prefix: String,
    referer: String,
    user_agent: String,
    max_per_property: usize,
    batch_delay: Duration,
    max_batch: usize,
}

/// Hex MD5 of the URL
pub fn cache_key(url: &str) -> String {
    hex::encode(Md5::digest(url.as_bytes()))
}

/// Extension of the URL's path including the dot, `.jpg` when there is none
pub fn extension(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or("");
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => name[dot..].to_string(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

fn file_name(url: &str) -> String {
    format!("{}{}", cache_key(url), extension(url))
}

impl ImageCache {
    pub fn new(config: &ImageConfig) -> ScoutResult<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;

        // Redirects are followed by hand, one hop only
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            dir: config.cache_dir.clone(),
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
            referer: config.referer.clone(),
            user_agent: config.user_agent.clone(),
            max_per_property: config.max_per_property,
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            max_batch: config.max_batch,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    pub fn local_path(&self, url: &str) -> PathBuf {
        self.dir.join(file_name(url))
    }

    pub fn local_url(&self, url: &str) -> String {
        format!("{}/{}", self.public_prefix, file_name(url))
    }

    pub async fn exists(&self, url: &str) -> bool {
        tokio::fs::try_exists(self.local_path(url)).await.unwrap_or(false)
    }

    /// Return the local URL for `url`, downloading it first if needed.
    ///
    /// A 301/302 is followed for one hop. The body is stored under the key of
    /// `url`, not of the redirect target, and the returned local URL is the one
    /// for `url`, so repeat lookups of `url` hit the cache.
    ///
    /// Failures are logged and reported as `None`.
    pub async fn download(&self, url: &str) -> Option<String> {
        if self.exists(url).await {
            debug!("Image already cached: {}", url);
            return Some(self.local_url(url));
        }

        match self.fetch_to_disk(url).await {
            Ok(()) => Some(self.local_url(url)),
            Err(e) => {
                error!("Image download error for {}: {}", url, e);
                None
            }
        }
    }

    async fn get(&self, url: &str) -> ScoutResult<reqwest::Response> {
        Ok(self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(REFERER, &self.referer)
            .send()
            .await?)
    }

    async fn fetch_to_disk(&self, url: &str) -> ScoutResult<()> {
        Url::parse(url).map_err(|_| ScoutError::InvalidUrl(url.to_string()))?;

        let mut response = self.get(url).await?;

        if matches!(response.status(), StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND) {
            if let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                let target = response
                    .url()
                    .join(location)
                    .map_err(|_| ScoutError::InvalidUrl(location.to_string()))?;
                debug!("Following redirect {} -> {}", url, target);
                response = self.get(target.as_str()).await?;
            }
        }

        if response.status() != StatusCode::OK {
            return Err(ScoutError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let final_path = self.local_path(url);
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.part", file_name(url), uuid::Uuid::new_v4()));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<_, ScoutError>(())
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp_path, &final_path).await?;
        debug!("Cached {} as {}", url, final_path.display());
        Ok(())
    }

    /// Cache the main image and up to `max_per_property` gallery images, one at a time
    pub async fn download_property_images(
        &self,
        main_image_url: Option<&str>,
        image_urls: &[String],
    ) -> PropertyImages {
        let local_main_image = match main_image_url {
            Some(url) => self.download(url).await,
            None => None,
        };

        let mut local_images = Vec::new();
        for url in image_urls.iter().take(self.max_per_property) {
            if let Some(local) = self.download(url).await {
                local_images.push(local);
            }
        }

        PropertyImages {
            local_main_image,
            local_images,
        }
    }

    /// Cache images for one property and record the local URLs in the catalog
    pub async fn download_for_property(
        &self,
        catalog: &Mutex<Catalog>,
        job: &ImageJob,
    ) -> ScoutResult<PropertyImages> {
        let images = self
            .download_property_images(job.main_image_url.as_deref(), &job.image_urls)
            .await;

        let mut catalog = catalog.lock().await;
        catalog.set_local_images(
            job.property_id,
            images.local_main_image.clone(),
            images.local_images.clone(),
        )?;
        catalog.save().await?;
        Ok(images)
    }

    /// Cache images for properties that have none locally, sequentially with a
    /// pause between properties. The catalog lock is not held while downloading.
    pub async fn download_batch(&self, catalog: &Mutex<Catalog>, limit: usize) -> BatchReport {
        let jobs = catalog
            .lock()
            .await
            .pending_image_downloads(limit.min(self.max_batch));

        let mut report = BatchReport {
            processed: jobs.len(),
            ..BatchReport::default()
        };
        info!("Downloading images for {} properties", jobs.len());

        for job in &jobs {
            let images = self
                .download_property_images(job.main_image_url.as_deref(), &job.image_urls)
                .await;

            if images.local_main_image.is_some() {
                let mut guard = catalog.lock().await;
                match guard.set_local_images(job.property_id, images.local_main_image, images.local_images) {
                    Ok(()) => report.downloaded += 1,
                    Err(e) => {
                        warn!("Failed to record images for {}: {}", job.property_id, e);
                        report.failed += 1;
                    }
                }
            } else {
                report.failed += 1;
            }

            tokio::time::sleep(self.batch_delay).await;
        }

        if let Err(e) = catalog.lock().await.save().await {
            error!("Failed to save catalog after image batch: {}", e);
        }
        info!(
            "Image batch done: {} processed, {} downloaded, {} failed",
            report.processed, report.downloaded, report.failed
        );
        report
    }
}
