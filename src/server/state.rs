use crate::images::ImageCache;
use crate::server::error::ApiError;
use crate::store::Catalog;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    pub catalog: Arc<Mutex<Catalog>>,
    pub images: ImageCache,
    pub expose_errors: bool,
}

impl AppState {
    pub fn new(catalog: Arc<Mutex<Catalog>>, images: ImageCache, expose_errors: bool) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            images,
            expose_errors,
        })
    }

    /// 500 carrying `detail` only in development
    pub fn internal(&self, detail: impl Display) -> ApiError {
        ApiError::Internal(self.expose_errors.then(|| detail.to_string()))
    }
}
