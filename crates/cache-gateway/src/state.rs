use std::path::PathBuf;
use std::sync::Arc;

use cache_coordinator::Coordinator;
use cache_db::Db;
use cache_domain::Config;
use cache_store::UploadRegistry;

/// Shared application state passed to the management endpoint's handlers
/// and to the deployment channel handlers. The substituter endpoints (one
/// per running cache) get a narrower [`crate::substituter::CacheState`]
/// instead, since they only ever act on a single cache.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Db>,
    pub coordinator: Arc<Coordinator>,
    pub uploads: Arc<UploadRegistry>,
}

impl AppState {
    pub fn cache_dir(&self, name: &str) -> PathBuf {
        self.config.cache_dir.join(name)
    }
}
