use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::interfaces::storage::StorageBackend;

pub mod openai;
pub mod sqlite;
pub mod supabase;

pub use openai::OpenAiProvider;
pub use sqlite::LocalStore;
pub use supabase::SupabaseStore;

/// Picks the storage backend once at process start: cloud when both
/// credentials are configured, local SQLite otherwise.
pub async fn storage_from_config(
    config: &Config,
    db_path: &str,
) -> Result<Arc<dyn StorageBackend>> {
    if config.use_cloud_store() {
        info!("using cloud storage backend");
        Ok(Arc::new(SupabaseStore::new(
            config.cloud.url.clone(),
            config.cloud.key.clone(),
        )))
    } else {
        info!(db_path, "using local sqlite storage backend");
        Ok(Arc::new(LocalStore::new(db_path).await?))
    }
}
