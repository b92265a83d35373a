use std::sync::Arc;

use tracing::error;

use bardly_db::Database;
use bardly_llm::CompletionClient;

use crate::error::{ApiError, ApiResult};
use crate::quota::QuotaPolicy;
use crate::relay::RelaySettings;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler needs. Secrets live here rather than being read
/// from the environment per request.
pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub llm: Arc<dyn CompletionClient>,
    pub relay: RelaySettings,
    pub quota: QuotaPolicy,
    /// Shared secret for the billing hook; `None` disables the route.
    pub billing_secret: Option<String>,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: impl Into<String>, llm: Arc<dyn CompletionClient>) -> Self {
        Self {
            db,
            jwt_secret: jwt_secret.into(),
            llm,
            relay: RelaySettings::default(),
            quota: QuotaPolicy::default(),
            billing_secret: None,
        }
    }
}

/// Run a blocking DB call off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(ApiError::Internal)
}
