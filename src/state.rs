//! Shared application context handed to every handler through axum `State`.

use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Instant;

use crate::analytics::{PageViewReporter, SummarySnapshot};
use crate::auth::CredentialIssuer;
use crate::config::AppConfig;
use crate::store::RecordStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub config: Arc<AppConfig>,
    pub reporter: PageViewReporter,
    /// Latest summary from the background refresher, if one runs
    pub analytics: SummarySnapshot,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RecordStore>,
        issuer: Arc<dyn CredentialIssuer>,
    ) -> Self {
        let reporter = PageViewReporter::new(config.analytics.endpoint.clone(), store.clone());
        Self {
            store,
            issuer,
            config: Arc::new(config),
            reporter,
            analytics: SummarySnapshot::default(),
            started_at: Instant::now(),
        }
    }

    /// Site time zone used for every date shown to users
    pub fn tz(&self) -> Tz {
        self.config.site_timezone
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory store and the test admin from [`AppConfig::for_tests`].
    pub fn for_tests() -> Self {
        let config = AppConfig::for_tests();
        let issuer = crate::auth::JwtIssuer::new(config.auth.clone(), None);
        Self::new(
            config,
            Arc::new(crate::store::MemoryStore::new()),
            Arc::new(issuer),
        )
    }
}
