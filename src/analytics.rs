//! Visit analytics: page-view ingestion and the windowed summary shown on
//! the admin dashboard.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::models::AnalyticsEvent;
use crate::store::{format_timestamp, Collection, Filter, RecordStore, StoreError, Write};

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// Number of day buckets in a summary
pub const DAY_BUCKETS: i64 = 7;

// ============================================================================
// Ingestion
// ============================================================================

/// Page view as posted by the site. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageView {
    pub page: Option<String>,
    pub user_id: Option<String>,
    pub user_agent: Option<String>,
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl PageView {
    pub fn new(page: &str) -> Self {
        Self {
            page: Some(page.to_string()),
            ..Default::default()
        }
    }

    /// Fill in `unknown` / `anonymous` / `unknown` for missing fields.
    pub fn into_event(self) -> AnalyticsEvent {
        AnalyticsEvent {
            page: or_default(self.page, "unknown"),
            user_id: or_default(self.user_id, "anonymous"),
            user_agent: or_default(self.user_agent, "unknown"),
            timestamp: None,
        }
    }
}

/// Store one page view, stamped with the server time.
pub async fn record_page_view(
    store: &dyn RecordStore,
    view: PageView,
) -> Result<String, StoreError> {
    let event = view.into_event();
    let write = Write::new()
        .set("page", event.page)
        .set("userId", event.user_id)
        .set("userAgent", event.user_agent)
        .server_timestamp("timestamp");
    store.create(Collection::Analytics, write).await
}

/// Fire-and-forget page-view reporting. Posts to the configured endpoint,
/// or writes straight into the store when there is none.
#[derive(Clone)]
pub struct PageViewReporter {
    endpoint: Option<String>,
    store: Arc<dyn RecordStore>,
}

impl PageViewReporter {
    pub fn new(endpoint: Option<String>, store: Arc<dyn RecordStore>) -> Self {
        Self { endpoint, store }
    }

    /// Never fails and never retries; errors are only logged.
    pub fn report(&self, view: PageView) -> JoinHandle<()> {
        let endpoint = self.endpoint.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            match endpoint {
                Some(url) => {
                    let event = view.into_event();
                    match HTTP_CLIENT.post(&url).json(&event).send().await {
                        Ok(response) if !response.status().is_success() => {
                            tracing::warn!(
                                status = %response.status(),
                                page = %event.page,
                                "page view endpoint returned error"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, page = %event.page, "failed to report page view");
                        }
                    }
                }
                None => {
                    if let Err(e) = record_page_view(store.as_ref(), view).await {
                        tracing::warn!(error = %e, "failed to record page view");
                    }
                }
            }
        })
    }
}

// ============================================================================
// Summary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub date: NaiveDate,
    pub date_label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub daily: u64,
    pub weekly: u64,
    pub monthly: u64,
    pub daily_growth: f64,
    pub weekly_growth: f64,
    pub monthly_growth: f64,
    /// Oldest first
    pub day_buckets: Vec<DayBucket>,
    pub generated_at: DateTime<Utc>,
}

/// Percentage change rounded to one decimal; `0` when there is no
/// previous period to compare with.
pub fn growth(current: u64, previous: u64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    let pct = (current as f64 - previous as f64) / previous as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// First instant of `now`'s calendar day in `tz`, as UTC. Usually local
/// midnight; when midnight falls in a DST gap, the first local time after it.
pub fn start_of_day(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let Some(midnight) = now.with_timezone(&tz).date_naive().and_hms_opt(0, 0, 0) else {
        return now;
    };
    (0..24 * 4)
        .map(|step| midnight + Duration::minutes(15 * step))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or(now)
}

async fn count_since(
    store: &dyn RecordStore,
    from: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
) -> Result<u64, StoreError> {
    let mut filters = vec![Filter::gte("timestamp", format_timestamp(&from))];
    if let Some(until) = until {
        filters.push(Filter::lt("timestamp", format_timestamp(&until)));
    }
    store.count(Collection::Analytics, &filters).await
}

/// Rolling daily/weekly/monthly visit counts against their previous
/// periods, plus one bucket per each of the seven preceding days. Every
/// figure is its own count query.
pub async fn summarize(
    store: &dyn RecordStore,
    now: DateTime<Utc>,
    tz: Tz,
) -> Result<AnalyticsSummary, StoreError> {
    let start = start_of_day(now, tz);
    let day = Duration::days(1);

    let daily = count_since(store, start, None).await?;
    let weekly = count_since(store, start - day * 7, None).await?;
    let monthly = count_since(store, start - day * 30, None).await?;

    let prev_daily = count_since(store, start - day, Some(start)).await?;
    let prev_weekly = count_since(store, start - day * 14, Some(start - day * 7)).await?;
    let prev_monthly = count_since(store, start - day * 60, Some(start - day * 30)).await?;

    let mut day_buckets = Vec::with_capacity(DAY_BUCKETS as usize);
    for offset in (1..=DAY_BUCKETS).rev() {
        let day_start = start - day * offset as i32;
        let count = count_since(store, day_start, Some(day_start + day)).await?;
        let local = day_start.with_timezone(&tz);
        day_buckets.push(DayBucket {
            date: local.date_naive(),
            date_label: local.format("%m.%d").to_string(),
            count,
        });
    }

    Ok(AnalyticsSummary {
        daily,
        weekly,
        monthly,
        daily_growth: growth(daily, prev_daily),
        weekly_growth: growth(weekly, prev_weekly),
        monthly_growth: growth(monthly, prev_monthly),
        day_buckets,
        generated_at: now,
    })
}

/// Latest summary published by the refresher
pub type SummarySnapshot = Arc<RwLock<Option<AnalyticsSummary>>>;

/// Re-run the summary every `interval` and publish it. Each tick starts its
/// own pass, so a slow pass can overlap the next one.
pub fn spawn_refresher(
    store: Arc<dyn RecordStore>,
    tz: Tz,
    interval: std::time::Duration,
    snapshot: SummarySnapshot,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let store = store.clone();
            let snapshot = snapshot.clone();
            tokio::spawn(async move {
                match summarize(store.as_ref(), Utc::now(), tz).await {
                    Ok(summary) => {
                        tracing::debug!(daily = summary.daily, "analytics summary refreshed");
                        *snapshot.write().await = Some(summary);
                    }
                    Err(e) => tracing::error!(error = %e, "analytics refresh failed"),
                }
            });
        }
    })
}
