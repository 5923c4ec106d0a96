//! Typed views of the documents in each collection.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A typed record decoded from a store document.
pub trait Record: DeserializeOwned + Clone + Send + Sync {
    fn id(&self) -> &str;
}

macro_rules! impl_record {
    ($($ty:ty),*) => {
        $(impl Record for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

/// Notice category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeCategory {
    #[default]
    Service,
    Update,
}

impl NoticeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeCategory::Service => "service",
            NoticeCategory::Update => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: NoticeCategory,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Tax-deadline schedule entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub title: String,
    pub content: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsultationStatus {
    #[default]
    New,
    InProgress,
    Done,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::New => "new",
            ConsultationStatus::InProgress => "in-progress",
            ConsultationStatus::Done => "done",
        }
    }
}

/// Consultation request submitted through the public contact form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub message: String,
    #[serde(default)]
    pub status: ConsultationStatus,
    pub created_at: Option<DateTime<Utc>>,
}

/// One recorded page view. Only ever read back as counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub page: String,
    pub user_id: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl_record!(Notice, Schedule, Resource, Consultation);

/// Prefix `https://` unless the url already names http or https.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

/// `YYYY.MM.DD` in the site time zone
pub fn format_date(at: &DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y.%m.%d").to_string()
}

/// `YYYY.MM.DD HH:MM` in the site time zone
pub fn format_date_time(at: &DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y.%m.%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("https://hometax.go.kr"), "https://hometax.go.kr");
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConsultationStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        let status: ConsultationStatus = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(status, ConsultationStatus::Done);
        assert_eq!(ConsultationStatus::default().as_str(), "new");
    }

    #[test]
    fn test_category_defaults_to_service() {
        let notice: Notice = serde_json::from_value(serde_json::json!({
            "id": "n1",
            "title": "T",
            "content": "C",
            "createdAt": null,
            "updatedAt": null
        }))
        .unwrap();
        assert_eq!(notice.category, NoticeCategory::Service);
    }

    #[test]
    fn test_date_labels_use_site_timezone() {
        let at = Utc.with_ymd_and_hms(2024, 5, 31, 16, 5, 0).unwrap();
        assert_eq!(format_date(&at, chrono_tz::Asia::Seoul), "2024.06.01");
        assert_eq!(format_date_time(&at, chrono_tz::Asia::Seoul), "2024.06.01 01:05");
        assert_eq!(format_date(&at, chrono_tz::UTC), "2024.05.31");
    }
}
