/**
 * Routes Module
 * API route handlers and the helpers they share
 */
pub mod admin;
pub mod analytics;
pub mod auth;
pub mod consultations;
pub mod health;
pub mod notices;
pub mod resources;
pub mod schedules;
pub mod site;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::auth::Claims;
use crate::crud::Editable;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{Cursor, StoreError};

pub use crate::error::ErrorResponse;

/// Success response (for delete and status changes)
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Query parameters shared by list endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page_size: Option<usize>,
    pub cursor: Option<String>,
}

impl ListQuery {
    pub fn cursor(&self) -> Result<Option<Cursor>, StoreError> {
        self.cursor
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(Cursor::parse)
            .transpose()
    }
}

/// `?confirm=true` must accompany every delete.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// A record with the date label shown next to it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Labeled<T> {
    #[serde(flatten)]
    pub record: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_label: Option<String>,
}

pub fn labeled<E: Editable>(record: E, state: &AppState) -> Labeled<E> {
    let date_label = record.date_label(state.tz());
    Labeled { record, date_label }
}

/// Extract bearer token from Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Verify the caller's session.
pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> AppResult<Claims> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    Ok(state.issuer.verify(token).await?)
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::state::AppState;

    pub async fn send(
        app: Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        json: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        let body = match json {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        let res = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Sign in as the test admin and return the access token.
    pub async fn admin_token(state: &AppState) -> String {
        state
            .issuer
            .sign_in("admin@taxin.test", "correct-horse")
            .await
            .unwrap()
            .access_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_empty_cursor_is_ignored() {
        let query = ListQuery {
            page_size: None,
            cursor: Some(String::new()),
        };
        assert!(query.cursor().unwrap().is_none());

        let query = ListQuery {
            page_size: None,
            cursor: Some("!!".to_string()),
        };
        assert!(matches!(query.cursor(), Err(StoreError::InvalidCursor)));
    }
}
