/**
 * Authentication Routes
 * Admin sign-in, session check and sign-out
 */
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, UserInfo};
use crate::error::AppError;
use crate::routes::bearer_token;
use crate::state::AppState;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^\S+@\S+\.\S+$").unwrap();
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserInfo>,
    pub access_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            user: None,
            access_token: None,
            expires_at: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub is_valid: bool,
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let email = payload.email.trim();
    if email.is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse::failed(
                "Email and password are required".to_string(),
            )),
        );
    }
    if !EMAIL_REGEX.is_match(email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(LoginResponse::failed("Invalid email format".to_string())),
        );
    }

    match state.issuer.sign_in(email, &payload.password).await {
        Ok(session) => {
            tracing::info!(user_id = %session.user.user_id, "admin signed in");
            (
                StatusCode::OK,
                Json(LoginResponse {
                    success: true,
                    user: Some(session.user),
                    access_token: Some(session.access_token),
                    expires_at: Some(session.expires_at),
                    error: None,
                }),
            )
        }
        Err(e) => {
            if let AuthError::Backend(reason) = &e {
                tracing::error!("Sign-in backend failure: {}", reason);
            } else {
                tracing::warn!("Failed login attempt for: {}", email);
            }
            let err = AppError::Auth(e);
            (err.status(), Json(LoginResponse::failed(err.user_message())))
        }
    }
}

/// GET /api/auth/verify
/// Always 200; `isValid` carries the outcome.
pub async fn verify_token(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let token = match bearer_token(&headers) {
        Some(t) => t,
        None => {
            return Json(VerifyResponse {
                success: false,
                is_valid: false,
                user: None,
                error: Some("No authorization token provided".to_string()),
            });
        }
    };

    match state.issuer.verify(token).await {
        Ok(claims) => Json(VerifyResponse {
            success: true,
            is_valid: true,
            user: Some(UserInfo {
                user_id: claims.sub,
                email: claims.email,
                role: claims.role,
            }),
            error: None,
        }),
        Err(e) => {
            tracing::debug!("Token verification failed: {}", e);
            Json(VerifyResponse {
                success: false,
                is_valid: false,
                user: None,
                error: Some(AppError::Auth(e).user_message()),
            })
        }
    }
}

/// POST /api/auth/logout
/// Idempotent. The token comes from the Authorization header or the body.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let body_token = payload.and_then(|Json(p)| p.access_token);
    let token = bearer_token(&headers)
        .map(str::to_string)
        .or(body_token);

    if let Some(token) = token {
        if let Err(e) = state.issuer.sign_out(&token).await {
            tracing::warn!("Sign-out failed: {}", e);
        }
    }

    Json(LogoutResponse { success: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::send;
    use axum::routing::{get, post};
    use axum::Router;
    use serde_json::json;

    fn auth_router(state: AppState) -> Router {
        Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/verify", get(verify_token))
            .route("/api/auth/logout", post(logout))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_login_missing_fields() {
        let state = AppState::for_tests();
        let (status, body) = send(
            auth_router(state),
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "", "password": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Email and password are required");
    }

    #[tokio::test]
    async fn test_login_invalid_email_format() {
        let state = AppState::for_tests();
        let (status, body) = send(
            auth_router(state),
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "admin@localhost", "password": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid email format");
    }

    #[tokio::test]
    async fn test_login_wrong_password_is_generic() {
        let state = AppState::for_tests();
        let (status, body) = send(
            auth_router(state),
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "admin@taxin.test", "password": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"],
            "Login failed. Please check your email and password."
        );
        assert!(body["accessToken"].is_null());
    }

    #[tokio::test]
    async fn test_login_verify_logout_flow() {
        let state = AppState::for_tests();

        let (status, body) = send(
            auth_router(state.clone()),
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "Admin@Taxin.test", "password": "correct-horse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["role"], "ADMIN");
        assert!(body["expiresAt"].is_string());
        let token = body["accessToken"].as_str().unwrap().to_string();

        let (status, body) = send(
            auth_router(state.clone()),
            "GET",
            "/api/auth/verify",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isValid"], true);
        assert_eq!(body["user"]["email"], "admin@taxin.test");

        let (status, body) = send(
            auth_router(state.clone()),
            "POST",
            "/api/auth/logout",
            None,
            Some(json!({ "accessToken": token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = send(
            auth_router(state.clone()),
            "GET",
            "/api/auth/verify",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(body["isValid"], false);

        // A second logout still succeeds.
        let (status, _) = send(
            auth_router(state),
            "POST",
            "/api/auth/logout",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_verify_without_token() {
        let state = AppState::for_tests();
        let (status, body) = send(auth_router(state), "GET", "/api/auth/verify", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isValid"], false);
        assert_eq!(body["error"], "No authorization token provided");
    }
}
