//! TaxIn Backend - library for app logic and testing

pub mod analytics;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod crud;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod pagination;
pub mod routes;
pub mod state;
pub mod store;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::auth::{CredentialIssuer, JwtIssuer};
use crate::config::AppConfig;
use crate::models::{Notice, Resource, Schedule};
use crate::state::AppState;
use crate::store::{MemoryStore, PgStore, RecordStore};

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN, falling back
/// to the local frontend dev server.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

fn admin_routes() -> Router<AppState> {
    use routes::admin;

    Router::new()
        .route(
            "/notices",
            get(admin::list::<Notice>).post(admin::create::<Notice>),
        )
        .route(
            "/notices/{id}",
            patch(admin::update::<Notice>).delete(admin::delete::<Notice>),
        )
        .route(
            "/schedules",
            get(admin::list::<Schedule>).post(admin::create::<Schedule>),
        )
        .route(
            "/schedules/{id}",
            patch(admin::update::<Schedule>).delete(admin::delete::<Schedule>),
        )
        .route(
            "/resources",
            get(admin::list::<Resource>).post(admin::create::<Resource>),
        )
        .route(
            "/resources/{id}",
            patch(admin::update::<Resource>).delete(admin::delete::<Resource>),
        )
        .route(
            "/consultations",
            get(routes::consultations::admin_list),
        )
        .route(
            "/consultations/{id}",
            axum::routing::delete(routes::consultations::admin_delete),
        )
        .route(
            "/consultations/{id}/status",
            patch(routes::consultations::admin_set_status),
        )
        .route("/analytics", get(routes::analytics::admin_summary))
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    Router::new()
        .route("/api/auth/login", post(routes::auth::login))
        .route(
            "/api/auth/verify",
            get(routes::auth::verify_token).post(routes::auth::verify_token),
        )
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/notices", get(routes::notices::list_notices))
        .route("/api/notices/{id}", get(routes::notices::get_notice))
        .route("/api/schedules", get(routes::schedules::list_schedules))
        .route(
            "/api/schedules/calendar",
            get(routes::schedules::calendar_month),
        )
        .route(
            "/api/schedules/calendar/{year}/{month}/{day}",
            get(routes::schedules::calendar_day),
        )
        .route("/api/resources", get(routes::resources::list_resources))
        .route("/api/consultations", post(routes::consultations::submit))
        .route(
            "/api/analytics/page-view",
            post(routes::analytics::page_view),
        )
        .route("/api/site/{section}", get(routes::site::get_section))
        .nest("/api/admin", admin_routes())
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/store", get(routes::health::health_store))
        .route("/health/ready", get(routes::health::health_ready))
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // 2 MB body cap
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
}

/// Open the database-backed store, or fall back to memory when there is no
/// database or it cannot be reached.
async fn connect_store(config: &AppConfig) -> (Arc<dyn RecordStore>, Arc<dyn CredentialIssuer>) {
    let memory = |config: &AppConfig| -> (Arc<dyn RecordStore>, Arc<dyn CredentialIssuer>) {
        (
            Arc::new(MemoryStore::new()),
            Arc::new(JwtIssuer::new(config.auth.clone(), None)),
        )
    };

    let Some(db_config) = &config.database else {
        tracing::info!("DATABASE_URL not set. Running with the in-memory store.");
        return memory(config);
    };

    let pool = match db::init_pool(db_config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                "Failed to initialize database pool: {}. Continuing with the in-memory store.",
                e
            );
            return memory(config);
        }
    };
    if let Err(e) = db::run_migrations(&pool).await {
        tracing::error!("Failed to run database migrations: {}", e);
    }

    (
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(JwtIssuer::new(config.auth.clone(), Some(pool))),
    )
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Dropping the guards stops the background log writers.
    let _log_guards = logging::init(&logging::LoggingConfig::from_env());

    let config = AppConfig::from_env();

    let insecure = config.insecure_defaults();
    if config.is_production() {
        // Refuse to start in production with the insecure default JWT secret.
        if insecure.contains(&"JWT_SECRET") {
            panic!(
                "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
                 Refusing to start with the default secret."
            );
        }
        if insecure.contains(&"ADMIN_EMAIL") {
            tracing::warn!(
                "SECURITY: ADMIN_EMAIL is using an insecure default. \
                 Set ADMIN_EMAIL env var to a real address."
            );
        }
    }

    let (store, issuer) = connect_store(&config).await;
    tracing::info!(store = store.backend(), timezone = %config.site_timezone, "store ready");

    let state = AppState::new(config, store, issuer);

    if let Some(interval) = state.config.analytics.refresh_interval {
        tracing::info!(interval_secs = interval.as_secs(), "starting analytics refresher");
        analytics::spawn_refresher(
            state.store.clone(),
            state.tz(),
            interval,
            state.analytics.clone(),
        );
    }

    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    let app = create_app(state);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{admin_token, send};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_public_and_admin_routes_are_wired() {
        let state = AppState::for_tests();
        let app = create_app(state.clone());

        let (status, _) = send(app.clone(), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(app.clone(), "GET", "/api/admin/notices", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = admin_token(&state).await;
        let (status, created) = send(
            app.clone(),
            "POST",
            "/api/admin/resources",
            Some(&token),
            Some(json!({ "title": "Hometax", "url": "hometax.go.kr" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["url"], "https://hometax.go.kr");

        let (status, list) = send(app.clone(), "GET", "/api/resources", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["title"], "Hometax");

        let (status, _) = send(app.clone(), "GET", "/api/admin/analytics", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(app, "POST", "/api/auth/verify", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isValid"], true);
    }
}
