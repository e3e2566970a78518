//! Lendit equipment lending server
//!
//! Users register and wait for approval, administrators maintain the
//! equipment catalog, and approved users borrow and return items within
//! per-type quotas. Exposed as a REST JSON API.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::{Pool, Postgres};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use repository::Repository;
use services::Services;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<Services>,
    /// Set when PostgreSQL backs the store; used by the readiness check
    pub db: Option<Pool<Postgres>>,
}

impl AppState {
    pub fn new(config: AppConfig, repository: Repository, db: Option<Pool<Postgres>>) -> Self {
        let services = Services::new(repository, &config.lending);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
            db,
        }
    }

    /// State over a fresh in-memory store
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Repository::in_memory(), None)
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Users
        .route(
            "/users",
            get(api::users::list_users).post(api::users::register),
        )
        .route(
            "/users/:id",
            get(api::users::get_user)
                .put(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .route("/users/:id/settings", put(api::users::update_settings))
        .route("/users/:id/dashboard", get(api::users::get_user_dashboard))
        .route("/users/:id/approve", post(api::users::approve_user))
        .route("/users/:id/reject", post(api::users::reject_user))
        .route("/users/:id/disable", post(api::users::disable_user))
        .route("/users/:id/loans", get(api::users::get_user_loans))
        // Equipment
        .route(
            "/equipment",
            get(api::equipment::list_equipment).post(api::equipment::create_equipment),
        )
        .route(
            "/equipment/:id",
            get(api::equipment::get_equipment)
                .put(api::equipment::update_equipment)
                .delete(api::equipment::delete_equipment),
        )
        // Loans
        .route("/loans", post(api::loans::create_loan))
        .route("/loans/overdue", get(api::loans::list_overdue))
        .route("/loans/:id", get(api::loans::get_loan))
        .route("/loans/:id/return", post(api::loans::return_loan))
        // Statistics
        .route("/stats", get(api::stats::get_stats))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
