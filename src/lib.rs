pub mod auth;
pub mod config;
pub mod db;
pub mod error;

use std::sync::Arc;
use std::time::Duration;
use actix_web::{middleware::from_fn, web, HttpResponse};
use tracing::{info, warn};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthContext, AuthService, RevokedTokens, TokenIssuer};
pub use db::{DbOperations, InMemoryUserStore, User, UserStore};

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Mounts every route of the service.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check)).service(
        web::scope("/auth")
            .route("/register", web::post().to(auth::handlers::register))
            .route("/login", web::post().to(auth::handlers::login))
            .route("/logout", web::post().to(auth::handlers::logout))
            .route("/refresh", web::post().to(auth::handlers::refresh_token))
            .service(
                web::resource("/user-profile")
                    .wrap(from_fn(auth::require_auth))
                    .route(web::get().to(auth::handlers::user_profile)),
            ),
    );
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
    db: Option<Arc<DbOperations>>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let Some(url) = config.database.url.clone() else {
            warn!("No database URL configured, users are kept in memory");
            return Self::with_store(config, Arc::new(InMemoryUserStore::new()));
        };

        let db = DbOperations::new_with_options(
            &url,
            config.database.max_connections,
            Duration::from_secs(config.database.acquire_timeout_secs),
        )
        .await?;
        db.migrate().await?;
        let db = Arc::new(db);

        let mut state = Self::with_store(config, db.clone())?;
        state.db = Some(db);
        Ok(state)
    }

    pub fn with_store(config: Settings, store: Arc<dyn UserStore>) -> Result<Self> {
        let tokens = TokenIssuer::new(&config.auth)?;
        let auth_service = AuthService::new(store, tokens, RevokedTokens::new());

        Ok(Self {
            config: Arc::new(config),
            auth_service: Arc::new(auth_service),
            db: None,
        })
    }

    /// Periodically forgets revoked tokens that have expired on their own.
    pub fn spawn_revocation_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let revoked = self.auth_service.revoked().clone();
        let period = Duration::from_secs(self.config.auth.revocation_sweep_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = revoked.cleanup().await;
                if removed > 0 {
                    info!("Pruned {} expired revoked tokens", removed);
                }
            }
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.close().await;
        }
        Ok(())
    }
}
