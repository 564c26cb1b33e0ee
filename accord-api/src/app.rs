/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use accord_api::{app::AppState, config::Config};
/// use accord_shared::email::LogEmailSender;
/// use sqlx::PgPool;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let mailer = Arc::new(LogEmailSender::new(config.email.from.clone()));
/// let state = AppState::new(pool, config, mailer);
/// let app = accord_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError, middleware::security::SecurityHeadersLayer};
use accord_shared::{
    account::{AccountDeleter, AccountDeletion},
    auth::middleware::{jwt_auth_middleware, jwt_or_api_key_middleware, API_KEY_HEADER},
    db::account_store::PgAccountStore,
    email::EmailSender,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Account deletion coordinator
    pub accounts: Arc<dyn AccountDeleter>,

    /// Outbound mail
    pub mailer: Arc<dyn EmailSender>,
}

impl AppState {
    /// Creates state whose account deletion runs against `db`
    pub fn new(db: PgPool, config: Config, mailer: Arc<dyn EmailSender>) -> Self {
        let store = PgAccountStore::new(db.clone(), config.database.transactions);

        Self {
            db,
            config: Arc::new(config),
            accounts: Arc::new(AccountDeletion::new(store)),
            mailer,
        }
    }

    /// Replaces the account deletion coordinator
    pub fn with_account_deleter(mut self, accounts: Arc<dyn AccountDeleter>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health                      # Health check (public)
/// └── /v1/
///     ├── /auth/                       # public
///     │   ├── POST /signup
///     │   ├── GET  /verify?token=
///     │   ├── POST /login
///     │   └── POST /refresh
///     ├── /users/me                    # JWT
///     │   ├── GET | PATCH | DELETE /
///     │   └── PUT /password
///     ├── /keys                        # JWT (API keys get 403)
///     │   ├── POST | GET /
///     │   └── DELETE /:id
///     ├── GET /subscription            # JWT or API key
///     └── /admin                       # JWT, admin flag
///         ├── POST /grant
///         └── GET  /users
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Authentication (per route group)
/// 2. Logging (tower-http TraceLayer)
/// 3. CORS (tower-http CorsLayer)
/// 4. Security headers
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_routes = Router::new()
        .route("/signup", post(routes::auth::signup))
        .route("/verify", get(routes::auth::verify_email))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let user_routes = Router::new()
        .route(
            "/me",
            get(routes::users::get_me)
                .patch(routes::users::update_me)
                .delete(routes::users::delete_me),
        )
        .route("/me/password", put(routes::users::change_password))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let key_routes = Router::new()
        .route(
            "/",
            post(routes::keys::create_key).get(routes::keys::list_keys),
        )
        .route("/:id", axum::routing::delete(routes::keys::delete_key))
        .layer(from_fn_with_state(state.clone(), jwt_or_api_key_layer));

    let subscription_routes = Router::new()
        .route("/subscription", get(routes::subscription::get_subscription))
        .layer(from_fn_with_state(state.clone(), jwt_or_api_key_layer));

    let admin_routes = Router::new()
        .route("/grant", post(routes::admin::grant_admin))
        .route("/users", get(routes::admin::list_users))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/users", user_routes)
        .nest("/keys", key_routes)
        .nest("/admin", admin_routes)
        .merge(subscription_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static(API_KEY_HEADER),
            ])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}

/// JWT authentication layer
///
/// Accepts the bearer header or the `jwt` cookie and injects an
/// `AuthContext` into request extensions.
async fn jwt_auth_layer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    jwt_auth_middleware(state.jwt_secret().to_string(), req, next)
        .await
        .unwrap_or_else(|e| ApiError::from(e).into_response())
}

/// Authentication layer that also accepts `X-Api-Key`
async fn jwt_or_api_key_layer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    jwt_or_api_key_middleware(state.db.clone(), state.jwt_secret().to_string(), req, next)
        .await
        .unwrap_or_else(|e| ApiError::from(e).into_response())
}
