//! # Server Configuration
//!
//! Application state, router assembly and the serving loop of the CMS API.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::SessionKeys;
use crate::config::AppConfig;
use crate::crypto::CryptoError;
use crate::deploy::{DeploymentService, DeploymentSettings};
use crate::gateway::PublicCache;
use crate::handlers;
use crate::media::{FilesystemMediaStore, MediaService};
use crate::telemetry;

/// Room for multipart framing on top of the upload limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// How long shutdown waits for running builds.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub sessions: SessionKeys,
    pub deployments: DeploymentService,
    pub media: MediaService,
    pub public_cache: PublicCache,
}

impl AppState {
    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: AppConfig, db: DatabaseConnection) -> Result<Self, CryptoError> {
        let sessions = SessionKeys::from_config(&config)?;
        let public_cache = PublicCache::from_config(&config.public_api);
        let deployments = DeploymentService::new(
            db.clone(),
            DeploymentSettings::from_config(&config),
            public_cache.clone(),
        );
        let media = MediaService::new(
            Arc::new(FilesystemMediaStore::from_config(&config.media)),
            config.media.max_upload_bytes,
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            sessions,
            deployments,
            media,
            public_cache,
        })
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-api-key"),
        ])
        .allow_credentials(true)
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let upload_limit = state.media.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;
    let media_root = state.config.media.root.clone();
    let cors = cors_layer(&state.config);

    let api = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/session", get(handlers::auth::session))
        .route(
            "/api/tenants",
            get(handlers::tenants::list_tenants).post(handlers::tenants::create_tenant),
        )
        .route(
            "/api/tenants/{id}",
            get(handlers::tenants::get_tenant).patch(handlers::tenants::update_tenant),
        )
        .route(
            "/api/tenants/{id}/api-key",
            post(handlers::tenants::rotate_api_key),
        )
        .route(
            "/api/pages",
            get(handlers::pages::list_pages).post(handlers::pages::create_page),
        )
        .route(
            "/api/pages/{id}",
            get(handlers::pages::get_page)
                .patch(handlers::pages::update_page)
                .delete(handlers::pages::delete_page),
        )
        .route(
            "/api/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/api/users/{id}",
            get(handlers::users::get_user)
                .patch(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/api/deploy", post(handlers::deploy::trigger_deploy))
        .route("/api/deploy/callback", post(handlers::deploy::deploy_callback))
        .route("/api/deployments", get(handlers::deploy::list_deployments))
        .route("/api/deployments/{id}", get(handlers::deploy::get_deployment))
        .route(
            "/api/upload",
            post(handlers::media::upload)
                .delete(handlers::media::delete_upload)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/public/pages", get(handlers::public::pages))
        .route("/api/public/menu", get(handlers::public::menu))
        .route("/api/public/news", get(handlers::public::news))
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .with_state(state);

    api.nest_service("/media", ServeDir::new(media_root))
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
}

/// Starts the server and serves until Ctrl-C, then waits briefly for
/// running builds.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {e}"))?;
    let profile = config.profile.clone();

    let state = AppState::from_config(config, db)?;
    let deployments = state.deployments.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    if !deployments.shutdown(SHUTDOWN_GRACE).await {
        tracing::warn!("Shutting down with builds still running");
    }
    tracing::info!("Server stopped");
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                crate::auth::SESSION_COOKIE,
            ))),
        );
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                crate::gateway::API_KEY_HEADER,
            ))),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::auth::session,
        crate::handlers::tenants::list_tenants,
        crate::handlers::tenants::create_tenant,
        crate::handlers::tenants::get_tenant,
        crate::handlers::tenants::update_tenant,
        crate::handlers::tenants::rotate_api_key,
        crate::handlers::pages::list_pages,
        crate::handlers::pages::get_page,
        crate::handlers::pages::create_page,
        crate::handlers::pages::update_page,
        crate::handlers::pages::delete_page,
        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,
        crate::handlers::deploy::trigger_deploy,
        crate::handlers::deploy::deploy_callback,
        crate::handlers::deploy::list_deployments,
        crate::handlers::deploy::get_deployment,
        crate::handlers::media::upload,
        crate::handlers::media::delete_upload,
        crate::handlers::public::pages,
        crate::handlers::public::menu,
        crate::handlers::public::news,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::Role,
            crate::models::PageStatus,
            crate::models::DeploymentStatus,
            crate::error::ApiError,
            crate::auth::SessionUser,
            crate::handlers::HealthStatus,
            crate::handlers::types::LoginRequest,
            crate::handlers::types::SessionResponse,
            crate::handlers::types::CreateTenantRequest,
            crate::handlers::types::UpdateTenantRequest,
            crate::handlers::types::TenantResponse,
            crate::handlers::types::ApiKeyResponse,
            crate::handlers::types::CreatePageRequest,
            crate::handlers::types::UpdatePageRequest,
            crate::handlers::types::PageResponse,
            crate::handlers::types::CreateUserRequest,
            crate::handlers::types::UpdateUserRequest,
            crate::handlers::types::UserResponse,
            crate::handlers::types::DeployRequest,
            crate::handlers::types::DeployAccepted,
            crate::handlers::types::DeployCallbackRequest,
            crate::handlers::types::DeployCallbackResponse,
            crate::handlers::types::DeploymentResponse,
            crate::handlers::types::DeleteMediaRequest,
            crate::media::StoredObject,
            crate::gateway::PublicTenant,
            crate::gateway::PageLink,
            crate::gateway::PageSummary,
            crate::gateway::PublicPage,
            crate::gateway::PagesResponse,
            crate::gateway::MenuItem,
            crate::gateway::MenuResponse,
            crate::gateway::NewsItem,
            crate::gateway::NewsResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service information"),
        (name = "auth", description = "Login and sessions"),
        (name = "tenants", description = "Tenant registry"),
        (name = "pages", description = "Page management"),
        (name = "users", description = "Account management"),
        (name = "deploy", description = "Site builds"),
        (name = "media", description = "Image uploads"),
        (name = "public", description = "API-key authenticated content for site generators"),
    ),
    info(
        title = "CMS API",
        description = "Multi-tenant content management backend",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
