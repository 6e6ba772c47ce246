//! Test utilities for integration tests.
//!
//! Provides an in-memory SQLite database with migrations applied, fixture
//! builders for tenants and accounts, and a router harness driven with
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use anyhow::Result;
use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use cms::{
    auth::SessionUser,
    config::AppConfig,
    models::{Role, deployment, tenant, user},
    repositories::{NewTenant, NewUser, TenantRepository, UserRepository},
    server::{AppState, create_app},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const CALLBACK_SECRET: &str = "test-callback-secret";
pub const TEST_PASSWORD: &str = "correct-horse";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Configuration for tests: simulated builds that finish almost at once and
/// a known callback secret.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.profile = "test".to_string();
    config.session_secret = Some("integration-test-session-secret-0123456789".to_string());
    config.deploy_callback_secret = Some(CALLBACK_SECRET.to_string());
    config.deploy.simulated_build_delay_ms = 10;
    config.media.public_base_url = "http://cdn.test/media".to_string();
    config
}

/// A parsed response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub raw: Bytes,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// The application wired against a fresh database and media directory.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub db: DatabaseConnection,
    pub media_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(mut config: AppConfig) -> Result<Self> {
        let media_dir = TempDir::new()?;
        config.media.root = media_dir.path().to_path_buf();

        let db = setup_test_db().await?;
        let state = AppState::from_config(config, db.clone())?;
        let router = create_app(state.clone());

        Ok(Self {
            router,
            state,
            db,
            media_dir,
        })
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let raw = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let body = serde_json::from_slice(&raw).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            raw,
            body,
        }
    }

    fn request(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        builder
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let request = Self::request(Method::GET, uri, token)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> TestResponse {
        let request = Self::request(method, uri, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.json(Method::POST, uri, token, body).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.json(Method::PATCH, uri, token, body).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let request = Self::request(Method::DELETE, uri, token)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// GET on the public API with an `x-api-key` header.
    pub async fn public_get(&self, uri: &str, api_key: &str) -> TestResponse {
        let request = Request::get(uri)
            .header("x-api-key", api_key)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// POST to the deploy callback with the given secret.
    pub async fn callback(&self, secret: &str, body: Value) -> TestResponse {
        let request = Request::post("/api/deploy/callback")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-webhook-secret", secret)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub fn token_for(&self, user: &user::Model) -> String {
        self.state
            .sessions
            .issue(&SessionUser::from(user))
            .expect("issue session token")
    }

    pub async fn tenant(&self, name: &str, domain: &str) -> tenant::Model {
        TenantRepository::new(&self.db)
            .create(NewTenant {
                name: name.to_string(),
                domain: domain.to_string(),
                ..Default::default()
            })
            .await
            .expect("create tenant")
    }

    pub async fn super_admin(&self) -> user::Model {
        UserRepository::new(&self.db)
            .upsert_super_admin(&format!("root-{}@cms.test", Uuid::new_v4().simple()), TEST_PASSWORD)
            .await
            .expect("create super admin")
    }

    pub async fn member(&self, tenant: &tenant::Model, role: Role) -> user::Model {
        UserRepository::new(&self.db)
            .create(NewUser {
                email: format!(
                    "{}-{}@{}",
                    role.as_str().to_lowercase(),
                    Uuid::new_v4().simple(),
                    tenant.domain
                ),
                name: format!("{} of {}", role.as_str(), tenant.name),
                password: TEST_PASSWORD.to_string(),
                role,
                tenant_id: tenant.id,
            })
            .await
            .expect("create member")
    }

    /// Waits for every background build started so far.
    pub async fn settle_builds(&self) {
        self.state.deployments.wait_for_background_tasks().await;
    }

    pub async fn deployment(&self, id: Uuid) -> deployment::Model {
        self.state
            .deployments
            .deployments()
            .find_by_id(id)
            .await
            .expect("load deployment")
            .expect("deployment exists")
    }
}

/// Parses the `id` field of a JSON response.
pub fn id_of(body: &Value) -> Uuid {
    body["id"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("response carries an id")
}
