//! Deployment state machine: simulated builds, CI dispatch and callbacks.

mod test_utils;

use axum::http::StatusCode;
use cms::{
    deploy::SIMULATED_BUILD_LOG,
    models::{DeploymentStatus, Role},
    repositories::{TenantRepository, TenantUpdate},
};
use serde_json::json;
use test_utils::{CALLBACK_SECRET, TestApp, test_config};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DISPATCH_PATH: &str = "/repos/acme/site/actions/workflows/deploy.yml/dispatches";

/// App whose builds are dispatched to `github` and whose CDN purges go to `cdn`.
async fn ci_app(github: &MockServer, cdn: &MockServer) -> TestApp {
    let mut config = test_config();
    config.deploy.github_token = Some("ghp_test".to_string());
    config.deploy.github_api_base = github.uri();
    config.cdn.distribution_id = Some("dist-1".to_string());
    config.cdn.purge_url = Some(format!("{}/purge", cdn.uri()));
    TestApp::with_config(config).await.unwrap()
}

async fn with_repository(app: &TestApp, tenant_id: Uuid) {
    TenantRepository::new(&app.db)
        .update(
            tenant_id,
            TenantUpdate {
                build_repository: Some(Some("acme/site".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

fn deployment_id(body: &serde_json::Value) -> Uuid {
    body["deploymentId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn simulated_build_runs_to_success() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let editor = app.member(&acme, Role::Editor).await;

    let accepted = app
        .post(
            "/api/deploy",
            Some(&app.token_for(&editor)),
            json!({"tenantId": acme.id}),
        )
        .await;
    assert_eq!(accepted.status, StatusCode::ACCEPTED);
    assert_eq!(accepted.body["status"], "PENDING");
    let id = deployment_id(&accepted.body);

    app.settle_builds().await;

    let finished = app.deployment(id).await;
    assert_eq!(finished.status(), DeploymentStatus::Success);
    assert_eq!(finished.build_log.as_deref(), Some(SIMULATED_BUILD_LOG));
    assert_eq!(finished.duration, Some(0));
    assert_eq!(finished.triggered_by, Some(editor.id));
    assert!(finished.finished_at.is_some());
}

#[tokio::test]
async fn callback_after_terminal_state_is_ignored() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let token = app.token_for(&app.super_admin().await);

    let accepted = app
        .post("/api/deploy", Some(&token), json!({"tenantId": acme.id}))
        .await;
    let id = deployment_id(&accepted.body);
    app.settle_builds().await;

    let late = app
        .callback(
            CALLBACK_SECRET,
            json!({"deploymentId": id, "status": "FAILED", "buildLog": "too late"}),
        )
        .await;
    assert_eq!(late.status, StatusCode::OK);
    assert_eq!(late.body, json!({"applied": false, "status": "SUCCESS"}));

    let unchanged = app.deployment(id).await;
    assert_eq!(unchanged.status(), DeploymentStatus::Success);
    assert_eq!(unchanged.build_log.as_deref(), Some(SIMULATED_BUILD_LOG));
}

#[tokio::test]
async fn dispatched_build_waits_for_callback() {
    let github = MockServer::start().await;
    let cdn = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DISPATCH_PATH))
        .and(header("authorization", "token ghp_test"))
        .and(header("accept", "application/vnd.github.v3+json"))
        .and(body_partial_json(json!({"ref": "main", "inputs": {"domain": "acme.test"}})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&github)
        .await;
    Mock::given(method("POST"))
        .and(path("/purge"))
        .and(body_partial_json(json!({
            "distributionId": "dist-1",
            "paths": ["/acme.test/*"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cdn)
        .await;

    let app = ci_app(&github, &cdn).await;
    let acme = app.tenant("Acme", "acme.test").await;
    with_repository(&app, acme.id).await;
    let token = app.token_for(&app.member(&acme, Role::Admin).await);

    let accepted = app
        .post("/api/deploy", Some(&token), json!({"tenantId": acme.id}))
        .await;
    let id = deployment_id(&accepted.body);
    app.settle_builds().await;
    assert_eq!(app.deployment(id).await.status(), DeploymentStatus::Building);

    let forged = app
        .callback("wrong-secret", json!({"deploymentId": id, "status": "SUCCESS"}))
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.deployment(id).await.status(), DeploymentStatus::Building);

    let applied = app
        .callback(
            CALLBACK_SECRET,
            json!({"deploymentId": id, "status": "SUCCESS", "buildLog": "built in CI", "duration": 42}),
        )
        .await;
    assert_eq!(applied.status, StatusCode::OK);
    assert_eq!(applied.body, json!({"applied": true, "status": "SUCCESS"}));

    let second = app
        .callback(CALLBACK_SECRET, json!({"deploymentId": id, "status": "FAILED"}))
        .await;
    assert_eq!(second.body["applied"], false);

    let finished = app.deployment(id).await;
    assert_eq!(finished.status(), DeploymentStatus::Success);
    assert_eq!(finished.build_log.as_deref(), Some("built in CI"));
    assert_eq!(finished.duration, Some(42));
}

#[tokio::test]
async fn rejected_dispatch_fails_the_deployment() {
    let github = MockServer::start().await;
    let cdn = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(DISPATCH_PATH))
        .respond_with(ResponseTemplate::new(422).set_body_string("workflow not found"))
        .mount(&github)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&cdn)
        .await;

    let app = ci_app(&github, &cdn).await;
    let acme = app.tenant("Acme", "acme.test").await;
    with_repository(&app, acme.id).await;
    let token = app.token_for(&app.super_admin().await);

    let accepted = app
        .post("/api/deploy", Some(&token), json!({"tenantId": acme.id}))
        .await;
    assert_eq!(accepted.status, StatusCode::ACCEPTED);
    let id = deployment_id(&accepted.body);
    app.settle_builds().await;

    let failed = app.deployment(id).await;
    assert_eq!(failed.status(), DeploymentStatus::Failed);
    let log = failed.build_log.unwrap();
    assert!(log.starts_with("Build dispatch failed:"), "{log}");
    assert!(log.contains("422"), "{log}");
}

#[tokio::test]
async fn tenant_without_repository_falls_back_to_simulation() {
    let github = MockServer::start().await;
    let cdn = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&github)
        .await;
    Mock::given(method("POST"))
        .and(path("/purge"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cdn)
        .await;

    let app = ci_app(&github, &cdn).await;
    let acme = app.tenant("Acme", "acme.test").await;
    let token = app.token_for(&app.super_admin().await);

    let accepted = app
        .post("/api/deploy", Some(&token), json!({"tenantId": acme.id}))
        .await;
    let id = deployment_id(&accepted.body);
    app.settle_builds().await;

    assert_eq!(app.deployment(id).await.status(), DeploymentStatus::Success);
}

#[tokio::test]
async fn failing_cdn_does_not_revert_success() {
    let github = MockServer::start().await;
    let cdn = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/purge"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&cdn)
        .await;

    let app = ci_app(&github, &cdn).await;
    let acme = app.tenant("Acme", "acme.test").await;
    let token = app.token_for(&app.super_admin().await);

    let accepted = app
        .post("/api/deploy", Some(&token), json!({"tenantId": acme.id}))
        .await;
    let id = deployment_id(&accepted.body);
    app.settle_builds().await;

    assert_eq!(app.deployment(id).await.status(), DeploymentStatus::Success);
}

#[tokio::test]
async fn every_trigger_records_its_own_deployment() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let root = app.token_for(&app.super_admin().await);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let accepted = app
            .post("/api/deploy", Some(&root), json!({"tenantId": acme.id}))
            .await;
        assert_eq!(accepted.status, StatusCode::ACCEPTED);
        ids.push(accepted.body["deploymentId"].clone());
    }
    app.settle_builds().await;

    let listed = app
        .get(
            &format!("/api/deployments?tenantId={}&limit=2", acme.id),
            Some(&root),
        )
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    let listed = listed.body.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|deployment| deployment["status"] == "SUCCESS"));
    assert_eq!(listed[0]["id"], ids[2]);

    let unscoped = app.get("/api/deployments", Some(&root)).await;
    assert_eq!(unscoped.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deploy_is_gated_by_role_and_tenant() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let globex = app.tenant("Globex", "globex.test").await;
    let viewer = app.token_for(&app.member(&acme, Role::Viewer).await);
    let editor = app.token_for(&app.member(&acme, Role::Editor).await);
    let root = app.token_for(&app.super_admin().await);

    let by_viewer = app
        .post("/api/deploy", Some(&viewer), json!({"tenantId": acme.id}))
        .await;
    assert_eq!(by_viewer.status, StatusCode::FORBIDDEN);

    let foreign = app
        .post("/api/deploy", Some(&editor), json!({"tenantId": globex.id}))
        .await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);

    let missing = app
        .post("/api/deploy", Some(&root), json!({"tenantId": Uuid::new_v4()}))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let history = app.get("/api/deployments", Some(&viewer)).await;
    assert_eq!(history.status, StatusCode::OK);
    assert_eq!(history.body, json!([]));
}

#[tokio::test]
async fn callback_validates_payload() {
    let app = TestApp::new().await.unwrap();

    let not_uuid = app
        .callback(CALLBACK_SECRET, json!({"deploymentId": "abc", "status": "SUCCESS"}))
        .await;
    assert_eq!(not_uuid.status, StatusCode::BAD_REQUEST);
    assert_eq!(not_uuid.body["message"], "deploymentId must be a UUID");

    let transient = app
        .callback(
            CALLBACK_SECRET,
            json!({"deploymentId": Uuid::new_v4(), "status": "BUILDING"}),
        )
        .await;
    assert_eq!(transient.status, StatusCode::BAD_REQUEST);
    assert_eq!(transient.body["details"]["field"], "status");

    let unknown = app
        .callback(
            CALLBACK_SECRET,
            json!({"deploymentId": Uuid::new_v4(), "status": "SUCCESS"}),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unset_callback_secret_rejects_everything() {
    let mut config = test_config();
    config.deploy_callback_secret = None;
    let app = TestApp::with_config(config).await.unwrap();

    let response = app
        .callback("", json!({"deploymentId": Uuid::new_v4(), "status": "SUCCESS"}))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}
