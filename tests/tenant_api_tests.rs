//! Tenant registry through the HTTP API.

mod test_utils;

use axum::http::StatusCode;
use cms::models::Role;
use serde_json::json;
use test_utils::{TestApp, id_of};

#[tokio::test]
async fn super_admin_creates_tenant_with_index_page() {
    let app = TestApp::new().await.unwrap();
    let root = app.super_admin().await;
    let token = app.token_for(&root);

    let created = app
        .post(
            "/api/tenants",
            Some(&token),
            json!({
                "name": "Café Zürich",
                "domain": "Cafe.Example.com",
                "domains": ["www.cafe.example.com"],
                "settings": {"primaryColor": "#112233"}
            }),
        )
        .await;

    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["slug"], "cafe-zurich");
    assert_eq!(created.body["domain"], "cafe.example.com");
    let api_key = created.body["apiKey"].as_str().unwrap();
    assert!(api_key.starts_with("sk_"));
    assert_eq!(api_key.len(), 35);

    let tenant_id = id_of(&created.body);
    assert_eq!(
        created.header("location"),
        Some(format!("/api/tenants/{tenant_id}").as_str())
    );

    let pages = app
        .get(&format!("/api/pages?tenantId={tenant_id}"), Some(&token))
        .await;
    assert_eq!(pages.status, StatusCode::OK);
    let pages = pages.body.as_array().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0]["slug"], "index");
    assert_eq!(pages[0]["status"], "PUBLISHED");
    assert!(!pages[0]["publishedAt"].is_null());
}

#[tokio::test]
async fn duplicate_slug_or_domain_conflicts() {
    let app = TestApp::new().await.unwrap();
    let token = app.token_for(&app.super_admin().await);

    let first = app
        .post(
            "/api/tenants",
            Some(&token),
            json!({"name": "Acme", "domain": "acme.test"}),
        )
        .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let same_slug = app
        .post(
            "/api/tenants",
            Some(&token),
            json!({"name": "ACME", "domain": "other.test"}),
        )
        .await;
    assert_eq!(same_slug.status, StatusCode::CONFLICT);

    let same_domain = app
        .post(
            "/api/tenants",
            Some(&token),
            json!({"name": "Acme Two", "domain": "ACME.test"}),
        )
        .await;
    assert_eq!(same_domain.status, StatusCode::CONFLICT);
    assert_eq!(same_domain.body["code"], "CONFLICT");

    let distinct = app
        .post(
            "/api/tenants",
            Some(&token),
            json!({"name": "Globex", "domain": "globex.test"}),
        )
        .await;
    assert_eq!(distinct.status, StatusCode::CREATED);
    assert_ne!(distinct.body["apiKey"], first.body["apiKey"]);
}

#[tokio::test]
async fn tenant_creation_validates_input() {
    let app = TestApp::new().await.unwrap();
    let token = app.token_for(&app.super_admin().await);

    let missing_name = app
        .post(
            "/api/tenants",
            Some(&token),
            json!({"name": "  ", "domain": "blank.test"}),
        )
        .await;
    assert_eq!(missing_name.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing_name.body["details"]["field"], "name");

    let bad_repository = app
        .post(
            "/api/tenants",
            Some(&token),
            json!({"name": "Repo", "domain": "repo.test", "buildRepository": "not a repo"}),
        )
        .await;
    assert_eq!(bad_repository.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_repository.body["details"]["field"], "buildRepository");
}

#[tokio::test]
async fn only_super_admin_creates_tenants() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let admin = app.member(&acme, Role::Admin).await;

    let response = app
        .post(
            "/api/tenants",
            Some(&app.token_for(&admin)),
            json!({"name": "Rogue", "domain": "rogue.test"}),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let anonymous = app
        .post("/api/tenants", None, json!({"name": "Anon", "domain": "anon.test"}))
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn listing_is_scoped_by_role() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let globex = app.tenant("Globex", "globex.test").await;
    let editor = app.member(&acme, Role::Editor).await;
    let root = app.super_admin().await;

    let all = app.get("/api/tenants", Some(&app.token_for(&root))).await;
    assert_eq!(all.status, StatusCode::OK);
    let names: Vec<&str> = all
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|tenant| tenant["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Acme", "Globex"]);
    assert_eq!(all.body[0]["pageCount"], 1);
    assert_eq!(all.body[0]["userCount"], 1);

    let own = app.get("/api/tenants", Some(&app.token_for(&editor))).await;
    let own = own.body.as_array().unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0]["id"], acme.id.to_string());
    assert!(own[0].get("apiKey").is_none());

    let foreign = app
        .get(
            &format!("/api/tenants/{}", globex.id),
            Some(&app.token_for(&editor)),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn super_admin_updates_tenant() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let token = app.token_for(&app.super_admin().await);

    let updated = app
        .patch(
            &format!("/api/tenants/{}", acme.id),
            Some(&token),
            json!({
                "name": "Acme Corp",
                "domains": ["www.acme.test"],
                "buildRepository": "acme/site",
                "isActive": false
            }),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["name"], "Acme Corp");
    assert_eq!(updated.body["slug"], "acme");
    assert_eq!(updated.body["domains"], json!(["www.acme.test"]));
    assert_eq!(updated.body["buildRepository"], "acme/site");
    assert_eq!(updated.body["isActive"], false);

    let cleared = app
        .patch(
            &format!("/api/tenants/{}", acme.id),
            Some(&token),
            json!({"buildRepository": null}),
        )
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert!(cleared.body["buildRepository"].is_null());
    assert_eq!(cleared.body["name"], "Acme Corp");
}

#[tokio::test]
async fn tenant_admin_rotates_api_key() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let admin = app.member(&acme, Role::Admin).await;
    let editor = app.member(&acme, Role::Editor).await;
    let uri = format!("/api/tenants/{}/api-key", acme.id);

    let denied = app.post(&uri, Some(&app.token_for(&editor)), json!({})).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let rotated = app.post(&uri, Some(&app.token_for(&admin)), json!({})).await;
    assert_eq!(rotated.status, StatusCode::OK);
    let new_key = rotated.body["apiKey"].as_str().unwrap().to_string();
    assert_ne!(new_key, acme.api_key);

    let old = app.public_get("/api/public/menu", &acme.api_key).await;
    assert_eq!(old.status, StatusCode::UNAUTHORIZED);
    let new = app.public_get("/api/public/menu", &new_key).await;
    assert_eq!(new.status, StatusCode::OK);
}
