//! Page management through the HTTP API.

mod test_utils;

use axum::http::StatusCode;
use cms::models::Role;
use serde_json::json;
use test_utils::{TestApp, id_of};

#[tokio::test]
async fn editor_creates_draft_with_defaults() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let editor = app.member(&acme, Role::Editor).await;

    let created = app
        .post(
            "/api/pages",
            Some(&app.token_for(&editor)),
            json!({"tenantId": acme.id, "slug": "about", "title": "About us"}),
        )
        .await;

    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["status"], "DRAFT");
    assert_eq!(created.body["template"], "default");
    assert_eq!(created.body["sortOrder"], 0);
    assert_eq!(created.body["content"], json!({}));
    assert_eq!(created.body["authorId"], editor.id.to_string());
    assert!(created.body["publishedAt"].is_null());
}

#[tokio::test]
async fn page_slug_is_unique_per_tenant_only() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let globex = app.tenant("Globex", "globex.test").await;
    let token = app.token_for(&app.super_admin().await);

    let first = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "contact", "title": "Contact"}),
        )
        .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let duplicate = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "contact", "title": "Contact again"}),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let elsewhere = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": globex.id, "slug": "contact", "title": "Contact"}),
        )
        .await;
    assert_eq!(elsewhere.status, StatusCode::CREATED);

    let renamed = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "Contact", "title": "Case differs"}),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::CREATED);
}

#[tokio::test]
async fn publishing_stamps_publish_time_once() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let token = app.token_for(&app.member(&acme, Role::Editor).await);

    let created = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "news-1", "title": "First"}),
        )
        .await;
    let uri = format!("/api/pages/{}", id_of(&created.body));

    let published = app
        .patch(&uri, Some(&token), json!({"status": "PUBLISHED"}))
        .await;
    assert_eq!(published.status, StatusCode::OK);
    let stamped = published.body["publishedAt"].as_str().unwrap().to_string();

    let retitled = app
        .patch(&uri, Some(&token), json!({"title": "First, revised", "status": "PUBLISHED"}))
        .await;
    assert_eq!(retitled.body["title"], "First, revised");
    assert_eq!(retitled.body["publishedAt"], stamped.as_str());
}

#[tokio::test]
async fn partial_update_clears_description_and_parent() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let token = app.token_for(&app.member(&acme, Role::Admin).await);

    let parent = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "services", "title": "Services"}),
        )
        .await;
    let child = app
        .post(
            "/api/pages",
            Some(&token),
            json!({
                "tenantId": acme.id,
                "slug": "consulting",
                "title": "Consulting",
                "description": "What we do",
                "parentId": parent.body["id"]
            }),
        )
        .await;
    assert_eq!(child.body["parentId"], parent.body["id"]);

    let untouched = app
        .patch(
            &format!("/api/pages/{}", id_of(&child.body)),
            Some(&token),
            json!({"sortOrder": 4}),
        )
        .await;
    assert_eq!(untouched.body["description"], "What we do");
    assert_eq!(untouched.body["parentId"], parent.body["id"]);

    let cleared = app
        .patch(
            &format!("/api/pages/{}", id_of(&child.body)),
            Some(&token),
            json!({"description": null, "parentId": null}),
        )
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert!(cleared.body["description"].is_null());
    assert!(cleared.body["parentId"].is_null());
    assert_eq!(cleared.body["sortOrder"], 4);
}

#[tokio::test]
async fn page_tree_rejects_cycles_and_foreign_parents() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let globex = app.tenant("Globex", "globex.test").await;
    let token = app.token_for(&app.super_admin().await);

    let top = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "top", "title": "Top"}),
        )
        .await;
    let below = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "below", "title": "Below", "parentId": top.body["id"]}),
        )
        .await;

    let onto_itself = app
        .patch(
            &format!("/api/pages/{}", id_of(&top.body)),
            Some(&token),
            json!({"parentId": top.body["id"]}),
        )
        .await;
    assert_eq!(onto_itself.status, StatusCode::BAD_REQUEST);
    assert_eq!(onto_itself.body["details"]["field"], "parentId");

    let onto_descendant = app
        .patch(
            &format!("/api/pages/{}", id_of(&top.body)),
            Some(&token),
            json!({"parentId": below.body["id"]}),
        )
        .await;
    assert_eq!(onto_descendant.status, StatusCode::BAD_REQUEST);

    let foreign = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": globex.id, "slug": "x", "title": "X", "parentId": top.body["id"]}),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::BAD_REQUEST);
    assert_eq!(foreign.body["message"], "Parent page not found");
}

#[tokio::test]
async fn deleting_parent_detaches_children() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let token = app.token_for(&app.member(&acme, Role::Editor).await);

    let parent = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "team", "title": "Team"}),
        )
        .await;
    let child = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "jobs", "title": "Jobs", "parentId": parent.body["id"]}),
        )
        .await;

    let deleted = app
        .delete(&format!("/api/pages/{}", id_of(&parent.body)), Some(&token))
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = app
        .get(&format!("/api/pages/{}", id_of(&parent.body)), Some(&token))
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    let orphan = app
        .get(&format!("/api/pages/{}", id_of(&child.body)), Some(&token))
        .await;
    assert_eq!(orphan.status, StatusCode::OK);
    assert!(orphan.body["parentId"].is_null());
}

#[tokio::test]
async fn content_must_be_a_document() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let token = app.token_for(&app.member(&acme, Role::Editor).await);

    let rejected = app
        .post(
            "/api/pages",
            Some(&token),
            json!({"tenantId": acme.id, "slug": "bad", "title": "Bad", "content": [1, 2]}),
        )
        .await;
    assert_eq!(rejected.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected.body["details"]["field"], "content");

    let encoded = app
        .post(
            "/api/pages",
            Some(&token),
            json!({
                "tenantId": acme.id,
                "slug": "encoded",
                "title": "Encoded",
                "content": "{\"html\":\"<p>Hi</p>\"}"
            }),
        )
        .await;
    assert_eq!(encoded.status, StatusCode::CREATED);
}

#[tokio::test]
async fn viewer_reads_but_cannot_write() {
    let app = TestApp::new().await.unwrap();
    let acme = app.tenant("Acme", "acme.test").await;
    let viewer = app.token_for(&app.member(&acme, Role::Viewer).await);

    let listed = app
        .get(&format!("/api/pages?tenantId={}", acme.id), Some(&viewer))
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body.as_array().unwrap().len(), 1);

    let index_id = id_of(&listed.body[0]);
    let write = app
        .patch(
            &format!("/api/pages/{index_id}"),
            Some(&viewer),
            json!({"title": "Hijacked"}),
        )
        .await;
    assert_eq!(write.status, StatusCode::FORBIDDEN);

    let create = app
        .post(
            "/api/pages",
            Some(&viewer),
            json!({"tenantId": acme.id, "slug": "new", "title": "New"}),
        )
        .await;
    assert_eq!(create.status, StatusCode::FORBIDDEN);
}
