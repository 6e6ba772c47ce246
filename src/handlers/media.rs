//! # Media API Handlers

use axum::{
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::auth::Session;
use crate::error::{ApiError, field_error};
use crate::handlers::types::DeleteMediaRequest;
use crate::media::{MediaError, StoredObject};
use crate::policy;
use crate::server::AppState;

struct UploadForm {
    tenant_id: Option<Uuid>,
    file: Option<(String, String, Bytes)>,
}

fn multipart_error(error: MultipartError, max_bytes: usize) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return MediaError::TooLarge { max_bytes }.into();
    }
    tracing::debug!(error = %error, "Malformed multipart body");
    field_error("file", "Malformed multipart body")
}

async fn read_form(mut multipart: Multipart, max_bytes: usize) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm {
        tenant_id: None,
        file: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        match field.name() {
            Some("tenantId") => {
                let text = field.text().await.map_err(|e| multipart_error(e, max_bytes))?;
                let tenant_id = text
                    .trim()
                    .parse()
                    .map_err(|_| field_error("tenantId", "tenantId must be a UUID"))?;
                form.tenant_id = Some(tenant_id);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_bytes))?;
                form.file = Some((file_name, content_type, bytes));
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Upload an image for a tenant
#[utoipa::path(
    post,
    path = "/api/upload",
    security(("session_cookie" = [])),
    request_body(content_type = "multipart/form-data", description = "Fields `file` and `tenantId`"),
    responses(
        (status = 200, description = "Stored object", body = StoredObject),
        (status = 400, description = "Missing file, unsupported type or too large", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Tenant outside the caller's scope", body = ApiError),
        (status = 502, description = "Upload failed", body = ApiError)
    ),
    tag = "media"
)]
pub async fn upload(
    State(state): State<AppState>,
    Session(session): Session,
    multipart: Multipart,
) -> Result<Json<StoredObject>, ApiError> {
    let max_bytes = state.media.max_upload_bytes();
    let form = read_form(multipart, max_bytes).await?;

    let tenant_id = form
        .tenant_id
        .ok_or_else(|| field_error("tenantId", "tenantId is required"))?;
    policy::require_tenant(&session, tenant_id)?;
    let (file_name, content_type, bytes) = form.file.ok_or(MediaError::Missing)?;

    let stored = state
        .media
        .upload(tenant_id, &file_name, &content_type, bytes)
        .await?;
    Ok(Json(stored))
}

/// Delete an uploaded object of a tenant
#[utoipa::path(
    delete,
    path = "/api/upload",
    security(("session_cookie" = [])),
    request_body = DeleteMediaRequest,
    responses(
        (status = 204, description = "Object deleted"),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Tenant outside the caller's scope", body = ApiError),
        (status = 404, description = "Object not owned by this tenant", body = ApiError),
        (status = 502, description = "Storage failure", body = ApiError)
    ),
    tag = "media"
)]
pub async fn delete_upload(
    State(state): State<AppState>,
    Session(session): Session,
    payload: Result<Json<DeleteMediaRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    policy::require_tenant(&session, request.tenant_id)?;

    state.media.remove(request.tenant_id, &request.url).await?;
    Ok(StatusCode::NO_CONTENT)
}
