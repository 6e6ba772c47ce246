//! # Deploy API Handlers
//!
//! Build triggering and history for editors, plus the callback through which
//! the CI system reports a build's outcome. The callback is the only endpoint
//! authenticated by shared secret instead of a session.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use uuid::Uuid;

use crate::auth::Session;
use crate::deploy::{CallbackOutcome, DeployError};
use crate::error::{ApiError, RepositoryError, field_error};
use crate::handlers::types::{
    DeployAccepted, DeployCallbackRequest, DeployCallbackResponse, DeployRequest,
    DeploymentListQuery, DeploymentResponse,
};
use crate::models::DeploymentStatus;
use crate::policy;
use crate::repositories::TransitionDetails;
use crate::server::AppState;

/// Header carrying the deploy callback secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

const DEFAULT_HISTORY_LIMIT: u64 = 20;
const MAX_HISTORY_LIMIT: u64 = 100;

/// Start a build of a tenant's site
///
/// Returns as soon as the PENDING deployment is recorded; the build runs in
/// the background.
#[utoipa::path(
    post,
    path = "/api/deploy",
    security(("session_cookie" = [])),
    request_body = DeployRequest,
    responses(
        (status = 202, description = "Deployment recorded", body = DeployAccepted),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Caller may not deploy this tenant", body = ApiError),
        (status = 404, description = "Tenant not found", body = ApiError)
    ),
    tag = "deploy"
)]
pub async fn trigger_deploy(
    State(state): State<AppState>,
    Session(session): Session,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DeployAccepted>), ApiError> {
    let Json(request) = payload?;
    policy::require_page_editor(&session, request.tenant_id)?;

    let deployment = state
        .deployments
        .trigger(request.tenant_id, Some((session.id, session.email.as_str())))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DeployAccepted {
            deployment_id: deployment.id,
            status: deployment.status(),
        }),
    ))
}

/// Report the outcome of a build
#[utoipa::path(
    post,
    path = "/api/deploy/callback",
    request_body = DeployCallbackRequest,
    params(("X-Webhook-Secret" = String, Header, description = "Shared deploy callback secret")),
    responses(
        (status = 200, description = "Outcome recorded, or ignored for a finished deployment", body = DeployCallbackResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Invalid webhook secret", body = ApiError),
        (status = 404, description = "Deployment not found", body = ApiError)
    ),
    tag = "deploy"
)]
pub async fn deploy_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DeployCallbackRequest>, JsonRejection>,
) -> Result<Json<DeployCallbackResponse>, ApiError> {
    let secret = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if !state.deployments.verify_callback_secret(secret) {
        return Err(DeployError::InvalidSecret.into());
    }

    let Json(request) = payload?;
    let deployment_id = request
        .deployment_id
        .as_deref()
        .ok_or_else(|| field_error("deploymentId", "deploymentId is required"))?
        .parse::<Uuid>()
        .map_err(|_| field_error("deploymentId", "deploymentId must be a UUID"))?;
    let status = request
        .status
        .as_deref()
        .and_then(|status| status.parse::<DeploymentStatus>().ok())
        .filter(DeploymentStatus::is_terminal)
        .ok_or_else(|| field_error("status", "status must be SUCCESS or FAILED"))?;

    let outcome = state
        .deployments
        .handle_callback(
            secret,
            deployment_id,
            status,
            TransitionDetails {
                build_log: request.build_log,
                duration: request.duration,
            },
        )
        .await?;

    let response = match outcome {
        CallbackOutcome::Applied(deployment) => DeployCallbackResponse {
            applied: true,
            status: deployment.status(),
        },
        CallbackOutcome::AlreadyTerminal(status) => DeployCallbackResponse {
            applied: false,
            status,
        },
    };
    Ok(Json(response))
}

/// Deployment history of a tenant
#[utoipa::path(
    get,
    path = "/api/deployments",
    security(("session_cookie" = [])),
    params(DeploymentListQuery),
    responses(
        (status = 200, description = "Deployments, newest first", body = Vec<DeploymentResponse>),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 403, description = "Tenant outside the caller's scope", body = ApiError)
    ),
    tag = "deploy"
)]
pub async fn list_deployments(
    State(state): State<AppState>,
    Session(session): Session,
    Query(query): Query<DeploymentListQuery>,
) -> Result<Json<Vec<DeploymentResponse>>, ApiError> {
    let tenant_id = policy::listing_scope(&session, query.tenant_id)?
        .ok_or_else(|| field_error("tenantId", "tenantId is required"))?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let deployments = state
        .deployments
        .deployments()
        .list_for_tenant(tenant_id, limit)
        .await?;
    Ok(Json(deployments.into_iter().map(DeploymentResponse::from).collect()))
}

/// Get a deployment by ID
#[utoipa::path(
    get,
    path = "/api/deployments/{id}",
    security(("session_cookie" = [])),
    params(("id" = Uuid, Path, description = "Deployment UUID")),
    responses(
        (status = 200, description = "Deployment", body = DeploymentResponse),
        (status = 401, description = "No valid session", body = ApiError),
        (status = 404, description = "Deployment not found", body = ApiError)
    ),
    tag = "deploy"
)]
pub async fn get_deployment(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<Uuid>,
) -> Result<Json<DeploymentResponse>, ApiError> {
    let deployment = state
        .deployments
        .deployments()
        .find_by_id(id)
        .await?
        .ok_or_else(|| RepositoryError::not_found("Deployment"))?;
    policy::require_visible(&session, deployment.tenant_id, "Deployment")?;
    Ok(Json(deployment.into()))
}
