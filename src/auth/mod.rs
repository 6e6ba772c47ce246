//! # Identity and Session
//!
//! Credential verification, session minting and the extractors that answer
//! "who is the caller" for every administrative request.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use thiserror::Error;

use crate::error::{ApiError, RepositoryError, internal_error, unauthorized};
use crate::models::user;

pub mod password;
pub mod session;

pub use password::{hash_password, verify_password, verify_unknown_account};
pub use session::{SESSION_COOKIE, SessionKeys, SessionUser};

/// Message returned for every failed login, whatever the cause.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

/// Errors raised while authenticating a caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("failed to sign session token: {0}")]
    Token(#[source] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => unauthorized(Some(INVALID_CREDENTIALS_MESSAGE)),
            AuthError::Database(error) => RepositoryError::database_error(error).into(),
            other => {
                tracing::error!(error = %other, "Authentication failure");
                internal_error()
            }
        }
    }
}

/// Verify an email/password pair and mint a session token.
///
/// An unknown email, an inactive account and a wrong password all fail with
/// [`AuthError::InvalidCredentials`]. On success the user's last-login time is
/// refreshed.
pub async fn login(
    db: &DatabaseConnection,
    keys: &SessionKeys,
    email: &str,
    password: &str,
) -> Result<(SessionUser, String), AuthError> {
    let Some(account) = user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await?
    else {
        verify_unknown_account(password);
        tracing::info!("Login rejected: unknown account");
        return Err(AuthError::InvalidCredentials);
    };

    if !account.is_active || !verify_password(password, &account.password_hash) {
        tracing::info!(user_id = %account.id, "Login rejected");
        return Err(AuthError::InvalidCredentials);
    }

    let now = Utc::now();
    let mut active: user::ActiveModel = account.clone().into();
    active.last_login_at = Set(Some(now.into()));
    let account = active.update(db).await?;

    let session_user = SessionUser::from(&account);
    let token = keys.issue(&session_user)?;

    tracing::info!(
        user_id = %session_user.id,
        role = %session_user.role,
        tenant_id = ?session_user.tenant_id,
        "User logged in"
    );

    Ok((session_user, token))
}

/// Extractor for a request that must carry a valid session.
///
/// Rejects with 401 when the token is absent, malformed, forged or expired.
#[derive(Debug, Clone)]
pub struct Session(pub SessionUser);

/// Extractor resolving the caller's session, if any. Never rejects.
#[derive(Debug, Clone)]
pub struct OptionalSession(pub Option<SessionUser>);

impl<S> FromRequestParts<S> for OptionalSession
where
    SessionKeys: FromRef<S>,
    S: Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        Ok(OptionalSession(keys.session_from_headers(&parts.headers)))
    }
}

impl<S> FromRequestParts<S> for Session
where
    SessionKeys: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        keys.session_from_headers(&parts.headers)
            .map(Session)
            .ok_or_else(|| unauthorized(None))
    }
}
