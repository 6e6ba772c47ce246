//! Signed session tokens and the cookie channel that carries them.
//!
//! A session is an HS256 JWT holding the user's id, email, name, role and
//! tenant. Tokens are stateless: there is no server-side session store, no
//! refresh and no rotation.

use std::sync::Arc;

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::AuthError;
use crate::config::AppConfig;
use crate::crypto::{CryptoError, ZeroizingKey};
use crate::models::{Role, user};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// The authenticated caller, as recorded in the session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    /// Absent only for SUPER_ADMIN
    pub tenant_id: Option<Uuid>,
}

impl From<&user::Model> for SessionUser {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role(),
            tenant_id: user.tenant_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: Uuid,
    email: String,
    name: Option<String>,
    role: Role,
    tenant_id: Option<Uuid>,
    iat: i64,
    exp: i64,
}

/// Keys and cookie policy for minting and checking session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    inner: Arc<SessionKeysInner>,
}

struct SessionKeysInner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: u64,
    secure_cookie: bool,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("ttl_seconds", &self.inner.ttl_seconds)
            .field("secure_cookie", &self.inner.secure_cookie)
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    pub fn new(secret: &ZeroizingKey, ttl_seconds: u64, secure_cookie: bool) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            inner: Arc::new(SessionKeysInner {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
                validation,
                ttl_seconds,
                secure_cookie,
            }),
        }
    }

    /// Build keys from the configured secret; cookies are `Secure` in production.
    pub fn from_config(config: &AppConfig) -> Result<Self, CryptoError> {
        let secret = ZeroizingKey::new(config.session_signing_secret())?;
        Ok(Self::new(
            &secret,
            config.session_ttl_seconds,
            config.is_production(),
        ))
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.inner.ttl_seconds
    }

    /// Mint a token for `user`, valid for the configured TTL from now.
    pub fn issue(&self, user: &SessionUser) -> Result<String, AuthError> {
        self.issue_at(user, Utc::now())
    }

    /// Mint a token as if issued at `issued_at`.
    pub fn issue_at(
        &self,
        user: &SessionUser,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let ttl = Duration::seconds(i64::try_from(self.inner.ttl_seconds).unwrap_or(i64::MAX / 2));
        let claims = SessionClaims {
            sub: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            tenant_id: user.tenant_id,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.inner.encoding)
            .map_err(AuthError::Token)
    }

    /// Check a token. Anything other than a well-formed, correctly signed,
    /// unexpired token yields `None`.
    pub fn verify(&self, token: &str) -> Option<SessionUser> {
        match decode::<SessionClaims>(token, &self.inner.decoding, &self.inner.validation) {
            Ok(data) => Some(SessionUser {
                id: data.claims.sub,
                email: data.claims.email,
                name: data.claims.name,
                role: data.claims.role,
                tenant_id: data.claims.tenant_id,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected session token");
                None
            }
        }
    }

    /// Resolve the caller from request headers; never fails.
    pub fn session_from_headers(&self, headers: &HeaderMap) -> Option<SessionUser> {
        token_from_headers(headers).and_then(|token| self.verify(token))
    }

    /// `Set-Cookie` value establishing a session.
    pub fn session_cookie(&self, token: &str) -> String {
        self.cookie(token, self.inner.ttl_seconds)
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn expired_cookie(&self) -> String {
        self.cookie("", 0)
    }

    fn cookie(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE}={value}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}"
        );
        if self.inner.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Session token from the `session` cookie, or from a Bearer Authorization header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    cookie_value(headers, SESSION_COOKIE).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    })
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}
