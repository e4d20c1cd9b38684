use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

use crate::{error::GatewayError, models::Identity};

/// SessionVerifier Trait
///
/// Resolves a request's credentials to an `Identity`, or `None`.
///
/// The identity provider is the sole source of truth. Every provider failure (expired,
/// malformed, network error) is reported as `None`: verification is fail-closed and never
/// produces an error that could change how the dispatcher enforces a posture. Deciding
/// access is the dispatcher's job, not the verifier's.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn verify(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// SessionState
///
/// The concrete type used to share the verifier across the application state.
pub type SessionState = Arc<dyn SessionVerifier>;

/// session_token
///
/// Credential extraction: `Authorization: Bearer <token>` first, then the session cookie.
pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

// --- Remote verification (Supabase GoTrue) ---

/// SupabaseUser
///
/// The fields we read from `GET /auth/v1/user`.
#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
}

/// SupabaseSessionVerifier
///
/// Asks the provider's user endpoint about every session token. Token refresh is the
/// provider's concern; this verifier only reads.
pub struct SupabaseSessionVerifier {
    client: reqwest::Client,
    user_url: String,
    anon_key: String,
    cookie_name: String,
}

impl SupabaseSessionVerifier {
    pub fn new(
        supabase_url: &str,
        anon_key: &str,
        cookie_name: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            user_url: format!("{}/auth/v1/user", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
            cookie_name: cookie_name.to_string(),
        })
    }
}

#[async_trait]
impl SessionVerifier for SupabaseSessionVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = session_token(headers, &self.cookie_name)?;

        let response = match self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("identity provider unreachable: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "identity provider rejected session");
            return None;
        }

        match response.json::<SupabaseUser>().await {
            Ok(user) if !user.id.is_empty() => Some(Identity {
                id: user.id,
                email: user.email,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("identity provider returned an unreadable user: {}", e);
                None
            }
        }
    }
}

// --- Local verification of provider-signed tokens ---

/// Claims
///
/// Payload of a provider-issued access token. `sub` is the user's stable id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Audience the provider stamps on end-user access tokens.
pub const SESSION_AUDIENCE: &str = "authenticated";

/// JwtSessionVerifier
///
/// Checks the provider's HS256 signature with the provider's shared secret. Expiry is
/// always validated.
pub struct JwtSessionVerifier {
    key: DecodingKey,
    validation: Validation,
    cookie_name: String,
}

impl JwtSessionVerifier {
    pub fn new(secret: &str, cookie_name: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[SESSION_AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            cookie_name: cookie_name.to_string(),
        }
    }
}

#[async_trait]
impl SessionVerifier for JwtSessionVerifier {
    async fn verify(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = session_token(headers, &self.cookie_name)?;
        match decode::<Claims>(&token, &self.key, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() => Some(Identity {
                id: data.claims.sub,
                email: data.claims.email,
            }),
            Ok(_) => None,
            Err(e) => {
                // Expired, bad signature, wrong audience, malformed: all the same outcome.
                tracing::debug!("session token rejected: {:?}", e.kind());
                None
            }
        }
    }
}

// --- Extractor ---

/// Identity Extractor Implementation
///
/// Reads the identity the gateway middleware attached to the request. Handlers on protected
/// API routes take `Identity` as an argument; if the middleware did not attach one, the
/// request is rejected with 401 rather than reaching the handler body.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(GatewayError::Unauthenticated)
    }
}
