use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use url::form_urlencoded;

use crate::{
    auth::SessionState,
    classifier::{Posture, RouteClassifier},
    config::RouteConfig,
    error::GatewayError,
    models::Identity,
};

/// Name of the query parameter carrying the originally requested path to the sign-in page.
pub const RETURN_TARGET_PARAM: &str = "redirect";

/// GatewayDecision
///
/// The single terminal outcome of the per-request state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    /// Pass through; the identity (if any) is attached for downstream handlers.
    Allow(Option<Identity>),
    /// Protected API without identity: 401, never a redirect.
    Unauthorized,
    /// Protected page without identity.
    RedirectToSignIn { return_to: String },
    /// Signed-in user asking for an auth form.
    RedirectToDashboard,
}

/// Gateway
///
/// Composes the route classifier and the session verifier into one authorization decision
/// per request. Holds no mutable state; nothing survives between requests except the
/// provider-managed session.
pub struct Gateway {
    classifier: RouteClassifier,
    verifier: SessionState,
    sign_in_path: String,
    dashboard_path: String,
}

/// GatewayState
///
/// Shared handle consumed by `gateway_middleware`.
pub type GatewayState = Arc<Gateway>;

impl Gateway {
    pub fn new(classifier: RouteClassifier, verifier: SessionState, routes: &RouteConfig) -> Self {
        Self {
            classifier,
            verifier,
            sign_in_path: routes.sign_in_path.clone(),
            dashboard_path: routes.dashboard_path.clone(),
        }
    }

    pub fn posture(&self, path: &str) -> Posture {
        self.classifier.classify(path)
    }

    /// decide
    ///
    /// 1. Public (and not an auth page) → allow, no session lookup.
    /// 2. Verify the session.
    /// 3. Protected API without identity → `Unauthorized`.
    /// 4. Protected page without identity → `RedirectToSignIn`.
    /// 5. Identity on a sign-in/sign-up page → `RedirectToDashboard`.
    /// 6. Otherwise allow with the identity.
    pub async fn decide(&self, path: &str, headers: &HeaderMap) -> GatewayDecision {
        let posture = self.posture(path);
        let auth_page = self.classifier.is_auth_page(path);

        if posture == Posture::Public && !auth_page {
            return GatewayDecision::Allow(None);
        }

        let identity = self.verifier.verify(headers).await;

        match (posture, identity) {
            (Posture::ProtectedApi, None) => GatewayDecision::Unauthorized,
            (Posture::ProtectedPage, None) => GatewayDecision::RedirectToSignIn {
                return_to: path.to_string(),
            },
            (_, Some(_)) if auth_page => GatewayDecision::RedirectToDashboard,
            (_, identity) => GatewayDecision::Allow(identity),
        }
    }

    /// Sign-in location carrying the return target, e.g. `/sign-in?redirect=%2Fdashboard`.
    pub fn sign_in_location(&self, return_to: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(RETURN_TARGET_PARAM, return_to)
            .finish();
        format!("{}?{}", self.sign_in_path, query)
    }
}

/// gateway_middleware
///
/// Applied to the whole router. Turns the `GatewayDecision` into either a terminal response
/// or a pass-through with the resolved `Identity` placed in the request extensions.
pub async fn gateway_middleware(
    State(gateway): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let decision = gateway.decide(&path, request.headers()).await;

    match decision {
        GatewayDecision::Allow(identity) => {
            // Never trust an identity that arrived with the request itself.
            request.extensions_mut().remove::<Identity>();
            if let Some(identity) = identity {
                tracing::debug!(path = %path, user = %identity.id, "request allowed");
                request.extensions_mut().insert(identity);
            }
            next.run(request).await
        }
        GatewayDecision::Unauthorized => {
            tracing::debug!(path = %path, "protected API request without session");
            GatewayError::Unauthenticated.into_response()
        }
        GatewayDecision::RedirectToSignIn { return_to } => {
            tracing::debug!(path = %path, "protected page without session, redirecting to sign-in");
            Redirect::temporary(&gateway.sign_in_location(&return_to)).into_response()
        }
        GatewayDecision::RedirectToDashboard => {
            tracing::debug!(path = %path, "signed-in user on auth page, redirecting to dashboard");
            Redirect::temporary(&gateway.dashboard_path).into_response()
        }
    }
}
