/// Router Module Index
///
/// Routers are grouped by the posture the gateway classifier assigns to their paths.
/// The gateway middleware wraps the merged router, so a route's protection comes from
/// its path (see `classifier`), and protected handlers additionally require `Identity`.

/// Routes under the public route set (no session needed).
pub mod public;

/// Routes under the protected-API prefix. Unauthenticated callers get 401 JSON.
pub mod api;
