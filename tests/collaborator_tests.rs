use axum::http::{HeaderMap, HeaderValue, header};
use idea_gateway::{
    auth::{SessionVerifier, SupabaseSessionVerifier, session_token},
    config::OpenAiConfig,
    error::GatewayError,
    generator::{BlueprintGenerator, GenerationError, OpenAiGenerator},
};
use serde_json::json;
use wiremock::matchers::{bearer_token, body_partial_json, header as header_is, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(name, HeaderValue::from_str(value).unwrap());
    headers
}

// --- Credential Extraction ---

#[test]
fn test_session_token_prefers_bearer_over_cookie() {
    let mut headers = headers_with(header::AUTHORIZATION, "Bearer from-header");
    headers.insert(
        header::COOKIE,
        HeaderValue::from_static("sb-access-token=from-cookie"),
    );
    assert_eq!(
        session_token(&headers, "sb-access-token").as_deref(),
        Some("from-header")
    );
}

#[test]
fn test_session_token_reads_named_cookie() {
    let headers = headers_with(header::COOKIE, "a=1; sb-access-token=abc.def; b=2");
    assert_eq!(
        session_token(&headers, "sb-access-token").as_deref(),
        Some("abc.def")
    );
    assert_eq!(session_token(&headers, "other"), None);
}

#[test]
fn test_session_token_decodes_percent_encoded_cookie() {
    let headers = headers_with(header::COOKIE, "sb-access-token=a%2Eb%2Ec");
    assert_eq!(
        session_token(&headers, "sb-access-token").as_deref(),
        Some("a.b.c")
    );
}

#[test]
fn test_session_token_ignores_empty_or_foreign_schemes() {
    assert_eq!(
        session_token(&headers_with(header::AUTHORIZATION, "Basic dXNlcjpwdw=="), "c"),
        None
    );
    assert_eq!(
        session_token(&headers_with(header::AUTHORIZATION, "Bearer "), "c"),
        None
    );
    assert_eq!(session_token(&headers_with(header::COOKIE, "c="), "c"), None);
}

// --- Remote Session Verification ---

#[tokio::test]
async fn test_supabase_verifier_resolves_identity() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header_is("apikey", "anon-key"))
        .and(bearer_token("good-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "email": "founder@example.com",
            "aud": "authenticated",
            "role": "authenticated"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let verifier =
        SupabaseSessionVerifier::new(&mock_server.uri(), "anon-key", "sb-access-token").unwrap();
    let identity = verifier
        .verify(&headers_with(header::AUTHORIZATION, "Bearer good-token"))
        .await
        .unwrap();

    assert_eq!(identity.id, "user-1");
    assert_eq!(identity.email.as_deref(), Some("founder@example.com"));
}

#[tokio::test]
async fn test_supabase_verifier_rejected_session_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "msg": "invalid JWT"
        })))
        .mount(&mock_server)
        .await;

    let verifier =
        SupabaseSessionVerifier::new(&mock_server.uri(), "anon-key", "sb-access-token").unwrap();
    let identity = verifier
        .verify(&headers_with(header::COOKIE, "sb-access-token=expired"))
        .await;

    assert!(identity.is_none());
}

#[tokio::test]
async fn test_supabase_verifier_without_credentials_makes_no_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let verifier =
        SupabaseSessionVerifier::new(&mock_server.uri(), "anon-key", "sb-access-token").unwrap();
    assert!(verifier.verify(&HeaderMap::new()).await.is_none());
}

#[tokio::test]
async fn test_supabase_verifier_unreachable_provider_is_none() {
    // Nothing listens on this port.
    let verifier =
        SupabaseSessionVerifier::new("http://127.0.0.1:9", "anon-key", "sb-access-token").unwrap();
    let identity = verifier
        .verify(&headers_with(header::AUTHORIZATION, "Bearer token"))
        .await;
    assert!(identity.is_none());
}

#[tokio::test]
async fn test_supabase_verifier_unreadable_body_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&mock_server)
        .await;

    let verifier =
        SupabaseSessionVerifier::new(&mock_server.uri(), "anon-key", "sb-access-token").unwrap();
    let identity = verifier
        .verify(&headers_with(header::AUTHORIZATION, "Bearer token"))
        .await;
    assert!(identity.is_none());
}

// --- Blueprint Generation ---

fn openai_config(server: &MockServer) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "sk-test".to_string(),
        base_url: format!("{}/v1", server.uri()),
        model: "gpt-4o-mini".to_string(),
    }
}

#[tokio::test]
async fn test_openai_generator_parses_json_completion() {
    let mock_server = MockServer::start().await;

    let blueprint = json!({
        "title": "LabSwap",
        "summary": "Marketplace for used lab equipment",
        "target_audience": "Research labs",
        "problems": ["Equipment sits idle"],
        "features": ["Listings", "Escrow"],
        "revenue_streams": ["Commission"],
        "risks": ["Shipping fragile goods"],
        "next_steps": ["Interview lab managers"]
    });

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(bearer_token("sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": blueprint.to_string() } }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let generator = OpenAiGenerator::new(&openai_config(&mock_server)).unwrap();
    let result = generator.generate("LabSwap", "Research labs").await.unwrap();

    assert_eq!(result.title, "LabSwap");
    assert_eq!(result.features, vec!["Listings", "Escrow"]);
}

#[tokio::test]
async fn test_openai_generator_provider_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&mock_server)
        .await;

    let generator = OpenAiGenerator::new(&openai_config(&mock_server)).unwrap();
    let err = generator.generate("idea", "audience").await.unwrap_err();

    assert!(matches!(err, GenerationError::Provider { status: 429, .. }));
    let surfaced: GatewayError = err.into();
    assert!(matches!(surfaced, GatewayError::ExternalFailure(_)));
}

#[tokio::test]
async fn test_openai_generator_malformed_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "not json at all" } }]
        })))
        .mount(&mock_server)
        .await;

    let generator = OpenAiGenerator::new(&openai_config(&mock_server)).unwrap();
    let err = generator.generate("idea", "audience").await.unwrap_err();
    assert!(matches!(err, GenerationError::Malformed(_)));
}
