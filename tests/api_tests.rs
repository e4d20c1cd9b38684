use idea_gateway::{
    AppConfig, AppState, Gateway, InMemoryTableStore, QueryComposer,
    auth::{Claims, JwtSessionVerifier, SESSION_AUDIENCE},
    classifier::RouteClassifier,
    create_router,
    generator::CannedGenerator,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use reqwest::{StatusCode, redirect::Policy};
use serde_json::{Value, json};
use std::{sync::Arc, time::SystemTime};
use tokio::net::TcpListener;

const U1: &str = "e2e-user-1";
const U2: &str = "e2e-user-2";

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
    pub jwt_secret: String,
}

impl TestApp {
    fn token(&self, user_id: &str) -> String {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + 3600,
            iat: Some(now),
            aud: Some(SESSION_AUDIENCE.to_string()),
            email: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .unwrap()
    }

    async fn data(&self, client: &reqwest::Client, user_id: &str, body: Value) -> reqwest::Response {
        client
            .post(format!("{}/api/data", self.address))
            .bearer_auth(self.token(user_id))
            .json(&body)
            .send()
            .await
            .expect("req fail")
    }
}

async fn spawn_app() -> TestApp {
    let config = AppConfig::default();
    let jwt_secret = config.jwt_secret.clone();

    let classifier = RouteClassifier::new(&config.routes).unwrap();
    let verifier = Arc::new(JwtSessionVerifier::new(&config.jwt_secret, &config.session_cookie));
    let gateway = Arc::new(Gateway::new(classifier, verifier, &config.routes));
    let composer = Arc::new(QueryComposer::new(
        config.tables.clone(),
        Arc::new(InMemoryTableStore::new()),
    ));

    let state = AppState {
        gateway,
        composer,
        generator: Arc::new(CannedGenerator),
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        jwt_secret,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_page_redirect_round_trip() {
    let app = spawn_app().await;
    let client = client();

    let response = client
        .get(format!("{}/dashboard", app.address))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()["location"].to_str().unwrap(),
        "/sign-in?redirect=%2Fdashboard"
    );

    let response = client
        .get(format!("{}/sign-in", app.address))
        .bearer_auth(app.token(U1))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()["location"].to_str().unwrap(), "/dashboard");
}

#[tokio::test]
async fn test_idea_lifecycle() {
    let app = spawn_app().await;
    let client = client();

    // 1. Create
    let response = app
        .data(
            &client,
            U1,
            json!({"action": "insert", "table": "ideas", "data": {"title": "LabSwap", "score": 6}}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let created: Value = response.json().await.unwrap();
    let id = created["data"]["id"].clone();
    assert_eq!(created["data"]["user_id"], json!(U1));

    // 2. Another user neither sees nor changes it
    let response = app
        .data(&client, U2, json!({"action": "select", "table": "ideas"}))
        .await;
    let listed: Value = response.json().await.unwrap();
    assert_eq!(listed["data"], json!([]));

    let response = app
        .data(
            &client,
            U2,
            json!({"action": "delete", "table": "ideas", "data": {"id": id}}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // 3. Owner updates it
    let response = app
        .data(
            &client,
            U1,
            json!({"action": "update", "table": "ideas", "data": {"id": id, "values": {"score": 8}}}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["data"]["score"], json!(8));

    // 4. Owner filters for it
    let response = app
        .data(
            &client,
            U1,
            json!({
                "action": "select",
                "table": "ideas",
                "data": {"select": "id, score", "filters": [{"column": "score", "operator": "gt", "value": 7}]}
            }),
        )
        .await;
    let listed: Value = response.json().await.unwrap();
    assert_eq!(listed["data"], json!([{"id": id, "score": 8}]));

    // 5. Owner deletes it
    let response = app
        .data(
            &client,
            U1,
            json!({"action": "delete", "table": "ideas", "data": {"id": id}}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .data(&client, U1, json!({"action": "select", "table": "ideas"}))
        .await;
    let listed: Value = response.json().await.unwrap();
    assert_eq!(listed["data"], json!([]));
}

#[tokio::test]
async fn test_api_without_session_is_401_not_redirect() {
    let app = spawn_app().await;
    let response = client()
        .post(format!("{}/api/data", app.address))
        .json(&json!({"action": "select", "table": "ideas"}))
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("Unauthorized"));
}
