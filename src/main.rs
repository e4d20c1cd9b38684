use idea_gateway::{
    AppState, Gateway, InMemoryTableStore, PostgresTableStore, QueryComposer,
    auth::{JwtSessionVerifier, SessionState, SupabaseSessionVerifier},
    classifier::RouteClassifier,
    config::{AppConfig, Env, SessionMode},
    create_router,
    generator::{CannedGenerator, GeneratorState, OpenAiGenerator},
    ownership::OwnershipMode,
    repository::StoreState,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point for the gateway, responsible for initializing all
/// collaborators: Configuration, Logging, Table Store, Session Verifier, Generator,
/// and the HTTP Server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise sensible defaults for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "idea_gateway=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON output for log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Gateway starting in {:?} mode", config.env);

    // 4. Route Classification (validated before anything listens)
    let classifier = RouteClassifier::new(&config.routes)
        .unwrap_or_else(|e| panic!("FATAL: invalid route configuration: {}", e));

    // 5. Table Store Initialization
    let store: StoreState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            let store = PostgresTableStore::new(pool);
            store
                .verify_registry(&config.tables)
                .await
                .unwrap_or_else(|e| panic!("FATAL: RESOURCE_TABLES does not match the database: {}", e));
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory table store");
            Arc::new(InMemoryTableStore::new())
        }
    };

    // 6. Session Verifier
    let verifier: SessionState = match config.session_mode {
        SessionMode::Remote => Arc::new(
            SupabaseSessionVerifier::new(
                &config.supabase_url,
                &config.supabase_anon_key,
                &config.session_cookie,
            )
            .expect("FATAL: Failed to build the identity provider client."),
        ),
        SessionMode::Jwt => Arc::new(JwtSessionVerifier::new(
            &config.jwt_secret,
            &config.session_cookie,
        )),
    };
    tracing::info!("Session verification mode: {:?}", config.session_mode);

    // 7. Blueprint Generator
    let generator: GeneratorState = match &config.openai {
        Some(openai) => Arc::new(
            OpenAiGenerator::new(openai).expect("FATAL: Failed to build the generation client."),
        ),
        None => {
            // Only reachable locally; production requires OPENAI_API_KEY.
            tracing::warn!("OPENAI_API_KEY not set; using the canned blueprint generator");
            Arc::new(CannedGenerator)
        }
    };

    // 8. Unified State Assembly
    let gateway = Arc::new(Gateway::new(classifier, verifier, &config.routes));
    let composer = Arc::new(QueryComposer::new(config.tables.clone(), store));

    for (table, mode) in composer.registry().tables() {
        match mode {
            OwnershipMode::OwnedByColumn(column) => {
                tracing::info!("Registered table `{}` owned by `{}`", table, column)
            }
            OwnershipMode::Unowned => tracing::info!("Registered table `{}` (unowned)", table),
        }
    }

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        gateway,
        composer,
        generator,
        config,
    };

    // 9. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Failed to bind {}: {}", bind_addr, e));

    tracing::info!("HTTP server bound successfully.");
    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app).await.expect("FATAL: HTTP server terminated.");
}
