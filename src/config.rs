use std::env;
use thiserror::Error;

use crate::ownership::OwnershipRegistry;

/// ConfigError
///
/// Static-configuration faults. All of them are raised at startup, never per request.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid route pattern `{0}` (expected `/literal` or `/prefix/*`)")]
    InvalidRoutePattern(String),

    #[error("public route `{route}` is shadowed by protected API prefix `{prefix}`")]
    ShadowedPublicRoute { route: String, prefix: String },

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("table `{0}` is registered more than once")]
    DuplicateTable(String),

    #[error("no resource tables are registered")]
    EmptyRegistry,

    #[error("unsupported value `{value}` for {var}")]
    UnsupportedValue { var: &'static str, value: String },
}

/// AppConfig
///
/// Holds the gateway's entire configuration. Loaded once at process start and immutable
/// afterwards; pieces of it are handed to the collaborators built in `main`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls logging format and local fallbacks.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Postgres connection string for the table store. `None` selects the in-memory store (local only).
    pub db_url: Option<String>,
    // Identity provider project URL (Supabase).
    pub supabase_url: String,
    // Project API key sent alongside remote session lookups.
    pub supabase_anon_key: String,
    // Provider secret used to verify session tokens in `SessionMode::Jwt`.
    pub jwt_secret: String,
    pub session_mode: SessionMode,
    // Name of the cookie that may carry the session token.
    pub session_cookie: String,
    pub routes: RouteConfig,
    // Ownership registry: every table the data endpoint may touch.
    pub tables: OwnershipRegistry,
    pub openai: Option<OpenAiConfig>,
    // Built front-end served to requests that pass the gateway.
    pub static_dir: Option<String>,
}

/// Env
///
/// Runtime context: local development (pretty logs, in-memory fallbacks) or production
/// (JSON logs, every collaborator explicitly configured).
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// SessionMode
///
/// How the session verifier consults the identity provider.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SessionMode {
    /// Ask the provider's user endpoint for every request.
    Remote,
    /// Check the provider-signed token with the provider's shared secret.
    Jwt,
}

/// RouteConfig
///
/// Raw route classification settings; validated by `RouteClassifier::new`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteConfig {
    pub public_routes: Vec<String>,
    pub api_prefixes: Vec<String>,
    pub sign_in_path: String,
    pub sign_up_path: String,
    pub dashboard_path: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            public_routes: split_list(DEFAULT_PUBLIC_ROUTES),
            api_prefixes: split_list(DEFAULT_API_PREFIXES),
            sign_in_path: "/sign-in".to_string(),
            sign_up_path: "/sign-up".to_string(),
            dashboard_path: "/dashboard".to_string(),
        }
    }
}

/// OpenAiConfig
///
/// Settings for the OpenAI-compatible blueprint generator.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

pub const DEFAULT_PUBLIC_ROUTES: &str =
    "/,/pricing,/about,/health,/auth/callback,/swagger-ui/*,/api-docs/*";
pub const DEFAULT_API_PREFIXES: &str = "/api/*";
pub const DEFAULT_RESOURCE_TABLES: &str = "ideas:user_id,blueprints";
const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking configuration for tests: local mode, in-memory store, JWT
    /// verification with the local secret and the default route/table layout.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: "127.0.0.1:3000".to_string(),
            db_url: None,
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "local-anon-key".to_string(),
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            session_mode: SessionMode::Jwt,
            session_cookie: "sb-access-token".to_string(),
            routes: RouteConfig::default(),
            tables: OwnershipRegistry::parse(DEFAULT_RESOURCE_TABLES)
                .expect("default registry is valid"),
            openai: None,
            static_dir: None,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every setting from the environment and applies the **fail-fast** principle.
    ///
    /// # Panics
    /// Panics if a secret required by the current environment is missing, or if the route
    /// or table configuration is malformed. The gateway must not start half-configured.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let session_mode = match env::var("SESSION_VERIFIER").ok().as_deref() {
            Some("remote") => SessionMode::Remote,
            Some("jwt") => SessionMode::Jwt,
            None if env == Env::Production => SessionMode::Remote,
            None => SessionMode::Jwt,
            Some(other) => panic!(
                "FATAL: {}",
                ConfigError::UnsupportedValue {
                    var: "SESSION_VERIFIER",
                    value: other.to_string(),
                }
            ),
        };

        // Identity provider secrets: mandatory in production for the selected mode.
        let (supabase_url, supabase_anon_key, jwt_secret) = match env {
            Env::Production => {
                let url = env::var("SUPABASE_URL").expect("FATAL: SUPABASE_URL required in prod");
                let anon_key = match session_mode {
                    SessionMode::Remote => env::var("SUPABASE_ANON_KEY")
                        .expect("FATAL: SUPABASE_ANON_KEY required for remote sessions"),
                    SessionMode::Jwt => env::var("SUPABASE_ANON_KEY").unwrap_or_default(),
                };
                let secret = match session_mode {
                    SessionMode::Jwt => env::var("SUPABASE_JWT_SECRET")
                        .expect("FATAL: SUPABASE_JWT_SECRET required for jwt sessions"),
                    SessionMode::Remote => env::var("SUPABASE_JWT_SECRET").unwrap_or_default(),
                };
                (url, anon_key, secret)
            }
            Env::Local => (
                env::var("SUPABASE_URL").unwrap_or_else(|_| "http://localhost:54321".to_string()),
                env::var("SUPABASE_ANON_KEY").unwrap_or_else(|_| "local-anon-key".to_string()),
                env::var("SUPABASE_JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
            ),
        };

        let db_url = match env {
            Env::Production => {
                Some(env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"))
            }
            Env::Local => env::var("DATABASE_URL").ok(),
        };

        let routes = RouteConfig {
            public_routes: split_list(&env_or("PUBLIC_ROUTES", DEFAULT_PUBLIC_ROUTES)),
            api_prefixes: split_list(&env_or("API_PREFIXES", DEFAULT_API_PREFIXES)),
            sign_in_path: env_or("SIGN_IN_PATH", "/sign-in"),
            sign_up_path: env_or("SIGN_UP_PATH", "/sign-up"),
            dashboard_path: env_or("DASHBOARD_PATH", "/dashboard"),
        };

        let tables = OwnershipRegistry::parse(&env_or("RESOURCE_TABLES", DEFAULT_RESOURCE_TABLES))
            .unwrap_or_else(|e| panic!("FATAL: RESOURCE_TABLES: {}", e));

        let openai = match env::var("OPENAI_API_KEY") {
            Ok(api_key) => Some(OpenAiConfig {
                api_key,
                base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            }),
            Err(_) if env == Env::Production => {
                panic!("FATAL: OPENAI_API_KEY required in prod")
            }
            Err(_) => None,
        };

        Self {
            env,
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            db_url,
            supabase_url,
            supabase_anon_key,
            jwt_secret,
            session_mode,
            session_cookie: env_or("SESSION_COOKIE", "sb-access-token"),
            routes,
            tables,
            openai,
            static_dir: env::var("STATIC_DIR").ok(),
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

/// Splits a comma-separated setting, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
