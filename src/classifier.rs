use crate::config::{ConfigError, RouteConfig};

/// Posture
///
/// Required authorization level for a route. API routes always receive harder failure
/// semantics than pages (401 instead of a redirect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posture {
    Public,
    ProtectedPage,
    ProtectedApi,
}

/// RoutePattern
///
/// A configured route entry. `/pricing` is a literal path; `/docs/*` matches `/docs` and
/// everything below it on a segment boundary (so `/api/*` does not match `/api-docs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    Exact(String),
    Prefix(String),
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if !raw.starts_with('/') || raw.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidRoutePattern(raw.to_string()));
        }
        match raw.strip_suffix("/*") {
            Some(base) if base.contains('*') => {
                Err(ConfigError::InvalidRoutePattern(raw.to_string()))
            }
            Some(base) => Ok(RoutePattern::Prefix(base.to_string())),
            None if raw.contains('*') => Err(ConfigError::InvalidRoutePattern(raw.to_string())),
            None => Ok(RoutePattern::Exact(normalize(raw).to_string())),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        match self {
            RoutePattern::Exact(literal) => path == literal,
            RoutePattern::Prefix(base) => {
                path == base
                    || path
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    /// The concrete path this entry names (the literal, or the prefix root).
    fn anchor(&self) -> &str {
        match self {
            RoutePattern::Exact(literal) => literal,
            RoutePattern::Prefix(base) if base.is_empty() => "/",
            RoutePattern::Prefix(base) => base,
        }
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

/// RouteClassifier
///
/// Pure, total mapping from a request path to a `Posture`, built once from `RouteConfig`.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    public: Vec<RoutePattern>,
    api: Vec<RoutePattern>,
    auth_pages: Vec<RoutePattern>,
}

impl RouteClassifier {
    /// Builds the classifier and validates the configuration.
    ///
    /// Sign-in and sign-up pages (and anything below them) are always public. A public entry
    /// whose own path lies under an API prefix is rejected: it could never be honoured, since
    /// API prefixes take precedence.
    pub fn new(config: &RouteConfig) -> Result<Self, ConfigError> {
        let api = config
            .api_prefixes
            .iter()
            .map(|raw| match RoutePattern::parse(raw)? {
                RoutePattern::Exact(path) => Ok(RoutePattern::Prefix(path)),
                prefix => Ok(prefix),
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let auth_pages = [&config.sign_in_path, &config.sign_up_path]
            .into_iter()
            .map(|path| match RoutePattern::parse(path)? {
                RoutePattern::Exact(path) => Ok(RoutePattern::Prefix(path)),
                prefix => Ok(prefix),
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut public = config
            .public_routes
            .iter()
            .map(|raw| RoutePattern::parse(raw))
            .collect::<Result<Vec<_>, ConfigError>>()?;
        public.extend(auth_pages.iter().cloned());

        for entry in &public {
            if let Some(prefix) = api.iter().find(|prefix| prefix.matches(entry.anchor())) {
                return Err(ConfigError::ShadowedPublicRoute {
                    route: entry.anchor().to_string(),
                    prefix: prefix.anchor().to_string(),
                });
            }
        }

        Ok(Self {
            public,
            api,
            auth_pages,
        })
    }

    /// classify
    ///
    /// API prefixes win over any (broader) public entry; unmatched paths are protected pages.
    pub fn classify(&self, path: &str) -> Posture {
        if self.api.iter().any(|p| p.matches(path)) {
            Posture::ProtectedApi
        } else if self.public.iter().any(|p| p.matches(path)) {
            Posture::Public
        } else {
            Posture::ProtectedPage
        }
    }

    /// True for the sign-in/sign-up pages a signed-in user must never see.
    pub fn is_auth_page(&self, path: &str) -> bool {
        self.auth_pages.iter().any(|p| p.matches(path))
    }
}
