//! Cross-origin policy shared by the HTTP edge and the WebSocket upgrade.

use actix_cors::Cors;
use actix_web::http::Method;
use url::Url;

use crate::config::{AppConfig, ClientOrigin};

/// Methods cross-origin callers may use.
pub const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Seconds browsers may cache a preflight result.
const PREFLIGHT_MAX_AGE: usize = 3600;

/// The single client origin allowed to make credentialed cross-origin
/// requests. Without one, no cross-origin access is granted.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    origin: Option<ClientOrigin>,
}

impl CorsPolicy {
    /// Policy admitting `origin`, or no cross-origin access for `None`.
    pub fn new(origin: Option<ClientOrigin>) -> Self {
        Self { origin }
    }

    /// Policy for the configured `CLIENT_URL`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.client_origin().cloned())
    }

    /// The admitted origin, if any.
    pub fn origin(&self) -> Option<&ClientOrigin> {
        self.origin.as_ref()
    }

    /// Whether an `Origin` header value names the configured client.
    ///
    /// # Examples
    /// ```
    /// use social_backend::config::ClientOrigin;
    /// use social_backend::inbound::http::cors::CorsPolicy;
    ///
    /// let origin = ClientOrigin::parse("https://social.example").expect("valid origin");
    /// let policy = CorsPolicy::new(Some(origin));
    /// assert!(policy.permits_origin("https://social.example"));
    /// assert!(!policy.permits_origin("https://evil.example"));
    /// ```
    pub fn permits_origin(&self, origin: &str) -> bool {
        let Some(allowed) = &self.origin else {
            return false;
        };
        Url::parse(origin).is_ok_and(|candidate| allowed.matches(&candidate))
    }

    /// Whether `method` is on the allow-list shared with the WebSocket
    /// handshake.
    pub fn permits_method(&self, method: &Method) -> bool {
        ALLOWED_METHODS.contains(method)
    }

    /// Actix CORS middleware enforcing this policy.
    pub fn middleware(&self) -> Cors {
        let cors = Cors::default()
            .allowed_methods(ALLOWED_METHODS)
            .allow_any_header()
            .supports_credentials()
            .max_age(PREFLIGHT_MAX_AGE);
        match &self.origin {
            Some(origin) => cors.allowed_origin(origin.as_str()),
            None => cors,
        }
    }
}
