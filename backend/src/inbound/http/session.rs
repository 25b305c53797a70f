//! Signed cookie sessions.
//!
//! Sessions are never stored server side: the whole session travels in one
//! signed `session` cookie. Cookies are signed with the key derived from
//! `SECRET_KEY_ONE` and verified against either configured secret, so a
//! secret can be rotated by moving it to `SECRET_KEY_TWO` without logging
//! everyone out.

use std::task::{Context, Poll};

use actix_session::config::{CookieContentSecurity, PersistentSession};
use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::Error;
use actix_web::cookie::time::Duration;
use actix_web::cookie::{Cookie, CookieJar, Key, SameSite};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderValue};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use sha2::{Digest, Sha512};
use tracing::debug;
use zeroize::Zeroize;

use crate::config::{AppConfig, SessionSecrets};

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Lifetime of an issued session cookie.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Cookie settings for the session layer.
#[derive(Clone)]
pub struct SessionSettings {
    keys: SessionKeys,
    cookie_secure: bool,
}

impl SessionSettings {
    /// `Secure` cookies everywhere except the local development environment.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            keys: SessionKeys::from_secrets(config.session_secrets()),
            cookie_secure: !config.environment().is_development(),
        }
    }

    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    /// Session layer signing with the primary key.
    pub fn middleware(&self) -> SessionMiddleware<CookieSessionStore> {
        SessionMiddleware::builder(CookieSessionStore::default(), self.keys.primary.clone())
            .cookie_name(SESSION_COOKIE_NAME.to_owned())
            .cookie_path("/".to_owned())
            .cookie_secure(self.cookie_secure)
            .cookie_http_only(true)
            .cookie_same_site(SameSite::Lax)
            .cookie_content_security(CookieContentSecurity::Signed)
            .session_lifecycle(
                PersistentSession::default().session_ttl(Duration::days(SESSION_TTL_DAYS)),
            )
            .build()
    }

    /// Layer that must wrap [`middleware`](Self::middleware): it accepts
    /// cookies signed with the secondary key by re-signing them under the
    /// primary key before the session layer reads them.
    pub fn key_fallback(&self) -> SecondaryKeyFallback {
        SecondaryKeyFallback {
            keys: self.keys.clone(),
        }
    }
}

/// Signing key plus the optional verification-only key.
#[derive(Clone)]
struct SessionKeys {
    primary: Key,
    secondary: Option<Key>,
}

impl SessionKeys {
    fn from_secrets(secrets: &SessionSecrets) -> Self {
        let secondary = (secrets.secondary() != secrets.primary())
            .then(|| derive_session_key(secrets.secondary()));
        Self {
            primary: derive_session_key(secrets.primary()),
            secondary,
        }
    }

    /// Re-sign `cookie` under the primary key when only the secondary key
    /// verifies it. `None` leaves the cookie untouched.
    fn resign(&self, cookie: Cookie<'static>) -> Option<Cookie<'static>> {
        let secondary = self.secondary.as_ref()?;
        let mut incoming = CookieJar::new();
        incoming.add_original(cookie);
        if incoming.signed(&self.primary).get(SESSION_COOKIE_NAME).is_some() {
            return None;
        }
        let verified = incoming.signed(secondary).get(SESSION_COOKIE_NAME)?;
        let mut outgoing = CookieJar::new();
        outgoing.signed_mut(&self.primary).add(verified);
        outgoing.get(SESSION_COOKIE_NAME).cloned()
    }
}

/// 64 bytes of SHA-512 over one secret.
fn derive_session_key(secret: &str) -> Key {
    let mut digest = Sha512::digest(secret.as_bytes()).to_vec();
    let key = Key::from(digest.as_slice());
    digest.zeroize();
    key
}

/// Rebuild the `Cookie` request header with the session cookie re-signed.
///
/// The header is parsed here rather than through `ServiceRequest::cookie`,
/// which caches parsed cookies for the layers behind this one.
fn resigned_cookie_header(req: &ServiceRequest, keys: &SessionKeys) -> Option<HeaderValue> {
    let mut cookies: Vec<Cookie<'static>> = req
        .headers()
        .get_all(header::COOKIE)
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter(|part| !part.trim().is_empty())
        .map(Cookie::parse_encoded)
        .filter_map(Result::ok)
        .map(Cookie::into_owned)
        .collect();
    let position = cookies
        .iter()
        .position(|cookie| cookie.name() == SESSION_COOKIE_NAME)?;
    let resigned = keys.resign(cookies[position].clone())?;
    cookies[position] = resigned;
    let rendered = cookies
        .iter()
        .map(|cookie| cookie.encoded().stripped().to_string())
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&rendered).ok()
}

/// Middleware accepting session cookies signed with the secondary secret.
#[derive(Clone)]
pub struct SecondaryKeyFallback {
    keys: SessionKeys,
}

impl<S, B> Transform<S, ServiceRequest> for SecondaryKeyFallback
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SecondaryKeyFallbackMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecondaryKeyFallbackMiddleware {
            service,
            keys: self.keys.clone(),
        }))
    }
}

/// Service wrapper produced by [`SecondaryKeyFallback`].
pub struct SecondaryKeyFallbackMiddleware<S> {
    service: S,
    keys: SessionKeys,
}

impl<S, B> Service<ServiceRequest> for SecondaryKeyFallbackMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        if let Some(value) = resigned_cookie_header(&req, &self.keys) {
            debug!("session cookie verified with the secondary key");
            req.headers_mut().insert(header::COOKIE, value);
        }
        Box::pin(self.service.call(req))
    }
}
