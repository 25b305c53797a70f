//! Process configuration.
//!
//! Settings are read once from the environment into a [`ProcessConfig`],
//! checked for undefined keys, and frozen into an immutable [`AppConfig`].
//! Components receive the [`AppConfig`] by reference; nothing else in the
//! process reads environment state.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use mockable::Env;
use url::Url;
use zeroize::Zeroize;

use crate::domain::ReconnectBackoff;

/// Value of `NODE_ENV` that marks a local development deployment.
pub const DEVELOPMENT_FLAG: &str = "dev";

/// Every setting the process recognises, in validation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Durable store connection string.
    DatabaseUrl,
    /// Secret used to sign authentication tokens.
    JwtToken,
    /// Deployment environment; `dev` relaxes cookie security.
    NodeEnv,
    /// Session secret used to sign new cookies.
    SecretKeyOne,
    /// Session secret still accepted when verifying cookies.
    SecretKeyTwo,
    /// The one origin allowed cross-origin and WebSocket access.
    ClientUrl,
    /// Broker connection URL.
    RedisHost,
    /// Media-asset provider account name.
    CloudName,
    /// Media-asset provider API key.
    CloudApiKey,
    /// Media-asset provider API secret.
    CloudApiSecret,
    /// HTTP listen port.
    ServerPort,
    /// First reconnect delay in milliseconds; `0` retries immediately.
    StoreReconnectInitialMs,
    /// Upper bound on the reconnect delay in milliseconds.
    StoreReconnectMaxMs,
    /// Broker channel shared by every process.
    FanoutChannel,
}

impl ConfigKey {
    /// Declaration order; [`ProcessConfig::validate`] reports the first
    /// undefined key in this order.
    pub const ALL: [Self; 14] = [
        Self::DatabaseUrl,
        Self::JwtToken,
        Self::NodeEnv,
        Self::SecretKeyOne,
        Self::SecretKeyTwo,
        Self::ClientUrl,
        Self::RedisHost,
        Self::CloudName,
        Self::CloudApiKey,
        Self::CloudApiSecret,
        Self::ServerPort,
        Self::StoreReconnectInitialMs,
        Self::StoreReconnectMaxMs,
        Self::FanoutChannel,
    ];

    /// Environment variable backing this key.
    #[must_use]
    pub const fn env_name(self) -> &'static str {
        match self {
            Self::DatabaseUrl => "DATABASE_URL",
            Self::JwtToken => "JWT_TOKEN",
            Self::NodeEnv => "NODE_ENV",
            Self::SecretKeyOne => "SECRET_KEY_ONE",
            Self::SecretKeyTwo => "SECRET_KEY_TWO",
            Self::ClientUrl => "CLIENT_URL",
            Self::RedisHost => "REDIS_HOST",
            Self::CloudName => "CLOUD_NAME",
            Self::CloudApiKey => "CLOUD_API_KEY",
            Self::CloudApiSecret => "CLOUD_API_SECRET",
            Self::ServerPort => "SERVER_PORT",
            Self::StoreReconnectInitialMs => "STORE_RECONNECT_INITIAL_MS",
            Self::StoreReconnectMaxMs => "STORE_RECONNECT_MAX_MS",
            Self::FanoutChannel => "FANOUT_CHANNEL",
        }
    }

    /// Documented default, or `None` for required keys.
    #[must_use]
    pub const fn default_value(self) -> Option<&'static str> {
        match self {
            Self::DatabaseUrl => Some("postgres://localhost:5432/social"),
            Self::JwtToken => None,
            Self::NodeEnv => Some(DEVELOPMENT_FLAG),
            Self::SecretKeyOne
            | Self::SecretKeyTwo
            | Self::ClientUrl
            | Self::CloudName
            | Self::CloudApiKey
            | Self::CloudApiSecret => Some(""),
            Self::RedisHost => Some("redis://127.0.0.1:6379"),
            Self::ServerPort => Some("8000"),
            Self::StoreReconnectInitialMs => Some("0"),
            Self::StoreReconnectMaxMs => Some("30000"),
            Self::FanoutChannel => Some("fanout:events"),
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.env_name())
    }
}

/// Errors raised while validating process configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A recognised key has no value after loading.
    #[error("Configuration {key} is undefined")]
    Undefined { key: &'static str },
    /// A key is defined but its value cannot be used.
    #[error("Configuration {key}='{value}' is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigurationError {
    /// Name of the offending environment variable.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Undefined { key } | Self::Invalid { key, .. } => key,
        }
    }
}

/// Raw settings as read from the environment, before validation.
///
/// Defaulted keys treat an empty value as absent and fall back to their
/// default. Required keys keep whatever the environment holds, so an empty
/// value still counts as defined.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    values: Vec<(ConfigKey, Option<String>)>,
}

impl ProcessConfig {
    /// Read every recognised key from `env`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mockable::MockEnv;
    /// use social_backend::config::{ConfigKey, ProcessConfig};
    ///
    /// let mut env = MockEnv::new();
    /// env.expect_string().returning(|name| match name {
    ///     "JWT_TOKEN" => Some("token".to_owned()),
    ///     _ => None,
    /// });
    ///
    /// let raw = ProcessConfig::load(&env);
    /// assert_eq!(raw.get(ConfigKey::ServerPort), Some("8000"));
    /// assert!(raw.validate().is_ok());
    /// ```
    pub fn load<E: Env>(env: &E) -> Self {
        let values = ConfigKey::ALL
            .iter()
            .map(|&key| (key, read_key(env, key)))
            .collect();
        Self { values }
    }

    /// Value loaded for `key`, if any.
    #[must_use]
    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.values
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Fail with the first undefined key, in declaration order.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::Undefined`] naming the first key without
    /// a value.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self.values.iter().find(|(_, value)| value.is_none()) {
            Some((key, _)) => Err(ConfigurationError::Undefined {
                key: key.env_name(),
            }),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_value(mut self, key: ConfigKey, value: Option<&str>) -> Self {
        for (candidate, slot) in &mut self.values {
            if *candidate == key {
                *slot = value.map(str::to_owned);
            }
        }
        self
    }

    fn defined(&self, key: ConfigKey) -> Result<&str, ConfigurationError> {
        self.get(key).ok_or(ConfigurationError::Undefined {
            key: key.env_name(),
        })
    }
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            let shown = match (key.is_secret(), value) {
                (_, None) => "<undefined>",
                (true, Some(_)) => "<redacted>",
                (false, Some(value)) => value.as_str(),
            };
            map.entry(&key.env_name(), &shown);
        }
        map.finish()
    }
}

impl ConfigKey {
    const fn is_secret(self) -> bool {
        matches!(
            self,
            Self::JwtToken
                | Self::SecretKeyOne
                | Self::SecretKeyTwo
                | Self::CloudApiSecret
                | Self::DatabaseUrl
        )
    }
}

fn read_key<E: Env>(env: &E, key: ConfigKey) -> Option<String> {
    let raw = env.string(key.env_name());
    match key.default_value() {
        Some(default) => Some(
            raw.filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_owned()),
        ),
        None => raw,
    }
}

/// Deployment environment derived from `NODE_ENV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEnvironment {
    /// Local development (`NODE_ENV=dev`).
    Development,
    /// Any other named deployment.
    Named(String),
}

impl DeploymentEnvironment {
    fn from_flag(flag: &str) -> Self {
        if flag == DEVELOPMENT_FLAG {
            Self::Development
        } else {
            Self::Named(flag.to_owned())
        }
    }

    /// Whether this is the local development flag.
    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// The two secrets used to seal session cookies.
#[derive(Clone)]
pub struct SessionSecrets {
    primary: String,
    secondary: String,
}

impl SessionSecrets {
    /// Construct from the primary and secondary secret.
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// `SECRET_KEY_ONE`.
    #[must_use]
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// `SECRET_KEY_TWO`.
    #[must_use]
    pub fn secondary(&self) -> &str {
        &self.secondary
    }
}

impl Drop for SessionSecrets {
    fn drop(&mut self) {
        self.primary.zeroize();
        self.secondary.zeroize();
    }
}

impl fmt::Debug for SessionSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSecrets").finish_non_exhaustive()
    }
}

/// Credentials for the media-asset provider.
#[derive(Clone, PartialEq, Eq)]
pub struct AssetProviderCredentials {
    pub cloud_name: String,
    pub api_key: String,
    api_secret: String,
}

impl AssetProviderCredentials {
    /// API secret for signed uploads.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Whether all three credentials are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !(self.cloud_name.is_empty() || self.api_key.is_empty() || self.api_secret.is_empty())
    }
}

impl fmt::Debug for AssetProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetProviderCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

/// Origin permitted to make credentialed cross-origin and WebSocket requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin {
    url: Url,
    serialized: String,
}

impl ClientOrigin {
    /// Parse an absolute `http` or `https` URL; any path is ignored.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::Invalid`] for other schemes, missing
    /// hosts, or unparsable input.
    pub fn parse(value: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason| ConfigurationError::Invalid {
            key: ConfigKey::ClientUrl.env_name(),
            value: value.to_owned(),
            reason,
        };
        let url = Url::parse(value).map_err(|_| invalid("expected an absolute URL"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("expected an http or https URL"));
        }
        if url.host_str().is_none() {
            return Err(invalid("expected a host"));
        }
        let serialized = url.origin().ascii_serialization();
        Ok(Self { url, serialized })
    }

    /// ASCII serialisation of the origin, e.g. `https://app.example`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Whether `candidate` shares this origin's scheme, host, and port.
    #[must_use]
    pub fn matches(&self, candidate: &Url) -> bool {
        candidate.origin() == self.url.origin()
    }
}

/// Validated, immutable process configuration.
#[derive(Clone)]
pub struct AppConfig {
    database_url: String,
    jwt_token: String,
    environment: DeploymentEnvironment,
    session_secrets: SessionSecrets,
    client_origin: Option<ClientOrigin>,
    broker_url: String,
    fanout_channel: String,
    asset_provider: AssetProviderCredentials,
    server_port: u16,
    store_reconnect: ReconnectBackoff,
}

impl AppConfig {
    /// Load, validate, and parse configuration from `env`.
    ///
    /// # Errors
    /// Returns the first [`ConfigurationError`] encountered.
    pub fn from_env<E: Env>(env: &E) -> Result<Self, ConfigurationError> {
        Self::try_from(ProcessConfig::load(env))
    }

    /// Store connection string.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Token signing secret handed to authentication handlers.
    #[must_use]
    pub fn jwt_token(&self) -> &str {
        &self.jwt_token
    }

    #[must_use]
    pub fn environment(&self) -> &DeploymentEnvironment {
        &self.environment
    }

    #[must_use]
    pub fn session_secrets(&self) -> &SessionSecrets {
        &self.session_secrets
    }

    /// Allowed client origin; `None` when `CLIENT_URL` is empty, which
    /// permits no cross-origin access.
    #[must_use]
    pub fn client_origin(&self) -> Option<&ClientOrigin> {
        self.client_origin.as_ref()
    }

    /// Broker address for the fan-out backplane.
    #[must_use]
    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    /// Broker channel carrying fan-out envelopes.
    #[must_use]
    pub fn fanout_channel(&self) -> &str {
        &self.fanout_channel
    }

    #[must_use]
    pub fn asset_provider(&self) -> &AssetProviderCredentials {
        &self.asset_provider
    }

    /// Listen address: all interfaces on `SERVER_PORT`.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.server_port))
    }

    /// Backoff applied between store reconnect attempts.
    #[must_use]
    pub fn store_reconnect(&self) -> ReconnectBackoff {
        self.store_reconnect
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("environment", &self.environment)
            .field("client_origin", &self.client_origin)
            .field("broker_url", &self.broker_url)
            .field("fanout_channel", &self.fanout_channel)
            .field("asset_provider", &self.asset_provider)
            .field("server_port", &self.server_port)
            .field("store_reconnect", &self.store_reconnect)
            .finish_non_exhaustive()
    }
}

impl TryFrom<ProcessConfig> for AppConfig {
    type Error = ConfigurationError;

    fn try_from(raw: ProcessConfig) -> Result<Self, Self::Error> {
        raw.validate()?;

        let client_origin = match raw.defined(ConfigKey::ClientUrl)? {
            "" => None,
            value => Some(ClientOrigin::parse(value)?),
        };
        let initial_ms = parse_number::<u64>(&raw, ConfigKey::StoreReconnectInitialMs)?;
        let max_ms = parse_number::<u64>(&raw, ConfigKey::StoreReconnectMaxMs)?;

        Ok(Self {
            database_url: raw.defined(ConfigKey::DatabaseUrl)?.to_owned(),
            jwt_token: raw.defined(ConfigKey::JwtToken)?.to_owned(),
            environment: DeploymentEnvironment::from_flag(raw.defined(ConfigKey::NodeEnv)?),
            session_secrets: SessionSecrets::new(
                raw.defined(ConfigKey::SecretKeyOne)?,
                raw.defined(ConfigKey::SecretKeyTwo)?,
            ),
            client_origin,
            broker_url: raw.defined(ConfigKey::RedisHost)?.to_owned(),
            fanout_channel: raw.defined(ConfigKey::FanoutChannel)?.to_owned(),
            asset_provider: AssetProviderCredentials {
                cloud_name: raw.defined(ConfigKey::CloudName)?.to_owned(),
                api_key: raw.defined(ConfigKey::CloudApiKey)?.to_owned(),
                api_secret: raw.defined(ConfigKey::CloudApiSecret)?.to_owned(),
            },
            server_port: parse_number::<u16>(&raw, ConfigKey::ServerPort)?,
            store_reconnect: ReconnectBackoff::from_millis(initial_ms, max_ms),
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    raw: &ProcessConfig,
    key: ConfigKey,
) -> Result<T, ConfigurationError> {
    let value = raw.defined(key)?;
    value.trim().parse().map_err(|_| ConfigurationError::Invalid {
        key: key.env_name(),
        value: value.to_owned(),
        reason: "expected a non-negative integer in range",
    })
}
