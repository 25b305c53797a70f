//! HTTP server configuration object and helpers.

use std::net::SocketAddr;

use crate::config::AppConfig;
use crate::inbound::http::cors::CorsPolicy;
use crate::inbound::http::session::SessionSettings;

/// Builder-style configuration for creating the HTTP server.
#[derive(Clone)]
pub struct ServerConfig {
    pub(crate) session: SessionSettings,
    pub(crate) cors: CorsPolicy,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) handle_signals: bool,
    pub(crate) workers: Option<usize>,
}

impl ServerConfig {
    #[must_use]
    pub fn new(session: SessionSettings, cors: CorsPolicy, bind_addr: SocketAddr) -> Self {
        Self {
            session,
            cors,
            bind_addr,
            handle_signals: true,
            workers: None,
        }
    }

    /// Session, CORS, and bind address as configured for this process.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            SessionSettings::from_config(config),
            CorsPolicy::from_config(config),
            config.bind_addr(),
        )
    }

    #[must_use]
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Leave OS signals to the embedding process, which then stops the
    /// server through [`crate::Shutdown`].
    #[must_use]
    pub fn without_signal_handling(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    #[must_use]
    pub fn cors(&self) -> &CorsPolicy {
        &self.cors
    }

    #[must_use]
    pub fn session(&self) -> &SessionSettings {
        &self.session
    }
}
