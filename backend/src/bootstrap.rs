//! Process bootstrap: the ordered, all-or-nothing startup sequence.
//!
//! ```text
//! ConfigLoaded -> StoreConnecting -> EdgeConfigured -> GatewayReady -> Listening
//! ```
//!
//! Each step starts only after the previous one finished. The store is
//! connected before the gateway opens its broker links, and the listen
//! socket is bound only once both links are established, so no client can
//! connect to a process without cross-process delivery. The first failure
//! ends startup; there is no partial recovery.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::{Server, ServerHandle};
use actix_web::web;
use tokio::sync::watch;
use tracing::info;

use crate::config::{AppConfig, AssetProviderCredentials, ConfigurationError};
use crate::domain::Gateway;
use crate::domain::ports::{Backplane, BackplaneError, StoreDriver, StoreError};
use crate::inbound::http::health::{HealthState, follow_broker_link};
use crate::inbound::ws::state::WsState;
use crate::outbound::persistence::{StoreConnector, StoreHandle};
use crate::server::{RouteMount, ServerConfig, create_server, no_routes};

/// Last startup step reached.
///
/// `StoreConnecting` is entered before the first store attempt; every other
/// phase is entered once its step has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StartupPhase {
    ConfigLoaded,
    StoreConnecting,
    EdgeConfigured,
    GatewayReady,
    Listening,
}

/// Fatal startup conditions. Every variant maps to exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),
    #[error("startup aborted: {0}")]
    Store(#[source] StoreError),
    #[error("startup aborted: {0}")]
    Gateway(#[source] BackplaneError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Startup sequence for one process.
pub struct Bootstrap<D, B> {
    config: AppConfig,
    driver: D,
    backplane: B,
    routes: RouteMount,
    server: ServerConfig,
    phase: watch::Sender<StartupPhase>,
}

impl<D, B> Bootstrap<D, B>
where
    D: StoreDriver,
    B: Backplane + 'static,
{
    pub fn new(config: AppConfig, driver: D, backplane: B) -> Self {
        let server = ServerConfig::from_app_config(&config);
        let (phase, _) = watch::channel(StartupPhase::ConfigLoaded);
        Self {
            config,
            driver,
            backplane,
            routes: no_routes(),
            server,
            phase,
        }
    }

    /// Mount application routes on the edge.
    #[must_use]
    pub fn with_routes<F>(mut self, routes: F) -> Self
    where
        F: Fn(&mut web::ServiceConfig) + Send + Sync + 'static,
    {
        self.routes = Arc::new(routes);
        self
    }

    /// Adjust the server settings derived from the configuration.
    #[must_use]
    pub fn with_server_config(mut self, adjust: impl FnOnce(ServerConfig) -> ServerConfig) -> Self {
        self.server = adjust(self.server);
        self
    }

    /// Observe startup progress.
    pub fn phases(&self) -> watch::Receiver<StartupPhase> {
        self.phase.subscribe()
    }

    /// Run every startup step in order.
    ///
    /// # Errors
    /// Returns the first step's failure; later steps never run.
    pub async fn start(self) -> Result<Started<D::Handle>, StartupError> {
        let Self {
            config,
            driver,
            backplane,
            routes,
            server,
            phase,
        } = self;
        let pid = std::process::id();
        let assets = config.asset_provider().clone();
        info!(
            pid,
            asset_provider_configured = assets.is_configured(),
            "configuration loaded",
        );

        phase.send_replace(StartupPhase::StoreConnecting);
        let store = StoreConnector::new(driver, config.database_url(), config.store_reconnect())
            .connect()
            .await
            .map_err(StartupError::Store)?;

        let health = web::Data::new(HealthState::new());
        let routes = mount_shared(store.clone(), assets, routes);
        phase.send_replace(StartupPhase::EdgeConfigured);

        let gateway = Gateway::establish(Arc::new(backplane), config.store_reconnect())
            .await
            .map_err(StartupError::Gateway)?;
        follow_broker_link(health.clone(), gateway.link_status());
        let ws_state = web::Data::new(WsState::new(Arc::new(gateway), server.cors().clone()));
        phase.send_replace(StartupPhase::GatewayReady);

        let addr = server.bind_addr();
        let listening = create_server(health.clone(), ws_state, routes, server)
            .map_err(|source| StartupError::Bind { addr, source })?;
        let addrs = listening.addrs().to_vec();
        phase.send_replace(StartupPhase::Listening);
        health.mark_ready();
        info!(pid, ?addrs, "server listening");

        Ok(Started {
            server: listening.into_server(),
            addrs,
            store,
            health,
        })
    }
}

/// Hand application routes the store handle and the asset provider
/// credentials as `web::Data`.
fn mount_shared<H>(
    store: StoreHandle<H>,
    assets: AssetProviderCredentials,
    routes: RouteMount,
) -> RouteMount
where
    H: Send + Sync + 'static,
{
    let store = web::Data::new(store);
    let assets = web::Data::new(assets);
    Arc::new(move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(store.clone()).app_data(assets.clone());
        routes(cfg);
    })
}

/// A process that reached [`StartupPhase::Listening`].
pub struct Started<H> {
    server: Server,
    addrs: Vec<SocketAddr>,
    store: StoreHandle<H>,
    health: web::Data<HealthState>,
}

impl<H> Started<H> {
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    pub fn handle(&self) -> ServerHandle {
        self.server.handle()
    }

    pub fn store(&self) -> &StoreHandle<H> {
        &self.store
    }

    /// Probe state served on `/health/*`.
    pub fn health(&self) -> web::Data<HealthState> {
        self.health.clone()
    }

    /// Handle that drains the server and fails liveness first.
    pub fn shutdown_handle(&self) -> Shutdown {
        Shutdown {
            server: self.server.handle(),
            health: self.health.clone(),
        }
    }

    /// Serve until the server is stopped.
    ///
    /// # Errors
    /// Propagates I/O errors from the server.
    pub async fn run(self) -> io::Result<()> {
        self.server.await
    }
}

/// Stops a running process.
#[derive(Clone)]
pub struct Shutdown {
    server: ServerHandle,
    health: web::Data<HealthState>,
}

impl Shutdown {
    /// Fail `/health/live`, then stop the server. A graceful stop lets
    /// in-flight requests finish.
    pub async fn stop(&self, graceful: bool) {
        self.health.mark_unhealthy();
        info!(graceful, "shutting down");
        self.server.stop(graceful).await;
    }
}
