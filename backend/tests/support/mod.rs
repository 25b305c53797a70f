//! Shared fixtures for integration tests: configuration, stand-in store
//! drivers, and broker links whose readiness the test controls.

#![allow(dead_code, reason = "each test binary uses a subset of the helpers")]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use actix_web::dev::ServerHandle;
use actix_web::web;
use async_trait::async_trait;
use mockable::MockEnv;
use tokio::sync::watch;

use social_backend::config::AppConfig;
use social_backend::domain::ports::{
    Backplane, BackplaneError, BackplanePublisher, EnvelopeStream, StoreDriver, StoreError,
    StoreLink,
};
use social_backend::domain::{Gateway, ReconnectBackoff};
use social_backend::inbound::http::health::HealthState;
use social_backend::inbound::ws::state::WsState;
use social_backend::outbound::backplane::InMemoryBackplane;
use social_backend::server::{AppDependencies, ServerConfig};
use social_backend::{Bootstrap, Started};

pub const CLIENT_ORIGIN: &str = "http://localhost:3000";

/// Configuration built from a signing secret, the test client origin, and
/// the given overrides.
pub fn config_with(vars: &[(&str, &str)]) -> AppConfig {
    let mut values: HashMap<String, String> = HashMap::from([
        ("JWT_TOKEN".to_owned(), "test-jwt".to_owned()),
        ("CLIENT_URL".to_owned(), CLIENT_ORIGIN.to_owned()),
    ]);
    for (name, value) in vars {
        values.insert((*name).to_owned(), (*value).to_owned());
    }
    let mut env = MockEnv::new();
    env.expect_string()
        .returning(move |name| values.get(name).cloned());
    AppConfig::from_env(&env).expect("test configuration validates")
}

pub fn test_config() -> AppConfig {
    config_with(&[])
}

/// Loopback, ephemeral port, one worker, no signal handlers.
pub fn local_server(config: ServerConfig) -> ServerConfig {
    local_server_on(config, SocketAddr::from(([127, 0, 0, 1], 0)))
}

pub fn local_server_on(config: ServerConfig, addr: SocketAddr) -> ServerConfig {
    config
        .with_bind_addr(addr)
        .with_workers(1)
        .without_signal_handling()
}

/// Handle produced by the stand-in drivers.
#[derive(Debug, PartialEq, Eq)]
pub struct StubStore {
    pub url: String,
}

/// Store driver that always connects; the connection never drops.
#[derive(Clone, Default)]
pub struct StubDriver {
    attempts: Arc<AtomicUsize>,
}

impl StubDriver {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreDriver for StubDriver {
    type Handle = StubStore;

    async fn connect(&self, url: &str) -> Result<StoreLink<StubStore>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(StoreLink::new(
            StubStore {
                url: url.to_owned(),
            },
            futures::future::pending(),
        ))
    }
}

/// Store driver whose every attempt is refused.
#[derive(Clone, Default)]
pub struct RefusingDriver {
    attempts: Arc<AtomicUsize>,
}

impl RefusingDriver {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreDriver for RefusingDriver {
    type Handle = StubStore;

    async fn connect(&self, _url: &str) -> Result<StoreLink<StubStore>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::connect("connection refused"))
    }
}

/// In-memory broker whose subscriber link stays pending until released.
#[derive(Clone)]
pub struct GatedBackplane {
    inner: InMemoryBackplane,
    gate: watch::Receiver<bool>,
}

impl GatedBackplane {
    /// Returns the backplane and the sender that releases the subscriber
    /// link once `true` is sent.
    pub fn new(inner: InMemoryBackplane) -> (Self, watch::Sender<bool>) {
        let (release, gate) = watch::channel(false);
        (Self { inner, gate }, release)
    }
}

#[async_trait]
impl Backplane for GatedBackplane {
    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackplaneError> {
        self.inner.open_publisher().await
    }

    async fn open_subscriber(&self) -> Result<EnvelopeStream, BackplaneError> {
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| BackplaneError::link("gate dropped"))?;
        self.inner.open_subscriber().await
    }
}

/// Broker whose subscriber link cannot be established.
#[derive(Clone, Default)]
pub struct UnreachableBackplane;

#[async_trait]
impl Backplane for UnreachableBackplane {
    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackplaneError> {
        InMemoryBackplane::default().open_publisher().await
    }

    async fn open_subscriber(&self) -> Result<EnvelopeStream, BackplaneError> {
        Err(BackplaneError::link("broker unreachable"))
    }
}

/// Start a process on `backplane` with the default test configuration.
/// Returns the started process and its base URL.
pub async fn start_process(backplane: InMemoryBackplane) -> (Started<StubStore>, String) {
    start_process_with(test_config(), backplane, |_cfg| {}).await
}

pub async fn start_process_with<F>(
    config: AppConfig,
    backplane: InMemoryBackplane,
    routes: F,
) -> (Started<StubStore>, String)
where
    F: Fn(&mut web::ServiceConfig) + Send + Sync + 'static,
{
    let started = Bootstrap::new(config, StubDriver::default(), backplane)
        .with_routes(routes)
        .with_server_config(local_server)
        .start()
        .await
        .expect("startup succeeds");
    let addr = started.addrs().first().copied().expect("bound address");
    (started, format!("http://{addr}"))
}

/// Drive the server in the background; returns its handle.
pub fn serve(started: Started<StubStore>) -> ServerHandle {
    let handle = started.handle();
    actix_web::rt::spawn(started.run());
    handle
}

/// Dependencies for one edge worker, for in-process `test::init_service`
/// checks that do not need a bound socket.
pub async fn edge_dependencies<F>(config: &AppConfig, routes: F) -> AppDependencies
where
    F: Fn(&mut web::ServiceConfig) + Send + Sync + 'static,
{
    let server = ServerConfig::from_app_config(config);
    let gateway = Gateway::establish(
        Arc::new(InMemoryBackplane::default()),
        ReconnectBackoff::Immediate,
    )
    .await
    .expect("in-memory links open");
    let health = web::Data::new(HealthState::new());
    health.mark_ready();
    AppDependencies {
        health_state: health,
        ws_state: web::Data::new(WsState::new(Arc::new(gateway), server.cors().clone())),
        session: server.session().clone(),
        cors: server.cors().clone(),
        routes: Arc::new(routes),
    }
}
