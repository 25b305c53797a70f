//! Server construction and middleware wiring.
//!
//! Requests pass the middleware in this order: trace id, error boundary,
//! session cookie, parameter-pollution guard, security headers, CORS,
//! compression, body parsers, routes, and finally the not-found handler.

mod config;

pub use config::ServerConfig;

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::body::MessageBody;
use actix_web::dev::{Server, ServerHandle, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::middleware::Compress;
use actix_web::{App, HttpServer, web};

use crate::inbound::http::body;
use crate::inbound::http::cors::CorsPolicy;
use crate::inbound::http::error_boundary::{ErrorBoundary, not_found};
use crate::inbound::http::health::{HealthState, live, ready};
use crate::inbound::http::param_pollution::ParamPollutionGuard;
use crate::inbound::http::security_headers::security_headers;
use crate::inbound::http::session::SessionSettings;
use crate::inbound::ws;
use crate::inbound::ws::state::WsState;
use crate::middleware::Trace;

/// Callback mounting application routes onto the edge.
pub type RouteMount = Arc<dyn Fn(&mut web::ServiceConfig) + Send + Sync>;

/// A mount that registers nothing.
pub fn no_routes() -> RouteMount {
    Arc::new(|_cfg| {})
}

/// Everything one worker needs to build its `App`.
#[derive(Clone)]
pub struct AppDependencies {
    pub health_state: web::Data<HealthState>,
    pub ws_state: web::Data<WsState>,
    pub session: SessionSettings,
    pub cors: CorsPolicy,
    pub routes: RouteMount,
}

/// Assemble the edge for one worker.
pub fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        ws_state,
        session,
        cors,
        routes,
    } = deps;

    // `wrap` order is inside-out: the last layer sees the request first.
    App::new()
        .app_data(health_state)
        .app_data(ws_state)
        .app_data(body::json_config())
        .app_data(body::form_config())
        .app_data(body::payload_config())
        .service(ready)
        .service(live)
        .configure(ws::configure)
        .configure(move |cfg| routes(cfg))
        .default_service(web::to(not_found))
        .wrap(Compress::default())
        .wrap(cors.middleware())
        .wrap(security_headers())
        .wrap(ParamPollutionGuard)
        .wrap(session.middleware())
        .wrap(session.key_fallback())
        .wrap(ErrorBoundary)
        .wrap(Trace)
}

/// A bound server that has not been driven yet.
pub struct Listening {
    server: Server,
    addrs: Vec<SocketAddr>,
}

impl Listening {
    /// Addresses the listen sockets are bound to.
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    pub fn handle(&self) -> ServerHandle {
        self.server.handle()
    }

    /// The server future; it must be awaited or spawned to serve requests.
    pub fn into_server(self) -> Server {
        self.server
    }
}

/// Bind the edge described by `config`.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    ws_state: web::Data<WsState>,
    routes: RouteMount,
    config: ServerConfig,
) -> std::io::Result<Listening> {
    let ServerConfig {
        session,
        cors,
        bind_addr,
        handle_signals,
        workers,
    } = config;
    let deps = AppDependencies {
        health_state,
        ws_state,
        session,
        cors,
        routes,
    };

    let mut server = HttpServer::new(move || build_app(deps.clone()));
    if let Some(workers) = workers {
        server = server.workers(workers);
    }
    if !handle_signals {
        server = server.disable_signals();
    }
    let server = server.bind(bind_addr)?;
    let addrs = server.addrs();
    Ok(Listening {
        server: server.run(),
        addrs,
    })
}
