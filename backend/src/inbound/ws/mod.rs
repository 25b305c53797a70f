//! WebSocket inbound adapter bridging the fan-out gateway to clients.
//!
//! Responsibilities:
//! - validate upgrade requests against the same origin and method policy
//!   as the HTTP edge
//! - attach each accepted connection to the [`Gateway`](crate::domain::Gateway)
//! - keep WebSocket-specific concerns at the edge of the system

use std::sync::Arc;

use actix_web::web::{self, Payload};
use actix_web::{
    HttpRequest, HttpResponse,
    http::header::{HeaderValue, ORIGIN},
};
use tracing::{error, warn};

use crate::inbound::http::cors::CorsPolicy;

mod session;

pub mod messages;
pub mod state;

/// Path the real-time transport is mounted at.
pub const WS_PATH: &str = "/ws";

/// Register the upgrade endpoint.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(WS_PATH).to(ws_entry));
}

/// Handle WebSocket upgrade for the `/ws` endpoint.
pub async fn ws_entry(
    state: web::Data<state::WsState>,
    req: HttpRequest,
    stream: Payload,
) -> actix_web::Result<HttpResponse> {
    if !state.policy.permits_method(req.method()) {
        warn!(method = %req.method(), "Rejected WS upgrade due to disallowed method");
        return Err(actix_web::error::ErrorMethodNotAllowed("Method not allowed"));
    }

    let mut origin_iter = req.headers().get_all(ORIGIN);
    let origin_header = origin_iter.next().ok_or_else(|| {
        error!("Missing Origin header on WebSocket upgrade");
        actix_web::error::ErrorForbidden("Origin not allowed")
    })?;
    if origin_iter.next().is_some() {
        error!("Multiple Origin headers on WebSocket upgrade");
        return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
    }

    validate_origin(&state.policy, origin_header)?;

    let (response, session, messages) = actix_ws::handle(&req, stream).map_err(|error| {
        warn!(error = %error, "WebSocket handshake rejected");
        error
    })?;
    let (client, inbox) = state.gateway.connect();
    actix_web::rt::spawn(session::handle_ws_session(
        Arc::clone(&state.gateway),
        client,
        inbox,
        session,
        messages,
    ));
    Ok(response)
}

fn validate_origin(policy: &CorsPolicy, origin_header: &HeaderValue) -> actix_web::Result<()> {
    let origin_value = match origin_header.to_str() {
        Ok(value) => value,
        Err(error) => {
            error!(error = %error, "Failed to parse Origin header as string");
            return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
        }
    };

    if url::Url::parse(origin_value).is_err() {
        error!(origin = origin_value, "Failed to parse Origin header as URL");
        return Err(actix_web::error::ErrorBadRequest("Invalid Origin header"));
    }

    if policy.permits_origin(origin_value) {
        Ok(())
    } else {
        warn!(
            origin = origin_value,
            "Rejected WS upgrade due to disallowed Origin"
        );
        Err(actix_web::error::ErrorForbidden("Origin not allowed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientOrigin;
    use actix_web::http::StatusCode;
    use rstest::rstest;

    fn header(value: &str) -> HeaderValue {
        HeaderValue::from_str(value).expect("valid header value")
    }

    fn policy() -> CorsPolicy {
        CorsPolicy::new(Some(
            ClientOrigin::parse("http://localhost:3000").expect("valid origin"),
        ))
    }

    #[rstest]
    #[case("http://localhost:3000")]
    #[case("http://localhost:3000/")]
    fn accepts_the_client_origin(#[case] origin: &str) {
        assert!(validate_origin(&policy(), &header(origin)).is_ok());
    }

    #[rstest]
    #[case("http://localhost:3001")]
    #[case("https://localhost:3000")]
    #[case("https://example.com")]
    fn rejects_other_origins(#[case] origin: &str) {
        let error = validate_origin(&policy(), &header(origin)).expect_err("origin rejected");
        assert_eq!(
            error.as_response_error().status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[rstest]
    fn rejects_every_origin_without_a_client_url() {
        let error = validate_origin(&CorsPolicy::default(), &header("http://localhost:3000"))
            .expect_err("origin rejected");
        assert_eq!(
            error.as_response_error().status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn rejects_non_utf8_origin_header() {
        let header = HeaderValue::from_bytes(&[0x80]).expect("opaque header value");
        let error = validate_origin(&policy(), &header).expect_err("origin rejected");
        assert_eq!(
            error.as_response_error().status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn rejects_unparsable_origin_header() {
        let header = HeaderValue::from_static("not a url");
        let error = validate_origin(&policy(), &header).expect_err("origin rejected");
        assert_eq!(
            error.as_response_error().status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
