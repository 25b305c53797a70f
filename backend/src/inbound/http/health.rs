//! Health endpoints: liveness and readiness probes for orchestration and
//! load balancers.

use actix_web::{HttpResponse, get, http::header, web};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared health state for readiness and liveness checks.
pub struct HealthState {
    ready: AtomicBool,
    broker_linked: AtomicBool,
    live: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(false),
            broker_linked: AtomicBool::new(true),
            live: AtomicBool::new(true),
        }
    }
}

impl HealthState {
    /// Create a new health state starting as not ready but live.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the service as ready. Only the bootstrap does this, once the
    /// listen socket is bound.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Flag the service as unhealthy so liveness checks fail fast during shutdown.
    pub fn mark_unhealthy(&self) {
        self.live.store(false, Ordering::Release);
    }

    /// Record whether the broker subscription is up. Readiness is withheld
    /// while it is down.
    pub fn set_broker_linked(&self, linked: bool) {
        self.broker_linked.store(linked, Ordering::Release);
    }

    /// Ready once listening, and only while the broker subscription is up.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && self.broker_linked.load(Ordering::Acquire)
    }

    pub fn is_alive(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn probe_response(probe_ok: bool) -> HttpResponse {
        let mut response = if probe_ok {
            HttpResponse::Ok()
        } else {
            HttpResponse::ServiceUnavailable()
        };

        response
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish()
    }
}

/// Mirror a broker link status channel into `state` until the channel closes.
pub fn follow_broker_link(state: web::Data<HealthState>, mut status: watch::Receiver<bool>) {
    state.set_broker_linked(*status.borrow_and_update());
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let linked = *status.borrow_and_update();
            state.set_broker_linked(linked);
            if linked {
                info!("broker link restored; readiness resumed");
            } else {
                warn!("broker link down; reporting not ready");
            }
        }
    });
}

/// Readiness probe. 200 once startup reached listening and while the broker
/// subscription is up; 503 otherwise.
#[get("/health/ready")]
pub async fn ready(state: web::Data<HealthState>) -> HttpResponse {
    HealthState::probe_response(state.is_ready())
}

/// Liveness probe. 200 while the process is marked alive and 503 once draining.
#[get("/health/live")]
pub async fn live(state: web::Data<HealthState>) -> HttpResponse {
    HealthState::probe_response(state.is_alive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use rstest::rstest;

    #[rstest]
    #[case("/health/ready", false, StatusCode::SERVICE_UNAVAILABLE)]
    #[case("/health/ready", true, StatusCode::OK)]
    #[case("/health/live", false, StatusCode::OK)]
    #[actix_web::test]
    async fn probes_reflect_state(
        #[case] path: &str,
        #[case] mark_ready: bool,
        #[case] expected: StatusCode,
    ) {
        let state = web::Data::new(HealthState::new());
        if mark_ready {
            state.mark_ready();
        }
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .service(ready)
                .service(live),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;
        assert_eq!(res.status(), expected);
        assert_eq!(
            res.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
    }

    #[actix_web::test]
    async fn readiness_follows_the_broker_link() {
        let state = web::Data::new(HealthState::new());
        state.mark_ready();
        let (link, status) = watch::channel(true);
        follow_broker_link(state.clone(), status);
        assert!(state.is_ready());

        link.send_replace(false);
        for _ in 0..50 {
            if !state.is_ready() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!state.is_ready());

        let app = test::init_service(App::new().app_data(state.clone()).service(ready)).await;
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/health/ready").to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

        link.send_replace(true);
        for _ in 0..50 {
            if state.is_ready() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(state.is_ready());
    }

    #[actix_web::test]
    async fn liveness_fails_once_draining() {
        let state = web::Data::new(HealthState::new());
        state.mark_unhealthy();
        let app = test::init_service(App::new().app_data(state).service(live)).await;
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/health/live").to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
