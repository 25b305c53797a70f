//! Global error boundary.
//!
//! Two stages: [`not_found`] answers every request no route matched, and
//! [`ErrorBoundary`] observes every error raised below it.
//!
//! An [`AppError`] already rendered its own status code and body through
//! `ResponseError`; the boundary logs it and lets that response through.
//! Any other error is logged as unstructured and the framework's default
//! response for it passes through unchanged. No generic 500 body is
//! synthesised for unstructured errors.

use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::{Method, StatusCode};
use actix_web::{Error, HttpMessage, HttpRequest, HttpResponse};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::param_pollution::PollutedQuery;
use crate::domain::AppError;

/// Body returned for unmatched routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFoundBody {
    pub message: String,
}

/// Default service: `404 {"message": "<path> not found"}` for any method.
///
/// The path is the request target as received, query string included.
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    let target = match req.extensions().get::<PollutedQuery>() {
        Some(polluted) => polluted.original.to_string(),
        None => req
            .uri()
            .path_and_query()
            .map_or_else(|| req.path().to_owned(), |target| target.as_str().to_owned()),
    };
    HttpResponse::NotFound().json(NotFoundBody {
        message: format!("{target} not found"),
    })
}

fn report(error: &Error, status: StatusCode, method: &Method, path: &str) {
    match error.as_error::<AppError>() {
        Some(app_error) => warn!(
            kind = ?app_error.kind(),
            status = status.as_u16(),
            %method,
            path,
            message = app_error.message(),
            "request failed with application error",
        ),
        None => error!(
            error = %error,
            status = status.as_u16(),
            %method,
            path,
            "request failed with unstructured error",
        ),
    }
}

/// Middleware logging every downstream error before the response leaves.
#[derive(Clone)]
pub struct ErrorBoundary;

impl<S, B> Transform<S, ServiceRequest> for ErrorBoundary
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ErrorBoundaryMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ErrorBoundaryMiddleware { service }))
    }
}

/// Service wrapper produced by [`ErrorBoundary`].
pub struct ErrorBoundaryMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for ErrorBoundaryMiddleware<S>
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

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let method = req.method().clone();
        let path = req.path().to_owned();
        let fut = self.service.call(req);
        Box::pin(async move {
            match fut.await {
                Ok(res) => {
                    if let Some(error) = res.response().error() {
                        report(error, res.status(), &method, &path);
                    }
                    Ok(res)
                }
                Err(error) => {
                    let status = error.as_response_error().status_code();
                    report(&error, status, &method, &path);
                    Err(error)
                }
            }
        })
    }
}
