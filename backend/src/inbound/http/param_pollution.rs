//! HTTP parameter pollution guard.
//!
//! A query string that repeats a key (`?sort=asc&sort=desc`) is collapsed
//! so that only the last value of each key reaches handlers. The original
//! request target and the discarded pairs remain available through the
//! [`PollutedQuery`] request extension.

use std::collections::HashMap;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::Uri;
use actix_web::http::uri::PathAndQuery;
use actix_web::{Error, HttpMessage};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{debug, warn};
use url::form_urlencoded;

/// Record of a query string rewritten by [`ParamPollutionGuard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollutedQuery {
    /// Request target as received.
    pub original: Uri,
    /// Earlier values of repeated keys, in arrival order.
    pub dropped: Vec<(String, String)>,
}

/// Outcome of collapsing one query string.
#[derive(Debug, PartialEq, Eq)]
struct Collapsed {
    query: String,
    dropped: Vec<(String, String)>,
}

/// Keep the last value for every key; `None` when no key repeats.
fn collapse(query: &str) -> Option<Collapsed> {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let mut last_index: HashMap<&str, usize> = HashMap::new();
    for (index, (key, _)) in pairs.iter().enumerate() {
        last_index.insert(key.as_str(), index);
    }
    if last_index.len() == pairs.len() {
        return None;
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut dropped = Vec::new();
    for (index, (key, value)) in pairs.iter().enumerate() {
        if last_index.get(key.as_str()) == Some(&index) {
            serializer.append_pair(key, value);
        } else {
            dropped.push((key.clone(), value.clone()));
        }
    }
    Some(Collapsed {
        query: serializer.finish(),
        dropped,
    })
}

fn rewrite(uri: &Uri, query: &str) -> Option<Uri> {
    let mut parts = uri.clone().into_parts();
    let target = format!("{}?{}", uri.path(), query);
    parts.path_and_query = Some(PathAndQuery::try_from(target).ok()?);
    Uri::from_parts(parts).ok()
}

/// Middleware collapsing repeated query keys.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use social_backend::inbound::http::param_pollution::ParamPollutionGuard;
///
/// let app = App::new().wrap(ParamPollutionGuard);
/// ```
#[derive(Clone)]
pub struct ParamPollutionGuard;

impl<S, B> Transform<S, ServiceRequest> for ParamPollutionGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ParamPollutionMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ParamPollutionMiddleware { service }))
    }
}

/// Service wrapper produced by [`ParamPollutionGuard`].
pub struct ParamPollutionMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for ParamPollutionMiddleware<S>
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
        let collapsed = req.uri().query().and_then(collapse);
        if let Some(Collapsed { query, dropped }) = collapsed {
            let original = req.uri().clone();
            match rewrite(&original, &query) {
                Some(uri) => {
                    debug!(path = %original.path(), dropped = dropped.len(), "collapsed repeated query keys");
                    req.match_info_mut().get_mut().update(&uri);
                    req.head_mut().uri = uri;
                    req.extensions_mut()
                        .insert(PollutedQuery { original, dropped });
                }
                None => warn!(path = %original.path(), "could not rebuild collapsed query"),
            }
        }
        Box::pin(self.service.call(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpRequest, HttpResponse, test as actix_test, web};
    use rstest::rstest;
    use serde::Deserialize;

    #[rstest]
    #[case("a=1&b=2")]
    #[case("")]
    #[case("flag")]
    fn distinct_keys_are_left_alone(#[case] query: &str) {
        assert_eq!(collapse(query), None);
    }

    #[rstest]
    fn last_value_wins_and_earlier_values_are_recorded() {
        let collapsed = collapse("sort=asc&page=2&sort=desc&sort=new").expect("repeats");
        assert_eq!(collapsed.query, "page=2&sort=new");
        assert_eq!(
            collapsed.dropped,
            vec![
                ("sort".to_owned(), "asc".to_owned()),
                ("sort".to_owned(), "desc".to_owned()),
            ]
        );
    }

    #[derive(Deserialize)]
    struct Listing {
        sort: String,
    }

    #[actix_web::test]
    async fn handlers_see_the_collapsed_query() {
        let app = actix_test::init_service(App::new().wrap(ParamPollutionGuard).route(
            "/posts",
            web::get().to(|req: HttpRequest, listing: web::Query<Listing>| async move {
                let dropped = req
                    .extensions()
                    .get::<PollutedQuery>()
                    .map_or(0, |polluted| polluted.dropped.len());
                HttpResponse::Ok().body(format!("{} {dropped}", listing.sort))
            }),
        ))
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/posts?sort=asc&sort=desc")
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(body, "desc 1");
    }
}
