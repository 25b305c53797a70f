//! The assembled HTTP edge: every middleware layer observed through real
//! requests against one worker's `App`.

mod support;

use actix_web::http::{Method, StatusCode, header};
use actix_web::{HttpRequest, HttpResponse, test, web};
use rstest::rstest;
use serde::Deserialize;
use social_backend::domain::error::ERROR_STATUS;
use social_backend::domain::{AppError, ErrorBody};
use social_backend::inbound::http::ApiResult;
use social_backend::inbound::http::error_boundary::NotFoundBody;
use social_backend::inbound::http::security_headers::SECURITY_HEADERS;
use social_backend::middleware::TRACE_ID_HEADER;
use social_backend::server::build_app;
use support::{CLIENT_ORIGIN, edge_dependencies, test_config};

#[derive(Deserialize)]
struct NewPost {
    title: String,
}

async fn echo_query(req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().body(req.query_string().to_owned())
}

async fn create_post(post: web::Json<NewPost>) -> ApiResult<HttpResponse> {
    if post.title.is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    Ok(HttpResponse::Created().body(post.into_inner().title))
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/echo", web::get().to(echo_query))
        .route("/posts", web::post().to(create_post));
}

macro_rules! edge {
    () => {
        test::init_service(build_app(
            edge_dependencies(&test_config(), routes).await,
        ))
        .await
    };
}

#[actix_web::test]
async fn every_response_carries_the_security_headers() {
    let app = edge!();
    let res = test::call_service(&app, test::TestRequest::get().uri("/echo").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    for (name, value) in SECURITY_HEADERS {
        let actual = res
            .headers()
            .get(name)
            .unwrap_or_else(|| panic!("missing {name}"));
        assert_eq!(actual, value, "{name}");
    }
}

#[actix_web::test]
async fn responses_carry_a_fresh_trace_id() {
    let app = edge!();
    let res = test::call_service(&app, test::TestRequest::get().uri("/echo").to_request()).await;
    let trace_id = res
        .headers()
        .get(TRACE_ID_HEADER)
        .expect("trace id header")
        .to_str()
        .expect("ascii header");
    assert!(uuid::Uuid::parse_str(trace_id).is_ok(), "{trace_id}");
}

#[actix_web::test]
async fn repeated_query_keys_collapse_to_the_last_value() {
    let app = edge!();
    let req = test::TestRequest::get()
        .uri("/echo?sort=asc&page=2&sort=desc")
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "page=2&sort=desc");
}

#[rstest]
#[case(Method::GET, "/nowhere", "/nowhere not found")]
#[case(Method::POST, "/nowhere?x=1", "/nowhere?x=1 not found")]
#[case(Method::DELETE, "/posts/9", "/posts/9 not found")]
#[case(Method::GET, "/nowhere?a=1&a=2", "/nowhere?a=1&a=2 not found")]
#[actix_web::test]
async fn unmatched_requests_get_the_not_found_body(
    #[case] method: Method,
    #[case] uri: &str,
    #[case] message: &str,
) {
    let app = edge!();
    let req = test::TestRequest::default()
        .method(method)
        .uri(uri)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: NotFoundBody = test::read_body_json(res).await;
    assert_eq!(body.message, message);
}

#[actix_web::test]
async fn application_errors_render_their_declared_status() {
    let app = edge!();
    let req = test::TestRequest::post()
        .uri("/posts")
        .set_json(serde_json::json!({"title": ""}))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = test::read_body_json(res).await;
    assert_eq!(body.message, "title must not be empty");
    assert_eq!(body.status_code, 400);
    assert_eq!(body.status, ERROR_STATUS);
}

#[actix_web::test]
async fn malformed_json_bodies_become_structured_errors() {
    let app = edge!();
    let req = test::TestRequest::post()
        .uri("/posts")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{\"title\":")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = test::read_body_json(res).await;
    assert_eq!(body.status, ERROR_STATUS);
}

#[actix_web::test]
async fn preflight_from_the_client_origin_is_allowed() {
    let app = edge!();
    let req = test::TestRequest::default()
        .method(Method::OPTIONS)
        .uri("/posts")
        .insert_header((header::ORIGIN, CLIENT_ORIGIN))
        .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .expect("allow-origin header"),
        CLIENT_ORIGIN
    );
    assert_eq!(
        res.headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .expect("allow-credentials header"),
        "true"
    );
}

#[rstest]
#[case("https://elsewhere.example", "POST")]
#[case(CLIENT_ORIGIN, "PATCH")]
#[actix_web::test]
async fn preflight_outside_the_policy_is_refused(#[case] origin: &str, #[case] method: &str) {
    let app = edge!();
    let req = test::TestRequest::default()
        .method(Method::OPTIONS)
        .uri("/posts")
        .insert_header((header::ORIGIN, origin))
        .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, method))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(
        res.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

#[actix_web::test]
async fn readiness_probe_answers_through_the_edge() {
    let app = edge!();
    let res = test::call_service(
        &app,
        test::TestRequest::get().uri("/health/ready").to_request(),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get(header::CACHE_CONTROL).expect("cache-control"),
        "no-store"
    );
}
