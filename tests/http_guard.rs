use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header::AUTHORIZATION, Request, StatusCode};
use axum::routing::get;
use axum::{Extension, Router};
use jwt_authenticatable::{
    AuthEntity, AuthSubject, Authenticator, OptionalAuthSubject, SigningKey, SubjectLookup,
    TokenConfig,
};
use tower::ServiceExt;

async fn me(user: AuthSubject<u64>) -> String {
    format!("user_id = {}", user.subject)
}

async fn greeting(user: OptionalAuthSubject<u64>) -> String {
    match user.into_inner() {
        Some(user) => format!("hello {}", user.subject),
        None => "hello stranger".into(),
    }
}

#[derive(Clone)]
struct Planets(Arc<HashMap<u64, &'static str>>);

impl SubjectLookup for Planets {
    type Id = u64;
    type Entity = &'static str;

    async fn find(&self, id: &u64) -> Option<&'static str> {
        self.0.get(id).copied()
    }
}

async fn planet(planet: AuthEntity<Planets>) -> String {
    format!("planet = {}", planet.entity)
}

fn app(auth: &Authenticator) -> Router {
    let planets = Planets(Arc::new(HashMap::from([(4, "Mars"), (5, "Jupiter")])));
    Router::new()
        .route("/me", get(me))
        .route("/hello", get(greeting))
        .route("/planet", get(planet))
        .layer(Extension(auth.clone()))
        .layer(Extension(planets))
}

fn authenticator() -> Authenticator {
    Authenticator::with_signer(
        TokenConfig::new().ttl(Duration::from_secs(60)),
        SigningKey::hs256("router-secret").unwrap().with_kid("k1"),
    )
}

async fn get_text(app: Router, uri: &str, bearer: Option<&str>) -> (StatusCode, String) {
    let mut req = Request::builder().uri(uri);
    if let Some(token) = bearer {
        req = req.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn guarded_route_accepts_valid_token() {
    let auth = authenticator();
    let token = auth.issue_token(&42u64).unwrap();

    let (status, body) = get_text(app(&auth), "/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "user_id = 42");
}

#[tokio::test]
async fn rejections_all_look_the_same() {
    let auth = authenticator();
    let stranger = Authenticator::with_signer(
        TokenConfig::new(),
        SigningKey::hs256("other-secret").unwrap().with_kid("k1"),
    );
    let forged = stranger.issue_token(&42u64).unwrap();

    let missing = get_text(app(&auth), "/me", None).await;
    let garbage = get_text(app(&auth), "/me", Some("garbage")).await;
    let wrong_key = get_text(app(&auth), "/me", Some(&forged)).await;

    for (status, body) in [&missing, &garbage, &wrong_key] {
        assert_eq!(*status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, &missing.1);
    }
    assert!(missing.1.contains("unauthorized"));
}

#[tokio::test]
async fn optional_route_allows_anonymous() {
    let auth = authenticator();
    let token = auth.issue_token(&7u64).unwrap();

    let (status, body) = get_text(app(&auth), "/hello", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello stranger");

    let (status, body) = get_text(app(&auth), "/hello", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello 7");
}

#[tokio::test]
async fn entity_route_loads_the_subject() {
    let auth = authenticator();
    let token = auth.issue_token(&4u64).unwrap();

    let (status, body) = get_text(app(&auth), "/planet", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "planet = Mars");
}

#[tokio::test]
async fn unknown_subject_is_rejected_like_a_bad_token() {
    let auth = authenticator();
    let token = auth.issue_token(&404u64).unwrap();

    let (status, body) = get_text(app(&auth), "/planet", Some(&token)).await;
    let (_, missing) = get_text(app(&auth), "/planet", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, missing);
    assert_eq!(body, r#"{"error":"unauthorized","status":401}"#);
}

#[tokio::test]
async fn missing_authenticator_is_a_server_error() {
    let router = Router::new().route("/me", get(me));
    let token = authenticator().issue_token(&1u64).unwrap();
    let (status, _) = get_text(router, "/me", Some(&token)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
