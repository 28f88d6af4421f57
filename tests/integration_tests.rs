//! Integration tests using wiremock to simulate HTTP servers.

use http::Method;
use quickreq::{Client, Error};
use serde::{Deserialize, Serialize};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct User {
    id: u32,
    name: String,
}

#[tokio::test]
async fn get_with_query_params_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users"))
        .and(query_param("id", "5"))
        .and(header("x-tenant", "alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_json(User {
            id: 5,
            name: "Ada".to_owned(),
        }))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new();
    client.set_base_url(server.uri());

    let response = client
        .request()
        .method(Method::GET)
        .query_param("id", "5")
        .header("x-tenant", "alpha")
        .execute("/v1/users")
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.attempts(), 1);
    let user: User = response.json().await.unwrap();
    assert_eq!(user.name, "Ada");
}

#[tokio::test]
async fn post_form_sends_urlencoded_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(header("content-type", quickreq::CONTENT_TYPE_FORM))
        .and(body_string("a=1&b=x+y"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new();
    client.set_base_url(server.uri());

    let response = client
        .post_form("/submit", &[("a", "1"), ("b", "x y")], &[])
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn post_json_serializes_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", quickreq::CONTENT_TYPE_JSON))
        .and(body_string(r#"{"id":0,"name":"New"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(User {
            id: 1,
            name: "New".to_owned(),
        }))
        .mount(&server)
        .await;

    let mut client = Client::new();
    client.set_base_url(server.uri());

    let response = client
        .post_json(
            "/users",
            &User {
                id: 0,
                name: "New".to_owned(),
            },
            &[],
        )
        .await
        .unwrap();
    let created: User = response.json().await.unwrap();
    assert_eq!(created.id, 1);
}

#[tokio::test]
async fn server_error_is_a_normal_response_and_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new();
    client.set_base_url(server.uri()).set_retry_max(5);

    let response = client
        .request()
        .method(Method::GET)
        .execute("/flaky")
        .await
        .unwrap();

    assert!(response.is_server_error());
    assert!(!response.is_success());
    assert!(!response.was_retried());
    assert_eq!(response.text().await, "boom");
}

#[tokio::test]
async fn connection_failure_exhausts_the_retry_ceiling() {
    // Nothing listens on this port; every attempt fails at the transport.
    let mut client = Client::new();
    client
        .set_base_url("http://127.0.0.1:9")
        .set_retry_max(3)
        .set_timeout(std::time::Duration::from_millis(200));

    let error = client
        .request()
        .method(Method::GET)
        .execute("/anything")
        .await
        .unwrap_err();

    match error {
        Error::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn default_cookies_and_auth_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("cookie", "session=abc; theme=dark"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = Client::new();
    client
        .set_base_url(server.uri())
        .set_cookie("session=abc; theme=dark")
        .set_auth_token("secret");

    let response = client
        .request()
        .method(Method::GET)
        .execute("/me")
        .await
        .unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn body_is_cached_across_views() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"a":1}"#))
        .mount(&server)
        .await;

    let mut client = Client::new();
    client.set_base_url(server.uri());

    let response = client
        .request()
        .method(Method::GET)
        .execute("/data")
        .await
        .unwrap();

    let first = response.body().await;
    let second = response.body().await;
    assert_eq!(first, second);
    let map = response.to_map().await.unwrap();
    assert_eq!(map["a"], 1);
    assert!(response.latency() > std::time::Duration::ZERO);
}

#[tokio::test]
async fn detect_encoding_normalizes_a_gbk_body() {
    let server = MockServer::start().await;
    // "你好" in GBK.
    Mock::given(method("GET"))
        .and(path("/legacy"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xC4, 0xE3, 0xBA, 0xC3]))
        .mount(&server)
        .await;

    let mut client = Client::new();
    client.set_base_url(server.uri());

    let response = client
        .request()
        .method(Method::GET)
        .execute("/legacy")
        .await
        .unwrap();

    response.detect_encoding().await.unwrap();
    assert_eq!(response.text().await, "你好");
}

#[tokio::test]
async fn one_shot_helpers_work_without_a_configured_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "rust"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let response = quickreq::get(&server.uri(), &[("q", "rust")], &[])
        .await
        .unwrap();
    assert_eq!(response.text().await, "ok");
}

#[tokio::test]
async fn missing_method_surfaces_before_any_dispatch() {
    let server = MockServer::start().await;
    // No mock mounted: a dispatch would 404, but assembly fails first.
    let mut client = Client::new();
    client.set_base_url(server.uri());

    let error = client.request().execute("/v1").await.unwrap_err();
    assert!(matches!(error, Error::Configuration(_)));
}

#[tokio::test]
async fn debug_mode_logs_and_still_returns_the_response() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("quickreq=debug")
        .with_test_writer()
        .try_init();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dump"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .mount(&server)
        .await;

    let mut client = Client::new();
    client.set_base_url(server.uri()).set_debug(true);

    let response = client
        .request()
        .method(Method::GET)
        .execute("/dump")
        .await
        .unwrap();
    assert_eq!(response.text().await, "payload");
}
