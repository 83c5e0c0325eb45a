//! Runs in its own test binary: it sets process-wide proxy variables.

use bytes::Bytes;
use dat_proxy::api::{ApiClient, RequestHeaders, ThreadRequest};
use dat_proxy::config::UpstreamConfig;
use dat_proxy::proxy::Forwarder;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_outbound_clients_ignore_proxy_environment() {
    // Nothing listens on port 1; any client honoring these would fail.
    for var in ["HTTP_PROXY", "http_proxy", "HTTPS_PROXY", "https_proxy", "ALL_PROXY"] {
        std::env::set_var(var, "http://127.0.0.1:1");
    }
    for var in ["NO_PROXY", "no_proxy"] {
        std::env::remove_var(var);
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("SESSION-ID=Monazilla/1.00:sid"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/news/newsplus/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Thread-Status", "1")
                .set_body_string("dat"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subject.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("subjects"))
        .mount(&server)
        .await;

    let config = UpstreamConfig {
        base_url: server.uri(),
        app_key: "a".repeat(30),
        hmac_key: "h".repeat(30),
        max_retries: 1,
        ..UpstreamConfig::default()
    };
    let client = ApiClient::new(&config).unwrap();
    let reply = client
        .fetch_thread(
            &ThreadRequest::new("news", "newsplus", "1"),
            &RequestHeaders {
                accept_encoding: Some(http::HeaderValue::from_static("gzip")),
                ..RequestHeaders::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(&reply.bytes().await.unwrap()[..], b"dat");

    let forwarder = Forwarder::new("Monazilla/1.00 (JaneStyle/3.84)").unwrap();
    let request = Request::get(format!("{}/subject.txt", server.uri()))
        .body(Empty::<Bytes>::new())
        .unwrap();
    let response = forwarder.forward(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"subjects");
}
