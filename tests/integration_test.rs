use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::{Matcher, Server};
use paced::backoff::BackoffConfig;
use paced::client::{AsyncClient, BasicClient, RateLimitedClient};
use paced::config::{AsyncClientConfig, ClientConfig};
use paced::error::HttpErrorKind;
use paced::http::{Payload, RequestOptions};
use paced::transport::SharedSession;
use predicates::prelude::*;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

fn paced() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("paced"));
    for var in [
        "PACED_RETRIES",
        "PACED_RATE",
        "PACED_BURST",
        "PACED_BACKOFF",
        "PACED_BASE_DELAY",
        "PACED_JITTER",
        "PACED_TIMEOUT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn quick_retries(max_retries: u32) -> ClientConfig {
    ClientConfig {
        max_retries,
        backoff: BackoffConfig::fixed(Duration::ZERO),
        timeout: Some(Duration::from_secs(5)),
        ..ClientConfig::default()
    }
}

#[test]
fn test_cli_get_json() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/items")
        .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
        .match_header("x-trace", "abc")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items": [1, 2]}"#)
        .create();

    paced()
        .args([
            "get",
            &format!("{}/items", server.url()),
            "--json",
            "-q",
            "page=1",
            "-H",
            "X-Trace: abc",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("200 OK"))
        .stdout(predicate::str::contains("\"items\""));

    mock.assert();
}

#[test]
fn test_cli_post_json_body() {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/items")
        .match_body(Matcher::Json(serde_json::json!({"name": "widget"})))
        .with_status(201)
        .with_body("created")
        .create();

    paced()
        .args(["post", &format!("{}/items", server.url()), "--json-body", r#"{"name": "widget"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("201 Created"))
        .stdout(predicate::str::contains("created"));

    mock.assert();
}

#[test]
fn test_cli_not_found_fails_once() {
    let mut server = Server::new();
    let mock = server.mock("GET", "/missing").with_status(404).expect(1).create();

    paced()
        .args(["get", &format!("{}/missing", server.url())])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    mock.assert();
}

#[test]
fn test_cli_429_exhaustion() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/limited")
        .with_status(429)
        .with_header("retry-after", "0")
        .with_body("slow down")
        .expect(3)
        .create();

    paced()
        .args(["--retries", "2", "get", &format!("{}/limited", server.url())])
        .assert()
        .failure()
        .stderr(predicate::str::contains("too many requests"));

    mock.assert();
}

#[test]
fn test_cli_429_returned_without_raise() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/limited")
        .with_status(429)
        .with_body("slow down")
        .expect(2)
        .create();

    paced()
        .args([
            "get",
            &format!("{}/limited", server.url()),
            "--retries",
            "1",
            "--base-delay",
            "0",
            "--no-raise-on-429",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("429 Too Many Requests"))
        .stdout(predicate::str::contains("slow down"));

    mock.assert();
}

#[test]
fn test_cli_cooperative_get() {
    let mut server = Server::new();
    let mock = server.mock("GET", "/").with_status(200).with_body("{broken").create();

    paced()
        .args(["--cooperative", "get", &server.url(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("200 OK"))
        .stdout(predicate::str::contains("{broken"));

    mock.assert();
}

#[test]
fn test_cli_unsupported_backoff_strategy() {
    let mut server = Server::new();
    let _mock = server.mock("GET", "/").with_status(429).create();

    paced()
        .args(["--backoff", "linear", "get", &server.url()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported backoff strategy"));
}

#[derive(Debug, Deserialize, PartialEq)]
struct Repo {
    id: u64,
    name: String,
}

#[test]
fn test_rate_limited_client_end_to_end() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/repos")
        .with_status(200)
        .with_body(r#"[{"id": 1, "name": "one"}, {"id": 2, "name": "two"}]"#)
        .expect(2)
        .create();

    let client = RateLimitedClient::new(quick_retries(3), Arc::new(SharedSession::reqwest()));
    let url = format!("{}/repos", server.url());

    let (status, repos): (_, Vec<Repo>) = client.get_object(&url, RequestOptions::new()).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repos[1].name, "two");

    let (_, payload) = client.get(&url, RequestOptions::new().json()).unwrap();
    assert_eq!(payload.as_json().and_then(|v| v.as_array()).map(Vec::len), Some(2));
    assert_eq!(client.limiter().bucket_count(), 1);
}

#[test]
fn test_rate_limited_client_429_exhaustion() {
    let mut server = Server::new();
    let mock = server
        .mock("GET", "/limited")
        .with_status(429)
        .with_body("slow down")
        .expect(4)
        .create();

    let client = RateLimitedClient::new(quick_retries(3), Arc::new(SharedSession::reqwest()));
    let err = client
        .get(&format!("{}/limited", server.url()), RequestOptions::new())
        .unwrap_err();

    let http = err.as_http().unwrap();
    assert_eq!(http.kind, HttpErrorKind::TooManyRequests);
    assert_eq!(http.retries, Some(3));
    assert_eq!(client.retries(), 4);
    mock.assert();
}

#[test]
fn test_clients_share_one_session() {
    let mut server = Server::new();
    let _mock = server.mock("GET", "/").with_status(200).expect(2).create();

    let session = Arc::new(SharedSession::reqwest());
    let basic = BasicClient::new(Arc::clone(&session));
    let limited = RateLimitedClient::new(quick_retries(0), Arc::clone(&session));

    assert!(!session.is_initialized());
    basic.get(&server.url(), RequestOptions::new()).unwrap();
    assert!(session.is_initialized());
    limited.get(&server.url(), RequestOptions::new()).unwrap();
}

#[tokio::test]
async fn test_async_client_end_to_end() {
    let mut server = Server::new_async().await;
    let ok = server
        .mock("GET", "/ok")
        .match_header("authorization", "Bearer t")
        .with_status(200)
        .with_body(r#"{"ok": true}"#)
        .create_async()
        .await;
    let _conflict = server.mock("PUT", "/conflict").with_status(409).create_async().await;

    let mut client = AsyncClient::new(AsyncClientConfig::default());
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert("authorization", "Bearer t".parse().unwrap());
    client.set_headers(headers);

    let (status, payload) = client
        .get(&format!("{}/ok", server.url()), RequestOptions::new().json())
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload, Payload::Json(serde_json::json!({"ok": true})));
    assert!(client.owns_session());

    let err = client
        .put(&format!("{}/conflict", server.url()), RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.http_kind(), Some(HttpErrorKind::Conflict));

    client.close().await;
    assert!(!client.has_session());
    ok.assert_async().await;
}
