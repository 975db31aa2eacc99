//! Integration tests for the request executor's retry, redirect, and
//! classification behavior against mock HTTP servers.

use std::sync::{Arc, Mutex};

use fetch_engine::{
    AccessProbe, BlockSignature, EngineConfig, FetchError, GetImage, GetText, PostForm, ProxyPool,
    ProxyStore, RequestExecutor, SessionHooks,
};
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor_with(max_retries: u32) -> RequestExecutor {
    let config = EngineConfig {
        max_retries,
        ..EngineConfig::default()
    };
    RequestExecutor::new(Arc::new(config))
}

#[tokio::test]
async fn test_transient_failures_retried_until_success() {
    let server = MockServer::start().await;

    // Two failures, then success. Mount order matters: the failing mock
    // answers until its budget is spent.
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&server)
        .await;

    let mut executor = executor_with(3);
    let mut request = GetText::new(format!("{}/flaky", server.uri()));
    let body = executor
        .execute(&mut request)
        .await
        .expect("third attempt should succeed");
    assert_eq!(body, "recovered");
}

#[tokio::test]
async fn test_retry_budget_bounds_attempt_count() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mut executor = executor_with(2);
    let mut request = GetText::new(format!("{}/broken", server.uri()));
    let error = executor.execute(&mut request).await.unwrap_err();

    assert!(
        matches!(error, FetchError::BadStatus { status: 500, .. }),
        "got: {error:?}"
    );
    let message = executor.last_error_message().expect("message recorded");
    assert!(message.contains("500"), "got: {message}");
}

#[tokio::test]
async fn test_redirect_hops_do_not_consume_the_attempt_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/b"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string("destination"))
        .expect(1)
        .mount(&server)
        .await;

    // A single-attempt budget still allows the redirect chain through.
    let mut executor = executor_with(1);
    let mut request = GetText::new(format!("{}/a", server.uri()));
    let body = executor.execute(&mut request).await.expect("should follow");
    assert_eq!(body, "destination");
    assert_eq!(
        executor.last_url().expect("redirect recorded").path(),
        "/b"
    );
}

#[tokio::test]
async fn test_redirect_loop_stops_at_the_bound() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .expect(3)
        .mount(&server)
        .await;

    let config = EngineConfig {
        max_retries: 1,
        max_redirects: 3,
        ..EngineConfig::default()
    };
    let mut executor = RequestExecutor::new(Arc::new(config));
    let mut request = GetText::new(format!("{}/loop", server.uri()));
    let error = executor.execute(&mut request).await.unwrap_err();

    assert!(
        matches!(error, FetchError::TooManyRedirects { limit: 3 }),
        "got: {error:?}"
    );
}

#[tokio::test]
async fn test_retry_resumes_from_last_redirect_target() {
    let server = MockServer::start().await;

    // The entry point must be hit exactly once: the second attempt starts
    // at the redirect target, not back at the beginning.
    Mock::given(method("GET"))
        .and(path("/entry"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/moved"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(200).set_body_string("eventually"))
        .expect(1)
        .mount(&server)
        .await;

    let mut executor = executor_with(3);
    let mut request = GetText::new(format!("{}/entry", server.uri()));
    let body = executor.execute(&mut request).await.expect("should recover");
    assert_eq!(body, "eventually");
}

#[tokio::test]
async fn test_plain_text_error_body_becomes_the_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(409).set_body_string("Key mismatch"))
        .mount(&server)
        .await;

    let mut executor = executor_with(1);
    let mut request = PostForm::new(
        format!("{}/api", server.uri()),
        vec![("act".to_string(), "login".to_string())],
    );
    let error = executor.execute(&mut request).await.unwrap_err();

    match error {
        FetchError::ServerMessage { message } => assert_eq!(message, "Key mismatch"),
        other => panic!("expected ServerMessage, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_form_post_sends_pairs_urlencoded_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string("act=login&name=guest+user"))
        .respond_with(ResponseTemplate::new(200).set_body_string("welcome"))
        .expect(1)
        .mount(&server)
        .await;

    let mut executor = executor_with(1);
    let mut request = PostForm::new(
        format!("{}/login", server.uri()),
        vec![
            ("act".to_string(), "login".to_string()),
            ("name".to_string(), "guest user".to_string()),
        ],
    );
    let body = executor.execute(&mut request).await.expect("should succeed");
    assert_eq!(body, "welcome");
}

#[tokio::test]
async fn test_image_fetch_returns_bytes_and_content_type() {
    let server = MockServer::start().await;
    let payload = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    Mock::given(method("GET"))
        .and(path("/thumb/42.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/jpeg")
                .set_body_bytes(payload.clone()),
        )
        .mount(&server)
        .await;

    let mut executor = executor_with(1);
    let mut request = GetImage::new(format!("{}/thumb/42.jpg", server.uri()));
    let image = executor.execute(&mut request).await.expect("should succeed");
    assert_eq!(image.bytes, payload);
    assert_eq!(image.content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn test_image_fetch_rejects_empty_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/thumb/missing.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::new()))
        .mount(&server)
        .await;

    let mut executor = executor_with(1);
    let mut request = GetImage::new(format!("{}/thumb/missing.jpg", server.uri()));
    let error = executor.execute(&mut request).await.unwrap_err();
    assert!(matches!(error, FetchError::EmptyBody), "got: {error:?}");
}

#[tokio::test]
async fn test_access_probe_surfaces_soft_block() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/gif")
                .set_body_bytes(vec![0u8; 9615]),
        )
        .mount(&server)
        .await;

    let config = EngineConfig {
        max_retries: 1,
        block_signature: Some(BlockSignature::for_host("127.0.0.1")),
        ..EngineConfig::default()
    };
    let mut executor = RequestExecutor::new(Arc::new(config));
    let mut request = AccessProbe::new(format!("{}/", server.uri()));
    let error = executor.execute(&mut request).await.unwrap_err();
    assert!(matches!(error, FetchError::SoftBlock), "got: {error:?}");
}

#[tokio::test]
async fn test_access_probe_passes_clean_host() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = EngineConfig {
        max_retries: 1,
        block_signature: Some(BlockSignature::for_host("127.0.0.1")),
        ..EngineConfig::default()
    };
    let mut executor = RequestExecutor::new(Arc::new(config));
    let mut request = AccessProbe::new(format!("{}/", server.uri()));
    executor.execute(&mut request).await.expect("clean probe");
}

#[tokio::test]
async fn test_html_error_body_falls_back_to_bad_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/err"))
        .respond_with(
            ResponseTemplate::new(409).set_body_string("<html><body>oops</body></html>"),
        )
        .mount(&server)
        .await;

    let mut executor = executor_with(1);
    let mut request = GetText::new(format!("{}/err", server.uri()));
    let error = executor.execute(&mut request).await.unwrap_err();

    assert!(
        matches!(error, FetchError::BadStatus { status: 409, .. }),
        "got: {error:?}"
    );
}

#[tokio::test]
async fn test_malformed_url_rejected_before_connecting() {
    let mut executor = executor_with(3);
    let mut request = GetText::new("definitely not a url");
    let error = executor.execute(&mut request).await.unwrap_err();
    assert!(
        matches!(error, FetchError::InvalidUrl { .. }),
        "got: {error:?}"
    );
}

#[tokio::test]
async fn test_block_signature_match_classified_as_soft_block() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/challenge"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/gif")
                .set_body_bytes(vec![0u8; 9615]),
        )
        .mount(&server)
        .await;

    let config = EngineConfig {
        max_retries: 1,
        block_signature: Some(BlockSignature::for_host("127.0.0.1")),
        ..EngineConfig::default()
    };
    let mut executor = RequestExecutor::new(Arc::new(config));
    let mut request = GetText::new(format!("{}/challenge", server.uri()));
    let error = executor.execute(&mut request).await.unwrap_err();

    assert!(matches!(error, FetchError::SoftBlock), "got: {error:?}");
}

#[tokio::test]
async fn test_block_signature_ignores_ordinary_responses() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html; charset=utf-8")
                .set_body_string("<html>gallery</html>"),
        )
        .mount(&server)
        .await;

    let config = EngineConfig {
        block_signature: Some(BlockSignature::for_host("127.0.0.1")),
        ..EngineConfig::default()
    };
    let mut executor = RequestExecutor::new(Arc::new(config));
    let mut request = GetText::new(format!("{}/page", server.uri()));
    let body = executor.execute(&mut request).await.expect("not a block");
    assert_eq!(body, "<html>gallery</html>");
}

#[derive(Default)]
struct RecordingSession {
    captured: Mutex<Vec<String>>,
}

impl SessionHooks for RecordingSession {
    fn attach(&self, headers: &mut reqwest::header::HeaderMap, mode: Option<&str>) {
        let cookie = match mode {
            Some(mode) => format!("sid=abc123; mode={mode}"),
            None => "sid=abc123".to_string(),
        };
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&cookie) {
            headers.insert(reqwest::header::COOKIE, value);
        }
    }

    fn capture(&self, response: &reqwest::Response) {
        let mut captured = self.captured.lock().unwrap_or_else(|e| e.into_inner());
        for value in response.headers().get_all(reqwest::header::SET_COOKIE) {
            if let Ok(text) = value.to_str() {
                captured.push(text.to_string());
            }
        }
    }
}

#[tokio::test]
async fn test_session_hooks_attach_and_capture_on_rate_limited_host() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/g/42"))
        .and(header("Cookie", "sid=abc123; mode=wide"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "token=fresh")
                .set_body_string("gallery"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = EngineConfig {
        rate_limited_hosts: vec!["127.0.0.1".to_string()],
        ..EngineConfig::default()
    };
    let session = Arc::new(RecordingSession::default());
    let mut executor =
        RequestExecutor::new(Arc::new(config)).with_session(Arc::clone(&session) as _);
    executor.set_session_mode(Some("wide".to_string()));

    let mut request = GetText::new(format!("{}/g/42", server.uri()));
    let body = executor.execute(&mut request).await.expect("should succeed");
    assert_eq!(body, "gallery");

    let captured = session.captured.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(captured.as_slice(), ["token=fresh"]);
}

#[derive(Default)]
struct MemoryStore {
    persisted: Mutex<Option<Vec<String>>>,
}

impl ProxyStore for MemoryStore {
    fn load(&self) -> Option<Vec<String>> {
        self.persisted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, urls: &[String]) {
        *self.persisted.lock().unwrap_or_else(|e| e.into_inner()) = Some(urls.to_vec());
    }
}

#[tokio::test]
async fn test_proxy_refresh_installs_and_persists_remote_list() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_json(serde_json::json!({ "method": "proxy_urls" })))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"proxy_urls":{"urls":["http://proxy-1.example","http://proxy-2.example"]}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let pool = ProxyPool::new(Vec::new());
    let store = MemoryStore::default();
    let mut executor = executor_with(1);
    pool.refresh(&mut executor, &format!("{}/api", server.uri()), &store)
        .await;

    assert_eq!(pool.len(), 2);
    let saved = store.load().expect("list should be persisted");
    assert_eq!(
        saved,
        ["http://proxy-1.example", "http://proxy-2.example"]
    );
}

#[tokio::test]
async fn test_proxy_refresh_falls_back_to_persisted_list_on_bad_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"rows":[]}"#))
        .mount(&server)
        .await;

    let pool = ProxyPool::new(vec!["http://stale.example".to_string()]);
    let store = MemoryStore::default();
    store.save(&["http://persisted.example".to_string()]);

    let mut executor = executor_with(1);
    pool.refresh(&mut executor, &format!("{}/api", server.uri()), &store)
        .await;

    assert_eq!(pool.len(), 1);
    assert_eq!(pool.next().as_deref(), Some("http://persisted.example"));
}
