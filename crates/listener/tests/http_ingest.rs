use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use listener::{ListenerConfig, ListenerService};
use regex::Regex;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::oneshot, task::JoinSet};

const TS_PATTERN: &str = r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}Z";

struct TestServer {
    addr: SocketAddr,
    log_file: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_file = dir.path().join("logs").join("portwatcher.log");
        Self::start_with(dir, log_file).await
    }

    async fn start_with(dir: TempDir, log_file: PathBuf) -> Self {
        let service = ListenerService::new(ListenerConfig::with_log_file(&log_file));
        service.bootstrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(service.serve(listener, async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            log_file,
            shutdown: Some(tx),
            handle,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn lines(&self) -> Vec<String> {
        read_lines(&self.log_file)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle
            .await
            .expect("server task")
            .expect("server exits cleanly");
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn bootstrap_creates_log_directory() {
    let server = TestServer::start().await;
    assert!(server.log_file.parent().expect("parent").is_dir());
    server.stop().await;
}

#[tokio::test]
async fn json_ingest_appends_object_with_ts() {
    let server = TestServer::start().await;
    let client = Client::new();

    let response = client
        .post(server.url("/ingest"))
        .header(CONTENT_TYPE, "application/json")
        .body(r#"{"host":"10.0.0.7","port":5432,"tags":["db","prod"]}"#)
        .send()
        .await
        .expect("send");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.text().await.expect("body").is_empty());

    let lines = server.lines();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(&lines[0]).expect("json line");
    let object = record.as_object().expect("object");
    assert_eq!(object.keys().next().map(String::as_str), Some("ts"));
    assert_eq!(object["host"], "10.0.0.7");
    assert_eq!(object["port"], 5432);
    assert_eq!(object["tags"], serde_json::json!(["db", "prod"]));

    let ts_re = Regex::new(&format!("^{TS_PATTERN}$")).expect("regex");
    assert!(ts_re.is_match(object["ts"].as_str().expect("ts string")));

    server.stop().await;
}

#[tokio::test]
async fn malformed_json_leaves_log_untouched() {
    let server = TestServer::start().await;
    let client = Client::new();

    client
        .post(server.url("/logline"))
        .body("before")
        .send()
        .await
        .expect("send");
    let before = server.lines().len();

    let response = client
        .post(server.url("/ingest"))
        .header(CONTENT_TYPE, "application/json")
        .body(r#"{"a":"#)
        .send()
        .await
        .expect("send");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.expect("body"), "invalid json");
    assert_eq!(server.lines().len(), before);

    server.stop().await;
}

#[tokio::test]
async fn empty_text_is_rejected_by_ingest_only() {
    let server = TestServer::start().await;
    let client = Client::new();

    let response = client
        .post(server.url("/ingest"))
        .header(CONTENT_TYPE, "text/plain")
        .body("")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.expect("body"), "empty body");
    assert!(server.lines().is_empty());

    let response = client
        .post(server.url("/logline"))
        .body("")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.expect("body"), r#"{"status":"ok"}"#);

    let lines = server.lines();
    assert_eq!(lines.len(), 1);
    let re = Regex::new(&format!("^{TS_PATTERN} $")).expect("regex");
    assert!(re.is_match(&lines[0]), "unexpected line {:?}", lines[0]);

    server.stop().await;
}

#[tokio::test]
async fn logline_prefixes_timestamp() {
    let server = TestServer::start().await;

    let response = Client::new()
        .post(server.url("/logline"))
        .body("hello")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::OK);

    let lines = server.lines();
    assert_eq!(lines.len(), 1);
    let re = Regex::new(&format!("^{TS_PATTERN} hello$")).expect("regex");
    assert!(re.is_match(&lines[0]), "unexpected line {:?}", lines[0]);

    server.stop().await;
}

#[tokio::test]
async fn healthz_ignores_unwritable_destination() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "").expect("write blocker");
    let server = TestServer::start_with(dir, blocker.join("portwatcher.log")).await;
    let client = Client::new();

    let response = client
        .get(server.url("/healthz"))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.expect("body"), r#"{"status":"ok"}"#);

    // Writes fail silently; callers are still acknowledged.
    let response = client
        .post(server.url("/ingest"))
        .body("dropped")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_json_posts_produce_whole_lines() {
    const REQUESTS: usize = 64;

    let server = TestServer::start().await;
    let client = Client::new();
    let url = server.url("/ingest");
    let padding = "p".repeat(2048);

    let mut tasks = JoinSet::new();
    for id in 0..REQUESTS {
        let client = client.clone();
        let url = url.clone();
        let body = serde_json::json!({ "id": id, "padding": padding }).to_string();
        tasks.spawn(async move {
            client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .expect("send")
                .status()
        });
    }

    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.expect("task"), StatusCode::ACCEPTED);
    }

    let lines = server.lines();
    assert_eq!(lines.len(), REQUESTS);

    let mut seen: Vec<u64> = lines
        .iter()
        .map(|line| {
            let record: serde_json::Value = serde_json::from_str(line).expect("whole json line");
            assert_eq!(record["padding"].as_str().map(str::len), Some(2048));
            record["id"].as_u64().expect("id")
        })
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..REQUESTS as u64).collect::<Vec<_>>());

    server.stop().await;
}

#[tokio::test]
async fn cross_origin_preflight_is_allowed() {
    let server = TestServer::start().await;

    let response = Client::new()
        .request(reqwest::Method::OPTIONS, server.url("/ingest"))
        .header("origin", "https://console.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .expect("send");

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("*")
    );

    server.stop().await;
}
