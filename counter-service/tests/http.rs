//! Request handling against an in-process store and a real audit file.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use counter_service::{
    audit::AuditSink,
    http::{COUNT_UNAVAILABLE, COUNTER_KEY, router},
    store::{ConnectivityState, MemoryStore, StoreClient},
};
use futures::future::join_all;
use rand::Rng;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

struct Harness {
    app: Router,
    backend: Arc<MemoryStore>,
    store: StoreClient<MemoryStore>,
    sink: Arc<AuditSink>,
    dump_file: PathBuf,
    _dir: TempDir,
}

impl Harness {
    async fn start() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let dump_file = dir.path().join("trackdata.txt");
        let sink = Arc::new(AuditSink::open(&dump_file).await?);

        let backend = Arc::new(MemoryStore::new());
        let store = StoreClient::new(Arc::clone(&backend), Duration::from_millis(10));
        store.connect().await?;
        store.reset(COUNTER_KEY).await?;

        let app = router(store.clone(), Arc::clone(&sink));
        Ok(Self {
            app,
            backend,
            store,
            sink,
            dump_file,
            _dir: dir,
        })
    }

    async fn send(&self, method: Method, uri: &str) -> Result<(StatusCode, String)> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())?;
        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, String::from_utf8(body.to_vec())?))
    }

    async fn track(&self, query: &str) -> Result<StatusCode> {
        let (status, body) = self.send(Method::POST, &format!("/track?{query}")).await?;
        assert!(body.is_empty(), "track responds with an empty body");
        Ok(status)
    }

    /// Lets fire-and-forget increments reach the store, then reads `/count`.
    async fn count(&self) -> Result<(StatusCode, String)> {
        settle().await;
        self.send(Method::GET, "/count").await
    }

    /// Closes the sink so every queued record is on disk, then parses the dump.
    async fn audit_log(&self) -> Result<Vec<Value>> {
        self.sink.close().await?;
        let contents = tokio::fs::read_to_string(&self.dump_file).await?;
        contents
            .lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn expect_track_result(query: &str, expected: &str) -> Result<()> {
    let harness = Harness::start().await?;
    assert_eq!(harness.track(query).await?, StatusCode::OK);
    assert_eq!(
        harness.count().await?,
        (StatusCode::OK, expected.to_string()),
        "after track?{query}"
    );
    Ok(())
}

#[tokio::test]
async fn processes_track_request() -> Result<()> {
    expect_track_result("count=15&foo=bar", "15").await
}

#[tokio::test]
async fn ignores_non_numeric_counts() -> Result<()> {
    expect_track_result("count=12dropTableStudents", "0").await
}

#[tokio::test]
async fn rounds_down_float_counts() -> Result<()> {
    expect_track_result("count=1.9", "1").await
}

#[tokio::test]
async fn accepts_prefixed_integer_counts() -> Result<()> {
    expect_track_result("count=0x10", "16").await?;
    expect_track_result("count=0b11", "3").await?;
    expect_track_result("count=0o7", "7").await
}

#[tokio::test]
async fn ignores_negative_zero_and_missing_counts() -> Result<()> {
    expect_track_result("count=-1", "0").await?;
    expect_track_result("count=0", "0").await?;
    expect_track_result("foo=bar", "0").await?;
    expect_track_result("", "0").await
}

#[tokio::test]
async fn counts_accumulate_across_requests() -> Result<()> {
    let harness = Harness::start().await?;
    for query in ["count=3", "count=abc", "count=4.7", "count=-8"] {
        assert_eq!(harness.track(query).await?, StatusCode::OK);
    }
    assert_eq!(harness.count().await?, (StatusCode::OK, "7".to_string()));
    Ok(())
}

#[tokio::test]
async fn appends_query_params_into_dump_file() -> Result<()> {
    let harness = Harness::start().await?;
    harness.track("count=1&name=first&foo=bar").await?;
    harness.track("name=second").await?;

    assert_eq!(
        harness.audit_log().await?,
        vec![
            json!({"count": "1", "name": "first", "foo": "bar"}),
            json!({"name": "second"}),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn dump_keeps_parameter_order_and_decoding() -> Result<()> {
    let harness = Harness::start().await?;
    harness.track("zeta=1&alpha=hello%20world&count=2").await?;
    harness.sink.close().await?;

    let contents = tokio::fs::read_to_string(&harness.dump_file).await?;
    assert_eq!(
        contents,
        "{\"zeta\":\"1\",\"alpha\":\"hello world\",\"count\":\"2\"}\n"
    );
    Ok(())
}

#[tokio::test]
async fn handles_concurrency() -> Result<()> {
    let harness = Harness::start().await?;
    let counts: Vec<u64> = {
        let mut rng = rand::thread_rng();
        (0..20).map(|_| rng.gen_range(0..1000)).collect()
    };
    let total: u64 = counts.iter().sum();

    let client = &harness;
    let responses = join_all(counts.iter().map(|count| {
        let query = format!("count={count}");
        async move { client.track(&query).await }
    }))
    .await;
    for status in responses {
        assert_eq!(status?, StatusCode::OK);
    }

    assert_eq!(harness.count().await?, (StatusCode::OK, total.to_string()));
    assert_eq!(harness.backend.value(COUNTER_KEY).await, Some(total as i64));
    assert_eq!(harness.audit_log().await?.len(), counts.len());
    Ok(())
}

#[tokio::test]
async fn rejects_unknown_paths_and_methods() -> Result<()> {
    let harness = Harness::start().await?;
    for (method, uri) in [
        (Method::POST, "/count"),
        (Method::GET, "/track"),
        (Method::GET, "/random/path"),
        (Method::POST, "/random/path"),
        (Method::POST, "/"),
        (Method::GET, "/"),
        (Method::DELETE, "/count"),
    ] {
        let (status, _) = harness.send(method.clone(), uri).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
    }

    assert!(harness.audit_log().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unreachable_store_fails_reads_but_not_tracks() -> Result<()> {
    let harness = Harness::start().await?;
    harness.track("count=5").await?;
    assert_eq!(harness.count().await?, (StatusCode::OK, "5".to_string()));

    harness.backend.set_reachable(false);
    assert_eq!(
        harness.count().await?,
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            COUNT_UNAVAILABLE.to_string()
        )
    );
    assert_eq!(harness.track("count=10&while=down").await?, StatusCode::OK);
    settle().await;

    harness.backend.set_reachable(true);
    tokio::time::timeout(Duration::from_secs(2), async {
        while harness.store.state() != ConnectivityState::Connected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    // The increment issued while the store was down is gone; its audit record is not.
    assert_eq!(harness.count().await?, (StatusCode::OK, "5".to_string()));
    assert_eq!(
        harness.audit_log().await?,
        vec![json!({"count": "5"}), json!({"count": "10", "while": "down"})]
    );

    harness.store.close().await?;
    Ok(())
}

#[tokio::test]
async fn missing_counter_reads_as_zero() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sink = Arc::new(AuditSink::open(dir.path().join("trackdata.txt")).await?);
    let backend = Arc::new(MemoryStore::new());
    let store = StoreClient::new(Arc::clone(&backend), Duration::from_millis(10));
    store.connect().await?;

    let response = router(store.clone(), sink)
        .oneshot(Request::get("/count").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(to_bytes(response.into_body(), usize::MAX).await?, "0");

    store.close().await?;
    Ok(())
}
