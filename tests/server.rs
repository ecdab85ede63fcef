//! HTTP server tests: the real router on an ephemeral port, driven with
//! reqwest.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prompt_finder::cache::IndexCache;
use prompt_finder::corpus::FieldMapping;
use prompt_finder::index::NgramRange;
use prompt_finder::models::{ContentBlock, PropertyValue, RawRecord};
use prompt_finder::select::SelectParams;
use prompt_finder::server;
use prompt_finder::traits::{Generator, RecordSource};
use prompt_finder::{Error, PromptFinder, Result};

struct FixedSource {
    down: AtomicBool,
}

#[async_trait]
impl RecordSource for FixedSource {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::FetchFailure("401 unauthorized".into()));
        }
        Ok(vec![
            RawRecord::new("a")
                .with_property("Name", PropertyValue::Title("Apple".into()))
                .with_property("Keywords", PropertyValue::MultiSelect(vec!["fruit".into()])),
            RawRecord::new("b").with_property("Name", PropertyValue::Title("Banana".into())),
        ])
    }

    async fn fetch_blocks(&self, record_id: &str) -> Result<Vec<ContentBlock>> {
        let body = match record_id {
            "a" => "apple pie recipe",
            _ => "banana bread recipe",
        };
        Ok(vec![ContentBlock::paragraph(body)])
    }
}

struct EchoGenerator {
    down: bool,
}

#[async_trait]
impl Generator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.down {
            return Err(Error::GenerationFailure("quota exceeded".into()));
        }
        Ok(format!("prompt had {} chars", prompt.chars().count()))
    }
}

async fn start(source_down: bool, generator_down: bool) -> String {
    let source = Arc::new(FixedSource {
        down: AtomicBool::new(source_down),
    });
    let cache = IndexCache::new(
        source,
        FieldMapping::default(),
        NgramRange::default(),
        Duration::from_secs(600),
    );
    let finder = PromptFinder::new(
        Arc::new(cache),
        Arc::new(EchoGenerator {
            down: generator_down,
        }),
        SelectParams::default(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server::serve(listener, Arc::new(finder)).await.ok();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health() {
    let base = start(false, false).await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_search_answer() {
    let base = start(false, false).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/search", base))
        .json(&json!({ "query": "apple" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "answer");
    assert!(body["answer"].as_str().unwrap().starts_with("prompt had"));
    assert_eq!(body["matches"][0]["id"], "a");
    assert_eq!(body["matches"][0]["title"], "Apple");
}

#[tokio::test]
async fn test_search_no_match_is_not_an_error() {
    let base = start(false, false).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/search", base))
        .json(&json!({ "query": "zzz qqq" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "no_match");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_search_unavailable_when_source_down() {
    let base = start(true, false).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/search", base))
        .json(&json!({ "query": "apple" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unavailable");
}

#[tokio::test]
async fn test_search_unavailable_when_generator_down() {
    let base = start(false, true).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/search", base))
        .json(&json!({ "query": "apple" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unavailable");
    assert!(body["error"]["message"].as_str().unwrap().contains("quota"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let base = start(false, false).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/search", base))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_candidates_with_overrides() {
    let base = start(false, false).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/candidates", base))
        .json(&json!({ "query": "recipe", "threshold": 0.0, "limit": 5 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let candidates = body["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates[0]["score"].as_f64().unwrap() >= candidates[1]["score"].as_f64().unwrap());
    let apple = candidates
        .iter()
        .find(|c| c["document"]["id"] == "a")
        .unwrap();
    assert_eq!(apple["document"]["keywords"], json!(["fruit"]));

    let resp = client
        .post(format!("{}/candidates", base))
        .json(&json!({ "query": "recipe", "limit": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_stats_and_refresh() {
    let base = start(false, false).await;
    let client = reqwest::Client::new();

    let stats: Value = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["documents"], 2);
    assert_eq!(stats["generation"], 1);
    assert_eq!(stats["fresh"], true);

    let refreshed: Value = client
        .post(format!("{}/refresh", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refreshed["generation"], 2);
    assert_eq!(refreshed["fingerprint"], stats["fingerprint"]);
}
