//! End-to-end pipeline tests against an in-memory knowledge base and a stub
//! generator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use prompt_finder::cache::IndexCache;
use prompt_finder::corpus::FieldMapping;
use prompt_finder::index::NgramRange;
use prompt_finder::models::{ContentBlock, PropertyValue, RawRecord};
use prompt_finder::select::{select, SelectParams};
use prompt_finder::traits::{Generator, RecordSource};
use prompt_finder::{Error, PromptFinder, Result, SearchOutcome};

// ============ Test doubles ============

struct MemorySource {
    records: Mutex<Vec<RawRecord>>,
    blocks: Mutex<HashMap<String, Result<Vec<ContentBlock>>>>,
    fail: AtomicBool,
    fetches: AtomicUsize,
    gated: AtomicBool,
    gate: Semaphore,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self {
            records: Mutex::default(),
            blocks: Mutex::default(),
            fail: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }
}

impl MemorySource {
    fn with_docs(docs: &[(&str, &str, &str)]) -> Arc<Self> {
        let source = Arc::new(Self::default());
        source.replace(docs);
        source
    }

    fn replace(&self, docs: &[(&str, &str, &str)]) {
        let mut records = self.records.lock().unwrap();
        let mut blocks = self.blocks.lock().unwrap();
        records.clear();
        blocks.clear();
        for (id, title, body) in docs {
            records.push(
                RawRecord::new(*id).with_property("Name", PropertyValue::Title(title.to_string())),
            );
            blocks.insert(id.to_string(), Ok(vec![ContentBlock::paragraph(*body)]));
        }
    }

    fn break_blocks(&self, id: &str) {
        self.blocks
            .lock()
            .unwrap()
            .insert(id.to_string(), Err(Error::malformed(id, "403 restricted")));
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_records(&self) -> Result<Vec<RawRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            let _permit = self.gate.acquire().await.unwrap();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::FetchFailure("database unreachable".into()));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn fetch_blocks(&self, record_id: &str) -> Result<Vec<ContentBlock>> {
        self.blocks
            .lock()
            .unwrap()
            .get(record_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
struct StubGenerator {
    prompts: Mutex<Vec<String>>,
    fail: AtomicBool,
}

#[async_trait]
impl Generator for StubGenerator {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::GenerationFailure("quota exceeded".into()));
        }
        Ok("Use the first prompt.".to_string())
    }
}

fn finder_with(
    source: Arc<MemorySource>,
    generator: Arc<StubGenerator>,
    ttl: Duration,
) -> PromptFinder {
    let cache = IndexCache::new(source, FieldMapping::default(), NgramRange::default(), ttl);
    PromptFinder::new(Arc::new(cache), generator, SelectParams::default())
}

fn recipes() -> Arc<MemorySource> {
    MemorySource::with_docs(&[
        ("a", "A", "apple pie recipe"),
        ("b", "B", "banana bread recipe"),
    ])
}

// ============ Scenarios ============

#[tokio::test]
async fn test_query_ranks_matching_document_first() {
    let generator = Arc::new(StubGenerator::default());
    let finder = finder_with(recipes(), generator.clone(), Duration::from_secs(600));

    let candidates = finder.candidates("apple").await.unwrap();
    assert_eq!(candidates[0].document.id, "a");
    assert!(candidates[0].score > 0.1);

    match finder.search("apple").await.unwrap() {
        SearchOutcome::Answer(answer) => {
            assert_eq!(answer.text, "Use the first prompt.");
            assert_eq!(answer.matches[0].document.title, "A");
        }
        SearchOutcome::NoMatch => panic!("expected an answer"),
    }

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("## Request\napple"));
    assert!(prompts[0].contains("## Prompt 1: A\napple pie recipe"));
}

#[tokio::test]
async fn test_unrelated_query_is_no_match_without_generation() {
    let source = MemorySource::with_docs(&[("a", "A", "x")]);
    let generator = Arc::new(StubGenerator::default());
    let finder = finder_with(source, generator.clone(), Duration::from_secs(600));

    assert!(finder.candidates("completely unrelated zzz").await.unwrap().is_empty());
    assert!(matches!(
        finder.search("completely unrelated zzz").await.unwrap(),
        SearchOutcome::NoMatch
    ));
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_inaccessible_blocks_degrade_one_document() {
    let source = MemorySource::with_docs(&[
        ("a", "Apple", "apple pie recipe"),
        ("locked", "Locked", "secret body"),
        ("b", "Banana", "banana bread recipe"),
    ]);
    source.break_blocks("locked");
    let finder = finder_with(source, Arc::new(StubGenerator::default()), Duration::from_secs(600));

    let stats = finder.stats().await.unwrap();
    assert_eq!(stats.documents, 3);

    let snapshot = finder.cache().current().unwrap();
    let locked = snapshot.corpus().get(1).unwrap();
    assert_eq!(locked.body, "");
    assert_eq!(locked.search_text, "Locked");
    assert_eq!(snapshot.corpus().get(2).unwrap().body, "banana bread recipe");

    let hits = finder.candidates("banana bread").await.unwrap();
    assert_eq!(hits[0].document.id, "b");
}

#[tokio::test]
async fn test_readers_see_one_version_during_rebuild() {
    let source = recipes();
    let finder = Arc::new(finder_with(
        source.clone(),
        Arc::new(StubGenerator::default()),
        Duration::from_secs(600),
    ));
    let first = finder.cache().get().await.unwrap();
    assert_eq!(first.generation(), 1);

    // New content, held back behind the gate.
    source.replace(&[("c", "C", "cherry tart recipe")]);
    source.gated.store(true, Ordering::SeqCst);
    let refreshing = {
        let finder = finder.clone();
        tokio::spawn(async move { finder.refresh().await })
    };
    while source.fetches.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    let mut readers = Vec::new();
    for _ in 0..5 {
        let finder = finder.clone();
        readers.push(tokio::spawn(async move {
            let snapshot = finder.cache().get().await.unwrap();
            let hits = snapshot.candidates("apple recipe", finder.select_params());
            (snapshot.generation(), hits)
        }));
    }
    let mut results = Vec::new();
    for reader in readers {
        results.push(reader.await.unwrap());
    }
    for (generation, hits) in &results {
        assert_eq!(*generation, 1);
        assert_eq!(hits, &results[0].1);
        assert_eq!(hits[0].document.id, "a");
    }

    source.gate.add_permits(1);
    let stats = refreshing.await.unwrap().unwrap();
    assert_eq!(stats.generation, 2);
    assert_eq!(stats.documents, 1);

    let after = finder.candidates("cherry").await.unwrap();
    assert_eq!(after[0].document.id, "c");
}

#[test]
fn test_threshold_keeps_two_of_three() {
    let scores = vec![(0, 0.05), (1, 0.15), (2, 0.9)];
    assert_eq!(select(&scores, &SelectParams::default()), vec![2, 1]);
}

// ============ Properties ============

#[tokio::test]
async fn test_rebuild_from_same_corpus_is_bit_identical() {
    let generator = Arc::new(StubGenerator::default());
    let finder = finder_with(recipes(), generator, Duration::from_secs(600));

    let before = finder.candidates("recipe for apple").await.unwrap();
    let first_fingerprint = finder.stats().await.unwrap().fingerprint;
    let stats = finder.refresh().await.unwrap();
    let after = finder.candidates("recipe for apple").await.unwrap();

    assert_eq!(stats.generation, 2);
    assert_eq!(stats.fingerprint, first_fingerprint);
    assert_eq!(before, after);
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.score.to_bits(), a.score.to_bits());
    }
}

#[tokio::test]
async fn test_concurrent_cold_reads_fetch_once() {
    let source = recipes();
    let finder = Arc::new(finder_with(
        source.clone(),
        Arc::new(StubGenerator::default()),
        Duration::from_secs(600),
    ));

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let finder = finder.clone();
        tasks.push(tokio::spawn(async move { finder.candidates("banana").await }));
    }
    for task in tasks {
        assert!(!task.await.unwrap().unwrap().is_empty());
    }
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
}

// ============ Error handling ============

#[tokio::test]
async fn test_fetch_failure_without_index_is_error() {
    let source = recipes();
    source.fail.store(true, Ordering::SeqCst);
    let finder = finder_with(source, Arc::new(StubGenerator::default()), Duration::from_secs(600));

    let err = finder.search("apple").await.unwrap_err();
    assert!(matches!(err, Error::FetchFailure(_)));
}

#[tokio::test]
async fn test_fetch_failure_with_index_serves_stale() {
    let source = recipes();
    let finder = finder_with(source.clone(), Arc::new(StubGenerator::default()), Duration::ZERO);

    assert!(matches!(finder.search("apple").await.unwrap(), SearchOutcome::Answer(_)));

    source.fail.store(true, Ordering::SeqCst);
    match finder.search("apple").await.unwrap() {
        SearchOutcome::Answer(answer) => assert_eq!(answer.matches[0].document.id, "a"),
        SearchOutcome::NoMatch => panic!("stale index should still answer"),
    }
    assert_eq!(finder.cache().current().unwrap().generation(), 1);

    // An explicit refresh reports the failure.
    assert!(matches!(finder.refresh().await, Err(Error::FetchFailure(_))));
}

#[tokio::test]
async fn test_generation_failure_is_error() {
    let generator = Arc::new(StubGenerator::default());
    generator.fail.store(true, Ordering::SeqCst);
    let finder = finder_with(recipes(), generator, Duration::from_secs(600));

    let err = finder.search("apple").await.unwrap_err();
    assert!(matches!(err, Error::GenerationFailure(_)));
}

#[tokio::test]
async fn test_empty_text_corpus_is_no_match() {
    let source = Arc::new(MemorySource::default());
    source
        .records
        .lock()
        .unwrap()
        .push(RawRecord::new("blank"));
    let finder = finder_with(source, Arc::new(StubGenerator::default()), Duration::from_secs(600));

    assert!(matches!(finder.search("anything").await.unwrap(), SearchOutcome::NoMatch));
    let stats = finder.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.vocabulary, 0);
}

#[tokio::test]
async fn test_empty_query_is_no_match() {
    let source = recipes();
    let generator = Arc::new(StubGenerator::default());
    let finder = finder_with(source.clone(), generator, Duration::from_secs(600));

    assert!(matches!(finder.search("   ").await.unwrap(), SearchOutcome::NoMatch));
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cjk_query_matches_without_word_boundaries() {
    let source = MemorySource::with_docs(&[
        ("minutes", "議事録の要約", "会議の議事録を三行で要約してください"),
        ("translate", "英語への翻訳", "次の文章を自然な英語に翻訳してください"),
    ]);
    let finder = finder_with(source, Arc::new(StubGenerator::default()), Duration::from_secs(600));

    let hits = finder.candidates("議事録をまとめたい").await.unwrap();
    assert_eq!(hits[0].document.id, "minutes");
    assert!(hits.iter().all(|h| h.document.id != "translate"));
}
