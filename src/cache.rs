//! Process-wide holder for the current corpus + index snapshot.
//!
//! # Lifecycle
//!
//! ```text
//!   absent ──get()──▶ rebuilding ──ok──▶ fresh ──ttl lapses──▶ stale
//!                        │                  ▲                    │
//!                        └─err: keep old ───┴──────get()─────────┘
//! ```
//!
//! - Created empty. The first [`IndexCache::get`] builds a snapshot.
//! - A snapshot is reused until it is older than the TTL.
//! - Rebuilds are serialized; callers that queued behind an in-flight
//!   rebuild reuse its result instead of starting another. That holds for
//!   a failed rebuild too: waiters get the stale snapshot (or the same
//!   error) rather than each retrying the source in turn.
//! - A new snapshot replaces the old one in a single pointer swap. Readers
//!   hold an `Arc<Snapshot>` and never see a partially built index.
//! - If a rebuild fails, the previous snapshot (possibly stale) stays
//!   installed and [`get`](IndexCache::get) keeps serving it.
//! - Dropping an in-flight `get`/`refresh` future cancels the rebuild at the
//!   adapter's await point; nothing is swapped.
//! - [`clear`](IndexCache::clear) tears the snapshot down.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::corpus::{build_corpus, FieldMapping};
use crate::error::{Error, Result};
use crate::index::{NgramRange, VectorIndex};
use crate::models::{Corpus, ScoredCandidate};
use crate::score::score;
use crate::select::{select_distinct, SelectParams};
use crate::traits::RecordSource;

/// A corpus and the index fitted on it, versioned together.
#[derive(Debug)]
pub struct Snapshot {
    corpus: Corpus,
    /// `None` when the corpus had no indexable text.
    index: Option<VectorIndex>,
    generation: u64,
    built_at: DateTime<Utc>,
    built_instant: Instant,
    fingerprint: String,
}

impl Snapshot {
    /// Fit an index over `corpus`.
    ///
    /// [`Error::EmptyVocabulary`] is absorbed: the snapshot is installed
    /// without an index and every query against it selects nothing.
    pub fn build(corpus: Corpus, ngram: NgramRange, generation: u64) -> Result<Self> {
        let index = match VectorIndex::build(&corpus, ngram) {
            Ok(index) => Some(index),
            Err(Error::EmptyVocabulary) => {
                warn!(
                    documents = corpus.len(),
                    "corpus has no indexable text, all queries will return no match"
                );
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            fingerprint: fingerprint(&corpus),
            corpus,
            index,
            generation,
            built_at: Utc::now(),
            built_instant: Instant::now(),
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    /// Monotonic build counter, starting at 1 for the first snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn age(&self) -> Duration {
        self.built_instant.elapsed()
    }

    /// Hex SHA-256 over every document's id and search text.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Scores for every document; empty when there is no index.
    pub fn score(&self, query: &str) -> Vec<(usize, f64)> {
        match &self.index {
            Some(index) => score(query, index),
            None => Vec::new(),
        }
    }

    /// Score, select and attach documents, best first.
    pub fn candidates(&self, query: &str, params: &SelectParams) -> Vec<ScoredCandidate> {
        let Some(index) = &self.index else {
            return Vec::new();
        };

        let scores = score(query, index);
        select_distinct(&scores, params, index)
            .into_iter()
            .filter_map(|pos| {
                self.corpus.get(pos).map(|doc| ScoredCandidate {
                    position: pos,
                    document: doc.clone(),
                    score: scores[pos].1,
                })
            })
            .collect()
    }
}

/// Content fingerprint of a corpus.
pub fn fingerprint(corpus: &Corpus) -> String {
    let mut hasher = Sha256::new();
    for doc in corpus.iter() {
        hasher.update(doc.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.search_text.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// TTL-bounded, atomically swapped snapshot holder.
pub struct IndexCache {
    source: Arc<dyn RecordSource>,
    fields: FieldMapping,
    ngram: NgramRange,
    ttl: Duration,
    current: RwLock<Option<Arc<Snapshot>>>,
    rebuild: Mutex<()>,
    generation: AtomicU64,
    /// Rebuild attempts that ran to completion, successful or not.
    attempts: AtomicU64,
    /// Error of the last completed attempt; `None` once one succeeds.
    last_failure: RwLock<Option<Error>>,
}

impl IndexCache {
    /// Create an empty cache over `source`.
    ///
    /// Nothing is fetched until the first [`get`](Self::get) or
    /// [`refresh`](Self::refresh).
    ///
    /// # Arguments
    ///
    /// * `fields` - property names used to derive titles and keywords.
    /// * `ngram` - character n-gram range for the index.
    /// * `ttl` - how long a snapshot is served before `get` rebuilds it.
    pub fn new(
        source: Arc<dyn RecordSource>,
        fields: FieldMapping,
        ngram: NgramRange,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            fields,
            ngram,
            ttl,
            current: RwLock::new(None),
            rebuild: Mutex::new(()),
            generation: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            last_failure: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The installed snapshot, fresh or not, without triggering a rebuild.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh().is_some()
    }

    fn fresh(&self) -> Option<Arc<Snapshot>> {
        self.current().filter(|s| s.age() < self.ttl)
    }

    /// A fresh snapshot, rebuilding if absent or expired.
    ///
    /// On rebuild failure the stale snapshot is returned if there is one;
    /// otherwise the failure propagates. Callers queued behind a failed
    /// rebuild share its outcome instead of starting another.
    pub async fn get(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        let seen = self.attempts.load(Ordering::SeqCst);
        let _guard = self.rebuild.lock().await;

        // Someone else rebuilt while we were queued.
        if let Some(snapshot) = self.fresh() {
            return Ok(snapshot);
        }

        // An attempt finished while we were queued; share its outcome.
        if self.attempts.load(Ordering::SeqCst) != seen {
            if let Some(stale) = self.current() {
                debug!(
                    generation = stale.generation(),
                    "queued behind a rebuild, serving its snapshot"
                );
                return Ok(stale);
            }
            if let Some(err) = self.last_failure() {
                return Err(err);
            }
        }

        match self.rebuild_locked().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => match self.current() {
                Some(stale) => {
                    warn!(
                        error = %e,
                        generation = stale.generation(),
                        age_secs = stale.age().as_secs(),
                        "index rebuild failed, serving stale index"
                    );
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Rebuild now, regardless of freshness.
    ///
    /// If another rebuild finished while this call was queued, its result is
    /// returned instead. On failure the previous snapshot stays installed and
    /// the error is returned.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let _guard = self.rebuild.lock().await;

        if self.attempts.load(Ordering::SeqCst) != seen {
            if let Some(err) = self.last_failure() {
                return Err(err);
            }
            if let Some(snapshot) = self.current() {
                return Ok(snapshot);
            }
        }

        self.rebuild_locked().await
    }

    /// Drop the installed snapshot. The next `get` rebuilds.
    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn last_failure(&self) -> Option<Error> {
        self.last_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Caller must hold `self.rebuild`.
    async fn rebuild_locked(&self) -> Result<Arc<Snapshot>> {
        let outcome = self.build_and_install().await;
        *self.last_failure.write().unwrap_or_else(PoisonError::into_inner) =
            outcome.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn build_and_install(&self) -> Result<Arc<Snapshot>> {
        let started = Instant::now();
        info!(source = self.source.name(), "rebuilding index");

        let corpus = build_corpus(self.source.as_ref(), &self.fields).await?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot::build(corpus, self.ngram, generation)?);

        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(snapshot.clone());

        let unchanged = previous
            .as_ref()
            .is_some_and(|p| p.fingerprint() == snapshot.fingerprint());
        info!(
            generation,
            documents = snapshot.corpus().len(),
            vocabulary = snapshot.index().map_or(0, VectorIndex::vocabulary_len),
            unchanged,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index rebuilt"
        );
        Ok(snapshot)
    }
}
