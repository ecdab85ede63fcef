//! Index and corpus statistics.
//!
//! A quick summary of what the current snapshot holds: document counts,
//! vocabulary size and freshness. Used by `pfind stats` and `GET /stats` to
//! confirm that the knowledge base is being read as expected.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::Snapshot;
use crate::config::Config;
use crate::search::PromptFinder;

/// Summary of one index snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    /// Documents whose search text is empty. They never score above zero.
    pub empty_documents: usize,
    pub vocabulary: usize,
    /// Stored weights across all rows.
    pub nonzeros: usize,
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub fingerprint: String,
    /// Whether the snapshot is still inside its TTL window.
    pub fresh: bool,
}

impl IndexStats {
    pub fn from_snapshot(snapshot: &Snapshot, fresh: bool) -> Self {
        let corpus = snapshot.corpus();
        let index = snapshot.index();
        Self {
            documents: corpus.len(),
            empty_documents: corpus.iter().filter(|d| d.search_text.is_empty()).count(),
            vocabulary: index.map_or(0, |i| i.vocabulary_len()),
            nonzeros: index.map_or(0, |i| i.nonzeros()),
            generation: snapshot.generation(),
            built_at: snapshot.built_at(),
            fingerprint: snapshot.fingerprint().to_string(),
            fresh,
        }
    }
}

/// Print statistics for the configured knowledge base.
///
/// Builds the index first, since a CLI process starts with an empty cache.
pub async fn run_stats(config: &Config) -> Result<()> {
    let finder = PromptFinder::from_config(config)?;
    let stats = finder.stats().await?;
    print_stats(&config.notion.database_id, &stats);
    Ok(())
}

pub(crate) fn print_stats(database_id: &str, stats: &IndexStats) {
    println!("Prompt Finder: Index Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", database_id);
    println!("  Generation:  {}", stats.generation);
    println!(
        "  Built:       {}{}",
        stats.built_at.format("%Y-%m-%d %H:%M:%S UTC"),
        if stats.fresh { "" } else { " (stale)" }
    );
    println!("  Fingerprint: {}", &stats.fingerprint[..stats.fingerprint.len().min(16)]);
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Empty:       {}", stats.empty_documents);
    println!("  Vocabulary:  {}", stats.vocabulary);
    println!("  Nonzeros:    {}", stats.nonzeros);
    println!();
}
