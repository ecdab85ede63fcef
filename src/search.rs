//! Query orchestration: cached index → candidates → bundle → generator.
//!
//! [`PromptFinder`] is the caller-facing entry point shared by the CLI and
//! the HTTP server. A query ends in one of three ways:
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | [`SearchOutcome::Answer`] | at least one prompt cleared the threshold and the generator replied |
//! | [`SearchOutcome::NoMatch`] | nothing cleared the threshold; the generator is not called |
//! | `Err(_)` | the index could not be built, or the generator failed |
//!
//! Callers must present `NoMatch` ("no relevant prompt found") distinctly
//! from an error ("search is temporarily unavailable").

use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bundle;
use crate::cache::IndexCache;
use crate::config::Config;
use crate::connector_notion::NotionSource;
use crate::error::Result;
use crate::generator::create_generator;
use crate::models::ScoredCandidate;
use crate::select::SelectParams;
use crate::stats::{print_stats, IndexStats};
use crate::traits::Generator;

/// Preamble sent ahead of the user's request and the candidate prompts.
pub const DEFAULT_INSTRUCTIONS: &str = "You help people pick a reusable prompt from a shared prompt library. \
Using only the candidate prompts below, recommend the one that best fits the request and explain how to adapt it.";

/// A generated answer with the prompts it was based on, best first.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub matches: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Answer(Answer),
    NoMatch,
}

/// Retrieval pipeline plus generator.
pub struct PromptFinder {
    cache: Arc<IndexCache>,
    generator: Arc<dyn Generator>,
    params: SelectParams,
    instructions: String,
}

impl PromptFinder {
    /// Wire a finder from its parts, using [`DEFAULT_INSTRUCTIONS`].
    ///
    /// # Arguments
    ///
    /// * `cache` - snapshot holder shared with other surfaces.
    /// * `generator` - model that explains the selected prompts.
    /// * `params` - threshold, result cap and near-duplicate setting.
    pub fn new(
        cache: Arc<IndexCache>,
        generator: Arc<dyn Generator>,
        params: SelectParams,
    ) -> Self {
        Self {
            cache,
            generator,
            params,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
        }
    }

    /// Replace the instructions placed before the request and candidates.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Wire up the Notion source and the configured generator.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let source = NotionSource::from_config(&config.notion)
            .context("Failed to configure Notion source")?;
        let generator =
            create_generator(&config.generator).context("Failed to configure generator")?;
        let cache = IndexCache::new(
            Arc::new(source),
            config.notion.field_mapping(),
            config.retrieval.ngram_range()?,
            config.cache.ttl(),
        );

        let mut finder = Self::new(Arc::new(cache), generator, config.retrieval.select_params());
        if let Some(instructions) = &config.generator.instructions {
            finder = finder.with_instructions(instructions.clone());
        }
        Ok(finder)
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.cache
    }

    pub fn select_params(&self) -> &SelectParams {
        &self.params
    }

    /// Selected candidates under the configured parameters.
    pub async fn candidates(&self, query: &str) -> Result<Vec<ScoredCandidate>> {
        self.candidates_with(query, &self.params).await
    }

    /// Selected candidates under explicit parameters. Never calls the
    /// generator.
    pub async fn candidates_with(
        &self,
        query: &str,
        params: &SelectParams,
    ) -> Result<Vec<ScoredCandidate>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.cache.get().await?;
        Ok(snapshot.candidates(query, params))
    }

    /// Answer a free-text question.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        if query.trim().is_empty() {
            debug!("empty query");
            return Ok(SearchOutcome::NoMatch);
        }

        let snapshot = self.cache.get().await?;
        let matches = snapshot.candidates(query, &self.params);
        if matches.is_empty() {
            info!(generation = snapshot.generation(), "no candidate cleared the threshold");
            return Ok(SearchOutcome::NoMatch);
        }

        let positions: Vec<usize> = matches.iter().map(|c| c.position).collect();
        let bundle = bundle::package(snapshot.corpus(), &positions);
        let prompt = compose_prompt(&self.instructions, query, &bundle);

        debug!(
            candidates = matches.len(),
            model = self.generator.model_name(),
            prompt_chars = prompt.chars().count(),
            "calling generator"
        );
        let text = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, model = self.generator.model_name(), "generator call failed");
                return Err(e);
            }
        };

        Ok(SearchOutcome::Answer(Answer { text, matches }))
    }

    /// Force a rebuild and report the resulting snapshot.
    pub async fn refresh(&self) -> Result<IndexStats> {
        let snapshot = self.cache.refresh().await?;
        Ok(IndexStats::from_snapshot(&snapshot, self.cache.is_fresh()))
    }

    /// Stats for the current snapshot, building it if absent or expired.
    pub async fn stats(&self) -> Result<IndexStats> {
        let snapshot = self.cache.get().await?;
        Ok(IndexStats::from_snapshot(&snapshot, self.cache.is_fresh()))
    }
}

/// The text handed to the generator.
pub fn compose_prompt(instructions: &str, query: &str, bundle: &str) -> String {
    format!(
        "{}\n\n## Request\n{}\n\n## Candidate prompts\n\n{}",
        instructions.trim_end(),
        query.trim(),
        bundle
    )
}

// ============ CLI commands ============

/// Run `pfind search`: print the recommendation and the prompts it used.
pub async fn run_search(config: &Config, query: &str) -> anyhow::Result<()> {
    let finder = PromptFinder::from_config(config)?;

    match finder.search(query).await? {
        SearchOutcome::NoMatch => {
            println!("No relevant prompt found.");
        }
        SearchOutcome::Answer(answer) => {
            println!("{}", answer.text.trim_end());
            println!();
            println!("Based on:");
            for (i, m) in answer.matches.iter().enumerate() {
                println!("  {}. [{:.2}] {}", i + 1, m.score, display_title(m));
            }
        }
    }
    Ok(())
}

/// Run `pfind candidates`: print ranked matches without calling the model.
///
/// `threshold` and `limit` override the configured selection for this call.
pub async fn run_candidates(
    config: &Config,
    query: &str,
    threshold: Option<f64>,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let finder = PromptFinder::from_config(config)?;

    let mut params = finder.select_params().clone();
    if let Some(t) = threshold {
        params.relevance_threshold = t;
    }
    if let Some(n) = limit {
        params.max_results = n;
    }

    let candidates = finder.candidates_with(query, &params).await?;
    if candidates.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, c) in candidates.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, c.score, display_title(c));
        if !c.document.keywords.is_empty() {
            println!("    keywords: {}", c.document.keywords.join(", "));
        }
        let excerpt: String = c.document.body.chars().take(120).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!("    id: {}", c.document.id);
        println!();
    }
    Ok(())
}

pub async fn run_refresh(config: &Config) -> anyhow::Result<()> {
    let finder = PromptFinder::from_config(config)?;
    let stats = finder.refresh().await?;
    println!(
        "Index rebuilt: {} documents, {} features (generation {})",
        stats.documents, stats.vocabulary, stats.generation
    );
    print_stats(&config.notion.database_id, &stats);
    Ok(())
}

fn display_title(candidate: &ScoredCandidate) -> &str {
    if candidate.document.title.is_empty() {
        "(untitled)"
    } else {
        &candidate.document.title
    }
}
