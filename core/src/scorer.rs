//! Query-likelihood scoring with Dirichlet smoothing.
//!
//! For every query term present in a document:
//!
//! ```text
//! prob  = (cf + 1) / (total + 1)
//! score += ln(1 + tf / (mu * prob)) + ln(mu / (norm_length + mu))
//! ```
//!
//! Terms missing from the document add nothing. The collection statistics
//! (`cf`, `total`) come from a [`CollectionStats`] source: corpus-wide from the
//! dictionary, or accumulated up to the query's cutoff.

use crate::dictionary::TermDictionary;
use crate::error::{Result, RetrievalError};
use crate::stats::{Document, DocumentStore};
use crate::window_stats::WindowTermStats;
use crate::{ExternalId, TermId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_MU: f32 = 2500.0;

/// A parsed query term. `id` is `None` when the dictionary does not know the
/// term; such terms score zero everywhere but never abort the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTerm {
    pub text: String,
    pub id: Option<TermId>,
}

impl QueryTerm {
    pub fn resolve(text: impl Into<String>, dict: &TermDictionary) -> Self {
        let text = text.into();
        let id = match dict.id_of(&text) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::debug!(%err, "query term treated as zero-frequency");
                None
            }
        };
        Self { text, id }
    }
}

/// Source of collection-level term statistics.
pub trait CollectionStats: Send + Sync {
    fn term_frequency(&self, term: &QueryTerm) -> u64;
    fn total_terms(&self) -> u64;
}

impl CollectionStats for TermDictionary {
    fn term_frequency(&self, term: &QueryTerm) -> u64 { term.id.map_or(0, |id| self.corpus_frequency(id)) }
    fn total_terms(&self) -> u64 { TermDictionary::total_terms(self) }
}

/// Term statistics of the stream as it stood at a query's cutoff tweet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CutoffStats {
    pub total_terms: u64,
    pub frequencies: HashMap<String, u64>,
}

impl CutoffStats {
    /// Zero counts for every query term.
    pub fn for_terms(terms: &[QueryTerm]) -> Self {
        let mut stats = Self::default();
        for t in terms {
            stats.frequencies.entry(t.text.clone()).or_insert(0);
        }
        stats
    }

    /// Accumulate frequencies of `terms`, and the total token count, over every
    /// document posted at or before `cutoff`.
    pub fn accumulate(store: &DocumentStore, cutoff: ExternalId, terms: &[QueryTerm]) -> Self {
        let wanted = wanted_terms(terms);
        let mut stats = Self::for_terms(terms);
        for doc in store.iter().filter(|d| d.external_id <= cutoff) {
            stats.add_document(&doc, &wanted);
        }
        stats
    }

    /// Build from one line of a query-cf file: the collection frequency of
    /// each query term in order, then the total token count.
    pub fn from_counts(counts: &[u64], terms: &[QueryTerm]) -> Result<Self> {
        let Some((&total_terms, per_term)) = counts.split_last() else {
            return Err(RetrievalError::CorruptStatistics("empty query-cf line".into()));
        };
        if per_term.len() != terms.len() {
            return Err(RetrievalError::CorruptStatistics(format!(
                "query-cf line has {} term counts for {} query terms",
                per_term.len(),
                terms.len()
            )));
        }
        let frequencies = terms.iter().zip(per_term).map(|(t, &cf)| (t.text.clone(), cf)).collect();
        Ok(Self { total_terms, frequencies })
    }

    pub(crate) fn add_document(&mut self, doc: &Document<'_>, wanted: &HashMap<TermId, &str>) {
        for (term, tf) in doc.postings() {
            self.total_terms += tf as u64;
            if let Some(text) = wanted.get(&term) {
                if let Some(f) = self.frequencies.get_mut(*text) {
                    *f += tf as u64;
                }
            }
        }
    }

    pub(crate) fn add_window(&mut self, window: &WindowTermStats, wanted: &HashMap<TermId, &str>) {
        self.total_terms += window.total_terms();
        for (&term, text) in wanted {
            if let Some(f) = self.frequencies.get_mut(*text) {
                *f += window.frequency(term);
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| RetrievalError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| RetrievalError::io(dir, e))?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json).map_err(|e| RetrievalError::io(path, e))
    }
}

/// Resolved query terms by id, each id once.
pub(crate) fn wanted_terms(terms: &[QueryTerm]) -> HashMap<TermId, &str> {
    terms.iter().filter_map(|t| t.id.map(|id| (id, t.text.as_str()))).collect()
}

impl CollectionStats for CutoffStats {
    fn term_frequency(&self, term: &QueryTerm) -> u64 { self.frequencies.get(&term.text).copied().unwrap_or(0) }
    fn total_terms(&self) -> u64 { self.total_terms }
}

/// Query terms with their background probabilities resolved once.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    terms: Vec<(TermId, f64)>,
}

impl PreparedQuery {
    pub fn is_empty(&self) -> bool { self.terms.is_empty() }
}

pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;
    fn prepare(&self, terms: &[QueryTerm], stats: &dyn CollectionStats) -> PreparedQuery;
    fn score_prepared(&self, doc: &Document<'_>, query: &PreparedQuery) -> f32;

    fn score(&self, doc: &Document<'_>, terms: &[QueryTerm], stats: &dyn CollectionStats) -> f32 {
        self.score_prepared(doc, &self.prepare(terms, stats))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DirichletScorer {
    pub mu: f32,
}

impl Default for DirichletScorer {
    fn default() -> Self { Self { mu: DEFAULT_MU } }
}

impl DirichletScorer {
    pub fn new(mu: f32) -> Self { Self { mu } }
}

impl Scorer for DirichletScorer {
    fn name(&self) -> &str { "dirichlet" }

    fn prepare(&self, terms: &[QueryTerm], stats: &dyn CollectionStats) -> PreparedQuery {
        let total = stats.total_terms() as f64 + 1.0;
        let terms = terms
            .iter()
            .filter_map(|t| t.id.map(|id| (id, (stats.term_frequency(t) as f64 + 1.0) / total)))
            .collect();
        PreparedQuery { terms }
    }

    fn score_prepared(&self, doc: &Document<'_>, query: &PreparedQuery) -> f32 {
        let mu = self.mu as f64;
        let length_norm = (mu / (doc.norm_length as f64 + mu)).ln();
        let mut score = 0.0f64;
        for &(term, prob) in &query.terms {
            if let Some(tf) = doc.tf(term) {
                score += (1.0 + tf as f64 / (mu * prob)).ln() + length_norm;
            }
        }
        score as f32
    }
}
