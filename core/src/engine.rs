//! The loaded, read-only retrieval structures and the query entry points
//! shared by the batch runner and the server.

use crate::clusters::ClusterIndex;
use crate::config::{RetrievalConfig, StatsMode};
use crate::dictionary::TermDictionary;
use crate::error::{Result, RetrievalError};
use crate::executor::{ExecutorOptions, Query, QueryExecutor, QueryOutcome};
use crate::persist::{self, ClusterPaths, StatsPaths};
use crate::scorer::{CollectionStats, CutoffStats, DirichletScorer, QueryTerm};
use crate::stats::DocumentStore;
use crate::tokenizer::analyze;
use crate::window_stats::WindowStatsIndex;
use crate::ExternalId;
use anyhow::Context;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub struct Engine {
    dictionary: TermDictionary,
    store: DocumentStore,
    clusters: ClusterIndex,
    scorer: DirichletScorer,
    config: RetrievalConfig,
    stats_paths: Option<StatsPaths>,
    /// Per-window term totals, built in cutoff mode only.
    window_stats: Option<WindowStatsIndex>,
    dimension: usize,
}

impl Engine {
    pub fn new(dictionary: TermDictionary, store: DocumentStore, clusters: ClusterIndex, dimension: usize, config: RetrievalConfig) -> Self {
        let window_stats = (config.stats_mode == StatsMode::Cutoff).then(|| WindowStatsIndex::build(&clusters, &store));
        Self { dictionary, store, clusters, scorer: DirichletScorer::new(config.mu), config, stats_paths: None, window_stats, dimension }
    }

    /// Load everything from disk. `terms` is the term enumeration TSV; when
    /// absent the bincode snapshot in the statistics directory is used.
    pub fn open(stats: StatsPaths, terms: Option<&Path>, clusters: &ClusterPaths, config: RetrievalConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let dictionary = match terms {
            Some(path) => TermDictionary::load_tsv(path)?,
            None => persist::load_dictionary(&stats).context("no term file given and no dictionary snapshot found")?,
        };
        let store = DocumentStore::load(&stats)?;
        let index = ClusterIndex::load(clusters, config.days_total)?;
        info!(
            terms = dictionary.len(),
            docs = store.len(),
            windows = index.loaded(),
            mu = config.mu,
            stats_mode = ?config.stats_mode,
            granularity = ?config.granularity,
            "engine ready"
        );
        let mut engine = Self::new(dictionary, store, index, clusters.dimension, config);
        engine.stats_paths = Some(stats);
        Ok(engine)
    }

    pub fn dictionary(&self) -> &TermDictionary { &self.dictionary }
    pub fn store(&self) -> &DocumentStore { &self.store }
    pub fn clusters(&self) -> &ClusterIndex { &self.clusters }
    pub fn config(&self) -> &RetrievalConfig { &self.config }
    pub fn dimension(&self) -> usize { self.dimension }

    /// Analyze `text` and resolve its terms against the dictionary. The
    /// `(days, hours)` extent is rewritten for the configured granularity.
    pub fn query(&self, id: impl Into<String>, text: &str, embedding: Vec<f32>, cutoff: ExternalId, days: u32, hours: u32) -> Result<Query> {
        if embedding.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch { expected: self.dimension, found: embedding.len() });
        }
        let terms = analyze(text).into_iter().map(|t| QueryTerm::resolve(t, &self.dictionary)).collect();
        let (day_count, hour_count) = self.config.granularity.extent(days, hours);
        Ok(Query { id: id.into(), terms, embedding, cutoff, day_count, hour_count })
    }

    /// Background statistics for a query in cutoff mode: the precomputed file
    /// for topic `ordinal` when there is one, otherwise the sum of the windows
    /// the query visits. A pass over the store is the last resort.
    pub fn cutoff_stats(&self, query: &Query, ordinal: Option<usize>) -> Result<CutoffStats> {
        if let (Some(paths), Some(n)) = (&self.stats_paths, ordinal) {
            let path = paths.cutoff_stats(n);
            if path.exists() {
                return CutoffStats::load(&path).map_err(|e| {
                    RetrievalError::CorruptStatistics(format!("{}: {e}", path.display()))
                });
            }
        }
        if let Some(stats) = self.window_stats.as_ref().and_then(|w| w.cutoff_stats(query, &self.clusters, &self.store)) {
            return Ok(stats);
        }
        debug!(query = %query.id, cutoff = query.cutoff, "visited windows incomplete, accumulating cutoff statistics");
        Ok(CutoffStats::accumulate(&self.store, query.cutoff, &query.terms))
    }

    pub fn execute(&self, query: &Query, ordinal: Option<usize>) -> Result<QueryOutcome> {
        self.execute_with(query, ordinal, None)
    }

    /// Run `query`, overriding the configured top-k cap.
    pub fn execute_with(&self, query: &Query, ordinal: Option<usize>, max_top_k: Option<usize>) -> Result<QueryOutcome> {
        let outcome = match self.config.stats_mode {
            StatsMode::Corpus => self.executor(max_top_k).execute(query, &self.dictionary),
            StatsMode::Cutoff => self.executor(max_top_k).execute(query, &self.cutoff_stats(query, ordinal)?),
        };
        Ok(outcome)
    }

    /// Run `query` against caller-supplied background statistics.
    pub fn execute_using(&self, query: &Query, stats: &dyn CollectionStats) -> QueryOutcome {
        self.executor(None).execute(query, stats)
    }

    fn executor(&self, max_top_k: Option<usize>) -> QueryExecutor<'_> {
        let options = ExecutorOptions {
            top_n: self.config.top_n,
            max_top_k: max_top_k.or(self.config.max_top_k),
            budget: self.config.query_budget_ms.map(Duration::from_millis),
        };
        QueryExecutor::new(&self.store, &self.clusters, &self.scorer, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::WindowPartitions;
    use crate::config::PlanGranularity;
    use crate::WindowId;

    fn engine(mode: StatsMode) -> Engine {
        engine_with(RetrievalConfig { stats_mode: mode, ..RetrievalConfig::default() })
    }

    fn engine_with(config: RetrievalConfig) -> Engine {
        let dict = TermDictionary::from_entries(vec![("egypt", 2, 3), ("museum", 1, 1)]);
        let store = DocumentStore::from_columns(vec![10, 20, 30], None, vec![1, 2, 1], vec![1.0, 2.0, 1.0], vec![1, 1, 2, 2], vec![1, 2, 1, 1]).unwrap();
        let clusters = ClusterIndex::from_windows([
            WindowPartitions::new(WindowId::day(1), vec![vec![1.0, 0.0], vec![0.0, 1.0]], vec![vec![0], vec![1]]),
            WindowPartitions::new(WindowId::hour(25), vec![vec![1.0, 0.0]], vec![vec![2]]),
        ]);
        Engine::new(dict, store, clusters, 2, config)
    }

    #[test]
    fn builds_queries_from_text() {
        let e = engine(StatsMode::Corpus);
        let q = e.query("MB001", "Egypt museum riots", vec![1.0, 0.0], 30, 1, 1).unwrap();
        let ids: Vec<Option<u32>> = q.terms.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![Some(1), Some(2), None]);
        let err = e.query("MB001", "egypt", vec![1.0], 30, 1, 1).unwrap_err();
        assert!(matches!(err, RetrievalError::DimensionMismatch { expected: 2, found: 1 }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn both_stats_modes_answer() {
        for mode in [StatsMode::Corpus, StatsMode::Cutoff] {
            let e = engine(mode);
            let q = e.query("MB001", "egypt", vec![1.0, 0.0], 30, 1, 1).unwrap();
            let outcome = e.execute(&q, Some(1)).unwrap();
            let last = outcome.levels.last().unwrap();
            assert_eq!(last.fraction_scanned(), Some(1.0));
            let ids: Vec<u64> = last.ranking.iter().map(|d| d.external_id).collect();
            assert_eq!(ids, vec![20, 10]);
        }
    }

    #[test]
    fn hour_granularity_skips_day_windows() {
        let e = engine_with(RetrievalConfig { granularity: PlanGranularity::Hour, ..RetrievalConfig::default() });
        let q = e.query("MB001", "egypt", vec![1.0, 0.0], 30, 1, 1).unwrap();
        assert_eq!((q.day_count, q.hour_count), (0, 25));
        let outcome = e.execute(&q, None).unwrap();
        // hours 1..=24 were never clustered, day 1 is not asked for
        assert_eq!(outcome.warnings.len(), 24);
        assert_eq!(outcome.levels.last().unwrap().eligible, 1);
    }

    #[test]
    fn cutoff_stats_come_from_visited_windows() {
        let e = engine(StatsMode::Cutoff);
        for cutoff in [10, 20, 30] {
            let q = e.query("MB001", "egypt museum", vec![1.0, 0.0], cutoff, 1, 1).unwrap();
            let from_windows = e.cutoff_stats(&q, None).unwrap();
            assert_eq!(from_windows, CutoffStats::accumulate(e.store(), cutoff, &q.terms), "cutoff {cutoff}");
        }
        // day 2 is missing, so the sum falls back to a full pass
        let q = e.query("MB002", "egypt", vec![1.0, 0.0], 30, 2, 1).unwrap();
        assert_eq!(e.cutoff_stats(&q, None).unwrap(), CutoffStats::accumulate(e.store(), 30, &q.terms));
    }

    #[test]
    fn explicit_statistics_override_the_mode() {
        let e = engine(StatsMode::Corpus);
        let q = e.query("MB001", "egypt", vec![1.0, 0.0], 30, 1, 1).unwrap();
        let stats = CutoffStats::from_counts(&[2, 4], &q.terms).unwrap();
        let outcome = e.execute_using(&q, &stats);
        assert_eq!(outcome.levels.last().unwrap().fraction_scanned(), Some(1.0));
    }
}
