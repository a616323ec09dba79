//! Per-query execution over the day/hour window hierarchy.
//!
//! A query walks every complete day up to its cutoff, then the complete hours
//! of the current day, then scans the hour containing the cutoff in full. In
//! each pruned window only the partitions closest to the query embedding are
//! scored. Levels `k = 1..=K` are produced incrementally: level `k` scans the
//! k-th ranked partition of every window and merges into the aggregators left
//! by level `k - 1`, which is equivalent to scanning the top-k partitions from
//! scratch.

use crate::clusters::{ClusterIndex, WindowPartitions};
use crate::error::RetrievalError;
use crate::scorer::{CollectionStats, PreparedQuery, QueryTerm, Scorer};
use crate::selector;
use crate::stats::DocumentStore;
use crate::topn::TopN;
use crate::{ExternalId, PartitionId, ScoredDoc, WindowId, HOURS_PER_DAY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub terms: Vec<QueryTerm>,
    pub embedding: Vec<f32>,
    /// Newest tweet id the query may see.
    pub cutoff: ExternalId,
    /// Complete days before the cutoff.
    pub day_count: u32,
    /// Hours of the current day up to and including the cutoff hour.
    pub hour_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ScanningDays,
    ScanningHours,
    FinalHourFullScan,
    Done,
}

/// Ranking and scan cost of one top-k level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelResult {
    pub top_k: usize,
    pub ranking: Vec<ScoredDoc>,
    pub scanned: u64,
    pub eligible: u64,
}

impl LevelResult {
    /// `scanned / eligible`, undefined when nothing was eligible.
    pub fn fraction_scanned(&self) -> Option<f64> {
        (self.eligible > 0).then(|| self.scanned as f64 / self.eligible as f64)
    }
}

#[derive(Debug)]
pub struct QueryOutcome {
    pub query_id: String,
    pub levels: Vec<LevelResult>,
    pub warnings: Vec<RetrievalError>,
    /// False when the budget stopped the query before its last level.
    pub complete: bool,
}

impl QueryOutcome {
    /// Result at level `k`. Past the query's own last level every partition
    /// has already been scanned, so a complete outcome answers with that level.
    pub fn level(&self, top_k: usize) -> Option<&LevelResult> {
        if top_k == 0 {
            return None;
        }
        match self.levels.get(top_k - 1) {
            Some(level) => Some(level),
            None if self.complete => self.levels.last(),
            None => None,
        }
    }
}

/// Day, hour and final-hour windows visited by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    pub days: Vec<WindowId>,
    pub hours: Vec<WindowId>,
    pub final_hour: Option<WindowId>,
}

impl WindowPlan {
    pub fn for_extent(day_count: u32, hour_count: u32) -> Self {
        let (days, hours) = if hour_count == 0 && day_count > 0 {
            (day_count - 1, HOURS_PER_DAY)
        } else {
            (day_count, hour_count)
        };
        let base = HOURS_PER_DAY * days;
        Self {
            days: (1..=days).map(WindowId::day).collect(),
            hours: (1..hours).map(|h| WindowId::hour(base + h)).collect(),
            final_hour: (hours > 0).then(|| WindowId::hour(base + hours)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub top_n: usize,
    pub max_top_k: Option<usize>,
    pub budget: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self { Self { top_n: 1000, max_top_k: None, budget: None } }
}

struct Visit {
    window: Arc<WindowPartitions>,
    ranking: Vec<PartitionId>,
}

pub struct QueryExecutor<'a> {
    store: &'a DocumentStore,
    clusters: &'a ClusterIndex,
    scorer: &'a dyn Scorer,
    options: ExecutorOptions,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(store: &'a DocumentStore, clusters: &'a ClusterIndex, scorer: &'a dyn Scorer, options: ExecutorOptions) -> Self {
        Self { store, clusters, scorer, options }
    }

    pub fn execute(&self, query: &Query, stats: &dyn CollectionStats) -> QueryOutcome {
        let started = Instant::now();
        let mut warnings = Vec::new();
        let plan = WindowPlan::for_extent(query.day_count, query.hour_count);
        let prepared = self.scorer.prepare(&query.terms, stats);

        if selector::is_degenerate(&query.embedding) {
            warnings.push(RetrievalError::DegenerateVector(format!(
                "query {} embedding has zero norm; partitions ranked by id",
                query.id
            )));
        }

        let days = self.visit_all(&plan.days, query, &mut warnings);
        let hours = self.visit_all(&plan.hours, query, &mut warnings);
        let final_hour = plan.final_hour.and_then(|w| self.resolve(w, &mut warnings));

        let eligible: u64 = days
            .iter()
            .chain(hours.iter())
            .map(|v| v.window.eligible_count(self.store, query.cutoff) as u64)
            .sum::<u64>()
            + final_hour.as_ref().map_or(0, |w| w.eligible_count(self.store, query.cutoff) as u64);

        let widest = days.iter().chain(hours.iter()).map(|v| v.ranking.len()).max().unwrap_or(0);
        let mut max_k = widest.max(1);
        if let Some(cap) = self.options.max_top_k {
            max_k = max_k.min(cap);
        }
        if plan.final_hour.is_none() {
            max_k = 0;
        }

        let n = self.options.top_n;
        let mut day_top = TopN::new(n);
        let mut hour_top = TopN::new(n);
        let mut final_scan: Option<(Vec<ScoredDoc>, u64)> = None;
        let mut pruned_scanned = 0u64;
        let mut levels = Vec::with_capacity(max_k);
        let mut complete = true;

        for k in 1..=max_k {
            if let Some(budget) = self.options.budget {
                if k > 1 && started.elapsed() >= budget {
                    let err = RetrievalError::BudgetExceeded { budget_ms: budget.as_millis() as u64, completed: levels.len() };
                    warn!(query = %query.id, %err, "stopping early");
                    warnings.push(err);
                    complete = false;
                    break;
                }
            }

            let mut ranking = Vec::new();
            let mut phase = Phase::Idle;
            loop {
                phase = match phase {
                    Phase::Idle => Phase::ScanningDays,
                    Phase::ScanningDays => {
                        for visit in &days {
                            pruned_scanned += self.scan_ranked(visit, k, query.cutoff, &prepared, &mut day_top);
                        }
                        Phase::ScanningHours
                    }
                    Phase::ScanningHours => {
                        // day results seed the hour level
                        hour_top.extend(day_top.clone().extract_all());
                        for visit in &hours {
                            pruned_scanned += self.scan_ranked(visit, k, query.cutoff, &prepared, &mut hour_top);
                        }
                        Phase::FinalHourFullScan
                    }
                    Phase::FinalHourFullScan => {
                        let (final_docs, _) = final_scan.get_or_insert_with(|| match &final_hour {
                            Some(window) => self.scan_full(window, query.cutoff, &prepared),
                            None => (Vec::new(), 0),
                        });
                        let mut merged = hour_top.clone();
                        merged.extend(final_docs.iter().copied());
                        ranking = merged.extract_all();
                        Phase::Done
                    }
                    Phase::Done => break,
                };
            }

            let final_scanned = final_scan.as_ref().map_or(0, |(_, scanned)| *scanned);
            let level = LevelResult { top_k: k, ranking, scanned: pruned_scanned + final_scanned, eligible };
            debug!(query = %query.id, top_k = k, scanned = level.scanned, eligible, results = level.ranking.len(), "level done");
            levels.push(level);
        }

        QueryOutcome { query_id: query.id.clone(), levels, warnings, complete }
    }

    fn resolve(&self, window: WindowId, warnings: &mut Vec<RetrievalError>) -> Option<Arc<WindowPartitions>> {
        match self.clusters.window(window) {
            Ok(w) => Some(w),
            Err(err) => {
                debug!(%window, %err, "skipping window");
                warnings.push(err);
                None
            }
        }
    }

    fn visit_all(&self, windows: &[WindowId], query: &Query, warnings: &mut Vec<RetrievalError>) -> Vec<Visit> {
        windows
            .iter()
            .filter_map(|&id| self.resolve(id, warnings))
            .map(|window| {
                let ranking = selector::rank(&query.embedding, window.centroids());
                Visit { window, ranking }
            })
            .collect()
    }

    /// Score the k-th ranked partition of a window. Returns documents scanned.
    fn scan_ranked(&self, visit: &Visit, k: usize, cutoff: ExternalId, prepared: &PreparedQuery, top: &mut TopN) -> u64 {
        match visit.ranking.get(k - 1) {
            Some(&partition) => self.scan_partition(&visit.window, partition, cutoff, prepared, top),
            None => 0,
        }
    }

    fn scan_partition(&self, window: &WindowPartitions, partition: PartitionId, cutoff: ExternalId, prepared: &PreparedQuery, top: &mut TopN) -> u64 {
        let mut scanned = 0u64;
        for seq in window.eligible_members(partition, self.store, cutoff) {
            scanned += 1;
            if prepared.is_empty() {
                continue;
            }
            if let Some(doc) = self.store.get(seq) {
                let score = self.scorer.score_prepared(&doc, prepared);
                if score > 0.0 {
                    top.add(doc.external_id, score);
                }
            }
        }
        scanned
    }

    fn scan_full(&self, window: &WindowPartitions, cutoff: ExternalId, prepared: &PreparedQuery) -> (Vec<ScoredDoc>, u64) {
        let mut top = TopN::new(self.options.top_n);
        let scanned = (0..window.partition_count() as PartitionId)
            .map(|p| self.scan_partition(window, p, cutoff, prepared, &mut top))
            .sum();
        (top.extract_all(), scanned)
    }
}
