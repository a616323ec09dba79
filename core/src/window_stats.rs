//! Term totals per cluster window.
//!
//! Cutoff statistics are the sum of every window a query visits: complete
//! windows contribute their precomputed totals, the final hour (and any
//! window reaching past the cutoff) is added document by document. The
//! result equals [`CutoffStats::accumulate`] whenever the visited windows
//! hold every document up to the cutoff.

use crate::clusters::{ClusterIndex, WindowPartitions};
use crate::executor::{Query, WindowPlan};
use crate::scorer::{wanted_terms, CutoffStats};
use crate::stats::DocumentStore;
use crate::{ExternalId, PartitionId, TermId, WindowId};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct WindowTermStats {
    total_terms: u64,
    frequencies: HashMap<TermId, u64>,
    /// Newest document of the window.
    newest: Option<ExternalId>,
}

impl WindowTermStats {
    pub fn build(window: &WindowPartitions, store: &DocumentStore) -> Self {
        let mut stats = Self::default();
        for p in 0..window.partition_count() as PartitionId {
            for doc in window.members(p).iter().filter_map(|&seq| store.get(seq)) {
                stats.newest = stats.newest.max(Some(doc.external_id));
                for (term, tf) in doc.postings() {
                    stats.total_terms += tf as u64;
                    *stats.frequencies.entry(term).or_insert(0) += tf as u64;
                }
            }
        }
        stats
    }

    pub fn total_terms(&self) -> u64 { self.total_terms }
    pub fn frequency(&self, term: TermId) -> u64 { self.frequencies.get(&term).copied().unwrap_or(0) }
    pub fn newest(&self) -> Option<ExternalId> { self.newest }

    fn before(&self, cutoff: ExternalId) -> bool { self.newest.map_or(true, |n| n <= cutoff) }
}

#[derive(Debug, Clone, Default)]
pub struct WindowStatsIndex {
    windows: HashMap<WindowId, WindowTermStats>,
}

impl WindowStatsIndex {
    /// Totals for every loaded window of `clusters`.
    pub fn build(clusters: &ClusterIndex, store: &DocumentStore) -> Self {
        let windows: HashMap<WindowId, WindowTermStats> =
            clusters.windows().map(|w| (w.window(), WindowTermStats::build(w, store))).collect();
        info!(windows = windows.len(), "built per-window term statistics");
        Self { windows }
    }

    pub fn get(&self, window: WindowId) -> Option<&WindowTermStats> { self.windows.get(&window) }
    pub fn len(&self) -> usize { self.windows.len() }
    pub fn is_empty(&self) -> bool { self.windows.is_empty() }

    /// Statistics of `query` at its cutoff, or `None` when a visited window
    /// is unavailable and the sum would miss documents.
    pub fn cutoff_stats(&self, query: &Query, clusters: &ClusterIndex, store: &DocumentStore) -> Option<CutoffStats> {
        let plan = WindowPlan::for_extent(query.day_count, query.hour_count);
        let wanted = wanted_terms(&query.terms);
        let mut stats = CutoffStats::for_terms(&query.terms);
        for &id in plan.days.iter().chain(plan.hours.iter()) {
            let totals = self.windows.get(&id)?;
            if totals.before(query.cutoff) {
                stats.add_window(totals, &wanted);
            } else {
                let window = clusters.window(id).ok()?;
                add_eligible(&mut stats, &window, store, query.cutoff, &wanted);
            }
        }
        if let Some(id) = plan.final_hour {
            let window = clusters.window(id).ok()?;
            add_eligible(&mut stats, &window, store, query.cutoff, &wanted);
        }
        Some(stats)
    }
}

fn add_eligible(stats: &mut CutoffStats, window: &WindowPartitions, store: &DocumentStore, cutoff: ExternalId, wanted: &HashMap<TermId, &str>) {
    for p in 0..window.partition_count() as PartitionId {
        for doc in window.eligible_members(p, store, cutoff).filter_map(|seq| store.get(seq)) {
            stats.add_document(&doc, wanted);
        }
    }
}
