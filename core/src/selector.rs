//! Partition selection by centroid similarity.
//!
//! Partitions are ranked by cosine similarity between the query embedding and
//! each centroid, most similar first. Ties keep the lower partition id first,
//! and a degenerate similarity (zero-norm or non-finite input) ranks below
//! every real one, so selection is a total, deterministic order.

use crate::PartitionId;
use std::cmp::Ordering;

/// Cosine similarity in f64, or `None` when the vectors differ in length,
/// either has zero norm, or the result is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let sim = dot / (norm_a.sqrt() * norm_b.sqrt());
    sim.is_finite().then_some(sim)
}

pub fn is_degenerate(v: &[f32]) -> bool {
    v.iter().all(|&x| x == 0.0) || v.iter().any(|x| !x.is_finite())
}

fn by_similarity(a: &(PartitionId, Option<f64>), b: &(PartitionId, Option<f64>)) -> Ordering {
    match (a.1, b.1) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.0.cmp(&b.0))
}

/// Full ranking of every partition for `query`.
pub fn rank<C: AsRef<[f32]>>(query: &[f32], centroids: &[C]) -> Vec<PartitionId> {
    let mut scored: Vec<(PartitionId, Option<f64>)> = centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i as PartitionId, cosine_similarity(query, c.as_ref())))
        .collect();
    scored.sort_by(by_similarity);
    scored.into_iter().map(|(id, _)| id).collect()
}

/// The `k` partitions most similar to `query`; `k` is clamped to the number of
/// centroids.
pub fn select<C: AsRef<[f32]>>(query: &[f32], centroids: &[C], k: usize) -> Vec<PartitionId> {
    let mut ranked = rank(query, centroids);
    ranked.truncate(k);
    ranked
}

/// Nearest centroid by squared Euclidean distance, ties to the lower id.
/// Used to place documents of windows whose assignments were not exported.
pub fn nearest_centroid<C: AsRef<[f32]>>(vector: &[f32], centroids: &[C]) -> Option<PartitionId> {
    let mut best: Option<(PartitionId, f64)> = None;
    for (i, c) in centroids.iter().enumerate() {
        let dist: f64 = vector.iter().zip(c.as_ref()).map(|(&x, &y)| (x as f64 - y as f64).powi(2)).sum();
        if !dist.is_finite() { continue; }
        if best.map_or(true, |(_, d)| dist < d) {
            best = Some((i as PartitionId, dist));
        }
    }
    best.map(|(id, _)| id)
}
