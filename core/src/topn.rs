//! Bounded, deduplicated top-N collection of scored documents.
//!
//! Entries are totally ordered by score, then by external id (a newer tweet
//! wins a tie). Because the retained set depends only on the best score seen
//! per id, merging two collections and re-truncating is associative and
//! commutative, which is what lets results be carried forward between windows.

use crate::{ExternalId, ScoredDoc};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy)]
struct Ranked(ScoredDoc);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}
impl Eq for Ranked {}
impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}
impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.score.total_cmp(&other.0.score).then(self.0.external_id.cmp(&other.0.external_id))
    }
}

#[derive(Debug, Clone)]
pub struct TopN {
    capacity: usize,
    ranked: BTreeSet<Ranked>,
    scores: HashMap<ExternalId, f32>,
}

impl TopN {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, ranked: BTreeSet::new(), scores: HashMap::new() }
    }

    /// Seed a collection with previously extracted entries.
    pub fn seeded(capacity: usize, entries: impl IntoIterator<Item = ScoredDoc>) -> Self {
        let mut top = Self::new(capacity);
        top.extend(entries);
        top
    }

    /// Offer one candidate. Returns true when the collection changed.
    ///
    /// When full, the candidate must rank above the current minimum under
    /// `(score, external_id)`. A candidate that ties the minimum's score with
    /// a newer id evicts it, so the retained set depends only on the
    /// candidates offered and never on their order, which keeps merges
    /// associative.
    pub fn add(&mut self, external_id: ExternalId, score: f32) -> bool {
        if self.capacity == 0 || score.is_nan() {
            return false;
        }
        let candidate = Ranked(ScoredDoc::new(external_id, score));
        if let Some(&old) = self.scores.get(&external_id) {
            if score <= old {
                return false;
            }
            self.ranked.remove(&Ranked(ScoredDoc::new(external_id, old)));
        } else if self.ranked.len() >= self.capacity {
            match self.ranked.first() {
                Some(min) if candidate > *min => {
                    let evicted = *min;
                    self.ranked.remove(&evicted);
                    self.scores.remove(&evicted.0.external_id);
                }
                _ => return false,
            }
        }
        self.ranked.insert(candidate);
        self.scores.insert(external_id, score);
        true
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ScoredDoc>) {
        for e in entries {
            self.add(e.external_id, e.score);
        }
    }

    /// Fold another collection into this one.
    pub fn merge(&mut self, other: TopN) {
        self.extend(other.ranked.into_iter().map(|r| r.0));
    }

    /// Lowest retained entry.
    pub fn min(&self) -> Option<ScoredDoc> { self.ranked.first().map(|r| r.0) }

    pub fn contains(&self, external_id: ExternalId) -> bool { self.scores.contains_key(&external_id) }

    /// Drain every entry, best first.
    pub fn extract_all(&mut self) -> Vec<ScoredDoc> {
        self.scores.clear();
        std::mem::take(&mut self.ranked).into_iter().rev().map(|r| r.0).collect()
    }

    pub fn len(&self) -> usize { self.ranked.len() }
    pub fn is_empty(&self) -> bool { self.ranked.is_empty() }
    pub fn capacity(&self) -> usize { self.capacity }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(v: &[ScoredDoc]) -> Vec<f32> { v.iter().map(|d| d.score).collect() }

    #[test]
    fn keeps_the_best_two() {
        let mut top = TopN::new(2);
        for (id, s) in [(1, 5.0), (2, 3.0), (3, 9.0), (4, 1.0)] {
            top.add(id, s);
        }
        let out = top.extract_all();
        assert_eq!(scores(&out), vec![9.0, 5.0]);
        assert!(top.is_empty());
    }

    #[test]
    fn duplicate_ids_keep_higher_score() {
        let mut top = TopN::new(3);
        assert!(top.add(7, 1.0));
        assert!(!top.add(7, 0.5));
        assert!(top.add(7, 2.0));
        assert_eq!(top.len(), 1);
        assert_eq!(top.extract_all(), vec![ScoredDoc::new(7, 2.0)]);
    }

    #[test]
    fn full_collection_ignores_candidates_at_or_below_min() {
        let mut top = TopN::new(2);
        top.add(10, 4.0);
        top.add(11, 6.0);
        assert!(!top.add(12, 3.0));
        // equal score, older id loses the tie
        assert!(!top.add(9, 4.0));
        // equal score, newer id wins it
        assert!(top.add(13, 4.0));
        assert!(!top.contains(10));
        assert_eq!(top.min(), Some(ScoredDoc::new(13, 4.0)));
    }

    #[test]
    fn equal_scores_keep_the_same_members_in_any_order() {
        let docs = [ScoredDoc::new(4, 1.0), ScoredDoc::new(8, 1.0), ScoredDoc::new(6, 1.0)];
        let forward = TopN::seeded(2, docs).extract_all();
        let backward = TopN::seeded(2, docs.into_iter().rev()).extract_all();
        assert_eq!(forward, backward);
        assert_eq!(forward, vec![ScoredDoc::new(8, 1.0), ScoredDoc::new(6, 1.0)]);
    }

    #[test]
    fn extraction_is_sorted_descending_with_recency_ties() {
        let mut top = TopN::new(10);
        top.extend([ScoredDoc::new(1, 2.0), ScoredDoc::new(5, 2.0), ScoredDoc::new(3, 7.5)]);
        let out = top.extract_all();
        assert_eq!(out, vec![ScoredDoc::new(3, 7.5), ScoredDoc::new(5, 2.0), ScoredDoc::new(1, 2.0)]);
    }

    #[test]
    fn carry_forward_matches_joint_scan() {
        let window_a: Vec<ScoredDoc> = (0..40).map(|i| ScoredDoc::new(i, ((i * 37) % 23) as f32 + 0.5)).collect();
        let window_b: Vec<ScoredDoc> = (40..90).map(|i| ScoredDoc::new(i, ((i * 11) % 31) as f32 + 0.25)).collect();

        let mut joint = TopN::new(15);
        joint.extend(window_a.iter().chain(window_b.iter()).copied());

        let mut a = TopN::new(15);
        a.extend(window_a.iter().copied());
        let mut b = TopN::seeded(15, a.extract_all());
        b.extend(window_b.iter().copied());

        assert_eq!(b.extract_all(), joint.extract_all());
    }

    #[test]
    fn merge_is_commutative() {
        let xs: Vec<ScoredDoc> = (0..30).map(|i| ScoredDoc::new(i, (i % 7) as f32)).collect();
        let ys: Vec<ScoredDoc> = (20..50).map(|i| ScoredDoc::new(i, (i % 5) as f32 + 0.5)).collect();
        let mut left = TopN::seeded(8, xs.iter().copied());
        left.merge(TopN::seeded(8, ys.iter().copied()));
        let mut right = TopN::seeded(8, ys.iter().copied());
        right.merge(TopN::seeded(8, xs.iter().copied()));
        assert_eq!(left.extract_all(), right.extract_all());
    }

    #[test]
    fn retains_exactly_the_highest_scores() {
        let all: Vec<ScoredDoc> = (0..200).map(|i| ScoredDoc::new(i, ((i * 7919) % 1000) as f32 / 10.0)).collect();
        let top = TopN::seeded(25, all.iter().copied()).extract_all();
        assert_eq!(top.len(), 25);
        let mut sorted: Vec<f32> = all.iter().map(|d| d.score).collect();
        sorted.sort_by(|a, b| b.total_cmp(a));
        assert_eq!(scores(&top), sorted[..25].to_vec());
        assert!(top.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn zero_capacity_and_nan_are_ignored() {
        let mut top = TopN::new(0);
        assert!(!top.add(1, 1.0));
        let mut top = TopN::new(2);
        assert!(!top.add(1, f32::NAN));
        assert!(top.is_empty());
    }
}
