//! Flat, memory-resident per-document statistics.
//!
//! Every field is a column indexed by sequence id. Postings are one
//! concatenated array sliced by cumulative offsets.

use crate::error::{Result, RetrievalError};
use crate::persist::StatsPaths;
use crate::{ExternalId, SeqId, TermId};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Borrowed view of one document.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    pub seq_id: SeqId,
    pub external_id: ExternalId,
    pub timestamp: u64,
    /// Number of postings (distinct terms).
    pub length: u32,
    pub norm_length: f32,
    terms: &'a [TermId],
    tfs: &'a [u32],
}

impl<'a> Document<'a> {
    /// Frequency of `term` in this document.
    pub fn tf(&self, term: TermId) -> Option<u32> {
        self.terms.iter().position(|&t| t == term).map(|i| self.tfs[i])
    }

    pub fn postings(&self) -> impl Iterator<Item = (TermId, u32)> + 'a {
        self.terms.iter().copied().zip(self.tfs.iter().copied())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    external_ids: Vec<ExternalId>,
    timestamps: Option<Vec<u64>>,
    lengths: Vec<u32>,
    norm_lengths: Vec<f32>,
    // offsets[i]..offsets[i + 1] is document i's slice of terms/tfs
    offsets: Vec<usize>,
    terms: Vec<TermId>,
    tfs: Vec<u32>,
}

impl DocumentStore {
    /// Assemble the store from aligned columns, checking every count.
    pub fn from_columns(
        external_ids: Vec<ExternalId>,
        timestamps: Option<Vec<u64>>,
        lengths: Vec<u32>,
        norm_lengths: Vec<f32>,
        terms: Vec<TermId>,
        tfs: Vec<u32>,
    ) -> Result<Self> {
        let n = external_ids.len();
        if lengths.len() != n || norm_lengths.len() != n {
            return Err(RetrievalError::CorruptStatistics(format!(
                "{n} ids but {} lengths and {} encoded lengths",
                lengths.len(),
                norm_lengths.len()
            )));
        }
        if let Some(ts) = &timestamps {
            if ts.len() != n {
                return Err(RetrievalError::CorruptStatistics(format!("{n} ids but {} timestamps", ts.len())));
            }
        }
        if terms.len() != tfs.len() {
            return Err(RetrievalError::CorruptStatistics(format!("{} posting terms but {} term frequencies", terms.len(), tfs.len())));
        }
        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(0usize);
        for &len in &lengths {
            let last = *offsets.last().unwrap_or(&0);
            offsets.push(last + len as usize);
        }
        let expected = *offsets.last().unwrap_or(&0);
        if expected != terms.len() {
            return Err(RetrievalError::CorruptStatistics(format!(
                "lengths sum to {expected} postings but {} are stored",
                terms.len()
            )));
        }
        Ok(Self { external_ids, timestamps, lengths, norm_lengths, offsets, terms, tfs })
    }

    /// Load the column files of a statistics directory.
    pub fn load(paths: &StatsPaths) -> Result<Self> {
        let ids = read_column::<ExternalId>(&paths.doc_ids())?;
        let lengths = read_column::<u32>(&paths.doc_lengths())?;
        let norms = read_column::<f32>(&paths.doc_lengths_encoded())?;
        let terms = read_column::<TermId>(&paths.posting_terms())?;
        let tfs = read_column::<u32>(&paths.posting_tfs())?;
        let timestamps = if paths.doc_times().exists() { Some(read_column::<u64>(&paths.doc_times())?) } else { None };
        let store = Self::from_columns(ids, timestamps, lengths, norms, terms, tfs)?;
        tracing::info!(docs = store.len(), postings = store.terms.len(), root = %paths.root.display(), "loaded document statistics");
        Ok(store)
    }

    pub fn get(&self, seq_id: SeqId) -> Option<Document<'_>> {
        let i = seq_id as usize;
        let external_id = *self.external_ids.get(i)?;
        let (start, end) = (self.offsets[i], self.offsets[i + 1]);
        Some(Document {
            seq_id,
            external_id,
            timestamp: self.timestamps.as_ref().map_or(external_id, |ts| ts[i]),
            length: self.lengths[i],
            norm_length: self.norm_lengths[i],
            terms: &self.terms[start..end],
            tfs: &self.tfs[start..end],
        })
    }

    pub fn external_id(&self, seq_id: SeqId) -> Option<ExternalId> { self.external_ids.get(seq_id as usize).copied() }

    /// A document is eligible for a query when it was posted at or before the
    /// query's cutoff tweet.
    pub fn is_eligible(&self, seq_id: SeqId, cutoff: ExternalId) -> bool {
        self.external_id(seq_id).is_some_and(|id| id <= cutoff)
    }

    pub fn eligible_count(&self, cutoff: ExternalId) -> usize {
        self.external_ids.iter().filter(|&&id| id <= cutoff).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = Document<'_>> + '_ {
        (0..self.len() as SeqId).filter_map(move |s| self.get(s))
    }

    pub fn len(&self) -> usize { self.external_ids.len() }

    pub fn is_empty(&self) -> bool { self.external_ids.is_empty() }
}

fn read_column<T: FromStr>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| RetrievalError::io(path, e))?;
    let mut out = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| RetrievalError::io(path, e))?;
        let value = line.trim();
        if value.is_empty() { continue; }
        let parsed = value.parse::<T>().map_err(|_| {
            RetrievalError::CorruptStatistics(format!("{}:{}: cannot parse {value:?}", path.display(), lineno + 1))
        })?;
        out.push(parsed);
    }
    Ok(out)
}
