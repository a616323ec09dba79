use crate::error::{Result, RetrievalError};
use crate::TermId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Term string to dense id, with per-id document and corpus frequencies.
///
/// Ids are 1-based and follow the order of the term enumeration; slot 0 of the
/// frequency vectors is a placeholder so ids index them directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermDictionary {
    term_to_id: HashMap<String, TermId>,
    doc_freq: Vec<u32>,
    corpus_freq: Vec<u64>,
    total_terms: u64,
}

impl TermDictionary {
    /// Build from `(term, df, cf)` triples in discovery order. A repeated term
    /// keeps its first id and its frequencies are added to that id.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u32, u64)>,
        S: Into<String>,
    {
        let mut dict = Self { doc_freq: vec![0], corpus_freq: vec![0], ..Self::default() };
        for (term, df, cf) in entries {
            let term = term.into();
            let next = dict.doc_freq.len() as TermId;
            let id = *dict.term_to_id.entry(term).or_insert(next);
            if id == next {
                dict.doc_freq.push(df);
                dict.corpus_freq.push(cf);
            } else {
                dict.doc_freq[id as usize] += df;
                dict.corpus_freq[id as usize] += cf;
            }
            dict.total_terms += cf;
        }
        dict
    }

    /// Load a tab-separated enumeration: `term<TAB>df<TAB>cf` per line.
    pub fn load_tsv(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| RetrievalError::io(path, e))?;
        let mut entries = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| RetrievalError::io(path, e))?;
            if line.trim().is_empty() { continue; }
            let mut cols = line.split('\t');
            let parsed = match (cols.next(), cols.next(), cols.next()) {
                (Some(term), Some(df), Some(cf)) => df.trim().parse::<u32>().ok().zip(cf.trim().parse::<u64>().ok()).map(|(df, cf)| (term.to_string(), df, cf)),
                _ => None,
            };
            let entry = parsed.ok_or_else(|| RetrievalError::StartupConfig(format!("{}:{}: expected term<TAB>df<TAB>cf", path.display(), lineno + 1)))?;
            entries.push(entry);
        }
        let dict = Self::from_entries(entries);
        tracing::info!(terms = dict.len(), total_terms = dict.total_terms, path = %path.display(), "loaded term dictionary");
        Ok(dict)
    }

    pub fn id_of(&self, term: &str) -> Result<TermId> {
        self.term_to_id.get(term).copied().ok_or_else(|| RetrievalError::UnknownTerm(term.to_string()))
    }

    /// Collection frequency of `id`; zero for ids the dictionary never assigned.
    pub fn corpus_frequency(&self, id: TermId) -> u64 { self.corpus_freq.get(id as usize).copied().unwrap_or(0) }

    pub fn doc_frequency(&self, id: TermId) -> u32 { self.doc_freq.get(id as usize).copied().unwrap_or(0) }

    pub fn total_terms(&self) -> u64 { self.total_terms }

    pub fn len(&self) -> usize { self.term_to_id.len() }

    pub fn is_empty(&self) -> bool { self.term_to_id.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn ids_are_dense_and_one_based() {
        let dict = TermDictionary::from_entries(vec![("rust", 3, 10), ("tweet", 1, 4)]);
        assert_eq!(dict.id_of("rust").unwrap(), 1);
        assert_eq!(dict.id_of("tweet").unwrap(), 2);
        assert_eq!(dict.corpus_frequency(2), 4);
        assert_eq!(dict.doc_frequency(1), 3);
        assert_eq!(dict.total_terms(), 14);
    }

    #[test]
    fn unknown_terms_are_reported_not_fatal() {
        let dict = TermDictionary::from_entries(vec![("rust", 1, 1)]);
        assert!(matches!(dict.id_of("java"), Err(RetrievalError::UnknownTerm(t)) if t == "java"));
        assert_eq!(dict.corpus_frequency(99), 0);
        assert_eq!(dict.corpus_frequency(0), 0);
    }

    #[test]
    fn loads_tab_separated_enumeration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.tsv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "egypt\t120\t150").unwrap();
        writeln!(f, "#jan25\t80\t81").unwrap();
        writeln!(f).unwrap();
        drop(f);
        let dict = TermDictionary::load_tsv(&path).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.id_of("#jan25").unwrap(), 2);
        assert_eq!(dict.total_terms(), 231);
    }

    #[test]
    fn rejects_short_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.tsv");
        std::fs::write(&path, "egypt\t120\n").unwrap();
        assert!(matches!(TermDictionary::load_tsv(&path), Err(RetrievalError::StartupConfig(_))));
    }
}
