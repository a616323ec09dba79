use crate::config::RetrievalConfig;
use crate::dictionary::TermDictionary;
use crate::{Granularity, ScoredDoc, WindowId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// File layout of a statistics directory.
pub struct StatsPaths {
    pub root: PathBuf,
}

impl StatsPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn doc_ids(&self) -> PathBuf { self.root.join("doc_id.txt") }
    pub fn doc_lengths(&self) -> PathBuf { self.root.join("doc_length_ordered.txt") }
    pub fn doc_lengths_encoded(&self) -> PathBuf { self.root.join("doc_length_encoded.txt") }
    pub fn posting_terms(&self) -> PathBuf { self.root.join("all_terms_ordered.txt") }
    pub fn posting_tfs(&self) -> PathBuf { self.root.join("all_terms_tf.txt") }
    pub fn doc_times(&self) -> PathBuf { self.root.join("doc_time.txt") }
    pub fn dictionary_snapshot(&self) -> PathBuf { self.root.join("dictionary.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn cutoff_stats_dir(&self) -> PathBuf { self.root.join("cf").join("query") }
    /// Cutoff statistics of the `n`-th topic (1-based, topic file order).
    pub fn cutoff_stats(&self, n: usize) -> PathBuf { self.cutoff_stats_dir().join(format!("query{n}.json")) }
}

/// Directory layout of exported centroids and assignments.
#[derive(Debug, Clone)]
pub struct ClusterPaths {
    pub day_root: PathBuf,
    pub hour_root: PathBuf,
    pub dimension: usize,
    pub trial: u32,
    /// Per-window document vectors, used when assignments were not exported.
    pub vectors_root: Option<PathBuf>,
}

impl ClusterPaths {
    fn root(&self, g: Granularity) -> &Path {
        match g {
            Granularity::Day => &self.day_root,
            Granularity::Hour => &self.hour_root,
        }
    }
    pub fn centers(&self, w: WindowId) -> PathBuf {
        self.root(w.granularity).join(format!("clustercenters-d{}-{w}-trial{}", self.dimension, self.trial))
    }
    pub fn assignments(&self, w: WindowId) -> PathBuf {
        self.root(w.granularity).join(format!("clusterassign-d{}-{w}-trial{}", self.dimension, self.trial))
    }
    pub fn vectors(&self, w: WindowId) -> Option<PathBuf> {
        self.vectors_root.as_ref().map(|r| r.join(format!("{w}.txt")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub version: u32,
}

pub fn save_dictionary(paths: &StatsPaths, dict: &TermDictionary) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.dictionary_snapshot())?;
    let bytes = bincode::serialize(dict)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_dictionary(paths: &StatsPaths) -> Result<TermDictionary> {
    let path = paths.dictionary_snapshot();
    let mut f = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let dict = bincode::deserialize(&buf)?;
    Ok(dict)
}

pub fn save_meta(paths: &StatsPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &StatsPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Path of the run file for one `(dimension, top_k)` combination of a
/// configured run, e.g. `kmeans_d50_daily_top3_trial1.txt`.
pub fn run_file(output: &Path, cfg: &RetrievalConfig, dimension: usize, top_k: usize) -> PathBuf {
    output.join(format!(
        "{}_d{dimension}_{}_top{top_k}_trial{}.txt",
        cfg.run_tag,
        cfg.granularity.label(),
        cfg.trial
    ))
}

/// Write rankings in the standard trec_eval run format:
/// `<topic> Q0 <doc> <rank> <score> <tag>`.
pub fn write_run<'a, I>(path: &Path, run_tag: &str, rankings: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a [ScoredDoc])>,
{
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let mut w = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);
    for (topic, ranking) in rankings {
        for (rank, doc) in ranking.iter().enumerate() {
            writeln!(w, "{topic} Q0 {} {} {:.6} {run_tag}", doc.external_id, rank + 1, doc.score)?;
        }
    }
    w.flush()?;
    Ok(())
}
