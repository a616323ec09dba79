//! Per-window partitions: centroids plus the member documents of each
//! partition, loaded once at startup and shared read-only afterwards.

use crate::error::{Result, RetrievalError};
use crate::persist::ClusterPaths;
use crate::selector::nearest_centroid;
use crate::stats::DocumentStore;
use crate::{ExternalId, Granularity, PartitionId, SeqId, WindowId, HOURS_PER_DAY};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct WindowPartitions {
    window: WindowId,
    centroids: Vec<Vec<f32>>,
    members: Vec<Vec<SeqId>>,
}

impl WindowPartitions {
    /// `members[p]` lists the documents of partition `p`; missing trailing
    /// partitions are treated as empty.
    pub fn new(window: WindowId, centroids: Vec<Vec<f32>>, mut members: Vec<Vec<SeqId>>) -> Self {
        members.resize(centroids.len(), Vec::new());
        Self { window, centroids, members }
    }

    /// Place every `(seq_id, vector)` in its nearest partition.
    pub fn from_vectors<I>(window: WindowId, centroids: Vec<Vec<f32>>, vectors: I) -> Self
    where
        I: IntoIterator<Item = (SeqId, Vec<f32>)>,
    {
        let mut members = vec![Vec::new(); centroids.len()];
        for (seq, v) in vectors {
            if let Some(p) = nearest_centroid(&v, &centroids) {
                members[p as usize].push(seq);
            }
        }
        Self { window, centroids, members }
    }

    pub fn window(&self) -> WindowId { self.window }
    pub fn partition_count(&self) -> usize { self.centroids.len() }
    pub fn centroids(&self) -> &[Vec<f32>] { &self.centroids }
    pub fn members(&self, partition: PartitionId) -> &[SeqId] {
        self.members.get(partition as usize).map_or(&[], |m| m.as_slice())
    }

    /// Member documents of `partition` posted at or before `cutoff`.
    pub fn eligible_members<'a>(&'a self, partition: PartitionId, store: &'a DocumentStore, cutoff: ExternalId) -> impl Iterator<Item = SeqId> + 'a {
        self.members(partition).iter().copied().filter(move |&s| store.is_eligible(s, cutoff))
    }

    pub fn eligible_count(&self, store: &DocumentStore, cutoff: ExternalId) -> usize {
        (0..self.partition_count() as PartitionId).map(|p| self.eligible_members(p, store, cutoff).count()).sum()
    }

    /// Total number of assigned documents.
    pub fn len(&self) -> usize { self.members.iter().map(Vec::len).sum() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Every day and hour window of a collection, each either loaded or recorded
/// as unavailable.
#[derive(Debug, Clone, Default)]
pub struct ClusterIndex {
    windows: HashMap<WindowId, Arc<WindowPartitions>>,
    unavailable: HashMap<WindowId, String>,
}

impl ClusterIndex {
    pub fn from_windows(windows: impl IntoIterator<Item = WindowPartitions>) -> Self {
        let windows = windows.into_iter().map(|w| (w.window, Arc::new(w))).collect();
        Self { windows, unavailable: HashMap::new() }
    }

    /// Load days `1..=days_total` and their hours. Missing windows are logged
    /// and remembered; malformed files abort the load.
    pub fn load(paths: &ClusterPaths, days_total: u32) -> Result<Self> {
        let ids = (1..=days_total)
            .map(WindowId::day)
            .chain((1..=days_total * HOURS_PER_DAY).map(WindowId::hour));
        let mut index = Self::default();
        for id in ids {
            match load_window(paths, id) {
                Ok(w) => {
                    tracing::debug!(window = %id, partitions = w.partition_count(), docs = w.len(), "loaded window");
                    index.windows.insert(id, Arc::new(w));
                }
                Err(RetrievalError::WindowUnavailable { window, reason }) => {
                    tracing::warn!(%window, %reason, "window unavailable, queries will skip it");
                    index.unavailable.insert(window, reason);
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            loaded = index.windows.len(),
            unavailable = index.unavailable.len(),
            dimension = paths.dimension,
            "loaded cluster index"
        );
        Ok(index)
    }

    pub fn window(&self, id: WindowId) -> Result<Arc<WindowPartitions>> {
        self.windows.get(&id).cloned().ok_or_else(|| RetrievalError::WindowUnavailable {
            window: id,
            reason: self.unavailable.get(&id).cloned().unwrap_or_else(|| "not loaded".to_string()),
        })
    }

    /// Loaded windows, in no particular order.
    pub fn windows(&self) -> impl Iterator<Item = &Arc<WindowPartitions>> + '_ { self.windows.values() }

    pub fn max_partitions(&self) -> usize { self.windows.values().map(|w| w.partition_count()).max().unwrap_or(0) }

    pub fn loaded(&self) -> usize { self.windows.len() }

    pub fn count(&self, granularity: Granularity) -> usize {
        self.windows.keys().filter(|w| w.granularity == granularity).count()
    }
}

/// Load one window's centroids and assignments.
pub fn load_window(paths: &ClusterPaths, window: WindowId) -> Result<WindowPartitions> {
    let centers_dir = paths.centers(window);
    let unavailable = |reason: String| RetrievalError::WindowUnavailable { window, reason };
    if !centers_dir.is_dir() {
        return Err(unavailable(format!("no centroids at {}", centers_dir.display())));
    }
    let mut centroids = Vec::new();
    for_each_shard_line(&centers_dir, |path, line| {
        let coords = parse_tuple(line)
            .and_then(|fields| fields.iter().map(|f| f.parse::<f32>().ok()).collect::<Option<Vec<f32>>>())
            .ok_or_else(|| malformed(path, format!("bad centroid line {line:?}")))?;
        if coords.len() != paths.dimension {
            return Err(malformed(path, format!("centroid has {} dimensions, expected {}", coords.len(), paths.dimension)));
        }
        centroids.push(coords);
        Ok(())
    })?;
    if centroids.is_empty() {
        return Err(unavailable(format!("no centroid shards in {}", centers_dir.display())));
    }

    let assign_dir = paths.assignments(window);
    if assign_dir.is_dir() {
        let mut members = vec![Vec::new(); centroids.len()];
        for_each_shard_line(&assign_dir, |path, line| {
            let (seq, partition) = parse_tuple(line)
                .filter(|f| f.len() == 2)
                .and_then(|f| f[0].parse::<SeqId>().ok().zip(f[1].parse::<PartitionId>().ok()))
                .ok_or_else(|| malformed(path, format!("bad assignment line {line:?}")))?;
            let slot = members
                .get_mut(partition as usize)
                .ok_or_else(|| malformed(path, format!("partition {partition} out of range 0..{}", centroids.len())))?;
            slot.push(seq);
            Ok(())
        })?;
        return Ok(WindowPartitions::new(window, centroids, members));
    }

    match paths.vectors(window).filter(|p| p.is_file()) {
        Some(vectors) => {
            let docs = read_vectors(&vectors, paths.dimension)?;
            tracing::debug!(%window, docs = docs.len(), "assigning window documents to nearest centroids");
            Ok(WindowPartitions::from_vectors(window, centroids, docs))
        }
        None => Err(unavailable(format!("no assignments at {}", assign_dir.display()))),
    }
}

fn malformed(path: &Path, reason: String) -> RetrievalError {
    RetrievalError::MalformedWindow { path: path.to_path_buf(), reason }
}

/// Visit every non-empty line of the `part*` shards of `dir`, in shard-name order.
fn for_each_shard_line<F>(dir: &Path, mut f: F) -> Result<()>
where
    F: FnMut(&Path, &str) -> Result<()>,
{
    let mut shards: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy().starts_with("part") {
            shards.push(entry.into_path());
        }
    }
    shards.sort();
    for shard in shards {
        let file = File::open(&shard).map_err(|e| RetrievalError::io(&shard, e))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| RetrievalError::io(&shard, e))?;
            let line = line.trim();
            if line.is_empty() { continue; }
            f(&shard, line)?;
        }
    }
    Ok(())
}

fn walk_error(dir: &Path, e: walkdir::Error) -> RetrievalError {
    let path = e.path().unwrap_or(dir).to_path_buf();
    RetrievalError::io(path, io::Error::from(e))
}

/// `(a,b,c)` or `[a,b,c]` into its trimmed fields.
fn parse_tuple(line: &str) -> Option<Vec<&str>> {
    let inner = line
        .strip_prefix('(')
        .and_then(|l| l.strip_suffix(')'))
        .or_else(|| line.strip_prefix('[').and_then(|l| l.strip_suffix(']')))?;
    Some(inner.split(',').map(str::trim).collect())
}

/// Document vectors, one `seq_id v1 ... vD` per line.
fn read_vectors(path: &Path, dimension: usize) -> Result<Vec<(SeqId, Vec<f32>)>> {
    let file = File::open(path).map_err(|e| RetrievalError::io(path, e))?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| RetrievalError::io(path, e))?;
        let mut fields = line.split_whitespace();
        let Some(seq) = fields.next() else { continue };
        let seq = seq.parse::<SeqId>().map_err(|_| malformed(path, format!("bad sequence id {seq:?}")))?;
        let v = fields
            .map(|f| f.parse::<f32>())
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|_| malformed(path, format!("bad vector for document {seq}")))?;
        if v.len() != dimension {
            return Err(malformed(path, format!("vector of document {seq} has {} dimensions, expected {dimension}", v.len())));
        }
        out.push((seq, v));
    }
    Ok(out)
}
