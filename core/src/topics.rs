//! Query inputs: TREC microblog topics, their precomputed embeddings, the
//! day/hour extent of each topic and optional per-topic term counts.

use crate::error::{Result, RetrievalError};
use crate::ExternalId;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::Path;

lazy_static! {
    static ref TOP: Regex = Regex::new(r"(?s)<top>(.*?)</top>").expect("valid regex");
    static ref NUM: Regex = Regex::new(r"(?s)<num>\s*(?:Number:)?\s*(\S+)\s*</num>").expect("valid regex");
    static ref TITLE: Regex = Regex::new(r"(?s)<(?:title|query)>\s*(.*?)\s*</(?:title|query)>").expect("valid regex");
    static ref TWEET_TIME: Regex = Regex::new(r"(?s)<querytweettime>\s*(\d+)\s*</querytweettime>").expect("valid regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Raw topic id, e.g. `MB001`.
    pub id: String,
    pub text: String,
    /// Id of the newest tweet the query may see.
    pub cutoff: ExternalId,
}

impl Topic {
    /// Number written to run files: the digits of the id without leading
    /// zeros (`MB001` -> `1`), or the raw id when it has no digits.
    pub fn trec_number(&self) -> String {
        let digits: String = self.id.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.parse::<u64>() {
            Ok(n) => n.to_string(),
            Err(_) => self.id.clone(),
        }
    }
}

pub fn parse_topics(text: &str) -> Result<Vec<Topic>> {
    let mut topics = Vec::new();
    for (n, cap) in TOP.captures_iter(text).enumerate() {
        let body = &cap[1];
        let field = |re: &Regex, name: &str| {
            re.captures(body)
                .map(|c| c[1].to_string())
                .ok_or_else(|| RetrievalError::StartupConfig(format!("topic #{} has no <{name}>", n + 1)))
        };
        let id = field(&NUM, "num")?;
        let text = field(&TITLE, "title")?;
        let cutoff = field(&TWEET_TIME, "querytweettime")?
            .parse::<ExternalId>()
            .map_err(|e| RetrievalError::StartupConfig(format!("topic {id}: bad querytweettime: {e}")))?;
        topics.push(Topic { id, text, cutoff });
    }
    Ok(topics)
}

pub fn load_topics(path: &Path) -> Result<Vec<Topic>> {
    let text = fs::read_to_string(path).map_err(|e| RetrievalError::io(path, e))?;
    let topics = parse_topics(&text)?;
    if topics.is_empty() {
        return Err(RetrievalError::StartupConfig(format!("no topics found in {}", path.display())));
    }
    Ok(topics)
}

/// Query embeddings, one `id v1 ... vD` per line, in topic order.
pub fn load_query_vectors(path: &Path, dimension: usize) -> Result<Vec<Vec<f32>>> {
    let text = fs::read_to_string(path).map_err(|e| RetrievalError::io(path, e))?;
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let mut fields = line.split_whitespace();
        if fields.next().is_none() { continue; }
        let v = fields
            .map(str::parse::<f32>)
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| RetrievalError::StartupConfig(format!("{}:{}: {e}", path.display(), lineno + 1)))?;
        if v.len() != dimension {
            return Err(RetrievalError::StartupConfig(format!(
                "{}:{}: expected {dimension} components, found {}",
                path.display(),
                lineno + 1,
                v.len()
            )));
        }
        out.push(v);
    }
    Ok(out)
}

/// Complete days and extra hours covered by each topic, `days hours` per line.
pub fn load_day_hours(path: &Path) -> Result<Vec<(u32, u32)>> {
    let text = fs::read_to_string(path).map_err(|e| RetrievalError::io(path, e))?;
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() { continue; }
        let parsed = match fields.as_slice() {
            [d, h] => d.parse::<u32>().ok().zip(h.parse::<u32>().ok()),
            _ => None,
        };
        out.push(parsed.ok_or_else(|| {
            RetrievalError::StartupConfig(format!("{}:{}: expected `days hours`", path.display(), lineno + 1))
        })?);
    }
    Ok(out)
}

/// Per-topic collection frequencies up to the cutoff, one line per topic:
/// `cf_1 .. cf_n total` with one count per query term in query order.
pub fn load_query_cf(path: &Path) -> Result<Vec<Vec<u64>>> {
    let text = fs::read_to_string(path).map_err(|e| RetrievalError::io(path, e))?;
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() { continue; }
        let counts = line
            .split_whitespace()
            .map(|f| f.parse::<u64>())
            .collect::<std::result::Result<Vec<u64>, _>>()
            .map_err(|e| RetrievalError::CorruptStatistics(format!("{}:{}: {e}", path.display(), lineno + 1)))?;
        out.push(counts);
    }
    Ok(out)
}
