use crate::error::{Result, RetrievalError};
use crate::scorer::DEFAULT_MU;
use crate::HOURS_PER_DAY;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where the background term statistics of the scorer come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsMode {
    /// Corpus-wide frequencies from the term dictionary.
    #[default]
    Corpus,
    /// Frequencies of the stream up to each query's cutoff tweet.
    Cutoff,
}

/// Which window levels a query walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanGranularity {
    /// Complete days, then the hours of the current day.
    #[default]
    DayHour,
    /// Hours only, counted from the start of the collection.
    Hour,
}

impl PlanGranularity {
    /// Rewrite a `(days, hours)` extent for this granularity. Hour-only plans
    /// fold the days into hours and visit no day windows.
    pub fn extent(self, days: u32, hours: u32) -> (u32, u32) {
        match self {
            Self::DayHour => (days, hours),
            Self::Hour => (0, HOURS_PER_DAY * days + hours),
        }
    }

    /// Label used in run file names.
    pub fn label(self) -> &'static str {
        match self {
            Self::DayHour => "daily",
            Self::Hour => "hourly",
        }
    }
}

/// Tunables shared by the batch runner and the server. Every field has a
/// default, so a config file only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub mu: f32,
    /// Results kept per query.
    pub top_n: usize,
    /// Highest top-k level evaluated; all partitions when unset.
    pub max_top_k: Option<usize>,
    /// Days in the collection; hours are `24 * days_total`.
    pub days_total: u32,
    pub run_tag: String,
    /// Clustering trial whose exports are read, `-trial{n}` in directory names.
    pub trial: u32,
    pub granularity: PlanGranularity,
    pub stats_mode: StatsMode,
    /// Wall-clock budget per query.
    pub query_budget_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mu: DEFAULT_MU,
            top_n: 1000,
            max_top_k: None,
            days_total: 17,
            run_tag: "kmeans".to_string(),
            trial: 1,
            granularity: PlanGranularity::DayHour,
            stats_mode: StatsMode::Corpus,
            query_budget_ms: None,
        }
    }
}

impl RetrievalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| RetrievalError::io(path, e))?;
        let cfg: Self = serde_json::from_slice(&bytes)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mu.is_nan() || self.mu <= 0.0 {
            return Err(RetrievalError::StartupConfig(format!("mu must be positive, got {}", self.mu)));
        }
        if self.top_n == 0 {
            return Err(RetrievalError::StartupConfig("top_n must be at least 1".into()));
        }
        if self.trial == 0 {
            return Err(RetrievalError::StartupConfig("trials are numbered from 1".into()));
        }
        if self.max_top_k == Some(0) {
            return Err(RetrievalError::StartupConfig("max_top_k must be at least 1".into()));
        }
        Ok(())
    }
}
