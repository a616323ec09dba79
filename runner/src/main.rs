use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use timeslice_core::config::{PlanGranularity, RetrievalConfig, StatsMode};
use timeslice_core::dictionary::TermDictionary;
use timeslice_core::engine::Engine;
use timeslice_core::executor::QueryOutcome;
use timeslice_core::persist::{run_file, save_dictionary, save_meta, write_run, ClusterPaths, MetaFile, StatsPaths};
use timeslice_core::scorer::{CutoffStats, QueryTerm};
use timeslice_core::stats::DocumentStore;
use timeslice_core::tokenizer::analyze;
use timeslice_core::topics::{load_day_hours, load_query_cf, load_query_vectors, load_topics, Topic};
use timeslice_core::RetrievalError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "timeslice-runner")]
#[command(about = "Run TREC microblog topics through cluster-pruned temporal retrieval", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every topic at every top-k level and write one run file per level
    Run(RunArgs),
    /// Precompute per-topic background statistics up to each topic's cutoff
    CutoffStats {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        topics: PathBuf,
    },
    /// Save the term enumeration as a binary dictionary snapshot
    SnapshotDictionary {
        #[arg(long)]
        terms: PathBuf,
        #[arg(long)]
        stats: PathBuf,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Directory holding the document statistics files
    #[arg(long)]
    stats: PathBuf,
    /// Term enumeration `term<TAB>df<TAB>cf`; the snapshot in --stats is used when omitted
    #[arg(long)]
    terms: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,
    #[arg(long)]
    topics: PathBuf,
    /// Query embeddings, `id v1 .. vD` per line in topic order
    #[arg(long)]
    query_vectors: PathBuf,
    /// `days hours` per line in topic order
    #[arg(long)]
    day_hours: PathBuf,
    #[arg(long)]
    day_clusters: PathBuf,
    #[arg(long)]
    hour_clusters: PathBuf,
    /// Per-window document vectors for windows without exported assignments
    #[arg(long)]
    vectors: Option<PathBuf>,
    #[arg(long)]
    dimension: usize,
    #[arg(long)]
    output: PathBuf,
    /// JSON file with retrieval settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    mu: Option<f32>,
    #[arg(long)]
    top_n: Option<usize>,
    #[arg(long)]
    max_top_k: Option<usize>,
    #[arg(long)]
    days_total: Option<u32>,
    #[arg(long)]
    run_tag: Option<String>,
    /// Clustering trial to read, `-trial{n}` in export directory names
    #[arg(long)]
    trial: Option<u32>,
    /// Walk hours only: each `d h` extent becomes hour `24d + h`
    #[arg(long)]
    hourly: bool,
    /// `corpus` or `cutoff`
    #[arg(long)]
    stats_mode: Option<String>,
    /// Per-topic counts `cf_1 .. cf_n total`, used as background statistics
    #[arg(long)]
    query_cf: Option<PathBuf>,
    /// Worker threads; all cores when unset
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::CutoffStats { source, topics } => cutoff_stats(&source, &topics),
        Commands::SnapshotDictionary { terms, stats } => snapshot_dictionary(&terms, &stats),
    }
}

fn load_config(args: &RunArgs) -> Result<RetrievalConfig> {
    let mut cfg = match &args.config {
        Some(path) => RetrievalConfig::load(path).with_context(|| format!("reading config {}", path.display()))?,
        None => RetrievalConfig::default(),
    };
    if let Some(mu) = args.mu { cfg.mu = mu; }
    if let Some(n) = args.top_n { cfg.top_n = n; }
    if args.max_top_k.is_some() { cfg.max_top_k = args.max_top_k; }
    if let Some(d) = args.days_total { cfg.days_total = d; }
    if let Some(tag) = &args.run_tag { cfg.run_tag = tag.clone(); }
    if let Some(trial) = args.trial { cfg.trial = trial; }
    if args.hourly { cfg.granularity = PlanGranularity::Hour; }
    if let Some(mode) = &args.stats_mode {
        cfg.stats_mode = match mode.as_str() {
            "corpus" => StatsMode::Corpus,
            "cutoff" => StatsMode::Cutoff,
            other => bail!(RetrievalError::StartupConfig(format!("unknown stats mode {other:?}, expected corpus or cutoff"))),
        };
    }
    cfg.validate()?;
    Ok(cfg)
}

fn require(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!(RetrievalError::StartupConfig(format!("{what} not found at {}", path.display())));
    }
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    let cfg = load_config(&args)?;
    require(&args.source.stats, "statistics directory")?;
    require(&args.day_clusters, "day cluster directory")?;
    require(&args.hour_clusters, "hour cluster directory")?;
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new().num_threads(threads).build_global().context("configuring worker threads")?;
    }

    let topics = load_topics(&args.topics)?;
    let vectors = load_query_vectors(&args.query_vectors, args.dimension)?;
    let extents = load_day_hours(&args.day_hours)?;
    if vectors.len() != topics.len() || extents.len() != topics.len() {
        bail!(RetrievalError::StartupConfig(format!(
            "{} topics but {} query vectors and {} day/hour lines",
            topics.len(),
            vectors.len(),
            extents.len()
        )));
    }

    let clusters = ClusterPaths {
        day_root: args.day_clusters.clone(),
        hour_root: args.hour_clusters.clone(),
        dimension: args.dimension,
        trial: cfg.trial,
        vectors_root: args.vectors.clone(),
    };
    let engine = Engine::open(StatsPaths::new(&args.source.stats), args.source.terms.as_deref(), &clusters, cfg)?;

    let queries = topics
        .iter()
        .zip(vectors)
        .zip(extents)
        .map(|((topic, embedding), (days, hours))| engine.query(topic.trec_number(), &topic.text, embedding, topic.cutoff, days, hours))
        .collect::<timeslice_core::Result<Vec<_>>>()?;

    let outcomes = match &args.query_cf {
        Some(path) => {
            let counts = load_query_cf(path)?;
            if counts.len() != queries.len() {
                bail!(RetrievalError::StartupConfig(format!("{} topics but {} query-cf lines", queries.len(), counts.len())));
            }
            let stats = queries
                .iter()
                .zip(&counts)
                .map(|(q, c)| CutoffStats::from_counts(c, &q.terms))
                .collect::<timeslice_core::Result<Vec<_>>>()?;
            info!(path = %path.display(), "using per-topic query-cf statistics");
            queries.par_iter().zip(&stats).map(|(q, s)| engine.execute_using(q, s)).collect::<Vec<_>>()
        }
        None => queries
            .par_iter()
            .enumerate()
            .map(|(i, q)| engine.execute(q, Some(i + 1)))
            .collect::<timeslice_core::Result<Vec<_>>>()?,
    };

    for outcome in &outcomes {
        for w in &outcome.warnings {
            warn!(query = %outcome.query_id, warning = %w, "query degraded");
        }
    }

    let max_k = outcomes.iter().map(|o| o.levels.len()).max().unwrap_or(0);
    for k in 1..=max_k {
        let path = run_file(&args.output, engine.config(), args.dimension, k);
        let rankings = outcomes
            .iter()
            .filter_map(|o| o.level(k).map(|level| (o.query_id.as_str(), level.ranking.as_slice())));
        write_run(&path, &engine.config().run_tag, rankings)?;
    }

    for (k, avg) in average_fractions(&outcomes) {
        println!("{k}\t{avg:.6}");
    }
    info!(topics = outcomes.len(), levels = max_k, output = %args.output.display(), "run complete");
    Ok(())
}

/// Mean fraction scanned per top-k level over the queries that define one.
fn average_fractions(outcomes: &[QueryOutcome]) -> Vec<(usize, f64)> {
    let max_k = outcomes.iter().map(|o| o.levels.len()).max().unwrap_or(0);
    (1..=max_k)
        .filter_map(|k| {
            let fractions: Vec<f64> = outcomes.iter().filter_map(|o| o.level(k)?.fraction_scanned()).collect();
            (!fractions.is_empty()).then(|| (k, fractions.iter().sum::<f64>() / fractions.len() as f64))
        })
        .collect()
}

fn open_source(source: &SourceArgs) -> Result<(StatsPaths, TermDictionary)> {
    let paths = StatsPaths::new(&source.stats);
    let dict = match &source.terms {
        Some(terms) => TermDictionary::load_tsv(terms)?,
        None => timeslice_core::persist::load_dictionary(&paths)?,
    };
    Ok((paths, dict))
}

fn cutoff_stats(source: &SourceArgs, topics: &Path) -> Result<()> {
    let (paths, dict) = open_source(source)?;
    let store = DocumentStore::load(&paths)?;
    let topics: Vec<Topic> = load_topics(topics)?;

    topics.par_iter().enumerate().try_for_each(|(i, topic)| -> Result<()> {
        let terms: Vec<QueryTerm> = analyze(&topic.text).into_iter().map(|t| QueryTerm::resolve(t, &dict)).collect();
        let stats = CutoffStats::accumulate(&store, topic.cutoff, &terms);
        let path = paths.cutoff_stats(i + 1);
        stats.save(&path)?;
        tracing::debug!(topic = %topic.id, total_terms = stats.total_terms, path = %path.display(), "wrote cutoff statistics");
        Ok(())
    })?;
    info!(topics = topics.len(), dir = %paths.cutoff_stats_dir().display(), "cutoff statistics complete");
    Ok(())
}

fn snapshot_dictionary(terms: &Path, stats: &Path) -> Result<()> {
    let paths = StatsPaths::new(stats);
    let dict = TermDictionary::load_tsv(terms)?;
    let store = DocumentStore::load(&paths)?;
    save_dictionary(&paths, &dict)?;
    let meta = MetaFile {
        num_docs: store.len() as u32,
        num_terms: dict.len() as u32,
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: 1,
    };
    save_meta(&paths, &meta)?;
    info!(terms = dict.len(), docs = store.len(), snapshot = %paths.dictionary_snapshot().display(), "dictionary snapshot written");
    Ok(())
}
