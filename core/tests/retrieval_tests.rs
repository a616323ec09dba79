use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use timeslice_core::config::{RetrievalConfig, StatsMode};
use timeslice_core::engine::Engine;
use timeslice_core::dictionary::TermDictionary;
use timeslice_core::persist::{run_file, save_dictionary, write_run, ClusterPaths, StatsPaths};
use timeslice_core::scorer::CutoffStats;
use timeslice_core::WindowId;

fn write(path: PathBuf, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// Five tweets: day 1 holds 101..103, hour 25 holds 104 and 105.
fn build_fixture(root: &Path) -> (StatsPaths, PathBuf, ClusterPaths) {
    let stats = StatsPaths::new(root.join("stats"));
    write(stats.doc_ids(), "101\n102\n103\n104\n105\n");
    write(stats.doc_lengths(), "2\n1\n1\n1\n1\n");
    write(stats.doc_lengths_encoded(), "2.0\n1.0\n2.0\n1.0\n1.0\n");
    write(stats.posting_terms(), "1\n2\n3\n1\n2\n1\n");
    write(stats.posting_tfs(), "1\n1\n1\n2\n1\n1\n");

    let terms = root.join("terms.tsv");
    write(terms.clone(), "egypt\t3\t4\nprotest\t2\t2\nmuseum\t1\t1\n");

    let clusters = ClusterPaths {
        day_root: root.join("days"),
        hour_root: root.join("hours"),
        dimension: 2,
        trial: 1,
        vectors_root: None,
    };
    let day = WindowId::day(1);
    write(clusters.centers(day).join("part-r-00000"), "(1.0,0.0)\n(0.0,1.0)\n");
    write(clusters.assignments(day).join("part-m-00000"), "(0,0)\n(1,1)\n(2,0)\n");
    let hour = WindowId::hour(25);
    write(clusters.centers(hour).join("part-r-00000"), "(1.0,0.0)\n(0.0,1.0)\n");
    write(clusters.assignments(hour).join("part-m-00000"), "(3,0)\n(4,1)\n");
    (stats, terms, clusters)
}

fn config(mode: StatsMode) -> RetrievalConfig {
    RetrievalConfig { days_total: 2, stats_mode: mode, ..RetrievalConfig::default() }
}

#[test]
fn end_to_end_over_files() {
    let dir = tempdir().unwrap();
    let (stats, terms, clusters) = build_fixture(dir.path());
    let engine = Engine::open(stats, Some(&terms), &clusters, config(StatsMode::Corpus)).unwrap();

    let q = engine.query("MB001", "Egypt protests", vec![1.0, 0.0], 105, 1, 1).unwrap();
    let outcome = engine.execute(&q, Some(1)).unwrap();
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    assert_eq!(outcome.levels.len(), 2);

    let first = &outcome.levels[0];
    assert_eq!((first.scanned, first.eligible), (4, 5));
    let mut ids: Vec<u64> = first.ranking.iter().map(|d| d.external_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![101, 103, 104, 105]);
    // short tweets win under Dirichlet length normalisation
    assert_eq!(first.ranking[0].external_id, 104);
    assert_eq!(first.ranking[3].external_id, 101);

    let second = &outcome.levels[1];
    assert_eq!(second.fraction_scanned(), Some(1.0));
    // 102 only mentions the museum and never scores
    assert!(second.ranking.iter().all(|d| d.external_id != 102));
}

#[test]
fn earlier_cutoff_hides_newer_tweets() {
    let dir = tempdir().unwrap();
    let (stats, terms, clusters) = build_fixture(dir.path());
    let engine = Engine::open(stats, Some(&terms), &clusters, config(StatsMode::Corpus)).unwrap();
    let q = engine.query("MB002", "egypt", vec![1.0, 0.0], 104, 1, 1).unwrap();
    let outcome = engine.execute(&q, None).unwrap();
    let last = outcome.levels.last().unwrap();
    assert_eq!(last.eligible, 4);
    assert!(last.ranking.iter().all(|d| d.external_id <= 104));
}

#[test]
fn cutoff_mode_prefers_precomputed_statistics() {
    let dir = tempdir().unwrap();
    let (stats, terms, clusters) = build_fixture(dir.path());
    let precomputed = CutoffStats { total_terms: 6, frequencies: [("egypt".to_string(), 3)].into_iter().collect() };
    precomputed.save(&stats.cutoff_stats(1)).unwrap();
    let engine = Engine::open(stats, Some(&terms), &clusters, config(StatsMode::Cutoff)).unwrap();

    let q = engine.query("MB001", "egypt", vec![1.0, 0.0], 105, 1, 1).unwrap();
    assert_eq!(engine.cutoff_stats(&q, Some(1)).unwrap(), precomputed);
    let accumulated = engine.cutoff_stats(&q, Some(2)).unwrap();
    assert_eq!(accumulated.total_terms, 7);
    assert_eq!(accumulated.frequencies["egypt"], 4);

    let outcome = engine.execute(&q, Some(1)).unwrap();
    let ids: Vec<u64> = outcome.levels.last().unwrap().ranking.iter().map(|d| d.external_id).collect();
    assert_eq!(ids, vec![103, 105]);
}

#[test]
fn dictionary_snapshot_replaces_term_file() {
    let dir = tempdir().unwrap();
    let (stats, terms, clusters) = build_fixture(dir.path());
    save_dictionary(&stats, &TermDictionary::load_tsv(&terms).unwrap()).unwrap();
    let engine = Engine::open(stats, None, &clusters, config(StatsMode::Corpus)).unwrap();
    assert_eq!(engine.dictionary().len(), 3);
    assert_eq!(engine.dictionary().total_terms(), 7);
}

#[test]
fn run_files_use_trec_format() {
    let dir = tempdir().unwrap();
    let (stats, terms, clusters) = build_fixture(dir.path());
    let engine = Engine::open(stats, Some(&terms), &clusters, config(StatsMode::Corpus)).unwrap();
    let q = engine.query("MB001", "egypt", vec![1.0, 0.0], 105, 1, 1).unwrap();
    let outcome = engine.execute(&q, None).unwrap();

    let path = run_file(&dir.path().join("runs"), engine.config(), 2, 1);
    assert!(path.ends_with("runs/kmeans_d2_daily_top1_trial1.txt"));
    write_run(&path, "kmeans", [("1", outcome.levels[0].ranking.as_slice())]).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let first: Vec<&str> = text.lines().next().unwrap().split(' ').collect();
    assert_eq!(first[0], "1");
    assert_eq!(first[1], "Q0");
    assert_eq!(first[3], "1");
    assert_eq!(first[5], "kmeans");
    assert_eq!(text.lines().count(), outcome.levels[0].ranking.len());
}

#[test]
fn corrupt_statistics_fail_to_open() {
    let dir = tempdir().unwrap();
    let (stats, terms, clusters) = build_fixture(dir.path());
    fs::write(stats.doc_lengths(), "2\n1\n1\n").unwrap();
    assert!(Engine::open(stats, Some(&terms), &clusters, config(StatsMode::Corpus)).is_err());
}
