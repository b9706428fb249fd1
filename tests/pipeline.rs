use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use review_topics::models::{AssignmentRecord, CoherenceResult};
use review_topics::normalize::Normalizer;
use review_topics::config::StopwordSet;
use review_topics::sources;
use review_topics::topic_modeling::{LDAConfig, VariationalLDA};
use review_topics::vectorize::DocumentTermMatrix;
use review_topics::{PartitionOrchestrator, TopicConfig, TopicError};
use tempfile::tempdir;

const REVIEWS: &str = "\
review_id,bank_name,review_text,rating
c1,CBE,Login fails every time with OTP error,1
c2,CBE,OTP code never arrives so login is impossible,1
c3,CBE,,3
c4,CBE,Transfer money is slow and stays pending,2
c5,CBE,Money transfer pending for two days,2
c6,CBE,Slow transfer of money again,2
c7,CBE,Login OTP verification broken,1
a1,Abyssinia,Fingerprint login crashes the screen,1
a2,Abyssinia,Screen crashes after fingerprint login,1
a3,Abyssinia,Balance statement download fails,2
a4,Abyssinia,Cannot download balance statement,2
a5,Abyssinia,Fingerprint screen crash,1
a6,Abyssinia,Statement balance download error,2
d1,Dashen,💯💯💯 5/5,5
d2,Dashen,Telebirr receipt,4
";

fn write_input(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, REVIEWS).unwrap();
    path
}

fn config() -> TopicConfig {
    TopicConfig {
        default_topic_count: 2,
        ..TopicConfig::default()
    }
}

#[test]
fn test_end_to_end_csv_run() {
    let dir = tempdir().unwrap();
    let input = write_input(dir.path(), "reviews_processed.csv");
    let output = dir.path().join("reviews_with_themes_lda.csv");

    let (_, reviews) = sources::load_reviews(&[input]).unwrap();
    let result = PartitionOrchestrator::new(config()).unwrap().run(&reviews).unwrap();
    sources::write_csv(&output, &result.assignments).unwrap();

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let rows: Vec<AssignmentRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows, result.assignments);

    for row in &rows {
        assert!(row.topic_id < 2);
        assert!((0.0..=1.0).contains(&row.topic_confidence));
        assert_eq!(row.identified_topic, format!("{}_Topic_{}", row.bank, row.topic_id));
    }
}

#[test]
fn test_every_review_accounted_for_once() {
    let dir = tempdir().unwrap();
    let input = write_input(dir.path(), "reviews.csv");
    let (_, reviews) = sources::load_reviews(&[input]).unwrap();
    let result = PartitionOrchestrator::new(config()).unwrap().run(&reviews).unwrap();
    let report = &result.report;

    assert!(report.is_complete());
    assert_eq!(report.input_reviews, 15);
    assert_eq!(report.dropped_review_ids, vec!["c3", "d1"]);

    // Dashen keeps one review that shares no term with any other
    assert_eq!(report.skipped_partitions.len(), 1);
    assert_eq!(report.skipped_partitions[0].review_ids, vec!["d2"]);

    let mut seen = HashSet::new();
    for row in &result.assignments {
        assert!(seen.insert(row.review_id.clone()), "{} assigned twice", row.review_id);
    }
    let excluded: HashSet<String> = report
        .dropped_review_ids
        .iter()
        .chain(report.skipped_partitions.iter().flat_map(|s| s.review_ids.iter()))
        .cloned()
        .collect();
    assert_eq!(seen.len() + excluded.len(), reviews.len());
    assert!(seen.is_disjoint(&excluded));

    assert_eq!(report.per_bank["CBE"].assigned, 6);
    assert_eq!(report.per_bank["CBE"].dropped_empty, 1);
    assert_eq!(report.per_bank["Abyssinia"].assigned, 6);
}

#[test]
fn test_run_is_reproducible() {
    let dir = tempdir().unwrap();
    let input = write_input(dir.path(), "reviews.csv");
    let (_, reviews) = sources::load_reviews(&[input]).unwrap();

    let first = PartitionOrchestrator::new(config()).unwrap().run(&reviews).unwrap();
    let second = PartitionOrchestrator::new(config()).unwrap().run(&reviews).unwrap();
    assert_eq!(first.assignments, second.assignments);
}

#[test]
fn test_topic_count_one_fails_before_loading() {
    let result = PartitionOrchestrator::new(TopicConfig {
        default_topic_count: 1,
        ..TopicConfig::default()
    });
    assert!(matches!(result, Err(TopicError::InvalidConfiguration(_))));
}

#[test]
fn test_fallback_prefers_first_available_source() {
    let dir = tempdir().unwrap();
    let enriched = dir.path().join("reviews_with_twitter_sentiment.csv");
    let processed = write_input(dir.path(), "reviews_processed.csv");

    let (used, reviews) = sources::load_reviews(&[enriched.clone(), processed.clone()]).unwrap();
    assert_eq!(used, processed);
    assert_eq!(reviews.len(), 15);

    std::fs::write(&enriched, "review_id,bank,review_text\nx1,CBE,only row\n").unwrap();
    let (used, reviews) = sources::load_reviews(&[enriched.clone(), processed]).unwrap();
    assert_eq!(used, enriched);
    assert_eq!(reviews.len(), 1);
}

#[test]
fn test_missing_sources_fail_the_run() {
    let dir = tempdir().unwrap();
    let err = sources::load_reviews(&[dir.path().join("nope.csv")]).unwrap_err();
    assert!(matches!(err, TopicError::MissingInput { .. }));
    assert!(err.to_string().contains("nope.csv"));
}

#[test]
fn test_tune_writes_scores_and_recommendations() {
    let dir = tempdir().unwrap();
    let input = write_input(dir.path(), "reviews.csv");
    let scores_path = dir.path().join("coherence_scores.csv");
    let recommend_path = dir.path().join("recommended.json");

    let (_, reviews) = sources::load_reviews(&[input]).unwrap();
    let cfg = TopicConfig {
        tuning_topic_range: (2, 3),
        use_high_frequency_stopwords: false,
        ..config()
    };
    let result = PartitionOrchestrator::new(cfg).unwrap().tune(&reviews).unwrap();
    sources::write_csv(&scores_path, &result.results).unwrap();
    sources::write_json(&recommend_path, &result.recommendations).unwrap();

    let mut reader = csv::Reader::from_path(&scores_path).unwrap();
    let rows: Vec<CoherenceResult> = reader.deserialize().collect::<Result<_, _>>().unwrap();
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|r| r.bank == "CBE" || r.bank == "Abyssinia"));

    // The recommendation file feeds straight back in as topic overrides
    let file = std::fs::File::open(&recommend_path).unwrap();
    let overrides: BTreeMap<String, usize> = serde_json::from_reader(file).unwrap();
    assert_eq!(overrides.keys().collect::<Vec<_>>(), vec!["Abyssinia", "CBE"]);

    let mut production = config();
    production.topic_overrides.extend(overrides.clone());
    let run = PartitionOrchestrator::new(production).unwrap().run(&reviews).unwrap();
    assert_eq!(run.topics["CBE"].len(), overrides["CBE"]);
}

#[test]
fn test_five_document_partition_invariants() {
    let stopwords = StopwordSet::new(Vec::<String>::new());
    let normalizer = Normalizer::new(&stopwords).unwrap();
    let docs: Vec<Vec<String>> = ["login fail", "login slow", "transfer fail", "transfer slow", "login transfer"]
        .iter()
        .map(|text| normalizer.normalize(Some(text)))
        .collect();
    assert_eq!(docs[0], vec!["login", "fail"]);

    // login, fail, slow, transfer
    let rows = vec![
        vec![(0, 1), (1, 1)],
        vec![(0, 1), (2, 1)],
        vec![(1, 1), (3, 1)],
        vec![(2, 1), (3, 1)],
        vec![(0, 1), (3, 1)],
    ];
    let dtm = DocumentTermMatrix::from_rows(rows, 4);
    let lda = VariationalLDA::new(LDAConfig {
        num_topics: 2,
        max_iterations: 50,
        ..LDAConfig::default()
    });

    let model = lda.fit("CBE", &dtm).unwrap();
    let again = lda.fit("CBE", &dtm).unwrap();
    assert_eq!(model.topic_word, again.topic_word);
    assert_eq!(model.document_topic, again.document_topic);

    for row in model.topic_word.iter().chain(&model.document_topic) {
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }
    assert_eq!(model.document_topic.len(), 5);
}
