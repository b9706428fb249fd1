// Per-bank partitioning and the LOADED -> NORMALIZED -> PARTITIONED ->
// {VECTORIZED -> MODELED -> ASSIGNED} x partitions -> MERGED pipeline.
//
// Each partition owns its corpus, model and assignments. Failures that only
// concern one partition are recorded as skips; fatal errors abort the run.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assign::assign;
use crate::coherence::CoherenceScorer;
use crate::config::{StopwordSet, TopicConfig};
use crate::error::{Result, TopicError};
use crate::models::{topic_label, AssignmentRecord, CoherenceResult, NormalizedDocument, Review, TopicAssignment};
use crate::normalize::Normalizer;
use crate::topic_modeling::{LDAConfig, ModeledTopic, TopicModel, VariationalLDA};
use crate::vectorize::{Corpus, Vectorizer};

/// Everything one partition produced. Read-only once built.
#[derive(Debug, Clone)]
pub struct PartitionBundle {
    pub bank: String,
    pub corpus: Corpus,
    pub model: TopicModel,
    pub assignments: Vec<TopicAssignment>,  // Row-aligned with `documents`
    pub documents: Vec<NormalizedDocument>,
    pub topics: Vec<ModeledTopic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPartition {
    pub bank: String,
    pub reason: String,
    pub review_ids: Vec<String>,
}

impl SkippedPartition {
    fn new(bank: String, error: &TopicError, by_bank: &BTreeMap<String, Vec<NormalizedDocument>>) -> Self {
        let review_ids = by_bank
            .get(&bank)
            .map(|docs| docs.iter().map(|doc| doc.review_id.clone()).collect())
            .unwrap_or_default();
        SkippedPartition {
            bank,
            reason: error.to_string(),
            review_ids,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BankCounts {
    pub input: usize,
    pub assigned: usize,
    pub dropped_empty: usize,
    pub skipped: usize,
}

/// Accounting for one production run: `assigned + dropped_empty + skipped == input_reviews`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub input_reviews: usize,
    pub assigned: usize,
    pub dropped_empty: usize,
    pub skipped: usize,
    pub dropped_review_ids: Vec<String>,
    pub skipped_partitions: Vec<SkippedPartition>,
    pub per_bank: BTreeMap<String, BankCounts>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.assigned + self.dropped_empty + self.skipped == self.input_reviews
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub assignments: Vec<AssignmentRecord>,  // Original input order
    pub topics: BTreeMap<String, Vec<ModeledTopic>>,
    pub report: RunReport,
}

#[derive(Debug, Clone)]
pub struct TuningOutput {
    pub results: Vec<CoherenceResult>,
    pub recommendations: BTreeMap<String, usize>,
    pub skipped_partitions: Vec<SkippedPartition>,
}

/// Normalized corpus split by bank, plus the reviews that normalized to nothing.
struct Partitions {
    by_bank: BTreeMap<String, Vec<NormalizedDocument>>,
    dropped: Vec<NormalizedDocument>,
}

pub struct PartitionOrchestrator {
    config: TopicConfig,
    stopwords: StopwordSet,
}

impl PartitionOrchestrator {
    /// Validates the configuration up front so bad topic counts never reach a fit.
    pub fn new(config: TopicConfig) -> Result<Self> {
        config.validate()?;
        let stopwords = config.stopwords();
        debug!(stopwords = stopwords.len(), "Built stopword set");
        Ok(PartitionOrchestrator { config, stopwords })
    }

    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    /// Production run: fit every bank with its configured topic count and merge
    /// the assignments back into input order.
    pub fn run(&self, reviews: &[Review]) -> Result<RunOutput> {
        info!(reviews = reviews.len(), "Starting topic run");

        // Step 1: Normalize and partition
        let partitions = self.partition(self.normalize_all(reviews)?);

        // Step 2: Fit each partition independently
        let results = self.for_each_partition(&partitions.by_bank, |bank, documents| {
            self.fit_partition(bank, documents)
        });

        let mut bundles: BTreeMap<String, PartitionBundle> = BTreeMap::new();
        let mut skipped_partitions = Vec::new();
        for (bank, result) in results {
            match result {
                Ok(bundle) => {
                    bundles.insert(bank, bundle);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(bank = %bank, error = %e, "Skipping partition");
                    let skipped = SkippedPartition::new(bank, &e, &partitions.by_bank);
                    skipped_partitions.push(skipped);
                }
            }
        }

        // Step 3: Merge by input position
        let mut slots: Vec<Option<AssignmentRecord>> = vec![None; reviews.len()];
        for bundle in bundles.values() {
            for (doc, assignment) in bundle.documents.iter().zip(&bundle.assignments) {
                slots[doc.position] = Some(AssignmentRecord {
                    review_id: assignment.review_id.clone(),
                    bank: bundle.bank.clone(),
                    topic_id: assignment.topic_id,
                    topic_confidence: assignment.confidence,
                    identified_topic: assignment.topic_label.clone(),
                });
            }
        }
        let assignments: Vec<AssignmentRecord> = slots.into_iter().flatten().collect();

        let report = self.build_report(reviews, &partitions, &assignments, skipped_partitions);
        info!(
            assigned = report.assigned,
            dropped_empty = report.dropped_empty,
            skipped = report.skipped,
            "Merged partition assignments"
        );

        let topics = bundles
            .into_iter()
            .map(|(bank, bundle)| (bank, bundle.topics))
            .collect();

        Ok(RunOutput {
            assignments,
            topics,
            report,
        })
    }

    /// Coherence sweep over the tuning range for every bank. Recommendations are
    /// reported only; they are applied by passing them back as topic overrides.
    pub fn tune(&self, reviews: &[Review]) -> Result<TuningOutput> {
        info!(
            reviews = reviews.len(),
            range = ?self.config.tuning_range(),
            "Starting coherence sweep"
        );

        let partitions = self.partition(self.normalize_all(reviews)?);
        let sweeps = self.for_each_partition(&partitions.by_bank, |bank, documents| {
            self.tune_partition(bank, documents)
        });

        let mut results = Vec::new();
        let mut recommendations = BTreeMap::new();
        let mut skipped_partitions = Vec::new();
        for (bank, sweep) in sweeps {
            match sweep {
                Ok(scores) => {
                    if let Some(best) = best_topic_count(&scores) {
                        info!(bank = %bank, topics = best.topic_count, score = best.coherence_score, "Recommended topic count");
                        recommendations.insert(bank.clone(), best.topic_count);
                    }
                    results.extend(scores);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(bank = %bank, error = %e, "Skipping partition");
                    let skipped = SkippedPartition::new(bank, &e, &partitions.by_bank);
                    skipped_partitions.push(skipped);
                }
            }
        }

        Ok(TuningOutput {
            results,
            recommendations,
            skipped_partitions,
        })
    }

    /// Vectorize, fit and assign one bank's non-empty documents.
    pub fn fit_partition(&self, bank: &str, documents: &[NormalizedDocument]) -> Result<PartitionBundle> {
        let corpus = self.vectorize_partition(bank, documents)?;
        let topic_count = self.config.topic_count_for(bank);
        let model = VariationalLDA::new(LDAConfig::from_topic_config(&self.config, topic_count))
            .fit(bank, &corpus.matrix)?;

        let assignments = assign(&model.document_topic)
            .into_iter()
            .zip(documents)
            .map(|((topic_id, confidence), doc)| TopicAssignment {
                review_id: doc.review_id.clone(),
                topic_id,
                topic_label: topic_label(bank, topic_id),
                confidence,
            })
            .collect();
        let topics = model.extract_topics(&corpus.vocabulary, self.config.coherence_top_n);

        info!(
            bank = %bank,
            documents = documents.len(),
            terms = corpus.vocabulary.len(),
            topics = topic_count,
            iterations = model.iterations,
            "Fitted partition"
        );

        Ok(PartitionBundle {
            bank: bank.to_string(),
            corpus,
            model,
            assignments,
            documents: documents.to_vec(),
            topics,
        })
    }

    /// Coherence score for every candidate K of one bank, ascending K.
    pub fn tune_partition(&self, bank: &str, documents: &[NormalizedDocument]) -> Result<Vec<CoherenceResult>> {
        // The vocabulary does not depend on K, so one corpus serves the whole sweep
        let corpus = self.vectorize_partition(bank, documents)?;
        let texts: Vec<Vec<String>> = documents.iter().map(|doc| doc.tokens.clone()).collect();
        let scorer = CoherenceScorer::from_config(&self.config);

        let mut scores = Vec::new();
        let mut last_error = None;
        for topic_count in self.config.tuning_range() {
            let model = match VariationalLDA::new(LDAConfig::from_topic_config(&self.config, topic_count))
                .fit(bank, &corpus.matrix)
            {
                Ok(model) => model,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(bank = %bank, topics = topic_count, error = %e, "Skipping candidate topic count");
                    last_error = Some(e);
                    continue;
                }
            };

            let top_words = model.top_words(&corpus.vocabulary, self.config.coherence_top_n);
            let coherence_score = scorer.score(&top_words, &texts);
            info!(bank = %bank, topics = topic_count, score = coherence_score, "Scored candidate");

            scores.push(CoherenceResult {
                bank: bank.to_string(),
                topic_count,
                coherence_score,
            });
        }

        require_scores(bank, scores, last_error)
    }

    fn vectorize_partition(&self, bank: &str, documents: &[NormalizedDocument]) -> Result<Corpus> {
        if documents.is_empty() {
            return Err(TopicError::EmptyPartitionCorpus {
                bank: bank.to_string(),
                reason: "no non-empty documents after normalization".to_string(),
            });
        }

        let tokens: Vec<Vec<String>> = documents.iter().map(|doc| doc.tokens.clone()).collect();
        match Vectorizer::from_config(&self.config).fit(bank, &tokens) {
            Err(TopicError::EmptyVocabulary(reason)) => Err(TopicError::EmptyPartitionCorpus {
                bank: bank.to_string(),
                reason,
            }),
            other => other,
        }
    }

    /// Review ids must be unique; a repeated id aborts the run before any work.
    fn normalize_all(&self, reviews: &[Review]) -> Result<Vec<NormalizedDocument>> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(reviews.len());
        for review in reviews {
            if !seen.insert(review.review_id.as_str()) {
                return Err(TopicError::DuplicateReviewId(review.review_id.clone()));
            }
        }

        let normalizer = Normalizer::new(&self.stopwords)?;
        let normalize = |(position, review): (usize, &Review)| NormalizedDocument {
            review_id: review.review_id.clone(),
            bank: review.bank.clone(),
            position,
            tokens: normalizer.normalize(review.review_text.as_deref()),
        };

        let documents: Vec<NormalizedDocument> = if self.config.parallel {
            reviews.par_iter().enumerate().map(normalize).collect()
        } else {
            reviews.iter().enumerate().map(normalize).collect()
        };
        Ok(documents)
    }

    fn partition(&self, documents: Vec<NormalizedDocument>) -> Partitions {
        let mut by_bank: BTreeMap<String, Vec<NormalizedDocument>> = BTreeMap::new();
        let mut dropped = Vec::new();

        for doc in documents {
            // Every bank gets an entry, even when all of its reviews are empty
            let bucket = by_bank.entry(doc.bank.clone()).or_default();
            if doc.is_empty() {
                dropped.push(doc);
            } else {
                bucket.push(doc);
            }
        }

        if !dropped.is_empty() {
            warn!(dropped = dropped.len(), "Dropped reviews with no tokens after normalization");
        }
        for (bank, docs) in &by_bank {
            debug!(bank = %bank, documents = docs.len(), "Partitioned");
        }

        Partitions { by_bank, dropped }
    }

    fn for_each_partition<T, F>(&self, partitions: &BTreeMap<String, Vec<NormalizedDocument>>, work: F) -> BTreeMap<String, T>
    where
        T: Send,
        F: Fn(&str, &[NormalizedDocument]) -> T + Sync,
    {
        if self.config.parallel {
            partitions
                .par_iter()
                .map(|(bank, docs)| (bank.clone(), work(bank.as_str(), docs.as_slice())))
                .collect()
        } else {
            partitions
                .iter()
                .map(|(bank, docs)| (bank.clone(), work(bank.as_str(), docs.as_slice())))
                .collect()
        }
    }

    fn build_report(
        &self,
        reviews: &[Review],
        partitions: &Partitions,
        assignments: &[AssignmentRecord],
        skipped_partitions: Vec<SkippedPartition>,
    ) -> RunReport {
        let mut per_bank: BTreeMap<String, BankCounts> = BTreeMap::new();
        for review in reviews {
            per_bank.entry(review.bank.clone()).or_default().input += 1;
        }
        for record in assignments {
            per_bank.entry(record.bank.clone()).or_default().assigned += 1;
        }
        for doc in &partitions.dropped {
            per_bank.entry(doc.bank.clone()).or_default().dropped_empty += 1;
        }
        for skip in &skipped_partitions {
            per_bank.entry(skip.bank.clone()).or_default().skipped += skip.review_ids.len();
        }

        RunReport {
            generated_at: Utc::now(),
            input_reviews: reviews.len(),
            assigned: assignments.len(),
            dropped_empty: partitions.dropped.len(),
            skipped: skipped_partitions.iter().map(|s| s.review_ids.len()).sum(),
            dropped_review_ids: partitions.dropped.iter().map(|d| d.review_id.clone()).collect(),
            skipped_partitions,
            per_bank,
        }
    }
}

/// A sweep where no candidate could be fitted withdraws the whole bank.
fn require_scores(
    bank: &str,
    scores: Vec<CoherenceResult>,
    last_error: Option<TopicError>,
) -> Result<Vec<CoherenceResult>> {
    if !scores.is_empty() {
        return Ok(scores);
    }
    Err(last_error.unwrap_or_else(|| TopicError::EmptyPartitionCorpus {
        bank: bank.to_string(),
        reason: "no candidate topic count could be fitted".to_string(),
    }))
}

/// Highest coherence wins; ties go to the smallest topic count.
pub fn best_topic_count(scores: &[CoherenceResult]) -> Option<&CoherenceResult> {
    let mut best: Option<&CoherenceResult> = None;
    for result in scores {
        best = match best {
            Some(current)
                if result.coherence_score < current.coherence_score
                    || (result.coherence_score == current.coherence_score
                        && result.topic_count >= current.topic_count) =>
            {
                Some(current)
            }
            _ => Some(result),
        };
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(id: &str, bank: &str, text: Option<&str>) -> Review {
        Review {
            review_id: id.to_string(),
            bank: bank.to_string(),
            review_text: text.map(String::from),
        }
    }

    fn config() -> TopicConfig {
        TopicConfig {
            default_topic_count: 2,
            parallel: false,
            ..TopicConfig::default()
        }
    }

    fn banking_reviews(bank: &str, prefix: &str) -> Vec<Review> {
        [
            "login fails with otp error",
            "otp code never arrives at login",
            "login otp verification broken",
            "transfer money slow and pending",
            "money transfer pending for days",
            "slow transfer money again",
        ]
        .iter()
        .enumerate()
        .map(|(i, text)| review(&format!("{prefix}{i}"), bank, Some(text)))
        .collect()
    }

    #[test]
    fn test_invalid_topic_count_rejected_before_fitting() {
        let err = PartitionOrchestrator::new(TopicConfig {
            default_topic_count: 1,
            ..TopicConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, TopicError::InvalidConfiguration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_override_below_two_rejected() {
        let mut cfg = config();
        cfg.topic_overrides.insert("CBE".to_string(), 1);
        assert!(PartitionOrchestrator::new(cfg).is_err());
    }

    #[test]
    fn test_empty_text_dropped_and_counted() {
        let mut reviews = banking_reviews("CBE", "c");
        reviews.insert(2, review("blank", "CBE", None));
        reviews.push(review("emoji", "CBE", Some("👍👍 !!! 123")));

        let orchestrator = PartitionOrchestrator::new(config()).unwrap();
        let output = orchestrator.run(&reviews).unwrap();

        assert_eq!(output.report.dropped_empty, 2);
        assert_eq!(output.report.dropped_review_ids, vec!["blank", "emoji"]);
        assert!(output.assignments.iter().all(|a| a.review_id != "blank" && a.review_id != "emoji"));
        assert_eq!(output.assignments.len(), 6);
        assert!(output.report.is_complete());
    }

    #[test]
    fn test_merge_preserves_input_order_across_banks() {
        let mut reviews = Vec::new();
        for (a, b) in banking_reviews("CBE", "c").into_iter().zip(banking_reviews("Abyssinia", "a")) {
            reviews.push(a);
            reviews.push(b);
        }

        let orchestrator = PartitionOrchestrator::new(config()).unwrap();
        let output = orchestrator.run(&reviews).unwrap();

        let ids: Vec<&str> = output.assignments.iter().map(|a| a.review_id.as_str()).collect();
        let expected: Vec<&str> = reviews.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids, expected);
        for record in &output.assignments {
            assert_eq!(record.identified_topic, topic_label(&record.bank, record.topic_id));
            assert!((0.0..=1.0).contains(&record.topic_confidence));
        }
    }

    #[test]
    fn test_failing_partition_does_not_abort_others() {
        let mut reviews = banking_reviews("CBE", "c");
        // Every token is unique, so nothing reaches the minimum document count
        reviews.push(review("d0", "Dashen", Some("fingerprint crash")));
        reviews.push(review("d1", "Dashen", Some("receipt telebirr")));

        let orchestrator = PartitionOrchestrator::new(config()).unwrap();
        let output = orchestrator.run(&reviews).unwrap();

        assert_eq!(output.report.skipped, 2);
        assert_eq!(output.report.skipped_partitions.len(), 1);
        assert_eq!(output.report.skipped_partitions[0].bank, "Dashen");
        assert_eq!(output.report.skipped_partitions[0].review_ids, vec!["d0", "d1"]);
        assert_eq!(output.assignments.len(), 6);
        assert!(output.assignments.iter().all(|a| a.bank == "CBE"));
        assert_eq!(output.report.per_bank["Dashen"].skipped, 2);
        assert!(output.report.is_complete());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut reviews = banking_reviews("CBE", "c");
        reviews.extend(banking_reviews("Abyssinia", "a"));

        let sequential = PartitionOrchestrator::new(config()).unwrap().run(&reviews).unwrap();
        let parallel = PartitionOrchestrator::new(TopicConfig {
            parallel: true,
            ..config()
        })
        .unwrap()
        .run(&reviews)
        .unwrap();

        assert_eq!(sequential.assignments, parallel.assignments);
    }

    #[test]
    fn test_topic_override_applies_per_bank() {
        let mut cfg = config();
        cfg.topic_overrides.insert("Abyssinia".to_string(), 3);
        let mut reviews = banking_reviews("CBE", "c");
        reviews.extend(banking_reviews("Abyssinia", "a"));

        let output = PartitionOrchestrator::new(cfg).unwrap().run(&reviews).unwrap();
        assert_eq!(output.topics["CBE"].len(), 2);
        assert_eq!(output.topics["Abyssinia"].len(), 3);
    }

    #[test]
    fn test_tune_scores_every_candidate() {
        let cfg = TopicConfig {
            tuning_topic_range: (2, 4),
            ..config()
        };
        let output = PartitionOrchestrator::new(cfg)
            .unwrap()
            .tune(&banking_reviews("CBE", "c"))
            .unwrap();

        let counts: Vec<usize> = output.results.iter().map(|r| r.topic_count).collect();
        assert_eq!(counts, vec![2, 3, 4]);
        assert!(output.results.iter().all(|r| r.coherence_score.is_finite()));
        let best = best_topic_count(&output.results).unwrap().topic_count;
        assert_eq!(output.recommendations["CBE"], best);
    }

    #[test]
    fn test_duplicate_review_ids_rejected_by_run() {
        let reviews: Vec<Review> = (0..4)
            .map(|_| review("same", "CBE", Some("login otp error")))
            .collect();
        let orchestrator = PartitionOrchestrator::new(config()).unwrap();
        let err = orchestrator.run(&reviews).err().unwrap();
        assert!(matches!(err, TopicError::DuplicateReviewId(ref id) if id == "same"));
        assert!(err.is_fatal());
        assert!(orchestrator.tune(&reviews).is_err());
    }

    #[test]
    fn test_sweep_without_any_fit_is_a_skip() {
        let degenerate = TopicError::NumericDegeneracy {
            bank: "CBE".to_string(),
            matrix: "document_topic",
            row: 0,
            sum: f64::NAN,
        };
        let err = require_scores("CBE", Vec::new(), Some(degenerate)).unwrap_err();
        assert!(matches!(err, TopicError::NumericDegeneracy { .. }));
        assert!(!err.is_fatal());

        let err = require_scores("CBE", Vec::new(), None).unwrap_err();
        assert!(matches!(err, TopicError::EmptyPartitionCorpus { ref bank, .. } if bank == "CBE"));

        let scores = vec![CoherenceResult { bank: "CBE".to_string(), topic_count: 2, coherence_score: 0.5 }];
        assert_eq!(require_scores("CBE", scores.clone(), None).unwrap(), scores);
    }

    #[test]
    fn test_best_topic_count_prefers_smaller_on_ties() {
        let scores = vec![
            CoherenceResult { bank: "CBE".to_string(), topic_count: 2, coherence_score: 0.4 },
            CoherenceResult { bank: "CBE".to_string(), topic_count: 3, coherence_score: 0.6 },
            CoherenceResult { bank: "CBE".to_string(), topic_count: 4, coherence_score: 0.6 },
        ];
        assert_eq!(best_topic_count(&scores).unwrap().topic_count, 3);
        assert!(best_topic_count(&[]).is_none());
    }
}
