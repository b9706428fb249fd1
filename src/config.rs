use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stop_words::{get, LANGUAGE};

use crate::error::{Result, TopicError};

/// Generic review vocabulary: product category, organization and courtesy words.
pub const DOMAIN_STOPWORDS: &[&str] = &[
    "app", "bank", "mobile", "banking", "ethiopia", "please", "thank", "thanks",
];

/// Frequent but near-empty words, only dropped for production topic runs.
pub const HIGH_FREQUENCY_STOPWORDS: &[&str] = &[
    "use", "get", "one", "even", "also", "would", "much", "really", "still", "thing",
];

/// Negations are kept out of every stopword set, whatever the source list says.
pub const NEGATION_WORDS: &[&str] = &[
    "no", "not", "nor", "never", "none", "nobody", "nothing", "neither", "nowhere",
    "cannot", "without", "ain", "aren", "couldn", "didn", "doesn", "don", "hadn",
    "hasn", "haven", "isn", "mightn", "mustn", "needn", "shan", "shouldn", "wasn",
    "weren", "won", "wouldn",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    pub default_topic_count: usize,
    pub topic_overrides: BTreeMap<String, usize>,
    pub seed: u64,
    pub max_iterations: usize,
    pub max_doc_update_iterations: usize,
    pub mean_change_tolerance: f64,
    pub min_document_count: usize,
    pub max_document_fraction: f64,
    pub ngram_range: (usize, usize),
    pub tuning_topic_range: (usize, usize),  // inclusive
    pub coherence_top_n: usize,
    pub coherence_window: usize,
    pub extra_stopwords: Vec<String>,
    pub use_high_frequency_stopwords: bool,
    pub input_sources: Vec<PathBuf>,  // priority order
    pub parallel: bool,
}

impl Default for TopicConfig {
    fn default() -> Self {
        TopicConfig {
            default_topic_count: 5,
            topic_overrides: BTreeMap::new(),
            seed: 42,
            max_iterations: 10,
            max_doc_update_iterations: 100,
            mean_change_tolerance: 1e-3,
            min_document_count: 2,
            max_document_fraction: 0.95,
            ngram_range: (1, 2),
            tuning_topic_range: (2, 10),
            coherence_top_n: 10,
            coherence_window: 110,
            extra_stopwords: Vec::new(),
            use_high_frequency_stopwords: true,
            input_sources: vec![
                PathBuf::from("data/processed/reviews_with_twitter_sentiment.csv"),
                PathBuf::from("data/processed/reviews_processed.csv"),
            ],
            parallel: true,
        }
    }
}

impl TopicConfig {
    /// Read a JSON config file. Missing keys fall back to the defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn topic_count_for(&self, bank: &str) -> usize {
        self.topic_overrides
            .get(bank)
            .copied()
            .unwrap_or(self.default_topic_count)
    }

    pub fn tuning_range(&self) -> RangeInclusive<usize> {
        self.tuning_topic_range.0..=self.tuning_topic_range.1
    }

    /// Reject caller mistakes before any model is fitted.
    pub fn validate(&self) -> Result<()> {
        check_topic_count("default_topic_count", self.default_topic_count)?;
        for (bank, &k) in &self.topic_overrides {
            check_topic_count(&format!("topic_overrides[{bank}]"), k)?;
        }

        let (low, high) = self.tuning_topic_range;
        check_topic_count("tuning_topic_range start", low)?;
        if high < low {
            return Err(invalid(format!("tuning_topic_range {low}..={high} is empty")));
        }

        if self.min_document_count == 0 {
            return Err(invalid("min_document_count must be at least 1".to_string()));
        }
        if !(self.max_document_fraction > 0.0 && self.max_document_fraction <= 1.0) {
            return Err(invalid(format!(
                "max_document_fraction must lie in (0, 1], got {}",
                self.max_document_fraction
            )));
        }

        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || max_n < min_n {
            return Err(invalid(format!("ngram_range ({min_n}, {max_n}) is not valid")));
        }

        if self.max_iterations == 0 || self.max_doc_update_iterations == 0 {
            return Err(invalid("iteration caps must be at least 1".to_string()));
        }
        if !(self.mean_change_tolerance.is_finite() && self.mean_change_tolerance > 0.0) {
            return Err(invalid(format!(
                "mean_change_tolerance must be a positive number, got {}",
                self.mean_change_tolerance
            )));
        }
        if self.coherence_top_n == 0 {
            return Err(invalid("coherence_top_n must be at least 1".to_string()));
        }
        if self.coherence_window < 2 {
            return Err(invalid("coherence_window must be at least 2".to_string()));
        }
        if self.input_sources.is_empty() {
            return Err(invalid("at least one input source is required".to_string()));
        }

        Ok(())
    }

    pub fn stopwords(&self) -> StopwordSet {
        StopwordSet::english(self.use_high_frequency_stopwords, &self.extra_stopwords)
    }
}

fn check_topic_count(name: &str, k: usize) -> Result<()> {
    if k < 2 {
        return Err(invalid(format!("{name} must be at least 2, got {k}")));
    }
    Ok(())
}

fn invalid(message: String) -> TopicError {
    TopicError::InvalidConfiguration(message)
}

/// Immutable stopword lookup, built once per run.
#[derive(Debug, Clone, Default)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl StopwordSet {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words: HashSet<String> = words
            .into_iter()
            .map(|w| w.as_ref().to_lowercase())
            .collect();
        for negation in NEGATION_WORDS {
            words.remove(*negation);
        }
        StopwordSet { words }
    }

    /// General English list plus the review-domain terms.
    pub fn english(high_frequency: bool, extra: &[String]) -> Self {
        let general: Vec<String> = get(LANGUAGE::English);
        let mut all: Vec<String> = general;
        all.extend(DOMAIN_STOPWORDS.iter().map(|w| w.to_string()));
        if high_frequency {
            all.extend(HIGH_FREQUENCY_STOPWORDS.iter().map(|w| w.to_string()));
        }
        all.extend(extra.iter().cloned());
        StopwordSet::new(all)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
