use std::collections::{HashMap, HashSet};

use counter::Counter;
use tracing::debug;

use crate::config::TopicConfig;
use crate::error::{Result, TopicError};

/// Sparse non-negative count matrix, one row per document in input order.
/// Each row holds `(term_index, count)` pairs sorted by term index.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentTermMatrix {
    rows: Vec<Vec<(usize, u32)>>,
    n_terms: usize,
}

impl DocumentTermMatrix {
    pub fn from_rows(rows: Vec<Vec<(usize, u32)>>, n_terms: usize) -> Self {
        DocumentTermMatrix { rows, n_terms }
    }

    pub fn n_docs(&self) -> usize {
        self.rows.len()
    }

    pub fn n_terms(&self) -> usize {
        self.n_terms
    }

    pub fn row(&self, doc: usize) -> &[(usize, u32)] {
        &self.rows[doc]
    }

    pub fn rows(&self) -> &[Vec<(usize, u32)>] {
        &self.rows
    }

    pub fn get(&self, doc: usize, term: usize) -> u32 {
        self.rows[doc]
            .binary_search_by_key(&term, |&(t, _)| t)
            .map(|i| self.rows[doc][i].1)
            .unwrap_or(0)
    }
}

/// Vocabulary and counts for one partition. Never shared across partitions.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub bank: String,
    pub vocabulary: Vec<String>,
    pub index: HashMap<String, usize>,
    pub matrix: DocumentTermMatrix,
}

pub struct Vectorizer {
    pub min_document_count: usize,
    pub max_document_fraction: f64,
    pub ngram_range: (usize, usize),
}

impl Vectorizer {
    pub fn from_config(config: &TopicConfig) -> Self {
        Vectorizer {
            min_document_count: config.min_document_count,
            max_document_fraction: config.max_document_fraction,
            ngram_range: config.ngram_range,
        }
    }

    pub fn fit(&self, bank: &str, documents: &[Vec<String>]) -> Result<Corpus> {
        if documents.is_empty() {
            return Err(TopicError::EmptyVocabulary(format!("{bank} has no documents")));
        }

        // Step 1: Candidate terms per document, keeping first-seen order
        let doc_terms: Vec<Vec<String>> = documents.iter().map(|doc| self.terms(doc)).collect();

        let mut first_seen: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut doc_freq: Counter<String> = Counter::new();
        for terms in &doc_terms {
            let unique: HashSet<&String> = terms.iter().collect();
            for term in terms {
                if seen.insert(term.clone()) {
                    first_seen.push(term.clone());
                }
            }
            for term in unique {
                doc_freq[term] += 1;
            }
        }

        // Step 2: Keep terms inside the document-frequency bounds
        let max_docs = self.max_document_fraction * documents.len() as f64;
        let vocabulary: Vec<String> = first_seen
            .into_iter()
            .filter(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0);
                df >= self.min_document_count && df as f64 <= max_docs
            })
            .collect();

        if vocabulary.is_empty() {
            return Err(TopicError::EmptyVocabulary(format!(
                "no term of {bank} appears in at least {} and at most {:.0}% of {} documents",
                self.min_document_count,
                self.max_document_fraction * 100.0,
                documents.len()
            )));
        }

        let index: HashMap<String, usize> = vocabulary
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();

        // Step 3: Count matrix, rows in input order
        let rows = doc_terms
            .iter()
            .map(|terms| {
                let mut counts: Counter<usize, u32> = Counter::new();
                for term in terms {
                    if let Some(&i) = index.get(term) {
                        counts[&i] += 1;
                    }
                }
                let mut row: Vec<(usize, u32)> = counts.into_iter().collect();
                row.sort_unstable_by_key(|&(i, _)| i);
                row
            })
            .collect();

        debug!(
            bank = %bank,
            documents = documents.len(),
            terms = vocabulary.len(),
            "Built partition vocabulary"
        );

        Ok(Corpus {
            bank: bank.to_string(),
            matrix: DocumentTermMatrix::from_rows(rows, vocabulary.len()),
            vocabulary,
            index,
        })
    }

    /// All n-grams of the configured range, joined by a single space.
    fn terms(&self, tokens: &[String]) -> Vec<String> {
        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n == 0 || n > tokens.len() {
                continue;
            }
            for gram in tokens.windows(n) {
                terms.push(gram.join(" "));
            }
        }
        terms
    }
}
