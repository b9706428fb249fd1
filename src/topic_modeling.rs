use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assign::dominant_topic;
use crate::config::TopicConfig;
use crate::error::{Result, TopicError};
use crate::models::topic_label;
use crate::vectorize::DocumentTermMatrix;

const ROW_SUM_TOLERANCE: f64 = 1e-6;
const PHI_EPSILON: f64 = 1e-100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeledTopic {
    pub id: usize,
    pub name: String,
    pub words: Vec<(String, f64)>,  // Word and its probability in this topic
    pub documents: Vec<usize>,       // Document rows whose dominant topic this is
}

/// Output of one fit. Never mutated after `fit` returns.
#[derive(Debug, Clone)]
pub struct TopicModel {
    pub bank: String,
    pub topic_count: usize,
    pub topic_word: Vec<Vec<f64>>,      // Topics x Terms
    pub document_topic: Vec<Vec<f64>>,  // Documents x Topics
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct LDAConfig {
    pub num_topics: usize,
    pub max_iterations: usize,
    pub max_doc_update_iterations: usize,
    pub mean_change_tolerance: f64,
    pub alpha: Option<f64>,  // Document-topic prior, 1/K when unset
    pub eta: Option<f64>,    // Topic-word prior, 1/K when unset
    pub seed: u64,
}

impl Default for LDAConfig {
    fn default() -> Self {
        LDAConfig {
            num_topics: 5,
            max_iterations: 10,
            max_doc_update_iterations: 100,
            mean_change_tolerance: 1e-3,
            alpha: None,
            eta: None,
            seed: 42,
        }
    }
}

impl LDAConfig {
    pub fn from_topic_config(config: &TopicConfig, num_topics: usize) -> Self {
        LDAConfig {
            num_topics,
            max_iterations: config.max_iterations,
            max_doc_update_iterations: config.max_doc_update_iterations,
            mean_change_tolerance: config.mean_change_tolerance,
            seed: config.seed,
            ..LDAConfig::default()
        }
    }
}

/// Latent Dirichlet Allocation fitted with batch variational Bayes.
pub struct VariationalLDA {
    config: LDAConfig,
}

impl VariationalLDA {
    pub fn new(config: LDAConfig) -> Self {
        VariationalLDA { config }
    }

    pub fn fit(&self, bank: &str, dtm: &DocumentTermMatrix) -> Result<TopicModel> {
        let num_topics = self.config.num_topics;
        if num_topics < 2 {
            return Err(TopicError::InvalidConfiguration(format!(
                "topic count must be at least 2, got {num_topics}"
            )));
        }
        if self.config.max_iterations == 0 {
            return Err(TopicError::InvalidConfiguration(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if dtm.n_docs() == 0 || dtm.n_terms() == 0 {
            return Err(TopicError::EmptyPartitionCorpus {
                bank: bank.to_string(),
                reason: "document-term matrix is empty".to_string(),
            });
        }

        let alpha = self.config.alpha.unwrap_or(1.0 / num_topics as f64);
        let eta = self.config.eta.unwrap_or(1.0 / num_topics as f64);

        // Step 1: Seeded initialisation of the topic-word parameters
        let mut lambda = self.initial_lambda(dtm.n_terms())?;
        let mut exp_elog_beta: Vec<Vec<f64>> = lambda.iter().map(|row| exp_dirichlet_expectation(row)).collect();
        let mut topic_word = normalize_rows(&lambda);

        // Step 2: Alternate document updates and topic-word updates
        let mut iterations = 0;
        for _iteration in 0..self.config.max_iterations {
            iterations += 1;
            let (_, sstats) = self.e_step(dtm, &exp_elog_beta, alpha, true);

            for (k, row) in lambda.iter_mut().enumerate() {
                for (v, value) in row.iter_mut().enumerate() {
                    *value = eta + sstats[k][v] * exp_elog_beta[k][v];
                }
            }
            exp_elog_beta = lambda.iter().map(|row| exp_dirichlet_expectation(row)).collect();

            let next_topic_word = normalize_rows(&lambda);
            let change = mean_abs_change(&topic_word, &next_topic_word);
            topic_word = next_topic_word;

            debug!(bank = %bank, iteration = iterations, change, "LDA iteration");
            if change < self.config.mean_change_tolerance {
                break;
            }
        }

        // Step 3: Final document-topic estimate against the fitted topics
        let (gammas, _) = self.e_step(dtm, &exp_elog_beta, alpha, false);
        let document_topic = normalize_rows(&gammas);

        check_rows(bank, "topic_word", &topic_word)?;
        check_rows(bank, "document_topic", &document_topic)?;

        Ok(TopicModel {
            bank: bank.to_string(),
            topic_count: num_topics,
            topic_word,
            document_topic,
            iterations,
        })
    }

    fn initial_lambda(&self, n_terms: usize) -> Result<Vec<Vec<f64>>> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let gamma = Gamma::new(100.0, 0.01)
            .map_err(|e| TopicError::InvalidConfiguration(format!("gamma prior: {e}")))?;

        Ok((0..self.config.num_topics)
            .map(|_| (0..n_terms).map(|_| gamma.sample(&mut rng)).collect())
            .collect())
    }

    /// Per-document variational updates. Documents are independent, so they are
    /// computed in parallel and accumulated in row order for reproducible sums.
    fn e_step(
        &self,
        dtm: &DocumentTermMatrix,
        exp_elog_beta: &[Vec<f64>],
        alpha: f64,
        collect_sstats: bool,
    ) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let num_topics = self.config.num_topics;

        let per_doc: Vec<(Vec<f64>, Vec<f64>)> = dtm
            .rows()
            .par_iter()
            .map(|row| self.update_document(row, exp_elog_beta, alpha))
            .collect();

        let mut sstats = vec![vec![0.0; dtm.n_terms()]; num_topics];
        let mut gammas = Vec::with_capacity(per_doc.len());
        for (row, (gamma, exp_elog_theta)) in dtm.rows().iter().zip(per_doc) {
            if collect_sstats {
                for &(v, count) in row {
                    let norm_phi = phi_norm(&exp_elog_theta, exp_elog_beta, v);
                    for k in 0..num_topics {
                        sstats[k][v] += exp_elog_theta[k] * count as f64 / norm_phi;
                    }
                }
            }
            gammas.push(gamma);
        }

        (gammas, sstats)
    }

    fn update_document(
        &self,
        row: &[(usize, u32)],
        exp_elog_beta: &[Vec<f64>],
        alpha: f64,
    ) -> (Vec<f64>, Vec<f64>) {
        let num_topics = self.config.num_topics;
        let mut gamma = vec![1.0; num_topics];
        let mut exp_elog_theta = exp_dirichlet_expectation(&gamma);

        for _ in 0..self.config.max_doc_update_iterations {
            let last_gamma = gamma.clone();

            let weights: Vec<(usize, f64)> = row
                .iter()
                .map(|&(v, count)| (v, count as f64 / phi_norm(&exp_elog_theta, exp_elog_beta, v)))
                .collect();

            for k in 0..num_topics {
                let dot: f64 = weights.iter().map(|&(v, w)| w * exp_elog_beta[k][v]).sum();
                gamma[k] = alpha + exp_elog_theta[k] * dot;
            }
            exp_elog_theta = exp_dirichlet_expectation(&gamma);

            let change = gamma
                .iter()
                .zip(&last_gamma)
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / num_topics as f64;
            if change < self.config.mean_change_tolerance {
                break;
            }
        }

        (gamma, exp_elog_theta)
    }
}

impl TopicModel {
    /// Top `n` term indices of a topic, highest probability first, ties by index.
    pub fn top_term_indices(&self, topic: usize, n: usize) -> Vec<usize> {
        let row = &self.topic_word[topic];
        let mut indices: Vec<usize> = (0..row.len()).collect();
        indices.sort_by(|&a, &b| {
            row[b]
                .partial_cmp(&row[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        indices.truncate(n);
        indices
    }

    pub fn top_words(&self, vocabulary: &[String], n: usize) -> Vec<Vec<String>> {
        (0..self.topic_count)
            .map(|topic| {
                self.top_term_indices(topic, n)
                    .into_iter()
                    .map(|v| vocabulary[v].clone())
                    .collect()
            })
            .collect()
    }

    pub fn extract_topics(&self, vocabulary: &[String], n: usize) -> Vec<ModeledTopic> {
        let dominant: Vec<usize> = self
            .document_topic
            .iter()
            .map(|row| dominant_topic(row).0)
            .collect();

        (0..self.topic_count)
            .map(|topic_id| {
                let words = self
                    .top_term_indices(topic_id, n)
                    .into_iter()
                    .map(|v| (vocabulary[v].clone(), self.topic_word[topic_id][v]))
                    .collect();
                let documents = dominant
                    .iter()
                    .enumerate()
                    .filter(|&(_, &topic)| topic == topic_id)
                    .map(|(doc, _)| doc)
                    .collect();

                ModeledTopic {
                    id: topic_id,
                    name: topic_label(&self.bank, topic_id),
                    words,
                    documents,
                }
            })
            .collect()
    }
}

fn phi_norm(exp_elog_theta: &[f64], exp_elog_beta: &[Vec<f64>], term: usize) -> f64 {
    exp_elog_theta
        .iter()
        .zip(exp_elog_beta)
        .map(|(theta, beta)| theta * beta[term])
        .sum::<f64>()
        + PHI_EPSILON
}

/// exp(E[log x]) for x ~ Dirichlet(params).
fn exp_dirichlet_expectation(params: &[f64]) -> Vec<f64> {
    let psi_total = digamma(params.iter().sum());
    params.iter().map(|&p| (digamma(p) - psi_total).exp()).collect()
}

/// Digamma via recurrence up to x >= 6, then the asymptotic series.
pub fn digamma(x: f64) -> f64 {
    let mut x = x;
    let mut result = 0.0;
    while x < 6.0 {
        result -= 1.0 / x;
        x += 1.0;
    }
    let f = 1.0 / (x * x);
    result + x.ln()
        - 0.5 / x
        - f * (1.0 / 12.0 - f * (1.0 / 120.0 - f * (1.0 / 252.0 - f * (1.0 / 240.0 - f / 132.0))))
}

fn normalize_rows(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    matrix
        .iter()
        .map(|row| {
            let total: f64 = row.iter().sum();
            row.iter().map(|&value| value / total).collect()
        })
        .collect()
}

fn mean_abs_change(old: &[Vec<f64>], new: &[Vec<f64>]) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for (a, b) in old.iter().zip(new) {
        for (x, y) in a.iter().zip(b) {
            total += (x - y).abs();
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Every row must be a finite, non-negative distribution summing to 1.
fn check_rows(bank: &str, matrix: &'static str, rows: &[Vec<f64>]) -> Result<()> {
    for (row_index, row) in rows.iter().enumerate() {
        let sum: f64 = row.iter().sum();
        let valid = row.iter().all(|p| p.is_finite() && *p >= 0.0)
            && (sum - 1.0).abs() <= ROW_SUM_TOLERANCE;
        if !valid {
            return Err(TopicError::NumericDegeneracy {
                bank: bank.to_string(),
                matrix,
                row: row_index,
                sum,
            });
        }
    }
    Ok(())
}
