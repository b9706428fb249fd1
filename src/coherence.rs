// c_v topic coherence.
//
// Boolean sliding windows over the reference texts give occurrence and
// co-occurrence probabilities for the topic words. Each pair is scored with
// normalized PMI; every topic word is then compared, by cosine, to the NPMI
// context vector of its whole topic ("one-set" segmentation with indirect
// confirmation). Scores are averaged per topic, then across topics.

use std::collections::HashMap;

use crate::config::TopicConfig;

const EPSILON: f64 = 1e-12;

pub struct CoherenceScorer {
    pub window_size: usize,
}

struct WindowCounts {
    occurrences: Vec<u64>,
    co_occurrences: Vec<Vec<u64>>,
    windows: u64,
}

impl CoherenceScorer {
    /// Windows shorter than one token are widened to one.
    pub fn new(window_size: usize) -> Self {
        CoherenceScorer {
            window_size: window_size.max(1),
        }
    }

    pub fn from_config(config: &TopicConfig) -> Self {
        CoherenceScorer::new(config.coherence_window)
    }

    /// Mean c_v coherence of `topics` against `texts`. Topic words that never
    /// occur in `texts` (multi-word terms, for instance) are ignored.
    pub fn score(&self, topics: &[Vec<String>], texts: &[Vec<String>]) -> f64 {
        // Step 1: Contiguous ids for the words we need to count
        let mut ids: HashMap<&str, usize> = HashMap::new();
        for word in topics.iter().flatten() {
            let next = ids.len();
            ids.entry(word.as_str()).or_insert(next);
        }
        if ids.is_empty() {
            return 0.0;
        }

        // Step 2: Window statistics over the reference texts
        let counts = self.count_windows(&ids, texts);
        if counts.windows == 0 {
            return 0.0;
        }

        // Step 3: Per-topic indirect cosine confirmation
        let topic_scores: Vec<f64> = topics
            .iter()
            .filter_map(|topic| {
                let topic_ids: Vec<usize> = topic
                    .iter()
                    .filter_map(|word| ids.get(word.as_str()).copied())
                    .filter(|&id| counts.occurrences[id] > 0)
                    .collect();
                if topic_ids.is_empty() {
                    None
                } else {
                    Some(topic_coherence(&topic_ids, &counts))
                }
            })
            .collect();

        if topic_scores.is_empty() {
            return 0.0;
        }
        topic_scores.iter().sum::<f64>() / topic_scores.len() as f64
    }

    fn count_windows(&self, ids: &HashMap<&str, usize>, texts: &[Vec<String>]) -> WindowCounts {
        let n = ids.len();
        let mut counts = WindowCounts {
            occurrences: vec![0; n],
            co_occurrences: vec![vec![0; n]; n],
            windows: 0,
        };

        for text in texts {
            let positions: Vec<Option<usize>> = text
                .iter()
                .map(|token| ids.get(token.as_str()).copied())
                .collect();
            if positions.iter().all(Option::is_none) {
                continue;
            }

            if positions.len() <= self.window_size {
                counts.add_window(&positions);
            } else {
                for window in positions.windows(self.window_size) {
                    counts.add_window(window);
                }
            }
        }

        counts
    }
}

impl WindowCounts {
    fn add_window(&mut self, window: &[Option<usize>]) {
        self.windows += 1;

        let mut present: Vec<usize> = window.iter().flatten().copied().collect();
        present.sort_unstable();
        present.dedup();

        for &i in &present {
            self.occurrences[i] += 1;
            for &j in &present {
                if i != j {
                    self.co_occurrences[i][j] += 1;
                }
            }
        }
    }

    fn npmi(&self, i: usize, j: usize) -> f64 {
        let n = self.windows as f64;
        let together = if i == j {
            self.occurrences[i]
        } else {
            self.co_occurrences[i][j]
        };
        let joint = together as f64 / n;
        let p_i = self.occurrences[i] as f64 / n;
        let p_j = self.occurrences[j] as f64 / n;

        let pmi = ((joint + EPSILON) / (p_i * p_j)).ln();
        pmi / -(joint + EPSILON).ln()
    }
}

fn topic_coherence(topic_ids: &[usize], counts: &WindowCounts) -> f64 {
    let vectors: Vec<Vec<f64>> = topic_ids
        .iter()
        .map(|&i| topic_ids.iter().map(|&j| counts.npmi(i, j)).collect())
        .collect();

    let mut topic_vector = vec![0.0; topic_ids.len()];
    for vector in &vectors {
        for (total, value) in topic_vector.iter_mut().zip(vector) {
            *total += value;
        }
    }

    let similarities: f64 = vectors.iter().map(|v| cosine(v, &topic_vector)).sum();
    similarities / vectors.len() as f64
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a * norm_b < f64::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
