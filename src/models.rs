use serde::{Deserialize, Serialize};

/// One input row. Extra columns in the source table are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub review_id: String,
    #[serde(alias = "bank_name")]
    pub bank: String,
    #[serde(default)]
    pub review_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDocument {
    pub review_id: String,
    pub bank: String,
    pub position: usize,  // row index in the input table
    pub tokens: Vec<String>,
}

impl NormalizedDocument {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicAssignment {
    pub review_id: String,
    pub topic_id: usize,
    pub topic_label: String,
    pub confidence: f64,
}

/// Output row of a production run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub review_id: String,
    pub bank: String,
    pub topic_id: usize,
    pub topic_confidence: f64,
    pub identified_topic: String,
}

/// Output row of a tuning run. Never written next to production assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceResult {
    pub bank: String,
    pub topic_count: usize,
    pub coherence_score: f64,
}

pub fn topic_label(bank: &str, topic_id: usize) -> String {
    format!("{bank}_Topic_{topic_id}")
}
