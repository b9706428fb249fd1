/// Dominant topic and its probability for one document row.
/// Ties go to the lowest topic index.
pub fn dominant_topic(row: &[f64]) -> (usize, f64) {
    let mut best_topic = 0;
    let mut best_score = f64::NEG_INFINITY;

    for (topic, &score) in row.iter().enumerate() {
        if score > best_score {
            best_score = score;
            best_topic = topic;
        }
    }

    if row.is_empty() {
        (0, 0.0)
    } else {
        (best_topic, best_score)
    }
}

/// Row-aligned `(topic_id, confidence)` pairs for a document-topic distribution.
pub fn assign(document_topic: &[Vec<f64>]) -> Vec<(usize, f64)> {
    document_topic.iter().map(|row| dominant_topic(row)).collect()
}
