use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{Reader, Writer};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, TopicError};
use crate::models::Review;

/// Read reviews from the first source that exists, trying them in priority order.
/// Returns the path that was used alongside the rows.
pub fn load_reviews(sources: &[PathBuf]) -> Result<(PathBuf, Vec<Review>)> {
    for path in sources {
        if !path.is_file() {
            warn!(path = %path.display(), "Input source not found, trying next");
            continue;
        }

        let reviews = read_reviews(path)?;
        info!(path = %path.display(), reviews = reviews.len(), "Loaded reviews");
        return Ok((path.clone(), reviews));
    }

    Err(TopicError::MissingInput {
        tried: sources.to_vec(),
    })
}

/// Parse one CSV table and validate `review_id` uniqueness once, at the boundary.
pub fn read_reviews(path: &Path) -> Result<Vec<Review>> {
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(file);

    let mut reviews = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for result in reader.deserialize() {
        let review: Review = result?;
        if !seen.insert(review.review_id.clone()) {
            return Err(TopicError::DuplicateReviewId(review.review_id));
        }
        reviews.push(review);
    }

    Ok(reviews)
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}
