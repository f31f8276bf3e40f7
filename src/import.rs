use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, ReviewError};
use crate::review::{NewReview, Priority, Suggestion};

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").trim().to_string()
}

/// Reads topics to review from a CSV with the header
/// `subject,topic,priority,suggestion,notes`.
///
/// A blank subject falls back to the file stem; rows with a blank topic are
/// skipped. Unknown priority or suggestion values fail the whole file.
pub fn load_csv(path: &Path) -> Result<Vec<NewReview>> {
    let default_subject = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string();

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ReviewError::Csv(format!("failed to open {}: {}", path.display(), e)))?;

    let mut reviews = Vec::new();
    for (row, result) in reader.records().enumerate() {
        // header is line 1
        let line = row + 2;
        let record = result
            .map_err(|e| ReviewError::Csv(format!("{}:{}: {}", path.display(), line, e)))?;

        let topic = get_field(&record, 1);
        if topic.is_empty() {
            warn!(file = %path.display(), line, "skipping row without a topic");
            continue;
        }

        let subject_raw = get_field(&record, 0);
        let subject_id = if subject_raw.is_empty() {
            default_subject.clone()
        } else {
            subject_raw
        };

        let priority_raw = get_field(&record, 2);
        let priority = if priority_raw.is_empty() {
            Priority::default()
        } else {
            Priority::parse(&priority_raw).ok_or_else(|| {
                ReviewError::Csv(format!(
                    "{}:{}: unknown priority: {}",
                    path.display(),
                    line,
                    priority_raw
                ))
            })?
        };

        let suggestion = Suggestion::parse(&get_field(&record, 3))
            .map_err(|e| ReviewError::Csv(format!("{}:{}: {}", path.display(), line, e)))?;

        let notes = get_field(&record, 4);

        reviews.push(NewReview {
            subject_id,
            topic,
            priority,
            suggestion,
            general_notes: (!notes.is_empty()).then_some(notes),
        });
    }
    Ok(reviews)
}

pub fn discover_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_csv_recursive(path, &mut files);
        } else if is_csv(path) {
            files.push(path.clone());
        }
    }
    files.sort();
    files
}

fn is_csv(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("csv")
}

fn collect_csv_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_csv_recursive(&path, files);
        } else if is_csv(&path) {
            files.push(path);
        }
    }
}
