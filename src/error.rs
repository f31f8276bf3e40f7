use thiserror::Error;

/// Everything that can go wrong while scheduling or persisting reviews.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review not found: {0}")]
    ReviewNotFound(String),

    #[error("cycle R{0} not found (expected 1..4)")]
    CycleNotFound(i64),

    #[error("performance {0} is outside 0..100")]
    InvalidPerformance(i64),

    #[error("cycle R{0} is already completed")]
    AlreadyCompleted(u8),

    #[error("date {date} for cycle R{cycle} breaks the cycle order")]
    DateOutOfOrder { cycle: u8, date: chrono::NaiveDate },

    #[error("review {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict { id: String, expected: u64, found: u64 },

    #[error("review already exists: {0}")]
    DuplicateReview(String),

    #[error("invalid review: {0}")]
    InvalidReview(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("store is locked by another writer (remove {} if no recall process is running)", .0.display())]
    StoreLocked(std::path::PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReviewError>;
