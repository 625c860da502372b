use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaterError {
    #[error("teacher not found: {0}")]
    NotFound(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("asset error: {0}")]
    Asset(#[from] std::io::Error),
}
