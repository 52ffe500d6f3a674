use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Failed to write to file: inner writer returned an io error")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize statistics to JSON")]
    Json(#[from] serde_json::Error),
}
