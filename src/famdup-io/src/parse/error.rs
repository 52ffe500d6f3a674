use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to create parent directory")]
    CreateParentDirectory(#[source] std::io::Error),

    #[error("'{path}' already exists. Use '--overwrite' to force writing over this file")]
    OverwriteDisallowed { path: PathBuf },
}
