use std::{fs, path::Path};

use anyhow::{Context, Result};

mod error;
pub use error::ParseError;

/// Attempt to create the parent directories of a path (if needed) and return an error if it failed.
pub fn create_parent_directory(path: &Path) -> Result<()> {
    use ParseError::CreateParentDirectory;
    let parent_dir = path.parent().unwrap_or(path);
    fs::create_dir_all(parent_dir)
        .map_err(CreateParentDirectory)
        .with_context(|| format!("While attempting to create output directory '{}'", path.display()))?;
    Ok(())
}

/// Check if a given file already exists; raise an error if such is the case
/// and the user did not explicitly allow file overwriting.
///
/// # Errors
/// - If `path` already exists and `overwrite` is false.
pub fn can_write_file(overwrite: bool, path: &Path) -> Result<bool> {
    if !overwrite && path.exists() {
        return Err(ParseError::OverwriteDisallowed { path: path.to_path_buf() })
            .context("While ensuring that file permissions were appropriate");
    }
    Ok(true)
}
