use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

pub mod fastq_writer;
pub use fastq_writer::{FastqWriter, WriterError};

/// Serialize a statistics object as pretty-printed JSON at `path`.
///
/// # Errors
/// On file-creation or serialization failure.
pub fn write_stats_json(path: impl AsRef<Path>, stats: &impl Serialize) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(WriterError::Io)
        .with_context(|| format!("While creating stats file '{}'", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), stats)
        .map_err(WriterError::Json)
        .with_context(|| format!("While writing stats file '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct MockStats { total: u64, label: &'static str }

    #[test]
    fn stats_json_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stats.json");

        write_stats_json(&path, &MockStats { total: 42, label: "mock" })?;

        let written = std::fs::read_to_string(&path)?;
        assert!(written.contains("\"total\": 42"));
        assert!(written.contains("\"label\": \"mock\""));
        Ok(())
    }
}
