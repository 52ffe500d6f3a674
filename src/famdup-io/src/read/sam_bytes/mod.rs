use std::fs::File;
use std::path::Path;

use anyhow::Result;
use log::info;
use memmap2::Mmap;

mod error;
pub use error::SamReadError;

/// A whole SAM file, memory-mapped read-only.
///
/// The deduplication core treats the input as one immutable byte buffer and
/// borrows record views out of it for the full duration of the run; keeping
/// the mapping alive inside this struct anchors those borrows.
pub struct SamBytes {
    mmap: Mmap,
}

impl SamBytes {
    /// Open and memory-map `path`.
    ///
    /// # Errors
    /// - `OpenFile` if the file does not exist or is not readable.
    /// - `MapFile` if the kernel refuses the mapping.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        info!("Memory-mapping input: {display}");

        let file = File::open(path)
            .map_err(|source| SamReadError::OpenFile { path: display.clone(), source })?;
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|source| SamReadError::MapFile { path: display, source })?;
        Ok(Self { mmap })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}
