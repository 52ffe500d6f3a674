use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use gzp::{deflate::Gzip, par::compress::ParCompressBuilder};
use log::debug;

mod error;
pub use error::WriterError;

/// A buffered FASTQ sink.
///
/// Writes two records per consensus pair, one call each. The destination is
/// either a plain file, a gzip-compressed file (paths ending in `.gz`), or
/// stdout when no path is given.
pub struct FastqWriter<'a> {
    source: BufWriter<Box<dyn Write + 'a>>,
}

impl<'a> FastqWriter<'a> {
    /// Instantiate a new writer, linked to a file (or stdout when `path` is
    /// `None`).
    ///
    /// # Errors
    /// If `path` cannot be created.
    pub fn new(path: Option<impl AsRef<Path>>) -> Result<FastqWriter<'a>> {
        let sink: Box<dyn Write> = match path {
            Some(path) => {
                let path = path.as_ref();
                let file = File::create(path)
                    .map_err(WriterError::Io)
                    .with_context(|| format!("While creating output file '{}'", path.display()))?;
                if path.extension().is_some_and(|ext| ext == "gz") {
                    debug!("Compressing FASTQ output ({})", path.display());
                    Box::new(ParCompressBuilder::<Gzip>::new().from_writer(file))
                } else {
                    Box::new(file)
                }
            }
            None => Box::new(std::io::stdout()),
        };
        Ok(FastqWriter { source: BufWriter::new(sink) })
    }

    /// Wrap an arbitrary writer. Mainly for tests.
    pub fn from_writer(writer: Box<dyn Write + 'a>) -> FastqWriter<'a> {
        FastqWriter { source: BufWriter::new(writer) }
    }

    /// Write one FASTQ record:
    /// `@{name} XF:i:{family_size}\n{seq}\n+\n{qual}\n`
    ///
    /// # Errors
    /// On any underlying io error.
    pub fn write_record(&mut self, name: &[u8], family_size: usize, seq: &[u8], qual: &[u8]) -> Result<()> {
        let mut inner = || -> std::io::Result<()> {
            self.source.write_all(b"@")?;
            self.source.write_all(name)?;
            write!(self.source, " XF:i:{family_size}")?;
            self.source.write_all(b"\n")?;
            self.source.write_all(seq)?;
            self.source.write_all(b"\n+\n")?;
            self.source.write_all(qual)?;
            self.source.write_all(b"\n")
        };
        inner().map_err(WriterError::Io).context("While writing FASTQ record")
    }

    /// Flush buffered contents down to the destination.
    ///
    /// # Errors
    /// On any underlying io error.
    pub fn finish(&mut self) -> Result<()> {
        self.source.flush().map_err(WriterError::Io).context("While flushing FASTQ output")
    }
}
