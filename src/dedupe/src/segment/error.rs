use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Truncated record: expected at least 11 tab-separated fields, found {0}")]
    Truncated(usize),

    #[error("Invalid FLAG field: '{0}'")]
    InvalidFlag(String),

    #[error("Invalid POS field: '{0}'")]
    InvalidPos(String),

    #[error("Invalid CIGAR string: '{0}'")]
    InvalidCigar(String),

    #[error("Sequence and quality strings differ in length ({seq} vs {qual})")]
    SeqQualMismatch { seq: usize, qual: usize },

    #[error("CIGAR read length ({cigar}) differs from sequence length ({seq})")]
    CigarSeqMismatch { cigar: i32, seq: usize },
}
