mod cigar;
mod error;
mod flags;

pub use cigar::{Cigar, CigarIter, CigarOp};
pub use error::SegmentError;
pub use flags::Flags;

/// The `RX:Z:` optional-tag prefix carrying the UMI barcode.
const BARCODE_TAG: &[u8] = b"RX:Z:";

/// Parse an ASCII-encoded signed integer out of a byte field.
pub(crate) fn parse_i32(bytes: &[u8]) -> Option<i32> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn parse_u16(bytes: &[u8]) -> Option<u16> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// A UMI barcode: two sub-barcodes separated by `-`, e.g. `ACGTA-TTGCA`.
/// Empty when the record carries no `RX` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Barcode<'a> {
    bytes: &'a [u8],
}

impl<'a> Barcode<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn full(self) -> &'a [u8] {
        self.bytes
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.bytes.is_empty()
    }

    /// The two sub-barcodes. The second is empty when no `-` is present.
    #[must_use]
    pub fn halves(self) -> (&'a [u8], &'a [u8]) {
        match self.bytes.iter().position(|&b| b == b'-') {
            Some(dash) => (&self.bytes[..dash], &self.bytes[dash + 1..]),
            None       => (self.bytes, &[]),
        }
    }
}

/// One alignment record, borrowed out of the input buffer.
///
/// Only the columns the deduplicator consumes are retained: QNAME, FLAG,
/// RNAME, POS, CIGAR, SEQ, QUAL, and the optional `RX` barcode tag. MAPQ,
/// RNEXT, PNEXT and TLEN are skipped by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub qname:   &'a [u8],
    pub flags:   Flags,
    pub rname:   &'a [u8],
    pub pos:     i32,
    pub cigar:   Cigar<'a>,
    pub seq:     &'a [u8],
    pub qual:    &'a [u8],
    pub barcode: Barcode<'a>,
}

impl<'a> Segment<'a> {
    /// Parse the newline-terminated record starting at `buf[start]`.
    /// Returns the segment and the offset of the next record.
    ///
    /// # Errors
    /// - `Truncated` when fewer than 11 columns precede the newline (or the
    ///   buffer ends without one);
    /// - `InvalidFlag` / `InvalidPos` on non-integer FLAG/POS;
    /// - `SeqQualMismatch` when SEQ and QUAL differ in length;
    /// - `CigarSeqMismatch` when the CIGAR's read-consuming length does not
    ///   match SEQ (unless the CIGAR is `*`).
    pub fn parse(buf: &'a [u8], start: usize) -> Result<(Segment<'a>, usize), SegmentError> {
        let line_len = buf[start..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| SegmentError::Truncated(buf[start..].split(|&b| b == b'\t').count()))?;
        let line = &buf[start..start + line_len];
        let next = start + line_len + 1;

        let mut qname:   &[u8] = &[];
        let mut rname:   &[u8] = &[];
        let mut seq:     &[u8] = &[];
        let mut qual:    &[u8] = &[];
        let mut cigar:   &[u8] = &[];
        let mut barcode: &[u8] = &[];
        let mut flags = Flags::default();
        let mut pos = 0;
        let mut columns = 0;

        for (column, field) in line.split(|&b| b == b'\t').enumerate() {
            columns += 1;
            match column {
                0 => qname = field,
                1 => {
                    flags = Flags::new(parse_u16(field).ok_or_else(|| {
                        SegmentError::InvalidFlag(String::from_utf8_lossy(field).into_owned())
                    })?);
                }
                2 => rname = field,
                3 => {
                    pos = parse_i32(field).ok_or_else(|| {
                        SegmentError::InvalidPos(String::from_utf8_lossy(field).into_owned())
                    })?;
                }
                5 => cigar = field,
                9 => seq = field,
                10 => qual = field,
                _ => {
                    if column >= 11 && field.starts_with(BARCODE_TAG) {
                        barcode = &field[BARCODE_TAG.len()..];
                    }
                }
            }
        }
        if columns < 11 {
            return Err(SegmentError::Truncated(columns));
        }

        let segment = Segment {
            qname,
            flags,
            rname,
            pos,
            cigar: Cigar::new(cigar),
            seq,
            qual,
            barcode: Barcode::new(barcode),
        };

        // Seq and qual can legally differ in length if qual is '*', but that
        // should not occur in a pairable stream.
        if segment.seq.len() != segment.qual.len() {
            return Err(SegmentError::SeqQualMismatch { seq: segment.seq.len(), qual: segment.qual.len() });
        }
        if !segment.cigar.is_unavailable() {
            let read_len = segment.cigar.read_len()?;
            if read_len != segment.seq.len() as i32 {
                return Err(SegmentError::CigarSeqMismatch { cigar: read_len, seq: segment.seq.len() });
            }
        }

        Ok((segment, next))
    }

    /// The record's 5′-most reference coordinate: `pos` on the forward
    /// strand, `pos` plus the reference-consuming CIGAR length on the
    /// reverse strand.
    pub fn five_prime(&self) -> Result<i32, SegmentError> {
        let mut begin = self.pos;
        if self.flags.is_reverse() {
            begin += self.cigar.reference_len()?;
        }
        Ok(begin)
    }

}
