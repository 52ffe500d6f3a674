use super::SegmentError;

/// A borrowed CIGAR string, e.g. `3S97M` or `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cigar<'a> {
    bytes: &'a [u8],
}

/// One `(length, operation)` CIGAR token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub len: i32,
    pub op: u8,
}

impl CigarOp {
    /// Operators advancing the reference cursor: `M D N = X`.
    #[must_use]
    pub fn consumes_reference(self) -> bool {
        matches!(self.op, b'M' | b'D' | b'N' | b'=' | b'X')
    }

    /// Operators advancing the read cursor: `M I S = X`.
    #[must_use]
    pub fn consumes_read(self) -> bool {
        matches!(self.op, b'M' | b'I' | b'S' | b'=' | b'X')
    }
}

impl<'a> Cigar<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn bytes(self) -> &'a [u8] {
        self.bytes
    }

    /// `*`: the record is unmapped and carries no alignment.
    #[must_use]
    pub fn is_unavailable(self) -> bool {
        self.bytes == b"*"
    }

    #[must_use]
    pub fn iter(self) -> CigarIter<'a> {
        CigarIter { rest: self.bytes, full: self.bytes }
    }

    /// Total length over the reference-consuming operators. 0 for `*`.
    pub fn reference_len(self) -> Result<i32, SegmentError> {
        self.consumed_len(CigarOp::consumes_reference)
    }

    /// Total length over the read-consuming operators. 0 for `*`.
    pub fn read_len(self) -> Result<i32, SegmentError> {
        self.consumed_len(CigarOp::consumes_read)
    }

    fn consumed_len(self, consumes: fn(CigarOp) -> bool) -> Result<i32, SegmentError> {
        if self.is_unavailable() {
            return Ok(0);
        }
        let mut total = 0;
        for token in self.iter() {
            let token = token?;
            if consumes(token) {
                total += token.len;
            }
        }
        Ok(total)
    }
}

pub struct CigarIter<'a> {
    rest: &'a [u8],
    full: &'a [u8],
}

impl Iterator for CigarIter<'_> {
    type Item = Result<CigarOp, SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let digits = self.rest.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 || digits == self.rest.len() {
            self.rest = &[];
            return Some(Err(SegmentError::InvalidCigar(
                String::from_utf8_lossy(self.full).into_owned(),
            )));
        }
        let len = match std::str::from_utf8(&self.rest[..digits]).ok().and_then(|s| s.parse().ok()) {
            Some(len) => len,
            None => {
                self.rest = &[];
                return Some(Err(SegmentError::InvalidCigar(
                    String::from_utf8_lossy(self.full).into_owned(),
                )));
            }
        };
        let op = self.rest[digits];
        self.rest = &self.rest[digits + 1..];
        Some(Ok(CigarOp { len, op }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_walk() -> Result<(), SegmentError> {
        let cigar = Cigar::new(b"3S97M1I2D");
        let tokens: Vec<CigarOp> = cigar.iter().collect::<Result<_, _>>()?;
        assert_eq!(tokens, vec![
            CigarOp { len: 3,  op: b'S' },
            CigarOp { len: 97, op: b'M' },
            CigarOp { len: 1,  op: b'I' },
            CigarOp { len: 2,  op: b'D' },
        ]);
        Ok(())
    }

    #[test]
    fn consumed_lengths() -> Result<(), SegmentError> {
        let cigar = Cigar::new(b"3S97M1I2D5N");
        assert_eq!(cigar.read_len()?, 3 + 97 + 1);
        assert_eq!(cigar.reference_len()?, 97 + 2 + 5);
        Ok(())
    }

    #[test]
    fn unavailable_cigar_has_no_length() -> Result<(), SegmentError> {
        let cigar = Cigar::new(b"*");
        assert!(cigar.is_unavailable());
        assert_eq!(cigar.read_len()?, 0);
        assert_eq!(cigar.reference_len()?, 0);
        Ok(())
    }

    #[test]
    fn missing_length_is_invalid() {
        assert!(Cigar::new(b"M10S").reference_len().is_err());
        assert!(Cigar::new(b"100").read_len().is_err());
    }
}
