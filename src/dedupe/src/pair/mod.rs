use std::ops::Range;

use ahash::AHashMap;
use log::trace;

use crate::segment::{Segment, SegmentError};

mod error;
pub use error::PairError;

/// A mated pair of segments.
///
/// Slot invariants, established at construction:
/// - when one mate is unmapped it sits at slot 0 (its mapped mate at slot 1);
/// - otherwise the mates keep their parse order (first-seen at slot 0).
#[derive(Debug, Clone, Copy)]
pub struct ReadPair<'a> {
    pub segments: [Segment<'a>; 2],
}

impl<'a> ReadPair<'a> {
    /// Assemble a pair from the stored (first-seen) mate and the current
    /// record. Records with both mates unmapped never reach pairing, so at
    /// most one of the two is unmapped here.
    #[must_use]
    pub fn new(stored: Segment<'a>, current: Segment<'a>) -> Self {
        let segments = match current.flags.is_unmapped() {
            true  => [current, stored],
            false => [stored, current],
        };
        Self { segments }
    }

    /// The 5′-most reference coordinate of each slot. An unmapped mate
    /// shares its mapped mate's coordinate (they carry the same RNAME/POS in
    /// a sorted stream).
    pub fn begins(&self) -> Result<[i32; 2], SegmentError> {
        let mapped = self.segments[1].five_prime()?;
        let begin0 = match self.segments[0].flags.is_unmapped() {
            true  => mapped,
            false => self.segments[0].five_prime()?,
        };
        Ok([begin0, mapped])
    }

    /// The larger of the two 5′ coordinates; the watermark the flush
    /// controller holds this pair's bucket open until.
    pub fn upper_begin(&self) -> Result<i32, SegmentError> {
        let begins = self.begins()?;
        Ok(begins[0].max(begins[1]))
    }

    /// Render the position/orientation bucket key for this pair:
    /// `rname0 TAB begin0 TAB rname1 TAB begin1 TAB orientation`, with
    /// zero-padded fixed-width integers so byte equality is key equality.
    pub fn fingerprint(&self) -> Result<Fingerprint, SegmentError> {
        let begins = self.begins()?;
        let [first, second] = &self.segments;
        let mut key = Vec::with_capacity(first.rname.len() + second.rname.len() + 30);
        key.extend_from_slice(first.rname);
        key.push(b'\t');
        key.extend_from_slice(format!("{:010}", begins[0]).as_bytes());
        key.push(b'\t');
        key.extend_from_slice(second.rname);
        key.push(b'\t');
        key.extend_from_slice(format!("{:010}", begins[1]).as_bytes());
        key.push(b'\t');
        key.extend_from_slice(format!("{:05}", second.flags.orientation()).as_bytes());
        Ok(Fingerprint(key))
    }
}

/// A pair's position/orientation identity, rendered as an ASCII blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Pairs mates as the sorted stream goes by.
///
/// Holds the byte range of every first-seen record, keyed by read name; the
/// second sighting pops the range, re-parses the stored mate and yields the
/// pair. Names are expected to occur exactly twice in the input.
#[derive(Debug, Default)]
pub struct MatePairer<'a> {
    unpaired: AHashMap<&'a [u8], Range<usize>>,
}

impl<'a> MatePairer<'a> {
    /// Either store this record (first sighting of its name) and yield
    /// nothing, or pop the stored mate and yield the completed pair.
    pub fn pair_or_store(
        &mut self,
        segment: Segment<'a>,
        record: Range<usize>,
        buf: &'a [u8],
    ) -> Result<Option<ReadPair<'a>>, SegmentError> {
        match self.unpaired.remove(segment.qname) {
            Some(stored) => {
                let (mate, _) = Segment::parse(buf, stored.start)?;
                Ok(Some(ReadPair::new(mate, segment)))
            }
            None => {
                trace!("storing unpaired record at {}..{}", record.start, record.end);
                self.unpaired.insert(segment.qname, record);
                Ok(None)
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.unpaired.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unpaired.is_empty()
    }

    /// End-of-stream check: any residue means some name occurred an odd
    /// number of times (once, or a third time), which would silently lose
    /// records downstream.
    pub fn finish(&self) -> Result<(), PairError> {
        match self.unpaired.keys().next() {
            None => Ok(()),
            Some(name) => Err(PairError::DanglingMates {
                count: self.unpaired.len(),
                example: String::from_utf8_lossy(name).into_owned(),
            }),
        }
    }
}
