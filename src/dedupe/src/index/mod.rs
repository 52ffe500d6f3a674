use ahash::AHashMap;
use log::trace;

use crate::pair::{Fingerprint, ReadPair};
use crate::segment::Segment;

mod error;
pub use error::IndexError;

/// Appendable multimap from pair fingerprint to the pairs carrying it.
///
/// Draining yields each fingerprint's pairs as one contiguous run, in
/// arrival order; the flush controller hands every run to the family
/// refiner as a candidate duplicate family.
#[derive(Debug, Default)]
pub struct PairIndex<'a> {
    buckets: AHashMap<Fingerprint, Vec<ReadPair<'a>>>,
}

impl<'a> PairIndex<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.buckets.contains_key(key)
    }

    pub fn append(&mut self, key: Fingerprint, pair: ReadPair<'a>) {
        self.buckets.entry(key).or_default().push(pair);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn drain(self) -> impl Iterator<Item = (Fingerprint, Vec<ReadPair<'a>>)> {
        self.buckets.into_iter()
    }
}

/// Double-buffered streaming flush.
///
/// `current` holds buckets whose fingerprints sit at or below the 5′
/// watermark; anything keyed beyond it accumulates in `pending`. A reverse
/// mate's 5′ coordinate lies past its POS, so a later-arriving record may
/// still extend a bucket keyed before the cursor; holding two generations
/// guarantees a bucket is only flushed once no further mate can join it.
#[derive(Debug, Default)]
pub struct FlushController<'a> {
    current: PairIndex<'a>,
    pending: PairIndex<'a>,
    rname: &'a [u8],
    watermark: i32,
    pending_watermark: i32,
}

impl<'a> FlushController<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File this pair under its fingerprint. When the stream cursor (the
    /// just-parsed record's RNAME/POS) moves past the watermark or onto a
    /// new reference, the current generation is returned for refinement,
    /// the pending generation is promoted, and the triggering pair seeds
    /// the fresh one.
    pub fn insert(
        &mut self,
        key: Fingerprint,
        pair: ReadPair<'a>,
        cursor_rname: &'a [u8],
        cursor_pos: i32,
        upper_begin: i32,
    ) -> Option<PairIndex<'a>> {
        if cursor_rname == self.rname && cursor_pos <= self.watermark {
            if self.current.contains(&key) {
                self.current.append(key, pair);
            } else {
                self.pending.append(key, pair);
                self.pending_watermark = self.pending_watermark.max(upper_begin);
            }
            return None;
        }

        let flushed = std::mem::take(&mut self.current);
        trace!("flushing {} bucket(s) at {}:{}", flushed.len(), String::from_utf8_lossy(cursor_rname), cursor_pos);
        self.current = std::mem::take(&mut self.pending);
        self.watermark = self.pending_watermark;
        self.pending_watermark = 0;
        self.current.append(key, pair);
        if cursor_rname == self.rname {
            self.watermark = self.watermark.max(upper_begin);
        } else {
            self.rname = cursor_rname;
            self.watermark = upper_begin;
        }
        Some(flushed)
    }

    /// End of stream: both generations, oldest first.
    #[must_use]
    pub fn finish(self) -> [PairIndex<'a>; 2] {
        [self.current, self.pending]
    }
}

/// Enforces the non-decreasing `(rname, pos)` input contract.
#[derive(Debug, Default)]
pub struct SortCheck<'a> {
    rname: &'a [u8],
    pos: i32,
}

impl<'a> SortCheck<'a> {
    /// # Errors
    /// `UnsortedInput` on a position decrease within the same reference.
    pub fn check(&mut self, segment: &Segment<'a>) -> Result<(), IndexError> {
        if segment.rname == self.rname {
            if segment.pos < self.pos {
                return Err(IndexError::UnsortedInput {
                    rname: String::from_utf8_lossy(segment.rname).into_owned(),
                    pos: segment.pos,
                    previous: self.pos,
                });
            }
        } else {
            self.rname = segment.rname;
        }
        self.pos = segment.pos;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_pair(buf: &[u8]) -> (ReadPair<'_>, Fingerprint, i32) {
        let (first, next) = Segment::parse(buf, 0).unwrap();
        let (second, _) = Segment::parse(buf, next).unwrap();
        let pair = ReadPair::new(first, second);
        let key = pair.fingerprint().unwrap();
        let upper = pair.upper_begin().unwrap();
        (pair, key, upper)
    }

    fn records(pos: (i32, i32), qname: &str) -> Vec<u8> {
        format!(
            "{qname}\t99\tchr1\t{}\t60\t4M\t=\t{}\t104\tACGT\tIIII\n\
             {qname}\t147\tchr1\t{}\t60\t4M\t=\t{}\t-104\tTTTT\tIIII\n",
            pos.0, pos.1, pos.1, pos.0
        )
        .into_bytes()
    }

    #[test]
    fn index_appends_runs() {
        let buf_a = records((1000, 1100), "read1");
        let buf_b = records((1000, 1100), "read2");
        let (pair_a, key_a, _) = mock_pair(&buf_a);
        let (pair_b, key_b, _) = mock_pair(&buf_b);
        assert_eq!(key_a, key_b);

        let mut index = PairIndex::new();
        index.append(key_a.clone(), pair_a);
        assert!(index.contains(&key_b));
        index.append(key_b, pair_b);
        assert_eq!(index.len(), 1);

        let buckets: Vec<_> = index.drain().collect();
        assert_eq!(buckets[0].1.len(), 2);
        assert_eq!(buckets[0].1[0].segments[0].qname, b"read1");
        assert_eq!(buckets[0].1[1].segments[0].qname, b"read2");
    }

    #[test]
    fn controller_flushes_when_cursor_passes_watermark() {
        let buf_a = records((1000, 1100), "read1");
        let buf_b = records((5000, 5100), "read2");
        let (pair_a, key_a, upper_a) = mock_pair(&buf_a);
        let (pair_b, key_b, upper_b) = mock_pair(&buf_b);

        let mut controller = FlushController::new();
        // First insert opens the reference; the flushed generation is empty.
        let flushed = controller.insert(key_a, pair_a, b"chr1", 1100, upper_a);
        assert!(flushed.is_some_and(|index| index.is_empty()));

        // Cursor far beyond the watermark: the bucket comes out.
        let flushed = controller
            .insert(key_b, pair_b, b"chr1", 5100, upper_b)
            .expect("a generation must flush");
        assert_eq!(flushed.len(), 1);

        let [current, pending] = controller.finish();
        assert_eq!(current.len(), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn duplicate_fingerprints_join_their_open_bucket() {
        let buf_a = records((1000, 1100), "read1");
        let buf_b = records((1000, 1100), "read2");
        let buf_c = records((1001, 1101), "read3");
        let (pair_a, key_a, upper_a) = mock_pair(&buf_a);
        let (pair_b, key_b, upper_b) = mock_pair(&buf_b);
        let (pair_c, key_c, upper_c) = mock_pair(&buf_c);

        let mut controller = FlushController::new();
        controller.insert(key_a, pair_a, b"chr1", 1100, upper_a);
        // Same fingerprint, cursor within watermark: joins generation A.
        assert!(controller.insert(key_b, pair_b, b"chr1", 1100, upper_b).is_none());
        // New fingerprint within the watermark: lands in generation B.
        assert!(controller.insert(key_c, pair_c, b"chr1", 1101, upper_c).is_none());

        let [current, pending] = controller.finish();
        let buckets: Vec<_> = current.drain().collect();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].1.len(), 2);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn reference_switch_always_flushes() {
        let buf_a = records((1000, 1100), "read1");
        let (pair_a, key_a, upper_a) = mock_pair(&buf_a);
        let buf_b: Vec<u8> = String::from_utf8(records((10, 110), "read2"))
            .unwrap()
            .replace("chr1", "chr2")
            .into_bytes();
        let (pair_b, key_b, upper_b) = mock_pair(&buf_b);

        let mut controller = FlushController::new();
        controller.insert(key_a, pair_a, b"chr1", 1100, upper_a);
        let flushed = controller
            .insert(key_b, pair_b, b"chr2", 110, upper_b)
            .expect("reference switch must flush");
        assert_eq!(flushed.len(), 1);
    }

    #[test]
    fn sort_check_detects_position_decrease() {
        let buf = records((1000, 1100), "read1");
        let (segment, _) = Segment::parse(&buf, 0).unwrap();
        let mut check = SortCheck::default();
        assert!(check.check(&segment).is_ok());

        let earlier = records((900, 1000), "read0");
        let (segment, _) = Segment::parse(&earlier, 0).unwrap();
        assert!(matches!(check.check(&segment), Err(IndexError::UnsortedInput { .. })));
    }

    #[test]
    fn sort_check_resets_across_references() {
        let chr2 = String::from_utf8(records((1000, 1100), "read1")).unwrap().replace("chr1", "chr2");
        let (late, _) = Segment::parse(chr2.as_bytes(), 0).unwrap();
        let chr3_early = String::from_utf8(records((10, 110), "read2")).unwrap().replace("chr1", "chr3");
        let (early, _) = Segment::parse(chr3_early.as_bytes(), 0).unwrap();

        let mut check = SortCheck::default();
        assert!(check.check(&late).is_ok());
        assert!(check.check(&early).is_ok());
    }
}
