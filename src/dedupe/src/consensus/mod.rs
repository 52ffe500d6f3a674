use anyhow::Result;
use log::trace;

use famdup_io::write::FastqWriter;

use crate::family::FamilyMember;
use crate::stats::Stats;

mod error;
mod overlap;

pub use error::ConsensusError;
pub(crate) use overlap::reconcile;

pub(crate) const BASES: [u8; 5] = *b"ACGTN";

/// Map a sequence byte onto its histogram slot (A C G T, everything else N).
#[must_use]
pub fn base_index(base: u8) -> usize {
    match base {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => 4,
    }
}

#[must_use]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        _ => b'N',
    }
}

pub fn reverse_complement(seq: &mut [u8]) {
    seq.reverse();
    for base in seq.iter_mut() {
        *base = complement(*base);
    }
}

/// Ceiling of 60% of `n`; the majority a consensus base (or a CIGAR class)
/// must reach.
#[must_use]
pub fn sixty_percent_of(n: usize) -> usize {
    (n * 6) / 10 + usize::from((n * 6) % 10 != 0)
}

/// Index of the largest count; ties keep the earliest (A before C before G
/// before T before N).
fn argmax(counts: &[usize; 5]) -> usize {
    let mut winner = 0;
    for (index, &count) in counts.iter().enumerate().skip(1) {
        if count > counts[winner] {
            winner = index;
        }
    }
    winner
}

/// Map the pair's slots onto FASTQ record order: `[first-in-template,
/// second-in-template]`.
///
/// # Errors
/// `MismatchedReadFlags` unless exactly one slot carries READ1 and the
/// other READ2.
fn read_slots(member: &FamilyMember) -> Result<[usize; 2], ConsensusError> {
    use crate::segment::Flags;
    let halves = [member.pair.segments[0].flags.read_half(), member.pair.segments[1].flags.read_half()];
    match halves {
        [Flags::READ1, Flags::READ2] => Ok([0, 1]),
        [Flags::READ2, Flags::READ1] => Ok([1, 0]),
        _ => Err(ConsensusError::MismatchedReadFlags {
            qname: String::from_utf8_lossy(member.pair.segments[0].qname).into_owned(),
            first: member.pair.segments[0].flags.to_string(),
            second: member.pair.segments[1].flags.to_string(),
        }),
    }
}

/// Collapses one family into a consensus read pair.
///
/// The output buffers are reused across families; they grow to the longest
/// read seen and stay there.
#[derive(Debug, Default)]
pub struct ConsensusCaller {
    seq: Vec<u8>,
    qual: Vec<u8>,
}

impl ConsensusCaller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile mate overlaps, call one consensus per read of the pair and
    /// write both FASTQ records (first-in-template first). Families below
    /// `min_family_size` are accounted for but not emitted.
    pub fn collapse_family(
        &mut self,
        members: &mut [FamilyMember],
        min_family_size: usize,
        writer: &mut FastqWriter<'_>,
        stats: &mut Stats,
    ) -> Result<()> {
        let family_size = members.len();
        debug_assert!(family_size > 0);
        let slots = read_slots(&members[0])?;
        stats.pcr_duplicates += (family_size - 1) as u64;
        if family_size < min_family_size {
            trace!("family of {family_size} below --min-family-size, suppressed");
            return Ok(());
        }

        reconcile(members, stats)?;

        for slot in slots {
            self.call_read(members, slot, stats);
            let segment = &members[0].pair.segments[slot];
            if segment.flags.is_reverse() {
                reverse_complement(&mut self.seq);
                self.qual.reverse();
            }
            writer.write_record(segment.qname, family_size, &self.seq, &self.qual)?;
        }
        Ok(())
    }

    /// Per-base majority vote with summed-quality scoring, into the reusable
    /// output buffers. Size-1 families and unmapped reads pass through
    /// verbatim.
    fn call_read(&mut self, members: &[FamilyMember], slot: usize, stats: &mut Stats) {
        self.seq.clear();
        self.qual.clear();

        let family_size = members.len();
        let first = &members[0];
        if family_size == 1 || first.pair.segments[slot].flags.is_unmapped() {
            self.seq.extend_from_slice(&first.seq[slot]);
            self.qual.extend_from_slice(&first.qual[slot]);
            return;
        }

        // Post-vote members share CIGARs, so they share read lengths too.
        let len = first.seq[slot].len();
        let threshold = sixty_percent_of(family_size);
        for i in 0..len {
            let mut counts = [0usize; 5];
            let mut quals = [0i32; 5];
            for member in members {
                let b = base_index(member.seq[slot][i]);
                counts[b] += 1;
                if b < 4 {
                    quals[b] += i32::from(member.qual[slot][i]) - 33;
                }
            }

            let winner = argmax(&counts);
            stats.pcr_total += family_size as u64;
            stats.pcr_errors += (family_size - counts[winner]) as u64;

            if winner == 4 || counts[winner] < threshold {
                self.seq.push(b'N');
                self.qual.push(b'!');
                continue;
            }
            let others: i32 = quals[..4].iter().sum::<i32>() - quals[winner];
            let qual = (quals[winner] - others).clamp(0, 93);
            self.seq.push(BASES[winner]);
            self.qual.push((qual + 33) as u8);
        }
    }
}
