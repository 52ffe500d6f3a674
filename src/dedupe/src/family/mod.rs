use anyhow::Result;
use log::trace;

use famdup_io::write::FastqWriter;

use crate::consensus::ConsensusCaller;
use crate::pair::ReadPair;
use crate::stats::Stats;

mod error;
pub mod optical;

pub use error::FamilyError;
pub use optical::{OpticalDetector, OpticalMode, TilePos};

/// How unique molecular identifiers partition a positional bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UmiMode {
    None,
    BarcodeSplit,
    ConnorMerge,
}

/// One pair inside a materialized family.
///
/// Carries owned copies of both mates' sequence and quality bytes: those are
/// what overlap trimming, optical collapse and reconciliation mutate, while
/// the borrowed `pair` keeps supplying names, flags and CIGARs.
#[derive(Debug, Clone)]
pub struct FamilyMember<'a> {
    pub pair: ReadPair<'a>,
    pub seq:  [Vec<u8>; 2],
    pub qual: [Vec<u8>; 2],
    pub tile: Option<TilePos>,
}

impl<'a> FamilyMember<'a> {
    #[must_use]
    pub fn from_pair(pair: ReadPair<'a>) -> Self {
        let seq  = [pair.segments[0].seq.to_vec(),  pair.segments[1].seq.to_vec()];
        let qual = [pair.segments[0].qual.to_vec(), pair.segments[1].qual.to_vec()];
        Self { pair, seq, qual, tile: None }
    }

    fn cigar_key(&self) -> [&'a [u8]; 2] {
        [self.pair.segments[0].cigar.bytes(), self.pair.segments[1].cigar.bytes()]
    }
}

/// Expand-until-stable transitive grouping: seed a group with the first
/// remaining item, absorb every item `joins` says belongs with the current
/// group, repeat until a full scan absorbs nothing, then peel the group off
/// and start over on the remainder.
pub(crate) fn partition_transitive<T, F>(mut items: Vec<T>, joins: F) -> Vec<Vec<T>>
where
    F: Fn(&T, &[T]) -> bool,
{
    let mut groups = Vec::new();
    while !items.is_empty() {
        let mut group = vec![items.remove(0)];
        loop {
            let absorbed = group.len();
            let mut i = 0;
            while i < items.len() {
                if joins(&items[i], &group) {
                    group.push(items.remove(i));
                } else {
                    i += 1;
                }
            }
            if group.len() == absorbed {
                break;
            }
        }
        groups.push(group);
    }
    groups
}

/// Turns flushed position buckets into consensus families.
///
/// Pipeline per bucket: UMI grouping, optical collapse, the family-size
/// histogram, the 60% CIGAR vote, then the consensus caller.
pub struct Refiner {
    umi: UmiMode,
    optical: OpticalDetector,
    min_family_size: usize,
    caller: ConsensusCaller,
}

impl Refiner {
    #[must_use]
    pub fn new(umi: UmiMode, optical: OpticalMode, min_family_size: usize) -> Self {
        Self {
            umi,
            optical: OpticalDetector::new(optical),
            min_family_size,
            caller: ConsensusCaller::new(),
        }
    }

    /// Feed one read name into flowcell auto-detection.
    pub fn sample(&mut self, qname: &[u8]) {
        self.optical.sample(qname);
    }

    /// Refine one flushed bucket (pairs sharing a fingerprint) and emit the
    /// consensus of every surviving family.
    pub fn refine<'a>(
        &mut self,
        bucket: Vec<ReadPair<'a>>,
        writer: &mut FastqWriter<'_>,
        stats: &mut Stats,
    ) -> Result<()> {
        match self.umi {
            UmiMode::None => self.collapse(bucket, writer, stats),
            UmiMode::BarcodeSplit => {
                let mut bucket = bucket;
                bucket.sort_by(|a, b| {
                    a.segments[0].barcode.full().cmp(b.segments[0].barcode.full())
                });
                while !bucket.is_empty() {
                    let barcode = bucket[0].segments[0].barcode.full();
                    let run = bucket
                        .iter()
                        .take_while(|pair| pair.segments[0].barcode.full() == barcode)
                        .count();
                    let rest = bucket.split_off(run);
                    self.collapse(bucket, writer, stats)?;
                    bucket = rest;
                }
                Ok(())
            }
            UmiMode::ConnorMerge => {
                for pair in &bucket {
                    let (first, second) = pair.segments[0].barcode.halves();
                    if first.is_empty() && second.is_empty() {
                        return Err(FamilyError::MissingBarcode {
                            qname: String::from_utf8_lossy(pair.segments[0].qname).into_owned(),
                        }
                        .into());
                    }
                }
                let families = partition_transitive(bucket, |candidate, group| {
                    let (ca, cb) = candidate.segments[0].barcode.halves();
                    group.iter().any(|member| {
                        let (ma, mb) = member.segments[0].barcode.halves();
                        (!ca.is_empty() && ca == ma) || (!cb.is_empty() && cb == mb)
                    })
                });
                for family in families {
                    self.collapse(family, writer, stats)?;
                }
                Ok(())
            }
        }
    }

    /// Optical collapse, histogram, CIGAR vote, consensus.
    fn collapse<'a>(
        &mut self,
        family: Vec<ReadPair<'a>>,
        writer: &mut FastqWriter<'_>,
        stats: &mut Stats,
    ) -> Result<()> {
        let mut members: Vec<FamilyMember<'a>> = family.into_iter().map(FamilyMember::from_pair).collect();
        if let Some(distance) = self.optical.pixel_distance() {
            optical::collapse(&mut members, distance, stats);
        }
        stats.record_family(members.len());

        if members.len() >= 2 {
            members.sort_by(|a, b| a.cigar_key().cmp(&b.cigar_key()));
            match winning_run(&members) {
                Some(run) => {
                    members.truncate(run.end);
                    members.drain(..run.start);
                }
                None => {
                    trace!("no CIGAR class reached 60% of the family, dropping {} pair(s)", members.len());
                    return Ok(());
                }
            }
        }
        self.caller.collapse_family(&mut members, self.min_family_size, writer, stats)
    }
}

/// First run of equal CIGAR pairs (on sorted members) reaching 60% of the
/// family, if any.
fn winning_run(members: &[FamilyMember<'_>]) -> Option<std::ops::Range<usize>> {
    let threshold = crate::consensus::sixty_percent_of(members.len());
    let mut start = 0;
    while start < members.len() {
        let key = members[start].cigar_key();
        let len = members[start..].iter().take_while(|m| m.cigar_key() == key).count();
        if len >= threshold {
            return Some(start..start + len);
        }
        start += len;
    }
    None
}
