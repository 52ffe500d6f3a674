use itertools::Itertools;
use log::{debug, info};

use crate::consensus::{base_index, sixty_percent_of, BASES};
use crate::segment::parse_i32;
use crate::stats::Stats;

use super::{partition_transitive, FamilyMember};

/// How many leading x-coordinates feed flowcell auto-detection.
pub const OPTICAL_SAMPLE_SIZE: usize = 1000;
/// Pixel radius on patterned flowcells (cluster centres on a lattice).
pub const PATTERNED_PIXEL_DISTANCE: i32 = 2501;
/// Pixel radius on unpatterned flowcells.
pub const UNPATTERNED_PIXEL_DISTANCE: i32 = 101;

/// Flowcell coordinates recovered from an Illumina-style read name
/// (`instrument:run:flowcell:lane:tile:x:y`): the byte length of the
/// name prefix up to and including the tile field, plus the pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePos {
    pub prefix: usize,
    pub x: i32,
    pub y: i32,
}

/// Extract tile/x/y out of a read name, if it is Illumina-shaped: at least
/// six colon-separated fields, the last two being pixel integers.
#[must_use]
pub fn tile_pos(qname: &[u8]) -> Option<TilePos> {
    let colons: Vec<usize> = qname
        .iter()
        .enumerate()
        .filter_map(|(i, &b)| (b == b':').then_some(i))
        .collect();
    if colons.len() < 6 {
        return None;
    }
    let prefix = colons[4];
    let x = parse_i32(&qname[colons[colons.len() - 2] + 1..colons[colons.len() - 1]])?;
    let y = parse_i32(&qname[colons[colons.len() - 1] + 1..])?;
    Some(TilePos { prefix, x, y })
}

/// The optical-duplicate policy requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpticalMode {
    /// Infer the pixel radius from the first read names.
    Auto,
    Disabled,
    /// Explicit pixel radius.
    Distance(i32),
}

/// Resolves `OpticalMode::Auto` into a concrete pixel distance.
///
/// While in auto mode, read-name x-coordinates are sampled from the stream
/// (up to [`OPTICAL_SAMPLE_SIZE`]); the first bucket refinement freezes the
/// decision. A patterned flowcell shows a common divisor > 1 across all
/// successive x-deltas and warrants the larger radius.
#[derive(Debug)]
pub struct OpticalDetector {
    mode: OpticalMode,
    samples: Vec<i32>,
}

impl OpticalDetector {
    #[must_use]
    pub fn new(mode: OpticalMode) -> Self {
        Self { mode, samples: Vec::new() }
    }

    pub fn sample(&mut self, qname: &[u8]) {
        if self.mode != OpticalMode::Auto || self.samples.len() >= OPTICAL_SAMPLE_SIZE {
            return;
        }
        match tile_pos(qname) {
            Some(tile) => self.samples.push(tile.x),
            None => {
                debug!("read names are not Illumina-shaped: optical grouping disabled");
                self.mode = OpticalMode::Disabled;
            }
        }
    }

    /// The pixel distance to cluster at, or `None` when optical grouping is
    /// off. Freezes an `Auto` mode on first call.
    pub fn pixel_distance(&mut self) -> Option<i32> {
        if self.mode == OpticalMode::Auto {
            self.mode = self.decide();
        }
        match self.mode {
            OpticalMode::Distance(distance) => Some(distance),
            _ => None,
        }
    }

    fn decide(&self) -> OpticalMode {
        if self.samples.len() < 2 {
            debug!("too few reads to infer flowcell geometry: optical grouping disabled");
            return OpticalMode::Disabled;
        }
        let common = self
            .samples
            .iter()
            .tuple_windows()
            .fold(0u32, |acc, (a, b)| gcd(acc, b.abs_diff(*a)));
        let (kind, distance) = match common > 1 {
            true  => ("patterned", PATTERNED_PIXEL_DISTANCE),
            false => ("unpatterned", UNPATTERNED_PIXEL_DISTANCE),
        };
        info!("flowcell geometry: {kind}, optical pixel distance {distance}");
        OpticalMode::Distance(distance)
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    match b {
        0 => a,
        _ => gcd(b, a % b),
    }
}

fn is_optical_neighbour(a: &FamilyMember<'_>, b: &FamilyMember<'_>, limit: i64) -> bool {
    let (Some(at), Some(bt)) = (a.tile, b.tile) else {
        return false;
    };
    if a.pair.segments[0].qname[..at.prefix] != b.pair.segments[0].qname[..bt.prefix] {
        return false;
    }
    let dx = i64::from(at.x) - i64::from(bt.x);
    let dy = i64::from(at.y) - i64::from(bt.y);
    dx * dx + dy * dy < limit
}

/// Collapse optical clusters in place: members within `distance` pixels of
/// one another on the same tile (transitively) shrink to a single
/// representative carrying their max-quality consensus. Members without
/// Illumina-shaped names pass through untouched.
pub(crate) fn collapse(members: &mut Vec<FamilyMember<'_>>, distance: i32, stats: &mut Stats) {
    for member in members.iter_mut() {
        member.tile = tile_pos(member.pair.segments[0].qname);
    }
    let limit = i64::from(distance) * i64::from(distance);
    let (tiled, untiled): (Vec<_>, Vec<_>) =
        std::mem::take(members).into_iter().partition(|member| member.tile.is_some());

    let clusters = partition_transitive(tiled, |candidate, group| {
        group.iter().any(|member| is_optical_neighbour(candidate, member, limit))
    });
    for mut cluster in clusters {
        if cluster.len() > 1 {
            stats.optical_duplicates += (cluster.len() - 1) as u64;
            collapse_cluster(&mut cluster, stats);
        }
        members.extend(cluster);
    }
    members.extend(untiled);
}

/// Shrink one cluster onto its first member. Same consensus shape as the
/// family caller, but quality aggregates as the per-base maximum, and
/// two-member clusters fall back to the >10 Phred dominance rule.
fn collapse_cluster(cluster: &mut Vec<FamilyMember<'_>>, stats: &mut Stats) {
    let Some((base, rest)) = cluster.split_first_mut() else {
        return;
    };
    for slot in 0..2 {
        if base.pair.segments[slot].flags.is_unmapped() {
            continue;
        }
        match rest {
            [other] => collapse_two(base, other, slot, stats),
            _ => collapse_many(base, rest, slot, stats),
        }
    }
    cluster.truncate(1);
}

fn collapse_two(base: &mut FamilyMember<'_>, other: &FamilyMember<'_>, slot: usize, stats: &mut Stats) {
    for i in 0..base.seq[slot].len() {
        let Some(&other_base) = other.seq[slot].get(i) else {
            break;
        };
        stats.pcr_total += 2;
        if base.seq[slot][i] == other_base {
            base.qual[slot][i] = base.qual[slot][i].max(other.qual[slot][i]);
            continue;
        }
        stats.pcr_errors += 1;
        let (bq, oq) = (base.qual[slot][i], other.qual[slot][i]);
        if i32::from(bq) - i32::from(oq) > 10 {
            // keep the dominant base
        } else if i32::from(oq) - i32::from(bq) > 10 {
            base.seq[slot][i] = other_base;
            base.qual[slot][i] = oq;
        } else {
            base.seq[slot][i] = b'N';
            base.qual[slot][i] = b'!';
        }
    }
}

fn collapse_many(base: &mut FamilyMember<'_>, rest: &[FamilyMember<'_>], slot: usize, stats: &mut Stats) {
    for i in 0..base.seq[slot].len() {
        let mut counts = [0usize; 5];
        let mut max_qual = [0u8; 5];
        let mut present = 0usize;
        {
            let scan = std::iter::once(&*base).chain(rest.iter());
            for member in scan {
                let Some(&b) = member.seq[slot].get(i) else {
                    continue;
                };
                let index = base_index(b);
                counts[index] += 1;
                present += 1;
                if index < 4 {
                    max_qual[index] = max_qual[index].max(member.qual[slot][i]);
                }
            }
        }
        let winner = (0..5).fold(0, |best, index| match counts[index] > counts[best] {
            true  => index,
            false => best,
        });
        stats.pcr_total += present as u64;
        stats.pcr_errors += (present - counts[winner]) as u64;
        if winner == 4 || counts[winner] < sixty_percent_of(present) {
            base.seq[slot][i] = b'N';
            base.qual[slot][i] = b'!';
        } else {
            base.seq[slot][i] = BASES[winner];
            base.qual[slot][i] = max_qual[winner];
        }
    }
}
