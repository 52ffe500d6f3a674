use crate::family::FamilyMember;
use crate::segment::{Segment, SegmentError};
use crate::stats::Stats;

/// Walk the left mate's CIGAR until the reference cursor reaches
/// `target_pos`; returns the read index aligned there, or `None` when the
/// left alignment ends before the target.
fn aligned_offset(left: &Segment<'_>, target_pos: i32) -> Result<Option<i64>, SegmentError> {
    let target = i64::from(target_pos);
    let mut ref_cursor = i64::from(left.pos);
    let mut read_cursor = 0i64;
    for token in left.cigar.iter() {
        let op = token?;
        if ref_cursor >= target {
            break;
        }
        let len = i64::from(op.len);
        if op.consumes_reference() && ref_cursor + len > target {
            if op.consumes_read() {
                read_cursor += target - ref_cursor;
            }
            return Ok(Some(read_cursor));
        }
        if op.consumes_reference() {
            ref_cursor += len;
        }
        if op.consumes_read() {
            read_cursor += len;
        }
    }
    Ok(match ref_cursor >= target {
        true  => Some(read_cursor),
        false => None,
    })
}

/// Read bases the right mate spends before its first reference-consuming
/// operator (soft clips and leading insertions).
fn leading_read_only(right: &Segment<'_>) -> Result<i64, SegmentError> {
    let mut len = 0i64;
    for token in right.cigar.iter() {
        let op = token?;
        if op.consumes_reference() {
            break;
        }
        if op.consumes_read() {
            len += i64::from(op.len);
        }
    }
    Ok(len)
}

/// Intra-pair overlap handling, applied to every member of a family that
/// shares one alignment geometry.
///
/// When the mates overlap, the overlapping bases are reconciled: the
/// higher-quality base wins outright if it beats the other by more than 10
/// Phred, otherwise both positions become `N` at quality zero. Bases read
/// through into the opposite mate's adapter are trimmed off beforehand.
/// Only runs for pairs mapped to the same reference in opposite directions.
pub(crate) fn reconcile(members: &mut [FamilyMember], stats: &mut Stats) -> Result<(), SegmentError> {
    let pair = members[0].pair;
    let [first, second] = pair.segments;
    if first.flags.is_unmapped() || second.flags.is_unmapped() {
        return Ok(());
    }
    if first.rname != second.rname || first.flags.is_reverse() == second.flags.is_reverse() {
        return Ok(());
    }

    let (mut left, mut right) = match first.pos <= second.pos {
        true  => (0, 1),
        false => (1, 0),
    };
    let Some(mut lread) = aligned_offset(&pair.segments[left], pair.segments[right].pos)? else {
        return Ok(());
    };
    lread -= leading_read_only(&pair.segments[right])?;

    // The forward-strand mate plays the left role.
    if pair.segments[left].flags.is_reverse() {
        std::mem::swap(&mut left, &mut right);
        lread = -lread;
    }

    // The right read ran through the left mate's adapter: drop its head.
    if lread < 0 {
        let overhang = (-lread) as usize;
        for member in members.iter_mut() {
            let overhang = overhang.min(member.seq[right].len());
            member.seq[right].drain(..overhang);
            member.qual[right].drain(..overhang);
        }
        lread = 0;
    }
    let lread = lread as usize;
    let left_len = members[0].seq[left].len();
    let right_len = members[0].seq[right].len();
    if lread >= left_len || right_len == 0 {
        return Ok(());
    }

    // The left read ran through the right mate's adapter: drop its tail.
    let mut rread = left_len - lread - 1;
    if rread >= right_len {
        for member in members.iter_mut() {
            member.seq[left].truncate(lread + right_len);
            member.qual[left].truncate(lread + right_len);
        }
        rread = right_len - 1;
    }

    for member in members.iter_mut() {
        stats.sequencing_total += (rread + 1) as u64;
        for j in 0..=rread {
            let left_base = member.seq[left][lread + j];
            let right_base = member.seq[right][j];
            if left_base == right_base {
                continue;
            }
            stats.sequencing_errors += 1;
            let left_qual = member.qual[left][lread + j];
            let right_qual = member.qual[right][j];
            if i32::from(left_qual) - i32::from(right_qual) > 10 {
                member.seq[right][j] = left_base;
                member.qual[right][j] = left_qual;
            } else if i32::from(right_qual) - i32::from(left_qual) > 10 {
                member.seq[left][lread + j] = right_base;
                member.qual[left][lread + j] = right_qual;
            } else {
                member.seq[left][lread + j] = b'N';
                member.qual[left][lread + j] = b'!';
                member.seq[right][j] = b'N';
                member.qual[right][j] = b'!';
            }
        }
    }
    Ok(())
}
