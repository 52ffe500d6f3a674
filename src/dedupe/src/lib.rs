pub mod consensus;
pub mod family;
pub mod index;
pub mod pair;
pub mod segment;
pub mod stats;

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};

use famdup_io::read::SamBytes;
use famdup_io::write::FastqWriter;

use family::{OpticalMode, Refiner, UmiMode};
use index::{FlushController, PairIndex, SortCheck};
use pair::MatePairer;
use segment::{Flags, Segment};
use stats::Stats;

/// Core configuration, distilled from the command line.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub umi: UmiMode,
    pub optical: OpticalMode,
    pub min_family_size: usize,
}

impl From<&parser::Cli> for Config {
    fn from(cli: &parser::Cli) -> Self {
        let umi = match cli.umi {
            parser::UmiKind::None         => UmiMode::None,
            parser::UmiKind::BarcodeSplit => UmiMode::BarcodeSplit,
            parser::UmiKind::ConnorMerge  => UmiMode::ConnorMerge,
        };
        let optical = match cli.optical_distance {
            None                                       => OpticalMode::Auto,
            Some(parser::OpticalArg::Disable)          => OpticalMode::Disabled,
            Some(parser::OpticalArg::Pixels(distance)) => OpticalMode::Distance(distance),
        };
        Self { umi, optical, min_family_size: cli.min_family_size }
    }
}

/// Main runner: mmap the input, stream it through the pipeline, write the
/// FASTQ output and, on success, the statistics JSON.
pub fn run(cli: &parser::Cli) -> Result<()> {
    // ----------------------------- Prepare output locations
    for path in [&cli.output, &cli.stats] {
        let path = Path::new(path);
        famdup_io::parse::create_parent_directory(path)?;
        famdup_io::parse::can_write_file(cli.overwrite, path)?;
    }

    // ----------------------------- Map input
    let sam = SamBytes::open(&cli.sam)?;

    // ----------------------------- Stream
    info!("Deduplicating {}...", cli.sam);
    let mut writer = FastqWriter::new(Some(&cli.output))?;
    let mut stats = Stats::default();
    process(sam.bytes(), &Config::from(cli), &mut writer, &mut stats)?;
    writer.finish()?;

    // ----------------------------- Write statistics
    info!("Writing statistics to {}", cli.stats);
    famdup_io::write::write_stats_json(&cli.stats, &stats)?;
    info!("Run summary:\n{stats}");
    Ok(())
}

/// Drive the pipeline over one SAM buffer: pair mates, bucket pairs by
/// fingerprint, flush completed generations into the refiner, and check the
/// stream contracts (coordinate order, complete pairing) on the way.
pub fn process(
    sam: &[u8],
    config: &Config,
    writer: &mut FastqWriter<'_>,
    stats: &mut Stats,
) -> Result<()> {
    let mut pairer = MatePairer::default();
    let mut controller = FlushController::new();
    let mut sort_check = SortCheck::default();
    let mut refiner = Refiner::new(config.umi, config.optical, config.min_family_size);
    let progress = logger::record_spinner();

    let mut offset = skip_header(sam);
    debug!("header spans {offset} byte(s)");
    while offset < sam.len() {
        let (segment, next) = Segment::parse(sam, offset)
            .with_context(|| format!("While parsing the record at byte offset {offset}"))?;
        stats.total_reads += 1;
        if let Some(progress) = &progress {
            if stats.total_reads % 100_000 == 0 {
                progress.set_position(stats.total_reads);
            }
        }
        sort_check.check(&segment)?;

        // Secondary/supplementary records and fully unmapped pairs are
        // transparent to deduplication.
        if segment.flags.intersects(Flags::NON_PRIMARY) || segment.flags.contains(Flags::BOTH_UNMAPPED) {
            offset = next;
            continue;
        }
        refiner.sample(segment.qname);

        let (cursor_rname, cursor_pos) = (segment.rname, segment.pos);
        if let Some(pair) = pairer.pair_or_store(segment, offset..next, sam)? {
            stats.read_pairs += 1;
            let key = pair.fingerprint()?;
            let upper_begin = pair.upper_begin()?;
            if let Some(flushed) = controller.insert(key, pair, cursor_rname, cursor_pos, upper_begin) {
                drain(flushed, &mut refiner, writer, stats)?;
            }
        }
        offset = next;
    }

    pairer.finish()?;
    for generation in controller.finish() {
        drain(generation, &mut refiner, writer, stats)?;
    }
    if let Some(progress) = progress {
        progress.finish_and_clear();
    }
    Ok(())
}

fn drain(
    index: PairIndex<'_>,
    refiner: &mut Refiner,
    writer: &mut FastqWriter<'_>,
    stats: &mut Stats,
) -> Result<()> {
    for (_, bucket) in index.drain() {
        refiner.refine(bucket, writer, stats)?;
    }
    Ok(())
}

/// Skip `@`-led header lines wholesale.
fn skip_header(sam: &[u8]) -> usize {
    let mut offset = 0;
    while offset < sam.len() && sam[offset] == b'@' {
        match sam[offset..].iter().position(|&b| b == b'\n') {
            Some(end) => offset += end + 1,
            None => return sam.len(),
        }
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONFIG: Config = Config {
        umi: UmiMode::None,
        optical: OpticalMode::Disabled,
        min_family_size: 1,
    };

    fn run_pipeline(sam: &str, config: &Config) -> Result<(String, Stats)> {
        let mut stats = Stats::default();
        let mut bytes = Vec::new();
        {
            let mut writer = FastqWriter::from_writer(Box::new(&mut bytes));
            process(sam.as_bytes(), config, &mut writer, &mut stats)?;
            writer.finish()?;
        }
        Ok((String::from_utf8(bytes).unwrap(), stats))
    }

    #[test]
    fn header_is_skipped_wholesale() {
        let sam = "@HD\tVN:1.6\tSO:coordinate\n@SQ\tSN:chr1\tLN:1000000\nr";
        assert_eq!(skip_header(sam.as_bytes()), sam.len() - 1);
        assert_eq!(skip_header(b"no header"), 0);
    }

    #[test]
    fn singleton_pair_round_trips() -> Result<()> {
        let sam = "\
            @HD\tVN:1.6\tSO:coordinate\n\
            r1\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
            r1\t147\tchr1\t200\t60\t4M\t=\t100\t-104\tAAAA\tFFFI\n";
        let (fastq, stats) = run_pipeline(sam, &CONFIG)?;

        assert_eq!(
            fastq,
            "@r1 XF:i:1\nACGT\n+\nIIII\n\
             @r1 XF:i:1\nTTTT\n+\nIFFF\n"
        );
        assert_eq!(stats.total_reads, 2);
        assert_eq!(stats.read_pairs, 1);
        assert_eq!(stats.family_sizes.get(&1), Some(&1));
        assert_eq!(stats.pcr_duplicates, 0);
        Ok(())
    }

    #[test]
    fn duplicate_pairs_collapse_into_one_family() -> Result<()> {
        // Two pairs with identical coordinates and orientations, one
        // concordant singleton further along.
        let sam = "\
            r1\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
            r2\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
            r1\t147\tchr1\t200\t60\t4M\t=\t100\t-104\tAAAA\tIIII\n\
            r2\t147\tchr1\t200\t60\t4M\t=\t100\t-104\tAAAA\tIIII\n\
            r3\t99\tchr1\t5000\t60\t4M\t=\t5100\t104\tGGGG\tIIII\n\
            r3\t147\tchr1\t5100\t60\t4M\t=\t5000\t-104\tCCCC\tIIII\n";
        let (fastq, stats) = run_pipeline(sam, &CONFIG)?;

        assert_eq!(stats.read_pairs, 3);
        assert_eq!(stats.pcr_duplicates, 1);
        assert_eq!(stats.family_sizes.get(&2), Some(&1));
        assert_eq!(stats.family_sizes.get(&1), Some(&1));
        assert_eq!(fastq.matches("XF:i:2").count(), 2);
        assert_eq!(fastq.matches("XF:i:1").count(), 2);
        Ok(())
    }

    #[test]
    fn family_size_accounting_is_complete() -> Result<()> {
        // 3 duplicate pairs + 1 singleton; sum(i * count[i]) must equal the
        // surviving pair count.
        let sam = "\
            r1\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
            r2\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
            r4\t99\tchr1\t101\t60\t4M\t=\t201\t104\tACGT\tIIII\n\
            r1\t147\tchr1\t200\t60\t4M\t=\t100\t-104\tAAAA\tIIII\n\
            r2\t147\tchr1\t200\t60\t4M\t=\t100\t-104\tAAAA\tIIII\n\
            r4\t147\tchr1\t201\t60\t4M\t=\t101\t-104\tAAAA\tIIII\n";
        let (_, stats) = run_pipeline(sam, &CONFIG)?;

        let accounted: usize = stats
            .family_sizes
            .iter()
            .map(|(size, count)| size * (*count as usize))
            .sum();
        assert_eq!(accounted as u64, stats.read_pairs);
        Ok(())
    }

    #[test]
    fn reverse_reads_fingerprint_by_five_prime_end() -> Result<()> {
        // Same fragment, but the reverse mates' POS differ while their 5'
        // ends agree (soft clip shifts the start). Both pairs must land in
        // one family.
        let sam = "\
            r1\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
            r2\t99\tchr1\t100\t60\t4M\t=\t202\t104\tACGT\tIIII\n\
            r1\t147\tchr1\t200\t60\t4M\t=\t100\t-104\tAAAA\tIIII\n\
            r2\t147\tchr1\t202\t60\t2S2M\t=\t100\t-104\tAAAA\tIIII\n";
        let (fastq, stats) = run_pipeline(sam, &CONFIG)?;

        assert_eq!(stats.family_sizes.get(&2), Some(&1));
        // The reverse mates disagree in CIGAR (4M vs 2S2M), so each class
        // holds one pair, the 60% vote fails and nothing is emitted.
        assert!(fastq.is_empty());
        Ok(())
    }

    #[test]
    fn unsorted_input_is_fatal() {
        let sam = "\
            r1\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
            r2\t99\tchr1\t90\t60\t4M\t=\t190\t104\tACGT\tIIII\n";
        let result = run_pipeline(sam, &CONFIG);
        assert!(result.is_err());
    }

    #[test]
    fn dangling_mate_is_fatal() {
        let sam = "r1\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n";
        let result = run_pipeline(sam, &CONFIG);
        assert!(result.is_err());
    }

    #[test]
    fn non_primary_and_fully_unmapped_records_are_transparent() -> Result<()> {
        // flags 355 = 99 | SECONDARY, 2147 = 99 | SUPPLEMENTARY,
        // 77/141 = both mates unmapped.
        let sam = "\
            r1\t355\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
            r2\t77\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n\
            r2\t141\t*\t0\t0\t*\t*\t0\t0\tTTTT\tIIII\n\
            r3\t2147\tchr1\t150\t60\t4M\t=\t250\t104\tACGT\tIIII\n";
        let (fastq, stats) = run_pipeline(sam, &CONFIG)?;

        assert!(fastq.is_empty());
        assert_eq!(stats.total_reads, 4);
        assert_eq!(stats.read_pairs, 0);
        Ok(())
    }

    #[test]
    fn half_mapped_pair_emits_the_unmapped_mate_verbatim() -> Result<()> {
        let sam = "\
            r1\t73\tchr1\t100\t60\t4M\t=\t100\t0\tACGT\tIIII\n\
            r1\t133\tchr1\t100\t0\t*\t=\t100\t0\tTTGG\tFFII\n";
        let (fastq, stats) = run_pipeline(sam, &CONFIG)?;

        assert_eq!(
            fastq,
            "@r1 XF:i:1\nACGT\n+\nIIII\n\
             @r1 XF:i:1\nTTGG\n+\nFFII\n"
        );
        assert_eq!(stats.read_pairs, 1);
        Ok(())
    }

    #[test]
    fn full_run_writes_fastq_and_stats() -> Result<()> {
        use clap::Parser;

        let dir = tempfile::tempdir()?;
        let sam_path = dir.path().join("input.sam");
        let fastq_path = dir.path().join("deduplicated.fastq");
        let stats_path = dir.path().join("stats.json");
        std::fs::write(
            &sam_path,
            "@HD\tVN:1.6\tSO:coordinate\n\
             r1\t99\tchr1\t100\t60\t4M\t=\t200\t104\tACGT\tIIII\n\
             r1\t147\tchr1\t200\t60\t4M\t=\t100\t-104\tAAAA\tIIII\n",
        )?;

        let cli = parser::Cli::parse_from([
            "famdup-rs",
            sam_path.to_str().unwrap(),
            "--output", fastq_path.to_str().unwrap(),
            "--stats", stats_path.to_str().unwrap(),
            "--optical-distance", "disable",
        ]);
        run(&cli)?;

        let fastq = std::fs::read_to_string(&fastq_path)?;
        assert!(fastq.starts_with("@r1 XF:i:1\nACGT\n"));
        let stats: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&stats_path)?)?;
        assert_eq!(stats["read_pairs"], 1);
        assert_eq!(stats["family_sizes"]["1"], 1);

        // a second run without --overwrite must refuse to clobber
        assert!(run(&cli).is_err());
        Ok(())
    }
}
