use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use clap::Parser;
use serde::Serialize;
use log::info;

use crate::ParserError;
use anyhow::Result;

/// How unique molecular identifiers partition a positional duplicate family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UmiKind {
    /// Ignore barcodes entirely.
    None,
    /// Split on inequality of the full barcode.
    BarcodeSplit,
    /// Merge pairs sharing either sub-barcode, transitively.
    ConnorMerge,
}

impl FromStr for UmiKind {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none"          => Ok(Self::None),
            "barcode-split" => Ok(Self::BarcodeSplit),
            "connor-merge"  => Ok(Self::ConnorMerge),
            other           => Err(ParserError::InvalidUmiKind(other.to_string())),
        }
    }
}

impl Display for UmiKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::None         => write!(f, "none"),
            Self::BarcodeSplit => write!(f, "barcode-split"),
            Self::ConnorMerge  => write!(f, "connor-merge"),
        }
    }
}

/// User-provided optical duplicate policy. Leaving `--optical-distance`
/// unspecified requests flowcell auto-detection instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OpticalArg {
    Disable,
    Pixels(i32),
}

impl FromStr for OpticalArg {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "disable" {
            return Ok(Self::Disable);
        }
        match s.parse::<i32>() {
            Ok(pixels) if pixels > 0 => Ok(Self::Pixels(pixels)),
            _ => Err(ParserError::InvalidOpticalDistance(s.to_string())),
        }
    }
}

/// famdup-rs: collapse PCR and optical duplicate families of a
/// coordinate-sorted SAM stream into consensus FASTQ.
#[derive(Parser, Debug, Serialize)]
#[clap(name="famdup-rs", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the verbosity level (-v -vv -vvv)
    ///
    /// -v: Info  |  -vv: Debug  | -vvv: Trace {n}
    ///
    /// Note that the program will still output warnings by default, even when
    /// this flag is off. Use --quiet/-q to disable them.
    #[clap(short='v', long, parse(from_occurrences))]
    pub verbose: u8,

    /// Disable warnings. Only errors will be displayed.
    #[clap(short='q', long)]
    pub quiet: bool,

    /// Input coordinate-sorted SAM file.
    ///
    /// Must be sorted by (reference, position), e.g. the output of
    /// 'samtools sort'. Header lines are skipped wholesale.
    #[clap(value_name("SAM"))]
    pub sam: String,

    /// Output FASTQ file (two records per surviving consensus pair).
    ///
    /// A '.fastq.gz' extension enables on-the-fly gzip compression.
    #[clap(short, long, default_value("deduplicated.fastq"))]
    pub output: String,

    /// Output statistics file (JSON).
    #[clap(short, long, default_value("stats.json"))]
    pub stats: String,

    /// UMI handling: none | barcode-split | connor-merge
    ///
    /// 'barcode-split' treats every distinct RX barcode as its own family.
    /// 'connor-merge' merges pairs sharing either sub-barcode, transitively,
    /// and requires every record to carry an RX tag.
    #[clap(short, long, default_value("none"))]
    pub umi: UmiKind,

    /// Suppress FASTQ emission for families below this size.
    #[clap(short='m', long, default_value("1"))]
    pub min_family_size: usize,

    /// Optical duplicate pixel distance, or 'disable'.
    ///
    /// When left unspecified, the flowcell geometry is inferred from the
    /// first 1000 read names: patterned flowcells get a 2501px radius,
    /// unpatterned ones 101px.
    #[clap(short='d', long)]
    pub optical_distance: Option<OpticalArg>,

    /// Overwrite existing output files.
    #[clap(short='w', long)]
    pub overwrite: bool,
}

impl Cli {
    /// Echo the parsed command line arguments at Info level, as YAML.
    ///
    /// # Panics
    /// If `serde_yaml` fails to serialize `Self` (which would be a bug).
    pub fn serialize(&self) {
        let serialized = serde_yaml::to_string(&self).expect("Failed to serialize command line arguments");
        info!("\n---- Command line args ----\n{serialized}\n---");
    }

    /// Front-end sanity checks: file-type enforcement on the three paths and
    /// a non-zero minimum family size.
    pub fn validate(&self) -> Result<(), ParserError> {
        Self::check_extension("input file", &self.sam, ".sam")?;
        if !(self.output.ends_with(".fastq") || self.output.ends_with(".fastq.gz")) {
            return Err(ParserError::InvalidFileType {
                arg: "--output", path: self.output.clone(), expected: "fastq[.gz]",
            });
        }
        Self::check_extension("--stats", &self.stats, ".json")?;
        if self.min_family_size == 0 {
            return Err(ParserError::InvalidMinFamilySize);
        }
        Ok(())
    }

    fn check_extension(arg: &'static str, path: &str, suffix: &'static str) -> Result<(), ParserError> {
        match path.ends_with(suffix) {
            true  => Ok(()),
            false => Err(ParserError::InvalidFileType {
                arg, path: path.to_string(), expected: suffix.trim_start_matches('.'),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_cli(sam: &str, output: &str, stats: &str) -> Cli {
        Cli::parse_from(["famdup-rs", sam, "--output", output, "--stats", stats])
    }

    #[test]
    fn umi_kind_from_str() -> Result<()> {
        assert_eq!("none".parse::<UmiKind>()?,          UmiKind::None);
        assert_eq!("barcode-split".parse::<UmiKind>()?, UmiKind::BarcodeSplit);
        assert_eq!("connor-merge".parse::<UmiKind>()?,  UmiKind::ConnorMerge);
        assert!("thruplex".parse::<UmiKind>().is_err());
        Ok(())
    }

    #[test]
    fn optical_arg_from_str() -> Result<()> {
        assert_eq!("disable".parse::<OpticalArg>()?, OpticalArg::Disable);
        assert_eq!("2501".parse::<OpticalArg>()?,    OpticalArg::Pixels(2501));
        assert!("0".parse::<OpticalArg>().is_err());
        assert!("-100".parse::<OpticalArg>().is_err());
        assert!("many".parse::<OpticalArg>().is_err());
        Ok(())
    }

    #[test]
    fn validate_accepts_defaults() {
        let cli = mock_cli("input.sam", "deduplicated.fastq", "stats.json");
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn validate_accepts_gzipped_output() {
        let cli = mock_cli("input.sam", "deduplicated.fastq.gz", "stats.json");
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn validate_rejects_foreign_extensions() {
        let bad_input  = mock_cli("input.bam", "deduplicated.fastq", "stats.json");
        let bad_output = mock_cli("input.sam", "deduplicated.sam", "stats.json");
        let bad_stats  = mock_cli("input.sam", "deduplicated.fastq", "stats.yaml");
        for cli in [bad_input, bad_output, bad_stats] {
            assert!(matches!(cli.validate(), Err(ParserError::InvalidFileType { .. })));
        }
    }

    #[test]
    fn validate_rejects_zero_family_size() {
        let cli = Cli::parse_from(["famdup-rs", "input.sam", "--min-family-size", "0"]);
        assert_eq!(cli.validate(), Err(ParserError::InvalidMinFamilySize));
    }
}
