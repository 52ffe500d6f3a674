use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// Run counters, serialized to the stats JSON after a successful pass.
///
/// `family_sizes` maps a family's size (after optical collapse, before the
/// CIGAR vote) to the number of families of that size; sequencing counters
/// track mate-overlap disagreements, PCR counters track disagreements
/// against the family consensus.
#[derive(Debug, Default, Serialize)]
pub struct Stats {
    pub total_reads: u64,
    pub read_pairs: u64,
    pub family_sizes: BTreeMap<usize, u64>,
    pub pcr_duplicates: u64,
    pub optical_duplicates: u64,
    pub sequencing_errors: u64,
    pub sequencing_total: u64,
    pub pcr_errors: u64,
    pub pcr_total: u64,
}

impl Stats {
    pub fn record_family(&mut self, size: usize) {
        *self.family_sizes.entry(size).or_insert(0) += 1;
    }

    #[must_use]
    pub fn sequencing_error_rate(&self) -> f64 {
        Self::rate(self.sequencing_errors, self.sequencing_total)
    }

    #[must_use]
    pub fn pcr_error_rate(&self) -> f64 {
        Self::rate(self.pcr_errors, self.pcr_total)
    }

    fn rate(errors: u64, total: u64) -> f64 {
        match total {
            0 => 0.0,
            _ => errors as f64 / total as f64,
        }
    }
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{: <24} - {}", "Reads processed", self.total_reads)?;
        writeln!(f, "{: <24} - {}", "Read pairs", self.read_pairs)?;
        writeln!(f, "{: <24} - {}", "PCR duplicates", self.pcr_duplicates)?;
        writeln!(f, "{: <24} - {}", "Optical duplicates", self.optical_duplicates)?;
        writeln!(f, "{: <24} - {:.6}", "Sequencing error rate", self.sequencing_error_rate())?;
        writeln!(f, "{: <24} - {:.6}", "PCR error rate", self.pcr_error_rate())?;
        let sizes = self
            .family_sizes
            .iter()
            .map(|(size, count)| format!("{size}:{count}"))
            .collect::<Vec<String>>()
            .join(" ");
        write!(f, "{: <24} - {}", "Family sizes", sizes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_histogram() {
        let mut stats = Stats::default();
        stats.record_family(1);
        stats.record_family(3);
        stats.record_family(3);
        assert_eq!(stats.family_sizes.get(&1), Some(&1));
        assert_eq!(stats.family_sizes.get(&3), Some(&2));
        assert_eq!(stats.family_sizes.get(&2), None);
    }

    #[test]
    fn rates_guard_against_empty_totals() {
        let stats = Stats::default();
        assert_eq!(stats.sequencing_error_rate(), 0.0);
        assert_eq!(stats.pcr_error_rate(), 0.0);

        let stats = Stats { pcr_errors: 1, pcr_total: 4, ..Stats::default() };
        assert_eq!(stats.pcr_error_rate(), 0.25);
    }

    #[test]
    fn display_summarizes_all_counters() {
        let mut stats = Stats { total_reads: 10, read_pairs: 5, ..Stats::default() };
        stats.record_family(2);
        let rendered = format!("{stats}");
        assert!(rendered.contains("Reads processed"));
        assert!(rendered.contains("2:1"));
    }
}
