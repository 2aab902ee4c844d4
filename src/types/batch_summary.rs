use std::fmt;

/// What happened to one source row during ingestion.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
pub enum RowOutcome {
    Added,
    Updated,
    SkippedMissingField,
    SkippedUnresolvedStation,
    SkippedMalformedDate,
}

/// Tally of row outcomes over one ingestion batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub added: u32,
    pub updated: u32,
    pub skipped_missing_field: u32,
    pub skipped_unresolved_station: u32,
    pub skipped_malformed_date: u32,
}

impl BatchSummary {
    pub fn new() -> Self {
        BatchSummary {
            added: 0,
            updated: 0,
            skipped_missing_field: 0,
            skipped_unresolved_station: 0,
            skipped_malformed_date: 0,
        }
    }

    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Added => self.added += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::SkippedMissingField => self.skipped_missing_field += 1,
            RowOutcome::SkippedUnresolvedStation => self.skipped_unresolved_station += 1,
            RowOutcome::SkippedMalformedDate => self.skipped_malformed_date += 1,
        }
    }

    pub fn skipped(&self) -> u32 {
        self.skipped_missing_field + self.skipped_unresolved_station + self.skipped_malformed_date
    }

    pub fn processed(&self) -> u32 {
        self.added + self.updated + self.skipped()
    }

    pub fn merge(&mut self, other: &BatchSummary) {
        self.added += other.added;
        self.updated += other.updated;
        self.skipped_missing_field += other.skipped_missing_field;
        self.skipped_unresolved_station += other.skipped_unresolved_station;
        self.skipped_malformed_date += other.skipped_malformed_date;
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} added, {} updated, {} skipped ({} missing field, {} unresolved station, {} malformed date)",
            self.added,
            self.updated,
            self.skipped(),
            self.skipped_missing_field,
            self.skipped_unresolved_station,
            self.skipped_malformed_date
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_and_merge() {
        let mut summary = BatchSummary::new();
        summary.record(RowOutcome::Added);
        summary.record(RowOutcome::Added);
        summary.record(RowOutcome::Updated);
        summary.record(RowOutcome::SkippedUnresolvedStation);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.processed(), 4);

        let mut totals = BatchSummary::new();
        totals.merge(&summary);
        totals.merge(&summary);
        assert_eq!(totals.added, 4);
        assert_eq!(totals.processed(), 8);
    }
}
