use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::matcher::MatchOutcome;
use crate::poller::{PollError, SkipReason, TickOutcome};

/// Running counters for the position poller. Skipped ticks write nothing to
/// the sample log, so these are the only trace of them.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PollStats {
    pub started_at: Option<DateTime<Utc>>,
    pub ticks: u64,

    // tick outcomes
    pub recorded: u64,
    pub skipped_no_report: u64,
    pub skipped_incomplete: u64,
    pub failures: u64,

    // matcher outcomes for recorded ticks
    pub stop_changes: u64,
    pub between_stops: u64,

    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PollStats {
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(at),
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &TickOutcome, at: DateTime<Utc>) {
        self.ticks += 1;
        self.last_success = Some(at);

        match outcome {
            TickOutcome::Skipped(SkipReason::NoReport) => self.skipped_no_report += 1,
            TickOutcome::Skipped(SkipReason::IncompleteReport) => self.skipped_incomplete += 1,
            TickOutcome::Recorded { matched, .. } => {
                self.recorded += 1;
                match matched {
                    MatchOutcome::Moved { .. } => self.stop_changes += 1,
                    MatchOutcome::BetweenStops => self.between_stops += 1,
                    MatchOutcome::Unchanged { .. } => {}
                }
            }
        }
    }

    pub fn record_failure(&mut self, error: &PollError, at: DateTime<Utc>) {
        self.ticks += 1;
        self.failures += 1;
        self.last_failure = Some(at);
        self.last_error = Some(error.to_string());
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_no_report + self.skipped_incomplete
    }

    pub fn pct(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of ticks that produced a sample.
    pub fn recorded_pct(&self) -> f64 {
        Self::pct(self.recorded, self.ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BusId;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(PollStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(PollStats::pct(50, 100), 50.0);
        assert_eq!(PollStats::pct(1, 4), 25.0);
    }

    #[test]
    fn test_record_counts_each_outcome() {
        let mut stats = PollStats::started(Utc::now());
        let now = Utc::now();

        stats.record(&TickOutcome::Skipped(SkipReason::NoReport), now);
        stats.record(&TickOutcome::Skipped(SkipReason::IncompleteReport), now);
        stats.record(
            &TickOutcome::Recorded {
                seq: 1,
                matched: MatchOutcome::Moved {
                    from: None,
                    to: 3,
                    distance_km: 0.01,
                },
            },
            now,
        );
        stats.record(
            &TickOutcome::Recorded {
                seq: 2,
                matched: MatchOutcome::BetweenStops,
            },
            now,
        );
        stats.record_failure(&PollError::UnknownBus(BusId::new("7")), now);

        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.skipped(), 2);
        assert_eq!(stats.recorded, 2);
        assert_eq!(stats.stop_changes, 1);
        assert_eq!(stats.between_stops, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.recorded_pct(), 40.0);
        assert!(stats.last_error.as_deref().unwrap().contains("7"));
    }
}
