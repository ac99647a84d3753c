//! Cross-record aggregation.

use chrono::{DateTime, Utc};

use crate::domain::record::TimeSeriesRecord;

/// Sums named fields across a batch of records into one untagged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSpec {
    /// Output measurement.
    pub measurement: &'static str,
    /// `(source field, output field)` pairs.
    pub sums: &'static [(&'static str, &'static str)],
}

/// Totals across all positions of an account snapshot.
pub const POSITIONS_AGGREGATE: AggregateSpec = AggregateSpec {
    measurement: "all_positions",
    sums: &[
        ("collateralUsed", "totalCollateralUsed"),
        ("cost", "totalCost"),
        ("realizedPnl", "totalRealizedPnl"),
        ("unrealizedPnl", "totalUnrealizedPnl"),
    ],
};

impl AggregateSpec {
    /// Aggregate `records`, or `None` for an empty batch.
    ///
    /// A source field missing on a record is excluded from its sum. An output
    /// field with no contributors is omitted.
    #[must_use]
    pub fn aggregate(
        &self,
        records: &[TimeSeriesRecord],
        timestamp: DateTime<Utc>,
    ) -> Option<TimeSeriesRecord> {
        if records.is_empty() {
            return None;
        }

        let mut output = TimeSeriesRecord::new(self.measurement, timestamp);
        for (source, target) in self.sums {
            let mut values = records.iter().filter_map(|r| r.field(source)).peekable();
            if values.peek().is_some() {
                output.set_field(*target, values.sum());
            }
        }
        Some(output)
    }
}
