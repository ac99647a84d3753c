//! Record Normalizer
//!
//! Converts raw exchange responses into flat [`TimeSeriesRecord`]s.
//!
//! Each stream is described by a [`RecordMapping`]: the measurement name,
//! the source keys that become tags, the keys that become fields, and where
//! the timestamp comes from. Individual values that cannot be coerced are
//! dropped; only a response missing its identity keys is an error.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::domain::record::{TimeSeriesRecord, coerce_field, parse_timestamp};

// =============================================================================
// Mappings
// =============================================================================

/// Where a record's timestamp comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// The timestamp of the collection cycle (snapshot streams).
    Cycle,
    /// A timestamp key on the source element.
    Key(&'static str),
}

/// Field/tag mapping for one kind of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMapping {
    /// Measurement name.
    pub measurement: &'static str,
    /// Source keys copied into tags.
    pub tags: &'static [&'static str],
    /// Source keys copied into fields.
    pub fields: &'static [&'static str],
    /// Timestamp source.
    pub timestamp: TimestampSource,
}

/// Account summary.
pub const ACCOUNT_MAPPING: RecordMapping = RecordMapping {
    measurement: "account",
    tags: &["username"],
    fields: &[
        "collateral",
        "freeCollateral",
        "marginFraction",
        "openMarginFraction",
        "totalAccountValue",
        "totalPositionSize",
    ],
    timestamp: TimestampSource::Cycle,
};

/// One open position, nested in the account response.
pub const POSITION_MAPPING: RecordMapping = RecordMapping {
    measurement: "positions",
    tags: &["future", "side"],
    fields: &[
        "collateralUsed",
        "cost",
        "entryPrice",
        "estimatedLiquidationPrice",
        "netSize",
        "openSize",
        "realizedPnl",
        "size",
        "unrealizedPnl",
    ],
    timestamp: TimestampSource::Cycle,
};

/// One coin balance.
pub const BALANCE_MAPPING: RecordMapping = RecordMapping {
    measurement: "balances",
    tags: &["coin"],
    fields: &[
        "free",
        "total",
        "usdValue",
        "availableWithoutBorrow",
        "spotBorrow",
    ],
    timestamp: TimestampSource::Cycle,
};

/// One historical order.
pub const ORDER_MAPPING: RecordMapping = RecordMapping {
    measurement: "orders",
    tags: &[
        "future",
        "market",
        "type",
        "side",
        "reduceOnly",
        "status",
        "postOnly",
    ],
    fields: &[
        "avgFillPrice",
        "filledSize",
        "price",
        "size",
        "remainingSize",
    ],
    timestamp: TimestampSource::Key("createdAt"),
};

/// One fill.
pub const FILL_MAPPING: RecordMapping = RecordMapping {
    measurement: "fills",
    tags: &["future", "market", "type", "liquidity", "side"],
    fields: &["fee", "feeRate", "price", "size"],
    timestamp: TimestampSource::Key("time"),
};

/// One public trade. `exchange` and `market` tags are added from the event.
pub const TRADE_MAPPING: RecordMapping = RecordMapping {
    measurement: "trades",
    tags: &["side", "liquidation"],
    fields: &["price", "size"],
    timestamp: TimestampSource::Key("time"),
};

impl RecordMapping {
    /// Map one source element into a record.
    ///
    /// Returns `None` when the timestamp comes from a key that is missing or
    /// unparseable.
    #[must_use]
    pub fn apply(&self, source: &Value, cycle_time: DateTime<Utc>) -> Option<TimeSeriesRecord> {
        let timestamp = match self.timestamp {
            TimestampSource::Cycle => cycle_time,
            TimestampSource::Key(key) => source.get(key).and_then(parse_timestamp)?,
        };

        let mut record = TimeSeriesRecord::new(self.measurement, timestamp);
        for key in self.tags {
            record.set_tag_from(key, source.get(*key));
        }
        for key in self.fields {
            record.set_field_from(key, source.get(*key));
        }
        Some(record)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A response without the keys needed to identify its records.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// A required key is absent or has the wrong shape.
    #[error("malformed {measurement} response: missing {key}")]
    MissingKey {
        /// Measurement being normalized.
        measurement: &'static str,
        /// Key that was expected.
        key: &'static str,
    },
}

// =============================================================================
// Per-Stream Normalization
// =============================================================================

/// Records produced from one account response.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    /// The account summary record.
    pub account: TimeSeriesRecord,
    /// One record per position.
    pub positions: Vec<TimeSeriesRecord>,
}

/// Normalize an account response into the summary and its positions.
///
/// # Errors
///
/// Returns [`NormalizeError`] if `result` is not an object.
pub fn normalize_account(
    response: &Value,
    cycle_time: DateTime<Utc>,
) -> Result<AccountSnapshot, NormalizeError> {
    let result = response
        .get("result")
        .filter(|v| v.is_object())
        .ok_or(NormalizeError::MissingKey {
            measurement: ACCOUNT_MAPPING.measurement,
            key: "result",
        })?;

    let mut account = ACCOUNT_MAPPING
        .apply(result, cycle_time)
        .unwrap_or_else(|| TimeSeriesRecord::new(ACCOUNT_MAPPING.measurement, cycle_time));
    add_collateral_ratios(&mut account, result);

    let positions = result
        .get("positions")
        .and_then(Value::as_array)
        .map(|items| map_elements(items, &POSITION_MAPPING, cycle_time))
        .unwrap_or_default();

    Ok(AccountSnapshot { account, positions })
}

/// Normalize a wallet balances response, one record per coin.
///
/// # Errors
///
/// Returns [`NormalizeError`] if `result` is not an array.
pub fn normalize_balances(
    response: &Value,
    cycle_time: DateTime<Utc>,
) -> Result<Vec<TimeSeriesRecord>, NormalizeError> {
    let items = result_array(response, &BALANCE_MAPPING)?;
    Ok(map_elements(items, &BALANCE_MAPPING, cycle_time))
}

/// Normalize an order history response, one record per order.
///
/// # Errors
///
/// Returns [`NormalizeError`] if `result` is not an array.
pub fn normalize_orders(
    response: &Value,
    cycle_time: DateTime<Utc>,
) -> Result<Vec<TimeSeriesRecord>, NormalizeError> {
    let items = result_array(response, &ORDER_MAPPING)?;
    Ok(map_elements(items, &ORDER_MAPPING, cycle_time))
}

/// Normalize a fills response, one record per fill.
///
/// # Errors
///
/// Returns [`NormalizeError`] if `result` is not an array.
pub fn normalize_fills(
    response: &Value,
    cycle_time: DateTime<Utc>,
) -> Result<Vec<TimeSeriesRecord>, NormalizeError> {
    let items = result_array(response, &FILL_MAPPING)?;
    Ok(map_elements(items, &FILL_MAPPING, cycle_time))
}

/// Normalize one trade feed event, one record per trade.
///
/// # Errors
///
/// Returns [`NormalizeError`] if the event has no `market` string or no
/// `data` array.
pub fn normalize_trades(
    event: &Value,
    exchange: &str,
    received_at: DateTime<Utc>,
) -> Result<Vec<TimeSeriesRecord>, NormalizeError> {
    let market = event
        .get("market")
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingKey {
            measurement: TRADE_MAPPING.measurement,
            key: "market",
        })?;
    let items = event
        .get("data")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingKey {
            measurement: TRADE_MAPPING.measurement,
            key: "data",
        })?;

    Ok(map_elements(items, &TRADE_MAPPING, received_at)
        .into_iter()
        .map(|record| {
            record
                .with_tag("exchange", exchange)
                .with_tag("market", market)
        })
        .collect())
}

fn result_array<'a>(
    response: &'a Value,
    mapping: &RecordMapping,
) -> Result<&'a Vec<Value>, NormalizeError> {
    response
        .get("result")
        .and_then(Value::as_array)
        .ok_or(NormalizeError::MissingKey {
            measurement: mapping.measurement,
            key: "result",
        })
}

fn map_elements(
    items: &[Value],
    mapping: &RecordMapping,
    cycle_time: DateTime<Utc>,
) -> Vec<TimeSeriesRecord> {
    items
        .iter()
        .filter_map(|item| {
            let record = mapping.apply(item, cycle_time);
            if record.is_none() {
                tracing::warn!(
                    measurement = mapping.measurement,
                    "Skipping element without a usable timestamp"
                );
            }
            record
        })
        .collect()
}

fn add_collateral_ratios(account: &mut TimeSeriesRecord, source: &Value) {
    let value = |key: &str| source.get(key).and_then(coerce_field);

    let Some(collateral) = value("collateral").filter(|c| *c != 0.0) else {
        return;
    };
    if let Some(free) = value("freeCollateral") {
        account.set_field("percentUsedCollateral", (collateral - free) / collateral);
        account.set_field("percentFreeCollateral", free / collateral);
    }
    if let Some(position_size) = value("totalPositionSize") {
        account.set_field("currentLeverage", position_size / collateral);
    }
}
