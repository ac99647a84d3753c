//! Time-Series Store Adapters
//!
//! InfluxDB (v1 HTTP write API) sink plus an in-memory sink for tests and
//! dry runs.

mod in_memory;
mod influx;
mod line_protocol;

pub use in_memory::InMemorySink;
pub use influx::InfluxSink;
pub use line_protocol::{encode_batch, encode_record};
