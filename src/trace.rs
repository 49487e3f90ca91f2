//! Traffic traces: timed changes of the inter-arrival mean.
//!
//! CSV with header `time,inter_arrival_mean[,node]`. An empty or `None` mean quiesces the
//! ingress; a missing node applies the record to every ingress. Rows must be sorted by time.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, SimError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Simulated time (ms) at which the record takes effect.
    pub time: f64,
    #[serde(deserialize_with = "optional_mean")]
    pub inter_arrival_mean: Option<f64>,
    /// Ingress node name; `None` means all ingress nodes.
    #[serde(default, deserialize_with = "optional_name")]
    pub node: Option<String>,
}

impl TraceRecord {
    pub fn new(time: f64, inter_arrival_mean: Option<f64>, node: Option<&str>) -> Self {
        Self {
            time,
            inter_arrival_mean,
            node: node.map(str::to_string),
        }
    }
}

fn optional_mean<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    let raw = String::deserialize(d)?;
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(serde::de::Error::custom)
}

fn optional_name<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
}

/// Checks that records are sorted by time and that every mean is positive.
pub fn validate_trace(records: &[TraceRecord]) -> Result<()> {
    let mut prev = f64::NEG_INFINITY;
    for (index, rec) in records.iter().enumerate() {
        if !rec.time.is_finite() || rec.time < 0.0 {
            return Err(SimError::InvalidInput(format!(
                "trace record {index} has invalid time {}",
                rec.time
            )));
        }
        if rec.time < prev {
            return Err(SimError::TraceOutOfOrder {
                index,
                time: rec.time,
                prev,
            });
        }
        if let Some(m) = rec.inter_arrival_mean {
            if !(m > 0.0) {
                return Err(SimError::InvalidInput(format!(
                    "trace record {index} has non-positive inter_arrival_mean {m}"
                )));
            }
        }
        prev = rec.time;
    }
    Ok(())
}

pub fn read_trace_from_reader<R: std::io::Read>(reader: R) -> Result<Vec<TraceRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let records = rdr
        .deserialize::<TraceRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    validate_trace(&records)?;
    Ok(records)
}

pub fn read_trace(path: &Path) -> Result<Vec<TraceRecord>> {
    let file = std::fs::File::open(path).map_err(|e| SimError::io(path, e))?;
    read_trace_from_reader(file)
}
