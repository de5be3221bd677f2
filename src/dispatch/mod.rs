use std::num::ParseIntError;

use cadence::{Gauged, MetricError, StatsdClient};
use thiserror::Error;
use tracing::trace;

use crate::report::MetricRecord;

/// A named gauge value ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricPoint {
    /// `<entity>.<sub-entity>.<field>`, without the statsd prefix.
    pub name: String,
    pub value: u64,
}

/// A gauge column held something other than an unsigned integer.
#[derive(Error, Debug)]
#[error("{entity}.{sub_entity}: field {field} is not an unsigned integer: {raw:?}")]
pub struct ValueError {
    pub entity: String,
    pub sub_entity: String,
    pub field: &'static str,
    pub raw: String,
    #[source]
    pub source: ParseIntError,
}

/// Errors that can occur while dispatching one record.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("sending {name}")]
    Send {
        name: String,
        #[source]
        source: MetricError,
    },
}

/// Builds the metric name for one field of a record.
pub fn metric_name(record: &MetricRecord, field: &str) -> String {
    format!("{}.{}.{}", record.entity, record.sub_entity, field)
}

/// Converts every gauge column of a record into a [`MetricPoint`], in
/// column-table order. Empty values count as zero.
///
/// Values must be unsigned integers. statsd reads a leading sign on a gauge
/// as a relative change, so a negative value is rejected rather than sent.
pub fn derive_points(record: &MetricRecord) -> Result<Vec<MetricPoint>, ValueError> {
    record
        .observations
        .iter()
        .map(|obs| {
            let raw = if obs.raw.is_empty() { "0" } else { obs.raw.as_str() };

            let value = raw.parse::<u64>().map_err(|source| ValueError {
                entity: record.entity.clone(),
                sub_entity: record.sub_entity.clone(),
                field: obs.key,
                raw: obs.raw.clone(),
                source,
            })?;

            Ok(MetricPoint {
                name: metric_name(record, obs.key),
                value,
            })
        })
        .collect()
}

/// Sends every gauge of a record, returning how many were sent.
///
/// All values are validated before the first send, so a record with a bad
/// value emits nothing.
pub fn dispatch(record: &MetricRecord, client: &StatsdClient) -> Result<usize, DispatchError> {
    let points = derive_points(record)?;

    for point in &points {
        client
            .gauge(&point.name, point.value)
            .map_err(|source| DispatchError::Send {
                name: point.name.clone(),
                source,
            })?;
        trace!(name = %point.name, value = point.value, "sent gauge");
    }

    Ok(points.len())
}
