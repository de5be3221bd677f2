//! HAProxy CSV report decoding.
//!
//! A [`RawReport`] holds one response body. [`RawReport::records`] walks it
//! lazily, skipping `#` comment lines, and yields one [`MetricRecord`] per
//! data row. The first malformed row ends the walk with an error; rows are
//! never skipped silently.

pub mod fields;

use csv::StringRecord;
use thiserror::Error;

use self::fields::{ENTITY, GAUGE_FIELDS, MIN_ROW_WIDTH, SUB_ENTITY};

/// Lines starting with this byte are ignored, including the header line.
pub const COMMENT: u8 = b'#';

/// Character in proxy names that clashes with the statsd/graphite namespace.
pub const SEPARATOR: char = ':';

/// Replacement for [`SEPARATOR`] in metric names.
pub const SUBSTITUTE: &str = ".";

/// Errors that can occur while decoding a report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("reading report: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: row has {width} fields, at least {required} required")]
    ShortRow {
        line: u64,
        width: usize,
        required: usize,
    },
}

/// One raw value taken from a report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Field key from the column table (e.g. `scur`).
    pub key: &'static str,
    /// Value as it appeared in the report, possibly empty.
    pub raw: String,
}

/// Named view of one data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRecord {
    /// Proxy name with separators already replaced.
    pub entity: String,
    /// Service name, as reported.
    pub sub_entity: String,
    /// Gauge columns in table order.
    pub observations: Vec<Observation>,
}

impl MetricRecord {
    /// Extracts the tracked columns from a parsed CSV row.
    pub fn from_row(row: &StringRecord) -> Result<Self, ReportError> {
        if row.len() < MIN_ROW_WIDTH {
            return Err(ReportError::ShortRow {
                line: row.position().map_or(0, |p| p.line()),
                width: row.len(),
                required: MIN_ROW_WIDTH,
            });
        }

        // Width was checked against the highest column in the table.
        let column = |index: usize| row.get(index).unwrap_or_default();

        let observations = GAUGE_FIELDS
            .iter()
            .map(|field| Observation {
                key: field.key,
                raw: column(field.column).to_string(),
            })
            .collect();

        Ok(Self {
            entity: sanitize_entity(column(ENTITY.column)),
            sub_entity: column(SUB_ENTITY.column).to_string(),
            observations,
        })
    }
}

/// Makes a proxy name safe to use as a metric name segment.
pub fn sanitize_entity(name: &str) -> String {
    name.replace(SEPARATOR, SUBSTITUTE)
}

/// Response body of one stats poll.
#[derive(Debug, Clone, Default)]
pub struct RawReport {
    body: Vec<u8>,
}

impl RawReport {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }

    /// Body size in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Returns a lazy iterator over the data rows of the report.
    pub fn records(&self) -> Records<'_> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(COMMENT))
            .flexible(true)
            .from_reader(self.body.as_slice());

        Records {
            inner: reader.into_records(),
        }
    }
}

/// Iterator returned by [`RawReport::records`].
pub struct Records<'a> {
    inner: csv::StringRecordsIntoIter<&'a [u8]>,
}

impl Iterator for Records<'_> {
    type Item = Result<MetricRecord, ReportError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.inner.next()?;
        Some(
            row.map_err(ReportError::from)
                .and_then(|row| MetricRecord::from_row(&row)),
        )
    }
}
