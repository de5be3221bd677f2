//! Column layout of the HAProxy 1.5 CSV stats export.
//!
//! Only the columns listed here are read; everything else in a row is
//! ignored. The order of [`GAUGE_FIELDS`] is the emission order.

/// A named column of the stats export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Metric key, used as the last segment of the metric name.
    pub key: &'static str,
    /// Zero-based column index.
    pub column: usize,
}

impl Field {
    const fn new(key: &'static str, column: usize) -> Self {
        Self { key, column }
    }
}

/// Proxy name (frontend, backend or listener).
pub const ENTITY: Field = Field::new("pxname", 0);

/// Service name (server, or FRONTEND/BACKEND aggregate row).
pub const SUB_ENTITY: Field = Field::new("svname", 1);

/// Numeric columns exported as gauges.
pub const GAUGE_FIELDS: [Field; 16] = [
    Field::new("scur", 4),
    Field::new("smax", 5),
    Field::new("bin", 8),
    Field::new("bout", 9),
    Field::new("ereq", 12),
    Field::new("econ", 13),
    Field::new("rate", 33),
    Field::new("hrsp_1xx", 39),
    Field::new("hrsp_2xx", 40),
    Field::new("hrsp_3xx", 41),
    Field::new("hrsp_4xx", 42),
    Field::new("hrsp_5xx", 43),
    Field::new("qtime", 58),
    Field::new("ctime", 59),
    Field::new("rtime", 60),
    Field::new("ttime", 61),
];

/// Minimum number of columns a data row must have.
pub const MIN_ROW_WIDTH: usize = min_row_width();

const fn min_row_width() -> usize {
    let mut max = if ENTITY.column > SUB_ENTITY.column {
        ENTITY.column
    } else {
        SUB_ENTITY.column
    };

    let mut i = 0;
    while i < GAUGE_FIELDS.len() {
        if GAUGE_FIELDS[i].column > max {
            max = GAUGE_FIELDS[i].column;
        }
        i += 1;
    }

    max + 1
}
