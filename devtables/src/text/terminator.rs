//! End-of-table detection for columnar text.
//!
//! Device output rarely marks where a table ends. The default policy
//! stops when the integer/non-integer shape of consecutive rows changes,
//! which catches trailing summary lines but is a heuristic: a column that
//! is legitimately mixed will cut the table short. Schemas that know their
//! output can declare an explicit end marker instead.

/// Decides when row parsing stops.
pub trait Terminator {
    /// Called for every line after the header.
    ///
    /// `fields` is `Some` when the line split into as many fields as the
    /// table has columns. Returning `true` ends parsing before this line.
    fn is_end(&mut self, line: &str, fields: Option<&[&str]>) -> bool;
}

/// Stop when the pattern of integer-like columns changes between rows.
#[derive(Debug, Default)]
pub struct TypeHomogeneity {
    previous: Option<Vec<bool>>,
}

impl TypeHomogeneity {
    /// Create a fresh detector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Terminator for TypeHomogeneity {
    fn is_end(&mut self, _line: &str, fields: Option<&[&str]>) -> bool {
        let Some(fields) = fields else {
            return false;
        };

        let shape: Vec<bool> = fields.iter().map(|f| is_int_like(f)).collect();
        match &self.previous {
            Some(previous) if *previous != shape => true,
            _ => {
                self.previous = Some(shape);
                false
            }
        }
    }
}

/// Stop at the first line containing a marker string.
#[derive(Debug, Clone)]
pub struct EndMarker {
    marker: String,
}

impl EndMarker {
    /// Create a marker terminator.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Terminator for EndMarker {
    fn is_end(&mut self, line: &str, _fields: Option<&[&str]>) -> bool {
        line.contains(&self.marker)
    }
}

/// Check if a cell parses as a signed integer.
pub(crate) fn is_int_like(cell: &str) -> bool {
    cell.trim().parse::<i64>().is_ok()
}
