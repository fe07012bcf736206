//! Columnar text parsing.
//!
//! Many operational commands only produce human-formatted output. The
//! [`StateMachine`] turns such output into keyed rows shaped like the
//! records an XML view would produce:
//!
//! ```text
//! Name      Status    Errors          <- header: the first line holding every label
//! --------  --------  ------          <- separator lines are skipped
//! link-1    up        0               <- cells split on runs of 2+ spaces
//! link-2    down      12
//! Total     2 links   n/a             <- shape change: parsing stops here
//! ```

mod terminator;

pub use terminator::{EndMarker, Terminator, TypeHomogeneity};

use std::sync::LazyLock;

use indexmap::IndexMap;
use log::{debug, trace};
use regex::Regex;

use crate::table::Key;
use crate::value::Scalar;

static CELL_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("static regex"));

/// Parsing rules for one text table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextTableSpec {
    /// Parsing starts after the first line containing this text.
    pub title: Option<String>,

    /// Field name to header label.
    pub columns: IndexMap<String, String>,

    /// Key columns (field names or labels); empty means the leftmost column.
    pub key: Vec<String>,

    /// Parse `key<delimiter>value` lines into a single record instead of
    /// columns.
    pub delimiter: Option<String>,

    /// Keep only these fields; empty keeps all.
    pub filters: Vec<String>,

    /// Keep only rows with these keys; empty keeps all.
    pub key_items: Vec<String>,

    /// Stop at the first line containing this text instead of using the
    /// type-homogeneity heuristic.
    pub end_marker: Option<String>,
}

impl TextTableSpec {
    /// Create a column spec from `(field, label)` pairs.
    pub fn with_columns<I, F, L>(columns: I) -> Self
    where
        I: IntoIterator<Item = (F, L)>,
        F: Into<String>,
        L: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(f, l)| (f.into(), l.into()))
                .collect(),
            ..Default::default()
        }
    }

    /// Set the key columns.
    pub fn with_key<S: Into<String>>(mut self, key: impl IntoIterator<Item = S>) -> Self {
        self.key = key.into_iter().map(Into::into).collect();
        self
    }

    /// Set the title line.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the end marker.
    pub fn with_end_marker(mut self, marker: impl Into<String>) -> Self {
        self.end_marker = Some(marker.into());
        self
    }
}

/// One parsed record.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRow {
    /// Record key.
    pub key: Key,

    /// Field name to value, integer-like cells converted.
    pub values: IndexMap<String, Scalar>,
}

/// Reconstructs records from columnar command output.
pub struct StateMachine<'s> {
    spec: &'s TextTableSpec,
    record_key: Option<String>,
    terminator: Box<dyn Terminator>,
}

impl<'s> StateMachine<'s> {
    /// Create a parser for `spec`.
    ///
    /// Uses [`EndMarker`] when the table declares an end marker, [`TypeHomogeneity`]
    /// otherwise.
    pub fn new(spec: &'s TextTableSpec) -> Self {
        let terminator: Box<dyn Terminator> = match &spec.end_marker {
            Some(marker) => Box::new(EndMarker::new(marker.clone())),
            None => Box::new(TypeHomogeneity::new()),
        };
        Self {
            spec,
            record_key: None,
            terminator,
        }
    }

    /// Replace the end-of-table policy.
    pub fn with_terminator(mut self, terminator: impl Terminator + 'static) -> Self {
        self.terminator = Box::new(terminator);
        self
    }

    /// Key given to the single record produced in delimiter mode.
    pub fn with_record_key(mut self, key: impl Into<String>) -> Self {
        self.record_key = Some(key.into());
        self
    }

    /// Parse command output.
    ///
    /// Output without a recognisable header yields no rows.
    pub fn parse(mut self, text: &str) -> Vec<TextRow> {
        let lines: Vec<&str> = text.lines().collect();

        let start = match &self.spec.title {
            Some(title) => match lines.iter().position(|l| l.contains(title.as_str())) {
                Some(pos) => pos + 1,
                None => {
                    debug!("title '{}' not found in output", title);
                    return Vec::new();
                }
            },
            None => 0,
        };
        let body = &lines[start..];

        let mut rows = if self.spec.delimiter.is_some() {
            self.parse_delimited(body)
        } else {
            self.parse_columns(body)
        };

        if !self.spec.key_items.is_empty() {
            rows.retain(|row| match &row.key {
                Key::Name(name) => self.spec.key_items.iter().any(|k| k == name),
                _ => false,
            });
        }
        rows
    }

    fn parse_columns(&mut self, body: &[&str]) -> Vec<TextRow> {
        let spec = self.spec;
        if spec.columns.is_empty() {
            return Vec::new();
        }

        let Some(header_idx) = body
            .iter()
            .position(|line| spec.columns.values().all(|label| line.contains(label.as_str())))
        else {
            debug!("no header line holds all of {:?}", spec.columns.values().collect::<Vec<_>>());
            return Vec::new();
        };
        let header = body[header_idx];

        // Left-to-right order on the header decides which cell is which.
        let mut order: Vec<(usize, &str)> = spec
            .columns
            .iter()
            .map(|(field, label)| (header.find(label.as_str()).unwrap_or(0), field.as_str()))
            .collect();
        order.sort_by_key(|(offset, _)| *offset);
        trace!("column order: {:?}", order);

        let mut rows = Vec::new();
        for line in &body[header_idx + 1..] {
            if line.trim().is_empty() {
                break;
            }
            if is_separator(line) {
                continue;
            }

            let cells: Vec<&str> = CELL_SPLIT.split(line.trim()).collect();
            let shaped = (cells.len() == order.len()).then_some(cells.as_slice());
            if self.terminator.is_end(line, shaped) {
                trace!("end of table at {:?}", line);
                break;
            }
            if shaped.is_none() {
                trace!("skipping line with {} cells: {:?}", cells.len(), line);
                continue;
            }

            let values: IndexMap<String, Scalar> = order
                .iter()
                .zip(&cells)
                .map(|((_, field), cell)| (field.to_string(), Scalar::parse_loose(cell)))
                .collect();
            let key = self.key_for(&values, &order);
            rows.push(TextRow {
                key,
                values: self.filtered(values),
            });
        }
        rows
    }

    fn parse_delimited(&mut self, body: &[&str]) -> Vec<TextRow> {
        let delimiter = self.spec.delimiter.as_deref().unwrap_or(":");
        let mut values = IndexMap::new();

        for line in body {
            if self.terminator.is_end(line, None) {
                break;
            }
            let Some((name, value)) = line.split_once(delimiter) else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            values.insert(name.to_string(), Scalar::parse_loose(value));
        }

        if values.is_empty() {
            return Vec::new();
        }
        let key = self.record_key.clone().map_or(Key::Absent, Key::Name);
        vec![TextRow {
            key,
            values: self.filtered(values),
        }]
    }

    fn key_for(&self, values: &IndexMap<String, Scalar>, order: &[(usize, &str)]) -> Key {
        let lookup = |name: &str| -> Option<String> {
            values
                .get(name)
                .or_else(|| {
                    self.spec
                        .columns
                        .iter()
                        .find(|(_, label)| label.as_str() == name)
                        .and_then(|(field, _)| values.get(field))
                })
                .map(Scalar::to_text)
        };

        match self.spec.key.as_slice() {
            [] => order
                .first()
                .and_then(|(_, field)| lookup(field))
                .map_or(Key::Absent, Key::Name),
            [single] => lookup(single).map_or(Key::Absent, Key::Name),
            many => Key::Composite(many.iter().map(|k| lookup(k)).collect()),
        }
    }

    fn filtered(&self, mut values: IndexMap<String, Scalar>) -> IndexMap<String, Scalar> {
        if !self.spec.filters.is_empty() {
            values.retain(|field, _| self.spec.filters.contains(field));
        }
        values
    }
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.chars().all(|c| c == '-' || c == '=' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_spec() -> TextTableSpec {
        TextTableSpec::with_columns([("name", "Name"), ("status", "Status"), ("errors", "Errors")])
            .with_key(["name"])
    }

    #[test]
    fn test_basic_columns() {
        let output = "\
PPP LINK STATISTICS
Name      Status    Errors
--------  --------  ------
link-1    up        0
link-2    down      12
";
        let spec = link_spec();
        let rows = StateMachine::new(&spec).parse(output);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, Key::Name("link-1".into()));
        assert_eq!(rows[0].values["status"], Scalar::Str("up".into()));
        assert_eq!(rows[1].values["errors"], Scalar::Int(12));
    }

    #[test]
    fn test_header_order_follows_offsets() {
        let output = "STATUS  NAME\nup      ge-0/0/0\ndown    ge-0/0/1\n";
        let spec = TextTableSpec::with_columns([("name", "NAME"), ("status", "STATUS")]).with_key(["name"]);
        let rows = StateMachine::new(&spec).parse(output);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values["status"], Scalar::Str("up".into()));
        assert_eq!(rows[0].values["name"], Scalar::Str("ge-0/0/0".into()));
        assert_eq!(rows[1].key, Key::Name("ge-0/0/1".into()));
    }

    #[test]
    fn test_shape_change_ends_table() {
        let output = "\
Name      Status    Errors
link-1    up        0
link-2    down      12
Total     2 links   n/a
";
        let spec = link_spec();
        let rows = StateMachine::new(&spec).parse(output);
        let keys: Vec<_> = rows.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![Key::Name("link-1".into()), Key::Name("link-2".into())]);
    }

    #[test]
    fn test_blank_line_ends_table() {
        let output = "Name    Status  Errors\nlink-1  up      0\n\nlink-2  down    1\n";
        let spec = link_spec();
        assert_eq!(StateMachine::new(&spec).parse(output).len(), 1);
    }

    #[test]
    fn test_cells_keep_single_spaces() {
        let output = "Name      Status       Errors\nlink-1    admin down   3\n";
        let spec = link_spec();
        let rows = StateMachine::new(&spec).parse(output);
        assert_eq!(rows[0].values["status"], Scalar::Str("admin down".into()));
    }

    #[test]
    fn test_no_header_is_empty() {
        let spec = link_spec();
        assert!(StateMachine::new(&spec).parse("error: command not found\n").is_empty());
        assert!(StateMachine::new(&spec).parse("").is_empty());
    }

    #[test]
    fn test_title_and_end_marker() {
        let output = "\
Name  Status  Errors
junk  junk    1
LINKS
Name      Status    Errors
link-1    up        0
Total     3         4
{master}
link-9    up        0
";
        let spec = link_spec().with_title("LINKS").with_end_marker("{master}");
        let rows = StateMachine::new(&spec).parse(output);
        // the end marker replaces the shape heuristic, so the total row stays
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].key, Key::Name("Total".into()));
    }

    #[test]
    fn test_custom_terminator() {
        struct FirstRowOnly(bool);
        impl Terminator for FirstRowOnly {
            fn is_end(&mut self, _line: &str, fields: Option<&[&str]>) -> bool {
                if fields.is_some() {
                    let seen = self.0;
                    self.0 = true;
                    return seen;
                }
                false
            }
        }

        let output = "Name    Status  Errors\nlink-1  up      0\nlink-2  up      0\n";
        let spec = link_spec();
        let rows = StateMachine::new(&spec)
            .with_terminator(FirstRowOnly(false))
            .parse(output);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_composite_key_filters_and_key_items() {
        let output = "\
Slot  Port  State   Speed
0     1     up      1000
0     2     down    1000
1     1     up      10000
";
        let mut spec = TextTableSpec::with_columns([
            ("slot", "Slot"),
            ("port", "Port"),
            ("state", "State"),
            ("speed", "Speed"),
        ])
        .with_key(["Slot", "port"]);
        spec.filters = vec!["state".into()];

        let rows = StateMachine::new(&spec).parse(output);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[2].key,
            Key::Composite(vec![Some("1".into()), Some("1".into())])
        );
        assert_eq!(rows[2].values.len(), 1);
        assert!(rows[2].values.contains_key("state"));

        let mut spec = link_spec();
        spec.key_items = vec!["link-2".into()];
        let rows = StateMachine::new(&spec).parse("Name    Status  Errors\nlink-1  up      0\nlink-2  up      0\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, Key::Name("link-2".into()));
    }

    #[test]
    fn test_delimited_record() {
        let output = "\
Chassis summary
  Model: mx960
  Uptime: 12 days
  Temperature: 41
  no delimiter here
";
        let spec = TextTableSpec {
            title: Some("Chassis summary".into()),
            delimiter: Some(":".into()),
            ..Default::default()
        };
        let rows = StateMachine::new(&spec).with_record_key("ChassisTable").parse(output);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, Key::Name("ChassisTable".into()));
        assert_eq!(rows[0].values["Model"], Scalar::Str("mx960".into()));
        assert_eq!(rows[0].values["Temperature"], Scalar::Int(41));
    }
}
