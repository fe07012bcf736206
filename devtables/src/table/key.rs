//! Record keys.

use std::fmt;

use serde::{Serialize, Serializer};

/// The value(s) identifying one record of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// A single key value.
    Name(String),
    /// One entry per key component; a component the record lacks is `None`.
    Composite(Vec<Option<String>>),
    /// The record has no key value at all.
    Absent,
}

impl Key {
    /// Build a composite key from present components.
    pub fn composite<S: Into<String>>(parts: impl IntoIterator<Item = S>) -> Self {
        Key::Composite(parts.into_iter().map(|p| Some(p.into())).collect())
    }

    /// Check if a record with this key answers a lookup for `query`.
    ///
    /// A plain name also matches a composite key whose first component is
    /// that name.
    pub fn matches(&self, query: &Key) -> bool {
        match (self, query) {
            (Key::Composite(parts), Key::Name(name)) => {
                parts.first().and_then(Option::as_deref) == Some(name.as_str())
            }
            _ => self == query,
        }
    }

    /// The key text of a single-valued key.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Composite(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(part.as_deref().unwrap_or("None"))?;
                }
                f.write_str(")")
            }
            Key::Absent => f.write_str("None"),
        }
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Key::Name(name) => serializer.serialize_str(name),
            Key::Composite(parts) => parts.serialize(serializer),
            Key::Absent => serializer.serialize_none(),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<(&str, &str)> for Key {
    fn from((a, b): (&str, &str)) -> Self {
        Key::composite([a, b])
    }
}

impl From<(&str, &str, &str)> for Key {
    fn from((a, b, c): (&str, &str, &str)) -> Self {
        Key::composite([a, b, c])
    }
}
