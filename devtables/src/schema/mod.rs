//! Table and view schemas.
//!
//! Schemas are immutable once built. They are usually produced by the
//! [`SchemaCatalog`] loader from a YAML catalog, but can also be assembled in
//! code with [`FieldsBuilder`] and the `with_*` methods below.

mod coercion;
mod fields;
mod loader;

pub use coercion::{Coercion, CustomCoercion, Matcher};
pub use fields::{Fields, FieldsBuilder};
pub use loader::{CatalogBuilder, SchemaCatalog};

use std::sync::Arc;

use indexmap::IndexMap;

use crate::document::Expr;
use crate::error::ExprError;
use crate::source::ArgValue;
use crate::text::TextTableSpec;
use crate::value::Scalar;

/// How many matches a projection field may produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cardinality {
    /// One match is a scalar, several are a list.
    #[default]
    Auto,
    /// More than one match is an error.
    Single,
}

/// Write-side constraints for fields of writable tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOptions {
    /// Value reported when nothing matched.
    pub default: Option<Scalar>,

    /// Smallest accepted integer value.
    pub min_value: Option<i64>,

    /// Largest accepted integer value.
    pub max_value: Option<i64>,

    /// Accepted values; empty means anything.
    pub allowed: Vec<String>,
}

/// What a field is computed from.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Evaluate an expression and coerce the matched text.
    Projection {
        expr: Expr,
        coercion: Coercion,
        cardinality: Cardinality,
    },
    /// A nested table projected from the record's node.
    Table(Arc<TableSchema>),
}

/// One named field of a view.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,

    /// Projection or nested table.
    pub kind: FieldKind,

    /// Group the field is extracted through, if any.
    pub group: Option<String>,

    /// Write-side options.
    pub options: FieldOptions,
}

impl FieldSpec {
    /// Create a projection field.
    pub fn projection(name: impl Into<String>, expr: Expr, coercion: Coercion) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Projection {
                expr,
                coercion,
                cardinality: Cardinality::Auto,
            },
            group: None,
            options: FieldOptions::default(),
        }
    }

    /// Create a nested-table field.
    pub fn table(name: impl Into<String>, table: Arc<TableSchema>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Table(table),
            group: None,
            options: FieldOptions::default(),
        }
    }

    /// The coercion of a projection field.
    pub fn coercion(&self) -> Option<&Coercion> {
        match &self.kind {
            FieldKind::Projection { coercion, .. } => Some(coercion),
            FieldKind::Table(_) => None,
        }
    }

    /// The expression of a projection field.
    pub fn expr(&self) -> Option<&Expr> {
        match &self.kind {
            FieldKind::Projection { expr, .. } => Some(expr),
            FieldKind::Table(_) => None,
        }
    }
}

/// Named fields plus the groups they may be extracted through.
#[derive(Debug, Clone, Default)]
pub struct ViewSchema {
    /// View name.
    pub name: String,

    /// Fields in declaration order (inherited fields first).
    pub fields: Fields,

    /// Group name to locator, evaluated from the record node.
    pub groups: IndexMap<String, Expr>,

    /// Name of the view this one extends, if any.
    pub extends: Option<String>,
}

impl ViewSchema {
    /// Create a view from its fields.
    pub fn new(name: impl Into<String>, fields: Fields) -> Self {
        Self {
            name: name.into(),
            fields,
            groups: IndexMap::new(),
            extends: None,
        }
    }

    /// Declare a group.
    pub fn with_group(mut self, name: impl Into<String>, locator: &str) -> Result<Self, ExprError> {
        self.groups.insert(name.into(), Expr::parse(locator)?);
        Ok(self)
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }
}

/// The kind of command a table is fetched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Operational RPC returning an XML document.
    Rpc,
    /// Configuration retrieval (`get`) and optionally writes (`set`).
    Config,
    /// CLI command returning columnar text.
    Command,
}

/// How each record's key is extracted.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyLocator {
    /// One expression.
    Single(Expr),
    /// One expression per key component.
    Composite(Vec<Expr>),
}

impl Default for KeyLocator {
    fn default() -> Self {
        KeyLocator::Single(Expr::parse("name").expect("static expression"))
    }
}

/// Where a writable table lives in the configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSpec {
    /// Path from the configuration root to the item element.
    pub path: Vec<String>,

    /// View field holding the item's identity.
    pub key_field: String,
}

/// How to fetch one kind of record and project it.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Fetch flavour.
    pub kind: TableKind,

    /// RPC name, configuration path or CLI command.
    pub command: String,

    /// Default fetch arguments.
    pub args: IndexMap<String, ArgValue>,

    /// Argument receiving a scalar key passed to `get()`.
    pub args_key: Option<String>,

    /// Element name to the key leaves the caller must supply.
    pub required_keys: IndexMap<String, Vec<String>>,

    /// Locates the items, relative to the document (or parent) node.
    pub item: Option<Expr>,

    /// Extracts each item's key.
    pub key: KeyLocator,

    /// Field projection for each item.
    pub view: Option<Arc<ViewSchema>>,

    /// Target (for example an FPC) a CLI command runs on.
    pub target: Option<String>,

    /// Columnar text parsing rules for command tables.
    pub text: Option<TextTableSpec>,

    /// Write location for writable configuration tables.
    pub write: Option<WriteSpec>,
}

impl TableSchema {
    /// Create a table with no item locator and the default key.
    pub fn new(name: impl Into<String>, kind: TableKind, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            command: command.into(),
            args: IndexMap::new(),
            args_key: None,
            required_keys: IndexMap::new(),
            item: None,
            key: KeyLocator::default(),
            view: None,
            target: None,
            text: None,
            write: None,
        }
    }

    /// Set the item locator.
    pub fn with_item(mut self, item: &str) -> Result<Self, ExprError> {
        self.item = Some(Expr::parse(item)?);
        Ok(self)
    }

    /// Set a single key expression.
    pub fn with_key(mut self, key: &str) -> Result<Self, ExprError> {
        self.key = KeyLocator::Single(Expr::parse(key)?);
        Ok(self)
    }

    /// Set a composite key.
    pub fn with_composite_key(mut self, keys: &[&str]) -> Result<Self, ExprError> {
        let exprs = keys.iter().map(|k| Expr::parse(k)).collect::<Result<_, _>>()?;
        self.key = KeyLocator::Composite(exprs);
        Ok(self)
    }

    /// Add a default fetch argument.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// Set the argument receiving a scalar key.
    pub fn with_args_key(mut self, name: impl Into<String>) -> Self {
        self.args_key = Some(name.into());
        self
    }

    /// Require key leaves under an element of the configuration path.
    pub fn with_required_key(mut self, element: impl Into<String>, leaf: impl Into<String>) -> Self {
        self.required_keys
            .entry(element.into())
            .or_default()
            .push(leaf.into());
        self
    }

    /// Set the view.
    pub fn with_view(mut self, view: Arc<ViewSchema>) -> Self {
        self.view = Some(view);
        self
    }

    /// Set the text parsing rules.
    pub fn with_text(mut self, text: TextTableSpec) -> Self {
        self.text = Some(text);
        self
    }

    /// Make the table writable at `path` (slash separated).
    pub fn with_write(mut self, path: &str, key_field: impl Into<String>) -> Self {
        self.write = Some(WriteSpec {
            path: split_path(path),
            key_field: key_field.into(),
        });
        self
    }

    /// Names of all required key leaves, in declaration order.
    pub fn required_key_names(&self) -> impl Iterator<Item = &str> {
        self.required_keys.values().flatten().map(String::as_str)
    }
}

/// Split a `a/b/c` configuration path into its steps.
pub(crate) fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder() {
        let table = TableSchema::new("RouteTable", TableKind::Rpc, "get-route-information")
            .with_item("route-table/rt")
            .unwrap()
            .with_composite_key(&["rt-destination", "rt-entry/protocol-name"])
            .unwrap()
            .with_arg("extensive", true)
            .with_args_key("destination");

        assert_eq!(table.item.as_ref().unwrap().as_str(), "route-table/rt");
        assert!(matches!(table.key, KeyLocator::Composite(ref k) if k.len() == 2));
        assert_eq!(table.args.get("extensive"), Some(&ArgValue::Flag(true)));
        assert_eq!(table.args_key.as_deref(), Some("destination"));
    }

    #[test]
    fn test_default_key_is_name() {
        let table = TableSchema::new("T", TableKind::Rpc, "rpc");
        assert_eq!(table.key, KeyLocator::Single(Expr::parse("name").unwrap()));
    }

    #[test]
    fn test_required_key_names() {
        let table = TableSchema::new("PolicyTable", TableKind::Config, "security/policies/policy")
            .with_required_key("policy", "from-zone-name")
            .with_required_key("policy", "to-zone-name");
        let names: Vec<_> = table.required_key_names().collect();
        assert_eq!(names, vec!["from-zone-name", "to-zone-name"]);
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("system/login/user"), vec!["system", "login", "user"]);
        assert_eq!(split_path("/system//login/"), vec!["system", "login"]);
    }
}
