//! Fluent field specification builder.

use std::sync::Arc;

use indexmap::IndexMap;
use log::warn;

use super::{Cardinality, Coercion, FieldKind, FieldOptions, FieldSpec, TableSchema};
use crate::document::Expr;
use crate::error::{ExprError, SchemaError};

/// Fields of a view, in declaration order.
pub type Fields = IndexMap<String, FieldSpec>;

/// Builder accumulating named field descriptors.
///
/// Registering a name twice replaces the earlier field (last write wins)
/// and logs a warning.
///
/// # Example
///
/// ```rust
/// use devtables::schema::FieldsBuilder;
///
/// let fields = FieldsBuilder::new()
///     .str("name", "name")
///     .int("mtu", "mtu")
///     .flag("admin_up", "if-config-flags/iff-up")
///     .group("mac_stats")
///     .int("rx_bytes", "input-bytes")
///     .end()
///     .unwrap();
///
/// assert_eq!(fields.len(), 4);
/// assert_eq!(fields["rx_bytes"].group.as_deref(), Some("mac_stats"));
/// ```
#[derive(Debug, Default)]
pub struct FieldsBuilder {
    fields: Fields,
    group: Option<String>,
    error: Option<(String, ExprError)>,
}

impl FieldsBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string field.
    pub fn str(self, name: &str, xpath: &str) -> Self {
        self.astype(name, xpath, Coercion::Str)
    }

    /// Add an integer field.
    pub fn int(self, name: &str, xpath: &str) -> Self {
        self.astype(name, xpath, Coercion::Int)
    }

    /// Add a float field.
    pub fn float(self, name: &str, xpath: &str) -> Self {
        self.astype(name, xpath, Coercion::Float)
    }

    /// Add an existence-as-boolean field.
    pub fn flag(self, name: &str, xpath: &str) -> Self {
        self.astype(name, xpath, Coercion::Flag)
    }

    /// Add a field with an explicit coercion.
    pub fn astype(mut self, name: &str, xpath: &str, coercion: Coercion) -> Self {
        match Expr::parse(xpath) {
            Ok(expr) => {
                let mut spec = FieldSpec::projection(name, expr, coercion);
                spec.group = self.group.clone();
                self.insert(spec);
            }
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some((name.to_string(), e));
                }
            }
        }
        self
    }

    /// Add a nested-table field.
    pub fn table(mut self, name: &str, table: Arc<TableSchema>) -> Self {
        let mut spec = FieldSpec::table(name, table);
        spec.group = self.group.clone();
        self.insert(spec);
        self
    }

    /// Extract subsequent fields through the named group.
    pub fn group(mut self, name: &str) -> Self {
        self.group = Some(name.to_string());
        self
    }

    /// Extract subsequent fields from the record node again.
    pub fn ungroup(mut self) -> Self {
        self.group = None;
        self
    }

    /// Require the named field to match at most one node.
    pub fn single(mut self, name: &str) -> Self {
        if let Some(FieldSpec {
            kind: FieldKind::Projection { cardinality, .. },
            ..
        }) = self.fields.get_mut(name)
        {
            *cardinality = Cardinality::Single;
        }
        self
    }

    /// Attach write-side options to the named field.
    pub fn options(mut self, name: &str, options: FieldOptions) -> Self {
        if let Some(spec) = self.fields.get_mut(name) {
            spec.options = options;
        }
        self
    }

    /// Seal the builder.
    ///
    /// Fails with the first expression that did not parse.
    pub fn end(self) -> Result<Fields, SchemaError> {
        match self.error {
            Some((field, source)) => Err(SchemaError::InvalidExpr {
                owner: field,
                source,
            }),
            None => Ok(self.fields),
        }
    }

    fn insert(&mut self, spec: FieldSpec) {
        if let Some(previous) = self.fields.insert(spec.name.clone(), spec) {
            warn!("field '{}' registered twice, keeping the later one", previous.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableKind;

    #[test]
    fn test_chained_fields() {
        let fields = FieldsBuilder::new()
            .str("name", "name")
            .int("mtu", "mtu")
            .float("load", "load-average")
            .flag("up", "iff-up")
            .end()
            .unwrap();

        let names: Vec<_> = fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["name", "mtu", "load", "up"]);
        assert_eq!(fields["mtu"].coercion().unwrap().type_name(), "int");
        assert!(fields["up"].coercion().unwrap().is_flag());
    }

    #[test]
    fn test_last_write_wins() {
        let fields = FieldsBuilder::new()
            .str("mtu", "mtu")
            .int("mtu", "link-level-mtu")
            .end()
            .unwrap();

        assert_eq!(fields.len(), 1);
        assert_eq!(fields["mtu"].expr().unwrap().as_str(), "link-level-mtu");
        assert_eq!(fields["mtu"].coercion().unwrap().type_name(), "int");
    }

    #[test]
    fn test_groups_and_ungroup() {
        let fields = FieldsBuilder::new()
            .group("traffic")
            .int("rx", "input-packets")
            .ungroup()
            .str("name", "name")
            .end()
            .unwrap();

        assert_eq!(fields["rx"].group.as_deref(), Some("traffic"));
        assert!(fields["name"].group.is_none());
    }

    #[test]
    fn test_nested_table_and_single() {
        let child = Arc::new(TableSchema::new("LogicalTable", TableKind::Rpc, ""));
        let fields = FieldsBuilder::new()
            .table("logical", child)
            .str("name", "name")
            .single("name")
            .end()
            .unwrap();

        assert!(matches!(fields["logical"].kind, FieldKind::Table(_)));
        assert!(matches!(
            fields["name"].kind,
            FieldKind::Projection { cardinality: Cardinality::Single, .. }
        ));
    }

    #[test]
    fn test_invalid_expression_reported_at_end() {
        let err = FieldsBuilder::new()
            .str("ok", "name")
            .str("broken", "a[")
            .end()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidExpr { ref owner, .. } if owner == "broken"));
    }
}
