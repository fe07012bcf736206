//! YAML schema catalog loader.
//!
//! A catalog is a mapping of names to table or view declarations:
//!
//! ```yaml
//! PhyPortTable:
//!   rpc: get-interface-information
//!   args:
//!     interface_name: '[afgxe][et]-*'
//!   args_key: interface_name
//!   item: physical-interface
//!   view: PhyPortView
//!
//! PhyPortView:
//!   groups:
//!     mac_stats: ethernet-mac-statistics
//!   fields:
//!     oper: oper-status
//!     mtu: { mtu: int }
//!     running: { if-device-flags/ifdf-running: flag }
//!     auto: { auto-negotiation: True=enabled }
//!   fields_mac_stats:
//!     rx_bytes: { input-bytes: int }
//! ```
//!
//! An entry with one of `rpc`, `get`, `set` or `command` (or extending such
//! an entry) is a table; anything else is a view. Every entry is resolved
//! when the catalog is built, so a broken reference or a cycle is reported
//! before any device is contacted.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};
use serde::Deserialize;
use serde_yaml::{Mapping, Value as Yaml};

use super::{
    Coercion, FieldOptions, FieldSpec, Fields, KeyLocator, TableKind, TableSchema, ViewSchema,
    WriteSpec, split_path,
};
use crate::document::Expr;
use crate::error::SchemaError;
use crate::source::{ArgValue, DocumentSource};
use crate::table::Table;
use crate::text::TextTableSpec;
use crate::value::Scalar;

/// Keys that make a declaration a table.
const TABLE_MARKERS: &[&str] = &["rpc", "get", "set", "command"];

/// Resolved, immutable table and view schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    tables: IndexMap<String, Arc<TableSchema>>,
    views: IndexMap<String, Arc<ViewSchema>>,
}

impl SchemaCatalog {
    /// Load a catalog from YAML (or JSON) text.
    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        Self::builder().yaml(text)?.build()
    }

    /// Load a catalog from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Self::builder().file(path)?.build()
    }

    /// Start a catalog assembled from several sources.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Get a table schema.
    pub fn table_schema(&self, name: &str) -> Result<Arc<TableSchema>, SchemaError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::NotFound {
                name: name.to_string(),
            })
    }

    /// Get a view schema.
    pub fn view_schema(&self, name: &str) -> Result<Arc<ViewSchema>, SchemaError> {
        self.views
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::NotFound {
                name: name.to_string(),
            })
    }

    /// Create an empty table bound to `source`.
    pub fn table(&self, name: &str, source: Arc<dyn DocumentSource>) -> Result<Table, SchemaError> {
        Ok(Table::new(self.table_schema(name)?, source))
    }

    /// Table names in declaration order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// View names in declaration order.
    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.keys().map(String::as_str)
    }
}

/// Collects raw declarations from one or more catalog sources.
///
/// A later declaration with the same name replaces the earlier one.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    raw: IndexMap<String, Yaml>,
}

impl CatalogBuilder {
    /// Add declarations from YAML (or JSON) text.
    pub fn yaml(mut self, text: &str) -> Result<Self, SchemaError> {
        let doc: Yaml = serde_yaml::from_str(text)?;
        let entries = match doc {
            Yaml::Null => Mapping::new(),
            Yaml::Mapping(m) => m,
            _ => {
                return Err(SchemaError::MalformedDeclaration {
                    name: "<catalog>".to_string(),
                    message: "top level must be a mapping of names to declarations".to_string(),
                });
            }
        };

        for (key, decl) in entries {
            let Some(name) = key.as_str() else {
                return Err(SchemaError::MalformedDeclaration {
                    name: format!("{:?}", key),
                    message: "declaration names must be strings".to_string(),
                });
            };
            if self.raw.insert(name.to_string(), decl).is_some() {
                warn!("'{}' declared again, keeping the later declaration", name);
            }
        }
        Ok(self)
    }

    /// Add declarations from a YAML file.
    pub fn file(self, path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.yaml(&text)
    }

    /// Resolve every declaration.
    pub fn build(self) -> Result<SchemaCatalog, SchemaError> {
        let mut loader = Loader::new(&self.raw);
        for name in self.raw.keys() {
            if loader.is_table(name) {
                loader.table(name, name)?;
            } else {
                loader.view(name, name)?;
            }
        }

        // Keep declaration order; referenced entries resolve out of order.
        let mut catalog = SchemaCatalog::default();
        for name in self.raw.keys() {
            if let Some(table) = loader.tables.swap_remove(name) {
                catalog.tables.insert(name.clone(), table);
            } else if let Some(view) = loader.views.swap_remove(name) {
                catalog.views.insert(name.clone(), view);
            }
        }
        debug!(
            "loaded catalog: {} tables, {} views",
            catalog.tables.len(),
            catalog.views.len()
        );
        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawKey {
    One(String),
    Many(Vec<String>),
}

impl RawKey {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawKey::One(s) => vec![s],
            RawKey::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    rpc: Option<String>,
    #[serde(default)]
    args: IndexMap<String, ArgValue>,
    args_key: Option<String>,
    item: Option<String>,
    key: Option<RawKey>,
    view: Option<String>,
    #[serde(default)]
    required_keys: IndexMap<String, RawKey>,
    get: Option<String>,
    set: Option<String>,
    #[serde(rename = "key-field")]
    key_field: Option<String>,
    command: Option<String>,
    target: Option<String>,
    title: Option<String>,
    #[serde(default)]
    columns: IndexMap<String, String>,
    delimiter: Option<String>,
    #[serde(default)]
    filters: Vec<String>,
    #[serde(default)]
    key_items: Vec<String>,
    end_marker: Option<String>,
}

impl RawTable {
    fn has_text_rules(&self) -> bool {
        self.title.is_some()
            || !self.columns.is_empty()
            || self.delimiter.is_some()
            || !self.filters.is_empty()
            || !self.key_items.is_empty()
            || self.end_marker.is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    #[serde(rename = "type")]
    ty: Option<String>,
    default: Option<Yaml>,
    #[serde(rename = "minValue")]
    min_value: Option<i64>,
    #[serde(rename = "maxValue")]
    max_value: Option<i64>,
    #[serde(rename = "enum", default)]
    allowed: Vec<Yaml>,
}

/// Memoised, cycle-aware resolution over raw declarations.
struct Loader<'a> {
    raw: &'a IndexMap<String, Yaml>,
    tables: IndexMap<String, Arc<TableSchema>>,
    views: IndexMap<String, Arc<ViewSchema>>,
    resolving: Vec<String>,
}

impl<'a> Loader<'a> {
    fn new(raw: &'a IndexMap<String, Yaml>) -> Self {
        Self {
            raw,
            tables: IndexMap::new(),
            views: IndexMap::new(),
            resolving: Vec::new(),
        }
    }

    fn is_table(&self, name: &str) -> bool {
        let raw = self.raw;
        let mut seen: Vec<&str> = Vec::new();
        let mut current = name;
        loop {
            let Some(Yaml::Mapping(decl)) = raw.get(current) else {
                return false;
            };
            if TABLE_MARKERS.iter().any(|k| decl.contains_key(*k)) {
                return true;
            }
            match decl.get("extends").and_then(Yaml::as_str) {
                Some(parent) if !seen.contains(&parent) => {
                    seen.push(parent);
                    current = parent;
                }
                _ => return false,
            }
        }
    }

    fn enter(&mut self, name: &str) -> Result<(), SchemaError> {
        if let Some(pos) = self.resolving.iter().position(|n| n == name) {
            let mut chain = self.resolving[pos..].to_vec();
            chain.push(name.to_string());
            return Err(SchemaError::Cycle { chain });
        }
        self.resolving.push(name.to_string());
        Ok(())
    }

    fn leave(&mut self) {
        self.resolving.pop();
    }

    /// Run `resolve` with `name` on the resolving stack, popping it again
    /// whether or not resolution succeeds.
    fn within<T>(
        &mut self,
        name: &str,
        resolve: impl FnOnce(&mut Self) -> Result<T, SchemaError>,
    ) -> Result<T, SchemaError> {
        self.enter(name)?;
        let result = resolve(self);
        self.leave();
        result
    }

    fn mapping(&self, name: &str) -> Result<&'a Mapping, SchemaError> {
        let raw = self.raw;
        match raw.get(name) {
            Some(Yaml::Mapping(m)) => Ok(m),
            _ => Err(malformed(name, "declaration must be a mapping")),
        }
    }

    fn table(&mut self, name: &str, referrer: &str) -> Result<Arc<TableSchema>, SchemaError> {
        if let Some(table) = self.tables.get(name) {
            return Ok(table.clone());
        }
        if !self.raw.contains_key(name) {
            return Err(SchemaError::UnknownReference {
                owner: referrer.to_string(),
                kind: "table",
                name: name.to_string(),
            });
        }

        let schema = self.within(name, |this| {
            let decl = this.table_decl(name)?;
            let raw: RawTable = serde_yaml::from_value(Yaml::Mapping(decl))
                .map_err(|e| malformed(name, &e.to_string()))?;
            this.build_table(name, raw).map(Arc::new)
        })?;

        debug!("resolved table '{}' ({:?})", name, schema.kind);
        self.tables.insert(name.to_string(), schema.clone());
        Ok(schema)
    }

    /// The declaration with its `extends` chain merged in, child keys last.
    fn table_decl(&mut self, name: &str) -> Result<Mapping, SchemaError> {
        let decl = self.mapping(name)?;
        let Some(parent) = decl.get("extends") else {
            return Ok(decl.clone());
        };
        let parent = parent
            .as_str()
            .ok_or_else(|| malformed(name, "'extends' must name a table"))?;
        if !self.raw.contains_key(parent) {
            return Err(SchemaError::UnknownReference {
                owner: name.to_string(),
                kind: "table",
                name: parent.to_string(),
            });
        }

        let mut merged = self.within(parent, |this| this.table_decl(parent))?;

        for (key, value) in decl {
            if key.as_str() != Some("extends") {
                merged.insert(key.clone(), value.clone());
            }
        }
        Ok(merged)
    }

    fn build_table(&mut self, name: &str, mut raw: RawTable) -> Result<TableSchema, SchemaError> {
        let kind = match (&raw.rpc, &raw.command, raw.get.is_some() || raw.set.is_some()) {
            (Some(_), None, false) => TableKind::Rpc,
            (None, Some(_), false) => TableKind::Command,
            (None, None, true) => TableKind::Config,
            _ => {
                return Err(malformed(
                    name,
                    "a table needs exactly one of 'rpc', 'command' or 'get'/'set'",
                ));
            }
        };
        if kind != TableKind::Command && raw.has_text_rules() {
            return Err(malformed(name, "text parsing keys are only valid on command tables"));
        }

        let command = match kind {
            TableKind::Rpc => raw.rpc.clone(),
            TableKind::Command => raw.command.clone(),
            TableKind::Config => raw.get.clone().or_else(|| raw.set.clone()),
        }
        .unwrap_or_default();

        let mut schema = TableSchema::new(name, kind, command);
        schema.args = raw.args;
        schema.args_key = raw.args_key;
        schema.target = raw.target;
        schema.required_keys = raw
            .required_keys
            .into_iter()
            .map(|(element, leaves)| (element, leaves.into_vec()))
            .collect();

        let parse = |src: &str| {
            Expr::parse(src).map_err(|source| SchemaError::InvalidExpr {
                owner: name.to_string(),
                source,
            })
        };

        match kind {
            TableKind::Rpc => {
                let item = raw
                    .item
                    .as_deref()
                    .ok_or_else(|| malformed(name, "rpc tables need an 'item' locator"))?;
                schema.item = Some(parse(item)?);
            }
            TableKind::Config => {
                let item = raw.item.as_deref().unwrap_or(schema.command.as_str());
                schema.item = Some(parse(item)?);
                if let Some(set) = &raw.set {
                    schema.write = Some(WriteSpec {
                        path: split_path(set),
                        key_field: raw.key_field.clone().unwrap_or_else(|| "name".to_string()),
                    });
                }
            }
            TableKind::Command => {
                if raw.columns.is_empty() && raw.delimiter.is_none() {
                    return Err(malformed(name, "command tables need 'columns' or 'delimiter'"));
                }
                schema.text = Some(TextTableSpec {
                    title: raw.title,
                    columns: raw.columns,
                    key: raw.key.take().map(RawKey::into_vec).unwrap_or_default(),
                    delimiter: raw.delimiter,
                    filters: raw.filters,
                    key_items: raw.key_items,
                    end_marker: raw.end_marker,
                });
            }
        }

        // Command table keys are column names, not expressions.
        if kind != TableKind::Command {
            schema.key = match raw.key.take() {
                None => KeyLocator::default(),
                Some(RawKey::One(key)) => KeyLocator::Single(parse(&key)?),
                Some(RawKey::Many(keys)) => KeyLocator::Composite(
                    keys.iter().map(|k| parse(k)).collect::<Result<_, _>>()?,
                ),
            };
        }

        if let Some(view) = &raw.view {
            if self.is_table(view) {
                return Err(malformed(name, &format!("'view' names the table '{}'", view)));
            }
            schema.view = Some(self.view(view, name)?);
        }
        Ok(schema)
    }

    fn view(&mut self, name: &str, referrer: &str) -> Result<Arc<ViewSchema>, SchemaError> {
        if let Some(view) = self.views.get(name) {
            return Ok(view.clone());
        }
        if !self.raw.contains_key(name) {
            return Err(SchemaError::UnknownReference {
                owner: referrer.to_string(),
                kind: "view",
                name: name.to_string(),
            });
        }

        let view = Arc::new(self.within(name, |this| this.build_view(name))?);
        debug!("resolved view '{}' with {} fields", name, view.fields.len());
        self.views.insert(name.to_string(), view.clone());
        Ok(view)
    }

    fn build_view(&mut self, name: &str) -> Result<ViewSchema, SchemaError> {
        let decl = self.mapping(name)?;
        let mut view = ViewSchema::new(name, Fields::new());

        if let Some(parent) = decl.get("extends") {
            let parent = parent
                .as_str()
                .ok_or_else(|| malformed(name, "'extends' must name a view"))?;
            let parent = self.view(parent, name)?;
            view.fields = parent.fields.clone();
            view.groups = parent.groups.clone();
            view.extends = Some(parent.name.clone());
        }

        if let Some(groups) = decl.get("groups") {
            let Yaml::Mapping(groups) = groups else {
                return Err(malformed(name, "'groups' must map group names to locators"));
            };
            for (group, locator) in groups {
                let (Some(group), Some(locator)) = (group.as_str(), locator.as_str()) else {
                    return Err(malformed(name, "'groups' must map group names to locators"));
                };
                let expr = Expr::parse(locator).map_err(|source| SchemaError::InvalidExpr {
                    owner: format!("{}.{}", name, group),
                    source,
                })?;
                view.groups.insert(group.to_string(), expr);
            }
        }

        for (key, value) in decl {
            let Some(key) = key.as_str() else {
                return Err(malformed(name, "keys must be strings"));
            };
            match key {
                "extends" | "groups" => {}
                "fields" => self.fields_into(&mut view.fields, name, value, None)?,
                _ => match key.strip_prefix("fields_") {
                    Some(group) if view.groups.contains_key(group) => {
                        self.fields_into(&mut view.fields, name, value, Some(group))?
                    }
                    Some(group) => {
                        return Err(malformed(
                            name,
                            &format!("'{}' uses undeclared group '{}'", key, group),
                        ));
                    }
                    None => {
                        return Err(malformed(
                            name,
                            &format!(
                                "unknown key '{}' (tables need one of rpc, get, set, command)",
                                key
                            ),
                        ));
                    }
                },
            }
        }
        Ok(view)
    }

    fn fields_into(
        &mut self,
        fields: &mut Fields,
        view: &str,
        value: &Yaml,
        group: Option<&str>,
    ) -> Result<(), SchemaError> {
        let Yaml::Mapping(entries) = value else {
            return Err(malformed(view, "fields must be a mapping of names to entries"));
        };
        for (field, entry) in entries {
            let Some(field) = field.as_str() else {
                return Err(malformed(view, "field names must be strings"));
            };
            let mut spec = self.field(view, field, entry)?;
            spec.group = group.map(str::to_string);
            fields.insert(field.to_string(), spec);
        }
        Ok(())
    }

    fn field(&mut self, view: &str, field: &str, entry: &Yaml) -> Result<FieldSpec, SchemaError> {
        let bad = |reason: String| SchemaError::MalformedField {
            view: view.to_string(),
            field: field.to_string(),
            reason,
        };
        let parse = |src: &str| {
            Expr::parse(src).map_err(|source| SchemaError::InvalidExpr {
                owner: format!("{}.{}", view, field),
                source,
            })
        };

        match entry {
            Yaml::String(text) => {
                if self.raw.contains_key(text.as_str()) && self.is_table(text) {
                    let table = self.table(text, view)?;
                    return Ok(FieldSpec::table(field, table));
                }
                Ok(FieldSpec::projection(field, parse(text)?, Coercion::Str))
            }
            Yaml::Mapping(entry) => {
                let mut iter = entry.iter();
                let (Some((xpath, spec)), None) = (iter.next(), iter.next()) else {
                    return Err(bad("expected a single 'xpath: type' entry".to_string()));
                };
                let Some(xpath) = xpath.as_str() else {
                    return Err(bad("the projection must be a string".to_string()));
                };
                let expr = parse(xpath)?;

                match spec {
                    Yaml::String(tag) => {
                        let coercion = coercion_for(tag).map_err(bad)?;
                        Ok(FieldSpec::projection(field, expr, coercion))
                    }
                    Yaml::Mapping(_) => {
                        let raw: RawOptions = serde_yaml::from_value(spec.clone())
                            .map_err(|e| bad(e.to_string()))?;
                        let coercion = match &raw.ty {
                            Some(tag) => coercion_for(tag).map_err(bad)?,
                            None => Coercion::Str,
                        };
                        let mut spec = FieldSpec::projection(field, expr, coercion);
                        spec.options = FieldOptions {
                            default: raw.default.as_ref().map(yaml_scalar).transpose().map_err(bad)?,
                            min_value: raw.min_value,
                            max_value: raw.max_value,
                            allowed: raw
                                .allowed
                                .iter()
                                .map(|v| yaml_scalar(v).map(|s| s.to_text()))
                                .collect::<Result<_, _>>()
                                .map_err(bad)?,
                        };
                        Ok(spec)
                    }
                    other => Err(bad(format!("unsupported type entry {:?}", other))),
                }
            }
            other => Err(bad(format!(
                "expected a projection string or a single-entry mapping, got {:?}",
                other
            ))),
        }
    }
}

fn coercion_for(tag: &str) -> Result<Coercion, String> {
    if let Some(coercion) = Coercion::from_tag(tag) {
        return Ok(coercion);
    }
    match Coercion::from_producer(tag) {
        Ok(Some(coercion)) => Ok(coercion),
        Ok(None) => Err(format!("unknown type '{}'", tag)),
        Err(e) => Err(format!("invalid regex in '{}': {}", tag, e)),
    }
}

fn yaml_scalar(value: &Yaml) -> Result<Scalar, String> {
    match value {
        Yaml::String(s) => Ok(Scalar::Str(s.clone())),
        Yaml::Bool(b) => Ok(Scalar::Bool(*b)),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => Ok(Scalar::Int(i)),
            None => n
                .as_f64()
                .map(Scalar::Float)
                .ok_or_else(|| format!("unsupported number {}", n)),
        },
        other => Err(format!("expected a scalar, got {:?}", other)),
    }
}

fn malformed(name: &str, message: &str) -> SchemaError {
    SchemaError::MalformedDeclaration {
        name: name.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Cardinality, FieldKind};

    const CATALOG: &str = r#"
PhyPortTable:
  rpc: get-interface-information
  args:
    extensive: true
    interface_name: '[afgxe][et]-*'
  args_key: interface_name
  item: physical-interface
  view: PhyPortView

PhyPortView:
  groups:
    mac_stats: ethernet-mac-statistics
  fields:
    oper: oper-status
    mtu: { mtu: int }
    running: { if-device-flags/ifdf-running: flag }
    auto: { auto-negotiation: True=enabled }
    loopback: { loopback: False=regex(^dis) }
    logical: LogicalTable
  fields_mac_stats:
    rx_bytes: { input-bytes: int }

LogicalTable:
  rpc: get-interface-information
  item: logical-interface
  view: LogicalView

LogicalView:
  fields:
    address: address-family/interface-address/ifa-local
"#;

    #[test]
    fn test_load_rpc_table_and_view() {
        let catalog = SchemaCatalog::from_yaml_str(CATALOG).unwrap();
        assert_eq!(
            catalog.table_names().collect::<Vec<_>>(),
            vec!["PhyPortTable", "LogicalTable"]
        );
        assert_eq!(
            catalog.view_names().collect::<Vec<_>>(),
            vec!["PhyPortView", "LogicalView"]
        );

        let table = catalog.table_schema("PhyPortTable").unwrap();
        assert_eq!(table.kind, TableKind::Rpc);
        assert_eq!(table.command, "get-interface-information");
        assert_eq!(table.args["extensive"], ArgValue::Flag(true));
        assert_eq!(table.args_key.as_deref(), Some("interface_name"));
        assert_eq!(table.item.as_ref().unwrap().as_str(), "physical-interface");
        assert_eq!(table.key, KeyLocator::default());

        let view = table.view.as_ref().unwrap();
        assert_eq!(view.fields.len(), 7);
        assert_eq!(view.fields["mtu"].coercion().unwrap().type_name(), "int");
        assert!(view.fields["running"].coercion().unwrap().is_flag());
        assert!(matches!(
            view.fields["auto"].coercion(),
            Some(Coercion::Match { polarity: true, .. })
        ));
        assert!(matches!(
            view.fields["loopback"].coercion(),
            Some(Coercion::Match { polarity: false, .. })
        ));
        assert!(matches!(view.fields["logical"].kind, FieldKind::Table(ref t) if t.name == "LogicalTable"));
        assert_eq!(view.fields["rx_bytes"].group.as_deref(), Some("mac_stats"));
        assert_eq!(view.groups["mac_stats"].as_str(), "ethernet-mac-statistics");
        assert!(matches!(
            view.fields["oper"].kind,
            FieldKind::Projection { cardinality: Cardinality::Auto, .. }
        ));
    }

    #[test]
    fn test_view_cycle_detected() {
        let err = SchemaCatalog::from_yaml_str(
            "A:\n  extends: B\n  fields: { x: x }\nB:\n  extends: A\n  fields: { y: y }\n",
        )
        .unwrap_err();
        match err {
            SchemaError::Cycle { chain } => assert_eq!(chain, vec!["A", "B", "A"]),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_extension_is_a_cycle() {
        let err = SchemaCatalog::from_yaml_str("A:\n  extends: A\n").unwrap_err();
        assert!(matches!(err, SchemaError::Cycle { ref chain } if chain == &["A", "A"]));
    }

    #[test]
    fn test_table_cycle_through_nested_field() {
        let err = SchemaCatalog::from_yaml_str(
            "T:\n  rpc: r\n  item: i\n  view: V\nV:\n  fields:\n    inner: T\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Cycle { .. }));
    }

    #[test]
    fn test_view_extends_child_overrides() {
        let catalog = SchemaCatalog::from_yaml_str(
            r#"
Base:
  fields:
    name: name
    mtu: mtu
Child:
  extends: Base
  fields:
    mtu: { link-level-mtu: int }
    speed: speed
"#,
        )
        .unwrap();
        let child = catalog.view_schema("Child").unwrap();
        let names: Vec<_> = child.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["name", "mtu", "speed"]);
        assert_eq!(child.fields["mtu"].expr().unwrap().as_str(), "link-level-mtu");
        assert_eq!(child.extends.as_deref(), Some("Base"));
    }

    #[test]
    fn test_table_extends_merges_declaration() {
        let catalog = SchemaCatalog::from_yaml_str(
            r#"
RouteTable:
  rpc: get-route-information
  args: { extensive: true }
  item: route-table/rt
  key: rt-destination
RouteSummary:
  extends: RouteTable
  key: [rt-destination, rt-entry/protocol-name]
"#,
        )
        .unwrap();
        let summary = catalog.table_schema("RouteSummary").unwrap();
        assert_eq!(summary.kind, TableKind::Rpc);
        assert_eq!(summary.command, "get-route-information");
        assert_eq!(summary.item.as_ref().unwrap().as_str(), "route-table/rt");
        assert!(matches!(summary.key, KeyLocator::Composite(ref k) if k.len() == 2));
    }

    #[test]
    fn test_unknown_view_reference() {
        let err = SchemaCatalog::from_yaml_str("T:\n  rpc: r\n  item: i\n  view: Missing\n")
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnknownReference { ref owner, kind: "view", ref name }
                if owner == "T" && name == "Missing"
        ));
    }

    #[test]
    fn test_malformed_fields() {
        let err = SchemaCatalog::from_yaml_str("V:\n  fields:\n    bad: [a, b]\n").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MalformedField { ref view, ref field, .. } if view == "V" && field == "bad"
        ));

        let err = SchemaCatalog::from_yaml_str("V:\n  fields:\n    bad: { mtu: integer }\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::MalformedField { ref reason, .. } if reason.contains("integer")));

        let err = SchemaCatalog::from_yaml_str("V:\n  fields:\n    bad: { mtu: { type: int, colour: red } }\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::MalformedField { .. }));

        let err = SchemaCatalog::from_yaml_str("V:\n  fields:\n    bad: { a: int, b: int }\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::MalformedField { .. }));
    }

    #[test]
    fn test_invalid_expression_names_field() {
        let err = SchemaCatalog::from_yaml_str("V:\n  fields:\n    bad: 'a[1'\n").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidExpr { ref owner, .. } if owner == "V.bad"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = SchemaCatalog::from_yaml_str("T:\n  rpc: r\n  item: i\n  colour: red\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::MalformedDeclaration { ref name, .. } if name == "T"));

        let err = SchemaCatalog::from_yaml_str("V:\n  item: i\n").unwrap_err();
        assert!(matches!(err, SchemaError::MalformedDeclaration { ref message, .. } if message.contains("item")));

        let err = SchemaCatalog::from_yaml_str("V:\n  fields_stats:\n    rx: rx\n").unwrap_err();
        assert!(matches!(err, SchemaError::MalformedDeclaration { ref message, .. } if message.contains("stats")));
    }

    #[test]
    fn test_rpc_table_requires_item() {
        let err = SchemaCatalog::from_yaml_str("T:\n  rpc: r\n").unwrap_err();
        assert!(matches!(err, SchemaError::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_config_table_with_options() {
        let catalog = SchemaCatalog::from_yaml_str(
            r#"
PolicyTable:
  get: security/policies/policy/policy
  set: security/policies/policy/policy
  required_keys:
    policy: [from-zone-name, to-zone-name]
  key-field: policy_name
  view: PolicyView
PolicyView:
  fields:
    policy_name: name
    count: { then/count: { type: int, default: 0, minValue: 0, maxValue: 10 } }
    action: { then/action: { enum: [permit, deny] } }
"#,
        )
        .unwrap();
        let table = catalog.table_schema("PolicyTable").unwrap();
        assert_eq!(table.kind, TableKind::Config);
        assert_eq!(table.item.as_ref().unwrap().as_str(), "security/policies/policy/policy");
        assert_eq!(
            table.required_key_names().collect::<Vec<_>>(),
            vec!["from-zone-name", "to-zone-name"]
        );
        let write = table.write.as_ref().unwrap();
        assert_eq!(write.path, vec!["security", "policies", "policy", "policy"]);
        assert_eq!(write.key_field, "policy_name");

        let view = table.view.as_ref().unwrap();
        let count = &view.fields["count"];
        assert_eq!(count.coercion().unwrap().type_name(), "int");
        assert_eq!(count.options.default, Some(Scalar::Int(0)));
        assert_eq!(count.options.max_value, Some(10));
        assert_eq!(view.fields["action"].options.allowed, vec!["permit", "deny"]);
    }

    #[test]
    fn test_command_table() {
        let catalog = SchemaCatalog::from_yaml_str(
            r#"
LinkStatsTable:
  command: show ppp statistics
  target: fpc1
  title: PPP LINK STATISTICS
  key: Name
  columns:
    name: Name
    status: Status
  view: LinkStatsView
LinkStatsView:
  fields:
    status: status
"#,
        )
        .unwrap();
        let table = catalog.table_schema("LinkStatsTable").unwrap();
        assert_eq!(table.kind, TableKind::Command);
        assert_eq!(table.target.as_deref(), Some("fpc1"));
        let text = table.text.as_ref().unwrap();
        assert_eq!(text.title.as_deref(), Some("PPP LINK STATISTICS"));
        assert_eq!(text.key, vec!["Name"]);
        assert_eq!(text.columns["status"], "Status");
        assert!(table.item.is_none());

        let err = SchemaCatalog::from_yaml_str("T:\n  command: show version\n").unwrap_err();
        assert!(matches!(err, SchemaError::MalformedDeclaration { .. }));

        let err = SchemaCatalog::from_yaml_str("T:\n  rpc: r\n  item: i\n  columns: { a: A }\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_builder_later_declaration_wins() {
        let catalog = SchemaCatalog::builder()
            .yaml("V:\n  fields: { name: name }\n")
            .unwrap()
            .yaml("V:\n  fields: { name: ifname }\n")
            .unwrap()
            .build()
            .unwrap();
        let view = catalog.view_schema("V").unwrap();
        assert_eq!(view.fields["name"].expr().unwrap().as_str(), "ifname");
    }

    #[test]
    fn test_json_catalog_and_lookup_errors() {
        let catalog = SchemaCatalog::from_yaml_str(r#"{"V": {"fields": {"name": "name"}}}"#).unwrap();
        assert!(catalog.view_schema("V").is_ok());
        assert!(matches!(
            catalog.table_schema("V"),
            Err(SchemaError::NotFound { ref name }) if name == "V"
        ));
        assert!(matches!(
            SchemaCatalog::from_yaml_str("- a\n- b\n"),
            Err(SchemaError::MalformedDeclaration { .. })
        ));
    }

    #[test]
    fn test_failed_resolution_unwinds_chain() {
        let raw: IndexMap<String, Yaml> = serde_yaml::from_str(
            "Base:\n  fields: { x: 'a[' }\nChild:\n  extends: Base\n  fields: { y: y }\n\
             T:\n  rpc: r\n  item: i\n  extends: Missing\n",
        )
        .unwrap();
        let mut loader = Loader::new(&raw);

        assert!(matches!(
            loader.view("Child", "test"),
            Err(SchemaError::InvalidExpr { .. })
        ));
        assert!(loader.resolving.is_empty());

        assert!(matches!(
            loader.table("T", "test"),
            Err(SchemaError::UnknownReference { .. })
        ));
        assert!(loader.resolving.is_empty());

        // A later cycle reports only its own chain.
        let raw: IndexMap<String, Yaml> =
            serde_yaml::from_str("A:\n  extends: A\n  fields: { x: x }\n").unwrap();
        let mut loader = Loader::new(&raw);
        assert!(loader.view("A", "test").is_err());
        match loader.view("A", "test") {
            Err(SchemaError::Cycle { chain }) => assert_eq!(chain, vec!["A", "A"]),
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = SchemaCatalog::from_path("/nonexistent/catalog.yml").unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
    }
}
