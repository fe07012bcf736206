//! Record views.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::trace;
use serde_json::{Map, Number, Value as Json};

use super::{Key, Table};
use crate::document::{Document, Expr, Node, NodeId};
use crate::error::{ProjectionError, Result};
use crate::schema::{Cardinality, FieldKind, FieldSpec, ViewSchema};
use crate::text::TextRow;
use crate::value::{Scalar, Value};

#[derive(Clone)]
enum ViewSource {
    Node { doc: Arc<Document>, node: NodeId },
    Row { rows: Arc<Vec<TextRow>>, index: usize },
}

/// A lazily evaluated projection of one record.
///
/// Nothing is computed until a field is asked for. A view holds its own
/// reference to the document it was produced from, so it stays valid (and
/// keeps showing that snapshot) after its table fetches again.
#[derive(Clone)]
pub struct View {
    name: String,
    schema: Arc<ViewSchema>,
    key: Key,
    source: ViewSource,
    groups: RefCell<HashMap<String, Option<NodeId>>>,
}

impl View {
    pub(crate) fn for_node(
        name: String,
        schema: Arc<ViewSchema>,
        key: Key,
        doc: Arc<Document>,
        node: NodeId,
    ) -> Self {
        Self {
            name,
            schema,
            key,
            source: ViewSource::Node { doc, node },
            groups: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn for_row(
        name: String,
        schema: Arc<ViewSchema>,
        key: Key,
        rows: Arc<Vec<TextRow>>,
        index: usize,
    ) -> Self {
        Self {
            name,
            schema,
            key,
            source: ViewSource::Row { rows, index },
            groups: RefCell::new(HashMap::new()),
        }
    }

    /// The record's key.
    pub fn name(&self) -> &Key {
        &self.key
    }

    /// Name of the view schema (or of the table, when it has none).
    pub fn view_name(&self) -> &str {
        &self.name
    }

    /// The record's element, for views over XML documents.
    pub fn node(&self) -> Option<Node<'_>> {
        match &self.source {
            ViewSource::Node { doc, node } => Some(doc.node(*node)),
            ViewSource::Row { .. } => None,
        }
    }

    /// Declared field names.
    ///
    /// Text records without a view expose their columns instead.
    pub fn keys(&self) -> Vec<&str> {
        if let Some(row) = self.bare_row() {
            return row.values.keys().map(String::as_str).collect();
        }
        self.schema.fields.keys().map(String::as_str).collect()
    }

    /// Evaluate one field.
    pub fn get(&self, field: &str) -> Result<Value> {
        if let Some(row) = self.bare_row() {
            return row
                .values
                .get(field)
                .map(|v| Value::Scalar(v.clone()))
                .ok_or_else(|| self.unknown(field));
        }

        let spec = self.schema.field(field).ok_or_else(|| self.unknown(field))?;
        match &self.source {
            ViewSource::Node { doc, node } => self.node_value(doc, *node, spec),
            ViewSource::Row { rows, index } => self.row_value(&rows[*index], spec),
        }
    }

    /// Values of every field, in field order.
    pub fn values(&self) -> Result<Vec<Value>> {
        self.keys().into_iter().map(|k| self.get(k)).collect()
    }

    /// `(field, value)` pairs, in field order.
    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        self.keys()
            .into_iter()
            .map(|k| Ok((k.to_string(), self.get(k)?)))
            .collect()
    }

    /// Serialize every field to a JSON object.
    pub fn to_json(&self) -> Result<Json> {
        let mut map = Map::new();
        for (field, value) in self.items()? {
            map.insert(field, json_value(&value)?);
        }
        Ok(Json::Object(map))
    }

    fn bare_row(&self) -> Option<&TextRow> {
        match &self.source {
            ViewSource::Row { rows, index } if self.schema.fields.is_empty() => rows.get(*index),
            _ => None,
        }
    }

    fn unknown(&self, field: &str) -> crate::error::Error {
        ProjectionError::UnknownField {
            view: self.name.clone(),
            field: field.to_string(),
        }
        .into()
    }

    fn node_value(&self, doc: &Arc<Document>, node: NodeId, spec: &FieldSpec) -> Result<Value> {
        let context = match &spec.group {
            Some(group) => match self.group_node(doc, node, group) {
                Some(id) => id,
                None => return Ok(missing(spec)),
            },
            None => node,
        };

        let (expr, coercion, cardinality) = match &spec.kind {
            FieldKind::Table(schema) => {
                return Ok(Value::Table(Table::scoped(schema.clone(), doc.clone(), context)));
            }
            FieldKind::Projection {
                expr,
                coercion,
                cardinality,
            } => (expr, coercion, cardinality),
        };

        let hits = expr.select(doc.node(context));
        trace!("{}.{}: '{}' matched {}", self.name, spec.name, expr, hits.len());
        if coercion.is_flag() {
            return Ok(Value::Scalar(Scalar::Bool(!hits.is_empty())));
        }
        if hits.is_empty() {
            return Ok(missing(spec));
        }
        if *cardinality == Cardinality::Single && hits.len() > 1 {
            return Err(ProjectionError::Ambiguous {
                view: self.name.clone(),
                field: spec.name.clone(),
                count: hits.len(),
            }
            .into());
        }

        let mut values = hits
            .iter()
            .map(|hit| {
                let text = hit.text();
                coercion.apply(text).ok_or_else(|| ProjectionError::Coercion {
                    view: self.name.clone(),
                    field: spec.name.clone(),
                    value: text.to_string(),
                    target: coercion.type_name(),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if values.len() == 1 {
            Ok(Value::Scalar(values.remove(0)))
        } else {
            Ok(Value::List(values))
        }
    }

    fn row_value(&self, row: &TextRow, spec: &FieldSpec) -> Result<Value> {
        let FieldKind::Projection { expr, coercion, .. } = &spec.kind else {
            return Ok(Value::Null);
        };
        let Some(cell) = row
            .values
            .get(expr.as_str())
            .or_else(|| row.values.get(&spec.name))
        else {
            return Ok(missing(spec));
        };
        if coercion.is_flag() {
            return Ok(Value::Scalar(Scalar::Bool(true)));
        }

        coercion
            .apply_scalar(cell)
            .map(Value::Scalar)
            .ok_or_else(|| {
                ProjectionError::Coercion {
                    view: self.name.clone(),
                    field: spec.name.clone(),
                    value: cell.to_text(),
                    target: coercion.type_name(),
                }
                .into()
            })
    }

    /// First node matched by a group's locator, resolved once per view.
    fn group_node(&self, doc: &Document, node: NodeId, group: &str) -> Option<NodeId> {
        if let Some(cached) = self.groups.borrow().get(group) {
            return *cached;
        }

        let found = match self.schema.groups.get(group) {
            Some(locator) => first_node(locator, doc.node(node)),
            // builder views may name a group without declaring a locator
            None => Expr::parse(group)
                .ok()
                .and_then(|locator| first_node(&locator, doc.node(node))),
        };
        self.groups.borrow_mut().insert(group.to_string(), found);
        found
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("view", &self.name)
            .field("key", &self.key)
            .finish()
    }
}

fn first_node(locator: &Expr, context: Node<'_>) -> Option<NodeId> {
    locator.select_nodes(context).first().map(Node::id)
}

/// Value of a field whose projection matched nothing.
fn missing(spec: &FieldSpec) -> Value {
    match spec.coercion() {
        Some(coercion) if coercion.is_flag() => Value::Scalar(Scalar::Bool(false)),
        _ => spec
            .options
            .default
            .clone()
            .map_or(Value::Null, Value::Scalar),
    }
}

pub(crate) fn json_value(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Scalar(s) => json_scalar(s),
        Value::List(items) => Json::Array(items.iter().map(json_scalar).collect()),
        Value::Table(table) => table.to_json()?,
    })
}

fn json_scalar(scalar: &Scalar) -> Json {
    match scalar {
        Scalar::Str(s) => Json::String(s.clone()),
        Scalar::Int(n) => Json::Number((*n).into()),
        Scalar::Float(x) => Number::from_f64(*x).map_or(Json::Null, Json::Number),
        Scalar::Bool(b) => Json::Bool(*b),
    }
}
