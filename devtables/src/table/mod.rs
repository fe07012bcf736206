//! Runtime tables.
//!
//! A [`Table`] binds a [`TableSchema`] to a [`DocumentSource`]. It holds no
//! data until [`Table::get`] fetches a document; after that it exposes the
//! located items as [`View`]s, by key, by position or in document order.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use devtables::{GetArgs, SchemaCatalog};
//! # fn demo(catalog: &SchemaCatalog, source: Arc<dyn devtables::DocumentSource>) -> devtables::Result<()> {
//! let mut ports = catalog.table("PhyPortTable", source)?;
//! ports.get(GetArgs::new())?;
//! for item in ports.iter()? {
//!     let (key, port) = item?;
//!     println!("{}: {:?}", key, port.get("oper")?);
//! }
//! # Ok(())
//! # }
//! ```

mod key;
mod view;

pub use key::Key;
pub use view::View;

use std::cell::OnceCell;
use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use serde_json::{Map, Value as Json};

use crate::document::{Document, Element, Node, NodeId};
use crate::error::{Result, TableError};
use crate::schema::{KeyLocator, TableKind, TableSchema, ViewSchema, split_path};
use crate::source::{ArgValue, DocumentSource, FetchRequest, FetchResult, config_tree, param_value};
use crate::text::{StateMachine, TextRow};

/// Arguments for one [`Table::get`] call.
#[derive(Debug, Clone, Default)]
pub struct GetArgs {
    key: Option<Key>,
    params: IndexMap<String, ArgValue>,
}

impl GetArgs {
    /// Fetch the whole collection with the schema's default arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a single item.
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add or override a fetch argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

#[derive(Clone)]
enum TableData {
    Xml { doc: Arc<Document>, context: NodeId },
    Text { rows: Arc<Vec<TextRow>> },
    Empty,
}

/// A fetched (or not yet fetched) collection of records.
#[derive(Clone)]
pub struct Table {
    schema: Arc<TableSchema>,
    source: Option<Arc<dyn DocumentSource>>,
    data: Option<TableData>,
    items: OnceCell<Vec<NodeId>>,
    keys: OnceCell<Vec<Key>>,
}

impl Table {
    /// Create an empty table; call [`Table::get`] to fetch.
    pub fn new(schema: Arc<TableSchema>, source: Arc<dyn DocumentSource>) -> Self {
        Self::with_data(schema, Some(source), None)
    }

    /// Bind a table to an already available document.
    pub fn from_document(schema: Arc<TableSchema>, doc: Document) -> Self {
        let context = context_of(&doc);
        Self::with_data(
            schema,
            None,
            Some(TableData::Xml {
                doc: Arc::new(doc),
                context,
            }),
        )
    }

    /// Bind a command table to already captured output.
    pub fn from_text(schema: Arc<TableSchema>, text: &str) -> Self {
        let rows = parse_rows(&schema, text);
        Self::with_data(
            schema,
            None,
            Some(TableData::Text {
                rows: Arc::new(rows),
            }),
        )
    }

    /// A nested table projected from `node` of a parent's document.
    pub(crate) fn scoped(schema: Arc<TableSchema>, doc: Arc<Document>, node: NodeId) -> Self {
        Self::with_data(schema, None, Some(TableData::Xml { doc, context: node }))
    }

    fn with_data(
        schema: Arc<TableSchema>,
        source: Option<Arc<dyn DocumentSource>>,
        data: Option<TableData>,
    ) -> Self {
        Self {
            schema,
            source,
            data,
            items: OnceCell::new(),
            keys: OnceCell::new(),
        }
    }

    /// The table's schema.
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// The table's name.
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Fetch from the source, replacing any previous data.
    ///
    /// Required keys are checked before the source is contacted. Errors from
    /// the source are returned unchanged.
    pub fn get(&mut self, args: GetArgs) -> Result<&mut Self> {
        let schema = self.schema.clone();
        let Some(source) = self.source.clone() else {
            return Err(TableError::Detached {
                table: schema.name.clone(),
            }
            .into());
        };

        for leaf in schema.required_key_names() {
            if param_value(&args.params, leaf).is_none() {
                return Err(TableError::MissingKey {
                    table: schema.name.clone(),
                    key: leaf.to_string(),
                }
                .into());
            }
        }

        let mut params = schema.args.clone();
        params.extend(args.params);

        if let (TableKind::Rpc, Some(args_key), Some(Key::Name(name))) =
            (schema.kind, &schema.args_key, &args.key)
        {
            params.insert(args_key.clone(), ArgValue::Text(name.clone()));
        }

        let filter = match schema.kind {
            TableKind::Config => Some(config_filter(&schema, &params, args.key.as_ref())),
            _ => None,
        };

        let request = FetchRequest {
            table: schema.name.clone(),
            kind: schema.kind,
            command: schema.command.clone(),
            args: params,
            target: schema.target.clone(),
            narrow_to: args.key,
            filter,
        };
        debug!(
            "{}: fetching '{}' (narrow to {:?})",
            schema.name, schema.command, request.narrow_to
        );

        let data = match (schema.kind, source.fetch(&request)?) {
            (_, FetchResult::Empty) => TableData::Empty,
            (TableKind::Command, FetchResult::Text(text)) => TableData::Text {
                rows: Arc::new(parse_rows(&schema, &text)),
            },
            // some transports wrap CLI text in an <output> element
            (TableKind::Command, FetchResult::Document(doc)) if doc.root().name() == "output" => {
                TableData::Text {
                    rows: Arc::new(parse_rows(&schema, doc.root().text())),
                }
            }
            (TableKind::Command, FetchResult::Document(_)) => {
                return Err(unexpected(&schema, "text"));
            }
            (_, FetchResult::Document(doc)) => TableData::Xml {
                context: context_of(&doc),
                doc: Arc::new(doc),
            },
            (_, FetchResult::Text(_)) => return Err(unexpected(&schema, "document")),
        };

        self.data = Some(data);
        self.items = OnceCell::new();
        self.keys = OnceCell::new();
        Ok(self)
    }

    /// Keys of all items, in document order.
    pub fn keys(&self) -> Result<&[Key]> {
        let data = self.data()?;
        let keys = self.keys.get_or_init(|| match data {
            TableData::Xml { doc, context } => self
                .item_nodes(doc, *context)
                .iter()
                .map(|id| key_of(&self.schema.key, doc.node(*id)))
                .collect(),
            TableData::Text { rows } => rows.iter().map(|r| r.key.clone()).collect(),
            TableData::Empty => Vec::new(),
        });
        Ok(keys.as_slice())
    }

    /// Number of items.
    pub fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    /// Check if the fetch located no items.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Look up an item by key; `None` when absent.
    ///
    /// A plain name also finds an item with a composite key whose first
    /// component equals it.
    pub fn item(&self, key: impl Into<Key>) -> Result<Option<View>> {
        let key = key.into();
        let position = self.keys()?.iter().position(|k| k.matches(&key));
        match position {
            Some(index) => self.at(index),
            None => Ok(None),
        }
    }

    /// Check if an item with `key` exists.
    pub fn contains(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        Ok(self.keys()?.iter().any(|k| k.matches(&key)))
    }

    /// The item at `index` in document order.
    pub fn at(&self, index: usize) -> Result<Option<View>> {
        let keys = self.keys()?;
        let Some(key) = keys.get(index) else {
            return Ok(None);
        };
        Ok(Some(self.view_at(index, key.clone())?))
    }

    /// Items in a positional range; out-of-range bounds are clamped.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Result<Vec<View>> {
        let len = self.len()?;
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .clamp(start, len);

        (start..end)
            .map(|i| self.view_at(i, self.keys()?[i].clone()))
            .collect()
    }

    /// Iterate `(key, view)` pairs in document order.
    ///
    /// Each call starts a fresh pass over the same snapshot.
    pub fn iter(&self) -> Result<Iter<'_>> {
        let len = self.len()?;
        Ok(Iter {
            table: self,
            index: 0,
            len,
        })
    }

    /// All views in document order.
    pub fn values(&self) -> Result<Vec<View>> {
        self.slice(..)
    }

    /// All `(key, view)` pairs in document order.
    pub fn items(&self) -> Result<Vec<(Key, View)>> {
        self.iter()?.collect()
    }

    /// Serialize every item to a JSON object keyed by item key.
    pub fn to_json(&self) -> Result<Json> {
        let mut map = Map::new();
        for entry in self.iter()? {
            let (key, view) = entry?;
            map.insert(key.to_string(), view.to_json()?);
        }
        Ok(Json::Object(map))
    }

    /// The fetched document, for XML-backed tables.
    pub fn document(&self) -> Result<Option<&Arc<Document>>> {
        match self.data()? {
            TableData::Xml { doc, .. } => Ok(Some(doc)),
            _ => Ok(None),
        }
    }

    fn data(&self) -> Result<&TableData> {
        self.data.as_ref().ok_or_else(|| {
            TableError::NoData {
                table: self.schema.name.clone(),
            }
            .into()
        })
    }

    fn item_nodes(&self, doc: &Document, context: NodeId) -> &[NodeId] {
        self.items.get_or_init(|| match &self.schema.item {
            Some(item) => item
                .select_nodes(doc.node(context))
                .iter()
                .map(Node::id)
                .collect(),
            None => vec![context],
        })
    }

    fn view_at(&self, index: usize, key: Key) -> Result<View> {
        let schema = self.view_schema();
        let name = schema.name.clone();
        match self.data()? {
            TableData::Xml { doc, context } => {
                let node = self.item_nodes(doc, *context)[index];
                Ok(View::for_node(name, schema, key, doc.clone(), node))
            }
            TableData::Text { rows } => Ok(View::for_row(name, schema, key, rows.clone(), index)),
            TableData::Empty => Err(TableError::NoData {
                table: self.schema.name.clone(),
            }
            .into()),
        }
    }

    fn view_schema(&self) -> Arc<ViewSchema> {
        match &self.schema.view {
            Some(view) => view.clone(),
            None => Arc::new(ViewSchema::new(self.schema.name.clone(), Default::default())),
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.schema.name)
            .field("kind", &self.schema.kind)
            .field("fetched", &self.data.is_some())
            .finish()
    }
}

/// Iterator over `(key, view)` pairs of a [`Table`].
pub struct Iter<'a> {
    table: &'a Table,
    index: usize,
    len: usize,
}

impl Iterator for Iter<'_> {
    type Item = Result<(Key, View)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let index = self.index;
        self.index += 1;
        Some(self.table.keys().and_then(|keys| {
            let key = keys[index].clone();
            Ok((key.clone(), self.table.view_at(index, key)?))
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

fn key_of(locator: &KeyLocator, node: Node<'_>) -> Key {
    match locator {
        KeyLocator::Single(expr) => expr
            .first_text(node)
            .map_or(Key::Absent, |text| Key::Name(text.to_string())),
        KeyLocator::Composite(exprs) => Key::Composite(
            exprs
                .iter()
                .map(|e| e.first_text(node).map(str::to_string))
                .collect(),
        ),
    }
}

/// The element items are located from, skipping RPC envelopes.
fn context_of(doc: &Document) -> NodeId {
    let mut node = doc.root();
    while matches!(node.name(), "rpc-reply" | "data") {
        match node.children().next() {
            Some(child) => node = child,
            None => break,
        }
    }
    node.id()
}

fn parse_rows(schema: &TableSchema, text: &str) -> Vec<TextRow> {
    match &schema.text {
        Some(spec) => StateMachine::new(spec)
            .with_record_key(schema.name.as_str())
            .parse(text),
        None => Vec::new(),
    }
}

/// `<configuration>` skeleton down to the table's items, narrowed to one
/// item when a key was given.
fn config_filter(schema: &TableSchema, params: &IndexMap<String, ArgValue>, key: Option<&Key>) -> Element {
    let path = split_path(&schema.command);
    let Some(last) = path.last() else {
        return Element::new("configuration");
    };

    let mut item = Element::new(last.as_str());
    if let (Some(Key::Name(name)), KeyLocator::Single(expr)) = (key, &schema.key) {
        if let Some(steps) = expr.simple_steps().filter(|s| !s.is_empty()) {
            item.ensure_path(&steps).text = Some(name.clone());
        }
    }
    config_tree(&path, &schema.required_keys, params, item)
}

fn unexpected(schema: &TableSchema, expected: &'static str) -> crate::error::Error {
    TableError::UnexpectedPayload {
        table: schema.name.clone(),
        command: schema.command.clone(),
        expected,
    }
    .into()
}
