//! Collaborator boundary.
//!
//! The engine never talks to a device itself. Tables ask a
//! [`DocumentSource`] for documents and config resources hand change
//! documents to a [`DocumentSink`]; both are implemented by the transport
//! layer (NETCONF, SSH CLI, REST, or a fake in tests). Errors from either
//! side are passed through to the caller unchanged.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::document::{Document, Element};
use crate::error::CollaboratorError;
use crate::schema::TableKind;
use crate::table::Key;

/// A fetch argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// Boolean flag argument (`<extensive/>`).
    Flag(bool),
    /// Numeric argument.
    Number(i64),
    /// Text argument.
    Text(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Flag(b) => write!(f, "{}", b),
            ArgValue::Number(n) => write!(f, "{}", n),
            ArgValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Flag(b)
    }
}

impl From<i64> for ArgValue {
    fn from(n: i64) -> Self {
        ArgValue::Number(n)
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Text(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Text(s)
    }
}

/// Everything a collaborator needs to answer one fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Name of the table issuing the request.
    pub table: String,

    /// Fetch flavour.
    pub kind: TableKind,

    /// RPC name, configuration path or CLI command.
    pub command: String,

    /// Schema defaults merged with caller parameters.
    pub args: IndexMap<String, ArgValue>,

    /// Target a CLI command runs on, if any.
    pub target: Option<String>,

    /// Single item the caller asked for; collaborators that can narrow the
    /// fetch to that item's subtree should do so.
    pub narrow_to: Option<Key>,

    /// Configuration filter (for [`TableKind::Config`] tables).
    pub filter: Option<Element>,
}

/// A collaborator's answer to a fetch.
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// A structured document.
    Document(Document),
    /// Raw command output.
    Text(String),
    /// The request succeeded but there is nothing to report.
    Empty,
}

/// Source of documents (the transport's read side).
pub trait DocumentSource {
    /// Fetch a document for `request`.
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, CollaboratorError>;
}

impl<F> DocumentSource for F
where
    F: Fn(&FetchRequest) -> Result<FetchResult, CollaboratorError>,
{
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, CollaboratorError> {
        self(request)
    }
}

/// How a change document is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadAction {
    /// Merge into the candidate configuration.
    #[default]
    Merge,
    /// Replace elements marked for replacement.
    Replace,
    /// Apply `operation` attributes only.
    Update,
}

/// Options passed alongside a change document.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Load action.
    pub action: LoadAction,

    /// Commit comment.
    pub comment: Option<String>,
}

impl WriteOptions {
    /// Create default options (merge, no comment).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the load action.
    pub fn with_action(mut self, action: LoadAction) -> Self {
        self.action = action;
        self
    }

    /// Set the commit comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Acknowledgement of a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Whether the change was committed.
    pub committed: bool,

    /// Informational message from the device.
    pub message: Option<String>,
}

/// A configuration change ready to be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDocument {
    root: Element,
}

impl ChangeDocument {
    /// Wrap a `<configuration>` tree.
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// The root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Serialize to XML text.
    pub fn to_xml(&self) -> String {
        self.root.to_xml()
    }
}

/// Sink for change documents (the transport's write side).
pub trait DocumentSink {
    /// Submit a change document.
    fn write(
        &self,
        change: &ChangeDocument,
        options: &WriteOptions,
    ) -> Result<WriteResult, CollaboratorError>;
}

/// Build `<configuration>` down to an item element.
///
/// `path` is the configuration path whose last step is the item itself;
/// `item` replaces that step. Ancestors named in `required_keys` get their
/// key leaves filled from `params` (underscores and dashes are
/// interchangeable in parameter names).
pub(crate) fn config_tree(
    path: &[String],
    required_keys: &IndexMap<String, Vec<String>>,
    params: &IndexMap<String, ArgValue>,
    item: Element,
) -> Element {
    let mut current = item;
    for step in path.iter().rev().skip(1) {
        let mut parent = Element::new(step.as_str());
        for leaf in required_keys.get(step).into_iter().flatten() {
            if let Some(value) = param_value(params, leaf) {
                parent.push(Element::new(leaf.as_str()).with_text(value.to_string()));
            }
        }
        parent.children.push(current);
        current = parent;
    }

    Element::new("configuration").with_child(current)
}

/// Look up a parameter by name, treating `_` and `-` alike.
pub(crate) fn param_value<'a>(params: &'a IndexMap<String, ArgValue>, name: &str) -> Option<&'a ArgValue> {
    let wanted = normalize_param(name);
    params
        .iter()
        .find(|(k, _)| normalize_param(k) == wanted)
        .map(|(_, v)| v)
}

fn normalize_param(name: &str) -> String {
    name.replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_value_yaml() {
        let args: IndexMap<String, ArgValue> =
            serde_yaml::from_str("extensive: true\ninterface_name: ge-0/0/0\ncount: 5").unwrap();
        assert_eq!(args["extensive"], ArgValue::Flag(true));
        assert_eq!(args["interface_name"], ArgValue::Text("ge-0/0/0".into()));
        assert_eq!(args["count"], ArgValue::Number(5));
    }

    #[test]
    fn test_closure_source() {
        let source = |req: &FetchRequest| -> Result<FetchResult, CollaboratorError> {
            Ok(FetchResult::Text(req.command.clone()))
        };
        let request = FetchRequest {
            table: "T".into(),
            kind: TableKind::Command,
            command: "show version".into(),
            args: IndexMap::new(),
            target: None,
            narrow_to: None,
            filter: None,
        };
        assert!(matches!(source.fetch(&request), Ok(FetchResult::Text(t)) if t == "show version"));
    }

    #[test]
    fn test_config_tree_with_required_keys() {
        let path = vec![
            "security".to_string(),
            "policies".to_string(),
            "policy".to_string(),
            "policy".to_string(),
        ];
        let mut required = IndexMap::new();
        required.insert(
            "policy".to_string(),
            vec!["from-zone-name".to_string(), "to-zone-name".to_string()],
        );
        let mut params = IndexMap::new();
        params.insert("from_zone_name".to_string(), ArgValue::from("trust"));
        params.insert("to-zone-name".to_string(), ArgValue::from("untrust"));

        let tree = config_tree(&path, &required, &params, Element::new("policy"));
        assert_eq!(
            tree.to_xml(),
            "<configuration><security><policies><policy>\
             <from-zone-name>trust</from-zone-name><to-zone-name>untrust</to-zone-name>\
             <policy/></policy></policies></security></configuration>"
        );
    }

    #[test]
    fn test_config_tree_plain() {
        let path = vec!["system".to_string(), "login".to_string(), "user".to_string()];
        let item = Element::new("user").with_child(Element::new("name").with_text("ops"));
        let tree = config_tree(&path, &IndexMap::new(), &IndexMap::new(), item);
        assert_eq!(
            tree.to_xml(),
            "<configuration><system><login><user><name>ops</name></user></login></system></configuration>"
        );
    }
}
