//! # devtables
//!
//! Schema-driven Table/View engine for network device automation.
//!
//! devtables turns device output into typed records using declarative
//! schemas, in the style of Junos PyEZ tables and views: a YAML catalog says
//! how to fetch a collection, where its items are, how each item is keyed
//! and which fields to project from it.
//!
//! ## Features
//!
//! - YAML schema catalogs with inheritance, cycle detection and load-time
//!   validation
//! - Lazily evaluated views over XML documents (a small XPath subset)
//! - Composite keys, field groups and nested tables
//! - Columnar CLI text parsing into the same record shape
//! - Writable configuration resources that emit minimal change documents
//!
//! The engine does not talk to devices. Transports plug in through the
//! [`DocumentSource`] and [`DocumentSink`] traits.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use devtables::{
//!     CollaboratorError, Document, FetchRequest, FetchResult, GetArgs, SchemaCatalog,
//! };
//!
//! fn main() -> Result<(), devtables::Error> {
//!     let catalog = SchemaCatalog::from_yaml_str(
//!         r#"
//! PortTable:
//!   rpc: get-interface-information
//!   item: physical-interface
//!   view: PortView
//! PortView:
//!   fields:
//!     oper: oper-status
//!     mtu: { mtu: int }
//! "#,
//!     )?;
//!
//!     let source = |_: &FetchRequest| -> Result<FetchResult, CollaboratorError> {
//!         let doc = Document::parse(
//!             "<interface-information><physical-interface>\
//!              <name>ge-0/0/0</name><oper-status>up</oper-status><mtu>1514</mtu>\
//!              </physical-interface></interface-information>",
//!         )
//!         .map_err(|e| CollaboratorError::Other(Box::new(e)))?;
//!         Ok(FetchResult::Document(doc))
//!     };
//!
//!     let mut ports = catalog.table("PortTable", Arc::new(source))?;
//!     ports.get(GetArgs::new())?;
//!
//!     let port = ports.item("ge-0/0/0")?.expect("port present");
//!     assert_eq!(port.get("mtu")?.as_int(), Some(1514));
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod error;
pub mod resource;
pub mod schema;
pub mod source;
pub mod table;
pub mod text;
pub mod value;

// Re-export main types for convenience
pub use document::{Document, Element, Expr};
pub use error::{
    CollaboratorError, Error, ProjectionError, ResourceError, Result, SchemaError, TableError,
};
pub use resource::ConfigResource;
pub use schema::{FieldsBuilder, SchemaCatalog, TableSchema, ViewSchema};
pub use source::{
    ArgValue, ChangeDocument, DocumentSink, DocumentSource, FetchRequest, FetchResult, LoadAction,
    WriteOptions, WriteResult,
};
pub use table::{GetArgs, Key, Table, View};
pub use text::{StateMachine, TextTableSpec};
pub use value::{Scalar, Value};
