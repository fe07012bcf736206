//! Error types for devtables.

use std::io;
use thiserror::Error;

/// Main error type for devtables operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Schema catalog errors (load time)
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Table usage errors
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// Field projection errors
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// Config resource errors
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Errors raised by the fetch/write collaborator, passed through unchanged
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// Document parse errors
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Projection expression errors
    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),
}

/// Schema catalog errors.
///
/// These are raised while loading a catalog, never deferred to first use.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A table or view extends (directly or transitively) itself
    #[error("Cyclic schema reference: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// A referenced table or view is not declared in the catalog
    #[error("'{owner}' references unknown {kind} '{name}'")]
    UnknownReference {
        owner: String,
        kind: &'static str,
        name: String,
    },

    /// A field entry has a shape the loader does not understand
    #[error("Malformed field '{field}' in '{view}': {reason}")]
    MalformedField {
        view: String,
        field: String,
        reason: String,
    },

    /// A declaration is not a mapping or has invalid keys/values
    #[error("Malformed declaration '{name}': {message}")]
    MalformedDeclaration { name: String, message: String },

    /// A projection expression in the declaration failed to parse
    #[error("Invalid expression in '{owner}': {source}")]
    InvalidExpr {
        owner: String,
        #[source]
        source: ExprError,
    },

    /// The catalog document itself is not valid YAML/JSON
    #[error("Failed to parse schema catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Failed to read a catalog file
    #[error("Failed to read schema catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Requested name is not in the catalog
    #[error("No table or view named '{name}' in catalog")]
    NotFound { name: String },
}

/// Table usage errors.
#[derive(Error, Debug)]
pub enum TableError {
    /// `get()` was called without one of the schema's required keys
    #[error("Table '{table}' requires key '{key}'")]
    MissingKey { table: String, key: String },

    /// A data accessor was used before `get()` succeeded
    #[error("Table '{table}' has no data - call get() first")]
    NoData { table: String },

    /// The collaborator answered with a payload of the wrong shape
    #[error("Table '{table}' expected {expected} output from '{command}'")]
    UnexpectedPayload {
        table: String,
        command: String,
        expected: &'static str,
    },

    /// `get()` was called on a table that has no document source (a nested
    /// or offline table)
    #[error("Table '{table}' is not bound to a document source")]
    Detached { table: String },

    /// The table has no `set` path and cannot back a config resource
    #[error("Table '{table}' is not writable")]
    NotWritable { table: String },
}

/// Field projection errors.
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// The view does not declare the requested field
    #[error("View '{view}' has no field '{field}'")]
    UnknownField { view: String, field: String },

    /// A single-valued field matched several nodes
    #[error("Field '{field}' of view '{view}' matched {count} nodes, expected at most one")]
    Ambiguous {
        view: String,
        field: String,
        count: usize,
    },

    /// A matched value could not be converted to the field's type
    #[error("Field '{field}' of view '{view}': cannot convert '{value}' to {target}")]
    Coercion {
        view: String,
        field: String,
        value: String,
        target: &'static str,
    },
}

/// Config resource errors.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The resource's view does not declare the field
    #[error("Resource '{resource}' has no field '{field}'")]
    UnknownField { resource: String, field: String },

    /// Value outside the field's declared bounds
    #[error("Field '{field}' of '{resource}': {value} outside [{min}, {max}]")]
    OutOfRange {
        resource: String,
        field: String,
        value: String,
        min: String,
        max: String,
    },

    /// Value not among the field's declared choices
    #[error("Field '{field}' of '{resource}': '{value}' is not one of {allowed:?}")]
    NotAllowed {
        resource: String,
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Value not convertible to the field's type
    #[error("Field '{field}' of '{resource}': '{value}' is not a valid {expected}")]
    InvalidValue {
        resource: String,
        field: String,
        value: String,
        expected: &'static str,
    },

    /// Nested-table fields cannot be written through a resource
    #[error("Field '{field}' of '{resource}' is not writable")]
    ReadOnly { resource: String, field: String },
}

/// Errors reported by the transport collaborator.
///
/// The engine never retries or suppresses these.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    /// Session or transport failure
    #[error("Transport failure: {message}")]
    Transport { message: String },

    /// The device answered with an RPC error
    #[error("RPC '{command}' failed: {message}")]
    Rpc { command: String, message: String },

    /// The device rejected a change document (schema violation, lock conflict)
    #[error("Change rejected: {message}")]
    Rejected { message: String },

    /// Anything else the collaborator wants to surface
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Document parse errors.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Malformed XML
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// Projection expression parse errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Empty expression or empty union member
    #[error("Empty expression")]
    Empty,

    /// Unexpected character at an offset
    #[error("Unexpected '{found}' at offset {offset} in '{expr}'")]
    Unexpected {
        expr: String,
        offset: usize,
        found: char,
    },

    /// Unterminated predicate or string literal
    #[error("Unterminated {what} in '{expr}'")]
    Unterminated { expr: String, what: &'static str },
}

/// Result type alias using devtables' Error.
pub type Result<T> = std::result::Result<T, Error>;
