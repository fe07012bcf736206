//! Writable configuration resources.
//!
//! A [`ConfigResource`] is one item of a writable configuration table. It
//! keeps the field values as last read (`current`) and the values the
//! caller changed since (`desired`); [`ConfigResource::write`] turns the
//! difference into a minimal change document and hands it to the
//! [`DocumentSink`].
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use devtables::{ConfigResource, DocumentSink, DocumentSource, SchemaCatalog};
//! # fn demo(
//! #     catalog: &SchemaCatalog,
//! #     source: Arc<dyn DocumentSource>,
//! #     sink: Arc<dyn DocumentSink>,
//! # ) -> devtables::Result<()> {
//! let schema = catalog.table_schema("UserTable")?;
//! let mut user = ConfigResource::new(schema, "ops", source, sink)?;
//! user.read()?;
//! user.set("class", "read-only")?;
//! user.set("tags", vec!["noc", "oncall"])?;
//! if user.write()? {
//!     println!("committed");
//! }
//! # Ok(())
//! # }
//! ```

mod writer;

pub use writer::FieldWriter;

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use crate::document::Element;
use crate::error::{ResourceError, Result, TableError};
use crate::schema::{Coercion, FieldKind, FieldSpec, TableSchema, ViewSchema, WriteSpec};
use crate::source::{
    ArgValue, ChangeDocument, DocumentSink, DocumentSource, WriteOptions, WriteResult, config_tree,
};
use crate::table::{GetArgs, Table};
use crate::value::{Scalar, Value};

/// One named item of a writable configuration table.
pub struct ConfigResource {
    schema: Arc<TableSchema>,
    view: Arc<ViewSchema>,
    write: WriteSpec,
    name: String,
    params: IndexMap<String, ArgValue>,
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn DocumentSink>,
    options: WriteOptions,
    current: IndexMap<String, Value>,
    desired: IndexMap<String, Value>,
    exists: Option<bool>,
}

impl ConfigResource {
    /// Create a resource for the item `name` of a writable table.
    pub fn new(
        schema: Arc<TableSchema>,
        name: impl Into<String>,
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn DocumentSink>,
    ) -> Result<Self> {
        let Some(write) = schema.write.clone() else {
            return Err(TableError::NotWritable {
                table: schema.name.clone(),
            }
            .into());
        };
        let view = match &schema.view {
            Some(view) => view.clone(),
            None => Arc::new(ViewSchema::new(schema.name.clone(), Default::default())),
        };

        Ok(Self {
            schema,
            view,
            write,
            name: name.into(),
            params: IndexMap::new(),
            source,
            sink,
            options: WriteOptions::default(),
            current: IndexMap::new(),
            desired: IndexMap::new(),
            exists: None,
        })
    }

    /// Supply a required key of an enclosing element (for example the zone
    /// pair of a security policy).
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Options passed to the sink on every write.
    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// The item's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch the item and reset both snapshots.
    ///
    /// Returns whether the item exists on the device.
    pub fn read(&mut self) -> Result<bool> {
        let mut args = GetArgs::new().key(self.name.as_str());
        for (name, value) in &self.params {
            args = args.arg(name.clone(), value.clone());
        }

        let mut table = Table::new(self.schema.clone(), self.source.clone());
        table.get(args)?;

        self.current.clear();
        self.desired.clear();
        let exists = match table.item(self.name.as_str())? {
            Some(view) => {
                for (field, spec) in &self.view.fields {
                    if matches!(spec.kind, FieldKind::Projection { .. }) {
                        self.current.insert(field.clone(), view.get(field)?);
                    }
                }
                true
            }
            None => false,
        };

        debug!("{} '{}': read, exists={}", self.schema.name, self.name, exists);
        self.exists = Some(exists);
        Ok(exists)
    }

    /// Whether the item existed at the last read or write; `None` before
    /// either.
    pub fn exists(&self) -> Option<bool> {
        self.exists
    }

    /// A field's value as last read.
    pub fn current(&self, field: &str) -> Option<&Value> {
        self.current.get(field)
    }

    /// Fields changed since the last read or write.
    pub fn desired(&self) -> &IndexMap<String, Value> {
        &self.desired
    }

    /// Stage a new value for a field.
    ///
    /// The value is converted to the field's type (so `"1514"` stages the
    /// same value an `int` field reads back) and then checked against the
    /// field's declared bounds and choices.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let spec = self.writable_field(field)?;
        let value = self.coerce(spec, value.into())?;
        self.validate(spec, &value)?;
        self.desired.insert(field.to_string(), value);
        Ok(self)
    }

    /// The change document [`ConfigResource::write`] would submit, or `None`
    /// when no field differs from its current value.
    pub fn diff(&self) -> Result<Option<ChangeDocument>> {
        if self.desired.is_empty() {
            return Ok(None);
        }

        let mut item = self.item_element()?;
        let mut changed = false;
        for (field, desired) in &self.desired {
            let spec = self.writable_field(field)?;
            let steps = self.field_steps(spec)?;
            let current = self.current.get(field).unwrap_or(&Value::Null);
            let writer = FieldWriter::for_field(spec, current, desired);
            changed |= writer.write(&mut item, &steps, current, desired);
        }

        Ok(changed.then(|| self.change(item)))
    }

    /// Submit staged changes.
    ///
    /// Returns `false` without contacting the sink when nothing changed. On
    /// success the staged values become the current ones; a rejected write
    /// leaves both snapshots untouched.
    pub fn write(&mut self) -> Result<bool> {
        let Some(change) = self.diff()? else {
            debug!("{} '{}': nothing to write", self.schema.name, self.name);
            return Ok(false);
        };

        debug!("{} '{}': writing {}", self.schema.name, self.name, change.to_xml());
        self.submit(&change)?;
        for (field, value) in self.desired.drain(..) {
            self.current.insert(field, value);
        }
        self.exists = Some(true);
        Ok(true)
    }

    /// Delete the item.
    pub fn delete(&mut self) -> Result<WriteResult> {
        let item = self.item_element()?.with_attribute("operation", "delete");
        let result = self.submit(&self.change(item))?;
        self.current.clear();
        self.desired.clear();
        self.exists = Some(false);
        Ok(result)
    }

    /// Mark the item active.
    pub fn activate(&mut self) -> Result<WriteResult> {
        let item = self.item_element()?.with_attribute("active", "active");
        self.submit(&self.change(item))
    }

    /// Mark the item inactive, keeping its configuration.
    pub fn deactivate(&mut self) -> Result<WriteResult> {
        let item = self.item_element()?.with_attribute("inactive", "inactive");
        self.submit(&self.change(item))
    }

    fn submit(&self, change: &ChangeDocument) -> Result<WriteResult> {
        Ok(self.sink.write(change, &self.options)?)
    }

    fn change(&self, item: Element) -> ChangeDocument {
        ChangeDocument::new(config_tree(
            &self.write.path,
            &self.schema.required_keys,
            &self.params,
            item,
        ))
    }

    /// The item element holding only its key leaf.
    fn item_element(&self) -> Result<Element> {
        let Some(last) = self.write.path.last() else {
            return Err(TableError::NotWritable {
                table: self.schema.name.clone(),
            }
            .into());
        };

        let key_steps: Vec<String> = match self.view.field(&self.write.key_field) {
            Some(spec) => self.field_steps(spec)?,
            None => vec![self.write.key_field.clone()],
        };
        let mut item = Element::new(last.as_str());
        item.ensure_path(&key_steps).text = Some(self.name.clone());
        Ok(item)
    }

    fn writable_field(&self, field: &str) -> Result<&FieldSpec> {
        let spec = self.view.field(field).ok_or_else(|| ResourceError::UnknownField {
            resource: self.schema.name.clone(),
            field: field.to_string(),
        })?;

        let writable = field != self.write.key_field
            && matches!(
                spec.kind,
                FieldKind::Projection {
                    coercion: Coercion::Str | Coercion::Int | Coercion::Float | Coercion::Flag,
                    ..
                }
            );
        if !writable {
            return Err(self.read_only(field));
        }
        Ok(spec)
    }

    /// Element path of a field below the item, through its group.
    fn field_steps(&self, spec: &FieldSpec) -> Result<Vec<String>> {
        let mut steps = Vec::new();
        if let Some(group) = &spec.group {
            match self.view.groups.get(group) {
                Some(locator) => {
                    let group_steps = locator.simple_steps().ok_or_else(|| self.read_only(&spec.name))?;
                    steps.extend(group_steps.into_iter().map(str::to_string));
                }
                None => steps.push(group.clone()),
            }
        }

        let own = spec
            .expr()
            .and_then(|e| e.simple_steps())
            .ok_or_else(|| self.read_only(&spec.name))?;
        steps.extend(own.into_iter().map(str::to_string));
        if steps.is_empty() {
            return Err(self.read_only(&spec.name));
        }
        Ok(steps)
    }

    fn coerce(&self, spec: &FieldSpec, value: Value) -> Result<Value> {
        let Some(coercion) = spec.coercion() else {
            return Err(self.read_only(&spec.name));
        };
        match value {
            Value::Null => Ok(Value::Null),
            Value::Scalar(scalar) => Ok(Value::Scalar(self.coerce_scalar(spec, coercion, &scalar)?)),
            Value::List(items) => items
                .iter()
                .map(|scalar| self.coerce_scalar(spec, coercion, scalar))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Value::Table(_) => Err(self.read_only(&spec.name)),
        }
    }

    fn coerce_scalar(&self, spec: &FieldSpec, coercion: &Coercion, scalar: &Scalar) -> Result<Scalar> {
        let converted = match (coercion, scalar) {
            // presence leaves only take booleans
            (Coercion::Flag, Scalar::Bool(_)) => Some(scalar.clone()),
            (Coercion::Flag, _) => None,
            _ => coercion.apply_scalar(scalar),
        };
        converted.ok_or_else(|| {
            ResourceError::InvalidValue {
                resource: self.schema.name.clone(),
                field: spec.name.clone(),
                value: scalar.to_text(),
                expected: coercion.type_name(),
            }
            .into()
        })
    }

    fn validate(&self, spec: &FieldSpec, value: &Value) -> Result<()> {
        let options = &spec.options;
        for scalar in value.to_list() {
            if options.min_value.is_some() || options.max_value.is_some() {
                let number = match &scalar {
                    Scalar::Int(n) => Some(*n),
                    Scalar::Str(s) => s.trim().parse().ok(),
                    _ => None,
                };
                let in_range = number.is_some_and(|n| {
                    options.min_value.is_none_or(|min| n >= min)
                        && options.max_value.is_none_or(|max| n <= max)
                });
                if !in_range {
                    return Err(ResourceError::OutOfRange {
                        resource: self.schema.name.clone(),
                        field: spec.name.clone(),
                        value: scalar.to_text(),
                        min: options.min_value.map_or("-inf".to_string(), |m| m.to_string()),
                        max: options.max_value.map_or("inf".to_string(), |m| m.to_string()),
                    }
                    .into());
                }
            }

            if !options.allowed.is_empty() && !options.allowed.contains(&scalar.to_text()) {
                return Err(ResourceError::NotAllowed {
                    resource: self.schema.name.clone(),
                    field: spec.name.clone(),
                    value: scalar.to_text(),
                    allowed: options.allowed.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn read_only(&self, field: &str) -> crate::error::Error {
        ResourceError::ReadOnly {
            resource: self.schema.name.clone(),
            field: field.to_string(),
        }
        .into()
    }
}

impl std::fmt::Debug for ConfigResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResource")
            .field("table", &self.schema.name)
            .field("name", &self.name)
            .field("exists", &self.exists)
            .field("desired", &self.desired.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    use crate::document::Document;
    use crate::error::{CollaboratorError, Error};
    use crate::schema::SchemaCatalog;
    use crate::source::{FetchRequest, FetchResult};

    const CATALOG: &str = r#"
UserTable:
  get: system/login/user
  set: system/login/user
  key-field: name
  view: UserView
UserView:
  groups:
    auth: authentication
  fields:
    name: name
    uid: { uid: { type: int, minValue: 100, maxValue: 64000 } }
    class: { class: { enum: [super-user, read-only, operator] } }
    full_name: full-name
    tags: tag
    locked: { locked: flag }
    ports: { port: int }
    admin: { class: True=super-user }
  fields_auth:
    password: encrypted-password
"#;

    const CONFIG: &str = r#"
<rpc-reply><data><configuration><system><login>
  <user>
    <name>ops</name>
    <uid>2000</uid>
    <class>operator</class>
    <full-name>Operations</full-name>
    <tag>a</tag>
    <tag>b</tag>
    <locked/>
    <port>22</port>
    <port>830</port>
    <authentication><encrypted-password>$6$old</encrypted-password></authentication>
  </user>
</login></system></configuration></data></rpc-reply>
"#;

    struct FakeSource;

    impl DocumentSource for FakeSource {
        fn fetch(&self, _request: &FetchRequest) -> std::result::Result<FetchResult, CollaboratorError> {
            let doc = Document::parse(CONFIG).map_err(|e| CollaboratorError::Other(Box::new(e)))?;
            Ok(FetchResult::Document(doc))
        }
    }

    #[derive(Default)]
    struct FakeSink {
        calls: Cell<usize>,
        written: RefCell<Vec<String>>,
        reject: bool,
    }

    impl DocumentSink for FakeSink {
        fn write(
            &self,
            change: &ChangeDocument,
            _options: &WriteOptions,
        ) -> std::result::Result<WriteResult, CollaboratorError> {
            self.calls.set(self.calls.get() + 1);
            if self.reject {
                return Err(CollaboratorError::Rejected {
                    message: "configuration database locked".into(),
                });
            }
            self.written.borrow_mut().push(change.to_xml());
            Ok(WriteResult {
                committed: true,
                message: None,
            })
        }
    }

    fn user(name: &str, sink: Arc<FakeSink>) -> ConfigResource {
        let catalog = SchemaCatalog::from_yaml_str(CATALOG).unwrap();
        let schema = catalog.table_schema("UserTable").unwrap();
        ConfigResource::new(schema, name, Arc::new(FakeSource), sink).unwrap()
    }

    fn wrap(user: &str) -> String {
        format!("<configuration><system><login><user>{}</user></login></system></configuration>", user)
    }

    #[test]
    fn test_read_current_values() {
        let mut user = user("ops", Arc::new(FakeSink::default()));
        assert_eq!(user.exists(), None);
        assert!(user.read().unwrap());
        assert_eq!(user.exists(), Some(true));
        assert_eq!(user.current("uid"), Some(&Value::from(2000i64)));
        assert_eq!(user.current("tags"), Some(&Value::from(vec!["a", "b"])));
        assert_eq!(user.current("locked"), Some(&Value::from(true)));
        assert_eq!(user.current("password"), Some(&Value::from("$6$old")));
        assert_eq!(user.current("admin"), Some(&Value::from(false)));
    }

    #[test]
    fn test_write_without_changes_is_noop() {
        let sink = Arc::new(FakeSink::default());
        let mut user = user("ops", sink.clone());
        user.read().unwrap();

        assert!(!user.write().unwrap());
        assert_eq!(sink.calls.get(), 0);

        // staging the value already there is not a change either
        user.set("class", "operator").unwrap();
        assert!(!user.write().unwrap());
        assert_eq!(sink.calls.get(), 0);
    }

    #[test]
    fn test_list_diff_change_document() {
        let sink = Arc::new(FakeSink::default());
        let mut user = user("ops", sink.clone());
        user.read().unwrap();

        user.set("tags", vec!["b", "c"]).unwrap();
        assert!(user.write().unwrap());
        assert_eq!(sink.calls.get(), 1);
        assert_eq!(
            sink.written.borrow()[0],
            wrap("<name>ops</name><tag operation=\"delete\">a</tag><tag>c</tag>")
        );
        assert_eq!(user.current("tags"), Some(&Value::from(vec!["b", "c"])));
        assert!(user.desired().is_empty());
    }

    #[test]
    fn test_text_values_take_the_field_type() {
        let sink = Arc::new(FakeSink::default());
        let mut user = user("ops", sink.clone());
        user.read().unwrap();
        assert_eq!(user.current("ports"), Some(&Value::from(vec![22i64, 830])));

        // the value already there, spelled as text
        user.set("uid", "2000").unwrap().set("ports", vec!["830", "22"]).unwrap();
        assert_eq!(user.desired()["uid"], Value::from(2000i64));
        assert!(user.diff().unwrap().is_none());
        assert!(!user.write().unwrap());
        assert_eq!(sink.calls.get(), 0);

        user.set("ports", vec!["22", "830", "8080"]).unwrap();
        assert!(user.write().unwrap());
        assert_eq!(
            sink.written.borrow()[0],
            wrap("<name>ops</name><port>8080</port>")
        );
        assert_eq!(user.current("ports"), Some(&Value::from(vec![22i64, 830, 8080])));
    }

    #[test]
    fn test_unconvertible_value_rejected() {
        let mut user = user("ops", Arc::new(FakeSink::default()));
        user.read().unwrap();

        assert!(matches!(
            user.set("uid", "jumbo"),
            Err(Error::Resource(ResourceError::InvalidValue { ref field, expected: "int", .. }))
                if field == "uid"
        ));
        assert!(matches!(
            user.set("ports", vec!["22", "ssh"]),
            Err(Error::Resource(ResourceError::InvalidValue { ref value, .. })) if value == "ssh"
        ));
        assert!(matches!(
            user.set("locked", "yes"),
            Err(Error::Resource(ResourceError::InvalidValue { expected: "bool", .. }))
        ));
        assert!(user.desired().is_empty());
    }

    #[test]
    fn test_scalar_flag_group_and_delete_writers() {
        let sink = Arc::new(FakeSink::default());
        let mut user = user("ops", sink.clone());
        user.read().unwrap();

        user.set("uid", 2001i64)
            .unwrap()
            .set("locked", false)
            .unwrap()
            .set("full_name", Value::Null)
            .unwrap()
            .set("password", "$6$new")
            .unwrap();
        let change = user.diff().unwrap().unwrap();
        assert_eq!(
            change.to_xml(),
            wrap(
                "<name>ops</name><uid>2001</uid><locked operation=\"delete\"/>\
                 <full-name operation=\"delete\"/>\
                 <authentication><encrypted-password>$6$new</encrypted-password></authentication>"
            )
        );
        assert_eq!(sink.calls.get(), 0);
    }

    #[test]
    fn test_validation() {
        let mut user = user("ops", Arc::new(FakeSink::default()));
        user.read().unwrap();

        assert!(matches!(
            user.set("uid", 5i64),
            Err(Error::Resource(ResourceError::OutOfRange { ref min, .. })) if min == "100"
        ));
        assert!(matches!(
            user.set("class", "admin"),
            Err(Error::Resource(ResourceError::NotAllowed { .. }))
        ));
        assert!(matches!(
            user.set("shell", "bash"),
            Err(Error::Resource(ResourceError::UnknownField { .. }))
        ));
        assert!(matches!(
            user.set("name", "other"),
            Err(Error::Resource(ResourceError::ReadOnly { .. }))
        ));
        assert!(matches!(
            user.set("admin", true),
            Err(Error::Resource(ResourceError::ReadOnly { .. }))
        ));
        assert!(user.desired().is_empty());
    }

    #[test]
    fn test_rejected_write_propagates() {
        let sink = Arc::new(FakeSink {
            reject: true,
            ..Default::default()
        });
        let mut user = user("ops", sink.clone());
        user.read().unwrap();
        user.set("class", "read-only").unwrap();

        let err = user.write().unwrap_err();
        assert!(matches!(err, Error::Collaborator(CollaboratorError::Rejected { .. })));
        assert_eq!(sink.calls.get(), 1);
        assert_eq!(user.current("class"), Some(&Value::from("operator")));
        assert_eq!(user.desired().len(), 1);
    }

    #[test]
    fn test_new_item_and_lifecycle_operations() {
        let sink = Arc::new(FakeSink::default());
        let mut user = user("guest", sink.clone());
        assert!(!user.read().unwrap());
        assert_eq!(user.current("uid"), None);

        user.set("class", "read-only").unwrap();
        assert!(user.write().unwrap());
        assert_eq!(user.exists(), Some(true));

        user.deactivate().unwrap();
        user.activate().unwrap();
        user.delete().unwrap();
        assert_eq!(user.exists(), Some(false));

        let written = sink.written.borrow();
        assert_eq!(written[0], wrap("<name>guest</name><class>read-only</class>"));
        assert_eq!(
            written[1],
            "<configuration><system><login><user inactive=\"inactive\"><name>guest</name></user></login></system></configuration>"
        );
        assert_eq!(
            written[2],
            "<configuration><system><login><user active=\"active\"><name>guest</name></user></login></system></configuration>"
        );
        assert_eq!(
            written[3],
            "<configuration><system><login><user operation=\"delete\"><name>guest</name></user></login></system></configuration>"
        );
    }

    #[test]
    fn test_read_only_table_is_not_writable() {
        let schema = Arc::new(
            TableSchema::new("UserTable", crate::schema::TableKind::Config, "system/login/user")
                .with_item("system/login/user")
                .unwrap(),
        );
        let err = ConfigResource::new(schema, "ops", Arc::new(FakeSource), Arc::new(FakeSink::default()))
            .unwrap_err();
        assert!(matches!(err, Error::Table(TableError::NotWritable { .. })));
    }
}
