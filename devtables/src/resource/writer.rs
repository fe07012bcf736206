//! Per-field change writers.

use crate::document::Element;
use crate::schema::FieldSpec;
use crate::value::{Scalar, Value};

/// How one field's change is written into a change document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWriter {
    /// Write the new value in place; `Null` deletes the leaf.
    Replace,
    /// Presence leaf: create it for `true`, delete it for `false`.
    Flag,
    /// Multi-valued leaf: delete what was dropped, add what is new.
    ListDiff,
}

impl FieldWriter {
    /// Pick the writer for a field given its old and new values.
    pub fn for_field(spec: &FieldSpec, current: &Value, desired: &Value) -> Self {
        if spec.coercion().is_some_and(|c| c.is_flag()) {
            FieldWriter::Flag
        } else if matches!(current, Value::List(_)) || matches!(desired, Value::List(_)) {
            FieldWriter::ListDiff
        } else {
            FieldWriter::Replace
        }
    }

    /// Write the change below `item` at `steps`.
    ///
    /// Returns `false` (and leaves `item` untouched) when there is nothing
    /// to change.
    pub fn write(&self, item: &mut Element, steps: &[String], current: &Value, desired: &Value) -> bool {
        match self {
            FieldWriter::Replace => {
                if current == desired {
                    return false;
                }
                let leaf = item.ensure_path(steps);
                match desired.as_scalar() {
                    Some(value) => leaf.text = Some(value.to_text()),
                    None => {
                        leaf.attributes.insert("operation".into(), "delete".into());
                    }
                }
                true
            }
            FieldWriter::Flag => {
                let want = desired.as_bool().unwrap_or(false);
                if current.as_bool().unwrap_or(false) == want {
                    return false;
                }
                let leaf = item.ensure_path(steps);
                if !want {
                    leaf.attributes.insert("operation".into(), "delete".into());
                }
                true
            }
            FieldWriter::ListDiff => {
                let Some((leaf, parents)) = steps.split_last() else {
                    return false;
                };
                let current = dedup(current.to_list());
                let desired = dedup(desired.to_list());
                let deletes: Vec<&Scalar> = current.iter().filter(|v| !desired.contains(v)).collect();
                let adds: Vec<&Scalar> = desired.iter().filter(|v| !current.contains(v)).collect();
                if deletes.is_empty() && adds.is_empty() {
                    return false;
                }

                let container = item.ensure_path(parents);
                for value in deletes {
                    container.push(
                        Element::new(leaf.as_str())
                            .with_attribute("operation", "delete")
                            .with_text(value.to_text()),
                    );
                }
                for value in adds {
                    container.push(Element::new(leaf.as_str()).with_text(value.to_text()));
                }
                true
            }
        }
    }
}

fn dedup(values: Vec<Scalar>) -> Vec<Scalar> {
    let mut out: Vec<Scalar> = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Expr;
    use crate::schema::Coercion;

    fn steps(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    fn field(coercion: Coercion) -> FieldSpec {
        FieldSpec::projection("f", Expr::parse("f").unwrap(), coercion)
    }

    #[test]
    fn test_writer_selection() {
        let str_field = field(Coercion::Str);
        assert_eq!(
            FieldWriter::for_field(&str_field, &Value::Null, &Value::from("x")),
            FieldWriter::Replace
        );
        assert_eq!(
            FieldWriter::for_field(&str_field, &Value::from("a"), &Value::from(vec!["a", "b"])),
            FieldWriter::ListDiff
        );
        assert_eq!(
            FieldWriter::for_field(&field(Coercion::Flag), &Value::Null, &Value::from(true)),
            FieldWriter::Flag
        );
    }

    #[test]
    fn test_replace() {
        let mut item = Element::new("user");
        assert!(!FieldWriter::Replace.write(&mut item, &steps("uid"), &Value::from(1i64), &Value::from(1i64)));
        assert!(item.is_leaf_empty());

        assert!(FieldWriter::Replace.write(&mut item, &steps("then/count"), &Value::Null, &Value::from(5i64)));
        assert!(FieldWriter::Replace.write(&mut item, &steps("then/log"), &Value::from("x"), &Value::Null));
        assert_eq!(
            item.to_xml(),
            "<user><then><count>5</count><log operation=\"delete\"/></then></user>"
        );
    }

    #[test]
    fn test_flag() {
        let mut item = Element::new("interface");
        assert!(!FieldWriter::Flag.write(&mut item, &steps("disable"), &Value::Null, &Value::from(false)));
        assert!(FieldWriter::Flag.write(&mut item, &steps("disable"), &Value::Null, &Value::from(true)));
        assert!(FieldWriter::Flag.write(&mut item, &steps("traceoptions"), &Value::from(true), &Value::from(false)));
        assert_eq!(
            item.to_xml(),
            "<interface><disable/><traceoptions operation=\"delete\"/></interface>"
        );
    }

    #[test]
    fn test_list_diff_symmetric_difference() {
        let mut item = Element::new("user");
        let changed = FieldWriter::ListDiff.write(
            &mut item,
            &steps("tag"),
            &Value::from(vec!["a", "b"]),
            &Value::from(vec!["b", "c", "c"]),
        );
        assert!(changed);
        assert_eq!(
            item.to_xml(),
            "<user><tag operation=\"delete\">a</tag><tag>c</tag></user>"
        );
    }

    #[test]
    fn test_list_diff_order_insensitive() {
        let mut item = Element::new("user");
        assert!(!FieldWriter::ListDiff.write(
            &mut item,
            &steps("apply-groups"),
            &Value::from(vec!["a", "b"]),
            &Value::from(vec!["b", "a", "a"]),
        ));
        assert!(item.is_leaf_empty());
    }
}
