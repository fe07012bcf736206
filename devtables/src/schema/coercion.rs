//! Type coercions applied to matched text.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::value::Scalar;

/// How matched text becomes a field value.
#[derive(Clone, Default)]
pub enum Coercion {
    /// Keep the trimmed text.
    #[default]
    Str,
    /// Parse as a signed integer.
    Int,
    /// Parse as a float.
    Float,
    /// `true` iff the projection matched at least one node.
    Flag,
    /// `polarity` iff the text matches, `!polarity` otherwise.
    Match {
        /// Test applied to the text.
        matcher: Matcher,
        /// Value produced on a match.
        polarity: bool,
    },
    /// Caller-provided conversion; `None` means the text is not convertible.
    Custom(CustomCoercion),
}

/// Text test used by [`Coercion::Match`].
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact string equality.
    Literal(String),
    /// Regex search.
    Regex(Regex),
}

impl Matcher {
    /// Check if `text` passes the test.
    pub fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Literal(lit) => text == lit,
            Matcher::Regex(re) => re.is_match(text),
        }
    }
}

/// A named conversion function.
#[derive(Clone)]
pub struct CustomCoercion {
    name: String,
    func: Arc<dyn Fn(&str) -> Option<Scalar> + Send + Sync>,
}

impl CustomCoercion {
    /// Wrap a conversion function.
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&str) -> Option<Scalar> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Name used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Coercion {
    /// Look up a built-in type tag (`str`, `int`, `float`, `flag`, `bool`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "str" | "string" => Some(Coercion::Str),
            "int" => Some(Coercion::Int),
            "float" => Some(Coercion::Float),
            "flag" | "bool" => Some(Coercion::Flag),
            _ => None,
        }
    }

    /// Parse a boolean producer: `True=literal`, `False=literal`,
    /// `True=regex(pattern)` or `False=regex(pattern)`.
    ///
    /// Returns `Ok(None)` when `spec` is not a producer at all.
    pub fn from_producer(spec: &str) -> Result<Option<Self>, regex::Error> {
        let (polarity, rest) = if let Some(rest) = spec.strip_prefix("True=") {
            (true, rest)
        } else if let Some(rest) = spec.strip_prefix("False=") {
            (false, rest)
        } else {
            return Ok(None);
        };

        let matcher = match rest
            .strip_prefix("regex(")
            .and_then(|r| r.strip_suffix(')'))
        {
            Some(pattern) => Matcher::Regex(Regex::new(pattern)?),
            None => Matcher::Literal(rest.to_string()),
        };

        Ok(Some(Coercion::Match { matcher, polarity }))
    }

    /// Check if this is the existence-as-boolean coercion.
    pub fn is_flag(&self) -> bool {
        matches!(self, Coercion::Flag)
    }

    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Coercion::Str => "str",
            Coercion::Int => "int",
            Coercion::Float => "float",
            Coercion::Flag | Coercion::Match { .. } => "bool",
            Coercion::Custom(_) => "custom",
        }
    }

    /// Convert matched text. `None` means the text is not convertible.
    ///
    /// An empty string is converted like any other text.
    pub fn apply(&self, text: &str) -> Option<Scalar> {
        match self {
            Coercion::Str => Some(Scalar::Str(text.to_string())),
            Coercion::Int => text.parse().ok().map(Scalar::Int),
            Coercion::Float => text.parse().ok().map(Scalar::Float),
            Coercion::Flag => Some(Scalar::Bool(true)),
            Coercion::Match { matcher, polarity } => {
                let hit = matcher.is_match(text);
                Some(Scalar::Bool(if hit { *polarity } else { !*polarity }))
            }
            Coercion::Custom(custom) => (custom.func)(text),
        }
    }

    /// Convert an already-typed value (text-table cells).
    pub fn apply_scalar(&self, value: &Scalar) -> Option<Scalar> {
        match (self, value) {
            (Coercion::Int, Scalar::Int(_)) => Some(value.clone()),
            (Coercion::Float, Scalar::Int(n)) => Some(Scalar::Float(*n as f64)),
            (Coercion::Float, Scalar::Float(_)) => Some(value.clone()),
            (Coercion::Str, Scalar::Str(_)) => Some(value.clone()),
            _ => self.apply(&value.to_text()),
        }
    }
}

impl fmt::Debug for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coercion::Str => f.write_str("Str"),
            Coercion::Int => f.write_str("Int"),
            Coercion::Float => f.write_str("Float"),
            Coercion::Flag => f.write_str("Flag"),
            Coercion::Match { matcher, polarity } => f
                .debug_struct("Match")
                .field("matcher", matcher)
                .field("polarity", polarity)
                .finish(),
            Coercion::Custom(custom) => write!(f, "Custom({})", custom.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tags() {
        assert!(Coercion::from_tag("flag").unwrap().is_flag());
        assert!(Coercion::from_tag("bool").unwrap().is_flag());
        assert_eq!(Coercion::from_tag("int").unwrap().type_name(), "int");
        assert!(Coercion::from_tag("table").is_none());
    }

    #[test]
    fn test_int_and_empty_text() {
        assert_eq!(Coercion::Int.apply("1514"), Some(Scalar::Int(1514)));
        assert_eq!(Coercion::Int.apply("n/a"), None);
        assert_eq!(Coercion::Int.apply(""), None);
        assert_eq!(Coercion::Str.apply(""), Some(Scalar::Str(String::new())));
    }

    #[test]
    fn test_literal_producers() {
        let up = Coercion::from_producer("True=up").unwrap().unwrap();
        assert_eq!(up.apply("up"), Some(Scalar::Bool(true)));
        assert_eq!(up.apply("down"), Some(Scalar::Bool(false)));

        let down = Coercion::from_producer("False=down").unwrap().unwrap();
        assert_eq!(down.apply("down"), Some(Scalar::Bool(false)));
        assert_eq!(down.apply("up"), Some(Scalar::Bool(true)));
    }

    #[test]
    fn test_regex_producers() {
        let established = Coercion::from_producer("True=regex(^Establ)").unwrap().unwrap();
        assert_eq!(established.apply("Established"), Some(Scalar::Bool(true)));
        assert_eq!(established.apply("Active"), Some(Scalar::Bool(false)));

        let idle = Coercion::from_producer("False=regex(Idle|Connect)").unwrap().unwrap();
        assert_eq!(idle.apply("Connect"), Some(Scalar::Bool(false)));
        assert_eq!(idle.apply("Established"), Some(Scalar::Bool(true)));

        assert!(Coercion::from_producer("True=regex(()").is_err());
        assert!(Coercion::from_producer("up").unwrap().is_none());
    }

    #[test]
    fn test_custom_coercion() {
        let speed = Coercion::Custom(CustomCoercion::new("speed", |text| {
            text.strip_suffix("mbps")
                .and_then(|n| n.parse::<i64>().ok())
                .map(Scalar::Int)
        }));
        assert_eq!(speed.apply("1000mbps"), Some(Scalar::Int(1000)));
        assert_eq!(speed.apply("auto"), None);
        assert_eq!(format!("{:?}", speed), "Custom(speed)");
    }

    #[test]
    fn test_apply_scalar() {
        assert_eq!(Coercion::Str.apply_scalar(&Scalar::Int(5)), Some(Scalar::Str("5".into())));
        assert_eq!(Coercion::Int.apply_scalar(&Scalar::Str("5".into())), Some(Scalar::Int(5)));
        assert_eq!(Coercion::Float.apply_scalar(&Scalar::Int(2)), Some(Scalar::Float(2.0)));
    }
}
