//! Projection expressions.
//!
//! A deliberately small XPath subset, enough for the table and view
//! catalogs found in practice:
//!
//! ```text
//! name                     child element
//! a/b/c                    path of child steps
//! ./a, ../a, ..            self and parent steps
//! //a, a//b                descendants
//! *                        any child element
//! @attr, a/@attr           attribute value
//! a/text()                 direct text
//! a[2]                     position (1-based, per context node)
//! a[b], a[b='x']           existence / equality predicates
//! /root/a                  absolute path from the document
//! a | b                    union: first alternative that matches wins
//! ```
//!
//! Union members are tried in declaration order and the first one that
//! selects anything is the result. This differs from XPath's set union on
//! purpose: catalogs use `new-name | old-name` to follow schema renames.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::{Document, Node, NodeId, local_name};
use crate::error::ExprError;

/// A parsed projection expression.
#[derive(Debug, Clone)]
pub struct Expr {
    source: String,
    alternatives: Vec<Path>,
}

#[derive(Debug, Clone)]
struct Path {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
    Parent,
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
}

#[derive(Debug, Clone)]
enum Predicate {
    Position(usize),
    Exists(Path),
    Equals(Path, String),
}

/// One item selected by an expression.
#[derive(Debug, Clone, Copy)]
pub enum Selection<'a> {
    /// An element.
    Node(Node<'a>),
    /// An attribute value.
    Attribute(&'a str),
    /// The direct text of an element.
    Text(&'a str),
}

impl<'a> Selection<'a> {
    /// Text value of the selection, whitespace-trimmed.
    pub fn text(&self) -> &'a str {
        match self {
            Selection::Node(n) => n.text(),
            Selection::Attribute(v) => v.trim(),
            Selection::Text(t) => t.trim(),
        }
    }

    /// The selected element, if this selection is one.
    pub fn node(&self) -> Option<Node<'a>> {
        match self {
            Selection::Node(n) => Some(*n),
            _ => None,
        }
    }
}

/// Evaluation context: either the virtual document node or an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Hit {
    Document,
    Node(NodeId),
    Attribute(NodeId, usize),
    Text(NodeId),
}

impl Expr {
    /// Parse an expression.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let mut parser = Parser::new(source);
        let alternatives = parser.parse_union()?;
        Ok(Self {
            source: source.trim().to_string(),
            alternatives,
        })
    }

    /// The expression text as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Number of union alternatives.
    pub fn alternatives(&self) -> usize {
        self.alternatives.len()
    }

    /// Evaluate against `context`, returning the result of the first union
    /// member that selects anything.
    pub fn select<'a>(&self, context: Node<'a>) -> Vec<Selection<'a>> {
        let doc = context.document();
        for path in &self.alternatives {
            let hits = path.evaluate(doc, Hit::Node(context.id()));
            if !hits.is_empty() {
                return hits.into_iter().filter_map(|h| to_selection(doc, h)).collect();
            }
        }
        Vec::new()
    }

    /// Evaluate and keep only element selections.
    pub fn select_nodes<'a>(&self, context: Node<'a>) -> Vec<Node<'a>> {
        self.select(context).iter().filter_map(Selection::node).collect()
    }

    /// First selected text value.
    pub fn first_text<'a>(&self, context: Node<'a>) -> Option<&'a str> {
        self.select(context).first().map(Selection::text)
    }

    /// Plain `a/b/c` child-step path segments, if the expression is one.
    ///
    /// Used by writers to mirror a field's location in a change document.
    pub fn simple_steps(&self) -> Option<Vec<&str>> {
        if self.alternatives.len() != 1 {
            return None;
        }
        let path = &self.alternatives[0];
        if path.absolute {
            return None;
        }
        let mut out = Vec::new();
        for step in &path.steps {
            match (&step.axis, &step.test) {
                (Axis::SelfNode, _) if step.predicates.is_empty() => continue,
                (Axis::Child, NodeTest::Name(n)) if step.predicates.is_empty() => {
                    out.push(n.as_str())
                }
                _ => return None,
            }
        }
        Some(out)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Expr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expr::parse(s)
    }
}

fn to_selection(doc: &Document, hit: Hit) -> Option<Selection<'_>> {
    match hit {
        Hit::Document => None,
        Hit::Node(id) => Some(Selection::Node(doc.node(id))),
        Hit::Attribute(id, idx) => Some(Selection::Attribute(&doc.data(id).attributes[idx].1)),
        Hit::Text(id) => Some(Selection::Text(&doc.data(id).text)),
    }
}

impl Path {
    fn evaluate(&self, doc: &Document, start: Hit) -> Vec<Hit> {
        let mut current = vec![if self.absolute { Hit::Document } else { start }];
        for step in &self.steps {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for ctx in &current {
                for hit in step.apply(doc, *ctx) {
                    if seen.insert(hit) {
                        next.push(hit);
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }
}

impl Step {
    fn apply(&self, doc: &Document, ctx: Hit) -> Vec<Hit> {
        let candidates: Vec<Hit> = match (ctx, self.axis) {
            (Hit::Document, Axis::Child) => vec![Hit::Node(NodeId(0))],
            (Hit::Document, Axis::Descendant) => {
                let mut all = vec![Hit::Node(NodeId(0))];
                all.extend(doc.root().descendants().iter().map(|n| Hit::Node(n.id())));
                all
            }
            (Hit::Document, Axis::SelfNode) => vec![Hit::Document],
            (Hit::Document, _) => Vec::new(),
            (Hit::Node(id), Axis::Child) => {
                if self.test == NodeTest::Text {
                    vec![Hit::Text(id)]
                } else {
                    doc.data(id).children.iter().map(|&c| Hit::Node(c)).collect()
                }
            }
            (Hit::Node(id), Axis::Descendant) => doc
                .node(id)
                .descendants()
                .iter()
                .map(|n| Hit::Node(n.id()))
                .collect(),
            (Hit::Node(id), Axis::SelfNode) => vec![Hit::Node(id)],
            (Hit::Node(id), Axis::Parent) => match doc.data(id).parent {
                Some(p) => vec![Hit::Node(p)],
                None => vec![Hit::Document],
            },
            (Hit::Node(id), Axis::Attribute) => match &self.test {
                NodeTest::Name(name) => doc
                    .data(id)
                    .attributes
                    .iter()
                    .position(|(k, _)| k == name)
                    .map(|idx| vec![Hit::Attribute(id, idx)])
                    .unwrap_or_default(),
                _ => (0..doc.data(id).attributes.len())
                    .map(|idx| Hit::Attribute(id, idx))
                    .collect(),
            },
            // attributes and text have no children
            (Hit::Attribute(..), _) | (Hit::Text(_), _) => Vec::new(),
        };

        let mut matched: Vec<Hit> = candidates
            .into_iter()
            .filter(|hit| self.test_matches(doc, *hit))
            .collect();

        for predicate in &self.predicates {
            matched = match predicate {
                Predicate::Position(n) => matched.into_iter().nth(n - 1).into_iter().collect(),
                Predicate::Exists(path) => matched
                    .into_iter()
                    .filter(|hit| !path.evaluate(doc, *hit).is_empty())
                    .collect(),
                Predicate::Equals(path, literal) => matched
                    .into_iter()
                    .filter(|hit| {
                        path.evaluate(doc, *hit)
                            .into_iter()
                            .filter_map(|h| to_selection(doc, h))
                            .any(|s| s.text() == literal)
                    })
                    .collect(),
            };
        }
        matched
    }

    fn test_matches(&self, doc: &Document, hit: Hit) -> bool {
        match (&self.test, hit) {
            (_, Hit::Attribute(..)) | (NodeTest::Text, _) => true,
            (_, Hit::Document) => self.axis == Axis::SelfNode || self.axis == Axis::Parent,
            (NodeTest::Any, Hit::Node(_)) => true,
            (NodeTest::Name(name), Hit::Node(id)) => doc.data(id).name == *name,
            (NodeTest::Name(_), Hit::Text(_)) => false,
            (NodeTest::Any, Hit::Text(_)) => false,
        }
    }
}

struct Parser<'s> {
    source: &'s str,
    chars: Vec<char>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> ExprError {
        match self.peek() {
            Some(found) => ExprError::Unexpected {
                expr: self.source.to_string(),
                offset: self.pos,
                found,
            },
            None => ExprError::Empty,
        }
    }

    fn parse_union(&mut self) -> Result<Vec<Path>, ExprError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_ws();
            alternatives.push(self.parse_path()?);
            self.skip_ws();
            match self.peek() {
                Some('|') => self.pos += 1,
                None => break,
                Some(_) => return Err(self.unexpected()),
            }
        }
        Ok(alternatives)
    }

    fn parse_path(&mut self) -> Result<Path, ExprError> {
        let mut absolute = false;
        let mut axis = Axis::Child;

        if self.peek() == Some('/') {
            absolute = true;
            self.pos += 1;
            if self.peek() == Some('/') {
                self.pos += 1;
                axis = Axis::Descendant;
            }
        }

        let mut steps = Vec::new();
        loop {
            steps.push(self.parse_step(axis)?);
            if self.peek() != Some('/') {
                break;
            }
            self.pos += 1;
            axis = if self.peek() == Some('/') {
                self.pos += 1;
                Axis::Descendant
            } else {
                Axis::Child
            };
        }
        Ok(Path { absolute, steps })
    }

    fn parse_step(&mut self, axis: Axis) -> Result<Step, ExprError> {
        let (axis, test) = match self.peek() {
            Some('.') if self.peek_at(1) == Some('.') => {
                self.pos += 2;
                (Axis::Parent, NodeTest::Any)
            }
            Some('.') if !self.peek_at(1).is_some_and(is_name_char) => {
                self.pos += 1;
                (Axis::SelfNode, NodeTest::Any)
            }
            Some('*') => {
                self.pos += 1;
                (axis, NodeTest::Any)
            }
            Some('@') => {
                self.pos += 1;
                if self.peek() == Some('*') {
                    self.pos += 1;
                    (Axis::Attribute, NodeTest::Any)
                } else {
                    let name = self.parse_name()?;
                    (Axis::Attribute, NodeTest::Name(local_name(&name).to_string()))
                }
            }
            Some(c) if is_name_char(c) => {
                let name = self.parse_name()?;
                if name == "text" && self.peek() == Some('(') && self.peek_at(1) == Some(')') {
                    self.pos += 2;
                    (Axis::Child, NodeTest::Text)
                } else {
                    (axis, NodeTest::Name(local_name(&name).to_string()))
                }
            }
            _ => return Err(self.unexpected()),
        };

        let mut predicates = Vec::new();
        while self.peek() == Some('[') {
            self.pos += 1;
            predicates.push(self.parse_predicate()?);
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_name(&mut self) -> Result<String, ExprError> {
        let start = self.pos;
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.unexpected());
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_predicate(&mut self) -> Result<Predicate, ExprError> {
        self.skip_ws();
        let predicate = if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[start..self.pos].iter().collect();
            match digits.parse::<usize>() {
                Ok(n) if n > 0 => Predicate::Position(n),
                _ => {
                    self.pos = start;
                    return Err(self.unexpected());
                }
            }
        } else {
            let path = self.parse_path()?;
            self.skip_ws();
            if self.peek() == Some('=') {
                self.pos += 1;
                self.skip_ws();
                Predicate::Equals(path, self.parse_literal()?)
            } else {
                Predicate::Exists(path)
            }
        };

        self.skip_ws();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(predicate)
            }
            Some(_) => Err(self.unexpected()),
            None => Err(ExprError::Unterminated {
                expr: self.source.to_string(),
                what: "predicate",
            }),
        }
    }

    fn parse_literal(&mut self) -> Result<String, ExprError> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.unexpected()),
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let literal = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                return Ok(literal);
            }
            self.pos += 1;
        }
        Err(ExprError::Unterminated {
            expr: self.source.to_string(),
            what: "string literal",
        })
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"
        <route-information>
          <route-table>
            <table-name>inet.0</table-name>
            <rt><rt-destination>10.0.0.0/8</rt-destination>
                <rt-entry><protocol-name>Static</protocol-name><active-tag>*</active-tag></rt-entry>
                <rt-entry><protocol-name>BGP</protocol-name></rt-entry></rt>
            <rt><rt-destination>192.168.0.0/16</rt-destination>
                <rt-entry><protocol-name>Direct</protocol-name></rt-entry></rt>
          </route-table>
          <route-table format="brief"><table-name>inet6.0</table-name></route-table>
        </route-information>"#;

    fn texts(expr: &str, doc: &Document) -> Vec<String> {
        Expr::parse(expr)
            .unwrap()
            .select(doc.root())
            .iter()
            .map(|s| s.text().to_string())
            .collect()
    }

    #[test]
    fn test_child_path() {
        let doc = Document::parse(XML).unwrap();
        assert_eq!(texts("route-table/table-name", &doc), vec!["inet.0", "inet6.0"]);
    }

    #[test]
    fn test_descendant_and_absolute() {
        let doc = Document::parse(XML).unwrap();
        assert_eq!(texts("//protocol-name", &doc), vec!["Static", "BGP", "Direct"]);
        assert_eq!(texts("/route-information/route-table/table-name", &doc).len(), 2);
        assert_eq!(texts("route-table//protocol-name", &doc).len(), 3);
    }

    #[test]
    fn test_predicates() {
        let doc = Document::parse(XML).unwrap();
        assert_eq!(texts("route-table[2]/table-name", &doc), vec!["inet6.0"]);
        assert_eq!(
            texts("route-table/rt[rt-destination='192.168.0.0/16']/rt-entry/protocol-name", &doc),
            vec!["Direct"]
        );
        assert_eq!(
            texts("route-table/rt/rt-entry[active-tag]/protocol-name", &doc),
            vec!["Static"]
        );
        // position applies per context node
        assert_eq!(
            texts("route-table/rt/rt-entry[1]/protocol-name", &doc),
            vec!["Static", "Direct"]
        );
    }

    #[test]
    fn test_attribute_and_text() {
        let doc = Document::parse(XML).unwrap();
        assert_eq!(texts("route-table/@format", &doc), vec!["brief"]);
        assert_eq!(texts("route-table/table-name/text()", &doc), vec!["inet.0", "inet6.0"]);
    }

    #[test]
    fn test_parent_and_self() {
        let doc = Document::parse(XML).unwrap();
        let rt = Expr::parse("route-table/rt").unwrap().select_nodes(doc.root());
        let up = Expr::parse("../table-name").unwrap();
        assert_eq!(up.first_text(rt[0]), Some("inet.0"));
        let me = Expr::parse("./rt-destination").unwrap();
        assert_eq!(me.first_text(rt[1]), Some("192.168.0.0/16"));
        // both rt nodes share one parent
        let parents = Expr::parse("route-table/rt/..").unwrap().select(doc.root());
        assert_eq!(parents.len(), 1);
    }

    #[test]
    fn test_union_first_match_wins() {
        let doc = Document::parse(XML).unwrap();
        assert_eq!(texts("missing | route-table/table-name", &doc).len(), 2);
        assert_eq!(
            texts("route-table[1]/table-name | route-table/table-name", &doc),
            vec!["inet.0"]
        );
        assert!(texts("missing | also-missing", &doc).is_empty());
    }

    #[test]
    fn test_simple_steps() {
        assert_eq!(
            Expr::parse("authentication/encrypted-password").unwrap().simple_steps(),
            Some(vec!["authentication", "encrypted-password"])
        );
        assert_eq!(Expr::parse("./name").unwrap().simple_steps(), Some(vec!["name"]));
        assert!(Expr::parse("a | b").unwrap().simple_steps().is_none());
        assert!(Expr::parse("a[1]").unwrap().simple_steps().is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("a[").is_err());
        assert!(Expr::parse("a[b='x]").is_err());
        assert!(Expr::parse("a b").is_err());
        assert!(Expr::parse("a[0]").is_err());
    }
}
