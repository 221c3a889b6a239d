//! In-memory RDF triple graph
//!
//! A subject-indexed triple set loaded from N-Triples (line reader below) or
//! Turtle (through `oxttl`). It backs the shape and data lookups of the
//! justification builder and the graph context retriever when no external
//! triple store is available.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::error::Result;
use crate::justification::{DataLookup, ShapeLookup};
use crate::vocab::{local_name, SH};

/// SHACL predicates that structure a shape rather than constrain values
const STRUCTURAL_PREDICATES: &[&str] = &[
    "path",
    "targetClass",
    "targetNode",
    "targetSubjectsOf",
    "targetObjectsOf",
    "property",
    "name",
    "description",
    "message",
    "severity",
    "order",
    "group",
    "deactivated",
];

/// An RDF term
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal {
        lexical: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    /// Build a node term from an identifier (`_:b0` becomes a blank node)
    pub fn node(id: &str) -> Self {
        let id = id.trim().trim_start_matches('<').trim_end_matches('>');
        match id.strip_prefix("_:") {
            Some(label) => Term::BlankNode(label.to_string()),
            None => Term::Iri(id.to_string()),
        }
    }

    pub fn literal(lexical: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    /// Identifier used for indexing (`_:label` for blank nodes)
    pub fn key(&self) -> String {
        match self {
            Term::Iri(iri) => iri.clone(),
            Term::BlankNode(label) => format!("_:{}", label),
            Term::Literal { lexical, .. } => lexical.clone(),
        }
    }

    /// Short human-readable form: IRI local name or literal lexical value
    pub fn short(&self) -> String {
        match self {
            Term::Iri(iri) => local_name(iri).to_string(),
            Term::BlankNode(label) => format!("_:{}", label),
            Term::Literal { lexical, .. } => lexical.clone(),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", iri),
            Term::BlankNode(label) => write!(f, "_:{}", label),
            Term::Literal {
                lexical,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape_literal(lexical))?;
                if let Some(lang) = language {
                    write!(f, "@{}", lang)
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{}>", dt)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// One RDF statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    /// N-Triples rendering, terminated with ` .`
    pub fn to_ntriples(&self) -> String {
        self.to_string()
    }

    fn from_oxrdf(triple: oxrdf::Triple) -> std::result::Result<Self, String> {
        let subject = match triple.subject {
            oxrdf::Subject::NamedNode(node) => Term::Iri(node.into_string()),
            oxrdf::Subject::BlankNode(node) => Term::BlankNode(node.as_str().to_string()),
            #[allow(unreachable_patterns)]
            _ => return Err("quoted triples are not supported".into()),
        };
        let object = match triple.object {
            oxrdf::Term::NamedNode(node) => Term::Iri(node.into_string()),
            oxrdf::Term::BlankNode(node) => Term::BlankNode(node.as_str().to_string()),
            oxrdf::Term::Literal(literal) => {
                let (lexical, datatype, language) = literal.destruct();
                Term::Literal {
                    lexical,
                    datatype: datatype.map(oxrdf::NamedNode::into_string),
                    language,
                }
            }
            #[allow(unreachable_patterns)]
            _ => return Err("quoted triples are not supported".into()),
        };
        Ok(Triple::new(subject, triple.predicate.into_string(), object))
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Serialization of an RDF document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
    NTriples,
    Turtle,
}

impl RdfFormat {
    /// `.nt` files are N-Triples; everything else is read as Turtle, which
    /// also accepts N-Triples content
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("nt") => RdfFormat::NTriples,
            _ => RdfFormat::Turtle,
        }
    }
}

impl fmt::Display for RdfFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdfFormat::NTriples => write!(f, "N-Triples"),
            RdfFormat::Turtle => write!(f, "Turtle"),
        }
    }
}

/// Syntax error in an RDF document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{format} parse error{}: {message}", at_line(.line))]
pub struct GraphParseError {
    pub format: RdfFormat,
    /// 1-based line, when the parser reports one separately from the message
    pub line: Option<usize>,
    pub message: String,
}

impl GraphParseError {
    fn ntriples(line: usize, message: impl Into<String>) -> Self {
        Self {
            format: RdfFormat::NTriples,
            line: Some(line),
            message: message.into(),
        }
    }

    fn turtle(message: impl Into<String>) -> Self {
        Self {
            format: RdfFormat::Turtle,
            line: None,
            message: message.into(),
        }
    }
}

fn at_line(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {}", l)).unwrap_or_default()
}

/// Subject-indexed set of triples
#[derive(Debug, Clone, Default)]
pub struct TripleGraph {
    triples: Vec<Triple>,
    by_subject: HashMap<String, Vec<usize>>,
}

impl TripleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an N-Triples document
    pub fn parse_ntriples(input: &str) -> std::result::Result<Self, GraphParseError> {
        let mut graph = Self::new();
        for (idx, line) in input.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let triple = parse_line(trimmed).map_err(|msg| GraphParseError::ntriples(line_no, msg))?;
            graph.insert(triple);
        }
        Ok(graph)
    }

    /// Parse a Turtle document
    pub fn parse_turtle(input: &str) -> std::result::Result<Self, GraphParseError> {
        let mut graph = Self::new();
        for parsed in oxttl::TurtleParser::new().for_slice(input.as_bytes()) {
            let triple = parsed.map_err(|e| GraphParseError::turtle(e.to_string()))?;
            graph.insert(Triple::from_oxrdf(triple).map_err(GraphParseError::turtle)?);
        }
        Ok(graph)
    }

    /// Parse `input` in the given format
    pub fn parse(input: &str, format: RdfFormat) -> std::result::Result<Self, GraphParseError> {
        match format {
            RdfFormat::NTriples => Self::parse_ntriples(input),
            RdfFormat::Turtle => Self::parse_turtle(input),
        }
    }

    /// Insert a triple, ignoring exact duplicates
    pub fn insert(&mut self, triple: Triple) {
        let key = triple.subject.key();
        if let Some(indices) = self.by_subject.get(&key) {
            if indices.iter().any(|&i| self.triples[i] == triple) {
                return;
            }
        }
        self.by_subject
            .entry(key)
            .or_default()
            .push(self.triples.len());
        self.triples.push(triple);
    }

    /// Add every triple of another graph
    pub fn extend(&mut self, other: TripleGraph) {
        for triple in other.triples {
            self.insert(triple);
        }
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Triples with the given subject, in insertion order
    pub fn about<'a>(&'a self, subject: &str) -> impl Iterator<Item = &'a Triple> + 'a {
        let key = Term::node(subject).key();
        self.by_subject
            .get(&key)
            .into_iter()
            .flatten()
            .map(move |&i| &self.triples[i])
    }

    /// Objects of (subject, predicate)
    pub fn objects<'a>(
        &'a self,
        subject: &str,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a Term> + 'a {
        let predicate = strip_brackets(predicate);
        self.about(subject)
            .filter(move |t| t.predicate == predicate)
            .map(|t| &t.object)
    }

    /// Subjects having (predicate, object)
    pub fn subjects_with<'a>(
        &'a self,
        predicate: &'a str,
        object: &'a Term,
    ) -> impl Iterator<Item = &'a Term> + 'a {
        let predicate = strip_brackets(predicate);
        self.triples
            .iter()
            .filter(move |t| t.predicate == predicate && &t.object == object)
            .map(|t| &t.subject)
    }

    /// Whether the subject has any value for the predicate
    pub fn has_property(&self, subject: &str, predicate: &str) -> bool {
        self.objects(subject, predicate).next().is_some()
    }
}

impl FromIterator<Triple> for TripleGraph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Self::new();
        for triple in iter {
            graph.insert(triple);
        }
        graph
    }
}

impl ShapeLookup for TripleGraph {
    fn constraints(&self, shape_id: &str) -> Result<Vec<Triple>> {
        Ok(self
            .about(shape_id)
            .filter(|t| {
                t.predicate.starts_with(SH)
                    && !STRUCTURAL_PREDICATES.contains(&local_name(&t.predicate))
            })
            .cloned()
            .collect())
    }
}

impl DataLookup for TripleGraph {
    fn triples(&self, focus_node: &str, path: Option<&str>) -> Result<Vec<Triple>> {
        let triples = self.about(focus_node);
        Ok(match path.map(strip_brackets) {
            Some(path) => triples.filter(|t| t.predicate == path).cloned().collect(),
            None => triples.cloned().collect(),
        })
    }
}

fn strip_brackets(iri: &str) -> &str {
    iri.trim().trim_start_matches('<').trim_end_matches('>')
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> std::result::Result<(), String> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(format!("expected '{}', found '{}'", expected, c)),
            None => Err(format!("expected '{}', found end of line", expected)),
        }
    }

    fn iri(&mut self) -> std::result::Result<String, String> {
        self.expect('<')?;
        let end = self
            .rest()
            .find('>')
            .ok_or_else(|| "unterminated IRI".to_string())?;
        let iri = self.rest()[..end].to_string();
        self.pos += end + 1;
        Ok(iri)
    }

    fn blank_node(&mut self) -> std::result::Result<String, String> {
        self.expect('_')?;
        self.expect(':')?;
        let len = self
            .rest()
            .find(char::is_whitespace)
            .unwrap_or(self.rest().len());
        let label = self.rest()[..len].trim_end_matches('.').to_string();
        if label.is_empty() {
            return Err("empty blank node label".into());
        }
        self.pos += label.len();
        Ok(label)
    }

    fn literal(&mut self) -> std::result::Result<Term, String> {
        self.expect('"')?;
        let mut lexical = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated literal".into()),
                Some('"') => break,
                Some('\\') => lexical.push(self.escape()?),
                Some(c) => lexical.push(c),
            }
        }

        let mut datatype = None;
        let mut language = None;
        if self.rest().starts_with("^^") {
            self.pos += 2;
            datatype = Some(self.iri()?);
        } else if self.peek() == Some('@') {
            self.bump();
            let len = self
                .rest()
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
                .unwrap_or(self.rest().len());
            if len == 0 {
                return Err("empty language tag".into());
            }
            language = Some(self.rest()[..len].to_string());
            self.pos += len;
        }

        Ok(Term::Literal {
            lexical,
            datatype,
            language,
        })
    }

    fn escape(&mut self) -> std::result::Result<char, String> {
        match self.bump() {
            Some('t') => Ok('\t'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.unicode(4),
            Some('U') => self.unicode(8),
            Some(c) => Err(format!("invalid escape '\\{}'", c)),
            None => Err("unterminated escape".into()),
        }
    }

    fn unicode(&mut self, digits: usize) -> std::result::Result<char, String> {
        let hex = self
            .rest()
            .get(..digits)
            .ok_or_else(|| "truncated unicode escape".to_string())?;
        let code = u32::from_str_radix(hex, 16).map_err(|e| format!("bad unicode escape: {}", e))?;
        self.pos += digits;
        char::from_u32(code).ok_or_else(|| format!("invalid code point {:X}", code))
    }

    fn subject(&mut self) -> std::result::Result<Term, String> {
        match self.peek() {
            Some('<') => self.iri().map(Term::Iri),
            Some('_') => self.blank_node().map(Term::BlankNode),
            _ => Err("subject must be an IRI or blank node".into()),
        }
    }

    fn object(&mut self) -> std::result::Result<Term, String> {
        match self.peek() {
            Some('<') => self.iri().map(Term::Iri),
            Some('_') => self.blank_node().map(Term::BlankNode),
            Some('"') => self.literal(),
            _ => Err("object must be an IRI, blank node or literal".into()),
        }
    }
}

fn parse_line(line: &str) -> std::result::Result<Triple, String> {
    let mut cursor = Cursor::new(line);
    let subject = cursor.subject()?;
    cursor.skip_ws();
    let predicate = cursor.iri()?;
    cursor.skip_ws();
    let object = cursor.object()?;
    cursor.skip_ws();
    cursor.expect('.')?;
    cursor.skip_ws();
    match cursor.peek() {
        None | Some('#') => Ok(Triple::new(subject, predicate, object)),
        Some(c) => Err(format!("unexpected '{}' after statement", c)),
    }
}
