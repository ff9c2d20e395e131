//! In-memory RDF graphs and the codec seam.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// Errors from parsing or serializing documents.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported media type: {0}")]
    UnsupportedType(String),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// An RDF node or value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Iri(String),
    /// Blank node label, without the `_:` prefix.
    Blank(String),
    Literal {
        value: String,
        datatype: String,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    /// A plain `xsd:string` literal.
    pub fn string(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: XSD_STRING.to_string(),
            language: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: datatype.into(),
            language: None,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }
}

/// N-Triples rendering.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", escape_iri(iri)),
            Term::Blank(label) => write!(f, "_:{label}"),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape_literal(value))?;
                match language {
                    Some(lang) => write!(f, "@{lang}"),
                    None if datatype == XSD_STRING => Ok(()),
                    None => write!(f, "^^<{}>", escape_iri(datatype)),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// A set of triples. Iteration order is the term order, so two graphs with
/// the same triples always serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    triples: BTreeSet<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the triple was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    /// Set union.
    pub fn merge(&mut self, other: Graph) {
        self.triples.extend(other.triples);
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Objects of every `subject predicate ?o` triple.
    pub fn objects<'g>(&'g self, subject: &'g Term, predicate: &'g Term) -> impl Iterator<Item = &'g Term> + 'g {
        self.triples
            .iter()
            .filter(move |t| &t.subject == subject && &t.predicate == predicate)
            .map(|t| &t.object)
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Graph {
            triples: iter.into_iter().collect(),
        }
    }
}

/// Reads documents into graphs and writes graphs back out.
///
/// `content_type` may carry parameters (`text/turtle; charset=utf-8`);
/// implementations compare on the essence.
#[async_trait]
pub trait DocumentCodec: Send + Sync {
    /// Add the triples in `body` to `graph`. Relative IRIs resolve against
    /// `base`.
    async fn parse(&self, body: &[u8], graph: &mut Graph, base: &Url, content_type: &str) -> Result<(), CodecError>;

    /// Write the whole graph in `content_type`.
    async fn serialize(&self, graph: &Graph, base: &Url, content_type: &str) -> Result<Vec<u8>, CodecError>;

    /// Media types `serialize` accepts, in preference order.
    fn output_types(&self) -> Vec<String>;
}

#[async_trait]
impl<C: DocumentCodec + ?Sized> DocumentCodec for &C {
    async fn parse(&self, body: &[u8], graph: &mut Graph, base: &Url, content_type: &str) -> Result<(), CodecError> {
        (**self).parse(body, graph, base, content_type).await
    }

    async fn serialize(&self, graph: &Graph, base: &Url, content_type: &str) -> Result<Vec<u8>, CodecError> {
        (**self).serialize(graph, base, content_type).await
    }

    fn output_types(&self) -> Vec<String> {
        (**self).output_types()
    }
}

/// `type/subtype` of a Content-Type value, lowercased.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
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

fn escape_iri(iri: &str) -> String {
    let mut out = String::with_capacity(iri.len());
    for c in iri.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' => out.push_str(&format!("\\u{:04X}", c as u32)),
            c if c <= ' ' => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
