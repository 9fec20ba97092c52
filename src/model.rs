//! RDF terms as handled by the storage engine.
//!
//! A [`Term`] is an IRI, a blank node or a literal. The fourth variant,
//! [`Term::Corrupt`], stands in for a value whose on-disk encoding could not
//! be decoded while the store runs in soft-fail mode; callers must handle it
//! explicitly.

use std::fmt;

/// Identifier assigned to an interned term or namespace string.
///
/// Ids are positive and never reused while the store is open. Id `0` is
/// reserved: in a quad record it denotes the default graph.
pub type ValueId = u32;

/// The default-graph sentinel used in the context position of quad records.
pub const DEFAULT_GRAPH_ID: ValueId = 0;

/// The `xsd:string` datatype IRI, implied by plain literals.
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// The `rdf:langString` datatype IRI, implied by language-tagged literals.
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

/// An IRI split into namespace and local name, the granularity at which the
/// value store interns namespace strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Iri {
    namespace: String,
    local_name: String,
}

impl Iri {
    /// Creates an IRI from an already-split namespace and local name.
    pub fn from_parts(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Creates an IRI from a full string, splitting off the local name after
    /// the last `#`, `/` or `:`.
    pub fn parse(iri: impl Into<String>) -> Self {
        let iri = iri.into();
        let split = iri
            .rfind('#')
            .or_else(|| iri.rfind('/'))
            .or_else(|| iri.rfind(':'))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let (namespace, local_name) = iri.split_at(split);
        Self {
            namespace: namespace.to_owned(),
            local_name: local_name.to_owned(),
        }
    }

    /// The namespace part, including its trailing separator.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The local name part.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The full IRI string.
    pub fn as_string(&self) -> String {
        format!("{}{}", self.namespace, self.local_name)
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.namespace, self.local_name)
    }
}

/// A blank node, identified by its node id string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BNode {
    id: String,
}

impl BNode {
    /// Creates a blank node with the given node id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The node id string.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for BNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.id)
    }
}

/// A literal: label plus optional language tag or datatype.
///
/// A literal with neither language nor datatype is a plain literal and is
/// equivalent to one typed `xsd:string`; the value store probes both
/// encodings when looking ids up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    label: String,
    language: Option<String>,
    datatype: Option<Iri>,
}

impl Literal {
    /// A plain (untyped) literal.
    pub fn plain(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            language: None,
            datatype: None,
        }
    }

    /// A language-tagged literal.
    pub fn tagged(label: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            language: Some(language.into()),
            datatype: None,
        }
    }

    /// A datatyped literal.
    pub fn typed(label: impl Into<String>, datatype: Iri) -> Self {
        Self {
            label: label.into(),
            language: None,
            datatype: Some(datatype),
        }
    }

    /// The lexical label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The language tag, if any.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// The explicit datatype, if any.
    pub fn datatype(&self) -> Option<&Iri> {
        self.datatype.as_ref()
    }

    /// Whether the explicit datatype is one that plain encodings imply
    /// (`xsd:string`, or `rdf:langString` for tagged literals).
    pub fn has_implied_datatype(&self) -> bool {
        match &self.datatype {
            Some(dt) => {
                let full = dt.as_string();
                full == XSD_STRING || full == RDF_LANG_STRING
            }
            None => false,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.label)?;
        if let Some(lang) = &self.language {
            write!(f, "@{lang}")?;
        } else if let Some(dt) = &self.datatype {
            write!(f, "^^<{dt}>")?;
        }
        Ok(())
    }
}

/// Best guess at what kind of term a corrupt record encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptKind {
    /// The tag byte said IRI.
    Iri,
    /// The tag byte said blank node.
    BNode,
    /// The tag byte said literal.
    Literal,
    /// The tag byte itself was unrecognized.
    Unknown,
}

/// A value whose stored bytes failed to decode, preserved for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorruptValue {
    /// Kind suggested by the (possibly damaged) tag byte.
    pub kind: CorruptKind,
    /// The raw stored bytes.
    pub raw: Vec<u8>,
}

impl fmt::Display for CorruptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<corrupt:{:?}:{} bytes>", self.kind, self.raw.len())
    }
}

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// An IRI.
    Iri(Iri),
    /// A blank node.
    BNode(BNode),
    /// A literal.
    Literal(Literal),
    /// A value that failed to decode (soft-fail mode only).
    Corrupt(CorruptValue),
}

impl Term {
    /// Convenience constructor parsing a full IRI string.
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(Iri::parse(iri))
    }

    /// Convenience constructor for a blank node.
    pub fn bnode(id: impl Into<String>) -> Self {
        Term::BNode(BNode::new(id))
    }

    /// Whether this term may appear in the subject position.
    pub fn is_resource(&self) -> bool {
        matches!(self, Term::Iri(_) | Term::BNode(_))
    }

    /// Whether this term is a decode-failure sentinel.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Term::Corrupt(_))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BNode(b) => write!(f, "{b}"),
            Term::Literal(l) => write!(f, "{l}"),
            Term::Corrupt(c) => write!(f, "{c}"),
        }
    }
}

impl From<Iri> for Term {
    fn from(iri: Iri) -> Self {
        Term::Iri(iri)
    }
}

impl From<BNode> for Term {
    fn from(b: BNode) -> Self {
        Term::BNode(b)
    }
}

impl From<Literal> for Term {
    fn from(l: Literal) -> Self {
        Term::Literal(l)
    }
}
