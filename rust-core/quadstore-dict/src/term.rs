// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RDF term model: the values a quad position can hold, and the integer
// handles the dictionary hands out for them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// XSD datatype IRIs with a compact native record encoding.
pub mod xsd {
    pub const NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema#";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const INT: &str = "http://www.w3.org/2001/XMLSchema#int";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
}

// ---------------------------------------------------------------------------
// TermId
// ---------------------------------------------------------------------------

/// Dense, non-zero handle for an interned term.
///
/// Zero is reserved for "no term" and never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TermId(u32);

impl TermId {
    pub const FIRST: TermId = TermId(1);

    /// Wrap a raw id; `None` for the reserved value 0.
    pub fn new(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Zero-based slot in the offset arena.
    pub(crate) fn slot(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Term
// ---------------------------------------------------------------------------

/// A literal: lexical label with an optional language tag or datatype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
}

/// An RDF-star quoted triple used as a term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotedTriple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

/// Any value that can occupy a quad position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal(Literal),
    Triple(Box<QuotedTriple>),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Term::BlankNode(id.into())
    }

    /// A plain literal with neither language nor datatype.
    pub fn literal(label: impl Into<String>) -> Self {
        Term::Literal(Literal {
            label: label.into(),
            language: None,
            datatype: None,
        })
    }

    pub fn lang_literal(label: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal(Literal {
            label: label.into(),
            language: Some(language.into()),
            datatype: None,
        })
    }

    pub fn typed_literal(label: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal(Literal {
            label: label.into(),
            language: None,
            datatype: Some(datatype.into()),
        })
    }

    pub fn triple(subject: Term, predicate: Term, object: Term) -> Self {
        Term::Triple(Box::new(QuotedTriple {
            subject,
            predicate,
            object,
        }))
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Term::Iri(_))
    }

    /// Canonical string value: the IRI text, blank node id, literal label,
    /// or the N-Triples-star form of a quoted triple.
    pub fn string_value(&self) -> String {
        match self {
            Term::Iri(iri) => iri.clone(),
            Term::BlankNode(id) => id.clone(),
            Term::Literal(literal) => literal.label.clone(),
            Term::Triple(_) => self.to_string(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BlankNode(id) => write!(f, "_:{id}"),
            Term::Literal(literal) => {
                write!(f, "\"{}\"", escape_label(&literal.label))?;
                if let Some(language) = &literal.language {
                    write!(f, "@{language}")
                } else if let Some(datatype) = &literal.datatype {
                    write!(f, "^^<{datatype}>")
                } else {
                    Ok(())
                }
            }
            Term::Triple(t) => write!(f, "<< {} {} {} >>", t.subject, t.predicate, t.object),
        }
    }
}

fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Split an IRI into namespace and local name after the last `#`, `/` or
/// `:`. IRIs without a separator have an empty local name.
pub fn split_iri(iri: &str) -> (&str, &str) {
    match iri.rfind(['#', '/', ':']) {
        Some(pos) => iri.split_at(pos + 1),
        None => (iri, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_id_rejects_zero() {
        assert!(TermId::new(0).is_none());
        assert_eq!(TermId::new(7).unwrap().get(), 7);
        assert_eq!(TermId::FIRST.slot(), 0);
    }

    #[test]
    fn test_string_value() {
        assert_eq!(Term::iri("http://a/b").string_value(), "http://a/b");
        assert_eq!(Term::blank("b0").string_value(), "b0");
        assert_eq!(Term::lang_literal("chat", "fr").string_value(), "chat");
        let quoted = Term::triple(Term::iri("s"), Term::iri("p"), Term::literal("o"));
        assert_eq!(quoted.string_value(), "<< <s> <p> \"o\" >>");
    }

    #[test]
    fn test_display_escapes_literals() {
        let term = Term::typed_literal("a \"quoted\"\nline", xsd::STRING);
        assert_eq!(
            term.to_string(),
            format!("\"a \\\"quoted\\\"\\nline\"^^<{}>", xsd::STRING)
        );
    }

    #[test]
    fn test_split_iri() {
        assert_eq!(
            split_iri("http://example.org/ns#thing"),
            ("http://example.org/ns#", "thing")
        );
        assert_eq!(split_iri("http://example.org/a/b"), ("http://example.org/a/", "b"));
        assert_eq!(split_iri("urn:isbn:123"), ("urn:isbn:", "123"));
        assert_eq!(split_iri("plain"), ("plain", ""));
    }

    #[test]
    fn test_serde_roundtrip_preserves_equality() {
        let term = Term::triple(
            Term::blank("x"),
            Term::iri("http://example.org/p"),
            Term::lang_literal("hello", "en"),
        );
        let json = serde_json::to_vec(&term).unwrap();
        let back: Term = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, term);
    }
}
