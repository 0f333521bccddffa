// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Term-level statements and patterns.

use std::fmt;

use quadstore_dict::{ResolvedTerm, Term};
use serde::{Deserialize, Serialize};

/// A statement over terms. `context: None` is the default graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub context: Option<Term>,
}

impl Quad {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: None,
        }
    }

    pub fn in_context(mut self, context: Term) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(context) = &self.context {
            write!(f, " {context}")?;
        }
        f.write_str(" .")
    }
}

/// Which contexts a pattern matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ContextFilter {
    #[default]
    Any,
    DefaultGraph,
    Named(Term),
}

/// Bound positions select; unbound positions match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QuadPattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub context: ContextFilter,
}

impl QuadPattern {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: Term) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_predicate(mut self, predicate: Term) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_object(mut self, object: Term) -> Self {
        self.object = Some(object);
        self
    }

    pub fn in_context(mut self, context: Term) -> Self {
        self.context = ContextFilter::Named(context);
        self
    }

    pub fn in_default_graph(mut self) -> Self {
        self.context = ContextFilter::DefaultGraph;
        self
    }
}

/// A stored statement with each position resolved. Positions whose record
/// failed validation come back as [`ResolvedTerm::Corrupt`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuad {
    pub subject: ResolvedTerm,
    pub predicate: ResolvedTerm,
    pub object: ResolvedTerm,
    pub context: Option<ResolvedTerm>,
}

impl ResolvedQuad {
    pub fn is_corrupt(&self) -> bool {
        self.positions().any(ResolvedTerm::is_corrupt)
    }

    /// The quad, unless a position is corrupt.
    pub fn into_quad(self) -> Option<Quad> {
        let context = match self.context {
            Some(context) => Some(context.into_valid()?),
            None => None,
        };
        Some(Quad {
            subject: self.subject.into_valid()?,
            predicate: self.predicate.into_valid()?,
            object: self.object.into_valid()?,
            context,
        })
    }

    fn positions(&self) -> impl Iterator<Item = &ResolvedTerm> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .chain(self.context.as_ref())
    }
}
