// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Statements as term-id tuples, and patterns over them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Context id of the default graph.
pub const DEFAULT_CONTEXT: u32 = 0;

/// One position of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Subject,
    Predicate,
    Object,
    Context,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Subject, Field::Predicate, Field::Object, Field::Context];

    pub fn letter(self) -> char {
        match self {
            Field::Subject => 's',
            Field::Predicate => 'p',
            Field::Object => 'o',
            Field::Context => 'c',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            's' => Some(Field::Subject),
            'p' => Some(Field::Predicate),
            'o' => Some(Field::Object),
            'c' => Some(Field::Context),
            _ => None,
        }
    }
}

/// `(subject, predicate, object, context)` term ids. Context 0 is the
/// default graph; the other positions are never 0 for stored statements.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Statement {
    pub subject: u32,
    pub predicate: u32,
    pub object: u32,
    pub context: u32,
}

impl Statement {
    pub fn new(subject: u32, predicate: u32, object: u32, context: u32) -> Self {
        Self {
            subject,
            predicate,
            object,
            context,
        }
    }

    pub fn get(&self, field: Field) -> u32 {
        match field {
            Field::Subject => self.subject,
            Field::Predicate => self.predicate,
            Field::Object => self.object,
            Field::Context => self.context,
        }
    }

    pub(crate) fn set(&mut self, field: Field, value: u32) {
        match field {
            Field::Subject => self.subject = value,
            Field::Predicate => self.predicate = value,
            Field::Object => self.object = value,
            Field::Context => self.context = value,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} {} {} {})",
            self.subject, self.predicate, self.object, self.context
        )
    }
}

/// Statement pattern: `None` is a wildcard. A bound context of 0 matches
/// the default graph only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementPattern {
    pub subject: Option<u32>,
    pub predicate: Option<u32>,
    pub object: Option<u32>,
    pub context: Option<u32>,
}

impl StatementPattern {
    /// Matches every statement.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn exact(statement: &Statement) -> Self {
        Self {
            subject: Some(statement.subject),
            predicate: Some(statement.predicate),
            object: Some(statement.object),
            context: Some(statement.context),
        }
    }

    pub fn in_context(context: u32) -> Self {
        Self {
            context: Some(context),
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, subject: u32) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_predicate(mut self, predicate: u32) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_object(mut self, object: u32) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_context(mut self, context: u32) -> Self {
        self.context = Some(context);
        self
    }

    pub fn get(&self, field: Field) -> Option<u32> {
        match field {
            Field::Subject => self.subject,
            Field::Predicate => self.predicate,
            Field::Object => self.object,
            Field::Context => self.context,
        }
    }

    pub fn bound_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }

    pub fn matches(&self, statement: &Statement) -> bool {
        Field::ALL
            .iter()
            .all(|field| self.get(*field).map_or(true, |v| v == statement.get(*field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_matching() {
        let statement = Statement::new(1, 2, 3, 0);
        assert!(StatementPattern::all().matches(&statement));
        assert!(StatementPattern::all().with_predicate(2).matches(&statement));
        assert!(StatementPattern::in_context(DEFAULT_CONTEXT).matches(&statement));
        assert!(!StatementPattern::in_context(9).matches(&statement));
        assert!(StatementPattern::exact(&statement).matches(&statement));
    }

    #[test]
    fn test_field_letters_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_letter(field.letter()), Some(field));
        }
        assert_eq!(Field::from_letter('x'), None);
    }
}
