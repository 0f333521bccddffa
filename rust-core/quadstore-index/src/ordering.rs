// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Index orderings: a permutation of (s, p, o, c) and the 16-byte keys it
// sorts by.

use std::fmt;

use crate::error::{IndexError, IndexResult};
use crate::statement::{Field, Statement, StatementPattern};

/// Size of one index key: four big-endian u32 ids.
pub const KEY_SIZE: usize = 16;

pub type IndexKey = [u8; KEY_SIZE];

pub const DEFAULT_ORDERINGS: &str = "spoc,posc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexOrdering {
    fields: [Field; 4],
}

impl IndexOrdering {
    /// Parse a 3- or 4-letter code over `s p o c`. Three letters get `c`
    /// appended.
    pub fn parse(code: &str) -> IndexResult<Self> {
        let invalid = |reason: &str| IndexError::InvalidOrdering {
            code: code.to_string(),
            reason: reason.to_string(),
        };

        let mut letters: Vec<char> = code.trim().chars().collect();
        if letters.len() == 3 {
            letters.push('c');
        }
        if letters.len() != 4 {
            return Err(invalid("expected 3 or 4 letters"));
        }

        let mut fields = [Field::Subject; 4];
        for (slot, letter) in fields.iter_mut().zip(&letters) {
            *slot = Field::from_letter(*letter).ok_or_else(|| invalid("unknown field letter"))?;
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].contains(field) {
                return Err(invalid("repeated field letter"));
            }
        }
        Ok(Self { fields })
    }

    /// Parse a comma/whitespace separated list. The first entry is the
    /// primary ordering.
    pub fn parse_list(list: &str) -> IndexResult<Vec<Self>> {
        let mut orderings: Vec<Self> = Vec::new();
        for code in list
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|c| !c.is_empty())
        {
            let ordering = Self::parse(code)?;
            if orderings.contains(&ordering) {
                return Err(IndexError::InvalidOrdering {
                    code: code.to_string(),
                    reason: "duplicate ordering".to_string(),
                });
            }
            orderings.push(ordering);
        }
        if orderings.is_empty() {
            return Err(IndexError::NoOrderings);
        }
        Ok(orderings)
    }

    pub fn fields(&self) -> [Field; 4] {
        self.fields
    }

    pub fn code(&self) -> String {
        self.fields.iter().map(|f| f.letter()).collect()
    }

    pub(crate) fn code_bytes(&self) -> [u8; 4] {
        let mut bytes = [0u8; 4];
        for (byte, field) in bytes.iter_mut().zip(self.fields) {
            *byte = field.letter() as u8;
        }
        bytes
    }

    pub fn file_name(&self) -> String {
        format!("triples-{}.dat", self.code())
    }

    pub fn key(&self, statement: &Statement) -> IndexKey {
        let mut key = [0u8; KEY_SIZE];
        for (chunk, field) in key.chunks_exact_mut(4).zip(self.fields) {
            chunk.copy_from_slice(&statement.get(field).to_be_bytes());
        }
        key
    }

    pub fn statement(&self, key: &IndexKey) -> Statement {
        let mut statement = Statement::default();
        for (chunk, field) in key.chunks_exact(4).zip(self.fields) {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(chunk);
            statement.set(field, u32::from_be_bytes(raw));
        }
        statement
    }

    /// Number of leading fields the pattern binds.
    pub fn score(&self, pattern: &StatementPattern) -> usize {
        self.fields
            .iter()
            .take_while(|field| pattern.get(**field).is_some())
            .count()
    }

    /// Inclusive key range covering every match of `pattern`.
    pub fn bounds(&self, pattern: &StatementPattern) -> (IndexKey, IndexKey) {
        let prefix = self.score(pattern);
        let mut low = [0u8; KEY_SIZE];
        let mut high = [0xFFu8; KEY_SIZE];
        for (i, field) in self.fields.iter().enumerate().take(prefix) {
            if let Some(value) = pattern.get(*field) {
                let bytes = value.to_be_bytes();
                low[i * 4..i * 4 + 4].copy_from_slice(&bytes);
                high[i * 4..i * 4 + 4].copy_from_slice(&bytes);
            }
        }
        (low, high)
    }

    /// The ordering scoring highest for `pattern`; ties go to the earlier
    /// entry, so the primary wins unbound scans.
    pub fn best<'a>(orderings: &'a [Self], pattern: &StatementPattern) -> Option<&'a Self> {
        orderings
            .iter()
            .enumerate()
            .max_by_key(|(i, ordering)| (ordering.score(pattern), std::cmp::Reverse(*i)))
            .map(|(_, ordering)| ordering)
    }
}

impl fmt::Display for IndexOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_three_letters_appends_context() {
        assert_eq!(IndexOrdering::parse("pos").unwrap().code(), "posc");
    }

    #[test]
    fn test_parse_rejects_bad_codes() {
        assert!(IndexOrdering::parse("spx").is_err());
        assert!(IndexOrdering::parse("sspo").is_err());
        assert!(IndexOrdering::parse("sp").is_err());
        assert!(IndexOrdering::parse("spocs").is_err());
    }

    #[test]
    fn test_parse_list() {
        let orderings = IndexOrdering::parse_list("spoc, posc  cspo").unwrap();
        let codes: Vec<String> = orderings.iter().map(|o| o.code()).collect();
        assert_eq!(codes, vec!["spoc", "posc", "cspo"]);
        assert!(IndexOrdering::parse_list("spoc,spo").is_err());
        assert!(matches!(
            IndexOrdering::parse_list(" , "),
            Err(IndexError::NoOrderings)
        ));
    }

    #[test]
    fn test_best_prefers_bound_prefix() {
        let orderings = IndexOrdering::parse_list("spoc,posc").unwrap();
        let by_predicate = StatementPattern::all().with_predicate(4);
        assert_eq!(IndexOrdering::best(&orderings, &by_predicate).unwrap().code(), "posc");
        let unbound = StatementPattern::all();
        assert_eq!(IndexOrdering::best(&orderings, &unbound).unwrap().code(), "spoc");
    }

    #[test]
    fn test_bounds_cover_prefix() {
        let ordering = IndexOrdering::parse("posc").unwrap();
        let pattern = StatementPattern::all().with_predicate(7).with_subject(3);
        let (low, high) = ordering.bounds(&pattern);
        assert_eq!(&low[..4], &7u32.to_be_bytes());
        assert_eq!(&low[4..], &[0u8; 12]);
        assert_eq!(&high[4..], &[0xFFu8; 12]);
    }

    proptest! {
        #[test]
        fn prop_key_order_matches_field_order(
            a in any::<(u32, u32, u32, u32)>(),
            b in any::<(u32, u32, u32, u32)>(),
        ) {
            let ordering = IndexOrdering::parse("opsc").unwrap();
            let sa = Statement::new(a.0, a.1, a.2, a.3);
            let sb = Statement::new(b.0, b.1, b.2, b.3);
            let fa = (sa.object, sa.predicate, sa.subject, sa.context);
            let fb = (sb.object, sb.predicate, sb.subject, sb.context);
            prop_assert_eq!(ordering.key(&sa).cmp(&ordering.key(&sb)), fa.cmp(&fb));
            prop_assert_eq!(ordering.statement(&ordering.key(&sa)), sa);
        }
    }
}
