// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Term record codec.
//
// A record body is a tag byte followed by a kind-specific payload. Component
// terms (namespaces, datatypes, quoted-triple parts) are referenced by id,
// so the body bytes double as the key of the term hash index.
//
//   tag 1  IRI             [u32 namespace id][local name UTF-8]
//   tag 2  blank node      [id UTF-8]
//   tag 3  literal         [u32 datatype id, 0 = none][u8 lang len][lang][label UTF-8]
//   tag 4  native literal  [u32 datatype id][u8 kind][value bytes]
//   tag 5  quoted triple   [u32 subject][u32 predicate][u32 object]
//
// Integers are big-endian.

use chrono::{DateTime, NaiveDate, SecondsFormat};
use thiserror::Error;

use crate::term::xsd;

const TAG_IRI: u8 = 1;
const TAG_BLANK: u8 = 2;
const TAG_LITERAL: u8 = 3;
const TAG_NATIVE: u8 = 4;
const TAG_TRIPLE: u8 = 5;

/// Decoded record body, with components still expressed as ids.
#[derive(Debug, Clone, PartialEq)]
pub enum TermRecord {
    Iri {
        namespace: u32,
        local: String,
    },
    BlankNode(String),
    Literal {
        datatype: u32,
        language: Option<String>,
        label: String,
    },
    Native {
        datatype: u32,
        value: NativeValue,
    },
    Triple {
        subject: u32,
        predicate: u32,
        object: u32,
    },
}

/// Compact value forms for common XSD datatypes.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Decimal(String),
    DateTime(String),
    Date(String),
}

/// Why a record body could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("empty record body")]
    Empty,
    #[error("unknown record tag {0}")]
    UnknownTag(u8),
    #[error("unknown native value kind {0}")]
    UnknownNativeKind(u8),
    #[error("record body truncated: needed {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("invalid UTF-8 in record body")]
    InvalidUtf8,
    #[error("reserved id 0 used for a required component")]
    MissingComponent,
}

impl NativeValue {
    fn kind(&self) -> u8 {
        match self {
            NativeValue::Boolean(_) => 1,
            NativeValue::Integer(_) => 2,
            NativeValue::Double(_) => 3,
            NativeValue::Decimal(_) => 4,
            NativeValue::DateTime(_) => 5,
            NativeValue::Date(_) => 6,
        }
    }

    /// Parse `label` into a native value when re-rendering it reproduces the
    /// label exactly. Anything else stays a plain literal record, so the
    /// encoding never changes a label.
    pub fn from_label(label: &str, datatype: &str) -> Option<Self> {
        let value = match datatype {
            xsd::BOOLEAN => match label {
                "true" => NativeValue::Boolean(true),
                "false" => NativeValue::Boolean(false),
                _ => return None,
            },
            xsd::INTEGER | xsd::LONG | xsd::INT => NativeValue::Integer(label.parse().ok()?),
            xsd::DOUBLE => {
                let parsed: f64 = label.parse().ok()?;
                if parsed.is_nan() {
                    return None;
                }
                NativeValue::Double(parsed)
            }
            xsd::DECIMAL if is_canonical_decimal(label) => NativeValue::Decimal(label.to_string()),
            xsd::DATE_TIME => {
                let parsed = DateTime::parse_from_rfc3339(label).ok()?;
                NativeValue::DateTime(parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            xsd::DATE => {
                let parsed = NaiveDate::parse_from_str(label, "%Y-%m-%d").ok()?;
                NativeValue::Date(parsed.format("%Y-%m-%d").to_string())
            }
            _ => return None,
        };
        (value.label() == label).then_some(value)
    }

    /// Lexical form of the value.
    pub fn label(&self) -> String {
        match self {
            NativeValue::Boolean(b) => b.to_string(),
            NativeValue::Integer(i) => i.to_string(),
            NativeValue::Double(d) => d.to_string(),
            NativeValue::Decimal(s) | NativeValue::DateTime(s) | NativeValue::Date(s) => s.clone(),
        }
    }
}

fn is_canonical_decimal(label: &str) -> bool {
    let digits = label.strip_prefix('-').unwrap_or(label);
    let Some((int, frac)) = digits.split_once('.') else {
        return false;
    };
    !int.is_empty()
        && !frac.is_empty()
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
        && (int == "0" || !int.starts_with('0'))
        && (frac == "0" || !frac.ends_with('0'))
}

impl TermRecord {
    /// Encode to record body bytes (tag + payload).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            TermRecord::Iri { namespace, local } => {
                out.push(TAG_IRI);
                out.extend_from_slice(&namespace.to_be_bytes());
                out.extend_from_slice(local.as_bytes());
            }
            TermRecord::BlankNode(id) => {
                out.push(TAG_BLANK);
                out.extend_from_slice(id.as_bytes());
            }
            TermRecord::Literal {
                datatype,
                language,
                label,
            } => {
                out.push(TAG_LITERAL);
                out.extend_from_slice(&datatype.to_be_bytes());
                let lang = language.as_deref().unwrap_or("").as_bytes();
                // The dictionary rejects tags longer than 255 bytes.
                out.push(lang.len() as u8);
                out.extend_from_slice(lang);
                out.extend_from_slice(label.as_bytes());
            }
            TermRecord::Native { datatype, value } => {
                out.push(TAG_NATIVE);
                out.extend_from_slice(&datatype.to_be_bytes());
                out.push(value.kind());
                match value {
                    NativeValue::Boolean(b) => out.push(u8::from(*b)),
                    NativeValue::Integer(i) => out.extend_from_slice(&i.to_be_bytes()),
                    NativeValue::Double(d) => out.extend_from_slice(&d.to_bits().to_be_bytes()),
                    NativeValue::Decimal(s) | NativeValue::DateTime(s) | NativeValue::Date(s) => {
                        out.extend_from_slice(s.as_bytes())
                    }
                }
            }
            TermRecord::Triple {
                subject,
                predicate,
                object,
            } => {
                out.push(TAG_TRIPLE);
                out.extend_from_slice(&subject.to_be_bytes());
                out.extend_from_slice(&predicate.to_be_bytes());
                out.extend_from_slice(&object.to_be_bytes());
            }
        }
        out
    }

    /// Decode record body bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, MalformedRecord> {
        let (&tag, body) = bytes.split_first().ok_or(MalformedRecord::Empty)?;
        match tag {
            TAG_IRI => {
                let namespace = be_u32(body, 0)?;
                if namespace == 0 {
                    return Err(MalformedRecord::MissingComponent);
                }
                Ok(TermRecord::Iri {
                    namespace,
                    local: utf8(&body[4..])?,
                })
            }
            TAG_BLANK => Ok(TermRecord::BlankNode(utf8(body)?)),
            TAG_LITERAL => {
                let datatype = be_u32(body, 0)?;
                let lang_len = *body.get(4).ok_or(MalformedRecord::Truncated {
                    needed: 5,
                    available: body.len(),
                })? as usize;
                let lang_end = 5 + lang_len;
                let lang = body.get(5..lang_end).ok_or(MalformedRecord::Truncated {
                    needed: lang_end,
                    available: body.len(),
                })?;
                let language = (lang_len > 0).then(|| utf8(lang)).transpose()?;
                Ok(TermRecord::Literal {
                    datatype,
                    language,
                    label: utf8(&body[lang_end..])?,
                })
            }
            TAG_NATIVE => {
                let datatype = be_u32(body, 0)?;
                if datatype == 0 {
                    return Err(MalformedRecord::MissingComponent);
                }
                let kind = *body.get(4).ok_or(MalformedRecord::Truncated {
                    needed: 5,
                    available: body.len(),
                })?;
                let raw = &body[5..];
                let value = match kind {
                    1 => NativeValue::Boolean(*raw.first().ok_or(MalformedRecord::Truncated {
                        needed: 6,
                        available: body.len(),
                    })? != 0),
                    2 => NativeValue::Integer(be_u64(raw)? as i64),
                    3 => NativeValue::Double(f64::from_bits(be_u64(raw)?)),
                    4 => NativeValue::Decimal(utf8(raw)?),
                    5 => NativeValue::DateTime(utf8(raw)?),
                    6 => NativeValue::Date(utf8(raw)?),
                    other => return Err(MalformedRecord::UnknownNativeKind(other)),
                };
                Ok(TermRecord::Native { datatype, value })
            }
            TAG_TRIPLE => {
                let subject = be_u32(body, 0)?;
                let predicate = be_u32(body, 4)?;
                let object = be_u32(body, 8)?;
                if subject == 0 || predicate == 0 || object == 0 {
                    return Err(MalformedRecord::MissingComponent);
                }
                Ok(TermRecord::Triple {
                    subject,
                    predicate,
                    object,
                })
            }
            other => Err(MalformedRecord::UnknownTag(other)),
        }
    }
}

fn be_u32(bytes: &[u8], offset: usize) -> Result<u32, MalformedRecord> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or(MalformedRecord::Truncated {
            needed: offset + 4,
            available: bytes.len(),
        })
}

fn be_u64(bytes: &[u8]) -> Result<u64, MalformedRecord> {
    bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_be_bytes)
        .ok_or(MalformedRecord::Truncated {
            needed: 8,
            available: bytes.len(),
        })
}

fn utf8(bytes: &[u8]) -> Result<String, MalformedRecord> {
    String::from_utf8(bytes.to_vec()).map_err(|_| MalformedRecord::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_native_only_for_canonical_labels() {
        assert_eq!(
            NativeValue::from_label("42", xsd::INTEGER),
            Some(NativeValue::Integer(42))
        );
        assert_eq!(NativeValue::from_label("+42", xsd::INTEGER), None);
        assert_eq!(NativeValue::from_label("042", xsd::INTEGER), None);
        assert_eq!(
            NativeValue::from_label("true", xsd::BOOLEAN),
            Some(NativeValue::Boolean(true))
        );
        assert_eq!(NativeValue::from_label("1", xsd::BOOLEAN), None);
        assert_eq!(
            NativeValue::from_label("1.5", xsd::DOUBLE),
            Some(NativeValue::Double(1.5))
        );
        assert_eq!(NativeValue::from_label("1.5E0", xsd::DOUBLE), None);
        assert_eq!(
            NativeValue::from_label("2.50", xsd::DECIMAL),
            None,
            "trailing zero is not canonical"
        );
        assert!(NativeValue::from_label("2024-02-29", xsd::DATE).is_some());
        assert!(NativeValue::from_label("2024-02-30", xsd::DATE).is_none());
        assert!(NativeValue::from_label("2024-01-01T10:00:00Z", xsd::DATE_TIME).is_some());
        assert!(NativeValue::from_label("42", "http://example.org/custom").is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        assert_eq!(
            TermRecord::decode(&[9, 0, 0]),
            Err(MalformedRecord::UnknownTag(9))
        );
        assert_eq!(TermRecord::decode(&[]), Err(MalformedRecord::Empty));
    }

    #[test]
    fn test_decode_rejects_truncated_triple() {
        assert!(matches!(
            TermRecord::decode(&[TAG_TRIPLE, 0, 0, 0, 1, 0, 0]),
            Err(MalformedRecord::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_zero_component() {
        let record = TermRecord::Triple {
            subject: 1,
            predicate: 0,
            object: 3,
        };
        assert_eq!(
            TermRecord::decode(&record.encode()),
            Err(MalformedRecord::MissingComponent)
        );
    }

    #[test]
    fn test_language_literal_roundtrip() {
        let record = TermRecord::Literal {
            datatype: 0,
            language: Some("en-GB".to_string()),
            label: "colour".to_string(),
        };
        assert_eq!(TermRecord::decode(&record.encode()).unwrap(), record);
    }

    fn record_strategy() -> impl Strategy<Value = TermRecord> {
        prop_oneof![
            (1u32.., ".*").prop_map(|(namespace, local)| TermRecord::Iri { namespace, local }),
            ".*".prop_map(TermRecord::BlankNode),
            (any::<u32>(), proptest::option::of("[a-z]{1,8}"), ".*").prop_map(
                |(datatype, language, label)| TermRecord::Literal {
                    datatype,
                    language,
                    label
                }
            ),
            (1u32.., any::<i64>()).prop_map(|(datatype, i)| TermRecord::Native {
                datatype,
                value: NativeValue::Integer(i)
            }),
            (1u32.., 1u32.., 1u32..).prop_map(|(subject, predicate, object)| {
                TermRecord::Triple {
                    subject,
                    predicate,
                    object,
                }
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_encode_decode_is_lossless(record in record_strategy()) {
            let decoded = TermRecord::decode(&record.encode()).unwrap();
            prop_assert_eq!(decoded, record);
        }

        #[test]
        fn prop_native_labels_survive(i in any::<i64>(), d in any::<f64>().prop_filter("finite", |d| d.is_finite())) {
            let int_label = i.to_string();
            let native = NativeValue::from_label(&int_label, xsd::INTEGER).unwrap();
            prop_assert_eq!(native.label(), int_label);

            let double_label = d.to_string();
            if let Some(native) = NativeValue::from_label(&double_label, xsd::DOUBLE) {
                prop_assert_eq!(native.label(), double_label);
            }
        }
    }
}
