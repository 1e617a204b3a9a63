//! Tag policy parser
//!
//! Turns the raw value of the policy tag into a key/value mapping. The value
//! is a `:`-delimited list of `key=value` segments, for example
//! `enable=yes:copyto=us-west-2/eu-west-1:retention=14`.

use std::collections::BTreeMap;

/// Separator between `key=value` segments
pub const SEGMENT_DELIMITER: char = ':';

/// Separator between a key and its value
pub const KEY_VALUE_DELIMITER: char = '=';

/// Outcome of parsing a policy tag value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedPolicy {
    /// Lower-cased, trimmed options; unknown keys are kept
    Options(BTreeMap<String, String>),

    /// The value could not be split into `key=value` segments; carries the
    /// original value for reporting
    Malformed(String),
}

impl ParsedPolicy {
    /// Look up an option by (lower-case) key
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            ParsedPolicy::Options(options) => options.get(key).map(String::as_str),
            ParsedPolicy::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ParsedPolicy::Malformed(_))
    }
}

/// Parse a raw policy tag value
///
/// Every segment must contain exactly one `=`. Keys and values are trimmed
/// and lower-cased; when a key repeats, the last occurrence wins. Any bad
/// segment (the empty value included) turns the whole value into
/// [`ParsedPolicy::Malformed`].
pub fn parse_policy(raw: &str) -> ParsedPolicy {
    let mut options = BTreeMap::new();

    for segment in raw.split(SEGMENT_DELIMITER) {
        let mut parts = segment.split(KEY_VALUE_DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) => {
                options.insert(key.trim().to_lowercase(), value.trim().to_lowercase());
            }
            _ => return ParsedPolicy::Malformed(raw.to_string()),
        }
    }

    ParsedPolicy::Options(options)
}
