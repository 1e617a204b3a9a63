//! Policy resolver
//!
//! Fills defaults into a parsed policy and produces the typed decision the
//! copy orchestrator acts on. Resolution never fails: every input, malformed
//! ones included, maps to a fully populated [`ResolvedPolicy`].

use super::parser::ParsedPolicy;
use serde::Serialize;

pub const KEY_ENABLE: &str = "enable";
pub const KEY_COPY_TO: &str = "copyto";
pub const KEY_COPY_TAGS: &str = "copytags";
pub const KEY_RETENTION: &str = "retention";

/// Separator between destination regions in `copyto`
pub const DESTINATION_DELIMITER: char = '/';

/// Fully defaulted copy policy for one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPolicy {
    pub enabled: bool,

    /// Requested destination regions, in tag order; may contain duplicates
    /// and the source region itself
    pub destinations: Vec<String>,

    pub copy_tags: bool,

    pub retention_days: u32,

    /// Original tag value when it could not be parsed
    pub parse_error: Option<String>,
}

/// What the orchestrator should do with a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// Copy to the requested destinations
    Copy,
    /// Well-formed policy with copying switched off
    Disabled,
    /// Well-formed policy without any destination
    NoDestination,
    /// Tag value could not be parsed
    Malformed,
}

/// `yes` and `true` (any case) are truthy; everything else is not
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("yes") || value.eq_ignore_ascii_case("true")
}

/// Parse a retention literal; only plain non-negative integers are accepted
fn parse_retention(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

impl ResolvedPolicy {
    /// Resolve a parsed policy against the configured default retention
    pub fn resolve(parsed: &ParsedPolicy, default_retention_days: u32) -> Self {
        let options = match parsed {
            ParsedPolicy::Malformed(raw) => {
                return Self {
                    enabled: false,
                    destinations: Vec::new(),
                    copy_tags: false,
                    retention_days: default_retention_days,
                    parse_error: Some(raw.clone()),
                };
            }
            ParsedPolicy::Options(options) => options,
        };

        let flag = |key: &str| options.get(key).is_some_and(|v| is_truthy(v));

        let destinations = options
            .get(KEY_COPY_TO)
            .map(|value| {
                value
                    .split(DESTINATION_DELIMITER)
                    .map(|dest| dest.trim().to_lowercase())
                    .filter(|dest| !dest.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            enabled: flag(KEY_ENABLE),
            destinations,
            copy_tags: flag(KEY_COPY_TAGS),
            retention_days: options
                .get(KEY_RETENTION)
                .and_then(|v| parse_retention(v))
                .unwrap_or(default_retention_days),
            parse_error: None,
        }
    }

    /// Classify the policy
    ///
    /// A missing destination is reported before the enable flag is looked at,
    /// so a half-written tag is surfaced even while copying is switched off.
    pub fn decision(&self) -> PolicyDecision {
        if self.parse_error.is_some() {
            PolicyDecision::Malformed
        } else if self.destinations.is_empty() {
            PolicyDecision::NoDestination
        } else if !self.enabled {
            PolicyDecision::Disabled
        } else {
            PolicyDecision::Copy
        }
    }
}

/// Convenience wrapper around [`ResolvedPolicy::resolve`]
pub fn resolve_policy(parsed: &ParsedPolicy, default_retention_days: u32) -> ResolvedPolicy {
    ResolvedPolicy::resolve(parsed, default_retention_days)
}
