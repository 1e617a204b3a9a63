//! Tag policy engine
//!
//! The policy for a snapshot lives in the value of a single tag. Parsing and
//! resolution are pure: [`parse_policy`] splits the mini-language,
//! [`resolve_policy`] turns the result into a typed [`ResolvedPolicy`].
//!
//! ```
//! use snapcopy::policy::{parse_policy, resolve_policy, PolicyDecision};
//!
//! let policy = resolve_policy(&parse_policy("enable=yes:copyto=us-west-2:retention=14"), 7);
//! assert_eq!(policy.decision(), PolicyDecision::Copy);
//! assert_eq!(policy.retention_days, 14);
//! ```

pub mod parser;
pub mod resolver;

pub use parser::{parse_policy, ParsedPolicy};
pub use resolver::{is_truthy, resolve_policy, PolicyDecision, ResolvedPolicy};

/// Parse and resolve in one step
pub fn evaluate(raw: &str, default_retention_days: u32) -> ResolvedPolicy {
    resolve_policy(&parse_policy(raw), default_retention_days)
}
