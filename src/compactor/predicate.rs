//! Push-down predicate handling
//!
//! The predicate is engine syntax and is never parsed here; the only decision
//! is whether one was given at all.

use std::fmt;

/// A non-blank push-down predicate, trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushDownPredicate(String);

impl PushDownPredicate {
    /// `None` for absent, empty, or whitespace-only input
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Self(p.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PushDownPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a load should be filtered by `raw`
pub fn should_filter(raw: Option<&str>) -> bool {
    PushDownPredicate::parse(raw).is_some()
}
