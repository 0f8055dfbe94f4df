//! # Server name patterns.
//!
//! [`ServerPattern`] decides which servers an [`AutoGroup`](crate::AutoGroup) covers.
//!
//! ## Rules
//! - A name matches iff `include` matches somewhere in it AND (`exclude` is absent OR
//!   `exclude` does not match). Exclusion wins.
//! - Whitespace around `|` is stripped before compiling, so `"a | b"` means `"a|b"`.
//! - Matching is a search, not a full-string match.

use std::fmt;

use regex::Regex;

use crate::error::ValidationError;

/// Strips whitespace around `|` and compiles.
pub(crate) fn compile(pattern: &str) -> Result<Regex, ValidationError> {
    let normalized = pattern
        .split('|')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&normalized).map_err(|e| ValidationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Include/exclude pair over server names.
#[derive(Clone)]
pub struct ServerPattern {
    include: Regex,
    exclude: Option<Regex>,
}

impl ServerPattern {
    /// Compiles both patterns.
    ///
    /// # Example
    /// ```
    /// use relaycast::ServerPattern;
    ///
    /// let p = ServerPattern::new("alpha | beta", Some("test")).unwrap();
    /// assert!(p.matches("alpha-prod"));
    /// assert!(p.matches("beta"));
    /// assert!(!p.matches("alpha-test"));
    /// assert!(!p.matches("gamma"));
    /// ```
    pub fn new(include: &str, exclude: Option<&str>) -> Result<Self, ValidationError> {
        Ok(Self {
            include: compile(include)?,
            exclude: exclude.map(compile).transpose()?,
        })
    }

    /// True if `name` passes the include/exclude rule.
    pub fn matches(&self, name: &str) -> bool {
        self.include.is_match(name)
            && self
                .exclude
                .as_ref()
                .is_none_or(|exclude| !exclude.is_match(name))
    }

    /// Normalized include pattern.
    pub fn include(&self) -> &str {
        self.include.as_str()
    }

    /// Normalized exclude pattern.
    pub fn exclude(&self) -> Option<&str> {
        self.exclude.as_ref().map(Regex::as_str)
    }
}

impl fmt::Debug for ServerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPattern")
            .field("include", &self.include())
            .field("exclude", &self.exclude())
            .finish()
    }
}

impl PartialEq for ServerPattern {
    fn eq(&self, other: &Self) -> bool {
        self.include() == other.include() && self.exclude() == other.exclude()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_wins() {
        let p = ServerPattern::new("alpha", Some("test")).unwrap();
        assert!(p.matches("alpha"));
        assert!(!p.matches("alpha-test"));
        assert!(!p.matches("beta"));
    }

    #[test]
    fn whitespace_around_alternation_is_stripped() {
        let p = ServerPattern::new("  one |two  | three ", None).unwrap();
        assert_eq!(p.include(), "one|two|three");
        assert!(p.matches("two"));
        assert!(p.matches("three"));
        assert!(!p.matches("four"));
    }

    #[test]
    fn search_semantics() {
        let p = ServerPattern::new("gam", None).unwrap();
        assert!(p.matches("my gaming server"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = ServerPattern::new("(", None).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPattern { ref pattern, .. } if pattern == "("));

        let err = ServerPattern::new("ok", Some("[")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPattern { .. }));
    }
}
