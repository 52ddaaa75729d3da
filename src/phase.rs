//! Resource lifecycle phases
//!
//! `status.phase` values are mostly drawn from a small set, but controllers
//! are free to invent their own. Unknown strings are never rejected: they are
//! carried verbatim as [`Phase::Other`].

use std::fmt;

/// Observed `status.phase` of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
    /// Any phase outside the built-in set, spelled as observed or registered
    Other(String),
}

impl Phase {
    /// Parse a phase case-insensitively
    ///
    /// ```
    /// use weaver::Phase;
    ///
    /// assert_eq!(Phase::parse("running"), Phase::Running);
    /// assert_eq!(Phase::parse("Bound"), Phase::Other("Bound".to_string()));
    /// ```
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "unknown" => Self::Unknown,
            _ => Self::Other(raw.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
            Self::Other(raw) => raw,
        }
    }

    /// Compare against an observed phase string, ignoring case
    #[must_use]
    pub fn matches(&self, observed: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(observed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Phase {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
