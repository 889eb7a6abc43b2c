//! Vulnerability findings and the severity scale used to rank them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vulnerability severity, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Severity {
    #[default]
    Unknown,
    Negligible,
    Low,
    Medium,
    High,
    Critical,
    Defcon1,
}

impl Severity {
    /// Every level in ascending order.
    pub const ALL: [Severity; 7] = [
        Severity::Unknown,
        Severity::Negligible,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
        Severity::Defcon1,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "Unknown",
            Severity::Negligible => "Negligible",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
            Severity::Defcon1 => "Defcon1",
        }
    }

    /// Canonical names of all levels, for error messages.
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|s| s.as_str().to_string()).collect()
    }

    /// Match a user-supplied value against the scale.
    ///
    /// Surrounding whitespace is ignored and each word is capitalised before
    /// comparison, so "HIGH" and "high" both resolve to `High`.
    pub fn from_name(value: &str) -> Option<Self> {
        let normalized = title_case(value.trim());
        Self::ALL.into_iter().find(|s| s.as_str() == normalized)
    }

    /// Lenient parse for severities reported by the analysis service.
    pub fn parse(value: &str) -> Self {
        Self::from_name(value).unwrap_or_default()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn title_case(value: &str) -> String {
    let lower = value.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut start_of_word = true;
    for c in lower.chars() {
        if start_of_word && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        start_of_word = c.is_whitespace();
    }
    out
}

/// A single vulnerability reported by the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Vulnerability {
    /// Identifier (e.g. "CVE-2024-12345")
    pub name: String,

    /// Distribution namespace (e.g. "debian:12")
    pub namespace_name: String,

    pub description: String,

    /// Link to the advisory
    pub link: String,

    pub severity: Severity,

    /// Version that fixes the vulnerability (empty if none)
    pub fixed_by: String,

    /// Affected package name
    pub feature_name: String,

    /// Installed package version
    pub feature_version: String,
}

impl Vulnerability {
    /// Whether a fixed version has been published.
    pub fn is_fixed(&self) -> bool {
        !self.fixed_by.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_name() {
        assert_eq!(Severity::from_name("unknown"), Some(Severity::Unknown));
        assert_eq!(Severity::from_name("Negligible"), Some(Severity::Negligible));
        assert_eq!(Severity::from_name("HIGH"), Some(Severity::High));
        assert_eq!(Severity::from_name("critical "), Some(Severity::Critical));
        assert_eq!(Severity::from_name("DEFCON1"), Some(Severity::Defcon1));
        assert_eq!(Severity::from_name("banana"), None);
        assert_eq!(Severity::from_name(""), None);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Unknown < Severity::Negligible);
        assert!(Severity::High < Severity::Critical);
        assert!(Severity::Critical < Severity::Defcon1);
        assert_eq!(Severity::ALL.iter().max(), Some(&Severity::Defcon1));
    }

    #[test]
    fn test_severity_parse_is_lenient() {
        assert_eq!(Severity::parse("Medium"), Severity::Medium);
        assert_eq!(Severity::parse("whatever"), Severity::Unknown);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("hello world"), "Hello World");
        assert_eq!(title_case("DEFCON1"), "Defcon1");
    }
}
