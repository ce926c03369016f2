//! Range-style detection and rendering.
//!
//! When a dependency range is rewritten, the new range should read like the
//! old one (`^`, `~`, exact, `>=`). Detection is a best-effort heuristic
//! over the comparator count and prefix character; compound ranges
//! (unions, multi-comparator clauses) are unclassifiable and fall back to
//! caret on render.

use semver::Version;
use serde::{Deserialize, Serialize};

/// A recognizable single-comparator range style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeStyle {
    /// `^1.2.3`
    Caret,
    /// `~1.2.3`
    Tilde,
    /// `1.2.3` or `=1.2.3`
    Exact,
    /// `>=1.2.3`
    Gte,
}

impl RangeStyle {
    /// Renders a version in this style.
    #[must_use]
    pub fn render(self, version: &Version) -> String {
        match self {
            Self::Caret => format!("^{version}"),
            Self::Tilde => format!("~{version}"),
            Self::Exact => version.to_string(),
            Self::Gte => format!(">={version}"),
        }
    }
}

/// Classifies an existing range string, or `None` when it is compound.
#[must_use]
pub fn detect(existing: &str) -> Option<RangeStyle> {
    let trimmed = existing.trim();
    // More than one comparator token means a compound range.
    if trimmed.contains("||") || trimmed.split_whitespace().nth(1).is_some() {
        return None;
    }
    match trimmed.as_bytes().first()? {
        b'^' => Some(RangeStyle::Caret),
        b'~' => Some(RangeStyle::Tilde),
        b'>' => trimmed.starts_with(">=").then_some(RangeStyle::Gte),
        b'=' => Some(RangeStyle::Exact),
        b if b.is_ascii_digit() || *b == b'v' => Some(RangeStyle::Exact),
        _ => None,
    }
}

/// Renders `version` in the style of `existing`, caret when the style
/// cannot be classified.
#[must_use]
pub fn render_preserving(existing: &str, version: &Version) -> String {
    detect(existing)
        .unwrap_or(RangeStyle::Caret)
        .render(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn detects_common_styles() {
        assert_eq!(detect("^1.0.0"), Some(RangeStyle::Caret));
        assert_eq!(detect("~1.0.0"), Some(RangeStyle::Tilde));
        assert_eq!(detect("1.0.0"), Some(RangeStyle::Exact));
        assert_eq!(detect("=1.0.0"), Some(RangeStyle::Exact));
        assert_eq!(detect(">=1.0.0"), Some(RangeStyle::Gte));
    }

    #[test]
    fn compound_ranges_are_unclassified() {
        assert_eq!(detect(">=1.0.0 <2.0.0"), None);
        assert_eq!(detect("^1.0.0 || ^2.0.0"), None);
        assert_eq!(detect(">1.0.0"), None);
    }

    #[test]
    fn preserving_render_keeps_style() {
        assert_eq!(render_preserving("^1.0.0", &v("1.0.3")), "^1.0.3");
        assert_eq!(render_preserving("~1.0.0", &v("1.0.3")), "~1.0.3");
        assert_eq!(render_preserving("1.0.0", &v("1.0.3")), "1.0.3");
    }

    #[test]
    fn unclassifiable_falls_back_to_caret() {
        assert_eq!(render_preserving(">=1.0.0 <2.0.0", &v("1.0.3")), "^1.0.3");
    }
}
