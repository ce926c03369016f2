//! Curated replacement anchors.
//!
//! A small compiled-in table of packages for which a maintained replacement
//! manifest exists. When a package appears here, patch searches anchor to
//! the replacement's major version instead of the installed major, so a
//! remediation can move onto the maintained line.

/// Returns the anchor major for a curated replacement of `name`, if any.
#[must_use]
pub fn replacement_major(name: &str) -> Option<u64> {
    CURATED.iter().find(|(n, _)| *n == name).map(|(_, major)| *major)
}

/// (package name, replacement major) pairs, npm ecosystem.
const CURATED: &[(&str, u64)] = &[
    ("array-flatten", 3),
    ("is-regex", 1),
    ("json5", 2),
    ("minimist", 1),
    ("qs", 6),
    ("tough-cookie", 4),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_entry_resolves() {
        assert_eq!(replacement_major("qs"), Some(6));
    }

    #[test]
    fn unknown_entry_is_none() {
        assert_eq!(replacement_major("left-pad"), None);
    }
}
