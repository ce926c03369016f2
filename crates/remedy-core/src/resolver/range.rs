//! npm-style version ranges over [`semver::Version`].
//!
//! Advisory feeds and manifests express ranges in the npm dialect
//! (space-separated AND comparators, `||` unions, `^`/`~` shorthands,
//! `x`-wildcards), which differs from the Cargo dialect the `semver` crate
//! parses. This module parses the npm dialect into explicit comparator
//! clauses and evaluates satisfaction with npm's prerelease opt-in rule.

use std::fmt;
use std::str::FromStr;

use semver::{Prerelease, Version};
use thiserror::Error;

/// Errors raised while parsing a version range.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RangeError {
    /// A comparator token could not be parsed.
    #[error("invalid range comparator `{token}` in `{range}`")]
    InvalidComparator {
        /// The offending token.
        token: String,
        /// The full range text.
        range: String,
    },

    /// A hyphen range was missing one of its bounds.
    #[error("incomplete hyphen range in `{range}`")]
    IncompleteHyphen {
        /// The full range text.
        range: String,
    },
}

/// Comparison operator of a single comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Strictly less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Strictly greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Exactly equal.
    Eq,
}

impl Op {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "=",
        }
    }
}

/// One `op version` pair, e.g. `>=1.0.3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    /// Comparison operator.
    pub op: Op,
    /// Fully-padded version operand.
    pub version: Version,
}

impl Comparator {
    fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            Op::Lt => candidate < &self.version,
            Op::Lte => candidate <= &self.version,
            Op::Gt => candidate > &self.version,
            Op::Gte => candidate >= &self.version,
            Op::Eq => candidate == &self.version,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

/// A parsed npm-style range: a union (`||`) of AND-comparator clauses.
///
/// The original range text is retained for display in warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    clauses: Vec<Vec<Comparator>>,
}

impl VersionRange {
    /// Parses an npm-style range.
    ///
    /// Commas are treated as whitespace so that advisory-feed ranges like
    /// `>= 1.0.0, < 1.0.3` parse identically to `>=1.0.0 <1.0.3`.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] when a comparator token is malformed.
    pub fn parse(raw: &str) -> Result<Self, RangeError> {
        let normalized = raw.replace(',', " ");
        let mut clauses = Vec::new();
        for clause_text in normalized.split("||") {
            clauses.push(parse_clause(clause_text, raw)?);
        }
        Ok(Self {
            raw: raw.trim().to_string(),
            clauses,
        })
    }

    /// Returns true when `candidate` satisfies this range.
    ///
    /// Prerelease versions satisfy a clause only when some comparator in
    /// that clause carries a prerelease on the same `major.minor.patch`
    /// triple, matching npm's opt-in rule.
    #[must_use]
    pub fn satisfies(&self, candidate: &Version) -> bool {
        self.clauses.iter().any(|clause| {
            clause.iter().all(|c| c.matches(candidate))
                && (candidate.pre.is_empty() || clause_admits_prerelease(clause, candidate))
        })
    }

    /// The range text as originally supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn clause_admits_prerelease(clause: &[Comparator], candidate: &Version) -> bool {
    clause.iter().any(|c| {
        !c.version.pre.is_empty()
            && c.version.major == candidate.major
            && c.version.minor == candidate.minor
            && c.version.patch == candidate.patch
    })
}

/// A version with possibly-unspecified components, as written in range
/// tokens (`1`, `1.2`, `1.2.x`, `1.2.3-beta.1`).
#[derive(Debug, Clone)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start_matches('v');
        let (core, pre) = match text.split_once('-') {
            Some((core, rest)) => {
                // Strip build metadata from the prerelease tail.
                let pre = rest.split('+').next().unwrap_or(rest);
                (core, Prerelease::new(pre).ok()?)
            },
            None => (text.split('+').next().unwrap_or(text), Prerelease::EMPTY),
        };
        let mut components = core.split('.');
        let major = parse_component(components.next())?;
        let minor = parse_component(components.next())?;
        let patch = parse_component(components.next())?;
        if components.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    fn floor(&self) -> Version {
        let mut v = Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        );
        v.pre = self.pre.clone();
        v
    }

    const fn is_wild(&self) -> bool {
        self.major.is_none()
    }
}

/// Parses one dotted component; `x`, `X`, and `*` mean unspecified, and an
/// absent component is unspecified. Returns `None` (outer) on garbage.
#[allow(clippy::option_option)]
fn parse_component(text: Option<&str>) -> Option<Option<u64>> {
    match text {
        None => Some(None),
        Some("x" | "X" | "*") => Some(None),
        Some(other) => other.parse::<u64>().ok().map(Some),
    }
}

fn parse_clause(clause_text: &str, raw: &str) -> Result<Vec<Comparator>, RangeError> {
    let tokens = tokenize(clause_text);
    // Hyphen ranges: `A - B` desugars to `>=A <=B` (upper bound widened
    // when B is partial).
    if let Some(dash) = tokens.iter().position(|t| t == "-") {
        if dash == 0 || dash + 1 >= tokens.len() {
            return Err(RangeError::IncompleteHyphen {
                range: raw.to_string(),
            });
        }
        let lower = Partial::parse(&tokens[dash - 1]).ok_or_else(|| invalid(&tokens[dash - 1], raw))?;
        let upper = Partial::parse(&tokens[dash + 1]).ok_or_else(|| invalid(&tokens[dash + 1], raw))?;
        let mut comparators = vec![Comparator {
            op: Op::Gte,
            version: lower.floor(),
        }];
        comparators.extend(upper_bound_for(&upper));
        return Ok(comparators);
    }

    let mut comparators = Vec::new();
    for token in &tokens {
        expand_token(token, raw, &mut comparators)?;
    }
    Ok(comparators)
}

fn invalid(token: &str, raw: &str) -> RangeError {
    RangeError::InvalidComparator {
        token: token.to_string(),
        range: raw.to_string(),
    }
}

/// Splits a clause into tokens, re-joining a bare operator with the version
/// that follows it (`>= 1.0.0` becomes `>=1.0.0`).
fn tokenize(clause_text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for word in clause_text.split_whitespace() {
        if let Some(last) = tokens.last_mut() {
            if matches!(last.as_str(), ">" | "<" | ">=" | "<=" | "=") && word != "-" {
                last.push_str(word);
                continue;
            }
        }
        tokens.push(word.to_string());
    }
    tokens
}

fn split_op(token: &str) -> (Option<Op>, &str) {
    if let Some(rest) = token.strip_prefix(">=") {
        (Some(Op::Gte), rest)
    } else if let Some(rest) = token.strip_prefix("<=") {
        (Some(Op::Lte), rest)
    } else if let Some(rest) = token.strip_prefix('>') {
        (Some(Op::Gt), rest)
    } else if let Some(rest) = token.strip_prefix('<') {
        (Some(Op::Lt), rest)
    } else if let Some(rest) = token.strip_prefix('=') {
        (Some(Op::Eq), rest)
    } else {
        (None, token)
    }
}

fn expand_token(token: &str, raw: &str, out: &mut Vec<Comparator>) -> Result<(), RangeError> {
    if token.is_empty() || token == "*" || token == "x" || token == "X" {
        return Ok(());
    }

    if let Some(rest) = token.strip_prefix('^') {
        let p = Partial::parse(rest).ok_or_else(|| invalid(token, raw))?;
        if p.is_wild() {
            return Ok(());
        }
        out.push(Comparator {
            op: Op::Gte,
            version: p.floor(),
        });
        out.push(Comparator {
            op: Op::Lt,
            version: caret_upper(&p),
        });
        return Ok(());
    }

    if let Some(rest) = token.strip_prefix('~') {
        let p = Partial::parse(rest).ok_or_else(|| invalid(token, raw))?;
        if p.is_wild() {
            return Ok(());
        }
        out.push(Comparator {
            op: Op::Gte,
            version: p.floor(),
        });
        let upper = match p.minor {
            Some(minor) => Version::new(p.major.unwrap_or(0), minor + 1, 0),
            None => Version::new(p.major.unwrap_or(0) + 1, 0, 0),
        };
        out.push(Comparator { op: Op::Lt, version: upper });
        return Ok(());
    }

    let (op, rest) = split_op(token);
    let p = Partial::parse(rest).ok_or_else(|| invalid(token, raw))?;

    match op {
        None | Some(Op::Eq) => {
            if p.is_wild() {
                return Ok(());
            }
            if p.patch.is_some() {
                out.push(Comparator {
                    op: Op::Eq,
                    version: p.floor(),
                });
            } else {
                // `1` / `1.2` behave as x-ranges.
                out.push(Comparator {
                    op: Op::Gte,
                    version: p.floor(),
                });
                out.extend(upper_bound_for(&p));
            }
        },
        Some(Op::Gte) => out.push(Comparator {
            op: Op::Gte,
            version: p.floor(),
        }),
        Some(Op::Lt) => out.push(Comparator {
            op: Op::Lt,
            version: p.floor(),
        }),
        Some(Op::Gt) => {
            if p.patch.is_some() {
                out.push(Comparator {
                    op: Op::Gt,
                    version: p.floor(),
                });
            } else {
                // `>1.2` means "at least 1.3.0" in the npm dialect.
                let floor = match p.minor {
                    Some(minor) => Version::new(p.major.unwrap_or(0), minor + 1, 0),
                    None => Version::new(p.major.unwrap_or(0) + 1, 0, 0),
                };
                out.push(Comparator {
                    op: Op::Gte,
                    version: floor,
                });
            }
        },
        Some(Op::Lte) => {
            if p.patch.is_some() {
                out.push(Comparator {
                    op: Op::Lte,
                    version: p.floor(),
                });
            } else {
                out.extend(upper_bound_for(&p));
            }
        },
    }
    Ok(())
}

fn caret_upper(p: &Partial) -> Version {
    let major = p.major.unwrap_or(0);
    match (major, p.minor, p.patch) {
        (0, Some(0), Some(patch)) => Version::new(0, 0, patch + 1),
        (0, Some(minor), _) => Version::new(0, minor + 1, 0),
        _ => Version::new(major + 1, 0, 0),
    }
}

/// Exclusive upper bound comparator(s) for a partial used as an upper limit:
/// `<=1.2` widens to `<1.3.0`, `<=1` to `<2.0.0`, full versions stay `<=`.
fn upper_bound_for(p: &Partial) -> Vec<Comparator> {
    match (p.major, p.minor, p.patch) {
        (Some(major), Some(minor), Some(patch)) => {
            let mut v = Version::new(major, minor, patch);
            v.pre = p.pre.clone();
            vec![Comparator { op: Op::Lte, version: v }]
        },
        (Some(major), Some(minor), None) => vec![Comparator {
            op: Op::Lt,
            version: Version::new(major, minor + 1, 0),
        }],
        (Some(major), None, _) => vec![Comparator {
            op: Op::Lt,
            version: Version::new(major + 1, 0, 0),
        }],
        (None, _, _) => Vec::new(),
    }
}

/// Lenient version coercion.
///
/// Branch-name sanitization and loosely-formatted registry data can damage
/// strict semver text (`v1.2`, `1.0.0+build` with `+` rewritten, missing
/// components). This recovers a [`Version`] from the first numeric core
/// found, or returns `None` when no digits are present.
#[must_use]
pub fn coerce(text: &str) -> Option<Version> {
    let trimmed = text.trim().trim_start_matches(['=', 'v', 'V']);
    if let Ok(v) = Version::parse(trimmed) {
        return Some(v);
    }

    let start = trimmed.find(|c: char| c.is_ascii_digit())?;
    let rest = &trimmed[start..];
    let core_end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let core = rest[..core_end].trim_end_matches('.');

    let mut numbers = core.split('.').filter_map(|c| c.parse::<u64>().ok());
    let major = numbers.next()?;
    let mut version = Version::new(major, numbers.next().unwrap_or(0), numbers.next().unwrap_or(0));

    // Re-attach a prerelease tail when one follows the numeric core.
    if let Some(tail) = rest[core_end..].strip_prefix('-') {
        let pre = tail.split('+').next().unwrap_or(tail);
        if let Ok(pre) = Prerelease::new(pre) {
            version.pre = pre;
        }
    }
    Some(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn plain_comparator_pair() {
        let range = VersionRange::parse(">=1.0.0 <1.0.3").unwrap();
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("1.0.2")));
        assert!(!range.satisfies(&v("1.0.3")));
        assert!(!range.satisfies(&v("0.9.9")));
    }

    #[test]
    fn comma_separated_advisory_style() {
        let range = VersionRange::parse(">= 1.0.0, < 1.0.3").unwrap();
        assert!(range.satisfies(&v("1.0.1")));
        assert!(!range.satisfies(&v("1.0.3")));
    }

    #[test]
    fn union_of_clauses() {
        let range = VersionRange::parse("<0.5.0 || >=1.0.0 <2.0.0").unwrap();
        assert!(range.satisfies(&v("0.4.9")));
        assert!(range.satisfies(&v("1.5.0")));
        assert!(!range.satisfies(&v("0.7.0")));
        assert!(!range.satisfies(&v("2.0.0")));
    }

    #[test]
    fn caret_shorthand() {
        let range = VersionRange::parse("^1.2.3").unwrap();
        assert!(range.satisfies(&v("1.2.3")));
        assert!(range.satisfies(&v("1.9.0")));
        assert!(!range.satisfies(&v("2.0.0")));

        let zero = VersionRange::parse("^0.2.3").unwrap();
        assert!(zero.satisfies(&v("0.2.9")));
        assert!(!zero.satisfies(&v("0.3.0")));

        let patch_only = VersionRange::parse("^0.0.3").unwrap();
        assert!(patch_only.satisfies(&v("0.0.3")));
        assert!(!patch_only.satisfies(&v("0.0.4")));
    }

    #[test]
    fn tilde_shorthand() {
        let range = VersionRange::parse("~1.2.3").unwrap();
        assert!(range.satisfies(&v("1.2.9")));
        assert!(!range.satisfies(&v("1.3.0")));
    }

    #[test]
    fn x_ranges() {
        let range = VersionRange::parse("1.2.x").unwrap();
        assert!(range.satisfies(&v("1.2.0")));
        assert!(range.satisfies(&v("1.2.7")));
        assert!(!range.satisfies(&v("1.3.0")));

        let major_only = VersionRange::parse("1").unwrap();
        assert!(major_only.satisfies(&v("1.9.9")));
        assert!(!major_only.satisfies(&v("2.0.0")));
    }

    #[test]
    fn star_matches_everything_stable() {
        let range = VersionRange::parse("*").unwrap();
        assert!(range.satisfies(&v("0.0.1")));
        assert!(range.satisfies(&v("99.0.0")));
        // Prereleases still need opt-in.
        assert!(!range.satisfies(&v("1.0.0-rc.1")));
    }

    #[test]
    fn hyphen_range() {
        let range = VersionRange::parse("1.2.3 - 2.3.4").unwrap();
        assert!(range.satisfies(&v("1.2.3")));
        assert!(range.satisfies(&v("2.3.4")));
        assert!(!range.satisfies(&v("2.3.5")));
    }

    #[test]
    fn prerelease_opt_in() {
        let range = VersionRange::parse(">=1.0.0-alpha <1.0.0").unwrap();
        assert!(range.satisfies(&v("1.0.0-beta")));

        let plain = VersionRange::parse(">=0.9.0").unwrap();
        assert!(!plain.satisfies(&v("1.0.0-beta")));
    }

    #[test]
    fn spaced_operator_tokens() {
        let range = VersionRange::parse(">= 1.0.0 < 2.0.0").unwrap();
        assert!(range.satisfies(&v("1.5.0")));
        assert!(!range.satisfies(&v("2.0.0")));
    }

    #[test]
    fn invalid_comparator_is_an_error() {
        assert!(VersionRange::parse(">=not-a-version").is_err());
    }

    #[test]
    fn coerce_recovers_damaged_versions() {
        assert_eq!(coerce("1.0.3"), Some(v("1.0.3")));
        assert_eq!(coerce("v2.1"), Some(v("2.1.0")));
        assert_eq!(coerce("=1.2.3"), Some(v("1.2.3")));
        assert_eq!(coerce("1.0.0-rc.1"), Some(v("1.0.0-rc.1")));
        assert_eq!(coerce("nope"), None);
    }

    #[test]
    fn coerce_is_stable_over_reformatting() {
        let first = coerce("1.2.3-beta.1").unwrap();
        let second = coerce(&first.to_string()).unwrap();
        assert_eq!(first, second);
    }
}
