//! Best-patch-version resolution.
//!
//! Given one installed package occurrence, the set of published versions,
//! and the vulnerable range from an advisory, [`resolve`] picks the best
//! non-vulnerable version inside the anchor major — or nothing, which the
//! caller reads as "no compatible patch" (distinct from "already patched";
//! comparing against the installed version is the caller's job).

pub mod curated;
pub mod range;

use semver::Version;

pub use range::{RangeError, VersionRange, coerce};

/// Which end of the eligible set to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// Pick the lowest eligible version (smallest possible jump).
    Min,
    /// Pick the highest eligible version within the anchor major.
    #[default]
    Max,
}

/// Resolves the best non-vulnerable version for one installed package.
///
/// The anchor major comes from the curated-replacement table when the
/// package has an entry there, otherwise from `installed`. Eligible
/// versions share the anchor major and do not satisfy `vulnerable_range`
/// (a missing range disqualifies nothing). The search deliberately spans
/// the whole anchor major rather than the manifest's current range — the
/// major filter is the compatibility constraint here.
///
/// Returns `None` when no eligible version exists.
#[must_use]
pub fn resolve(
    package: &str,
    installed: &Version,
    available: &[Version],
    vulnerable_range: Option<&VersionRange>,
    mode: ResolveMode,
) -> Option<Version> {
    let anchor_major = curated::replacement_major(package).unwrap_or(installed.major);

    let eligible = available.iter().filter(|v| {
        v.major == anchor_major && !vulnerable_range.is_some_and(|range| range.satisfies(v))
    });

    match mode {
        ResolveMode::Min => eligible.min().cloned(),
        ResolveMode::Max => eligible.max().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    fn versions(texts: &[&str]) -> Vec<Version> {
        texts.iter().map(|t| v(t)).collect()
    }

    #[test]
    fn picks_only_eligible_patch_in_both_modes() {
        let available = versions(&["1.0.0", "1.0.1", "1.0.3", "2.0.0"]);
        let range = VersionRange::parse(">=1.0.0 <1.0.3").unwrap();

        let max = resolve("left-pad", &v("1.0.0"), &available, Some(&range), ResolveMode::Max);
        assert_eq!(max, Some(v("1.0.3")));

        let min = resolve("left-pad", &v("1.0.0"), &available, Some(&range), ResolveMode::Min);
        assert_eq!(min, Some(v("1.0.3")));
    }

    #[test]
    fn no_eligible_version_yields_none() {
        let available = versions(&["1.0.0", "1.0.1"]);
        let range = VersionRange::parse(">=1.0.0 <1.0.3").unwrap();

        let result = resolve("left-pad", &v("1.0.0"), &available, Some(&range), ResolveMode::Max);
        assert_eq!(result, None);
    }

    #[test]
    fn stays_inside_installed_major() {
        let available = versions(&["1.0.3", "2.0.0", "2.1.0"]);
        let range = VersionRange::parse("<1.0.3").unwrap();

        let result = resolve("left-pad", &v("1.0.0"), &available, Some(&range), ResolveMode::Max);
        assert_eq!(result, Some(v("1.0.3")));
    }

    #[test]
    fn curated_replacement_overrides_anchor() {
        // `qs` is curated to major 6; the installed 5.x does not anchor.
        let available = versions(&["5.2.1", "6.11.0", "6.12.0"]);
        let result = resolve("qs", &v("5.2.0"), &available, None, ResolveMode::Max);
        assert_eq!(result, Some(v("6.12.0")));
    }

    #[test]
    fn missing_range_means_everything_in_major_is_eligible() {
        let available = versions(&["1.0.0", "1.2.0"]);
        let result = resolve("left-pad", &v("1.0.0"), &available, None, ResolveMode::Min);
        assert_eq!(result, Some(v("1.0.0")));
    }

    proptest! {
        /// `Max` never resolves below `Min` when both produce a value.
        #[test]
        fn max_mode_dominates_min_mode(
            majors in proptest::collection::vec(0u64..4, 1..20),
            minors in proptest::collection::vec(0u64..10, 1..20),
        ) {
            let available: Vec<Version> = majors
                .iter()
                .zip(minors.iter())
                .map(|(&major, &minor)| Version::new(major, minor, 0))
                .collect();
            let installed = Version::new(1, 0, 0);
            let range = VersionRange::parse("<1.2.0").unwrap();

            let lo = resolve("pkg", &installed, &available, Some(&range), ResolveMode::Min);
            let hi = resolve("pkg", &installed, &available, Some(&range), ResolveMode::Max);
            if let (Some(lo), Some(hi)) = (lo, hi) {
                prop_assert!(hi >= lo);
            }
        }

        /// A resolved version never satisfies the vulnerable range.
        #[test]
        fn resolved_version_is_never_vulnerable(
            patches in proptest::collection::vec(0u64..20, 1..30),
            cutoff in 0u64..20,
        ) {
            let available: Vec<Version> =
                patches.iter().map(|&p| Version::new(1, 0, p)).collect();
            let range = VersionRange::parse(&format!("<1.0.{cutoff}")).unwrap();
            let installed = Version::new(1, 0, 0);

            if let Some(found) =
                resolve("pkg", &installed, &available, Some(&range), ResolveMode::Max)
            {
                prop_assert!(!range.satisfies(&found));
            }
        }
    }
}
