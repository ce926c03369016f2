//! Run-scoped warning ledger.
//!
//! Attempt-scoped failures become warnings, buffered per package and
//! surfaced together once that package's processing finishes — not
//! interleaved mid-loop.

use tracing::warn;

/// Collects warnings for the duration of one run.
#[derive(Debug, Default)]
pub struct RunWarnings {
    current_package: Option<String>,
    buffered: Vec<String>,
    surfaced: Vec<String>,
}

impl RunWarnings {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to a new package, surfacing anything buffered for the
    /// previous one. Calling with the current package is a no-op.
    pub fn begin_package(&mut self, package: &str) {
        if self.current_package.as_deref() == Some(package) {
            return;
        }
        self.flush();
        self.current_package = Some(package.to_string());
    }

    /// Buffers one warning for the current package.
    pub fn push(&mut self, message: impl Into<String>) {
        self.buffered.push(message.into());
    }

    /// Surfaces everything buffered for the current package.
    pub fn flush(&mut self) {
        for message in self.buffered.drain(..) {
            warn!(
                package = self.current_package.as_deref().unwrap_or("-"),
                "{message}"
            );
            self.surfaced.push(message);
        }
    }

    /// Flushes and returns every warning surfaced during the run.
    #[must_use]
    pub fn finish(mut self) -> Vec<String> {
        self.flush();
        self.surfaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_buffer_until_package_changes() {
        let mut warnings = RunWarnings::new();
        warnings.begin_package("npm/left-pad");
        warnings.push("first");
        warnings.push("second");
        // Same package: nothing surfaced yet.
        warnings.begin_package("npm/left-pad");
        assert!(warnings.surfaced.is_empty());

        warnings.begin_package("npm/qs");
        assert_eq!(warnings.surfaced, vec!["first", "second"]);
    }

    #[test]
    fn finish_flushes_the_tail() {
        let mut warnings = RunWarnings::new();
        warnings.begin_package("npm/qs");
        warnings.push("tail");
        assert_eq!(warnings.finish(), vec!["tail"]);
    }
}
