//! Manifest edits, snapshots, and rollback.
//!
//! A [`ManifestEdit`] is the pending change for one remediation attempt:
//! new ranges for every dependency field naming the package, plus an
//! optional override-table entry at the project root for transitive
//! occurrences. An immutable [`ManifestSnapshot`] is captured before the
//! edit is applied; rollback writes the snapshot back verbatim, so undo is
//! a data operation rather than an inverse edit.

pub mod range_style;

use std::path::{Path, PathBuf};

use semver::Version;
use serde_json::Value;
use thiserror::Error;

pub use range_style::{RangeStyle, detect, render_preserving};

/// Errors raised while reading or writing manifests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// Filesystem failure on a manifest path.
    #[error("manifest I/O failure at {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON.
    #[error("manifest parse failure at {path}: {source}")]
    Parse {
        /// The file involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// The dependency tables a package manifest can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyField {
    /// `dependencies`
    Dependencies,
    /// `devDependencies`
    DevDependencies,
    /// `optionalDependencies`
    OptionalDependencies,
    /// `peerDependencies`
    PeerDependencies,
}

impl DependencyField {
    /// Every field, in manifest-conventional order.
    pub const ALL: [Self; 4] = [
        Self::Dependencies,
        Self::DevDependencies,
        Self::OptionalDependencies,
        Self::PeerDependencies,
    ];

    /// The manifest key for this field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::DevDependencies => "devDependencies",
            Self::OptionalDependencies => "optionalDependencies",
            Self::PeerDependencies => "peerDependencies",
        }
    }
}

/// One range rewrite inside a dependency field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeChange {
    /// Which dependency table the change lands in.
    pub field: DependencyField,
    /// Package name as it appears in the manifest.
    pub name: String,
    /// Range text being replaced.
    pub old_range: String,
    /// Replacement range text.
    pub new_range: String,
}

/// An override-table entry pinning a transitive dependency at the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideEntry {
    /// Package name.
    pub name: String,
    /// Pinned version.
    pub version: Version,
}

/// Pending change to one workspace manifest and, optionally, the root
/// override table.
#[derive(Debug, Clone)]
pub struct ManifestEdit {
    /// The workspace manifest being edited.
    pub manifest_path: PathBuf,
    /// Range rewrites for that manifest.
    pub changes: Vec<RangeChange>,
    /// Override entry and the root manifest it is written into.
    pub override_entry: Option<(PathBuf, OverrideEntry)>,
}

impl ManifestEdit {
    /// Plans the edit for upgrading `package` to `new_version` in the
    /// manifest at `manifest_path`.
    ///
    /// Every dependency field naming the package gets its range rewritten
    /// in the style of the existing range. When `override_root` is given
    /// (the package is not a direct dependency of this manifest), an
    /// override entry is planned there instead of a range rewrite.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the manifest cannot be read or
    /// parsed.
    pub fn plan(
        manifest_path: &Path,
        package: &str,
        new_version: &Version,
        override_root: Option<&Path>,
    ) -> Result<Self, ManifestError> {
        let value = read_manifest(manifest_path)?;
        let mut changes = Vec::new();

        for field in DependencyField::ALL {
            let Some(range) = value
                .get(field.as_str())
                .and_then(|table| table.get(package))
                .and_then(Value::as_str)
            else {
                continue;
            };
            changes.push(RangeChange {
                field,
                name: package.to_string(),
                old_range: range.to_string(),
                new_range: range_style::render_preserving(range, new_version),
            });
        }

        let override_entry = match override_root {
            Some(root) if changes.is_empty() => Some((
                root.to_path_buf(),
                OverrideEntry {
                    name: package.to_string(),
                    version: new_version.clone(),
                },
            )),
            _ => None,
        };

        Ok(Self {
            manifest_path: manifest_path.to_path_buf(),
            changes,
            override_entry,
        })
    }

    /// Every file this edit touches, deduplicated.
    #[must_use]
    pub fn touched_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.manifest_path.clone()];
        if let Some((root, _)) = &self.override_entry {
            if !paths.contains(root) {
                paths.push(root.clone());
            }
        }
        paths
    }

    /// Applies the edit, returning whether anything changed on disk.
    ///
    /// Rendering is compared against the current file text before writing;
    /// an edit that produces identical text performs no write, so applying
    /// the same edit twice is a no-op the second time.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] on read, parse, or write failure.
    pub fn apply(&self) -> Result<bool, ManifestError> {
        let mut changed = false;

        if !self.changes.is_empty() {
            let original = read_text(&self.manifest_path)?;
            let mut value = parse_manifest(&self.manifest_path, &original)?;
            for change in &self.changes {
                if let Some(slot) = value
                    .get_mut(change.field.as_str())
                    .and_then(|table| table.get_mut(&change.name))
                {
                    *slot = Value::String(change.new_range.clone());
                }
            }
            changed |= write_if_different(&self.manifest_path, &original, &value)?;
        }

        if let Some((root, entry)) = &self.override_entry {
            let original = read_text(root)?;
            let mut value = parse_manifest(root, &original)?;
            let overrides = value
                .as_object_mut()
                .map(|object| {
                    object
                        .entry("overrides")
                        .or_insert_with(|| Value::Object(serde_json::Map::new()))
                })
                .and_then(Value::as_object_mut);
            if let Some(overrides) = overrides {
                overrides.insert(entry.name.clone(), Value::String(entry.version.to_string()));
            }
            changed |= write_if_different(root, &original, &value)?;
        }

        Ok(changed)
    }
}

/// Immutable pre-edit capture of every file an edit touches.
///
/// Restoring writes the captured text back verbatim.
#[derive(Debug, Clone)]
pub struct ManifestSnapshot {
    files: Vec<(PathBuf, String)>,
}

impl ManifestSnapshot {
    /// Captures the current contents of `paths`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] when any file cannot be read.
    pub fn capture(paths: &[PathBuf]) -> Result<Self, ManifestError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push((path.clone(), read_text(path)?));
        }
        Ok(Self { files })
    }

    /// Writes every captured file back.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] when any file cannot be written.
    pub fn restore(&self) -> Result<(), ManifestError> {
        for (path, text) in &self.files {
            std::fs::write(path, text).map_err(|source| ManifestError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn read_text(path: &Path) -> Result<String, ManifestError> {
    std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_manifest(path: &Path, text: &str) -> Result<Value, ManifestError> {
    serde_json::from_str(text).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn read_manifest(path: &Path) -> Result<Value, ManifestError> {
    let text = read_text(path)?;
    parse_manifest(path, &text)
}

fn write_if_different(path: &Path, original: &str, value: &Value) -> Result<bool, ManifestError> {
    let mut rendered = serde_json::to_string_pretty(value).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    rendered.push('\n');

    if rendered == original {
        return Ok(false);
    }
    std::fs::write(path, rendered).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}
