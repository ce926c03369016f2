//! npm lockfile parsing.
//!
//! Builds a [`DependencyTree`] from `package-lock.json` (lockfile v2/v3
//! `packages` form). Containment edges come from path nesting, dependency
//! edges from the node_modules resolution walk, and workspace directories
//! plus their `node_modules` links are wired through link targets.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use super::InstallError;
use crate::resolver::coerce;
use crate::tree::{DependencyNode, DependencyTree, NodeId};

#[derive(Debug, Deserialize)]
struct LockfileDoc {
    name: Option<String>,
    #[serde(default)]
    packages: BTreeMap<String, LockEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockEntry {
    name: Option<String>,
    version: Option<String>,
    resolved: Option<String>,
    #[serde(default)]
    link: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, String>,
}

impl LockEntry {
    fn declared_names(&self) -> impl Iterator<Item = &String> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .chain(self.optional_dependencies.keys())
            .chain(self.peer_dependencies.keys())
    }
}

/// Parses `<project>/package-lock.json` into a tree.
///
/// # Errors
///
/// Returns [`InstallError::LockfileMissing`] when the file is absent and
/// [`InstallError::LockfileParse`] when it does not parse.
pub fn parse_lockfile(project: &Path) -> Result<DependencyTree, InstallError> {
    let path = project.join("package-lock.json");
    let text = std::fs::read_to_string(&path).map_err(|_| InstallError::LockfileMissing {
        path: path.clone(),
    })?;
    parse_lockfile_text(&text).map_err(|message| InstallError::LockfileParse { path, message })
}

/// Parses lockfile text into a tree.
///
/// # Errors
///
/// Returns a description of the first structural problem found.
pub fn parse_lockfile_text(text: &str) -> Result<DependencyTree, String> {
    let doc: LockfileDoc = serde_json::from_str(text).map_err(|e| e.to_string())?;

    let mut tree = DependencyTree::new();
    let mut by_location: HashMap<&str, NodeId> = HashMap::new();

    // Node creation. BTreeMap order makes arena layout deterministic.
    for (location, entry) in &doc.packages {
        let name = entry
            .name
            .clone()
            .or_else(|| derive_name(location))
            .or_else(|| doc.name.clone())
            .unwrap_or_else(|| "unnamed".to_string());
        let version = entry.version.as_deref().and_then(coerce);

        let mut node = DependencyNode::new(name, version, location.as_str());
        node.is_link = entry.link;
        node.is_workspace = location.is_empty() || !location.contains("node_modules/");
        by_location.insert(location.as_str(), tree.push(node));
    }

    let root = *by_location
        .get("")
        .ok_or_else(|| "lockfile has no root package entry".to_string())?;
    tree.set_root(root);

    // Containment and link wiring.
    for (location, entry) in &doc.packages {
        let id = by_location[location.as_str()];

        if let Some(parent_location) = parent_of(location) {
            if let Some(&parent) = by_location.get(parent_location) {
                tree.node_mut(id).parent = Some(parent);
                let name = tree.node(id).name.clone();
                // A name can appear both as a resolution slot
                // (`node_modules/<name>`) and as a workspace directory; the
                // slot is the manifest's direct child.
                let existing_slot = tree
                    .node(parent)
                    .children
                    .get(&name)
                    .copied()
                    .is_some_and(|existing| {
                        tree.node(existing)
                            .location
                            .to_string_lossy()
                            .contains("node_modules/")
                    });
                if !existing_slot {
                    tree.node_mut(parent).children.insert(name, id);
                }
            }
        }

        if entry.link {
            if let Some(&target) = entry
                .resolved
                .as_deref()
                .and_then(|resolved| by_location.get(resolved))
            {
                tree.node_mut(id).link_target = Some(target);
            }
        }
    }

    // Dependency edges via the node_modules resolution walk, from each
    // node's real (link-resolved) location.
    for (location, entry) in &doc.packages {
        let id = by_location[location.as_str()];
        let origin = tree.node(tree.resolve_link(id)).location.clone();
        let origin = origin.to_string_lossy().into_owned();

        for dep in entry.declared_names() {
            if let Some(&target) = resolve_dependency(&by_location, &origin, dep) {
                tree.node_mut(id).edges_out.insert(dep.clone(), target);
            }
        }
    }

    Ok(tree)
}

/// Package name implied by a lockfile location, `None` for the root.
fn derive_name(location: &str) -> Option<String> {
    if location.is_empty() {
        return None;
    }
    match location.rfind("node_modules/") {
        Some(idx) => Some(location[idx + "node_modules/".len()..].to_string()),
        None => location.rsplit('/').next().map(str::to_string),
    }
}

/// Containment parent of a lockfile location.
fn parent_of(location: &str) -> Option<&str> {
    if location.is_empty() {
        return None;
    }
    match location.rfind("node_modules/") {
        Some(0) => Some(""),
        Some(idx) => Some(location[..idx - 1].trim_end_matches('/')),
        None => Some(""),
    }
}

fn resolve_dependency<'a>(
    by_location: &'a HashMap<&str, NodeId>,
    origin: &str,
    dep: &str,
) -> Option<&'a NodeId> {
    let mut scope = origin.to_string();
    loop {
        let candidate = if scope.is_empty() {
            format!("node_modules/{dep}")
        } else {
            format!("{scope}/node_modules/{dep}")
        };
        if let Some(id) = by_location.get(candidate.as_str()) {
            return Some(id);
        }
        match parent_of(&scope) {
            Some(parent) => scope = parent.to_string(),
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use semver::Version;

    use super::*;

    const WORKSPACE_LOCK: &str = r#"{
        "name": "acme-monorepo",
        "lockfileVersion": 3,
        "packages": {
            "": {
                "name": "acme-monorepo",
                "version": "0.1.0",
                "workspaces": ["packages/api"],
                "dependencies": { "left-pad": "^1.0.0" }
            },
            "node_modules/left-pad": {
                "version": "1.0.0",
                "resolved": "https://registry.npmjs.org/left-pad/-/left-pad-1.0.0.tgz"
            },
            "node_modules/api": {
                "resolved": "packages/api",
                "link": true
            },
            "packages/api": {
                "name": "api",
                "version": "1.0.0",
                "dependencies": { "express": "^4.18.0" }
            },
            "node_modules/express": {
                "version": "4.18.2",
                "dependencies": { "qs": "6.11.0" }
            },
            "node_modules/express/node_modules/qs": {
                "version": "6.11.0"
            },
            "node_modules/@scope/helper": {
                "version": "2.0.0"
            }
        }
    }"#;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn parses_versions_and_names() {
        let tree = parse_lockfile_text(WORKSPACE_LOCK).unwrap();
        let found = tree.find_one("left-pad", &v("1.0.0")).unwrap();
        assert!(found.is_some());

        let scoped = tree.find_all("@scope/helper").unwrap();
        assert_eq!(scoped.len(), 1);
    }

    #[test]
    fn nested_duplicate_resolves_to_nearest_scope() {
        let tree = parse_lockfile_text(WORKSPACE_LOCK).unwrap();
        let express = tree.find_one("express", &v("4.18.2")).unwrap().unwrap();
        let qs = tree.node(express).edges_out["qs"];
        assert_eq!(tree.node(qs).version, Some(v("6.11.0")));
        assert_eq!(
            tree.node(qs).location.to_string_lossy(),
            "node_modules/express/node_modules/qs"
        );
    }

    #[test]
    fn workspace_link_is_wired() {
        let tree = parse_lockfile_text(WORKSPACE_LOCK).unwrap();
        let root = tree.root();
        let slot = tree.node(root).children["api"];
        assert!(tree.node(slot).is_link);

        let target = tree.resolve_link(slot);
        assert_eq!(tree.node(target).location.to_string_lossy(), "packages/api");
        assert!(tree.is_top_level(root, target));
    }

    #[test]
    fn workspace_nodes_listed_without_root() {
        let tree = parse_lockfile_text(WORKSPACE_LOCK).unwrap();
        let workspaces = tree.workspace_nodes();
        assert_eq!(workspaces.len(), 1);
        assert_eq!(
            tree.node(workspaces[0]).location.to_string_lossy(),
            "packages/api"
        );
    }

    #[test]
    fn workspace_dependency_resolves_up_the_chain() {
        let tree = parse_lockfile_text(WORKSPACE_LOCK).unwrap();
        let api = tree.find_one("api", &v("1.0.0")).unwrap().unwrap();
        let express = tree.node(api).edges_out["express"];
        assert_eq!(tree.node(express).version, Some(v("4.18.2")));
    }

    #[test]
    fn top_level_is_direct_only() {
        let tree = parse_lockfile_text(WORKSPACE_LOCK).unwrap();
        let root = tree.root();
        let left_pad = tree.find_one("left-pad", &v("1.0.0")).unwrap().unwrap();
        let qs = tree.find_one("qs", &v("6.11.0")).unwrap().unwrap();

        assert!(tree.is_top_level(root, left_pad));
        assert!(!tree.is_top_level(root, qs));
    }

    #[test]
    fn missing_root_entry_is_an_error() {
        let result = parse_lockfile_text(r#"{"packages": {"node_modules/a": {"version": "1.0.0"}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_lockfile_text("not json").is_err());
    }
}
