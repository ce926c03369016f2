//! Installed dependency tree and read-only queries over it.
//!
//! Nodes live in an arena indexed by [`NodeId`], so dependency cycles and
//! link/alias indirection are representable without reference cycles. The
//! tree is loaded once per install and replaced wholesale after each
//! reinstall — queries never mutate it.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;

use semver::Version;
use thiserror::Error;

/// Hard ceiling on traversal steps.
///
/// The visited set already guarantees termination on well-formed arenas;
/// the ceiling catches malformed input whose aliasing defeats it.
pub const MAX_TRAVERSAL_STEPS: usize = 1_000_000;

/// Errors raised by tree queries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TreeError {
    /// Traversal exceeded [`MAX_TRAVERSAL_STEPS`].
    #[error("dependency tree traversal exceeded {limit} steps; tree is malformed")]
    TraversalCeiling {
        /// The ceiling that was hit.
        limit: usize,
    },
}

/// Index of a node in its owning [`DependencyTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// One resolved package occurrence in the installed tree.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    /// Full package name (`@scope/name`).
    pub name: String,
    /// Resolved version; absent on pure link entries.
    pub version: Option<Version>,
    /// Location on disk relative to the project root.
    pub location: PathBuf,
    /// Whether this entry is a link/alias to another location.
    pub is_link: bool,
    /// Link target, when [`is_link`](Self::is_link) is set.
    pub link_target: Option<NodeId>,
    /// Containment parent (the tree edge, not a dependency edge).
    pub parent: Option<NodeId>,
    /// Contained children, keyed by package name.
    pub children: BTreeMap<String, NodeId>,
    /// Resolved dependency edges out of this node, keyed by package name.
    pub edges_out: BTreeMap<String, NodeId>,
    /// Whether this node is a workspace manifest (or the root manifest).
    pub is_workspace: bool,
}

impl DependencyNode {
    /// Creates a plain node with no edges.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<Version>, location: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            version,
            location: location.into(),
            is_link: false,
            link_target: None,
            parent: None,
            children: BTreeMap::new(),
            edges_out: BTreeMap::new(),
            is_workspace: false,
        }
    }
}

/// Arena-backed installed dependency tree.
#[derive(Debug, Clone, Default)]
pub struct DependencyTree {
    nodes: Vec<DependencyNode>,
    root: Option<NodeId>,
}

impl DependencyTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id. The first node added becomes the
    /// root unless [`set_root`](Self::set_root) overrides it.
    pub fn push(&mut self, node: DependencyNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    /// Marks `id` as the root manifest node.
    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    /// The root manifest node.
    ///
    /// # Panics
    ///
    /// Panics when called on an empty tree; trees built by any provider
    /// always carry a root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root.expect("dependency tree has a root node")
    }

    /// Borrow a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &DependencyNode {
        &self.nodes[id.0]
    }

    /// Mutably borrow a node (used by providers while building).
    pub fn node_mut(&mut self, id: NodeId) -> &mut DependencyNode {
        &mut self.nodes[id.0]
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All workspace manifest nodes, root excluded, in arena order.
    #[must_use]
    pub fn workspace_nodes(&self) -> Vec<NodeId> {
        let root = self.root;
        (0..self.nodes.len())
            .map(NodeId)
            .filter(|id| self.nodes[id.0].is_workspace && Some(*id) != root)
            .collect()
    }

    /// Follows link indirection to the real node.
    ///
    /// Bounded by [`MAX_TRAVERSAL_STEPS`] in case of a link loop; on a loop
    /// the last node reached is returned, which a caller's identity
    /// comparison then rejects.
    #[must_use]
    pub fn resolve_link(&self, mut id: NodeId) -> NodeId {
        let mut steps = 0;
        while let Some(target) = self.nodes[id.0].link_target {
            if target == id || steps >= MAX_TRAVERSAL_STEPS {
                break;
            }
            id = target;
            steps += 1;
        }
        id
    }

    /// Finds every node with the given package name.
    ///
    /// Iterative worklist over containment and dependency edges with a
    /// visited set, so cyclic graphs terminate.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TraversalCeiling`] when the step ceiling is
    /// exceeded.
    pub fn find_all(&self, name: &str) -> Result<Vec<NodeId>, TreeError> {
        let mut found = Vec::new();
        self.walk(|tree, id| {
            let node = tree.node(id);
            if node.name == name && !node.is_link {
                found.push(id);
            }
        })?;
        Ok(found)
    }

    /// Finds the node with the given package name and version, if any.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TraversalCeiling`] when the step ceiling is
    /// exceeded.
    pub fn find_one(&self, name: &str, version: &Version) -> Result<Option<NodeId>, TreeError> {
        Ok(self
            .find_all(name)?
            .into_iter()
            .find(|id| self.node(*id).version.as_ref() == Some(version)))
    }

    /// Whether `node` is a direct (top-level) dependency of the manifest at
    /// `manifest`: the manifest's child slot for the node's name must
    /// resolve — through link indirection — to exactly this node.
    #[must_use]
    pub fn is_top_level(&self, manifest: NodeId, node: NodeId) -> bool {
        let name = &self.node(node).name;
        self.node(manifest)
            .children
            .get(name)
            .is_some_and(|slot| self.resolve_link(*slot) == self.resolve_link(node))
    }

    /// Iterates every node in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &DependencyNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// The node stored at a lockfile location, if any.
    #[must_use]
    pub fn find_by_location(&self, location: &str) -> Option<NodeId> {
        self.iter()
            .find(|(_, node)| node.location.to_str() == Some(location))
            .map(|(id, _)| id)
    }

    /// Distinct installed versions of `name` reachable from `start`,
    /// ascending.
    ///
    /// Reachability spans containment and dependency edges, so this
    /// answers "which versions of the package does this workspace
    /// actually pull in".
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::TraversalCeiling`] when the step ceiling is
    /// exceeded.
    pub fn reachable_versions(
        &self,
        start: NodeId,
        name: &str,
    ) -> Result<Vec<Version>, TreeError> {
        let mut versions = Vec::new();
        self.walk_from(start, |tree, id| {
            let node = tree.node(id);
            if node.name == name && !node.is_link {
                if let Some(version) = &node.version {
                    if !versions.contains(version) {
                        versions.push(version.clone());
                    }
                }
            }
        })?;
        versions.sort();
        Ok(versions)
    }

    fn walk(&self, visit: impl FnMut(&Self, NodeId)) -> Result<(), TreeError> {
        let Some(root) = self.root else {
            return Ok(());
        };
        self.walk_from(root, visit)
    }

    fn walk_from(&self, start: NodeId, mut visit: impl FnMut(&Self, NodeId)) -> Result<(), TreeError> {

        let mut queue = VecDeque::from([start]);
        let mut visited: HashSet<NodeId> = HashSet::from([start]);
        let mut steps = 0usize;

        while let Some(id) = queue.pop_front() {
            steps += 1;
            if steps > MAX_TRAVERSAL_STEPS {
                return Err(TreeError::TraversalCeiling {
                    limit: MAX_TRAVERSAL_STEPS,
                });
            }
            visit(self, id);

            let node = self.node(id);
            let next = node
                .children
                .values()
                .chain(node.edges_out.values())
                .chain(node.link_target.iter());
            for &neighbor in next {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    /// root -> a@1.0.0, b@2.0.0; a depends on b.
    fn sample_tree() -> (DependencyTree, NodeId, NodeId, NodeId) {
        let mut tree = DependencyTree::new();
        let root = tree.push({
            let mut n = DependencyNode::new("sample", Some(v("0.1.0")), "");
            n.is_workspace = true;
            n
        });
        let a = tree.push(DependencyNode::new("a", Some(v("1.0.0")), "node_modules/a"));
        let b = tree.push(DependencyNode::new("b", Some(v("2.0.0")), "node_modules/b"));

        tree.node_mut(root).children.insert("a".into(), a);
        tree.node_mut(root).children.insert("b".into(), b);
        tree.node_mut(a).parent = Some(root);
        tree.node_mut(b).parent = Some(root);
        tree.node_mut(a).edges_out.insert("b".into(), b);
        (tree, root, a, b)
    }

    #[test]
    fn find_all_locates_every_occurrence() {
        let (mut tree, root, _a, _b) = sample_tree();
        let nested = tree.push(DependencyNode::new(
            "b",
            Some(v("1.5.0")),
            "node_modules/a/node_modules/b",
        ));
        let a = tree.node(root).children["a"];
        tree.node_mut(a).children.insert("b".into(), nested);

        let found = tree.find_all("b").unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn find_one_matches_exact_version() {
        let (tree, _root, _a, b) = sample_tree();
        assert_eq!(tree.find_one("b", &v("2.0.0")).unwrap(), Some(b));
        assert_eq!(tree.find_one("b", &v("9.9.9")).unwrap(), None);
    }

    #[test]
    fn traversal_terminates_on_cycles() {
        let (mut tree, _root, a, b) = sample_tree();
        // b depends back on a: cycle of length 2.
        tree.node_mut(b).edges_out.insert("a".into(), a);

        let found = tree.find_all("a").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn self_edge_terminates() {
        let (mut tree, _root, a, _b) = sample_tree();
        tree.node_mut(a).edges_out.insert("a".into(), a);
        assert!(tree.find_all("a").is_ok());
    }

    #[test]
    fn top_level_detection() {
        let (tree, root, a, b) = sample_tree();
        assert!(tree.is_top_level(root, a));
        assert!(tree.is_top_level(root, b));
        // b is a's dependency but not contained in a.
        assert!(!tree.is_top_level(a, b));
    }

    #[test]
    fn top_level_through_link_indirection() {
        let mut tree = DependencyTree::new();
        let root = tree.push(DependencyNode::new("sample", Some(v("0.1.0")), ""));
        let target = tree.push({
            let mut n = DependencyNode::new("api", Some(v("1.0.0")), "packages/api");
            n.is_workspace = true;
            n
        });
        let link = tree.push({
            let mut n = DependencyNode::new("api", None, "node_modules/api");
            n.is_link = true;
            n.link_target = Some(target);
            n
        });
        tree.node_mut(root).children.insert("api".into(), link);

        assert!(tree.is_top_level(root, target));
    }

    #[test]
    fn reachable_versions_are_scoped_to_the_start_node() {
        let (mut tree, root, a, _b) = sample_tree();
        let nested = tree.push(DependencyNode::new(
            "b",
            Some(v("1.5.0")),
            "node_modules/a/node_modules/b",
        ));
        tree.node_mut(a).children.insert("b".into(), nested);
        tree.node_mut(a).edges_out.insert("b".into(), nested);

        // From `a`, only the nested b is reachable.
        assert_eq!(tree.reachable_versions(a, "b").unwrap(), vec![v("1.5.0")]);
        // From the root, both occurrences are.
        assert_eq!(
            tree.reachable_versions(root, "b").unwrap(),
            vec![v("1.5.0"), v("2.0.0")]
        );
    }

    #[test]
    fn find_by_location_matches_exactly() {
        let (tree, _root, a, _b) = sample_tree();
        assert_eq!(tree.find_by_location("node_modules/a"), Some(a));
        assert_eq!(tree.find_by_location("node_modules/zzz"), None);
    }

    #[test]
    fn workspace_nodes_exclude_root() {
        let (mut tree, _root, _a, _b) = sample_tree();
        let ws = tree.push({
            let mut n = DependencyNode::new("api", Some(v("1.0.0")), "packages/api");
            n.is_workspace = true;
            n
        });
        assert_eq!(tree.workspace_nodes(), vec![ws]);
    }
}
