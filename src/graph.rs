//! Post-resolution graph construction: transitive requirement sets and the
//! topological link order derived from them (spec.md §4.4).

use std::collections::BTreeSet;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;

use crate::core::FpmError;
use crate::tree::Tree;

/// Namespace for the two GraphBuilder operations; both run only after the
/// resolver has converged (every node `done`).
pub struct GraphBuilder;

impl GraphBuilder {
    /// Fills `package_dep` on every node with the transitive closure (by
    /// name) of the dependencies its own manifest declares.
    ///
    /// Implemented as the fixed point the design notes describe: each pass
    /// recomputes every node's set from its direct manifest dependencies
    /// plus the current `package_dep` of those dependencies, and the loop
    /// stops once a pass changes nothing. `BTreeSet` equality already
    /// implements the "same length, element-wise equal in order"
    /// comparison the spec calls for, since a `BTreeSet`'s iteration order
    /// is always its sorted order.
    pub fn fill_package_deps(tree: &mut Tree) -> Result<(), FpmError> {
        let direct_deps = Self::direct_dependency_names(tree)?;

        const MAX_ITERATIONS: usize = 50;
        for iteration in 1..=MAX_ITERATIONS {
            let mut changed = false;
            for idx in 0..tree.nodes.len() {
                let mut closure: BTreeSet<String> = BTreeSet::new();
                for dep_name in &direct_deps[idx] {
                    closure.insert(dep_name.clone());
                    let dep_idx = tree.find(dep_name).ok_or_else(|| FpmError::GraphMissingDep {
                        from: tree.nodes[idx].name.clone(),
                        name: dep_name.clone(),
                    })?;
                    closure.extend(tree.nodes[dep_idx].package_dep.iter().cloned());
                }
                if closure != tree.nodes[idx].package_dep {
                    tree.nodes[idx].package_dep = closure;
                    changed = true;
                }
            }
            if !changed {
                tracing::debug!(iteration, "package_dep fixed point converged");
                return Ok(());
            }
        }
        Err(FpmError::FixedPointDiverged {
            iterations: MAX_ITERATIONS,
        })
    }

    /// Re-parses each node's own manifest to collect the names it directly
    /// declares (root counts dev/target dependencies too).
    fn direct_dependency_names(tree: &Tree) -> Result<Vec<Vec<String>>, FpmError> {
        let mut out = Vec::with_capacity(tree.nodes.len());
        for (idx, node) in tree.nodes.iter().enumerate() {
            let proj_dir = node
                .proj_dir
                .as_deref()
                .expect("GraphBuilder runs only after the resolver has converged");
            let package = crate::manifest::read_manifest(&proj_dir.join("fpm.toml"))?;
            let names = package
                .declared_dependencies(idx == 0)
                .into_iter()
                .map(|(name, _)| name.to_string())
                .collect();
            out.push(names);
        }
        Ok(out)
    }

    /// Post-order depth-first traversal from `root_id` through each node's
    /// `package_dep`: providers come out before the consumers that need
    /// them, and the sequence ends with `root_id` itself.
    ///
    /// Cycles are tolerated by collapsing — `petgraph`'s `DfsPostOrder`
    /// already implements exactly this visited-set semantics, so no
    /// cycle-detection error path is needed.
    pub fn link_order(tree: &Tree, root_id: usize) -> Result<Vec<usize>, FpmError> {
        if root_id >= tree.nodes.len() {
            return Err(FpmError::GraphInvalidId { id: root_id });
        }

        let mut graph = DiGraph::<usize, ()>::with_capacity(tree.nodes.len(), tree.nodes.len());
        for idx in 0..tree.nodes.len() {
            graph.add_node(idx);
        }
        for (idx, node) in tree.nodes.iter().enumerate() {
            for dep_name in &node.package_dep {
                let dep_idx = tree.find(dep_name).ok_or_else(|| FpmError::GraphMissingDep {
                    from: node.name.clone(),
                    name: dep_name.clone(),
                })?;
                graph.add_edge(NodeIndex::new(idx), NodeIndex::new(dep_idx), ());
            }
        }

        let mut dfs = DfsPostOrder::new(&graph, NodeIndex::new(root_id));
        let mut order = Vec::new();
        while let Some(next) = dfs.next(&graph) {
            order.push(next.index());
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::fake::FakeDownloader;
    use crate::git::fake::FakeGit;
    use serde_json::json;

    fn write_pkg(dir: &std::path::Path, name: &str, deps: &[(&str, &str)]) {
        std::fs::create_dir_all(dir).unwrap();
        let mut body = format!("[package]\nname = \"{name}\"\n[dependencies]\n");
        for (dep_name, path) in deps {
            body.push_str(&format!("{dep_name} = \"{path}\"\n"));
        }
        std::fs::write(dir.join("fpm.toml"), body).unwrap();
    }

    #[test]
    fn link_order_path_only_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let root_dir = tmp.path();
        write_pkg(root_dir, "root", &[("a", "./a"), ("b", "./b")]);
        write_pkg(&root_dir.join("a"), "a", &[("c", "../c")]);
        write_pkg(&root_dir.join("b"), "b", &[]);
        write_pkg(&root_dir.join("c"), "c", &[]);

        let mut tree = Tree::new(root_dir);
        let git = FakeGit::new("x");
        let downloader = FakeDownloader::new("unused", json!({}));
        tree.resolve(&git, &downloader).unwrap();
        tree.build_graph().unwrap();

        let order = tree.link_order(0).unwrap();
        let names: Vec<&str> = order.iter().map(|&i| tree.nodes[i].name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b", "root"]);
    }

    #[test]
    fn link_order_diamond_puts_shared_dep_first() {
        let tmp = tempfile::tempdir().unwrap();
        let root_dir = tmp.path();
        write_pkg(root_dir, "root", &[("a", "./a"), ("b", "./b")]);
        write_pkg(&root_dir.join("a"), "a", &[("c", "../c")]);
        write_pkg(&root_dir.join("b"), "b", &[("c", "../c")]);
        write_pkg(&root_dir.join("c"), "c", &[]);

        let mut tree = Tree::new(root_dir);
        let git = FakeGit::new("x");
        let downloader = FakeDownloader::new("unused", json!({}));
        tree.resolve(&git, &downloader).unwrap();
        tree.build_graph().unwrap();

        let order = tree.link_order(0).unwrap();
        let names: Vec<&str> = order.iter().map(|&i| tree.nodes[i].name.as_str()).collect();
        let c_pos = names.iter().position(|&n| n == "c").unwrap();
        let a_pos = names.iter().position(|&n| n == "a").unwrap();
        let b_pos = names.iter().position(|&n| n == "b").unwrap();
        assert!(c_pos < a_pos && c_pos < b_pos);
        assert_eq!(names.last(), Some(&"root"));
    }

    #[test]
    fn link_order_invalid_id_errors() {
        let tmp = tempfile::tempdir().unwrap();
        write_pkg(tmp.path(), "root", &[]);
        let mut tree = Tree::new(tmp.path());
        let git = FakeGit::new("x");
        let downloader = FakeDownloader::new("unused", json!({}));
        tree.resolve(&git, &downloader).unwrap();
        tree.build_graph().unwrap();

        let err = tree.link_order(99).unwrap_err();
        assert!(matches!(err, FpmError::GraphInvalidId { id: 99 }));
    }

    #[test]
    fn closure_is_valid_after_build_graph() {
        let tmp = tempfile::tempdir().unwrap();
        let root_dir = tmp.path();
        write_pkg(root_dir, "root", &[("a", "./a")]);
        write_pkg(&root_dir.join("a"), "a", &[("c", "../c")]);
        write_pkg(&root_dir.join("c"), "c", &[]);

        let mut tree = Tree::new(root_dir);
        let git = FakeGit::new("x");
        let downloader = FakeDownloader::new("unused", json!({}));
        tree.resolve(&git, &downloader).unwrap();
        tree.build_graph().unwrap();

        for node in &tree.nodes {
            for dep in &node.package_dep {
                assert!(tree.find(dep).is_some());
            }
        }
        let root_deps = &tree.nodes[0].package_dep;
        assert!(root_deps.contains("a"));
        assert!(root_deps.contains("c"));
    }
}
