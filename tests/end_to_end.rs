//! Broader, cross-module scenarios from spec.md §8, exercised through the
//! public `Tree` API rather than any single module's internals.

use std::path::Path;

use fpm_resolve::download::fake::FakeDownloader;
use fpm_resolve::git::fake::FakeGit;
use fpm_resolve::Tree;
use serde_json::json;

fn write_manifest(dir: &Path, contents: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("fpm.toml"), contents).unwrap();
}

/// Scenario 6: a diamond (`root` -> `a`, `b`; both -> `c`) resolves `c` to a
/// single node, and the link order puts `c` before both of its consumers
/// and `root` last.
#[test]
fn diamond_dependency_resolves_to_one_shared_node() {
    let tmp = tempfile::tempdir().unwrap();
    let root_dir = tmp.path();
    write_manifest(
        root_dir,
        "[package]\nname = \"root\"\n[dependencies]\na = \"./a\"\nb = \"./b\"\n",
    );
    write_manifest(&root_dir.join("a"), "[package]\nname = \"a\"\n[dependencies]\nc = \"../c\"\n");
    write_manifest(&root_dir.join("b"), "[package]\nname = \"b\"\n[dependencies]\nc = \"../c\"\n");
    write_manifest(&root_dir.join("c"), "[package]\nname = \"c\"\n");

    let mut tree = Tree::new(root_dir);
    let git = FakeGit::new("rev");
    let downloader = FakeDownloader::new("unused", json!({}));
    tree.resolve(&git, &downloader).unwrap();

    assert_eq!(tree.nodes.len(), 4, "c must be a single shared node, not duplicated");
    assert!(tree.finished());

    tree.build_graph().unwrap();
    let order = tree.link_order(0).unwrap();
    let names: Vec<&str> = order.iter().map(|&i| tree.nodes[i].name.as_str()).collect();
    let c_pos = names.iter().position(|&n| n == "c").unwrap();
    let a_pos = names.iter().position(|&n| n == "a").unwrap();
    let b_pos = names.iter().position(|&n| n == "b").unwrap();
    assert!(c_pos < a_pos);
    assert!(c_pos < b_pos);
    assert_eq!(names.last(), Some(&"root"));
}

/// Invariant 6: a resolved tree survives a dump/load round trip and a
/// second `resolve()` against the restored tree performs no further
/// fetches, since every node is still `done`.
#[test]
fn cache_round_trip_makes_second_resolve_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let root_dir = tmp.path();
    write_manifest(
        root_dir,
        "[package]\nname = \"root\"\n[dependencies]\nlibx = { git = \"https://x/x.git\", tag = \"v1.0.0\" }\n",
    );

    let git = FakeGit::new("cafef00d");
    let downloader = FakeDownloader::new("unused", json!({}));

    let mut tree = Tree::new(root_dir);
    tree.resolve(&git, &downloader).unwrap();
    tree.build_graph().unwrap();
    assert_eq!(git.checkouts.borrow().len(), 1);

    let mut buf = Vec::new();
    tree.dump_cache(&mut buf).unwrap();

    let mut restored = Tree::load_cache(buf.as_slice()).unwrap();
    assert_eq!(restored.nodes.len(), tree.nodes.len());
    assert!(restored.finished());

    restored.resolve(&git, &downloader).unwrap();
    assert_eq!(
        git.checkouts.borrow().len(),
        1,
        "resolving a fully-cached, still-valid tree must not re-fetch anything"
    );
}

/// Spec.md §8 scenarios 3 and 4: `resolve()` itself reconciles a freshly
/// discovered manifest tree against a persisted cache at `tree.cache_path`
/// — not merely replaying an already-`done` tree loaded wholesale. An
/// unchanged manifest overlays the cached node and skips the fetch; a
/// changed Git reference invalidates the cached node and forces a refetch.
#[test]
fn resolve_reconciles_against_a_persisted_cache_file() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_path = tmp.path().join("cache.toml");

    // First resolve: populates the cache file on disk.
    let root_dir_v1 = tmp.path().join("proj-v1");
    write_manifest(
        &root_dir_v1,
        "[package]\nname = \"root\"\n[dependencies]\nlibx = { git = \"https://x/x.git\", tag = \"v1.0.0\" }\n",
    );
    let git_initial = FakeGit::new("aaaa111");
    let downloader_initial = FakeDownloader::new("unused", json!({}));
    let mut tree = Tree::new(root_dir_v1.clone()).with_build_dir(tmp.path().join("build1"));
    tree.resolve(&git_initial, &downloader_initial).unwrap();
    assert_eq!(git_initial.checkouts.borrow().len(), 1);

    let cache_file = std::fs::File::create(&cache_path).unwrap();
    tree.dump_cache(cache_file).unwrap();

    // Scenario 3: same manifest content, a fresh Tree, reconciled against
    // the cache — the cached node overlays the freshly-declared one and no
    // refetch happens.
    let mut unchanged = Tree::new(root_dir_v1).with_build_dir(tmp.path().join("build2"));
    unchanged.cache_path = Some(cache_path.clone());
    let git_unchanged = FakeGit::new("should-not-be-used");
    let downloader_unchanged = FakeDownloader::new("unused", json!({}));
    unchanged.resolve(&git_unchanged, &downloader_unchanged).unwrap();

    assert_eq!(
        git_unchanged.checkouts.borrow().len(),
        0,
        "an unchanged cached Git node must not be refetched"
    );
    let idx = unchanged.find("libx").unwrap();
    assert!(unchanged.nodes[idx].done);
    assert!(unchanged.nodes[idx].cached);
    assert_eq!(unchanged.nodes[idx].revision.as_deref(), Some("aaaa111"));

    // Scenario 4: the manifest now requests a different Git reference —
    // the cached node is invalidated and the dependency is refetched.
    let root_dir_v2 = tmp.path().join("proj-v2");
    write_manifest(
        &root_dir_v2,
        "[package]\nname = \"root\"\n[dependencies]\nlibx = { git = \"https://x/x.git\", tag = \"v2.0.0\" }\n",
    );
    let mut changed = Tree::new(root_dir_v2).with_build_dir(tmp.path().join("build3"));
    changed.cache_path = Some(cache_path.clone());
    let git_changed = FakeGit::new("bbbb222");
    let downloader_changed = FakeDownloader::new("unused", json!({}));
    changed.resolve(&git_changed, &downloader_changed).unwrap();

    assert_eq!(
        git_changed.checkouts.borrow().len(),
        1,
        "a cached Git node whose reference changed must be refetched"
    );
    let idx = changed.find("libx").unwrap();
    assert!(changed.nodes[idx].done);
    assert_eq!(changed.nodes[idx].revision.as_deref(), Some("bbbb222"));
}

/// Invariant 5 (link order soundness): every dependency appears strictly
/// before every node that names it in `package_dep`, for a non-trivial
/// multi-level path tree.
#[test]
fn link_order_always_places_dependencies_before_dependents() {
    let tmp = tempfile::tempdir().unwrap();
    let root_dir = tmp.path();
    write_manifest(root_dir, "[package]\nname = \"root\"\n[dependencies]\na = \"./a\"\n");
    write_manifest(&root_dir.join("a"), "[package]\nname = \"a\"\n[dependencies]\nb = \"../b\"\n");
    write_manifest(&root_dir.join("b"), "[package]\nname = \"b\"\n[dependencies]\nc = \"../c\"\n");
    write_manifest(&root_dir.join("c"), "[package]\nname = \"c\"\n");

    let mut tree = Tree::new(root_dir);
    let git = FakeGit::new("rev");
    let downloader = FakeDownloader::new("unused", json!({}));
    tree.resolve(&git, &downloader).unwrap();
    tree.build_graph().unwrap();

    let order = tree.link_order(0).unwrap();
    let position: std::collections::HashMap<usize, usize> =
        order.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();

    for (idx, node) in tree.nodes.iter().enumerate() {
        for dep_name in &node.package_dep {
            let dep_idx = tree.find(dep_name).unwrap();
            assert!(
                position[&dep_idx] < position[&idx],
                "{dep_name} must link before {}",
                node.name
            );
        }
    }
}

/// Registry acquisition end-to-end: a cache-miss fetch downloads, unpacks,
/// and the resulting node carries the version the registry reported.
#[test]
fn registry_dependency_resolves_through_downloader() {
    let tmp = tempfile::tempdir().unwrap();
    let root_dir = tmp.path();
    let cache_dir = tmp.path().join("dl-cache");
    write_manifest(
        root_dir,
        "[package]\nname = \"root\"\n[dependencies]\npkg = { namespace = \"ns\", name = \"pkg\", version = \"1.2.0\" }\n",
    );

    let config_dir = tmp.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[registry]\nurl = \"https://reg.example.com\"\ncache_path = \"{}\"\n",
            cache_dir.to_string_lossy().replace('\\', "/")
        ),
    )
    .unwrap();

    let body = json!({
        "code": 200,
        "data": {
            "version_data": {
                "download_url": "https://reg.example.com/dl/pkg-1.2.0.zip",
                "version": "1.2.0",
            }
        }
    });
    let git = FakeGit::new("unused");
    let downloader = FakeDownloader::new("pkg", body);

    let mut tree = Tree::new(root_dir);
    tree.config_override = Some(config_path);
    tree.resolve(&git, &downloader).unwrap();

    let idx = tree.find("pkg").unwrap();
    let node = &tree.nodes[idx];
    assert!(node.done);
    assert_eq!(node.resolved_version, Some(semver::Version::parse("1.2.0").unwrap()));
    assert_eq!(downloader.calls.borrow().len(), 3);
}
