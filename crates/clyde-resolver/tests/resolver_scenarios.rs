//! End-to-end resolver scenarios against an in-memory registry.

use assert_matches::assert_matches;
use clyde_core::Version;
use clyde_events::{BuildEvent, HookBus, HookPoint};
use clyde_registry::{InMemoryRegistry, PackageStore};
use clyde_resolver::{Package, ResolveError, resolve, resolve_with_stats};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

/// Write a root application package requiring the given dependencies.
fn root_package(requires: &[(&str, &str)]) -> (TempDir, Package) {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = String::from("name: root\nversion: 0.1.0\ntype: application\n");
    if !requires.is_empty() {
        manifest.push_str("requires:\n");
        for (name, constraint) in requires {
            manifest.push_str(&format!("  {name}: '{constraint}'\n"));
        }
    }
    std::fs::write(dir.path().join("package.yml"), manifest).unwrap();
    let (package, _) = Package::load_local(dir.path()).unwrap();
    (dir, package)
}

fn library_yaml(name: &str, version: &str, requires: &[(&str, &str)]) -> String {
    let mut yaml = format!("name: {name}\nversion: {version}\ntype: library\n");
    if !requires.is_empty() {
        yaml.push_str("requires:\n");
        for (dep, constraint) in requires {
            yaml.push_str(&format!("  {dep}: '{constraint}'\n"));
        }
    }
    yaml
}

fn publish(registry: &InMemoryRegistry, name: &str, version: &str, requires: &[(&str, &str)]) {
    registry.publish(
        name,
        Version::parse(version).unwrap(),
        &[("package.yml", &library_yaml(name, version, requires))],
    );
}

fn store() -> (TempDir, PackageStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = PackageStore::open(dir.path().join("packages")).unwrap();
    (dir, store)
}

#[test]
fn single_package_application() {
    let (_root_dir, root) = root_package(&[]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();

    let graph = resolve(root, &registry, &store, &HookBus::new()).unwrap();
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.root().name(), "root");
}

#[test]
fn diamond_selects_greatest_shared_version() {
    let (_root_dir, root) = root_package(&[("a", "^1.0.0"), ("b", "^1.0.0")]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();
    publish(&registry, "a", "1.0.0", &[("c", "^1.0.0")]);
    publish(&registry, "b", "1.0.0", &[("c", "^1.0.0")]);
    publish(&registry, "c", "1.0.0", &[]);
    publish(&registry, "c", "1.1.0", &[]);

    let graph = resolve(root, &registry, &store, &HookBus::new()).unwrap();

    // Four vertices (root, a, b, one c) and four edges.
    assert_eq!(graph.len(), 4);
    assert_eq!(graph.edge_count(), 4);
    let c = graph.get("c", &Version::new(1, 1, 0)).expect("c@1.1.0 chosen");
    assert_eq!(graph.get("c", &Version::new(1, 0, 0)), None);
    assert_eq!(graph.dependents(c).len(), 2);
}

#[test]
fn conflict_reports_both_origins() {
    let (_root_dir, root) = root_package(&[("a", "^1.0.0"), ("b", "^1.0.0")]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();
    publish(&registry, "a", "1.0.0", &[("x", "=1.0.0")]);
    publish(&registry, "b", "1.0.0", &[("x", "=2.0.0")]);
    publish(&registry, "x", "1.0.0", &[]);
    publish(&registry, "x", "2.0.0", &[]);

    let err = resolve(root, &registry, &store, &HookBus::new()).unwrap_err();
    assert_matches!(&err, ResolveError::VersionConflict { name, .. } if name == "x");
    let origins = err.origins();
    assert!(origins.contains(&"a"));
    assert!(origins.contains(&"b"));
    assert_eq!(err.code().exit_code(), 4);
}

#[test]
fn cycle_reports_requirement_path() {
    let (_root_dir, root) = root_package(&[("p", "^1.0.0")]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();
    publish(&registry, "p", "1.0.0", &[("q", "^1.0.0")]);
    publish(&registry, "q", "1.0.0", &[("p", "^1.0.0")]);

    let err = resolve(root, &registry, &store, &HookBus::new()).unwrap_err();
    assert_matches!(
        err,
        ResolveError::CircularDependency { path } if path == ["root", "p", "q", "p"]
    );
}

#[test]
fn no_compatible_version() {
    let (_root_dir, root) = root_package(&[("a", "^2.0.0")]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();
    publish(&registry, "a", "1.0.0", &[]);
    publish(&registry, "a", "1.5.0", &[]);

    let err = resolve(root, &registry, &store, &HookBus::new()).unwrap_err();
    assert_matches!(
        err,
        ResolveError::NoCompatibleVersion { name, candidates, .. }
            if name == "a" && candidates.len() == 2
    );
}

#[test]
fn pre_releases_not_selected_by_caret() {
    let (_root_dir, root) = root_package(&[("a", "^1.0.0")]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();
    publish(&registry, "a", "1.0.0", &[]);
    publish(&registry, "a", "1.1.0-rc.1", &[]);

    let graph = resolve(root, &registry, &store, &HookBus::new()).unwrap();
    assert!(graph.get("a", &Version::new(1, 0, 0)).is_some());
}

#[test]
fn git_ref_resolves_as_exact_tag() {
    let (_root_dir, root) = root_package(&[("a", "git:v1.2.0")]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();
    publish(&registry, "a", "1.2.0", &[]);

    let graph = resolve(root, &registry, &store, &HookBus::new()).unwrap();
    assert!(graph.get("a", &Version::new(1, 2, 0)).is_some());
}

#[test]
fn local_path_requirement_is_not_copied() {
    let dep_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dep_dir.path().join("package.yml"),
        library_yaml("locallib", "0.2.0", &[]),
    )
    .unwrap();

    let constraint = format!("local:{}", dep_dir.path().display());
    let (_root_dir, root) = root_package(&[("locallib", constraint.as_str())]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();

    let graph = resolve(root, &registry, &store, &HookBus::new()).unwrap();
    let id = graph.get("locallib", &Version::new(0, 2, 0)).unwrap();
    assert_eq!(graph.package(id).root, dep_dir.path());
}

#[test]
fn resolution_is_deterministic() {
    let build = || {
        let (_root_dir, root) = root_package(&[("a", "^1.0.0"), ("b", "^1.0.0")]);
        let (_store_dir, store) = store();
        let registry = InMemoryRegistry::new();
        publish(&registry, "a", "1.0.0", &[("c", ">=1.0.0")]);
        publish(&registry, "b", "1.0.0", &[("c", "<2.0.0")]);
        publish(&registry, "c", "1.0.0", &[]);
        publish(&registry, "c", "1.4.0", &[]);
        publish(&registry, "c", "2.1.0", &[]);
        let graph = resolve(root, &registry, &store, &HookBus::new()).unwrap();
        let mut vertices: Vec<String> = graph
            .packages()
            .map(|(_, p)| p.key().to_string())
            .collect();
        vertices.sort();
        (vertices, graph.edge_count())
    };

    assert_eq!(build(), build());
}

#[test]
fn emits_resolution_events_in_order() {
    let (_root_dir, root) = root_package(&[("a", "^1.0.0")]);
    let (_store_dir, store) = store();
    let registry = InMemoryRegistry::new();
    publish(&registry, "a", "1.0.0", &[]);

    let points = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&points);
    let mut bus = HookBus::new();
    bus.subscribe("recorder", move |event: &BuildEvent| {
        sink.lock().push(event.point());
    });

    let (graph, stats) = resolve_with_stats(root, &registry, &store, &bus).unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(stats.packages_fetched, 1);

    let points = points.lock();
    assert_eq!(points.first(), Some(&HookPoint::PreResolution));
    assert_eq!(points.last(), Some(&HookPoint::PostResolution));
    assert!(points.contains(&HookPoint::PackageDiscovered));
    assert!(points.contains(&HookPoint::PackageFetched));
    assert!(points.contains(&HookPoint::VersionSelected));
}
