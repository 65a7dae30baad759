//! Planner scenarios over resolved local-path graphs.

use assert_matches::assert_matches;
use clyde_core::{CompilerFamily, CompilerInfo};
use clyde_events::HookBus;
use clyde_planner::{PlanError, plan};
use clyde_registry::{InMemoryRegistry, PackageStore};
use clyde_resolver::{DependencyGraph, Package, resolve};
use std::path::Path;
use tempfile::TempDir;

fn compiler() -> CompilerInfo {
    CompilerInfo {
        name: "gcc".to_string(),
        version: "13.2.0".to_string(),
        target: "x86_64-linux-gnu".to_string(),
        family: CompilerFamily::Gcc,
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// Root application `hello` depending on library `mathx` via a local path.
fn app_with_library() -> (TempDir, DependencyGraph) {
    let workspace = tempfile::tempdir().unwrap();

    let lib = workspace.path().join("mathx");
    write(
        &lib.join("package.yml"),
        "name: mathx\nversion: 0.1.0\ntype: library\nlanguage: c\ncflags:\n  gcc: -O2\nldflags:\n  gcc: -lm\n",
    );
    write(&lib.join("include/mathx/mathx.h"), "int mathx_add(int, int);\n");
    write(
        &lib.join("src/mathx.c"),
        "#include <mathx/mathx.h>\nint mathx_add(int a, int b) { return a + b; }\n",
    );

    let app = workspace.path().join("hello");
    write(
        &app.join("package.yml"),
        "name: hello\nversion: 0.1.0\ntype: application\nlanguage: c\nrequires:\n  mathx: 'local:../mathx'\n",
    );
    write(
        &app.join("src/main.c"),
        "#include <mathx/mathx.h>\nint main(void) { return mathx_add(1, -1); }\n",
    );

    let (root, _) = Package::load_local(&app).unwrap();
    let store_dir = workspace.path().join("store");
    let store = PackageStore::open(store_dir).unwrap();
    let graph = resolve(root, &InMemoryRegistry::new(), &store, &HookBus::new()).unwrap();
    (workspace, graph)
}

#[test]
fn plans_application_with_library() {
    let (_workspace, graph) = app_with_library();
    let plan = plan(&graph, &compiler(), &HookBus::new()).unwrap();

    assert_eq!(plan.compile_steps.len(), 2);
    assert_eq!(plan.link_steps.len(), 2);
    assert!(plan.warnings.is_empty());

    let app_id = graph.root_id();
    let lib_id = graph.dependencies(app_id)[0];

    // Topological correctness: the library's link precedes every compile
    // step of the application (ids encode the serial plan order).
    let lib_link = plan.link_step_for(lib_id).unwrap();
    for step in plan.compile_steps_for(app_id) {
        assert!(lib_link.id < step.id);
    }

    // Every compile step of a package precedes its link step.
    for link in &plan.link_steps {
        for step in plan.compile_steps_for(link.package_id) {
            assert!(step.id < link.id);
        }
    }
}

#[test]
fn layout_mirrors_dependencies() {
    let (_workspace, graph) = app_with_library();
    let plan = plan(&graph, &compiler(), &HookBus::new()).unwrap();

    let app_id = graph.root_id();
    let lib_id = graph.dependencies(app_id)[0];

    let app_link = plan.link_step_for(app_id).unwrap();
    assert!(app_link.artifact.ends_with(".build/hello"));

    let lib_link = plan.link_step_for(lib_id).unwrap();
    assert!(lib_link.artifact.ends_with(".build/deps/mathx/libmathx.a"));

    let app_compile = &plan.compile_steps_for(app_id)[0];
    assert!(app_compile.object.ends_with(".build/obj/src/main.o"));
    assert!(app_compile.depfile.ends_with(".build/obj/src/main.d"));
}

#[test]
fn include_order_prefers_own_then_dependencies() {
    let (_workspace, graph) = app_with_library();
    let plan = plan(&graph, &compiler(), &HookBus::new()).unwrap();

    let lib_id = graph.dependencies(graph.root_id())[0];
    let lib_root = graph.package(lib_id).root.clone();

    let app_step = &plan.compile_steps_for(graph.root_id())[0];
    // The application has no include dirs of its own; the library's public
    // include directory is the only entry.
    assert_eq!(app_step.include_dirs, vec![lib_root.join("include")]);

    let lib_step = &plan.compile_steps_for(lib_id)[0];
    assert_eq!(lib_step.include_dirs, vec![lib_root.join("include")]);
}

#[test]
fn flags_concatenate_defaults_manifest_variants() {
    let (_workspace, graph) = app_with_library();
    let plan = plan(&graph, &compiler(), &HookBus::new()).unwrap();

    let lib_id = graph.dependencies(graph.root_id())[0];
    let lib_step = &plan.compile_steps_for(lib_id)[0];
    assert_eq!(lib_step.flags, vec!["-Wall", "-O2"]);

    // The application links the library's archive and inherits its ldflags.
    let app_link = plan.link_step_for(graph.root_id()).unwrap();
    assert_eq!(app_link.dep_archives.len(), 1);
    assert!(app_link.link_flags.contains(&"-lm".to_string()));
}

#[test]
fn application_steps_carry_conservative_keys() {
    let (workspace, graph) = app_with_library();
    let first = plan(&graph, &compiler(), &HookBus::new()).unwrap();
    let second = plan(&graph, &compiler(), &HookBus::new()).unwrap();

    // Identical inputs, identical keys.
    assert_eq!(
        first.compile_steps[0].conservative_key,
        second.compile_steps[0].conservative_key
    );

    // Perturbing a public header changes the application's key.
    let header = workspace.path().join("mathx/include/mathx/mathx.h");
    std::fs::write(&header, "int mathx_add(int, int); /* v2 */\n").unwrap();
    let third = plan(&graph, &compiler(), &HookBus::new()).unwrap();
    let app_id = graph.root_id();
    assert_ne!(
        first.compile_steps_for(app_id)[0].conservative_key,
        third.compile_steps_for(app_id)[0].conservative_key
    );
}

#[test]
fn empty_sources_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("app/package.yml"),
        "name: app\nversion: 0.1.0\ntype: application\n",
    );
    std::fs::create_dir_all(dir.path().join("app/src")).unwrap();
    let (root, _) = Package::load_local(&dir.path().join("app")).unwrap();
    let store = PackageStore::open(dir.path().join("store")).unwrap();
    let graph = resolve(root, &InMemoryRegistry::new(), &store, &HookBus::new()).unwrap();

    assert_matches!(
        plan(&graph, &compiler(), &HookBus::new()),
        Err(PlanError::EmptySources { package, .. }) if package == "app"
    );
}

#[test]
fn library_without_include_dir_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("bare");
    write(
        &lib.join("package.yml"),
        "name: bare\nversion: 0.1.0\ntype: library\nlanguage: c\n",
    );
    write(&lib.join("src/bare.c"), "int bare(void) { return 0; }\n");
    let (root, _) = Package::load_local(&lib).unwrap();
    let store = PackageStore::open(dir.path().join("store")).unwrap();
    let graph = resolve(root, &InMemoryRegistry::new(), &store, &HookBus::new()).unwrap();

    assert_matches!(
        plan(&graph, &compiler(), &HookBus::new()),
        Err(PlanError::MissingIncludeDirectory { package, .. }) if package == "bare"
    );
}

#[test]
fn unsupported_family_is_fatal() {
    let (_workspace, graph) = app_with_library();
    let odd = CompilerInfo {
        name: "tcc".to_string(),
        version: "0.9.27".to_string(),
        target: "x86_64-linux-gnu".to_string(),
        family: CompilerFamily::Other,
    };
    assert_matches!(
        plan(&graph, &odd, &HookBus::new()),
        Err(PlanError::UnsupportedCompilerFamily { .. })
    );
}

#[test]
fn unnamespaced_public_headers_warn() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("loose");
    write(
        &lib.join("package.yml"),
        "name: loose\nversion: 0.1.0\ntype: library\nlanguage: c\n",
    );
    write(&lib.join("include/loose.h"), "int loose(void);\n");
    write(&lib.join("src/loose.c"), "int loose(void) { return 0; }\n");
    let (root, _) = Package::load_local(&lib).unwrap();
    let store = PackageStore::open(dir.path().join("store")).unwrap();
    let graph = resolve(root, &InMemoryRegistry::new(), &store, &HookBus::new()).unwrap();

    let plan = plan(&graph, &compiler(), &HookBus::new()).unwrap();
    assert_eq!(plan.warnings.len(), 1);
    assert!(plan.warnings[0].message.contains("include/loose/"));
}
