//! End-to-end executor scenarios against the scripted fake driver.
//!
//! Every scenario resolves and plans a real on-disk project, then drives
//! the plan through the executor with an isolated cache.

use assert_matches::assert_matches;
use clyde_cache::Cache;
use clyde_core::{CompilerFamily, CompilerInfo};
use clyde_events::{BuildEvent, HookBus, HookPoint};
use clyde_executor::{BuildExecutor, ExecutorConfig, FailureKind};
use clyde_planner::{BuildPlan, plan};
use clyde_registry::{InMemoryRegistry, PackageStore};
use clyde_resolver::{DependencyGraph, Package, resolve};
use clyde_test_utils::{EventLog, FakeDriver, TempProject, app_manifest, lib_manifest};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn compiler() -> CompilerInfo {
    // Must match FakeDriver's probe so plan-time and run-time keys agree.
    CompilerInfo {
        name: "gcc".to_string(),
        version: "gcc (GCC) 13.2.0".to_string(),
        target: "x86_64-linux-gnu".to_string(),
        family: CompilerFamily::Gcc,
    }
}

/// Application `hello` depending on library `mathx` via a local path. The
/// library source deliberately does not include its own public header, so
/// a header edit invalidates only the application's object.
fn write_app_with_lib(project: &TempProject) {
    project
        .create_file("mathx/package.yml", &lib_manifest("mathx", "0.1.0", &[]))
        .unwrap();
    project
        .create_file("mathx/include/mathx/mathx.h", "int mathx_add(int, int);\n")
        .unwrap();
    project
        .create_file(
            "mathx/src/mathx.c",
            "int mathx_add(int a, int b) { return a + b; }\n",
        )
        .unwrap();

    project
        .create_file(
            "hello/package.yml",
            &app_manifest("hello", "0.1.0", &[("mathx", "local:../mathx")]),
        )
        .unwrap();
    project
        .create_file(
            "hello/src/main.c",
            "#include <mathx/mathx.h>\nint main(void) { return mathx_add(1, -1); }\n",
        )
        .unwrap();
}

fn resolve_and_plan(project: &TempProject, root: &str) -> (DependencyGraph, BuildPlan) {
    let (package, _) = Package::load_local(&project.package_dir(root)).unwrap();
    let store = PackageStore::open(project.path().join("store")).unwrap();
    let graph = resolve(package, &InMemoryRegistry::new(), &store, &HookBus::new()).unwrap();
    let plan = plan(&graph, &compiler(), &HookBus::new()).unwrap();
    (graph, plan)
}

fn executor(project: &TempProject, driver: &Arc<FakeDriver>) -> (BuildExecutor, Arc<Cache>) {
    let cache = Arc::new(Cache::open(project.path().join("clydepm")).unwrap());
    let executor = BuildExecutor::new(
        Arc::clone(driver) as Arc<dyn clyde_toolchain::ToolchainDriver>,
        Arc::clone(&cache),
    );
    (executor, cache)
}

#[tokio::test]
async fn single_package_application() {
    let project = TempProject::new().unwrap();
    project
        .create_file("hello/package.yml", &app_manifest("hello", "0.1.0", &[]))
        .unwrap();
    project
        .create_file("hello/src/main.c", "int main(void) { return 0; }\n")
        .unwrap();

    let (graph, plan) = resolve_and_plan(&project, "hello");
    assert_eq!(graph.len(), 1);
    assert_eq!(plan.compile_steps.len(), 1);
    assert_eq!(plan.link_steps.len(), 1);

    let driver = Arc::new(FakeDriver::new());
    let (executor, _cache) = executor(&project, &driver);

    let log = EventLog::new();
    let mut bus = HookBus::new();
    log.attach(&mut bus);

    let report = executor
        .execute(&plan, &graph, &bus, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(report.exit_code(), 0);
    assert!(project.file_exists("hello/.build/hello"));
    assert_eq!(driver.compile_count(), 1);
    assert_eq!(driver.link_count(), 1);

    let post_build = log.at(HookPoint::PostBuild);
    assert_matches!(
        &post_build[..],
        [BuildEvent::PostBuild { summary }] if summary.success
    );
}

#[tokio::test]
async fn warm_second_build_hits_both_tiers() {
    let project = TempProject::new().unwrap();
    write_app_with_lib(&project);

    let (graph, plan) = resolve_and_plan(&project, "hello");
    let driver = Arc::new(FakeDriver::new());
    let (executor, cache) = executor(&project, &driver);
    let bus = HookBus::new();
    let cancel = CancellationToken::new();

    let first = executor.execute(&plan, &graph, &bus, &cancel).await.unwrap();
    assert!(first.success());
    let cold_compiles = driver.compile_count();
    let cold_links = driver.link_count();
    assert_eq!((cold_compiles, cold_links), (2, 2));
    let first_artifact = project.read_file("hello/.build/hello").unwrap();

    // Warm build: zero toolchain invocations, byte-identical artifact.
    let second = executor.execute(&plan, &graph, &bus, &cancel).await.unwrap();
    assert!(second.success());
    assert_eq!(driver.compile_count(), cold_compiles);
    assert_eq!(driver.link_count(), cold_links);
    assert_eq!(second.summary.object_cache_hits, 2);
    assert_eq!(second.summary.artifact_cache_hits, 2);
    assert_eq!(
        project.read_file("hello/.build/hello").unwrap(),
        first_artifact
    );

    let stats = cache.stats();
    assert_eq!(stats.object_hits, 2);
    assert_eq!(stats.artifact_hits, 2);
}

#[tokio::test]
async fn header_edit_recompiles_only_includers() {
    let project = TempProject::new().unwrap();
    write_app_with_lib(&project);

    let (graph, plan) = resolve_and_plan(&project, "hello");
    let driver = Arc::new(FakeDriver::new());
    let (executor, _cache) = executor(&project, &driver);
    let bus = HookBus::new();
    let cancel = CancellationToken::new();

    let first = executor.execute(&plan, &graph, &bus, &cancel).await.unwrap();
    assert!(first.success());
    let cold_compiles = driver.compile_count();

    // Perturb one byte of the library's public header. Only the application
    // source includes it, so exactly one recompile must occur; the library's
    // object and artifact stay cached.
    project
        .create_file("mathx/include/mathx/mathx.h", "int mathx_add(int, int);;\n")
        .unwrap();

    let third = executor.execute(&plan, &graph, &bus, &cancel).await.unwrap();
    assert!(third.success());
    assert_eq!(driver.compile_count(), cold_compiles + 1);
    // The library's object was a cache hit, and its artifact key is
    // unchanged, so its archive is restored rather than re-linked.
    assert_eq!(third.summary.object_cache_hits, 1);
    assert_eq!(third.summary.artifact_cache_hits, 1);
}

#[tokio::test]
async fn compile_failure_skips_dependents() {
    let project = TempProject::new().unwrap();
    write_app_with_lib(&project);

    let (graph, plan) = resolve_and_plan(&project, "hello");
    let driver = Arc::new(FakeDriver::new());
    driver.fail_compile("mathx.c");
    let (executor, _cache) = executor(&project, &driver);

    let log = EventLog::new();
    let mut bus = HookBus::new();
    log.attach(&mut bus);

    let report = executor
        .execute(&plan, &graph, &bus, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(report.exit_code(), 3);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.kind, FailureKind::Compile);
    assert_eq!(failure.package.name, "mathx");
    assert!(!failure.diagnostics.is_empty());

    // The application never starts: its compile and link are skipped, as is
    // the library's link.
    assert_eq!(report.summary.skipped_steps.len(), 3);
    assert_eq!(driver.link_count(), 0);

    let post_build = log.at(HookPoint::PostBuild);
    assert_matches!(
        &post_build[..],
        [BuildEvent::PostBuild { summary }]
            if !summary.success && summary.failed_steps.len() == 1
    );
}

#[tokio::test]
async fn link_failure_skips_dependents_only() {
    let project = TempProject::new().unwrap();
    // Application depending on two independent libraries.
    for lib in ["liba", "libb"] {
        project
            .create_file(
                &format!("{lib}/package.yml"),
                &lib_manifest(lib, "0.1.0", &[]),
            )
            .unwrap();
        project
            .create_file(
                &format!("{lib}/include/{lib}/{lib}.h"),
                &format!("int {lib}_f(void);\n"),
            )
            .unwrap();
        project
            .create_file(
                &format!("{lib}/src/{lib}.c"),
                &format!("int {lib}_f(void) {{ return 0; }}\n"),
            )
            .unwrap();
    }
    project
        .create_file(
            "app/package.yml",
            &app_manifest(
                "app",
                "0.1.0",
                &[("liba", "local:../liba"), ("libb", "local:../libb")],
            ),
        )
        .unwrap();
    project
        .create_file("app/src/main.c", "int main(void) { return 0; }\n")
        .unwrap();

    let (graph, plan) = resolve_and_plan(&project, "app");
    let driver = Arc::new(FakeDriver::new());
    driver.fail_link("liba");
    let (executor, _cache) = executor(&project, &driver);

    let report = executor
        .execute(&plan, &graph, &HookBus::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::Link);
    assert!(report.failures[0].output.contains("undefined reference"));

    // libb still built and linked; only the application was skipped.
    assert!(report.artifact_of("libb").is_some());
    assert!(report.artifact_of("app").is_none());
    assert!(project.file_exists("app/.build/deps/libb/liblibb.a"));
}

#[tokio::test]
async fn cancellation_starts_nothing_new() {
    let project = TempProject::new().unwrap();
    write_app_with_lib(&project);

    let (graph, plan) = resolve_and_plan(&project, "hello");
    let driver = Arc::new(FakeDriver::new());
    let (executor, _cache) = executor(&project, &driver);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = executor
        .execute(&plan, &graph, &HookBus::new(), &cancel)
        .await
        .unwrap();

    assert!(!report.success());
    assert!(report.summary.cancelled);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(driver.compile_count(), 0);
    assert_eq!(report.summary.skipped_steps.len(), plan.step_count());
}

#[tokio::test]
async fn step_timeout_terminates_and_reports() {
    let project = TempProject::new().unwrap();
    write_app_with_lib(&project);

    let (graph, plan) = resolve_and_plan(&project, "hello");
    let driver = Arc::new(FakeDriver::new());
    driver.set_delay(std::time::Duration::from_millis(200));
    let cache = Arc::new(Cache::open(project.path().join("clydepm")).unwrap());
    let executor = BuildExecutor::with_config(
        Arc::clone(&driver) as Arc<dyn clyde_toolchain::ToolchainDriver>,
        cache,
        ExecutorConfig {
            step_timeout: Some(std::time::Duration::from_millis(10)),
            ..ExecutorConfig::default()
        },
    );

    let report = executor
        .execute(&plan, &graph, &HookBus::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.success());
    assert!(
        report
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::Timeout)
    );
}

#[tokio::test]
async fn events_pair_and_order_correctly() {
    let project = TempProject::new().unwrap();
    write_app_with_lib(&project);

    let (graph, plan) = resolve_and_plan(&project, "hello");
    let driver = Arc::new(FakeDriver::new());
    let (executor, _cache) = executor(&project, &driver);

    let log = EventLog::new();
    let mut bus = HookBus::new();
    log.attach(&mut bus);

    executor
        .execute(&plan, &graph, &bus, &CancellationToken::new())
        .await
        .unwrap();

    let events = log.events();
    let points = log.points();
    assert_eq!(points.first(), Some(&HookPoint::PreBuild));
    assert_eq!(points.last(), Some(&HookPoint::PostBuild));

    // Every Post comes after its Pre for the same step id.
    for (i, event) in events.iter().enumerate() {
        if matches!(
            event.point(),
            HookPoint::PostCompile | HookPoint::PostLink
        ) {
            let step = event.step().unwrap();
            let pre = events[..i].iter().any(|e| {
                e.step() == Some(step)
                    && matches!(e.point(), HookPoint::PreCompile | HookPoint::PreLink)
            });
            assert!(pre, "missing Pre event before {event:?}");
        }
    }

    // The library's link events come after all its compile events.
    let lib_id = graph.dependencies(graph.root_id())[0];
    let lib_name = graph.package(lib_id).manifest.name.clone();
    let lib_link_pos = events
        .iter()
        .position(|e| {
            matches!(e, BuildEvent::PreLink { package, .. } if *package == lib_name)
        })
        .unwrap();
    for (i, event) in events.iter().enumerate() {
        if let BuildEvent::PostCompile { package, .. } = event
            && *package == lib_name
        {
            assert!(i < lib_link_pos);
        }
    }
}

#[tokio::test]
async fn registry_dependency_builds_end_to_end() {
    // Full pipeline: the dependency is fetched from a registry, materialized
    // into the package store, planned, and linked into the application.
    let project = TempProject::new().unwrap();
    project
        .create_file(
            "hello/package.yml",
            &app_manifest("hello", "0.1.0", &[("zmath", "^1.0.0")]),
        )
        .unwrap();
    project
        .create_file(
            "hello/src/main.c",
            "#include <zmath/zmath.h>\nint main(void) { return zmath_zero(); }\n",
        )
        .unwrap();

    let registry = InMemoryRegistry::new();
    registry.publish(
        "zmath",
        clyde_core::Version::new(1, 2, 0),
        &[
            ("package.yml", &lib_manifest("zmath", "1.2.0", &[])),
            ("include/zmath/zmath.h", "int zmath_zero(void);\n"),
            ("src/zmath.c", "int zmath_zero(void) { return 0; }\n"),
        ],
    );

    let (package, _) = Package::load_local(&project.package_dir("hello")).unwrap();
    let store = PackageStore::open(project.path().join("clydepm/packages")).unwrap();
    let graph = resolve(package, &registry, &store, &HookBus::new()).unwrap();
    assert_eq!(graph.len(), 2);

    let plan = plan(&graph, &compiler(), &HookBus::new()).unwrap();
    let driver = Arc::new(FakeDriver::new());
    let (executor, _cache) = executor(&project, &driver);

    let report = executor
        .execute(&plan, &graph, &HookBus::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.success());
    assert!(project.file_exists("hello/.build/hello"));
    assert!(project.file_exists("hello/.build/deps/zmath/libzmath.a"));

    let artifact = report.artifact_of("zmath").unwrap();
    assert_eq!(artifact.include_dirs.len(), 1);
}

#[tokio::test]
async fn concurrent_builds_share_cache_without_corruption() {
    // Two identical projects, one shared cache: concurrent puts race only
    // through atomic renames, both builds succeed, and the artifacts are
    // byte-identical.
    let first = TempProject::new().unwrap();
    let second = TempProject::new().unwrap();
    write_app_with_lib(&first);
    write_app_with_lib(&second);

    let (graph_a, plan_a) = resolve_and_plan(&first, "hello");
    let (graph_b, plan_b) = resolve_and_plan(&second, "hello");

    let cache_dir = TempProject::new().unwrap();
    let cache = Arc::new(Cache::open(cache_dir.path().join("clydepm")).unwrap());
    let driver_a = Arc::new(FakeDriver::new());
    let driver_b = Arc::new(FakeDriver::new());
    let exec_a = BuildExecutor::new(
        Arc::clone(&driver_a) as Arc<dyn clyde_toolchain::ToolchainDriver>,
        Arc::clone(&cache),
    );
    let exec_b = BuildExecutor::new(
        Arc::clone(&driver_b) as Arc<dyn clyde_toolchain::ToolchainDriver>,
        Arc::clone(&cache),
    );

    let bus_a = HookBus::new();
    let bus_b = HookBus::new();
    let cancel = CancellationToken::new();
    let (report_a, report_b) = tokio::join!(
        exec_a.execute(&plan_a, &graph_a, &bus_a, &cancel),
        exec_b.execute(&plan_b, &graph_b, &bus_b, &cancel),
    );

    let report_a = report_a.unwrap();
    let report_b = report_b.unwrap();
    assert!(report_a.success());
    assert!(report_b.success());

    let bytes_a = first.read_file("hello/.build/hello").unwrap();
    let bytes_b = second.read_file("hello/.build/hello").unwrap();
    assert_eq!(bytes_a, bytes_b);
}
