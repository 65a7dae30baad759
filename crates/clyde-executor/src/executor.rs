//! The scheduler and worker pool.
//!
//! Scheduling decisions happen on a single task; workers only block on
//! child processes and cache I/O. The ready queue feeds a pool of at most
//! `parallelism` in-flight steps. Cancellation is cooperative: in-flight
//! compiler invocations finish (killing a compiler mid-run leaves partial
//! objects that would taint future cache queries), and nothing new starts.

use crate::keys::{accurate_object_key, object_lookup_key};
use crate::report::{BuildArtifact, BuildError, BuildReport, FailureKind, StepFailure};
use clyde_cache::{
    ArtifactBundle, ArtifactKeyInputs, Cache, CacheKey, ToolIdentity, artifact_key,
};
use clyde_events::{BuildEvent, BuildSummary, HookBus, StepOutcome};
use clyde_manifest::Manifest;
use clyde_planner::{BuildPlan, CompileStep, LinkStep};
use clyde_resolver::{DependencyGraph, PackageId};
use clyde_toolchain::{CompileResult, LinkResult, ToolchainDriver, ToolchainError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Worker pool size; defaults to hardware concurrency.
    pub parallelism: usize,
    /// Stop scheduling new steps after the first failure.
    pub fail_fast: bool,
    /// Per-step wall-clock limit; elapsing it terminates the child process.
    pub step_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get().max(1),
            fail_fast: false,
            step_timeout: None,
        }
    }
}

/// Drives a build plan to completion.
pub struct BuildExecutor {
    driver: Arc<dyn ToolchainDriver>,
    cache: Arc<Cache>,
    config: ExecutorConfig,
}

impl fmt::Debug for BuildExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ready {
    Compile(usize),
    Link(usize),
}

struct PackageState {
    deps_remaining: usize,
    compiles_remaining: usize,
    object_keys: Vec<CacheKey>,
    failed: bool,
    skipped: bool,
    artifact_key: Option<CacheKey>,
}

enum CompileOutcome {
    Hit { key: CacheKey },
    Built { key: CacheKey, result: CompileResult },
    Failed { result: CompileResult },
    TimedOut,
    Fatal(ToolchainError),
}

enum LinkOutcome {
    Hit { key: CacheKey },
    Built { key: CacheKey, result: LinkResult },
    Failed { result: LinkResult },
    TimedOut,
    Fatal(ToolchainError),
}

enum TaskDone {
    Compile(usize, CompileOutcome),
    Link(usize, LinkOutcome),
}

impl BuildExecutor {
    /// Create an executor with default configuration.
    #[must_use]
    pub fn new(driver: Arc<dyn ToolchainDriver>, cache: Arc<Cache>) -> Self {
        Self::with_config(driver, cache, ExecutorConfig::default())
    }

    /// Create an executor with explicit configuration.
    #[must_use]
    pub fn with_config(
        driver: Arc<dyn ToolchainDriver>,
        cache: Arc<Cache>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            driver,
            cache,
            config,
        }
    }

    /// Execute the plan, returning a report. Step failures are recorded in
    /// the report; only an unusable toolchain or a critical hook failure is
    /// an `Err`.
    ///
    /// # Errors
    /// See [`BuildError`].
    pub async fn execute(
        &self,
        plan: &BuildPlan,
        graph: &DependencyGraph,
        bus: &HookBus,
        cancel: &CancellationToken,
    ) -> Result<BuildReport, BuildError> {
        let started = Instant::now();

        // A toolchain probe failure is fatal.
        let compiler = self.driver.probe().await?;
        let identity = ToolIdentity::from(&compiler);

        bus.emit(&BuildEvent::PreBuild {
            compile_steps: plan.compile_steps.len(),
            link_steps: plan.link_steps.len(),
            parallelism: self.config.parallelism,
        })?;

        let mut compile_indices: HashMap<PackageId, Vec<usize>> = HashMap::new();
        for (i, step) in plan.compile_steps.iter().enumerate() {
            compile_indices.entry(step.package_id).or_default().push(i);
        }
        let link_indices: HashMap<PackageId, usize> = plan
            .link_steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.package_id, i))
            .collect();

        let mut states: HashMap<PackageId, PackageState> = graph
            .packages()
            .map(|(id, _)| {
                (
                    id,
                    PackageState {
                        deps_remaining: graph.dependencies(id).len(),
                        compiles_remaining: compile_indices.get(&id).map_or(0, Vec::len),
                        object_keys: Vec::new(),
                        failed: false,
                        skipped: false,
                        artifact_key: None,
                    },
                )
            })
            .collect();

        let mut ready: VecDeque<Ready> = VecDeque::new();
        for &id in &plan.package_order {
            if states[&id].deps_remaining == 0
                && let Some(indices) = compile_indices.get(&id)
            {
                for &index in indices {
                    ready.push_back(Ready::Compile(index));
                }
            }
        }

        let mut inflight: JoinSet<TaskDone> = JoinSet::new();
        let mut executed: HashSet<clyde_events::StepId> = HashSet::new();
        let mut summary = BuildSummary::default();
        let mut failures: Vec<StepFailure> = Vec::new();
        let mut artifacts: Vec<BuildArtifact> = Vec::new();
        let mut draining = false;
        let mut cancelled = cancel.is_cancelled();

        loop {
            if !draining && !cancelled {
                while inflight.len() < self.config.parallelism {
                    let Some(entry) = ready.pop_front() else { break };
                    match entry {
                        Ready::Compile(index) => {
                            let step = plan.compile_steps[index].clone();
                            bus.emit(&BuildEvent::PreCompile {
                                step: step.id,
                                package: step.package.name.clone(),
                                source: step.source.clone(),
                            })?;
                            let driver = Arc::clone(&self.driver);
                            let cache = Arc::clone(&self.cache);
                            let identity = identity.clone();
                            let timeout = self.config.step_timeout;
                            inflight.spawn(async move {
                                TaskDone::Compile(
                                    index,
                                    run_compile(driver, cache, identity, step, timeout).await,
                                )
                            });
                        }
                        Ready::Link(index) => {
                            let step = plan.link_steps[index].clone();
                            bus.emit(&BuildEvent::PreLink {
                                step: step.id,
                                package: step.package.name.clone(),
                            })?;
                            let manifest = graph.package(step.package_id).manifest.clone();
                            let object_keys = states[&step.package_id].object_keys.clone();
                            let dep_keys: Vec<CacheKey> = graph
                                .dependencies(step.package_id)
                                .into_iter()
                                .filter_map(|dep| states[&dep].artifact_key)
                                .collect();
                            let driver = Arc::clone(&self.driver);
                            let cache = Arc::clone(&self.cache);
                            let identity = identity.clone();
                            let timeout = self.config.step_timeout;
                            inflight.spawn(async move {
                                TaskDone::Link(
                                    index,
                                    run_link(
                                        driver, cache, identity, step, manifest, object_keys,
                                        dep_keys, timeout,
                                    )
                                    .await,
                                )
                            });
                        }
                    }
                }
            }

            if inflight.is_empty() {
                break;
            }

            tokio::select! {
                () = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    info!("cancellation requested; draining in-flight steps");
                }
                Some(joined) = inflight.join_next() => {
                    let done = joined.expect("worker task panicked");
                    match done {
                        TaskDone::Compile(index, outcome) => {
                            let step = &plan.compile_steps[index];
                            executed.insert(step.id);
                            summary.compile_steps_run += 1;
                            match outcome {
                                CompileOutcome::Hit { key } => {
                                    summary.object_cache_hits += 1;
                                    bus.emit(&BuildEvent::PostCompile {
                                        step: step.id,
                                        package: step.package.name.clone(),
                                        outcome: StepOutcome {
                                            success: true,
                                            cache_hit: true,
                                            duration: Duration::ZERO,
                                        },
                                        diagnostics: Vec::new(),
                                    })?;
                                    complete_compile(
                                        &mut states, &mut ready, &link_indices, step, key,
                                    );
                                }
                                CompileOutcome::Built { key, result } => {
                                    bus.emit(&BuildEvent::PostCompile {
                                        step: step.id,
                                        package: step.package.name.clone(),
                                        outcome: StepOutcome {
                                            success: true,
                                            cache_hit: false,
                                            duration: result.duration,
                                        },
                                        diagnostics: result.diagnostics,
                                    })?;
                                    complete_compile(
                                        &mut states, &mut ready, &link_indices, step, key,
                                    );
                                }
                                CompileOutcome::Failed { result } => {
                                    bus.emit(&BuildEvent::PostCompile {
                                        step: step.id,
                                        package: step.package.name.clone(),
                                        outcome: StepOutcome {
                                            success: false,
                                            cache_hit: false,
                                            duration: result.duration,
                                        },
                                        diagnostics: result.diagnostics.clone(),
                                    })?;
                                    failures.push(StepFailure {
                                        step: step.id,
                                        package: step.package.clone(),
                                        kind: FailureKind::Compile,
                                        diagnostics: result.diagnostics,
                                        output: String::new(),
                                    });
                                    mark_failed(&mut states, &mut ready, graph, plan, step.package_id);
                                    draining |= self.config.fail_fast;
                                }
                                CompileOutcome::TimedOut => {
                                    bus.emit(&BuildEvent::PostCompile {
                                        step: step.id,
                                        package: step.package.name.clone(),
                                        outcome: StepOutcome {
                                            success: false,
                                            cache_hit: false,
                                            duration: self.config.step_timeout.unwrap_or_default(),
                                        },
                                        diagnostics: Vec::new(),
                                    })?;
                                    failures.push(StepFailure {
                                        step: step.id,
                                        package: step.package.clone(),
                                        kind: FailureKind::Timeout,
                                        diagnostics: Vec::new(),
                                        output: String::new(),
                                    });
                                    mark_failed(&mut states, &mut ready, graph, plan, step.package_id);
                                    draining |= self.config.fail_fast;
                                }
                                CompileOutcome::Fatal(error) => return Err(error.into()),
                            }
                        }
                        TaskDone::Link(index, outcome) => {
                            let step = &plan.link_steps[index];
                            executed.insert(step.id);
                            summary.link_steps_run += 1;
                            match outcome {
                                LinkOutcome::Hit { key } => {
                                    summary.artifact_cache_hits += 1;
                                    bus.emit(&BuildEvent::PostLink {
                                        step: step.id,
                                        package: step.package.name.clone(),
                                        outcome: StepOutcome {
                                            success: true,
                                            cache_hit: true,
                                            duration: Duration::ZERO,
                                        },
                                    })?;
                                    complete_link(
                                        &mut states,
                                        &mut ready,
                                        &compile_indices,
                                        graph,
                                        step,
                                        key,
                                        &mut artifacts,
                                    );
                                }
                                LinkOutcome::Built { key, result } => {
                                    bus.emit(&BuildEvent::PostLink {
                                        step: step.id,
                                        package: step.package.name.clone(),
                                        outcome: StepOutcome {
                                            success: true,
                                            cache_hit: false,
                                            duration: result.duration,
                                        },
                                    })?;
                                    complete_link(
                                        &mut states,
                                        &mut ready,
                                        &compile_indices,
                                        graph,
                                        step,
                                        key,
                                        &mut artifacts,
                                    );
                                }
                                LinkOutcome::Failed { result } => {
                                    bus.emit(&BuildEvent::PostLink {
                                        step: step.id,
                                        package: step.package.name.clone(),
                                        outcome: StepOutcome {
                                            success: false,
                                            cache_hit: false,
                                            duration: result.duration,
                                        },
                                    })?;
                                    failures.push(StepFailure {
                                        step: step.id,
                                        package: step.package.clone(),
                                        kind: FailureKind::Link,
                                        diagnostics: Vec::new(),
                                        output: result.output,
                                    });
                                    mark_failed(&mut states, &mut ready, graph, plan, step.package_id);
                                    draining |= self.config.fail_fast;
                                }
                                LinkOutcome::TimedOut => {
                                    bus.emit(&BuildEvent::PostLink {
                                        step: step.id,
                                        package: step.package.name.clone(),
                                        outcome: StepOutcome {
                                            success: false,
                                            cache_hit: false,
                                            duration: self.config.step_timeout.unwrap_or_default(),
                                        },
                                    })?;
                                    failures.push(StepFailure {
                                        step: step.id,
                                        package: step.package.clone(),
                                        kind: FailureKind::Timeout,
                                        diagnostics: Vec::new(),
                                        output: String::new(),
                                    });
                                    mark_failed(&mut states, &mut ready, graph, plan, step.package_id);
                                    draining |= self.config.fail_fast;
                                }
                                LinkOutcome::Fatal(error) => return Err(error.into()),
                            }
                        }
                    }
                }
            }
        }

        let mut skipped: Vec<_> = plan
            .compile_steps
            .iter()
            .map(|s| s.id)
            .chain(plan.link_steps.iter().map(|s| s.id))
            .filter(|id| !executed.contains(id))
            .collect();
        skipped.sort();

        summary.failed_steps = failures.iter().map(|f| f.step).collect();
        summary.skipped_steps = skipped;
        summary.cancelled = cancelled;
        summary.duration = started.elapsed();
        summary.success =
            !cancelled && failures.is_empty() && summary.skipped_steps.is_empty();

        bus.emit(&BuildEvent::PostBuild {
            summary: summary.clone(),
        })?;
        info!(
            success = summary.success,
            compile_steps = summary.compile_steps_run,
            link_steps = summary.link_steps_run,
            object_hits = summary.object_cache_hits,
            artifact_hits = summary.artifact_cache_hits,
            failed = summary.failed_steps.len(),
            skipped = summary.skipped_steps.len(),
            cancelled = summary.cancelled,
            duration_ms = summary.duration.as_millis() as u64,
            "build finished"
        );

        Ok(BuildReport {
            summary,
            artifacts,
            failures,
            cache: self.cache.stats(),
        })
    }
}

/// Record a successful compile; queue the package's link once its last
/// compile lands.
fn complete_compile(
    states: &mut HashMap<PackageId, PackageState>,
    ready: &mut VecDeque<Ready>,
    link_indices: &HashMap<PackageId, usize>,
    step: &CompileStep,
    key: CacheKey,
) {
    let state = states.get_mut(&step.package_id).expect("package state");
    state.object_keys.push(key);
    state.compiles_remaining -= 1;
    if state.compiles_remaining == 0 && !state.failed {
        ready.push_back(Ready::Link(link_indices[&step.package_id]));
    }
}

/// Record a successful link; release dependents whose prerequisites are now
/// all met.
fn complete_link(
    states: &mut HashMap<PackageId, PackageState>,
    ready: &mut VecDeque<Ready>,
    compile_indices: &HashMap<PackageId, Vec<usize>>,
    graph: &DependencyGraph,
    step: &LinkStep,
    key: CacheKey,
    artifacts: &mut Vec<BuildArtifact>,
) {
    let state = states.get_mut(&step.package_id).expect("package state");
    state.artifact_key = Some(key);
    artifacts.push(BuildArtifact {
        package: step.package.clone(),
        path: step.artifact.clone(),
        include_dirs: step.include_export.iter().cloned().collect(),
        dependencies: graph
            .dependencies(step.package_id)
            .into_iter()
            .map(|dep| graph.package(dep).key())
            .collect(),
    });
    for dependent in graph.dependents(step.package_id) {
        let dependent_state = states.get_mut(&dependent).expect("package state");
        dependent_state.deps_remaining -= 1;
        if dependent_state.deps_remaining == 0
            && !dependent_state.skipped
            && !dependent_state.failed
            && let Some(indices) = compile_indices.get(&dependent)
        {
            for &index in indices {
                ready.push_back(Ready::Compile(index));
            }
        }
    }
}

/// A step of this package failed: drop its queued siblings and skip every
/// transitive dependent. Unrelated packages continue.
fn mark_failed(
    states: &mut HashMap<PackageId, PackageState>,
    ready: &mut VecDeque<Ready>,
    graph: &DependencyGraph,
    plan: &BuildPlan,
    package: PackageId,
) {
    states.get_mut(&package).expect("package state").failed = true;
    ready.retain(|entry| entry_package(plan, *entry) != package);

    let mut stack = graph.dependents(package);
    while let Some(dependent) = stack.pop() {
        let state = states.get_mut(&dependent).expect("package state");
        if !state.skipped {
            state.skipped = true;
            debug!(package = %graph.package(dependent).manifest.name, "skipped: dependency failed");
            stack.extend(graph.dependents(dependent));
        }
    }
}

fn entry_package(plan: &BuildPlan, entry: Ready) -> PackageId {
    match entry {
        Ready::Compile(index) => plan.compile_steps[index].package_id,
        Ready::Link(index) => plan.link_steps[index].package_id,
    }
}

enum Invoked<T> {
    Done(T),
    TimedOut,
}

async fn invoke<F, T>(timeout: Option<Duration>, future: F) -> Invoked<T>
where
    F: Future<Output = T>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(value) => Invoked::Done(value),
            Err(_) => Invoked::TimedOut,
        },
        None => Invoked::Done(future.await),
    }
}

async fn run_compile(
    driver: Arc<dyn ToolchainDriver>,
    cache: Arc<Cache>,
    identity: ToolIdentity,
    step: CompileStep,
    timeout: Option<Duration>,
) -> CompileOutcome {
    let lookup = object_lookup_key(&step, &identity);
    match cache.get_object(&lookup) {
        Ok(Some(bytes)) => match write_object(&step.object, &bytes) {
            Ok(()) => return CompileOutcome::Hit { key: lookup },
            Err(error) => warn!(%error, "could not restore cached object; recompiling"),
        },
        Ok(None) => {}
        // A read failure is downgraded to a miss.
        Err(error) => warn!(%error, "cache read failed; treated as a miss"),
    }

    let result = match invoke(timeout, driver.compile(&step)).await {
        Invoked::Done(Ok(result)) => result,
        Invoked::Done(Err(error)) => return CompileOutcome::Fatal(error),
        Invoked::TimedOut => return CompileOutcome::TimedOut,
    };
    if !result.success {
        return CompileOutcome::Failed { result };
    }

    // Store under the accurate key derived from the fresh depfile, and also
    // under the conservative key so a depfile-less lookup still hits.
    let store_key = accurate_object_key(&step, &identity).unwrap_or(lookup);
    match std::fs::read(&result.object_path) {
        Ok(bytes) => {
            let mut keys = vec![store_key];
            for candidate in [lookup, step.conservative_key] {
                if !keys.contains(&candidate) {
                    keys.push(candidate);
                }
            }
            for key in keys {
                // A write failure is logged and does not fail the build.
                if let Err(error) = cache.put_object(&key, &bytes) {
                    warn!(%error, "cache write failed");
                }
            }
        }
        Err(error) => warn!(%error, "could not read object for caching"),
    }

    CompileOutcome::Built {
        key: store_key,
        result,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_link(
    driver: Arc<dyn ToolchainDriver>,
    cache: Arc<Cache>,
    identity: ToolIdentity,
    step: LinkStep,
    manifest: Manifest,
    object_keys: Vec<CacheKey>,
    dep_keys: Vec<CacheKey>,
    timeout: Option<Duration>,
) -> LinkOutcome {
    let key = artifact_key(&ArtifactKeyInputs {
        manifest: &manifest,
        object_keys: &object_keys,
        link_flags: &step.link_flags,
        linker: &identity,
        dependency_artifacts: &dep_keys,
    });

    match cache.get_artifact(&key) {
        Ok(Some(bundle)) => match restore_artifact(&bundle, &step.artifact) {
            Ok(()) => return LinkOutcome::Hit { key },
            Err(error) => warn!(%error, "could not restore cached artifact; relinking"),
        },
        Ok(None) => {}
        Err(error) => warn!(%error, "cache read failed; treated as a miss"),
    }

    let result = match invoke(timeout, driver.link(&step)).await {
        Invoked::Done(Ok(result)) => result,
        Invoked::Done(Err(error)) => return LinkOutcome::Fatal(error),
        Invoked::TimedOut => return LinkOutcome::TimedOut,
    };
    if !result.success {
        return LinkOutcome::Failed { result };
    }

    match ArtifactBundle::pack(&step.artifact, step.include_export.as_deref()) {
        Ok(bundle) => {
            if let Err(error) = cache.put_artifact(&key, &bundle) {
                warn!(%error, "cache write failed");
            }
        }
        Err(error) => warn!(%error, "could not bundle artifact for caching"),
    }

    LinkOutcome::Built { key, result }
}

fn write_object(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

/// Unpack a cached bundle into a staging directory beside the artifact and
/// move the artifact into place, preserving its mode.
fn restore_artifact(bundle: &ArtifactBundle, artifact: &Path) -> std::io::Result<()> {
    let parent = artifact.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;
    let staging = tempfile::tempdir_in(parent)?;
    bundle.unpack_to(staging.path())?;
    let name = artifact
        .file_name()
        .ok_or_else(|| std::io::Error::other("artifact path has no file name"))?;
    match std::fs::rename(staging.path().join(name), artifact) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Cross-device or concurrent restore; fall back to a copy.
            std::fs::copy(staging.path().join(name), artifact).map(|_| ())
        }
    }
}
