//! Driver for the GCC/Clang compiler family.

use crate::diagnostics::parse_diagnostics;
use crate::driver::{CompileResult, LinkResult, ToolchainDriver, ToolchainError};
use async_trait::async_trait;
use clyde_core::{CompilerFamily, CompilerInfo};
use clyde_manifest::{Language, PackageKind};
use clyde_planner::{CompileStep, LinkStep};
use std::ffi::OsString;
use std::process::Stdio;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::debug;

/// Drives a GCC-compatible compiler (`cc`, `gcc`, `clang`) plus `ar`.
#[derive(Debug)]
pub struct GccDriver {
    executable: String,
    archiver: String,
    probe: OnceCell<CompilerInfo>,
}

impl GccDriver {
    /// Drive a specific compiler executable.
    #[must_use]
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            archiver: "ar".to_string(),
            probe: OnceCell::new(),
        }
    }

    /// The system default: `$CC` when set, `cc` otherwise.
    #[must_use]
    pub fn system_default() -> Self {
        Self::new(std::env::var("CC").unwrap_or_else(|_| "cc".to_string()))
    }

    async fn run(
        &self,
        program: &str,
        args: &[OsString],
    ) -> Result<(std::process::ExitStatus, String, String), ToolchainError> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ToolchainError::ExecutableMissing {
                        name: program.to_string(),
                    }
                } else {
                    ToolchainError::Io { source }
                }
            })?;

        if terminated_by_signal(&output.status) {
            return Err(ToolchainError::SignalTerminated {
                name: program.to_string(),
            });
        }

        Ok((
            output.status,
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    async fn probe_uncached(&self) -> Result<CompilerInfo, ToolchainError> {
        let (status, stdout, stderr) = self.run(&self.executable, &[os("--version")]).await?;
        if !status.success() {
            return Err(ToolchainError::ProbeFailed {
                message: format!("'{} --version' failed: {}", self.executable, stderr.trim()),
            });
        }
        let banner = stdout.lines().next().unwrap_or("").trim().to_string();
        if banner.is_empty() {
            return Err(ToolchainError::ProbeFailed {
                message: format!("'{} --version' produced no banner", self.executable),
            });
        }
        let family = CompilerFamily::from_version_banner(&stdout);

        let (status, stdout, _) = self.run(&self.executable, &[os("-dumpmachine")]).await?;
        let target = stdout.trim().to_string();
        if !status.success() || target.is_empty() {
            return Err(ToolchainError::ProbeFailed {
                message: format!("'{} -dumpmachine' produced no target", self.executable),
            });
        }

        debug!(compiler = %self.executable, %banner, %target, "compiler probed");
        Ok(CompilerInfo {
            name: self.executable.clone(),
            version: banner,
            target,
            family,
        })
    }
}

#[async_trait]
impl ToolchainDriver for GccDriver {
    async fn probe(&self) -> Result<CompilerInfo, ToolchainError> {
        self.probe
            .get_or_try_init(|| self.probe_uncached())
            .await
            .cloned()
    }

    async fn compile(&self, step: &CompileStep) -> Result<CompileResult, ToolchainError> {
        for output in [&step.object, &step.depfile] {
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|source| ToolchainError::Io { source })?;
            }
        }

        let args = compile_args(step);
        let started = Instant::now();
        let (status, _, stderr) = self.run(&self.executable, &args).await?;
        let duration = started.elapsed();

        let diagnostics = parse_diagnostics(&stderr);
        debug!(
            source = %step.source.display(),
            success = status.success(),
            diagnostics = diagnostics.len(),
            duration_ms = duration.as_millis() as u64,
            "compile finished"
        );

        Ok(CompileResult {
            object_path: step.object.clone(),
            diagnostics,
            duration,
            success: status.success(),
        })
    }

    async fn link(&self, step: &LinkStep) -> Result<LinkResult, ToolchainError> {
        if let Some(parent) = step.artifact.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ToolchainError::Io { source })?;
        }

        let started = Instant::now();
        let (status, _, stderr) = match step.kind {
            PackageKind::Library => {
                // `ar r` appends into an existing archive; start clean.
                match std::fs::remove_file(&step.artifact) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => return Err(ToolchainError::Io { source }),
                }
                self.run(&self.archiver, &archive_args(step)).await?
            }
            PackageKind::Application => self.run(&self.executable, &link_args(step)).await?,
        };
        let duration = started.elapsed();

        debug!(
            artifact = %step.artifact.display(),
            success = status.success(),
            duration_ms = duration.as_millis() as u64,
            "link finished"
        );

        Ok(LinkResult {
            artifact_path: step.artifact.clone(),
            output: stderr,
            duration,
            success: status.success(),
        })
    }
}

fn os(text: &str) -> OsString {
    OsString::from(text)
}

fn compile_args(step: &CompileStep) -> Vec<OsString> {
    let mut args = vec![
        os("-x"),
        os(match step.language {
            Language::C => "c",
            Language::Cpp => "c++",
        }),
        os("-c"),
        step.source.clone().into_os_string(),
        os("-o"),
        step.object.clone().into_os_string(),
        os("-MMD"),
        os("-MF"),
        step.depfile.clone().into_os_string(),
    ];
    for dir in &step.include_dirs {
        let mut flag = OsString::from("-I");
        flag.push(dir);
        args.push(flag);
    }
    args.extend(step.flags.iter().map(|f| os(f)));
    args
}

fn archive_args(step: &LinkStep) -> Vec<OsString> {
    let mut args = vec![os("rcs"), step.artifact.clone().into_os_string()];
    args.extend(step.objects.iter().map(|o| o.clone().into_os_string()));
    args
}

fn link_args(step: &LinkStep) -> Vec<OsString> {
    let mut args: Vec<OsString> = step
        .objects
        .iter()
        .map(|o| o.clone().into_os_string())
        .collect();
    args.extend(step.dep_archives.iter().map(|a| a.clone().into_os_string()));
    args.push(os("-o"));
    args.push(step.artifact.clone().into_os_string());
    args.extend(step.link_flags.iter().map(|f| os(f)));
    if step.language == Language::Cpp {
        args.push(os("-lstdc++"));
    }
    args
}

#[cfg(unix)]
fn terminated_by_signal(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
fn terminated_by_signal(_status: &std::process::ExitStatus) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use clyde_cache::KeyWriter;
    use clyde_events::StepId;
    use clyde_resolver::PackageKey;
    use clyde_core::Version;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn key() -> PackageKey {
        PackageKey {
            name: "demo".to_string(),
            version: Version::new(0, 1, 0),
        }
    }

    fn compile_step() -> CompileStep {
        CompileStep {
            id: StepId(1),
            package: key(),
            package_id: clyde_resolver::PackageId::new(0),
            source: PathBuf::from("/pkg/src/main.c"),
            object: PathBuf::from("/pkg/.build/obj/src/main.o"),
            depfile: PathBuf::from("/pkg/.build/obj/src/main.d"),
            flags: vec!["-Wall".to_string(), "-O2".to_string()],
            include_dirs: vec![PathBuf::from("/dep/include")],
            language: Language::C,
            traits: std::collections::BTreeMap::new(),
            conservative_key: KeyWriter::new().finish(),
        }
    }

    #[test]
    fn compile_command_shape() {
        let args = compile_args(&compile_step());
        let text: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            text,
            vec![
                "-x",
                "c",
                "-c",
                "/pkg/src/main.c",
                "-o",
                "/pkg/.build/obj/src/main.o",
                "-MMD",
                "-MF",
                "/pkg/.build/obj/src/main.d",
                "-I/dep/include",
                "-Wall",
                "-O2",
            ]
        );
    }

    #[test]
    fn archive_command_shape() {
        let step = LinkStep {
            id: StepId(2),
            package: key(),
            package_id: clyde_resolver::PackageId::new(0),
            kind: PackageKind::Library,
            language: Language::C,
            objects: vec![PathBuf::from("a.o"), PathBuf::from("b.o")],
            artifact: PathBuf::from("libdemo.a"),
            link_flags: vec![],
            dep_archives: vec![],
            include_export: None,
        };
        let text: Vec<String> = archive_args(&step)
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(text, vec!["rcs", "libdemo.a", "a.o", "b.o"]);
    }

    #[test]
    fn link_command_orders_objects_archives_flags() {
        let step = LinkStep {
            id: StepId(3),
            package: key(),
            package_id: clyde_resolver::PackageId::new(0),
            kind: PackageKind::Application,
            language: Language::Cpp,
            objects: vec![PathBuf::from("main.o")],
            artifact: PathBuf::from("app"),
            link_flags: vec!["-lm".to_string()],
            dep_archives: vec![PathBuf::from("libdep.a")],
            include_export: None,
        };
        let text: Vec<String> = link_args(&step)
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            text,
            vec!["main.o", "libdep.a", "-o", "app", "-lm", "-lstdc++"]
        );
    }
}
