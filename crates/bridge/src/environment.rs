//! Isolated Julia environment: directory layout and package bootstrap.
//!
//! [`RuntimeLayout::configure`] decides where everything lives and must run
//! before any session is spawned. [`EnvironmentManager::ensure_ready`] then
//! brings the project's packages into a usable state exactly once.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::program::{Literal, Program};
use crate::runtime::Runtime;
use crate::session::SessionConfig;

/// Directory created under the configured (or temporary) base directory.
pub const APP_NAMESPACE: &str = "graphbees_runtime";

/// Name of the Julia project directory.
pub const PROJECT_DIR: &str = "JuliAlgEnv";

/// Oldest Julia release the solver package supports.
pub const MIN_JULIA_VERSION: &str = "1.12.0";

/// Where a required package is installed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageSource {
    /// The General registry.
    Registry,
    /// A git repository; not in any registry.
    Git(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
    pub name: &'static str,
    pub source: PackageSource,
}

impl Package {
    fn add_statement(&self) -> String {
        match self.source {
            PackageSource::Git(url) => format!("Pkg.add(url={})", Literal::string(url)),
            PackageSource::Registry => format!("Pkg.add({})", Literal::string(self.name)),
        }
    }
}

/// Packages the project must declare. `JuliAlg` comes first: it is not
/// registered, so it has to be in the manifest before `instantiate` runs.
pub const REQUIRED_PACKAGES: [Package; 4] = [
    Package {
        name: "JuliAlg",
        source: PackageSource::Git("https://github.com/hoavu-cs/JuliAlg.git"),
    },
    Package {
        name: "Graphs",
        source: PackageSource::Registry,
    },
    Package {
        name: "JuMP",
        source: PackageSource::Registry,
    },
    Package {
        name: "HiGHS",
        source: PackageSource::Registry,
    },
];

/// Inputs to [`RuntimeLayout::configure`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    /// Base directory for runtime data. Defaults to the system temp dir.
    pub runtime_dir: Option<PathBuf>,
    /// Project directory bundled with the application, if any.
    pub source_project: Option<PathBuf>,
    /// Value for Julia's `--threads` flag.
    pub threads: String,
}

/// Resolved locations of the isolated runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    pub root: PathBuf,
    pub depot: PathBuf,
    pub project: PathBuf,
    pub threads: String,
}

impl RuntimeLayout {
    /// Resolve and create the runtime directories.
    ///
    /// A writable bundled project is used in place. Otherwise it is copied
    /// into the runtime root the first time, and the runtime copy is reused
    /// afterwards. Without any bundled project an empty project directory is
    /// created so package installation has somewhere to write.
    pub fn configure(settings: &RuntimeSettings) -> Result<Self> {
        let base = settings
            .runtime_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let root = base.join(APP_NAMESPACE);
        create_dir(&root)?;

        let source = settings.source_project.as_deref().filter(|p| p.is_dir());
        let writable = source.is_some_and(is_writable);
        let project = place_project(source, writable, &root.join(PROJECT_DIR))?;

        let threads = if settings.threads.is_empty() {
            "auto".to_string()
        } else {
            settings.threads.clone()
        };

        Ok(Self {
            depot: root.join("julia_depot"),
            root,
            project,
            threads,
        })
    }

    pub fn manifest(&self) -> PathBuf {
        self.project.join("Manifest.toml")
    }

    /// Launch parameters for a session living in this layout.
    pub fn session_config(&self, executable: impl Into<PathBuf>) -> SessionConfig {
        SessionConfig {
            executable: executable.into(),
            project: self.project.clone(),
            depot: self.depot.clone(),
            threads: self.threads.clone(),
            env: Default::default(),
        }
    }
}

fn place_project(source: Option<&Path>, source_writable: bool, target: &Path) -> Result<PathBuf> {
    if let Some(source) = source {
        if source_writable {
            return Ok(source.to_path_buf());
        }
        if !target.exists() {
            info!(from = %source.display(), to = %target.display(), "copying julia project");
            copy_dir(source, target).map_err(|source_err| Error::Layout {
                path: target.to_path_buf(),
                source: source_err,
            })?;
        }
    }
    create_dir(target)?;
    Ok(target.to_path_buf())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| Error::Layout {
        path: path.to_path_buf(),
        source,
    })
}

fn is_writable(dir: &Path) -> bool {
    let marker = dir.join(".graphbees-write-marker");
    match fs::OpenOptions::new().write(true).create(true).truncate(true).open(&marker) {
        Ok(_) => fs::remove_file(&marker).is_ok(),
        Err(_) => false,
    }
}

fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

/// Brings the Julia project to a loadable state, once.
pub struct EnvironmentManager {
    project: PathBuf,
    ready: OnceCell<()>,
}

impl EnvironmentManager {
    pub fn new(layout: &RuntimeLayout) -> Self {
        Self {
            project: layout.project.clone(),
            ready: OnceCell::new(),
        }
    }

    /// Whether bootstrap has already completed.
    pub fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Install and load everything the solvers need.
    ///
    /// Idempotent: after the first success this returns immediately, and
    /// concurrent callers wait on the same bootstrap. A failed bootstrap is
    /// not cached.
    pub async fn ensure_ready<R: Runtime>(&self, rt: &R) -> Result<()> {
        self.ready.get_or_try_init(|| self.bootstrap(rt)).await?;
        Ok(())
    }

    async fn bootstrap<R: Runtime>(&self, rt: &R) -> Result<()> {
        check_version(rt).await?;

        let activate = Program::new().using("Pkg").stmt(format!(
            "Pkg.activate({})",
            Literal::string(&self.project.to_string_lossy())
        ));
        step(rt, &activate, "activate project").await?;

        let declared: Vec<bool> = serde_json::from_value(
            step(rt, &declared_packages(), "read project dependencies").await?,
        )?;
        let missing: Vec<&Package> = REQUIRED_PACKAGES
            .iter()
            .zip(declared.iter().copied().chain(std::iter::repeat(false)))
            .filter(|(_, present)| !present)
            .map(|(package, _)| package)
            .collect();

        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(|p| p.name).collect();
            info!(packages = ?names, "installing missing julia packages");
            for package in missing {
                add_package(rt, package).await?;
            }
        }

        if let Err(first) = instantiate(rt).await {
            warn!(error = %first, "instantiate failed, rebuilding manifest");
            self.remove_manifest()?;
            for package in &REQUIRED_PACKAGES {
                add_package(rt, package).await?;
            }
            instantiate(rt).await.map_err(|second| {
                Error::Environment(format!("instantiate failed after manifest rebuild: {second}"))
            })?;
        }

        step(rt, &Program::new().using("JuliAlg, Graphs").stmt("nothing"), "load solver packages")
            .await?;
        info!(project = %self.project.display(), "julia environment ready");
        Ok(())
    }

    fn remove_manifest(&self) -> Result<()> {
        let manifest = self.project.join("Manifest.toml");
        match fs::remove_file(&manifest) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Layout {
                path: manifest,
                source,
            }),
        }
    }
}

async fn check_version<R: Runtime>(rt: &R) -> Result<()> {
    let program = Program::new().stmt(format!(
        "(string(VERSION), VERSION >= VersionNumber({}))",
        Literal::string(MIN_JULIA_VERSION)
    ));
    let (found, supported): (String, bool) =
        serde_json::from_value(step(rt, &program, "query julia version").await?)?;
    if !supported {
        return Err(Error::VersionTooOld {
            found,
            required: MIN_JULIA_VERSION,
        });
    }
    Ok(())
}

fn declared_packages() -> Program {
    let checks: Vec<String> = REQUIRED_PACKAGES
        .iter()
        .map(|p| format!("{} in __deps", Literal::string(p.name)))
        .collect();
    Program::new()
        .using("Pkg")
        .stmt("__deps = keys(Pkg.project().dependencies)")
        .stmt(format!("({},)", checks.join(", ")))
}

async fn add_package<R: Runtime>(rt: &R, package: &Package) -> Result<()> {
    let program = Program::new()
        .using("Pkg")
        .stmt(package.add_statement())
        .stmt("nothing");
    step(rt, &program, package.name).await?;
    Ok(())
}

async fn instantiate<R: Runtime>(rt: &R) -> Result<()> {
    let program = Program::new()
        .using("Pkg")
        .stmt("Pkg.instantiate()")
        .stmt("nothing");
    rt.eval(&program).await?;
    Ok(())
}

async fn step<R: Runtime>(rt: &R, program: &Program, what: &str) -> Result<serde_json::Value> {
    rt.eval(program).await.map_err(|e| match e {
        Error::Eval(message) => Error::Environment(format!("{what}: {message}")),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use super::*;
    use crate::runtime::testing::ScriptedRuntime;

    fn layout_in(dir: &Path) -> RuntimeLayout {
        RuntimeLayout::configure(&RuntimeSettings {
            runtime_dir: Some(dir.to_path_buf()),
            ..Default::default()
        })
        .unwrap()
    }

    fn healthy(source: &str, declared: Value) -> Result<Value> {
        if source.contains("VERSION") {
            Ok(json!(["1.12.1", true]))
        } else if source.contains("Pkg.project()") {
            Ok(declared)
        } else {
            Ok(Value::Null)
        }
    }

    fn count(programs: &[String], needle: &str) -> usize {
        programs.iter().filter(|p| p.contains(needle)).count()
    }

    #[test]
    fn layout_uses_namespace_under_override() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout_in(dir.path());
        assert_eq!(layout.root, dir.path().join(APP_NAMESPACE));
        assert_eq!(layout.depot, layout.root.join("julia_depot"));
        assert_eq!(layout.project, layout.root.join(PROJECT_DIR));
        assert!(layout.project.is_dir());
        assert_eq!(layout.threads, "auto");
    }

    #[test]
    fn writable_source_project_is_used_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bundled");
        fs::create_dir_all(&source).unwrap();
        let layout = RuntimeLayout::configure(&RuntimeSettings {
            runtime_dir: Some(dir.path().join("rt")),
            source_project: Some(source.clone()),
            threads: "4".into(),
        })
        .unwrap();
        assert_eq!(layout.project, source);
        assert_eq!(layout.session_config("julia").threads, "4");
    }

    #[test]
    fn readonly_source_is_copied_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bundled");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("Project.toml"), "[deps]\n").unwrap();
        fs::write(source.join("sub/extra.txt"), "x").unwrap();
        let target = dir.path().join("rt").join(PROJECT_DIR);

        let placed = place_project(Some(&source), false, &target).unwrap();
        assert_eq!(placed, target);
        assert_eq!(fs::read_to_string(target.join("Project.toml")).unwrap(), "[deps]\n");
        assert!(target.join("sub/extra.txt").exists());

        fs::write(target.join("Project.toml"), "[deps]\nJuMP = \"x\"\n").unwrap();
        place_project(Some(&source), false, &target).unwrap();
        assert!(fs::read_to_string(target.join("Project.toml")).unwrap().contains("JuMP"));
    }

    #[test]
    fn missing_source_still_creates_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("env");
        place_project(None, false, &target).unwrap();
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn ensure_ready_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EnvironmentManager::new(&layout_in(dir.path()));
        let rt = ScriptedRuntime::new(|s| healthy(s, json!([false, true, true, false])));

        manager.ensure_ready(&rt).await.unwrap();
        let after_first = rt.programs();
        manager.ensure_ready(&rt).await.unwrap();

        assert!(manager.is_ready());
        assert_eq!(rt.programs(), after_first);
        assert_eq!(count(&after_first, "Pkg.add("), 2);
        assert_eq!(count(&after_first, "Pkg.add(url=\"https://github.com/hoavu-cs/JuliAlg.git\")"), 1);
        assert_eq!(count(&after_first, "Pkg.add(\"HiGHS\")"), 1);
        assert_eq!(count(&after_first, "Pkg.instantiate()"), 1);
    }

    #[tokio::test]
    async fn concurrent_ensure_ready_bootstraps_once() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EnvironmentManager::new(&layout_in(dir.path()));
        let rt = ScriptedRuntime::new(|s| healthy(s, json!([false, true, true, false])));

        let (a, b, c) = tokio::join!(
            manager.ensure_ready(&rt),
            manager.ensure_ready(&rt),
            manager.ensure_ready(&rt),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let programs = rt.programs();
        assert!(manager.is_ready());
        assert_eq!(count(&programs, "VERSION >="), 1);
        assert_eq!(count(&programs, "Pkg.instantiate()"), 1);
        assert_eq!(count(&programs, "Pkg.add("), 2);
        assert_eq!(count(&programs, "Pkg.add(\"HiGHS\")"), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_retry_after_failed_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EnvironmentManager::new(&layout_in(dir.path()));
        let failures = Arc::new(AtomicUsize::new(0));
        let seen = failures.clone();
        let rt = ScriptedRuntime::new(move |s| {
            if s.contains("VERSION") && seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::SessionExited);
            }
            healthy(s, json!([true, true, true, true]))
        });

        let (a, b) = tokio::join!(manager.ensure_ready(&rt), manager.ensure_ready(&rt));
        assert!(a.is_err() ^ b.is_err());
        assert!(manager.is_ready());
        assert_eq!(count(&rt.programs(), "Pkg.instantiate()"), 1);
    }

    #[tokio::test]
    async fn julialg_is_added_before_instantiate() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EnvironmentManager::new(&layout_in(dir.path()));
        let rt = ScriptedRuntime::new(|s| healthy(s, json!([false, false, false, false])));
        manager.ensure_ready(&rt).await.unwrap();

        let programs = rt.programs();
        let julialg = programs.iter().position(|p| p.contains("JuliAlg.git")).unwrap();
        let instantiate = programs.iter().position(|p| p.contains("Pkg.instantiate()")).unwrap();
        assert!(julialg < instantiate);
        assert!(programs.last().unwrap().contains("using JuliAlg, Graphs"));
    }

    #[tokio::test]
    async fn broken_manifest_is_rebuilt_once() {
        let dir = tempfile::tempdir().unwrap();
        let layout = layout_in(dir.path());
        fs::write(layout.manifest(), "julia_version = \"0.1\"\n").unwrap();
        let manager = EnvironmentManager::new(&layout);

        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let rt = ScriptedRuntime::new(move |s| {
            if s.contains("Pkg.instantiate()") && seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::Eval("manifest format unsupported".into()));
            }
            healthy(s, json!([true, true, true, true]))
        });

        manager.ensure_ready(&rt).await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(!layout.manifest().exists());
        assert_eq!(count(&rt.programs(), "Pkg.add("), REQUIRED_PACKAGES.len());
    }

    #[tokio::test]
    async fn second_instantiate_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EnvironmentManager::new(&layout_in(dir.path()));
        let rt = ScriptedRuntime::new(|s| {
            if s.contains("Pkg.instantiate()") {
                return Err(Error::Eval("resolver failure".into()));
            }
            healthy(s, json!([true, true, true, true]))
        });

        let err = manager.ensure_ready(&rt).await.unwrap_err();
        assert!(matches!(err, Error::Environment(ref m) if m.contains("resolver failure")));
        assert!(!manager.is_ready());
        assert_eq!(count(&rt.programs(), "Pkg.instantiate()"), 2);
    }

    #[tokio::test]
    async fn old_julia_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = EnvironmentManager::new(&layout_in(dir.path()));
        let rt = ScriptedRuntime::returning(json!(["1.10.4", false]));
        let err = manager.ensure_ready(&rt).await.unwrap_err();
        assert!(matches!(err, Error::VersionTooOld { ref found, .. } if found == "1.10.4"));
        assert_eq!(rt.programs().len(), 1);
    }
}
