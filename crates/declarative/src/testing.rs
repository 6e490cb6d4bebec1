//! In-memory host used by the engine tests

use crate::context::{ActionExecutor, ApplyContext, StateQuerier};
use crate::resource::{Resource, ResourceSpec};
use crate::types::{Action, ApplyResult, CurrentState, FileMeta, ResourceId};
use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct HostState {
    packages: HashMap<String, String>,
    candidates: HashMap<String, String>,
    files: HashMap<PathBuf, FileMeta>,
    paths: HashSet<PathBuf>,
    guards: HashMap<String, bool>,
    failing: HashSet<ResourceId>,
    failing_queries: HashSet<ResourceId>,
    applied: Vec<(ResourceId, Action)>,
}

/// Fake host implementing both collaborator traits
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn install(&self, name: &str, version: &str) {
        self.with(|s| s.packages.insert(name.into(), version.into()));
    }

    pub fn set_candidate(&self, name: &str, version: &str) {
        self.with(|s| s.candidates.insert(name.into(), version.into()));
    }

    pub fn create_path(&self, path: &str) {
        self.with(|s| s.paths.insert(PathBuf::from(path)));
    }

    /// Exit status the guard command reports
    pub fn set_guard(&self, command: &str, exit_success: bool) {
        self.with(|s| s.guards.insert(command.into(), exit_success));
    }

    pub fn fail_on(&self, id: ResourceId) {
        self.with(|s| s.failing.insert(id));
    }

    pub fn fail_query(&self, id: ResourceId) {
        self.with(|s| s.failing_queries.insert(id));
    }

    pub fn installed(&self, name: &str) -> Option<String> {
        self.with(|s| s.packages.get(name).cloned())
    }

    pub fn file(&self, path: &str) -> Option<FileMeta> {
        self.with(|s| s.files.get(Path::new(path)).cloned())
    }

    pub fn applied(&self) -> Vec<(ResourceId, Action)> {
        self.with(|s| s.applied.clone())
    }

    pub fn apply_count(&self, id: &ResourceId) -> usize {
        self.with(|s| s.applied.iter().filter(|(a, _)| a == id).count())
    }
}

impl StateQuerier for FakeHost {
    fn current_state(&self, resource: &Resource) -> Result<CurrentState> {
        self.with(|s| {
            if s.failing_queries.contains(&resource.id()) {
                bail!("simulated query failure");
            }
            Ok(match &resource.spec {
                ResourceSpec::Package(p) => CurrentState::Package {
                    installed: s.packages.get(&p.name).cloned(),
                    candidate: s.candidates.get(&p.name).cloned(),
                },
                ResourceSpec::File(f) => CurrentState::File(s.files.get(&f.path).cloned()),
                ResourceSpec::Command(c) => CurrentState::Command {
                    guard_satisfied: c.guard.as_ref().map(|g| {
                        g.satisfied_by(s.guards.get(g.command()).copied().unwrap_or(false))
                    }),
                },
                ResourceSpec::Delete(d) => CurrentState::Path {
                    exists: s.paths.contains(&d.path) || s.files.contains_key(&d.path),
                },
            })
        })
    }
}

impl ActionExecutor for FakeHost {
    fn apply(&self, resource: &Resource, ctx: &ApplyContext) -> Result<ApplyResult> {
        self.with(|s| {
            let id = resource.id();
            if s.failing.contains(&id) {
                bail!("simulated failure for {id}");
            }
            s.applied.push((id, ctx.action));

            Ok(match (&resource.spec, ctx.action) {
                (ResourceSpec::Package(p), Action::Remove) => {
                    s.packages.remove(&p.name);
                    ApplyResult::Removed
                }
                (ResourceSpec::Package(p), action) => {
                    let version = match action {
                        Action::Upgrade => s.candidates.get(&p.name).cloned(),
                        _ => p.version.clone(),
                    }
                    .unwrap_or_else(|| "1.0".to_string());
                    match s.packages.insert(p.name.clone(), version) {
                        None => ApplyResult::Created,
                        Some(_) => ApplyResult::Modified,
                    }
                }
                (ResourceSpec::File(f), _) => {
                    let meta = FileMeta {
                        content_hash: f.content_hash(),
                        mode: f.mode.unwrap_or(0o644),
                        owner: f.owner.clone().unwrap_or_else(|| "root".into()),
                        group: f.group.clone().unwrap_or_else(|| "root".into()),
                    };
                    match s.files.insert(f.path.clone(), meta) {
                        None => ApplyResult::Created,
                        Some(_) => ApplyResult::Modified,
                    }
                }
                (ResourceSpec::Command(_), _) => ApplyResult::Modified,
                (ResourceSpec::Delete(d), _) => {
                    s.paths.remove(&d.path);
                    s.files.remove(&d.path);
                    ApplyResult::Removed
                }
            })
        })
    }
}
