//! Current-state queries against the real host

use anyhow::{Context, Result, bail};
use declarative::{CurrentState, FileMeta, Resource, ResourceSpec, StateQuerier};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;

use super::HostRoot;
use super::packages::PackageManager;
use super::sys;
use crate::runner;

/// Reads package, file, guard and path state from the host
pub struct HostStateQuerier {
    root: HostRoot,
    packages: Arc<dyn PackageManager>,
}

impl HostStateQuerier {
    pub fn new(root: HostRoot, packages: Arc<dyn PackageManager>) -> Self {
        Self { root, packages }
    }

    fn file_state(&self, path: &Path) -> Result<Option<FileMeta>> {
        let target = self.root.resolve(path);
        let meta = match fs::symlink_metadata(&target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", target.display()));
            }
        };
        if !meta.file_type().is_file() {
            bail!("{} exists and is not a regular file", target.display());
        }

        let content =
            fs::read(&target).with_context(|| format!("Failed to read {}", target.display()))?;
        Ok(Some(FileMeta {
            content_hash: blake3::hash(&content).to_hex().to_string(),
            mode: meta.mode() & 0o7777,
            owner: sys::user_name(meta.uid()).unwrap_or_else(|| meta.uid().to_string()),
            group: sys::group_name(meta.gid()).unwrap_or_else(|| meta.gid().to_string()),
        }))
    }

    fn path_exists(&self, path: &Path) -> Result<bool> {
        let target = self.root.resolve(path);
        match fs::symlink_metadata(&target) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", target.display())),
        }
    }
}

impl StateQuerier for HostStateQuerier {
    fn current_state(&self, resource: &Resource) -> Result<CurrentState> {
        match &resource.spec {
            ResourceSpec::Package(spec) => {
                let installed = self.packages.installed(&spec.name)?;
                // Candidates only matter for upgrades, and cost a repository query
                let candidate = if resource.action == declarative::Action::Upgrade {
                    self.packages.candidate(&spec.name)
                } else {
                    None
                };
                Ok(CurrentState::Package {
                    installed,
                    candidate,
                })
            }
            ResourceSpec::File(spec) => Ok(CurrentState::File(self.file_state(&spec.path)?)),
            ResourceSpec::Command(spec) => {
                let guard_satisfied = match &spec.guard {
                    Some(guard) => {
                        let out = runner::shell(guard.command(), spec.cwd.as_deref())?;
                        log::debug!(
                            "guard `{}` for {} exited {:?}",
                            guard.command(),
                            spec.name,
                            out.code
                        );
                        Some(guard.satisfied_by(out.success))
                    }
                    None => None,
                };
                Ok(CurrentState::Command { guard_satisfied })
            }
            ResourceSpec::Delete(spec) => Ok(CurrentState::Path {
                exists: self.path_exists(&spec.path)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::StaticPackages;
    use declarative::{Action, CommandSpec, FileSpec, PackageSpec};

    fn querier(dir: &Path, packages: StaticPackages) -> HostStateQuerier {
        HostStateQuerier::new(HostRoot::new(Some(dir.to_path_buf())), Arc::new(packages))
    }

    #[test]
    fn test_absent_file() {
        let dir = tempfile::tempdir().unwrap();
        let q = querier(dir.path(), StaticPackages::default());
        let res = Resource::file(FileSpec::new("/etc/openstack-dashboard/local_settings"));
        assert_eq!(q.current_state(&res).unwrap(), CurrentState::File(None));
    }

    #[test]
    fn test_present_file_reports_hash_and_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let on_disk = dir.path().join("etc/motd");
        fs::create_dir_all(on_disk.parent().unwrap()).unwrap();
        fs::write(&on_disk, "welcome").unwrap();
        fs::set_permissions(&on_disk, fs::Permissions::from_mode(0o640)).unwrap();

        let q = querier(dir.path(), StaticPackages::default());
        let spec = FileSpec::new("/etc/motd").content("welcome");
        let state = q.current_state(&Resource::file(spec.clone())).unwrap();
        let CurrentState::File(Some(meta)) = state else {
            panic!("expected file state, got {state:?}");
        };
        assert_eq!(meta.content_hash, spec.content_hash());
        assert_eq!(meta.mode, 0o640);
        assert!(!meta.owner.is_empty());
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc/httpd")).unwrap();
        let q = querier(dir.path(), StaticPackages::default());
        assert!(q.current_state(&Resource::file(FileSpec::new("/etc/httpd"))).is_err());
    }

    #[test]
    fn test_delete_path_exists() {
        let dir = tempfile::tempdir().unwrap();
        let conf = dir.path().join("etc/httpd/conf.d/openstack-dashboard.conf");
        fs::create_dir_all(conf.parent().unwrap()).unwrap();
        fs::write(&conf, "").unwrap();

        let q = querier(dir.path(), StaticPackages::default());
        let res = Resource::delete("/etc/httpd/conf.d/openstack-dashboard.conf");
        assert_eq!(
            q.current_state(&res).unwrap(),
            CurrentState::Path { exists: true }
        );

        fs::remove_file(&conf).unwrap();
        assert_eq!(
            q.current_state(&res).unwrap(),
            CurrentState::Path { exists: false }
        );
    }

    #[test]
    fn test_guards() {
        let dir = tempfile::tempdir().unwrap();
        let q = querier(dir.path(), StaticPackages::default());

        let not_if = Resource::command(CommandSpec::new("noop", "true").not_if("true"));
        assert_eq!(
            q.current_state(&not_if).unwrap(),
            CurrentState::Command {
                guard_satisfied: Some(true)
            }
        );

        let only_if = Resource::command(CommandSpec::new("noop", "true").only_if("true"));
        assert_eq!(
            q.current_state(&only_if).unwrap(),
            CurrentState::Command {
                guard_satisfied: Some(false)
            }
        );

        let unguarded = Resource::command(CommandSpec::new("noop", "true"));
        assert_eq!(
            q.current_state(&unguarded).unwrap(),
            CurrentState::Command {
                guard_satisfied: None
            }
        );
    }

    #[test]
    fn test_candidate_only_queried_for_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let packages = StaticPackages::default()
            .with_installed("openstack-dashboard", "2014.1-1")
            .with_candidate("openstack-dashboard", "2014.1-2");
        let q = querier(dir.path(), packages);

        let install = Resource::package(PackageSpec::new("openstack-dashboard"));
        assert_eq!(
            q.current_state(&install).unwrap(),
            CurrentState::Package {
                installed: Some("2014.1-1".into()),
                candidate: None,
            }
        );

        let upgrade = install.with_action(Action::Upgrade);
        assert_eq!(
            q.current_state(&upgrade).unwrap(),
            CurrentState::Package {
                installed: Some("2014.1-1".into()),
                candidate: Some("2014.1-2".into()),
            }
        );
    }
}
