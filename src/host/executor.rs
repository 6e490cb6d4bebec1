//! Applies resource actions to the real host

use anyhow::{Context, Result, bail};
use declarative::{
    Action, ActionExecutor, ApplyContext, ApplyResult, CommandSpec, FileSpec, PackageSpec,
    Resource, ResourceSpec,
};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use super::HostRoot;
use super::packages::PackageManager;
use super::sys;
use crate::runner;

/// Performs package, file, command and delete actions
pub struct HostExecutor {
    root: HostRoot,
    packages: Arc<dyn PackageManager>,
}

impl HostExecutor {
    pub fn new(root: HostRoot, packages: Arc<dyn PackageManager>) -> Self {
        Self { root, packages }
    }

    /// Write content atomically, then apply mode and ownership
    fn write_file(&self, spec: &FileSpec) -> Result<ApplyResult> {
        let target = self.root.resolve(&spec.path);
        let existed = target.exists();

        let dir = target
            .parent()
            .with_context(|| format!("{} has no parent directory", target.display()))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let file_name = target
            .file_name()
            .with_context(|| format!("{} has no file name", target.display()))?
            .to_string_lossy();
        let staged = dir.join(format!(".{file_name}.convergent-{}", std::process::id()));
        // Left behind by an interrupted run that had the same pid
        match fs::remove_file(&staged) {
            Ok(()) => log::debug!("removed stale {}", staged.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to remove stale {}", staged.display()));
            }
        }

        let written = self.stage(&staged, spec).and_then(|()| {
            fs::rename(&staged, &target).with_context(|| {
                format!("Failed to move {} into place", target.display())
            })
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&staged);
            return Err(e);
        }

        log::debug!("wrote {} ({} bytes)", target.display(), spec.content.len());
        Ok(if existed {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }

    fn stage(&self, staged: &Path, spec: &FileSpec) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(staged)
            .with_context(|| format!("Failed to create {}", staged.display()))?;
        file.write_all(&spec.content)
            .and_then(|()| file.sync_all())
            .with_context(|| format!("Failed to write {}", staged.display()))?;

        if let Some(mode) = spec.mode {
            fs::set_permissions(staged, fs::Permissions::from_mode(mode))
                .with_context(|| format!("Failed to chmod {mode:04o}"))?;
        } else {
            fs::set_permissions(staged, fs::Permissions::from_mode(0o644))
                .context("Failed to chmod 0644")?;
        }

        if spec.owner.is_some() || spec.group.is_some() {
            let uid = match spec.owner.as_deref() {
                Some(owner) => Some(
                    sys::resolve_user(owner).with_context(|| format!("Unknown user: {owner}"))?,
                ),
                None => None,
            };
            let gid = match spec.group.as_deref() {
                Some(group) => Some(
                    sys::resolve_group(group)
                        .with_context(|| format!("Unknown group: {group}"))?,
                ),
                None => None,
            };
            std::os::unix::fs::chown(staged, uid, gid).with_context(|| {
                format!(
                    "Failed to chown {}:{}",
                    spec.owner.as_deref().unwrap_or("-"),
                    spec.group.as_deref().unwrap_or("-")
                )
            })?;
        }
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<ApplyResult> {
        let target = self.root.resolve(path);
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => {
                bail!("{} is a directory, refusing to delete", target.display())
            }
            Ok(_) => {
                fs::remove_file(&target)
                    .with_context(|| format!("Failed to delete {}", target.display()))?;
                Ok(ApplyResult::Removed)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(ApplyResult::NoChange),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", target.display())),
        }
    }

    /// Install, downgrading when an exact version is older than the installed one
    fn install_package(&self, spec: &PackageSpec) -> Result<ApplyResult> {
        let existed = self.packages.installed(&spec.name)?.is_some();
        self.packages.install(&spec.name, spec.version.as_deref())?;

        if let Some(wanted) = spec.version.as_deref() {
            let mut have = self.packages.installed(&spec.name)?;
            if have.as_deref() != Some(wanted) {
                log::info!(
                    "{} is at {} after install, downgrading to {wanted}",
                    spec.name,
                    have.as_deref().unwrap_or("nothing")
                );
                self.packages.downgrade(&spec.name, wanted)?;
                have = self.packages.installed(&spec.name)?;
            }
            if have.as_deref() != Some(wanted) {
                bail!(
                    "{} is at {} but {wanted} was requested",
                    spec.name,
                    have.as_deref().unwrap_or("nothing")
                );
            }
        }

        Ok(if existed {
            ApplyResult::Modified
        } else {
            ApplyResult::Created
        })
    }

    fn run_command(&self, spec: &CommandSpec, verbose: bool) -> Result<ApplyResult> {
        let output = runner::shell(&spec.command, spec.cwd.as_deref())?;
        if verbose {
            for line in output.stdout_str().lines() {
                log::info!("[{}] {line}", spec.name);
            }
        }
        if !output.success {
            bail!(
                "`{}` exited with {}: {}",
                spec.command,
                output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                output.stderr_str().trim()
            );
        }
        Ok(ApplyResult::Modified)
    }
}

impl ActionExecutor for HostExecutor {
    fn apply(&self, resource: &Resource, ctx: &ApplyContext) -> Result<ApplyResult> {
        match (&resource.spec, ctx.action) {
            (ResourceSpec::Package(spec), Action::Install) => self.install_package(spec),
            (ResourceSpec::Package(spec), Action::Upgrade) => {
                let existed = self.packages.installed(&spec.name)?.is_some();
                self.packages.upgrade(&spec.name)?;
                Ok(if existed {
                    ApplyResult::Modified
                } else {
                    ApplyResult::Created
                })
            }
            (ResourceSpec::Package(spec), Action::Remove) => {
                self.packages.remove(&spec.name)?;
                Ok(ApplyResult::Removed)
            }
            (ResourceSpec::File(spec), Action::Create) => self.write_file(spec),
            (ResourceSpec::Command(spec), Action::Run) => self.run_command(spec, ctx.verbose),
            (ResourceSpec::Delete(spec), Action::Delete) => self.delete(&spec.path),
            (_, action) => bail!("{} cannot {action}", resource.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostStateQuerier;
    use crate::host::testing::StaticPackages;
    use declarative::{StateQuerier, should_run};
    use std::os::unix::fs::MetadataExt;

    fn host(dir: &Path, packages: StaticPackages) -> (HostStateQuerier, HostExecutor) {
        let packages: Arc<dyn PackageManager> = Arc::new(packages);
        let root = HostRoot::new(Some(dir.to_path_buf()));
        (
            HostStateQuerier::new(root.clone(), Arc::clone(&packages)),
            HostExecutor::new(root, packages),
        )
    }

    fn ctx(action: Action) -> ApplyContext {
        ApplyContext::new(action, false)
    }

    fn current_owner(dir: &Path) -> (String, String) {
        let meta = fs::metadata(dir).unwrap();
        (
            sys::user_name(meta.uid()).unwrap(),
            sys::group_name(meta.gid()).unwrap(),
        )
    }

    #[test]
    fn test_write_file_then_converged() {
        let dir = tempfile::tempdir().unwrap();
        let (querier, executor) = host(dir.path(), StaticPackages::default());
        let (owner, group) = current_owner(dir.path());

        let res = Resource::file(
            FileSpec::new("/etc/openstack-dashboard/local_settings")
                .content("WEBROOT = '/'\n")
                .mode(0o644)
                .owner(owner)
                .group(group),
        );

        let before = querier.current_state(&res).unwrap();
        assert!(should_run(&res, &before));

        assert_eq!(
            executor.apply(&res, &ctx(Action::Create)).unwrap(),
            ApplyResult::Created
        );
        let on_disk = dir.path().join("etc/openstack-dashboard/local_settings");
        assert_eq!(fs::read_to_string(&on_disk).unwrap(), "WEBROOT = '/'\n");
        assert_eq!(fs::metadata(&on_disk).unwrap().mode() & 0o7777, 0o644);

        let after = querier.current_state(&res).unwrap();
        assert!(!should_run(&res, &after));
    }

    #[test]
    fn test_rewrite_reports_modified_and_fixes_mode() {
        let dir = tempfile::tempdir().unwrap();
        let (querier, executor) = host(dir.path(), StaticPackages::default());

        let key = Resource::file(
            FileSpec::new("/etc/pki/tls/private/horizon.key")
                .content("key")
                .mode(0o640),
        );
        executor.apply(&key, &ctx(Action::Create)).unwrap();

        let on_disk = dir.path().join("etc/pki/tls/private/horizon.key");
        fs::set_permissions(&on_disk, fs::Permissions::from_mode(0o666)).unwrap();
        assert!(should_run(&key, &querier.current_state(&key).unwrap()));

        assert_eq!(
            executor.apply(&key, &ctx(Action::Create)).unwrap(),
            ApplyResult::Modified
        );
        assert_eq!(fs::metadata(&on_disk).unwrap().mode() & 0o7777, 0o640);
        // No staging files left behind
        let leftovers: Vec<_> = fs::read_dir(on_disk.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("convergent"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_stale_staged_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = dir.path().join("etc/httpd/conf.d");
        fs::create_dir_all(&conf_dir).unwrap();
        let stale = conf_dir.join(format!(
            ".openstack-dashboard.convergent-{}",
            std::process::id()
        ));
        fs::write(&stale, "half written").unwrap();

        let (querier, executor) = host(dir.path(), StaticPackages::default());
        let res = Resource::file(
            FileSpec::new("/etc/httpd/conf.d/openstack-dashboard").content("ServerName node1\n"),
        );
        assert_eq!(
            executor.apply(&res, &ctx(Action::Create)).unwrap(),
            ApplyResult::Created
        );
        assert!(!stale.exists());
        assert_eq!(
            fs::read_to_string(conf_dir.join("openstack-dashboard")).unwrap(),
            "ServerName node1\n"
        );
        assert!(!should_run(&res, &querier.current_state(&res).unwrap()));
    }

    #[test]
    fn test_unknown_owner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (_, executor) = host(dir.path(), StaticPackages::default());
        let res = Resource::file(
            FileSpec::new("/etc/motd")
                .content("hi")
                .owner("no-such-user-convergent"),
        );
        let err = executor.apply(&res, &ctx(Action::Create)).unwrap_err();
        assert!(format!("{err:#}").contains("Unknown user"));
        assert!(!dir.path().join("etc/motd").exists());
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (_, executor) = host(dir.path(), StaticPackages::default());
        let conf = dir.path().join("etc/httpd/conf.d/openstack-dashboard.conf");
        fs::create_dir_all(conf.parent().unwrap()).unwrap();
        fs::write(&conf, "Alias /dashboard").unwrap();

        let res = Resource::delete("/etc/httpd/conf.d/openstack-dashboard.conf");
        assert_eq!(
            executor.apply(&res, &ctx(Action::Delete)).unwrap(),
            ApplyResult::Removed
        );
        assert!(!conf.exists());

        let dir_res = Resource::delete("/etc/httpd");
        assert!(executor.apply(&dir_res, &ctx(Action::Delete)).is_err());
    }

    #[test]
    fn test_command_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let (_, executor) = host(dir.path(), StaticPackages::default());

        let ok = Resource::command(CommandSpec::new("touch", "touch marker").cwd(dir.path()));
        assert_eq!(
            executor.apply(&ok, &ctx(Action::Run)).unwrap(),
            ApplyResult::Modified
        );
        assert!(dir.path().join("marker").exists());

        let failing = Resource::command(CommandSpec::new("fail", "echo denied >&2; exit 2"));
        let err = executor.apply(&failing, &ctx(Action::Run)).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("exited with 2"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_package_actions_go_through_manager() {
        let dir = tempfile::tempdir().unwrap();
        let packages = StaticPackages::default().with_installed("MySQL-python", "1.2.3-0.3");
        let changes = packages.changes();
        let (_, executor) = host(dir.path(), packages);

        let install = Resource::package(PackageSpec::new("openstack-dashboard"));
        assert_eq!(
            executor.apply(&install, &ctx(Action::Install)).unwrap(),
            ApplyResult::Created
        );
        let upgrade = Resource::package(PackageSpec::new("MySQL-python"));
        assert_eq!(
            executor.apply(&upgrade, &ctx(Action::Upgrade)).unwrap(),
            ApplyResult::Modified
        );

        assert_eq!(
            changes.lock().unwrap().clone(),
            vec![
                "install openstack-dashboard".to_string(),
                "upgrade MySQL-python".to_string(),
            ]
        );
    }

    #[test]
    fn test_older_exact_version_is_downgraded() {
        let dir = tempfile::tempdir().unwrap();
        let packages = StaticPackages::default()
            .with_installed("openstack-dashboard", "2014.1.3-1")
            .without_install_downgrades();
        let changes = packages.changes();
        let (querier, executor) = host(dir.path(), packages);

        let pinned =
            Resource::package(PackageSpec::new("openstack-dashboard").version("2014.1.1-1"));
        assert!(should_run(&pinned, &querier.current_state(&pinned).unwrap()));
        assert_eq!(
            executor.apply(&pinned, &ctx(Action::Install)).unwrap(),
            ApplyResult::Modified
        );
        assert!(!should_run(&pinned, &querier.current_state(&pinned).unwrap()));
        assert_eq!(
            changes.lock().unwrap().clone(),
            vec![
                "install openstack-dashboard".to_string(),
                "downgrade openstack-dashboard".to_string(),
            ]
        );
    }

    #[test]
    fn test_mismatched_action_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_, executor) = host(dir.path(), StaticPackages::default());
        let res = Resource::delete("/etc/motd");
        assert!(executor.apply(&res, &ctx(Action::Run)).is_err());
    }
}
