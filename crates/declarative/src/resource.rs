//! Resource model for declarative state management
//!
//! A Resource is a typed declaration of desired state. Each kind carries
//! its own attribute schema ([`PackageSpec`], [`FileSpec`], [`CommandSpec`],
//! [`DeleteSpec`]); attributes whose values cannot be expressed in the
//! type system (permission bits, absolute paths, non-empty names) are
//! checked by [`Resource::validate`] when the resource is declared.

use crate::error::{Error, Result};
use crate::types::{Action, ResourceId, ResourceKind, Timing};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Highest valid permission bits (setuid, setgid, sticky, rwx for all)
pub const MAX_MODE: u32 = 0o7777;

/// Desired state of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    /// Exact version to install; `None` accepts any installed version
    pub version: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Where a file's content came from, kept for reporting
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    #[default]
    Inline,
    /// Rendered from a named template
    Template(String),
    /// Copied from a source file
    Copied(PathBuf),
}

/// Desired state of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub source: ContentSource,
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl FileSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: Vec::new(),
            source: ContentSource::Inline,
            mode: None,
            owner: None,
            group: None,
        }
    }

    pub fn content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn source(mut self, source: ContentSource) -> Self {
        self.source = source;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// BLAKE3 hex digest of the desired content
    pub fn content_hash(&self) -> String {
        blake3::hash(&self.content).to_hex().to_string()
    }

    /// Content as text, if it is valid UTF-8
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// Guard deciding whether a command is already satisfied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    /// Satisfied when the command exits 0
    NotIf(String),
    /// Satisfied when the command exits non-zero
    OnlyIf(String),
}

impl Guard {
    pub fn command(&self) -> &str {
        match self {
            Self::NotIf(cmd) | Self::OnlyIf(cmd) => cmd,
        }
    }

    /// Map a guard command's exit status to "already satisfied"
    pub fn satisfied_by(&self, exit_success: bool) -> bool {
        match self {
            Self::NotIf(_) => exit_success,
            Self::OnlyIf(_) => !exit_success,
        }
    }
}

/// Desired execution of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub command: String,
    pub guard: Option<Guard>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            guard: None,
            cwd: None,
        }
    }

    pub fn not_if(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(Guard::NotIf(guard.into()));
        self
    }

    pub fn only_if(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(Guard::OnlyIf(guard.into()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// A path that must not exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSpec {
    pub path: PathBuf,
}

/// Per-kind attribute schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceSpec {
    Package(PackageSpec),
    File(FileSpec),
    Command(CommandSpec),
    Delete(DeleteSpec),
}

/// An outgoing notification declared on a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notify {
    pub target: ResourceId,
    pub timing: Timing,
}

/// A declared unit of desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub spec: ResourceSpec,
    pub action: Action,
    /// Record failures and keep going instead of aborting the run
    pub ignore_failure: bool,
    pub notifies: Vec<Notify>,
}

impl Resource {
    fn with_spec(spec: ResourceSpec, action: Action) -> Self {
        Self {
            spec,
            action,
            ignore_failure: false,
            notifies: Vec::new(),
        }
    }

    pub fn package(spec: PackageSpec) -> Self {
        Self::with_spec(ResourceSpec::Package(spec), Action::Install)
    }

    pub fn file(spec: FileSpec) -> Self {
        Self::with_spec(ResourceSpec::File(spec), Action::Create)
    }

    pub fn command(spec: CommandSpec) -> Self {
        Self::with_spec(ResourceSpec::Command(spec), Action::Run)
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self::with_spec(
            ResourceSpec::Delete(DeleteSpec { path: path.into() }),
            Action::Delete,
        )
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Only run when notified
    pub fn nothing(self) -> Self {
        self.with_action(Action::Nothing)
    }

    pub fn ignore_failure(mut self) -> Self {
        self.ignore_failure = true;
        self
    }

    pub fn notifies(mut self, target: ResourceId, timing: Timing) -> Self {
        self.notifies.push(Notify { target, timing });
        self
    }

    pub fn kind(&self) -> ResourceKind {
        match &self.spec {
            ResourceSpec::Package(_) => ResourceKind::Package,
            ResourceSpec::File(_) => ResourceKind::File,
            ResourceSpec::Command(_) => ResourceKind::Command,
            ResourceSpec::Delete(_) => ResourceKind::Delete,
        }
    }

    /// Name unique within the resource's kind
    ///
    /// Packages and commands use their name, files and deletions their path.
    pub fn name(&self) -> String {
        match &self.spec {
            ResourceSpec::Package(p) => p.name.clone(),
            ResourceSpec::File(f) => f.path.to_string_lossy().to_string(),
            ResourceSpec::Command(c) => c.name.clone(),
            ResourceSpec::Delete(d) => d.path.to_string_lossy().to_string(),
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.name())
    }

    /// Action to run when this resource is notified
    pub fn notified_action(&self) -> Action {
        match self.action {
            Action::Nothing => self.kind().default_action(),
            action => action,
        }
    }

    /// Human-readable description of what this resource does
    pub fn description(&self) -> String {
        match &self.spec {
            ResourceSpec::Package(p) => match (self.action, &p.version) {
                (Action::Upgrade, _) => format!("Upgrade package {}", p.name),
                (Action::Remove, _) => format!("Remove package {}", p.name),
                (_, Some(v)) => format!("Install package {} ({})", p.name, v),
                (_, None) => format!("Install package {}", p.name),
            },
            ResourceSpec::File(f) => {
                let mut desc = format!("Write {}", f.path.display());
                if let Some(mode) = f.mode {
                    desc.push_str(&format!(" mode {mode:04o}"));
                }
                if f.owner.is_some() || f.group.is_some() {
                    desc.push_str(&format!(
                        " owned by {}:{}",
                        f.owner.as_deref().unwrap_or("-"),
                        f.group.as_deref().unwrap_or("-")
                    ));
                }
                desc
            }
            ResourceSpec::Command(c) => format!("Run `{}`", c.command),
            ResourceSpec::Delete(d) => format!("Delete {}", d.path.display()),
        }
    }

    /// Validate attributes against this kind's schema
    pub fn validate(&self) -> Result<()> {
        let id = self.id();
        let invalid = |attribute: &'static str, message: String| Error::InvalidAttribute {
            resource: id.clone(),
            attribute,
            message,
        };

        if !self.kind().allowed_actions().contains(&self.action) {
            return Err(invalid(
                "action",
                format!("`{}` is not a {} action", self.action, self.kind()),
            ));
        }

        match &self.spec {
            ResourceSpec::Package(p) => {
                check_name(&p.name).map_err(|m| invalid("name", m))?;
                if let Some(version) = &p.version {
                    if version.trim().is_empty() {
                        return Err(invalid("version", "version must not be empty".into()));
                    }
                    match self.action {
                        Action::Upgrade => {
                            return Err(invalid(
                                "version",
                                "upgrade follows the repository candidate; pin versions with install"
                                    .into(),
                            ));
                        }
                        Action::Remove => {
                            return Err(invalid(
                                "version",
                                "remove does not take a version".into(),
                            ));
                        }
                        _ => {}
                    }
                }
            }
            ResourceSpec::File(f) => {
                if !f.path.is_absolute() {
                    return Err(invalid(
                        "path",
                        format!("{} is not an absolute path", f.path.display()),
                    ));
                }
                if let Some(mode) = f.mode
                    && mode > MAX_MODE
                {
                    return Err(invalid(
                        "mode",
                        format!("{mode:o} is not a valid permission mode"),
                    ));
                }
                if let Some(owner) = &f.owner {
                    check_account(owner).map_err(|m| invalid("owner", m))?;
                }
                if let Some(group) = &f.group {
                    check_account(group).map_err(|m| invalid("group", m))?;
                }
            }
            ResourceSpec::Command(c) => {
                check_name(&c.name).map_err(|m| invalid("name", m))?;
                if c.command.trim().is_empty() {
                    return Err(invalid("command", "command must not be empty".into()));
                }
                if let Some(guard) = &c.guard
                    && guard.command().trim().is_empty()
                {
                    return Err(invalid("guard", "guard command must not be empty".into()));
                }
                if let Some(cwd) = &c.cwd
                    && !cwd.is_absolute()
                {
                    return Err(invalid(
                        "cwd",
                        format!("{} is not an absolute path", cwd.display()),
                    ));
                }
            }
            ResourceSpec::Delete(d) => {
                if !d.path.is_absolute() {
                    return Err(invalid(
                        "path",
                        format!("{} is not an absolute path", d.path.display()),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn check_name(name: &str) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".into());
    }
    if name.chars().any(char::is_control) {
        return Err("name must not contain control characters".into());
    }
    Ok(())
}

fn check_account(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("account name must not be empty".into());
    }
    if name.chars().any(|c| c == ':' || c.is_whitespace() || c.is_control()) {
        return Err(format!("'{name}' is not a valid account name"));
    }
    Ok(())
}
