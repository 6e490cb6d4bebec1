//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Output;
use std::str::FromStr;

/// Closed set of resource kinds the engine knows how to converge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A system package managed by the package manager
    Package,
    /// A file with content, mode and ownership
    File,
    /// A shell command, optionally guarded
    Command,
    /// A path that must not exist
    Delete,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::File => "file",
            Self::Command => "command",
            Self::Delete => "delete",
        }
    }

    /// Action taken when a resource declared with `nothing` gets notified
    pub fn default_action(&self) -> Action {
        match self {
            Self::Package => Action::Install,
            Self::File => Action::Create,
            Self::Command => Action::Run,
            Self::Delete => Action::Delete,
        }
    }

    /// Actions a resource of this kind may declare
    pub fn allowed_actions(&self) -> &'static [Action] {
        match self {
            Self::Package => &[
                Action::Install,
                Action::Upgrade,
                Action::Remove,
                Action::Nothing,
            ],
            Self::File => &[Action::Create, Action::Nothing],
            Self::Command => &[Action::Run, Action::Nothing],
            Self::Delete => &[Action::Delete, Action::Nothing],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "package" => Ok(Self::Package),
            "file" => Ok(Self::File),
            "command" | "execute" => Ok(Self::Command),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown resource kind '{other}'")),
        }
    }
}

/// Identity of a resource within a run: kind plus name
///
/// Displayed as `kind[name]`, e.g. `command[restore-selinux-context]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn package(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Package, name)
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::new(ResourceKind::File, path)
    }

    pub fn command(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Command, name)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(ResourceKind::Delete, path)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = String;

    /// Parse `kind[name]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, rest) = s
            .split_once('[')
            .ok_or_else(|| format!("expected kind[name], got '{s}'"))?;
        let name = rest
            .strip_suffix(']')
            .ok_or_else(|| format!("missing closing ']' in '{s}'"))?;
        if name.is_empty() {
            return Err(format!("empty resource name in '{s}'"));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

/// Action declared on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Install a package if it is not installed
    Install,
    /// Install or upgrade a package to the repository candidate
    Upgrade,
    /// Remove an installed package
    Remove,
    /// Write a file with the declared content and metadata
    Create,
    /// Delete a path
    Delete,
    /// Run a command
    Run,
    /// Do nothing unless notified
    Nothing,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Remove => "remove",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Run => "run",
            Self::Nothing => "nothing",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a notification fires relative to the notifying resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timing {
    /// Run the target right after the source changes
    Immediate,
    /// Queue the target until every declared resource has been processed
    #[default]
    Deferred,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::Deferred => f.write_str("deferred"),
        }
    }
}

/// Observed metadata of a file on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    /// BLAKE3 hex digest of the file content
    pub content_hash: String,
    /// Permission bits (`0o7777` mask)
    pub mode: u32,
    pub owner: String,
    pub group: String,
}

/// Current state of a resource as reported by a [`crate::StateQuerier`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentState {
    Package {
        /// Installed version, `None` when not installed
        installed: Option<String>,
        /// Version the package manager would upgrade to, if known
        candidate: Option<String>,
    },
    /// `None` when the file does not exist
    File(Option<FileMeta>),
    Command {
        /// Whether the guard reports "already satisfied"; `None` without a guard
        guard_satisfied: Option<bool>,
    },
    Path {
        exists: bool,
    },
}

impl CurrentState {
    /// The resource kind this state describes
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Package { .. } => ResourceKind::Package,
            Self::File(_) => ResourceKind::File,
            Self::Command { .. } => ResourceKind::Command,
            Self::Path { .. } => ResourceKind::Delete,
        }
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
}

impl ApplyResult {
    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }
}

/// Options for a convergence run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Evaluate only; never call the action executor
    pub dry_run: bool,
    /// Verbose output from executors
    pub verbose: bool,
}

/// Output from a host command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_id_display_and_parse() {
        let id = ResourceId::command("restore-selinux-context");
        assert_eq!(id.to_string(), "command[restore-selinux-context]");
        assert_eq!("command[restore-selinux-context]".parse::<ResourceId>(), Ok(id));
    }

    #[test]
    fn resource_id_accepts_execute_alias() {
        let id: ResourceId = "execute[a2dissite default]".parse().unwrap();
        assert_eq!(id, ResourceId::command("a2dissite default"));
    }

    #[test]
    fn resource_id_rejects_malformed() {
        assert!("file".parse::<ResourceId>().is_err());
        assert!("file[/etc/x".parse::<ResourceId>().is_err());
        assert!("file[]".parse::<ResourceId>().is_err());
        assert!("service[httpd]".parse::<ResourceId>().is_err());
    }

    #[test]
    fn apply_result_change_classification() {
        assert!(ApplyResult::Created.is_change());
        assert!(ApplyResult::Removed.is_change());
        assert!(!ApplyResult::NoChange.is_change());
    }
}
