//! Package manager backends

use anyhow::{Result, bail};
use declarative::CommandOutput;

use crate::runner;

/// Package database and installer used by the host collaborators
pub trait PackageManager: Send + Sync {
    /// Installed version (`version-release`), `None` when not installed
    fn installed(&self, name: &str) -> Result<Option<String>>;

    /// Version an upgrade would install, if the repositories know one
    fn candidate(&self, name: &str) -> Option<String>;

    fn install(&self, name: &str, version: Option<&str>) -> Result<()>;
    /// Replace the installed package with an older `version`
    fn downgrade(&self, name: &str, version: &str) -> Result<()>;
    fn upgrade(&self, name: &str) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
}

/// rpm for queries, yum (or dnf) for changes
#[derive(Debug, Clone)]
pub struct Yum {
    installer: &'static str,
}

impl Yum {
    /// Prefer dnf when present
    pub fn detect() -> Self {
        let installer = if runner::command_exists("dnf") {
            "dnf"
        } else {
            "yum"
        };
        log::debug!("using {installer} for package changes");
        Self { installer }
    }

    fn change(&self, verb: &str, target: &str) -> Result<()> {
        let output = runner::run_output(self.installer, &["-y", verb, target])?;
        if !output.success {
            bail!(
                "{} {} {} exited with {}: {}",
                self.installer,
                verb,
                target,
                output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string()),
                output.stderr_str().trim()
            );
        }
        Ok(())
    }
}

impl PackageManager for Yum {
    fn installed(&self, name: &str) -> Result<Option<String>> {
        let output = runner::run_output("rpm", &["-q", "--qf", "%{VERSION}-%{RELEASE}\\n", name])?;
        parse_rpm_query(name, &output)
    }

    fn candidate(&self, name: &str) -> Option<String> {
        let queried = if self.installer == "dnf" {
            runner::run_capture(
                "dnf",
                &[
                    "repoquery",
                    "--quiet",
                    "--latest-limit",
                    "1",
                    "--qf",
                    "%{version}-%{release}",
                    name,
                ],
            )
        } else {
            runner::run_capture(
                "repoquery",
                &["--quiet", "--qf", "%{version}-%{release}", name],
            )
        };
        match queried {
            Ok(out) => out.lines().last().map(str::trim).filter(|v| !v.is_empty()).map(String::from),
            Err(e) => {
                log::debug!("no upgrade candidate for {name}: {e:#}");
                None
            }
        }
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        match version {
            Some(v) => self.change("install", &format!("{name}-{v}")),
            None => self.change("install", name),
        }
    }

    fn downgrade(&self, name: &str, version: &str) -> Result<()> {
        self.change("downgrade", &format!("{name}-{version}"))
    }

    fn upgrade(&self, name: &str) -> Result<()> {
        // yum upgrade of an absent package is a no-op, install covers both
        if self.installed(name)?.is_none() {
            return self.change("install", name);
        }
        self.change("upgrade", name)
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.change("remove", name)
    }
}

/// Interpret `rpm -q` output
///
/// rpm exits 1 with "package X is not installed" on stdout for absent
/// packages; any other failure is an error.
pub fn parse_rpm_query(name: &str, output: &CommandOutput) -> Result<Option<String>> {
    let stdout = output.stdout_str();
    if output.success {
        return Ok(stdout
            .lines()
            .next()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from));
    }
    if stdout.contains("is not installed") {
        return Ok(None);
    }
    bail!("rpm -q {name} failed: {}", output.stderr_str().trim())
}
