//! TOML resource manifests
//!
//! A manifest declares extra resources next to the recipe:
//!
//! ```toml
//! [[resource]]
//! type = "file"
//! path = "/etc/motd"
//! content = "managed host\n"
//! mode = "0644"
//! owner = "root"
//! notifies = [{ target = "command[reload-motd]", timing = "immediate" }]
//!
//! [[resource]]
//! type = "command"
//! name = "reload-motd"
//! command = "systemctl reload motd"
//! action = "nothing"
//! ```
//!
//! Entries go through [`ExecutionPlan::declare`], so duplicates and invalid
//! attributes fail the same way they do for recipe resources. Fields that
//! do not belong to an entry's `type` are rejected.

use anyhow::{Context, Result, bail};
use declarative::{
    Action, CommandSpec, ContentSource, ExecutionPlan, FileSpec, PackageSpec, Resource,
    ResourceId, ResourceKind, Timing,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::templates::TemplateRenderer;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, rename = "resource")]
    pub resources: Vec<ManifestResource>,
}

/// One `[[resource]]` table, before per-kind checks
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub action: Option<Action>,
    #[serde(default)]
    pub ignore_failure: bool,
    #[serde(default)]
    pub notifies: Vec<ManifestNotify>,

    // package
    pub version: Option<String>,

    // file
    pub content: Option<String>,
    pub template: Option<PathBuf>,
    pub source: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub owner: Option<String>,
    pub group: Option<String>,

    // command
    pub command: Option<String>,
    pub not_if: Option<String>,
    pub only_if: Option<String>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestNotify {
    /// `kind[name]`
    pub target: String,
    #[serde(default)]
    pub timing: Timing,
}

/// Permission bits, as a TOML integer (`0o644`) or an octal string (`"0644"`)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Mode {
    Bits(u32),
    Octal(String),
}

impl Mode {
    fn bits(&self) -> Result<u32> {
        match self {
            Self::Bits(bits) => Ok(*bits),
            Self::Octal(s) => {
                let digits = s.trim_start_matches("0o");
                u32::from_str_radix(digits, 8).with_context(|| format!("Invalid octal mode '{s}'"))
            }
        }
    }
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid manifest")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("In manifest {}", path.display()))
    }
}

/// Resolves manifest-relative sources and renders templates
pub struct ManifestLoader<'a> {
    /// Directory `source` and `template` paths are relative to
    pub base_dir: PathBuf,
    pub templates: &'a TemplateRenderer,
    /// Context passed to templates referenced by manifest files
    pub template_context: &'a serde_json::Value,
}

impl ManifestLoader<'_> {
    /// Declare every manifest entry into `plan`, in file order
    pub fn declare_all(&self, manifest: &Manifest, plan: &mut ExecutionPlan) -> Result<usize> {
        for (index, entry) in manifest.resources.iter().enumerate() {
            let resource = self
                .to_resource(entry)
                .with_context(|| format!("resource #{} ({})", index + 1, entry.kind))?;
            log::debug!("manifest declares {}", resource.id());
            plan.declare(resource)?;
        }
        Ok(manifest.resources.len())
    }

    fn to_resource(&self, entry: &ManifestResource) -> Result<Resource> {
        let kind: ResourceKind = entry.kind.parse().map_err(anyhow::Error::msg)?;
        let mut resource = match kind {
            ResourceKind::Package => package(entry)?,
            ResourceKind::File => self.file(entry)?,
            ResourceKind::Command => command(entry)?,
            ResourceKind::Delete => {
                reject(kind, &[("name", entry.name.is_some())])?;
                reject_file_fields(entry, kind)?;
                reject_command_fields(entry, kind)?;
                reject(kind, &[("version", entry.version.is_some())])?;
                Resource::delete(required(entry.path.clone(), "path")?)
            }
        };

        if let Some(action) = entry.action {
            resource = resource.with_action(action);
        }
        if entry.ignore_failure {
            resource = resource.ignore_failure();
        }
        for notify in &entry.notifies {
            let target: ResourceId = notify.target.parse().map_err(anyhow::Error::msg)?;
            resource = resource.notifies(target, notify.timing);
        }
        Ok(resource)
    }

    fn file(&self, entry: &ManifestResource) -> Result<Resource> {
        let kind = ResourceKind::File;
        reject(kind, &[("name", entry.name.is_some())])?;
        reject(kind, &[("version", entry.version.is_some())])?;
        reject_command_fields(entry, kind)?;

        let path = required(entry.path.clone(), "path")?;
        let mut spec = match (&entry.content, &entry.template, &entry.source) {
            (Some(content), None, None) => FileSpec::new(path).content(content.clone()),
            (None, Some(template), None) => {
                let template = self.base_dir.join(template);
                FileSpec::new(path)
                    .content(self.templates.render_file(&template, self.template_context)?)
                    .source(ContentSource::Template(template.display().to_string()))
            }
            (None, None, Some(source)) => {
                let source = self.base_dir.join(source);
                let content = fs::read(&source)
                    .with_context(|| format!("Could not read source file: {}", source.display()))?;
                FileSpec::new(path)
                    .content(content)
                    .source(ContentSource::Copied(source))
            }
            (None, None, None) => FileSpec::new(path),
            _ => bail!("file takes only one of `content`, `template`, `source`"),
        };

        if let Some(mode) = &entry.mode {
            spec = spec.mode(mode.bits()?);
        }
        if let Some(owner) = &entry.owner {
            spec = spec.owner(owner.clone());
        }
        if let Some(group) = &entry.group {
            spec = spec.group(group.clone());
        }
        Ok(Resource::file(spec))
    }
}

fn package(entry: &ManifestResource) -> Result<Resource> {
    let kind = ResourceKind::Package;
    reject(kind, &[("path", entry.path.is_some())])?;
    reject_file_fields(entry, kind)?;
    reject_command_fields(entry, kind)?;

    let mut spec = PackageSpec::new(required(entry.name.clone(), "name")?);
    match entry.version.as_deref() {
        None | Some("any") => Ok(Resource::package(spec)),
        // Follow the repository candidate
        Some("latest") => match entry.action {
            None | Some(Action::Upgrade) => {
                Ok(Resource::package(spec).with_action(Action::Upgrade))
            }
            Some(other) => bail!("version \"latest\" requires action upgrade, not {other}"),
        },
        Some(exact) => {
            spec = spec.version(exact);
            Ok(Resource::package(spec))
        }
    }
}

fn command(entry: &ManifestResource) -> Result<Resource> {
    let kind = ResourceKind::Command;
    reject(kind, &[("path", entry.path.is_some())])?;
    reject(kind, &[("version", entry.version.is_some())])?;
    reject_file_fields(entry, kind)?;

    let mut spec = CommandSpec::new(
        required(entry.name.clone(), "name")?,
        required(entry.command.clone(), "command")?,
    );
    spec = match (&entry.not_if, &entry.only_if) {
        (Some(_), Some(_)) => bail!("command takes either `not_if` or `only_if`, not both"),
        (Some(guard), None) => spec.not_if(guard.clone()),
        (None, Some(guard)) => spec.only_if(guard.clone()),
        (None, None) => spec,
    };
    if let Some(cwd) = &entry.cwd {
        spec = spec.cwd(cwd.clone());
    }
    Ok(Resource::command(spec))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.with_context(|| format!("missing required field `{field}`"))
}

fn reject(kind: ResourceKind, fields: &[(&str, bool)]) -> Result<()> {
    if let Some((field, _)) = fields.iter().find(|(_, present)| *present) {
        bail!("`{field}` is not a {kind} attribute");
    }
    Ok(())
}

fn reject_file_fields(entry: &ManifestResource, kind: ResourceKind) -> Result<()> {
    reject(
        kind,
        &[
            ("content", entry.content.is_some()),
            ("template", entry.template.is_some()),
            ("source", entry.source.is_some()),
            ("mode", entry.mode.is_some()),
            ("owner", entry.owner.is_some()),
            ("group", entry.group.is_some()),
        ],
    )
}

fn reject_command_fields(entry: &ManifestResource, kind: ResourceKind) -> Result<()> {
    reject(
        kind,
        &[
            ("command", entry.command.is_some()),
            ("not_if", entry.not_if.is_some()),
            ("only_if", entry.only_if.is_some()),
            ("cwd", entry.cwd.is_some()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Error, ResourceSpec};
    use serde_json::json;

    fn declare(toml: &str, base_dir: &Path) -> Result<ExecutionPlan> {
        let templates = TemplateRenderer::new()?;
        let context = json!({});
        let loader = ManifestLoader {
            base_dir: base_dir.to_path_buf(),
            templates: &templates,
            template_context: &context,
        };
        let mut plan = ExecutionPlan::new();
        loader.declare_all(&Manifest::parse(toml)?, &mut plan)?;
        Ok(plan)
    }

    #[test]
    fn test_declares_all_kinds_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("banner.txt"), "hello").unwrap();

        let plan = declare(
            r#"
            [[resource]]
            type = "package"
            name = "httpd"

            [[resource]]
            type = "file"
            path = "/etc/motd"
            source = "banner.txt"
            mode = 0o640
            owner = "root"
            group = "root"
            notifies = [{ target = "command[restart-httpd]" }]

            [[resource]]
            type = "delete"
            path = "/etc/httpd/conf.d/welcome.conf"

            [[resource]]
            type = "execute"
            name = "restart-httpd"
            command = "/sbin/service httpd restart"
            action = "nothing"
            "#,
            dir.path(),
        )
        .unwrap();

        let ids: Vec<String> = plan.resources().iter().map(|r| r.id().to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "package[httpd]",
                "file[/etc/motd]",
                "delete[/etc/httpd/conf.d/welcome.conf]",
                "command[restart-httpd]",
            ]
        );
        plan.validate().unwrap();

        let ResourceSpec::File(motd) = &plan.resources()[1].spec else {
            panic!("expected a file");
        };
        assert_eq!(motd.mode, Some(0o640));
        assert_eq!(motd.content_str(), Some("hello"));
        assert_eq!(
            plan.notifications()[0].timing,
            Timing::Deferred,
            "timing defaults to deferred"
        );
        assert_eq!(plan.resources()[3].action, Action::Nothing);
    }

    #[test]
    fn test_template_renders_against_context() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("issue.hbs"), "{{node.fqdn}}\n").unwrap();

        let templates = TemplateRenderer::new().unwrap();
        let context = json!({ "node": { "fqdn": "node1.example.com" } });
        let loader = ManifestLoader {
            base_dir: dir.path().to_path_buf(),
            templates: &templates,
            template_context: &context,
        };
        let manifest = Manifest::parse(
            "[[resource]]\ntype = \"file\"\npath = \"/etc/issue\"\ntemplate = \"issue.hbs\"\n",
        )
        .unwrap();
        let mut plan = ExecutionPlan::new();
        assert_eq!(loader.declare_all(&manifest, &mut plan).unwrap(), 1);

        let ResourceSpec::File(spec) = &plan.resources()[0].spec else {
            panic!("expected a file");
        };
        assert_eq!(spec.content_str(), Some("node1.example.com\n"));
        assert!(matches!(spec.source, ContentSource::Template(_)));
    }

    #[test]
    fn test_octal_string_mode() {
        let plan = declare(
            r#"
            [[resource]]
            type = "file"
            path = "/etc/pki/tls/private/horizon.key"
            content = "key"
            mode = "0640"
            "#,
            Path::new("/"),
        )
        .unwrap();
        let ResourceSpec::File(spec) = &plan.resources()[0].spec else {
            panic!("expected a file");
        };
        assert_eq!(spec.mode, Some(0o640));
    }

    #[test]
    fn test_latest_version_upgrades() {
        let plan = declare(
            r#"
            [[resource]]
            type = "package"
            name = "openstack-dashboard"
            version = "latest"

            [[resource]]
            type = "package"
            name = "MySQL-python"
            version = "1.2.3"
            "#,
            Path::new("/"),
        )
        .unwrap();
        assert_eq!(plan.resources()[0].action, Action::Upgrade);
        let ResourceSpec::Package(pinned) = &plan.resources()[1].spec else {
            panic!("expected a package");
        };
        assert_eq!(pinned.version.as_deref(), Some("1.2.3"));
        assert_eq!(plan.resources()[1].action, Action::Install);
    }

    #[test]
    fn test_guards() {
        let plan = declare(
            r#"
            [[resource]]
            type = "command"
            name = "set-selinux-permissive"
            command = "/sbin/setenforce Permissive"
            only_if = "[ \"$(getenforce)\" = Enforcing ]"
            "#,
            Path::new("/"),
        )
        .unwrap();
        let ResourceSpec::Command(spec) = &plan.resources()[0].spec else {
            panic!("expected a command");
        };
        assert!(spec.guard.is_some());

        let both = declare(
            r#"
            [[resource]]
            type = "command"
            name = "x"
            command = "true"
            not_if = "true"
            only_if = "false"
            "#,
            Path::new("/"),
        );
        assert!(both.is_err());
    }

    #[test]
    fn test_rejects_fields_of_other_kinds() {
        let err = declare(
            r#"
            [[resource]]
            type = "package"
            name = "httpd"
            mode = "0644"
            "#,
            Path::new("/"),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("`mode` is not a package attribute"));
    }

    #[test]
    fn test_rejects_unknown_fields_and_kinds() {
        assert!(Manifest::parse("[[resource]]\ntype = \"file\"\npth = \"/x\"\n").is_err());
        assert!(declare("[[resource]]\ntype = \"service\"\nname = \"httpd\"\n", Path::new("/")).is_err());
    }

    #[test]
    fn test_duplicate_surfaces_engine_error() {
        let err = declare(
            r#"
            [[resource]]
            type = "package"
            name = "httpd"

            [[resource]]
            type = "package"
            name = "httpd"
            "#,
            Path::new("/"),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_invalid_attribute_surfaces_engine_error() {
        let err = declare(
            r#"
            [[resource]]
            type = "file"
            path = "etc/motd"
            "#,
            Path::new("/"),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidAttribute { attribute: "path", .. })
        ));
    }

    #[test]
    fn test_bad_notify_target() {
        let err = declare(
            r#"
            [[resource]]
            type = "delete"
            path = "/tmp/x"
            notifies = [{ target = "restart-httpd" }]
            "#,
            Path::new("/"),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("expected kind[name]"));
    }
}
