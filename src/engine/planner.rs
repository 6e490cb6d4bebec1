//! Execution planner - recipe plus manifests into one plan

use anyhow::{Context, Result};
use declarative::ExecutionPlan;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::config::{self, NodeAttributes};
use crate::manifest::{Manifest, ManifestLoader};
use crate::recipe::{self, RecipeContext};
use crate::templates::TemplateRenderer;

/// Where a run's attributes and resources come from
#[derive(Debug, Clone, Default)]
pub struct PlanSources {
    /// Attributes file; the default location is used when present
    pub attributes_file: Option<PathBuf>,
    /// `key.path=value` overrides, applied last
    pub overrides: Vec<String>,
    /// Manifests declared after the recipe, in order
    pub manifests: Vec<PathBuf>,
    /// Directory of files copied verbatim
    pub files_dir: Option<PathBuf>,
    /// Declare the dashboard recipe
    pub recipe: bool,
}

impl PlanSources {
    /// Resolve the node attributes snapshot for this run
    pub fn attributes(&self) -> Result<NodeAttributes> {
        NodeAttributes::resolve(
            recipe::dashboard::default_attributes(),
            self.attributes_file.as_deref(),
            &self.overrides,
        )
    }

    fn files_dir(&self) -> Result<PathBuf> {
        match &self.files_dir {
            Some(dir) => config::expand_path(dir),
            None => config::default_files_dir(),
        }
    }

    /// Build the plan: recipe resources first, then each manifest
    pub fn build(&self, attributes: &NodeAttributes) -> Result<ExecutionPlan> {
        let templates = TemplateRenderer::new()?;
        let mut plan = ExecutionPlan::new();

        if self.recipe {
            let ctx = RecipeContext {
                attributes,
                templates: &templates,
                files_dir: self.files_dir()?,
            };
            recipe::dashboard::declare(&ctx, &mut plan).context("Dashboard recipe failed")?;
        }

        let template_context = json!({ "node": attributes.as_value() });
        for path in &self.manifests {
            let path = config::expand_path(path)?;
            let manifest = Manifest::load(&path)?;
            let loader = ManifestLoader {
                base_dir: manifest_dir(&path),
                templates: &templates,
                template_context: &template_context,
            };
            let count = loader
                .declare_all(&manifest, &mut plan)
                .with_context(|| format!("In manifest {}", path.display()))?;
            log::info!("{} declared {count} resources", path.display());
        }

        plan.validate()?;
        Ok(plan)
    }
}

fn manifest_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
