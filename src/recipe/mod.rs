//! Recipes - attribute-driven resource declarations
//!
//! A recipe reads a [`NodeAttributes`] snapshot and declares resources into
//! an [`ExecutionPlan`]. It never touches the host; everything it needs from
//! outside (templates, files copied verbatim) comes through [`RecipeContext`].

pub mod dashboard;

use anyhow::{Context, Result, bail};
use declarative::{ContentSource, FileSpec};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::NodeAttributes;
use crate::templates::TemplateRenderer;

/// Inputs shared by every resource a recipe declares
pub struct RecipeContext<'a> {
    pub attributes: &'a NodeAttributes,
    pub templates: &'a TemplateRenderer,
    /// Directory holding files copied verbatim (certificates, keys)
    pub files_dir: PathBuf,
}

impl RecipeContext<'_> {
    /// File whose content is rendered from an embedded template
    pub fn template(&self, path: &str, template: &str, context: &Value) -> Result<FileSpec> {
        if !self.templates.has_template(template) {
            bail!("No embedded template named '{template}'");
        }
        let content = self.templates.render(template, context)?;
        Ok(FileSpec::new(path)
            .content(content)
            .source(ContentSource::Template(template.to_string())))
    }

    /// File whose content is copied from `files_dir`
    pub fn copied(&self, path: &str, source_name: &str) -> Result<FileSpec> {
        let source = self.files_dir.join(source_name);
        let content = read_source(&source)?;
        Ok(FileSpec::new(path)
            .content(content)
            .source(ContentSource::Copied(source)))
    }
}

fn read_source(source: &Path) -> Result<Vec<u8>> {
    fs::read(source).with_context(|| format!("Could not read source file: {}", source.display()))
}
