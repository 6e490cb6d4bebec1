//! Attribute-driven file templates (Handlebars)
//!
//! Templates ship inside the binary. Rendering runs in strict mode, so a
//! template that references an attribute missing from its context fails
//! instead of writing an empty value into a config file.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Embedded templates, by name
const TEMPLATES: &[(&str, &str)] = &[
    (
        "local_settings",
        include_str!("../templates/local_settings.hbs"),
    ),
    ("dash-site", include_str!("../templates/dash-site.hbs")),
];

/// Renders embedded templates against a JSON context
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Config files, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars.register_helper("py_bool", Box::new(py_bool_helper));
        handlebars.register_helper("py_list", Box::new(py_list_helper));
        handlebars.register_helper("py_str", Box::new(py_str_helper));

        for (name, source) in TEMPLATES {
            handlebars
                .register_template_string(name, *source)
                .with_context(|| format!("Invalid embedded template: {name}"))?;
        }

        Ok(Self { handlebars })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    pub fn render(&self, name: &str, context: &Value) -> Result<String> {
        self.handlebars
            .render(name, context)
            .with_context(|| format!("Failed to render template '{name}'"))
    }

    /// Render a template file that is not embedded (manifest templates)
    pub fn render_file(&self, path: &Path, context: &Value) -> Result<String> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Could not read template: {}", path.display()))?;
        self.handlebars
            .render_template(&source, context)
            .with_context(|| format!("Failed to render template {}", path.display()))
    }
}

// Handlebars helpers

/// `{{py_bool flag}}` renders a Python boolean literal
fn py_bool_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let truthy = h.param(0).is_some_and(|v| match v.value() {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    });
    out.write(if truthy { "True" } else { "False" })?;
    Ok(())
}

/// Single-quoted Python string literal
fn py_literal(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('\'');
    for c in raw.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// `{{py_str value}}` renders a quoted Python string literal
fn py_str_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h
        .param(0)
        .ok_or_else(|| handlebars::RenderErrorReason::ParamNotFoundForIndex("py_str", 0))?;
    out.write(&py_literal(value.value()))?;
    Ok(())
}

/// `{{py_list items}}` renders a list as comma-separated Python string literals
fn py_list_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let items = match h.param(0).map(|v| v.value()) {
        Some(Value::Array(items)) => items.iter().map(py_literal).collect::<Vec<_>>().join(", "),
        Some(value @ Value::String(_)) => py_literal(value),
        _ => String::new(),
    };
    out.write(&items)?;
    Ok(())
}
