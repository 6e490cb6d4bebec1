//! `convergent attributes` - print the effective node attributes

use anyhow::{Result, bail};

use crate::cli::AttributeArgs;

pub fn run(key: Option<&str>, args: &AttributeArgs) -> Result<()> {
    let attributes = args.sources().attributes()?;

    let value = match key {
        Some(key) => match attributes.get(key) {
            Some(value) => value,
            None => bail!("No attribute at '{key}'"),
        },
        None => attributes.as_value(),
    };

    match value {
        serde_json::Value::String(s) => println!("{s}"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}
