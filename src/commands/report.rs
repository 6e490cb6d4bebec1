//! `convergent report` - show the last saved run

use anyhow::Result;

use crate::Context;
use crate::engine::differ::display_report;
use crate::state::RunRecord;
use crate::ui;

pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let Some(record) = RunRecord::load()? else {
        ui::info("No run recorded yet. Run `convergent apply` first.");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    if !ctx.quiet {
        ui::kv("host", &record.host);
        if let Some(root) = &record.root {
            ui::kv("root", &root.display().to_string());
        }
        ui::kv("saved", &record.saved_at.to_rfc3339());
    }
    display_report(&record.report);
    Ok(())
}
