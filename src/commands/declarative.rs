//! Declarative commands
//!
//! - `apply` - Make the host match the declared state
//! - `diff` - Preview what apply would change
//! - `status` - Show every declared resource and whether it drifted

use anyhow::Result;
use declarative::{ExecutionPlan, RunReport, compute_diffs};
use std::collections::HashSet;
use std::sync::Arc;

use crate::Context;
use crate::cli::PlanArgs;
use crate::engine::differ::{display_diff, display_status, print_summary};
use crate::engine::executor::Applied;
use crate::engine::{ApplyOptions, apply as converge};
use crate::host::packages::Yum;
use crate::host::{HostExecutor, HostRoot, HostStateQuerier};
use crate::progress;
use crate::state::RunRecord;
use crate::ui;

fn host(root: &HostRoot) -> (HostStateQuerier, HostExecutor) {
    let packages = Arc::new(Yum::detect());
    (
        HostStateQuerier::new(root.clone(), packages.clone()),
        HostExecutor::new(root.clone(), packages),
    )
}

fn load_plan(args: &PlanArgs) -> Result<(String, ExecutionPlan)> {
    let sources = args.sources();
    let attributes = sources.attributes()?;
    let fqdn = attributes.str("fqdn")?.to_string();
    let plan = sources.build(&attributes)?;
    log::info!("Plan for {fqdn}: {} resources", plan.len());
    Ok((fqdn, plan))
}

/// Preview changes without applying them
pub fn diff(ctx: &Context, target: Option<&str>, args: &PlanArgs) -> Result<()> {
    let (fqdn, plan) = load_plan(args)?;
    let root = HostRoot::new(args.root.clone());
    let (querier, _) = host(&root);

    if !ctx.quiet {
        ui::header(&format!("Diff for {fqdn}"));
    }
    let resources = plan.filter_by_target(target);
    let spinner = progress::spinner("Querying host state...");
    let diffs = compute_diffs(&resources, &querier);
    spinner.finish_and_clear();

    display_diff(&diffs?);
    Ok(())
}

/// Show the state of every selected resource
pub fn status(ctx: &Context, target: Option<&str>, args: &PlanArgs) -> Result<()> {
    let (fqdn, plan) = load_plan(args)?;
    let root = HostRoot::new(args.root.clone());
    let (querier, _) = host(&root);

    let resources = plan.filter_by_target(target);
    if resources.is_empty() {
        ui::warn(&format!(
            "No resources match '{}'",
            target.unwrap_or_default()
        ));
        return Ok(());
    }

    let spinner = progress::spinner("Querying host state...");
    let diffs = compute_diffs(&resources, &querier);
    spinner.finish_and_clear();
    let diffs = diffs?;

    let notified: HashSet<String> = plan
        .notifications()
        .iter()
        .map(|edge| edge.target.to_string())
        .collect();

    if !ctx.quiet {
        ui::kv("host", &fqdn);
        if let Some(prefix) = root.prefix() {
            ui::kv("root", &prefix.display().to_string());
        }
    }
    display_status(&resources, &diffs, &notified);
    Ok(())
}

/// Converge the host
pub fn apply(ctx: &Context, args: &crate::cli::ApplyArgs) -> Result<()> {
    let (fqdn, plan) = load_plan(&args.plan)?;
    let root = HostRoot::new(args.plan.root.clone());
    let (querier, executor) = host(&root);

    if !ctx.quiet && !args.json {
        ui::header(&format!("Converging {fqdn}"));
        if let Some(prefix) = root.prefix() {
            ui::kv("root", &prefix.display().to_string());
        }
    }

    let opts = ApplyOptions {
        dry_run: args.dry_run,
        yes: args.yes,
        verbose: ctx.verbose > 0,
        json: args.json,
    };

    match converge(&plan, &opts, &querier, &executor)? {
        Applied::Declined => Ok(()),
        Applied::Finished(report) => {
            finish(&fqdn, &root, report, args.json)?;
            Ok(())
        }
        Applied::Aborted(aborted) => {
            let error = aborted.error;
            finish(&fqdn, &root, aborted.report, args.json)?;
            Err(error.into())
        }
    }
}

/// Save the run record and print the outcome
fn finish(fqdn: &str, root: &HostRoot, report: RunReport, json: bool) -> Result<()> {
    let record = RunRecord::new(fqdn, root.prefix().map(std::path::Path::to_path_buf), report);
    match record.save() {
        Ok(path) => log::debug!("Run record saved to {}", path.display()),
        Err(e) => log::warn!("Could not save run record: {e:#}"),
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&record.report)?);
    } else {
        print_summary(&record.report);
    }
    Ok(())
}
