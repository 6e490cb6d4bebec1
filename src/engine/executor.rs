//! Convergence with terminal UI: diff preview, confirmation, progress bar

use anyhow::Result;
use colored::Colorize;
use declarative::{
    ActionExecutor, EntryStatus, ExecuteOptions, ExecutionPlan, ProgressCallback, ResourceId,
    RunAborted, RunReport, StateQuerier, compute_diffs, execute,
};
use indicatif::ProgressBar;

use super::differ::display_diff;
use crate::progress;
use crate::ui;

/// Options for `apply`
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Evaluate everything, change nothing
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Print a line per processed resource and command output
    pub verbose: bool,
    /// Machine-readable output: no diff, no progress bar
    pub json: bool,
}

/// How an apply ended
#[derive(Debug)]
pub enum Applied {
    /// The user declined at the confirmation prompt
    Declined,
    /// The run finished; the report is sealed
    Finished(RunReport),
    /// The run stopped on a fatal failure; the partial report is sealed
    Aborted(RunAborted),
}

/// Progress bar fed by engine events
struct BarProgress {
    pb: ProgressBar,
    verbose: bool,
}

impl ProgressCallback for BarProgress {
    fn on_run_start(&mut self, total: usize) {
        self.pb.set_length(total as u64);
    }

    fn on_resource_start(&mut self, _id: &ResourceId, description: &str) {
        self.pb.set_message(ui::truncate_path(description, 50));
    }

    fn on_resource_complete(&mut self, id: &ResourceId, status: &EntryStatus) {
        // Notified runs come on top of the declared resources
        if self.pb.position() >= self.pb.length().unwrap_or(0) {
            self.pb.inc_length(1);
        }
        self.pb.inc(1);

        let show = self.verbose || matches!(status, EntryStatus::Failed { .. }) || status.is_change();
        if show {
            self.pb.println(format!("  {} {}", status.symbol(), id));
        }
    }

    fn on_run_complete(&mut self) {
        self.pb.finish_and_clear();
    }
}

/// Preview, confirm, and converge `plan`
pub fn apply<Q, E>(plan: &ExecutionPlan, opts: &ApplyOptions, querier: &Q, executor: &E) -> Result<Applied>
where
    Q: StateQuerier + ?Sized,
    E: ActionExecutor + ?Sized,
{
    // 1. Compute diffs for all resources
    let spinner = if opts.json {
        progress::hidden()
    } else {
        progress::spinner("Querying host state...")
    };
    let resources: Vec<_> = plan.resources().iter().collect();
    let diffs = compute_diffs(&resources, querier);
    spinner.finish_and_clear();
    let diffs = diffs?;

    // 2. Display what will change
    if !opts.json {
        display_diff(&diffs);
    }

    // 3. Confirm (unless --yes or a dry run)
    if !diffs.is_empty() && !opts.yes && !opts.dry_run && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(Applied::Declined);
    }

    // 4. Converge
    if !opts.json {
        println!();
        println!(
            "  {} Converging {} resources...",
            "→".cyan(),
            plan.len()
        );
    }
    let mut bar = BarProgress {
        pb: if opts.json {
            progress::hidden()
        } else {
            progress::bar(plan.len() as u64)
        },
        verbose: opts.verbose,
    };
    let engine_opts = ExecuteOptions {
        dry_run: opts.dry_run,
        verbose: opts.verbose,
    };

    match execute(plan, &engine_opts, querier, executor, &mut bar) {
        Ok(report) => Ok(Applied::Finished(report)),
        Err(aborted) => Ok(Applied::Aborted(aborted)),
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
