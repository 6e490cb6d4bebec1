//! Diff and report display

use colored::{ColoredString, Colorize};
use declarative::{
    ChangeKind, DiffSummary, EntryStatus, Resource, ResourceDiff, RunOutcome, RunReport, Trigger,
    group_by_kind,
};
use std::collections::HashSet;

use crate::ui;

fn kind_title(kind: &str) -> &str {
    match kind {
        "package" => "Packages",
        "file" => "Files",
        "command" => "Commands",
        "delete" => "Deletions",
        other => other,
    }
}

fn change_symbol(change: ChangeKind) -> ColoredString {
    match change {
        ChangeKind::Create => "+".green(),
        ChangeKind::Update => "~".yellow(),
        ChangeKind::Remove => "-".red(),
        ChangeKind::Run => "»".cyan(),
    }
}

/// Display a list of diffs in a user-friendly format
pub fn display_diff(diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Convergence Diff".bold()
    );
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs) {
        println!("│ {}", kind_title(&kind).bold());
        for diff in kind_diffs {
            println!(
                "│   {} {:<40} {}",
                change_symbol(diff.change),
                ui::truncate_path(&diff.resource_id.name, 40),
                format!("{} → {}", diff.current, diff.desired).dimmed()
            );
            for detail in &diff.details {
                println!("│       {}", detail.dimmed());
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} create, {} update, {} remove, {} run)",
        summary.total().to_string().bold(),
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.removals.to_string().red(),
        summary.runs.to_string().cyan()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Display every selected resource with whether it is in the desired state
pub fn display_status(resources: &[&Resource], diffs: &[ResourceDiff], notified: &HashSet<String>) {
    let drifted: HashSet<String> = diffs.iter().map(|d| d.resource_id.to_string()).collect();

    ui::header("Resource Status");
    for resource in resources {
        let id = resource.id();
        let key = id.to_string();
        let (symbol, note) = if drifted.contains(&key) {
            ("~".yellow(), "drift".yellow())
        } else if resource.action == declarative::Action::Nothing {
            let note = if notified.contains(&key) {
                "on notification"
            } else {
                "never runs"
            };
            ("○".dimmed(), note.dimmed())
        } else {
            ("✓".green(), "ok".green())
        };
        println!(
            "  {} {:<10} {:<48} {}",
            symbol,
            id.kind.to_string().dimmed(),
            ui::truncate_path(&id.name, 48),
            note
        );
    }

    println!();
    if drifted.is_empty() {
        ui::success(&format!("{} resources in the desired state", resources.len()));
    } else {
        ui::warn(&format!(
            "{} of {} resources drifted; run `convergent apply`",
            drifted.len(),
            resources.len()
        ));
    }
}

fn status_text(status: &EntryStatus) -> ColoredString {
    match status {
        EntryStatus::Skipped { reason } => reason.as_str().dimmed(),
        EntryStatus::UpToDate => "up to date".dimmed(),
        EntryStatus::Applied { result } => format!("{result:?}").to_lowercase().green(),
        EntryStatus::WouldApply => "would apply".yellow(),
        EntryStatus::Failed { error } => error.as_str().red(),
    }
}

/// Display a sealed run report
pub fn display_report(report: &RunReport) {
    let title = if report.dry_run {
        "Run Report (dry run)"
    } else {
        "Run Report"
    };
    ui::header(title);
    ui::kv("started", &report.started_at.to_rfc3339());
    if let Some(finished) = report.finished_at {
        ui::kv(
            "took",
            &ui::format_elapsed(finished.signed_duration_since(report.started_at)),
        );
    }
    println!();

    for entry in report.entries() {
        let trigger = match &entry.trigger {
            Trigger::Declared => String::new(),
            Trigger::Notified { by, timing } => format!(" ({timing} from {by})"),
        };
        println!(
            "  {} {}[{}] {}{}",
            entry.status.symbol(),
            entry.kind,
            entry.name,
            status_text(&entry.status),
            trigger.dimmed()
        );
    }

    print_summary(report);
}

/// Print final summary
pub fn print_summary(report: &RunReport) {
    let summary = report.summary();
    println!();
    match &report.outcome {
        RunOutcome::Aborted { error } => {
            println!("  {} Run aborted: {}", "✗".red().bold(), error);
        }
        _ if report.dry_run => {
            println!("  {} Dry run - no changes made", "ℹ".blue());
        }
        _ if summary.is_success() => {
            println!("  {} Host converged", "✓".green().bold());
        }
        _ => {
            println!("  {} Converged with ignored failures", "⚠".yellow().bold());
        }
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.would_apply > 0 {
        println!("    • {} resources would change", summary.would_apply);
    }
    if summary.up_to_date > 0 {
        println!("    • {} resources up to date", summary.up_to_date);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
