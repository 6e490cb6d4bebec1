use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::engine::PlanSources;

#[derive(Parser)]
#[command(name = "convergent")]
#[command(version)]
#[command(about = "Converge a host to its declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make the host match the declared state
    Apply(ApplyArgs),

    /// Preview what apply would change
    Diff(TargetArgs),

    /// Show every declared resource and whether it has drifted
    Status(TargetArgs),

    /// Show the report of the last apply
    Report {
        /// Print the saved record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective node attributes
    Attributes {
        /// Only print the value at this key path (e.g. openstack.dashboard.webroot)
        key: Option<String>,

        #[command(flatten)]
        sources: AttributeArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Where node attributes come from
#[derive(Args, Clone, Debug, Default)]
pub struct AttributeArgs {
    /// Attributes file (default: ~/.config/convergent/attributes.toml when present)
    #[arg(long, value_name = "FILE")]
    pub attributes: Option<PathBuf>,

    /// Override an attribute (repeatable), e.g. --set openstack.db.dashboard.db_type=db2
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

/// Inputs shared by every command that builds a plan
#[derive(Args, Clone, Debug, Default)]
pub struct PlanArgs {
    #[command(flatten)]
    pub attributes: AttributeArgs,

    /// Extra resources to declare after the recipe (repeatable)
    #[arg(long = "manifest", value_name = "FILE")]
    pub manifests: Vec<PathBuf>,

    /// Directory holding certificate and key files (default: ~/.config/convergent/files)
    #[arg(long, value_name = "DIR")]
    pub files: Option<PathBuf>,

    /// Prefix every file path with DIR instead of writing to /
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Skip the dashboard recipe; only declare manifest resources
    #[arg(long)]
    pub no_recipe: bool,
}

impl PlanArgs {
    pub fn sources(&self) -> PlanSources {
        PlanSources {
            attributes_file: self.attributes.attributes.clone(),
            overrides: self.attributes.overrides.clone(),
            manifests: self.manifests.clone(),
            files_dir: self.files.clone(),
            recipe: !self.no_recipe,
        }
    }
}

impl AttributeArgs {
    pub fn sources(&self) -> PlanSources {
        PlanSources {
            attributes_file: self.attributes.clone(),
            overrides: self.overrides.clone(),
            ..PlanSources::default()
        }
    }
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Show what would change without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub plan: PlanArgs,
}

#[derive(Args)]
pub struct TargetArgs {
    /// Limit to a kind (package, file, command, delete) or kind.name-substring
    pub target: Option<String>,

    #[command(flatten)]
    pub plan: PlanArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from([
            "convergent",
            "apply",
            "--dry-run",
            "--set",
            "openstack.db.dashboard.db_type=db2",
            "--set",
            "openstack.dashboard.use_ssl=false",
            "--manifest",
            "extra.toml",
            "--root",
            "/tmp/stage",
        ])
        .unwrap();
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.dry_run);
        assert!(!args.yes);
        let sources = args.plan.sources();
        assert_eq!(sources.overrides.len(), 2);
        assert_eq!(sources.manifests, vec![PathBuf::from("extra.toml")]);
        assert!(sources.recipe);
        assert_eq!(args.plan.root, Some(PathBuf::from("/tmp/stage")));
    }

    #[test]
    fn test_global_verbosity_after_subcommand() {
        let cli = Cli::try_parse_from(["convergent", "status", "package", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert_eq!(args.target.as_deref(), Some("package"));
    }
}
