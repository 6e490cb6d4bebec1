//! Convergence driver for the CLI
//!
//! The engine wires the `declarative` crate to the terminal:
//! 1. Planning - Build the resource plan from the recipe and manifests
//! 2. Diffing - Compute current vs desired state and show it
//! 3. Executing - Converge with a progress bar and save the run record

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ApplyOptions, apply};
pub use planner::PlanSources;
