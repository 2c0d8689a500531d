//! `jobwave waves`: show how a plan would be partitioned.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

use jobwave_core::graph::partition_into_waves;
use jobwave_infra::plan::load_plan;

use super::Output;
use super::render::print_waves;

/// Partition the plan at `plan_path` and print its waves.
pub async fn show_waves(plan_path: &Path, output: Output) -> Result<()> {
    let plan = load_plan(plan_path)
        .await
        .with_context(|| format!("loading plan {}", plan_path.display()))?;
    let satisfied: HashSet<String> = plan.satisfied_externally.into_iter().collect();
    let waves = partition_into_waves(&plan.jobs, &satisfied)?;
    print_waves(&waves, output)
}
