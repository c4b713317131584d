//! `tnm hepmc2ntuple` and `tnm hepmc-filter`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use tnm_hepmc::{ConvertOptions, DecayFilter, convert_file, filter_file};

pub fn cmd_hepmc2ntuple(
    input: &Path,
    output: Option<&PathBuf>,
    opts: &ConvertOptions,
) -> Result<()> {
    let output = output.cloned().unwrap_or_else(|| tnm_hepmc::ntuple::default_output(input));
    let summary = convert_file(input, &output, opts)
        .with_context(|| format!("failed to convert {}", input.display()))?;
    println!("HepMC version: {}", summary.version);
    println!("events:        {}", summary.events);
    if summary.truncated > 0 {
        println!(
            "truncated:     {} (more than {} particles)",
            summary.truncated, opts.max_particles
        );
    }
    println!("output:        {}", summary.output.display());
    Ok(())
}

pub fn cmd_hepmc_filter(input: &Path, decays: &[String], output: Option<&PathBuf>) -> Result<()> {
    if decays.is_empty() {
        anyhow::bail!("no decays given (example: 35 15 -15, 35 6 -6)");
    }
    let filter: DecayFilter = decays.join(" ").parse()?;
    let output = output.cloned().unwrap_or_else(|| tnm_hepmc::filter::default_output(input));
    tracing::info!("filter: {filter}");

    let summary = filter_file(input, &output, &filter)
        .with_context(|| format!("failed to filter {}", input.display()))?;
    println!("{summary}");
    Ok(())
}
