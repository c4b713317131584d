//! `tnm ls`: list trees and counts tables of output files.

use anyhow::{Context, Result};
use std::path::Path;

use tnm_io::{InputStream, read_counts};

pub fn cmd_ls(path: &Path, tree: &str, json: bool) -> Result<()> {
    let counts = read_counts(path).ok();

    if json {
        let counts = counts.with_context(|| format!("{} has no counts table", path.display()))?;
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("file: {}", path.display());
    match InputStream::open(&[path], tree) {
        Ok(stream) => print!("{}", stream.ls()),
        Err(e) if counts.is_none() => {
            return Err(e).with_context(|| format!("failed to list {}", path.display()));
        }
        Err(e) => tracing::debug!("no tree '{tree}': {e}"),
    }
    if let Some(counts) = counts {
        println!();
        println!("counts:");
        for line in counts.table().lines() {
            println!("  {line}");
        }
    }
    Ok(())
}
