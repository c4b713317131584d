//! `tnm analyze`: loop over a file list, select objects, count and skim.

use anyhow::{Context, Result};
use std::path::PathBuf;

use tnm_core::text::file_names;
use tnm_core::{CommandLine, EventBuffer, EventSource};
use tnm_io::{InputStream, OutputFile};

use crate::config::{SkimConfig, read_skim_config};

pub struct AnalyzeArgs {
    pub filelist: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub tree: Option<String>,
    pub skim: bool,
    pub save_count: Option<usize>,
    pub max_events: Option<usize>,
}

fn event_weight(buffer: &EventBuffer, cfg: &SkimConfig) -> Result<f64> {
    let Some(name) = &cfg.weight_column else {
        return Ok(cfg.weight_scale);
    };
    let w = buffer
        .column(name)
        .and_then(|c| c.get_f64(0))
        .with_context(|| format!("weight column '{name}' has no value"))?;
    Ok(w * cfg.weight_scale)
}

pub fn cmd_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut cfg = match &args.config {
        Some(path) => read_skim_config(path)?,
        None => SkimConfig::default(),
    };
    if let Some(tree) = args.tree {
        cfg.tree = tree;
    }
    if let Some(n) = args.save_count {
        cfg.save_count = n;
    }
    if args.max_events.is_some() {
        cfg.max_events = args.max_events;
    }
    cfg.skim |= args.skim;

    let cl = CommandLine::new("analyze", args.filelist, args.output);
    let files = file_names(&cl.filelist)?;
    tracing::info!("reading {} file(s) listed in {}", files.len(), cl.filelist.display());

    let mut stream = InputStream::open(&files, &cfg.tree)
        .with_context(|| format!("failed to open tree '{}'", cfg.tree))?;
    let mut buffer = stream.buffer();

    if let Some(name) = &cfg.weight_column {
        let is_scalar = buffer.schema().field(name).is_some_and(|f| !f.is_array());
        if !is_scalar {
            anyhow::bail!("weight column '{name}' is not a scalar field of tree '{}'", cfg.tree);
        }
    }
    let selection = cfg.selection();
    selection.validate(&buffer)?;

    let mut out = if cfg.skim {
        OutputFile::skim(&cl.output, &buffer, &cfg.tree, cfg.save_count)?
    } else {
        OutputFile::create(&cl.output)?
    };

    let n = cfg.max_events.map_or(stream.len(), |max| max.min(stream.len()));
    tracing::info!("number of events to read: {n}");
    for entry in 0..n {
        if entry > 0 && entry % 10_000 == 0 {
            tracing::info!("processed {entry} events");
        }
        buffer.read(&mut stream, entry)?;
        let weight = event_weight(&buffer, &cfg)?;
        out.count("all", weight);
        if !selection.apply(&mut buffer, out.counts_mut(), weight)? {
            continue;
        }
        out.write(&mut buffer, weight)?;
    }

    let summary = out.close()?;
    print!("{summary}");
    Ok(())
}
