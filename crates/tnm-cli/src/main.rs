//! TNM CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tnm_hepmc::{ConvertOptions, MAX_PARTICLES};
use tnm_io::DEFAULT_SAVE_COUNT;

mod analyze;
mod config;
mod hepmc;
mod ls;

#[derive(Parser)]
#[command(name = "tnm")]
#[command(about = "TNM - flat ntuple skimming and HepMC conversion")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loop over the files of a file list, apply object selections, count and skim
    Analyze {
        /// File holding the input file names
        filelist: Option<PathBuf>,

        /// Output file (".parquet" is appended when missing)
        output: Option<PathBuf>,

        /// Skim configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input tree name (overrides the config)
        #[arg(long)]
        tree: Option<String>,

        /// Write selected events to the output file
        #[arg(long)]
        skim: bool,

        /// Entries per auto-saved row group (overrides the config)
        #[arg(long)]
        save_count: Option<usize>,

        /// Stop after this many input entries
        #[arg(long)]
        max_events: Option<usize>,
    },

    /// List the tree and counts table of a file
    Ls {
        /// Parquet file
        input: PathBuf,

        /// Tree name
        #[arg(long, default_value = "Events")]
        tree: String,

        /// Print the counts table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a HepMC2 ASCII file to a flat ntuple
    Hepmc2ntuple {
        /// HepMC2 input file
        input: PathBuf,

        /// Output file. Defaults to "<input stem>.parquet".
        output: Option<PathBuf>,

        /// Tree name
        #[arg(long, default_value = "Events")]
        tree: String,

        /// Maximum number of particles stored per event
        #[arg(long, default_value_t = MAX_PARTICLES)]
        max_particles: usize,

        /// Entries per auto-saved row group
        #[arg(long, default_value_t = DEFAULT_SAVE_COUNT)]
        save_count: usize,

        /// Stop after this many events
        #[arg(long)]
        max_events: Option<usize>,
    },

    /// Keep HepMC2 events containing the requested decays
    HepmcFilter {
        /// HepMC2 input file
        input: PathBuf,

        /// Decays, e.g. "35 15 -15, 35 6 -6" (quote groups ending in a negative ID)
        #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
        decays: Vec<String>,

        /// Output file. Defaults to "filtered_<input stem>.hepmc".
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Analyze { filelist, output, config, tree, skim, save_count, max_events } => {
            analyze::cmd_analyze(analyze::AnalyzeArgs {
                filelist,
                output,
                config,
                tree,
                skim,
                save_count,
                max_events,
            })
        }
        Commands::Ls { input, tree, json } => ls::cmd_ls(&input, &tree, json),
        Commands::Hepmc2ntuple { input, output, tree, max_particles, save_count, max_events } => {
            let opts = ConvertOptions { tree, max_particles, save_count, max_events };
            hepmc::cmd_hepmc2ntuple(&input, output.as_ref(), &opts)
        }
        Commands::HepmcFilter { input, decays, output } => {
            hepmc::cmd_hepmc_filter(&input, &decays, output.as_ref())
        }
        Commands::Version => {
            println!("tnm {}", tnm_core::VERSION);
            Ok(())
        }
    }
}
