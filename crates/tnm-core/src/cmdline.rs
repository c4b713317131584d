//! The two positional arguments every analyzer takes.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Default input file list.
pub const DEFAULT_FILELIST: &str = "filelist.txt";

/// Extension forced onto output file names.
pub const OUTPUT_EXTENSION: &str = "parquet";

/// Input file list and output file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Program name (used for the default output name).
    pub progname: String,
    /// File holding the list of input files.
    pub filelist: PathBuf,
    /// Output file, always ending in `.parquet`.
    pub output: PathBuf,
}

impl CommandLine {
    /// Build from already-split positionals, applying the defaults.
    pub fn new(progname: &str, filelist: Option<PathBuf>, output: Option<PathBuf>) -> Self {
        let progname = Path::new(progname)
            .file_name()
            .map_or_else(|| progname.to_string(), |s| s.to_string_lossy().into_owned());
        let filelist = filelist.unwrap_or_else(|| PathBuf::from(DEFAULT_FILELIST));
        let output = with_output_extension(
            output.unwrap_or_else(|| PathBuf::from(format!("{progname}_histograms"))),
        );
        Self { progname, filelist, output }
    }

    /// Decode `argv`-style arguments (the first element is the program name).
    pub fn decode<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let progname = args.next().unwrap_or_else(|| "analyzer".to_string());
        let rest: Vec<String> = args.collect();
        if rest.len() > 2 {
            return Err(Error::Validation(format!(
                "usage: {progname} [filelist] [output]; got {} arguments",
                rest.len()
            )));
        }
        let mut rest = rest.into_iter().map(PathBuf::from);
        Ok(Self::new(&progname, rest.next(), rest.next()))
    }
}

fn with_output_extension(path: PathBuf) -> PathBuf {
    if path.extension().is_some_and(|e| e == OUTPUT_EXTENSION) {
        return path;
    }
    let mut s = path.into_os_string();
    s.push(".");
    s.push(OUTPUT_EXTENSION);
    PathBuf::from(s)
}
