//! Chained Parquet input: the entries of several files read as one tree.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::record_batch::{RecordBatch, RecordBatchReader};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use tnm_core::{Error, EventBuffer, EventSource, Result, Schema};

use crate::columnar::{from_arrow_schema, row_column, tree_name};

#[derive(Debug, Clone)]
struct ChainFile {
    path: PathBuf,
    first_entry: usize,
    entries: usize,
    row_groups: Vec<usize>,
}

#[derive(Debug)]
struct CachedGroup {
    file: usize,
    row_group: usize,
    first_entry: usize,
    batch: RecordBatch,
}

/// A chain of Parquet files sharing one ntuple schema.
#[derive(Debug)]
pub struct InputStream {
    tree: String,
    files: Vec<ChainFile>,
    full_schema: Schema,
    schema: Schema,
    projection: Option<Vec<usize>>,
    entries: usize,
    cache: Option<CachedGroup>,
}

fn open_builder(path: &Path) -> Result<ParquetRecordBatchReaderBuilder<File>> {
    let file = File::open(path)
        .map_err(|e| Error::Validation(format!("failed to open {}: {e}", path.display())))?;
    ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::Format(format!("failed to read Parquet {}: {e}", path.display())))
}

impl InputStream {
    /// Open the files as one chain of tree `tree`.
    ///
    /// Every file must have the same schema. Files tagged with a different
    /// tree name are rejected; untagged files are accepted.
    pub fn open<P: AsRef<Path>>(paths: &[P], tree: &str) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::Validation("no input files".into()));
        }

        let mut files = Vec::with_capacity(paths.len());
        let mut schema: Option<Schema> = None;
        let mut entries = 0usize;
        for p in paths {
            let path = p.as_ref();
            let builder = open_builder(path)?;
            match tree_name(builder.schema()) {
                Some(found) if found != tree => {
                    return Err(Error::Validation(format!(
                        "{} holds tree '{found}', expected '{tree}'",
                        path.display()
                    )));
                }
                _ => {}
            }
            let file_schema = from_arrow_schema(builder.schema())?;
            match &schema {
                None => schema = Some(file_schema),
                Some(s) if *s != file_schema => {
                    return Err(Error::Schema(format!(
                        "{} does not match the schema of {}",
                        path.display(),
                        paths[0].as_ref().display()
                    )));
                }
                Some(_) => {}
            }

            let row_groups: Vec<usize> = builder
                .metadata()
                .row_groups()
                .iter()
                .map(|rg| usize::try_from(rg.num_rows()).unwrap_or(0))
                .collect();
            let n: usize = row_groups.iter().sum();
            tracing::debug!(
                file = %path.display(),
                entries = n,
                row_groups = row_groups.len(),
                "chained"
            );
            files.push(ChainFile {
                path: path.to_path_buf(),
                first_entry: entries,
                entries: n,
                row_groups,
            });
            entries += n;
        }

        let full_schema = schema.unwrap_or_default();
        tracing::info!(tree, files = files.len(), entries, "opened input chain");
        Ok(Self {
            tree: tree.to_string(),
            files,
            schema: full_schema.clone(),
            full_schema,
            projection: None,
            entries,
            cache: None,
        })
    }

    /// Open the files named in a file list (see [`tnm_core::text::file_names`]).
    pub fn from_file_list(filelist: impl AsRef<Path>, tree: &str) -> Result<Self> {
        let paths = tnm_core::text::file_names(filelist)?;
        Self::open(&paths, tree)
    }

    /// Restrict decoding to `columns` (their counters are kept too).
    ///
    /// Fields of a buffer that are not selected are left untouched by reads.
    pub fn select(&mut self, columns: &[&str]) -> Result<()> {
        let schema = self.full_schema.project(columns)?;
        let roots = schema
            .names()
            .iter()
            .filter_map(|n| self.full_schema.index_of(n))
            .collect();
        self.schema = schema;
        self.projection = Some(roots);
        self.cache = None;
        Ok(())
    }

    /// Decode every column again.
    pub fn select_all(&mut self) {
        self.schema = self.full_schema.clone();
        self.projection = None;
        self.cache = None;
    }

    /// Tree name.
    pub fn tree(&self) -> &str {
        &self.tree
    }

    /// Files of the chain, in order.
    pub fn files(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }

    /// Schema of every file, regardless of [`select`](Self::select).
    pub fn full_schema(&self) -> &Schema {
        &self.full_schema
    }

    /// Empty buffer with the full schema of the chain.
    pub fn buffer(&self) -> EventBuffer {
        EventBuffer::new(self.full_schema.clone())
    }

    /// Listing of the chain and its fields.
    pub fn ls(&self) -> String {
        self.to_string()
    }

    fn locate(&self, entry: usize) -> Option<(usize, usize, usize)> {
        let fi = self.files.iter().position(|f| entry < f.first_entry + f.entries)?;
        let file = &self.files[fi];
        let mut first = file.first_entry;
        for (gi, &n) in file.row_groups.iter().enumerate() {
            if entry < first + n {
                return Some((fi, gi, first));
            }
            first += n;
        }
        None
    }

    fn load_group(&mut self, file: usize, row_group: usize, first_entry: usize) -> Result<()> {
        let chain_file = &self.files[file];
        let builder = open_builder(&chain_file.path)?;
        let rows = chain_file.row_groups[row_group].max(1);
        let mask = match &self.projection {
            Some(roots) => ProjectionMask::roots(builder.parquet_schema(), roots.iter().copied()),
            None => ProjectionMask::all(),
        };
        let reader = builder
            .with_row_groups(vec![row_group])
            .with_projection(mask)
            .with_batch_size(rows)
            .build()
            .map_err(|e| Error::Format(format!("failed to build Parquet reader: {e}")))?;
        let schema = reader.schema();
        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Format(format!("failed to read Parquet batches: {e}")))?;
        let batch = arrow::compute::concat_batches(&schema, &batches)
            .map_err(|e| Error::Format(format!("failed to concat Parquet batches: {e}")))?;
        if batch.num_columns() != self.schema.len() {
            return Err(Error::Format(format!(
                "row group {row_group} of {} decoded {} columns, expected {}",
                chain_file.path.display(),
                batch.num_columns(),
                self.schema.len()
            )));
        }
        tracing::debug!(
            file = %chain_file.path.display(),
            row_group,
            rows = batch.num_rows(),
            "decoded row group"
        );
        self.cache = Some(CachedGroup { file, row_group, first_entry, batch });
        Ok(())
    }
}

impl EventSource for InputStream {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn read_into(&mut self, entry: usize, buffer: &mut EventBuffer) -> Result<()> {
        let (file, row_group, first_entry) = self.locate(entry).ok_or_else(|| {
            let n = self.entries;
            Error::Validation(format!("entry {entry} out of range: chain has {n} entries"))
        })?;
        let cached =
            self.cache.as_ref().is_some_and(|c| c.file == file && c.row_group == row_group);
        if !cached {
            self.load_group(file, row_group, first_entry)?;
        }
        let Some(group) = &self.cache else {
            return Err(Error::Format("row group cache is empty".into()));
        };

        let row = entry - group.first_entry;
        for (j, spec) in self.schema.fields().iter().enumerate() {
            if buffer.schema().index_of(&spec.name).is_none() {
                continue;
            }
            let col = row_column(group.batch.column(j), spec, row)?;
            buffer.set_column(&spec.name, col)?;
        }
        Ok(())
    }
}

impl fmt::Display for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tree '{}': {} entries in {} file(s)",
            self.tree,
            self.entries,
            self.files.len()
        )?;
        for file in &self.files {
            writeln!(
                f,
                "  {} ({} entries, {} row groups)",
                file.path.display(),
                file.entries,
                file.row_groups.len()
            )?;
        }
        write!(f, "{}", self.full_schema)
    }
}
