//! Analysis output: a counts table and, optionally, a skimmed tree.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use tnm_core::{Column, Counts, Error, EventBuffer, FieldSpec, Result, Schema, ValueType};

use crate::columnar::{
    ColumnSink, META_KEY_COUNTS, META_KEY_SCHEMA_VERSION, NTUPLE_SCHEMA_V1, finish_batch,
    to_arrow_schema,
};

/// Entries between automatic row-group flushes.
pub const DEFAULT_SAVE_COUNT: usize = 50_000;

/// Name of the weight column appended to skimmed trees.
pub const WEIGHT_COLUMN: &str = "eventWeight";

fn writer_properties(max_row_group_size: usize) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(max_row_group_size)
        .build()
}

struct Skim {
    tree: String,
    input_schema: Schema,
    arrow_schema: SchemaRef,
    writer: ArrowWriter<File>,
    sinks: Vec<ColumnSink>,
    weight_index: usize,
    pending: usize,
    entries: usize,
    save_count: usize,
}

impl Skim {
    fn append(&mut self, buffer: &EventBuffer, weight: f64) -> Result<()> {
        if buffer.schema() != &self.input_schema {
            return Err(Error::Schema(
                "buffer schema differs from the schema the skim was opened with".into(),
            ));
        }
        let weight = Column::F64(vec![weight]);
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if i == self.weight_index {
                sink.push(&weight)?;
            } else {
                sink.push(&buffer.columns()[i])?;
            }
        }
        self.pending += 1;
        self.entries += 1;
        if self.pending >= self.save_count {
            self.auto_save()?;
        }
        Ok(())
    }

    fn write_pending(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        let batch = finish_batch(&self.arrow_schema, &mut self.sinks)?;
        self.writer
            .write(&batch)
            .map_err(|e| Error::Format(format!("failed to write Parquet: {e}")))?;
        self.pending = 0;
        Ok(())
    }

    fn auto_save(&mut self) -> Result<()> {
        self.write_pending()?;
        self.writer
            .flush()
            .map_err(|e| Error::Format(format!("failed to flush row group: {e}")))?;
        tracing::debug!(entries = self.entries, "auto-saved");
        Ok(())
    }
}

/// Output file of an analysis job.
///
/// Always records a [`Counts`] table. When opened with
/// [`skim`](Self::skim) it also writes the events passed to
/// [`write`](Self::write), with an `eventWeight` column.
pub struct OutputFile {
    path: PathBuf,
    counts: Counts,
    target: Target,
}

enum Target {
    Counts(File),
    Skim(Box<Skim>),
}

fn create_file(path: &Path) -> Result<File> {
    File::create(path)
        .map_err(|e| Error::Validation(format!("failed to create {}: {e}", path.display())))
}

impl OutputFile {
    /// Output holding only the counts table.
    ///
    /// The file is created here so an unwritable path fails before any
    /// event is processed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = create_file(&path)?;
        tracing::info!(path = %path.display(), "output file");
        Ok(Self { path, counts: Counts::new(), target: Target::Counts(file) })
    }

    /// Output that skims events with `buffer`'s schema to tree `tree`.
    ///
    /// A scalar `eventWeight` field (F64) is appended unless the schema
    /// already has one, in which case its values are replaced by the
    /// weights given to [`write`](Self::write).
    pub fn skim(
        path: impl AsRef<Path>,
        buffer: &EventBuffer,
        tree: &str,
        save_count: usize,
    ) -> Result<Self> {
        if save_count == 0 {
            return Err(Error::Validation("save_count must be positive".into()));
        }
        let path = path.as_ref().to_path_buf();
        let input_schema = buffer.schema().clone();

        let (schema, weight_index) = match input_schema.field(WEIGHT_COLUMN) {
            Some(f) if f.is_array() || f.value_type != ValueType::F64 => {
                return Err(Error::Schema(format!(
                    "existing '{WEIGHT_COLUMN}' field must be a double scalar, got {}",
                    f.leaf_title()
                )));
            }
            Some(_) => {
                let i = input_schema.index_of(WEIGHT_COLUMN).unwrap_or_default();
                (input_schema.clone(), i)
            }
            None => {
                let schema = input_schema
                    .clone()
                    .with_field(FieldSpec::scalar(WEIGHT_COLUMN, ValueType::F64))?;
                let i = schema.len() - 1;
                (schema, i)
            }
        };

        let arrow_schema = to_arrow_schema(&schema, tree);
        let file = create_file(&path)?;
        let writer =
            ArrowWriter::try_new(file, arrow_schema.clone(), Some(writer_properties(save_count)))
                .map_err(|e| Error::Format(format!("failed to create Parquet writer: {e}")))?;
        let sinks = schema.fields().iter().cloned().map(ColumnSink::new).collect();

        tracing::info!(path = %path.display(), tree, "events will be skimmed to file");
        Ok(Self {
            path,
            counts: Counts::new(),
            target: Target::Skim(Box::new(Skim {
                tree: tree.to_string(),
                input_schema,
                arrow_schema,
                writer,
                sinks,
                weight_index,
                pending: 0,
                entries: 0,
                save_count,
            })),
        })
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether events are being skimmed.
    pub fn is_skimming(&self) -> bool {
        matches!(self.target, Target::Skim(_))
    }

    /// Compact `buffer`'s selected objects and append it with `weight`.
    ///
    /// Does nothing for a counts-only output.
    pub fn write(&mut self, buffer: &mut EventBuffer, weight: f64) -> Result<()> {
        let Target::Skim(skim) = &mut self.target else {
            return Ok(());
        };
        buffer.save_objects()?;
        skim.append(buffer, weight)
    }

    /// Add `weight` to the count labelled `label`.
    pub fn count(&mut self, label: &str, weight: f64) {
        self.counts.fill(label, weight);
    }

    /// Counts table.
    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    /// Mutable counts table (for [`tnm_core::EventSelection::apply`]).
    pub fn counts_mut(&mut self) -> &mut Counts {
        &mut self.counts
    }

    /// Events written so far.
    pub fn entries(&self) -> usize {
        match &self.target {
            Target::Skim(skim) => skim.entries,
            Target::Counts(_) => 0,
        }
    }

    /// Flush everything, store the counts table and close the file.
    pub fn close(self) -> Result<OutputSummary> {
        let counts_json = serde_json::to_string(&self.counts)?;
        let summary = match self.target {
            Target::Skim(skim) => {
                let mut skim = *skim;
                skim.write_pending()?;
                skim.writer
                    .flush()
                    .map_err(|e| Error::Format(format!("failed to flush row group: {e}")))?;
                let row_groups = skim.writer.flushed_row_groups().len();
                skim.writer.append_key_value_metadata(KeyValue::new(
                    META_KEY_COUNTS.to_string(),
                    counts_json,
                ));
                skim.writer
                    .close()
                    .map_err(|e| Error::Format(format!("failed to close Parquet writer: {e}")))?;
                tracing::info!(
                    path = %self.path.display(),
                    entries = skim.entries,
                    "events skimmed to file"
                );
                OutputSummary {
                    path: self.path,
                    tree: Some(skim.tree),
                    entries: skim.entries,
                    row_groups,
                    counts: self.counts,
                }
            }
            Target::Counts(file) => {
                write_counts_table(file, &self.counts, counts_json)?;
                tracing::info!(
                    path = %self.path.display(),
                    bins = self.counts.len(),
                    "counts written"
                );
                OutputSummary {
                    path: self.path,
                    tree: None,
                    entries: 0,
                    row_groups: 1,
                    counts: self.counts,
                }
            }
        };
        Ok(summary)
    }
}

impl fmt::Debug for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputFile")
            .field("path", &self.path)
            .field("skimming", &self.is_skimming())
            .field("entries", &self.entries())
            .field("counts", &self.counts.len())
            .finish()
    }
}

/// Counts-only output: the table as rows, plus the JSON metadata.
fn write_counts_table(file: File, counts: &Counts, counts_json: String) -> Result<()> {
    let bins = counts.bins();
    let schema = Arc::new(
        ArrowSchema::new(vec![
            Field::new("label", DataType::Utf8, false),
            Field::new("sumw", DataType::Float64, false),
            Field::new("sumw2", DataType::Float64, false),
            Field::new("entries", DataType::Int64, false),
        ])
        .with_metadata(HashMap::from([(
            META_KEY_SCHEMA_VERSION.to_string(),
            NTUPLE_SCHEMA_V1.to_string(),
        )])),
    );
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(bins.iter().map(|b| b.label.as_str()).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(bins.iter().map(|b| b.sumw).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(bins.iter().map(|b| b.sumw2).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(
            bins.iter().map(|b| i64::try_from(b.entries).unwrap_or(i64::MAX)).collect::<Vec<_>>(),
        )),
    ];
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| Error::Format(format!("failed to build RecordBatch: {e}")))?;

    let mut writer =
        ArrowWriter::try_new(file, schema, Some(writer_properties(DEFAULT_SAVE_COUNT)))
            .map_err(|e| Error::Format(format!("failed to create Parquet writer: {e}")))?;
    writer.write(&batch).map_err(|e| Error::Format(format!("failed to write Parquet: {e}")))?;
    writer.append_key_value_metadata(KeyValue::new(META_KEY_COUNTS.to_string(), counts_json));
    writer
        .close()
        .map_err(|e| Error::Format(format!("failed to close Parquet writer: {e}")))?;
    Ok(())
}

/// Counts table stored in an output file.
pub fn read_counts(path: impl AsRef<Path>) -> Result<Counts> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::Validation(format!("failed to open {}: {e}", path.display())))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::Format(format!("failed to read Parquet {}: {e}", path.display())))?;
    let json = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kv| kv.iter().find(|k| k.key == META_KEY_COUNTS))
        .and_then(|k| k.value.clone())
        .ok_or_else(|| {
            Error::Format(format!("{} has no '{META_KEY_COUNTS}' metadata", path.display()))
        })?;
    Ok(serde_json::from_str(&json)?)
}

/// What [`OutputFile::close`] wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSummary {
    /// Output path.
    pub path: PathBuf,
    /// Skimmed tree name, if events were skimmed.
    pub tree: Option<String>,
    /// Events written.
    pub entries: usize,
    /// Row groups in the file.
    pub row_groups: usize,
    /// Final counts table.
    pub counts: Counts,
}

impl OutputSummary {
    /// Listing of the file contents.
    pub fn ls(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OutputSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "file: {}", self.path.display())?;
        if let Some(tree) = &self.tree {
            writeln!(
                f,
                "  tree '{tree}': {} entries, {} row groups",
                self.entries, self.row_groups
            )?;
        }
        writeln!(f, "  counts:")?;
        for line in self.counts.table().lines() {
            writeln!(f, "    {line}")?;
        }
        Ok(())
    }
}
