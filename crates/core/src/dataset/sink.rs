use crate::dataset::ReconciledBatch;
use crate::time::calendar::format_date;
use anyhow::Context;
use arrow::csv::WriterBuilder;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where a run's output lands. Derived only from the requested range so a
/// rerun of the same range replaces the previous file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetKey(String);

impl DatasetKey {
    pub fn for_range(start: NaiveDate, end: NaiveDate) -> Self {
        Self(format!(
            "backfilled_data_{}_to_{}",
            format_date(start),
            format_date(end)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SinkReceipt {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
}

pub trait DatasetSink: Send + Sync {
    fn write(&self, batch: &ReconciledBatch, key: &DatasetKey) -> anyhow::Result<SinkReceipt>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            other => anyhow::bail!("unknown output format {other:?} (expected csv or parquet)"),
        }
    }
}

/// Writes one file per key under `data_dir`.
#[derive(Debug, Clone)]
pub struct FileSink {
    data_dir: PathBuf,
    format: OutputFormat,
}

impl FileSink {
    pub fn new(data_dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            data_dir: data_dir.into(),
            format,
        }
    }

    pub fn path_for(&self, key: &DatasetKey) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", key.as_str(), self.format.extension()))
    }
}

impl DatasetSink for FileSink {
    fn write(&self, batch: &ReconciledBatch, key: &DatasetKey) -> anyhow::Result<SinkReceipt> {
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating output directory {:?}", self.data_dir))?;

        let record_batch = batch.to_record_batch()?;
        let path = self.path_for(key);

        match self.format {
            OutputFormat::Csv => write_csv(&path, &record_batch)?,
            OutputFormat::Parquet => write_parquet(&path, &record_batch)?,
        }

        tracing::debug!(
            path = %path.display(),
            rows = record_batch.num_rows(),
            columns = record_batch.num_columns(),
            "dataset written"
        );

        Ok(SinkReceipt {
            path,
            rows: record_batch.num_rows(),
            columns: record_batch.num_columns(),
        })
    }
}

fn write_csv(path: &Path, batch: &arrow::record_batch::RecordBatch) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating csv file {path:?}"))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .build(BufWriter::new(file));
    writer
        .write(batch)
        .with_context(|| format!("writing csv file {path:?}"))?;
    writer
        .into_inner()
        .flush()
        .with_context(|| format!("flushing csv file {path:?}"))?;
    Ok(())
}

fn write_parquet(path: &Path, batch: &arrow::record_batch::RecordBatch) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating parquet file {path:?}"))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating Arrow writer for dataset")?;
    writer.write(batch).context("writing dataset batch")?;
    writer.close().context("closing dataset writer")?;
    Ok(())
}
