use std::fs::File;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use crate::error::{Error, Result};
use crate::records::{NumberFormat, Row};

/// The three files a run can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Usage,
    Charges,
    Emissions,
}

impl Dataset {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Usage => "eloverblik_usage_data.csv",
            Self::Charges => "eloverblik_charges_data.csv",
            Self::Emissions => "energidataservice_declarationemissionhour.csv",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::Charges => "charges",
            Self::Emissions => "emissions",
        }
    }
}

/// Ordered destination for flattened records.
pub trait RecordSink<R> {
    fn append(&mut self, batch: &[R]) -> Result<()>;
}

impl<R: Clone> RecordSink<R> for Vec<R> {
    fn append(&mut self, batch: &[R]) -> Result<()> {
        self.extend_from_slice(batch);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub format: NumberFormat,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            format: NumberFormat::default(),
        }
    }
}

/// CSV writer with the record type's header written up front.
///
/// Every append is flushed, so rows already written survive a later failure.
pub struct CsvSink<R, W: Write = File> {
    writer: csv::Writer<W>,
    format: NumberFormat,
    path: PathBuf,
    rows: u64,
    _record: PhantomData<R>,
}

impl<R: Row> CsvSink<R, File> {
    /// Creates (truncating) `path` and writes the header.
    pub fn create(path: &Path, options: &CsvOptions) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Sink {
                    path: path.to_path_buf(),
                    source: e.into(),
                })?;
            }
        }
        let writer = WriterBuilder::new()
            .delimiter(options.delimiter)
            .from_path(path)
            .map_err(|source| Error::Sink {
                path: path.to_path_buf(),
                source,
            })?;
        Self::start(writer, path.to_path_buf(), options)
    }
}

impl<R: Row, W: Write> CsvSink<R, W> {
    pub fn from_writer(writer: W, options: &CsvOptions) -> Result<Self> {
        let writer = WriterBuilder::new()
            .delimiter(options.delimiter)
            .from_writer(writer);
        Self::start(writer, PathBuf::from("<writer>"), options)
    }

    fn start(writer: csv::Writer<W>, path: PathBuf, options: &CsvOptions) -> Result<Self> {
        let mut sink = Self {
            writer,
            format: options.format,
            path,
            rows: 0,
            _record: PhantomData,
        };
        sink.writer
            .write_record(R::HEADER)
            .map_err(|source| sink.sink_error(source))?;
        sink.flush()?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        let path = self.path.clone();
        self.writer.into_inner().map_err(|e| Error::Sink {
            path,
            source: std::io::Error::new(e.error().kind(), e.error().to_string()).into(),
        })
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| Error::Sink {
            path: self.path.clone(),
            source: e.into(),
        })
    }

    fn sink_error(&self, source: csv::Error) -> Error {
        Error::Sink {
            path: self.path.clone(),
            source,
        }
    }
}

impl<R: Row, W: Write> RecordSink<R> for CsvSink<R, W> {
    fn append(&mut self, batch: &[R]) -> Result<()> {
        for record in batch {
            let row = record.to_row(&self.format);
            self.writer
                .write_record(&row)
                .map_err(|source| self.sink_error(source))?;
        }
        self.rows += batch.len() as u64;
        self.flush()
    }
}
