//! Replayable source over the `.csv` members of a zip archive.
//!
//! Distribution datasets of geotagged measurements typically arrive as
//! zipped CSV dumps far larger than memory. [`ZipCsvSource`] exposes such
//! an archive as a [`Source`]: every traversal reopens the archive and
//! streams its `.csv` members in a fixed sorted order, decompressing one
//! member at a time. Peak memory is bounded by the largest single member,
//! never the whole archive.
//!
//! Rows are projected to feature vectors by parsing a configured set of
//! column indices as `f64`. Rows that fail projection (missing column,
//! unparseable field) are skipped; the skip decision depends only on the
//! row's bytes, so every traversal skips the same rows and replay
//! determinism holds.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tracing::{trace, warn};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::source::Source;

/// A [`Source`] reading feature vectors from the CSV members of a zip
/// archive.
///
/// Construction opens the archive once to validate it and record its
/// `.csv` member names in byte-lexicographic order; that order is then
/// fixed for the lifetime of the source. Each member is expected to carry
/// a header row, which is consumed and never projected.
#[derive(Debug, Clone)]
pub struct ZipCsvSource {
    path: PathBuf,
    entries: Vec<String>,
    columns: Vec<usize>,
}

impl ZipCsvSource {
    /// Open `path` and project the given column indices of every row.
    ///
    /// Fails with [`Error::Archive`] if the file cannot be opened or is
    /// not a valid zip archive, and with [`Error::InvalidParameter`] if
    /// `columns` is empty.
    pub fn new(path: impl AsRef<Path>, columns: Vec<usize>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if columns.is_empty() {
            return Err(Error::InvalidParameter {
                name: "columns",
                message: "at least one column index is required",
            });
        }

        let archive = open_archive(&path)?;
        let mut entries: Vec<String> = archive
            .file_names()
            .filter(|name| name.ends_with(".csv"))
            .map(String::from)
            .collect();
        entries.sort();

        Ok(Self {
            path,
            entries,
            columns,
        })
    }

    /// CSV member names, in traversal order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

impl Source for ZipCsvSource {
    fn traversal(&self) -> Box<dyn Iterator<Item = Vec<f64>> + '_> {
        // The trait has no error channel; an archive that was valid at
        // construction but has since become unreadable degrades to an
        // empty traversal.
        match open_archive(&self.path) {
            Ok(archive) => Box::new(ZipCsvTraversal {
                archive,
                entries: &self.entries,
                columns: &self.columns,
                next_entry: 0,
                rows: None,
            }),
            Err(e) => {
                warn!(error = %e, "archive no longer readable, yielding empty traversal");
                Box::new(std::iter::empty())
            }
        }
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|e| Error::Archive {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| Error::Archive {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

struct ZipCsvTraversal<'a> {
    archive: ZipArchive<BufReader<File>>,
    entries: &'a [String],
    columns: &'a [usize],
    next_entry: usize,
    rows: Option<csv::StringRecordsIntoIter<Cursor<Vec<u8>>>>,
}

impl Iterator for ZipCsvTraversal<'_> {
    type Item = Vec<f64>;

    fn next(&mut self) -> Option<Vec<f64>> {
        loop {
            if let Some(rows) = &mut self.rows {
                for record in rows.by_ref() {
                    match record {
                        Ok(record) => {
                            if let Some(vector) = project(&record, self.columns) {
                                return Some(vector);
                            }
                            trace!(row = ?record, "skipping unprojectable row");
                        }
                        Err(e) => trace!(error = %e, "skipping malformed row"),
                    }
                }
                self.rows = None;
            }

            let name = self.entries.get(self.next_entry)?;
            self.next_entry += 1;

            // One decompressed member at a time bounds memory to the
            // largest member.
            let mut buf = Vec::new();
            match self.archive.by_name(name) {
                Ok(mut entry) => {
                    if let Err(e) = entry.read_to_end(&mut buf) {
                        warn!(entry = %name, error = %e, "skipping unreadable archive entry");
                        continue;
                    }
                }
                Err(e) => {
                    warn!(entry = %name, error = %e, "skipping missing archive entry");
                    continue;
                }
            }

            self.rows = Some(
                ReaderBuilder::new()
                    .has_headers(true)
                    .from_reader(Cursor::new(buf))
                    .into_records(),
            );
        }
    }
}

/// Parse the configured columns of one row as `f64`, or `None` if any
/// column is missing or unparseable.
fn project(record: &csv::StringRecord, columns: &[usize]) -> Option<Vec<f64>> {
    columns
        .iter()
        .map(|&i| record.get(i)?.trim().parse::<f64>().ok())
        .collect()
}
