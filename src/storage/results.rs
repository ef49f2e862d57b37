//! Parse-result tables.
//!
//! One header row, then one row per triple. The key columns come first, then
//! any caller-provided extra columns, then one column per parse pattern. The canonical on-disk form is tab-separated
//! (`parse_results.txt`); the same data is also exported as CSV.

use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::core::TripleKey;
use crate::parse::MISSING_VALUE;
use crate::{FlowError, FlowResult};

/// Key columns in deterministic order.
pub const KEY_COLUMNS: [&str; 3] = ["arch", "circuit", "script_params"];

/// One triple's metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub key: TripleKey,
    /// Values of the table's extra columns
    pub extra: IndexMap<String, String>,
    pub metrics: IndexMap<String, String>,
}

impl ResultRow {
    pub fn new(key: TripleKey, metrics: IndexMap<String, String>) -> Self {
        ResultRow {
            key,
            extra: IndexMap::new(),
            metrics,
        }
    }

    pub fn with_extra(mut self, extra: IndexMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    pub fn get(&self, metric: &str) -> Option<&str> {
        self.metrics.get(metric).map(String::as_str)
    }
}

/// A parse-result table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    /// Caller-provided columns between the key and metric columns
    pub extra: Vec<String>,
    /// Metric columns after the extra columns
    pub metrics: Vec<String>,
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(metrics: Vec<String>) -> Self {
        ResultTable {
            extra: Vec::new(),
            metrics,
            rows: Vec::new(),
        }
    }

    /// Insert `extra` columns before the metric columns.
    pub fn with_extra(mut self, extra: Vec<String>) -> Self {
        self.extra = extra;
        self
    }

    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    pub fn get(&self, key: &TripleKey) -> Option<&ResultRow> {
        self.rows.iter().find(|r| &r.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn header(&self) -> Vec<&str> {
        KEY_COLUMNS
            .iter()
            .copied()
            .chain(self.extra.iter().map(String::as_str))
            .chain(self.metrics.iter().map(String::as_str))
            .collect()
    }

    fn row_cells(&self, row: &ResultRow) -> Vec<String> {
        [&row.key.arch, &row.key.circuit, &row.key.script_params]
            .into_iter()
            .cloned()
            .chain(self.extra.iter().map(|e| row.extra.get(e).cloned().unwrap_or_default()))
            .chain(self.metrics.iter().map(|m| {
                row.get(m)
                    .map(String::from)
                    .unwrap_or_else(|| MISSING_VALUE.to_string())
            }))
            .collect()
    }

    /// Write the tab-separated form.
    pub fn write_tsv(&self, path: &Path) -> FlowResult<()> {
        ensure_parent(path)?;
        let file = std::fs::File::create(path)?;
        self.write_tsv_to(file)
    }

    pub fn write_tsv_to<W: Write>(&self, writer: W) -> FlowResult<()> {
        let mut tsv = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(writer);

        tsv.write_record(self.header().iter().map(|h| sanitize(h)))
            .map_err(|e| FlowError::Message(format!("failed to write result header: {e}")))?;
        for row in &self.rows {
            tsv.write_record(self.row_cells(row).iter().map(|c| sanitize(c)))
                .map_err(|e| FlowError::Message(format!("failed to write result row: {e}")))?;
        }
        tsv.flush()?;
        Ok(())
    }

    /// Export as CSV.
    pub fn write_csv(&self, path: &Path) -> FlowResult<()> {
        ensure_parent(path)?;
        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| FlowError::Message(format!("failed to create {}: {e}", path.display())))?;

        writer
            .write_record(self.header())
            .map_err(|e| FlowError::Message(format!("failed to write CSV header: {e}")))?;
        for row in &self.rows {
            writer
                .write_record(self.row_cells(row))
                .map_err(|e| FlowError::Message(format!("failed to write CSV row: {e}")))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write `<stem>.txt` and `<stem>.csv` side by side.
    pub fn write_all(&self, tsv_path: &Path) -> FlowResult<PathBuf> {
        self.write_tsv(tsv_path)?;
        let csv_path = tsv_path.with_extension("csv");
        self.write_csv(&csv_path)?;
        Ok(csv_path)
    }

    /// Read a tab-separated table.
    ///
    /// Cells are trimmed and empty trailing columns ignored, so tables padded
    /// with whitespace read the same.
    pub fn read_tsv(path: &Path) -> FlowResult<Self> {
        Self::read_tsv_with_extra(path, &[])
    }

    /// Read a tab-separated table whose columns named in `extra` are extra
    /// columns rather than metrics.
    pub fn read_tsv_with_extra(path: &Path, extra: &[&str]) -> FlowResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|_| FlowError::file_missing(path, "result table"))?;

        let csv_err = |e: csv::Error| {
            let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
            FlowError::config(path, line, e.to_string())
        };

        let headers = reader.headers().map_err(csv_err)?.clone();
        let columns: Vec<&str> = headers.iter().collect();
        if columns.len() < KEY_COLUMNS.len() || columns[..KEY_COLUMNS.len()] != KEY_COLUMNS {
            return Err(FlowError::config(
                path,
                1,
                format!("header must start with {}", KEY_COLUMNS.join(", ")),
            ));
        }
        let (extra_columns, metric_columns): (Vec<(usize, String)>, Vec<(usize, String)>) = columns
            .iter()
            .enumerate()
            .skip(KEY_COLUMNS.len())
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| (i, name.to_string()))
            .partition(|(_, name)| extra.contains(&name.as_str()));

        let names = |cols: &[(usize, String)]| -> Vec<String> {
            cols.iter().map(|(_, n)| n.clone()).collect()
        };
        let mut table = ResultTable::new(names(&metric_columns)).with_extra(names(&extra_columns));
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            let cell = |i: usize| record.get(i).unwrap_or("").to_string();
            if record.len() < KEY_COLUMNS.len() {
                return Err(FlowError::config(path, idx + 2, "row is missing key columns"));
            }
            let key = TripleKey {
                arch: cell(0),
                circuit: cell(1),
                script_params: cell(2),
            };
            let pairs = |cols: &[(usize, String)]| -> IndexMap<String, String> {
                cols.iter().map(|(i, name)| (name.clone(), cell(*i))).collect()
            };
            table.push(ResultRow::new(key, pairs(&metric_columns)).with_extra(pairs(&extra_columns)));
        }
        Ok(table)
    }
}

fn sanitize(cell: &str) -> String {
    cell.replace(['\t', '\n', '\r'], " ")
}

fn ensure_parent(path: &Path) -> FlowResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
