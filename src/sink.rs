use std::fs;
use std::io::Write;
use std::path;

use log::debug;

use crate::error::Result;

/// Width of a single cell in the progress log.
const PROGRESS_WIDTH: usize = 11;

/// Header of a table: column labels plus free-text annotations written above them.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Header {
    pub(crate) labels: Vec<String>,
    pub(crate) annotations: Vec<String>,
}

impl Header {
    /// The header row as a single delimited line.
    pub(crate) fn line(&self) -> String {
        self.labels.join(",")
    }
}

/// Destination a collected table is written to.
pub(crate) trait TableSink {
    fn write(&mut self, header: &Header, rows: &[Vec<f64>]) -> Result<()>;
}

/// Writes the table as comma-separated values.
pub(crate) struct CsvSink {
    path: path::PathBuf,
}

impl CsvSink {
    pub(crate) fn new<P: AsRef<path::Path>>(path: P) -> CsvSink {
        CsvSink {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl TableSink for CsvSink {
    fn write(&mut self, header: &Header, rows: &[Vec<f64>]) -> Result<()> {
        create_parent(&self.path)?;
        let mut file = fs::File::create(&self.path)?;
        for annotation in &header.annotations {
            writeln!(file, "# {}", annotation)?;
        }
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&header.labels)?;
        for row in rows {
            writer.write_record(row.iter().map(ToString::to_string))?;
        }
        writer.flush()?;
        debug!("wrote {} rows to '{}'.", rows.len(), self.path.display());
        Ok(())
    }
}

/// Overwrites a fixed file with a fixed-width rendition of the table, for tailing.
pub(crate) struct ProgressSink {
    path: path::PathBuf,
}

impl ProgressSink {
    pub(crate) fn new<P: AsRef<path::Path>>(path: P) -> ProgressSink {
        ProgressSink {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl TableSink for ProgressSink {
    fn write(&mut self, header: &Header, rows: &[Vec<f64>]) -> Result<()> {
        create_parent(&self.path)?;
        let mut out = String::new();
        for annotation in &header.annotations {
            out.push_str(&format!("# {}\n", annotation));
        }
        let labels: Vec<String> = header
            .labels
            .iter()
            .map(|label| format!("{:>width$}", label, width = PROGRESS_WIDTH))
            .collect();
        out.push_str(&labels.join("\t"));
        out.push('\n');
        for row in rows {
            let cells: Vec<String> = row
                .iter()
                .map(|value| format!("{:>width$.2e}", value, width = PROGRESS_WIDTH))
                .collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        fs::write(&self.path, out)?;
        Ok(())
    }
}

fn create_parent(file: &path::Path) -> Result<()> {
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Read a file written by [`CsvSink`] back into its header labels and rows.
#[cfg(test)]
pub(crate) fn read_csv<P: AsRef<path::Path>>(path: P) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .has_headers(true)
        .from_path(path)?;
    let labels: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Vec::with_capacity(record.len());
        for field in record.iter() {
            row.push(crate::scpi::parse_f64(field)?);
        }
        rows.push(row);
    }
    Ok((labels, rows))
}
