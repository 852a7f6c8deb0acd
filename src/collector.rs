use std::collections::HashMap;
use std::path;

use log::{debug, warn};

use crate::error::{LabError, Result};
use crate::measurement::{seconds, Measurement};
use crate::schema::{self, Column};
use crate::sink::{CsvSink, Header, TableSink};

/// Append-only table of measurements with a fixed column schema.
pub(crate) struct DataCollector {
    names: Vec<String>,
    vars: HashMap<String, usize>,
    units: HashMap<String, String>,
    matrix: Vec<Vec<f64>>,
    annotations: Vec<String>,
    checkpoint: Option<Box<dyn TableSink>>,
}

impl DataCollector {
    /// Create a collector; `None` selects the default instrument schema.
    pub(crate) fn new(columns: Option<Vec<Column>>) -> Result<DataCollector> {
        let columns = schema::normalize(columns.unwrap_or_else(schema::default_columns))?;
        let vars = columns
            .iter()
            .enumerate()
            .map(|(i, column)| (column.name.clone(), i))
            .collect();
        let units = columns
            .iter()
            .map(|column| (column.name.clone(), column.unit.clone()))
            .collect();
        Ok(DataCollector {
            names: columns.into_iter().map(|column| column.name).collect(),
            vars,
            units,
            matrix: Vec::new(),
            annotations: Vec::new(),
            checkpoint: None,
        })
    }

    /// Write the whole table to `sink` after every successful `add`.
    pub(crate) fn with_checkpoint(mut self, sink: Box<dyn TableSink>) -> DataCollector {
        self.checkpoint = Some(sink);
        self
    }

    /// Append the readings of `meas`, returning the number of rows added.
    ///
    /// Scalars are broadcast over all rows of the call, sequences are used positionally
    /// and columns the measurement lacks are NaN. Either all rows are appended or none
    /// are; a failing checkpoint write takes the new rows back out again.
    pub(crate) fn add(&mut self, meas: &Measurement) -> Result<usize> {
        let (time_out, duration) = match (meas.time_out(), meas.adding_duration()) {
            (Some(time_out), Some(duration)) => (seconds(time_out), duration),
            _ => return Err(LabError::EmptyMeasurement),
        };

        let mut unknown: Vec<String> = meas
            .data()
            .keys()
            .filter(|name| !self.vars.contains_key(*name) || schema::is_reserved(name))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            unknown.sort();
            warn!("rejected measurement with unknown columns: {:?}.", unknown);
            return Err(LabError::UnknownColumns(unknown));
        }

        let n = meas.data().values().map(|value| value.len()).max().unwrap_or(1).max(1);
        for (name, value) in meas.data() {
            let len = value.len();
            if len != 1 && len != n {
                warn!("rejected measurement: '{}' has {} values, expected {}.", name, len, n);
                return Err(LabError::InconsistentLength {
                    column: name.clone(),
                    len,
                    expected: n,
                });
            }
        }

        let mut rows = Vec::with_capacity(n);
        for row in 0..n {
            let mut values = Vec::with_capacity(self.names.len());
            for name in &self.names {
                let value = match name.as_str() {
                    schema::TIMESTAMP => time_out,
                    schema::ADDING_DURATION => duration,
                    _ => meas.get(name).map_or(f64::NAN, |value| value.at(row)),
                };
                values.push(value);
            }
            rows.push(values);
        }
        let before = self.matrix.len();
        self.matrix.append(&mut rows);
        let annotated = !meas.error().is_empty();
        if annotated {
            self.annotations.insert(0, meas.error().to_string());
        }

        if let Err(err) = self.write_checkpoint() {
            warn!("checkpoint failed, dropping the {} new row(s): {}", n, err);
            self.matrix.truncate(before);
            if annotated {
                self.annotations.remove(0);
            }
            return Err(err);
        }
        Ok(n)
    }

    fn write_checkpoint(&mut self) -> Result<()> {
        let header = self.header();
        if let Some(sink) = self.checkpoint.as_mut() {
            sink.write(&header, &self.matrix)?;
            debug!("checkpointed {} rows.", self.matrix.len());
        }
        Ok(())
    }

    /// Save the table as CSV; the `.csv` suffix is added unless already present.
    pub(crate) fn save<P: AsRef<path::Path>>(&self, path: P) -> Result<path::PathBuf> {
        let path = csv_path(path.as_ref());
        self.save_to(&mut CsvSink::new(&path))?;
        Ok(path)
    }

    pub(crate) fn save_to(&self, sink: &mut dyn TableSink) -> Result<()> {
        sink.write(&self.header(), self.rows())
    }

    pub(crate) fn header(&self) -> Header {
        Header {
            labels: self
                .names
                .iter()
                .map(|name| schema::label(name, self.unit(name).unwrap_or_default()))
                .collect(),
            annotations: self.annotations.clone(),
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name) && !schema::is_reserved(name)
    }

    pub(crate) fn unit(&self, name: &str) -> Option<&str> {
        self.units.get(name).map(String::as_str)
    }

    pub(crate) fn rows(&self) -> &[Vec<f64>] {
        &self.matrix
    }

    pub(crate) fn len(&self) -> usize {
        self.matrix.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    /// All values of one column, in row order.
    #[cfg(test)]
    pub(crate) fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = *self.vars.get(name)?;
        Some(self.matrix.iter().map(|row| row[index]).collect())
    }
}

fn csv_path(path: &path::Path) -> path::PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => path.to_path_buf(),
        _ => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".csv");
            path::PathBuf::from(name)
        }
    }
}
