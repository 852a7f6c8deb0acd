use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{LabError, Result};

/// Column holding the end of the sample window, in seconds since the epoch.
pub(crate) const TIMESTAMP: &str = "TIMESTAMP";
/// Column holding the time spent gathering the sample.
pub(crate) const ADDING_DURATION: &str = "ADDING_DURATION";

const RESERVED: [(&str, &str, &str); 2] = [
    (TIMESTAMP, "TIME", "sse"),
    (ADDING_DURATION, "ADDING_TIME", "s"),
];

const DEFAULT_COLUMNS: [(&str, &str); 14] = [
    ("AVDD", "V"),
    ("I_AVDD", "A"),
    ("VDD", "V"),
    ("I_VDD", "A"),
    ("VREF", "V"),
    ("I_REF", "A"),
    ("V_IREF", "V"),
    ("IB", "A"),
    ("RON", "V"),
    ("PD", "V"),
    ("TEMP", "C"),
    ("FREQ", "Hz"),
    ("PSRR", "Hz/V"),
    ("PHASE_NOISE", ""),
];

/// A named table column and its unit.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "(String, String)")]
pub(crate) struct Column {
    pub(crate) name: String,
    pub(crate) unit: String,
}

impl Column {
    pub(crate) fn new(name: &str, unit: &str) -> Column {
        Column {
            name: name.to_string(),
            unit: unit.to_string(),
        }
    }

    pub(crate) fn label(&self) -> String {
        label(&self.name, &self.unit)
    }
}

/// Header cell, `name [unit]` or just `name` without a unit.
pub(crate) fn label(name: &str, unit: &str) -> String {
    if unit.is_empty() {
        name.to_string()
    } else {
        format!("{} [{}]", name, unit)
    }
}

impl From<(String, String)> for Column {
    fn from((name, unit): (String, String)) -> Self {
        Column { name, unit }
    }
}

/// The built-in instrument vocabulary, without the reserved columns.
pub(crate) fn default_columns() -> Vec<Column> {
    DEFAULT_COLUMNS
        .iter()
        .map(|(name, unit)| Column::new(name, unit))
        .collect()
}

pub(crate) fn is_reserved(name: &str) -> bool {
    RESERVED.iter().any(|(current, _, _)| *current == name)
}

/// Rename legacy reserved columns, append missing reserved ones and reject duplicates.
pub(crate) fn normalize(mut columns: Vec<Column>) -> Result<Vec<Column>> {
    for (current, legacy, unit) in RESERVED {
        let mut found = false;
        for column in columns.iter_mut() {
            if column.name == current || column.name == legacy {
                column.name = current.to_string();
                column.unit = unit.to_string();
                found = true;
            }
        }
        if !found {
            columns.push(Column::new(current, unit));
        }
    }

    let mut seen = HashSet::new();
    for column in &columns {
        if !seen.insert(column.name.as_str()) {
            return Err(LabError::DuplicateColumn(column.name.clone()));
        }
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(columns: &[Column]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    // Tests for success.

    #[test]
    fn test_normalize_for_success() {
        normalize(default_columns()).unwrap();
        normalize(Vec::new()).unwrap();
    }

    // Tests for failure.

    #[test]
    fn test_normalize_for_failure() {
        let res = normalize(vec![Column::new("VDD", "V"), Column::new("VDD", "mV")]);
        assert!(matches!(res, Err(LabError::DuplicateColumn(name)) if name == "VDD"));

        // legacy and current name of the same reserved column collide.
        let res = normalize(vec![Column::new("TIME", "s"), Column::new("TIMESTAMP", "s")]);
        assert!(matches!(res, Err(LabError::DuplicateColumn(_))));
    }

    // Tests for sanity.

    #[test]
    fn test_normalize_for_sanity() {
        let res = normalize(vec![Column::new("VDD", "V")]).unwrap();
        assert_eq!(names(&res), vec!["VDD", "TIMESTAMP", "ADDING_DURATION"]);

        let res = normalize(vec![
            Column::new("ADDING_TIME", "s"),
            Column::new("VDD", "V"),
            Column::new("TIME", ""),
        ])
        .unwrap();
        assert_eq!(names(&res), vec!["ADDING_DURATION", "VDD", "TIMESTAMP"]);
        assert_eq!(res[2].unit, "sse");
    }

    #[test]
    fn test_default_columns_for_sanity() {
        let first = default_columns();
        let mut second = default_columns();
        second[0].name = "CHANGED".to_string();
        assert_eq!(first[0].name, "AVDD");
        assert_eq!(default_columns()[0].name, "AVDD");
        assert_eq!(first.len(), 14);
    }

    #[test]
    fn test_label_for_sanity() {
        assert_eq!(Column::new("VDD", "V").label(), "VDD [V]");
        assert_eq!(Column::new("PHASE_NOISE", "").label(), "PHASE_NOISE");
    }

    #[test]
    fn test_deserialize_for_sanity() {
        #[derive(Deserialize)]
        struct Schema {
            columns: Vec<Column>,
        }
        let schema: Schema =
            toml::from_str("columns = [[\"VDD\", \"V\"], [\"TEMP\", \"degC\"]]").unwrap();
        assert_eq!(
            schema.columns,
            vec![Column::new("VDD", "V"), Column::new("TEMP", "degC")]
        );
    }
}
