use std::collections;
use std::fmt;
use std::fs;

use serde::Deserialize;

use crate::error::{LabError, Result};
use crate::schema::Column;

/// Struct holding the config info.
pub(crate) struct Config {
    pub(crate) data: collections::HashMap<String, toml::Value>,
}

/// The `[general]` section.
#[derive(Debug, Deserialize)]
pub(crate) struct General {
    #[serde(default = "default_iterations")]
    pub(crate) iterations: usize,
    /// Seconds to wait between two measurements.
    #[serde(default)]
    pub(crate) interval: f64,
    pub(crate) output: String,
    pub(crate) progress_log: Option<String>,
    pub(crate) journal: Option<String>,
    #[serde(default)]
    pub(crate) instruments: Vec<String>,
    /// Send `*RST` to every SCPI instrument before use.
    #[serde(default)]
    pub(crate) reset: bool,
    /// VISA session timeout in seconds.
    #[serde(default = "default_timeout")]
    pub(crate) timeout: f64,
}

fn default_iterations() -> usize {
    1
}

fn default_timeout() -> f64 {
    5.0
}

#[derive(Deserialize)]
struct Schema {
    columns: Vec<Column>,
}

/// A channel given either as number or as label, e.g. `1` or `"A"`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum Selector {
    Number(i64),
    Label(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Number(n) => write!(f, "{}", n),
            Selector::Label(label) => write!(f, "{}", label),
        }
    }
}

/// One instrument table; which fields matter depends on `type`.
#[derive(Debug, Deserialize)]
pub(crate) struct InstrumentConfig {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) address: String,
    pub(crate) column: String,
    pub(crate) channel: Option<Selector>,
    // multimeter; `quantity` also names what counters and scopes read.
    pub(crate) quantity: Option<String>,
    pub(crate) range: Option<f64>,
    pub(crate) nplc: Option<f64>,
    pub(crate) aperture: Option<f64>,
    pub(crate) impedance_auto: Option<bool>,
    // counter
    pub(crate) attenuation: Option<u8>,
    pub(crate) filter: Option<bool>,
    // smu
    pub(crate) sense: Option<String>,
    #[serde(default)]
    pub(crate) array: bool,
    pub(crate) temperature_column: Option<String>,
    pub(crate) source: Option<String>,
    pub(crate) level: Option<f64>,
    pub(crate) limit: Option<f64>,
    #[serde(default)]
    pub(crate) enable_output: bool,
    // supply, reuses `level` and `limit` as voltage and current.
    pub(crate) current_column: Option<String>,
    // analyzer
    pub(crate) unit: Option<String>,
    pub(crate) vname: Option<String>,
    pub(crate) iname: Option<String>,
    pub(crate) mode: Option<String>,
    pub(crate) read: Option<String>,
    pub(crate) integration: Option<u8>,
    pub(crate) compliance: Option<f64>,
    pub(crate) function: Option<String>,
    pub(crate) sweep: Option<String>,
    pub(crate) start: Option<f64>,
    pub(crate) stop: Option<f64>,
    pub(crate) step: Option<f64>,
    pub(crate) steps: Option<u32>,
}

impl InstrumentConfig {
    /// Look up an optional field that this instrument type requires.
    pub(crate) fn require<'a, V>(&self, name: &str, field: &'a Option<V>) -> Result<&'a V> {
        field.as_ref().ok_or_else(|| {
            LabError::Config(format!(
                "a {} requires the field '{}' to be set.",
                self.kind, name
            ))
        })
    }
}

impl Config {
    pub(crate) fn general(&self) -> Result<General> {
        let section = self
            .data
            .get("general")
            .ok_or_else(|| LabError::Config("missing [general] section.".to_string()))?;
        Ok(section.clone().try_into()?)
    }

    /// Columns of the `[schema]` section, `None` if the default schema should be used.
    pub(crate) fn columns(&self) -> Result<Option<Vec<Column>>> {
        match self.data.get("schema") {
            Some(section) => {
                let schema: Schema = section.clone().try_into()?;
                Ok(Some(schema.columns))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn instrument(&self, name: &str) -> Result<InstrumentConfig> {
        let section = self
            .data
            .get(name)
            .ok_or_else(|| LabError::Config(format!("no config provided for '{}'.", name)))?;
        Ok(section.clone().try_into()?)
    }
}

/// Load the configuration.
pub(crate) fn load_config(filename: &str) -> Result<Config> {
    let contents: String = read_config(filename)?;
    let data: collections::HashMap<String, toml::Value> = get_config(contents)?;
    Ok(Config { data })
}

/// Reads a string from a given filename.
fn read_config(filename: &str) -> Result<String> {
    fs::read_to_string(filename).map_err(|err| {
        LabError::Config(format!("could not read config file: {}: {}", filename, err))
    })
}

/// Parses the configuration from a string.
fn get_config(contents: String) -> Result<collections::HashMap<String, toml::Value>> {
    let map: collections::HashMap<String, toml::Value> = toml::from_str(&contents)?;
    Ok(map)
}
