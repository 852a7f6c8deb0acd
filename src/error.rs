use thiserror::Error;

/// Result alias used throughout the crate.
pub(crate) type Result<T> = std::result::Result<T, LabError>;

/// Everything that can go wrong while collecting or persisting measurements.
#[derive(Error, Debug)]
pub(crate) enum LabError {
    /// A measurement names columns that the schema does not declare.
    #[error("unknown column(s) in measurement: {}", .0.join(", "))]
    UnknownColumns(Vec<String>),

    /// List-valued fields of one measurement cannot be broadcast together.
    #[error("column '{column}' has {len} values, expected 1 or {expected}")]
    InconsistentLength {
        column: String,
        len: usize,
        expected: usize,
    },

    /// A measurement without a single `add` call carries no timing.
    #[error("measurement has no readings")]
    EmptyMeasurement,

    #[error("column '{0}' is declared more than once")]
    DuplicateColumn(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not parse the config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("instrument error: {0}")]
    Instrument(String),

    #[error("VISA error: {0}")]
    #[cfg(feature = "instrument_visa")]
    Visa(#[from] visa_rs::Error),

    #[error("feature '{0}' is not enabled, build with --features {0}")]
    FeatureNotEnabled(String),

    /// An instrument replied with something that is not the expected number.
    #[error("could not parse instrument reply '{reply}': {reason}")]
    Parse { reply: String, reason: String },
}
