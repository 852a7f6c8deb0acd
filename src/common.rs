use crate::error::Result;
use crate::measurement::Measurement;

/// Defines a basic instrument.
pub(crate) trait Instrument {
    /// Columns this instrument writes into a measurement.
    fn get_names(&self) -> Vec<String>;
    fn measure(&mut self, meas: &mut Measurement) -> Result<()>;
}
