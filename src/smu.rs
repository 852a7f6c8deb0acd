use std::io::{Read, Write};

use crate::common;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::measurement::Measurement;
use crate::scpi::ScpiPort;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SourceMode {
    Voltage,
    Current,
}

impl SourceMode {
    pub(crate) fn parse(mode: &str) -> Result<SourceMode> {
        match mode.to_lowercase().as_str() {
            "1" | "v" | "volt" | "voltage" => Ok(SourceMode::Voltage),
            "2" | "i" | "curr" | "current" => Ok(SourceMode::Current),
            _ => Err(LabError::Config(format!("unknown source mode '{}'.", mode))),
        }
    }

    fn command(&self) -> &'static str {
        match self {
            SourceMode::Voltage => "VOLT",
            SourceMode::Current => "CURR",
        }
    }

    fn other(&self) -> SourceMode {
        match self {
            SourceMode::Voltage => SourceMode::Current,
            SourceMode::Current => SourceMode::Voltage,
        }
    }

    fn describe(&self) -> (&'static str, &'static str) {
        match self {
            SourceMode::Voltage => ("voltage", "V"),
            SourceMode::Current => ("current", "A"),
        }
    }
}

/// One channel of an Agilent U2722A USB source-measure unit.
pub(crate) struct SourceMeter<T> {
    port: ScpiPort<T>,
    journal: Journal,
    channel: u8,
    sense: SourceMode,
    array: bool,
    column: String,
    temperature_column: Option<String>,
}

impl<T> SourceMeter<T>
where
    T: Read + Write,
{
    /// `sense` selects what is read back; `array` reads the whole sample buffer instead of one
    /// value.
    pub(crate) fn new(
        port: ScpiPort<T>,
        journal: Journal,
        channel: u8,
        sense: SourceMode,
        array: bool,
        column: &str,
    ) -> Result<SourceMeter<T>> {
        if !(1..=3).contains(&channel) {
            return Err(LabError::Config(format!("SMU has no channel {}.", channel)));
        }
        Ok(SourceMeter {
            port,
            journal,
            channel,
            sense,
            array,
            column: column.to_string(),
            temperature_column: None,
        })
    }

    /// Also record the unit's temperature under `column`.
    pub(crate) fn with_temperature(mut self, column: &str) -> SourceMeter<T> {
        self.temperature_column = Some(column.to_string());
        self
    }

    /// Source `level` in `mode`, optionally limiting the complementary quantity.
    pub(crate) fn source(
        &mut self,
        mode: SourceMode,
        level: f64,
        limit: Option<f64>,
    ) -> Result<f64> {
        let chan = self.channel;
        self.port
            .write(&format!("{} {}, (@{})", mode.command(), level, chan))?;
        if let Some(limit) = limit {
            let other = mode.other();
            self.port
                .write(&format!("{}:LIM {}, (@{})", other.command(), limit, chan))?;
            let (what, unit) = other.describe();
            self.journal
                .note(&format!("The {} limit is set to {} {}.", what, limit, unit))?;
        }
        let in_use = self
            .port
            .query_f64(&format!("{}? (@{})", mode.command(), chan))?;
        let (what, unit) = mode.describe();
        self.journal
            .note(&format!("The output {} is set to {} {}.", what, in_use, unit))?;
        Ok(in_use)
    }

    pub(crate) fn output(&mut self, enabled: bool) -> Result<bool> {
        let chan = self.channel;
        self.port
            .write(&format!("OUTP {}, (@{})", u8::from(enabled), chan))?;
        let state = self.port.query_f64(&format!("OUTP? (@{})", chan))? != 0.0;
        let text = if state { "on" } else { "off" };
        self.journal.note(&format!("The output is {}.", text))?;
        Ok(state)
    }

    pub(crate) fn read(&mut self) -> Result<f64> {
        let command = format!("MEAS:{}? (@{})", self.sense.command(), self.channel);
        let value = self.port.query_f64(&command)?;
        let (what, unit) = self.sense.describe();
        self.journal
            .note(&format!("The measured {} is {} {}.", what, value, unit))?;
        Ok(value)
    }

    pub(crate) fn read_array(&mut self) -> Result<Vec<f64>> {
        let command = format!("MEAS:ARR:{}? (@{})", self.sense.command(), self.channel);
        let values = self.port.query_list(&command)?;
        let (what, unit) = self.sense.describe();
        let average = if values.is_empty() {
            f64::NAN
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        self.journal.note(&format!(
            "Number of points measured: {}. The average measured {} is {} {}.",
            values.len(),
            what,
            average,
            unit
        ))?;
        Ok(values)
    }

    pub(crate) fn read_temperature(&mut self) -> Result<f64> {
        let temp = self.port.query_f64("MEAS:TEMP?")?;
        self.journal
            .note(&format!("The measured temperature is {} C.", temp))?;
        Ok(temp)
    }
}

impl<T> common::Instrument for SourceMeter<T>
where
    T: Read + Write,
{
    fn get_names(&self) -> Vec<String> {
        let mut names = vec![self.column.clone()];
        if let Some(temp) = &self.temperature_column {
            names.push(temp.clone());
        }
        names
    }

    fn measure(&mut self, meas: &mut Measurement) -> Result<()> {
        if self.array {
            let values = self.read_array()?;
            meas.add(&self.column, values);
        } else {
            let value = self.read()?;
            meas.add(&self.column, value);
        }
        if let Some(column) = self.temperature_column.clone() {
            let temp = self.read_temperature()?;
            meas.add(&column, temp);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Instrument;
    use crate::measurement::Value;
    use crate::scpi::fake::FakeStream;

    fn smu(replies: &[&str], channel: u8, array: bool) -> Result<SourceMeter<FakeStream>> {
        SourceMeter::new(
            ScpiPort::new(FakeStream::new(replies), "fake"),
            Journal::new(None, "fake", Some(channel.to_string())),
            channel,
            SourceMode::Voltage,
            array,
            "V_IREF",
        )
    }

    // Tests for success.

    #[test]
    fn test_new_for_success() {
        smu(&[], 1, false).unwrap();
        smu(&[], 3, true).unwrap();
    }

    // Tests for failure.

    #[test]
    fn test_new_for_failure() {
        assert!(smu(&[], 0, false).is_err());
        assert!(smu(&[], 4, false).is_err());
        assert!(SourceMode::parse("power").is_err());
    }

    #[test]
    fn test_read_array_for_failure() {
        let mut dev = smu(&["1.0 ,oops"], 1, true).unwrap();
        assert!(matches!(dev.read_array(), Err(LabError::Parse { .. })));
    }

    // Tests for sanity.

    #[test]
    fn test_source_for_sanity() {
        let mut dev = smu(&["+1.000000E-05", "1"], 2, false).unwrap();
        let level = dev.source(SourceMode::Current, 1e-5, Some(3.3)).unwrap();
        assert_eq!(level, 1e-5);
        assert!(dev.output(true).unwrap());
        assert_eq!(
            dev.port.get_ref().commands(),
            vec![
                "CURR 0.00001, (@2)",
                "VOLT:LIM 3.3, (@2)",
                "CURR? (@2)",
                "OUTP 1, (@2)",
                "OUTP? (@2)"
            ]
        );
    }

    #[test]
    fn test_measure_for_sanity() {
        let mut dev = smu(&["+1.2000E+00", "+2.81E+01"], 3, false)
            .unwrap()
            .with_temperature("TEMP");
        let mut meas = Measurement::new();
        dev.measure(&mut meas).unwrap();
        assert_eq!(meas.get("V_IREF"), Some(&Value::Scalar(1.2)));
        assert_eq!(meas.get("TEMP"), Some(&Value::Scalar(28.1)));
        assert_eq!(dev.get_names(), vec!["V_IREF", "TEMP"]);
        assert_eq!(
            dev.port.get_ref().commands(),
            vec!["MEAS:VOLT? (@3)", "MEAS:TEMP?"]
        );
    }

    #[test]
    fn test_measure_array_for_sanity() {
        let mut dev = smu(&["1.19 ,1.2 ,1.21"], 1, true).unwrap();
        let mut meas = Measurement::new();
        dev.measure(&mut meas).unwrap();
        assert_eq!(meas.get("V_IREF"), Some(&Value::Sequence(vec![1.19, 1.2, 1.21])));
        assert_eq!(dev.port.get_ref().commands(), vec!["MEAS:ARR:VOLT? (@1)"]);
    }
}
