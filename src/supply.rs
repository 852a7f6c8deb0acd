use std::io::{Read, Write};

use crate::common;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::measurement::Measurement;
use crate::scpi::ScpiPort;

/// One output of a Keysight E3649A dual output power supply.
pub(crate) struct PowerSupply<T> {
    port: ScpiPort<T>,
    journal: Journal,
    output: u8,
    column: String,
    current_column: Option<String>,
}

impl<T> PowerSupply<T>
where
    T: Read + Write,
{
    pub(crate) fn new(
        port: ScpiPort<T>,
        journal: Journal,
        output: u8,
        column: &str,
    ) -> Result<PowerSupply<T>> {
        if !(1..=2).contains(&output) {
            return Err(LabError::Config(format!("supply has no output {}.", output)));
        }
        Ok(PowerSupply {
            port,
            journal,
            output,
            column: column.to_string(),
            current_column: None,
        })
    }

    /// Also record the output current under `column`.
    pub(crate) fn with_current(mut self, column: &str) -> PowerSupply<T> {
        self.current_column = Some(column.to_string());
        self
    }

    fn select(&mut self) -> Result<()> {
        self.port.write(&format!("INST:NSEL {}", self.output))
    }

    /// Program voltage and current limit, returns what the supply reports back.
    pub(crate) fn apply(&mut self, volt: f64, current: f64) -> Result<(f64, f64)> {
        if volt < 0.0 || current < 0.0 {
            return Err(LabError::Config(format!(
                "cannot apply {} V and {} A.",
                volt, current
            )));
        }
        self.select()?;
        self.port.write(&format!("VOLT {}", volt))?;
        self.port.write(&format!("CURR {}", current))?;
        let volt = self.port.query_f64("VOLT?")?;
        let current = self.port.query_f64("CURR?")?;
        self.journal.note(&format!(
            "Output {} is set to {} V with a current limit of {} A.",
            self.output, volt, current
        ))?;
        Ok((volt, current))
    }

    /// Switch both outputs, the E3649A has a single output relay.
    pub(crate) fn output(&mut self, enabled: bool) -> Result<bool> {
        let text = if enabled { "ON" } else { "OFF" };
        self.port.write(&format!("OUTP {}", text))?;
        let state = self.port.query_f64("OUTP?")? != 0.0;
        let text = if state { "on" } else { "off" };
        self.journal.note(&format!("The outputs are {}.", text))?;
        Ok(state)
    }

    pub(crate) fn read_voltage(&mut self) -> Result<f64> {
        self.select()?;
        let volt = self.port.query_f64("MEAS:VOLT?")?;
        self.journal
            .note(&format!("The measured voltage is {} V.", volt))?;
        Ok(volt)
    }

    pub(crate) fn read_current(&mut self) -> Result<f64> {
        self.select()?;
        let current = self.port.query_f64("MEAS:CURR?")?;
        self.journal
            .note(&format!("The measured current is {} A.", current))?;
        Ok(current)
    }
}

impl<T> common::Instrument for PowerSupply<T>
where
    T: Read + Write,
{
    fn get_names(&self) -> Vec<String> {
        let mut names = vec![self.column.clone()];
        if let Some(column) = &self.current_column {
            names.push(column.clone());
        }
        names
    }

    fn measure(&mut self, meas: &mut Measurement) -> Result<()> {
        let volt = self.read_voltage()?;
        let current = match self.current_column {
            Some(_) => Some(self.read_current()?),
            None => None,
        };
        meas.add(&self.column, volt);
        if let (Some(column), Some(current)) = (&self.current_column, current) {
            meas.add(column, current);
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

    fn supply(replies: &[&str], output: u8) -> Result<PowerSupply<FakeStream>> {
        PowerSupply::new(
            ScpiPort::new(FakeStream::new(replies), "fake"),
            Journal::new(None, "fake", Some(output.to_string())),
            output,
            "VDD",
        )
    }

    // Tests for success.

    #[test]
    fn test_new_for_success() {
        let psu = supply(&[], 2).unwrap();
        assert_eq!(psu.get_names(), vec!["VDD"]);
        assert!(psu.port.get_ref().commands().is_empty());
    }

    // Tests for failure.

    #[test]
    fn test_new_for_failure() {
        assert!(matches!(supply(&[], 0), Err(LabError::Config(_))));
        assert!(matches!(supply(&[], 3), Err(LabError::Config(_))));
    }

    #[test]
    fn test_apply_for_failure() {
        let mut psu = supply(&[], 1).unwrap();
        assert!(matches!(psu.apply(-1.0, 0.1), Err(LabError::Config(_))));
        assert!(psu.port.get_ref().commands().is_empty());
    }

    // Tests for sanity.

    #[test]
    fn test_apply_for_sanity() {
        let mut psu = supply(&["+3.300000E+00", "+1.000000E-01", "1"], 2).unwrap();
        assert_eq!(psu.apply(3.3, 0.1).unwrap(), (3.3, 0.1));
        assert!(psu.output(true).unwrap());
        assert_eq!(
            psu.port.get_ref().commands(),
            vec![
                "INST:NSEL 2",
                "VOLT 3.3",
                "CURR 0.1",
                "VOLT?",
                "CURR?",
                "OUTP ON",
                "OUTP?"
            ]
        );
    }

    #[test]
    fn test_measure_for_sanity() {
        let mut psu = supply(&["+3.299800E+00", "+2.510000E-02"], 1)
            .unwrap()
            .with_current("IDD");
        assert_eq!(psu.get_names(), vec!["VDD", "IDD"]);
        let mut meas = Measurement::new();
        psu.measure(&mut meas).unwrap();
        assert_eq!(meas.get("VDD"), Some(&Value::Scalar(3.2998)));
        assert_eq!(meas.get("IDD"), Some(&Value::Scalar(0.0251)));
        assert_eq!(
            psu.port.get_ref().commands(),
            vec!["INST:NSEL 1", "MEAS:VOLT?", "INST:NSEL 1", "MEAS:CURR?"]
        );
    }
}
