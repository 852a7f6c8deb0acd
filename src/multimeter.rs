use std::io::{Read, Write};

use crate::common;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::measurement::Measurement;
use crate::scpi::ScpiPort;

/// What the multimeter reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Quantity {
    VoltDc,
    VoltAc,
    CurrDc,
    CurrAc,
    Resistance,
    Capacitance,
}

/// Integration time of a DC or resistance reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Integration {
    /// Number of power line cycles.
    Nplc(f64),
    /// Aperture in seconds.
    Aperture(f64),
}

impl Quantity {
    pub(crate) fn parse(name: &str) -> Result<Quantity> {
        match name.to_lowercase().as_str() {
            "volt_dc" | "volt" | "dc" | "v" => Ok(Quantity::VoltDc),
            "volt_ac" | "ac" => Ok(Quantity::VoltAc),
            "curr_dc" | "curr" | "i" => Ok(Quantity::CurrDc),
            "curr_ac" => Ok(Quantity::CurrAc),
            "res" | "resistance" | "r" => Ok(Quantity::Resistance),
            "cap" | "capacitance" | "c" => Ok(Quantity::Capacitance),
            _ => Err(LabError::Config(format!("unknown multimeter quantity '{}'.", name))),
        }
    }

    fn query(&self) -> &'static str {
        match self {
            Quantity::VoltDc => "MEAS?",
            Quantity::VoltAc => "MEAS:AC?",
            Quantity::CurrDc => "MEAS:CURR?",
            Quantity::CurrAc => "MEAS:CURR:AC?",
            Quantity::Resistance => "MEAS:RES?",
            Quantity::Capacitance => "MEAS:CAP?",
        }
    }

    fn function(&self) -> &'static str {
        match self {
            Quantity::VoltDc => "VOLT",
            Quantity::VoltAc => "VOLT:AC",
            Quantity::CurrDc => "CURR",
            Quantity::CurrAc => "CURR:AC",
            Quantity::Resistance => "RES",
            Quantity::Capacitance => "CAP",
        }
    }

    fn description(&self) -> (&'static str, &'static str) {
        match self {
            Quantity::VoltDc => ("DC voltage", "V"),
            Quantity::VoltAc => ("AC voltage", "V"),
            Quantity::CurrDc => ("DC current", "A"),
            Quantity::CurrAc => ("AC current", "A"),
            Quantity::Resistance => ("resistance", "Ohm"),
            Quantity::Capacitance => ("capacitance", "F"),
        }
    }

    fn integrates(&self) -> bool {
        matches!(self, Quantity::VoltDc | Quantity::CurrDc | Quantity::Resistance)
    }
}

/// Keysight 34410A digital multimeter.
pub(crate) struct Multimeter<T> {
    port: ScpiPort<T>,
    journal: Journal,
    quantity: Quantity,
    column: String,
}

impl<T> Multimeter<T>
where
    T: Read + Write,
{
    pub(crate) fn new(
        port: ScpiPort<T>,
        journal: Journal,
        quantity: Quantity,
        column: &str,
    ) -> Multimeter<T> {
        Multimeter {
            port,
            journal,
            quantity,
            column: column.to_string(),
        }
    }

    /// Set a fixed measurement range, or autorange with `None`. Returns the range in use.
    pub(crate) fn set_range(&mut self, range: Option<f64>) -> Result<f64> {
        let function = self.quantity.function();
        match range {
            Some(range) => self.port.write(&format!("{}:RANG {}", function, range))?,
            None => self.port.write(&format!("{}:RANG:AUTO ON", function))?,
        }
        let in_use = self.port.query_f64(&format!("{}:RANG?", function))?;
        let (what, unit) = self.quantity.description();
        let mode = if range.is_some() { "fixed" } else { "auto" };
        self.journal
            .note(&format!("The {} range is {} {} ({}).", what, in_use, unit, mode))?;
        Ok(in_use)
    }

    /// Set the integration time, returning the value the meter reports back.
    pub(crate) fn set_integration(&mut self, integration: Integration) -> Result<f64> {
        if !self.quantity.integrates() {
            return Err(LabError::Config(format!(
                "{} readings have no integration time.",
                self.quantity.description().0
            )));
        }
        let function = self.quantity.function();
        let (setting, value, unit) = match integration {
            Integration::Nplc(cycles) => ("NPLC", cycles, "PLC"),
            Integration::Aperture(seconds) => ("APER", seconds, "s"),
        };
        self.port
            .write(&format!("{}:{} {}", function, setting, value))?;
        let in_use = self.port.query_f64(&format!("{}:{}?", function, setting))?;
        self.journal.note(&format!(
            "The integration mode is {} with {} {}.",
            setting, in_use, unit
        ))?;
        Ok(in_use)
    }

    /// Automatic input impedance: 10 GOhm on the low ranges instead of a fixed 10 MOhm.
    pub(crate) fn set_auto_impedance(&mut self, enabled: bool) -> Result<bool> {
        if self.quantity != Quantity::VoltDc {
            let msg = "input impedance applies to DC voltage only.";
            return Err(LabError::Config(msg.to_string()));
        }
        let state = if enabled { "ON" } else { "OFF" };
        self.port.write(&format!("VOLT:IMP:AUTO {}", state))?;
        let in_use = self.port.query_f64("VOLT:IMP:AUTO?")? != 0.0;
        let text = if in_use { "automatic" } else { "10 MOhm" };
        self.journal
            .note(&format!("The input impedance is {}.", text))?;
        Ok(in_use)
    }

    pub(crate) fn read(&mut self) -> Result<f64> {
        let value = self.port.query_f64(self.quantity.query())?;
        let (what, unit) = self.quantity.description();
        self.journal
            .note(&format!("The measured {} is: {} {}.", what, value, unit))?;
        Ok(value)
    }
}

impl<T> common::Instrument for Multimeter<T>
where
    T: Read + Write,
{
    fn get_names(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn measure(&mut self, meas: &mut Measurement) -> Result<()> {
        let value = self.read()?;
        meas.add(&self.column, value);
        Ok(())
    }
}
