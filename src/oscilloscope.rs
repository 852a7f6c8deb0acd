use std::io::{Read, Write};

use crate::common;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::measurement::Measurement;
use crate::scpi::ScpiPort;

/// Automatic measurement taken on the selected channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ScopeMeasure {
    Frequency,
    DutyCycle,
    PositiveWidth,
    NegativeWidth,
    /// Positive width derived from duty cycle and frequency.
    DerivedWidth,
}

impl ScopeMeasure {
    pub(crate) fn parse(name: &str) -> Result<ScopeMeasure> {
        match name.to_lowercase().as_str() {
            "freq" | "frequency" => Ok(ScopeMeasure::Frequency),
            "duty" | "duty_cycle" => Ok(ScopeMeasure::DutyCycle),
            "1" | "pos" | "positive" | "pwidth" => Ok(ScopeMeasure::PositiveWidth),
            "2" | "neg" | "negative" | "nwidth" => Ok(ScopeMeasure::NegativeWidth),
            "derived_width" => Ok(ScopeMeasure::DerivedWidth),
            _ => Err(LabError::Config(format!("unknown scope measurement '{}'.", name))),
        }
    }
}

/// Keysight MSO7034B mixed signal oscilloscope, one of its four analog channels.
pub(crate) struct Oscilloscope<T> {
    port: ScpiPort<T>,
    journal: Journal,
    channel: u8,
    what: ScopeMeasure,
    column: String,
}

impl<T> Oscilloscope<T>
where
    T: Read + Write,
{
    pub(crate) fn new(
        port: ScpiPort<T>,
        journal: Journal,
        channel: u8,
        what: ScopeMeasure,
        column: &str,
    ) -> Result<Oscilloscope<T>> {
        if !(1..=4).contains(&channel) {
            return Err(LabError::Config(format!("scope has no channel {}.", channel)));
        }
        let mut scope = Oscilloscope {
            port,
            journal,
            channel,
            what,
            column: column.to_string(),
        };
        scope.select()?;
        scope
            .journal
            .note(&format!("The selected channel is: {}", channel))?;
        Ok(scope)
    }

    /// Point the measurement source at this channel.
    fn select(&mut self) -> Result<()> {
        self.port
            .write(&format!(":MEASURE:SOURCE CHANNEL{}", self.channel))
    }

    pub(crate) fn read_frequency(&mut self) -> Result<f64> {
        let freq = self.port.query_f64(":MEAS:FREQ?")?;
        self.journal
            .note(&format!("The measured frequency is: {} Hz", freq))?;
        Ok(freq)
    }

    pub(crate) fn read_duty_cycle(&mut self) -> Result<f64> {
        let duty = self.port.query_f64(":MEAS:DUTY?")?;
        self.journal
            .note(&format!("The measured duty cycle is: {} %", duty))?;
        Ok(duty)
    }

    /// Width of the positive (`positive = true`) or the negative pulse.
    pub(crate) fn read_width(&mut self, positive: bool) -> Result<f64> {
        let command = if positive {
            ":MEASure:PWIDth?"
        } else {
            ":MEASure:NWIDth?"
        };
        let width = self.port.query_f64(command)?;
        self.journal
            .note(&format!("The measured width of the pulse is: {} s", width))?;
        Ok(width)
    }

    /// Positive width as `duty / (100 * frequency)`.
    pub(crate) fn derive_width(&mut self) -> Result<f64> {
        let duty = self.read_duty_cycle()?;
        let freq = self.read_frequency()?;
        if freq == 0.0 {
            return Err(LabError::Instrument(format!(
                "{} measured no frequency on channel {}.",
                self.port.address(),
                self.channel
            )));
        }
        let width = duty / (100.0 * freq);
        self.journal
            .note(&format!("The measured positive signal width is: {} s", width))?;
        Ok(width)
    }

    pub(crate) fn read(&mut self) -> Result<f64> {
        // the scope's channels may be shared by several instances.
        self.select()?;
        match self.what {
            ScopeMeasure::Frequency => self.read_frequency(),
            ScopeMeasure::DutyCycle => self.read_duty_cycle(),
            ScopeMeasure::PositiveWidth => self.read_width(true),
            ScopeMeasure::NegativeWidth => self.read_width(false),
            ScopeMeasure::DerivedWidth => self.derive_width(),
        }
    }
}

impl<T> common::Instrument for Oscilloscope<T>
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
