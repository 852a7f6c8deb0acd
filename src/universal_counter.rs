use std::io::{Read, Write};

use crate::common;
use crate::counter::parse_channel;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::measurement::Measurement;
use crate::scpi::ScpiPort;

/// What the counter reads on its channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Timing {
    Frequency,
    PositiveWidth,
    NegativeWidth,
    DutyCycle,
}

impl Timing {
    pub(crate) fn parse(name: &str) -> Result<Timing> {
        match name.to_lowercase().as_str() {
            "freq" | "frequency" => Ok(Timing::Frequency),
            "1" | "pos" | "positive" | "pwidth" => Ok(Timing::PositiveWidth),
            "2" | "neg" | "negative" | "nwidth" => Ok(Timing::NegativeWidth),
            "duty" | "duty_cycle" => Ok(Timing::DutyCycle),
            _ => Err(LabError::Config(format!("unknown counter quantity '{}'.", name))),
        }
    }

    fn query(&self) -> &'static str {
        match self {
            Timing::Frequency => "MEAS:FREQ?",
            Timing::PositiveWidth => "MEAS:PWID?",
            Timing::NegativeWidth => "MEAS:NWID?",
            Timing::DutyCycle => "MEAS:PDUT?",
        }
    }

    fn describe(&self) -> (&'static str, &'static str) {
        match self {
            Timing::Frequency => ("frequency", "Hz"),
            Timing::PositiveWidth => ("positive pulse width", "s"),
            Timing::NegativeWidth => ("negative pulse width", "s"),
            Timing::DutyCycle => ("positive duty cycle", "%"),
        }
    }
}

/// Keysight 53220A universal frequency counter/timer.
pub(crate) struct UniversalCounter<T> {
    port: ScpiPort<T>,
    journal: Journal,
    channel: u8,
    timing: Timing,
    column: String,
}

impl<T> UniversalCounter<T>
where
    T: Read + Write,
{
    /// `channel` accepts `1`/`A` and `2`/`B`.
    pub(crate) fn new(
        port: ScpiPort<T>,
        journal: Journal,
        channel: &str,
        timing: Timing,
        column: &str,
    ) -> Result<UniversalCounter<T>> {
        let channel = parse_channel(channel)?;
        journal.note(&format!("The selected channel is: {}", channel))?;
        Ok(UniversalCounter {
            port,
            journal,
            channel,
            timing,
            column: column.to_string(),
        })
    }

    pub(crate) fn read(&mut self) -> Result<f64> {
        let command = format!("{} (@{})", self.timing.query(), self.channel);
        let value = self.port.query_f64(&command)?;
        let (what, unit) = self.timing.describe();
        self.journal
            .note(&format!("The measured {} is: {} {}.", what, value, unit))?;
        Ok(value)
    }
}

impl<T> common::Instrument for UniversalCounter<T>
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
