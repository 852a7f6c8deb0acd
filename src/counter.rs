use std::io::{Read, Write};

use crate::common;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::measurement::Measurement;
use crate::scpi::ScpiPort;

/// Input channel of the counter; accepts `1`/`A` and `2`/`B`.
pub(crate) fn parse_channel(channel: &str) -> Result<u8> {
    match channel.trim() {
        "1" | "A" | "a" => Ok(1),
        "2" | "B" | "b" => Ok(2),
        _ => Err(LabError::Config(format!("unknown counter channel '{}'.", channel))),
    }
}

/// Agilent 53132A universal frequency counter.
pub(crate) struct FrequencyCounter<T> {
    port: ScpiPort<T>,
    journal: Journal,
    channel: u8,
    column: String,
}

impl<T> FrequencyCounter<T>
where
    T: Read + Write,
{
    pub(crate) fn new(
        port: ScpiPort<T>,
        journal: Journal,
        channel: u8,
        column: &str,
    ) -> Result<FrequencyCounter<T>> {
        if channel != 1 && channel != 2 {
            return Err(LabError::Config(format!("counter has no channel {}.", channel)));
        }
        journal.note(&format!("The selected channel is: {}", channel))?;
        Ok(FrequencyCounter {
            port,
            journal,
            channel,
            column: column.to_string(),
        })
    }

    pub(crate) fn read_frequency(&mut self) -> Result<f64> {
        self.port.write(&format!(":FUNC 'FREQ {}'", self.channel))?;
        let freq = self.port.query_f64("READ:FREQ?")?;
        self.journal
            .note(&format!("The measured frequency is: {} Hz.", freq))?;
        Ok(freq)
    }

    /// Input attenuation, either 1 or 10.
    pub(crate) fn set_attenuation(&mut self, attenuation: u8) -> Result<()> {
        if attenuation != 1 && attenuation != 10 {
            return Err(LabError::Config(format!(
                "attenuation must be 1 or 10, not {}.",
                attenuation
            )));
        }
        self.port
            .write(&format!(":INP{}:ATT {}", self.channel, attenuation))?;
        self.journal
            .note(&format!("Attenuation has been set to: {}", attenuation))
    }

    /// Enable or disable the 100 kHz low-pass filter of the input.
    pub(crate) fn set_filter(&mut self, enabled: bool) -> Result<()> {
        self.port
            .write(&format!(":INP{}:FILT {}", self.channel, u8::from(enabled)))?;
        let state = if enabled { "ON" } else { "OFF" };
        self.journal
            .note(&format!("100 kHz LPF is set to: {}.", state))
    }
}

impl<T> common::Instrument for FrequencyCounter<T>
where
    T: Read + Write,
{
    fn get_names(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn measure(&mut self, meas: &mut Measurement) -> Result<()> {
        let freq = self.read_frequency()?;
        meas.add(&self.column, freq);
        Ok(())
    }
}
