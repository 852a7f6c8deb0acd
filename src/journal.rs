use std::fs;
use std::io::Write;
use std::path;

use chrono::{DateTime, Local};
use log::info;

use crate::error::Result;

/// Human-readable log of what an instrument was told to do and what it read.
pub(crate) struct Journal {
    path: Option<path::PathBuf>,
    address: String,
    channel: Option<String>,
}

impl Journal {
    /// Sentences go to `<name>.txt` when `name` is given; they are always logged.
    pub(crate) fn new(name: Option<&str>, address: &str, channel: Option<String>) -> Journal {
        Journal {
            path: name.map(|name| path::PathBuf::from(format!("{}.txt", name))),
            address: address.to_string(),
            channel,
        }
    }

    pub(crate) fn note(&self, sentence: &str) -> Result<()> {
        info!("[{}] {}", self.address, sentence);
        if let Some(path) = &self.path {
            let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}{}", self.preamble(Local::now()), sentence)?;
        }
        Ok(())
    }

    fn preamble(&self, at: DateTime<Local>) -> String {
        let mut out = format!("Time: {}\nAddress: {}\n", timestamp(at), self.address);
        if let Some(channel) = &self.channel {
            out.push_str(&format!("Channel: {}\n", channel));
        }
        out
    }
}

/// Compact local time stamp, `DD_MM_YYYY_HH:MM`.
pub(crate) fn timestamp(at: DateTime<Local>) -> String {
    at.format("%d_%m_%Y_%H:%M").to_string()
}
