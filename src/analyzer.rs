use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::common;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::measurement::{Measurement, NORMAL_TAG};
use crate::scpi::{parse_f64, ScpiPort};

/// Status tags the analyzer prefixes its data with.
const TAGS: [char; 6] = [NORMAL_TAG, 'L', 'V', 'X', 'C', 'T'];

/// Longest voltage or current name the analyzer accepts.
const MAX_NAME: usize = 6;

/// Source/monitor unit types of the HP 4145B.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ChannelKind {
    Smu,
    VoltageSource,
    VoltageMonitor,
}

impl ChannelKind {
    pub(crate) fn parse(kind: &str) -> Result<ChannelKind> {
        match kind.to_lowercase().as_str() {
            "1" | "smu" => Ok(ChannelKind::Smu),
            "2" | "vs" => Ok(ChannelKind::VoltageSource),
            "3" | "vm" => Ok(ChannelKind::VoltageMonitor),
            _ => Err(LabError::Config(format!(
                "unknown analyzer channel type '{}'.",
                kind
            ))),
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            ChannelKind::Smu => "CH",
            ChannelKind::VoltageSource => "VS",
            ChannelKind::VoltageMonitor => "VM",
        }
    }

    fn channels(&self) -> u8 {
        match self {
            ChannelKind::Smu => 4,
            ChannelKind::VoltageSource | ChannelKind::VoltageMonitor => 2,
        }
    }
}

/// Output of an SMU channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SmuMode {
    Voltage,
    Current,
    Common,
}

impl SmuMode {
    pub(crate) fn parse(mode: &str) -> Result<SmuMode> {
        match mode.to_lowercase().as_str() {
            "1" | "v" => Ok(SmuMode::Voltage),
            "2" | "i" => Ok(SmuMode::Current),
            "3" | "com" => Ok(SmuMode::Common),
            _ => Err(LabError::Config(format!("unknown SMU mode '{}'.", mode))),
        }
    }

    fn code(&self) -> u8 {
        match self {
            SmuMode::Voltage => 1,
            SmuMode::Current => 2,
            SmuMode::Common => 3,
        }
    }
}

/// Role of a source channel in a measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SourceFunction {
    /// Primary sweep.
    Var1,
    /// Secondary sweep, stepped once per primary sweep.
    Var2,
    Constant,
}

impl SourceFunction {
    pub(crate) fn parse(function: &str) -> Result<SourceFunction> {
        match function.to_lowercase().as_str() {
            "1" | "var1" => Ok(SourceFunction::Var1),
            "2" | "var2" => Ok(SourceFunction::Var2),
            "3" | "const" | "constant" => Ok(SourceFunction::Constant),
            _ => Err(LabError::Config(format!("unknown source function '{}'.", function))),
        }
    }

    fn code(&self) -> u8 {
        match self {
            SourceFunction::Var1 => 1,
            SourceFunction::Var2 => 2,
            SourceFunction::Constant => 3,
        }
    }
}

/// Spacing of the VAR1 sweep points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SweepMode {
    Linear,
    /// Logarithmic, 10 points per decade.
    Log10,
    Log25,
    Log50,
}

impl SweepMode {
    pub(crate) fn parse(mode: &str) -> Result<SweepMode> {
        match mode.to_lowercase().replace(' ', "").as_str() {
            "1" | "lin" | "linear" => Ok(SweepMode::Linear),
            "2" | "log10" => Ok(SweepMode::Log10),
            "3" | "log25" => Ok(SweepMode::Log25),
            "4" | "log50" => Ok(SweepMode::Log50),
            _ => Err(LabError::Config(format!("unknown sweep mode '{}'.", mode))),
        }
    }

    fn code(&self) -> u8 {
        match self {
            SweepMode::Linear => 1,
            SweepMode::Log10 => 2,
            SweepMode::Log25 => 3,
            SweepMode::Log50 => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum MeasureMode {
    Single,
    Repeat,
    Append,
    Stop,
}

impl MeasureMode {
    pub(crate) fn parse(mode: &str) -> Result<MeasureMode> {
        match mode.to_lowercase().as_str() {
            "1" | "single" => Ok(MeasureMode::Single),
            "2" | "repeat" => Ok(MeasureMode::Repeat),
            "3" | "append" => Ok(MeasureMode::Append),
            "4" | "stop" => Ok(MeasureMode::Stop),
            _ => Err(LabError::Config(format!("unknown measure mode '{}'.", mode))),
        }
    }

    fn code(&self) -> u8 {
        match self {
            MeasureMode::Single => 1,
            MeasureMode::Repeat => 2,
            MeasureMode::Append => 3,
            MeasureMode::Stop => 4,
        }
    }
}

/// Channel definition of the analyzer.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ChannelDef {
    pub(crate) kind: ChannelKind,
    pub(crate) number: u8,
    pub(crate) vname: String,
    pub(crate) iname: Option<String>,
    pub(crate) mode: SmuMode,
    /// Ignored for voltage monitors.
    pub(crate) function: SourceFunction,
}

impl ChannelDef {
    fn validate(&self) -> Result<()> {
        if self.number == 0 || self.number > self.kind.channels() {
            return Err(LabError::Config(format!(
                "{} channel {} does not exist.",
                self.kind.prefix(),
                self.number
            )));
        }
        for name in std::iter::once(&self.vname).chain(self.iname.as_ref()) {
            if name.is_empty() || name.len() > MAX_NAME {
                return Err(LabError::Config(format!(
                    "channel name '{}' must be 1 to {} characters.",
                    name, MAX_NAME
                )));
            }
        }
        if self.kind == ChannelKind::Smu && self.iname.is_none() {
            return Err(LabError::Config("an SMU channel needs a current name.".to_string()));
        }
        if self.kind == ChannelKind::Smu
            && self.mode == SmuMode::Common
            && self.function != SourceFunction::Constant
        {
            return Err(LabError::Config(
                "a common SMU channel must be a constant source.".to_string(),
            ));
        }
        Ok(())
    }

    fn command(&self) -> String {
        let vname = self.vname.to_uppercase();
        match self.kind {
            ChannelKind::Smu => format!(
                "DE CH{},'{}','{}',{},{}",
                self.number,
                vname,
                self.iname.as_deref().unwrap_or_default().to_uppercase(),
                self.mode.code(),
                self.function.code()
            ),
            ChannelKind::VoltageSource => {
                format!("DE VS{},'{}',{}", self.number, vname, self.function.code())
            }
            ChannelKind::VoltageMonitor => format!("DE VM{},'{}'", self.number, vname),
        }
    }
}

/// Split a data output reply (`N+1.234E-03,C+1.000E-01,...`) into status categories.
pub(crate) fn parse_reply(reply: &str) -> Result<BTreeMap<char, Vec<f64>>> {
    let mut categories: BTreeMap<char, Vec<f64>> =
        TAGS.iter().map(|tag| (*tag, Vec::new())).collect();
    for item in reply.split(',') {
        let item = item.trim();
        let mut chars = item.chars();
        match chars.next() {
            Some(tag) if tag.is_ascii_alphabetic() => {
                let value = parse_f64(chars.as_str())?;
                categories.entry(tag).or_default().push(value);
            }
            _ => {
                return Err(LabError::Parse {
                    reply: item.to_string(),
                    reason: "missing status tag".to_string(),
                })
            }
        }
    }
    Ok(categories)
}

/// One channel of an HP 4145B semiconductor parameter analyzer.
pub(crate) struct ParameterAnalyzer<T> {
    port: ScpiPort<T>,
    journal: Journal,
    channel: ChannelDef,
    mode: MeasureMode,
    read_current: bool,
    column: String,
}

impl<T> ParameterAnalyzer<T>
where
    T: Read + Write,
{
    /// `read_current` selects the channel's current name for data output instead of its
    /// voltage name.
    pub(crate) fn new(
        port: ScpiPort<T>,
        journal: Journal,
        channel: ChannelDef,
        mode: MeasureMode,
        read_current: bool,
        column: &str,
    ) -> Result<ParameterAnalyzer<T>> {
        channel.validate()?;
        if read_current && channel.iname.is_none() {
            return Err(LabError::Config(format!(
                "channel '{}' has no current to read.",
                channel.vname
            )));
        }
        Ok(ParameterAnalyzer {
            port,
            journal,
            channel,
            mode,
            read_current,
            column: column.to_string(),
        })
    }

    /// Integration time (1 short, 2 medium, 3 long), auto calibration on, data ready off and
    /// buffer cleared.
    pub(crate) fn start(&mut self, integration: u8) -> Result<()> {
        if !(1..=3).contains(&integration) {
            return Err(LabError::Config(format!(
                "integration time must be 1, 2 or 3, not {}.",
                integration
            )));
        }
        let commands = [
            format!("IT{}", integration),
            "CA1".to_string(),
            "DR0".to_string(),
            "BC".to_string(),
        ];
        for command in commands {
            self.port.write(&command)?;
        }
        self.journal.note(&format!(
            "Started the device with integration time IT{}.",
            integration
        ))
    }

    pub(crate) fn define(&mut self) -> Result<()> {
        self.port.write(&self.channel.command())?;
        self.journal.note(&format!(
            "Channel {}{} defined with voltage name {}.",
            self.channel.kind.prefix(),
            self.channel.number,
            self.channel.vname.to_uppercase()
        ))
    }

    /// Disable the channel.
    pub(crate) fn turn_off(&mut self) -> Result<()> {
        let command = format!("DE {}{}", self.channel.kind.prefix(), self.channel.number);
        self.port.write(&command)
    }

    /// Constant output `level`; `compliance` applies to SMU channels only.
    pub(crate) fn source_constant(&mut self, level: f64, compliance: f64) -> Result<()> {
        if self.channel.function != SourceFunction::Constant {
            return Err(LabError::Config(format!(
                "channel {}{} is a {:?} sweep, not a constant source.",
                self.channel.kind.prefix(),
                self.channel.number,
                self.channel.function
            )));
        }
        let number = self.channel.number;
        let command = match (self.channel.kind, self.channel.mode) {
            (ChannelKind::Smu, SmuMode::Voltage) => {
                format!("SS VC{},{},{}", number, level, compliance)
            }
            (ChannelKind::Smu, SmuMode::Current) => {
                format!("SS IC{},{},{}", number, level, compliance)
            }
            (ChannelKind::VoltageSource, _) => format!("SS SC{},{}", number, level),
            (kind, mode) => {
                return Err(LabError::Config(format!(
                    "{:?} channel in {:?} mode cannot source.",
                    kind, mode
                )))
            }
        };
        self.port.write(&command)?;
        self.journal.note(&format!(
            "Constant source {}{} set to {} (compliance {}).",
            self.channel.kind.prefix(),
            number,
            level,
            compliance
        ))
    }

    /// `V` or `I`, depending on what the channel sources in a sweep.
    fn sweep_source(&self, function: SourceFunction) -> Result<char> {
        if self.channel.function != function {
            return Err(LabError::Config(format!(
                "channel {}{} is defined as {:?}, not {:?}.",
                self.channel.kind.prefix(),
                self.channel.number,
                self.channel.function,
                function
            )));
        }
        match (self.channel.kind, self.channel.mode) {
            (ChannelKind::Smu, SmuMode::Voltage) | (ChannelKind::VoltageSource, _) => Ok('V'),
            (ChannelKind::Smu, SmuMode::Current) => Ok('I'),
            (kind, mode) => Err(LabError::Config(format!(
                "{:?} channel in {:?} mode cannot sweep.",
                kind, mode
            ))),
        }
    }

    /// Primary sweep from `start` to `stop`; `step` is only sent for linear sweeps.
    pub(crate) fn source_var1(
        &mut self,
        sweep: SweepMode,
        start: f64,
        stop: f64,
        step: Option<f64>,
        compliance: f64,
    ) -> Result<()> {
        let source = self.sweep_source(SourceFunction::Var1)?;
        let command = match (sweep, step) {
            (SweepMode::Linear, Some(step)) => format!(
                "SS {}R1,{},{},{},{}",
                source, start, stop, step, compliance
            ),
            (SweepMode::Linear, None) => {
                return Err(LabError::Config("a linear sweep needs a step.".to_string()))
            }
            (sweep, _) => format!(
                "SS {}R{},{},{},{}",
                source,
                sweep.code(),
                start,
                stop,
                compliance
            ),
        };
        self.port.write(&command)?;
        self.journal.note(&format!(
            "VAR1 sweeps {:?} from {} to {} (compliance {}).",
            sweep, start, stop, compliance
        ))
    }

    /// Secondary sweep of `steps` points starting at `start`.
    pub(crate) fn source_var2(
        &mut self,
        start: f64,
        step: f64,
        steps: u32,
        compliance: f64,
    ) -> Result<()> {
        let source = self.sweep_source(SourceFunction::Var2)?;
        self.port.write(&format!(
            "SS {}P {},{},{},{}",
            source, start, step, steps, compliance
        ))?;
        self.journal.note(&format!(
            "VAR2 steps {} times by {} from {} (compliance {}).",
            steps, step, start, compliance
        ))
    }

    pub(crate) fn read(&mut self) -> Result<BTreeMap<char, Vec<f64>>> {
        let name = if self.read_current {
            self.channel.iname.clone().unwrap_or_default()
        } else {
            self.channel.vname.clone()
        }
        .to_uppercase();
        self.port.write(&format!("MD ME{}", self.mode.code()))?;
        let reply = self.port.query(&format!("DO '{}'", name))?;
        let categories = parse_reply(&reply)?;
        let points: usize = categories.values().map(Vec::len).sum();
        self.journal
            .note(&format!("Measured {} points of {}.", points, name))?;
        Ok(categories)
    }
}

impl<T> common::Instrument for ParameterAnalyzer<T>
where
    T: Read + Write,
{
    fn get_names(&self) -> Vec<String> {
        vec![self.column.clone()]
    }

    fn measure(&mut self, meas: &mut Measurement) -> Result<()> {
        let categories = self.read()?;
        meas.add(&self.column, categories);
        Ok(())
    }
}
