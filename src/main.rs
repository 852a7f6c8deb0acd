#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

use std::env;
use std::io::{Read, Write};
use std::path;
use std::process;
use std::thread;
use std::time;

use log::{debug, error, info, warn};

mod analyzer;
mod collector;
mod common;
mod config;
mod counter;
mod error;
mod journal;
mod measurement;
mod multimeter;
mod oscilloscope;
mod schema;
mod scpi;
mod sink;
mod smu;
mod supply;
mod universal_counter;

use crate::collector::DataCollector;
use crate::error::{LabError, Result};
use crate::journal::Journal;
use crate::measurement::Measurement;
use crate::scpi::ScpiPort;

/// Numeric channel of an instrument table.
fn channel_number(cfg: &config::InstrumentConfig) -> Result<u8> {
    let channel = cfg.require("channel", &cfg.channel)?.to_string();
    channel
        .parse()
        .map_err(|_| LabError::Config(format!("'{}' is not a channel number.", channel)))
}

fn build_multimeter<T>(
    cfg: &config::InstrumentConfig,
    port: ScpiPort<T>,
    journal: Journal,
) -> Result<multimeter::Multimeter<T>>
where
    T: Read + Write,
{
    let quantity = multimeter::Quantity::parse(cfg.require("quantity", &cfg.quantity)?)?;
    let mut dmm = multimeter::Multimeter::new(port, journal, quantity, &cfg.column);
    if let Some(range) = cfg.range {
        dmm.set_range(Some(range))?;
    }
    let integration = match (cfg.nplc, cfg.aperture) {
        (Some(_), Some(_)) => {
            return Err(LabError::Config(
                "set either 'nplc' or 'aperture', not both.".to_string(),
            ))
        }
        (Some(cycles), None) => Some(multimeter::Integration::Nplc(cycles)),
        (None, Some(seconds)) => Some(multimeter::Integration::Aperture(seconds)),
        (None, None) => None,
    };
    if let Some(integration) = integration {
        dmm.set_integration(integration)?;
    }
    if let Some(enabled) = cfg.impedance_auto {
        dmm.set_auto_impedance(enabled)?;
    }
    Ok(dmm)
}

fn build_analyzer<T>(
    cfg: &config::InstrumentConfig,
    port: ScpiPort<T>,
    journal: Journal,
) -> Result<analyzer::ParameterAnalyzer<T>>
where
    T: Read + Write,
{
    let kind = analyzer::ChannelKind::parse(cfg.require("unit", &cfg.unit)?)?;
    let function = analyzer::SourceFunction::parse(cfg.function.as_deref().unwrap_or("const"))?;
    let channel = analyzer::ChannelDef {
        kind,
        number: channel_number(cfg)?,
        vname: cfg.require("vname", &cfg.vname)?.clone(),
        iname: cfg.iname.clone(),
        mode: analyzer::SmuMode::parse(cfg.source.as_deref().unwrap_or("v"))?,
        function,
    };
    let mode = analyzer::MeasureMode::parse(cfg.mode.as_deref().unwrap_or("single"))?;
    let read_current = match cfg.read.as_deref().unwrap_or("voltage") {
        "voltage" | "v" => false,
        "current" | "i" => true,
        other => return Err(LabError::Config(format!("cannot read '{}'.", other))),
    };
    let mut spa =
        analyzer::ParameterAnalyzer::new(port, journal, channel, mode, read_current, &cfg.column)?;
    spa.start(cfg.integration.unwrap_or(1))?;
    spa.turn_off()?;
    spa.define()?;

    // only SMU channels have a compliance.
    let compliance = || match kind {
        analyzer::ChannelKind::Smu => cfg.require("compliance", &cfg.compliance).copied(),
        _ => Ok(cfg.compliance.unwrap_or_default()),
    };
    match function {
        analyzer::SourceFunction::Constant => {
            if let Some(level) = cfg.level {
                spa.source_constant(level, compliance()?)?;
            }
        }
        analyzer::SourceFunction::Var1 => {
            let sweep = analyzer::SweepMode::parse(cfg.sweep.as_deref().unwrap_or("linear"))?;
            let start = *cfg.require("start", &cfg.start)?;
            let stop = *cfg.require("stop", &cfg.stop)?;
            spa.source_var1(sweep, start, stop, cfg.step, compliance()?)?;
        }
        analyzer::SourceFunction::Var2 => {
            let start = *cfg.require("start", &cfg.start)?;
            let step = *cfg.require("step", &cfg.step)?;
            let steps = *cfg.require("steps", &cfg.steps)?;
            spa.source_var2(start, step, steps, compliance()?)?;
        }
    }
    Ok(spa)
}

/// Instantiates the right instrument type based on the config, talking over `port`.
fn build_instrument<T>(
    cfg: &config::InstrumentConfig,
    port: ScpiPort<T>,
    journal: Option<&str>,
) -> Result<Box<dyn common::Instrument>>
where
    T: Read + Write + 'static,
{
    let channel = cfg.channel.as_ref().map(ToString::to_string);
    let journal = Journal::new(journal, &cfg.address, channel);
    match cfg.kind.as_str() {
        "multimeter" => Ok(Box::new(build_multimeter(cfg, port, journal)?)),
        "counter" => {
            let channel = cfg.require("channel", &cfg.channel)?.to_string();
            let channel = counter::parse_channel(&channel)?;
            let mut freq = counter::FrequencyCounter::new(port, journal, channel, &cfg.column)?;
            if let Some(attenuation) = cfg.attenuation {
                freq.set_attenuation(attenuation)?;
            }
            if let Some(filter) = cfg.filter {
                freq.set_filter(filter)?;
            }
            Ok(Box::new(freq))
        }
        "universal_counter" => {
            let channel = cfg.require("channel", &cfg.channel)?.to_string();
            let timing = cfg.quantity.as_deref().unwrap_or("freq");
            let timing = universal_counter::Timing::parse(timing)?;
            Ok(Box::new(universal_counter::UniversalCounter::new(
                port,
                journal,
                &channel,
                timing,
                &cfg.column,
            )?))
        }
        "oscilloscope" => {
            let what = cfg.quantity.as_deref().unwrap_or("freq");
            let what = oscilloscope::ScopeMeasure::parse(what)?;
            Ok(Box::new(oscilloscope::Oscilloscope::new(
                port,
                journal,
                channel_number(cfg)?,
                what,
                &cfg.column,
            )?))
        }
        "supply" => {
            let output = channel_number(cfg)?;
            let mut psu = supply::PowerSupply::new(port, journal, output, &cfg.column)?;
            if let Some(column) = &cfg.current_column {
                psu = psu.with_current(column);
            }
            if let Some(volt) = cfg.level {
                psu.apply(volt, *cfg.require("limit", &cfg.limit)?)?;
            }
            if cfg.enable_output {
                psu.output(true)?;
            }
            Ok(Box::new(psu))
        }
        "smu" => {
            let sense = smu::SourceMode::parse(cfg.require("sense", &cfg.sense)?)?;
            let channel = channel_number(cfg)?;
            let mut dev =
                smu::SourceMeter::new(port, journal, channel, sense, cfg.array, &cfg.column)?;
            if let Some(column) = &cfg.temperature_column {
                dev = dev.with_temperature(column);
            }
            if let Some(source) = &cfg.source {
                let level = *cfg.require("level", &cfg.level)?;
                dev.source(smu::SourceMode::parse(source)?, level, cfg.limit)?;
            }
            if cfg.enable_output {
                dev.output(true)?;
            }
            Ok(Box::new(dev))
        }
        "analyzer" => Ok(Box::new(build_analyzer(cfg, port, journal)?)),
        other => Err(LabError::Config(format!("unknown instrument type '{}'.", other))),
    }
}

/// Common SCPI housekeeping: optional reset, clear status, identify and drain one error.
fn setup_port<T>(name: &str, port: &mut ScpiPort<T>, reset: bool) -> Result<()>
where
    T: Read + Write,
{
    if reset {
        port.reset(time::Duration::from_secs(1))?;
    }
    port.clear_errors()?;
    info!("'{}' is {} at {}.", name, port.identify()?, port.address());
    debug!("'{}' error queue: {}.", name, port.pop_error()?);
    Ok(())
}

/// Opens the VISA session of an instrument and sets it up.
fn create_instrument(
    name: &str,
    cfg: &config::InstrumentConfig,
    general: &config::General,
) -> Result<Box<dyn common::Instrument>> {
    let timeout = time::Duration::from_secs_f64(general.timeout);
    let mut port = ScpiPort::open(&cfg.address, timeout)?;
    // the HP 4145B predates the common SCPI commands.
    if cfg.kind != "analyzer" {
        setup_port(name, &mut port, general.reset)?;
    }
    build_instrument(cfg, port, general.journal.as_deref())
}

/// Given the configuration set up all instruments.
fn get_instruments(
    cfg: &config::Config,
    general: &config::General,
) -> Result<Vec<Box<dyn common::Instrument>>> {
    let mut instruments = Vec::new();
    for name in &general.instruments {
        let instrument_cfg = cfg.instrument(name)?;
        instruments.push(create_instrument(name, &instrument_cfg, general)?);
    }
    Ok(instruments)
}

/// Fail before measuring if an instrument writes a column the schema lacks.
fn check_columns(data: &DataCollector, instruments: &[Box<dyn common::Instrument>]) -> Result<()> {
    let mut unknown: Vec<String> = instruments
        .iter()
        .flat_map(|instrument| instrument.get_names())
        .filter(|name| !data.contains(name))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort();
    unknown.dedup();
    Err(LabError::UnknownColumns(unknown))
}

/// One measurement from every instrument.
fn sample(instruments: &mut [Box<dyn common::Instrument>]) -> Result<Measurement> {
    let mut meas = Measurement::new();
    for instrument in instruments.iter_mut() {
        instrument.measure(&mut meas)?;
    }
    if let (Some(time_in), Some(time_out)) = (meas.time_in(), meas.time_out()) {
        debug!("sampled from {} to {}.", time_in, time_out);
    }
    if !meas.error().is_empty() {
        warn!("measurement flagged with '{}'.", meas.error());
    }
    Ok(meas)
}

/// The actual measurement loop, `interval` seconds between two samples.
fn collect(
    data: &mut DataCollector,
    instruments: &mut [Box<dyn common::Instrument>],
    iterations: usize,
    interval: f64,
) -> Result<()> {
    for i in 0..iterations {
        let meas = sample(instruments)?;
        if meas.is_empty() {
            warn!("iteration {} produced no readings.", i);
        } else {
            let rows = data.add(&meas)?;
            info!("iteration {}: {} row(s), {} in total.", i, rows, data.len());
        }
        if i + 1 < iterations {
            thread::sleep(time::Duration::from_secs_f64(interval));
        }
    }
    Ok(())
}

/// Save the table; rows collected before a failure are saved too and the failure returned.
fn finish(
    data: &DataCollector,
    output: &path::Path,
    collected: Result<()>,
) -> Result<path::PathBuf> {
    match collected {
        Ok(()) => {
            if data.is_empty() {
                warn!("no data collected.");
            }
            data.save(output)
        }
        Err(err) => {
            if !data.is_empty() {
                match data.save(output) {
                    Ok(path) => warn!(
                        "saved {} row(s) to '{}' before failing.",
                        data.len(),
                        path.display()
                    ),
                    Err(save_err) => error!("could not save the collected rows: {}", save_err),
                }
            }
            Err(err)
        }
    }
}

fn run(cfg_file: &str) -> Result<path::PathBuf> {
    let cfg = config::load_config(cfg_file)?;
    let general = cfg.general()?;

    let mut data = DataCollector::new(cfg.columns()?)?;
    if let Some(progress) = &general.progress_log {
        data = data.with_checkpoint(Box::new(sink::ProgressSink::new(progress)));
    }
    info!("collecting into columns: {}.", data.header().line());

    let mut instruments = get_instruments(&cfg, &general)?;
    check_columns(&data, &instruments)?;

    let collected = collect(
        &mut data,
        &mut instruments,
        general.iterations,
        general.interval,
    );
    finish(&data, path::Path::new(&general.output), collected)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load the configuration.
    let cfg_file: String =
        env::var("EMCLAB_CONFIG").unwrap_or_else(|_| String::from("defaults.toml"));
    match run(&cfg_file) {
        Ok(path) => info!("data written to '{}'.", path.display()),
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scpi::fake::FakeStream;

    const TEST_DATA: &str = r#"
[foo]
type = "multimeter"
address = "fake"
column = "VDD"
quantity = "volt_dc"
range = 10.0

[slow]
type = "multimeter"
address = "fake"
column = "VDD"
quantity = "res"
nplc = 10.0
aperture = 0.1

[bar]
type = "counter"
address = "fake"
column = "FREQ"
channel = "B"

[clk]
type = "universal_counter"
address = "fake"
column = "CLK1"
channel = 1
quantity = "duty"

[bd]
type = "oscilloscope"
address = "fake"
column = "BD1"
channel = 3
quantity = "pwidth"

[psu]
type = "supply"
address = "fake"
column = "VDD"
current_column = "IDD"
channel = 2
level = 3.3
limit = 0.1

[baz]
type = "smu"
address = "fake"
column = "IB"
channel = 2
sense = "curr"
array = true

[spa]
type = "analyzer"
address = "fake"
column = "IB"
unit = "smu"
channel = 1
vname = "VIB"
iname = "IB"
source = "i"
read = "current"
level = 5e-6

[sweep]
type = "analyzer"
address = "fake"
column = "IB"
unit = "vs"
channel = 1
vname = "VG"
function = "var1"
sweep = "log10"
start = 0.1
stop = 10.0

[dummy]
type = "na"
address = "fake"
column = "VDD"
"#;

    fn test_config() -> config::Config {
        config::Config {
            data: toml::from_str(TEST_DATA).unwrap(),
        }
    }

    fn build(name: &str, replies: &[&str]) -> Result<Box<dyn common::Instrument>> {
        let cfg = test_config().instrument(name).unwrap();
        build_instrument(&cfg, ScpiPort::new(FakeStream::new(replies), "fake"), None)
    }

    // Tests for success.

    #[test]
    fn test_build_instrument_for_success() {
        build("foo", &["+1.0E+01"]).unwrap();
        build("bar", &[]).unwrap();
        build("baz", &[]).unwrap();
        build("sweep", &[]).unwrap();
        assert_eq!(build("clk", &[]).unwrap().get_names(), vec!["CLK1"]);
        assert_eq!(build("bd", &[]).unwrap().get_names(), vec!["BD1"]);
        let psu = build("psu", &["+3.3E+00", "+1.0E-01"]).unwrap();
        assert_eq!(psu.get_names(), vec!["VDD", "IDD"]);
    }

    // Tests for failure.

    #[test]
    fn test_build_instrument_for_failure() {
        assert!(matches!(build("dummy", &[]), Err(LabError::Config(_))));
        // compliance missing for a constant SMU source.
        assert!(matches!(build("spa", &[]), Err(LabError::Config(_))));
        // integration given twice.
        assert!(matches!(build("slow", &[]), Err(LabError::Config(_))));
        // supply never answers the read back.
        assert!(matches!(build("psu", &[]), Err(LabError::Instrument(_))));
    }

    #[test]
    fn test_check_columns_for_failure() {
        let data = DataCollector::new(Some(vec![schema::Column::new("VDD", "V")])).unwrap();
        let instruments = vec![build("bar", &[]).unwrap(), build("baz", &[]).unwrap()];
        match check_columns(&data, &instruments) {
            Err(LabError::UnknownColumns(names)) => assert_eq!(names, vec!["FREQ", "IB"]),
            _ => panic!("expected unknown columns."),
        }
    }

    #[test]
    fn test_run_for_failure() {
        assert!(run("does_not_exist.toml").is_err());
    }

    #[test]
    fn test_create_instrument_for_failure() {
        let cfg = test_config();
        let general: config::General = toml::from_str("output = \"out\"").unwrap();
        let foo = cfg.instrument("foo").unwrap();
        assert!(create_instrument("foo", &foo, &general).is_err());
    }

    #[test]
    fn test_finish_for_failure() {
        let dir = tempfile::tempdir().unwrap();
        // two readings after the range read back, then the instrument goes silent.
        let replies = ["+1.0E+01", "+3.3E+00", "+3.4E+00"];
        let mut instruments = vec![build("foo", &replies).unwrap()];
        let mut data = DataCollector::new(None).unwrap();

        let collected = collect(&mut data, &mut instruments, 5, 0.0);
        assert!(matches!(collected, Err(LabError::Instrument(_))));
        let output = dir.path().join("partial");
        assert!(matches!(
            finish(&data, &output, collected),
            Err(LabError::Instrument(_))
        ));

        let (labels, rows) = sink::read_csv(dir.path().join("partial.csv")).unwrap();
        assert_eq!(rows.len(), 2);
        let vdd = labels.iter().position(|label| label == "VDD [V]").unwrap();
        assert_eq!(rows[0][vdd], 3.3);
        assert_eq!(rows[1][vdd], 3.4);
    }

    // Tests for sanity.

    #[test]
    fn test_setup_port_for_sanity() {
        let replies = ["Agilent Technologies,34410A,MY0000,2.35", "+0,\"No error\""];
        let mut port = ScpiPort::new(FakeStream::new(&replies), "fake");
        setup_port("dmm", &mut port, false).unwrap();
        assert_eq!(port.get_ref().commands(), vec!["*CLS", "*IDN?", "SYST:ERR?"]);
    }

    #[test]
    fn test_finish_for_sanity() {
        // nothing collected before the failure, nothing saved.
        let dir = tempfile::tempdir().unwrap();
        let data = DataCollector::new(None).unwrap();
        let output = dir.path().join("failed");
        let failed = Err(LabError::EmptyMeasurement);
        assert!(matches!(finish(&data, &output, failed), Err(LabError::EmptyMeasurement)));
        assert!(!dir.path().join("failed.csv").exists());
    }

    #[test]
    fn test_collect_for_sanity() {
        let dir = tempfile::tempdir().unwrap();
        let mut instruments = vec![
            build("foo", &["+1.0E+01", "+3.3E+00", "+3.4E+00"]).unwrap(),
            build("clk", &["+5.0E+01", "+4.9E+01"]).unwrap(),
        ];
        let columns = vec![
            schema::Column::new("VDD", "V"),
            schema::Column::new("CLK1", "%"),
        ];
        let mut data = DataCollector::new(Some(columns)).unwrap();
        check_columns(&data, &instruments).unwrap();
        collect(&mut data, &mut instruments, 2, 0.0).unwrap();
        assert_eq!(data.column("VDD").unwrap(), vec![3.3, 3.4]);
        assert_eq!(data.column("CLK1").unwrap(), vec![50.0, 49.0]);

        let path = finish(&data, &dir.path().join("run"), Ok(())).unwrap();
        assert_eq!(path, dir.path().join("run.csv"));
        assert_eq!(sink::read_csv(&path).unwrap().1.len(), 2);
    }

    #[test]
    fn test_sample_for_sanity() {
        let mut instruments = vec![
            build("foo", &["+1.0E+01", "+3.3E+00"]).unwrap(),
            build("baz", &["1.0E-6,2.0E-6,3.0E-6"]).unwrap(),
            build("bar", &["+1.0E+06"]).unwrap(),
        ];
        let mut data = DataCollector::new(None).unwrap();
        check_columns(&data, &instruments).unwrap();

        let meas = sample(&mut instruments).unwrap();
        assert_eq!(data.add(&meas).unwrap(), 3);
        assert_eq!(data.column("VDD").unwrap(), vec![3.3; 3]);
        assert_eq!(data.column("IB").unwrap(), vec![1.0e-6, 2.0e-6, 3.0e-6]);
        assert_eq!(data.column("FREQ").unwrap(), vec![1.0e6; 3]);
        assert!(data.column("AVDD").unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_channel_number_for_sanity() {
        let cfg = test_config();
        assert_eq!(channel_number(&cfg.instrument("baz").unwrap()).unwrap(), 2);
        assert!(channel_number(&cfg.instrument("bar").unwrap()).is_err());
        assert!(channel_number(&cfg.instrument("foo").unwrap()).is_err());
    }
}
