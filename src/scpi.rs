use std::io::{Read, Write};
use std::{thread, time};

use log::debug;

use crate::error::{LabError, Result};

#[cfg(feature = "instrument_visa")]
mod session {
    use std::ffi::CString;
    use std::io::{self, Read, Write};
    use std::time;

    use visa_rs::prelude::*;

    use crate::error::{LabError, Result};

    /// An open VISA session. The resource manager is kept alive alongside it.
    pub(crate) struct Session {
        instr: Instrument,
        _rm: DefaultRM,
    }

    impl Session {
        pub(crate) fn open(resource: &str, timeout: time::Duration) -> Result<Session> {
            let rm = DefaultRM::new()?;
            let name = CString::new(resource).map_err(|_| {
                LabError::Config(format!("invalid VISA resource '{}'.", resource))
            })?;
            let name = visa_rs::VisaString::from(name);
            let instr = rm.open(&name, AccessMode::NO_LOCK, timeout)?;
            Ok(Session { instr, _rm: rm })
        }
    }

    impl Read for Session {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.instr.read(buf)
        }
    }

    impl Write for Session {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.instr.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.instr.flush()
        }
    }
}

#[cfg(not(feature = "instrument_visa"))]
mod session {
    use std::io::{self, Read, Write};
    use std::time;

    use crate::error::{LabError, Result};

    /// Session of a build without VISA support; it can never be opened.
    pub(crate) enum Session {}

    impl Session {
        pub(crate) fn open(_resource: &str, _timeout: time::Duration) -> Result<Session> {
            Err(LabError::FeatureNotEnabled("instrument_visa".to_string()))
        }
    }

    impl Read for Session {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            match *self {}
        }
    }

    impl Write for Session {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            match *self {}
        }

        fn flush(&mut self) -> io::Result<()> {
            match *self {}
        }
    }
}

pub(crate) use session::Session;

/// Line-oriented SCPI command channel over any byte stream.
pub(crate) struct ScpiPort<T> {
    stream: T,
    address: String,
}

impl ScpiPort<Session> {
    /// Open a VISA resource, e.g. `GPIB0::16::INSTR` or `TCPIP0::192.168.0.10::INSTR`.
    pub(crate) fn open(address: &str, timeout: time::Duration) -> Result<ScpiPort<Session>> {
        let session = Session::open(address, timeout)?;
        debug!("opened VISA resource {}.", address);
        Ok(ScpiPort::new(session, address))
    }
}

impl<T> ScpiPort<T>
where
    T: Read + Write,
{
    pub(crate) fn new(stream: T, address: &str) -> ScpiPort<T> {
        ScpiPort {
            stream,
            address: address.to_string(),
        }
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn write(&mut self, command: &str) -> Result<()> {
        debug!("{} <- {}", self.address, command);
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }

    /// Send `command` and return the trimmed reply line.
    pub(crate) fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        let reply = self.read_line()?;
        debug!("{} -> {}", self.address, reply);
        if reply.is_empty() {
            return Err(LabError::Instrument(format!(
                "empty reply from {} to '{}'.",
                self.address, command
            )));
        }
        Ok(reply)
    }

    pub(crate) fn query_f64(&mut self, command: &str) -> Result<f64> {
        let reply = self.query(command)?;
        parse_f64(&reply)
    }

    /// Query a comma separated list of numbers.
    pub(crate) fn query_list(&mut self, command: &str) -> Result<Vec<f64>> {
        let reply = self.query(command)?;
        reply.split(',').map(parse_f64).collect()
    }

    pub(crate) fn identify(&mut self) -> Result<String> {
        self.query("*IDN?")
    }

    /// Reset the device and give it `settle` to come back.
    pub(crate) fn reset(&mut self, settle: time::Duration) -> Result<()> {
        self.write("*RST")?;
        thread::sleep(settle);
        Ok(())
    }

    pub(crate) fn clear_errors(&mut self) -> Result<()> {
        self.write("*CLS")
    }

    /// Pop a single entry off the device's error queue.
    pub(crate) fn pop_error(&mut self) -> Result<String> {
        self.query("SYST:ERR?")
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line: Vec<u8> = Vec::new();
        let mut byte = [0_u8; 1];
        loop {
            match self.stream.read(&mut byte)? {
                0 if line.is_empty() => {
                    return Err(LabError::Instrument(format!(
                        "connection to {} closed.",
                        self.address
                    )))
                }
                0 => break,
                _ if byte[0] == b'\n' => break,
                _ => line.push(byte[0]),
            }
        }
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    #[cfg(test)]
    pub(crate) fn get_ref(&self) -> &T {
        &self.stream
    }
}

/// Parse a single numeric field of an instrument reply.
pub(crate) fn parse_f64(field: &str) -> Result<f64> {
    field.trim().parse().map_err(|err: std::num::ParseFloatError| LabError::Parse {
        reply: field.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod fake {
    use std::io::{self, Cursor, Read, Write};

    /// In-memory instrument: replies are served in order, commands are recorded.
    pub(crate) struct FakeStream {
        replies: Cursor<Vec<u8>>,
        pub(crate) sent: Vec<u8>,
    }

    impl FakeStream {
        pub(crate) fn new(replies: &[&str]) -> FakeStream {
            let mut buffer = String::new();
            for reply in replies {
                buffer.push_str(reply);
                buffer.push('\n');
            }
            FakeStream {
                replies: Cursor::new(buffer.into_bytes()),
                sent: Vec::new(),
            }
        }

        pub(crate) fn commands(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.sent)
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.sent.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeStream;
    use super::*;

    // Tests for success.

    #[test]
    fn test_query_for_success() {
        let mut port = ScpiPort::new(FakeStream::new(&["Agilent,34410A,0,1.0"]), "fake");
        port.identify().unwrap();
    }

    // Tests for failure.

    #[test]
    fn test_query_for_failure() {
        // nothing left to read.
        let mut port = ScpiPort::new(FakeStream::new(&[]), "fake");
        assert!(matches!(port.query("*IDN?"), Err(LabError::Instrument(_))));

        // empty line.
        let mut port = ScpiPort::new(FakeStream::new(&[""]), "fake");
        assert!(matches!(port.query("*IDN?"), Err(LabError::Instrument(_))));

        // not a number.
        let mut port = ScpiPort::new(FakeStream::new(&["ohno"]), "fake");
        assert!(matches!(port.query_f64("MEAS?"), Err(LabError::Parse { .. })));
    }

    // Tests for sanity.

    #[test]
    fn test_query_for_sanity() {
        let mut port = ScpiPort::new(
            FakeStream::new(&["+3.30000000E+00\r", "1.0 ,2.5 , -3E-3", "+0,\"No error\""]),
            "fake",
        );
        assert_eq!(port.query_f64("MEAS?").unwrap(), 3.3);
        assert_eq!(port.query_list("MEAS:ARR:VOLT? (@1)").unwrap(), vec![1.0, 2.5, -3e-3]);
        assert_eq!(port.pop_error().unwrap(), "+0,\"No error\"");
        port.clear_errors().unwrap();
        port.reset(time::Duration::from_millis(0)).unwrap();
        assert_eq!(
            port.get_ref().commands(),
            vec!["MEAS?", "MEAS:ARR:VOLT? (@1)", "SYST:ERR?", "*CLS", "*RST"]
        );
        assert_eq!(port.address(), "fake");
    }

    #[test]
    #[cfg(not(feature = "instrument_visa"))]
    fn test_open_for_failure() {
        let res = ScpiPort::open("GPIB0::16::INSTR", time::Duration::from_millis(100));
        assert!(matches!(res, Err(LabError::FeatureNotEnabled(_))));
    }
}
