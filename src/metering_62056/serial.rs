//! `SerialTransport` on top of a local serial device (optical reading head)

use super::transport::{FrameFormat, LineEnd, SerialTransport};
use super::{utils, Iec62056Error};
use log::debug;
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

pub struct SerialPortTransport {
    path: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortTransport {
    /// The device is opened lazily on the first `configure` call
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, Iec62056Error> {
        self.port.as_mut().ok_or(Iec62056Error::NotConfigured)
    }

    /// Reads one byte, `None` once `timeout` passed without data
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, Iec62056Error> {
        let port = self.port()?;
        port.set_timeout(timeout)?;

        let mut byte = [0u8; 1];
        match port.read(&mut byte) {
            Ok(1) => Ok(Some(byte[0])),
            Ok(_) => Ok(None),
            Err(ref e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn framing(format: FrameFormat) -> (DataBits, Parity, StopBits) {
    match format {
        FrameFormat::SevenEvenOne => (DataBits::Seven, Parity::Even, StopBits::One),
    }
}

impl SerialTransport for SerialPortTransport {
    fn configure(&mut self, baud_rate: u32, format: FrameFormat) -> Result<(), Iec62056Error> {
        if !utils::is_standard_baud_rate(baud_rate) {
            return Err(Iec62056Error::UnsupportedBaudRate(baud_rate));
        }
        let (data_bits, parity, stop_bits) = framing(format);

        match self.port.as_mut() {
            Some(port) => {
                port.set_baud_rate(baud_rate)?;
                port.set_data_bits(data_bits)?;
                port.set_parity(parity)?;
                port.set_stop_bits(stop_bits)?;
            }
            None => {
                debug!("Opening {} at {} bps", self.path, baud_rate);
                let port = serialport::new(&self.path, baud_rate)
                    .data_bits(data_bits)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .timeout(Duration::from_millis(500))
                    .open()?;
                self.port = Some(port);
            }
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Iec62056Error> {
        self.port()?.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Iec62056Error> {
        self.port()?.flush()?;
        Ok(())
    }

    fn read_byte_nonblocking(&mut self) -> Result<Option<u8>, Iec62056Error> {
        if self.port()?.bytes_to_read()? == 0 {
            return Ok(None);
        }
        self.read_byte(Duration::from_millis(1))
    }

    fn read_line(
        &mut self,
        terminator: u8,
        timeout: Duration,
        max_length: usize,
        buf: &mut Vec<u8>,
    ) -> Result<LineEnd, Iec62056Error> {
        buf.clear();
        while buf.len() < max_length {
            match self.read_byte(timeout)? {
                Some(b) if b == terminator => return Ok(LineEnd::Terminator),
                Some(b) => buf.push(b),
                None => return Ok(LineEnd::TimedOut),
            }
        }
        Ok(LineEnd::Truncated)
    }

    fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Iec62056Error> {
        let mut data = Vec::with_capacity(n);
        while data.len() < n {
            match self.read_byte(timeout)? {
                Some(b) => data.push(b),
                None => break,
            }
        }
        Ok(data)
    }
}
