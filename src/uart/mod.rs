pub mod protocol;
pub mod termios;

pub use protocol::*;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ArmError, Result};

pub const DEFAULT_DEVICE: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD: u32 = 115200;

/// Serial line parameters, read from the hardware parameters of the description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig{
    pub device: String,
    pub baud_rate: u32,
    pub read_timeout_ds: u8,    //VTIME, deciseconds
    pub min_read_bytes: u8,     //VMIN
    pub settle: Duration,
    pub encoding: CommandEncoding,
    pub write_retries: u32,
}

impl Default for SerialConfig{
    fn default() -> Self{
        SerialConfig{
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUD,
            read_timeout_ds: 10,
            min_read_bytes: 0,
            settle: Duration::from_millis(1000),
            encoding: CommandEncoding::Frame,
            write_retries: 3,
        }
    }
}

fn parse_param<T: FromStr>(params: &HashMap<String, String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match params.get(key){
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ArmError::invalid_parameter(key, format!("'{}': {}", raw, e))),
        None => Ok(None),
    }
}

impl SerialConfig{
    pub fn from_parameters(params: &HashMap<String, String>) -> Result<Self>{
        let mut config = SerialConfig::default();

        if let Some(device) = params.get("device"){
            if device.trim().is_empty(){
                return Err(ArmError::invalid_parameter("device", "empty path"));
            }
            config.device = device.trim().to_string();
        }
        if let Some(baud) = parse_param::<u32>(params, "baud_rate")?{
            if termios::baud_to_speed(baud).is_none(){
                return Err(ArmError::invalid_parameter("baud_rate", format!("unsupported rate {}", baud)));
            }
            config.baud_rate = baud;
        }
        if let Some(vtime) = parse_param::<u8>(params, "read_timeout_ds")?{
            config.read_timeout_ds = vtime;
        }
        if let Some(vmin) = parse_param::<u8>(params, "min_read_bytes")?{
            config.min_read_bytes = vmin;
        }
        if let Some(ms) = parse_param::<u64>(params, "settle_ms")?{
            config.settle = Duration::from_millis(ms);
        }
        if let Some(encoding) = parse_param::<CommandEncoding>(params, "command_encoding")?{
            config.encoding = encoding;
        }
        if let Some(retries) = parse_param::<u32>(params, "write_retries")?{
            config.write_retries = retries;
        }

        Ok(config)
    }
}

/// Open, exclusively locked and configured serial device.
///
/// The descriptor (and with it the `flock`) is released when the link is dropped.
pub struct SerialLink{
    file: File,
    device: String,
}

impl SerialLink{
    pub fn open(config: &SerialConfig) -> Result<Self>{
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_SYNC)
            .open(&config.device)
            .map_err(|source| ArmError::Open{ device: config.device.clone(), source })?;

        //any early return below drops `file` and closes the descriptor
        if unsafe{ libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == -1{
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock{
                warn!(device = %config.device, "serial device already locked");
                return Err(ArmError::DeviceLocked{ device: config.device.clone() });
            }
            return Err(ArmError::Open{ device: config.device.clone(), source: err });
        }

        termios::configure(file.as_raw_fd(), config)?;

        if !config.settle.is_zero(){
            debug!(settle_ms = config.settle.as_millis() as u64, "waiting for device to settle");
            thread::sleep(config.settle);
        }

        info!(device = %config.device, baud = config.baud_rate, "serial link configured");
        Ok(SerialLink{ file, device: config.device.clone() })
    }

    pub fn device(&self) -> &str{
        &self.device
    }

    pub fn attributes(&self) -> Result<libc::termios>{
        termios::get_attributes(self.file.as_raw_fd())
    }
}

impl AsRawFd for SerialLink{
    fn as_raw_fd(&self) -> RawFd{
        self.file.as_raw_fd()
    }
}

impl Write for SerialLink{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>{
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()>{
        self.file.flush()
    }
}

impl std::fmt::Debug for SerialLink{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result{
        f.debug_struct("SerialLink")
            .field("device", &self.device)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

fn is_transient(kind: io::ErrorKind) -> bool{
    matches!(kind, io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Write all of `bytes`, continuing after short writes and retrying transient errors.
pub fn transmit(port: &mut dyn Write, bytes: &[u8], retries: u32) -> Result<()>{
    let mut sent = 0;
    let mut attempts = 0;

    while sent < bytes.len(){
        match port.write(&bytes[sent..]){
            Ok(0) =>{
                return Err(ArmError::ShortWrite{ sent, expected: bytes.len() });
            }
            Ok(n) => sent += n,
            Err(e) if is_transient(e.kind()) && attempts < retries =>{
                attempts += 1;
                warn!(error = %e, attempt = attempts, "transient serial write error, retrying");
            }
            Err(e) if is_transient(e.kind()) =>{
                warn!(error = %e, sent, expected = bytes.len(), "giving up on serial write");
                return Err(ArmError::ShortWrite{ sent, expected: bytes.len() });
            }
            Err(e) => return Err(ArmError::Write(e)),
        }
    }

    port.flush().map_err(ArmError::Write)
}

pub fn list_ports() -> Result<Vec<String>>{
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
