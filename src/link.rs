//! Device links.
//!
//! The capture session only needs two things from the scanner connection:
//! send bytes, and drain whatever has arrived so far. `DeviceLink` captures
//! exactly that, so the session can run against:
//! - `SerialLink`: a real serial port (9600 8N1 by default)
//! - `StubLink`: a synthetic scanner, selected with a `stub://` device path
//! - `ScriptedLink`: canned responses for tests
//!
//! Links own their underlying handle. Dropping the link releases the port.

use anyhow::{anyhow, Context, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::frame::{FRAME_HEIGHT, FRAME_PAYLOAD_LEN, FRAME_WIDTH};
use crate::protocol::{
    find_marker, CAPTURE_TRIGGER, COMMAND_END, COMMAND_START, IMAGE_END, IMAGE_START,
};

pub const DEFAULT_DEVICE: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
const STUB_SCHEME: &str = "stub://";

/// Byte-level connection to the scanner.
pub trait DeviceLink {
    /// Send raw bytes to the device.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Drain every byte the device has sent so far. Never waits for more.
    fn read_available(&mut self) -> Result<Vec<u8>>;

    /// Human-readable description for log lines.
    fn describe(&self) -> String;
}

/// Serial port settings. Framing is always 8N1 without flow control.
#[derive(Clone, Debug)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    /// Per-read timeout of the underlying port.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Open the link named by `config.path`.
///
/// `stub://<name>` yields a `StubLink`; anything else is treated as a serial
/// device path.
pub fn open_link(config: &SerialConfig) -> Result<Box<dyn DeviceLink>> {
    if let Some(name) = config.path.strip_prefix(STUB_SCHEME) {
        log::info!("using synthetic scanner '{}'", name);
        return Ok(Box::new(StubLink::new(name)));
    }
    Ok(Box::new(SerialLink::open(config)?))
}

// ----------------------------------------------------------------------------
// SerialLink
// ----------------------------------------------------------------------------

pub struct SerialLink {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialLink {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(config.path.as_str(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .with_context(|| format!("failed to open serial device {}", config.path))?;
        log::info!(
            "opened serial device {} at {} baud (8N1)",
            config.path,
            config.baud_rate
        );
        Ok(Self {
            port,
            path: config.path.clone(),
        })
    }
}

impl DeviceLink for SerialLink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .with_context(|| format!("write to {}", self.path))?;
        self.port
            .flush()
            .with_context(|| format!("flush {}", self.path))?;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let pending = self
                .port
                .bytes_to_read()
                .with_context(|| format!("query pending bytes on {}", self.path))?
                as usize;
            if pending == 0 {
                break;
            }
            let mut chunk = vec![0u8; pending];
            let read = match self.port.read(&mut chunk) {
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::TimedOut => break,
                Err(err) => return Err(err).with_context(|| format!("read {}", self.path)),
            };
            if read == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..read]);
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.path)
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        log::info!("releasing serial device {}", self.path);
    }
}

// ----------------------------------------------------------------------------
// StubLink: synthetic scanner
// ----------------------------------------------------------------------------

/// Synthetic scanner.
///
/// Each write queues the device's replies; each `read_available` hands out
/// the next queued reply. A capture trigger produces an acknowledgement on the
/// first read and a complete image frame on the second.
pub struct StubLink {
    name: String,
    replies: VecDeque<Vec<u8>>,
}

impl StubLink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: VecDeque::new(),
        }
    }

    fn synthetic_frame() -> Vec<u8> {
        let cx = FRAME_WIDTH as i32 / 2;
        let cy = FRAME_HEIGHT as i32 / 2;
        let mut payload = Vec::with_capacity(FRAME_PAYLOAD_LEN);
        for y in 0..FRAME_HEIGHT as i32 {
            for x in 0..FRAME_WIDTH as i32 {
                let r2 = ((x - cx).pow(2) + (y - cy).pow(2)) as f64;
                let ridge = (r2.sqrt() as u32 / 4) % 2 == 0;
                let value = if ridge { 40 } else { 215 };
                payload.extend_from_slice(&[value, value, value]);
            }
        }

        let mut out = b"\x00\x13noise".to_vec();
        out.extend_from_slice(IMAGE_START);
        out.extend_from_slice(&payload);
        out.extend_from_slice(IMAGE_END);
        out.extend_from_slice(b"\r\n");
        out
    }
}

impl DeviceLink for StubLink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes == CAPTURE_TRIGGER {
            self.replies.push_back(b"Place finger on the sensor\r\n".to_vec());
            self.replies.push_back(Self::synthetic_frame());
        } else if bytes.starts_with(COMMAND_START) {
            let end = find_marker(bytes, COMMAND_END, COMMAND_START.len())
                .ok_or_else(|| anyhow!("unterminated command envelope"))?;
            let name = String::from_utf8_lossy(&bytes[COMMAND_START.len()..end]);
            self.replies
                .push_back(format!("<R>{}:OK</R>", name).into_bytes());
        }
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        Ok(self.replies.pop_front().unwrap_or_default())
    }

    fn describe(&self) -> String {
        format!("{}{}", STUB_SCHEME, self.name)
    }
}

// ----------------------------------------------------------------------------
// ScriptedLink: test double
// ----------------------------------------------------------------------------

/// Link that replays queued responses and records every write.
#[derive(Default)]
pub struct ScriptedLink {
    responses: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    disconnected: bool,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes returned by the next unanswered `read_available`.
    pub fn respond(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.responses.push_back(bytes.into());
        self
    }

    /// Make every later operation fail, as if the cable was pulled.
    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }

    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }
}

impl DeviceLink for ScriptedLink {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.disconnected {
            return Err(anyhow!("scripted link disconnected"));
        }
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        if self.disconnected {
            return Err(anyhow!("scripted link disconnected"));
        }
        Ok(self.responses.pop_front().unwrap_or_default())
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

impl<L: DeviceLink + ?Sized> DeviceLink for Box<L> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn read_available(&mut self) -> Result<Vec<u8>> {
        (**self).read_available()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
