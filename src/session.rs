//! Capture session: the operator-driven request/response cycle.
//!
//! Two states only. The session sits in `Idle` until a command arrives, moves
//! to `AwaitingResponse` while it talks to the scanner and waits out the fixed
//! windows, then goes back to `Idle` whatever happened in between.
//!
//! A capture runs as:
//! 1. send the trigger
//! 2. wait the acknowledgement window, drain, report any text
//! 3. wait the transfer window, drain into a `ResponseBuffer`
//! 4. image mode: extract and save the bitmap; dump mode: hand back the bytes

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::clock::Clock;
use crate::frame::{extract, ExtractError, ResponseBuffer};
use crate::link::DeviceLink;
use crate::protocol::{encode_command, CAPTURE_TRIGGER};
use crate::ui::Ui;

pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(1);
pub const DEFAULT_TRANSFER_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_OUTPUT_PATH: &str = "fingerprint.png";

/// What to do with the bytes received in the transfer window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureMode {
    /// Extract the `<I>` frame and write it out as an image.
    #[default]
    Image,
    /// Print the raw bytes.
    Dump,
}

impl FromStr for CaptureMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(CaptureMode::Image),
            "dump" => Ok(CaptureMode::Dump),
            other => Err(anyhow!(
                "unknown capture mode '{}'; expected image or dump",
                other
            )),
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Image => write!(f, "image"),
            CaptureMode::Dump => write!(f, "dump"),
        }
    }
}

/// One operator request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `5`: capture a fingerprint.
    Capture,
    /// `:NAME`: send `<C>NAME</C>` and report the reply.
    Named(String),
}

impl Command {
    /// Parse an operator line. Lines that are not commands yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.as_bytes() == CAPTURE_TRIGGER {
            return Some(Command::Capture);
        }
        let name = line.strip_prefix(':')?.trim();
        if name.is_empty() || name.contains(['<', '>']) {
            return None;
        }
        Some(Command::Named(name.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub mode: CaptureMode,
    pub output_path: PathBuf,
    pub ack_wait: Duration,
    pub transfer_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Image,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            ack_wait: DEFAULT_ACK_WAIT,
            transfer_wait: DEFAULT_TRANSFER_WAIT,
        }
    }
}

/// Result of handling one command.
#[derive(Debug)]
pub struct Report {
    /// Text received in the acknowledgement window, if any.
    pub acknowledgement: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub enum Outcome {
    /// Frame extracted and written.
    ImageSaved { path: PathBuf, digest: String },
    /// Transfer window ended without a usable frame.
    ExtractFailed { error: ExtractError, received: usize },
    /// Raw bytes from the transfer window (dump mode).
    Dumped(ResponseBuffer),
    /// Named command sent; the reply (if any) is the acknowledgement.
    Replied,
}

pub struct Session<L, C> {
    link: L,
    clock: C,
    config: SessionConfig,
    ui: Ui,
    state: SessionState,
    captures: u64,
}

impl<L: DeviceLink, C: Clock> Session<L, C> {
    pub fn new(link: L, clock: C, config: SessionConfig) -> Self {
        Self {
            link,
            clock,
            config,
            ui: Ui::quiet(),
            state: SessionState::Idle,
            captures: 0,
        }
    }

    pub fn with_ui(mut self, ui: Ui) -> Self {
        self.ui = ui;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of frames successfully written so far.
    pub fn captures(&self) -> u64 {
        self.captures
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one command to completion. Always leaves the session `Idle`.
    pub fn handle(&mut self, command: &Command) -> Result<Report> {
        self.state = SessionState::AwaitingResponse;
        let result = match command {
            Command::Capture => self.capture(),
            Command::Named(name) => self.named(name),
        };
        self.state = SessionState::Idle;
        result
    }

    fn capture(&mut self) -> Result<Report> {
        log::debug!("sending capture trigger to {}", self.link.describe());
        self.link.write(CAPTURE_TRIGGER)?;
        let acknowledgement = self.acknowledgement()?;

        {
            let _stage = self.ui.stage("waiting for fingerprint transfer");
            self.clock.wait(self.config.transfer_wait)?;
        }
        let response = ResponseBuffer::from(self.link.read_available()?);
        log::debug!("transfer window collected {} bytes", response.len());

        let outcome = match self.config.mode {
            CaptureMode::Dump => Outcome::Dumped(response),
            CaptureMode::Image => match extract(response.as_bytes()) {
                Ok(bitmap) => {
                    bitmap.save(&self.config.output_path)?;
                    self.captures += 1;
                    let digest = bitmap.digest_hex();
                    log::info!(
                        "capture #{} written to {} (sha256={})",
                        self.captures,
                        self.config.output_path.display(),
                        digest
                    );
                    Outcome::ImageSaved {
                        path: self.config.output_path.clone(),
                        digest,
                    }
                }
                Err(error) => {
                    log::warn!(
                        "no usable frame in {} received bytes: {}",
                        response.len(),
                        error
                    );
                    Outcome::ExtractFailed {
                        error,
                        received: response.len(),
                    }
                }
            },
        };

        Ok(Report {
            acknowledgement,
            outcome,
        })
    }

    fn named(&mut self, name: &str) -> Result<Report> {
        log::debug!("sending command {} to {}", name, self.link.describe());
        self.link.write(&encode_command(name))?;
        let acknowledgement = self.acknowledgement()?;
        Ok(Report {
            acknowledgement,
            outcome: Outcome::Replied,
        })
    }

    fn acknowledgement(&mut self) -> Result<Option<String>> {
        {
            let _stage = self.ui.stage("waiting for device acknowledgement");
            self.clock.wait(self.config.ack_wait)?;
        }
        let bytes = self.link.read_available()?;
        if bytes.is_empty() {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&bytes).trim_end().to_string();
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_five_triggers_capture() {
        assert_eq!(Command::parse("5"), Some(Command::Capture));
        assert_eq!(Command::parse("5\n"), Some(Command::Capture));
        assert_eq!(Command::parse("5\r\n"), Some(Command::Capture));
        assert_eq!(Command::parse(" 5"), None);
        assert_eq!(Command::parse("55"), None);
        assert_eq!(Command::parse("4"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn colon_prefix_names_a_command() {
        assert_eq!(
            Command::parse(":CheckRegisteredNo"),
            Some(Command::Named("CheckRegisteredNo".to_string()))
        );
        assert_eq!(Command::parse(":"), None);
        assert_eq!(Command::parse(":  "), None);
        assert_eq!(Command::parse(":bad</C>"), None);
    }

    #[test]
    fn capture_mode_parses_case_insensitively() {
        assert_eq!("IMAGE".parse::<CaptureMode>().unwrap(), CaptureMode::Image);
        assert_eq!("dump".parse::<CaptureMode>().unwrap(), CaptureMode::Dump);
        assert!("bitmap".parse::<CaptureMode>().is_err());
        assert_eq!(CaptureMode::Dump.to_string(), "dump");
    }
}
