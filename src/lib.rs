//! Fingerprint scanner capture tool.
//!
//! Drives a serial-attached fingerprint scanner from an operator prompt: the
//! operator triggers a capture, the scanner streams back an image payload
//! between `<I>` and `</I>` markers, and the payload is written out as a
//! 176x176 RGB PNG.
//!
//! # Module Structure
//!
//! - `protocol`: marker constants, marker search, command envelopes
//! - `frame`: response buffers, frame extraction, `Bitmap`
//! - `link`: `DeviceLink` and its serial, stub and scripted implementations
//! - `clock`: wait windows (`Clock`, `SystemClock`, `ManualClock`)
//! - `session`: the Idle / AwaitingResponse capture cycle
//! - `config`: file + environment configuration
//! - `console`, `ui`: operator input and stage display

pub mod clock;
pub mod config;
pub mod console;
pub mod frame;
pub mod link;
pub mod protocol;
pub mod session;
pub mod ui;

pub use clock::{Clock, ManualClock, Shutdown, SystemClock};
pub use config::{CaptureConfig, ConfigOverrides};
pub use frame::{
    extract, locate_payload, Bitmap, ExtractError, ResponseBuffer, FRAME_HEIGHT,
    FRAME_PAYLOAD_LEN, FRAME_WIDTH,
};
pub use link::{open_link, DeviceLink, ScriptedLink, SerialConfig, SerialLink, StubLink};
pub use session::{
    CaptureMode, Command, Outcome, Report, Session, SessionConfig, SessionState,
};
