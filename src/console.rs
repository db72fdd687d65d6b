//! Operator console.
//!
//! Stdin is read on a helper thread and forwarded line by line over a channel,
//! so the main loop can also react to Ctrl-C while it is idle at the prompt.

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::clock::Shutdown;

pub const PROMPT: &str = ">> ";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperatorEvent {
    Line(String),
    /// Input closed (Ctrl-D or end of a piped script).
    Eof,
    /// Ctrl-C.
    Interrupt,
}

pub struct Console {
    events: Receiver<OperatorEvent>,
}

impl Console {
    /// Spawn the stdin reader and install the Ctrl-C handler.
    ///
    /// The handler raises `shutdown` so an in-progress wait window is cut short.
    pub fn attach(shutdown: Shutdown) -> Result<Self> {
        let (tx, rx) = mpsc::channel();

        let interrupt_tx = tx.clone();
        ctrlc::set_handler(move || {
            shutdown.trigger();
            let _ = interrupt_tx.send(OperatorEvent::Interrupt);
        })
        .context("error setting Ctrl-C handler")?;

        thread::Builder::new()
            .name("operator-stdin".to_string())
            .spawn(move || forward_lines(io::stdin().lock(), tx))
            .context("spawn stdin reader")?;

        Ok(Self { events: rx })
    }

    /// Console fed from an arbitrary reader, without signal handling.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || forward_lines(reader, tx));
        Self { events: rx }
    }

    pub fn prompt(&self) -> Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(PROMPT.as_bytes()).context("write prompt")?;
        stdout.flush().context("flush prompt")?;
        Ok(())
    }

    /// Block until the operator does something.
    pub fn next_event(&self) -> OperatorEvent {
        self.events.recv().unwrap_or(OperatorEvent::Eof)
    }
}

fn forward_lines<R: BufRead>(reader: R, tx: Sender<OperatorEvent>) {
    for line in reader.lines() {
        let event = match line {
            Ok(line) => OperatorEvent::Line(line),
            Err(err) => {
                log::warn!("operator input failed: {}", err);
                break;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }
    let _ = tx.send(OperatorEvent::Eof);
}

/// Format a dump-mode byte the way the operator sees it: printable ASCII as
/// is, everything else as a `\xNN` escape.
pub fn format_dump_byte(byte: u8) -> String {
    std::ascii::escape_default(byte).to_string()
}
