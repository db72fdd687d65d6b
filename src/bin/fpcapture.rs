//! fpcapture - interactive fingerprint scanner capture.
//!
//! Type `5` at the prompt to capture a fingerprint, `:NAME` to send a named
//! `<C>NAME</C>` command. Anything else is ignored. Ctrl-C or Ctrl-D exits and
//! releases the serial port.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use fingerprint_capture::config::ConfigOverrides;
use fingerprint_capture::console::{format_dump_byte, Console, OperatorEvent};
use fingerprint_capture::ui::{Ui, UiMode};
use fingerprint_capture::{
    open_link, CaptureConfig, CaptureMode, Command, Outcome, Report, Session, Shutdown,
    SystemClock,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Capture fingerprint images from a serial-attached scanner"
)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "FPCAPTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device path, or stub://<name> for a synthetic scanner.
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    baud_rate: Option<u32>,

    /// Where captured images are written (overwritten on each capture).
    #[arg(long)]
    output: Option<PathBuf>,

    /// image: decode and save the frame; dump: print the received bytes.
    #[arg(long)]
    mode: Option<CaptureMode>,

    #[arg(long)]
    ack_wait_ms: Option<u64>,

    #[arg(long)]
    transfer_wait_ms: Option<u64>,

    /// Stage display: auto, plain, pretty or quiet.
    #[arg(long, default_value = "auto")]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = CaptureConfig::resolve(args.config.as_deref(), &overrides(&args))?;

    log::info!(
        "fpcapture {} mode={} device={} output={}",
        env!("CARGO_PKG_VERSION"),
        cfg.mode,
        cfg.device,
        cfg.output_path.display()
    );

    let link = open_link(&cfg.serial())?;
    let shutdown = Shutdown::new();
    let console = Console::attach(shutdown.clone())?;
    let ui = Ui::new(args.ui, std::io::stderr().is_terminal());
    let mut session =
        Session::new(link, SystemClock::new(shutdown.clone()), cfg.session()).with_ui(ui);

    loop {
        console.prompt()?;
        let line = match console.next_event() {
            OperatorEvent::Line(line) => line,
            OperatorEvent::Eof => {
                log::info!("operator input closed");
                break;
            }
            OperatorEvent::Interrupt => {
                log::info!("shutdown signal received");
                break;
            }
        };

        let Some(command) = Command::parse(&line) else {
            continue;
        };

        match session.handle(&command) {
            Ok(report) => print_report(&report),
            Err(err) if shutdown.is_triggered() => {
                log::info!("stopping: {}", err);
                break;
            }
            Err(err) => log::warn!("command failed: {:#}", err),
        }
    }

    log::info!("{} capture(s) written this session", session.captures());
    Ok(())
}

fn overrides(args: &Args) -> ConfigOverrides {
    ConfigOverrides {
        device: args.device.clone(),
        baud_rate: args.baud_rate,
        output_path: args.output.clone(),
        mode: args.mode,
        ack_wait_ms: args.ack_wait_ms,
        transfer_wait_ms: args.transfer_wait_ms,
    }
}

fn print_report(report: &Report) {
    if let Some(text) = &report.acknowledgement {
        println!(">>{}", text);
    }
    match &report.outcome {
        Outcome::ImageSaved { path, .. } => println!("fingerprint saved to {}", path.display()),
        Outcome::ExtractFailed { error, received } => {
            println!("no fingerprint image received ({} bytes): {}", received, error)
        }
        Outcome::Dumped(bytes) => {
            for byte in bytes.as_bytes() {
                println!("{}", format_dump_byte(*byte));
            }
        }
        Outcome::Replied => {
            if report.acknowledgement.is_none() {
                println!("(no reply)");
            }
        }
    }
}
