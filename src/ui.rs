use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::str::FromStr;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
    /// No stage output at all.
    Quiet,
}

impl FromStr for UiMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "auto" => Ok(UiMode::Auto),
            "plain" => Ok(UiMode::Plain),
            "pretty" => Ok(UiMode::Pretty),
            "quiet" => Ok(UiMode::Quiet),
            other => Err(anyhow::anyhow!(
                "unknown ui mode '{}'; expected auto, plain, pretty or quiet",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn quiet() -> Self {
        Self::new(UiMode::Quiet, false)
    }

    /// Show `name` until the returned guard is dropped.
    pub fn stage(&self, name: &str) -> StageGuard {
        let use_pretty = match self.mode {
            UiMode::Quiet => return StageGuard::new(name.to_string(), StageOutput::Silent),
            UiMode::Pretty | UiMode::Auto => self.is_tty,
            UiMode::Plain => false,
        };

        if use_pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), StageOutput::Spinner(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), StageOutput::Plain)
        }
    }
}

enum StageOutput {
    Silent,
    Plain,
    Spinner(ProgressBar),
}

pub struct StageGuard {
    name: String,
    start: Instant,
    output: StageOutput,
}

impl StageGuard {
    fn new(name: String, output: StageOutput) -> Self {
        Self {
            name,
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        match &self.output {
            StageOutput::Silent => {}
            StageOutput::Plain => eprintln!("{message}"),
            StageOutput::Spinner(spinner) => spinner.finish_with_message(message),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ui_modes() {
        assert_eq!("plain".parse::<UiMode>().unwrap(), UiMode::Plain);
        assert_eq!("quiet".parse::<UiMode>().unwrap(), UiMode::Quiet);
        assert!("fancy".parse::<UiMode>().is_err());
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
