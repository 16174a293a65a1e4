use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Result as IoResult, Write};
use std::path::Path;
use std::time::Duration;

use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};

pub const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
pub const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn bytes_to_mib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MIB
}

pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}

pub fn log_line<W: Write + ?Sized>(writer: &mut W, message: &str) -> IoResult<()> {
    let now = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(writer, "[{}] {}", now, message)?;
    writer.flush()?;
    Ok(())
}

/// Timestamped run log. Every line goes to the sink; with `echo` set it is
/// also printed to stdout (above the spinner when one is attached).
pub struct RunLog {
    sink: Box<dyn Write + Send>,
    echo: bool,
    spinner: Option<ProgressBar>,
}

impl RunLog {
    pub fn new(sink: Box<dyn Write + Send>, echo: bool) -> Self {
        RunLog {
            sink,
            echo,
            spinner: None,
        }
    }

    /// Appends to `path`, creating it if needed, and echoes to stdout.
    pub fn to_file(path: &Path) -> IoResult<Self> {
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(RunLog::new(Box::new(BufWriter::new(file)), true))
    }

    pub fn with_spinner(mut self) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {elapsed_precise} {msg}") {
            spinner.set_style(style.tick_strings(&CLI_ANIMATION_TICK_STRINGS));
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        self.spinner = Some(spinner);
        self
    }

    pub fn line(&mut self, message: &str) -> IoResult<()> {
        log_line(&mut self.sink, message)?;
        if self.echo {
            match &self.spinner {
                Some(spinner) => spinner.println(message),
                None => println!("{}", message),
            }
        }
        Ok(())
    }

    pub fn set_status(&self, status: &str) {
        if let Some(spinner) = &self.spinner {
            spinner.set_message(status.to_string());
        }
    }

    pub fn finish(&mut self, message: &str) -> IoResult<()> {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(message.to_string());
        }
        self.line(message)
    }
}

pub static CLI_ANIMATION_TICK_STRINGS: [&str; 12] = [
    "🧬          ",
    " 🧬         ",
    "  🧬        ",
    "   🧬       ",
    "    🧬      ",
    "     🧬     ",
    "      🧬    ",
    "       🧬   ",
    "        🧬  ",
    "         🧬 ",
    "          🧬",
    "    🌳🌳    ",
];
