use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Color};
use clap::builder::styling::{Style, Styles};
use clap::{ColorChoice, Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::helper::error::ConfigError;

pub const BANNER: &str = "\x1b[0;91m██████  ██   ██ ██    ██ ██       ██████      ██████  ███████ ███    ██  ██████ ██   ██\x1b[0m\n\
                      \x1b[0;93m██   ██ ██   ██  ██  ██  ██      ██    ██     ██   ██ ██      ████   ██ ██      ██   ██\x1b[0m\n\
                      \x1b[0;92m██████  ███████   ████   ██      ██    ██     ██████  █████   ██ ██  ██ ██      ███████\x1b[0m\n\
                      \x1b[0;96m██      ██   ██    ██    ██      ██    ██     ██   ██ ██      ██  ██ ██ ██      ██   ██\x1b[0m\n\
                      \x1b[0;95m██      ██   ██    ██    ███████  ██████      ██████  ███████ ██   ████  ██████ ██   ██\x1b[0m\n";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "phylo-bench",
    version = env!("CARGO_PKG_VERSION"),
    about = BANNER,
    color = ColorChoice::Always,
    styles = get_styles(),
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the alignment and tree benchmark with resource telemetry
    #[command(alias = "r")]
    Run(RunArgs),

    /// Generate a config file through CLI
    #[command(alias = "g")]
    Generate {},

    /// Check which alignment, tree and viewer programs are installed
    Check {
        /// Config file whose tool overrides should be checked
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Summarise an exported telemetry CSV per job and plot its timeline
    Log {
        /// Telemetry CSV path
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory, defaults to the directory of the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// FASTA file with the unaligned sequences
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Alignment programs, comma separated (e.g. muscle,mafft)
    #[arg(short, long, value_delimiter = ',')]
    pub algorithms: Option<Vec<String>>,

    /// Tree methods, comma separated (nj, upgma, raxml)
    #[arg(short, long, value_delimiter = ',')]
    pub methods: Option<Vec<String>>,

    /// Tree formats, comma separated (newick, nexus)
    #[arg(short, long, value_delimiter = ',')]
    pub formats: Option<Vec<String>>,

    /// Telemetry sampling interval in seconds
    #[arg(long)]
    pub interval: Option<f64>,

    /// Filesystem root used for disk usage
    #[arg(long)]
    pub disk_root: Option<PathBuf>,

    /// Program used to open each finished tree
    #[arg(long)]
    pub viewer: Option<String>,

    /// Record failed jobs as warnings and keep going
    #[arg(long, default_value_t = false)]
    pub keep_going: bool,
}

impl RunArgs {
    /// Load the config file (if any) and apply the command line overrides.
    pub fn into_config(self) -> Result<PipelineConfig, ConfigError> {
        let mut config = match (&self.config, &self.input) {
            (Some(path), _) => PipelineConfig::from_file(path)?,
            (None, Some(input)) => PipelineConfig::new(input.clone()),
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "either --config or --input is required".to_string(),
                ));
            }
        };
        if let Some(input) = self.input {
            config.input = input;
        }
        if let Some(output) = self.output {
            config.output_root = output;
        }
        if let Some(algorithms) = self.algorithms {
            config.algorithms = algorithms;
        }
        if let Some(methods) = self.methods {
            config.tree_methods = methods;
        }
        if let Some(formats) = self.formats {
            config.tree_formats = formats;
        }
        if let Some(interval) = self.interval {
            config.telemetry.interval_secs = interval;
        }
        if let Some(disk_root) = self.disk_root {
            config.telemetry.disk_root = disk_root;
        }
        if let Some(viewer) = self.viewer {
            config.viewer = Some(viewer);
        }
        if self.keep_going {
            config.continue_on_job_failure = true;
        }
        Ok(config)
    }
}

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}
