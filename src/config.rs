use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize};

use crate::helper::aligners::Aligner;
use crate::helper::error::ConfigError;
use crate::helper::json::FromJsonString;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// FASTA file with the unaligned sequences.
    pub input: PathBuf,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default = "default_alignments_dir")]
    pub alignments_dir_name: String,
    #[serde(default = "default_trees_dir")]
    pub trees_dir_name: String,

    /// Run in this order; unknown names are skipped at run time.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,
    #[serde(default = "default_tree_methods", alias = "models")]
    pub tree_methods: Vec<String>,
    #[serde(default = "default_tree_formats", alias = "formats")]
    pub tree_formats: Vec<String>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Executable overrides keyed by tool name, e.g. `"raxml": "raxmlHPC-AVX"`.
    #[serde(default)]
    pub tools: BTreeMap<String, String>,
    /// Program used to display each finished tree.
    #[serde(default)]
    pub viewer: Option<String>,
    /// Record a failed job as a warning and keep going instead of aborting.
    #[serde(default)]
    pub continue_on_job_failure: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(
        default = "default_interval",
        deserialize_with = "string_or_number_to_f64"
    )]
    pub interval_secs: f64,
    #[serde(
        default = "default_cpu_window",
        deserialize_with = "string_or_number_to_f64"
    )]
    pub cpu_window_secs: f64,
    #[serde(default = "default_disk_root")]
    pub disk_root: PathBuf,
    /// Relative paths resolve against `output_root`.
    #[serde(default = "default_telemetry_output")]
    pub output: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            enabled: true,
            interval_secs: default_interval(),
            cpu_window_secs: default_cpu_window(),
            disk_root: default_disk_root(),
            output: default_telemetry_output(),
        }
    }
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_secs_f64(self.cpu_window_secs)
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from("files/output")
}

fn default_alignments_dir() -> String {
    "alignments".to_string()
}

fn default_trees_dir() -> String {
    "trees".to_string()
}

fn default_algorithms() -> Vec<String> {
    Aligner::ALL.iter().map(|a| a.name().to_string()).collect()
}

fn default_tree_methods() -> Vec<String> {
    vec!["nj".to_string(), "upgma".to_string()]
}

fn default_tree_formats() -> Vec<String> {
    vec!["newick".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_interval() -> f64 {
    5.0
}

fn default_cpu_window() -> f64 {
    1.0
}

fn default_disk_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_telemetry_output() -> PathBuf {
    PathBuf::from("telemetry.csv")
}

fn string_or_number_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = Deserialize::deserialize(deserializer)?;
    match val {
        serde_json::Value::Number(num) => num
            .as_f64()
            .ok_or_else(|| Error::custom("Invalid number")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::custom(format!("Invalid number: {}", s))),
        _ => Err(Error::custom("Expected a number")),
    }
}

impl PipelineConfig {
    pub fn new(input: PathBuf) -> Self {
        PipelineConfig {
            input,
            output_root: default_output_root(),
            alignments_dir_name: default_alignments_dir(),
            trees_dir_name: default_trees_dir(),
            algorithms: default_algorithms(),
            tree_methods: default_tree_methods(),
            tree_formats: default_tree_formats(),
            telemetry: TelemetryConfig::default(),
            tools: BTreeMap::new(),
            viewer: None,
            continue_on_job_failure: false,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Ok(PipelineConfig::from_json_string(&text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("input path is empty".to_string()));
        }
        if self.alignments_dir_name.trim().is_empty() || self.trees_dir_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "output sub-directory names must not be empty".to_string(),
            ));
        }
        if self.alignments_dir_name == self.trees_dir_name {
            return Err(ConfigError::Invalid(format!(
                "alignments and trees share the directory name {}",
                self.trees_dir_name
            )));
        }
        let telemetry = &self.telemetry;
        if !(telemetry.interval_secs.is_finite() && telemetry.interval_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "telemetry interval must be positive, got {}",
                telemetry.interval_secs
            )));
        }
        if !(telemetry.cpu_window_secs.is_finite() && telemetry.cpu_window_secs >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "CPU sampling window must not be negative, got {}",
                telemetry.cpu_window_secs
            )));
        }
        Ok(())
    }

    pub fn alignments_dir(&self) -> PathBuf {
        self.output_root.join(&self.alignments_dir_name)
    }

    pub fn trees_dir(&self) -> PathBuf {
        self.output_root.join(&self.trees_dir_name)
    }

    pub fn telemetry_output(&self) -> PathBuf {
        if self.telemetry.output.is_absolute() {
            self.telemetry.output.clone()
        } else {
            self.output_root.join(&self.telemetry.output)
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_root.join("run_report.json")
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.output_root.join("run_log.txt")
    }
}

impl Display for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "  input: {}", self.input.display())?;
        writeln!(f, "  output_root: {}", self.output_root.display())?;
        writeln!(f, "  algorithms: {}", self.algorithms.join(", "))?;
        writeln!(f, "  tree_methods: {}", self.tree_methods.join(", "))?;
        writeln!(f, "  tree_formats: {}", self.tree_formats.join(", "))?;
        writeln!(
            f,
            "  telemetry: {} every {}s on {}",
            if self.telemetry.enabled { "on" } else { "off" },
            self.telemetry.interval_secs,
            self.telemetry.disk_root.display()
        )?;
        if let Some(viewer) = &self.viewer {
            writeln!(f, "  viewer: {}", viewer)?;
        }
        write!(f, "}}")
    }
}
