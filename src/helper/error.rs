use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to read {path}: {source}")]
    ProcRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {0}")]
    Parse(String),
    #[error("Disk usage unavailable for {path}: {source}")]
    DiskUsage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Sampler thread panicked")]
    SamplerPanicked,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    CommandFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("Alignment {0} is neither Clustal nor FASTA")]
    UnreadableAlignment(PathBuf),
    #[error("Expected output {0} was not produced")]
    MissingOutput(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access the config file from the given path: {0}")]
    Read(String),
    #[error("Config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not reset output directory {path}: {source}")]
    OutputSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Input file does not exist: {0}")]
    InputNotFound(PathBuf),
    #[error("Job {job} failed: {source}")]
    Job {
        job: String,
        #[source]
        source: ServiceError,
    },
    #[error("Telemetry export failed: {0}")]
    Export(#[source] TelemetryError),
    #[error("Failed to write run report: {0}")]
    Report(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
