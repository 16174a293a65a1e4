use std::fmt::Display;
use std::path::Path;

use chrono::{DateTime, Local};
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::pipelines::driver::DriverState;

#[derive(Debug, Clone, Serialize, Deserialize, Getters, CopyGetters)]
pub struct PipelineReport {
    #[getset(get = "pub")]
    process_start_time: DateTime<Local>,
    #[getset(get = "pub")]
    current_version: String,
    #[getset(get = "pub")]
    input_params: PipelineConfig,
    #[getset(get = "pub")]
    jobs: Vec<JobRecord>,
    #[getset(get_copy = "pub")]
    samples_recorded: usize,
    #[getset(get = "pub")]
    telemetry_file: Option<String>,
    #[getset(get = "pub")]
    final_state: DriverState,

    #[getset(get = "pub")]
    errors: Vec<String>,
    #[getset(get = "pub")]
    warnings: Vec<PipelineWarning>,
    process_end_time: DateTime<Local>,
}

impl PipelineReport {
    pub fn new(config: &PipelineConfig) -> Self {
        PipelineReport {
            process_start_time: Local::now(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            input_params: config.clone(),
            jobs: Vec::new(),
            samples_recorded: 0,
            telemetry_file: None,
            final_state: DriverState::Idle,
            errors: Vec::new(),
            warnings: Vec::new(),
            process_end_time: Local::now(),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_job(&mut self, job: JobRecord) {
        self.jobs.push(job);
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: PipelineWarning) {
        self.warnings.push(warning);
    }

    pub fn set_telemetry(&mut self, file: &Path, samples: usize) {
        self.telemetry_file = Some(file.display().to_string());
        self.samples_recorded = samples;
    }

    pub fn finish(&mut self, state: DriverState) {
        self.final_state = state;
        self.process_end_time = Local::now();
    }

    pub fn completed_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Completed,
    Failed,
}

/// One external job as it was dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct JobRecord {
    #[getset(get = "pub")]
    task: String,
    #[getset(get = "pub")]
    job: String,
    #[getset(get = "pub")]
    input: String,
    #[getset(get = "pub")]
    output: String,
    #[getset(get_copy = "pub")]
    status: JobStatus,
    #[getset(get_copy = "pub")]
    duration_secs: f64,
}

impl JobRecord {
    pub fn new(
        task: &str,
        job: &str,
        input: &str,
        output: &Path,
        status: JobStatus,
        duration_secs: f64,
    ) -> Self {
        JobRecord {
            task: task.to_string(),
            job: job.to_string(),
            input: input.to_string(),
            output: output.display().to_string(),
            status,
            duration_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineWarning {
    UnknownAlgorithm(String),
    UnknownTreeMethod(String),
    UnknownTreeFormat(String),
    JobFailed(String, String),
    SamplerFailed(String),
}

impl Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::UnknownAlgorithm(name) => {
                write!(f, "Unknown alignment algorithm: {}", name)
            }
            PipelineWarning::UnknownTreeMethod(name) => {
                write!(f, "Unknown tree method: {}", name)
            }
            PipelineWarning::UnknownTreeFormat(name) => {
                write!(f, "Unknown tree format: {}", name)
            }
            PipelineWarning::JobFailed(job, msg) => write!(f, "Job {} failed: {}", job, msg),
            PipelineWarning::SamplerFailed(msg) => {
                write!(f, "Telemetry sampler stopped early: {}", msg)
            }
        }
    }
}
