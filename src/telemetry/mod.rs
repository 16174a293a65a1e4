//! Resource telemetry collected while the pipeline runs.
//!
//! The driver owns one [`SharedContext`], [`SampleLog`] and [`RunSignal`] per
//! run and hands clones to the sampler thread. Nothing here is global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};

use crate::helper::utils::{bytes_to_gib, bytes_to_mib};

pub mod export;
pub mod reader;
pub mod sampler;
pub mod summary;

use reader::{DiskIoCounters, DiskUsage, MemoryStats, NetworkCounters};

/// Column names of the exported telemetry table, in field order.
pub const SAMPLE_HEADER: [&str; 18] = [
    "taskLabel",
    "jobLabel",
    "inputName",
    "extraLabel1",
    "extraLabel2",
    "cpuPercent",
    "memoryTotalGiB",
    "memoryAvailableGiB",
    "memoryUsedPercent",
    "diskTotalGiB",
    "diskUsedGiB",
    "diskFreeGiB",
    "diskUsedPercent",
    "diskReadMiBDelta",
    "diskWriteMiBDelta",
    "netSentMiBDelta",
    "netRecvMiBDelta",
    "timestamp",
];

/// What the driver is doing right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub task_label: String,
    pub job_label: String,
    pub input_name: String,
    pub extra_label1: String,
    pub extra_label2: String,
}

impl JobContext {
    pub fn new(task: &str, job: &str, input: &str) -> Self {
        JobContext {
            task_label: task.to_string(),
            job_label: job.to_string(),
            input_name: input.to_string(),
            extra_label1: String::new(),
            extra_label2: String::new(),
        }
    }

    pub fn with_extras(mut self, extra1: &str, extra2: &str) -> Self {
        self.extra_label1 = extra1.to_string();
        self.extra_label2 = extra2.to_string();
        self
    }
}

/// One observation of system state, tagged with the job context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, CopyGetters)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[getset(get = "pub")]
    task_label: String,
    #[getset(get = "pub")]
    job_label: String,
    #[getset(get = "pub")]
    input_name: String,
    #[getset(get = "pub")]
    extra_label1: String,
    #[getset(get = "pub")]
    extra_label2: String,
    #[getset(get_copy = "pub")]
    cpu_percent: f64,
    #[serde(rename = "memoryTotalGiB")]
    #[getset(get_copy = "pub")]
    memory_total_gib: f64,
    #[serde(rename = "memoryAvailableGiB")]
    #[getset(get_copy = "pub")]
    memory_available_gib: f64,
    #[getset(get_copy = "pub")]
    memory_used_percent: f64,
    #[serde(rename = "diskTotalGiB")]
    #[getset(get_copy = "pub")]
    disk_total_gib: f64,
    #[serde(rename = "diskUsedGiB")]
    #[getset(get_copy = "pub")]
    disk_used_gib: f64,
    #[serde(rename = "diskFreeGiB")]
    #[getset(get_copy = "pub")]
    disk_free_gib: f64,
    #[getset(get_copy = "pub")]
    disk_used_percent: f64,
    #[serde(rename = "diskReadMiBDelta")]
    #[getset(get_copy = "pub")]
    disk_read_mib_delta: f64,
    #[serde(rename = "diskWriteMiBDelta")]
    #[getset(get_copy = "pub")]
    disk_write_mib_delta: f64,
    #[serde(rename = "netSentMiBDelta")]
    #[getset(get_copy = "pub")]
    net_sent_mib_delta: f64,
    #[serde(rename = "netRecvMiBDelta")]
    #[getset(get_copy = "pub")]
    net_recv_mib_delta: f64,
    #[getset(get_copy = "pub")]
    timestamp: f64,
}

/// Raw readings from one tick, before unit conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readings {
    pub cpu_percent: f64,
    pub memory: MemoryStats,
    pub disk: DiskUsage,
    pub disk_io: DiskIoCounters,
    pub network: NetworkCounters,
}

impl Sample {
    /// Disk I/O is reported relative to `baseline`; network stays cumulative.
    pub fn from_readings(
        context: JobContext,
        readings: &Readings,
        baseline: &DiskIoCounters,
        timestamp: f64,
    ) -> Self {
        let io_delta = readings.disk_io.since(baseline);
        Sample {
            task_label: context.task_label,
            job_label: context.job_label,
            input_name: context.input_name,
            extra_label1: context.extra_label1,
            extra_label2: context.extra_label2,
            cpu_percent: readings.cpu_percent,
            memory_total_gib: bytes_to_gib(readings.memory.total_bytes),
            memory_available_gib: bytes_to_gib(readings.memory.available_bytes),
            memory_used_percent: readings.memory.used_percent(),
            disk_total_gib: bytes_to_gib(readings.disk.total_bytes),
            disk_used_gib: bytes_to_gib(readings.disk.used_bytes),
            disk_free_gib: bytes_to_gib(readings.disk.free_bytes),
            disk_used_percent: readings.disk.used_percent(),
            disk_read_mib_delta: bytes_to_mib(io_delta.read_bytes),
            disk_write_mib_delta: bytes_to_mib(io_delta.write_bytes),
            net_sent_mib_delta: bytes_to_mib(readings.network.sent_bytes),
            net_recv_mib_delta: bytes_to_mib(readings.network.recv_bytes),
            timestamp,
        }
    }

    /// (task, job, input) key used to group samples per job.
    pub fn job_key(&self) -> (String, String, String) {
        (
            self.task_label.clone(),
            self.job_label.clone(),
            self.input_name.clone(),
        )
    }
}

/// Context written by the driver and read by the sampler.
#[derive(Debug, Clone, Default)]
pub struct SharedContext(Arc<RwLock<JobContext>>);

impl SharedContext {
    pub fn new(initial: JobContext) -> Self {
        SharedContext(Arc::new(RwLock::new(initial)))
    }

    pub fn set(&self, context: JobContext) {
        // a poisoned lock only means a reader panicked mid-clone
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        *guard = context;
    }

    pub fn snapshot(&self) -> JobContext {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Append-only, time-ordered sample store.
#[derive(Debug, Clone, Default)]
pub struct SampleLog(Arc<Mutex<Vec<Sample>>>);

impl SampleLog {
    pub fn new() -> Self {
        SampleLog::default()
    }

    pub fn append(&self, sample: Sample) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(sample);
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|s| s.timestamp)
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// One-way keep-sampling flag: starts `true`, `stop` makes it `false` for good.
#[derive(Debug, Clone)]
pub struct RunSignal(Arc<AtomicBool>);

impl RunSignal {
    pub fn new() -> Self {
        RunSignal(Arc::new(AtomicBool::new(true)))
    }

    pub fn keep_sampling(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for RunSignal {
    fn default() -> Self {
        RunSignal::new()
    }
}
