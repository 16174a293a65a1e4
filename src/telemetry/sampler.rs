use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::helper::error::TelemetryError;
use crate::telemetry::reader::{DiskIoCounters, ResourceReader};
use crate::telemetry::{Readings, RunSignal, Sample, SampleLog, SharedContext};

/// Longest single sleep between signal checks while waiting for the next tick.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub interval: Duration,
    pub disk_root: PathBuf,
}

/// Handle to the running sampler thread.
pub struct SamplerHandle {
    signal: RunSignal,
    handle: JoinHandle<Result<usize, TelemetryError>>,
}

impl SamplerHandle {
    pub fn signal(&self) -> &RunSignal {
        &self.signal
    }

    /// Flip the run signal and wait for the in-flight tick to land.
    /// Returns the number of samples the thread appended.
    pub fn stop_and_join(self) -> Result<usize, TelemetryError> {
        self.signal.stop();
        self.join()
    }

    pub fn join(self) -> Result<usize, TelemetryError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(TelemetryError::SamplerPanicked),
        }
    }
}

/// Read the counters that disk I/O deltas are measured against.
pub fn baseline<R: ResourceReader>(reader: &mut R) -> Result<DiskIoCounters, TelemetryError> {
    reader.disk_io()
}

/// Spawn the sampler on its own thread. Returns as soon as the thread exists.
///
/// Every tick reads all counters from `reader`, tags them with a snapshot of
/// `context` and appends to `log`. The loop ends once `signal` is stopped; a
/// tick already in progress still completes, so at most one sample lands
/// after the stop. The first reader error ends the thread and is returned
/// from [`SamplerHandle::join`].
pub fn start<R>(
    mut reader: R,
    log: SampleLog,
    context: SharedContext,
    signal: RunSignal,
    settings: SamplerSettings,
    baseline: DiskIoCounters,
) -> Result<SamplerHandle, TelemetryError>
where
    R: ResourceReader + Send + 'static,
{
    let thread_signal = signal.clone();
    let handle = thread::Builder::new()
        .name("telemetry-sampler".to_string())
        .spawn(move || -> Result<usize, TelemetryError> {
            let mut ticks = 0usize;
            let mut last_timestamp = log.last_timestamp().unwrap_or(f64::MIN);
            while thread_signal.keep_sampling() {
                let sample = tick(&mut reader, &context, &settings, &baseline, last_timestamp)?;
                last_timestamp = sample.timestamp();
                log.append(sample);
                ticks += 1;
                sleep_unless_stopped(&thread_signal, settings.interval);
            }
            Ok(ticks)
        })?;

    Ok(SamplerHandle { signal, handle })
}

fn tick<R: ResourceReader>(
    reader: &mut R,
    context: &SharedContext,
    settings: &SamplerSettings,
    baseline: &DiskIoCounters,
    last_timestamp: f64,
) -> Result<Sample, TelemetryError> {
    let disk_io = reader.disk_io()?;
    let cpu_percent = reader.cpu_percent()?;
    let memory = reader.memory()?;
    let disk = reader.disk_usage(&settings.disk_root)?;
    let network = reader.network()?;

    let readings = Readings {
        cpu_percent,
        memory,
        disk,
        disk_io,
        network,
    };
    // wall clock may step backwards; samples must not
    let timestamp = epoch_seconds().max(last_timestamp);
    Ok(Sample::from_readings(
        context.snapshot(),
        &readings,
        baseline,
        timestamp,
    ))
}

fn sleep_unless_stopped(signal: &RunSignal, interval: Duration) {
    let deadline = Instant::now() + interval;
    loop {
        if !signal.keep_sampling() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Seconds since the epoch. A clock set before 1970 reads 0.0; the tick clamps
/// every timestamp to the previous one, so ordering still holds.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
