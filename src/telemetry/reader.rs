use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use sysinfo::Disks;

use crate::helper::error::TelemetryError;

const SECTOR_BYTES: u64 = 512;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl DiskIoCounters {
    /// Bytes moved since `baseline`, clamped at zero.
    pub fn since(&self, baseline: &DiskIoCounters) -> DiskIoCounters {
        DiskIoCounters {
            read_bytes: self.read_bytes.saturating_sub(baseline.read_bytes),
            write_bytes: self.write_bytes.saturating_sub(baseline.write_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryStats {
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        used as f64 / self.total_bytes as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl DiskUsage {
    /// Share of the filesystem in use, blocks reserved for root included.
    pub fn used_percent(&self) -> f64 {
        let denominator = self.used_bytes + self.free_bytes;
        if denominator == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / denominator as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub sent_bytes: u64,
    pub recv_bytes: u64,
}

/// Source of OS resource counters for the sampler.
pub trait ResourceReader {
    fn disk_io(&mut self) -> Result<DiskIoCounters, TelemetryError>;

    /// Utilisation over a short blocking window.
    fn cpu_percent(&mut self) -> Result<f64, TelemetryError>;

    fn memory(&mut self) -> Result<MemoryStats, TelemetryError>;

    fn disk_usage(&mut self, root: &Path) -> Result<DiskUsage, TelemetryError>;

    fn network(&mut self) -> Result<NetworkCounters, TelemetryError>;
}

impl<R: ResourceReader + ?Sized> ResourceReader for Box<R> {
    fn disk_io(&mut self) -> Result<DiskIoCounters, TelemetryError> {
        (**self).disk_io()
    }

    fn cpu_percent(&mut self) -> Result<f64, TelemetryError> {
        (**self).cpu_percent()
    }

    fn memory(&mut self) -> Result<MemoryStats, TelemetryError> {
        (**self).memory()
    }

    fn disk_usage(&mut self, root: &Path) -> Result<DiskUsage, TelemetryError> {
        (**self).disk_usage(root)
    }

    fn network(&mut self) -> Result<NetworkCounters, TelemetryError> {
        (**self).network()
    }
}

/// Linux reader backed by procfs, with disk usage from the mount table.
#[derive(Debug, Clone)]
pub struct ProcfsReader {
    proc_root: PathBuf,
    cpu_window: Duration,
}

impl ProcfsReader {
    pub fn new(cpu_window: Duration) -> Self {
        ProcfsReader {
            proc_root: PathBuf::from("/proc"),
            cpu_window,
        }
    }

    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    fn read(&self, relative: &str) -> Result<String, TelemetryError> {
        let path = self.proc_root.join(relative);
        fs::read_to_string(&path).map_err(|source| TelemetryError::ProcRead { path, source })
    }

    fn cpu_times(&self) -> Result<CpuTimes, TelemetryError> {
        parse_cpu_times(&self.read("stat")?)
    }
}

impl ResourceReader for ProcfsReader {
    fn disk_io(&mut self) -> Result<DiskIoCounters, TelemetryError> {
        Ok(parse_diskstats(&self.read("diskstats")?))
    }

    fn cpu_percent(&mut self) -> Result<f64, TelemetryError> {
        let before = self.cpu_times()?;
        thread::sleep(self.cpu_window);
        let after = self.cpu_times()?;
        Ok(after.busy_percent_since(&before))
    }

    fn memory(&mut self) -> Result<MemoryStats, TelemetryError> {
        parse_meminfo(&self.read("meminfo")?)
    }

    fn disk_usage(&mut self, root: &Path) -> Result<DiskUsage, TelemetryError> {
        mounted_disk_usage(root)
    }

    fn network(&mut self) -> Result<NetworkCounters, TelemetryError> {
        Ok(parse_net_dev(&self.read("net/dev")?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

impl CpuTimes {
    fn busy_percent_since(&self, earlier: &CpuTimes) -> f64 {
        let total = self.total.saturating_sub(earlier.total);
        if total == 0 {
            return 0.0;
        }
        let idle = self.idle.saturating_sub(earlier.idle).min(total);
        (1.0 - idle as f64 / total as f64) * 100.0
    }
}

// aggregate "cpu " line; idle includes iowait, guest time is already in user/nice
fn parse_cpu_times(stat: &str) -> Result<CpuTimes, TelemetryError> {
    let line = stat
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| TelemetryError::Parse("cpu line in /proc/stat".to_string()))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse::<u64>().ok())
        .collect();
    if fields.len() < 4 {
        return Err(TelemetryError::Parse(format!("cpu line: {}", line)));
    }
    let total: u64 = fields.iter().take(8).sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Ok(CpuTimes { idle, total })
}

fn parse_meminfo(meminfo: &str) -> Result<MemoryStats, TelemetryError> {
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        match key {
            "MemTotal" => total = Some(kib * 1024),
            "MemAvailable" => available = Some(kib * 1024),
            _ => {}
        }
    }
    match (total, available) {
        (Some(total_bytes), Some(available_bytes)) => Ok(MemoryStats {
            total_bytes,
            available_bytes,
        }),
        _ => Err(TelemetryError::Parse(
            "MemTotal/MemAvailable in /proc/meminfo".to_string(),
        )),
    }
}

fn is_whole_disk(name: &str) -> bool {
    const VIRTUAL: [&str; 8] = ["loop", "ram", "dm-", "md", "zram", "sr", "fd", "nbd"];
    if VIRTUAL.iter().any(|prefix| name.starts_with(prefix)) {
        return false;
    }
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return !name.contains('p');
    }
    !name.chars().last().is_some_and(|c| c.is_ascii_digit())
}

fn parse_diskstats(diskstats: &str) -> DiskIoCounters {
    let mut counters = DiskIoCounters::default();
    for line in diskstats.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 || !is_whole_disk(parts[2]) {
            continue;
        }
        let (Ok(read_sectors), Ok(write_sectors)) =
            (parts[5].parse::<u64>(), parts[9].parse::<u64>())
        else {
            continue;
        };
        counters.read_bytes += read_sectors * SECTOR_BYTES;
        counters.write_bytes += write_sectors * SECTOR_BYTES;
    }
    counters
}

fn parse_net_dev(net_dev: &str) -> NetworkCounters {
    let mut counters = NetworkCounters::default();
    for line in net_dev.lines().skip(2) {
        let Some((_iface, stats)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = stats
            .split_whitespace()
            .filter_map(|v| v.parse::<u64>().ok())
            .collect();
        if fields.len() < 16 {
            continue;
        }
        counters.recv_bytes += fields[0];
        counters.sent_bytes += fields[8];
    }
    counters
}

/// Usage of the mounted filesystem holding `root`, picked by longest mount point prefix.
fn mounted_disk_usage(root: &Path) -> Result<DiskUsage, TelemetryError> {
    let unavailable = |source: io::Error| TelemetryError::DiskUsage {
        path: root.to_path_buf(),
        source,
    };
    let canonical = fs::canonicalize(root).map_err(unavailable)?;

    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| canonical.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .ok_or_else(|| {
            unavailable(io::Error::new(
                io::ErrorKind::NotFound,
                "no mounted filesystem contains this path",
            ))
        })?;

    let total_bytes = disk.total_space();
    let free_bytes = disk.available_space();
    Ok(DiskUsage {
        total_bytes,
        used_bytes: total_bytes.saturating_sub(free_bytes),
        free_bytes,
    })
}
