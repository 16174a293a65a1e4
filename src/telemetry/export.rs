use std::fs;
use std::path::Path;

use crate::helper::error::TelemetryError;
use crate::telemetry::{SAMPLE_HEADER, Sample, SampleLog};

/// Write every sample in `log` to `path` as CSV, one row per sample.
///
/// The header row is always written, so an empty log yields a header-only
/// file. An existing file is overwritten and missing parent directories are
/// created.
pub fn export_to_csv(log: &SampleLog, path: &Path) -> Result<usize, TelemetryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let samples = log.snapshot();
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(SAMPLE_HEADER)?;
    for sample in &samples {
        wtr.serialize(sample)?;
    }
    wtr.flush()?;
    Ok(samples.len())
}

pub fn read_from_csv(path: &Path) -> Result<Vec<Sample>, TelemetryError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut samples = Vec::new();
    for record in rdr.deserialize() {
        samples.push(record?);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::reader::DiskIoCounters;
    use crate::telemetry::tests::fixed_readings;
    use crate::telemetry::{JobContext, Readings};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_export_empty_log_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");

        let written = export_to_csv(&SampleLog::new(), &path).unwrap();
        assert_eq!(written, 0);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim_end(), SAMPLE_HEADER.join(","));
        assert!(read_from_csv(&path).unwrap().is_empty());
    }

    #[test]
    fn test_export_overwrites_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run").join("telemetry.csv");
        let log = SampleLog::new();
        log.append(Sample::from_readings(
            JobContext::new("alignment", "clustalw", "ls_orchid.fasta"),
            &fixed_readings(),
            &DiskIoCounters::default(),
            10.0,
        ));
        export_to_csv(&log, &path).unwrap();
        assert_eq!(read_from_csv(&path).unwrap().len(), 1);

        export_to_csv(&SampleLog::new(), &path).unwrap();
        assert!(read_from_csv(&path).unwrap().is_empty());
    }

    #[test]
    fn test_export_then_reread_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");

        let log = SampleLog::new();
        let mut readings: Readings = fixed_readings();
        let labels = [
            ("alignment", "t-coffee", "ls_orchid.fasta", "clustal", ""),
            ("tree", "upgma", "t-coffee.aln", "upgma", "nexus"),
            ("tree", "raxml", "mafft.fasta", "raxml, GTRGAMMA", "newick"),
        ];
        for (i, (task, job, input, e1, e2)) in labels.iter().enumerate() {
            readings.cpu_percent = 100.0 / 3.0 + i as f64;
            readings.memory.available_bytes -= 123_456_789;
            readings.disk_io.read_bytes += 987_654_321;
            log.append(Sample::from_readings(
                JobContext::new(task, job, input).with_extras(e1, e2),
                &readings,
                &DiskIoCounters {
                    read_bytes: 1_000,
                    write_bytes: 0,
                },
                1_760_000_000.123456 + i as f64 * 5.0,
            ));
        }

        assert_eq!(export_to_csv(&log, &path).unwrap(), 3);
        let original = log.snapshot();
        let reread = read_from_csv(&path).unwrap();
        assert_eq!(reread.len(), original.len());

        for (a, b) in original.iter().zip(reread.iter()) {
            assert_eq!(a.task_label(), b.task_label());
            assert_eq!(a.job_label(), b.job_label());
            assert_eq!(a.input_name(), b.input_name());
            assert_eq!(a.extra_label1(), b.extra_label1());
            assert_eq!(a.extra_label2(), b.extra_label2());
            assert!(close(a.cpu_percent(), b.cpu_percent()));
            assert!(close(a.memory_total_gib(), b.memory_total_gib()));
            assert!(close(a.memory_available_gib(), b.memory_available_gib()));
            assert!(close(a.memory_used_percent(), b.memory_used_percent()));
            assert!(close(a.disk_total_gib(), b.disk_total_gib()));
            assert!(close(a.disk_used_gib(), b.disk_used_gib()));
            assert!(close(a.disk_free_gib(), b.disk_free_gib()));
            assert!(close(a.disk_used_percent(), b.disk_used_percent()));
            assert!(close(a.disk_read_mib_delta(), b.disk_read_mib_delta()));
            assert!(close(a.disk_write_mib_delta(), b.disk_write_mib_delta()));
            assert!(close(a.net_sent_mib_delta(), b.net_sent_mib_delta()));
            assert!(close(a.net_recv_mib_delta(), b.net_recv_mib_delta()));
            assert!(close(a.timestamp(), b.timestamp()));
        }
    }
}
