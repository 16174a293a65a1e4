use std::error::Error;
use std::path::Path;

use getset::{CopyGetters, Getters};
use itertools::Itertools;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Max};

use crate::telemetry::Sample;

/// Resource usage aggregated over all samples taken during one job.
#[derive(Debug, Clone, Serialize, Deserialize, Getters, CopyGetters)]
pub struct JobUsageSummary {
    #[getset(get = "pub")]
    task_label: String,
    #[getset(get = "pub")]
    job_label: String,
    #[getset(get = "pub")]
    input_name: String,
    #[getset(get_copy = "pub")]
    sample_count: usize,
    #[getset(get_copy = "pub")]
    first_timestamp: f64,
    #[getset(get_copy = "pub")]
    last_timestamp: f64,
    #[getset(get_copy = "pub")]
    cpu_mean: f64,
    #[getset(get_copy = "pub")]
    cpu_max: f64,
    #[getset(get_copy = "pub")]
    memory_used_mean: f64,
    #[getset(get_copy = "pub")]
    memory_used_max: f64,
    #[serde(rename = "diskReadMiB")]
    #[getset(get_copy = "pub")]
    disk_read_mib: f64,
    #[serde(rename = "diskWriteMiB")]
    #[getset(get_copy = "pub")]
    disk_write_mib: f64,
}

impl JobUsageSummary {
    fn from_samples(samples: &[&Sample]) -> Option<Self> {
        let first = samples.first()?;
        let last = samples.last()?;

        let cpu = Data::new(samples.iter().map(|s| s.cpu_percent()).collect::<Vec<f64>>());
        let mem = Data::new(
            samples
                .iter()
                .map(|s| s.memory_used_percent())
                .collect::<Vec<f64>>(),
        );

        Some(JobUsageSummary {
            task_label: first.task_label().clone(),
            job_label: first.job_label().clone(),
            input_name: first.input_name().clone(),
            sample_count: samples.len(),
            first_timestamp: first.timestamp(),
            last_timestamp: last.timestamp(),
            cpu_mean: cpu.mean().unwrap_or(0.0),
            cpu_max: cpu.max(),
            memory_used_mean: mem.mean().unwrap_or(0.0),
            memory_used_max: mem.max(),
            // disk counters are cumulative since the run started
            disk_read_mib: last.disk_read_mib_delta() - first.disk_read_mib_delta(),
            disk_write_mib: last.disk_write_mib_delta() - first.disk_write_mib_delta(),
        })
    }

    pub fn duration_secs(&self) -> f64 {
        self.last_timestamp - self.first_timestamp
    }
}

/// Group consecutive samples with the same (task, job, input) and summarise
/// each run of samples. A job that appears twice yields two rows.
pub fn summarize(samples: &[Sample]) -> Vec<JobUsageSummary> {
    samples
        .iter()
        .chunk_by(|s| s.job_key())
        .into_iter()
        .filter_map(|(_, group)| {
            let group: Vec<&Sample> = group.collect();
            JobUsageSummary::from_samples(&group)
        })
        .collect()
}

pub fn export_summary_to_csv(
    summaries: &[JobUsageSummary],
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for summary in summaries {
        wtr.serialize(summary)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Plot CPU% and memory-used% against seconds since the first sample.
pub fn plot_usage_timeline(samples: &[Sample], output_path: &Path) -> Result<(), Box<dyn Error>> {
    let Some(first) = samples.first() else {
        return Err("No samples to plot".into());
    };
    let t0 = first.timestamp();
    let t_max = samples
        .last()
        .map(|s| s.timestamp() - t0)
        .unwrap_or(0.0)
        .max(1.0);

    let root = BitMapBackend::new(output_path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Resource Usage", ("sans-serif", 50).into_font())
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..t_max, 0f64..100f64)?;

    chart
        .configure_mesh()
        .x_desc("Seconds since start")
        .y_desc("Percent")
        .axis_desc_style(("sans-serif", 20))
        .y_label_formatter(&|y| format!("{:.0}", y))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            samples.iter().map(|s| (s.timestamp() - t0, s.cpu_percent())),
            BLUE.stroke_width(2),
        ))?
        .label("CPU %")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .draw_series(LineSeries::new(
            samples
                .iter()
                .map(|s| (s.timestamp() - t0, s.memory_used_percent())),
            RED.stroke_width(2),
        ))?
        .label("Memory %")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}
