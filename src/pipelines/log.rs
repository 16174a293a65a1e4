use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::telemetry::export::read_from_csv;
use crate::telemetry::summary::{export_summary_to_csv, plot_usage_timeline, summarize};

pub const SUMMARY_FILE: &str = "telemetry_summary.csv";
pub const TIMELINE_FILE: &str = "telemetry_usage.png";

/// Summarise an exported telemetry CSV per job and plot its CPU and memory
/// timeline. Outputs land next to the input unless `output` is given.
pub fn run_log(input: &Path, output: Option<&Path>) -> Result<PathBuf, Box<dyn Error>> {
    if !input.is_file() {
        return Err(format!("Telemetry file {} does not exist", input.display()).into());
    }

    let output_path = match output {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    if output_path.is_file() {
        return Err("Output path must be a directory".to_string().into());
    } else if !output_path.as_os_str().is_empty() && !output_path.exists() {
        fs::create_dir_all(&output_path)?;
    }

    let samples = read_from_csv(input)?;
    if samples.is_empty() {
        return Err(format!("No samples found in {}", input.display()).into());
    }
    println!("Read {} samples from {}", samples.len(), input.display());

    let summaries = summarize(&samples);
    let summary_path = output_path.join(SUMMARY_FILE);
    export_summary_to_csv(&summaries, &summary_path)?;

    for summary in &summaries {
        println!(
            "{:<10} {:<10} {:<24} {:>4} samples  cpu mean {:>6.2}%  max {:>6.2}%  mem max {:>6.2}%",
            summary.task_label(),
            summary.job_label(),
            summary.input_name(),
            summary.sample_count(),
            summary.cpu_mean(),
            summary.cpu_max(),
            summary.memory_used_max()
        );
    }
    println!("Summary written to {}", summary_path.display());

    // the chart needs system fonts; a missing font should not lose the summary
    let plot_path = output_path.join(TIMELINE_FILE);
    match plot_usage_timeline(&samples, &plot_path) {
        Ok(()) => println!("Usage timeline written to {}", plot_path.display()),
        Err(e) => eprintln!("Could not draw usage timeline: {}", e),
    }

    Ok(summary_path)
}
