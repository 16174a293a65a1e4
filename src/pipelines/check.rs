use std::error::Error;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::helper::muscle::{MuscleVersion, get_muscle_version};
use crate::helper::runner::{KNOWN_TOOLS, Toolbox, is_available};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub tool: String,
    pub program: String,
    pub available: bool,
    pub detail: String,
}

/// Probe every known tool once, honouring executable overrides.
pub fn check_tools(tools: &Toolbox) -> Vec<ToolStatus> {
    KNOWN_TOOLS
        .iter()
        .map(|(tool, default, flag)| {
            let program = tools.program(tool, default);
            let (available, detail) = match is_available(program, &[*flag]) {
                Ok(()) if *tool == "muscle" => match get_muscle_version(program) {
                    MuscleVersion::Muscle3_8_31 => (true, "MUSCLE 3.8.31".to_string()),
                    MuscleVersion::Muscle5 => (true, "MUSCLE 5".to_string()),
                    MuscleVersion::Other(v) => (true, format!("unsupported version: {}", v)),
                    MuscleVersion::NotInstalled => (false, "version check failed".to_string()),
                },
                Ok(()) => (true, "ok".to_string()),
                Err(e) => (false, e.to_string()),
            };
            ToolStatus {
                tool: tool.to_string(),
                program: program.to_string(),
                available,
                detail,
            }
        })
        .collect()
}

pub fn run_check(config: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let tools = match config {
        Some(path) => {
            let config = PipelineConfig::from_file(path)?;
            let mut overrides = config.tools.clone();
            if let Some(viewer) = config.viewer {
                overrides.insert("viewer".to_string(), viewer);
            }
            Toolbox::new(overrides)
        }
        None => Toolbox::default(),
    };

    let statuses = check_tools(&tools);
    for status in &statuses {
        let mark = if status.available { "\u{2713}" } else { "\u{2717}" };
        println!(
            "{} {:<10} {:<20} {}",
            mark, status.tool, status.program, status.detail
        );
    }
    let missing = statuses.iter().filter(|s| !s.available).count();
    println!(
        "{} of {} tools available",
        statuses.len() - missing,
        statuses.len()
    );
    Ok(())
}
