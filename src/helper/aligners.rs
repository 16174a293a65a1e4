use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::helper::alignment_io::AlignmentFormat;
use crate::helper::error::ServiceError;
use crate::helper::muscle::{MuscleVersion, get_muscle_version};
use crate::helper::runner::{Toolbox, run_tool};

/// Multiple sequence aligners the pipeline knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aligner {
    Muscle,
    ClustalW,
    ClustalOmega,
    Mafft,
    ProbCons,
    TCoffee,
}

impl Aligner {
    pub const ALL: [Aligner; 6] = [
        Aligner::Muscle,
        Aligner::ClustalW,
        Aligner::ClustalOmega,
        Aligner::Mafft,
        Aligner::ProbCons,
        Aligner::TCoffee,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Aligner::Muscle => "muscle",
            Aligner::ClustalW => "clustalw",
            Aligner::ClustalOmega => "clustalo",
            Aligner::Mafft => "mafft",
            Aligner::ProbCons => "probcons",
            Aligner::TCoffee => "t-coffee",
        }
    }

    pub fn default_program(&self) -> &'static str {
        match self {
            Aligner::TCoffee => "t_coffee",
            other => other.name(),
        }
    }

    pub fn output_format(&self) -> AlignmentFormat {
        match self {
            Aligner::ClustalW | Aligner::ProbCons | Aligner::TCoffee => AlignmentFormat::Clustal,
            Aligner::Muscle | Aligner::ClustalOmega | Aligner::Mafft => AlignmentFormat::Fasta,
        }
    }

    /// MAFFT and ProbCons print the alignment instead of writing a file.
    pub fn writes_to_stdout(&self) -> bool {
        matches!(self, Aligner::Mafft | Aligner::ProbCons)
    }

    /// File name for this aligner's output inside the alignments directory.
    pub fn output_file_name(&self) -> String {
        format!("{}.{}", self.name(), self.output_format().extension())
    }
}

impl Display for Aligner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Aligner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Aligner::ALL
            .into_iter()
            .find(|a| a.name() == lower)
            .ok_or_else(|| format!("Unknown alignment algorithm: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRequest {
    pub aligner: Aligner,
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Produces an alignment file at `request.output`.
pub trait AlignmentService {
    fn align(&mut self, request: &AlignmentRequest) -> Result<(), ServiceError>;
}

/// Runs the real aligner executables as subprocesses.
#[derive(Debug, Clone, Default)]
pub struct CommandAligner {
    tools: Toolbox,
    muscle: Option<MuscleVersion>,
}

impl CommandAligner {
    pub fn new(tools: Toolbox) -> Self {
        CommandAligner {
            tools,
            muscle: None,
        }
    }

    /// Skip probing `muscle -version`.
    pub fn with_muscle_version(mut self, version: MuscleVersion) -> Self {
        self.muscle = Some(version);
        self
    }

    fn muscle_version(&mut self, program: &str) -> MuscleVersion {
        self.muscle
            .get_or_insert_with(|| get_muscle_version(program))
            .clone()
    }

    pub fn build_command(&mut self, request: &AlignmentRequest) -> Result<Command, ServiceError> {
        let aligner = request.aligner;
        let program = self
            .tools
            .program(aligner.name(), aligner.default_program())
            .to_string();
        let input = request.input.as_path();
        let output = request.output.as_path();

        let mut cmd = Command::new(&program);
        match aligner {
            Aligner::ClustalW => {
                cmd.arg(format!("-infile={}", input.display()))
                    .arg(format!("-outfile={}", output.display()));
            }
            Aligner::Muscle => {
                let version = self.muscle_version(&program);
                cmd = version
                    .build_command(&program, input, output)
                    .ok_or_else(|| unsupported_muscle(&program, &version))?;
            }
            Aligner::ClustalOmega => {
                cmd.arg("-i")
                    .arg(input)
                    .arg("-o")
                    .arg(output)
                    .arg("-v")
                    .arg("--auto")
                    .arg("--force");
            }
            Aligner::Mafft => {
                cmd.arg(input);
            }
            Aligner::TCoffee => {
                cmd.arg("-infile")
                    .arg(input)
                    .arg("-output")
                    .arg("clustalw")
                    .arg("-outfile")
                    .arg(output);
            }
            Aligner::ProbCons => {
                cmd.arg("-clustalw").arg(input);
            }
        }
        cmd.stdin(Stdio::null());
        Ok(cmd)
    }
}

fn unsupported_muscle(program: &str, version: &MuscleVersion) -> ServiceError {
    match version {
        MuscleVersion::NotInstalled => ServiceError::Spawn {
            tool: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "MUSCLE is not installed"),
        },
        other => ServiceError::CommandFailed {
            tool: program.to_string(),
            status: "unsupported version".to_string(),
            stderr: format!("{:?}", other),
        },
    }
}

impl AlignmentService for CommandAligner {
    fn align(&mut self, request: &AlignmentRequest) -> Result<(), ServiceError> {
        let mut cmd = self.build_command(request)?;
        let output = run_tool(request.aligner.name(), &mut cmd)?;
        if request.aligner.writes_to_stdout() {
            fs::write(&request.output, &output.stdout)?;
        }
        ensure_output(&request.output)
    }
}

pub(crate) fn ensure_output(path: &Path) -> Result<(), ServiceError> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(ServiceError::MissingOutput(path.to_path_buf())),
    }
}
