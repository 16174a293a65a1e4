use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MuscleVersion {
    Muscle3_8_31,
    Muscle5,
    Other(String),
    NotInstalled,
}

impl MuscleVersion {
    /// Build a MUSCLE command appropriate for the version, `None` when the
    /// version has no known command line.
    pub fn build_command(&self, program: &str, input: &Path, output: &Path) -> Option<Command> {
        let mut cmd = Command::new(program);
        match self {
            MuscleVersion::Muscle3_8_31 => {
                cmd.arg("-in").arg(input).arg("-out").arg(output);
            }
            MuscleVersion::Muscle5 => {
                cmd.arg("-align").arg(input).arg("-output").arg(output);
            }
            MuscleVersion::Other(_) | MuscleVersion::NotInstalled => return None,
        }
        Some(cmd)
    }
}

// Muscle 3.8.31 and Muscle 5 take different command line arguments
pub fn get_muscle_version(program: &str) -> MuscleVersion {
    let output = match Command::new(program).arg("-version").output() {
        Ok(out) => out,
        Err(_) => return MuscleVersion::NotInstalled,
    };

    if !output.status.success() {
        return MuscleVersion::NotInstalled;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let text = if !stdout.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };

    parse_muscle_version(text)
}

fn parse_muscle_version(text: &str) -> MuscleVersion {
    let lower = text.to_lowercase();
    if lower.contains("3.8.31") {
        MuscleVersion::Muscle3_8_31
    } else if lower.contains("muscle 5") || lower.contains("muscle v5") {
        MuscleVersion::Muscle5
    } else {
        MuscleVersion::Other(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|s| s.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_parse_muscle_version() {
        assert_eq!(
            parse_muscle_version("MUSCLE v3.8.31 by Robert C. Edgar"),
            MuscleVersion::Muscle3_8_31
        );
        assert_eq!(
            parse_muscle_version("muscle 5.1.linux64 [12f0e2]"),
            MuscleVersion::Muscle5
        );
        assert!(matches!(
            parse_muscle_version("muscle 4.0"),
            MuscleVersion::Other(_)
        ));
    }

    #[test]
    fn test_missing_muscle_binary() {
        assert_eq!(
            get_muscle_version("definitely_not_muscle_binary"),
            MuscleVersion::NotInstalled
        );
    }

    #[test]
    fn test_muscle_command_building() {
        let input = Path::new("input.fasta");
        let output = Path::new("output.fasta");

        let cmd_3 = MuscleVersion::Muscle3_8_31
            .build_command("muscle", input, output)
            .unwrap();
        assert_eq!(args(&cmd_3), vec!["-in", "input.fasta", "-out", "output.fasta"]);

        let cmd_5 = MuscleVersion::Muscle5
            .build_command("muscle5", input, output)
            .unwrap();
        assert_eq!(cmd_5.get_program(), "muscle5");
        assert_eq!(
            args(&cmd_5),
            vec!["-align", "input.fasta", "-output", "output.fasta"]
        );

        assert!(MuscleVersion::NotInstalled
            .build_command("muscle", input, output)
            .is_none());
    }
}
