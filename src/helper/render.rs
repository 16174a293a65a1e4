use std::path::Path;
use std::process::{Command, Stdio};

use crate::helper::error::ServiceError;
use crate::helper::runner::run_tool;
use crate::helper::trees::TreeFormat;

/// Displays a finished tree. Side effect only.
pub trait TreeRenderer {
    fn render(&mut self, tree: &Path, format: TreeFormat) -> Result<(), ServiceError>;
}

/// Opens each tree in an external viewer (FigTree, Dendroscope, ...).
#[derive(Debug, Clone)]
pub struct ExternalViewer {
    program: String,
}

impl ExternalViewer {
    pub fn new(program: &str) -> Self {
        ExternalViewer {
            program: program.to_string(),
        }
    }

    pub fn build_command(&self, tree: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(tree).stdin(Stdio::null());
        cmd
    }
}

impl TreeRenderer for ExternalViewer {
    // both formats are understood by the common viewers
    fn render(&mut self, tree: &Path, _format: TreeFormat) -> Result<(), ServiceError> {
        run_tool(&self.program, &mut self.build_command(tree))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_command() {
        let viewer = ExternalViewer::new("figtree");
        let cmd = viewer.build_command(Path::new("trees/muscle_nj.nwk"));
        assert_eq!(cmd.get_program(), "figtree");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["trees/muscle_nj.nwk"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_viewer_runs() {
        let mut viewer = ExternalViewer::new("true");
        assert!(viewer.render(Path::new("x.nwk"), TreeFormat::Newick).is_ok());
        let mut missing = ExternalViewer::new("definitely_not_a_viewer");
        assert!(matches!(
            missing.render(Path::new("x.nwk"), TreeFormat::Nexus),
            Err(ServiceError::Spawn { .. })
        ));
    }
}
