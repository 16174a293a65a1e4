use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::helper::aligners::ensure_output;
use crate::helper::alignment_io::{read_alignment, write_fasta, write_phylip};
use crate::helper::error::ServiceError;
use crate::helper::runner::{Toolbox, run_tool};

const RAXML_MODEL: &str = "GTRGAMMA";
const RAXML_SEED: &str = "12345";
const RAXML_REPLICATES: &str = "10";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeMethod {
    NeighborJoining,
    Upgma,
    Raxml,
}

impl TreeMethod {
    pub fn name(&self) -> &'static str {
        match self {
            TreeMethod::NeighborJoining => "nj",
            TreeMethod::Upgma => "upgma",
            TreeMethod::Raxml => "raxml",
        }
    }
}

impl Display for TreeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TreeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nj" => Ok(TreeMethod::NeighborJoining),
            // approximates a UPGMA tree over an identity distance matrix
            "upgma" | "distancetreeconstructor" => Ok(TreeMethod::Upgma),
            "raxml" => Ok(TreeMethod::Raxml),
            _ => Err(format!("Unknown tree method: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeFormat {
    Newick,
    Nexus,
}

impl TreeFormat {
    pub fn name(&self) -> &'static str {
        match self {
            TreeFormat::Newick => "newick",
            TreeFormat::Nexus => "nexus",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TreeFormat::Newick => "nwk",
            TreeFormat::Nexus => "nex",
        }
    }
}

impl Display for TreeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TreeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newick" => Ok(TreeFormat::Newick),
            "nexus" => Ok(TreeFormat::Nexus),
            _ => Err(format!("Unsupported tree output format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRequest {
    pub method: TreeMethod,
    pub alignment: PathBuf,
    pub output: PathBuf,
    pub format: TreeFormat,
}

/// Builds one tree file from one alignment.
pub trait TreeService {
    fn build(&mut self, request: &TreeRequest) -> Result<(), ServiceError>;
}

/// Distance trees through ClustalW, maximum likelihood through RAxML.
#[derive(Debug, Clone, Default)]
pub struct CommandTreeBuilder {
    tools: Toolbox,
}

impl CommandTreeBuilder {
    pub fn new(tools: Toolbox) -> Self {
        CommandTreeBuilder { tools }
    }

    /// ClustalW writes the tree next to its input as `<stem>.ph`.
    pub fn clustalw_command(&self, method: TreeMethod, fasta: &Path) -> (Command, PathBuf) {
        let clustering = match method {
            TreeMethod::Upgma => "UPGMA",
            _ => "NJ",
        };
        let mut cmd = Command::new(self.tools.program("clustalw", "clustalw"));
        cmd.arg(format!("-infile={}", fasta.display()))
            .arg("-tree")
            .arg(format!("-clustering={}", clustering))
            .arg("-outputtree=phylip")
            .stdin(Stdio::null());
        (cmd, fasta.with_extension("ph"))
    }

    /// `workdir` must be absolute: RAxML rejects relative `-w` paths.
    pub fn raxml_command(&self, phylip: &Path, workdir: &Path, run_name: &str) -> (Command, PathBuf) {
        let mut cmd = Command::new(self.tools.program("raxml", "raxmlHPC"));
        cmd.arg("-f")
            .arg("a")
            .arg("-m")
            .arg(RAXML_MODEL)
            .arg("-p")
            .arg(RAXML_SEED)
            .arg("-x")
            .arg(RAXML_SEED)
            .arg("-N")
            .arg(RAXML_REPLICATES)
            .arg("-s")
            .arg(phylip)
            .arg("-n")
            .arg(run_name)
            .arg("-w")
            .arg(workdir)
            .stdin(Stdio::null());
        (cmd, workdir.join(format!("RAxML_bestTree.{}", run_name)))
    }

    fn infer_newick(&self, request: &TreeRequest, scratch: &Path) -> Result<String, ServiceError> {
        let alignment = read_alignment(&request.alignment)?;
        let (mut cmd, tree_path, tool) = match request.method {
            TreeMethod::NeighborJoining | TreeMethod::Upgma => {
                let fasta = scratch.join("alignment.fasta");
                write_fasta(&alignment, &fasta)?;
                let (cmd, tree) = self.clustalw_command(request.method, &fasta);
                (cmd, tree, "clustalw")
            }
            TreeMethod::Raxml => {
                let workdir = fs::canonicalize(scratch)?;
                let phylip = workdir.join("alignment.phy");
                write_phylip(&alignment, &phylip)?;
                let (cmd, tree) = self.raxml_command(&phylip, &workdir, "phylo_bench");
                (cmd, tree, "raxml")
            }
        };
        run_tool(tool, &mut cmd)?;
        ensure_output(&tree_path)?;
        Ok(fs::read_to_string(&tree_path)?)
    }
}

impl TreeService for CommandTreeBuilder {
    fn build(&mut self, request: &TreeRequest) -> Result<(), ServiceError> {
        let scratch = scratch_dir(&request.output);
        if scratch.exists() {
            fs::remove_dir_all(&scratch)?;
        }
        fs::create_dir_all(&scratch)?;

        let result = self
            .infer_newick(request, &scratch)
            .and_then(|newick| write_tree(&newick, request.format, &request.output));

        // scratch is disposable either way
        let _ = fs::remove_dir_all(&scratch);
        result
    }
}

fn scratch_dir(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "tree".to_string());
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!(".scratch_{}", stem))
}

/// Collapse a (possibly multi-line) Newick string onto one `;`-terminated line.
pub fn normalize_newick(newick: &str) -> String {
    let mut joined: String = newick.lines().map(str::trim).collect();
    if !joined.ends_with(';') {
        joined.push(';');
    }
    joined
}

pub fn to_nexus(newick: &str) -> String {
    format!(
        "#NEXUS\nBEGIN TREES;\n    TREE tree1 = {}\nEND;\n",
        normalize_newick(newick)
    )
}

pub fn write_tree(newick: &str, format: TreeFormat, path: &Path) -> Result<(), ServiceError> {
    let body = match format {
        TreeFormat::Newick => format!("{}\n", normalize_newick(newick)),
        TreeFormat::Nexus => to_nexus(newick),
    };
    fs::write(path, body)?;
    Ok(())
}
