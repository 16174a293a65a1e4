use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use itertools::{Itertools, iproduct};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::helper::aligners::{Aligner, AlignmentRequest, AlignmentService, CommandAligner};
use crate::helper::alignment_io::AlignmentFormat;
use crate::helper::error::{PipelineError, ServiceError, TelemetryError};
use crate::helper::render::{ExternalViewer, TreeRenderer};
use crate::helper::runner::Toolbox;
use crate::helper::trees::{CommandTreeBuilder, TreeFormat, TreeMethod, TreeRequest, TreeService};
use crate::helper::utils::RunLog;
use crate::pipelines::report::{JobRecord, JobStatus, PipelineReport, PipelineWarning};
use crate::telemetry::export::export_to_csv;
use crate::telemetry::reader::{ProcfsReader, ResourceReader};
use crate::telemetry::sampler::{self, SamplerHandle, SamplerSettings};
use crate::telemetry::{JobContext, RunSignal, SampleLog, SharedContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriverState {
    #[default]
    Idle,
    CleaningOutputs,
    RunningAlignmentPhase,
    RunningTreePhase,
    StoppingSampler,
    Exported,
    Done,
}

impl Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DriverState::Idle => "Idle",
            DriverState::CleaningOutputs => "CleaningOutputs",
            DriverState::RunningAlignmentPhase => "RunningAlignmentPhase",
            DriverState::RunningTreePhase => "RunningTreePhase",
            DriverState::StoppingSampler => "StoppingSampler",
            DriverState::Exported => "Exported",
            DriverState::Done => "Done",
        };
        write!(f, "{}", name)
    }
}

/// The external collaborators of one run.
pub struct Services {
    pub aligner: Box<dyn AlignmentService>,
    pub trees: Box<dyn TreeService>,
    pub renderer: Option<Box<dyn TreeRenderer>>,
    pub reader: Box<dyn ResourceReader + Send>,
}

impl Services {
    /// Subprocess-backed services and the procfs reader.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let tools = Toolbox::new(config.tools.clone());
        let renderer = config
            .viewer
            .as_deref()
            .map(|viewer| Box::new(ExternalViewer::new(viewer)) as Box<dyn TreeRenderer>);
        Services {
            aligner: Box::new(CommandAligner::new(tools.clone())),
            trees: Box::new(CommandTreeBuilder::new(tools)),
            renderer,
            reader: Box::new(ProcfsReader::new(config.telemetry.cpu_window())),
        }
    }
}

/// An alignment file written during this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedAlignment {
    pub name: String,
    pub path: PathBuf,
    pub format: AlignmentFormat,
}

pub struct Pipeline {
    config: PipelineConfig,
    aligner: Box<dyn AlignmentService>,
    trees: Box<dyn TreeService>,
    renderer: Option<Box<dyn TreeRenderer>>,
    reader: Option<Box<dyn ResourceReader + Send>>,
    log: RunLog,
    state: DriverState,
    context: SharedContext,
    samples: SampleLog,
    report: PipelineReport,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, services: Services) -> Self {
        let report = PipelineReport::new(&config);
        Pipeline {
            config,
            aligner: services.aligner,
            trees: services.trees,
            renderer: services.renderer,
            reader: Some(services.reader),
            log: RunLog::new(Box::new(io::stdout()), false),
            state: DriverState::Idle,
            context: SharedContext::default(),
            samples: SampleLog::new(),
            report,
        }
    }

    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Clean the outputs, run both phases with the sampler in the background,
    /// then stop the sampler and export. Export and the report are written
    /// whether or not a phase failed; the first error is returned afterwards.
    pub fn run(mut self) -> Result<PipelineReport, PipelineError> {
        self.note(&format!(
            "Starting pipeline, version {}",
            env!("CARGO_PKG_VERSION")
        ));
        self.note(&format!("Input file: {}", self.config.input.display()));
        self.note(&format!("Output root: {}", self.config.output_root.display()));

        self.enter(DriverState::CleaningOutputs);
        if let Err(e) = self.prepare_outputs() {
            if let Err(log_error) = self.log.finish(&format!("Error preparing outputs: {}", e)) {
                eprintln!("Failed to write run log: {}", log_error);
            }
            return Err(e);
        }

        let sampler = self.start_sampler();
        let outcome = self.run_phases();
        if let Err(e) = &outcome {
            self.note(&format!("Error running pipeline: {}", e));
            self.report.add_error(e.to_string());
        }

        self.enter(DriverState::StoppingSampler);
        self.stop_sampler(sampler);

        let exported = self.export_samples();
        if let Err(e) = &exported {
            self.note(&format!("Error exporting telemetry: {}", e));
            self.report.add_error(e.to_string());
        }
        self.enter(DriverState::Exported);

        self.enter(DriverState::Done);
        self.report.finish(self.state);
        let written = self.write_report();

        let summary = format!(
            "Pipeline finished: {} jobs completed, {} warnings, {} errors",
            self.report.completed_jobs(),
            self.report.warnings().len(),
            self.report.errors().len()
        );
        if let Err(e) = self.log.finish(&summary) {
            eprintln!("Failed to write run log: {}", e);
        }

        outcome?;
        exported?;
        written?;
        Ok(self.report)
    }

    fn note(&mut self, message: &str) {
        if let Err(e) = self.log.line(message) {
            eprintln!("Failed to write run log: {}", e);
        }
    }

    fn enter(&mut self, next: DriverState) {
        self.note(&format!("State: {} -> {}", self.state, next));
        self.state = next;
        self.log.set_status(&next.to_string());
    }

    fn prepare_outputs(&mut self) -> Result<(), PipelineError> {
        if !self.config.input.is_file() {
            return Err(PipelineError::InputNotFound(self.config.input.clone()));
        }
        for dir in [self.config.alignments_dir(), self.config.trees_dir()] {
            reset_dir(&dir)?;
            self.note(&format!("Cleaned output directory {}", dir.display()));
        }
        Ok(())
    }

    fn start_sampler(&mut self) -> Option<SamplerHandle> {
        if !self.config.telemetry.enabled {
            self.note("Telemetry disabled, sampler not started");
            return None;
        }
        let mut reader = self.reader.take()?;
        let base = match sampler::baseline(&mut reader) {
            Ok(base) => base,
            Err(e) => {
                self.sampler_failed(e);
                return None;
            }
        };
        let settings = SamplerSettings {
            interval: self.config.telemetry.interval(),
            disk_root: self.config.telemetry.disk_root.clone(),
        };
        match sampler::start(
            reader,
            self.samples.clone(),
            self.context.clone(),
            RunSignal::new(),
            settings,
            base,
        ) {
            Ok(handle) => {
                self.note(&format!(
                    "Sampler started, interval {}s",
                    self.config.telemetry.interval_secs
                ));
                Some(handle)
            }
            Err(e) => {
                self.sampler_failed(e);
                None
            }
        }
    }

    fn stop_sampler(&mut self, sampler: Option<SamplerHandle>) {
        let Some(handle) = sampler else {
            return;
        };
        match handle.stop_and_join() {
            Ok(ticks) => self.note(&format!("Sampler stopped after {} samples", ticks)),
            Err(e) => self.sampler_failed(e),
        }
    }

    // sampler trouble never fails the run
    fn sampler_failed(&mut self, error: TelemetryError) {
        let warning = PipelineWarning::SamplerFailed(error.to_string());
        self.note(&format!("Warning: {}", warning));
        self.report.add_warning(warning);
    }

    fn run_phases(&mut self) -> Result<(), PipelineError> {
        self.enter(DriverState::RunningAlignmentPhase);
        let aligned = self.run_alignment_phase();
        self.enter(DriverState::RunningTreePhase);
        // a fatal alignment error still passes through the tree phase, with no jobs
        let alignments = aligned?;
        self.run_tree_phase(&alignments)
    }

    fn run_alignment_phase(&mut self) -> Result<Vec<ProducedAlignment>, PipelineError> {
        let input_name = file_name(&self.config.input);
        let alignments_dir = self.config.alignments_dir();
        let mut produced = Vec::new();

        for name in self.config.algorithms.clone() {
            let aligner = match name.parse::<Aligner>() {
                Ok(aligner) => aligner,
                Err(_) => {
                    self.skip(PipelineWarning::UnknownAlgorithm(name));
                    continue;
                }
            };
            let format = aligner.output_format();
            let output = alignments_dir.join(aligner.output_file_name());
            self.context.set(
                JobContext::new("alignment", aligner.name(), &input_name)
                    .with_extras(&format.to_string(), ""),
            );
            self.note(&format!("Running {} on {}", aligner, input_name));

            let request = AlignmentRequest {
                aligner,
                input: self.config.input.clone(),
                output: output.clone(),
            };
            let started = Instant::now();
            let result = self.aligner.align(&request);
            if self.record_job("alignment", aligner.name(), &input_name, &output, started, result)? {
                produced.push(ProducedAlignment {
                    name: aligner.name().to_string(),
                    path: output,
                    format,
                });
            }
        }
        Ok(produced)
    }

    /// Trees come only from alignments produced in this run.
    fn run_tree_phase(&mut self, alignments: &[ProducedAlignment]) -> Result<(), PipelineError> {
        let method_names = self.config.tree_methods.clone();
        let format_names = self.config.tree_formats.clone();
        let methods: Vec<TreeMethod> =
            self.resolve(&method_names, PipelineWarning::UnknownTreeMethod);
        let formats: Vec<TreeFormat> =
            self.resolve(&format_names, PipelineWarning::UnknownTreeFormat);
        let trees_dir = self.config.trees_dir();

        for (alignment, method, format) in iproduct!(alignments, &methods, &formats) {
            let input_name = file_name(&alignment.path);
            let output = trees_dir.join(format!(
                "{}_{}.{}",
                alignment.name,
                method.name(),
                format.extension()
            ));
            self.context.set(
                JobContext::new("tree", method.name(), &input_name)
                    .with_extras(method.name(), format.name()),
            );
            self.note(&format!(
                "Building {} tree ({}) from {}",
                method, format, input_name
            ));

            let request = TreeRequest {
                method: *method,
                alignment: alignment.path.clone(),
                output: output.clone(),
                format: *format,
            };
            let started = Instant::now();
            let result = self.trees.build(&request);
            if self.record_job("tree", method.name(), &input_name, &output, started, result)? {
                self.render(&output, *method, *format)?;
            }
        }
        Ok(())
    }

    fn render(
        &mut self,
        tree: &Path,
        method: TreeMethod,
        format: TreeFormat,
    ) -> Result<(), PipelineError> {
        if self.renderer.is_none() {
            return Ok(());
        }
        let tree_name = file_name(tree);
        self.context.set(
            JobContext::new("render", method.name(), &tree_name)
                .with_extras(method.name(), format.name()),
        );
        let started = Instant::now();
        let result = match self.renderer.as_mut() {
            Some(renderer) => renderer.render(tree, format),
            None => Ok(()),
        };
        self.record_job("render", method.name(), &tree_name, tree, started, result)?;
        Ok(())
    }

    /// Parse each distinct name, logging and recording the ones that don't.
    fn resolve<T: FromStr>(
        &mut self,
        names: &[String],
        unknown: fn(String) -> PipelineWarning,
    ) -> Vec<T> {
        let mut resolved = Vec::new();
        for name in names.iter().unique() {
            match name.parse::<T>() {
                Ok(value) => resolved.push(value),
                Err(_) => self.skip(unknown(name.clone())),
            }
        }
        resolved
    }

    fn skip(&mut self, warning: PipelineWarning) {
        self.note(&format!("{}, skipping", warning));
        self.report.add_warning(warning);
    }

    /// `Ok(true)` when the job produced its output. A failure aborts the run
    /// unless `continue_on_job_failure` is set.
    fn record_job(
        &mut self,
        task: &str,
        job: &str,
        input: &str,
        output: &Path,
        started: Instant,
        result: Result<(), ServiceError>,
    ) -> Result<bool, PipelineError> {
        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(()) => {
                self.note(&format!(
                    "Finished {} {} in {:.2}s: {}",
                    task,
                    job,
                    elapsed,
                    output.display()
                ));
                self.report.add_job(JobRecord::new(
                    task,
                    job,
                    input,
                    output,
                    JobStatus::Completed,
                    elapsed,
                ));
                Ok(true)
            }
            Err(source) => {
                self.report.add_job(JobRecord::new(
                    task,
                    job,
                    input,
                    output,
                    JobStatus::Failed,
                    elapsed,
                ));
                let label = format!("{} {} on {}", task, job, input);
                if self.config.continue_on_job_failure {
                    let warning = PipelineWarning::JobFailed(label, source.to_string());
                    self.note(&format!("Warning: {}, continuing", warning));
                    self.report.add_warning(warning);
                    Ok(false)
                } else {
                    Err(PipelineError::Job { job: label, source })
                }
            }
        }
    }

    fn export_samples(&mut self) -> Result<(), PipelineError> {
        if !self.config.telemetry.enabled {
            return Ok(());
        }
        let path = self.config.telemetry_output();
        let rows = export_to_csv(&self.samples, &path).map_err(PipelineError::Export)?;
        self.note(&format!("Exported {} samples to {}", rows, path.display()));
        self.report.set_telemetry(&path, rows);
        Ok(())
    }

    fn write_report(&mut self) -> Result<(), PipelineError> {
        let path = self.config.report_path();
        let json = serde_json::to_string_pretty(&self.report)?;
        fs::write(&path, json)?;
        self.note(&format!("Run report written to {}", path.display()));
        Ok(())
    }
}

fn reset_dir(dir: &Path) -> Result<(), PipelineError> {
    let setup_error = |source| PipelineError::OutputSetup {
        path: dir.to_path_buf(),
        source,
    };
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(setup_error(e)),
    }
    fs::create_dir_all(dir).map_err(setup_error)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `run` command: validate the config, open the run log and drive the pipeline.
pub fn run_pipeline(config: PipelineConfig) -> Result<(), Box<dyn Error>> {
    config.validate()?;
    fs::create_dir_all(&config.output_root)?;
    let log = RunLog::to_file(&config.run_log_path())?.with_spinner();
    let services = Services::from_config(&config);

    let report = Pipeline::new(config, services).with_log(log).run()?;
    for warning in report.warnings() {
        println!("Warning: {}", warning);
    }
    if let Some(file) = report.telemetry_file() {
        println!(
            "Telemetry: {} samples written to {}",
            report.samples_recorded(),
            file
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::json::FromJsonString;
    use crate::helper::utils::tests::SharedBuffer;
    use crate::telemetry::export::read_from_csv;
    use crate::telemetry::sampler::tests::StubReader;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    const ORCHID_INPUT: &str = "tests/data/input/ls_orchid.fasta";
    const ORCHID_ALIGNMENT: &str = "tests/data/alignment/orchid.aligned.fasta";

    #[derive(Clone, Default)]
    struct StubAligner {
        requests: Arc<Mutex<Vec<AlignmentRequest>>>,
        fail_on: Option<Aligner>,
        delay: Duration,
    }

    impl AlignmentService for StubAligner {
        fn align(&mut self, request: &AlignmentRequest) -> Result<(), ServiceError> {
            self.requests.lock().unwrap().push(request.clone());
            thread::sleep(self.delay);
            if self.fail_on == Some(request.aligner) {
                return Err(ServiceError::CommandFailed {
                    tool: request.aligner.name().to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "stub failure".to_string(),
                });
            }
            fs::copy(ORCHID_ALIGNMENT, &request.output)?;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct StubTrees {
        requests: Arc<Mutex<Vec<TreeRequest>>>,
        delay: Duration,
    }

    impl TreeService for StubTrees {
        fn build(&mut self, request: &TreeRequest) -> Result<(), ServiceError> {
            self.requests.lock().unwrap().push(request.clone());
            thread::sleep(self.delay);
            fs::write(&request.output, "(Z78533.1,Z78532.1,(Z78531.1,Z78530.1));\n")?;
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct StubRenderer {
        rendered: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl TreeRenderer for StubRenderer {
        fn render(&mut self, tree: &Path, _format: TreeFormat) -> Result<(), ServiceError> {
            self.rendered.lock().unwrap().push(tree.to_path_buf());
            Ok(())
        }
    }

    fn test_config(output_root: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::new(PathBuf::from(ORCHID_INPUT));
        config.output_root = output_root.to_path_buf();
        config.telemetry.interval_secs = 0.01;
        config
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn build_pipeline(
        config: PipelineConfig,
        aligner: &StubAligner,
        trees: &StubTrees,
        renderer: Option<&StubRenderer>,
        reader: StubReader,
        buffer: &SharedBuffer,
    ) -> Pipeline {
        let services = Services {
            aligner: Box::new(aligner.clone()),
            trees: Box::new(trees.clone()),
            renderer: renderer.map(|r| Box::new(r.clone()) as Box<dyn TreeRenderer>),
            reader: Box::new(reader),
        };
        Pipeline::new(config, services).with_log(RunLog::new(Box::new(buffer.clone()), false))
    }

    #[test]
    fn test_unknown_algorithm_is_skipped_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["muscle", "bogus-algo"]);
        config.tree_methods = Vec::new();

        let aligner = StubAligner::default();
        let buffer = SharedBuffer::default();
        let report = build_pipeline(
            config,
            &aligner,
            &StubTrees::default(),
            None,
            StubReader::new(),
            &buffer,
        )
        .run()
        .unwrap();

        let requests = aligner.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].aligner, Aligner::Muscle);
        assert_eq!(
            requests[0].output,
            dir.path().join("alignments").join("muscle.fasta")
        );
        assert_eq!(
            report.warnings(),
            &vec![PipelineWarning::UnknownAlgorithm("bogus-algo".to_string())]
        );
        assert_eq!(report.completed_jobs(), 1);

        let log = buffer.contents();
        assert!(log.contains("Unknown alignment algorithm: bogus-algo, skipping"));
    }

    #[test]
    fn test_every_configured_job_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["muscle", "clustalw", "nope"]);
        config.tree_methods = names(&["nj", "raxml", "parsimony", "nj"]);
        config.tree_formats = names(&["newick", "nexus"]);

        let aligner = StubAligner::default();
        let trees = StubTrees::default();
        let renderer = StubRenderer::default();
        let report = build_pipeline(
            config,
            &aligner,
            &trees,
            Some(&renderer),
            StubReader::new(),
            &SharedBuffer::default(),
        )
        .run()
        .unwrap();

        assert_eq!(aligner.requests.lock().unwrap().len(), 2);
        let tree_requests = trees.requests.lock().unwrap();
        // 2 alignments x 2 known methods x 2 formats
        assert_eq!(tree_requests.len(), 8);
        let outputs: Vec<_> = tree_requests.iter().map(|r| r.output.clone()).collect();
        assert_eq!(outputs.iter().unique().count(), 8);
        assert_eq!(tree_requests[0].alignment, dir.path().join("alignments/muscle.fasta"));
        assert_eq!(tree_requests[0].output, dir.path().join("trees/muscle_nj.nwk"));
        assert_eq!(tree_requests[1].output, dir.path().join("trees/muscle_nj.nex"));
        assert_eq!(tree_requests[2].method, TreeMethod::Raxml);
        assert_eq!(tree_requests[4].alignment, dir.path().join("alignments/clustalw.aln"));
        assert_eq!(renderer.rendered.lock().unwrap().len(), 8);

        assert!(report.warnings().contains(&PipelineWarning::UnknownTreeMethod("parsimony".to_string())));
        assert!(report.warnings().contains(&PipelineWarning::UnknownAlgorithm("nope".to_string())));
        // 2 alignments + 8 trees + 8 renders
        assert_eq!(report.completed_jobs(), 18);
    }

    #[test]
    fn test_stale_outputs_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let stale_alignment = dir.path().join("alignments/old.aln");
        let stale_tree = dir.path().join("trees/old_nj.nwk");
        fs::create_dir_all(stale_alignment.parent().unwrap()).unwrap();
        fs::create_dir_all(stale_tree.parent().unwrap()).unwrap();
        fs::write(&stale_alignment, "CLUSTAL W\n").unwrap();
        fs::write(&stale_tree, "(a,b);").unwrap();

        let mut config = test_config(dir.path());
        config.algorithms = names(&["mafft"]);
        let trees = StubTrees::default();
        build_pipeline(
            config,
            &StubAligner::default(),
            &trees,
            None,
            StubReader::new(),
            &SharedBuffer::default(),
        )
        .run()
        .unwrap();

        assert!(!stale_alignment.exists());
        assert!(!stale_tree.exists());
        // trees never come from a directory scan
        assert!(
            trees
                .requests
                .lock()
                .unwrap()
                .iter()
                .all(|r| r.alignment.ends_with("mafft.fasta"))
        );
    }

    #[test]
    fn test_job_failure_still_exports() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["muscle", "mafft", "clustalo"]);
        let aligner = StubAligner {
            fail_on: Some(Aligner::Mafft),
            ..StubAligner::default()
        };
        let trees = StubTrees::default();
        let buffer = SharedBuffer::default();

        let result = build_pipeline(
            config,
            &aligner,
            &trees,
            None,
            StubReader::new(),
            &buffer,
        )
        .run();
        match result {
            Err(PipelineError::Job { job, .. }) => assert!(job.contains("mafft")),
            other => panic!("unexpected result: {:?}", other.map(|r| r.completed_jobs())),
        }

        assert_eq!(aligner.requests.lock().unwrap().len(), 2);
        assert!(trees.requests.lock().unwrap().is_empty());

        let telemetry = dir.path().join("telemetry.csv");
        assert!(telemetry.exists());
        let header = fs::read_to_string(&telemetry).unwrap();
        assert!(header.starts_with("taskLabel,jobLabel,inputName"));

        let report =
            PipelineReport::from_json_string(&fs::read_to_string(dir.path().join("run_report.json")).unwrap())
                .unwrap();
        assert!(!report.is_successful());
        assert_eq!(report.final_state(), &DriverState::Done);

        let log = buffer.contents();
        let stopping = log.find("-> StoppingSampler").unwrap();
        let exported = log.find("-> Exported").unwrap();
        assert!(stopping < exported);
    }

    #[test]
    fn test_continue_on_job_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["muscle", "mafft", "clustalo"]);
        config.tree_methods = names(&["upgma"]);
        config.continue_on_job_failure = true;
        let aligner = StubAligner {
            fail_on: Some(Aligner::Mafft),
            ..StubAligner::default()
        };
        let trees = StubTrees::default();

        let report = build_pipeline(
            config,
            &aligner,
            &trees,
            None,
            StubReader::new(),
            &SharedBuffer::default(),
        )
        .run()
        .unwrap();

        assert_eq!(aligner.requests.lock().unwrap().len(), 3);
        let tree_inputs: Vec<_> = trees
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| file_name(&r.alignment))
            .collect();
        assert_eq!(tree_inputs, vec!["muscle.fasta", "clustalo.fasta"]);
        assert!(matches!(
            report.warnings().as_slice(),
            [PipelineWarning::JobFailed(job, _)] if job.contains("mafft")
        ));
        let failed = report
            .jobs()
            .iter()
            .filter(|j| j.status() == JobStatus::Failed)
            .count();
        assert_eq!(failed, 1);
    }

    #[test]
    fn test_sampler_failure_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["muscle"]);
        let mut reader = StubReader::new();
        // baseline read succeeds, the first tick fails
        reader.fail_after = Some(1);

        let report = build_pipeline(
            config,
            &StubAligner::default(),
            &StubTrees::default(),
            None,
            reader,
            &SharedBuffer::default(),
        )
        .run()
        .unwrap();

        assert!(
            report
                .warnings()
                .iter()
                .any(|w| matches!(w, PipelineWarning::SamplerFailed(_)))
        );
        assert_eq!(report.samples_recorded(), 0);
        assert_eq!(report.completed_jobs(), 3);
        assert!(dir.path().join("telemetry.csv").exists());
    }

    #[test]
    fn test_samples_carry_job_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["muscle"]);
        config.tree_methods = names(&["nj"]);
        config.telemetry.interval_secs = 0.005;
        let aligner = StubAligner {
            delay: Duration::from_millis(60),
            ..StubAligner::default()
        };
        let trees = StubTrees {
            delay: Duration::from_millis(60),
            ..StubTrees::default()
        };

        let report = build_pipeline(
            config,
            &aligner,
            &trees,
            None,
            StubReader::new(),
            &SharedBuffer::default(),
        )
        .run()
        .unwrap();

        let samples = read_from_csv(&dir.path().join("telemetry.csv")).unwrap();
        assert_eq!(samples.len(), report.samples_recorded());
        assert!(samples.iter().any(|s| s.task_label() == "alignment"
            && s.job_label() == "muscle"
            && s.input_name() == "ls_orchid.fasta"
            && s.extra_label1() == "fasta"));
        assert!(samples.iter().any(|s| s.task_label() == "tree"
            && s.job_label() == "nj"
            && s.input_name() == "muscle.fasta"
            && s.extra_label2() == "newick"));
        for pair in samples.windows(2) {
            assert!(pair[0].timestamp() <= pair[1].timestamp());
        }
    }

    #[test]
    fn test_state_transitions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["probcons"]);
        let buffer = SharedBuffer::default();
        build_pipeline(
            config,
            &StubAligner::default(),
            &StubTrees::default(),
            None,
            StubReader::new(),
            &buffer,
        )
        .run()
        .unwrap();

        let log = buffer.contents();
        let order = [
            "Idle -> CleaningOutputs",
            "CleaningOutputs -> RunningAlignmentPhase",
            "RunningAlignmentPhase -> RunningTreePhase",
            "RunningTreePhase -> StoppingSampler",
            "StoppingSampler -> Exported",
            "Exported -> Done",
        ];
        let positions: Vec<usize> = order.iter().map(|s| log.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_failed_alignment_passes_through_tree_phase() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["mafft"]);
        let aligner = StubAligner {
            fail_on: Some(Aligner::Mafft),
            ..StubAligner::default()
        };
        let trees = StubTrees::default();
        let buffer = SharedBuffer::default();

        let result = build_pipeline(
            config,
            &aligner,
            &trees,
            None,
            StubReader::new(),
            &buffer,
        )
        .run();
        assert!(matches!(result, Err(PipelineError::Job { .. })));
        assert!(trees.requests.lock().unwrap().is_empty());

        let log = buffer.contents();
        let order = [
            "CleaningOutputs -> RunningAlignmentPhase",
            "RunningAlignmentPhase -> RunningTreePhase",
            "RunningTreePhase -> StoppingSampler",
            "StoppingSampler -> Exported",
            "Exported -> Done",
        ];
        let positions: Vec<usize> = order.iter().map(|s| log.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!log.contains("RunningAlignmentPhase -> StoppingSampler"));
    }

    #[test]
    fn test_undeletable_output_dir_fails_before_any_job() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the alignments directory should be
        fs::write(dir.path().join("alignments"), "not a directory").unwrap();
        let aligner = StubAligner::default();
        let buffer = SharedBuffer::default();

        let result = build_pipeline(
            test_config(dir.path()),
            &aligner,
            &StubTrees::default(),
            None,
            StubReader::new(),
            &buffer,
        )
        .run();
        match result {
            Err(PipelineError::OutputSetup { path, .. }) => {
                assert_eq!(path, dir.path().join("alignments"))
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.completed_jobs())),
        }
        assert!(aligner.requests.lock().unwrap().is_empty());
        assert!(!dir.path().join("telemetry.csv").exists());
        assert!(!buffer.contents().contains("-> RunningAlignmentPhase"));
    }

    #[test]
    fn test_missing_input_fails_before_any_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.input = PathBuf::from("tests/data/input/missing.fasta");
        let aligner = StubAligner::default();

        let result = build_pipeline(
            config,
            &aligner,
            &StubTrees::default(),
            None,
            StubReader::new(),
            &SharedBuffer::default(),
        )
        .run();
        assert!(matches!(result, Err(PipelineError::InputNotFound(_))));
        assert!(aligner.requests.lock().unwrap().is_empty());
        assert!(!dir.path().join("telemetry.csv").exists());
    }

    #[test]
    fn test_telemetry_disabled_skips_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.algorithms = names(&["muscle"]);
        config.telemetry.enabled = false;

        let report = build_pipeline(
            config,
            &StubAligner::default(),
            &StubTrees::default(),
            None,
            StubReader::new(),
            &SharedBuffer::default(),
        )
        .run()
        .unwrap();
        assert!(report.telemetry_file().is_none());
        assert!(!dir.path().join("telemetry.csv").exists());
        assert!(dir.path().join("run_report.json").exists());
    }
}
