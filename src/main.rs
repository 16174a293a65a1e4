use std::process;

use clap::Parser;
use phylo_bench::cli::{Args, Commands};
use phylo_bench::pipelines::{check, driver, log, params_generator};

fn main() {
    let args = Args::parse();

    let result = match args.command {
        Commands::Run(run) => {
            println!("Running phylo-bench pipeline");
            match run.into_config() {
                Ok(config) => driver::run_pipeline(config),
                Err(e) => Err(e.into()),
            }
        }
        Commands::Generate {} => params_generator::exec(),
        Commands::Check { config } => check::run_check(config.as_deref()),
        Commands::Log { input, output } => {
            println!("Summarising telemetry from {}", input.display());
            log::run_log(&input, output.as_deref()).map(|_| ())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
