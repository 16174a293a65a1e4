use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;

use crate::cli::BANNER;
use crate::config::PipelineConfig;
use crate::helper::aligners::Aligner;
use crate::helper::json::write_json_pretty;
use crate::helper::trees::{TreeFormat, TreeMethod};

pub fn exec() -> Result<(), Box<dyn Error>> {
    println!("{}", BANNER);

    println!("{}", "-".repeat(52));
    println!(
        "| JSON Config Generator for phylo-bench {:<10} |",
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", "-".repeat(52));

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let config = collect_config(&mut input)?;

    println!("Your entered config: ");
    println!("{}", config);

    print!("\nDo you wish to save the config to a JSON file? (y/n):\n>  ");
    let save = matches!(collect_input(&mut input)?.as_str(), "y" | "Y");

    if save {
        loop {
            print!("Enter the path to save the JSON file (e.g. /path/to/pipeline.json):\n>  ");
            let json_path = PathBuf::from(collect_input(&mut input)?);
            match write_json_pretty(&config, &json_path) {
                Ok(()) => {
                    println!("Config saved to JSON file at {}.", json_path.display());
                    break;
                }
                Err(e) => {
                    eprintln!("Error writing to file: {}, retry", e);
                    continue;
                }
            }
        }
    } else {
        println!("Config not saved. Goodbye!");
    }
    Ok(())
}

/// Walk through every config field; empty answers keep the defaults.
pub fn collect_config<R: BufRead>(input: &mut R) -> io::Result<PipelineConfig> {
    let fasta = loop {
        print!("Enter the path to the FASTA file with unaligned sequences (e.g. files/input/ls_orchid.fasta):\n>  ");
        let path = collect_input(input)?;
        if path.is_empty() {
            eprintln!("Input path cannot be empty. Please enter a valid path.");
            continue;
        }
        let path = PathBuf::from(path);
        if !path.is_file() {
            eprintln!("Note: {} does not exist yet.", path.display());
        }
        break path;
    };
    let mut config = PipelineConfig::new(fasta);

    print!(
        "Enter the output directory, default as {}:\n>  ",
        config.output_root.display()
    );
    let output_root = collect_input(input)?;
    if !output_root.is_empty() {
        config.output_root = PathBuf::from(output_root);
    }

    let aligner_menu = Aligner::ALL
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}: {}", i + 1, a))
        .collect::<Vec<_>>()
        .join("\n");
    config.algorithms = loop {
        print!(
            "Choose alignment programs, comma separated names or numbers (default all):\n{}\n>  ",
            aligner_menu
        );
        match parse_choices::<Aligner>(&collect_input(input)?, &Aligner::ALL) {
            Ok(choices) if choices.is_empty() => break config.algorithms.clone(),
            Ok(choices) => break choices.iter().map(|a| a.name().to_string()).collect(),
            Err(e) => eprintln!("{}", e),
        }
    };

    let methods = [TreeMethod::NeighborJoining, TreeMethod::Upgma, TreeMethod::Raxml];
    config.tree_methods = loop {
        print!("Choose tree methods (1: nj, 2: upgma, 3: raxml), default as nj,upgma:\n>  ");
        match parse_choices::<TreeMethod>(&collect_input(input)?, &methods) {
            Ok(choices) if choices.is_empty() => break config.tree_methods.clone(),
            Ok(choices) => break choices.iter().map(|m| m.name().to_string()).collect(),
            Err(e) => eprintln!("{}", e),
        }
    };

    let formats = [TreeFormat::Newick, TreeFormat::Nexus];
    config.tree_formats = loop {
        print!("Choose tree formats (1: newick, 2: nexus), default as newick:\n>  ");
        match parse_choices::<TreeFormat>(&collect_input(input)?, &formats) {
            Ok(choices) if choices.is_empty() => break config.tree_formats.clone(),
            Ok(choices) => break choices.iter().map(|f| f.name().to_string()).collect(),
            Err(e) => eprintln!("{}", e),
        }
    };

    print!("Enable resource telemetry? (y/n, default as y):\n>  ");
    config.telemetry.enabled = !matches!(collect_input(input)?.as_str(), "n" | "N");

    if config.telemetry.enabled {
        print!("Enter the sampling interval in seconds, default as 5:\n>  ");
        config.telemetry.interval_secs = match collect_input(input)?.parse::<f64>() {
            Ok(secs) if secs > 0.0 => secs,
            _ => config.telemetry.interval_secs,
        };

        print!("Enter the filesystem root for disk usage, default as /:\n>  ");
        let disk_root = collect_input(input)?;
        if !disk_root.is_empty() {
            config.telemetry.disk_root = PathBuf::from(disk_root);
        }
    }

    print!("Enter a tree viewer program to open each tree (optional, e.g. figtree):\n>  ");
    let viewer = collect_input(input)?;
    config.viewer = if viewer.is_empty() { None } else { Some(viewer) };

    print!("Keep going when a job fails? (y/n, default as n):\n>  ");
    config.continue_on_job_failure = matches!(collect_input(input)?.as_str(), "y" | "Y");

    Ok(config)
}

/// Comma separated names or 1-based menu numbers. Empty input gives an empty list.
fn parse_choices<T: FromStr<Err = String> + Copy>(
    answer: &str,
    menu: &[T],
) -> Result<Vec<T>, String> {
    let mut choices = Vec::new();
    for token in answer.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let choice = match token.parse::<usize>() {
            Ok(n) if (1..=menu.len()).contains(&n) => menu[n - 1],
            Ok(n) => return Err(format!("Invalid input. Please enter a number from 1 to {}, got {}.", menu.len(), n)),
            Err(_) => token.parse::<T>()?,
        };
        choices.push(choice);
    }
    Ok(choices)
}

fn collect_input<R: BufRead>(input: &mut R) -> io::Result<String> {
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before the config was complete",
        ));
    }
    Ok(line.trim().to_string())
}
