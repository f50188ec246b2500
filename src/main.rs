//! bandrun – command-line report paginator.
//!
//! Usage:
//!   bandrun <report.json> <data.json> [output.json] [--double-pass] [--offload]
//!
//! If `output.json` is omitted the prepared pages are written next to the
//! report file with a `.prepared.json` extension.

use std::{env, fs, path::PathBuf, process};

use band_forge::pipeline::{prepare_from_json, PipelineConfig};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut report_path: Option<PathBuf> = None;
    let mut data_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut config = PipelineConfig::default();
    let mut positional = 0usize;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--double-pass" | "-d" => config.double_pass = Some(true),
            "--single-pass" | "-s" => config.double_pass = Some(false),
            "--offload" | "-o" => config.offload_pages = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                match positional {
                    0 => report_path = Some(PathBuf::from(path)),
                    1 => data_path = Some(PathBuf::from(path)),
                    2 => output_path = Some(PathBuf::from(path)),
                    _ => {
                        eprintln!("Unexpected argument: {path}");
                        print_usage(&args[0]);
                        process::exit(1);
                    }
                }
                positional += 1;
            }
        }
    }

    let (report_file, data_file) = match (report_path, data_path) {
        (Some(r), Some(d)) => (r, d),
        _ => {
            eprintln!("Error: a report and a data file are required.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    let output = output_path.unwrap_or_else(|| {
        let mut o = report_file.clone();
        o.set_extension("prepared.json");
        o
    });

    let report = read_or_exit(&report_file);
    let data = read_or_exit(&data_file);

    let prepared = match prepare_from_json(&report, &data, &config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error preparing report: {e}");
            process::exit(1);
        }
    };

    let json = match prepared.to_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error serializing prepared pages: {e}");
            process::exit(1);
        }
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating output directory: {e}");
                process::exit(1);
            }
        }
    }
    if let Err(e) = fs::write(&output, json.as_bytes()) {
        eprintln!("Error writing '{}': {e}", output.display());
        process::exit(1);
    }

    let pages = prepared.page_count();
    eprintln!(
        "Wrote '{}' ({} page{}, {} relocated keep block{})",
        output.display(),
        pages,
        if pages == 1 { "" } else { "s" },
        prepared.keep_stats.relocations,
        if prepared.keep_stats.relocations == 1 { "" } else { "s" }
    );
}

fn read_or_exit(path: &PathBuf) -> String {
    match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", path.display());
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("bandrun – banded report paginator (band-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <report.json> <data.json> [output.json] [--double-pass] [--offload]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <report.json>  Report definition (report pages and band tree)");
    eprintln!("  <data.json>    Data sources: {{\"name\": [{{...}}, ...]}}");
    eprintln!("  [output.json]  Output path  (default: <report>.prepared.json)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --double-pass  Run a measuring pass first so [TotalPages] is known");
    eprintln!("  --single-pass  Ignore the definition's double_pass flag");
    eprintln!("  --offload      Serialize finished pages while running");
    eprintln!("  --help         Print this message");
}
