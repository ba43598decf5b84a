use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use tensor_memstat::source::{collect_input_files, load_inputs};
use tensor_memstat::{Device, ReportOptions, make_report};

#[derive(Parser)]
#[command(name = "tensor-memstat")]
#[command(about = "Per-device tensor memory usage report from stats snapshots and SafeTensors files")]
struct Args {
    #[arg(
        help = "Stats snapshots (.json), SafeTensors files, directories, or glob patterns (e.g., runs/*.json)"
    )]
    paths: Vec<PathBuf>,

    #[arg(short, long, help = "Show full tensor names, including (...) suffixes")]
    verbose: bool,

    #[arg(short, long, help = "Only report tensors on this device (cpu, cuda, cuda:N)")]
    device: Option<Device>,

    #[arg(short, long, help = "Recursively search directories for input files")]
    recursive: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.paths.is_empty() {
        eprintln!("Error: Please specify one or more stats snapshots or SafeTensors files.");
        eprintln!("Usage: tensor-memstat <stats.json> [model.safetensors] [directory] [*.json] ...");
        std::process::exit(1);
    }

    let files = collect_input_files(&args.paths, args.recursive)?;

    if files.is_empty() {
        eprintln!("Error: No stats snapshots or SafeTensors files found in the specified paths.");
        std::process::exit(1);
    }

    let inputs = load_inputs(&files)?;
    let options = ReportOptions {
        verbose: args.verbose,
        target_device: args.device,
    };

    let report = make_report(&inputs.table, &options, &inputs.allocator)?;
    println!("{report}");
    Ok(())
}
