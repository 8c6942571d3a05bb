//! Reverse every row of a matrix using a group of cooperating processes.
//!
//! ```sh
//! rowscatter matrix.txt 1000 500 --procs 8
//! rowscatter matrix.txt 4 3 -n 2 --output reversed.txt
//! ```
//!
//! Rank 0 reads the matrix and prints the timing summary; the other ranks are
//! copies of this same binary launched by rank 0.

use anyhow::Context;
use clap::Parser;
use log::debug;
use rowscatter::{
    Coordinator, GroupConfig, GroupError, ReverseRow, RunOptions, RunReport, TextFileSource,
    Worker, World, MAX_GROUP_SIZE,
};
use std::fs::File;
use std::io::BufWriter;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "rowscatter")]
#[command(about = "Reverse matrix rows across a shared-memory process group")]
#[command(version)]
struct Cli {
    /// Text file of whitespace-separated integers, row-major.
    matrix: PathBuf,
    /// Number of rows in the matrix.
    rows: NonZeroUsize,
    /// Number of columns in the matrix.
    cols: NonZeroUsize,
    /// Number of processes in the group, including the coordinator.
    #[arg(short = 'n', long, default_value_t = 4,
          value_parser = clap::value_parser!(i32).range(1..=MAX_GROUP_SIZE as i64))]
    procs: i32,
    /// Write the transformed matrix here.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Transform the rows of each slice on several threads.
    #[arg(long)]
    parallel_rows: bool,
    /// Mailbox slot size in KiB; larger transfers are split into frames.
    #[arg(long, default_value_t = 1024)]
    slot_kib: usize,
}

fn run_role(world: &World, cli: &Cli) -> rowscatter::Result<Option<RunReport>> {
    let options = RunOptions {
        parallel_rows: cli.parallel_rows,
    };
    if world.is_coordinator() {
        let source = TextFileSource::new(&cli.matrix);
        let report = Coordinator::load_matrix(
            world,
            &source,
            cli.rows.get(),
            cli.cols.get(),
            ReverseRow,
        )?
        .with_options(options)
        .run()?;
        Ok(Some(report))
    } else {
        Worker::new(world, ReverseRow)?.with_options(options).run()?;
        Ok(None)
    }
}

fn main() -> anyhow::Result<ExitCode> {
    // Per-member progress lines are info level; show them unless RUST_LOG says otherwise.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let slot_capacity = cli
        .slot_kib
        .checked_mul(1024)
        .context("slot size overflows")?;
    let config = GroupConfig::new(cli.procs).with_slot_capacity(slot_capacity);
    // Reject bad settings before any process is launched.
    config.validate()?;

    let world = World::init(&config).context("launching process group")?;
    let rank = world.rank();

    let outcome = run_role(&world, &cli);
    if let Err(e) = &outcome {
        world.abort(e);
    }
    world.destruct();

    // A worker released by someone else's abort exits quietly; the aborting
    // member and the coordinator report.
    if let Err(e) = &outcome {
        if let GroupError::Aborted { by_rank } = e.root_cause() {
            if rank != 0 {
                debug!("Rank {} stopped after rank {} aborted", rank, by_rank);
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    let report = outcome.with_context(|| format!("rank {} failed", rank))?;
    if let Some(report) = report {
        println!("{}", report.timing);
        if let Some(path) = &cli.output {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            report
                .matrix
                .write_text(BufWriter::new(file))
                .with_context(|| format!("writing {}", path.display()))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
