//! Particle file CLI application.
//!
//! Inspects binary particle files and exports selected quantities to CSV.

use anyhow::{Context, Result};
use bark_core::output::{self, parse_quantity_list};
use bark_core::{FileHeader, ReadOptions, Reader};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Block-based reader for binary particle event files.
///
/// Reads the header and event blocks of a particle file and extracts only the
/// requested per-particle quantities.
#[derive(Parser, Debug)]
#[command(name = "bark")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log output (-v: debug, -vv: trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the file header and the particle record layout
    Info {
        /// Input particle file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Also scan the file and count events and particles
        #[arg(short, long)]
        count: bool,
    },

    /// Decode selected quantities to CSV
    Decode {
        /// Input particle file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output CSV file path
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Quantities to extract, comma-separated.
        ///
        /// Columns are written in this order, after a leading event index.
        ///
        /// Examples:
        /// - "pdg,p0,pz"
        /// - "t,x,y,z"
        #[arg(short, long, default_value = "pdg,p0,px,py,pz")]
        quantities: String,

        /// Read buffer size in bytes
        #[arg(long, default_value_t = ReadOptions::default().buffer_bytes)]
        buffer_size: usize,

        /// Suppress progress output
        #[arg(long)]
        quiet: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Info { input, count } => info(&input, count),
        Command::Decode {
            input,
            output,
            quantities,
            buffer_size,
            quiet,
        } => decode(&input, &output, &quantities, buffer_size, quiet),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn print_header(header: &FileHeader) {
    println!("Format Version: {}", header.version);
    println!("Format Variant: {}", header.variant);
    println!("Generator:      {}", header.generator);
    println!(
        "Record:         {} quantities, {} bytes",
        header.schema.len(),
        header.schema.record_size()
    );
    println!();
    println!("  {:>3}  {:<20} {:>6}  {:>6}", "#", "quantity", "type", "offset");
    for quantity in header.schema.quantities() {
        println!(
            "  {:>3}  {:<20} {:>6}  {:>6}",
            quantity.ordinal, quantity.name, quantity.encoding.to_string(), quantity.offset
        );
    }
}

fn info(input: &Path, count: bool) -> Result<()> {
    let mut reader = Reader::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let header = reader.header().context("Failed to read file header")?;
    print_header(header);

    if count {
        let mut sink = Counter::default();
        let summary = reader
            .read::<&str, _>(&[], &mut sink)
            .context("Failed to scan particle file")?;
        println!();
        println!("Events:         {}", summary.events);
        println!("Particles:      {}", summary.particles);
        if summary.events > 0 {
            println!(
                "Mean per event: {:.2}",
                summary.particles as f64 / summary.events as f64
            );
            println!("Largest event:  {}", sink.largest);
        }
    }

    Ok(())
}

/// Collector that only looks at event sizes.
#[derive(Default)]
struct Counter {
    largest: u64,
}

impl bark_core::Collector for Counter {
    fn receive_int(&mut self, _name: &str, _value: i64) {}

    fn receive_double(&mut self, _name: &str, _value: f64) {}

    fn end_event(&mut self, particles: u64) {
        self.largest = self.largest.max(particles);
    }
}

fn decode(
    input: &Path,
    output_path: &Path,
    quantities: &str,
    buffer_size: usize,
    quiet: bool,
) -> Result<()> {
    let quantities =
        parse_quantity_list(quantities).context("Invalid quantity list. Use comma-separated names")?;
    log::debug!("Requested quantities: {:?}", quantities);

    let reader = Reader::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .with_options(ReadOptions {
            buffer_bytes: buffer_size,
        });
    let mut csv = output::csv_file(output_path, &quantities)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    // Setup progress bar
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid progress template")?,
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    };

    let start_time = Instant::now();

    progress.set_message(format!(
        "Decoding {:?}...",
        input.file_name().unwrap_or_default()
    ));

    let scan = reader.read(&quantities, &mut csv);
    let rows = csv.rows_written();
    let written = csv.finish_writing().context("Failed to write CSV output");
    let summary = match written.and(scan.context("Failed to decode particle file")) {
        Ok(summary) => summary,
        Err(err) => {
            progress.abandon_with_message(format!("Failed after {} rows", rows));
            return Err(err);
        }
    };

    let duration = start_time.elapsed();

    progress.finish_with_message(format!(
        "Done! Decoded {} particles in {} events in {:.2}s",
        summary.particles,
        summary.events,
        duration.as_secs_f64()
    ));

    if !quiet {
        let particles_per_sec = summary.particles as f64 / duration.as_secs_f64();
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", input);
        eprintln!("  Output:       {:?}", output_path);
        eprintln!("  Quantities:   {}", quantities.join(","));
        eprintln!("  Events:       {}", summary.events);
        eprintln!("  Particles:    {}", summary.particles);
        eprintln!("  Rows:         {}", rows);
        eprintln!("  Duration:     {:.3}s", duration.as_secs_f64());
        eprintln!("  Throughput:   {:.0} particles/s", particles_per_sec);
    }

    Ok(())
}
