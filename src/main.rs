use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use bmp_flatten::{write_flattened, Flattener};

/// Prints the RGB pixel data of a BMP image as a flat list of integers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The bitmap file to flatten
    path: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    // Decode everything before touching stdout, a failure must not leave partial output
    let values = Flattener::new()
        .flatten(&args.path)
        .with_context(|| format!("failed to decode {}", args.path.display()))?;
    log::info!("{}: {} values", args.path.display(), values.len());

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    write_flattened(&mut out, &values)?;
    out.flush()?;
    Ok(())
}
