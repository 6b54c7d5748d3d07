//! backups.rs: list the snapshots taken of a table file, or put one back.
//!
//! - `backups list <FILE>` prints one line per backup, oldest first.
//! - `backups restore <FILE> <STAMP>` swaps the backup from `<STAMP>` (as
//!   printed by `list`) back into place. The current content is backed up first.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rowkeeper::lines::RawLines;
use rowkeeper::update::{backup::stamp, find_backup};
use rowkeeper::{list_backups, Config, Updater};
use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    process::exit,
};
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "List or restore timestamped table backups")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// One line per backup of FILE, oldest first
    List { file: PathBuf },
    /// Put the backup taken at STAMP (e.g. 2024-05-01T12-34-56) back in place
    Restore { file: PathBuf, stamp: String },
}

fn main() {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    let config = Config::from_env().context("loading config")?;
    match command {
        Command::List { file } => {
            let backups = list_backups(&file, &config)
                .with_context(|| format!("listing backups of {}", file.display()))?;
            if backups.is_empty() {
                println!("no backups of {}", file.display());
            }
            for b in backups {
                let lines = match count_lines(&b.path) {
                    Ok(n) => n.to_string(),
                    Err(e) => {
                        warn!(path = %b.path.display(), "cannot count lines: {}", e);
                        format!("? ({})", e)
                    }
                };
                println!("{}  {:>6} lines  {}", stamp(b.taken_at), lines, b.path.display());
            }
        }
        Command::Restore { file, stamp } => {
            let backup = find_backup(&file, &config, &stamp)?
                .ok_or_else(|| anyhow!("no backup of {} at {}", file.display(), stamp))?;
            let out = Updater::new(config).restore(&file, &backup)?;
            println!(
                "restored {} from {} (previous content saved to {})",
                file.display(),
                backup.path.display(),
                out.backup.display()
            );
        }
    }
    Ok(())
}

/// Line count with the same terminator rules the loader uses.
fn count_lines(path: &Path) -> io::Result<usize> {
    let file = File::open(path)?;
    let mut count = 0;
    for line in RawLines::new(BufReader::new(file)) {
        line?;
        count += 1;
    }
    Ok(count)
}
