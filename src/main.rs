use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rowkeeper::{load_with, serialize_row, Config, HeaderMode, Table, Updater};
use std::{path::PathBuf, process::exit};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Inspect and edit comma-delimited tables with grouped headers"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Print the group row, the column row and every non-blank row
    Show { file: PathBuf },
    /// Dump the loaded table as JSON
    Json { file: PathBuf },
    /// Replace body row ROW (0 is the first row under the header)
    Set {
        file: PathBuf,
        row: usize,
        cells: Vec<String>,
    },
    /// Add a row after the last line
    Append { file: PathBuf, cells: Vec<String> },
}

impl Command {
    fn file(&self) -> &PathBuf {
        match self {
            Command::Show { file }
            | Command::Json { file }
            | Command::Set { file, .. }
            | Command::Append { file, .. } => file,
        }
    }
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
    let mode = if config.strict_headers {
        HeaderMode::Strict
    } else {
        HeaderMode::Lenient
    };
    let path = command.file().as_path();
    let table = load_with(path, mode).with_context(|| format!("loading {}", path.display()))?;

    match &command {
        Command::Show { .. } => print_table(&table),
        Command::Json { .. } => println!("{}", serde_json::to_string_pretty(&table)?),
        Command::Set { row, cells, .. } => {
            let row = *row;
            if row >= table.rows.len() {
                bail!("row {} out of range ({} rows)", row, table.rows.len());
            }
            let text = serialize_row(cells.as_slice());
            let out = Updater::new(config).update(path, table.line_index(row), &text)?;
            info!(backup = %out.backup.display(), "row {} saved", row);
        }
        Command::Append { cells, .. } => {
            if table.header.is_empty() {
                bail!("{} has no header line", path.display());
            }
            let text = serialize_row(cells.as_slice());
            let out = Updater::new(config).update(path, table.append_index(), &text)?;
            info!(backup = %out.backup.display(), "row {} added", table.rows.len());
        }
    }
    Ok(())
}

/// Group row, column row, then every non-blank row padded to the header width.
fn print_table(table: &Table) {
    let groups: Vec<String> = table
        .header
        .groups
        .iter()
        .map(|g| format!("{} ({})", g.name, g.count))
        .collect();
    println!("groups:  {}", groups.join(" | "));
    println!("columns: {}", table.header.columns.join(" | "));
    for (i, _) in table.visible_rows() {
        if let Some(cells) = table.padded_row(i) {
            println!("{:>5}  {}", i, cells.join(" | "));
        }
    }
}
