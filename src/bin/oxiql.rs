//! Optional batch entry point: runs a `.sql` file (or stdin) against a
//! database directory one statement at a time, printing each result and
//! exiting with the error kind's exit code on the first failure.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use oxiql::{Connection, DbConfig};

#[derive(Parser)]
#[command(name = "oxiql", about = "Run SQL statements against an oxiql database")]
struct Args {
    /// Directory the database's catalog, heap files, and WAL live in.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// SQL file to run; reads from stdin if omitted.
    #[arg(long)]
    file: Option<PathBuf>,
}

/// Splits on top-level `;` while respecting single-quoted string literals,
/// since the parser accepts an unterminated final statement but a batch
/// file is expected to separate statements this way.
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for ch in sql.chars() {
        match ch {
            '\'' => in_string = !in_string,
            ';' if !in_string => {
                statements.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn run(args: Args) -> Result<(), oxiql::DbError> {
    let mut sql = String::new();
    match &args.file {
        Some(path) => {
            sql = std::fs::read_to_string(path)?;
        }
        None => {
            std::io::stdin().read_to_string(&mut sql)?;
        }
    }

    let mut config = DbConfig::default();
    config.data_dir = args.data_dir;
    let mut conn = Connection::open_with_config(config)?;

    for statement in split_statements(&sql) {
        let result = conn.execute(&statement)?;
        if result.row_count() > 0 {
            println!("{}", result.columns.join(" | "));
            for row in &result.rows {
                let rendered: Vec<String> = row.iter().map(|(_, v)| v.to_string()).collect();
                println!("{}", rendered.join(" | "));
            }
        } else {
            println!("OK ({} row(s) affected)", result.affected);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
