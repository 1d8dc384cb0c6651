use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use procsim::{dry_run, parse_file, sandbox_run, ParamBindings, ParamValue};

#[derive(Parser)]
#[command(name = "procsim")]
#[command(author, version, about = "Control-flow analysis and simulated execution for T-SQL stored procedures")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a procedure file and print its control flow graph as JSON
    Parse {
        /// Path to the .sql file
        file: PathBuf,

        /// Pretty-print the JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Simulate execution without a database, predicting branches
    Dryrun {
        /// Path to the .sql file
        file: PathBuf,

        /// Parameter binding, e.g. --param @Id=5 (repeatable)
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
    },

    /// Execute against an in-memory SQLite sandbox with inferred schema
    Sandbox {
        /// Path to the .sql file
        file: PathBuf,

        /// Parameter binding, e.g. --param @Active=1 (repeatable)
        #[arg(short, long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
    },
}

fn parse_bindings(raw: &[String]) -> Result<ParamBindings> {
    let mut bindings = ParamBindings::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once('=') else {
            bail!("invalid parameter binding '{}', expected NAME=VALUE", entry);
        };
        bindings.set(name, ParamValue::parse_loose(value));
    }
    Ok(bindings)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "procsim=debug" } else { "procsim=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Parse { file, pretty } => {
            let parsed = parse_file(&file)?;
            let json = if pretty {
                serde_json::to_string_pretty(&parsed)?
            } else {
                serde_json::to_string(&parsed)?
            };
            println!("{}", json);
        }

        Commands::Dryrun { file, params } => {
            let parsed = parse_file(&file)?;
            let bindings = parse_bindings(&params)?;
            let result = dry_run(&parsed.cfg, &bindings);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Sandbox { file, params } => {
            let parsed = parse_file(&file)?;
            let bindings = parse_bindings(&params)?;
            let content = std::fs::read_to_string(&file)?;
            let result = sandbox_run(&parsed.cfg, &content, &bindings);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
