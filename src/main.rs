use clap::{Parser, Subcommand};
use erbuild::config::Config;
use erbuild::query::QueryScope;
use erbuild::{compile_query_json, compile_table_json};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "erbuild")]
#[command(about = "Compile tenant schemas to PostgreSQL DDL and report filters to SQL predicates")]
#[command(version)]
struct Cli {
    /// Reject input that would otherwise be dropped or defaulted
    #[arg(long, global = true)]
    strict: bool,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the storage definition for a schema definition JSON file
    Schema {
        definition: PathBuf,
        /// Schema name; the table name is derived from it
        #[arg(long)]
        name: String,
    },
    /// Print the predicate for a rule tree JSON file
    Query {
        query: PathBuf,
        /// Print a tenant-scoped SELECT over this table instead
        #[arg(long)]
        table: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).unwrap_or_else(|e| fail(&e.to_string())),
        None => Config::default(),
    };
    config.compiler.strict |= cli.strict;

    let output = match &cli.command {
        Command::Schema { definition, name } => {
            let input = read(definition);
            match compile_table_json(name, &input, config.compiler.clone()) {
                Ok(storage) => storage.to_sql(),
                Err(e) => fail(&format!("{} ({})", e, e.code())),
            }
        }
        Command::Query { query, table } => {
            let input = read(query);
            match compile_query_json(&input, config.compiler.clone()) {
                Ok(compiled) => match table {
                    Some(table) => {
                        let scope = QueryScope {
                            table: table.clone(),
                            tenant_column: config.storage.tenant_column.clone(),
                            ..QueryScope::default()
                        };
                        format!("{}\n", compiled.select_sql(&scope))
                    }
                    None => format!("{}\n", compiled.to_sql()),
                },
                Err(e) => fail(&format!("{} ({})", e, e.code())),
            }
        }
    };

    match cli.output {
        Some(path) => {
            if let Err(e) = fs::write(&path, &output) {
                fail(&format!("Failed to write {}: {}", path.display(), e));
            }
        }
        None => print!("{}", output),
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| fail(&format!("Failed to read {}: {}", path.display(), e)))
}

fn fail(message: &str) -> ! {
    eprintln!("{message}");
    process::exit(1);
}
