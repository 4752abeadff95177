//! appraisal: run workflow functions against a local ledger
//!
//! ```text
//! appraisal invoke create_appraisal req1 app1 c1 p1
//! appraisal query get_appraisal al1...
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use appraisal_ledger::config::Config;
use appraisal_ledger::dispatch::{Dispatcher, INVOKE_FUNCTIONS, QUERY_FUNCTIONS};
use appraisal_ledger::identity::CertificateDirectory;

#[derive(Parser)]
#[command(name = "appraisal")]
#[command(about = "Multi-party real-estate appraisal workflow")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "appraisal.toml")]
    config: PathBuf,

    /// Ledger directory (overrides config file)
    #[arg(short, long, env = "APPRAISAL_LEDGER")]
    ledger: Option<PathBuf>,

    /// Certificate directory (overrides config file)
    #[arg(long, env = "APPRAISAL_CERTIFICATES")]
    certificates: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a function that writes to the ledger
    Invoke { function: String, args: Vec<String> },
    /// Run a read-only function
    Query { function: String, args: Vec<String> },
    /// List the available functions and their arguments
    Functions,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("reading {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(ledger) = cli.ledger {
        config.ledger.path = ledger;
    }
    if let Some(certificates) = cli.certificates {
        config.identity.certificates_dir = certificates;
    }

    let (function, args, write) = match cli.command {
        Command::Functions => {
            for (name, args) in INVOKE_FUNCTIONS {
                println!("invoke {name} {args}");
            }
            for (name, args) in QUERY_FUNCTIONS {
                println!("query  {name} {args}");
            }
            return Ok(());
        }
        Command::Invoke { function, args } => (function, args, true),
        Command::Query { function, args } => (function, args, false),
    };

    let db = sled::open(&config.ledger.path)
        .with_context(|| format!("opening ledger {}", config.ledger.path.display()))?;
    let oracle = if config.identity.certificates_dir.is_dir() {
        CertificateDirectory::from_dir(&config.identity.certificates_dir)?
    } else {
        info!(
            dir = %config.identity.certificates_dir.display(),
            "certificate directory not found, no party has a role"
        );
        CertificateDirectory::new()
    };

    let dispatcher = Dispatcher::new(Arc::new(db), oracle);
    let response = if write {
        dispatcher.invoke(&function, &args)
    } else {
        dispatcher.query(&function, &args)
    }
    .with_context(|| format!("{function} failed"))?;

    println!("{response:#?}");
    Ok(())
}
