//! Command-line inspector for a quad store directory.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use quadstore::store::txn_status::TxnStatusFile;
use quadstore::store::value_store::{ValueEntry, ValueStore};
use quadstore::{QuadStore, Result, StoreConfig};

#[derive(Parser)]
#[command(name = "quadstore-inspect", about = "Inspect a quad store directory")]
struct Args {
    /// Store directory to inspect.
    dir: PathBuf,

    /// Decode damaged value records as corrupt sentinels instead of failing.
    #[arg(long)]
    soft_fail: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dump every interned value and namespace with its id.
    Values,
    /// List namespace prefix bindings.
    Namespaces,
    /// List named graphs and their statement counts.
    Contexts,
    /// Show the persisted transaction status.
    Status,
    /// Show store size figures.
    Stats,
    /// Verify that every interned value maps back to a single id.
    CheckConsistency,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = if args.soft_fail {
        StoreConfig::salvage()
    } else {
        StoreConfig::default()
    };

    match args.command {
        Command::Values => {
            let store = ValueStore::open(&args.dir, &config)?;
            for id in 1..=store.max_id() {
                match store.entry(id)? {
                    Some(ValueEntry::Term(term)) => println!("[{id}] {term}"),
                    Some(ValueEntry::Namespace(ns)) => println!("[{id}] namespace {ns}"),
                    None => println!("[{id}] <missing>"),
                }
            }
        }
        Command::Namespaces => {
            let store = QuadStore::open(&args.dir, config)?;
            for (prefix, name) in store.namespaces() {
                println!("{prefix}: {name}");
            }
        }
        Command::Contexts => {
            let store = QuadStore::open(&args.dir, config)?;
            for (context, count) in store.contexts() {
                println!("{context} {count}");
            }
        }
        Command::Status => {
            let mut status = TxnStatusFile::open(&args.dir)?;
            println!("{:?}", status.status()?);
        }
        Command::Stats => {
            let store = QuadStore::open(&args.dir, config)?;
            let stats = store.stats();
            println!("quads: {}", stats.quads);
            println!("values: {}", stats.values);
            println!("contexts: {}", stats.contexts);
        }
        Command::CheckConsistency => {
            let store = QuadStore::open(&args.dir, config)?;
            store.check_consistency()?;
            println!("ok");
        }
    }
    Ok(())
}
