//! flatdb CLI
//!
//! Command-line interface for a local flatdb file.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use flatdb::{Config, Database, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// flatdb CLI
#[derive(Parser, Debug)]
#[command(name = "flatdb-cli")]
#[command(about = "CLI for the flatdb embedded record store")]
#[command(version)]
struct Args {
    /// Database file (created if missing)
    #[arg(short, long, default_value = "./flatdb.db")]
    path: String,

    /// B+Tree order for a new file
    #[arg(short, long, default_value = "4")]
    order: usize,

    /// fsync after every write instead of only on close
    #[arg(long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Insert a new record
    Insert {
        /// Record id
        id: String,

        /// Record data
        data: String,
    },

    /// Get a record by id
    Get {
        /// Record id
        id: String,
    },

    /// Replace the data of an existing record
    Update {
        /// Record id
        id: String,

        /// New data
        data: String,
    },

    /// Delete a record
    Delete {
        /// Record id
        id: String,
    },

    /// List all records in id order
    Scan,

    /// Verify index invariants and print tree shape
    Check,

    /// Print one raw page section
    Page {
        /// Page id
        id: u32,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,flatdb=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .path(&args.path)
        .order(args.order)
        .sync_strategy(if args.sync {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::OnClose
        })
        .build();

    let db = match Database::open(config) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = run(&db, args.command);
    let closed = db.close();

    match outcome.and(closed) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(db: &Database, command: Commands) -> flatdb::Result<()> {
    match command {
        Commands::Insert { id, data } => {
            db.insert(&id, &data)?;
            println!("OK");
        }
        Commands::Get { id } => match db.get(&id)? {
            Some(record) => println!("{}", record.fields.join("\t")),
            None => println!("(not found)"),
        },
        Commands::Update { id, data } => {
            db.update(&id, &data)?;
            println!("OK");
        }
        Commands::Delete { id } => {
            db.delete(&id)?;
            println!("OK");
        }
        Commands::Scan => {
            for record in db.scan()? {
                println!("{}", record.fields.join("\t"));
            }
        }
        Commands::Check => {
            let stats = db.check()?;
            println!(
                "ok: height={} leaves={} internal={} keys={} root={}",
                stats.height,
                stats.leaves,
                stats.internal_nodes,
                stats.keys,
                db.root()
            );
        }
        Commands::Page { id } => {
            print!("{}", db.page(id)?.encode()?);
        }
    }
    Ok(())
}
