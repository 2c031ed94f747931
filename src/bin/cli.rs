//! Kinetic CLI Client
//!
//! Command-line interface for talking to a Kinetic device.

use std::fs;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use kinetic_client::transfer::{key_prefix, Transfer};
use kinetic_client::{Algorithm, Entry, ExecutionMode, KeyRange, Result, Session, SessionConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// Kinetic CLI
#[derive(Parser, Debug)]
#[command(name = "kinetic-cli")]
#[command(about = "CLI for Kinetic key-value drives")]
#[command(version)]
struct Args {
    /// Device host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Device port
    #[arg(short, long, default_value_t = kinetic_client::config::DEFAULT_PORT)]
    port: u16,

    /// Cluster version expected by the device
    #[arg(long, default_value_t = 0)]
    cluster_version: i64,

    /// User identity
    #[arg(short, long, default_value_t = 1)]
    identity: i64,

    /// HMAC key for the identity
    #[arg(short, long, env = "KINETIC_HMAC_KEY", hide_env_values = true)]
    key: String,

    /// Drive completions from this thread instead of a worker
    #[arg(long)]
    caller_driven: bool,

    /// Wait for the device's handshake frame after connecting
    #[arg(long)]
    handshake: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Round-trip a no-op
    Noop,

    /// Store a value
    Put {
        key: String,
        value: String,

        /// Version to assign
        #[arg(long)]
        version: Option<String>,

        /// Version expected on the device
        #[arg(long)]
        db_version: Option<String>,

        /// Skip version checks
        #[arg(long)]
        force: bool,
    },

    /// Fetch a value
    Get {
        key: String,

        /// Only fetch metadata
        #[arg(long)]
        metadata_only: bool,
    },

    /// Delete a key
    Del {
        key: String,

        /// Version expected on the device
        #[arg(long)]
        db_version: Option<String>,

        /// Skip version checks
        #[arg(long)]
        force: bool,
    },

    /// List keys in [start, end]
    Range {
        start: String,
        end: String,

        #[arg(short, long, default_value_t = 100)]
        max: u32,

        #[arg(long)]
        reverse: bool,
    },

    /// Store a file as 1 MiB chunks, all in flight at once
    PutFile { path: String },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kinetic=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let mode = if args.caller_driven {
        ExecutionMode::CallerDriven
    } else {
        ExecutionMode::Threaded
    };
    let config = SessionConfig::builder()
        .host(&args.host)
        .port(args.port)
        .cluster_version(args.cluster_version)
        .identity(args.identity)
        .hmac_key(args.key.as_bytes())
        .execution_mode(mode)
        .handshake(args.handshake)
        .build();

    let session = Session::new(config);
    if let Err(e) = session.connect() {
        tracing::error!("Failed connecting to {}:{}: {}", args.host, args.port, e);
        process::exit(1);
    }

    let outcome = execute(&session, args.command);

    if let Err(e) = session.disconnect() {
        tracing::warn!("Disconnect: {}", e);
    }

    if let Err(e) = outcome {
        tracing::error!("{} ({})", e, e.status());
        process::exit(1);
    }
}

fn execute(session: &Session, command: Commands) -> Result<()> {
    let operation = session.new_operation()?;

    match command {
        Commands::Noop => {
            operation.noop()?;
            println!("OK");
        }

        Commands::Put {
            key,
            value,
            version,
            db_version,
            force,
        } => {
            let tag = Algorithm::Sha1
                .compute_tag(value.as_bytes())
                .unwrap_or_default();
            let mut entry = Entry::new(key.as_str())
                .with_value(value.as_str())
                .with_tag(tag, Algorithm::Sha1)
                .force(force);
            if let Some(version) = version {
                entry = entry.with_new_version(version.as_str());
            }
            if let Some(db_version) = db_version {
                entry = entry.with_db_version(db_version.as_str());
            }

            operation.put(&mut entry)?;
            println!("OK");
        }

        Commands::Get { key, metadata_only } => {
            let mut entry = Entry::new(key.as_str()).metadata_only(metadata_only);
            operation.get(&mut entry)?;

            println!("version: {}", String::from_utf8_lossy(entry.db_version.as_slice()));
            println!("tag:     {:02x?}", entry.tag.as_slice());
            if !metadata_only {
                println!("value:   {}", String::from_utf8_lossy(entry.value_bytes()));
            }
        }

        Commands::Del {
            key,
            db_version,
            force,
        } => {
            let mut entry = Entry::new(key.as_str()).force(force);
            if let Some(db_version) = db_version {
                entry = entry.with_db_version(db_version.as_str());
            }

            operation.delete(&mut entry)?;
            println!("OK");
        }

        Commands::Range {
            start,
            end,
            max,
            reverse,
        } => {
            let mut range = KeyRange::new(start.as_str(), end.as_str(), max);
            range.reverse = reverse;

            for key in operation.get_key_range(&range)? {
                println!("{}", String::from_utf8_lossy(&key));
            }
        }

        Commands::PutFile { path } => {
            let data = fs::read(&path)?;
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            let prefix = key_prefix(secs);

            let transfer = Transfer::new();
            let chunks = transfer.put_chunks(&operation, &data, prefix);
            tracing::info!("Storing '{}': {} chunks in flight", path, chunks);

            let status = transfer.wait(session);
            if !status.is_success() {
                return Err(kinetic_client::KineticError::from_status(status));
            }
            println!("Stored '{}' under prefix {:#018x}", path, prefix);
        }
    }

    Ok(())
}
