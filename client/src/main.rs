//! `tether` - command line client for a Tether authority.
//!
//! Records are written to a local file store first and submitted to the
//! authority configured by `TETHER_REMOTE_URL`. Anything that cannot be
//! submitted stays queued in the store for the next `drain`.

use clap::{Parser, Subcommand};
use tether_client::{Config, Enqueued, FileStore, HttpRemote, RetryOutcome, SyncQueue};
use tether_engine::{SnapshotMetadata, SyncStatus, ViewSource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tether", version, about = "Offline-first record sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a record from a JSON payload
    Create { payload: String },
    /// Show the merged view of remote and local records
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Recover the queue and submit everything pending once
    Drain,
    /// Submit one queued record right now
    Retry { id: String },
    /// Delete a record and cancel its submission
    Delete { id: String },
    /// Summarize the local store and queue
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = FileStore::open(&config.data_path)?;
    let mut remote = HttpRemote::with_timeout(&config.remote_url, config.request_timeout)?;
    if let Some(token) = &config.auth_token {
        remote = remote.with_auth_token(token);
    }

    let queue = SyncQueue::new(store, remote, config.sync.clone())?;
    // One-shot process: no background drains or retry timers.
    queue.shutdown();

    let _printer = queue.subscribe(|record, local_id| {
        println!("synced {local_id} -> {}", record.id);
    });

    match cli.command {
        Command::Create { payload } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let (record, outcome) = queue.create(payload).await?;
            match outcome {
                Enqueued::Submitted(_) => {}
                Enqueued::Queued => println!("queued {} for retry", record.id),
                Enqueued::Parked => {
                    println!("rejected {}; run `tether retry` after fixing it", record.id)
                }
                other => println!("{}: {other:?}", record.id),
            }
        }
        Command::List { limit } => {
            let limit = limit.unwrap_or(config.sync.display_limit);
            let view = queue.view(limit).await?;
            match view.source {
                ViewSource::Offline => println!("(offline: showing local records)"),
                ViewSource::EmptyRemote => println!("(remote is empty: showing local records)"),
                ViewSource::Merged => {}
            }
            for record in &view.entries {
                let marker = match queue.status(record.id()).await? {
                    None | Some(SyncStatus::Synced) => "",
                    Some(SyncStatus::Syncing { .. }) => " [syncing]",
                    Some(SyncStatus::NeedsRetry { .. }) => " [retry]",
                };
                println!("{}{marker} {}", record.id(), record.payload());
            }
        }
        Command::Drain => {
            let recovery = queue.recover().await?;
            if recovery.requeued > 0 || recovery.pruned > 0 {
                println!(
                    "recovered queue: {} requeued, {} pruned",
                    recovery.requeued, recovery.pruned
                );
            }
            let report = queue.process().await?;
            println!("{} submitted, {} parked", report.submitted.len(), report.parked.len());
            if let Some(delay) = report.retry_in {
                println!("submission failed; next retry due in {} ms", delay.as_millis());
            }
        }
        Command::Retry { id } => match queue.retry(&id).await? {
            RetryOutcome::Submitted(_) => {}
            RetryOutcome::Failed(error) => println!("retry of {id} failed: {error}"),
            RetryOutcome::InFlight => println!("{id} is already being submitted"),
        },
        Command::Delete { id } => match queue.delete(&id).await? {
            Some(_) => println!("deleted {id}"),
            None => println!("no record {id}"),
        },
        Command::Status => {
            let records = queue.records().await?;
            let snapshot = tether_engine::StoreSnapshot {
                records,
                queue: queue.queue().await?,
                ..Default::default()
            };
            let meta = SnapshotMetadata::from(&snapshot);
            println!(
                "{} records, {} pending, {} queued, {} parked",
                meta.record_count, meta.pending_count, meta.queued_count, meta.parked_count
            );
            for item in snapshot.queue.iter() {
                let state = if item.parked { "parked" } else { "queued" };
                let error = item.last_error.as_deref().unwrap_or("-");
                println!("  {} {state} attempts={} last_error={error}", item.id, item.attempts);
            }
        }
    }

    Ok(())
}
