//! # Tether Client
//!
//! The async half of the sync engine: a durable local store, a remote
//! submission primitive and the [`SyncQueue`] that moves pending records from
//! one to the other.
//!
//! ```rust,no_run
//! use tether_client::{HttpRemote, MemoryStore, SyncQueue};
//! use tether_engine::SyncConfig;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = HttpRemote::new("http://localhost:3000")?;
//! let queue = SyncQueue::new(MemoryStore::new(), remote, SyncConfig::default())?;
//!
//! let _promotions = queue.subscribe(|record, local_id| {
//!     println!("{local_id} is now {}", record.id);
//! });
//!
//! let (record, outcome) = queue.create(json!({"title": "Offline draft"})).await?;
//! println!("{}: {:?}", record.id, outcome);
//!
//! let view = queue.view(queue.config().display_limit).await?;
//! println!("{} records ({:?})", view.len(), view.source);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod remote;
pub mod store;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use error::{Error, Result, StoreError};
pub use http::HttpRemote;
pub use remote::{Remote, Submission, SubmitError};
pub use store::{FileStore, LocalStore, MemoryStore, StoreResult};
pub use sync::{DrainReport, Enqueued, Recovery, RetryOutcome, SyncQueue};
