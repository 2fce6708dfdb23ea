//! perfstore: Performance Counter Storage Driver
//!
//! Persists named performance counter samples in a relational database and
//! reads them back one counter and one day at a time.
//!
//! # Features
//!
//! - **Compact Counter Ids**: Names map to 16-bit ids through a hash with
//!   collision probing, backed by a durable mapping table
//! - **Name Cache**: Confirmed ids are cached so repeat batches skip lookups
//! - **Bulk Ingestion**: Batches stream to the database as binary COPY data
//! - **Lazy Schema Bootstrap**: Tables are created on first use with an
//!   idempotent script
//! - **Error Channel**: Operations never fail the caller; failures are
//!   broadcast and buffered for inspection
//!
//! # Example
//!
//! ```no_run
//! use perfstore::{CounterInput, CounterQuery, CounterStore, StoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CounterStore::from_config(&StoreConfig::new("postgres://localhost/perf"))?;
//!
//! store
//!     .store_counters(&[CounterInput::new("cpu", 12.5)], None, None)
//!     .await;
//!
//! let today = store.query_counter_values(&CounterQuery::new("cpu")).await;
//! println!("cpu samples today: {}", today.len());
//!
//! for error in store.errors().recent() {
//!     eprintln!("{}: {}", error.kind, error.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod data;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use config::StoreConfig;
pub use data::{AppId, CounterId, CounterInput, CounterValue};
pub use storage::{BackendError, CounterBackend, MemoryBackend, SchemaSource};
pub use store::{CounterQuery, CounterStore, ErrorEvent, ErrorKind, StoreError};
