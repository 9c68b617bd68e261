//! src/dataloader/mod.rs
//!
//! This module implements the `Loader`.
//!
//! A `Loader` streams vertices, edges or sampled subgraphs out of the database in
//! bounded-memory batches. Every pass runs a small producer/consumer pipeline on
//! OS threads connected by bounded queues.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────┐
//!                 │ Dispatcher │ runs the query (sync, or async + status polling)
//!                 └─────┬──────┘
//!        sync mode      │        broker mode
//!     (response body)   │   (query publishes to topic <loader_id>_<pass>)
//!            │          │             ↓
//!            │          │      ┌────────────┐
//!            │          │      │ Downloader │ polls topic, pairs vertex/edge halves
//!            │          │      └─────┬──────┘
//!            ↓          ↓            ↓
//!         [ input queue: buffer_size x 2, raw batches ]
//!                       │
//!                       ↓
//!                 ┌────────────┐
//!                 │   Reader   │ decodes into tables or graph tensors
//!                 └─────┬──────┘
//!                       ↓
//!         [ output queue: buffer_size, decoded batches ]
//!                       │
//!                       ↓
//!                 Loader::iter() / Loader::data()
//! ```
//!
//! Both queues end every pass with exactly one sentinel. The bounded queues are
//! the backpressure: a slow caller stalls the reader, which stalls the upstream.
//!
//! # Module Structure
//!
//! ```text
//! src/dataloader/
//! ├── mod.rs             # Public API exports + module-level architecture docs
//! ├── config.rs          # LoaderConfig, builder, BrokerConfig, validation
//! ├── kind.rs            # The four loader kinds
//! ├── loader.rs          # Loader constructors and pass lifecycle
//! ├── iterator.rs        # LoaderIter and LoaderData
//! ├── workers/
//! │   ├── mod.rs         # Queue message type
//! │   ├── pool.rs        # Named worker threads of one pass
//! │   ├── dispatcher.rs  # Sync and broker query requests
//! │   ├── downloader.rs  # Topic polling and pair reassembly
//! │   └── reader.rs      # Decoding stage
//! └── common/
//!     ├── mod.rs
//!     ├── context.rs     # Cancellation flag and failure slot of a pass
//!     └── id.rs          # Loader ids and topic names
//! ```
//!
//! # Example Usage
//!
//! ## Synchronous, several batches
//! ```ignore
//! let config = LoaderConfig::builder()
//!     .batch_size(1024)
//!     .shuffle(true)
//!     .build();
//! let mut loader = Loader::new(conn, LoaderKind::vertex(["x", "y"]), config)?;
//!
//! for batch in loader.iter()? {
//!     let batch = batch?;
//!     // batch.as_table() ...
//! }
//! ```
//!
//! ## Broker mode, graph tensors
//! ```ignore
//! let config = LoaderConfig::builder()
//!     .num_batches(10)
//!     .output_format(OutputFormat::PyG)
//!     .build();
//! let kind = LoaderKind::neighbor(["x"], ["y"], ["train_mask"]);
//! let mut loader = Loader::with_broker(conn, kind, config, broker, BrokerConfig::new("kafka:9092"))?;
//! ```
//!
//! ## Single batch
//! ```ignore
//! let mut loader = Loader::new(conn, LoaderKind::Edge, LoaderConfig::default())?;
//! if let LoaderData::Single(edges) = loader.data()? {
//!     // the whole edge list, fetched once and cached
//! }
//! ```
//!
//! # Notes:
//! - Errors of any worker end the pass and come back from the iterator. One that
//!   lands after the last batch comes back from `reset()` or the next `iter()`.
//! - `reset()` (also run on drop) stops a pass early. Cancellation is not an error.
//! - Cancellation is cooperative: workers notice it within `poll_interval`, or
//!   within `BrokerConfig::poll_timeout` while waiting on the broker.

// Module declarations
mod common;
mod config;
mod iterator;
mod kind;
mod loader;
mod workers;

// Public re-exports
pub use config::{BrokerConfig, LoaderConfig, LoaderConfigBuilder};
pub use iterator::{LoaderData, LoaderIter};
pub use kind::{LoaderKind, DEFAULT_NUM_HOPS, DEFAULT_NUM_NEIGHBORS};
pub use loader::Loader;
