//! src/dataloader/loader.rs
//!
//! Loader construction and pass lifecycle.
//!
//! # Constructor Overview
//! - `new()`: synchronous mode. The query response itself carries the batches.
//! - `with_broker()`: broker mode. The query publishes into a per-pass topic that
//!   the loader consumes.
//!
//! Construction does all the one-off work: validates the configuration, takes the
//! schema snapshot, checks the requested attributes, resolves the batch count and
//! installs the query. Nothing of this is repeated per pass.
//!
//! # Pass lifecycle
//!
//! ```text
//!   idle ──start()──> running ──sentinel──> finished
//!    ^                   │                     │
//!    └────── reset() ────┴─────────────────────┘
//! ```
//!
//! `reset()` cancels the workers, drains the output queue, joins every thread and
//! deletes the pass topic when the loader owns it. It is a no-op without a pass.
//! A worker failure the iterator never returned comes back from `reset()`, and
//! so from the next `iter()`, which resets first.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::common::context::PassContext;
use super::common::id::{random_loader_id, topic_name};
use super::config::{BrokerConfig, LoaderConfig};
use super::iterator::{LoaderData, LoaderIter};
use super::kind::{LoaderKind, Population};
use super::workers::dispatcher::{
    request_broker, request_rest, topic_spec, BrokerRequest, RestRequest,
};
use super::workers::downloader::{download, Download};
use super::workers::pool::PassWorkers;
use super::workers::reader::read;
use super::workers::{Message, INPUT_QUEUE_FACTOR};
use crate::batch::Batch;
use crate::connection::{GraphConnection, QueryParams};
use crate::decoder::{Decoder, OutputFormat};
use crate::error::LoaderError;
use crate::query::{attribute_replacements, install_query};
use crate::schema::SchemaSnapshot;
use crate::transport::Broker;

// ================================================================================================
// 1. Core Types (Loader, Pass)
// ================================================================================================
/// A configured, restartable stream of batches.
///
/// # Thread safety:
/// - The loader owns its worker threads and queues. The connection and broker are
///   shared with the caller.
/// - Iteration needs `&mut self`, so at most one pass is alive at any time.
pub struct Loader {
    conn: Arc<dyn GraphConnection>,
    broker: Option<BrokerHandle>,
    kind: LoaderKind,
    config: LoaderConfig,
    loader_id: String,
    num_batches: usize,
    schema: SchemaSnapshot,
    decoder: Decoder,
    query_name: String,
    params: QueryParams,
    iterations: usize,
    pass: Option<Pass>,
    cached: Option<Batch>,
}

struct BrokerHandle {
    broker: Arc<dyn Broker>,
    config: BrokerConfig,
}

/// Runtime state of one pass.
struct Pass {
    number: usize,
    ctx: PassContext,
    workers: PassWorkers,
    output_rx: Receiver<Message<Batch>>,
    topic: Option<String>,
    topic_live: Arc<AtomicBool>,
    finished: bool,
}

// ================================================================================================
// 2. Constructors
// ================================================================================================
impl Loader {
    /// Creates a loader that receives batches in the query response.
    pub fn new(
        conn: Arc<dyn GraphConnection>,
        kind: LoaderKind,
        config: LoaderConfig,
    ) -> Result<Self> {
        Self::build(conn, kind, config, None)
    }

    /// Creates a loader that receives batches through a message broker.
    pub fn with_broker(
        conn: Arc<dyn GraphConnection>,
        kind: LoaderKind,
        config: LoaderConfig,
        broker: Arc<dyn Broker>,
        broker_config: BrokerConfig,
    ) -> Result<Self> {
        broker_config.validate()?;
        Self::build(
            conn,
            kind,
            config,
            Some(BrokerHandle {
                broker,
                config: broker_config,
            }),
        )
    }

    fn build(
        conn: Arc<dyn GraphConnection>,
        kind: LoaderKind,
        config: LoaderConfig,
        broker: Option<BrokerHandle>,
    ) -> Result<Self> {
        config.validate()?;
        if config.output_format.is_graph() && !kind.raw_format().is_paired() {
            return Err(LoaderError::InvalidConfig(format!(
                "{} format can only be used with graph output, not {} batches",
                config.output_format,
                kind.name()
            ))
            .into());
        }

        let schema_doc = conn.schema().context("Failed to fetch graph schema")?;
        let schema = SchemaSnapshot::from_schema_json(&schema_doc)?;
        let kind = kind.validated(&schema)?;

        let num_batches = match config.batch_size {
            Some(batch_size) => {
                let population =
                    count_population(conn.as_ref(), &kind, config.filter_by.as_deref())?;
                let num_batches = population.div_ceil(batch_size as u64) as usize;
                if num_batches == 0 {
                    return Err(LoaderError::InvalidConfig(format!(
                        "no {} records to split into batches of {}",
                        kind.name(),
                        batch_size
                    ))
                    .into());
                }
                num_batches
            }
            None => config.num_batches,
        };

        let loader_id = config.loader_id.clone().unwrap_or_else(random_loader_id);

        let mut params = QueryParams::new();
        params.insert("num_batches".into(), Value::from(num_batches));
        params.insert("shuffle".into(), Value::from(config.shuffle));
        if let Some(filter) = &config.filter_by {
            params.insert("filter_by".into(), Value::from(filter.clone()));
        }
        kind.extend_params(&mut params);
        if let Some(handle) = &broker {
            params.insert(
                "kafka_address".into(),
                Value::from(handle.config.producer_address()),
            );
        }

        let attr_types = schema.attr_types();
        let template = kind.template();
        let replace = if template.has_vertex_attrs() {
            attribute_replacements(&kind.attributes(), &attr_types)?
        } else {
            Vec::new()
        };
        let query_name = install_query(conn.as_ref(), template, &replace)?;

        let decoder = Decoder::new(kind.decoder_config(&config, attr_types));

        info!(
            loader_id = %loader_id,
            kind = kind.name(),
            num_batches,
            query = %query_name,
            broker = broker.is_some(),
            "Loader ready"
        );

        Ok(Self {
            conn,
            broker,
            kind,
            config,
            loader_id,
            num_batches,
            schema,
            decoder,
            query_name,
            params,
            iterations: 0,
            pass: None,
            cached: None,
        })
    }

    pub fn loader_id(&self) -> &str {
        &self.loader_id
    }

    pub fn kind(&self) -> &LoaderKind {
        &self.kind
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Batches per pass, after resolving `batch_size`.
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    pub fn schema(&self) -> &SchemaSnapshot {
        &self.schema
    }

    pub fn query_name(&self) -> &str {
        &self.query_name
    }

    pub fn output_format(&self) -> OutputFormat {
        self.config.output_format
    }

    /// Number of passes started through [`Loader::iter`].
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn is_running(&self) -> bool {
        self.pass.as_ref().is_some_and(|p| !p.finished)
    }
}

/// Counts the records `batch_size` applies to.
fn count_population(
    conn: &dyn GraphConnection,
    kind: &LoaderKind,
    filter: Option<&str>,
) -> Result<u64> {
    let count = |type_name: &str, filter: Option<&str>| match kind.population() {
        Population::Vertices => conn.vertex_count(type_name, filter),
        Population::Edges => conn.edge_count(type_name, filter),
    };

    let by_type = count("*", None).context("Failed to count records")?;
    match filter {
        None => Ok(by_type.values().sum()),
        Some(attr) => {
            let predicate = format!("{}!=0", attr);
            let mut total = 0;
            for type_name in by_type.keys() {
                total += count(type_name.as_str(), Some(&predicate))
                    .with_context(|| format!("Failed to count {} records", type_name))?
                    .values()
                    .sum::<u64>();
            }
            Ok(total)
        }
    }
}

// ================================================================================================
// 3. Pass Lifecycle
// ================================================================================================
impl Loader {
    /// Starts a full pass and returns an iterator over its batches.
    ///
    /// With a single batch per pass, the batch is fetched once, cached and handed
    /// out on every call without starting a new pass.
    pub fn iter(&mut self) -> Result<LoaderIter<'_>> {
        if self.num_batches == 1 {
            let batch = self.single_batch()?.clone();
            return Ok(LoaderIter::single(batch));
        }
        self.reset()?;
        self.start()?;
        self.iterations += 1;
        Ok(LoaderIter::pass(self))
    }

    /// The single batch when the loader produces one, the loader itself otherwise.
    pub fn data(&mut self) -> Result<LoaderData<'_>> {
        if self.num_batches == 1 {
            return Ok(LoaderData::Single(self.single_batch()?));
        }
        Ok(LoaderData::Stream(self))
    }

    fn single_batch(&mut self) -> Result<&Batch> {
        if self.cached.is_none() {
            self.reset()?;
            self.start()?;
            let batch = self
                .next_batch()
                .unwrap_or_else(|| Err(anyhow!("Pass ended without producing a batch")))?;
            self.cached = Some(batch);
        }
        self.cached
            .as_ref()
            .ok_or_else(|| anyhow!("Single batch missing from cache"))
    }

    /// Spawns the workers of a new pass. The previous pass must be reset.
    fn start(&mut self) -> Result<()> {
        let number = self.iterations;
        let ctx = PassContext::new(self.config.poll_interval);
        let mut workers = PassWorkers::new(ctx.clone(), number);

        let (input_tx, input_rx) = bounded(self.config.buffer_size * INPUT_QUEUE_FACTOR);
        let (output_tx, output_rx) = bounded(self.config.buffer_size);
        let topic_live = Arc::new(AtomicBool::new(false));
        let format = self.kind.raw_format();

        let topic = match &self.broker {
            Some(handle) => {
                let topic = topic_name(&self.loader_id, number);
                let mut params = self.params.clone();
                params.insert("kafka_topic".into(), Value::from(topic.clone()));

                let request = BrokerRequest {
                    conn: self.conn.clone(),
                    broker: handle.broker.clone(),
                    query_name: self.query_name.clone(),
                    params,
                    topic: topic_spec(topic.clone(), &handle.config),
                    timeout: self.config.timeout,
                    status_interval: self.config.status_interval,
                    topic_live: topic_live.clone(),
                };
                workers.spawn("dispatcher", move |ctx| request_broker(ctx, request))?;

                let job = Download {
                    broker: handle.broker.clone(),
                    format,
                    num_batches: self.num_batches,
                    poll_timeout: handle.config.poll_timeout,
                    input_tx,
                };
                workers.spawn("downloader", move |ctx| download(ctx, job))?;
                Some(topic)
            }
            None => {
                let request = RestRequest {
                    conn: self.conn.clone(),
                    query_name: self.query_name.clone(),
                    params: self.params.clone(),
                    timeout: self.config.timeout,
                    format,
                    input_tx,
                };
                workers.spawn("dispatcher", move |ctx| request_rest(ctx, request))?;
                None
            }
        };

        let decoder = self.decoder.clone();
        workers.spawn("reader", move |ctx| read(ctx, decoder, input_rx, output_tx))?;

        debug!(loader_id = %self.loader_id, pass = number, topic = ?topic, "Pass started");
        self.pass = Some(Pass {
            number,
            ctx,
            workers,
            output_rx,
            topic,
            topic_live,
            finished: false,
        });
        Ok(())
    }

    /// Blocks for the next batch of the current pass.
    ///
    /// Returns `None` at the end of the pass, or the failure of a worker in its place.
    pub(crate) fn next_batch(&mut self) -> Option<Result<Batch>> {
        let timeout = self.config.timeout;
        let pass = self.pass.as_mut()?;
        if pass.finished {
            return None;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match pass.output_rx.recv_timeout(pass.ctx.poll_interval()) {
                Ok(Message::Batch(batch)) => return Some(Ok(batch)),
                Ok(Message::Sentinel) | Err(RecvTimeoutError::Disconnected) => {
                    pass.finished = true;
                    debug!(pass = pass.number, "Pass finished");
                    return pass.ctx.take_failure().map(Err);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(err) = pass.ctx.take_failure() {
                        pass.finished = true;
                        return Some(Err(err));
                    }
                    if Instant::now() >= deadline {
                        pass.finished = true;
                        pass.ctx.cancel();
                        return Some(Err(LoaderError::Timeout(timeout).into()));
                    }
                }
            }
        }
    }

    /// Tears down the current pass, if any.
    ///
    /// Cancels and joins every worker, then deletes the pass topic when the loader
    /// owns it. Safe to call repeatedly.
    ///
    /// Returns the failure of a worker that went unreported during the pass. The
    /// pass is torn down either way.
    pub fn reset(&mut self) -> Result<()> {
        let Some(mut pass) = self.pass.take() else {
            return Ok(());
        };
        debug!(loader_id = %self.loader_id, pass = pass.number, "Resetting the loader");

        pass.ctx.cancel();
        let drained = pass.output_rx.try_iter().count();
        let joined = pass.workers.join();
        // A stage can fail after the sentinel, e.g. the dispatcher still polling
        // status once every batch was downloaded.
        let unreported = pass.ctx.take_failure();
        let released = self.release_topic(&pass);

        debug!(pass = pass.number, drained, "Loader reset");
        joined?;
        if let Some(err) = unreported {
            if let Err(release_err) = &released {
                warn!(pass = pass.number, error = %format!("{:#}", release_err), "Topic release failed");
            }
            return Err(err.context(format!("Pass {} failed after its last batch", pass.number)));
        }
        released
    }

    fn release_topic(&self, pass: &Pass) -> Result<()> {
        let (Some(handle), Some(topic)) = (&self.broker, &pass.topic) else {
            return Ok(());
        };
        if !handle.config.auto_delete_topic || !pass.topic_live.load(Ordering::Acquire) {
            return Ok(());
        }

        handle
            .broker
            .unsubscribe()
            .context("Failed to unsubscribe from topic")?;
        let code = handle
            .broker
            .delete_topic(topic)
            .with_context(|| format!("Failed to delete topic {}", topic))?;
        if code != 0 {
            return Err(LoaderError::TopicDelete {
                topic: topic.clone(),
                code,
            }
            .into());
        }
        info!(topic = %topic, "Deleted topic");
        Ok(())
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        if let Err(err) = self.reset() {
            warn!(loader_id = %self.loader_id, error = %format!("{:#}", err), "Reset on drop failed");
        }
    }
}
