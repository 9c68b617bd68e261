//! Downloader: broker mode only.
//!
//! Polls the pass topic and forwards batches to the input queue. For paired
//! formats the vertex half and the edge half of a batch are published as two
//! messages keyed `vertex...N` and `edge...N`. They can arrive in any order, so
//! the first half waits in a buffer until its companion shows up.

use anyhow::Result;
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::Message;
use crate::batch::{Payload, RawBatch, RawFormat};
use crate::dataloader::common::context::PassContext;
use crate::error::LoaderError;
use crate::transport::{Broker, BrokerMessage};

const VERTEX_PREFIX: &str = "vertex";
const EDGE_PREFIX: &str = "edge";

/// Matches vertex and edge halves of paired batches.
#[derive(Debug)]
pub(crate) struct Reassembler {
    format: RawFormat,
    pending: HashMap<String, Vec<u8>>,
}

impl Reassembler {
    pub(crate) fn new(format: RawFormat) -> Self {
        Self {
            format,
            pending: HashMap::new(),
        }
    }

    /// Halves still waiting for their companion.
    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one message. Returns a batch once it is complete.
    pub(crate) fn push(&mut self, message: BrokerMessage) -> Result<Option<RawBatch>> {
        if !self.format.is_paired() {
            return Ok(RawBatch::single(self.format, Payload::Bytes(message.value)));
        }

        let key = message
            .key
            .as_deref()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .ok_or_else(|| LoaderError::UnrecognizedKey("<none>".to_string()))?;

        let (is_vertex, companion) = if key.starts_with(VERTEX_PREFIX) {
            (true, key.replacen(VERTEX_PREFIX, EDGE_PREFIX, 1))
        } else if key.starts_with(EDGE_PREFIX) {
            (false, key.replacen(EDGE_PREFIX, VERTEX_PREFIX, 1))
        } else {
            return Err(LoaderError::UnrecognizedKey(key).into());
        };

        match self.pending.remove(&companion) {
            Some(other) => {
                let (vertices, edges) = if is_vertex {
                    (message.value, other)
                } else {
                    (other, message.value)
                };
                Ok(Some(RawBatch::Graph {
                    vertices: Payload::Bytes(vertices),
                    edges: Payload::Bytes(edges),
                }))
            }
            None => {
                self.pending.insert(key, message.value);
                Ok(None)
            }
        }
    }
}

pub(crate) struct Download {
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) format: RawFormat,
    pub(crate) num_batches: usize,
    pub(crate) poll_timeout: Duration,
    pub(crate) input_tx: Sender<Message<RawBatch>>,
}

/// Delivers `num_batches` batches from the topic, then the sentinel.
pub(crate) fn download(ctx: &PassContext, job: Download) -> Result<()> {
    match deliver(ctx, &job) {
        Ok(delivered) => {
            debug!(delivered, "Download finished");
            ctx.send(&job.input_tx, Message::Sentinel);
        }
        Err(err) => {
            ctx.fail(err.context("Download worker failed"));
            let _ = job.input_tx.try_send(Message::Sentinel);
        }
    }
    Ok(())
}

fn deliver(ctx: &PassContext, job: &Download) -> Result<usize> {
    let mut reassembler = Reassembler::new(job.format);
    let mut delivered = 0;

    while !ctx.is_cancelled() && delivered < job.num_batches {
        let messages = job.broker.poll(job.poll_timeout)?;
        for message in messages {
            let Some(batch) = reassembler.push(message)? else {
                continue;
            };
            if !ctx.send(&job.input_tx, Message::Batch(batch)) {
                return Ok(delivered);
            }
            delivered += 1;
            if delivered == job.num_batches {
                break;
            }
        }
    }
    if reassembler.pending() > 0 {
        debug!(pending = reassembler.pending(), "Unpaired halves left in buffer");
    }
    Ok(delivered)
}
