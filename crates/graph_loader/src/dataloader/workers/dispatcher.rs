//! Request dispatcher: triggers the remote query of a pass.
//!
//! - Synchronous mode (`request_rest`): one blocking call whose response is the
//!   list of batches. Each element goes to the input queue as it is unpacked,
//!   followed by the sentinel.
//! - Broker mode (`request_broker`): makes sure the pass topic exists, subscribes,
//!   starts the query asynchronously and polls its status. The batches reach the
//!   input queue through the downloader, which also emits the sentinel.

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::Message;
use crate::batch::{Payload, RawBatch, RawFormat};
use crate::connection::{GraphConnection, QueryParams, QueryStatus};
use crate::dataloader::common::context::PassContext;
use crate::dataloader::config::BrokerConfig;
use crate::error::LoaderError;
use crate::transport::{Broker, TopicSpec};

pub(crate) struct RestRequest {
    pub(crate) conn: Arc<dyn GraphConnection>,
    pub(crate) query_name: String,
    pub(crate) params: QueryParams,
    pub(crate) timeout: Duration,
    pub(crate) format: RawFormat,
    pub(crate) input_tx: Sender<Message<RawBatch>>,
}

/// Runs the query synchronously and feeds its response into the input queue.
pub(crate) fn request_rest(ctx: &PassContext, req: RestRequest) -> Result<()> {
    match push_response(ctx, &req) {
        Ok(()) => {
            ctx.send(&req.input_tx, Message::Sentinel);
            Ok(())
        }
        Err(err) => {
            // Recorded before the sentinel so the consumer sees it at end of pass.
            ctx.fail(err.context("Request worker failed"));
            let _ = req.input_tx.try_send(Message::Sentinel);
            Ok(())
        }
    }
}

fn push_response(ctx: &PassContext, req: &RestRequest) -> Result<()> {
    debug!(query = %req.query_name, "Running query synchronously");
    let response = req
        .conn
        .run_installed_query(&req.query_name, &req.params, req.timeout)
        .with_context(|| format!("Failed to run query {}", req.query_name))?;

    for (i, element) in response.iter().enumerate() {
        if ctx.is_cancelled() {
            return Ok(());
        }
        let batch = unpack_element(req.format, element)
            .with_context(|| format!("Malformed element {} in query response", i))?;
        if !ctx.send(&req.input_tx, Message::Batch(batch)) {
            return Ok(());
        }
    }
    Ok(())
}

/// Extracts the raw batch from one response element.
///
/// `vertex_batch` is an object whose string values are concatenated in order,
/// `edge_batch` is a string.
pub(crate) fn unpack_element(format: RawFormat, element: &Value) -> Result<RawBatch> {
    let vertices = || -> Result<Payload> {
        let parts = element
            .get("vertex_batch")
            .and_then(Value::as_object)
            .ok_or_else(|| shape_error("missing 'vertex_batch' object"))?;
        let mut text = String::new();
        for part in parts.values() {
            text.push_str(
                part.as_str()
                    .ok_or_else(|| shape_error("non-string value in 'vertex_batch'"))?,
            );
        }
        Ok(Payload::Text(text))
    };
    let edges = || -> Result<Payload> {
        element
            .get("edge_batch")
            .and_then(Value::as_str)
            .map(Payload::from)
            .ok_or_else(|| shape_error("missing 'edge_batch' string"))
    };

    Ok(match format {
        RawFormat::Vertex => RawBatch::Vertex(vertices()?),
        RawFormat::Edge => RawBatch::Edge(edges()?),
        RawFormat::Graph => RawBatch::Graph {
            vertices: vertices()?,
            edges: edges()?,
        },
    })
}

fn shape_error(msg: &str) -> anyhow::Error {
    LoaderError::PayloadShape(msg.to_string()).into()
}

pub(crate) struct BrokerRequest {
    pub(crate) conn: Arc<dyn GraphConnection>,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) query_name: String,
    pub(crate) params: QueryParams,
    pub(crate) topic: TopicSpec,
    pub(crate) timeout: Duration,
    pub(crate) status_interval: Duration,
    /// Raised once the topic exists, so reset knows there is something to delete.
    pub(crate) topic_live: Arc<AtomicBool>,
}

/// Starts the query in broker mode and waits for it to finish.
pub(crate) fn request_broker(ctx: &PassContext, req: BrokerRequest) -> Result<()> {
    let topic = &req.topic.name;
    if !req.broker.topic_exists(topic)? {
        let code = req
            .broker
            .create_topic(&req.topic)
            .with_context(|| format!("Failed to create topic {}", topic))?;
        if code != 0 {
            return Err(LoaderError::TopicCreate {
                topic: topic.clone(),
                address: req.broker.address().to_string(),
                code,
            }
            .into());
        }
        info!(topic = %topic, "Created topic");
    }
    req.topic_live.store(true, Ordering::Release);
    req.broker.subscribe(topic)?;

    let headers = vec![
        ("GSQL-ASYNC".to_string(), "true".to_string()),
        ("GSQL-TIMEOUT".to_string(), req.timeout.as_millis().to_string()),
    ];
    let request_id = req
        .conn
        .run_async_query(&req.query_name, &req.params, &headers)
        .with_context(|| format!("Failed to start query {}", req.query_name))?;
    debug!(query = %req.query_name, request_id = %request_id, "Query running asynchronously");

    while !ctx.is_cancelled() {
        match req.conn.query_status(&request_id)? {
            QueryStatus::Running => {
                ctx.sleep(req.status_interval);
            }
            QueryStatus::Success => {
                let result = req.conn.async_query_result(&request_id)?;
                if let Some(reason) = result.broker_error.filter(|e| !e.is_empty()) {
                    return Err(LoaderError::BrokerDelivery(reason).into());
                }
                debug!(request_id = %request_id, "Query finished");
                return Ok(());
            }
            QueryStatus::Failed(status) => return Err(LoaderError::QueryFailed(status).into()),
        }
    }
    debug!(request_id = %request_id, "Stopped polling query status");
    Ok(())
}

/// Topic settings for one pass.
pub(crate) fn topic_spec(name: String, config: &BrokerConfig) -> TopicSpec {
    TopicSpec {
        name,
        num_partitions: config.num_partitions,
        replication_factor: config.replication_factor,
        retention_ms: config.retention_ms,
        max_message_bytes: config.max_message_bytes,
    }
}
