//! src/connection.rs
//!
//! The remote database as seen by the loaders.
//!
//! Loaders never own the connection. They hold an `Arc<dyn GraphConnection>` and
//! share it with whatever else the caller is doing, so implementations must be
//! `Send + Sync` and safe to call from the dispatcher thread while the caller keeps
//! using them.

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// JSON object sent as the query's parameter payload.
pub type QueryParams = Map<String, Value>;

/// State of an asynchronously running query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Running,
    Success,
    /// Any other terminal state, carrying the status the server reported.
    Failed(String),
}

impl QueryStatus {
    pub fn from_status_str(status: &str) -> Self {
        match status {
            "running" => QueryStatus::Running,
            "success" => QueryStatus::Success,
            other => QueryStatus::Failed(other.to_string()),
        }
    }
}

/// Final report of an asynchronous query that wrote its output to a broker topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncQueryResult {
    /// Set when the query ran but could not publish its batches.
    pub broker_error: Option<String>,
}

pub trait GraphConnection: Send + Sync {
    /// Name of the graph this connection talks to.
    fn graph_name(&self) -> &str;

    /// Runs an installed query and waits for its result list.
    fn run_installed_query(
        &self,
        name: &str,
        params: &QueryParams,
        timeout: Duration,
    ) -> Result<Vec<Value>>;

    /// Starts an installed query without waiting and returns its request id.
    fn run_async_query(
        &self,
        name: &str,
        params: &QueryParams,
        headers: &[(String, String)],
    ) -> Result<String>;

    fn query_status(&self, request_id: &str) -> Result<QueryStatus>;

    fn async_query_result(&self, request_id: &str) -> Result<AsyncQueryResult>;

    /// Raw schema document (`VertexTypes`, `EdgeTypes`, ...).
    fn schema(&self) -> Result<Value>;

    /// Endpoint descriptors of the installed queries, e.g. `GET /query/Cora/vertex_loader`.
    fn installed_queries(&self) -> Result<Vec<String>>;

    /// Submits a GSQL script and returns the server's textual response.
    fn gsql(&self, script: &str) -> Result<String>;

    /// Vertex counts by type. `vertex_type` may be `"*"` for every type.
    fn vertex_count(&self, vertex_type: &str, filter: Option<&str>)
        -> Result<HashMap<String, u64>>;

    /// Edge counts by type. `edge_type` may be `"*"` for every type.
    fn edge_count(&self, edge_type: &str, filter: Option<&str>) -> Result<HashMap<String, u64>>;
}
