#![allow(dead_code)]

use anyhow::{anyhow, Result};
use graph_loader::{
    AsyncQueryResult, Broker, BrokerMessage, GraphConnection, QueryParams, QueryStatus, TopicSpec,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `done` until it holds or `limit` runs out. Returns the last answer.
pub fn wait_until(limit: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

/// Schema of a small Cora-like graph with one vertex kind.
pub fn cora_schema() -> Value {
    json!({
        "GraphName": "Cora",
        "VertexTypes": [{
            "Name": "Paper",
            "PrimaryId": {"AttributeName": "id", "AttributeType": {"Name": "INT"}},
            "Attributes": [
                {"AttributeName": "x", "AttributeType": {"Name": "LIST", "ValueTypeName": "INT"}},
                {"AttributeName": "y", "AttributeType": {"Name": "INT"}},
                {"AttributeName": "train_mask", "AttributeType": {"Name": "BOOL"}},
                {"AttributeName": "name", "AttributeType": {"Name": "STRING"}}
            ]
        }],
        "EdgeTypes": [{"Name": "Cite", "FromVertexTypeName": "Paper", "ToVertexTypeName": "Paper"}]
    })
}

/// Vertex lines `vid,x,y,train_mask` for batch `n`.
pub fn vertex_rows(n: usize) -> String {
    format!("{},1 0 0 1 ,1,0\n{},0 1 1 0 ,0,1\n", 100 + n, 200 + n)
}

/// Vertex lines `vid,x,y,train_mask,is_seed` for batch `n`.
pub fn neighbor_rows(n: usize) -> String {
    format!("{},1 0 0 1 ,1,0,1\n{},0 1 1 0 ,0,1,0\n", 100 + n, 200 + n)
}

/// Edge lines connecting the two vertices of batch `n` both ways.
pub fn edge_rows(n: usize) -> String {
    format!("{},{}\n{},{}\n", 100 + n, 200 + n, 200 + n, 100 + n)
}

/// One element of a synchronous query response.
pub fn sync_element(vertices: Option<&str>, edges: Option<&str>) -> Value {
    let mut element = serde_json::Map::new();
    if let Some(v) = vertices {
        element.insert("vertex_batch".into(), json!({ "0": v }));
    }
    if let Some(e) = edges {
        element.insert("edge_batch".into(), json!(e));
    }
    Value::Object(element)
}

// ================================================================================================
// 1. In-memory database
// ================================================================================================
#[derive(Debug, Clone)]
pub struct AsyncCall {
    pub name: String,
    pub params: QueryParams,
    pub headers: Vec<(String, String)>,
}

pub struct MockConnection {
    pub schema: Value,
    pub response: Mutex<Vec<Value>>,
    pub fail_query: Mutex<Option<String>>,
    pub installed: Mutex<Vec<String>>,
    pub install_response: Mutex<String>,
    pub gsql_scripts: Mutex<Vec<String>>,
    pub sync_calls: Mutex<Vec<QueryParams>>,
    pub async_calls: Mutex<Vec<AsyncCall>>,
    /// Statuses reported one by one. `Success` once exhausted.
    pub statuses: Mutex<VecDeque<QueryStatus>>,
    pub broker_error: Mutex<Option<String>>,
    pub results_fetched: Mutex<usize>,
    /// Messages written to `publish_to` every time an async query starts.
    pub publish: Mutex<Vec<BrokerMessage>>,
    pub publish_to: Mutex<Option<Arc<MockBroker>>>,
    pub vertex_counts: HashMap<String, u64>,
    pub edge_counts: HashMap<String, u64>,
    pub filtered_count: u64,
    pub count_filters: Mutex<Vec<Option<String>>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            schema: cora_schema(),
            response: Mutex::new(Vec::new()),
            fail_query: Mutex::new(None),
            installed: Mutex::new(Vec::new()),
            install_response: Mutex::new("Query installation finished.".to_string()),
            gsql_scripts: Mutex::new(Vec::new()),
            sync_calls: Mutex::new(Vec::new()),
            async_calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            broker_error: Mutex::new(None),
            results_fetched: Mutex::new(0),
            publish: Mutex::new(Vec::new()),
            publish_to: Mutex::new(None),
            vertex_counts: HashMap::from([("Paper".to_string(), 10)]),
            edge_counts: HashMap::from([("Cite".to_string(), 25)]),
            filtered_count: 3,
            count_filters: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: Vec<Value>) -> Self {
        *self.response.lock() = response;
        self
    }

    /// Links the connection to a broker the async query publishes `messages` into.
    pub fn publishing(self, broker: &Arc<MockBroker>, messages: Vec<BrokerMessage>) -> Self {
        *self.publish.lock() = messages;
        *self.publish_to.lock() = Some(broker.clone());
        self
    }

    fn count(&self, counts: &HashMap<String, u64>, type_name: &str, filter: Option<&str>) -> HashMap<String, u64> {
        self.count_filters.lock().push(filter.map(str::to_string));
        match (type_name, filter) {
            ("*", _) => counts.clone(),
            (t, Some(_)) => HashMap::from([(t.to_string(), self.filtered_count)]),
            (t, None) => HashMap::from([(t.to_string(), counts.get(t).copied().unwrap_or(0))]),
        }
    }
}

impl GraphConnection for MockConnection {
    fn graph_name(&self) -> &str {
        "Cora"
    }

    fn run_installed_query(
        &self,
        _name: &str,
        params: &QueryParams,
        _timeout: Duration,
    ) -> Result<Vec<Value>> {
        self.sync_calls.lock().push(params.clone());
        if let Some(msg) = self.fail_query.lock().clone() {
            return Err(anyhow!(msg));
        }
        Ok(self.response.lock().clone())
    }

    fn run_async_query(
        &self,
        name: &str,
        params: &QueryParams,
        headers: &[(String, String)],
    ) -> Result<String> {
        self.async_calls.lock().push(AsyncCall {
            name: name.to_string(),
            params: params.clone(),
            headers: headers.to_vec(),
        });
        if let Some(broker) = self.publish_to.lock().as_ref() {
            broker.publish(self.publish.lock().clone());
        }
        Ok(format!("request-{}", self.async_calls.lock().len()))
    }

    fn query_status(&self, _request_id: &str) -> Result<QueryStatus> {
        Ok(self.statuses.lock().pop_front().unwrap_or(QueryStatus::Success))
    }

    fn async_query_result(&self, _request_id: &str) -> Result<AsyncQueryResult> {
        *self.results_fetched.lock() += 1;
        Ok(AsyncQueryResult {
            broker_error: self.broker_error.lock().clone(),
        })
    }

    fn schema(&self) -> Result<Value> {
        Ok(self.schema.clone())
    }

    fn installed_queries(&self) -> Result<Vec<String>> {
        Ok(self.installed.lock().clone())
    }

    fn gsql(&self, script: &str) -> Result<String> {
        self.gsql_scripts.lock().push(script.to_string());
        Ok(format!("Start installing queries...\n{}", self.install_response.lock()))
    }

    fn vertex_count(&self, vertex_type: &str, filter: Option<&str>) -> Result<HashMap<String, u64>> {
        Ok(self.count(&self.vertex_counts, vertex_type, filter))
    }

    fn edge_count(&self, edge_type: &str, filter: Option<&str>) -> Result<HashMap<String, u64>> {
        Ok(self.count(&self.edge_counts, edge_type, filter))
    }
}

// ================================================================================================
// 2. In-memory broker
// ================================================================================================
pub struct MockBroker {
    pub existing: Mutex<HashSet<String>>,
    pub create_code: i32,
    pub delete_code: i32,
    pub created: Mutex<Vec<TopicSpec>>,
    pub deleted: Mutex<Vec<String>>,
    pub subscribed: Mutex<Vec<String>>,
    pub unsubscribed: Mutex<usize>,
    queue: Mutex<VecDeque<BrokerMessage>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::with_codes(0, 0)
    }

    pub fn with_codes(create_code: i32, delete_code: i32) -> Self {
        Self {
            existing: Mutex::new(HashSet::new()),
            create_code,
            delete_code,
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            subscribed: Mutex::new(Vec::new()),
            unsubscribed: Mutex::new(0),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn publish(&self, messages: Vec<BrokerMessage>) {
        self.queue.lock().extend(messages);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

impl Broker for MockBroker {
    fn address(&self) -> &str {
        "mock:9092"
    }

    fn topic_exists(&self, topic: &str) -> Result<bool> {
        Ok(self.existing.lock().contains(topic))
    }

    fn create_topic(&self, spec: &TopicSpec) -> Result<i32> {
        self.created.lock().push(spec.clone());
        if self.create_code == 0 {
            self.existing.lock().insert(spec.name.clone());
        }
        Ok(self.create_code)
    }

    fn subscribe(&self, topic: &str) -> Result<()> {
        self.subscribed.lock().push(topic.to_string());
        Ok(())
    }

    /// Hands out at most two messages per call to exercise partial polls.
    fn poll(&self, timeout: Duration) -> Result<Vec<BrokerMessage>> {
        let batch: Vec<BrokerMessage> = {
            let mut queue = self.queue.lock();
            let n = queue.len().min(2);
            queue.drain(..n).collect()
        };
        if batch.is_empty() {
            thread::sleep(timeout);
        }
        Ok(batch)
    }

    fn unsubscribe(&self) -> Result<()> {
        *self.unsubscribed.lock() += 1;
        Ok(())
    }

    fn delete_topic(&self, topic: &str) -> Result<i32> {
        self.deleted.lock().push(topic.to_string());
        self.existing.lock().remove(topic);
        Ok(self.delete_code)
    }
}

/// Vertex/edge message pairs for `n` batches. Edge halves go first when `edges_first`.
pub fn paired_messages(n: usize, neighbor: bool, edges_first: bool) -> Vec<BrokerMessage> {
    let mut messages = Vec::new();
    for i in 0..n {
        let vertices = if neighbor { neighbor_rows(i) } else { vertex_rows(i) };
        let v = BrokerMessage::new(format!("vertex_batch_{}", i), vertices);
        let e = BrokerMessage::new(format!("edge_batch_{}", i), edge_rows(i));
        if edges_first {
            messages.push(e);
            messages.push(v);
        } else {
            messages.push(v);
            messages.push(e);
        }
    }
    messages
}
