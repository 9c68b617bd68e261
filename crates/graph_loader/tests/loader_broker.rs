//! End-to-end tests for loaders in broker mode.
//!
//! Tests cover:
//! - Full passes for every loader kind, halves arriving in any order
//! - Topic lifecycle (one topic per pass, creation, deletion on reset and drop)
//! - Remote failures (topic creation, query status, broker delivery)
//! - Protocol errors (unrecognized message keys)
//! - Failures landing after the last batch (reset, next pass, drop)
//! - Request headers and broker parameters
//! - Pass timeout

mod common;
use common::{
    edge_rows, init_tracing, paired_messages, vertex_rows, wait_until, MockBroker,
    MockConnection,
};
use graph_loader::{
    loader_error, Batch, BrokerConfig, BrokerMessage, ErrorCategory, Loader, LoaderConfig,
    LoaderError, LoaderKind, OutputFormat, QueryStatus,
};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

fn config(num_batches: usize) -> LoaderConfig {
    LoaderConfig::builder()
        .loader_id("t")
        .num_batches(num_batches)
        .poll_interval(Duration::from_millis(5))
        .status_interval(Duration::from_millis(10))
        .timeout(Duration::from_secs(5))
        .build()
}

fn broker_config() -> BrokerConfig {
    BrokerConfig {
        poll_timeout: Duration::from_millis(10),
        ..BrokerConfig::new("mock:9092")
    }
}

fn loader(
    conn: &Arc<MockConnection>,
    broker: &Arc<MockBroker>,
    kind: LoaderKind,
    config: LoaderConfig,
) -> Result<Loader> {
    Loader::with_broker(conn.clone(), kind, config, broker.clone(), broker_config())
}

fn collect(loader: &mut Loader) -> Result<Vec<Batch>> {
    loader.iter()?.collect()
}

fn first_error(loader: &mut Loader) -> Result<anyhow::Error> {
    Ok(loader
        .iter()?
        .find_map(|item| item.err())
        .expect("pass should fail"))
}

// ================================================================================================
// Full passes
// ================================================================================================

#[test]
fn test_vertex_loader_over_broker() -> Result<()> {
    init_tracing();
    let broker = Arc::new(MockBroker::new());
    let messages = (0..3)
        .map(|i| BrokerMessage::new(format!("vertex_batch_{}", i), vertex_rows(i)))
        .collect();
    let conn = Arc::new(MockConnection::new().publishing(&broker, messages));
    let mut loader = loader(&conn, &broker, LoaderKind::vertex(["x", "y", "train_mask"]), config(3))?;

    let batches = collect(&mut loader)?;
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|b| b.as_table().map(|t| t.num_rows()) == Some(2)));
    Ok(())
}

#[test]
fn test_edge_loader_over_broker() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let messages = (0..2)
        .map(|i| BrokerMessage::new(format!("edge_batch_{}", i), edge_rows(i)))
        .collect();
    let conn = Arc::new(MockConnection::new().publishing(&broker, messages));
    let mut loader = loader(&conn, &broker, LoaderKind::Edge, config(2))?;

    let batches = collect(&mut loader)?;
    assert_eq!(batches.len(), 2);
    Ok(())
}

#[test]
fn test_graph_loader_pairs_halves_in_any_order() -> Result<()> {
    for edges_first in [false, true] {
        let broker = Arc::new(MockBroker::new());
        let conn = Arc::new(
            MockConnection::new().publishing(&broker, paired_messages(3, false, edges_first)),
        );
        let kind = LoaderKind::graph(["x"], ["y"], ["train_mask"]);
        let mut loader = loader(&conn, &broker, kind, config(3))?;

        let batches = collect(&mut loader)?;
        assert_eq!(batches.len(), 3, "edges_first = {}", edges_first);
        for batch in &batches {
            let (vertices, edges) = batch.as_tables().expect("vertex and edge tables");
            assert_eq!(vertices.num_rows(), 2);
            assert_eq!(edges.num_rows(), 2);
        }
    }
    Ok(())
}

#[test]
fn test_neighbor_loader_dgl_over_broker() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, true, true)));
    let kind = LoaderKind::neighbor(["x"], ["y"], ["train_mask"]).with_sampling(5, 3);
    let config = LoaderConfig {
        output_format: OutputFormat::Dgl,
        ..config(2)
    };
    let mut loader = loader(&conn, &broker, kind, config)?;

    let batches = collect(&mut loader)?;
    assert_eq!(batches.len(), 2);
    let graph = batches[1].as_graph().expect("graph tensor");
    assert_eq!(graph.get("feat")?.shape(), &[2, 4]);
    assert_eq!(graph.get("label")?.as_i64()?, &[1, 0]);
    assert_eq!(graph.get("is_seed")?.as_bool()?, &[true, false]);

    let params = conn.async_calls.lock()[0].params.clone();
    assert_eq!(params["num_neighbors"], 5);
    assert_eq!(params["num_hops"], 3);
    Ok(())
}

// ================================================================================================
// Topic lifecycle
// ================================================================================================

#[test]
fn test_one_topic_per_pass() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    let kind = LoaderKind::graph(["x"], ["y"], Vec::<String>::new());
    let mut loader = loader(&conn, &broker, kind, config(2))?;

    collect(&mut loader)?;
    assert!(broker.deleted().is_empty());
    collect(&mut loader)?;
    // Starting the second pass released the first topic
    assert_eq!(broker.deleted(), vec!["t_0"]);

    loader.reset()?;
    loader.reset()?;
    assert_eq!(broker.deleted(), vec!["t_0", "t_1"]);
    assert_eq!(*broker.unsubscribed.lock(), 2);

    let created: Vec<String> = broker.created.lock().iter().map(|t| t.name.clone()).collect();
    assert_eq!(created, vec!["t_0", "t_1"]);
    assert_eq!(broker.subscribed.lock().as_slice(), &["t_0", "t_1"]);
    Ok(())
}

#[test]
fn test_topic_settings() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let broker_config = BrokerConfig {
        num_partitions: 4,
        retention_ms: 1000,
        ..broker_config()
    };
    let mut loader = Loader::with_broker(conn.clone(), kind, config(2), broker.clone(), broker_config)?;
    collect(&mut loader)?;

    let created = broker.created.lock()[0].clone();
    assert_eq!(created.num_partitions, 4);
    assert_eq!(created.replication_factor, 1);
    assert_eq!(created.retention_ms, 1000);
    assert_eq!(created.max_message_bytes, 104_857_600);
    Ok(())
}

#[test]
fn test_kept_topic_is_not_deleted() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let broker_config = BrokerConfig {
        auto_delete_topic: false,
        ..broker_config()
    };
    let mut loader = Loader::with_broker(conn.clone(), kind, config(2), broker.clone(), broker_config)?;

    collect(&mut loader)?;
    loader.reset()?;
    assert!(broker.deleted().is_empty());
    assert_eq!(*broker.unsubscribed.lock(), 0);
    Ok(())
}

#[test]
fn test_existing_topic_is_reused() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    broker.existing.lock().insert("t_0".to_string());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let mut loader = loader(&conn, &broker, kind, config(2))?;

    collect(&mut loader)?;
    loader.reset()?;
    assert!(broker.created.lock().is_empty());
    assert_eq!(broker.deleted(), vec!["t_0"]);
    Ok(())
}

#[test]
fn test_drop_releases_topic() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(3, false, false)));
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    {
        let mut loader = loader(&conn, &broker, kind, config(3))?;
        let mut iter = loader.iter()?;
        assert!(iter.next().expect("first batch").is_ok());
    }
    assert_eq!(broker.deleted(), vec!["t_0"]);
    Ok(())
}

#[test]
fn test_topic_delete_failure() -> Result<()> {
    let broker = Arc::new(MockBroker::with_codes(0, 3));
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let mut loader = loader(&conn, &broker, kind, config(2))?;

    collect(&mut loader)?;
    let err = loader.reset().err().expect("delete should fail");
    assert!(matches!(
        loader_error(&err),
        Some(LoaderError::TopicDelete { topic, code: 3 }) if topic == "t_0"
    ));
    // The failed pass is gone either way
    loader.reset()?;
    assert_eq!(broker.deleted(), vec!["t_0"]);
    Ok(())
}

// ================================================================================================
// Remote failures
// ================================================================================================

#[test]
fn test_topic_create_failure() -> Result<()> {
    let broker = Arc::new(MockBroker::with_codes(7, 0));
    let conn = Arc::new(MockConnection::new());
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let mut loader = loader(&conn, &broker, kind, config(2))?;

    let err = first_error(&mut loader)?;
    match loader_error(&err) {
        Some(LoaderError::TopicCreate {
            topic,
            address,
            code,
        }) => {
            assert_eq!(topic, "t_0");
            assert_eq!(address, "mock:9092");
            assert_eq!(*code, 7);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    loader.reset()?;
    assert!(broker.deleted().is_empty());
    assert!(conn.async_calls.lock().is_empty());
    Ok(())
}

#[test]
fn test_failed_query_status() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new());
    conn.statuses.lock().extend([
        QueryStatus::Running,
        QueryStatus::Failed("aborted".to_string()),
    ]);
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let mut loader = loader(&conn, &broker, kind, config(2))?;

    let err = first_error(&mut loader)?;
    let inner = loader_error(&err).expect("loader error");
    assert!(matches!(inner, LoaderError::QueryFailed(status) if status == "aborted"));
    assert_eq!(inner.category(), ErrorCategory::Remote);

    loader.reset()?;
    assert_eq!(broker.deleted(), vec!["t_0"]);
    Ok(())
}

#[test]
fn test_broker_delivery_failure() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new());
    *conn.broker_error.lock() = Some("Local: Message size too large".to_string());
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let mut loader = loader(&conn, &broker, kind, config(2))?;

    let err = first_error(&mut loader)?;
    assert!(matches!(
        loader_error(&err),
        Some(LoaderError::BrokerDelivery(reason)) if reason.contains("too large")
    ));
    Ok(())
}

#[test]
fn test_unrecognized_message_key() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(
        MockConnection::new().publishing(&broker, vec![BrokerMessage::new("node_batch_0", "1\n")]),
    );
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let mut loader = loader(&conn, &broker, kind, config(2))?;

    let err = first_error(&mut loader)?;
    let inner = loader_error(&err).expect("loader error");
    assert!(matches!(inner, LoaderError::UnrecognizedKey(key) if key == "node_batch_0"));
    assert_eq!(inner.category(), ErrorCategory::Protocol);
    Ok(())
}

#[test]
fn test_pass_timeout() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new());
    conn.statuses
        .lock()
        .extend(std::iter::repeat(QueryStatus::Running).take(1000));
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let config = LoaderConfig {
        timeout: Duration::from_millis(100),
        ..config(2)
    };
    let mut loader = loader(&conn, &broker, kind, config)?;

    let err = first_error(&mut loader)?;
    assert!(matches!(loader_error(&err), Some(LoaderError::Timeout(_))));
    loader.reset()?;
    assert!(!loader.is_running());
    Ok(())
}

// ================================================================================================
// Failures after the last batch
// ================================================================================================

/// Loader whose query keeps running after both batches were published, then
/// reports a delivery error.
fn late_failing_loader(conn: &Arc<MockConnection>, broker: &Arc<MockBroker>) -> Result<Loader> {
    conn.statuses
        .lock()
        .extend(std::iter::repeat(QueryStatus::Running).take(5));
    *conn.broker_error.lock() = Some("Local: Message size too large".to_string());
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    loader(conn, broker, kind, config(2))
}

/// Waits until the dispatcher has fetched the query result and recorded its failure.
fn wait_for_result(conn: &MockConnection) {
    assert!(wait_until(Duration::from_secs(5), || *conn.results_fetched.lock() > 0));
    std::thread::sleep(Duration::from_millis(50));
}

fn is_delivery_error(err: &anyhow::Error) -> bool {
    matches!(loader_error(err), Some(LoaderError::BrokerDelivery(reason)) if reason.contains("too large"))
}

#[test]
fn test_failure_after_last_batch_returned_by_reset() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    let mut loader = late_failing_loader(&conn, &broker)?;

    assert_eq!(collect(&mut loader)?.len(), 2);
    wait_for_result(&conn);

    let err = loader.reset().err().expect("late failure");
    assert!(is_delivery_error(&err), "unexpected error: {:#}", err);
    // The pass is torn down regardless
    assert_eq!(broker.deleted(), vec!["t_0"]);
    loader.reset()?;
    Ok(())
}

#[test]
fn test_failure_after_last_batch_raised_by_next_pass() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    let mut loader = late_failing_loader(&conn, &broker)?;

    assert_eq!(collect(&mut loader)?.len(), 2);
    wait_for_result(&conn);

    let err = loader.iter().err().expect("late failure");
    assert!(is_delivery_error(&err), "unexpected error: {:#}", err);

    *conn.broker_error.lock() = None;
    assert_eq!(collect(&mut loader)?.len(), 2);
    assert_eq!(broker.deleted(), vec!["t_0"]);
    assert_eq!(broker.subscribed.lock().as_slice(), &["t_0", "t_1"]);
    Ok(())
}

#[test]
fn test_drop_with_unreported_failure_releases_topic() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    {
        let mut loader = late_failing_loader(&conn, &broker)?;
        assert_eq!(collect(&mut loader)?.len(), 2);
        wait_for_result(&conn);
    }
    assert_eq!(broker.deleted(), vec!["t_0"]);
    assert_eq!(*broker.unsubscribed.lock(), 1);
    Ok(())
}

// ================================================================================================
// Request details
// ================================================================================================

#[test]
fn test_async_request_headers_and_params() -> Result<()> {
    let broker = Arc::new(MockBroker::new());
    let conn = Arc::new(MockConnection::new().publishing(&broker, paired_messages(2, false, false)));
    let kind = LoaderKind::graph(["x"], Vec::<String>::new(), Vec::<String>::new());
    let broker_config = BrokerConfig {
        producer_address: Some("broker.internal:9092".to_string()),
        ..broker_config()
    };
    let mut loader = Loader::with_broker(conn.clone(), kind, config(2), broker.clone(), broker_config)?;
    collect(&mut loader)?;

    let call = conn.async_calls.lock()[0].clone();
    assert_eq!(call.name, "graph_loader_x");
    assert!(call
        .headers
        .contains(&("GSQL-ASYNC".to_string(), "true".to_string())));
    assert!(call
        .headers
        .contains(&("GSQL-TIMEOUT".to_string(), "5000".to_string())));
    assert_eq!(call.params["kafka_address"], "broker.internal:9092");
    assert_eq!(call.params["kafka_topic"], "t_0");
    assert_eq!(call.params["num_batches"], 2);
    assert!(conn.sync_calls.lock().is_empty());
    Ok(())
}

#[test]
fn test_invalid_broker_config() {
    let conn = Arc::new(MockConnection::new());
    let broker = Arc::new(MockBroker::new());
    let err = Loader::with_broker(
        conn,
        LoaderKind::Edge,
        config(2),
        broker,
        BrokerConfig::new(" "),
    )
    .err()
    .expect("error");
    assert!(matches!(loader_error(&err), Some(LoaderError::InvalidConfig(_))));
}
