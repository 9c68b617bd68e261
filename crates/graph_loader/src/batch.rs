//! src/batch.rs
//!
//! Units of data moving through the pipeline.
//!
//! A `RawBatch` is what the dispatcher or the downloader produces. A `Batch` is what
//! the reader hands to the caller. Both move by value through the channels and are
//! never touched by two stages at once.

use crate::table::Table;
use crate::tensor::GraphTensor;

/// Undecoded payload. Broker mode delivers bytes, synchronous mode delivers text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Text(String),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Bytes(b) => b,
            Payload::Text(s) => s.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

/// Which tables a loader's raw batches contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawFormat {
    Vertex,
    Edge,
    Graph,
}

impl RawFormat {
    /// Whether batches arrive as a vertex/edge pair that must be matched up.
    pub fn is_paired(&self) -> bool {
        matches!(self, RawFormat::Graph)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBatch {
    Vertex(Payload),
    Edge(Payload),
    Graph { vertices: Payload, edges: Payload },
}

impl RawBatch {
    pub fn format(&self) -> RawFormat {
        match self {
            RawBatch::Vertex(_) => RawFormat::Vertex,
            RawBatch::Edge(_) => RawFormat::Edge,
            RawBatch::Graph { .. } => RawFormat::Graph,
        }
    }

    /// Wraps a single payload according to `format`. Paired formats cannot be
    /// built from one payload.
    pub(crate) fn single(format: RawFormat, payload: Payload) -> Option<Self> {
        match format {
            RawFormat::Vertex => Some(RawBatch::Vertex(payload)),
            RawFormat::Edge => Some(RawBatch::Edge(payload)),
            RawFormat::Graph => None,
        }
    }
}

/// A decoded batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    /// Vertex or edge table.
    Table(Table),
    /// Vertex table and edge table of the same subgraph.
    Tables { vertices: Table, edges: Table },
    Graph(GraphTensor),
}

impl Batch {
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Batch::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tables(&self) -> Option<(&Table, &Table)> {
        match self {
            Batch::Tables { vertices, edges } => Some((vertices, edges)),
            _ => None,
        }
    }

    pub fn as_graph(&self) -> Option<&GraphTensor> {
        match self {
            Batch::Graph(g) => Some(g),
            _ => None,
        }
    }
}
