//! src/tensor.rs
//!
//! Dense tensors and the graph-tensor object handed to downstream numeric code.
//!
//! A `GraphTensor` holds an edge index of shape `[2, num_edges]` plus per-vertex
//! arrays that are aligned row-for-row with the vertex order used by the edge index.
//! The two layouts only differ in where features and labels are stored:
//!
//! | content          | `PyG`        | `Dgl`          |
//! |------------------|--------------|----------------|
//! | input features   | `x`          | `feat`         |
//! | labels           | `y`          | `label`        |
//! | numeric aux cols | own name     | own name       |
//! | string aux cols  | `strings`    | `strings`      |

use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Element storage of a [`Tensor`], flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::I64(v) => v.len(),
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TensorData::I64(_) => "i64",
            TensorData::F32(_) => "f32",
            TensorData::F64(_) => "f64",
            TensorData::Bool(_) => "bool",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(anyhow!(
                "Shape {:?} needs {} elements but {} were given",
                shape,
                expected,
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Drops every dimension of size 1.
    pub fn squeeze(mut self) -> Self {
        self.shape.retain(|&d| d != 1);
        self
    }

    pub fn as_i64(&self) -> Result<&[i64]> {
        match &self.data {
            TensorData::I64(v) => Ok(v),
            other => Err(anyhow!("Expected i64 tensor, found {}", other.kind())),
        }
    }

    pub fn as_f32(&self) -> Result<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(anyhow!("Expected f32 tensor, found {}", other.kind())),
        }
    }

    pub fn as_f64(&self) -> Result<&[f64]> {
        match &self.data {
            TensorData::F64(v) => Ok(v),
            other => Err(anyhow!("Expected f64 tensor, found {}", other.kind())),
        }
    }

    pub fn as_bool(&self) -> Result<&[bool]> {
        match &self.data {
            TensorData::Bool(v) => Ok(v),
            other => Err(anyhow!("Expected bool tensor, found {}", other.kind())),
        }
    }
}

/// Naming convention of the produced graph object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphLayout {
    PyG,
    Dgl,
}

impl GraphLayout {
    pub fn feature_key(&self) -> &'static str {
        match self {
            GraphLayout::PyG => "x",
            GraphLayout::Dgl => "feat",
        }
    }

    pub fn label_key(&self) -> &'static str {
        match self {
            GraphLayout::PyG => "y",
            GraphLayout::Dgl => "label",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphTensor {
    layout: GraphLayout,
    num_nodes: usize,
    edge_index: Tensor,
    node_data: HashMap<String, Tensor>,
    strings: HashMap<String, Vec<String>>,
}

impl GraphTensor {
    /// Creates a graph from an edge list over nodes `0..num_nodes`.
    pub fn from_edges(
        layout: GraphLayout,
        num_nodes: usize,
        sources: Vec<i64>,
        targets: Vec<i64>,
    ) -> Result<Self> {
        if sources.len() != targets.len() {
            return Err(anyhow!(
                "Edge list has {} sources but {} targets",
                sources.len(),
                targets.len()
            ));
        }
        let num_edges = sources.len();
        let mut flat = sources;
        flat.extend(targets);
        Ok(Self {
            layout,
            num_nodes,
            edge_index: Tensor::new(vec![2, num_edges], TensorData::I64(flat))?,
            node_data: HashMap::new(),
            strings: HashMap::new(),
        })
    }

    /// Appends an `(i, i)` edge for every node.
    pub fn add_self_loops(&mut self) {
        let num_edges = self.num_edges();
        if let TensorData::I64(flat) = &mut self.edge_index.data {
            let loops: Vec<i64> = (0..self.num_nodes as i64).collect();
            let mut targets = flat.split_off(num_edges);
            flat.extend_from_slice(&loops);
            targets.extend_from_slice(&loops);
            flat.extend(targets);
            self.edge_index.shape = vec![2, num_edges + self.num_nodes];
        }
    }

    pub fn layout(&self) -> GraphLayout {
        self.layout
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_edges(&self) -> usize {
        self.edge_index.shape.get(1).copied().unwrap_or(0)
    }

    pub fn edge_index(&self) -> &Tensor {
        &self.edge_index
    }

    /// `(sources, targets)` halves of the edge index.
    pub fn edges(&self) -> Result<(&[i64], &[i64])> {
        let flat = self.edge_index.as_i64()?;
        Ok(flat.split_at(self.num_edges()))
    }

    pub fn set_tensor(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.node_data.insert(name.into(), tensor);
    }

    pub fn set_strings(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.strings.insert(name.into(), values);
    }

    /// Returns a per-node tensor by name.
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.node_data
            .get(name)
            .ok_or_else(|| anyhow!("Tensor '{}' not found in graph", name))
    }

    pub fn strings(&self, name: &str) -> Result<&[String]> {
        self.strings
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("String column '{}' not found in graph", name))
    }

    pub fn features(&self) -> Option<&Tensor> {
        self.node_data.get(self.layout.feature_key())
    }

    pub fn labels(&self) -> Option<&Tensor> {
        self.node_data.get(self.layout.label_key())
    }

    pub fn tensor_names(&self) -> impl Iterator<Item = &str> {
        self.node_data.keys().map(String::as_str)
    }
}
