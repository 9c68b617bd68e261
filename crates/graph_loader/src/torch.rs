//! src/torch.rs
//!
//! Conversion of graph tensors into `tch` tensors. Enabled by the `torch` feature.

use crate::tensor::{GraphTensor, Tensor, TensorData};
use anyhow::Result;
use std::collections::HashMap;
use tch::Kind;

/// Name used for the edge index in the converted map.
pub const EDGE_INDEX_KEY: &str = "edge_index";

fn shape_i64(tensor: &Tensor) -> Vec<i64> {
    tensor.shape().iter().map(|&d| d as i64).collect()
}

pub fn to_tch(tensor: &Tensor) -> tch::Tensor {
    let shape = shape_i64(tensor);
    let flat = match tensor.data() {
        TensorData::I64(v) => tch::Tensor::from_slice(v).to_kind(Kind::Int64),
        TensorData::F32(v) => tch::Tensor::from_slice(v).to_kind(Kind::Float),
        TensorData::F64(v) => tch::Tensor::from_slice(v).to_kind(Kind::Double),
        TensorData::Bool(v) => tch::Tensor::from_slice(v).to_kind(Kind::Bool),
    };
    flat.reshape(shape.as_slice())
}

/// Edge index plus every per-node tensor, keyed by their layout names.
pub fn graph_to_tch(graph: &GraphTensor) -> Result<HashMap<String, tch::Tensor>> {
    let mut out = HashMap::new();
    out.insert(EDGE_INDEX_KEY.to_string(), to_tch(graph.edge_index()));
    for name in graph.tensor_names() {
        out.insert(name.to_string(), to_tch(graph.get(name)?));
    }
    Ok(out)
}
