//! src/decoder.rs
//!
//! Turns raw batch payloads into tables or graph tensors.
//!
//! Vertex payloads are headerless CSV with columns `vid, <features>, <labels>, <extras>`;
//! edge payloads have `source, target`. What comes out depends on `OutputFormat`:
//! - `DataFrame`: the parsed table(s), untouched
//! - `PyG` / `Dgl`: a [`GraphTensor`] built from a vertex/edge table pair, with
//!   feature, label and auxiliary columns attached using their declared types

use crate::batch::{Batch, RawBatch, RawFormat};
use crate::error::LoaderError;
use crate::schema::{AttrType, AttrTypes};
use crate::table::{ColumnData, Table};
use crate::tensor::{GraphLayout, GraphTensor, Tensor, TensorData};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const VERTEX_ID_COLUMN: &str = "vid";
pub const EDGE_COLUMNS: [&str; 2] = ["source", "target"];
/// Auxiliary column marking the seed vertices of a sampled neighborhood.
pub const IS_SEED_COLUMN: &str = "is_seed";

// ================================================================================================
// 1. Output format
// ================================================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    DataFrame,
    PyG,
    Dgl,
}

impl OutputFormat {
    pub fn is_graph(&self) -> bool {
        !matches!(self, OutputFormat::DataFrame)
    }

    /// Graph layout for graph formats, after checking the layout is compiled in.
    fn graph_layout(&self) -> Result<Option<GraphLayout>> {
        match self {
            OutputFormat::DataFrame => Ok(None),
            OutputFormat::PyG => {
                if cfg!(feature = "pyg") {
                    Ok(Some(GraphLayout::PyG))
                } else {
                    Err(LoaderError::MissingBackend {
                        backend: "PyG",
                        feature: "pyg",
                    }
                    .into())
                }
            }
            OutputFormat::Dgl => {
                if cfg!(feature = "dgl") {
                    Ok(Some(GraphLayout::Dgl))
                } else {
                    Err(LoaderError::MissingBackend {
                        backend: "DGL",
                        feature: "dgl",
                    }
                    .into())
                }
            }
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dataframe" => Ok(OutputFormat::DataFrame),
            "pyg" => Ok(OutputFormat::PyG),
            "dgl" => Ok(OutputFormat::Dgl),
            _ => Err(LoaderError::UnsupportedOutput(s.to_string()).into()),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::DataFrame => write!(f, "dataframe"),
            OutputFormat::PyG => write!(f, "PyG"),
            OutputFormat::Dgl => write!(f, "DGL"),
        }
    }
}

// ================================================================================================
// 2. Decoder
// ================================================================================================
/// Column configuration of one loader kind.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub raw_format: RawFormat,
    pub output: OutputFormat,
    pub in_feats: Vec<String>,
    pub out_labels: Vec<String>,
    pub extra_feats: Vec<String>,
    pub attr_types: AttrTypes,
    pub add_self_loop: bool,
    pub reindex: bool,
}

impl DecoderConfig {
    pub fn new(raw_format: RawFormat, output: OutputFormat) -> Self {
        Self {
            raw_format,
            output,
            in_feats: Vec::new(),
            out_labels: Vec::new(),
            extra_feats: Vec::new(),
            attr_types: AttrTypes::new(),
            add_self_loop: false,
            reindex: true,
        }
    }

    /// `vid` followed by features, labels and extras, in payload order.
    pub fn vertex_columns(&self) -> Vec<String> {
        std::iter::once(VERTEX_ID_COLUMN.to_string())
            .chain(self.in_feats.iter().cloned())
            .chain(self.out_labels.iter().cloned())
            .chain(self.extra_feats.iter().cloned())
            .collect()
    }

    pub fn edge_columns(&self) -> Vec<String> {
        EDGE_COLUMNS.iter().map(|c| c.to_string()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Decoder {
    config: DecoderConfig,
    vertex_columns: Vec<String>,
    edge_columns: Vec<String>,
}

impl Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        let vertex_columns = config.vertex_columns();
        let edge_columns = config.edge_columns();
        Self {
            config,
            vertex_columns,
            edge_columns,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes one raw batch.
    pub fn decode(&self, raw: RawBatch) -> Result<Batch> {
        self.check_feature_types()?;

        if raw.format() != self.config.raw_format {
            return Err(LoaderError::PayloadShape(format!(
                "expected {:?} batch, received {:?}",
                self.config.raw_format,
                raw.format()
            ))
            .into());
        }

        let batch = match raw {
            RawBatch::Vertex(payload) => Batch::Table(
                Table::from_csv(payload.as_bytes(), &self.vertex_columns)
                    .context("Failed to parse vertex batch")?,
            ),
            RawBatch::Edge(payload) => Batch::Table(
                Table::from_csv(payload.as_bytes(), &self.edge_columns)
                    .context("Failed to parse edge batch")?,
            ),
            RawBatch::Graph { vertices, edges } => Batch::Tables {
                vertices: Table::from_csv(vertices.as_bytes(), &self.vertex_columns)
                    .context("Failed to parse vertex half of graph batch")?,
                edges: Table::from_csv(edges.as_bytes(), &self.edge_columns)
                    .context("Failed to parse edge half of graph batch")?,
            },
        };

        if !self.config.output.is_graph() {
            return Ok(batch);
        }

        let (vertices, edges) = match batch {
            Batch::Tables { vertices, edges } => (vertices, edges),
            _ => {
                return Err(LoaderError::InvalidConfig(format!(
                    "{} format can only be used with graph output",
                    self.config.output
                ))
                .into())
            }
        };
        let layout = self
            .config
            .output
            .graph_layout()?
            .ok_or_else(|| anyhow!("Graph format without a layout"))?;

        self.to_graph(layout, &vertices, &edges).map(Batch::Graph)
    }

    /// Features and labels must be numeric or boolean.
    fn check_feature_types(&self) -> Result<()> {
        for col in self.config.in_feats.iter().chain(&self.config.out_labels) {
            if self.attr_type(col)?.is_string() {
                return Err(LoaderError::StringFeature(col.clone()).into());
            }
        }
        Ok(())
    }

    fn attr_type(&self, col: &str) -> Result<&AttrType> {
        self.config.attr_types.get(col).ok_or_else(|| {
            LoaderError::InvalidConfig(format!("no declared type for column '{}'", col)).into()
        })
    }

    fn to_graph(&self, layout: GraphLayout, vertices: &Table, edges: &Table) -> Result<GraphTensor> {
        let (sources, targets) = self.edge_list(vertices, edges)?;
        let mut graph = GraphTensor::from_edges(layout, vertices.num_rows(), sources, targets)?;
        if self.config.add_self_loop {
            graph.add_self_loops();
        }

        if !self.config.in_feats.is_empty() {
            let x = self.attrs_to_tensor(&self.config.in_feats, vertices)?;
            graph.set_tensor(layout.feature_key(), x);
        }
        if !self.config.out_labels.is_empty() {
            let y = self.attrs_to_tensor(&self.config.out_labels, vertices)?;
            graph.set_tensor(layout.label_key(), y);
        }
        for col in &self.config.extra_feats {
            let data = vertices.column(col)?;
            if self.attr_type(col)?.is_string() {
                let values = (0..data.len()).filter_map(|row| data.text(row)).collect();
                graph.set_strings(col.clone(), values);
                continue;
            }
            let matrix = column_matrix(col, data, self.attr_type(col)?)?;
            let shape = if matrix.vector {
                vec![matrix.rows, matrix.width]
            } else {
                vec![matrix.rows]
            };
            graph.set_tensor(col.clone(), Tensor::new(shape, matrix.data)?);
        }
        Ok(graph)
    }

    /// Edge endpoints as node indices.
    ///
    /// With reindexing, external vertex ids are mapped to their row in the vertex
    /// table and edges touching unknown vertices are dropped. Without it the ids
    /// must already be integers.
    fn edge_list(&self, vertices: &Table, edges: &Table) -> Result<(Vec<i64>, Vec<i64>)> {
        let source = edges.column(EDGE_COLUMNS[0])?;
        let target = edges.column(EDGE_COLUMNS[1])?;

        if !self.config.reindex {
            return match (source, target) {
                (ColumnData::Int(s), ColumnData::Int(t)) => Ok((s.clone(), t.clone())),
                _ => Err(anyhow!(
                    "Edge endpoints must be integers when reindexing is disabled"
                )),
            };
        }

        let vids = vertices.column(VERTEX_ID_COLUMN)?;
        let mut id_map: HashMap<String, i64> = HashMap::with_capacity(vids.len());
        for row in 0..vids.len() {
            if let Some(vid) = vids.text(row) {
                id_map.entry(vid).or_insert(row as i64);
            }
        }

        let mut sources = Vec::with_capacity(edges.num_rows());
        let mut targets = Vec::with_capacity(edges.num_rows());
        for row in 0..edges.num_rows() {
            let s = source.text(row).and_then(|id| id_map.get(&id).copied());
            let t = target.text(row).and_then(|id| id_map.get(&id).copied());
            if let (Some(s), Some(t)) = (s, t) {
                sources.push(s);
                targets.push(t);
            }
        }
        Ok((sources, targets))
    }

    /// Stacks the given columns side by side and squeezes unit dimensions.
    fn attrs_to_tensor(&self, columns: &[String], vertices: &Table) -> Result<Tensor> {
        let mut matrices = Vec::with_capacity(columns.len());
        for col in columns {
            let ty = self.attr_type(col)?;
            if ty.is_string() {
                return Err(LoaderError::StringFeature(col.clone()).into());
            }
            matrices.push(column_matrix(col, vertices.column(col)?, ty)?);
        }
        let rows = vertices.num_rows();
        let width: usize = matrices.iter().map(|m| m.width).sum();
        let data = hstack(rows, matrices)?;
        Ok(Tensor::new(vec![rows, width], data)?.squeeze())
    }
}

// ================================================================================================
// 3. Column -> matrix helpers
// ================================================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ElemKind {
    Bool,
    I64,
    F32,
    F64,
}

impl ElemKind {
    fn of(col: &str, ty: &AttrType) -> Result<Self> {
        match ty {
            AttrType::Int | AttrType::Uint => Ok(ElemKind::I64),
            AttrType::Float => Ok(ElemKind::F32),
            AttrType::Double => Ok(ElemKind::F64),
            AttrType::Bool => Ok(ElemKind::Bool),
            other => Err(LoaderError::InvalidConfig(format!(
                "column '{}' has type {} which cannot be turned into a tensor",
                col, other
            ))
            .into()),
        }
    }

    /// Common kind of two stacked columns. Integers next to single floats
    /// widen to double so large ids stay exact.
    fn promote(self, other: Self) -> Self {
        match (self.min(other), self.max(other)) {
            (ElemKind::I64, ElemKind::F32) => ElemKind::F64,
            (_, widest) => widest,
        }
    }

    fn of_data(data: &TensorData) -> Self {
        match data {
            TensorData::Bool(_) => ElemKind::Bool,
            TensorData::I64(_) => ElemKind::I64,
            TensorData::F32(_) => ElemKind::F32,
            TensorData::F64(_) => ElemKind::F64,
        }
    }

    fn collect(self, values: Vec<f64>) -> TensorData {
        match self {
            ElemKind::Bool => TensorData::Bool(values.into_iter().map(|v| v != 0.0).collect()),
            ElemKind::I64 => TensorData::I64(values.into_iter().map(|v| v as i64).collect()),
            ElemKind::F32 => TensorData::F32(values.into_iter().map(|v| v as f32).collect()),
            ElemKind::F64 => TensorData::F64(values),
        }
    }
}

struct Matrix {
    rows: usize,
    width: usize,
    /// Column stored as space separated values in a single cell.
    vector: bool,
    data: TensorData,
}

fn parse_token(col: &str, token: &str, kind: ElemKind) -> Result<f64> {
    let parsed = match kind {
        ElemKind::Bool => match token.to_ascii_lowercase().as_str() {
            "true" => Some(1.0),
            "false" => Some(0.0),
            other => other.parse::<f64>().ok(),
        },
        _ => token.parse::<f64>().ok(),
    };
    parsed.ok_or_else(|| anyhow!("Cannot parse '{}' in column '{}' as {:?}", token, col, kind))
}

fn column_matrix(col: &str, data: &ColumnData, ty: &AttrType) -> Result<Matrix> {
    let kind = ElemKind::of(col, ty)?;
    let rows = data.len();

    match data {
        ColumnData::Int(values) => {
            let data = match kind {
                ElemKind::I64 => TensorData::I64(values.clone()),
                _ => kind.collect(values.iter().map(|&v| v as f64).collect()),
            };
            Ok(Matrix {
                rows,
                width: 1,
                vector: false,
                data,
            })
        }
        ColumnData::Float(values) => Ok(Matrix {
            rows,
            width: 1,
            vector: false,
            data: kind.collect(values.clone()),
        }),
        ColumnData::Str(cells) => {
            // List cells are printed with a trailing separator, so a bare token is a scalar.
            let vector = cells
                .iter()
                .any(|c| c.trim() != c || c.split_whitespace().count() != 1);
            let mut width = None;
            let mut parsed = Vec::new();
            for (row, cell) in cells.iter().enumerate() {
                let before = parsed.len();
                for token in cell.split_whitespace() {
                    parsed.push(parse_token(col, token, kind)?);
                }
                let row_width = parsed.len() - before;
                match width {
                    None => width = Some(row_width),
                    Some(w) if w != row_width => {
                        return Err(anyhow!(
                            "Column '{}' row {} has {} values, previous rows have {}",
                            col,
                            row,
                            row_width,
                            w
                        ))
                    }
                    _ => {}
                }
            }
            let data = match kind {
                // Keep integers exact instead of routing them through f64.
                ElemKind::I64 => TensorData::I64(
                    cells
                        .iter()
                        .flat_map(|c| c.split_whitespace())
                        .map(|t| {
                            t.parse::<i64>()
                                .or_else(|_| parse_token(col, t, kind).map(|v| v as i64))
                        })
                        .collect::<Result<Vec<_>>>()?,
                ),
                _ => kind.collect(parsed),
            };
            Ok(Matrix {
                rows,
                width: width.unwrap_or(0),
                vector,
                data,
            })
        }
    }
}

fn cast(data: TensorData, kind: ElemKind) -> TensorData {
    if ElemKind::of_data(&data) == kind {
        return data;
    }
    let values: Vec<f64> = match data {
        TensorData::Bool(v) => v.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect(),
        TensorData::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        TensorData::F32(v) => v.into_iter().map(f64::from).collect(),
        TensorData::F64(v) => v,
    };
    kind.collect(values)
}

/// Concatenates row-major matrices along the column axis, promoting to a common kind.
fn hstack(rows: usize, matrices: Vec<Matrix>) -> Result<TensorData> {
    let kind = matrices
        .iter()
        .map(|m| ElemKind::of_data(&m.data))
        .reduce(ElemKind::promote)
        .ok_or_else(|| anyhow!("No columns to stack"))?;

    if matrices.len() == 1 {
        return Ok(matrices
            .into_iter()
            .next()
            .map(|m| cast(m.data, kind))
            .unwrap_or(TensorData::I64(Vec::new())));
    }

    let parts: Vec<(usize, TensorData)> = matrices
        .into_iter()
        .map(|m| (m.width, cast(m.data, kind)))
        .collect();

    macro_rules! interleave {
        ($variant:ident) => {{
            let mut out = Vec::new();
            for row in 0..rows {
                for (width, data) in &parts {
                    if let TensorData::$variant(v) = data {
                        out.extend_from_slice(&v[row * width..(row + 1) * width]);
                    }
                }
            }
            TensorData::$variant(out)
        }};
    }

    Ok(match kind {
        ElemKind::Bool => interleave!(Bool),
        ElemKind::I64 => interleave!(I64),
        ElemKind::F32 => interleave!(F32),
        ElemKind::F64 => interleave!(F64),
    })
}
