//! src/dataloader/kind.rs
//!
//! The four loader kinds.
//!
//! | kind       | query template    | raw batch     | counted for `batch_size` |
//! |------------|-------------------|---------------|--------------------------|
//! | `Vertex`   | `vertex_loader`   | vertex table  | vertices                 |
//! | `Edge`     | `edge_loader`     | edge table    | edges                    |
//! | `Neighbor` | `neighbor_loader` | vertex + edge | vertices (seeds)         |
//! | `Graph`    | `graph_loader`    | vertex + edge | edges                    |
//!
//! Neighborhood batches carry one more vertex column, `is_seed`, after the
//! requested extras.

use crate::batch::RawFormat;
use crate::connection::QueryParams;
use crate::decoder::{DecoderConfig, IS_SEED_COLUMN};
use crate::query::QueryTemplate;
use crate::schema::{AttrType, AttrTypes, SchemaSnapshot};
use anyhow::Result;
use serde_json::Value;

use super::config::LoaderConfig;

pub const DEFAULT_NUM_NEIGHBORS: usize = 10;
pub const DEFAULT_NUM_HOPS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderKind {
    /// Vertices with the given attributes.
    Vertex { attributes: Vec<String> },
    /// Edges as `(source, target)` pairs.
    Edge,
    /// Sampled multi-hop neighborhoods around batches of seed vertices.
    Neighbor {
        v_in_feats: Vec<String>,
        v_out_labels: Vec<String>,
        v_extra_feats: Vec<String>,
        num_neighbors: usize,
        num_hops: usize,
    },
    /// Edge batches together with their endpoint vertices.
    Graph {
        v_in_feats: Vec<String>,
        v_out_labels: Vec<String>,
        v_extra_feats: Vec<String>,
    },
}

/// What `batch_size` is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Population {
    Vertices,
    Edges,
}

fn names<I, S>(list: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    list.into_iter().map(Into::into).collect()
}

impl LoaderKind {
    pub fn vertex<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LoaderKind::Vertex {
            attributes: names(attributes),
        }
    }

    /// Neighbor sampling with the default fan-out (10 neighbors, 2 hops).
    pub fn neighbor<S1, S2, S3>(
        v_in_feats: impl IntoIterator<Item = S1>,
        v_out_labels: impl IntoIterator<Item = S2>,
        v_extra_feats: impl IntoIterator<Item = S3>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        LoaderKind::Neighbor {
            v_in_feats: names(v_in_feats),
            v_out_labels: names(v_out_labels),
            v_extra_feats: names(v_extra_feats),
            num_neighbors: DEFAULT_NUM_NEIGHBORS,
            num_hops: DEFAULT_NUM_HOPS,
        }
    }

    pub fn graph<S1, S2, S3>(
        v_in_feats: impl IntoIterator<Item = S1>,
        v_out_labels: impl IntoIterator<Item = S2>,
        v_extra_feats: impl IntoIterator<Item = S3>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        LoaderKind::Graph {
            v_in_feats: names(v_in_feats),
            v_out_labels: names(v_out_labels),
            v_extra_feats: names(v_extra_feats),
        }
    }

    /// Overrides the sampling fan-out. No effect on other kinds.
    pub fn with_sampling(mut self, neighbors: usize, hops: usize) -> Self {
        if let LoaderKind::Neighbor {
            num_neighbors,
            num_hops,
            ..
        } = &mut self
        {
            *num_neighbors = neighbors;
            *num_hops = hops;
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoaderKind::Vertex { .. } => "vertex",
            LoaderKind::Edge => "edge",
            LoaderKind::Neighbor { .. } => "neighbor",
            LoaderKind::Graph { .. } => "graph",
        }
    }

    pub fn raw_format(&self) -> RawFormat {
        match self {
            LoaderKind::Vertex { .. } => RawFormat::Vertex,
            LoaderKind::Edge => RawFormat::Edge,
            LoaderKind::Neighbor { .. } | LoaderKind::Graph { .. } => RawFormat::Graph,
        }
    }

    pub(crate) fn template(&self) -> QueryTemplate {
        match self {
            LoaderKind::Vertex { .. } => QueryTemplate::VertexLoader,
            LoaderKind::Edge => QueryTemplate::EdgeLoader,
            LoaderKind::Neighbor { .. } => QueryTemplate::NeighborLoader,
            LoaderKind::Graph { .. } => QueryTemplate::GraphLoader,
        }
    }

    pub(crate) fn population(&self) -> Population {
        match self {
            LoaderKind::Vertex { .. } | LoaderKind::Neighbor { .. } => Population::Vertices,
            LoaderKind::Edge | LoaderKind::Graph { .. } => Population::Edges,
        }
    }

    /// (features, labels, extras) as printed by the query.
    fn columns(&self) -> (&[String], &[String], &[String]) {
        match self {
            LoaderKind::Vertex { attributes } => (attributes.as_slice(), &[][..], &[][..]),
            LoaderKind::Edge => (&[][..], &[][..], &[][..]),
            LoaderKind::Neighbor {
                v_in_feats,
                v_out_labels,
                v_extra_feats,
                ..
            }
            | LoaderKind::Graph {
                v_in_feats,
                v_out_labels,
                v_extra_feats,
            } => (
                v_in_feats.as_slice(),
                v_out_labels.as_slice(),
                v_extra_feats.as_slice(),
            ),
        }
    }

    /// All requested vertex attributes in payload order.
    pub(crate) fn attributes(&self) -> Vec<String> {
        let (feats, labels, extras) = self.columns();
        feats.iter().chain(labels).chain(extras).cloned().collect()
    }

    /// Copy of this kind with every attribute list trimmed and checked against the schema.
    pub(crate) fn validated(&self, schema: &SchemaSnapshot) -> Result<Self> {
        Ok(match self {
            LoaderKind::Vertex { attributes } => LoaderKind::Vertex {
                attributes: schema.validate_attributes(attributes)?,
            },
            LoaderKind::Edge => LoaderKind::Edge,
            LoaderKind::Neighbor {
                v_in_feats,
                v_out_labels,
                v_extra_feats,
                num_neighbors,
                num_hops,
            } => LoaderKind::Neighbor {
                v_in_feats: schema.validate_attributes(v_in_feats)?,
                v_out_labels: schema.validate_attributes(v_out_labels)?,
                v_extra_feats: schema.validate_attributes(v_extra_feats)?,
                num_neighbors: *num_neighbors,
                num_hops: *num_hops,
            },
            LoaderKind::Graph {
                v_in_feats,
                v_out_labels,
                v_extra_feats,
            } => LoaderKind::Graph {
                v_in_feats: schema.validate_attributes(v_in_feats)?,
                v_out_labels: schema.validate_attributes(v_out_labels)?,
                v_extra_feats: schema.validate_attributes(v_extra_feats)?,
            },
        })
    }

    pub(crate) fn decoder_config(
        &self,
        config: &LoaderConfig,
        mut attr_types: AttrTypes,
    ) -> DecoderConfig {
        let (feats, labels, extras) = self.columns();
        let mut extra_feats = extras.to_vec();
        if let LoaderKind::Neighbor { .. } = self {
            extra_feats.push(IS_SEED_COLUMN.to_string());
            attr_types.insert(IS_SEED_COLUMN.to_string(), AttrType::Bool);
        }
        DecoderConfig {
            raw_format: self.raw_format(),
            output: config.output_format,
            in_feats: feats.to_vec(),
            out_labels: labels.to_vec(),
            extra_feats,
            attr_types,
            add_self_loop: config.add_self_loop,
            reindex: config.reindex,
        }
    }

    /// Kind-specific query parameters.
    pub(crate) fn extend_params(&self, params: &mut QueryParams) {
        if let LoaderKind::Neighbor {
            num_neighbors,
            num_hops,
            ..
        } = self
        {
            params.insert("num_neighbors".into(), Value::from(*num_neighbors));
            params.insert("num_hops".into(), Value::from(*num_hops));
        }
    }
}
