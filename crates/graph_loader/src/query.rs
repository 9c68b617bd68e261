//! src/query.rs
//!
//! Installs the batch-producing query a loader runs on the database.
//!
//! Each loader kind has an embedded GSQL template. Attribute-carrying templates
//! contain two placeholders:
//! - `{QUERYSUFFIX}`: requested attribute names joined with `_`, so every attribute
//!   selection gets its own installed query
//! - `{VERTEXATTRS}`: the expression printing those attributes, each wrapped in
//!   the to-string function of its declared type
//!
//! Installation is skipped when an endpoint with the resolved name already exists.

use crate::connection::GraphConnection;
use crate::error::LoaderError;
use crate::schema::AttrTypes;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tracing::{debug, info};

pub const SUFFIX_PLACEHOLDER: &str = "{QUERYSUFFIX}";
pub const ATTRS_PLACEHOLDER: &str = "{VERTEXATTRS}";
/// Removed as a whole when no attributes are requested.
const ATTRS_FRAGMENT: &str = "+ \",\" + {VERTEXATTRS}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTemplate {
    VertexLoader,
    EdgeLoader,
    NeighborLoader,
    GraphLoader,
}

impl QueryTemplate {
    pub fn source(&self) -> &'static str {
        match self {
            QueryTemplate::VertexLoader => include_str!("../gsql/vertex_loader.gsql"),
            QueryTemplate::EdgeLoader => include_str!("../gsql/edge_loader.gsql"),
            QueryTemplate::NeighborLoader => include_str!("../gsql/neighbor_loader.gsql"),
            QueryTemplate::GraphLoader => include_str!("../gsql/graph_loader.gsql"),
        }
    }

    /// Whether the template prints vertex attributes.
    pub fn has_vertex_attrs(&self) -> bool {
        !matches!(self, QueryTemplate::EdgeLoader)
    }
}

/// Ordered placeholder substitutions for one template.
pub type Replacements = Vec<(String, String)>;

/// Substitutions for a template printing `attributes`.
pub fn attribute_replacements(attributes: &[String], types: &AttrTypes) -> Result<Replacements> {
    let mut replace = vec![(SUFFIX_PLACEHOLDER.to_string(), attributes.join("_"))];
    if attributes.is_empty() {
        replace.push((ATTRS_FRAGMENT.to_string(), String::new()));
        return Ok(replace);
    }

    let mut printed = Vec::with_capacity(attributes.len());
    for attr in attributes {
        let ty = types
            .get(attr)
            .ok_or_else(|| anyhow!("Attribute '{}' has no declared type", attr))?;
        printed.push(match ty.to_string_udf() {
            Some(udf) => format!("{}(s.{})", udf, attr),
            None => format!("s.{}", attr),
        });
    }
    replace.push((ATTRS_PLACEHOLDER.to_string(), printed.join("+\",\"+")));
    Ok(replace)
}

/// Reads the query name off the template's first line (`CREATE QUERY <name>(`).
pub fn parse_query_name(template: &str) -> Result<String> {
    let first_line = template.lines().next().unwrap_or_default();
    let pattern = Regex::new(r"QUERY (.+?)\(").context("Invalid query-name pattern")?;
    pattern
        .captures(first_line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| {
            LoaderError::QueryInstall(
                "cannot parse the query template, it should start with CREATE QUERY".into(),
            )
            .into()
        })
}

pub fn render(template: &str, replace: &Replacements) -> String {
    replace
        .iter()
        .fold(template.to_string(), |text, (from, to)| text.replace(from, to))
}

pub fn is_query_installed(conn: &dyn GraphConnection, name: &str) -> Result<bool> {
    let target = format!("GET /query/{}/{}", conn.graph_name(), name);
    let installed = conn
        .installed_queries()
        .context("Failed to list installed queries")?;
    Ok(installed.iter().any(|q| q == &target))
}

/// Installs `template` unless already present and returns the installed query name.
pub fn install_query(
    conn: &dyn GraphConnection,
    template: QueryTemplate,
    replace: &Replacements,
) -> Result<String> {
    let source = template.source();
    let mut name = parse_query_name(source)?;
    if let Some((_, suffix)) = replace.iter().find(|(from, _)| from == SUFFIX_PLACEHOLDER) {
        name = name.replace(SUFFIX_PLACEHOLDER, suffix);
    }

    if is_query_installed(conn, &name)? {
        debug!(query = %name, "Query already installed");
        return Ok(name);
    }

    let script = format!(
        "USE GRAPH {}\n{}\nInstall Query {}\n",
        conn.graph_name(),
        render(source, replace),
        name
    );
    info!(query = %name, "Installing and optimizing query, this can take a minute on first use");
    let response = conn
        .gsql(&script)
        .with_context(|| format!("Failed to submit install request for {}", name))?;

    let status = response.lines().last().unwrap_or_default();
    if status.contains("Failed") {
        return Err(LoaderError::QueryInstall(status.to_string()).into());
    }
    info!(query = %name, status, "Query installed");
    Ok(name)
}
