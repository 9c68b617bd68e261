//! src/schema.rs
//!
//! Read-only snapshot of the vertex schema.
//!
//! A loader fetches the schema exactly once at construction and keeps the
//! resulting `SchemaSnapshot` for its whole lifetime. Nothing refreshes it mid-pass.

use crate::error::LoaderError;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Declared type of a vertex attribute.
///
/// Container attributes (`LIST<INT>`, `SET<DOUBLE>`, ...) are reported with their
/// element type, which is what the decoder needs to parse the space separated values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrType {
    Int,
    Uint,
    Float,
    Double,
    Bool,
    String,
    Datetime,
    Other(String),
}

impl AttrType {
    /// Parses a type name as reported by the database (case-insensitive).
    pub fn parse(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "int" => AttrType::Int,
            "uint" => AttrType::Uint,
            "float" => AttrType::Float,
            "double" => AttrType::Double,
            "bool" => AttrType::Bool,
            "datetime" => AttrType::Datetime,
            s if s.starts_with("str") => AttrType::String,
            _ => AttrType::Other(name.trim().to_string()),
        }
    }

    pub fn is_string(&self) -> bool {
        match self {
            AttrType::String => true,
            AttrType::Other(name) => name.to_ascii_lowercase().starts_with("str"),
            _ => false,
        }
    }

    /// Name of the server-side function that prints this type into a batch payload.
    /// `None` means the attribute is printed as is.
    pub(crate) fn to_string_udf(&self) -> Option<&'static str> {
        match self {
            AttrType::Int | AttrType::Uint => Some("int_to_string"),
            AttrType::Bool => Some("bool_to_string"),
            AttrType::Float | AttrType::Double => Some("float_to_string"),
            _ => None,
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::Int => write!(f, "INT"),
            AttrType::Uint => write!(f, "UINT"),
            AttrType::Float => write!(f, "FLOAT"),
            AttrType::Double => write!(f, "DOUBLE"),
            AttrType::Bool => write!(f, "BOOL"),
            AttrType::String => write!(f, "STRING"),
            AttrType::Datetime => write!(f, "DATETIME"),
            AttrType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Attribute name -> declared type for one vertex kind.
pub type AttrTypes = HashMap<String, AttrType>;

/// Vertex kinds in schema order, each with its attribute types.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    vertex_types: Vec<(String, AttrTypes)>,
}

impl SchemaSnapshot {
    pub fn new(vertex_types: Vec<(String, AttrTypes)>) -> Self {
        Self { vertex_types }
    }

    /// Builds a snapshot from the schema document returned by the database.
    pub fn from_schema_json(schema: &Value) -> Result<Self> {
        let vertex_types = schema
            .get("VertexTypes")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Schema document has no 'VertexTypes' array"))?;

        let mut snapshot = Vec::with_capacity(vertex_types.len());
        for vtype in vertex_types {
            let name = vtype
                .get("Name")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("Vertex type without a 'Name' in schema"))?;

            let mut attrs = AttrTypes::new();
            for attr in vtype
                .get("Attributes")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                let attr_name = attr
                    .get("AttributeName")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("Attribute without a name on vertex type {}", name))?;
                let attr_type = &attr["AttributeType"];
                let type_name = attr_type
                    .get("ValueTypeName")
                    .or_else(|| attr_type.get("Name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        anyhow!("Attribute {}.{} has no type name", name, attr_name)
                    })?;
                attrs.insert(attr_name.to_string(), AttrType::parse(type_name));
            }

            let primary_id = &vtype["PrimaryId"];
            if primary_id["PrimaryIdAsAttribute"].as_bool().unwrap_or(false) {
                if let (Some(id_name), Some(id_type)) = (
                    primary_id["AttributeName"].as_str(),
                    primary_id["AttributeType"]["Name"].as_str(),
                ) {
                    attrs.insert(id_name.to_string(), AttrType::parse(id_type));
                }
            }

            snapshot.push((name.to_string(), attrs));
        }

        Ok(Self {
            vertex_types: snapshot,
        })
    }

    pub fn vertex_types(&self) -> impl Iterator<Item = &str> {
        self.vertex_types.iter().map(|(name, _)| name.as_str())
    }

    pub fn attributes_of(&self, vertex_type: &str) -> Option<&AttrTypes> {
        self.vertex_types
            .iter()
            .find(|(name, _)| name == vertex_type)
            .map(|(_, attrs)| attrs)
    }

    /// Attribute types used for decoding.
    ///
    /// Loaders work on homogeneous graphs, so the first vertex kind is authoritative.
    pub fn attr_types(&self) -> AttrTypes {
        self.vertex_types
            .first()
            .map(|(_, attrs)| attrs.clone())
            .unwrap_or_default()
    }

    /// Trims the requested names and checks that every vertex kind carries them all.
    pub fn validate_attributes(&self, attributes: &[String]) -> Result<Vec<String>> {
        let attributes: Vec<String> = attributes.iter().map(|a| a.trim().to_string()).collect();
        if attributes.is_empty() {
            return Ok(attributes);
        }

        for (vertex_type, allowed) in &self.vertex_types {
            let missing: Vec<String> = attributes
                .iter()
                .filter(|a| !allowed.contains_key(a.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(LoaderError::InvalidAttribute {
                    vertex_type: vertex_type.clone(),
                    missing,
                }
                .into());
            }
        }
        Ok(attributes)
    }
}
