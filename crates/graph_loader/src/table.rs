//! src/table.rs
//!
//! Column-oriented table parsed from a headerless CSV payload.
//!
//! Column types are inferred the way a dataframe reader does it:
//! - every non-empty cell is an integer and no cell is empty -> `Int`
//! - every non-empty cell is a number -> `Float` (empty cells become NaN)
//! - otherwise -> `Str`, cells kept verbatim (no trimming)
//!
//! Vector attributes arrive as a single space separated cell (`"1 0 0 1 "`),
//! so they infer as `Str` and are only split when turned into tensors.

use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell rendered back to text. Used for id lookups and string attributes.
    pub fn text(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Int(v) => v.get(row).map(|x| x.to_string()),
            ColumnData::Float(v) => v.get(row).map(|x| x.to_string()),
            ColumnData::Str(v) => v.get(row).cloned(),
        }
    }

    fn infer(cells: Vec<String>) -> Self {
        let any_empty = cells.iter().any(|c| c.is_empty());

        if !any_empty {
            let ints: Option<Vec<i64>> = cells.iter().map(|c| c.parse().ok()).collect();
            if let Some(ints) = ints {
                return ColumnData::Int(ints);
            }
        }

        let floats: Option<Vec<f64>> = cells
            .iter()
            .map(|c| {
                if c.is_empty() {
                    Some(f64::NAN)
                } else {
                    c.parse().ok()
                }
            })
            .collect();
        match floats {
            Some(floats) if !cells.is_empty() && !cells.iter().all(|c| c.is_empty()) => {
                ColumnData::Float(floats)
            }
            _ => ColumnData::Str(cells),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// A decoded batch in tabular form.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    /// Builds a table from already typed columns. All columns must have the same length.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.data.len() != num_rows) {
            return Err(anyhow!(
                "Column '{}' has {} rows, expected {}",
                bad.name,
                bad.data.len(),
                num_rows
            ));
        }
        Ok(Self { columns, num_rows })
    }

    /// Parses a headerless CSV payload using `names` as column names.
    ///
    /// Short rows are padded with empty cells. A row with more fields than
    /// names is an error.
    pub fn from_csv(raw: &[u8], names: &[String]) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(raw);

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Malformed CSV record at row {}", row))?;
            if record.len() > names.len() {
                return Err(anyhow!(
                    "Row {} has {} fields but only {} columns are expected ({:?})",
                    row,
                    record.len(),
                    names.len(),
                    names
                ));
            }
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(record.get(i).unwrap_or("").to_string());
            }
        }

        let columns = names
            .iter()
            .zip(cells)
            .map(|(name, cells)| Column {
                name: name.clone(),
                data: ColumnData::infer(cells),
            })
            .collect();
        Self::new(columns)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Result<&ColumnData> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.data)
            .ok_or_else(|| anyhow!("Column '{}' not found in table", name))
    }
}
