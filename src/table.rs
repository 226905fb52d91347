// src/table.rs

use anyhow::{bail, Result};

/// A single cell as read from a workbook sheet.
///
/// Error cells (`#N/A` and friends) come through as `Float(NaN)`, the same
/// value a blank numeric read produces, so one correction path covers both.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

impl Cell {
    /// Render the cell for a VARCHAR staging column. `Float(NaN)` renders as
    /// the literal `"NaN"`; the loader's null-correction phase turns those
    /// back into true NULLs downstream.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Int(v) => Some(v.to_string()),
            Cell::Float(v) => Some(v.to_string()),
            Cell::Null => None,
        }
    }

    /// Coerce to a 64-bit integer. Finite floats truncate; numeric text
    /// parses; NaN, non-numeric text, and empty cells are errors.
    pub fn to_i64(&self) -> Result<Option<i64>> {
        match self {
            Cell::Int(v) => Ok(Some(*v)),
            Cell::Float(v) if v.is_finite() => Ok(Some(*v as i64)),
            Cell::Float(v) => bail!("cannot convert {} to an integer", v),
            Cell::Text(s) => match s.trim().parse::<i64>() {
                Ok(v) => Ok(Some(v)),
                Err(_) => match s.trim().parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(Some(v as i64)),
                    _ => bail!("cannot convert {:?} to an integer", s),
                },
            },
            Cell::Null => Ok(None),
        }
    }

    pub fn to_f64(&self) -> Result<Option<f64>> {
        match self {
            Cell::Int(v) => Ok(Some(*v as f64)),
            Cell::Float(v) => Ok(Some(*v)),
            Cell::Text(s) => match s.trim().parse::<f64>() {
                Ok(v) => Ok(Some(v)),
                Err(_) => bail!("cannot convert {:?} to a number", s),
            },
            Cell::Null => Ok(None),
        }
    }
}

/// Column headers plus rows of cells. The unit of data handed from the
/// extractor to the transformer to the loader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrimeTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl CrimeTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the named column, if present.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Append another table, aligning columns by name. Columns the other
    /// table lacks are null-filled, new columns are added at the end and
    /// back-filled with nulls — the union behavior of a frame concat.
    pub fn append(&mut self, other: CrimeTable) {
        for header in &other.headers {
            if self.column(header).is_none() {
                self.headers.push(header.clone());
                for row in &mut self.rows {
                    row.push(Cell::Null);
                }
            }
        }

        let mapping: Vec<Option<usize>> = self
            .headers
            .iter()
            .map(|h| other.headers.iter().position(|o| o == h))
            .collect();

        for row in other.rows {
            let aligned: Vec<Cell> = mapping
                .iter()
                .map(|m| match m {
                    Some(i) => row.get(*i).cloned().unwrap_or(Cell::Null),
                    None => Cell::Null,
                })
                .collect();
            self.rows.push(aligned);
        }
    }
}
