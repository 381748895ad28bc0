//! Columnar metric tables

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::{flatten, Fields};

/// Wide table of metric rows, stored column by column.
///
/// Columns are the union of keys seen, in first-seen order. A row that
/// lacks a column holds an explicit `null` there, so every column has
/// exactly `num_rows` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricTable {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
    num_rows: usize,
    index: HashMap<String, usize>,
}

impl MetricTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from metric records, flattening nested keys with `sep`.
    pub fn from_records<'a, I>(records: I, sep: &str) -> Self
    where
        I: IntoIterator<Item = &'a Fields>,
    {
        let mut table = Self::new();
        for record in records {
            table.push_row(&flatten(record, sep));
        }
        table
    }

    /// Rebuild a table from stored columns.
    pub fn from_columns(columns: Vec<String>, data: Vec<Vec<Value>>) -> Result<Self> {
        if columns.len() != data.len() {
            return Err(Error::InvalidTable {
                message: format!("{} column names for {} columns", columns.len(), data.len()),
            });
        }
        let num_rows = data.first().map_or(0, Vec::len);
        let mut index = HashMap::with_capacity(columns.len());
        for (i, (name, column)) in columns.iter().zip(&data).enumerate() {
            if column.len() != num_rows {
                return Err(Error::InvalidTable {
                    message: format!(
                        "column '{name}' has {} rows, expected {num_rows}",
                        column.len()
                    ),
                });
            }
            if index.insert(name.clone(), i).is_some() {
                return Err(Error::InvalidTable {
                    message: format!("duplicate column '{name}'"),
                });
            }
        }
        Ok(Self {
            columns,
            data,
            num_rows,
            index,
        })
    }

    /// Append one row. Keys must already be flat.
    pub fn push_row(&mut self, row: &Fields) {
        for key in row.keys() {
            if !self.index.contains_key(key) {
                self.index.insert(key.clone(), self.columns.len());
                self.columns.push(key.clone());
                self.data.push(vec![Value::Null; self.num_rows]);
            }
        }
        for (name, column) in self.columns.iter().zip(self.data.iter_mut()) {
            column.push(row.get(name).cloned().unwrap_or(Value::Null));
        }
        self.num_rows += 1;
    }

    /// Append every row of `other` after the existing rows.
    pub fn append(&mut self, other: &MetricTable) {
        for row in other.rows() {
            self.push_row(&row);
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.index.get(name).map(|&i| self.data[i].as_slice())
    }

    /// Column-major data, aligned with [`MetricTable::columns`].
    pub fn data(&self) -> &[Vec<Value>] {
        &self.data
    }

    /// Row `i` as a map over every column.
    pub fn row(&self, i: usize) -> Option<Fields> {
        if i >= self.num_rows {
            return None;
        }
        Some(
            self.columns
                .iter()
                .zip(&self.data)
                .map(|(name, column)| (name.clone(), column[i].clone()))
                .collect(),
        )
    }

    pub fn rows(&self) -> impl Iterator<Item = Fields> + '_ {
        (0..self.num_rows).filter_map(move |i| self.row(i))
    }

    /// Numeric values of a column, skipping nulls and non-numbers.
    pub fn numeric_column(&self, name: &str) -> Vec<f64> {
        self.column(name)
            .map(|values| values.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default()
    }
}
