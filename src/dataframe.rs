//! DataFrame Module
//!
//! A small tabular object with named columns, built from fetched rows. It
//! renders as an aligned text table and exports to CSV, JSON and Markdown.

use crate::core::db::record::Record;
use crate::core::db::value::Value;
use crate::core::{ConnectorError, Result};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            _ => Err(ConnectorError::Validation(format!(
                "Unsupported export format: '{}'. Supported formats: csv, json, markdown",
                s
            ))),
        }
    }
}

/// Rows of values under named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DataFrame {
    /// Creates a frame from column names and row-major data.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::Validation` if any row's width differs from
    /// the number of columns.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(ConnectorError::Validation(format!(
                "{} columns passed, row {} has {} values",
                columns.len(),
                index,
                row.len()
            )));
        }
        Ok(DataFrame { columns, rows })
    }

    /// An empty frame with the given columns.
    pub fn empty(columns: Vec<String>) -> Self {
        DataFrame {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of a column, top to bottom. Uses the first column with that name.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| Record::from_row(&self.columns, row.clone()))
            .collect()
    }

    /// Renders the frame as a text table with padded columns.
    pub fn render(&self) -> String {
        if self.columns.is_empty() {
            return String::new();
        }

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, header)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let pad = |items: &[String]| -> String {
            items
                .iter()
                .zip(&widths)
                .map(|(item, width)| format!("{:<width$}", item, width = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut output = String::new();
        output.push_str(&pad(&self.columns));
        output.push('\n');
        let underline: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        output.push_str(&underline.join("-+-"));
        output.push('\n');
        for row in &cells {
            output.push_str(&pad(row));
            output.push('\n');
        }
        output
    }

    /// Exports the frame in the given format.
    ///
    /// # Errors
    ///
    /// JSON export writes one object per row, so it returns
    /// `ConnectorError::Validation` when two columns share a name.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Csv => Ok(self.export_to_csv()),
            ExportFormat::Json => self.export_to_json(),
            ExportFormat::Markdown => Ok(self.export_to_markdown()),
        }
    }

    fn export_to_csv(&self) -> String {
        let mut output = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| csv_field(c)).collect();
        output.push_str(&header.join(","));
        output.push('\n');
        for row in &self.rows {
            let fields: Vec<String> = row
                .iter()
                .map(|v| match v {
                    Value::Null => String::new(),
                    other => csv_field(&other.to_string()),
                })
                .collect();
            output.push_str(&fields.join(","));
            output.push('\n');
        }
        output
    }

    fn export_to_json(&self) -> Result<String> {
        let mut seen = HashSet::new();
        if let Some(name) = self.columns.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(ConnectorError::Validation(format!(
                "Column '{}' appears more than once; JSON records need unique column names",
                name
            )));
        }
        Ok(serde_json::to_string(&self.to_records())?)
    }

    fn export_to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("| {} |\n", self.columns.join(" | ")));
        let underline: Vec<String> = self
            .columns
            .iter()
            .map(|c| "-".repeat(c.chars().count().max(3)))
            .collect();
        output.push_str(&format!("| {} |\n", underline.join(" | ")));
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|v| v.to_string().replace('|', "\\|"))
                .collect();
            output.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        output
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl Serialize for DataFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut frame = serializer.serialize_struct("DataFrame", 2)?;
        frame.serialize_field("columns", &self.columns)?;
        frame.serialize_field("data", &self.rows)?;
        frame.end()
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') || raw.contains('\r') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
