// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the hiden-rga project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Reply classification and reshaping of MASsoft text into tables
//!
//! MASsoft answers with bare text: `1` for success, `0` for failure or
//! "not ready yet", otherwise tab separated fields with CRLF between rows.

use std::collections::HashMap;

use log::debug;

use super::error::{MassoftError, MassoftResult};

/// Number of columns in a `-lScanParameters` table
pub const SCAN_PARAMETER_COLUMNS: usize = 11;

/// Meaning of a single-line reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// `1`
    Accepted,
    /// `0`
    Rejected,
    /// Nothing arrived before the timeout
    NoReply,
    /// Anything else, e.g. a filename or a status word
    Payload(String),
}

impl Ack {
    pub fn classify(reply: &str) -> Self {
        match reply.trim() {
            "1" => Ack::Accepted,
            "0" => Ack::Rejected,
            "" => Ack::NoReply,
            other => Ack::Payload(other.to_string()),
        }
    }

    /// `0` and silence are both failures for MASsoft
    pub fn is_failure(&self) -> bool {
        matches!(self, Ack::Rejected | Ack::NoReply)
    }
}

/// One row of a data hotlink
#[derive(Debug, Clone, PartialEq)]
pub enum DataRow {
    Numeric(Vec<f64>),
    /// Rows requested with time formatting keep their text fields
    Formatted(Vec<String>),
}

impl DataRow {
    pub fn len(&self) -> usize {
        match self {
            DataRow::Numeric(values) => values.len(),
            DataRow::Formatted(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            DataRow::Numeric(values) => Some(values),
            DataRow::Formatted(_) => None,
        }
    }
}

/// Rows of text fields under named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of the named column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.headers.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    /// Column-major view keyed by header
    pub fn to_columns(&self) -> HashMap<String, Vec<String>> {
        let mut columns: HashMap<String, Vec<String>> = self
            .headers
            .iter()
            .map(|h| (h.clone(), Vec::with_capacity(self.rows.len())))
            .collect();
        for row in &self.rows {
            for (index, header) in self.headers.iter().enumerate() {
                if let Some(column) = columns.get_mut(header) {
                    column.push(row.get(index).cloned().unwrap_or_default());
                }
            }
        }
        columns
    }

    /// Parse every cell of the named column as a number
    pub fn numeric_column(&self, name: &str) -> MassoftResult<Vec<f64>> {
        let column = self
            .column(name)
            .ok_or_else(|| MassoftError::Parse(format!("no column named {name:?}")))?;
        column
            .into_iter()
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|_| MassoftError::Parse(format!("{cell:?} in column {name:?}")))
            })
            .collect()
    }
}

/// Turn CRLF row breaks into tabs and split on tabs
pub fn split_fields(raw: &str) -> Vec<String> {
    raw.replace("\r\n", "\t")
        .split('\t')
        .map(str::to_string)
        .collect()
}

/// Split a legends reply into column names
///
/// Tabbed replies are split on tabs; a plain line is split on whitespace
/// with double-quoted groups kept whole. Quotes are removed.
pub fn parse_legends(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let fields: Vec<String> = if raw.contains('\t') || raw.contains("\r\n") {
        split_fields(raw)
    } else {
        split_quoted(raw)
    };

    fields
        .into_iter()
        .map(|field| field.trim().trim_matches('"').to_string())
        .filter(|field| !field.is_empty())
        .collect()
}

fn split_quoted(raw: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in raw.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    fields.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}

/// Extract channel masses from legends such as `mass 28`
pub fn parse_masses(legends: &[String], limit: usize) -> Vec<f64> {
    legends
        .iter()
        .filter(|legend| legend.to_lowercase().contains("mass"))
        .filter_map(|legend| {
            let last = legend.split_whitespace().last()?;
            match last.parse::<f64>() {
                Ok(mass) => Some(mass),
                Err(_) => {
                    debug!("Legend {:?} carries no numeric mass", legend);
                    None
                }
            }
        })
        .take(limit)
        .collect()
}

/// Reshape a scan-parameter listing: the first `width` fields are the
/// headers, the rest are rows of `width` fields
pub fn parse_scan_parameters(raw: &str, width: usize) -> DataTable {
    let fields = split_fields(raw.trim());
    if width == 0 || fields.len() < width {
        return DataTable::new(fields);
    }

    let headers = fields[..width].to_vec();
    let rows = fields[width..]
        .chunks(width)
        .map(|chunk| {
            let mut row = chunk.to_vec();
            row.resize(width, String::new());
            row
        })
        .collect();

    DataTable { headers, rows }
}

/// Drop the `1`/`0` acknowledgement MASsoft sends ahead of a data listing
pub fn strip_ack_line(raw: &str) -> &str {
    let raw = raw.trim_start();
    let (first, rest) = raw.split_once('\n').unwrap_or((raw, ""));
    match Ack::classify(first) {
        Ack::Accepted | Ack::Rejected => rest,
        _ => raw,
    }
}

/// Parse a block of data lines against known headers
///
/// A line holding only `0` is MASsoft's "nothing yet" marker and is
/// ignored, as are lines with fewer values than there are headers.
pub fn parse_data_block(raw: &str, headers: &[String]) -> DataTable {
    let mut table = DataTable::new(headers.to_vec());

    for line in raw.trim().lines() {
        let line = line.trim();
        if line == "0" {
            debug!("Ignoring line with '0'");
            continue;
        }
        let values: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if values.len() < headers.len() || values.is_empty() {
            debug!("Line skipped due to insufficient values: {}", line);
            continue;
        }
        table.rows.push(values);
    }

    table
}

/// Parse one line streamed by a data hotlink
///
/// Returns `None` for lines with fewer than two fields (acks, blanks).
pub fn parse_data_line(line: &str, formatted: bool) -> MassoftResult<Option<DataRow>> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return Ok(None);
    }

    if formatted {
        return Ok(Some(DataRow::Formatted(
            parts.into_iter().map(str::to_string).collect(),
        )));
    }

    let values = parts
        .iter()
        .map(|part| {
            part.parse::<f64>()
                .map_err(|_| MassoftError::Parse(format!("{part:?} in data line {line:?}")))
        })
        .collect::<MassoftResult<Vec<f64>>>()?;
    Ok(Some(DataRow::Numeric(values)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ack_classification() {
        assert_eq!(Ack::classify("1"), Ack::Accepted);
        assert_eq!(Ack::classify(" 0 "), Ack::Rejected);
        assert_eq!(Ack::classify(""), Ack::NoReply);
        assert_eq!(
            Ack::classify("file56.exp"),
            Ack::Payload("file56.exp".to_string())
        );
        assert!(Ack::classify("").is_failure());
        assert!(!Ack::classify("1").is_failure());
    }

    #[test]
    fn legends_tabbed_and_quoted() {
        assert_eq!(
            parse_legends("Cycle\tmass 28\tmass 32\r\n"),
            strings(&["Cycle", "mass 28", "mass 32"])
        );
        assert_eq!(
            parse_legends(r#""mass 2" "mass 18" Time"#),
            strings(&["mass 2", "mass 18", "Time"])
        );
    }

    #[test]
    fn masses_are_taken_from_mass_legends_only() {
        let legends = strings(&["Time", "Mass 2", "mass 28", "mass total", "MASS 44.5"]);
        assert_eq!(parse_masses(&legends, 10), vec![2.0, 28.0, 44.5]);
        assert_eq!(parse_masses(&legends, 2), vec![2.0, 28.0]);
    }

    #[test]
    fn scan_parameters_are_chunked_by_width() {
        let header: Vec<String> = (0..11).map(|i| format!("H{i}")).collect();
        let row1: Vec<String> = (0..11).map(|i| format!("a{i}")).collect();
        let row2: Vec<String> = (0..11).map(|i| format!("b{i}")).collect();
        let raw = format!(
            "{}\r\n{}\r\n{}",
            header.join("\t"),
            row1.join("\t"),
            row2.join("\t")
        );

        let table = parse_scan_parameters(&raw, SCAN_PARAMETER_COLUMNS);
        assert_eq!(table.headers, header);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("H3"), Some(vec!["a3", "b3"]));
        assert_eq!(table.to_columns()["H10"], strings(&["a10", "b10"]));
    }

    #[test]
    fn scan_parameters_pad_partial_rows() {
        let table = parse_scan_parameters("A\tB\tC\r\n1\t2", 3);
        assert_eq!(table.rows, vec![strings(&["1", "2", ""])]);
    }

    #[test]
    fn data_block_skips_markers_and_short_lines() {
        let headers = strings(&["mass 2", "mass 28"]);
        let table = parse_data_block("0\r\n1.5e-9 2.0e-7\r\n3.0\r\n4 5 6\r\n", &headers);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0], strings(&["1.5e-9", "2.0e-7"]));
        assert_eq!(table.numeric_column("mass 28").unwrap(), vec![2.0e-7, 5.0]);
    }

    #[test]
    fn ack_line_is_stripped_from_data_listing() {
        assert_eq!(strip_ack_line("1\r\n1.2e-9\r\n1.3e-9"), "1.2e-9\r\n1.3e-9");
        assert_eq!(strip_ack_line("0"), "");
        assert_eq!(strip_ack_line("1.2e-9\r\n1.3e-9"), "1.2e-9\r\n1.3e-9");

        let headers = strings(&["mass 28"]);
        let table = parse_data_block(strip_ack_line("1\r\n1.2e-9\r\n1.3e-9"), &headers);
        assert_eq!(table.numeric_column("mass 28").unwrap(), vec![1.2e-9, 1.3e-9]);
    }

    #[test]
    fn data_lines_numeric_and_formatted() {
        assert_eq!(parse_data_line("1", false).unwrap(), None);
        assert_eq!(
            parse_data_line("1.0 2.5e-8", false).unwrap(),
            Some(DataRow::Numeric(vec![1.0, 2.5e-8]))
        );
        assert_eq!(
            parse_data_line("12:00:01 2.5e-8", true).unwrap(),
            Some(DataRow::Formatted(strings(&["12:00:01", "2.5e-8"])))
        );
        assert!(parse_data_line("12:00:01 2.5e-8", false).is_err());
    }
}
