//! Column-oriented tabular dataset
//!
//! A deliberately small frame: enough to load a CSV, report shape, column
//! types and null counts, coerce a `date` column, and write the data back out
//! for the script runtime. Type names follow the ones analysts see in pandas
//! so diagnostics read the same on both sides.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Cell text treated as missing when loading CSV
const NULL_LITERALS: &[&str] = &[
    "", "#N/A", "#NA", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%Y%m%d",
    "%b %d %Y",
    "%b %d, %Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%a, %d %b %Y",
];

/// Layouts without a day; the first of the month is assumed
const MONTH_FORMATS: &[&str] = &["%Y-%m", "%Y/%m", "%m/%Y", "%b %Y", "%b-%Y"];

/// Output format for datetime cells
pub const DATETIME_DISPLAY: &str = "%Y-%m-%d %H:%M:%S";

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "float64")]
    Float64,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "datetime64[ns]")]
    DateTime,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Bool => "bool",
            DType::Object => "object",
            DType::DateTime => "datetime64[ns]",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Int64 | DType::Float64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Int(i) => write!(f, "{}", i),
            // Debug keeps the trailing ".0" so floats stay floats on reload
            Cell::Float(v) => write!(f, "{:?}", v),
            Cell::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Cell::Text(s) => f.write_str(s),
            Cell::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_DISPLAY)),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    dtype: DType,
    values: Vec<Cell>,
}

impl Column {
    /// Build a column from cells, inferring its type
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        let dtype = infer_cells(&values);
        let values = if dtype == DType::Float64 {
            values
                .into_iter()
                .map(|v| match v {
                    Cell::Int(i) => Cell::Float(i as f64),
                    other => other,
                })
                .collect()
        } else {
            values
        };
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    /// Build a column from raw CSV text (None = missing)
    pub fn from_raw(name: impl Into<String>, raw: Vec<Option<String>>) -> Self {
        let dtype = infer_raw(&raw);
        let values = raw
            .into_iter()
            .map(|value| match value {
                None => Cell::Null,
                Some(text) => parse_cell(text, dtype),
            })
            .collect();
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values
            .iter()
            .filter(|v| match v {
                Cell::Null => true,
                Cell::Float(f) => f.is_nan(),
                _ => false,
            })
            .count()
    }

    /// Non-null numeric values, or None for non-numeric columns
    pub fn numeric_values(&self) -> Option<Vec<f64>> {
        if !self.dtype.is_numeric() {
            return None;
        }
        Some(self.values.iter().filter_map(Cell::as_f64).collect())
    }
}

/// Tabular dataset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    columns: Vec<Column>,
    rows: usize,
}

impl DataFrame {
    /// Create a frame; all columns must have the same length and unique names
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        for (idx, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(Error::dataset(format!(
                    "Column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    rows
                )));
            }
            if columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(Error::dataset(format!("Duplicate column name '{}'", column.name)));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Load a CSV file with a header row
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_csv_reader(file)
    }

    /// Load CSV from any reader
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

        for record in rdr.records() {
            let record = record?;
            for (idx, field) in record.iter().enumerate() {
                if let Some(column) = raw.get_mut(idx) {
                    column.push(normalize_null(field));
                }
            }
        }

        let columns = headers
            .into_iter()
            .zip(raw)
            .map(|(name, values)| Column::from_raw(name, values))
            .collect();
        Self::new(columns)
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns.len())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| Error::dataset(format!("Column '{}' not found", name)))
    }

    pub fn dtypes(&self) -> Vec<(String, DType)> {
        self.columns.iter().map(|c| (c.name.clone(), c.dtype)).collect()
    }

    pub fn null_counts(&self) -> Vec<(String, usize)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.null_count()))
            .collect()
    }

    /// Convert a column to datetime in place.
    ///
    /// Returns Ok(false) when the column does not exist. A value that cannot
    /// be parsed leaves the column untouched and returns an error.
    pub fn coerce_datetime(&mut self, name: &str) -> Result<bool> {
        let Some(column) = self.columns.iter_mut().find(|c| c.name == name) else {
            return Ok(false);
        };
        if column.dtype == DType::DateTime {
            return Ok(true);
        }

        let mut converted = Vec::with_capacity(column.values.len());
        for (row, value) in column.values.iter().enumerate() {
            let cell = match value {
                Cell::Null => Cell::Null,
                Cell::DateTime(dt) => Cell::DateTime(*dt),
                Cell::Text(text) => parse_datetime(text).map(Cell::DateTime).ok_or_else(|| {
                    Error::dataset(format!(
                        "Unknown datetime string format in column '{}' at row {}: {:?}",
                        name, row, text
                    ))
                })?,
                // Integers are Unix seconds
                Cell::Int(secs) => DateTime::from_timestamp(*secs, 0)
                    .map(|dt| Cell::DateTime(dt.naive_utc()))
                    .ok_or_else(|| {
                        Error::dataset(format!(
                            "Timestamp out of range in column '{}' at row {}: {}",
                            name, row, secs
                        ))
                    })?,
                other => {
                    return Err(Error::dataset(format!(
                        "Cannot convert {} in column '{}' at row {} to datetime",
                        other, name, row
                    )))
                }
            };
            converted.push(cell);
        }

        column.values = converted;
        column.dtype = DType::DateTime;
        Ok(true)
    }

    /// Distinct non-null values of a column, in order of first appearance
    pub fn unique_values(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.group_rows(name)?.into_iter().map(|(key, _)| key).collect())
    }

    /// Row indices grouped by the display value of a column
    pub fn group_rows(&self, name: &str) -> Result<Vec<(String, Vec<usize>)>> {
        let column = self.require_column(name)?;
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (row, value) in column.values.iter().enumerate() {
            if value.is_null() {
                continue;
            }
            let key = value.to_string();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((key, vec![row])),
            }
        }
        Ok(groups)
    }

    /// Write the frame as CSV with a header row
    pub fn to_csv_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in 0..self.rows {
            wtr.write_record(self.columns.iter().map(|c| c.values[row].to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.to_csv_writer(file)
    }
}

fn normalize_null(field: &str) -> Option<String> {
    let trimmed = field.trim();
    if NULL_LITERALS.contains(&trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

fn infer_raw(raw: &[Option<String>]) -> DType {
    let present: Vec<&str> = raw.iter().flatten().map(String::as_str).collect();
    let has_nulls = present.len() < raw.len();

    if present.is_empty() {
        DType::Float64
    } else if present.iter().all(|s| s.parse::<i64>().is_ok()) {
        // Missing values force integers to float, as pandas does
        if has_nulls {
            DType::Float64
        } else {
            DType::Int64
        }
    } else if present.iter().all(|s| s.parse::<f64>().is_ok()) {
        DType::Float64
    } else if !has_nulls && present.iter().all(|s| parse_bool(s).is_some()) {
        DType::Bool
    } else {
        DType::Object
    }
}

fn infer_cells(values: &[Cell]) -> DType {
    let (mut ints, mut floats, mut bools, mut texts, mut dates, mut nulls) =
        (false, false, false, false, false, false);
    for value in values {
        match value {
            Cell::Null => nulls = true,
            Cell::Int(_) => ints = true,
            Cell::Float(_) => floats = true,
            Cell::Bool(_) => bools = true,
            Cell::Text(_) => texts = true,
            Cell::DateTime(_) => dates = true,
        }
    }

    let kinds = [ints || floats, bools, texts, dates]
        .iter()
        .filter(|k| **k)
        .count();
    if kinds > 1 || texts {
        DType::Object
    } else if dates {
        DType::DateTime
    } else if bools {
        if nulls {
            DType::Object
        } else {
            DType::Bool
        }
    } else if ints && !floats && !nulls {
        DType::Int64
    } else {
        DType::Float64
    }
}

fn parse_cell(text: String, dtype: DType) -> Cell {
    match dtype {
        DType::Int64 => text.parse().map(Cell::Int).unwrap_or(Cell::Text(text)),
        DType::Float64 => text.parse().map(Cell::Float).unwrap_or(Cell::Text(text)),
        DType::Bool => parse_bool(&text).map(Cell::Bool).unwrap_or(Cell::Text(text)),
        DType::DateTime => parse_datetime(&text)
            .map(Cell::DateTime)
            .unwrap_or(Cell::Text(text)),
        DType::Object => Cell::Text(text),
    }
}

/// Parse the date and timestamp layouts commonly found in exported data
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let text = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    let first_of_month = format!("{} 1", text);
    for format in MONTH_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&first_of_month, &format!("{} %d", format)) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
date,value,series,flag
2024-01-01,10,a,true
2024-01-02,,a,false
2024-01-01,20.5,b,true
2024-01-02,30,b,false
";

    #[test]
    fn test_load_infers_types() {
        let df = DataFrame::from_csv_reader(SAMPLE.as_bytes()).unwrap();

        assert_eq!(df.shape(), (4, 4));
        assert_eq!(df.column_names(), vec!["date", "value", "series", "flag"]);
        let dtypes: Vec<DType> = df.dtypes().into_iter().map(|(_, d)| d).collect();
        assert_eq!(
            dtypes,
            vec![DType::Object, DType::Float64, DType::Object, DType::Bool]
        );
    }

    #[test]
    fn test_null_counts() {
        let df = DataFrame::from_csv_reader(SAMPLE.as_bytes()).unwrap();
        let nulls: Vec<usize> = df.null_counts().into_iter().map(|(_, n)| n).collect();
        assert_eq!(nulls, vec![0, 1, 0, 0]);
    }

    #[test]
    fn test_integer_column_without_nulls() {
        let df = DataFrame::from_csv_reader("a\n1\n2\n3\n".as_bytes()).unwrap();
        assert_eq!(df.column("a").unwrap().dtype(), DType::Int64);
        assert_eq!(df.column("a").unwrap().numeric_values(), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_coerce_datetime() {
        let mut df = DataFrame::from_csv_reader(SAMPLE.as_bytes()).unwrap();

        assert!(df.coerce_datetime("date").unwrap());
        let column = df.column("date").unwrap();
        assert_eq!(column.dtype(), DType::DateTime);
        assert_eq!(column.values()[1].to_string(), "2024-01-02 00:00:00");

        // Second conversion is a no-op
        assert!(df.coerce_datetime("date").unwrap());
    }

    #[test]
    fn test_coerce_missing_column() {
        let mut df = DataFrame::from_csv_reader("a\n1\n".as_bytes()).unwrap();
        assert!(!df.coerce_datetime("date").unwrap());
    }

    #[test]
    fn test_coerce_unparseable_leaves_column() {
        let mut df = DataFrame::from_csv_reader("date\n2024-01-01\nyesterday\n".as_bytes()).unwrap();

        let err = df.coerce_datetime("date").unwrap_err();

        assert!(err.to_string().contains("yesterday"));
        assert_eq!(df.column("date").unwrap().dtype(), DType::Object);
    }

    #[test]
    fn test_parse_datetime_layouts() {
        assert!(parse_datetime("2024-03-01T12:30:00Z").is_some());
        assert!(parse_datetime("2024-03-01 12:30:00").is_some());
        assert!(parse_datetime("2024-03-01 12:30").is_some());
        assert!(parse_datetime("03/01/2024").is_some());
        assert!(parse_datetime("not a date").is_none());
    }

    #[test]
    fn test_parse_month_and_text_dates() {
        let jan = NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
        assert_eq!(parse_datetime("2024-01"), jan);
        assert_eq!(parse_datetime("Jan 2024"), jan);
        assert_eq!(parse_datetime("January 2024"), jan);

        let fifth = NaiveDate::from_ymd_opt(2024, 1, 5).and_then(|d| d.and_hms_opt(0, 0, 0));
        assert_eq!(parse_datetime("Jan 5 2024"), fifth);
        assert_eq!(parse_datetime("January 5, 2024"), fifth);
        assert_eq!(parse_datetime("5 Jan 2024"), fifth);
        assert!(parse_datetime("2024-13").is_none());
    }

    #[test]
    fn test_coerce_monthly_column() {
        let mut df =
            DataFrame::from_csv_reader("date,value\n2024-01,1\n2024-02,2\n".as_bytes()).unwrap();

        assert!(df.coerce_datetime("date").unwrap());
        let column = df.column("date").unwrap();
        assert_eq!(column.dtype(), DType::DateTime);
        assert_eq!(column.values()[1].to_string(), "2024-02-01 00:00:00");
    }

    #[test]
    fn test_group_rows_in_appearance_order() {
        let df = DataFrame::from_csv_reader(SAMPLE.as_bytes()).unwrap();
        let groups = df.group_rows("series").unwrap();
        assert_eq!(groups, vec![("a".to_string(), vec![0, 1]), ("b".to_string(), vec![2, 3])]);
        assert!(df.unique_values("missing").is_err());
    }

    #[test]
    fn test_mismatched_columns_rejected() {
        let result = DataFrame::new(vec![
            Column::new("a", vec![Cell::Int(1)]),
            Column::new("b", vec![Cell::Int(1), Cell::Int(2)]),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_column_new_promotes_ints_with_floats() {
        let column = Column::new("v", vec![Cell::Int(1), Cell::Float(2.5)]);
        assert_eq!(column.dtype(), DType::Float64);
        assert_eq!(column.values()[0], Cell::Float(1.0));
    }

    #[test]
    fn test_csv_writer_keeps_floats() {
        let df = DataFrame::new(vec![
            Column::new("v", vec![Cell::Float(1.0), Cell::Null]),
            Column::new("s", vec![Cell::Text("x".into()), Cell::Text("y".into())]),
        ])
        .unwrap();
        let mut out = Vec::new();
        df.to_csv_writer(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "v,s\n1.0,x\n,y\n");
    }
}
