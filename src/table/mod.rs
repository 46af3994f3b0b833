//! Record table: schema-typed columnar storage for listings.
//!
//! A [`Dataset`] holds an ordered sequence of records conforming to one
//! [`Schema`]. Records are identified by their 0-based load position, which
//! stays stable for the table's lifetime. Components downstream (encoder,
//! tier builder, cluster trainer) attach derived columns; the base schema
//! never changes after load.

use crate::error::{PredioError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrType {
    /// Continuous numeric (area, price).
    Continuous,
    /// Discrete numeric (rooms, floors).
    Discrete,
    /// Boolean flag (has_garden).
    Flag,
    /// Nominal category (type, location).
    Nominal,
}

impl AttrType {
    /// True for types that enter the feature matrix directly as numbers.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, AttrType::Continuous | AttrType::Discrete | AttrType::Flag)
    }
}

/// A single typed cell value.
///
/// `Missing` is only legal before preprocessing; imputation fills every
/// attribute used downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Continuous numeric value.
    Float(f64),
    /// Discrete numeric value.
    Int(i64),
    /// Boolean flag.
    Bool(bool),
    /// Nominal category.
    Text(String),
    /// Absent value (pre-imputation only).
    Missing,
}

impl Value {
    /// Returns true if the value is missing.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the value: floats as-is, ints widened, flags as 0/1.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(_) | Value::Missing => None,
        }
    }

    /// Text view of the value, for nominal attributes.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Ordered attribute-name to attribute-type mapping, fixed at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    attrs: Vec<(String, AttrType)>,
}

impl Schema {
    /// Creates a schema from an ordered list of (name, type) pairs.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the list is empty or contains duplicates.
    pub fn new(attrs: Vec<(String, AttrType)>) -> Result<Self> {
        if attrs.is_empty() {
            return Err(PredioError::schema("schema must declare at least one attribute"));
        }
        let mut names: Vec<&str> = attrs.iter().map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                return Err(PredioError::schema(format!(
                    "duplicate attribute '{}' in schema",
                    pair[0]
                )));
            }
        }
        Ok(Self { attrs })
    }

    /// Number of declared attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// True if no attributes are declared (never the case post-construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Declared type of an attribute, if present.
    #[must_use]
    pub fn attr_type(&self, name: &str) -> Option<AttrType> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    /// Attribute names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.attrs.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Iterates over (name, type) pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, AttrType)> {
        self.attrs.iter().map(|(n, t)| (n.as_str(), *t))
    }
}

/// Descriptive statistics for one numeric column.
#[derive(Debug, Clone)]
pub struct ColumnSummary {
    /// Column name.
    pub name: String,
    /// Number of populated values.
    pub count: usize,
    /// Number of missing values.
    pub missing: usize,
    /// Mean of populated values.
    pub mean: f64,
    /// Minimum populated value.
    pub min: f64,
    /// Median of populated values.
    pub median: f64,
    /// Maximum populated value.
    pub max: f64,
}

/// Ordered collection of schema-conformant records, plus derived columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    schema: Schema,
    columns: Vec<Vec<Value>>,
    derived: Vec<(String, Vec<Value>)>,
    n_rows: usize,
}

impl Dataset {
    /// Builds a dataset from a structured record list.
    ///
    /// Every record must carry exactly the schema's attributes; extra or
    /// missing keys are a load-time error.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the list is empty, a record's keys don't
    /// match the schema, or a value doesn't fit its declared type.
    pub fn from_records(schema: Schema, records: &[BTreeMap<String, Value>]) -> Result<Self> {
        if records.is_empty() {
            return Err(PredioError::schema("empty dataset: no records to load"));
        }

        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(records.len()); schema.len()];

        for (row, record) in records.iter().enumerate() {
            if record.len() != schema.len() {
                return Err(PredioError::schema(format!(
                    "record {row} has {} attributes, schema declares {}",
                    record.len(),
                    schema.len()
                )));
            }
            for (col, (name, ty)) in schema.iter().enumerate() {
                let raw = record.get(name).ok_or_else(|| {
                    PredioError::schema(format!("record {row} is missing attribute '{name}'"))
                })?;
                columns[col].push(coerce_value(raw, ty).ok_or_else(|| {
                    PredioError::schema(format!(
                        "record {row}, attribute '{name}': value {raw:?} does not fit {ty:?}"
                    ))
                })?);
            }
        }

        let n_rows = records.len();
        Ok(Self {
            schema,
            columns,
            derived: Vec::new(),
            n_rows,
        })
    }

    /// Loads a dataset from a delimited text file.
    ///
    /// The header must match the declared schema exactly (as a set; column
    /// order may differ). Empty cells become [`Value::Missing`].
    ///
    /// # Errors
    ///
    /// Returns a schema error for a non-`.csv` extension, mismatched header,
    /// unparseable cell, or empty table; I/O errors pass through.
    pub fn from_csv_path<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !ext.eq_ignore_ascii_case("csv") {
            return Err(PredioError::schema(format!(
                "unsupported ingestion format '.{ext}', expected .csv or .json"
            )));
        }

        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| PredioError::schema(format!("failed to open CSV: {e}")))?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| PredioError::schema(format!("unreadable CSV header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        check_header(&headers, &schema)?;

        // Header position -> schema column index.
        let positions: Vec<usize> = schema
            .names()
            .iter()
            .map(|n| {
                headers
                    .iter()
                    .position(|h| h.as_str() == *n)
                    .expect("header checked above")
            })
            .collect();

        let mut columns: Vec<Vec<Value>> = vec![Vec::new(); schema.len()];
        for (row, result) in reader.records().enumerate() {
            let record =
                result.map_err(|e| PredioError::schema(format!("unreadable CSV row {row}: {e}")))?;
            for (col, (name, ty)) in schema.iter().enumerate() {
                let cell = record.get(positions[col]).unwrap_or("");
                columns[col].push(parse_cell(cell, ty).ok_or_else(|| {
                    PredioError::schema(format!(
                        "row {row}, attribute '{name}': cell '{cell}' does not fit {ty:?}"
                    ))
                })?);
            }
        }

        let n_rows = columns.first().map_or(0, Vec::len);
        if n_rows == 0 {
            return Err(PredioError::schema("empty dataset: CSV has no data rows"));
        }
        Ok(Self {
            schema,
            columns,
            derived: Vec::new(),
            n_rows,
        })
    }

    /// Loads a dataset from a JSON file holding an array of objects.
    ///
    /// # Errors
    ///
    /// Returns a schema error for a non-`.json` extension, malformed JSON,
    /// keys that don't match the schema, or an empty array.
    pub fn from_json_path<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !ext.eq_ignore_ascii_case("json") {
            return Err(PredioError::schema(format!(
                "unsupported ingestion format '.{ext}', expected .csv or .json"
            )));
        }

        let text = std::fs::read_to_string(path)?;
        let parsed: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&text)
                .map_err(|e| PredioError::schema(format!("malformed JSON record list: {e}")))?;

        let records: Vec<BTreeMap<String, Value>> = parsed
            .iter()
            .enumerate()
            .map(|(row, obj)| {
                obj.iter()
                    .map(|(k, v)| {
                        let ty = schema.attr_type(k).ok_or_else(|| {
                            PredioError::schema(format!(
                                "record {row} has attribute '{k}' not in schema"
                            ))
                        })?;
                        Ok((k.clone(), json_to_value(v, ty, row, k)?))
                    })
                    .collect()
            })
            .collect::<Result<_>>()?;

        Self::from_records(schema, &records)
    }

    /// Number of records.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// The declared schema.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Looks up a column by name, searching base attributes then derived.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.schema
            .names()
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.columns[idx].as_slice())
            .or_else(|| {
                self.derived
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.as_slice())
            })
    }

    /// True if a base or derived column with this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Names of derived columns in attachment order.
    #[must_use]
    pub fn derived_names(&self) -> Vec<&str> {
        self.derived.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Replaces every value of a base column (used by imputation).
    ///
    /// # Errors
    ///
    /// Returns a schema error if the column doesn't exist or lengths differ.
    pub(crate) fn replace_column(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.n_rows {
            return Err(PredioError::schema(format!(
                "replacement column '{name}' has {} values, table has {} rows",
                values.len(),
                self.n_rows
            )));
        }
        let idx = self
            .schema
            .names()
            .iter()
            .position(|n| *n == name)
            .ok_or_else(|| PredioError::schema(format!("column '{name}' not found")))?;
        self.columns[idx] = values;
        Ok(())
    }

    /// Attaches (or overwrites) a derived column.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the name collides with a base attribute or
    /// the length doesn't match the table.
    pub fn set_derived(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if self.schema.attr_type(name).is_some() {
            return Err(PredioError::schema(format!(
                "derived column '{name}' collides with a schema attribute"
            )));
        }
        if values.len() != self.n_rows {
            return Err(PredioError::schema(format!(
                "derived column '{name}' has {} values, table has {} rows",
                values.len(),
                self.n_rows
            )));
        }
        if let Some(entry) = self.derived.iter_mut().find(|(n, _)| n == name) {
            entry.1 = values;
        } else {
            self.derived.push((name.to_string(), values));
        }
        Ok(())
    }

    /// Materializes one record (base + derived attributes) by its ordinal id.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the id is out of range.
    pub fn record(&self, id: usize) -> Result<BTreeMap<String, Value>> {
        if id >= self.n_rows {
            return Err(PredioError::validation(format!(
                "record id {id} out of range (table has {} rows)",
                self.n_rows
            )));
        }
        let mut out = BTreeMap::new();
        for (idx, (name, _)) in self.schema.iter().enumerate() {
            out.insert(name.to_string(), self.columns[idx][id].clone());
        }
        for (name, values) in &self.derived {
            out.insert(name.clone(), values[id].clone());
        }
        Ok(out)
    }

    /// Descriptive statistics for every numeric column.
    #[must_use]
    pub fn describe(&self) -> Vec<ColumnSummary> {
        self.schema
            .iter()
            .filter(|(_, ty)| matches!(ty, AttrType::Continuous | AttrType::Discrete))
            .filter_map(|(name, _)| {
                let col = self.column(name)?;
                let mut values: Vec<f64> = col.iter().filter_map(Value::as_f64).collect();
                let missing = col.len() - values.len();
                if values.is_empty() {
                    return Some(ColumnSummary {
                        name: name.to_string(),
                        count: 0,
                        missing,
                        mean: 0.0,
                        min: 0.0,
                        median: 0.0,
                        max: 0.0,
                    });
                }
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let count = values.len();
                let mean = values.iter().sum::<f64>() / count as f64;
                let median = if count % 2 == 0 {
                    (values[count / 2 - 1] + values[count / 2]) / 2.0
                } else {
                    values[count / 2]
                };
                Some(ColumnSummary {
                    name: name.to_string(),
                    count,
                    missing,
                    mean,
                    min: values[0],
                    median,
                    max: values[count - 1],
                })
            })
            .collect()
    }
}

fn check_header(headers: &[String], schema: &Schema) -> Result<()> {
    for name in schema.names() {
        if !headers.iter().any(|h| h.as_str() == name) {
            return Err(PredioError::schema(format!(
                "CSV header is missing declared attribute '{name}'"
            )));
        }
    }
    for header in headers {
        if schema.attr_type(header).is_none() {
            return Err(PredioError::schema(format!(
                "CSV header has column '{header}' not in schema"
            )));
        }
    }
    Ok(())
}

/// Coerces an already-typed value to the declared attribute type.
///
/// Numeric cross-coercions (int to float and back for integral floats) are
/// accepted; anything else is a mismatch.
fn coerce_value(value: &Value, ty: AttrType) -> Option<Value> {
    match (value, ty) {
        (Value::Missing, _) => Some(Value::Missing),
        (Value::Float(v), AttrType::Continuous) => Some(Value::Float(*v)),
        (Value::Int(v), AttrType::Continuous) => Some(Value::Float(*v as f64)),
        (Value::Int(v), AttrType::Discrete) => Some(Value::Int(*v)),
        (Value::Float(v), AttrType::Discrete) if v.fract() == 0.0 => Some(Value::Int(*v as i64)),
        (Value::Bool(b), AttrType::Flag) => Some(Value::Bool(*b)),
        (Value::Text(s), AttrType::Nominal) => Some(Value::Text(s.clone())),
        _ => None,
    }
}

/// Parses a CSV cell according to the declared type. Empty cells are missing.
fn parse_cell(cell: &str, ty: AttrType) -> Option<Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(Value::Missing);
    }
    match ty {
        AttrType::Continuous => cell.parse::<f64>().ok().map(Value::Float),
        AttrType::Discrete => cell.parse::<i64>().ok().map(Value::Int),
        AttrType::Flag => match cell {
            "true" | "True" | "1" => Some(Value::Bool(true)),
            "false" | "False" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        AttrType::Nominal => Some(Value::Text(cell.to_string())),
    }
}

fn json_to_value(v: &serde_json::Value, ty: AttrType, row: usize, name: &str) -> Result<Value> {
    let mismatch = || {
        PredioError::schema(format!(
            "record {row}, attribute '{name}': JSON value {v} does not fit {ty:?}"
        ))
    };
    match v {
        serde_json::Value::Null => Ok(Value::Missing),
        serde_json::Value::Number(n) => match ty {
            AttrType::Continuous => n.as_f64().map(Value::Float).ok_or_else(mismatch),
            AttrType::Discrete => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| Value::Int(f as i64)))
                .ok_or_else(mismatch),
            _ => Err(mismatch()),
        },
        serde_json::Value::Bool(b) if ty == AttrType::Flag => Ok(Value::Bool(*b)),
        serde_json::Value::String(s) if ty == AttrType::Nominal => Ok(Value::Text(s.clone())),
        _ => Err(mismatch()),
    }
}
