//! Core value model, crosswalk types and schema-drift policy for statwalk.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "statwalk-core";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Value::Integer(_) => ColumnKind::Integer,
            Value::Float(_) => ColumnKind::Float,
            Value::Text(_) => ColumnKind::Text,
            Value::Boolean(_) => ColumnKind::Boolean,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Integer(v) => JsonValue::from(*v),
            Value::Float(v) => JsonValue::from(*v),
            Value::Text(s) => JsonValue::from(s.as_str()),
            Value::Boolean(b) => JsonValue::from(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            // Whole floats keep their decimal point so "1.0" and "1" stay distinct.
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
    Boolean,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    /// Value used for missing or unparsable cells: numerics fill with zero,
    /// text and boolean columns with empty text.
    pub fn missing_fill(self) -> Value {
        match self {
            ColumnKind::Integer => Value::Integer(0),
            ColumnKind::Float => Value::Float(0.0),
            ColumnKind::Text | ColumnKind::Boolean => Value::Text(String::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("source columns not found in table: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("row {row} has {actual} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NormalizedTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl NormalizedTable {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self, CoreError> {
        let expected = columns.len();
        if let Some((row, cells)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(CoreError::RowWidth {
                row,
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn record(&self, row: usize) -> Option<NormalizedRecord<'_>> {
        self.rows.get(row).map(|values| NormalizedRecord {
            columns: &self.columns,
            values,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = NormalizedRecord<'_>> {
        self.rows.iter().map(move |values| NormalizedRecord {
            columns: &self.columns,
            values,
        })
    }

    pub fn to_json_rows(&self) -> Vec<JsonValue> {
        self.records()
            .map(|r| JsonValue::Object(r.to_json()))
            .collect()
    }

    /// Prepend a deterministic id column built from `source_columns`.
    ///
    /// An existing column with the same name is replaced.
    pub fn with_id_column(&self, id_column: &str, source_columns: &[&str]) -> Result<Self, CoreError> {
        let missing = source_columns
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(CoreError::MissingColumns(missing));
        }
        let source_idx = source_columns
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        let keep = (0..self.columns.len())
            .filter(|&i| self.columns[i].name != id_column)
            .collect::<Vec<_>>();

        let mut columns = Vec::with_capacity(keep.len() + 1);
        columns.push(Column::text(id_column));
        columns.extend(keep.iter().map(|&i| self.columns[i].clone()));

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let parts = source_idx.iter().map(|&i| row[i].to_string()).collect::<Vec<_>>();
                let parts = parts.iter().map(String::as_str).collect::<Vec<_>>();
                let mut out = Vec::with_capacity(keep.len() + 1);
                out.push(Value::Text(deterministic_id(&parts).to_string()));
                out.extend(keep.iter().map(|&i| row[i].clone()));
                out
            })
            .collect();
        Ok(Self { columns, rows })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizedRecord<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> NormalizedRecord<'a> {
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        let columns = self.columns;
        let values = self.values;
        columns.iter().map(|c| c.name.as_str()).zip(values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> JsonMap<String, JsonValue> {
        self.iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }
}

pub fn deterministic_id(parts: &[&str]) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, parts.concat().as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("column count mismatch for {context}: expected {expected}, got {actual}. Columns: {columns:?}")]
pub struct SchemaDriftError {
    pub context: String,
    pub expected: usize,
    pub actual: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSchema {
    columns: Vec<String>,
}

impl ReferenceSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn from_table(table: &NormalizedTable) -> Self {
        Self::new(table.column_names().into_iter().map(ToString::to_string).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn enforce(&self, table: &NormalizedTable, context: &str) -> Result<(), SchemaDriftError> {
        if table.columns().len() == self.columns.len() {
            return Ok(());
        }
        Err(SchemaDriftError {
            context: context.to_string(),
            expected: self.columns.len(),
            actual: table.columns().len(),
            columns: table.column_names().into_iter().map(ToString::to_string).collect(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaGuard {
    reference: Option<ReferenceSchema>,
}

impl SchemaGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(reference: ReferenceSchema) -> Self {
        Self {
            reference: Some(reference),
        }
    }

    pub fn reference(&self) -> Option<&ReferenceSchema> {
        self.reference.as_ref()
    }

    pub fn observe(&mut self, table: &NormalizedTable, context: &str) -> Result<(), SchemaDriftError> {
        match &self.reference {
            Some(reference) => reference.enforce(table, context),
            None => {
                self.reference = Some(ReferenceSchema::from_table(table));
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySourceRecord {
    pub source_id: String,
    pub team: Option<String>,
    pub name_variants: Vec<String>,
    #[serde(default)]
    pub attributes: JsonMap<String, JsonValue>,
}

impl EntitySourceRecord {
    pub fn new(source_id: impl Into<String>, team: Option<String>, name_variants: Vec<String>) -> Self {
        Self {
            source_id: source_id.into(),
            team,
            name_variants,
            attributes: JsonMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: JsonMap<String, JsonValue>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn team_name(&self) -> Option<&str> {
        self.team.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ManualTeamAlias,
    FuzzyTeam,
    FuzzyPlayer,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchMethod::ManualTeamAlias => "manual",
            MatchMethod::FuzzyTeam => "fuzzy team",
            MatchMethod::FuzzyPlayer => "fuzzy player",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkEntry {
    pub source_a_id: String,
    pub source_b_id: String,
    pub method: MatchMethod,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedReason {
    NoTeam,
    NoCandidates,
    NoPlayerMatch,
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnmatchedReason::NoTeam => "no team",
            UnmatchedReason::NoCandidates => "no candidates",
            UnmatchedReason::NoPlayerMatch => "no player match",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedEntry {
    pub source_a_id: String,
    pub names: Vec<String>,
    pub team: String,
    pub reason: UnmatchedReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeCatalog {
    names: BTreeMap<i64, String>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: AsRef<str>,
    {
        let mut catalog = Self::new();
        for (id, name) in entries {
            catalog.insert(id, name.as_ref());
        }
        catalog
    }

    pub fn insert(&mut self, type_id: i64, name: &str) {
        let name = stat_name_to_snake_case(name);
        if !name.is_empty() {
            self.names.insert(type_id, name);
        }
    }

    pub fn name_for(&self, type_id: i64) -> String {
        self.names
            .get(&type_id)
            .cloned()
            .unwrap_or_else(|| format!("type_{type_id}"))
    }

    pub fn contains(&self, type_id: i64) -> bool {
        self.names.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// snake_case for API stat names: splits camelCase, spells out `+`, and maps
/// every other non-alphanumeric character to `_`.
pub fn stat_name_to_snake_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    for ch in text.trim().chars() {
        if prev.is_some_and(|p| p.is_ascii_lowercase()) && ch.is_ascii_uppercase() {
            out.push('_');
        }
        match ch {
            '+' => out.push_str("_plus_"),
            c if c.is_alphanumeric() => out.push(c),
            _ => out.push('_'),
        }
        prev = Some(ch);
    }
    collapse_underscores(&out).to_lowercase()
}

pub fn collapse_underscores(text: &str) -> String {
    text.split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
