//! Flattening nested API payloads (statistics, lineup details) into flat typed records.

use std::collections::HashSet;

use serde_json::Value as JsonValue;
use statwalk_core::{
    stat_name_to_snake_case, Column, ColumnKind, NormalizedTable, TypeCatalog, Value,
};
use tracing::warn;

use crate::ExtractError;

pub const MAX_FLATTEN_DEPTH: usize = 3;

/// Ordered field list; setting an existing key replaces it in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatRecord {
    fields: Vec<(String, Option<Value>)>,
}

impl FlatRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Option<Value>) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn extend(&mut self, other: FlatRecord) {
        for (key, value) in other.fields {
            self.set(key, value);
        }
    }

    pub fn fields(&self) -> &[(String, Option<Value>)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub fn json_scalar(value: &JsonValue) -> Option<Value> {
    match value {
        JsonValue::Bool(b) => Some(Value::Boolean(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float)),
        JsonValue::String(s) => Some(Value::text(s.as_str())),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

pub fn type_catalog_from_pages(pages: &[JsonValue]) -> Result<TypeCatalog, ExtractError> {
    let mut catalog = TypeCatalog::new();
    for (page_no, page) in pages.iter().enumerate() {
        let entries = page
            .get("data")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| ExtractError::Payload(format!("types page {page_no} has no data array")))?;
        for entry in entries {
            let id = entry.get("id").and_then(JsonValue::as_i64);
            let name = entry.get("name").and_then(JsonValue::as_str);
            match (id, name) {
                (Some(id), Some(name)) => catalog.insert(id, name),
                _ => warn!(page = page_no, "skipping type entry without id/name"),
            }
        }
    }
    Ok(catalog)
}

fn flatten_value(flat: &mut FlatRecord, prefix: String, value: &JsonValue, depth: usize) {
    match value {
        JsonValue::Object(map) if depth > 0 => {
            for (key, nested) in map {
                let key = format!("{prefix}_{}", stat_name_to_snake_case(key));
                flatten_value(flat, key, nested, depth - 1);
            }
        }
        JsonValue::Object(_) | JsonValue::Array(_) => {}
        scalar => flat.set(prefix, json_scalar(scalar)),
    }
}

pub fn flatten_statistics(statistics: &JsonValue, catalog: &TypeCatalog) -> FlatRecord {
    let mut flat = FlatRecord::new();
    let groups = statistics.as_array().map(Vec::as_slice).unwrap_or_default();
    for group in groups {
        let details = group
            .get("details")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for detail in details {
            let Some(type_id) = detail.get("type_id").and_then(JsonValue::as_i64) else {
                continue;
            };
            let value = detail.get("value").unwrap_or(&JsonValue::Null);
            flatten_value(&mut flat, catalog.name_for(type_id), value, MAX_FLATTEN_DEPTH);
        }
    }
    flat
}

pub fn flatten_lineup_details(details: &JsonValue, catalog: &TypeCatalog) -> FlatRecord {
    let mut flat = FlatRecord::new();
    let details = details.as_array().map(Vec::as_slice).unwrap_or_default();
    for detail in details {
        let Some(type_id) = detail.get("type_id").and_then(JsonValue::as_i64) else {
            continue;
        };
        let value = detail.pointer("/data/value").unwrap_or(&JsonValue::Null);
        flatten_value(&mut flat, catalog.name_for(type_id), value, MAX_FLATTEN_DEPTH);
    }
    flat
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineupAvailability<'a> {
    Available(&'a [JsonValue]),
    PlanGated { message: String },
    Empty,
}

impl<'a> LineupAvailability<'a> {
    pub fn require(self) -> Result<&'a [JsonValue], ExtractError> {
        match self {
            LineupAvailability::Available(lineups) => Ok(lineups),
            LineupAvailability::Empty => Ok(&[]),
            LineupAvailability::PlanGated { message } => Err(ExtractError::IncludeUnavailable {
                include: "lineups".to_string(),
                message,
            }),
        }
    }
}

fn fixture_data(payload: &JsonValue) -> &JsonValue {
    payload.get("data").unwrap_or(payload)
}

pub fn lineup_availability(payload: &JsonValue) -> LineupAvailability<'_> {
    let data = fixture_data(payload);
    match data.get("lineups").and_then(JsonValue::as_array) {
        Some(lineups) if !lineups.is_empty() => LineupAvailability::Available(lineups),
        Some(_) => LineupAvailability::Empty,
        None => match payload.get("message").and_then(JsonValue::as_str) {
            Some(message) if !message.trim().is_empty() => LineupAvailability::PlanGated {
                message: message.to_string(),
            },
            _ => LineupAvailability::Empty,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerFixtureRows {
    pub records: Vec<FlatRecord>,
    pub skipped: usize,
    pub plan_gated: Option<String>,
}

/// One record per lineup entry: fixture/player/team ids, name, then flattened details.
///
/// A plan-gated include degrades to an empty result with `plan_gated` set.
pub fn player_fixture_rows(payload: &JsonValue, catalog: &TypeCatalog) -> PlayerFixtureRows {
    let data = fixture_data(payload);
    let fixture_id = data.get("id").and_then(json_scalar);
    let lineups = match lineup_availability(payload) {
        LineupAvailability::Available(lineups) => lineups,
        LineupAvailability::Empty => return PlayerFixtureRows::default(),
        LineupAvailability::PlanGated { message } => {
            warn!(fixture_id = ?fixture_id, %message, "lineups include unavailable; returning no rows");
            return PlayerFixtureRows {
                plan_gated: Some(message),
                ..PlayerFixtureRows::default()
            };
        }
    };

    let mut out = PlayerFixtureRows::default();
    for (position, lineup) in lineups.iter().enumerate() {
        let Some(player_id) = lineup.get("player_id").and_then(json_scalar) else {
            warn!(fixture_id = ?fixture_id, position, "skipping lineup entry without player_id");
            out.skipped += 1;
            continue;
        };
        let mut record = FlatRecord::new();
        record.set("fixture_id", fixture_id.clone());
        record.set("player_id", Some(player_id));
        record.set("player_name", lineup.get("player_name").and_then(json_scalar));
        record.set("team_id", lineup.get("team_id").and_then(json_scalar));
        record.extend(flatten_lineup_details(
            lineup.get("details").unwrap_or(&JsonValue::Null),
            catalog,
        ));
        out.records.push(record);
    }
    out
}

fn column_kind(values: &[Option<&Value>]) -> ColumnKind {
    let present = values.iter().flatten().collect::<Vec<_>>();
    if present.is_empty() {
        return ColumnKind::Text;
    }
    if present.iter().all(|v| matches!(v, Value::Boolean(_))) {
        ColumnKind::Boolean
    } else if present.iter().all(|v| matches!(v, Value::Integer(_))) {
        ColumnKind::Integer
    } else if present.iter().all(|v| v.kind().is_numeric()) {
        ColumnKind::Float
    } else {
        ColumnKind::Text
    }
}

pub fn table_from_flat_records(records: &[FlatRecord]) -> Result<NormalizedTable, ExtractError> {
    let mut names: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for record in records {
        for (key, _) in record.fields() {
            if seen.insert(key.as_str()) {
                names.push(key.as_str());
            }
        }
    }

    let mut columns = Vec::with_capacity(names.len());
    let mut column_values: Vec<Vec<Value>> = Vec::with_capacity(names.len());
    for name in &names {
        let values = records.iter().map(|r| r.get(name)).collect::<Vec<_>>();
        let kind = column_kind(&values);
        let cells = values
            .into_iter()
            .map(|value| match (kind, value) {
                (ColumnKind::Integer, Some(Value::Integer(v))) => Value::Integer(*v),
                (ColumnKind::Float, Some(v)) => v.as_f64().map(Value::Float).unwrap_or(Value::Float(0.0)),
                (ColumnKind::Boolean, Some(Value::Boolean(b))) => Value::Boolean(*b),
                (ColumnKind::Text, Some(v)) => Value::text(v.to_string()),
                _ => kind.missing_fill(),
            })
            .collect();
        columns.push(Column::new(*name, kind));
        column_values.push(cells);
    }

    let rows = (0..records.len())
        .map(|r| column_values.iter().map(|values| values[r].clone()).collect())
        .collect();
    Ok(NormalizedTable::new(columns, rows)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> TypeCatalog {
        TypeCatalog::from_entries([(52, "Goals"), (79, "Assists"), (118, "Rating")])
    }

    #[test]
    fn types_pages_build_a_catalog() {
        let pages = vec![
            json!({"data": [{"id": 52, "name": "Goals"}, {"id": 79}]}),
            json!({"data": [{"id": 118, "name": "Rating"}]}),
        ];
        let catalog = type_catalog_from_pages(&pages).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.name_for(118), "rating");
        assert!(type_catalog_from_pages(&[json!({"message": "nope"})]).is_err());
    }

    #[test]
    fn statistics_flatten_nested_values_by_type_name() {
        let stats = json!([
            {"details": [
                {"type_id": 52, "value": {"total": 7, "goals": 5, "penalties": 2}},
                {"type_id": 999, "value": 3},
                {"type_id": 118, "value": {"average": 7.1, "highest": {"value": 9, "list": [1]}}}
            ]}
        ]);
        let flat = flatten_statistics(&stats, &catalog());
        assert_eq!(flat.get("goals_total"), Some(&Value::Integer(7)));
        assert_eq!(flat.get("goals_penalties"), Some(&Value::Integer(2)));
        assert_eq!(flat.get("type_999"), Some(&Value::Integer(3)));
        assert_eq!(flat.get("rating_average"), Some(&Value::Float(7.1)));
        assert_eq!(flat.get("rating_highest_value"), Some(&Value::Integer(9)));
        assert!(!flat.contains_key("rating_highest_list"));
    }

    #[test]
    fn lineup_details_read_data_value() {
        let details = json!([
            {"type_id": 52, "data": {"value": 1}},
            {"type_id": 79, "data": {}},
            {"data": {"value": 4}}
        ]);
        let flat = flatten_lineup_details(&details, &catalog());
        assert_eq!(flat.get("goals"), Some(&Value::Integer(1)));
        assert!(flat.contains_key("assists"));
        assert_eq!(flat.get("assists"), None);
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn plan_gated_lineups_degrade_softly() {
        let payload = json!({
            "data": {"id": 19_000_001},
            "message": "You do not have access to the lineups include on your current plan"
        });
        let rows = player_fixture_rows(&payload, &catalog());
        assert!(rows.records.is_empty());
        assert!(rows.plan_gated.is_some());
        assert!(matches!(
            lineup_availability(&payload).require(),
            Err(ExtractError::IncludeUnavailable { .. })
        ));
        assert!(lineup_availability(&json!({"data": {"lineups": []}}))
            .require()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn flat_records_become_a_rectangular_table() {
        let mut a = FlatRecord::new();
        a.set("player_id", Some(Value::Integer(1)));
        a.set("goals", Some(Value::Integer(2)));
        a.set("captain", Some(Value::Boolean(true)));
        let mut b = FlatRecord::new();
        b.set("player_id", Some(Value::Integer(2)));
        b.set("rating", Some(Value::Float(6.5)));
        b.set("goals", Some(Value::Float(0.5)));

        let table = table_from_flat_records(&[a, b]).unwrap();
        assert_eq!(table.column_names(), vec!["player_id", "goals", "captain", "rating"]);
        assert_eq!(table.column("goals").unwrap().kind, ColumnKind::Float);
        assert_eq!(table.value(0, "goals"), Some(&Value::Float(2.0)));
        assert_eq!(table.column("captain").unwrap().kind, ColumnKind::Boolean);
        assert_eq!(table.value(1, "captain"), Some(&Value::text("")));
        assert_eq!(table.value(0, "rating"), Some(&Value::Float(0.0)));
    }
}
