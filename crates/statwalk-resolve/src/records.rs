use serde_json::{Map as JsonMap, Value as JsonValue};
use statwalk_core::{EntitySourceRecord, NormalizedTable};
use tracing::warn;

use crate::config::RecordLayout;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordBatch {
    pub records: Vec<EntitySourceRecord>,
    pub skipped: usize,
}

fn field_text(row: &JsonMap<String, JsonValue>, field: &str) -> Option<String> {
    match row.get(field)? {
        JsonValue::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn name_variants(row: &JsonMap<String, JsonValue>, layout: &RecordLayout) -> Vec<String> {
    let mut variants: Vec<String> = Vec::new();
    for group in &layout.name_fields {
        let joined = group
            .iter()
            .filter_map(|field| field_text(row, field))
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() && !variants.contains(&joined) {
            variants.push(joined);
        }
    }
    variants
}

pub fn record_from_row(
    row: &JsonMap<String, JsonValue>,
    layout: &RecordLayout,
) -> Option<EntitySourceRecord> {
    let id = field_text(row, &layout.id_field)?;
    let team = field_text(row, &layout.team_field);
    let record = EntitySourceRecord::new(id, team, name_variants(row, layout))
        .with_attributes(row.clone());
    Some(record)
}

pub fn records_from_rows(rows: &[JsonValue], layout: &RecordLayout) -> RecordBatch {
    let mut batch = RecordBatch::default();
    for (position, row) in rows.iter().enumerate() {
        let Some(object) = row.as_object() else {
            warn!(position, "skipping non-object roster row");
            batch.skipped += 1;
            continue;
        };
        match record_from_row(object, layout) {
            Some(record) => batch.records.push(record),
            None => {
                warn!(position, id_field = %layout.id_field, "skipping roster row without id");
                batch.skipped += 1;
            }
        }
    }
    batch
}

pub fn records_from_table(table: &NormalizedTable, layout: &RecordLayout) -> RecordBatch {
    records_from_rows(&table.to_json_rows(), layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fantasy_variants_skip_blank_and_repeated_names() {
        let rows = vec![
            json!({"id": 7, "team_name": "Spurs", "first_name": "Heung-min", "second_name": "Son", "web_name": "Son"}),
            json!({"id": 8, "team_name": "Spurs", "first_name": "", "second_name": "Richarlison", "web_name": "Richarlison"}),
            json!({"id": 9, "team_name": null, "first_name": " ", "second_name": null}),
        ];
        let batch = records_from_rows(&rows, &RecordLayout::fantasy_roster());
        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.records[0].source_id, "7");
        assert_eq!(batch.records[0].name_variants, vec!["Heung-min Son", "Son"]);
        assert_eq!(batch.records[1].name_variants, vec!["Richarlison"]);
        assert!(batch.records[2].name_variants.is_empty());
        assert_eq!(batch.records[2].team_name(), None);
    }

    #[test]
    fn rows_without_ids_are_skipped_not_fatal() {
        let rows = vec![
            json!({"player_name": "Nobody", "team_name": "Everton"}),
            json!("not a row"),
            json!({"player_id": "sm-1", "player_name": "Beto", "team_name": "Everton", "common_name": "Beto"}),
        ];
        let batch = records_from_rows(&rows, &RecordLayout::stats_provider());
        assert_eq!(batch.skipped, 2);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].name_variants, vec!["Beto"]);
        assert_eq!(batch.records[0].team_name(), Some("Everton"));
    }
}
