//! Column type inference over scraped cell text.

use statwalk_core::{ColumnKind, Value};

pub const NUMERIC_SHARE: f64 = 0.5;

const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Decide one kind for the whole column and convert every cell to it.
///
/// Cells that are empty, or that fail to parse in a numeric column, take the
/// kind's missing fill.
pub fn infer_column(cells: &[&str]) -> (ColumnKind, Vec<Value>) {
    let mut non_empty = 0usize;
    let mut parsed = Vec::with_capacity(cells.len());
    let mut parsed_count = 0usize;
    let mut integral = true;

    for cell in cells {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            parsed.push(None);
            continue;
        }
        non_empty += 1;
        let number = parse_number(trimmed);
        if let Some(v) = number {
            parsed_count += 1;
            if trimmed.contains('.') || v.fract() != 0.0 || v.abs() > MAX_EXACT_INTEGER {
                integral = false;
            }
        }
        parsed.push(number);
    }

    let numeric = non_empty > 0 && (parsed_count as f64) >= NUMERIC_SHARE * non_empty as f64;
    if !numeric {
        let values = cells.iter().map(|c| Value::text(c.trim())).collect();
        return (ColumnKind::Text, values);
    }

    let kind = if integral {
        ColumnKind::Integer
    } else {
        ColumnKind::Float
    };
    let values = parsed
        .into_iter()
        .map(|number| match (kind, number) {
            (ColumnKind::Integer, Some(v)) => Value::Integer(v as i64),
            (ColumnKind::Float, Some(v)) => Value::Float(v),
            _ => kind.missing_fill(),
        })
        .collect();
    (kind, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_separators_are_ignored() {
        assert_eq!(parse_number("1,234"), Some(1234.0));
        assert_eq!(parse_number(" 2,070.5 "), Some(2070.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("Arsenal"), None);
    }

    #[test]
    fn whole_numbers_make_an_integer_column() {
        let (kind, values) = infer_column(&["1,234", "12", ""]);
        assert_eq!(kind, ColumnKind::Integer);
        assert_eq!(
            values,
            vec![Value::Integer(1234), Value::Integer(12), Value::Integer(0)]
        );
    }

    #[test]
    fn any_decimal_point_makes_a_float_column() {
        let (kind, values) = infer_column(&["1.0", "2", "0.35"]);
        assert_eq!(kind, ColumnKind::Float);
        assert_eq!(
            values,
            vec![Value::Float(1.0), Value::Float(2.0), Value::Float(0.35)]
        );
    }

    #[test]
    fn mostly_numeric_column_fills_stray_text_with_zero() {
        let (kind, values) = infer_column(&["3", "4", "n/a"]);
        assert_eq!(kind, ColumnKind::Integer);
        assert_eq!(values[2], Value::Integer(0));
    }

    #[test]
    fn mostly_text_column_stays_text() {
        let (kind, values) = infer_column(&["FW", "MF", "7", ""]);
        assert_eq!(kind, ColumnKind::Text);
        assert_eq!(values[2], Value::text("7"));
        assert_eq!(values[3], Value::text(""));
    }

    #[test]
    fn empty_column_is_text() {
        let (kind, values) = infer_column(&["", " "]);
        assert_eq!(kind, ColumnKind::Text);
        assert_eq!(values, vec![Value::text(""), Value::text("")]);
    }
}
