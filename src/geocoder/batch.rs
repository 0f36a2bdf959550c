//! Batch request rows and result correlation.

use serde_json::{json, Value};
use tracing::warn;

use super::fields::lookup;
use crate::transport::{PropertySet, RecordSet};

/// Build one request row tagged with its sequential id.
pub fn request_row(object_id_field: &str, id: usize, attributes: Vec<(String, String)>) -> PropertySet {
    let mut row = PropertySet::new();
    row.insert(object_id_field.to_string(), json!(id));
    for (key, value) in attributes {
        row.insert(key, Value::String(value));
    }
    row
}

fn row_id(row: &PropertySet, field: &str) -> Option<usize> {
    match lookup(row, field)? {
        Value::Number(n) => n.as_u64().map(|id| id as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Put result rows back into request order.
///
/// With a correlation field the rows are placed by the id they carry;
/// without one, the service is trusted to keep the request order. Slots
/// nobody answered stay `None`.
pub fn correlate(rows: RecordSet, expected: usize, correlation_field: Option<&str>) -> Vec<Option<PropertySet>> {
    let mut slots: Vec<Option<PropertySet>> = vec![None; expected];

    match correlation_field {
        Some(field) => {
            for row in rows {
                match row_id(&row, field) {
                    Some(id) if id < expected && slots[id].is_none() => slots[id] = Some(row),
                    Some(id) => warn!("Ignoring batch result with unexpected {} {}", field, id),
                    None => warn!("Ignoring batch result without {}", field),
                }
            }
        }
        None => {
            if rows.len() != expected {
                warn!(
                    "Batch returned {} rows for {} requests; assuming request order",
                    rows.len(),
                    expected
                );
            }
            for (slot, row) in slots.iter_mut().zip(rows) {
                *slot = Some(row);
            }
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: Value, label: &str) -> PropertySet {
        let mut row = PropertySet::new();
        row.insert("ResultID".to_string(), id);
        row.insert("Match_addr".to_string(), json!(label));
        row
    }

    fn labels(slots: &[Option<PropertySet>]) -> Vec<Option<String>> {
        slots
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .and_then(|r| r["Match_addr"].as_str().map(String::from))
            })
            .collect()
    }

    #[test]
    fn test_correlate_by_id() {
        let rows = vec![row(json!(2), "C"), row(json!(0), "A"), row(json!("1"), "B")];
        let slots = correlate(rows, 3, Some("resultid"));
        assert_eq!(
            labels(&slots),
            vec![Some("A".into()), Some("B".into()), Some("C".into())]
        );
    }

    #[test]
    fn test_correlate_missing_and_bogus_ids() {
        let rows = vec![row(json!(7), "X"), row(json!(1), "B"), row(json!(1), "B2")];
        let slots = correlate(rows, 2, Some("ResultID"));
        assert_eq!(labels(&slots), vec![None, Some("B".into())]);
    }

    #[test]
    fn test_correlate_positional() {
        let rows = vec![row(json!(9), "A"), row(json!(9), "B")];
        let slots = correlate(rows, 3, None);
        assert_eq!(labels(&slots), vec![Some("A".into()), Some("B".into()), None]);
    }

    #[test]
    fn test_request_row() {
        let row = request_row("OBJECTID", 4, vec![("SingleLine".into(), "1 Main St".into())]);
        assert_eq!(row["OBJECTID"], json!(4));
        assert_eq!(row["SingleLine"], json!("1 Main St"));
    }
}
