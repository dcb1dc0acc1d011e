use serde::Serialize;
use std::collections::HashSet;

use crate::model::Row;

/// Summary figures shown above the tagging plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_rows: usize,
    pub unique_events: usize,
    pub unique_categories: usize,
    pub custom_events: usize,
    /// Share of custom rows, as a rounded percentage.
    pub completion_rate: u32,
}

/// Compute the dashboard metrics over the flat row list.
///
/// Column names are looked up in lower case first, then upper case. A row with
/// neither still counts as one distinct (empty) value.
pub fn compute<'a>(rows: impl IntoIterator<Item = &'a Row>) -> Metrics {
    let mut total = 0;
    let mut custom = 0;
    let mut events = HashSet::new();
    let mut categories = HashSet::new();

    for row in rows {
        total += 1;
        events.insert(either(row, "event_action", "EVENT_ACTION"));
        categories.insert(either(row, "event_category", "EVENT_CATEGORY"));
        if row.get("custom|standard") == "custom" {
            custom += 1;
        }
    }

    let completion_rate = if total == 0 {
        0
    } else {
        (custom as f64 * 100.0 / total as f64).round() as u32
    };

    Metrics {
        total_rows: total,
        unique_events: events.len(),
        unique_categories: categories.len(),
        custom_events: custom,
        completion_rate,
    }
}

fn either<'a>(row: &'a Row, lower: &str, upper: &str) -> &'a str {
    match row.get(lower) {
        "" => row.get(upper),
        value => value,
    }
}
