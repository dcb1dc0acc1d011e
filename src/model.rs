use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single worksheet value as read from (or written to) a workbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Text shown in the table for this value.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format_number(*n),
            Cell::Bool(b) => b.to_string(),
        }
    }

    /// Blank means empty or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) | Cell::Bool(_) => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Raw worksheet contents addressed from A1, rows of possibly ragged length.
pub type Grid = Vec<Vec<Cell>>;

/// Cell at `col` in a raw row, treating missing trailing cells as empty.
pub fn cell_at(row: &[Cell], col: usize) -> &Cell {
    const EMPTY: &Cell = &Cell::Empty;
    row.get(col).unwrap_or(EMPTY)
}

/// Stable identifier of a row within one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        RowId(id.into())
    }

    /// Random identifier for rows created or loaded without one.
    pub fn fresh() -> Self {
        RowId(uuid::Uuid::new_v4().to_string())
    }

    /// Identifier derived from the row's position in the source data block.
    pub fn ordinal(index: usize) -> Self {
        RowId(index.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId(value.to_string())
    }
}

/// A record of the tagging plan: column name to text, plus its identifier.
///
/// Serializes as a flat JSON object with the identifier under `_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "_id")]
    pub id: RowId,

    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl Row {
    pub fn new(id: RowId) -> Self {
        Row {
            id,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, column: &str, value: &str) -> Self {
        self.fields.insert(column.to_string(), value.to_string());
        self
    }

    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }

    /// Case-insensitive substring match over the identifier and every value.
    ///
    /// `needle` must already be lower-cased.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.id.as_str().to_lowercase().contains(needle)
            || self
                .fields
                .values()
                .any(|value| value.to_lowercase().contains(needle))
    }
}

/// Labelled bucket of rows, in source order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub category: String,
    pub rows: Vec<Row>,
}

impl Group {
    pub fn new(category: impl Into<String>) -> Self {
        Group {
            category: category.into(),
            rows: Vec::new(),
        }
    }
}

/// Parsed form of one sheet.
///
/// The flat row list is the concatenation of the groups, so both views always
/// hold the same rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SheetData {
    /// Column labels, in source order.
    pub headers: Vec<String>,

    /// Tooltip text aligned with `headers` (categorized sheets only).
    pub tooltips: Vec<String>,

    pub groups: Vec<Group>,
}

impl SheetData {
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|group| group.rows.is_empty())
    }

    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|group| group.rows.len()).sum()
    }

    /// Flat view over every row of every group.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.groups.iter().flat_map(|group| group.rows.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(Cell::Number(42.0).text(), "42");
        assert_eq!(Cell::Number(1.5).text(), "1.5");
        assert_eq!(Cell::Bool(true).text(), "true");
        assert_eq!(Cell::Empty.text(), "");
    }

    #[test]
    fn whitespace_is_blank() {
        assert!(Cell::Text("   ".into()).is_blank());
        assert!(Cell::Empty.is_blank());
        assert!(!Cell::Number(0.0).is_blank());
        assert!(!Cell::Text("x".into()).is_blank());
    }

    #[test]
    fn row_serializes_flat_with_id() {
        let row = Row::new(RowId::ordinal(3)).with_field("event_action", "click");
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["_id"], "3");
        assert_eq!(json["event_action"], "click");

        let back: Row = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn search_is_case_insensitive_and_covers_id() {
        let row = Row::new(RowId::new("abc-1")).with_field("page", "Checkout Page");
        assert!(row.matches("checkout"));
        assert!(row.matches("abc-1"));
        assert!(!row.matches("zzz-no-match"));
    }
}
