//! Turns one worksheet into a [`SheetData`].
//!
//! Flat sheets (legacy plan, data referential) use their first row as headers and
//! yield a single "All" group. The categorized tagging plan carries a tooltip row
//! and a label row, then data rows interleaved with category marker rows.

use log::{error, info, warn};
use std::collections::HashSet;
use std::path::Path;

use crate::model::{cell_at, Cell, Grid, Group, Row, RowId, SheetData};
use crate::sheet::{is_ignored_column, is_reserved_column, SheetKind, ID_COLUMN};
use crate::workbook;

/// Group label used for flat sheets.
pub const FLAT_CATEGORY: &str = "All";

/// Label of the group collecting data rows seen before the first marker.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Minimum number of filled cells that disqualifies a row from being a marker.
const MARKER_MAX_FILLED: usize = 3;

/// Load and parse the workbook backing `kind` from `data_dir`.
///
/// Never fails: a missing file, unreadable workbook or too-short sheet all
/// produce an empty [`SheetData`], and the cause is logged.
pub fn parse_sheet(data_dir: &Path, kind: SheetKind) -> SheetData {
    let path = data_dir.join(kind.file_name());
    if !path.exists() {
        warn!("Workbook for {} not found at {}", kind, path.display());
        return SheetData::default();
    }

    match workbook::read_grid(&path, kind.worksheet()) {
        Ok(grid) => {
            let data = parse_grid(kind, &grid);
            info!(
                "Parsed {}: {} columns, {} groups, {} rows",
                kind,
                data.headers.len(),
                data.groups.len(),
                data.row_count()
            );
            data
        }
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            SheetData::default()
        }
    }
}

/// Parse an already-read grid with the layout convention of `kind`.
pub fn parse_grid(kind: SheetKind, grid: &Grid) -> SheetData {
    if kind.is_categorized() {
        parse_categorized(grid)
    } else {
        parse_flat(grid)
    }
}

/// Decide whether a raw row opens a new category.
///
/// A marker has text in its first cell, nothing in its second, and fewer than
/// three filled cells across the whole row. The row must be the raw worksheet
/// row, not the subset of kept columns.
pub fn is_category_marker(raw: &[Cell]) -> bool {
    if cell_at(raw, 0).is_blank() || !cell_at(raw, 1).is_blank() {
        return false;
    }
    raw.iter().filter(|cell| !cell.is_blank()).count() < MARKER_MAX_FILLED
}

/// First row holds the headers, every non-blank row after it is a record.
///
/// An `_id` column feeds the row identifier; `_id` and `PHOTO` never become
/// headers. Rows without an `_id` get an empty identifier, to be filled by the
/// caller.
pub fn parse_flat(grid: &Grid) -> SheetData {
    if grid.len() < 2 {
        return SheetData::default();
    }

    let labels = unique_labels(grid[0].iter().map(|cell| {
        if cell.is_blank() {
            "__EMPTY".to_string()
        } else {
            cell.text()
        }
    }));

    let id_col = labels.iter().position(|label| label == ID_COLUMN);
    let columns: Vec<(usize, &String)> = labels
        .iter()
        .enumerate()
        .filter(|(_, label)| !is_reserved_column(label))
        .collect();

    let mut group = Group::new(FLAT_CATEGORY);
    for raw in &grid[1..] {
        if raw.iter().all(Cell::is_blank) {
            continue;
        }

        let id = id_col
            .map(|col| cell_at(raw, col).text().trim().to_string())
            .unwrap_or_default();
        let mut row = Row::new(RowId::new(id));
        for (col, label) in &columns {
            row.fields.insert((*label).clone(), cell_at(raw, *col).text());
        }
        group.rows.push(row);
    }

    SheetData {
        headers: columns.into_iter().map(|(_, label)| label.clone()).collect(),
        tooltips: Vec::new(),
        groups: vec![group],
    }
}

/// Row 1 holds tooltips, row 2 labels, the rest data and category markers.
///
/// Row identifiers are the ordinal of the row inside the data block (counting
/// markers and blank rows), so they stay stable across reloads of the same file.
pub fn parse_categorized(grid: &Grid) -> SheetData {
    if grid.len() < 2 {
        return SheetData::default();
    }

    let tooltip_row = &grid[0];
    let label_row = &grid[1];

    let kept: Vec<usize> = (0..label_row.len())
        .filter(|&col| {
            let cell = cell_at(label_row, col);
            !cell.is_blank() && !is_ignored_column(&cell.text())
        })
        .collect();
    let headers = unique_labels(kept.iter().map(|&col| cell_at(label_row, col).text()));
    let tooltips = kept
        .iter()
        .map(|&col| cell_at(tooltip_row, col).text())
        .collect();

    let mut groups = Vec::new();
    let mut current = Group::new(DEFAULT_CATEGORY);

    for (index, raw) in grid[2..].iter().enumerate() {
        if is_category_marker(raw) {
            let label = cell_at(raw, 0).text().trim().to_string();
            let previous = std::mem::replace(&mut current, Group::new(label));
            flush(&mut groups, previous);
            continue;
        }

        let mut row = Row::new(RowId::ordinal(index));
        let mut has_data = false;
        for (&col, header) in kept.iter().zip(&headers) {
            let cell = cell_at(raw, col);
            has_data |= !cell.is_blank();
            row.fields.insert(header.clone(), cell.text());
        }

        if has_data {
            current.rows.push(row);
        }
    }
    flush(&mut groups, current);

    SheetData {
        headers,
        tooltips,
        groups,
    }
}

fn flush(groups: &mut Vec<Group>, group: Group) {
    if !group.rows.is_empty() || group.category != DEFAULT_CATEGORY {
        groups.push(group);
    }
}

// Repeated labels get `_1`, `_2`, ... suffixes so every column stays addressable.
fn unique_labels(labels: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for label in labels {
        let mut candidate = label.clone();
        let mut n = 1;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{}_{}", label, n);
            n += 1;
        }
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|s| {
                if s.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.to_string())
                }
            })
            .collect()
    }

    fn categories(data: &SheetData) -> Vec<(&str, usize)> {
        data.groups
            .iter()
            .map(|group| (group.category.as_str(), group.rows.len()))
            .collect()
    }

    #[test]
    fn marker_heuristic() {
        assert!(is_category_marker(&row(&["Nav", ""])));
        assert!(is_category_marker(&row(&["Nav"])));
        assert!(is_category_marker(&row(&["Nav", "", "note"])));
        assert!(!is_category_marker(&row(&["Nav", "", "a", "b"])));
        assert!(!is_category_marker(&row(&["Home", "click"])));
        assert!(!is_category_marker(&row(&["", "click"])));
        assert!(!is_category_marker(&row(&["   ", ""])));
        assert!(!is_category_marker(&[]));
    }

    #[test]
    fn groups_follow_markers() {
        let grid = vec![
            row(&["Page shown to the user"]),
            row(&["Page"]),
            row(&["Nav", ""]),
            row(&["", "label1", "label2"]),
            row(&["Home", "click", "nav"]),
            row(&["Checkout", ""]),
            row(&["Pay", "submit", "checkout"]),
        ];

        let data = parse_categorized(&grid);
        assert_eq!(data.headers, vec!["Page"]);
        assert_eq!(data.tooltips, vec!["Page shown to the user"]);
        assert_eq!(categories(&data), vec![("Nav", 1), ("Checkout", 1)]);
        assert_eq!(data.groups[0].rows[0].get("Page"), "Home");
        assert_eq!(data.groups[1].rows[0].get("Page"), "Pay");
    }

    #[test]
    fn ids_are_data_block_ordinals() {
        let grid = vec![
            row(&["", ""]),
            row(&["event", "action"]),
            row(&["Nav", ""]),
            row(&["home", "click"]),
            row(&["", ""]),
            row(&["menu", "open"]),
        ];

        let data = parse_categorized(&grid);
        let ids: Vec<&str> = data.rows().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn rows_before_first_marker_are_uncategorized() {
        let grid = vec![
            row(&["", ""]),
            row(&["event", "action"]),
            row(&["home", "click"]),
            row(&["Nav", ""]),
            row(&["Empty", ""]),
            row(&["menu", "open"]),
        ];

        let data = parse_categorized(&grid);
        assert_eq!(
            categories(&data),
            vec![(DEFAULT_CATEGORY, 1), ("Nav", 0), ("Empty", 1)]
        );
    }

    #[test]
    fn ignored_and_blank_labels_are_dropped() {
        let grid = vec![
            row(&["tip a", "tip label", "tip gap", "tip b"]),
            row(&["a", "_label", "", "b"]),
            row(&["x", "hidden", "gap", "y"]),
        ];

        let data = parse_categorized(&grid);
        assert_eq!(data.headers, vec!["a", "b"]);
        assert_eq!(data.tooltips, vec!["tip a", "tip b"]);
        let first = data.rows().next().unwrap();
        assert_eq!(first.fields.len(), 2);
        assert_eq!(first.get("b"), "y");
    }

    #[test]
    fn union_of_groups_is_flat_list() {
        let grid = vec![
            row(&["", "", ""]),
            row(&["a", "b", "c"]),
            row(&["1", "2", "3"]),
            row(&["Cat", "", ""]),
            row(&["4", "5", "6"]),
            row(&["", "7", "9"]),
            row(&["Other", "", ""]),
            row(&["", "", ""]),
            row(&["8", "x", ""]),
        ];

        let data = parse_categorized(&grid);
        let flat: Vec<&RowId> = data.rows().map(|r| &r.id).collect();
        let unique: HashSet<&RowId> = flat.iter().copied().collect();
        assert_eq!(flat.len(), unique.len());
        assert_eq!(flat.len(), data.row_count());
        assert_eq!(flat.len(), 4);
    }

    #[test]
    fn too_short_grids_are_empty() {
        assert_eq!(parse_categorized(&vec![row(&["only"])]), SheetData::default());
        assert_eq!(parse_flat(&vec![row(&["only"])]), SheetData::default());
        assert_eq!(parse_flat(&Grid::new()), SheetData::default());
    }

    #[test]
    fn flat_sheet_is_one_group() {
        let grid = vec![
            row(&["_id", "param", "PHOTO", "definition", "param"]),
            row(&["p-1", "currency", "", "ISO code", "dup"]),
            row(&["", "", "", "", ""]),
            row(&["", "value", "", "amount", ""]),
        ];

        let data = parse_flat(&grid);
        assert_eq!(data.headers, vec!["param", "definition", "param_1"]);
        assert_eq!(categories(&data), vec![(FLAT_CATEGORY, 2)]);

        let rows: Vec<&Row> = data.rows().collect();
        assert_eq!(rows[0].id.as_str(), "p-1");
        assert_eq!(rows[0].get("param_1"), "dup");
        assert!(rows[1].id.is_empty());
        assert!(!rows[1].fields.contains_key("PHOTO"));
    }

    #[test]
    fn missing_workbook_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(parse_sheet(dir.path(), SheetKind::Tagging), SheetData::default());
    }

    #[test]
    fn corrupt_workbook_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SheetKind::Reference.file_name()), b"not a workbook").unwrap();
        assert_eq!(parse_sheet(dir.path(), SheetKind::Reference), SheetData::default());
    }
}
