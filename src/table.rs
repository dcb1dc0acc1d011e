//! In-memory editable table for one sheet.
//!
//! Rows are stored once, in display order, each tagged with the category it
//! belongs to. The flat list and the grouped view are both derived from that
//! single list, so an edit can never reach one view and miss the other.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::access::Actor;
use crate::error::TableError;
use crate::model::{Row, RowId, SheetData};
use crate::parser::DEFAULT_CATEGORY;
use crate::placeholder;
use crate::sheet::{is_ignored_column, is_reserved_column, SheetKind, ID_COLUMN, PHOTO_COLUMN};
use crate::store::PhotoMap;

/// Base name probed by [`TableState::add_column`].
pub const NEW_COLUMN_BASE: &str = "New Column";

/// Narrowest width a column can be dragged to, in pixels.
pub const MIN_COLUMN_WIDTH: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GroupKey(u32);

#[derive(Debug, Clone)]
struct Category {
    key: GroupKey,
    label: String,
    expanded: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    group: GroupKey,
    row: Row,
}

/// Outcome of [`TableState::delete_row`].
///
/// When `photo_removed` is set the attachment map changed and has to be
/// persisted before the deletion counts as complete.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct RowRemoval {
    pub row: Row,
    pub photo_removed: bool,
}

/// One column as the presentation layer needs it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnView<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

/// A category with the rows it currently shows.
///
/// Collapsed groups keep their `row_count` but list no rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView<'a> {
    pub category: &'a str,
    pub expanded: bool,
    pub row_count: usize,
    pub rows: Vec<&'a Row>,
}

/// Read-only snapshot of the table after applying a search term.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView<'a> {
    pub sheet: &'static str,
    pub search: &'a str,
    pub columns: Vec<ColumnView<'a>>,
    pub rows: Vec<&'a Row>,
    pub groups: Vec<GroupView<'a>>,
    pub photo_ids: Vec<&'a str>,
}

/// Rows, columns, column order, widths and photo attachments of one sheet.
#[derive(Debug, Clone)]
pub struct TableState {
    kind: SheetKind,
    entries: Vec<Entry>,
    categories: Vec<Category>,
    next_key: u32,
    headers: Vec<String>,
    tooltips: Vec<String>,
    column_order: Vec<String>,
    column_widths: BTreeMap<String, u32>,
    photos: PhotoMap,
}

impl TableState {
    /// Build the table from parsed sheet data and the persisted side stores.
    ///
    /// Empty sheet data is replaced by generated placeholder rows. Rows without
    /// an identifier, or with one already taken, receive a fresh identifier.
    pub fn load(kind: SheetKind, data: SheetData, saved_order: &[String], photos: PhotoMap) -> Self {
        let data = if data.is_empty() {
            log::info!("No rows in {}, using placeholder data", kind);
            placeholder::generate()
        } else {
            data
        };

        let mut table = TableState {
            kind,
            entries: Vec::with_capacity(data.row_count()),
            categories: Vec::with_capacity(data.groups.len()),
            next_key: 0,
            headers: data.headers,
            tooltips: data.tooltips,
            column_order: Vec::new(),
            column_widths: BTreeMap::new(),
            photos,
        };

        let mut seen = HashSet::new();
        for group in data.groups {
            let key = table.open_category(group.category);
            for mut row in group.rows {
                if row.id.is_empty() || seen.contains(&row.id) {
                    row.id = RowId::fresh();
                }
                seen.insert(row.id.clone());
                table.entries.push(Entry { group: key, row });
            }
        }

        let mut discovered: Vec<String> = table
            .headers
            .iter()
            .filter(|header| !is_reserved_column(header))
            .cloned()
            .collect();
        if discovered.is_empty() {
            if let Some(first) = table.entries.first() {
                discovered = first
                    .row
                    .fields
                    .keys()
                    .filter(|key| !is_reserved_column(key))
                    .cloned()
                    .collect();
                table.headers = discovered.clone();
            }
        }

        table.column_order = merge_column_order(saved_order, &discovered);
        if kind.is_categorized() {
            pin_photo_column(&mut table.column_order);
        }
        table
    }

    pub fn kind(&self) -> SheetKind {
        self.kind
    }

    /// Column labels known from the source file plus any added since.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn tooltip(&self, column: &str) -> Option<&str> {
        let index = self.headers.iter().position(|header| header == column)?;
        self.tooltips
            .get(index)
            .map(String::as_str)
            .filter(|tip| !tip.is_empty())
    }

    /// Full persisted column order, including entries that are not displayed.
    pub fn column_order(&self) -> &[String] {
        &self.column_order
    }

    /// Columns currently displayed, in order: the column order restricted to
    /// known headers plus the photo column.
    pub fn table_columns(&self) -> Vec<&str> {
        self.column_order
            .iter()
            .filter(|column| column.as_str() == PHOTO_COLUMN || self.headers.contains(*column))
            .map(String::as_str)
            .collect()
    }

    /// Displayed columns that hold cell text.
    pub fn data_columns(&self) -> Vec<&str> {
        self.table_columns()
            .into_iter()
            .filter(|column| *column != PHOTO_COLUMN)
            .collect()
    }

    /// Columns for writing rows out: displayed columns first, then any other
    /// field still present on the rows.
    pub fn record_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.data_columns().into_iter().map(str::to_string).collect();
        for entry in &self.entries {
            for key in entry.row.fields.keys() {
                if !columns.contains(key) && !is_reserved_column(key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    pub fn column_width(&self, column: &str) -> Option<u32> {
        self.column_widths.get(column).copied()
    }

    pub fn photos(&self) -> &PhotoMap {
        &self.photos
    }

    pub fn photo(&self, id: &RowId) -> Option<&str> {
        self.photos.get(id.as_str()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flat view of every row.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.entries.iter().map(|entry| &entry.row)
    }

    pub fn row(&self, id: &RowId) -> Option<&Row> {
        self.rows().find(|row| &row.id == id)
    }

    /// Grouped view of every row, one group per category in category order.
    pub fn groups(&self) -> Vec<GroupView<'_>> {
        self.group_views("")
    }

    pub fn is_expanded(&self, category: &str) -> Option<bool> {
        self.categories
            .iter()
            .find(|c| c.label == category)
            .map(|c| c.expanded)
    }

    /// Flip the expanded flag of every group labelled `category`.
    ///
    /// Returns the new state, or `None` when no such group exists.
    pub fn toggle_category(&mut self, category: &str) -> Option<bool> {
        let mut state = None;
        for c in self.categories.iter_mut().filter(|c| c.label == category) {
            c.expanded = !c.expanded;
            state = Some(c.expanded);
        }
        state
    }

    /// Override a column's display width; never persisted.
    pub fn set_column_width(&mut self, column: &str, width: u32) -> u32 {
        let width = width.max(MIN_COLUMN_WIDTH);
        self.column_widths.insert(column.to_string(), width);
        width
    }

    /// Case-insensitive search over every field of every row.
    ///
    /// Applied to the flat list and to each group independently. With a
    /// non-empty term, groups without a match are left out of the view.
    pub fn filter<'a>(&'a self, term: &'a str) -> TableView<'a> {
        let needle = term.trim().to_lowercase();

        let columns = self
            .table_columns()
            .into_iter()
            .map(|name| ColumnView {
                name,
                tooltip: if self.kind.is_categorized() {
                    self.tooltip(name)
                } else {
                    None
                },
                width: self.column_width(name),
            })
            .collect();

        let rows: Vec<&Row> = self.rows().filter(|row| row.matches(&needle)).collect();
        let photo_ids = rows
            .iter()
            .filter(|row| self.photos.contains_key(row.id.as_str()))
            .map(|row| row.id.as_str())
            .collect();

        TableView {
            sheet: self.kind.name(),
            search: term,
            columns,
            rows,
            groups: self.group_views(&needle),
            photo_ids,
        }
    }

    fn group_views(&self, needle: &str) -> Vec<GroupView<'_>> {
        self.categories
            .iter()
            .filter_map(|category| {
                let rows: Vec<&Row> = self
                    .entries
                    .iter()
                    .filter(|entry| entry.group == category.key && entry.row.matches(needle))
                    .map(|entry| &entry.row)
                    .collect();

                if !needle.is_empty() && rows.is_empty() {
                    return None;
                }
                Some(GroupView {
                    category: &category.label,
                    expanded: category.expanded,
                    row_count: rows.len(),
                    rows: if category.expanded { rows } else { Vec::new() },
                })
            })
            .collect()
    }

    /// Replace one cell value.
    pub fn edit(
        &mut self,
        actor: &Actor,
        id: &RowId,
        column: &str,
        value: &str,
    ) -> Result<(), TableError> {
        authorize(actor)?;
        if is_reserved_column(column) {
            return Err(TableError::InvalidName(column.to_string()));
        }
        if !self.data_columns().contains(&column) {
            return Err(TableError::UnknownColumn(column.to_string()));
        }
        let entry = self.entry_mut(id)?;
        entry.row.fields.insert(column.to_string(), value.to_string());
        Ok(())
    }

    /// Insert an empty row at the top of the table and of the first group.
    pub fn add_row(&mut self, actor: &Actor) -> Result<RowId, TableError> {
        authorize(actor)?;

        let mut id = RowId::fresh();
        while self.row(&id).is_some() {
            id = RowId::fresh();
        }

        let mut row = Row::new(id.clone());
        for column in self.data_columns() {
            row.fields.insert(column.to_string(), String::new());
        }

        let group = match self.categories.first_mut() {
            Some(category) => {
                category.expanded = true;
                category.key
            }
            None => self.open_category(DEFAULT_CATEGORY.to_string()),
        };
        self.entries.insert(0, Entry { group, row });
        Ok(id)
    }

    /// Remove a row, its group when that becomes empty, and its photo.
    pub fn delete_row(&mut self, actor: &Actor, id: &RowId) -> Result<RowRemoval, TableError> {
        authorize(actor)?;

        let index = self.position(id)?;
        let entry = self.entries.remove(index);

        if !self.entries.iter().any(|e| e.group == entry.group) {
            self.categories.retain(|c| c.key != entry.group);
        }

        let photo_removed = self.photos.remove(id.as_str()).is_some();
        Ok(RowRemoval {
            row: entry.row,
            photo_removed,
        })
    }

    /// Append an empty column with a name no existing column uses.
    ///
    /// Names are probed as "New Column", "New Column 1", "New Column 2", ...
    /// against displayed columns, known headers and the column order.
    pub fn add_column(&mut self, actor: &Actor) -> Result<String, TableError> {
        authorize(actor)?;

        let taken: HashSet<&str> = self
            .table_columns()
            .into_iter()
            .chain(self.headers.iter().map(String::as_str))
            .chain(self.column_order.iter().map(String::as_str))
            .collect();

        let mut name = NEW_COLUMN_BASE.to_string();
        let mut counter = 1;
        while taken.contains(name.as_str()) {
            name = format!("{} {}", NEW_COLUMN_BASE, counter);
            counter += 1;
        }

        for entry in &mut self.entries {
            entry.row.fields.insert(name.clone(), String::new());
        }
        self.headers.push(name.clone());
        if !self.tooltips.is_empty() {
            self.tooltips.push(String::new());
        }
        if !self.column_order.contains(&name) {
            self.column_order.push(name.clone());
        }
        Ok(name)
    }

    /// Drop a column from every row and from the column order.
    ///
    /// Nothing happens unless `confirmed` is set.
    pub fn delete_column(
        &mut self,
        actor: &Actor,
        column: &str,
        confirmed: bool,
    ) -> Result<(), TableError> {
        authorize(actor)?;
        if is_reserved_column(column) {
            return Err(TableError::InvalidName(column.to_string()));
        }
        let known = self.column_order.iter().any(|c| c == column)
            || self.rows().any(|row| row.fields.contains_key(column));
        if !known {
            return Err(TableError::UnknownColumn(column.to_string()));
        }
        if !confirmed {
            return Err(TableError::ConfirmationRequired(column.to_string()));
        }

        for entry in &mut self.entries {
            entry.row.fields.remove(column);
        }
        self.column_order.retain(|c| c != column);
        self.column_widths.remove(column);
        Ok(())
    }

    /// Move every value of `old` under `new` and relabel the column.
    pub fn rename_column(&mut self, actor: &Actor, old: &str, new: &str) -> Result<(), TableError> {
        authorize(actor)?;

        let new = new.trim();
        if new.is_empty() || new == old || is_reserved_column(new) || is_reserved_column(old) {
            return Err(TableError::InvalidName(new.to_string()));
        }
        if self.table_columns().contains(&new)
            || self.headers.iter().any(|h| h == new)
            || self.column_order.iter().any(|c| c == new)
        {
            return Err(TableError::DuplicateColumn(new.to_string()));
        }
        let position = self
            .column_order
            .iter()
            .position(|c| c == old)
            .ok_or_else(|| TableError::UnknownColumn(old.to_string()))?;

        for entry in &mut self.entries {
            let value = entry.row.fields.remove(old).unwrap_or_default();
            entry.row.fields.insert(new.to_string(), value);
        }
        self.column_order[position] = new.to_string();
        if let Some(header) = self.headers.iter_mut().find(|h| h.as_str() == old) {
            *header = new.to_string();
        }
        if let Some(width) = self.column_widths.remove(old) {
            self.column_widths.insert(new.to_string(), width);
        }
        Ok(())
    }

    /// Move `dragged` into the position `target` held.
    ///
    /// Returns false, changing nothing, when either column is missing or both
    /// are the same.
    pub fn reorder_columns(
        &mut self,
        actor: &Actor,
        dragged: &str,
        target: &str,
    ) -> Result<bool, TableError> {
        authorize(actor)?;
        if dragged == target {
            return Ok(false);
        }
        let from = self.column_order.iter().position(|c| c == dragged);
        let to = self.column_order.iter().position(|c| c == target);
        let (Some(from), Some(to)) = (from, to) else {
            return Ok(false);
        };

        let column = self.column_order.remove(from);
        self.column_order.insert(to, column);
        Ok(true)
    }

    /// Move row `dragged` into the position row `target` held in the flat list.
    ///
    /// The row keeps its category. Returns false, changing nothing, when both
    /// identifiers are the same.
    pub fn move_row(
        &mut self,
        actor: &Actor,
        dragged: &RowId,
        target: &RowId,
    ) -> Result<bool, TableError> {
        authorize(actor)?;
        let from = self.position(dragged)?;
        let to = self.position(target)?;
        if from == to {
            return Ok(false);
        }

        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        Ok(true)
    }

    /// Attach an encoded image to a row, replacing any previous one.
    pub fn set_photo(&mut self, actor: &Actor, id: &RowId, data_uri: String) -> Result<(), TableError> {
        authorize(actor)?;
        if self.row(id).is_none() {
            return Err(TableError::UnknownRow(id.to_string()));
        }
        self.photos.insert(id.to_string(), data_uri);
        Ok(())
    }

    /// Detach a row's image; returns whether one was attached.
    pub fn remove_photo(&mut self, actor: &Actor, id: &RowId) -> Result<bool, TableError> {
        authorize(actor)?;
        Ok(self.photos.remove(id.as_str()).is_some())
    }

    fn position(&self, id: &RowId) -> Result<usize, TableError> {
        self.entries
            .iter()
            .position(|entry| &entry.row.id == id)
            .ok_or_else(|| TableError::UnknownRow(id.to_string()))
    }

    fn entry_mut(&mut self, id: &RowId) -> Result<&mut Entry, TableError> {
        self.entries
            .iter_mut()
            .find(|entry| &entry.row.id == id)
            .ok_or_else(|| TableError::UnknownRow(id.to_string()))
    }

    fn open_category(&mut self, label: String) -> GroupKey {
        let key = GroupKey(self.next_key);
        self.next_key += 1;
        self.categories.push(Category {
            key,
            label,
            expanded: true,
        });
        key
    }
}

fn authorize(actor: &Actor) -> Result<(), TableError> {
    if actor.can_edit() {
        Ok(())
    } else {
        Err(TableError::Forbidden)
    }
}

/// Saved order first, then discovered columns it does not mention.
///
/// Ignored and reserved columns are never appended, and duplicates are dropped.
pub fn merge_column_order(saved: &[String], discovered: &[String]) -> Vec<String> {
    let mut order: Vec<String> = Vec::with_capacity(saved.len() + discovered.len());
    for column in saved {
        if !order.contains(column) {
            order.push(column.clone());
        }
    }
    for column in discovered {
        if !order.contains(column) && !is_ignored_column(column) && column != ID_COLUMN {
            order.push(column.clone());
        }
    }
    order
}

/// Put the photo column in second position, removing it anywhere else.
pub fn pin_photo_column(order: &mut Vec<String>) {
    order.retain(|c| c != PHOTO_COLUMN);
    let index = order.len().min(1);
    order.insert(index, PHOTO_COLUMN.to_string());
}
