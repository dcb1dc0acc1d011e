use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, info};
use serde::Serialize;

use crate::access::Actor;
use crate::error::{StoreError, TableError, WorkbookError, WorkspaceError};
use crate::model::{Row, RowId};
use crate::parser;
use crate::sheet::{SheetKind, TAGGING_WORKSHEET};
use crate::store::{ColumnConfig, DataDir, PhotoMap};
use crate::table::TableState;
use crate::workbook;

/// Result of writing the photo map after a change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum PhotoSync {
    /// Nothing to write.
    Unchanged,
    Saved,
    /// The in-memory change stands but did not reach disk.
    Failed(String),
}

impl PhotoSync {
    fn from_result(result: Result<(), StoreError>) -> Self {
        match result {
            Ok(()) => PhotoSync::Saved,
            Err(e) => PhotoSync::Failed(e.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PhotoSync::Failed(_))
    }
}

/// What an explicit save wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub photos: usize,
    /// Rows written to the legacy workbook, `None` for sheets kept read-only.
    pub rows: Option<usize>,
    pub columns: usize,
}

/// One sheet's table bound to the files it was loaded from.
#[derive(Debug, Clone)]
pub struct Workspace {
    data_dir: DataDir,
    table: TableState,
}

impl Workspace {
    /// Parse the sheet and its side stores from `data_dir`.
    ///
    /// Unreadable side stores are logged and treated as empty.
    pub fn open(data_dir: DataDir, kind: SheetKind) -> Self {
        let table = load_table(&data_dir, kind);
        Workspace { data_dir, table }
    }

    /// Discard in-memory changes and read everything again.
    pub fn reload(&mut self) {
        self.table = load_table(&self.data_dir, self.table.kind());
    }

    pub fn kind(&self) -> SheetKind {
        self.table.kind()
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }

    pub fn table(&self) -> &TableState {
        &self.table
    }

    /// Direct access for mutations that touch memory only.
    pub fn table_mut(&mut self) -> &mut TableState {
        &mut self.table
    }

    /// Delete a row and, if it had a photo, persist the shrunken photo map
    /// before returning.
    pub fn delete_row(&mut self, actor: &Actor, id: &RowId) -> Result<PhotoSync, TableError> {
        let removal = self.table.delete_row(actor, id)?;
        if !removal.photo_removed {
            return Ok(PhotoSync::Unchanged);
        }
        Ok(self.sync_photos())
    }

    /// Attach an uploaded image to a row, encoded as a `data:` URI.
    pub fn attach_photo(
        &mut self,
        actor: &Actor,
        id: &RowId,
        mime: &str,
        bytes: &[u8],
    ) -> Result<PhotoSync, TableError> {
        if !actor.can_edit() {
            return Err(TableError::Forbidden);
        }
        if !mime.starts_with("image/") {
            return Err(TableError::UnsupportedMedia(mime.to_string()));
        }
        let uri = format!("data:{};base64,{}", mime, STANDARD.encode(bytes));
        self.table.set_photo(actor, id, uri)?;
        Ok(self.sync_photos())
    }

    pub fn detach_photo(&mut self, actor: &Actor, id: &RowId) -> Result<PhotoSync, TableError> {
        if !self.table.remove_photo(actor, id)? {
            return Ok(PhotoSync::Unchanged);
        }
        Ok(self.sync_photos())
    }

    /// Flush photos, then legacy rows, then the column order.
    ///
    /// Stops at the first failure; earlier writes stay on disk.
    pub fn save(&self, actor: &Actor) -> Result<SaveReport, WorkspaceError> {
        if !actor.can_edit() {
            return Err(TableError::Forbidden.into());
        }
        let kind = self.kind();
        let scope = kind.store_scope();

        self.data_dir.save_photos(scope, self.table.photos())?;

        let rows = if kind.persists_rows() {
            let columns = self.table.record_columns();
            let rows: Vec<Row> = self.table.rows().cloned().collect();
            let grid = workbook::rows_to_grid(&columns, &rows, true);
            workbook::replace_sheet(self.data_dir.workbook_path(kind), TAGGING_WORKSHEET, &grid)?;
            Some(rows.len())
        } else {
            None
        };

        let config = ColumnConfig {
            columns: self.table.column_order().to_vec(),
        };
        self.data_dir.save_config(scope, &config)?;

        info!("Saved {}", kind);
        Ok(SaveReport {
            photos: self.table.photos().len(),
            rows,
            columns: config.columns.len(),
        })
    }

    /// Rows in display order as an xlsx file, without identifiers or photos.
    pub fn export(&self) -> Result<Vec<u8>, WorkbookError> {
        let columns = self.table.record_columns();
        let rows: Vec<Row> = self.table.rows().cloned().collect();
        workbook::to_xlsx(TAGGING_WORKSHEET, &workbook::rows_to_grid(&columns, &rows, false))
    }

    fn sync_photos(&self) -> PhotoSync {
        let scope = self.kind().store_scope();
        let result = self.data_dir.save_photos(scope, self.table.photos());
        if let Err(e) = &result {
            error!("Failed to persist photos for {}: {}", self.kind(), e);
        }
        PhotoSync::from_result(result)
    }
}

fn load_table(data_dir: &DataDir, kind: SheetKind) -> TableState {
    let data = parser::parse_sheet(data_dir.root(), kind);
    let scope = kind.store_scope();

    let photos = data_dir.load_photos(scope).unwrap_or_else(|e| {
        error!("Failed to load photos for {}: {}", kind, e);
        PhotoMap::new()
    });
    let config = data_dir.load_config(scope).unwrap_or_else(|e| {
        error!("Failed to load column config for {}: {}", kind, e);
        ColumnConfig::default()
    });

    TableState::load(kind, data, &config.columns, photos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::StoreScope;
    use rust_xlsxwriter::Workbook;
    use std::path::Path;
    use tempfile::tempdir;

    fn admin() -> Actor {
        Actor::admin("owner@example.com")
    }

    fn write_categorized(dir: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(TAGGING_WORKSHEET).unwrap();
        let rows: [&[&str]; 6] = [
            &["Event fired", "Where"],
            &["event", "page"],
            &["Nav", ""],
            &["click", "Home"],
            &["Checkout", ""],
            &["submit", "Checkout Page"],
        ];
        for (r, cells) in rows.iter().enumerate() {
            for (c, value) in cells.iter().enumerate() {
                if !value.is_empty() {
                    sheet.write_string(r as u32, c as u16, *value).unwrap();
                }
            }
        }
        workbook
            .save(dir.join(SheetKind::Tagging.file_name()))
            .unwrap();
    }

    fn write_legacy(dir: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(TAGGING_WORKSHEET).unwrap();
        sheet.write_string(0, 0, "event_action").unwrap();
        sheet.write_string(0, 1, "event_category").unwrap();
        sheet.write_string(1, 0, "click").unwrap();
        sheet.write_string(1, 1, "Navigation").unwrap();
        sheet.write_string(2, 0, "view").unwrap();
        sheet.write_string(2, 1, "Product").unwrap();
        let notes = workbook.add_worksheet();
        notes.set_name("Notes").unwrap();
        notes.write_string(0, 0, "keep me").unwrap();
        workbook
            .save(dir.join(SheetKind::Legacy.file_name()))
            .unwrap();
    }

    fn ids(workspace: &Workspace) -> Vec<String> {
        workspace.table().rows().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn ids_are_stable_across_reload() {
        let dir = tempdir().unwrap();
        write_categorized(dir.path());
        let mut workspace = Workspace::open(DataDir::new(dir.path()), SheetKind::Tagging);
        let before = ids(&workspace);
        assert_eq!(before, vec!["1", "3"]);

        workspace.reload();
        assert_eq!(ids(&workspace), before);
    }

    #[test]
    fn delete_row_removes_persisted_photo() {
        let dir = tempdir().unwrap();
        write_categorized(dir.path());
        let data_dir = DataDir::new(dir.path());
        let mut workspace = Workspace::open(data_dir.clone(), SheetKind::Tagging);
        let id = RowId::new("3");

        let sync = workspace
            .attach_photo(&admin(), &id, "image/png", &[0x89, 0x50, 0x4e, 0x47])
            .unwrap();
        assert_eq!(sync, PhotoSync::Saved);
        let stored = data_dir.load_photos(StoreScope::Tagging).unwrap();
        assert!(stored["3"].starts_with("data:image/png;base64,"));

        assert_eq!(workspace.delete_row(&admin(), &id).unwrap(), PhotoSync::Saved);
        assert!(data_dir.load_photos(StoreScope::Tagging).unwrap().is_empty());

        workspace.reload();
        assert!(workspace.table().photo(&id).is_none());
        assert!(workspace.table().row(&id).is_some());
    }

    #[test]
    fn delete_without_photo_writes_nothing() {
        let dir = tempdir().unwrap();
        write_categorized(dir.path());
        let data_dir = DataDir::new(dir.path());
        let mut workspace = Workspace::open(data_dir.clone(), SheetKind::Tagging);

        let sync = workspace.delete_row(&admin(), &RowId::new("1")).unwrap();
        assert_eq!(sync, PhotoSync::Unchanged);
        assert!(!data_dir.photos_path(StoreScope::Tagging).exists());
    }

    #[test]
    fn non_images_are_rejected() {
        let dir = tempdir().unwrap();
        write_categorized(dir.path());
        let mut workspace = Workspace::open(DataDir::new(dir.path()), SheetKind::Tagging);
        assert_eq!(
            workspace.attach_photo(&admin(), &RowId::new("1"), "text/plain", b"hi"),
            Err(TableError::UnsupportedMedia("text/plain".into()))
        );
        assert!(workspace.table().photos().is_empty());
    }

    #[test]
    fn viewers_cannot_save_or_attach() {
        let dir = tempdir().unwrap();
        write_categorized(dir.path());
        let mut workspace = Workspace::open(DataDir::new(dir.path()), SheetKind::Tagging);
        let viewer = Actor::anonymous();

        assert!(matches!(
            workspace.save(&viewer),
            Err(WorkspaceError::Table(TableError::Forbidden))
        ));
        assert_eq!(
            workspace.attach_photo(&viewer, &RowId::new("1"), "image/png", b"x"),
            Err(TableError::Forbidden)
        );
    }

    #[test]
    fn saved_column_order_survives_reload() {
        let dir = tempdir().unwrap();
        write_categorized(dir.path());
        let mut workspace = Workspace::open(DataDir::new(dir.path()), SheetKind::Tagging);

        workspace
            .table_mut()
            .reorder_columns(&admin(), "page", "event")
            .unwrap();
        let report = workspace.save(&admin()).unwrap();
        assert_eq!(report.rows, None);
        assert_eq!(report.columns, 3);

        workspace.reload();
        assert_eq!(workspace.table().column_order(), ["page", "PHOTO", "event"]);
    }

    #[test]
    fn legacy_save_round_trips_rows_and_keeps_other_sheets() {
        let dir = tempdir().unwrap();
        write_legacy(dir.path());
        let mut workspace = Workspace::open(DataDir::new(dir.path()), SheetKind::Legacy);
        let first = workspace.table().rows().next().unwrap().id.clone();

        workspace
            .table_mut()
            .edit(&admin(), &first, "event_action", "tap")
            .unwrap();
        let report = workspace.save(&admin()).unwrap();
        assert_eq!(report.rows, Some(2));

        workspace.reload();
        let row = workspace.table().row(&first).unwrap();
        assert_eq!(row.get("event_action"), "tap");
        assert_eq!(workspace.table().len(), 2);

        let sheets = workbook::read_all(dir.path().join(SheetKind::Legacy.file_name())).unwrap();
        let names: Vec<&str> = sheets.iter().map(|(name, _)| name.as_str()).collect();
        assert!(names.contains(&"Notes"));
    }

    #[test]
    fn legacy_row_order_survives_save() {
        let dir = tempdir().unwrap();
        write_legacy(dir.path());
        let mut workspace = Workspace::open(DataDir::new(dir.path()), SheetKind::Legacy);
        let before = ids(&workspace);

        let moved = workspace
            .table_mut()
            .move_row(&admin(), &RowId::new(&before[1]), &RowId::new(&before[0]))
            .unwrap();
        assert!(moved);
        workspace.save(&admin()).unwrap();

        workspace.reload();
        assert_eq!(ids(&workspace), [before[1].clone(), before[0].clone()]);
        let events: Vec<&str> = workspace.table().rows().map(|r| r.get("event_action")).collect();
        assert_eq!(events, ["view", "click"]);
    }

    #[test]
    fn reload_discards_unsaved_edits() {
        let dir = tempdir().unwrap();
        write_categorized(dir.path());
        let mut workspace = Workspace::open(DataDir::new(dir.path()), SheetKind::Tagging);
        workspace.table_mut().add_row(&admin()).unwrap();
        assert_eq!(workspace.table().len(), 3);

        workspace.reload();
        assert_eq!(workspace.table().len(), 2);
    }

    #[test]
    fn export_is_an_xlsx_without_ids() {
        let dir = tempdir().unwrap();
        write_categorized(dir.path());
        let workspace = Workspace::open(DataDir::new(dir.path()), SheetKind::Tagging);
        let bytes = workspace.export().unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let path = dir.path().join("export.xlsx");
        std::fs::write(&path, &bytes).unwrap();
        let grid = workbook::read_grid(&path, TAGGING_WORKSHEET).unwrap();
        let header: Vec<String> = grid[0].iter().map(|c| c.text()).collect();
        assert_eq!(header, vec!["event", "page"]);
        assert_eq!(grid.len(), 3);
    }
}
