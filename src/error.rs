use thiserror::Error;

/// Failures reading or writing the JSON side stores (photos, column config).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures reading or writing spreadsheet workbooks.
#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook read error: {0}")]
    Read(#[from] calamine::Error),

    #[error("Workbook write error: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("Workbook contains no sheets")]
    NoSheets,
}

/// Rejections from the in-memory table state machine.
///
/// Every variant leaves the table untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Only the administrator can modify the table")]
    Forbidden,

    #[error("Row not found: {0}")]
    UnknownRow(String),

    #[error("Column not found: {0}")]
    UnknownColumn(String),

    #[error("Invalid column name: {0}")]
    InvalidName(String),

    #[error("Column name already exists: {0}")]
    DuplicateColumn(String),

    #[error("Deleting column \"{0}\" cannot be undone and must be confirmed")]
    ConfirmationRequired(String),

    #[error("Unsupported attachment type: {0}")]
    UnsupportedMedia(String),
}

/// Errors from operations that combine a table mutation with a durable write.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Failed to persist: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to write workbook: {0}")]
    Workbook(#[from] WorkbookError),
}
