/*!
# Tagging Plan Dashboard

A web service for browsing and editing a digital-analytics tagging plan kept in
spreadsheet workbooks, built in Rust.

## Overview

The tagging plan lives in `.xlsx` files under a data directory. The service
parses them into rows grouped by category, keeps one editable table per sheet
in memory, and persists column order, photo attachments and (for the legacy
plan) the rows themselves. A conversational assistant answers questions using
the current plan as context.

## Architecture

### Parsing Layer
- **Technologies**: calamine
- **Key Components**:
  - Flat parser - first row as headers, one "All" group
  - Categorized parser - tooltip row, label row, category marker rows

### State Layer
- Table state - rows, column order, widths, category visibility
- Single source of truth: the flat list and the grouped view are both derived
  from one row list
- Access policy - exactly one administrator may modify anything

### Persistence Layer
- JSON side stores for photos and column order, one pair per sheet scope
- Legacy rows written back into their workbook with rust_xlsxwriter, other
  worksheets preserved
- XLSX export of the current table

### Web Layer (feature `web`)
- **Technologies**: axum, tower-http, tokio
- Persistence gateway and table endpoints behind one administrator guard
- Assistant endpoint backed by the Gemini REST API

## Sheets

| Sheet               | Workbook                   | Layout      | Rows persisted |
|---------------------|----------------------------|-------------|----------------|
| Legacy Tagging Plan | `plan_tagging_fictif.xlsx` | flat        | yes            |
| Tagging Plan        | `new tagging plan.xlsx`    | categorized | no             |
| Data ref            | `data ref.xlsx`            | flat        | no             |

## Modules

- **sheet**: Sheet names, workbook files and side-store scopes
- **model**: Cells, rows, groups and parsed sheet data
- **workbook**: Reading and writing xlsx workbooks
- **parser**: Flat and categorized sheet parsing
- **table**: In-memory table state and its operations
- **workspace**: A table bound to its files (save, reload, photos, export)
- **store**: JSON photo and column-config stores
- **access**: Roles and the administrator policy
- **placeholder**: Mock rows for empty sheets
- **metrics**: Dashboard summary figures
- **config**: Command line and environment configuration
- **assistant**: Context building and the completion client
- **app**: Routing and middleware
*/

pub mod access;
pub mod error;
pub mod metrics;
pub mod model;
pub mod parser;
pub mod placeholder;
pub mod sheet;
pub mod store;
pub mod table;
pub mod workbook;
pub mod workspace;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod assistant;
#[cfg(feature = "web")]
pub mod config;

pub use access::{AccessPolicy, Actor, Role};
pub use error::{StoreError, TableError, WorkbookError, WorkspaceError};
pub use model::{Row, RowId, SheetData};
pub use sheet::SheetKind;
pub use table::TableState;
pub use workspace::Workspace;
