use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column that carries photo attachments instead of cell text.
pub const PHOTO_COLUMN: &str = "PHOTO";

/// Key under which a row identifier travels in records and workbooks.
pub const ID_COLUMN: &str = "_id";

/// Columns that are never shown or merged into the column order.
pub const IGNORED_COLUMNS: [&str; 2] = ["_label", "contentId"];

/// Worksheet name used inside the tagging workbooks.
pub const TAGGING_WORKSHEET: &str = "Tagging Plan";

/// Returns true for columns hidden from every table view.
pub fn is_ignored_column(name: &str) -> bool {
    IGNORED_COLUMNS.contains(&name)
}

/// Returns true for column names that are not ordinary data fields.
pub fn is_reserved_column(name: &str) -> bool {
    name == PHOTO_COLUMN || name == ID_COLUMN
}

/// One of the fixed data sources the dashboard can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SheetKind {
    /// Flat tagging plan, the only sheet whose rows are written back to disk.
    Legacy,
    /// Categorized tagging plan with a tooltip row and a label row.
    #[default]
    Tagging,
    /// Flat data referential (parameter dictionary).
    Reference,
}

/// Which pair of JSON side stores a sheet uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    Tagging,
    Reference,
}

impl SheetKind {
    pub const ALL: [SheetKind; 3] = [SheetKind::Legacy, SheetKind::Tagging, SheetKind::Reference];

    /// Display name, also accepted by [`SheetKind::from_name`].
    pub fn name(self) -> &'static str {
        match self {
            SheetKind::Legacy => "Legacy Tagging Plan",
            SheetKind::Tagging => "Tagging Plan",
            SheetKind::Reference => "Data ref",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        SheetKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .or_else(|| match name.to_ascii_lowercase().as_str() {
                "legacy" => Some(SheetKind::Legacy),
                "tagging" | "tagging-plan" => Some(SheetKind::Tagging),
                "reference" | "data-ref" => Some(SheetKind::Reference),
                _ => None,
            })
    }

    /// Workbook file backing this sheet, relative to the data directory.
    pub fn file_name(self) -> &'static str {
        match self {
            SheetKind::Legacy => "plan_tagging_fictif.xlsx",
            SheetKind::Tagging => "new tagging plan.xlsx",
            SheetKind::Reference => "data ref.xlsx",
        }
    }

    /// Worksheet to read; the first worksheet is used when it is missing.
    pub fn worksheet(self) -> &'static str {
        match self {
            SheetKind::Legacy | SheetKind::Tagging => TAGGING_WORKSHEET,
            SheetKind::Reference => "Data ref",
        }
    }

    pub fn is_categorized(self) -> bool {
        self == SheetKind::Tagging
    }

    /// Only the legacy sheet round-trips its rows into the workbook.
    pub fn persists_rows(self) -> bool {
        self == SheetKind::Legacy
    }

    pub fn store_scope(self) -> StoreScope {
        match self {
            SheetKind::Reference => StoreScope::Reference,
            SheetKind::Legacy | SheetKind::Tagging => StoreScope::Tagging,
        }
    }
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SheetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SheetKind::from_name(s).ok_or_else(|| format!("Unknown sheet: {}", s))
    }
}

impl StoreScope {
    /// Scope addressed by a raw `sheet` parameter of the side-store endpoints.
    ///
    /// Anything other than the reference sheet shares the tagging stores.
    pub fn for_sheet_param(sheet: Option<&str>) -> Self {
        match sheet.and_then(SheetKind::from_name) {
            Some(kind) => kind.store_scope(),
            None => StoreScope::Tagging,
        }
    }

    pub fn photos_file(self) -> &'static str {
        match self {
            StoreScope::Tagging => "tagging-plan-photos.json",
            StoreScope::Reference => "data-ref-photos.json",
        }
    }

    pub fn config_file(self) -> &'static str {
        match self {
            StoreScope::Tagging => "tagging-plan-config.json",
            StoreScope::Reference => "data-ref-config.json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in SheetKind::ALL {
            assert_eq!(SheetKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.name().parse::<SheetKind>(), Ok(kind));
        }
        assert_eq!(SheetKind::from_name("data REF"), Some(SheetKind::Reference));
        assert_eq!(SheetKind::from_name("legacy"), Some(SheetKind::Legacy));
        assert!("Budget".parse::<SheetKind>().is_err());
    }

    #[test]
    fn legacy_and_tagging_share_stores() {
        assert_eq!(SheetKind::Legacy.store_scope(), SheetKind::Tagging.store_scope());
        assert_ne!(SheetKind::Reference.store_scope(), SheetKind::Tagging.store_scope());
        assert_eq!(StoreScope::for_sheet_param(Some("Data ref")), StoreScope::Reference);
        assert_eq!(StoreScope::for_sheet_param(Some("whatever")), StoreScope::Tagging);
        assert_eq!(StoreScope::for_sheet_param(None), StoreScope::Tagging);
    }

    #[test]
    fn only_tagging_is_categorized() {
        assert!(SheetKind::Tagging.is_categorized());
        assert!(!SheetKind::Legacy.is_categorized());
        assert!(SheetKind::Legacy.persists_rows());
        assert!(!SheetKind::Tagging.persists_rows());
        assert!(!SheetKind::Reference.persists_rows());
    }
}
