use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::sheet::{SheetKind, StoreScope};

/// Row identifier to `data:` URI of the attached image.
pub type PhotoMap = BTreeMap<String, String>;

/// Persisted column order of one sheet scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Location of the workbooks and the JSON side stores.
///
/// Every write is an unconditional overwrite of a single file; the last writer
/// wins.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataDir { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workbook_path(&self, kind: SheetKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub fn photos_path(&self, scope: StoreScope) -> PathBuf {
        self.root.join(scope.photos_file())
    }

    pub fn config_path(&self, scope: StoreScope) -> PathBuf {
        self.root.join(scope.config_file())
    }

    /// Stored attachments, or an empty map when nothing was saved yet.
    pub fn load_photos(&self, scope: StoreScope) -> Result<PhotoMap, StoreError> {
        read_json_or_default(&self.photos_path(scope))
    }

    pub fn save_photos(&self, scope: StoreScope, photos: &PhotoMap) -> Result<(), StoreError> {
        write_json(&self.photos_path(scope), photos)?;
        info!("Saved {} photos for {:?}", photos.len(), scope);
        Ok(())
    }

    /// Stored column order, or an empty list when nothing was saved yet.
    pub fn load_config(&self, scope: StoreScope) -> Result<ColumnConfig, StoreError> {
        read_json_or_default(&self.config_path(scope))
    }

    pub fn save_config(&self, scope: StoreScope, config: &ColumnConfig) -> Result<(), StoreError> {
        write_json(&self.config_path(scope), config)?;
        info!("Saved {} columns for {:?}", config.columns.len(), scope);
        Ok(())
    }
}

fn read_json_or_default<T>(path: &Path) -> Result<T, StoreError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if !path.exists() {
        debug!("{} does not exist yet", path.display());
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_files_read_as_empty() {
        let dir = tempdir().unwrap();
        let data = DataDir::new(dir.path());
        assert!(data.load_photos(StoreScope::Tagging).unwrap().is_empty());
        assert!(data.load_config(StoreScope::Reference).unwrap().columns.is_empty());
    }

    #[test]
    fn scopes_are_independent() {
        let dir = tempdir().unwrap();
        let data = DataDir::new(dir.path().join("nested"));

        let mut photos = PhotoMap::new();
        photos.insert("4".into(), "data:image/png;base64,AAAA".into());
        data.save_photos(StoreScope::Tagging, &photos).unwrap();

        assert_eq!(data.load_photos(StoreScope::Tagging).unwrap(), photos);
        assert!(data.load_photos(StoreScope::Reference).unwrap().is_empty());
    }

    #[test]
    fn config_overwrites_wholesale() {
        let dir = tempdir().unwrap();
        let data = DataDir::new(dir.path());

        let first = ColumnConfig {
            columns: vec!["a".into(), "b".into(), "c".into()],
        };
        let second = ColumnConfig {
            columns: vec!["c".into()],
        };
        data.save_config(StoreScope::Tagging, &first).unwrap();
        data.save_config(StoreScope::Tagging, &second).unwrap();
        assert_eq!(data.load_config(StoreScope::Tagging).unwrap(), second);
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let dir = tempdir().unwrap();
        let data = DataDir::new(dir.path());
        fs::write(data.photos_path(StoreScope::Tagging), "{not json").unwrap();
        assert!(matches!(
            data.load_photos(StoreScope::Tagging),
            Err(StoreError::Json(_))
        ));
    }
}
