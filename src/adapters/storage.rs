use crate::domain::ports::Storage;
use crate::utils::error::{RefreshError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// 寫入本機匯出目錄；先寫暫存檔再 rename，讀者不會看到寫一半的檔案
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn write_atomic(full_path: &Path, data: &[u8]) -> std::io::Result<()> {
        let parent = full_path.parent().unwrap_or_else(|| Path::new("."));

        // create_dir_all 對已存在的目錄不報錯，並行建立也安全
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(data)?;
        temp.as_file().sync_all()?;
        temp.persist(full_path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Storage for LocalStorage {
    async fn write_file(&self, path: &Path, data: &[u8]) -> Result<PathBuf> {
        let full_path = self.base_path.join(path);

        Self::write_atomic(&full_path, data).map_err(|source| RefreshError::ExportError {
            path: full_path.display().to_string(),
            source,
        })?;

        tracing::debug!("Wrote {} bytes to {}", data.len(), full_path.display());
        Ok(full_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_query_directory_on_demand() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().join("exports"));

        let written = storage
            .write_file(Path::new("42/2024-01.csv"), b"a,b\n1,2\n")
            .await
            .unwrap();

        assert_eq!(written, temp_dir.path().join("exports/42/2024-01.csv"));
        assert_eq!(fs::read(&written).unwrap(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_overwrites_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage
            .write_file(Path::new("42/result.csv"), b"a much longer first payload\n")
            .await
            .unwrap();
        let written = storage
            .write_file(Path::new("42/result.csv"), b"short\n")
            .await
            .unwrap();

        assert_eq!(fs::read(&written).unwrap(), b"short\n");

        // 暫存檔不應殘留
        let entries = fs::read_dir(temp_dir.path().join("42")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_unwritable_target_is_export_error() {
        let temp_dir = TempDir::new().unwrap();
        // 目標目錄位置被一般檔案佔用
        fs::write(temp_dir.path().join("42"), b"not a directory").unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        let err = storage
            .write_file(Path::new("42/result.csv"), b"x")
            .await
            .unwrap_err();

        assert!(matches!(err, RefreshError::ExportError { .. }));
    }
}
