use crate::domain::model::{ExportTarget, ParameterSet, QueryResultId};
use crate::domain::ports::{RefreshApi, Storage};
use crate::utils::error::{RefreshError, Result};
use std::fmt::Write as _;
use std::path::PathBuf;

pub const EXPORT_EXTENSION: &str = "csv";
const UNPARAMETERIZED_STEM: &str = "result";
/// 常見檔案系統（ext4、APFS、NTFS）單一檔名的上限
pub const MAX_FILE_NAME_BYTES: usize = 255;

/// 保留 `[A-Za-z0-9.-]`，其餘位元組（包含 `_`）一律 %XX，
/// 再以 `_` 串接，不同參數集永遠得到不同檔名
pub fn file_stem(parameters: &ParameterSet) -> String {
    if parameters.is_empty() {
        return UNPARAMETERIZED_STEM.to_string();
    }

    parameters
        .values()
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("_")
}

fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{:02X}", byte);
        }
    }

    // "", "." 與 ".." 不能當檔名的一部分直接出現
    match encoded.as_str() {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => encoded,
    }
}

/// 檔名超過 [`MAX_FILE_NAME_BYTES`] 視為設定錯誤，在發出 refresh 前就回報
pub fn export_target(query_id: &str, parameters: &ParameterSet) -> Result<ExportTarget> {
    let file_name = format!("{}.{}", file_stem(parameters), EXPORT_EXTENSION);

    if file_name.len() > MAX_FILE_NAME_BYTES {
        return Err(RefreshError::config(format!(
            "query {} [{}]: export file name is {} bytes after encoding (limit {}); shorten the parameter values",
            query_id,
            parameters,
            file_name.len(),
            MAX_FILE_NAME_BYTES
        )));
    }

    Ok(ExportTarget {
        query_id: query_id.to_string(),
        file_name,
    })
}

pub struct ResultExporter<'a, A: RefreshApi + ?Sized, S: Storage> {
    api: &'a A,
    storage: &'a S,
}

impl<'a, A: RefreshApi + ?Sized, S: Storage> ResultExporter<'a, A, S> {
    pub fn new(api: &'a A, storage: &'a S) -> Self {
        Self { api, storage }
    }

    /// 下載結果並原封不動寫入 `{query_id}/{stem}.csv`
    pub async fn export(
        &self,
        query_id: &str,
        parameters: &ParameterSet,
        result_id: QueryResultId,
    ) -> Result<PathBuf> {
        let target = export_target(query_id, parameters)?;
        let payload = self.api.fetch_result(query_id, result_id).await?;

        tracing::debug!(
            "Fetched result {} for query {} ({} bytes)",
            result_id,
            query_id,
            payload.len()
        );

        self.storage
            .write_file(&target.relative_path(), &payload)
            .await
    }
}
