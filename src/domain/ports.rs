use crate::domain::model::{JobEnvelope, ParameterSet, QueryResultId};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// 匯出檔案的落地位置
pub trait Storage: Send + Sync {
    /// 寫入相對路徑，成功後回傳實際位置；既有檔案會被覆蓋
    fn write_file(
        &self,
        path: &Path,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<PathBuf>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn base_url(&self) -> &str;
    fn api_key(&self) -> &str;
    fn export_path(&self) -> &str;
    fn request_timeout_secs(&self) -> u64;
}

/// Redash 的三支 API
#[async_trait]
pub trait RefreshApi: Send + Sync {
    async fn refresh(&self, query_id: &str, parameters: &ParameterSet) -> Result<JobEnvelope>;
    async fn job_status(&self, job_id: &str) -> Result<JobEnvelope>;
    async fn fetch_result(&self, query_id: &str, result_id: QueryResultId) -> Result<Vec<u8>>;
}
