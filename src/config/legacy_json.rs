//! 舊版 `config.json` 格式：
//!
//! ```json
//! {
//!   "apiKey": "...",
//!   "baseURL": "https://redash.example.com",
//!   "exportPath": "./exports",
//!   "query": [
//!     { "queryId": "42", "baseParams": ["month"], "setParams": [["2024-01"], ["2024-02"]] }
//!   ]
//! }
//! ```

use crate::config::refresh_config::{
    substitute_env_vars, ExecutionConfig, ExportConfig, PollingConfig, QueryEntry, RedashConfig,
    RefreshConfig,
};
use crate::utils::error::{RefreshError, Result};
use serde::Deserialize;

// 舊工具比對欄位名稱不分大小寫，常見的大小寫寫法都要接受
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConfig {
    #[serde(alias = "APIKey", alias = "ApiKey", alias = "apikey")]
    api_key: String,
    #[serde(rename = "baseURL", alias = "baseUrl", alias = "BaseURL", alias = "BaseUrl", alias = "baseurl")]
    base_url: String,
    #[serde(alias = "ExportPath", alias = "exportpath")]
    export_path: String,
    #[serde(default, alias = "Query")]
    query: Vec<LegacyQuery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyQuery {
    #[serde(alias = "queryID", alias = "QueryID", alias = "QueryId", alias = "queryid")]
    query_id: String,
    #[serde(default, alias = "BaseParams", alias = "baseparams")]
    base_params: Vec<String>,
    #[serde(default, alias = "SetParams", alias = "setparams")]
    set_params: Vec<Vec<String>>,
}

pub fn from_json_str(content: &str) -> Result<RefreshConfig> {
    let processed_content = substitute_env_vars(content)?;

    let legacy: LegacyConfig =
        serde_json::from_str(&processed_content).map_err(|e| RefreshError::ConfigValidationError {
            field: "json_parsing".to_string(),
            message: format!("JSON parsing error: {}", e),
        })?;

    Ok(legacy.into_config())
}

impl LegacyConfig {
    fn into_config(self) -> RefreshConfig {
        RefreshConfig {
            redash: RedashConfig {
                base_url: self.base_url,
                api_key: self.api_key,
                request_timeout_seconds: None,
            },
            export: ExportConfig {
                path: self.export_path,
            },
            polling: PollingConfig::default(),
            execution: ExecutionConfig::default(),
            queries: self
                .query
                .into_iter()
                .map(|q| QueryEntry {
                    id: q.query_id,
                    base_params: Some(q.base_params),
                    set_params: Some(q.set_params),
                    ..QueryEntry::default()
                })
                .collect(),
        }
    }
}
