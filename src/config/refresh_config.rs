use crate::core::engine::{EngineOptions, ErrorPolicy};
use crate::adapters::http::API_KEY_PARAM;
use crate::core::expander::expand;
use crate::core::exporter::export_target;
use crate::core::poller::{PollPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use crate::domain::model::{Expansion, ParameterAxis, QuerySpec};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{RefreshError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONCURRENT_JOBS: usize = 1;
const MAX_CONCURRENT_JOBS: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub redash: RedashConfig,
    pub export: ExportConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub queries: Vec<QueryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedashConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval_seconds: Option<u64>,
    pub max_attempts: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub concurrent_jobs: Option<usize>,
    pub on_cycle_failure: Option<ErrorPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryEntry {
    pub id: String,
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub expansion: Option<Expansion>,
    pub parameters: Option<Vec<ParameterAxis>>,
    /// 舊格式：參數名稱清單，搭配 `set_params` 的每一列
    pub base_params: Option<Vec<String>>,
    pub set_params: Option<Vec<Vec<String>>>,
}

impl QueryEntry {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// 把 `parameters` 或舊格式的 `base_params` + `set_params` 轉成參數維度
    pub fn axes(&self) -> Result<Vec<ParameterAxis>> {
        match (&self.parameters, &self.base_params) {
            (Some(_), Some(_)) => Err(RefreshError::ConfigValidationError {
                field: format!("queries.{}", self.id),
                message: "use either `parameters` or `base_params`/`set_params`, not both".to_string(),
            }),
            (Some(axes), None) => Ok(axes.clone()),
            (None, Some(names)) => self.axes_from_rows(names),
            (None, None) => {
                if self.set_params.is_some() {
                    return Err(RefreshError::MissingConfigError {
                        field: format!("queries.{}.base_params", self.id),
                    });
                }
                Ok(Vec::new())
            }
        }
    }

    fn axes_from_rows(&self, names: &[String]) -> Result<Vec<ParameterAxis>> {
        let rows = self
            .set_params
            .as_ref()
            .ok_or_else(|| RefreshError::MissingConfigError {
                field: format!("queries.{}.set_params", self.id),
            })?;

        if names.is_empty() && rows.iter().all(Vec::is_empty) {
            return Ok(Vec::new());
        }

        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != names.len()) {
            return Err(RefreshError::ConfigValidationError {
                field: format!("queries.{}.set_params[{}]", self.id, i),
                message: format!(
                    "row has {} values but base_params names {} parameters",
                    row.len(),
                    names.len()
                ),
            });
        }

        Ok(names
            .iter()
            .enumerate()
            .map(|(j, name)| ParameterAxis {
                name: name.clone(),
                values: rows.iter().map(|row| row[j].clone()).collect(),
            })
            .collect())
    }

    pub fn to_spec(&self) -> Result<QuerySpec> {
        Ok(QuerySpec::new(self.id.clone(), self.axes()?)
            .with_expansion(self.expansion.unwrap_or_default()))
    }
}

impl RefreshConfig {
    /// 從檔案載入；`.json` 視為舊版 JSON 格式，其餘以 TOML 解析
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            crate::config::legacy_json::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RefreshError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 命令列或環境變數提供的 API key 優先
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.redash.api_key = key;
        }
        self
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("redash.base_url", &self.redash.base_url)?;

        if self.redash.api_key.trim().is_empty() || self.redash.api_key.contains("${") {
            return Err(RefreshError::MissingConfigError {
                field: "redash.api_key".to_string(),
            });
        }

        validation::validate_path("export.path", &self.export.path)?;

        if let Some(timeout) = self.redash.request_timeout_seconds {
            validation::validate_positive_number("redash.request_timeout_seconds", timeout, 1)?;
        }
        if let Some(interval) = self.polling.interval_seconds {
            validation::validate_positive_number("polling.interval_seconds", interval, 1)?;
        }
        if let Some(attempts) = self.polling.max_attempts {
            validation::validate_positive_number("polling.max_attempts", attempts as u64, 1)?;
        }
        if let Some(timeout) = self.polling.timeout_seconds {
            validation::validate_positive_number("polling.timeout_seconds", timeout, 1)?;
        }
        if let Some(jobs) = self.execution.concurrent_jobs {
            validation::validate_range("execution.concurrent_jobs", jobs, 1, MAX_CONCURRENT_JOBS)?;
        }

        if self.queries.is_empty() {
            return Err(RefreshError::ConfigValidationError {
                field: "queries".to_string(),
                message: "at least one query must be configured".to_string(),
            });
        }

        for query in &self.queries {
            validation::validate_path_segment("queries.id", &query.id)?;
            let spec = query.to_spec()?;
            for axis in &spec.parameter_axes {
                let field = format!("queries.{}.parameters.name", query.id);
                validation::validate_non_empty_string(&field, &axis.name)?;
                if axis.name == API_KEY_PARAM {
                    return Err(RefreshError::InvalidConfigValueError {
                        field,
                        value: axis.name.clone(),
                        reason: format!("'{}' is reserved for authentication", API_KEY_PARAM),
                    });
                }
            }
            // 維度長度、檔名過長等問題在這裡就回報，而不是跑到一半
            for parameters in expand(&spec)? {
                export_target(&spec.query_id, &parameters)?;
            }
        }

        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self
                .polling
                .interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            max_attempts: self.polling.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            deadline: self.polling.timeout_seconds.map(Duration::from_secs),
        }
    }

    pub fn concurrent_jobs(&self) -> usize {
        self.execution
            .concurrent_jobs
            .unwrap_or(DEFAULT_CONCURRENT_JOBS)
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.execution.on_cycle_failure.unwrap_or_default()
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            poll: self.poll_policy(),
            concurrent_jobs: self.concurrent_jobs(),
            error_policy: self.error_policy(),
        }
    }

    /// 啟用中的 query，依設定檔順序
    pub fn query_specs(&self) -> Result<Vec<QuerySpec>> {
        self.queries
            .iter()
            .filter(|q| q.is_enabled())
            .map(QueryEntry::to_spec)
            .collect()
    }
}

/// 替換環境變數 (例如 ${REDASH_API_KEY})；未設定的變數保持原樣
pub(crate) fn substitute_env_vars(content: &str) -> Result<String> {
    use regex::Regex;
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| RefreshError::config(e.to_string()))?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.to_string())
}

impl ConfigProvider for RefreshConfig {
    fn base_url(&self) -> &str {
        &self.redash.base_url
    }

    fn api_key(&self) -> &str {
        &self.redash.api_key
    }

    fn export_path(&self) -> &str {
        &self.export.path
    }

    fn request_timeout_secs(&self) -> u64 {
        self.redash
            .request_timeout_seconds
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

impl Validate for RefreshConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
