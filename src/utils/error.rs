use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefreshError {
    /// 一律經由 [`RefreshError::transport`] 建立，URL 已被移除
    #[error("API request failed: {0}")]
    ApiError(reqwest::Error),

    #[error("{phase} request returned HTTP {status} ({url})")]
    HttpStatusError {
        phase: Phase,
        status: u16,
        url: String,
    },

    #[error("Invalid {phase} response: {message}")]
    ResponseParseError { phase: Phase, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to write export '{path}': {source}")]
    ExportError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration '{field}'")]
    MissingConfigError { field: String },

    #[error("Job {job_id} produced no result after {attempts} status checks ({elapsed_secs}s)")]
    TimeoutError {
        job_id: String,
        attempts: u32,
        elapsed_secs: u64,
    },

    #[error("Job {job_id} ended with status {status}: {message}")]
    JobFailedError {
        job_id: String,
        status: u8,
        message: String,
    },

    #[error("Refresh cancelled")]
    Cancelled,

    #[error("Query {query_id} [{parameters}] failed during {phase}: {source}")]
    CycleError {
        query_id: String,
        parameters: String,
        phase: Phase,
        #[source]
        source: Box<RefreshError>,
    },
}

pub type Result<T> = std::result::Result<T, RefreshError>;

/// 一次 refresh 週期中的階段
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Trigger,
    Poll,
    Export,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Trigger => "trigger",
            Phase::Poll => "poll",
            Phase::Export => "export",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Remote,
    Filesystem,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RefreshError {
    pub fn config(message: impl Into<String>) -> Self {
        RefreshError::ConfigError {
            message: message.into(),
        }
    }

    /// reqwest 的錯誤訊息會帶完整 URL（含 api_key），先去掉再包裝
    pub fn transport(error: reqwest::Error) -> Self {
        RefreshError::ApiError(error.without_url())
    }

    /// 附上 query / 參數 / 階段，讓失敗的週期可以被定位
    pub fn in_cycle(self, query_id: &str, parameters: &str, phase: Phase) -> Self {
        match self {
            already @ RefreshError::CycleError { .. } => already,
            RefreshError::Cancelled => RefreshError::Cancelled,
            other => RefreshError::CycleError {
                query_id: query_id.to_string(),
                parameters: parameters.to_string(),
                phase,
                source: Box::new(other),
            },
        }
    }

    /// 去掉 CycleError 外殼後的根本錯誤
    pub fn root(&self) -> &RefreshError {
        match self {
            RefreshError::CycleError { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.root() {
            RefreshError::ConfigError { .. }
            | RefreshError::ConfigValidationError { .. }
            | RefreshError::InvalidConfigValueError { .. }
            | RefreshError::MissingConfigError { .. } => ErrorCategory::Configuration,
            RefreshError::ApiError(_) | RefreshError::TimeoutError { .. } => {
                ErrorCategory::Network
            }
            RefreshError::HttpStatusError { .. }
            | RefreshError::ResponseParseError { .. }
            | RefreshError::SerializationError(_)
            | RefreshError::JobFailedError { .. } => ErrorCategory::Remote,
            RefreshError::IoError(_) | RefreshError::ExportError { .. } => {
                ErrorCategory::Filesystem
            }
            RefreshError::Cancelled => ErrorCategory::Interrupted,
            RefreshError::CycleError { .. } => unreachable!("root() unwraps cycle errors"),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Interrupted => ErrorSeverity::Low,
            ErrorCategory::Network | ErrorCategory::Remote => ErrorSeverity::Medium,
            ErrorCategory::Filesystem => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.root() {
            RefreshError::ApiError(_) => "Check that base_url is reachable and the Redash server is up",
            RefreshError::HttpStatusError { status: 401 | 403, .. } => {
                "Check the API key; it must belong to a user allowed to run the query"
            }
            RefreshError::HttpStatusError { status: 404, .. } => {
                "Check the query id; the query may have been deleted or archived"
            }
            RefreshError::HttpStatusError { .. } => "Retry later; the Redash server rejected the request",
            RefreshError::ResponseParseError { .. } | RefreshError::SerializationError(_) => {
                "Check that base_url points at a Redash instance and not a proxy or login page"
            }
            RefreshError::TimeoutError { .. } => {
                "Raise polling.max_attempts or polling.timeout_seconds, or check the Redash workers"
            }
            RefreshError::JobFailedError { .. } => {
                "Run the query in the Redash UI with the same parameters to see the failure"
            }
            RefreshError::IoError(_) | RefreshError::ExportError { .. } => {
                "Check that export.path exists or can be created and is writable"
            }
            RefreshError::ConfigError { .. }
            | RefreshError::ConfigValidationError { .. }
            | RefreshError::InvalidConfigValueError { .. }
            | RefreshError::MissingConfigError { .. } => "Fix the configuration file and run again",
            RefreshError::Cancelled => "Run again to refresh the remaining queries",
            RefreshError::CycleError { .. } => unreachable!("root() unwraps cycle errors"),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Network => format!("Could not reach Redash: {}", self),
            ErrorCategory::Remote => format!("Redash refresh failed: {}", self),
            ErrorCategory::Filesystem => format!("Could not write export: {}", self),
            ErrorCategory::Interrupted => "Refresh was cancelled before finishing".to_string(),
        }
    }
}
