use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 一個參數維度：名稱 + 依序要代入的值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterAxis {
    pub name: String,
    pub values: Vec<String>,
}

impl ParameterAxis {
    pub fn new(name: impl Into<String>, values: Vec<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// 多個維度如何組合成參數集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expansion {
    /// 第 i 個參數集取每個維度的第 i 個值，各維度長度必須相同
    #[default]
    Zip,
    /// 所有維度值的笛卡兒積，第一個維度變化最慢
    Cartesian,
}

/// 一個要 refresh 的 Redash query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub query_id: String,
    pub parameter_axes: Vec<ParameterAxis>,
    pub expansion: Expansion,
}

impl QuerySpec {
    pub fn new(query_id: impl Into<String>, parameter_axes: Vec<ParameterAxis>) -> Self {
        Self {
            query_id: query_id.into(),
            parameter_axes,
            expansion: Expansion::Zip,
        }
    }

    pub fn with_expansion(mut self, expansion: Expansion) -> Self {
        self.expansion = expansion;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// 一次執行的具體參數值，依維度順序排列
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ParameterSet {
    entries: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new(entries: Vec<Parameter>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Parameter] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|p| p.value.as_str())
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| Parameter {
                    name: name.into(),
                    value: value.into(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("no parameters");
        }
        let joined = self
            .entries
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&joined)
    }
}

/// Redash 的 job envelope，refresh 與 job status 兩支 API 共用
#[derive(Debug, Clone, Deserialize)]
pub struct JobEnvelope {
    pub job: Job,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<u8>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub query_result_id: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<serde_json::Value>,
}

impl Job {
    /// 0 或 null 代表結果尚未產生
    pub fn result_id(&self) -> Option<QueryResultId> {
        self.query_result_id.filter(|id| *id != 0).map(QueryResultId)
    }

    pub fn state(&self) -> JobState {
        JobState::from_code(self.status.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Started,
    Success,
    Failure,
    Cancelled,
    Unknown(u8),
}

impl JobState {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => JobState::Pending,
            2 => JobState::Started,
            3 => JobState::Success,
            4 => JobState::Failure,
            5 => JobState::Cancelled,
            other => JobState::Unknown(other),
        }
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, JobState::Failure | JobState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QueryResultId(pub u64);

impl fmt::Display for QueryResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 匯出檔案的位置：`{export_root}/{query_id}/{file_name}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTarget {
    pub query_id: String,
    pub file_name: String,
}

impl ExportTarget {
    /// 相對於匯出根目錄的路徑
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.query_id).join(&self.file_name)
    }
}
