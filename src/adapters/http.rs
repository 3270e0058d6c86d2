use crate::domain::model::{JobEnvelope, ParameterSet, QueryResultId};
use crate::domain::ports::{ConfigProvider, RefreshApi};
use crate::utils::error::{Phase, RefreshError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use url::Url;

/// 驗證用的 query 參數名稱，不能拿來當 query 參數
pub const API_KEY_PARAM: &str = "api_key";

/// 以 query string 帶 API key 的 Redash HTTP client
#[derive(Debug, Clone)]
pub struct RedashClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl RedashClient {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| RefreshError::InvalidConfigValueError {
            field: "redash.base_url".to_string(),
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;

        if base_url.cannot_be_a_base() {
            return Err(RefreshError::InvalidConfigValueError {
                field: "redash.base_url".to_string(),
                value: base_url.to_string(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RefreshError::transport)?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        Self::new(
            config.base_url(),
            config.api_key(),
            Duration::from_secs(config.request_timeout_secs()),
        )
    }

    /// `{base}/api/{segments...}?api_key=...`
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base 已在建構時排除
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url.query_pairs_mut().append_pair(API_KEY_PARAM, &self.api_key);
        url
    }

    pub fn refresh_url(&self, query_id: &str, parameters: &ParameterSet) -> Url {
        let mut url = self.endpoint(&["queries", query_id, "refresh"]);
        {
            let mut pairs = url.query_pairs_mut();
            for parameter in parameters.entries() {
                pairs.append_pair(&parameter.name, &parameter.value);
            }
        }
        url
    }

    pub fn job_url(&self, job_id: &str) -> Url {
        self.endpoint(&["jobs", job_id])
    }

    pub fn result_url(&self, query_id: &str, result_id: QueryResultId) -> Url {
        let file = format!("{}.csv", result_id);
        self.endpoint(&["queries", query_id, "results", &file])
    }

    async fn send(&self, request: RequestBuilder, phase: Phase, url: &Url) -> Result<reqwest::Response> {
        tracing::debug!("{} request: {}", phase, redact(url));
        let response = request.send().await.map_err(RefreshError::transport)?;
        let status = response.status();
        tracing::debug!("{} response status: {}", phase, status);

        if !status.is_success() {
            return Err(RefreshError::HttpStatusError {
                phase,
                status: status.as_u16(),
                url: redact(url),
            });
        }
        Ok(response)
    }

    async fn send_for_job(&self, request: RequestBuilder, phase: Phase, url: &Url) -> Result<JobEnvelope> {
        let body = self
            .send(request, phase, url)
            .await?
            .bytes()
            .await
            .map_err(RefreshError::transport)?;
        serde_json::from_slice(&body).map_err(|e| RefreshError::ResponseParseError {
            phase,
            message: format!("{} (body starts with: {:?})", e, preview(&body)),
        })
    }
}

#[async_trait]
impl RefreshApi for RedashClient {
    async fn refresh(&self, query_id: &str, parameters: &ParameterSet) -> Result<JobEnvelope> {
        let url = self.refresh_url(query_id, parameters);
        self.send_for_job(self.client.post(url.clone()), Phase::Trigger, &url)
            .await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobEnvelope> {
        let url = self.job_url(job_id);
        self.send_for_job(self.client.get(url.clone()), Phase::Poll, &url)
            .await
    }

    async fn fetch_result(&self, query_id: &str, result_id: QueryResultId) -> Result<Vec<u8>> {
        let url = self.result_url(query_id, result_id);
        let response = self
            .send(self.client.get(url.clone()), Phase::Export, &url)
            .await?;
        let body = response.bytes().await.map_err(RefreshError::transport)?;
        Ok(body.to_vec())
    }
}

/// 把 api_key 換成 *** 後的 URL，用於 log 與錯誤訊息
pub fn redact(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == API_KEY_PARAM { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), value)
        })
        .collect();

    if pairs.is_empty() {
        return redacted.to_string();
    }

    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

fn preview(body: &[u8]) -> String {
    String::from_utf8_lossy(&body[..body.len().min(80)]).into_owned()
}
