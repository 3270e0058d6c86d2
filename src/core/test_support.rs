use crate::domain::model::{Job, JobEnvelope, ParameterSet, QueryResultId};
use crate::domain::ports::{RefreshApi, Storage};
use crate::utils::error::{Phase, RefreshError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// 依腳本回應的 Redash API 替身，並記錄每一次呼叫
#[derive(Default)]
pub struct ScriptedApi {
    refresh_script: Mutex<VecDeque<Option<Job>>>,
    status_script: Mutex<HashMap<String, VecDeque<Option<Job>>>>,
    failing_results: Mutex<HashSet<u64>>,
    refresh_calls: Mutex<Vec<(String, ParameterSet)>>,
    status_calls: Mutex<Vec<String>>,
    fetch_calls: Mutex<Vec<(String, u64)>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refresh(self, job: Job) -> Self {
        self.refresh_script.lock().unwrap().push_back(Some(job));
        self
    }

    pub fn with_refresh_failure(self) -> Self {
        self.refresh_script.lock().unwrap().push_back(None);
        self
    }

    /// 依序回應 job 狀態；最後一筆會持續重複
    pub fn with_status(self, job_id: &str, jobs: Vec<Job>) -> Self {
        self.status_script
            .lock()
            .unwrap()
            .insert(job_id.to_string(), jobs.into_iter().map(Some).collect());
        self
    }

    pub fn with_failing_result(self, result_id: u64) -> Self {
        self.failing_results.lock().unwrap().insert(result_id);
        self
    }

    pub fn refresh_calls(&self) -> Vec<(String, ParameterSet)> {
        self.refresh_calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<String> {
        self.status_calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> Vec<(String, u64)> {
        self.fetch_calls.lock().unwrap().clone()
    }

    pub fn payload_for(result_id: u64) -> Vec<u8> {
        format!("id,value\n{},ok\n", result_id).into_bytes()
    }
}

pub fn pending(job_id: &str) -> Job {
    Job {
        id: Some(job_id.to_string()),
        status: Some(2),
        query_result_id: Some(0),
        ..Job::default()
    }
}

pub fn finished(job_id: &str, result_id: u64) -> Job {
    Job {
        id: Some(job_id.to_string()),
        status: Some(3),
        query_result_id: Some(result_id),
        ..Job::default()
    }
}

fn remote_failure(phase: Phase) -> RefreshError {
    RefreshError::HttpStatusError {
        phase,
        status: 502,
        url: "stub".to_string(),
    }
}

#[async_trait]
impl RefreshApi for ScriptedApi {
    async fn refresh(&self, query_id: &str, parameters: &ParameterSet) -> Result<JobEnvelope> {
        let call = {
            let mut calls = self.refresh_calls.lock().unwrap();
            calls.push((query_id.to_string(), parameters.clone()));
            calls.len()
        };

        // 沒有腳本時自動配發 job-1, job-2, ...
        let job = self
            .refresh_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Some(pending(&format!("job-{}", call))));

        job.map(|job| JobEnvelope { job })
            .ok_or_else(|| remote_failure(Phase::Trigger))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobEnvelope> {
        self.status_calls.lock().unwrap().push(job_id.to_string());

        let step = {
            let mut scripts = self.status_script.lock().unwrap();
            match scripts.get_mut(job_id) {
                Some(queue) if queue.len() > 1 => queue.pop_front().flatten(),
                Some(queue) => queue.front().cloned().flatten(),
                // 沒有腳本的 job 直接完成，result id 取 job 名稱後的數字
                None => {
                    let n = job_id
                        .rsplit('-')
                        .next()
                        .and_then(|n| n.parse::<u64>().ok())
                        .unwrap_or(1);
                    Some(finished(job_id, 100 + n))
                }
            }
        };

        step.map(|job| JobEnvelope { job })
            .ok_or_else(|| remote_failure(Phase::Poll))
    }

    async fn fetch_result(&self, query_id: &str, result_id: QueryResultId) -> Result<Vec<u8>> {
        self.fetch_calls
            .lock()
            .unwrap()
            .push((query_id.to_string(), result_id.0));

        if self.failing_results.lock().unwrap().contains(&result_id.0) {
            return Err(remote_failure(Phase::Export));
        }
        Ok(Self::payload_for(result_id.0))
    }
}

/// 記憶體中的 Storage
#[derive(Clone, Default)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path.as_ref()).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

impl Storage for MemoryStorage {
    async fn write_file(&self, path: &Path, data: &[u8]) -> Result<PathBuf> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data.to_vec());
        Ok(path.to_path_buf())
    }
}
