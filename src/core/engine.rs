use crate::core::expander::expand;
use crate::core::exporter::{export_target, ResultExporter};
use crate::core::poller::{JobPoller, PollPolicy};
use crate::core::trigger::trigger;
use crate::domain::model::{ExportTarget, JobId, ParameterSet, QueryResultId, QuerySpec};
use crate::domain::ports::{RefreshApi, Storage};
use crate::utils::error::{Phase, RefreshError, Result};
use crate::utils::monitor::SystemMonitor;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// 單一參數集失敗時整批要怎麼處理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// 記錄錯誤，繼續處理剩下的參數集與 query
    #[default]
    Continue,
    /// 第一個失敗就停止整批
    Abort,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub poll: PollPolicy,
    pub concurrent_jobs: usize,
    pub error_policy: ErrorPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            concurrent_jobs: 1,
            error_policy: ErrorPolicy::Continue,
        }
    }
}

#[derive(Debug)]
pub enum CycleStatus {
    Exported {
        job_id: JobId,
        result_id: QueryResultId,
        path: PathBuf,
    },
    Failed(RefreshError),
}

/// trigger → poll → export 一個週期的結果
#[derive(Debug)]
pub struct CycleOutcome {
    pub query_id: String,
    pub parameters: ParameterSet,
    pub duration: Duration,
    pub status: CycleStatus,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, CycleStatus::Exported { .. })
    }

    pub fn error(&self) -> Option<&RefreshError> {
        match &self.status {
            CycleStatus::Failed(e) => Some(e),
            CycleStatus::Exported { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<CycleOutcome>,
    pub aborted: bool,
    pub cancelled: bool,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn first_error(&self) -> Option<&RefreshError> {
        self.outcomes.iter().find_map(CycleOutcome::error)
    }

    /// 執行摘要，供 `--summary-file` 輸出
    pub fn summary(&self) -> serde_json::Value {
        let cycles: Vec<serde_json::Value> = self
            .outcomes
            .iter()
            .map(|outcome| {
                let mut entry = serde_json::json!({
                    "query_id": outcome.query_id,
                    "parameters": outcome.parameters,
                    "duration_ms": outcome.duration.as_millis() as u64,
                    "success": outcome.is_success(),
                });
                match &outcome.status {
                    CycleStatus::Exported {
                        job_id,
                        result_id,
                        path,
                    } => {
                        entry["job_id"] = serde_json::json!(job_id);
                        entry["query_result_id"] = serde_json::json!(result_id);
                        entry["export_path"] = serde_json::json!(path.display().to_string());
                    }
                    CycleStatus::Failed(e) => {
                        entry["error"] = serde_json::json!(e.to_string());
                    }
                }
                entry
            })
            .collect();

        serde_json::json!({
            "run_id": self.run_id,
            "started_at": self.started_at,
            "finished_at": self.finished_at,
            "total_cycles": self.outcomes.len(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
            "aborted": self.aborted,
            "cancelled": self.cancelled,
            "cycles": cycles,
        })
    }
}

/// 展開後、尚未執行的週期（dry run 用）
#[derive(Debug, Clone)]
pub struct PlannedCycle {
    pub query_id: String,
    pub parameters: ParameterSet,
    pub target: ExportTarget,
}

/// 展開所有 query 的參數集；任何一個 query 設定有誤就整批失敗
pub fn plan(queries: &[QuerySpec]) -> Result<Vec<PlannedCycle>> {
    let mut planned = Vec::new();
    for query in queries {
        for parameters in expand(query)? {
            planned.push(PlannedCycle {
                query_id: query.query_id.clone(),
                target: export_target(&query.query_id, &parameters)?,
                parameters,
            });
        }
    }
    Ok(planned)
}

pub struct RefreshEngine<A: RefreshApi, S: Storage> {
    api: A,
    storage: S,
    options: EngineOptions,
    cancel: CancellationToken,
    monitor: Option<SystemMonitor>,
}

impl<A: RefreshApi, S: Storage> RefreshEngine<A, S> {
    pub fn new(api: A, storage: S, options: EngineOptions) -> Self {
        Self {
            api,
            storage,
            options,
            cancel: CancellationToken::new(),
            monitor: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| SystemMonitor::new(true));
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn run(&self, queries: &[QuerySpec]) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = format!("run_{}", started_at.format("%Y%m%d_%H%M%S"));

        // 先展開全部並檢查檔名，設定錯誤在發出任何請求前就回報
        let expanded = queries
            .iter()
            .map(|query| -> Result<(&QuerySpec, Vec<ParameterSet>)> {
                let sets = expand(query)?;
                for parameters in &sets {
                    export_target(&query.query_id, parameters)?;
                }
                Ok((query, sets))
            })
            .collect::<Result<Vec<_>>>()?;

        let total: usize = expanded.iter().map(|(_, sets)| sets.len()).sum();
        tracing::info!(
            "🚀 Starting {}: {} queries, {} refresh cycles (concurrency {})",
            run_id,
            expanded.len(),
            total,
            self.options.concurrent_jobs
        );

        let mut outcomes = Vec::with_capacity(total);
        let mut aborted = false;
        let mut cancelled = false;

        'queries: for (query, sets) in &expanded {
            tracing::info!("📦 Query {}: {} parameter sets", query.query_id, sets.len());

            // buffered 依輸入順序產出結果，log 與報表維持參數集順序
            let mut cycles = futures::stream::iter(
                sets.iter()
                    .map(|parameters| self.run_cycle(&query.query_id, parameters)),
            )
            .buffered(self.options.concurrent_jobs.max(1));

            while let Some(outcome) = cycles.next().await {
                log_outcome(&outcome);

                let was_cancelled = matches!(outcome.error(), Some(RefreshError::Cancelled));
                let failed = !outcome.is_success();
                outcomes.push(outcome);

                if was_cancelled {
                    cancelled = true;
                    break 'queries;
                }
                if failed && self.options.error_policy == ErrorPolicy::Abort {
                    tracing::error!("🛑 Aborting run after failed cycle (on_cycle_failure = abort)");
                    aborted = true;
                    break 'queries;
                }
            }

            if let Some(monitor) = &self.monitor {
                monitor.log_stats(&format!("query {}", query.query_id));
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            aborted,
            cancelled,
        };

        tracing::info!(
            "🏁 Finished {}: {} exported, {} failed{}",
            report.run_id,
            report.succeeded(),
            report.failed(),
            if report.cancelled { " (cancelled)" } else { "" }
        );

        Ok(report)
    }

    async fn run_cycle(&self, query_id: &str, parameters: &ParameterSet) -> CycleOutcome {
        let started = Instant::now();

        let status = tokio::select! {
            _ = self.cancel.cancelled() => Err(RefreshError::Cancelled),
            result = self.drive_cycle(query_id, parameters) => result,
        };

        CycleOutcome {
            query_id: query_id.to_string(),
            parameters: parameters.clone(),
            duration: started.elapsed(),
            status: match status {
                Ok((job_id, result_id, path)) => CycleStatus::Exported {
                    job_id,
                    result_id,
                    path,
                },
                Err(e) => CycleStatus::Failed(e),
            },
        }
    }

    async fn drive_cycle(
        &self,
        query_id: &str,
        parameters: &ParameterSet,
    ) -> Result<(JobId, QueryResultId, PathBuf)> {
        let label = parameters.to_string();
        tracing::debug!("Refreshing query {} [{}]", query_id, label);

        let job_id = trigger(&self.api, query_id, parameters)
            .await
            .map_err(|e| e.in_cycle(query_id, &label, Phase::Trigger))?;

        let result_id = JobPoller::new(&self.api, self.options.poll, self.cancel.clone())
            .poll(&job_id)
            .await
            .map_err(|e| e.in_cycle(query_id, &label, Phase::Poll))?;

        let path = ResultExporter::new(&self.api, &self.storage)
            .export(query_id, parameters, result_id)
            .await
            .map_err(|e| e.in_cycle(query_id, &label, Phase::Export))?;

        Ok((job_id, result_id, path))
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match &outcome.status {
        CycleStatus::Exported {
            job_id,
            result_id,
            path,
        } => tracing::info!(
            "✅ Query {} [{}] exported to {} (job {}, result {}, {:.1?})",
            outcome.query_id,
            outcome.parameters,
            path.display(),
            job_id,
            result_id,
            outcome.duration
        ),
        CycleStatus::Failed(RefreshError::Cancelled) => tracing::warn!(
            "⚠️ Query {} [{}] cancelled",
            outcome.query_id,
            outcome.parameters
        ),
        CycleStatus::Failed(e) => {
            tracing::error!("❌ {}", e);
            tracing::debug!("💡 {}", e.recovery_suggestion());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{finished, pending, MemoryStorage, ScriptedApi};
    use crate::domain::model::ParameterAxis;
    use std::path::Path;

    fn fast_options(error_policy: ErrorPolicy) -> EngineOptions {
        EngineOptions {
            poll: PollPolicy {
                interval: Duration::from_millis(2),
                max_attempts: 3,
                deadline: None,
            },
            concurrent_jobs: 1,
            error_policy,
        }
    }

    fn monthly(query_id: &str, months: &[&str]) -> QuerySpec {
        QuerySpec::new(
            query_id,
            vec![ParameterAxis::new("month", months.to_vec())],
        )
    }

    #[tokio::test]
    async fn test_runs_queries_in_order() {
        let engine = RefreshEngine::new(
            ScriptedApi::new(),
            MemoryStorage::new(),
            fast_options(ErrorPolicy::Continue),
        );
        let queries = vec![
            monthly("Q1", &["2024-01", "2024-02"]),
            QuerySpec::new("Q2", vec![]),
        ];

        let report = engine.run(&queries).await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 3);
        let order: Vec<(String, String)> = engine
            .api()
            .refresh_calls()
            .into_iter()
            .map(|(q, p)| (q, p.to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Q1".to_string(), "month=2024-01".to_string()),
                ("Q1".to_string(), "month=2024-02".to_string()),
                ("Q2".to_string(), "no parameters".to_string()),
            ]
        );

        let storage = engine.storage();
        assert_eq!(
            storage.get_file(Path::new("Q1").join("2024-01.csv")).unwrap(),
            ScriptedApi::payload_for(101)
        );
        assert_eq!(
            storage.get_file(Path::new("Q1").join("2024-02.csv")).unwrap(),
            ScriptedApi::payload_for(102)
        );
        assert!(storage.get_file(Path::new("Q2").join("result.csv")).is_some());
    }

    #[tokio::test]
    async fn test_config_error_before_any_request() {
        let engine = RefreshEngine::new(
            ScriptedApi::new(),
            MemoryStorage::new(),
            EngineOptions::default(),
        );
        let bad = QuerySpec::new(
            "Q9",
            vec![
                ParameterAxis::new("from", vec!["a", "b"]),
                ParameterAxis::new("to", vec!["x"]),
            ],
        );

        let err = engine
            .run(&[monthly("Q1", &["2024-01"]), bad])
            .await
            .unwrap_err();

        assert!(matches!(err, RefreshError::ConfigError { .. }));
        assert!(engine.api().refresh_calls().is_empty());
    }

    #[tokio::test]
    async fn test_overlong_file_name_fails_before_any_request() {
        let engine = RefreshEngine::new(
            ScriptedApi::new(),
            MemoryStorage::new(),
            EngineOptions::default(),
        );
        let city = "東京".repeat(30);
        let queries = [
            monthly("Q1", &["2024-01"]),
            QuerySpec::new("Q2", vec![ParameterAxis::new("city", vec![city.as_str()])]),
        ];

        let err = engine.run(&queries).await.unwrap_err();

        assert!(matches!(err, RefreshError::ConfigError { .. }));
        assert!(engine.api().refresh_calls().is_empty());
        assert!(plan(&queries).is_err());
    }

    #[tokio::test]
    async fn test_continue_policy_keeps_going() {
        // 第一次 refresh 失敗，其餘照常
        let api = ScriptedApi::new().with_refresh_failure();
        let engine = RefreshEngine::new(api, MemoryStorage::new(), fast_options(ErrorPolicy::Continue));

        let report = engine
            .run(&[monthly("Q1", &["2024-01", "2024-02"]), monthly("Q2", &["2024-01"])])
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failed(), 1);
        assert!(!report.aborted);

        match report.first_error().unwrap() {
            RefreshError::CycleError {
                query_id,
                parameters,
                phase,
                ..
            } => {
                assert_eq!(query_id, "Q1");
                assert_eq!(parameters, "month=2024-01");
                assert_eq!(*phase, Phase::Trigger);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(engine.storage().len(), 2);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_first_failure() {
        let api = ScriptedApi::new()
            .with_refresh(pending("job-a"))
            .with_status("job-a", vec![pending("job-a")]);
        let engine = RefreshEngine::new(api, MemoryStorage::new(), fast_options(ErrorPolicy::Abort));

        let report = engine
            .run(&[monthly("Q1", &["2024-01", "2024-02"]), monthly("Q2", &["2024-01"])])
            .await
            .unwrap();

        assert!(report.aborted);
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(
            report.first_error().map(RefreshError::root),
            Some(RefreshError::TimeoutError { attempts: 3, .. })
        ));
        assert_eq!(engine.api().refresh_calls().len(), 1);
        assert_eq!(engine.storage().len(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_keep_output_order() {
        // job-1 比 job-2 晚完成，報表仍依參數集順序
        let api = ScriptedApi::new().with_status(
            "job-1",
            vec![pending("job-1"), pending("job-1"), finished("job-1", 501)],
        );
        let mut options = fast_options(ErrorPolicy::Continue);
        options.concurrent_jobs = 4;
        let engine = RefreshEngine::new(api, MemoryStorage::new(), options);

        let report = engine
            .run(&[monthly("Q1", &["2024-01", "2024-02", "2024-03"])])
            .await
            .unwrap();

        let months: Vec<String> = report
            .outcomes
            .iter()
            .map(|o| o.parameters.to_string())
            .collect();
        assert_eq!(months, vec!["month=2024-01", "month=2024-02", "month=2024-03"]);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(engine.storage().len(), 3);
        assert_eq!(engine.api().refresh_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_early() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = RefreshEngine::new(
            ScriptedApi::new(),
            MemoryStorage::new(),
            fast_options(ErrorPolicy::Continue),
        )
        .with_cancellation(cancel);

        let report = engine
            .run(&[monthly("Q1", &["2024-01", "2024-02"])])
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(engine.storage().len(), 0);
    }

    #[test]
    fn test_plan_lists_targets() {
        let planned = plan(&[monthly("Q1", &["2024-01", "2024-02"])]).unwrap();

        assert_eq!(planned.len(), 2);
        assert_eq!(planned[1].target.file_name, "2024-02.csv");
        assert_eq!(planned[1].query_id, "Q1");
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let api = ScriptedApi::new().with_failing_result(102);
        let engine = RefreshEngine::new(api, MemoryStorage::new(), fast_options(ErrorPolicy::Continue));

        let report = engine
            .run(&[monthly("Q1", &["2024-01", "2024-02"])])
            .await
            .unwrap();
        let summary = report.summary();

        assert_eq!(summary["total_cycles"], 2);
        assert_eq!(summary["succeeded"], 1);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["cycles"][0]["query_result_id"], 101);
        assert!(summary["cycles"][1]["error"]
            .as_str()
            .unwrap()
            .contains("failed during export"));
    }
}
