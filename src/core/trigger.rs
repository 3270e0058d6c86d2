use crate::domain::model::{JobId, ParameterSet};
use crate::domain::ports::RefreshApi;
use crate::utils::error::{Phase, RefreshError, Result};

/// 對一組參數發出 refresh，回傳非同步 job 的 id
pub async fn trigger<A: RefreshApi + ?Sized>(
    api: &A,
    query_id: &str,
    parameters: &ParameterSet,
) -> Result<JobId> {
    let envelope = api.refresh(query_id, parameters).await?;

    match envelope.job.id {
        Some(id) if !id.trim().is_empty() => {
            tracing::debug!("Query {} refresh queued as job {}", query_id, id);
            Ok(JobId(id))
        }
        _ => Err(RefreshError::ResponseParseError {
            phase: Phase::Trigger,
            message: format!(
                "refresh response has no job.id (error: {})",
                envelope.job.error.as_deref().filter(|e| !e.is_empty()).unwrap_or("none")
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::ScriptedApi;
    use crate::domain::model::Job;

    #[tokio::test]
    async fn test_returns_job_id() {
        let api = ScriptedApi::new().with_refresh(Job {
            id: Some("job-7".to_string()),
            status: Some(1),
            ..Job::default()
        });
        let set: ParameterSet = [("month", "2024-01")].into_iter().collect();

        let job_id = trigger(&api, "42", &set).await.unwrap();

        assert_eq!(job_id, JobId("job-7".to_string()));
        assert_eq!(api.refresh_calls(), vec![("42".to_string(), set)]);
    }

    #[tokio::test]
    async fn test_missing_job_id_is_an_error() {
        let api = ScriptedApi::new().with_refresh(Job {
            error: Some("Query is archived".to_string()),
            ..Job::default()
        });

        let err = trigger(&api, "42", &ParameterSet::empty()).await.unwrap_err();

        match err {
            RefreshError::ResponseParseError { phase, message } => {
                assert_eq!(phase, Phase::Trigger);
                assert!(message.contains("Query is archived"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
