//! Search-index resynchronization.
//!
//! After a run that wrote merged output, the engine asks the index to
//! re-ingest the bucket. The engine only starts the job; polling its
//! progress is left to operators (`shelf sync-status`).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ErrorCode;

/// Result of asking the index to start an ingestion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Started { job_id: String, status: String },
    Failed { error: String },
}

/// Progress of an ingestion job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub job_id: String,
    pub status: String,
    pub statistics: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("index sync is not configured")]
    Disabled,

    #[error("index request failed: {0}")]
    Transport(String),

    #[error("index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("index response unusable: {0}")]
    InvalidResponse(String),
}

impl SyncError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Disabled => ErrorCode::NotInitialized,
            _ => ErrorCode::IndexSyncFailed,
        }
    }
}

/// Client for the downstream search index.
pub trait IndexSync {
    /// Start re-ingestion. Failures are reported in the outcome, never raised.
    fn start_sync(&self) -> SyncOutcome;

    /// Look up an ingestion job.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the job cannot be fetched.
    fn sync_status(&self, job_id: &str) -> Result<SyncStatus, SyncError>;
}

/// Stand-in used when no index endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledIndexSync;

impl IndexSync for DisabledIndexSync {
    fn start_sync(&self) -> SyncOutcome {
        debug!("index sync disabled; skipping");
        SyncOutcome::Started {
            job_id: "disabled".to_string(),
            status: "SKIPPED".to_string(),
        }
    }

    fn sync_status(&self, _job_id: &str) -> Result<SyncStatus, SyncError> {
        Err(SyncError::Disabled)
    }
}

/// Ingestion-job API over blocking HTTP.
///
/// `POST {endpoint}/knowledge-bases/{kb}/data-sources/{ds}/ingestion-jobs`
/// starts a job; `GET` on `…/ingestion-jobs/{job_id}` describes one. Both
/// reply with an `ingestionJob` object.
pub struct HttpIndexSync {
    jobs_url: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobEnvelope {
    ingestion_job: IngestionJob,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestionJob {
    ingestion_job_id: String,
    status: String,
    #[serde(default)]
    statistics: Map<String, Value>,
}

impl HttpIndexSync {
    #[must_use]
    pub fn new(endpoint: &str, knowledge_base_id: &str, data_source_id: &str, timeout: Duration) -> Self {
        let jobs_url = format!(
            "{}/knowledge-bases/{knowledge_base_id}/data-sources/{data_source_id}/ingestion-jobs",
            endpoint.trim_end_matches('/')
        );
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { jobs_url, agent }
    }

    #[must_use]
    pub fn jobs_url(&self) -> &str {
        &self.jobs_url
    }

    fn fetch(&self, request: ureq::Request) -> Result<IngestionJob, SyncError> {
        let response = request.call().map_err(|err| match err {
            ureq::Error::Status(status, response) => SyncError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => SyncError::Transport(transport.to_string()),
        })?;
        let envelope: JobEnvelope = response
            .into_json()
            .map_err(|err| SyncError::InvalidResponse(err.to_string()))?;
        Ok(envelope.ingestion_job)
    }
}

impl IndexSync for HttpIndexSync {
    fn start_sync(&self) -> SyncOutcome {
        let request = self.agent.post(&self.jobs_url).set("accept", "application/json");
        match self.fetch(request) {
            Ok(job) => SyncOutcome::Started {
                job_id: job.ingestion_job_id,
                status: job.status,
            },
            Err(err) => SyncOutcome::Failed {
                error: err.to_string(),
            },
        }
    }

    fn sync_status(&self, job_id: &str) -> Result<SyncStatus, SyncError> {
        let url = format!("{}/{job_id}", self.jobs_url);
        let job = self.fetch(self.agent.get(&url).set("accept", "application/json"))?;
        Ok(SyncStatus {
            job_id: job.ingestion_job_id,
            status: job.status,
            statistics: job.statistics,
        })
    }
}
