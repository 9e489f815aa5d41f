//! HTTP client used by remote workers to talk to the orchestrator.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::clog_trace;
use crate::core::{AtomicTask, TaskId};
use crate::error::{Error, Result};
use crate::orchestration::TaskSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    task: AtomicTask,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub id: TaskId,
    pub result: f64,
}

/// Polling client for the orchestrator's internal task endpoints.
#[derive(Debug, Clone)]
pub struct Agent {
    base_url: String,
    client: reqwest::Client,
}

impl Agent {
    /// Create a client for the orchestrator at `base_url`
    /// (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn task_url(&self) -> String {
        format!("{}/internal/task", self.base_url)
    }

    /// Ask the orchestrator for the next task.
    ///
    /// Returns `Ok(None)` when the orchestrator has no work (404).
    pub async fn fetch_task(&self) -> Result<Option<AtomicTask>> {
        let response = self.client.get(self.task_url()).send().await?;
        match response.status() {
            StatusCode::OK => {
                let envelope: TaskEnvelope = response.json().await?;
                clog_trace!("Fetched {:?}", envelope.task);
                Ok(Some(envelope.task))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Error::Orchestrator(format!(
                "unexpected status {} fetching task",
                status
            ))),
        }
    }

    /// Report a computed result.
    ///
    /// # Errors
    /// Returns `TaskNotFound` if the orchestrator no longer tracks the task.
    pub async fn submit_result(&self, id: TaskId, result: f64) -> Result<()> {
        let response = self
            .client
            .post(self.task_url())
            .json(&TaskResult { id, result })
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::TaskNotFound { id }),
            status => Err(Error::Orchestrator(format!(
                "unexpected status {} submitting task {}",
                status, id
            ))),
        }
    }
}

impl TaskSource for Agent {
    async fn fetch_task(&self) -> Result<Option<AtomicTask>> {
        Agent::fetch_task(self).await
    }

    async fn report_result(&self, id: TaskId, result: f64) -> Result<()> {
        self.submit_result(id, result).await
    }
}
