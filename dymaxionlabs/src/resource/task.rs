//! Long-running server-side jobs.
//!
//! Training, prediction and tiling all run as background tasks. A `Task` is
//! a local snapshot of one of them, which we refresh by polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs;
use tracing::debug;

use super::id::*;
use super::state::*;
use super::{Extra, Resource};
use crate::client::{ApiRequest, Client};
use crate::errors::*;
use crate::progress::ProgressOptions;
use crate::wait::{wait, WaitOptions, WaitStatus};

/// A background job running on the server.
#[derive(Clone, Debug, Deserialize, Resource, Serialize)]
#[api_name = "tasks"]
pub struct Task {
    /// The ID of this task.
    #[resource_id]
    pub id: Id<Task>,

    /// The current state of this task.
    pub state: TaskState,

    /// The kind of job, such as `"train"` or `"predict"`.
    #[serde(default)]
    pub name: String,

    /// Positional arguments of the job.
    #[serde(default)]
    pub args: Option<Vec<Value>>,

    /// Keyword arguments of the job.
    #[serde(default)]
    pub kwargs: Option<Map<String, Value>>,

    /// When this task was created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// When this task was last updated.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// When this task reached a terminal state.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    /// Free-form job metadata, often including progress information.
    #[serde(default)]
    pub metadata: Option<Value>,

    /// How long the task ran, in seconds.
    #[serde(default)]
    pub duration: Option<f64>,

    /// How long the server expects the task to run, in seconds.
    #[serde(default)]
    pub estimated_duration: Option<f64>,

    /// The latest error message, if the task failed.
    #[serde(default)]
    pub error: Option<String>,

    /// Any other fields sent by the server.
    #[serde(flatten)]
    pub extra: Extra,
}

/// The body of `list-artifacts`.
#[derive(Debug, Deserialize)]
struct ArtifactList {
    files: Vec<String>,
}

impl Task {
    /// Fetch the task with the specified ID.
    pub async fn get(client: &Client, id: &Id<Task>) -> Result<Task> {
        client.fetch(id).await
    }

    /// Fetch every task visible to our API key.
    pub async fn all(client: &Client) -> Result<Vec<Task>> {
        client.list().await
    }

    /// Replace every field of this task with the server's latest copy.
    pub async fn refresh(&mut self, client: &Client) -> Result<&mut Self> {
        *self = client.fetch(&self.id).await?;
        Ok(self)
    }

    /// Is this task still running? A task in a terminal state is never
    /// refreshed. Otherwise we refresh exactly once and check again.
    pub async fn is_running(&mut self, client: &Client) -> Result<bool> {
        if self.state.is_terminal() {
            return Ok(false);
        }
        self.refresh(client).await?;
        Ok(!self.state.is_terminal())
    }

    /// Poll this task until it reaches a terminal state.
    pub async fn wait_until_finished(
        &mut self,
        client: &Client,
        options: &WaitOptions,
    ) -> Result<&mut Self> {
        self.wait_until_finished_opt(client, options, &mut ProgressOptions::default())
            .await
    }

    /// Poll this task until it reaches a terminal state, passing each new
    /// snapshot to `progress_options`.
    ///
    /// A failed or cancelled task is still a finished wait. Check `state`
    /// afterwards.
    pub async fn wait_until_finished_opt<'a>(
        &mut self,
        client: &Client,
        options: &WaitOptions,
        progress_options: &mut ProgressOptions<'a, Task>,
    ) -> Result<&mut Self> {
        if self.state.is_terminal() {
            return Ok(self);
        }
        debug!("waiting for task {} ({})", self.id, self.state);
        let id = self.id.clone();
        let state = Mutex::new((&mut *self, progress_options));
        let (id, shared) = (&id, &state);
        wait(options, move || async move {
            let latest = match client.fetch(id).await {
                Ok(task) => task,
                Err(err) if err.might_be_temporary() => {
                    return WaitStatus::FailedTemporarily(err)
                }
                Err(err) => return WaitStatus::FailedPermanently(err),
            };
            let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
            let (ref mut task, ref mut progress) = *guard;
            **task = latest;
            try_with_permanent_failure!(progress.notify(&**task));
            if task.state.is_terminal() {
                WaitStatus::Finished(())
            } else {
                WaitStatus::Waiting
            }
        })
        .await?;
        drop(state);
        debug!("task {} is {}", self.id, self.state);
        Ok(self)
    }

    /// Ask the server to cancel this task, then refresh it. The new state is
    /// whatever the server reports.
    pub async fn cancel(&mut self, client: &Client) -> Result<&mut Self> {
        let path = format!("{}cancel/", self.id.path());
        client.request(ApiRequest::post(path)).await?;
        self.refresh(client).await
    }

    /// The storage paths of the files produced by this task.
    pub async fn list_artifacts(&mut self, client: &Client) -> Result<Vec<String>> {
        self.ensure_stopped(client).await?;
        let path = format!("{}list-artifacts/", self.id.path());
        let list: ArtifactList = client.get_json(ApiRequest::get(path)).await?;
        Ok(list.files)
    }

    /// Did this task produce any files?
    pub async fn has_artifacts(&mut self, client: &Client) -> Result<bool> {
        Ok(!self.list_artifacts(client).await?.is_empty())
    }

    /// Download this task's artifacts as a zip file named
    /// `artifacts_{id}.zip` in `output_dir`, creating the directory if
    /// needed. Returns the path of the zip file.
    pub async fn download_artifacts(
        &mut self,
        client: &Client,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        self.ensure_stopped(client).await?;
        fs::create_dir_all(output_dir)
            .await
            .map_err(|e| Error::could_not_write_file(output_dir, e))?;
        let path = format!("{}download-artifacts/", self.id.path());
        let data = client.get_bytes(ApiRequest::get(path)).await?;
        let output_file = output_dir.join(format!("artifacts_{}.zip", self.id));
        fs::write(&output_file, &data)
            .await
            .map_err(|e| Error::could_not_write_file(&output_file, e))?;
        debug!("wrote {} bytes to {}", data.len(), output_file.display());
        Ok(output_file)
    }

    /// Copy this task's artifacts to `storage_dir` in project storage.
    pub async fn export_artifacts(
        &mut self,
        client: &Client,
        storage_dir: &str,
    ) -> Result<Value> {
        if storage_dir.is_empty() {
            return Err(Error::invalid_argument("storage directory must not be empty"));
        }
        self.ensure_stopped(client).await?;
        let path = format!("{}export-artifacts/", self.id.path());
        let body = serde_json::json!({ "path": storage_dir });
        client
            .request(ApiRequest::post(path).json(&body)?)
            .await?
            .json()
    }

    /// Fail with `TaskStillRunning` unless the task has stopped.
    async fn ensure_stopped(&mut self, client: &Client) -> Result<()> {
        if self.is_running(client).await? {
            Err(Error::TaskStillRunning {
                id: self.id.to_string(),
                state: self.state.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
