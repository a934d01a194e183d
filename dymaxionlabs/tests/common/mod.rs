//! Shared helpers for tests which talk to a mock API server.

#![allow(dead_code)]

use dymaxionlabs::retry::{ChunkRetryStrategy, TransportRetry};
use dymaxionlabs::{Client, Config};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

pub const API_KEY: &str = "test-key";

/// A client pointed at `server`, with retry sleeps shrunk to milliseconds.
pub fn client_for(server: &MockServer) -> Client {
    client_with_retry(
        server,
        TransportRetry::default().backoff_factor(Duration::from_millis(1)),
    )
}

/// Like `client_for`, but with a specific transport retry policy.
pub fn client_with_retry(server: &MockServer, retry: TransportRetry) -> Client {
    client_with_config(server, |config| config.retry(retry))
}

/// Like `client_for`, but let `configure` adjust the configuration.
pub fn client_with_config<F>(server: &MockServer, configure: F) -> Client
where
    F: FnOnce(Config) -> Config,
{
    let config = Config::new(API_KEY)
        .api_url(Url::parse(&server.uri()).unwrap())
        .retry(TransportRetry::default().backoff_factor(Duration::from_millis(1)))
        .chunk_retry(ChunkRetryStrategy::default().initial_base_wait(Duration::from_millis(1)));
    Client::new(configure(config)).unwrap()
}

/// Answers each request with the next response in line, repeating the last
/// one forever.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty());
        Sequence {
            responses,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses[n.min(self.responses.len() - 1)].clone()
    }
}

/// A task as the server would send it.
pub fn task_json(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "state": state,
        "name": "train",
        "args": [],
        "kwargs": {},
        "created_at": "2020-06-01T12:00:00Z",
        "updated_at": "2020-06-01T12:05:00Z",
        "finished_at": null,
        "metadata": null,
        "duration": null,
        "estimated_duration": null,
        "error": null,
    })
}

/// An estimator as the server would send it.
pub fn estimator_json(uuid: &str) -> Value {
    json!({
        "uuid": uuid,
        "name": "pools",
        "classes": ["pool"],
        "estimator_type": "OD",
        "metadata": null,
        "image_files": [],
        "configuration": {},
        "training_tasks": [],
        "prediction_tasks": [],
    })
}

/// A file as the server would send it.
pub fn file_json(path: &str) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    json!({ "name": name, "path": path, "metadata": null })
}
