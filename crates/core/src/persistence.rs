//! Persistence contract and background save worker
//!
//! A gateway turns the current annotation set into a durable artifact. The
//! editor never calls a gateway on its own thread; saves are handed to a
//! [`PersistenceWorker`], which runs them one at a time, in submission order,
//! on a single background thread and reports completions through a channel
//! the editor polls. A later snapshot therefore never lands before an
//! earlier one.

use crate::annotation::Annotation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Error types for persistence operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistenceError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("save rejected: {0}")]
    Rejected(String),

    #[error("invalid save response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("persistence worker disconnected")]
    Disconnected,
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Request body sent to a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub filename: String,
    pub annotations: Vec<Annotation>,
}

impl SaveRequest {
    pub fn new(filename: impl Into<String>, annotations: Vec<Annotation>) -> Self {
        Self { filename: filename.into(), annotations }
    }
}

/// Response body returned by a save endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SaveResponse {
    pub fn succeeded(download_url: impl Into<String>) -> Self {
        Self {
            success: true,
            download_url: Some(download_url.into()),
            message: Some("Annotations saved successfully".to_owned()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), ..Self::default() }
    }

    /// Map the body onto the persistence contract
    pub fn into_result(self) -> PersistenceResult<ArtifactReference> {
        if !self.success {
            let reason = self.error.unwrap_or_else(|| "unknown error".to_owned());
            return Err(PersistenceError::Rejected(reason));
        }
        match self.download_url {
            Some(url) if !url.is_empty() => Ok(ArtifactReference::new(url)),
            _ => Err(PersistenceError::InvalidResponse("missing download_url".to_owned())),
        }
    }
}

/// Locator for a saved artifact (URL or path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactReference(String);

impl ArtifactReference {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Save transport
///
/// Implementations must be idempotent with respect to identical requests:
/// the same annotation set may be submitted more than once.
pub trait PersistenceGateway: Send + Sync {
    fn save(&self, request: &SaveRequest) -> PersistenceResult<ArtifactReference>;
}

/// Gateway that keeps every request in memory
///
/// Useful for hosts that do not persist and for tests.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    requests: Mutex<Vec<SaveRequest>>,
    failure: Mutex<Option<PersistenceError>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail with `error` (or succeed again with `None`)
    pub fn set_failure(&self, error: Option<PersistenceError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<SaveRequest> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }
}

impl PersistenceGateway for MemoryGateway {
    fn save(&self, request: &SaveRequest) -> PersistenceResult<ArtifactReference> {
        let failure = self.failure.lock().map_err(|_| PersistenceError::Disconnected)?.clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let mut requests = self.requests.lock().map_err(|_| PersistenceError::Disconnected)?;
        requests.push(request.clone());
        Ok(ArtifactReference::new(format!("memory://{}/{}", request.filename, requests.len())))
    }
}

/// Monotonic identifier of a submitted save
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SaveTicket(pub u64);

/// Outcome of one background save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveCompletion {
    pub ticket: SaveTicket,
    pub result: PersistenceResult<ArtifactReference>,
}

struct SaveJob {
    ticket: SaveTicket,
    request: SaveRequest,
}

/// Runs gateway saves off the caller's thread
///
/// The save thread is started on the first submit and exits once the worker
/// is dropped and its queue is drained.
pub struct PersistenceWorker {
    gateway: Arc<dyn PersistenceGateway>,
    jobs: Option<Sender<SaveJob>>,
    sender: Sender<SaveCompletion>,
    receiver: Receiver<SaveCompletion>,
    next_ticket: u64,
    outstanding: usize,
    latest: Option<(SaveTicket, ArtifactReference)>,
}

impl PersistenceWorker {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { gateway, jobs: None, sender, receiver, next_ticket: 1, outstanding: 0, latest: None }
    }

    /// Queue a request behind every earlier one
    pub fn submit(&mut self, request: SaveRequest) -> PersistenceResult<SaveTicket> {
        let ticket = SaveTicket(self.next_ticket);
        let jobs = self.jobs()?;

        if jobs.send(SaveJob { ticket, request }).is_err() {
            // Save thread died (a gateway panicked); start a fresh one next time.
            self.jobs = None;
            return Err(PersistenceError::Disconnected);
        }

        self.next_ticket += 1;
        self.outstanding += 1;
        tracing::debug!(ticket = ticket.0, "save submitted");
        Ok(ticket)
    }

    /// Number of saves that have not reported back yet
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Drain completions without blocking
    pub fn poll(&mut self) -> Vec<SaveCompletion> {
        let completions: Vec<_> = self.receiver.try_iter().collect();
        for completion in &completions {
            self.record(completion);
        }
        completions
    }

    /// Block until every outstanding save has completed or `timeout` elapses
    pub fn wait(&mut self, timeout: Duration) -> Vec<SaveCompletion> {
        let deadline = Instant::now() + timeout;
        let mut completions = Vec::new();

        while self.outstanding > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(completion) => {
                    self.record(&completion);
                    completions.push(completion);
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(outstanding = self.outstanding, "timed out waiting for saves");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        completions
    }

    /// Locator from the most recently submitted save that succeeded
    pub fn latest_artifact(&self) -> Option<&ArtifactReference> {
        self.latest.as_ref().map(|(_, artifact)| artifact)
    }

    fn jobs(&mut self) -> PersistenceResult<&Sender<SaveJob>> {
        if self.jobs.is_none() {
            let (jobs, queue) = mpsc::channel::<SaveJob>();
            let gateway = Arc::clone(&self.gateway);
            let sender = self.sender.clone();

            std::thread::Builder::new()
                .name("annotation-save".to_owned())
                .spawn(move || {
                    for SaveJob { ticket, request } in queue {
                        let result = gateway.save(&request);
                        if sender.send(SaveCompletion { ticket, result }).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|err| PersistenceError::Io(err.to_string()))?;

            self.jobs = Some(jobs);
        }
        self.jobs.as_ref().ok_or(PersistenceError::Disconnected)
    }

    fn record(&mut self, completion: &SaveCompletion) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if let Ok(artifact) = &completion.result {
            let newer = self.latest.as_ref().map_or(true, |(ticket, _)| completion.ticket > *ticket);
            if newer {
                self.latest = Some((completion.ticket, artifact.clone()));
            }
        }
    }
}

impl fmt::Debug for PersistenceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceWorker")
            .field("running", &self.jobs.is_some())
            .field("next_ticket", &self.next_ticket)
            .field("outstanding", &self.outstanding)
            .field("latest", &self.latest)
            .finish_non_exhaustive()
    }
}
