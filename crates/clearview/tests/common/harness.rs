//! Test harness for queue scenarios.
//!
//! The `TestHarness` struct wraps a workspace around a `ScriptedProcessor`, a
//! fake remote port that can:
//! - hold every call at a gate until the test releases it
//! - fail chosen files (or all of them) with a given message
//! - record dispatch order, dispatched jobs and peak concurrency

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use clearview::{
    Artifact, BatchItem, DispatchJob, IntakeFile, IntakeReport, ItemId, ProcessError,
    ProcessingStatus, RemoteProcessor, Workspace, WorkspaceMode, WorkspaceOptions,
};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `condition` until it holds, panicking after a few seconds.
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let result = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for: {}", what);
}

async fn within<F: Future>(what: &str, future: F) -> F::Output {
    match tokio::time::timeout(SETTLE_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("timed out waiting for: {}", what),
    }
}

/// Fake remote port with scripted outcomes.
pub struct ScriptedProcessor {
    gate: Option<Arc<Semaphore>>,
    default_failure: Option<String>,
    failures: Mutex<HashMap<String, String>>,
    output_type: String,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    dispatched: Mutex<Vec<String>>,
    jobs: Mutex<Vec<DispatchJob>>,
}

impl ScriptedProcessor {
    /// Succeeds immediately for every file.
    pub fn new() -> Self {
        Self {
            gate: None,
            default_failure: None,
            failures: Mutex::new(HashMap::new()),
            output_type: "image/png".to_string(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            dispatched: Mutex::new(Vec::new()),
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Every call waits for a [`ScriptedProcessor::release`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    /// Every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            default_failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub fn fail_on(self, filename: &str, message: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(filename.to_string(), message.to_string());
        self
    }

    pub fn producing(mut self, media_type: &str) -> Self {
        self.output_type = media_type.to_string();
        self
    }

    /// Lets `n` gated calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// File names in dispatch order.
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn jobs(&self) -> Vec<DispatchJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteProcessor for ScriptedProcessor {
    async fn process(&self, job: DispatchJob) -> Result<Artifact, ProcessError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.dispatched.lock().unwrap().push(job.filename.clone());
        self.jobs.lock().unwrap().push(job.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        tokio::task::yield_now().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get(&job.filename)
            .cloned()
            .or_else(|| self.default_failure.clone());
        match failure {
            Some(message) => Err(ProcessError::Operation(message)),
            None => Ok(Artifact::new(
                self.output_type.clone(),
                job.payload.bytes.to_vec(),
            )),
        }
    }
}

/// Workspace plus the fake port behind it.
pub struct TestHarness {
    pub workspace: Workspace,
    pub port: Arc<ScriptedProcessor>,
}

impl TestHarness {
    pub fn photo(port: ScriptedProcessor) -> Self {
        Self::with_options(
            WorkspaceMode::Photo,
            WorkspaceOptions::for_mode(WorkspaceMode::Photo),
            port,
        )
    }

    pub fn video(port: ScriptedProcessor) -> Self {
        Self::with_options(
            WorkspaceMode::Video,
            WorkspaceOptions::for_mode(WorkspaceMode::Video),
            port.producing("video/mp4"),
        )
    }

    pub fn with_options(
        mode: WorkspaceMode,
        options: WorkspaceOptions,
        port: ScriptedProcessor,
    ) -> Self {
        let port = Arc::new(port);
        let processor: Arc<dyn RemoteProcessor> = port.clone();
        Self {
            workspace: Workspace::new(mode, options, processor),
            port,
        }
    }

    pub fn intake(&self, files: Vec<IntakeFile>) -> IntakeReport {
        self.workspace.intake(files)
    }

    pub fn item(&self, id: &ItemId) -> BatchItem {
        self.workspace
            .get(id)
            .unwrap_or_else(|| panic!("item {} not found", id))
    }

    pub fn status(&self, id: &ItemId) -> ProcessingStatus {
        self.item(id).status
    }

    pub fn names(&self) -> Vec<String> {
        self.workspace
            .items()
            .iter()
            .map(|item| item.filename().to_string())
            .collect()
    }

    pub fn processing_count(&self) -> usize {
        self.workspace
            .items()
            .iter()
            .filter(|item| item.status == ProcessingStatus::Processing)
            .count()
    }

    /// Waits until the given item is being processed by the port.
    pub async fn until_processing(&self, id: &ItemId) {
        eventually("item to reach the port", || {
            self.workspace
                .get(id)
                .is_some_and(|item| item.status == ProcessingStatus::Processing)
                && self.port.in_flight() == 1
        })
        .await;
    }

    pub async fn settle(&self) {
        within("workspace to go idle", self.workspace.wait_idle()).await;
    }
}
