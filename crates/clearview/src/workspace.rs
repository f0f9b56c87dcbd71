//! Per-mode workspace controller.
//!
//! A [`Workspace`] owns one item store and one queue driver and exposes the
//! operations a presentation layer needs: intake, start/stop, removal,
//! video settings and read-only views.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::broadcast::{ItemEvent, ItemEventBroadcaster};
use crate::config::Config;
use crate::error::{IntakeError, WorkspaceError};
use crate::item::{AspectRatio, BatchItem, IntakeFile, ItemId, SourcePayload, VideoResolution};
use crate::port::{
    ConfiguredCredential, CredentialProvider, GeminiClient, RemoteProcessor, VideoJobParams,
    VideoReconstructor, WatermarkRemover,
};
use crate::queue::driver::DriverContext;
use crate::queue::{
    CredentialAlert, DrainPolicy, DriverState, ItemStore, QueueDriver, StartPolicy, StoreStats,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceMode {
    Photo,
    Video,
}

impl WorkspaceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkspaceMode::Photo => "photo",
            WorkspaceMode::Video => "video",
        }
    }
}

impl fmt::Display for WorkspaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceOptions {
    pub start: StartPolicy,
    pub drain: DrainPolicy,
    pub accepted_media_types: Vec<String>,
    /// Initial video parameters. Ignored in photo mode.
    pub video: VideoJobParams,
    pub event_capacity: usize,
}

impl WorkspaceOptions {
    /// Built-in defaults for a mode.
    pub fn for_mode(mode: WorkspaceMode) -> Self {
        Self::from_config(mode, &Config::default())
    }

    pub fn from_config(mode: WorkspaceMode, config: &Config) -> Self {
        let (policy, accepted) = match mode {
            WorkspaceMode::Photo => (config.queue.photo, &config.photo.accepted_media_types),
            WorkspaceMode::Video => (config.queue.video, &config.video.accepted_media_types),
        };

        Self {
            start: policy.start,
            drain: policy.drain,
            accepted_media_types: accepted.clone(),
            video: VideoJobParams {
                prompt: config.video.prompt.clone(),
                resolution: config.video.resolution,
                aspect_ratio: config.video.aspect_ratio,
            },
            event_capacity: config.queue.event_capacity,
        }
    }
}

/// A file turned away at intake.
#[derive(Debug)]
pub struct IntakeRejection {
    pub name: String,
    pub error: IntakeError,
}

/// Per-file outcome of one intake call.
#[derive(Debug, Default)]
pub struct IntakeReport {
    /// Ids of the appended items, in the order the files were given.
    pub accepted: Vec<ItemId>,
    pub rejected: Vec<IntakeRejection>,
}

impl IntakeReport {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn has_rejections(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Aggregate view for progress displays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStats {
    pub total: usize,
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
    pub is_processing: bool,
    /// (completed + failed) / total, 0.0 when empty.
    pub completion_fraction: f64,
}

impl From<StoreStats> for WorkspaceStats {
    fn from(stats: StoreStats) -> Self {
        Self {
            total: stats.total,
            queued: stats.queued,
            completed: stats.completed,
            failed: stats.failed,
            is_processing: stats.is_processing(),
            completion_fraction: stats.completion_fraction(),
        }
    }
}

pub struct Workspace {
    mode: WorkspaceMode,
    start_policy: StartPolicy,
    drain_policy: DrainPolicy,
    accepted_media_types: Vec<String>,
    store: Arc<ItemStore>,
    driver: QueueDriver,
    video: Option<Arc<RwLock<VideoJobParams>>>,
    alert: Arc<CredentialAlert>,
}

impl Workspace {
    /// Creates a workspace and spawns its driver in the stopped state.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        mode: WorkspaceMode,
        options: WorkspaceOptions,
        processor: Arc<dyn RemoteProcessor>,
    ) -> Self {
        let events = ItemEventBroadcaster::new(options.event_capacity);
        let store = Arc::new(ItemStore::new(events.clone()));
        let alert = Arc::new(CredentialAlert::new(events));

        let video = match mode {
            WorkspaceMode::Photo => None,
            WorkspaceMode::Video => Some(Arc::new(RwLock::new(options.video))),
        };

        let driver = QueueDriver::spawn(DriverContext {
            store: Arc::clone(&store),
            processor,
            drain: options.drain,
            video: video.clone(),
            alert: match mode {
                WorkspaceMode::Photo => None,
                WorkspaceMode::Video => Some(Arc::clone(&alert)),
            },
        });

        info!(
            mode = %mode,
            start = ?options.start,
            drain = ?options.drain,
            "Workspace created"
        );

        Self {
            mode,
            start_policy: options.start,
            drain_policy: options.drain,
            accepted_media_types: options.accepted_media_types,
            store,
            driver,
            video,
            alert,
        }
    }

    pub fn photo(processor: Arc<dyn RemoteProcessor>) -> Self {
        Self::new(
            WorkspaceMode::Photo,
            WorkspaceOptions::for_mode(WorkspaceMode::Photo),
            processor,
        )
    }

    pub fn video(processor: Arc<dyn RemoteProcessor>) -> Self {
        Self::new(
            WorkspaceMode::Video,
            WorkspaceOptions::for_mode(WorkspaceMode::Video),
            processor,
        )
    }

    /// Builds a workspace backed by the Gemini adapter for `mode`.
    pub fn from_config(mode: WorkspaceMode, config: &Config) -> crate::Result<Self> {
        let credential: Arc<dyn CredentialProvider> =
            Arc::new(ConfiguredCredential::from_config(&config.api));
        let client = GeminiClient::from_config(&config.api, credential)?;

        let processor: Arc<dyn RemoteProcessor> = match mode {
            WorkspaceMode::Photo => Arc::new(WatermarkRemover::from_config(client, &config.photo)),
            WorkspaceMode::Video => {
                Arc::new(VideoReconstructor::from_config(client, &config.video))
            }
        };

        Ok(Self::new(
            mode,
            WorkspaceOptions::from_config(mode, config),
            processor,
        ))
    }

    pub fn mode(&self) -> WorkspaceMode {
        self.mode
    }

    /// Validates each file and appends the accepted ones as queued items,
    /// in order. A rejected file never affects the others.
    pub fn intake(&self, files: Vec<IntakeFile>) -> IntakeReport {
        if self.mode == WorkspaceMode::Video {
            self.alert.clear();
        }

        let mut report = IntakeReport::default();
        let mut items = Vec::with_capacity(files.len());

        for file in files {
            let name = file.name.clone();
            match SourcePayload::from_intake(file, &self.accepted_media_types) {
                Ok(payload) => items.push(BatchItem::queued(payload)),
                Err(error) => {
                    warn!(file = %name, error = %error, "File rejected at intake");
                    report.rejected.push(IntakeRejection { name, error });
                }
            }
        }

        report.accepted = self.store.append(items);
        info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Intake finished"
        );

        if !report.accepted.is_empty() && self.start_policy == StartPolicy::AutoArmOnIntake {
            self.driver.arm();
        }

        report
    }

    /// Arms the driver. Returns whether it is armed afterwards.
    ///
    /// With [`DrainPolicy::StopWhenDrained`] there is nothing to start when
    /// no item is queued, so the driver stays stopped and this returns false.
    pub fn start(&self) -> bool {
        if self.drain_policy == DrainPolicy::StopWhenDrained && !self.store.stats().has_queued() {
            info!("Nothing queued, not starting");
            return false;
        }
        self.driver.arm();
        self.driver.is_armed()
    }

    /// Stops further claims. Returns true if the driver was armed.
    pub fn stop(&self) -> bool {
        self.driver.disarm()
    }

    pub fn remove_item(&self, id: &ItemId) -> Option<BatchItem> {
        let removed = self.store.remove(id);
        if removed.is_some() {
            info!(item_id = %id, "Item removed");
        }
        removed
    }

    /// Stops the driver and empties the store. Returns the number of items
    /// dropped.
    pub fn clear_all(&self) -> usize {
        self.driver.disarm();
        let count = self.store.clear();
        info!(count, "Workspace cleared");
        count
    }

    fn video_settings(
        &self,
        operation: &'static str,
    ) -> Result<&RwLock<VideoJobParams>, WorkspaceError> {
        self.video
            .as_deref()
            .ok_or(WorkspaceError::UnsupportedInMode {
                operation,
                mode: self.mode.as_str(),
            })
    }

    fn update_video<F>(&self, operation: &'static str, apply: F) -> Result<(), WorkspaceError>
    where
        F: FnOnce(&mut VideoJobParams),
    {
        let settings = self.video_settings(operation)?;
        match settings.write() {
            Ok(mut guard) => apply(&mut *guard),
            Err(poisoned) => {
                log::warn!("Video settings lock was poisoned, recovering");
                apply(&mut *poisoned.into_inner());
            }
        }
        Ok(())
    }

    /// Changes the prompt for items not yet dispatched.
    pub fn set_prompt(&self, prompt: impl Into<String>) -> Result<(), WorkspaceError> {
        let prompt = prompt.into();
        self.update_video("set_prompt", |params| params.prompt = prompt)
    }

    pub fn set_resolution(&self, resolution: VideoResolution) -> Result<(), WorkspaceError> {
        self.update_video("set_resolution", |params| params.resolution = resolution)
    }

    pub fn set_aspect_ratio(&self, aspect_ratio: AspectRatio) -> Result<(), WorkspaceError> {
        self.update_video("set_aspect_ratio", |params| {
            params.aspect_ratio = aspect_ratio
        })
    }

    /// Current video parameters, or `None` in photo mode.
    pub fn video_params(&self) -> Option<VideoJobParams> {
        let settings = self.video.as_ref()?;
        Some(match settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        })
    }

    pub fn items(&self) -> Vec<BatchItem> {
        self.store.all()
    }

    pub fn get(&self, id: &ItemId) -> Option<BatchItem> {
        self.store.get(id)
    }

    pub fn stats(&self) -> WorkspaceStats {
        self.store.stats().into()
    }

    pub fn driver_state(&self) -> DriverState {
        self.driver.state()
    }

    pub fn watch_driver(&self) -> watch::Receiver<DriverState> {
        self.driver.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemEvent> {
        self.store.subscribe()
    }

    pub fn credential_alert(&self) -> bool {
        self.alert.is_raised()
    }

    pub fn credential_alert_reason(&self) -> Option<String> {
        self.alert.reason()
    }

    /// Clears the alert once the operator has supplied a new key.
    pub fn acknowledge_credential_alert(&self) -> bool {
        self.alert.clear()
    }

    fn is_idle(&self, state: &DriverState) -> bool {
        if self.driver.is_shut_down() {
            return true;
        }
        let stats = self.store.stats();
        state.in_flight.is_none()
            && !stats.is_processing()
            && (!state.armed || !stats.has_queued())
    }

    /// Resolves once nothing is in flight and the driver is either stopped
    /// or has nothing queued.
    pub async fn wait_idle(&self) {
        let mut state = self.driver.watch();
        let mut events = self.store.subscribe();

        loop {
            let idle = {
                let current = state.borrow_and_update();
                self.is_idle(&current)
            };
            if idle {
                return;
            }

            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                event = events.recv() => {
                    if let Err(broadcast::error::RecvError::Closed) = event {
                        return;
                    }
                }
            }
        }
    }

    /// Ends the driver task. The workspace accepts no further starts.
    pub fn shutdown(&self) {
        self.driver.shutdown();
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("mode", &self.mode)
            .field("start_policy", &self.start_policy)
            .field("drain_policy", &self.drain_policy)
            .field("stats", &self.stats())
            .field("driver", &self.driver_state())
            .finish()
    }
}
