//! The queue driver: a single task that claims queued items one at a time
//! and drives them through a [`RemoteProcessor`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::broadcast::{ItemEvent, ItemEventBroadcaster};
use crate::error::ProcessError;
use crate::item::{BatchItem, ItemId, ProcessingStatus};
use crate::port::{DispatchJob, RemoteProcessor, VideoJobParams};

use super::store::ItemStore;
use super::DrainPolicy;

const CREDENTIAL_FAILURE_MARKER: &str = "entity was not found";

/// Error recorded on an item whose remote call was cut off by shutdown.
pub const SHUTDOWN_ABORT_REASON: &str = "Aborted: workspace shut down";

/// Observable driver state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverState {
    pub armed: bool,
    pub in_flight: Option<ItemId>,
}

impl DriverState {
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }
}

/// Returns true when a failure means the operator has to supply a different
/// API key.
pub fn is_credential_failure(err: &ProcessError) -> bool {
    matches!(err, ProcessError::Credential(_))
        || err
            .to_string()
            .to_ascii_lowercase()
            .contains(CREDENTIAL_FAILURE_MARKER)
}

/// Flag raised when the remote service rejects the configured key.
///
/// The failing item still goes to ERROR with its own message; the alert only
/// tells the presentation layer to prompt for a new key.
pub struct CredentialAlert {
    raised: AtomicBool,
    reason: Mutex<Option<String>>,
    events: ItemEventBroadcaster,
}

impl CredentialAlert {
    pub fn new(events: ItemEventBroadcaster) -> Self {
        Self {
            raised: AtomicBool::new(false),
            reason: Mutex::new(None),
            events,
        }
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Message of the failure that raised the alert.
    pub fn reason(&self) -> Option<String> {
        match self.reason.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn raise(&self, reason: &str) {
        match self.reason.lock() {
            Ok(mut guard) => *guard = Some(reason.to_string()),
            Err(poisoned) => {
                log::warn!("Credential alert lock was poisoned, recovering");
                *poisoned.into_inner() = Some(reason.to_string());
            }
        }
        self.raised.store(true, Ordering::SeqCst);
        self.events.send(ItemEvent::credential(true, Some(reason)));
    }

    /// Clears the alert. Returns true if it was raised.
    pub fn clear(&self) -> bool {
        let was_raised = self.raised.swap(false, Ordering::SeqCst);
        if was_raised {
            match self.reason.lock() {
                Ok(mut guard) => *guard = None,
                Err(poisoned) => *poisoned.into_inner() = None,
            }
            self.events.send(ItemEvent::credential(false, None));
        }
        was_raised
    }
}

impl std::fmt::Debug for CredentialAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialAlert")
            .field("raised", &self.is_raised())
            .finish()
    }
}

/// Everything the driver task needs.
pub struct DriverContext {
    pub store: Arc<ItemStore>,
    pub processor: Arc<dyn RemoteProcessor>,
    pub drain: DrainPolicy,
    /// Live video parameters. `None` in photo mode.
    pub video: Option<Arc<RwLock<VideoJobParams>>>,
    /// Raised on credential failures, when set.
    pub alert: Option<Arc<CredentialAlert>>,
}

struct Shared {
    state: watch::Sender<DriverState>,
    shutdown: AtomicBool,
    /// The spawned processor call for the in-flight item.
    processor_task: Mutex<Option<AbortHandle>>,
}

impl Shared {
    fn set_processor_task(&self, handle: Option<AbortHandle>) -> Option<AbortHandle> {
        match self.processor_task.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, handle),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), handle),
        }
    }
}

/// Handle to the driver task.
///
/// The task sleeps on the store's change signal and re-evaluates after every
/// mutation, arm or disarm. Dropping the handle aborts the task.
pub struct QueueDriver {
    shared: Arc<Shared>,
    store: Arc<ItemStore>,
    events: ItemEventBroadcaster,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QueueDriver {
    /// Spawns the driver task in the stopped state.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(ctx: DriverContext) -> Self {
        let (state, _) = watch::channel(DriverState::default());
        let shared = Arc::new(Shared {
            state,
            shutdown: AtomicBool::new(false),
            processor_task: Mutex::new(None),
        });
        let store = Arc::clone(&ctx.store);
        let events = store.events().clone();

        let task = tokio::spawn(run_driver(ctx, Arc::clone(&shared)));
        debug!("Queue driver started");

        Self {
            shared,
            store,
            events,
            task: Mutex::new(Some(task)),
        }
    }

    /// Arms the driver. Returns true if it was stopped before.
    pub fn arm(&self) -> bool {
        self.toggle(true)
    }

    /// Stops future claims. An in-flight call still settles.
    pub fn disarm(&self) -> bool {
        self.toggle(false)
    }

    fn toggle(&self, armed: bool) -> bool {
        if armed && self.is_shut_down() {
            return false;
        }
        let changed = set_armed(&self.shared, &self.events, armed);
        if changed {
            self.store.nudge();
        }
        changed
    }

    pub fn is_armed(&self) -> bool {
        self.shared.state.borrow().armed
    }

    pub fn state(&self) -> DriverState {
        self.shared.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DriverState> {
        self.shared.state.subscribe()
    }

    /// Ends the driver task and cancels the in-flight remote call, if any.
    /// The item it was working on goes to ERROR.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        set_armed(&self.shared, &self.events, false);
        self.store.nudge();

        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
        if let Some(call) = self.shared.set_processor_task(None) {
            call.abort();
        }

        if let Some(item) = self
            .store
            .find_first(|item| item.status == ProcessingStatus::Processing)
        {
            if self.store.fail(&item.id, SHUTDOWN_ABORT_REASON) {
                warn!(item_id = %item.id, filename = %item.filename(), "In-flight item aborted");
            }
        }

        self.shared.state.send_modify(|state| state.in_flight = None);
        info!("Queue driver shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }
}

impl Drop for QueueDriver {
    fn drop(&mut self) {
        let task = match self.task.get_mut() {
            Ok(task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
        if let Some(call) = self.shared.set_processor_task(None) {
            call.abort();
        }
    }
}

impl std::fmt::Debug for QueueDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDriver")
            .field("state", &self.state())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn set_armed(shared: &Shared, events: &ItemEventBroadcaster, armed: bool) -> bool {
    let changed = shared.state.send_if_modified(|state| {
        if state.armed == armed {
            false
        } else {
            state.armed = armed;
            true
        }
    });
    if changed {
        events.send(ItemEvent::driver(armed));
        if armed {
            info!("Queue started");
        } else {
            info!("Queue stopped");
        }
    }
    changed
}

async fn run_driver(ctx: DriverContext, shared: Arc<Shared>) {
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        let armed = shared.state.borrow().armed;
        if armed {
            if let Some(item) = ctx.store.claim_next() {
                drive_item(&ctx, &shared, item).await;
                settle(&ctx, &shared);
                continue;
            }

            if is_drained(&ctx) {
                debug!("Queue drained");
                set_armed(&shared, ctx.store.events(), false);
                continue;
            }
        }

        ctx.store.changed().await;
    }

    debug!("Queue driver exited");
}

fn is_drained(ctx: &DriverContext) -> bool {
    let stats = ctx.store.stats();
    ctx.drain == DrainPolicy::StopWhenDrained && !stats.is_processing() && !stats.has_queued()
}

/// Clears the in-flight slot and, when the queue is drained under
/// [`DrainPolicy::StopWhenDrained`], disarms in the same state update so
/// observers never see an idle but still armed driver.
fn settle(ctx: &DriverContext, shared: &Shared) {
    let drained = is_drained(ctx);
    let mut disarmed = false;
    shared.state.send_modify(|state| {
        state.in_flight = None;
        if drained && state.armed {
            state.armed = false;
            disarmed = true;
        }
    });

    if disarmed {
        debug!("Queue drained");
        ctx.store.events().send(ItemEvent::driver(false));
        info!("Queue stopped");
    }
}

async fn drive_item(ctx: &DriverContext, shared: &Shared, item: BatchItem) {
    let span = info_span!("dispatch", item_id = %item.id, filename = %item.filename());

    async {
        shared
            .state
            .send_modify(|state| state.in_flight = Some(item.id.clone()));

        let params = ctx.video.as_ref().map(|settings| match settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                log::warn!("Video settings lock was poisoned, recovering");
                poisoned.into_inner().clone()
            }
        });
        let frozen = params.as_ref().map(VideoJobParams::job_config);

        let job = DispatchJob {
            item_id: item.id.clone(),
            filename: item.filename().to_string(),
            payload: Arc::clone(&item.source),
            video: params,
        };

        info!("Dispatching to remote service");
        let started = Instant::now();
        let processor = Arc::clone(&ctx.processor);
        let call = tokio::spawn(async move { processor.process(job).await });
        shared.set_processor_task(Some(call.abort_handle()));
        let joined = call.await;
        shared.set_processor_task(None);

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(join_err) => Err(ProcessError::Transport(format!(
                "processor task failed: {}",
                join_err
            ))),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(artifact) => {
                let media_type = artifact.media_type.clone();
                if ctx.store.complete(&item.id, artifact, frozen) {
                    info!(elapsed_ms, media_type = %media_type, "Item completed");
                } else {
                    debug!("Item removed while in flight, result discarded");
                }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(elapsed_ms, error = %message, "Item failed");
                if !ctx.store.fail(&item.id, message.clone()) {
                    debug!("Item removed while in flight, failure discarded");
                    return;
                }
                if let Some(alert) = ctx.alert.as_ref() {
                    if is_credential_failure(&err) {
                        warn!("Remote service rejected the API key");
                        alert.raise(&message);
                    }
                }
            }
        }
    }
    .instrument(span)
    .await
}
