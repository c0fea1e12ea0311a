use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::AbortHandle;

use crate::events::SessionEvents;
use crate::session::Session;
use crate::store::SessionStore;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Invoked with the latest session snapshot, or `None` when the session
/// does not exist.
pub type SnapshotCallback = Arc<dyn Fn(Option<Session>) + Send + Sync>;

/// Fan-out of session-state changes to observers.
///
/// Both implementations honor the same contract: the callback fires once
/// promptly after subscribing with the current snapshot, then again after
/// accepted mutations, and never again once the subscription is cancelled.
/// Callers must not care which transport is behind the trait.
pub trait ChangeNotifier: Send + Sync {
    fn subscribe(&self, session_id: &str, on_change: SnapshotCallback) -> Subscription;
}

/// Cancels one callback's deliveries. Cloneable so the callback itself can
/// capture a copy and unsubscribe from inside a delivery; calling it more
/// than once is harmless.
#[derive(Clone)]
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.abort.abort();
        }
    }
}

fn guarded(cancelled: &Arc<AtomicBool>, on_change: &SnapshotCallback) -> impl Fn(Option<Session>) {
    let cancelled = cancelled.clone();
    let on_change = on_change.clone();
    move |snapshot| {
        // Checked immediately before invocation so an unsubscribe wins
        // against any delivery still in flight.
        if !cancelled.load(Ordering::SeqCst) {
            on_change(snapshot);
        }
    }
}

/// Push transport: rides the in-process event stream published after every
/// accepted mutation and re-reads the session for each matching event.
#[derive(Clone)]
pub struct PushNotifier {
    store: Arc<dyn SessionStore>,
    events: SessionEvents,
}

impl PushNotifier {
    pub fn new(store: Arc<dyn SessionStore>, events: SessionEvents) -> Self {
        Self { store, events }
    }
}

impl ChangeNotifier for PushNotifier {
    fn subscribe(&self, session_id: &str, on_change: SnapshotCallback) -> Subscription {
        let cancelled = Arc::new(AtomicBool::new(false));
        let deliver = guarded(&cancelled, &on_change);

        // Subscribed before the task spawns so no event published between
        // `subscribe` returning and the task starting can be missed.
        let mut receiver = self.events.subscribe();
        let store = self.store.clone();
        let session_id = session_id.to_string();
        let stop = cancelled.clone();

        let task = tokio::spawn(async move {
            deliver(store.get_session(&session_id).await.ok().flatten());

            loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                match receiver.recv().await {
                    Ok(event) if event.session_id() == session_id => {
                        deliver(store.get_session(&session_id).await.ok().flatten());
                    }
                    Ok(_) => {}
                    // Fell behind the channel; resync from the store.
                    Err(RecvError::Lagged(_)) => {
                        deliver(store.get_session(&session_id).await.ok().flatten());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription {
            cancelled,
            abort: task.abort_handle(),
        }
    }
}

/// Polling fallback for callers without access to the event stream: reads
/// the session at a fixed interval and delivers only on observed change.
#[derive(Clone)]
pub struct PollingNotifier {
    store: Arc<dyn SessionStore>,
    interval: Duration,
}

impl PollingNotifier {
    pub fn new(store: Arc<dyn SessionStore>, interval: Duration) -> Self {
        Self { store, interval }
    }
}

impl ChangeNotifier for PollingNotifier {
    fn subscribe(&self, session_id: &str, on_change: SnapshotCallback) -> Subscription {
        let cancelled = Arc::new(AtomicBool::new(false));
        let deliver = guarded(&cancelled, &on_change);

        let store = self.store.clone();
        let session_id = session_id.to_string();
        let interval = self.interval;
        let stop = cancelled.clone();

        let task = tokio::spawn(async move {
            let mut last: Option<Session> = match store.get_session(&session_id).await {
                Ok(snapshot) => {
                    deliver(snapshot.clone());
                    snapshot
                }
                Err(err) => {
                    tracing::warn!(session_id = %session_id, error = %err, "initial poll failed");
                    deliver(None);
                    None
                }
            };

            loop {
                tokio::time::sleep(interval).await;
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                match store.get_session(&session_id).await {
                    Ok(snapshot) => {
                        if snapshot != last {
                            deliver(snapshot.clone());
                            last = snapshot;
                        }
                    }
                    // Transient store trouble: wait for the next tick.
                    Err(err) => {
                        tracing::warn!(session_id = %session_id, error = %err, "poll failed, retrying next tick");
                    }
                }
            }
        });

        Subscription {
            cancelled,
            abort: task.abort_handle(),
        }
    }
}
