//! Notification router
//!
//! Single entry point for everything the device pushes on the notify
//! characteristic. Each raw frame goes through the same pipeline:
//! checksum gate, cached-state updates (log count, door), correlation
//! resolution, per-opcode observers, log sink, status fan-out.
//!
//! The router runs on the transport's delivery path, outside the
//! per-device operation lock, so all of its state sits behind its own
//! short-lived mutexes and none of its methods suspend.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use boks_core::constants::{DUPLICATE_NOTIFICATION_WINDOW, FRESH_EVENT_WINDOW};
use boks_core::{Frame, HistoryEvent};
use boks_protocol::{LogEntry, Response};
use boks_types::StatusUpdate;

/// Observer invoked with every verified frame carrying its opcode
pub type Observer = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Callback receiving coarse state changes (door, battery, log count)
pub type StatusCallback = Arc<dyn Fn(StatusUpdate) + Send + Sync>;

/// Handle returned by observer registration, used to unregister
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ObserverId(u64);

struct Correlation {
    /// Sorted set of opcodes this request is waiting for
    key: Vec<u8>,
    tx: oneshot::Sender<Frame>,
}

#[derive(Default)]
struct RouterState {
    correlations: Vec<Correlation>,
    door_open: bool,
    last_door_event_at: Option<Instant>,
    refresh_needed: bool,
    cached_log_count: Option<(u16, Instant)>,
    log_sink: Option<mpsc::UnboundedSender<LogEntry>>,
    last_frame: Option<(Vec<u8>, Instant)>,
    next_observer_id: u64,
}

/// Per-device notification router
pub struct Router {
    state: Mutex<RouterState>,
    observers: Mutex<HashMap<u8, Vec<(ObserverId, Observer)>>>,
    status_callback: Mutex<Option<StatusCallback>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RouterState::default()),
            observers: Mutex::new(HashMap::new()),
            status_callback: Mutex::new(None),
        }
    }

    /// Dispatch one raw notification
    pub fn handle_notification(&self, raw: &[u8]) {
        let frame = match Frame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                // Drop, never process: a corrupt frame must not touch state
                error!(raw = hex::encode(raw), "invalid notification: {e}");
                return;
            }
        };

        self.note_duplicate(raw);

        let response = Response::decode(&frame);
        debug!(
            opcode = format!("0x{:02X}", frame.opcode),
            event = response.event_type(),
            "RX"
        );

        let mut updates = Vec::new();

        match &response {
            Response::LogsCount { count } => {
                self.state.lock().cached_log_count = Some((*count, Instant::now()));
                updates.push(StatusUpdate::LogsCount { count: *count });
            }
            Response::DoorStatus { open, .. } => {
                // Live status, always fresh
                self.apply_door_event(*open, true);
                updates.push(StatusUpdate::Door { open: *open });
            }
            Response::History(entry) => {
                if let Some(open) = door_transition(entry.event) {
                    let fresh = entry.elapsed < FRESH_EVENT_WINDOW.as_secs() as u32;
                    self.apply_door_event(open, fresh);
                    updates.push(StatusUpdate::Door { open });
                }
            }
            Response::DeviceError(kind) => {
                warn!(error = kind.as_str(), "device reported an error");
            }
            _ => {}
        }

        self.resolve_correlation(&frame);
        self.notify_observers(&frame);

        if let Response::History(entry) = response {
            let sink = self.state.lock().log_sink.clone();
            if let Some(sink) = sink {
                // Receiver dropped mid-batch is fine, entries just stop
                let _ = sink.send(entry);
            }
        }

        if !updates.is_empty() {
            let callback = self.status_callback.lock().clone();
            if let Some(callback) = callback {
                for update in updates {
                    callback(update);
                }
            }
        }
    }

    fn note_duplicate(&self, raw: &[u8]) {
        let mut state = self.state.lock();
        if let Some((last, at)) = &state.last_frame {
            if last == raw && at.elapsed() < DUPLICATE_NOTIFICATION_WINDOW {
                // Logged only; duplicates are still processed
                debug!(raw = hex::encode(raw), "potential duplicate notification");
            }
        }
        state.last_frame = Some((raw.to_vec(), Instant::now()));
    }

    fn apply_door_event(&self, open: bool, fresh: bool) {
        let mut state = self.state.lock();
        state.door_open = open;
        state.last_door_event_at = Some(Instant::now());
        if fresh {
            state.refresh_needed = true;
        }
        debug!(open, fresh, "door state update");
    }

    /// Register an outstanding request waiting for any of `opcodes`
    pub fn register_correlation(&self, opcodes: &[u8]) -> oneshot::Receiver<Frame> {
        let (tx, rx) = oneshot::channel();
        let mut key = opcodes.to_vec();
        key.sort_unstable();

        self.state.lock().correlations.push(Correlation { key, tx });
        rx
    }

    fn resolve_correlation(&self, frame: &Frame) {
        let mut state = self.state.lock();

        // Abandoned receivers (timed out or cancelled callers) are pruned
        // on every pass so the table cannot grow unbounded
        state.correlations.retain(|c| !c.tx.is_closed());

        let position = state
            .correlations
            .iter()
            .position(|c| c.key.binary_search(&frame.opcode).is_ok());

        if let Some(position) = position {
            let correlation = state.correlations.swap_remove(position);
            // Exactly one correlation per matching reply
            let _ = correlation.tx.send(frame.clone());
        }
    }

    /// Drop every outstanding correlation; their awaiters see a closed
    /// channel. Used by the forced session reset.
    pub fn cancel_correlations(&self) {
        let dropped = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.correlations)
        };
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "cancelling outstanding correlations");
        }
    }

    /// Register an observer for one opcode
    pub fn register_observer(&self, opcode: u8, observer: Observer) -> ObserverId {
        let id = {
            let mut state = self.state.lock();
            state.next_observer_id += 1;
            ObserverId(state.next_observer_id)
        };
        self.observers
            .lock()
            .entry(opcode)
            .or_default()
            .push((id, observer));
        id
    }

    /// Remove a previously registered observer
    pub fn unregister_observer(&self, id: ObserverId) {
        let mut observers = self.observers.lock();
        for list in observers.values_mut() {
            list.retain(|(existing, _)| *existing != id);
        }
        observers.retain(|_, list| !list.is_empty());
    }

    fn notify_observers(&self, frame: &Frame) {
        let observers: Vec<Observer> = {
            let registry = self.observers.lock();
            match registry.get(&frame.opcode) {
                Some(list) => list.iter().map(|(_, o)| o.clone()).collect(),
                None => return,
            }
        };

        for observer in observers {
            // One faulty observer must not block delivery to the rest
            if catch_unwind(AssertUnwindSafe(|| observer(frame))).is_err() {
                error!(
                    opcode = format!("0x{:02X}", frame.opcode),
                    "observer panicked"
                );
            }
        }
    }

    /// Install the status-update callback
    pub fn set_status_callback(&self, callback: StatusCallback) {
        *self.status_callback.lock() = Some(callback);
    }

    /// Push a battery reading obtained out of band (GATT read) through
    /// the status callback
    pub fn publish_battery(&self, level: u8, temperature: Option<i16>) {
        let callback = self.status_callback.lock().clone();
        if let Some(callback) = callback {
            callback(StatusUpdate::Battery { level, temperature });
        }
    }

    /// Claim the log sink for a batch retrieval; fails if already claimed
    pub fn claim_log_sink(&self, sink: mpsc::UnboundedSender<LogEntry>) -> bool {
        let mut state = self.state.lock();
        if state.log_sink.is_some() {
            return false;
        }
        state.log_sink = Some(sink);
        true
    }

    /// Release the log sink after a batch retrieval
    pub fn release_log_sink(&self) {
        self.state.lock().log_sink = None;
    }

    /// Most recently observed door state
    pub fn door_open(&self) -> bool {
        self.state.lock().door_open
    }

    /// Age of the most recent door event, if any occurred this session
    pub fn last_door_event_age(&self) -> Option<std::time::Duration> {
        self.state
            .lock()
            .last_door_event_at
            .map(|at| at.elapsed())
    }

    /// Consume the refresh flag set by fresh door events
    pub fn take_refresh_needed(&self) -> bool {
        std::mem::take(&mut self.state.lock().refresh_needed)
    }

    /// Log count from a recent notification, if younger than `max_age`
    pub fn cached_log_count(&self, max_age: std::time::Duration) -> Option<u16> {
        self.state
            .lock()
            .cached_log_count
            .filter(|(_, at)| at.elapsed() < max_age)
            .map(|(count, _)| count)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Door transition implied by a history event, if any
fn door_transition(event: HistoryEvent) -> Option<bool> {
    if event == HistoryEvent::DoorClosed {
        Some(false)
    } else if event.opens_door() {
        Some(true)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn encoded(opcode: u8, payload: &[u8]) -> Vec<u8> {
        Frame::new(opcode, payload.to_vec()).encode().unwrap().to_vec()
    }

    #[test]
    fn test_checksum_gate_drops_frame() {
        let router = Router::new();
        let mut raw = encoded(0x84, &[0x00, 0x01]);
        raw[2] ^= 0xFF;

        router.handle_notification(&raw);

        // Corrupt frame must not have touched door state
        assert!(!router.door_open());
        assert!(router.last_door_event_age().is_none());
    }

    #[test]
    fn test_door_tracking() {
        let router = Router::new();

        router.handle_notification(&encoded(0x84, &[0x00, 0x01]));
        assert!(router.door_open());
        assert!(router.take_refresh_needed());

        // Door closed history event, zero age: fresh
        router.handle_notification(&encoded(0x90, &[0x00, 0x00, 0x00]));
        assert!(!router.door_open());
        assert!(router.take_refresh_needed());

        // Old event: door state still updates but no refresh flag
        router.handle_notification(&encoded(0x91, &[0x00, 0x0E, 0x10]));
        assert!(router.door_open());
        assert!(!router.take_refresh_needed());
    }

    #[test]
    fn test_correlation_resolution() {
        let router = Router::new();
        let rx = router.register_correlation(&[0x81, 0x82, 0xE1]);

        // Unrelated opcode does not resolve
        router.handle_notification(&encoded(0x79, &[0x00, 0x01]));

        router.handle_notification(&encoded(0x81, &[]));
        let frame = rx.blocking_recv().unwrap();
        assert_eq!(frame.opcode, 0x81);
    }

    #[test]
    fn test_one_correlation_per_reply() {
        let router = Router::new();
        let mut rx1 = router.register_correlation(&[0x77, 0x78]);
        let mut rx2 = router.register_correlation(&[0x77, 0x78]);

        router.handle_notification(&encoded(0x77, &[]));

        let resolved = [rx1.try_recv().is_ok(), rx2.try_recv().is_ok()];
        assert_eq!(resolved.iter().filter(|r| **r).count(), 1);
    }

    #[test]
    fn test_dead_correlations_pruned() {
        let router = Router::new();
        let rx = router.register_correlation(&[0x77]);
        drop(rx);
        let live = router.register_correlation(&[0x77]);

        router.handle_notification(&encoded(0x77, &[]));

        assert_eq!(live.blocking_recv().unwrap().opcode, 0x77);
    }

    #[test]
    fn test_cancel_correlations() {
        let router = Router::new();
        let rx = router.register_correlation(&[0x85]);

        router.cancel_correlations();

        assert!(rx.blocking_recv().is_err());
    }

    #[test]
    fn test_observer_isolation() {
        let router = Router::new();
        let seen = Arc::new(PlMutex::new(0u32));

        router.register_observer(0x79, Arc::new(|_| panic!("boom")));
        let counter = seen.clone();
        router.register_observer(0x79, Arc::new(move |_| *counter.lock() += 1));

        router.handle_notification(&encoded(0x79, &[0x00, 0x05]));

        assert_eq!(*seen.lock(), 1);
        // Router state stays usable after the panic
        assert_eq!(
            router.cached_log_count(std::time::Duration::from_secs(1)),
            Some(5)
        );
    }

    #[test]
    fn test_observer_unregister() {
        let router = Router::new();
        let seen = Arc::new(PlMutex::new(0u32));

        let counter = seen.clone();
        let id = router.register_observer(0x79, Arc::new(move |_| *counter.lock() += 1));

        router.handle_notification(&encoded(0x79, &[0x00, 0x01]));
        router.unregister_observer(id);
        router.handle_notification(&encoded(0x79, &[0x00, 0x02]));

        assert_eq!(*seen.lock(), 1);
    }

    #[test]
    fn test_log_sink_receives_history() {
        let router = Router::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(router.claim_log_sink(tx));

        router.handle_notification(&encoded(0x91, &[0x00, 0x00, 0x3C]));
        router.handle_notification(&encoded(0x92, &[0x00, 0x00, 0x00]));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.event, HistoryEvent::DoorOpened);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.event, HistoryEvent::EndHistory);

        // Sink is exclusive until released
        let (other, _other_rx) = mpsc::unbounded_channel();
        assert!(!router.claim_log_sink(other.clone()));
        router.release_log_sink();
        assert!(router.claim_log_sink(other));
    }

    #[test]
    fn test_status_callback_fanout() {
        let router = Router::new();
        let updates = Arc::new(PlMutex::new(Vec::new()));

        let sink = updates.clone();
        router.set_status_callback(Arc::new(move |update| sink.lock().push(update)));

        router.handle_notification(&encoded(0x84, &[0x00, 0x01]));
        router.handle_notification(&encoded(0x79, &[0x00, 0x07]));

        let updates = updates.lock();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], StatusUpdate::Door { open: true });
        assert_eq!(updates[1], StatusUpdate::LogsCount { count: 7 });
    }
}
