//! Background room synchronisation
//!
//! The game loop never awaits the network. Requests run on the runtime with a
//! timeout and their results come back through a channel that the loop drains
//! once per frame. Writes go through one writer task so they land in the
//! order they were queued.

use crate::room::{BattleRoom, PlayerPatch, RoomPatch, Slot};
use crate::transport::{RoomTransport, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Largest attack delta accepted from a single observation
pub const MAX_ATTACK_DELTA: i64 = 100;

/// Attack lines sent and received through the monotonic `attack_queue`
/// counters
#[derive(Debug, Clone, Default)]
pub struct AttackAccounting {
    lines_sent_total: i64,
    /// Highest opponent counter observed, None until the first observation
    lines_received_total: Option<i64>,
    pending_garbage: usize,
}

impl AttackAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines_sent_total(&self) -> i64 {
        self.lines_sent_total
    }

    pub fn lines_received_total(&self) -> Option<i64> {
        self.lines_received_total
    }

    pub fn pending_garbage(&self) -> usize {
        self.pending_garbage
    }

    /// Count outgoing attack lines, returns the new counter value
    pub fn record_sent(&mut self, lines: usize) -> i64 {
        self.lines_sent_total += lines as i64;
        self.lines_sent_total
    }

    /// Observe the opponent's counter. Returns the garbage added.
    ///
    /// The first observation only sets the baseline. A counter that went
    /// backwards or jumped by `MAX_ATTACK_DELTA` or more re-bases the marker
    /// without adding garbage. Negative counters are ignored.
    pub fn observe(&mut self, remote: i64) -> usize {
        if remote < 0 {
            warn!("ignoring negative attack counter {}", remote);
            return 0;
        }

        let Some(last) = self.lines_received_total else {
            self.lines_received_total = Some(remote);
            return 0;
        };

        let delta = remote - last;
        self.lines_received_total = Some(remote);
        match delta {
            0 => 0,
            d if d < 0 => {
                debug!("attack counter went back from {} to {}, re-basing", last, remote);
                0
            }
            d if d >= MAX_ATTACK_DELTA => {
                warn!("rejecting implausible attack delta {}", d);
                0
            }
            d => {
                self.pending_garbage += d as usize;
                d as usize
            }
        }
    }

    /// Hand over all pending garbage
    pub fn take_pending(&mut self) -> usize {
        std::mem::take(&mut self.pending_garbage)
    }

    /// Drop pending garbage without applying it
    pub fn clear_pending(&mut self) {
        self.pending_garbage = 0;
    }
}

/// Rate limiter driven by explicit timestamps in seconds
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: f64,
    last: Option<f64>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.as_secs_f64(),
            last: None,
        }
    }

    /// True at most once per interval. Firing records `now`.
    pub fn ready(&mut self, now: f64) -> bool {
        match self.last {
            Some(last) if now - last < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// A network operation the game loop wants performed
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRequest {
    Poll,
    PatchPlayer(Slot, PlayerPatch),
    PatchRoom(RoomPatch),
}

impl SyncRequest {
    fn name(&self) -> &'static str {
        match self {
            SyncRequest::Poll => "poll",
            SyncRequest::PatchPlayer(..) => "patch player",
            SyncRequest::PatchRoom(_) => "patch room",
        }
    }
}

/// Result of a finished request
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Poll result, None if the room is gone
    Room(Option<BattleRoom>),
    Written,
    Failed { request: &'static str, error: String },
}

/// Run one request to completion against `transport`
pub async fn perform<T: RoomTransport>(transport: &T, request: &SyncRequest) -> Result<SyncEvent, TransportError> {
    match request {
        SyncRequest::Poll => transport.get_room().await.map(SyncEvent::Room),
        SyncRequest::PatchPlayer(slot, patch) => transport
            .patch_player(*slot, patch)
            .await
            .map(|_| SyncEvent::Written),
        SyncRequest::PatchRoom(patch) => transport.patch_room(patch).await.map(|_| SyncEvent::Written),
    }
}

/// Run `request` with a timeout, turning failures into `SyncEvent::Failed`
async fn run_request<T: RoomTransport>(transport: &T, request: &SyncRequest, timeout: Duration) -> SyncEvent {
    let name = request.name();
    let outcome = tokio::time::timeout(timeout, perform(transport, request))
        .await
        .unwrap_or(Err(TransportError::Timeout));

    match outcome {
        Ok(event) => event,
        Err(e) => {
            warn!("{} failed: {}", name, e);
            SyncEvent::Failed {
                request: name,
                error: e.to_string(),
            }
        }
    }
}

/// Dispatches requests onto a runtime and queues their results
pub struct SyncClient<T: RoomTransport> {
    transport: Arc<T>,
    handle: Handle,
    timeout: Duration,
    tx: mpsc::UnboundedSender<SyncEvent>,
    rx: mpsc::UnboundedReceiver<SyncEvent>,
    writes: mpsc::UnboundedSender<SyncRequest>,
    poll_in_flight: Arc<AtomicBool>,
}

impl<T: RoomTransport> SyncClient<T> {
    pub fn new(transport: Arc<T>, handle: Handle, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (writes, mut pending) = mpsc::unbounded_channel::<SyncRequest>();

        let writer_transport = Arc::clone(&transport);
        let writer_tx = tx.clone();
        handle.spawn(async move {
            while let Some(request) = pending.recv().await {
                let event = run_request(writer_transport.as_ref(), &request, timeout).await;
                if writer_tx.send(event).is_err() {
                    break;
                }
            }
        });

        Self {
            transport,
            handle,
            timeout,
            tx,
            rx,
            writes,
            poll_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue `request`. Writes are applied one at a time in order. A poll runs
    /// on its own and is skipped while another poll is still out.
    pub fn dispatch(&self, request: SyncRequest) {
        if request != SyncRequest::Poll {
            if self.writes.send(request).is_err() {
                warn!("writer task is gone, dropping write");
            }
            return;
        }

        if self.poll_in_flight.swap(true, Ordering::SeqCst) {
            debug!("previous poll still in flight, skipping");
            return;
        }

        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let timeout = self.timeout;
        let poll_in_flight = Arc::clone(&self.poll_in_flight);

        self.handle.spawn(async move {
            let event = run_request(transport.as_ref(), &SyncRequest::Poll, timeout).await;
            poll_in_flight.store(false, Ordering::SeqCst);
            // Receiver gone means the game loop has exited
            let _ = tx.send(event);
        });
    }

    /// Everything that finished since the last drain
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
