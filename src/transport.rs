//! Room document transport
//!
//! `HttpTransport` talks to a Firebase-style realtime database over REST:
//! `GET`/`PUT`/`PATCH` on `{base}/battles/{room}.json`, with player records at
//! `{base}/battles/{room}/{slot}.json`. A missing room reads back as `null`.

use crate::room::{BattleRoom, PlayerPatch, RoomPatch, Slot};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("failed to decode room: {0}")]
    Decode(String),

    #[error("request timed out")]
    Timeout,
}

/// Abstract access to one shared room document
pub trait RoomTransport: Send + Sync + 'static {
    /// Read the whole room, None if it does not exist
    fn get_room(&self) -> impl Future<Output = Result<Option<BattleRoom>, TransportError>> + Send;

    /// Overwrite the whole room
    fn put_room(&self, room: &BattleRoom) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Merge fields into one player's record
    fn patch_player(
        &self,
        slot: Slot,
        patch: &PlayerPatch,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Merge room-level fields
    fn patch_room(&self, patch: &RoomPatch) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// REST client for a Firebase-style document store
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    room: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, room: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            room: room.to_string(),
        })
    }

    fn room_url(&self) -> String {
        format!("{}/battles/{}.json", self.base_url, self.room)
    }

    fn player_url(&self, slot: Slot) -> String {
        format!("{}/battles/{}/{}.json", self.base_url, self.room, slot)
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: String,
        body: &T,
    ) -> Result<(), TransportError> {
        debug!("{} {}", method, url);
        let response = self
            .client
            .request(method, &url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest)?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

fn map_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(err)
    }
}

impl RoomTransport for HttpTransport {
    async fn get_room(&self) -> Result<Option<BattleRoom>, TransportError> {
        let url = self.room_url();
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await.map_err(map_reqwest)?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        let body = response.text().await.map_err(map_reqwest)?;
        serde_json::from_str::<Option<BattleRoom>>(&body)
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn put_room(&self, room: &BattleRoom) -> Result<(), TransportError> {
        self.send_json(reqwest::Method::PUT, self.room_url(), room)
            .await
    }

    async fn patch_player(&self, slot: Slot, patch: &PlayerPatch) -> Result<(), TransportError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.send_json(reqwest::Method::PATCH, self.player_url(slot), patch)
            .await
    }

    async fn patch_room(&self, patch: &RoomPatch) -> Result<(), TransportError> {
        self.send_json(reqwest::Method::PATCH, self.room_url(), patch)
            .await
    }
}

/// In-process document store with the same merge rules as the REST backend.
/// Clones share the document, so two clients can play through one instance.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    doc: Mutex<Value>,
    offline: AtomicBool,
    requests: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&self) -> Result<(), TransportError> {
        self.inner.requests.fetch_add(1, Ordering::SeqCst);
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Status(503));
        }
        Ok(())
    }

    fn merge_at(&self, key: Option<&str>, patch: Value) {
        let mut doc = self.inner.doc.lock();
        if !doc.is_object() {
            *doc = Value::Object(Default::default());
        }
        let target = match key {
            Some(key) => {
                let Value::Object(map) = &mut *doc else {
                    return;
                };
                let entry = map
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Default::default()));
                if !entry.is_object() {
                    *entry = Value::Object(Default::default());
                }
                entry
            }
            None => &mut *doc,
        };
        if let (Value::Object(map), Value::Object(fields)) = (target, patch) {
            map.extend(fields);
        }
    }
}

#[cfg(test)]
impl MemoryTransport {
    /// While offline every request fails with a 503
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of requests served or refused so far
    pub fn requests(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }

    /// Current document, None if the room does not exist
    pub fn snapshot(&self) -> Option<BattleRoom> {
        let doc = self.inner.doc.lock();
        if doc.is_null() {
            return None;
        }
        serde_json::from_value(doc.clone()).ok()
    }

    /// Replace the raw document
    pub fn set_raw(&self, value: Value) {
        *self.inner.doc.lock() = value;
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, TransportError> {
    serde_json::to_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}

impl RoomTransport for MemoryTransport {
    async fn get_room(&self) -> Result<Option<BattleRoom>, TransportError> {
        self.begin()?;
        let doc = self.inner.doc.lock().clone();
        serde_json::from_value::<Option<BattleRoom>>(doc)
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn put_room(&self, room: &BattleRoom) -> Result<(), TransportError> {
        self.begin()?;
        let value = to_value(room)?;
        *self.inner.doc.lock() = value;
        Ok(())
    }

    async fn patch_player(&self, slot: Slot, patch: &PlayerPatch) -> Result<(), TransportError> {
        self.begin()?;
        let value = to_value(patch)?;
        self.merge_at(Some(slot.as_str()), value);
        Ok(())
    }

    async fn patch_room(&self, patch: &RoomPatch) -> Result<(), TransportError> {
        self.begin()?;
        let value = to_value(patch)?;
        self.merge_at(None, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomState;

    #[tokio::test]
    async fn test_missing_room_reads_none() {
        let transport = MemoryTransport::new();
        assert!(transport.get_room().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let transport = MemoryTransport::new();
        let room = BattleRoom::hosted(5.0);
        transport.put_room(&room).await.unwrap();
        assert_eq!(transport.get_room().await.unwrap(), Some(room));
    }

    #[tokio::test]
    async fn test_player_patch_leaves_other_record_alone() {
        let transport = MemoryTransport::new();
        transport.put_room(&BattleRoom::hosted(5.0)).await.unwrap();

        let patch = PlayerPatch {
            ready: Some(true),
            ..PlayerPatch::default()
        };
        transport.patch_player(Slot::P2, &patch).await.unwrap();
        transport
            .patch_player(
                Slot::P1,
                &PlayerPatch {
                    score: Some(1000),
                    ..PlayerPatch::default()
                },
            )
            .await
            .unwrap();

        let room = transport.get_room().await.unwrap().unwrap();
        let p1 = room.p1.unwrap();
        let p2 = room.p2.unwrap();
        assert!(!p1.ready);
        assert_eq!(p1.score, 1000);
        assert_eq!(p1.last_seen, 5.0);
        assert!(p2.ready);
        assert_eq!(p2.score, 0);
    }

    #[tokio::test]
    async fn test_room_patch_merges_top_level() {
        let transport = MemoryTransport::new();
        transport.put_room(&BattleRoom::hosted(5.0)).await.unwrap();
        transport
            .patch_room(&RoomPatch {
                state: Some(RoomState::Countdown),
                countdown_start: Some(9.0),
                last_update: None,
            })
            .await
            .unwrap();

        let room = transport.snapshot().unwrap();
        assert_eq!(room.state, RoomState::Countdown);
        assert_eq!(room.countdown_start, 9.0);
        assert_eq!(room.last_update, 5.0);
        assert!(room.p1.is_some());
    }

    #[tokio::test]
    async fn test_offline_requests_fail() {
        let transport = MemoryTransport::new();
        transport.set_offline(true);
        assert!(matches!(
            transport.get_room().await,
            Err(TransportError::Status(503))
        ));
        transport.set_offline(false);
        assert!(transport.get_room().await.is_ok());
        assert_eq!(transport.requests(), 2);
    }

    #[tokio::test]
    async fn test_garbled_document_is_a_decode_error() {
        let transport = MemoryTransport::new();
        transport.set_raw(serde_json::json!({"state": "sideways"}));
        assert!(matches!(
            transport.get_room().await,
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn test_http_urls() {
        let transport =
            HttpTransport::new("http://localhost:9000/", "arena", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.room_url(), "http://localhost:9000/battles/arena.json");
        assert_eq!(
            transport.player_url(Slot::P2),
            "http://localhost:9000/battles/arena/p2.json"
        );
    }
}
