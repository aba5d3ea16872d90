//! In-memory hub and store implementations.
//!
//! Back the `--simulate` mode of the binary and the integration tests. The
//! hub can answer readiness announcements with a generated assignment, which
//! is enough to drive the full handshake without a real control plane. Both
//! implementations support scripted failure injection so retry paths can be
//! exercised deterministically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::transport::hub::{
    HubError, HubMessage, HubTransport, ReadinessPayload, MSG_TYPE_ASSIGNMENT, MSG_TYPE_READY,
};
use crate::transport::store::{BlockId, ObjectStore, StoreError};

/// In-memory message hub.
///
/// Sent messages are recorded for inspection; inbound (hub-to-device)
/// messages are queued and handed out one at a time by `receive`.
pub struct MemoryHub {
    sent: Mutex<Vec<HubMessage>>,
    acked: Mutex<Vec<String>>,
    inbound_tx: mpsc::UnboundedSender<HubMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<HubMessage>>,
    /// When set, a readiness announcement is answered with an assignment
    /// generated from the announced channel list, namespaced by this
    /// container name.
    auto_assign_container: Option<String>,
    fail_sends: AtomicU32,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Hub that answers `deviceready` with a generated assignment.
    pub fn with_auto_assign(container: impl Into<String>) -> Self {
        Self::build(Some(container.into()))
    }

    fn build(auto_assign_container: Option<String>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            acked: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            auto_assign_container,
            fail_sends: AtomicU32::new(0),
        }
    }

    /// Queue an inbound (hub-to-device) message.
    pub fn push_inbound(&self, message: HubMessage) {
        let _ = self.inbound_tx.send(message);
    }

    /// Fail the next `n` sends with a transient error.
    pub fn fail_next_sends(&self, n: u32) {
        self.fail_sends.store(n, Ordering::SeqCst);
    }

    /// Snapshot of every message sent so far.
    pub fn sent(&self) -> Vec<HubMessage> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    /// Ids of acknowledged messages, in acknowledge order.
    pub fn acked_ids(&self) -> Vec<String> {
        self.acked.lock().expect("lock poisoned").clone()
    }

    /// Build the assignment reply for a readiness announcement.
    fn assignment_for(&self, ready: &ReadinessPayload, container: &str) -> HubMessage {
        let file_uri = ready
            .blob_names
            .iter()
            .map(|name| format!("{name}|mem://{container}/{}_{name}", ready.session_id))
            .collect::<Vec<_>>()
            .join("|");
        let payload = serde_json::json!({
            "messageType": MSG_TYPE_ASSIGNMENT,
            "fileUri": file_uri,
            "blobContainerName": container,
        });
        HubMessage::tagged(
            MSG_TYPE_ASSIGNMENT,
            &ready.session_id,
            payload.to_string().into_bytes(),
        )
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HubTransport for MemoryHub {
    async fn send(&self, message: HubMessage) -> Result<(), HubError> {
        if self.fail_sends.load(Ordering::SeqCst) > 0 {
            self.fail_sends.fetch_sub(1, Ordering::SeqCst);
            return Err(HubError::Send("injected failure".to_string()));
        }

        if message.message_type() == Some(MSG_TYPE_READY) {
            if let Some(container) = self.auto_assign_container.clone() {
                match serde_json::from_slice::<ReadinessPayload>(&message.payload) {
                    Ok(ready) => self.push_inbound(self.assignment_for(&ready, &container)),
                    Err(e) => {
                        tracing::warn!(error = %e, "Readiness payload undecodable, no auto-assignment")
                    }
                }
            }
        }

        self.sent.lock().expect("lock poisoned").push(message);
        Ok(())
    }

    async fn receive(&self) -> Result<Option<HubMessage>, HubError> {
        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some(message) => Ok(Some(message)),
            None => Err(HubError::Closed),
        }
    }

    async fn acknowledge(&self, message: &HubMessage) -> Result<(), HubError> {
        self.acked.lock().expect("lock poisoned").push(message.id.clone());
        Ok(())
    }
}

#[derive(Default)]
struct StoredObject {
    blocks: HashMap<String, Vec<u8>>,
    committed: Vec<BlockId>,
}

/// In-memory append-only object store.
///
/// Mirrors block-blob visibility semantics: a destination exists only once a
/// block list has been committed, and uploaded blocks stay invisible until
/// the list including them is committed.
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_commits: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_commits: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` commits with a transient error.
    pub fn fail_next_commits(&self, n: u32) {
        self.fail_commits.store(n, Ordering::SeqCst);
    }

    /// Committed content of a destination, in block order.
    pub fn read_back(&self, destination: &str) -> Option<Vec<u8>> {
        let objects = self.objects.lock().expect("lock poisoned");
        let object = objects.get(destination)?;
        if object.committed.is_empty() {
            return None;
        }
        let mut out = Vec::new();
        for id in &object.committed {
            out.extend_from_slice(object.blocks.get(id.as_str())?);
        }
        Some(out)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, destination: &str) -> Result<bool, StoreError> {
        let objects = self.objects.lock().expect("lock poisoned");
        Ok(objects
            .get(destination)
            .is_some_and(|o| !o.committed.is_empty()))
    }

    async fn block_list(&self, destination: &str) -> Result<Vec<BlockId>, StoreError> {
        let objects = self.objects.lock().expect("lock poisoned");
        Ok(objects
            .get(destination)
            .map(|o| o.committed.clone())
            .unwrap_or_default())
    }

    async fn put_block(
        &self,
        destination: &str,
        id: &BlockId,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().expect("lock poisoned");
        let object = objects.entry(destination.to_string()).or_default();
        object.blocks.insert(id.as_str().to_string(), bytes);
        Ok(())
    }

    async fn commit_block_list(
        &self,
        destination: &str,
        ids: &[BlockId],
    ) -> Result<(), StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) > 0 {
            self.fail_commits.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        let mut objects = self.objects.lock().expect("lock poisoned");
        let object = objects.entry(destination.to_string()).or_default();
        for id in ids {
            if !object.blocks.contains_key(id.as_str()) {
                return Err(StoreError::InvalidBlockList {
                    destination: destination.to_string(),
                    reason: format!("unknown block id {id}"),
                });
            }
        }
        object.committed = ids.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hub_roundtrip_and_ack() {
        let hub = MemoryHub::new();
        hub.push_inbound(HubMessage::tagged("x", "s", b"{}".to_vec()));

        let received = hub.receive().await.unwrap().unwrap();
        hub.acknowledge(&received).await.unwrap();

        assert_eq!(hub.acked_ids(), vec![received.id]);
    }

    #[tokio::test]
    async fn test_auto_assign_answers_readiness() {
        let hub = MemoryHub::with_auto_assign("data");
        let ready = ReadinessPayload {
            device_name: "mill-1".to_string(),
            session_id: "mill-1/t".to_string(),
            blob_names: vec!["EXECUTION".to_string(), "PROGRAM".to_string()],
        };
        let payload = serde_json::to_vec(&ready).unwrap();
        hub.send(HubMessage::tagged(MSG_TYPE_READY, &ready.session_id, payload))
            .await
            .unwrap();

        let reply = hub.receive().await.unwrap().unwrap();
        assert_eq!(reply.message_type(), Some(MSG_TYPE_ASSIGNMENT));
        let text = String::from_utf8(reply.payload).unwrap();
        assert!(text.contains("EXECUTION|mem://data/mill-1/t_EXECUTION"));
        assert!(text.contains("PROGRAM|mem://data/mill-1/t_PROGRAM"));
    }

    #[tokio::test]
    async fn test_store_visibility_requires_commit() {
        let store = MemoryStore::new();
        let id = BlockId::for_ordinal(1);

        store
            .put_block("obj", &id, b"header\n".to_vec())
            .await
            .unwrap();
        // Uploaded but uncommitted: invisible.
        assert!(!store.exists("obj").await.unwrap());
        assert!(store.read_back("obj").is_none());

        store.commit_block_list("obj", &[id]).await.unwrap();
        assert!(store.exists("obj").await.unwrap());
        assert_eq!(store.read_back("obj").unwrap(), b"header\n");
    }

    #[tokio::test]
    async fn test_store_commit_rejects_unknown_block() {
        let store = MemoryStore::new();
        let err = store
            .commit_block_list("obj", &[BlockId::for_ordinal(9)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidBlockList { .. }));
    }
}
