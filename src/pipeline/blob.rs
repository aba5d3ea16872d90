//! Append-only block writes to the object store.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::pipeline::channel::ChannelKey;
use crate::pipeline::session::Destination;
use crate::pipeline::sink::{BatchSink, RetryPolicy, SinkError};
use crate::transport::store::{BlockId, ObjectStore, StoreError};

/// Column header row written as the first block of every destination.
pub const HEADER_ROW: &str = "datetime,unixdatetime,value,sequence";

/// Writes batches to object storage with the block protocol:
/// header block first, then one block per batch, re-committing the full
/// block list after every upload.
///
/// The fetched block list is the authoritative order and count; block ids
/// are deterministic in their ordinal position. Because of that, a
/// destination must only ever have a single writer; concurrent writers
/// would generate colliding ids.
///
/// A failure anywhere in the round is retried from the list fetch: an
/// uploaded but uncommitted block has no visible effect, so the retry is
/// idempotent.
pub struct AppendBlobWriter<S> {
    store: Arc<S>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl<S: ObjectStore> AppendBlobWriter<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            store,
            policy,
            cancel,
        }
    }

    /// Append one batch to `destination`, creating it with the header block
    /// on first write.
    pub async fn append_batch(&self, destination: &str, text: &str) -> Result<(), SinkError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.append_once(destination, text).await {
                Ok(committed) => {
                    tracing::debug!(destination, blocks = committed, attempt, "Batch committed");
                    return Ok(());
                }
                Err(e) if attempt >= self.policy.max_attempts => {
                    tracing::error!(
                        destination,
                        error = %e,
                        attempts = attempt,
                        "Append abandoned"
                    );
                    return Err(SinkError::Exhausted {
                        destination: destination.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let backoff = self.policy.backoff(attempt);
                    tracing::warn!(
                        destination,
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Append failed, retrying from block-list fetch"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(SinkError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    /// One append round. Returns the committed block count.
    async fn append_once(&self, destination: &str, text: &str) -> Result<usize, StoreError> {
        // Recover the committed list, or seed a fresh destination with the
        // header block. The header stays invisible until the first commit,
        // so re-seeding after a failed round rewrites the same id.
        let mut ids = if self.store.exists(destination).await? {
            self.store.block_list(destination).await?
        } else {
            let header = BlockId::for_ordinal(1);
            let bytes = format!("{HEADER_ROW}\n").into_bytes();
            self.store.put_block(destination, &header, bytes).await?;
            vec![header]
        };

        let id = BlockId::for_ordinal(ids.len() + 1);
        self.store
            .put_block(destination, &id, text.as_bytes().to_vec())
            .await?;
        ids.push(id);

        // Commit is the only visibility point.
        self.store.commit_block_list(destination, &ids).await?;
        Ok(ids.len())
    }
}

#[async_trait::async_trait]
impl<S: ObjectStore> BatchSink for AppendBlobWriter<S> {
    async fn deliver(
        &self,
        channel: ChannelKey,
        destination: &Destination,
        text: String,
    ) -> Result<(), SinkError> {
        tracing::trace!(channel = %channel, destination = %destination, "Dispatching to store");
        self.append_batch(destination.as_str(), &text).await
    }
}
