//! Object-store transport contract.
//!
//! The store exposes a block-based write protocol: blocks are uploaded
//! independently and become visible to readers only when included in a
//! committed block list. Re-committing the full list after every upload is
//! what makes appends possible without read-modify-write.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

/// Errors that can occur on the object-store transport.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend request failed (treated as transient by callers).
    #[error("object store error: {0}")]
    Backend(String),

    /// The destination's block list could not be interpreted.
    #[error("invalid block list for '{destination}': {reason}")]
    InvalidBlockList { destination: String, reason: String },
}

/// Identifier of one uploaded block.
///
/// Ids are deterministic in their ordinal position: the base64 encoding of
/// `BlockId` followed by the zero-padded ordinal. Two writers generating ids
/// this way WILL collide, which is why a destination must only ever have a
/// single writer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockId(String);

impl BlockId {
    /// Id for the block at 1-based ordinal `ordinal`.
    pub fn for_ordinal(ordinal: usize) -> Self {
        Self(BASE64.encode(format!("BlockId{ordinal:07}")))
    }

    /// Wrap an id reported by the store.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append-only object store: block put, block-list get, block-list commit.
///
/// `exists` reports whether the destination has any committed content; a
/// destination with uploaded but uncommitted blocks does not exist yet.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn exists(&self, destination: &str) -> Result<bool, StoreError>;

    /// Committed block ids for the destination, in committed order.
    async fn block_list(&self, destination: &str) -> Result<Vec<BlockId>, StoreError>;

    async fn put_block(
        &self,
        destination: &str,
        id: &BlockId,
        bytes: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// Atomically replace the committed block list; the only operation that
    /// makes uploaded blocks visible to readers.
    async fn commit_block_list(
        &self,
        destination: &str,
        ids: &[BlockId],
    ) -> Result<(), StoreError>;
}
