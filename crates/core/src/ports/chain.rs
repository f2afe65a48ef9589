//! Port trait for the Substrate node capability.
//!
//! This trait defines everything the pipeline needs from a node: header
//! and runtime version subscriptions, block lookups and dynamic storage
//! queries. Implementations live in the infrastructure layer
//! (e.g., `herald-substrate`).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::error::ChainResult;
use crate::models::{BlockHash, ChainExtrinsic, EventRecord, Header, RuntimeVersion};

/// Stream of new block headers.
pub type HeaderStream = Pin<Box<dyn Stream<Item = ChainResult<Header>> + Send>>;

/// Stream of runtime version updates.
pub type RuntimeVersionStream = Pin<Box<dyn Stream<Item = ChainResult<RuntimeVersion>> + Send>>;

/// Stream that yields once per re-established transport connection.
pub type ReconnectStream = Pin<Box<dyn Stream<Item = ()> + Send>>;

/// A storage key (decoded key parts) and its value.
pub type StorageEntry = (Vec<Value>, Value);

/// Port trait for a Substrate node.
///
/// Storage is addressed by metadata names (`"Democracy"`, `"ReferendumInfoOf"`).
/// Keys and values are SCALE values converted to JSON: accounts and hashes
/// as 0x-hex strings, integers as decimal strings, enums as
/// `{ "Variant": inner }`. `at = None` queries the latest block.
#[async_trait]
pub trait ChainApi: Send + Sync + 'static {
    /// Current best header.
    async fn latest_header(&self) -> ChainResult<Header>;

    /// Hash of the block at `number`.
    ///
    /// Returns the zero hash when the node no longer has the block.
    async fn block_hash(&self, number: u64) -> ChainResult<BlockHash>;

    /// Header of the block with this hash.
    async fn header(&self, hash: &BlockHash) -> ChainResult<Header>;

    /// All event records of a block.
    async fn events(&self, hash: &BlockHash) -> ChainResult<Vec<EventRecord>>;

    /// All extrinsics of a block.
    async fn extrinsics(&self, hash: &BlockHash) -> ChainResult<Vec<ChainExtrinsic>>;

    /// Current runtime version.
    async fn runtime_version(&self) -> ChainResult<RuntimeVersion>;

    /// Subscribe to runtime version changes.
    ///
    /// The stream yields the current version first.
    async fn subscribe_runtime_version(&self) -> ChainResult<RuntimeVersionStream>;

    /// Subscribe to new block headers.
    async fn subscribe_new_heads(&self) -> ChainResult<HeaderStream>;

    /// Notifications of transport reconnections.
    fn reconnections(&self) -> ReconnectStream;

    /// Fetch a single storage value.
    async fn storage(
        &self,
        at: Option<&BlockHash>,
        pallet: &str,
        entry: &str,
        keys: &[Value],
    ) -> ChainResult<Option<Value>>;

    /// Fetch several values of the same storage map.
    async fn storage_multi(
        &self,
        at: Option<&BlockHash>,
        pallet: &str,
        entry: &str,
        keys: &[Vec<Value>],
    ) -> ChainResult<Vec<Option<Value>>> {
        futures::future::try_join_all(keys.iter().map(|k| self.storage(at, pallet, entry, k))).await
    }

    /// Iterate a storage map under a partial key.
    async fn storage_entries(
        &self,
        at: Option<&BlockHash>,
        pallet: &str,
        entry: &str,
        partial_keys: &[Value],
    ) -> ChainResult<Vec<StorageEntry>>;

    /// Decode SCALE encoded `RuntimeCall` bytes.
    async fn decode_call(&self, bytes: &[u8]) -> ChainResult<Value>;

    /// Whether the runtime has a pallet with this metadata name.
    fn has_pallet(&self, pallet: &str) -> bool;

    /// Whether the runtime has this storage entry.
    fn has_storage(&self, pallet: &str, entry: &str) -> bool;
}
