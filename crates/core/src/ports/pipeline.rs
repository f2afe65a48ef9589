//! Port traits for the pipeline stages.
//!
//! Services implement these so that the listener and the binary can drive
//! them without knowing the concrete node adapter.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::ChainResult;
use crate::models::{Block, CWEvent, DisconnectedRange, EntityKind, CollectiveName};

/// Async per-block callback used by the subscriber and archive polling.
pub type OnBlock = Arc<dyn Fn(Block) -> BoxFuture<'static, ()> + Send + Sync>;

/// Turns raw blocks into normalized events.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Classify and enrich every event and successful extrinsic of a block.
    async fn process(&self, block: &Block) -> Vec<CWEvent>;

    /// Highest block number processed so far.
    fn last_block_number(&self) -> Option<u64>;
}

/// Fetches historical blocks.
#[async_trait]
pub trait EventPoller: Send + Sync {
    /// Fetch at most `max_results` blocks from the tail of `range`.
    async fn poll(&self, range: DisconnectedRange, max_results: u64) -> ChainResult<Vec<Block>>;

    /// Fetch an arbitrarily large range in sequential `batch_size` windows.
    ///
    /// With `on_block`, blocks are handed over as each window completes and
    /// the returned list is empty.
    async fn archive(
        &self,
        range: DisconnectedRange,
        batch_size: u64,
        on_block: Option<OnBlock>,
    ) -> Vec<Block>;
}

/// Follows the chain head.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Start delivering new blocks to `on_block`.
    async fn subscribe(&self, on_block: OnBlock) -> ChainResult<()>;

    /// Stop delivering blocks. Safe to call more than once.
    fn unsubscribe(&self);
}

/// Synthesizes events from present chain state.
#[async_trait]
pub trait StorageFetch: Send + Sync {
    /// Events for every open entity on chain.
    async fn fetch(&self) -> ChainResult<Vec<CWEvent>>;

    /// Events for a single entity.
    async fn fetch_one(
        &self,
        id: &str,
        kind: EntityKind,
        collective: Option<CollectiveName>,
    ) -> ChainResult<Vec<CWEvent>>;

    /// `IdentitySet` events for addresses with a display name.
    async fn fetch_identities(&self, addresses: &[String]) -> ChainResult<Vec<CWEvent>>;
}

/// Source of the last processed block, typically backed by a store.
#[async_trait]
pub trait ReconnectRangeSource: Send + Sync {
    async fn discover(&self) -> Option<DisconnectedRange>;
}

/// A range known up front, e.g. from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRange(pub Option<DisconnectedRange>);

#[async_trait]
impl ReconnectRangeSource for StaticRange {
    async fn discover(&self) -> Option<DisconnectedRange> {
        self.0
    }
}
