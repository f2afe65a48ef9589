//! Historical block fetching.
//!
//! `poll` fetches one bounded window, `archive` walks an arbitrarily large
//! range window by window.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ChainError, ChainResult};
use crate::metrics::record_pruned_blocks;
use crate::models::{Block, BlockHash, DisconnectedRange};
use crate::ports::{ChainApi, EventPoller, OnBlock};

/// Default window size for catch-up polling.
pub const DEFAULT_MAX_BATCH_SIZE: u64 = 500;

/// Block fetches in flight within one window.
const FETCH_CONCURRENCY: usize = 32;

/// Fetches past blocks through a [`ChainApi`].
pub struct Poller<C: ?Sized> {
    api: Arc<C>,
}

impl<C: ChainApi + ?Sized> Poller<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self { api }
    }

    /// Fetch blocks `[start, end)` of `range`, keeping at most the last
    /// `max_results` of them.
    ///
    /// A missing end is the current head. Blocks the node no longer has are
    /// skipped.
    #[instrument(skip_all, fields(start = ?range.start_block, end = ?range.end_block))]
    pub async fn poll(&self, range: DisconnectedRange, max_results: u64) -> ChainResult<Vec<Block>> {
        let Some(mut start) = range.start_block else {
            warn!("⚠️  No start block given, nothing to poll");
            return Ok(Vec::new());
        };
        let end = match range.end_block {
            Some(end) => end,
            None => self.api.latest_header().await?.number,
        };
        if end <= start {
            error!(start, end, "❌ Invalid range, end must be after start");
            return Ok(Vec::new());
        }
        if end - start > max_results {
            let trimmed = end - max_results;
            info!(
                requested_start = start,
                start = trimmed,
                end,
                "✂️  Range exceeds batch size, keeping the most recent blocks"
            );
            start = trimmed;
        }

        let runtime_version = self.api.runtime_version().await?;

        let hashes: Vec<BlockHash> = stream::iter(start..end)
            .map(|number| self.api.block_hash(number))
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await?;
        let requested = hashes.len();
        let hashes: Vec<BlockHash> = hashes.into_iter().filter(|h| !h.is_zero()).collect();
        let pruned = requested - hashes.len();
        if pruned > 0 {
            warn!(requested, available = hashes.len(), "⚠️  Skipping pruned blocks");
            record_pruned_blocks(pruned as u64);
        }
        debug!(requested, available = hashes.len(), "Fetching blocks");

        let blocks = stream::iter(hashes)
            .map(|hash| {
                let runtime_version = runtime_version.clone();
                async move {
                    let (header, events, extrinsics) = futures::try_join!(
                        self.api.header(&hash),
                        self.api.events(&hash),
                        self.api.extrinsics(&hash),
                    )?;
                    Ok::<_, ChainError>(Block {
                        header,
                        events,
                        extrinsics,
                        runtime_version,
                    })
                }
            })
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(blocks)
    }

    /// Walk `range` in sequential windows of `batch_size` blocks.
    ///
    /// With `on_block`, each window's blocks are handed over as soon as the
    /// window completes and nothing is accumulated. A failing window stops
    /// the walk; whatever was gathered so far is returned.
    #[instrument(skip_all, fields(start = ?range.start_block, end = ?range.end_block))]
    pub async fn archive(
        &self,
        range: DisconnectedRange,
        batch_size: u64,
        on_block: Option<OnBlock>,
    ) -> Vec<Block> {
        let batch_size = batch_size.max(1);
        let start = range.start_block.unwrap_or(0);
        let end = match range.end_block {
            Some(end) => end,
            None => match self.api.latest_header().await {
                Ok(header) => header.number,
                Err(e) => {
                    error!(error = %e, "❌ Could not resolve chain head for archival");
                    return Vec::new();
                }
            },
        };
        info!(start, end, batch_size, "📚 Archiving blocks");

        let mut gathered = Vec::new();
        let mut window_start = start;
        while window_start < end {
            let window_end = window_start.saturating_add(batch_size).min(end);
            let window = DisconnectedRange {
                start_block: Some(window_start),
                end_block: Some(window_end),
            };
            let blocks = match self.poll(window, batch_size).await {
                Ok(blocks) => blocks,
                Err(e) => {
                    error!(
                        start = window_start,
                        end = window_end,
                        error = %e,
                        "❌ Archive window failed, stopping"
                    );
                    break;
                }
            };
            debug!(start = window_start, end = window_end, blocks = blocks.len(), "Window fetched");

            match &on_block {
                Some(callback) => {
                    for block in blocks {
                        callback(block).await;
                    }
                }
                None => gathered.extend(blocks),
            }
            window_start = window_end;
        }

        gathered
    }
}

#[async_trait]
impl<C: ChainApi + ?Sized> EventPoller for Poller<C> {
    async fn poll(&self, range: DisconnectedRange, max_results: u64) -> ChainResult<Vec<Block>> {
        Poller::poll(self, range, max_results).await
    }

    async fn archive(
        &self,
        range: DisconnectedRange,
        batch_size: u64,
        on_block: Option<OnBlock>,
    ) -> Vec<Block> {
        Poller::archive(self, range, batch_size, on_block).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    use futures::FutureExt;

    use super::*;
    use crate::testing::MockChain;

    fn range(start: u64, end: u64) -> DisconnectedRange {
        DisconnectedRange {
            start_block: Some(start),
            end_block: Some(end),
        }
    }

    fn numbers(blocks: &[Block]) -> Vec<u64> {
        blocks.iter().map(Block::number).collect()
    }

    // Oversized ranges keep the most recent window
    #[tokio::test]
    async fn test_poll_truncates_to_tail() {
        let api = Arc::new(MockChain::new());
        let poller = Poller::new(api.clone());

        let blocks = poller.poll(range(0, 1000), 500).await.unwrap();

        assert_eq!(blocks.len(), 500);
        assert_eq!(blocks[0].number(), 500);
        assert_eq!(blocks[499].number(), 999);
        assert_eq!(api.blocks_fetched.load(Ordering::SeqCst), 500);
    }

    #[tokio::test]
    async fn test_poll_skips_pruned_blocks() {
        let api = Arc::new(MockChain::new());
        for number in [11, 13, 14] {
            api.prune(number);
        }
        let poller = Poller::new(api.clone());

        let blocks = poller.poll(range(10, 20), 500).await.unwrap();

        assert_eq!(blocks.len(), 7);
        assert_eq!(numbers(&blocks), vec![10, 12, 15, 16, 17, 18, 19]);
    }

    #[tokio::test]
    async fn test_poll_defaults_end_to_head() {
        let api = Arc::new(MockChain::new());
        api.set_head(25);
        let poller = Poller::new(api);

        let blocks = poller.poll(DisconnectedRange::from_block(20), 500).await.unwrap();
        assert_eq!(numbers(&blocks), vec![20, 21, 22, 23, 24]);
        assert_eq!(blocks[0].runtime_version.spec_version, 40);
    }

    #[tokio::test]
    async fn test_poll_rejects_empty_or_open_ranges() {
        let poller = Poller::new(Arc::new(MockChain::new()));

        assert!(poller.poll(range(10, 10), 500).await.unwrap().is_empty());
        assert!(poller.poll(range(10, 3), 500).await.unwrap().is_empty());
        assert!(poller.poll(DisconnectedRange::default(), 500).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_propagates_fetch_errors() {
        let api = Arc::new(MockChain::new());
        api.fail_block(4);
        let poller = Poller::new(api);

        assert!(poller.poll(range(0, 10), 500).await.is_err());
    }

    #[tokio::test]
    async fn test_archive_accumulates_windows() {
        let api = Arc::new(MockChain::new());
        api.set_head(23);
        let poller = Poller::new(api);

        let blocks = poller.archive(DisconnectedRange::default(), 10, None).await;
        assert_eq!(numbers(&blocks), (0..23).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_archive_streams_to_callback() {
        let poller = Poller::new(Arc::new(MockChain::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_block: OnBlock = Arc::new(move |block: Block| {
            let sink = sink.clone();
            async move { sink.lock().unwrap().push(block.number()) }.boxed()
        });

        let returned = poller.archive(range(5, 17), 4, Some(on_block)).await;

        assert!(returned.is_empty());
        assert_eq!(*seen.lock().unwrap(), (5..17).collect::<Vec<_>>());
    }

    // A failing window ends the walk with what was gathered before it
    #[tokio::test]
    async fn test_archive_stops_at_failed_window() {
        let api = Arc::new(MockChain::new());
        api.fail_block(12);
        let poller = Poller::new(api);

        let blocks = poller.archive(range(0, 30), 5, None).await;
        assert_eq!(numbers(&blocks), (0..10).collect::<Vec<_>>());
    }
}
