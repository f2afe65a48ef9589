//! Listener - wires subscriber, poller and processor to the handler chain.
//!
//! # Startup
//!
//! 1. Archival mode replays the chain from `start_block`; otherwise the
//!    offline range is caught up unless disabled
//! 2. Subscribe to new heads
//! 3. After every transport reconnection, catch up from the last processed
//!    block
//!
//! Every block goes through the [`Processor`] and every resulting event
//! through the [`HandlerChain`], in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures::{FutureExt, StreamExt};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument, warn};

use super::poller::{DEFAULT_MAX_BATCH_SIZE, Poller};
use super::processor::{DEFAULT_ENRICH_CONCURRENCY, Processor};
use super::subscriber::Subscriber;
use crate::error::{ListenerError, ListenerResult};
use crate::metrics::{record_catchup, record_handler_error};
use crate::models::{Block, CWEvent, DisconnectedRange};
use crate::ports::{
    ChainApi, EventProcessor, EventSubscriber, HandlerChain, OnBlock, ReconnectRangeSource,
};

// =============================================================================
// Configuration
// =============================================================================

/// Listener options.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    /// Chain identifier stamped on every event.
    pub chain: String,
    /// Skip the offline range catch-up at startup.
    pub skip_catchup: bool,
    /// Replay the whole chain from `start_block` before following the head.
    pub archival: bool,
    /// First block replayed in archival mode (default 0).
    pub start_block: Option<u64>,
    /// Log every block at info level.
    pub verbose: bool,
    /// Window size for catch-up and archival polling.
    pub max_batch_size: u64,
    /// Enrichments in flight per block.
    pub enrich_concurrency: usize,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            chain: "edgeware".to_string(),
            skip_catchup: false,
            archival: false,
            start_block: None,
            verbose: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            enrich_concurrency: DEFAULT_ENRICH_CONCURRENCY,
        }
    }
}

/// Pick the range to catch up on after being offline.
///
/// `discovered` comes from a [`ReconnectRangeSource`], `last_processed` is
/// the processor's highest block. The older of the two start points wins so
/// that nothing is skipped. Returns `None` when neither is known.
pub fn resolve_offline_range(
    discovered: Option<DisconnectedRange>,
    last_processed: Option<u64>,
) -> Option<DisconnectedRange> {
    let cached = last_processed.map(|n| n.saturating_add(1));
    let start = match (discovered.and_then(|r| r.start_block), cached) {
        (Some(found), Some(cached)) => found.min(cached),
        (Some(found), None) => found,
        (None, Some(cached)) => cached,
        (None, None) => return None,
    };
    Some(DisconnectedRange {
        start_block: Some(start),
        end_block: discovered.and_then(|r| r.end_block),
    })
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatchUpTrigger {
    Startup,
    Reconnect,
}

impl CatchUpTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Reconnect => "reconnect",
        }
    }
}

/// Block-to-handlers path shared by every delivery route.
struct Pipeline<C: ?Sized> {
    chain: String,
    processor: Arc<Processor<C>>,
    poller: Arc<Poller<C>>,
    handlers: HandlerChain,
    range_source: Arc<dyn ReconnectRangeSource>,
    max_batch_size: u64,
}

impl<C: ChainApi + ?Sized> Pipeline<C> {
    async fn handle_block(&self, block: Block) {
        for event in self.processor.process(&block).await {
            self.dispatch(event).await;
        }
    }

    /// Run one event through the handler chain.
    ///
    /// A failing handler ends the chain for this event only.
    async fn dispatch(&self, mut event: CWEvent) {
        event.chain = Some(self.chain.clone());
        event.received = Some(Utc::now());

        let mut previous = None;
        for handler in self.handlers.all() {
            match handler.handle(&event, previous.take()).await {
                Ok(output) => previous = output,
                Err(e) => {
                    error!(
                        handler = handler.name(),
                        kind = %event.kind(),
                        block = event.block_number,
                        error = %e,
                        "❌ Handler failed"
                    );
                    record_handler_error(handler.name());
                    break;
                }
            }
        }
    }

    /// Range to catch up on for `trigger`.
    ///
    /// After a reconnect the processor's last block is authoritative; the
    /// range source is consulted at startup or when nothing was processed yet.
    async fn offline_range(&self, trigger: CatchUpTrigger) -> Option<DisconnectedRange> {
        let last = self.processor.last_block_number();
        if let (CatchUpTrigger::Reconnect, Some(last)) = (trigger, last) {
            return Some(DisconnectedRange::from_block(last.saturating_add(1)));
        }
        resolve_offline_range(self.range_source.discover().await, last)
    }

    /// Poll and process the blocks missed while offline.
    #[instrument(skip(self))]
    async fn catch_up(&self, trigger: CatchUpTrigger) {
        let Some(range) = self.offline_range(trigger).await else {
            warn!("⚠️  No offline range known, skipping catch-up");
            return;
        };
        record_catchup(trigger.as_str());
        info!(start = ?range.start_block, end = ?range.end_block, "🔁 Catching up on missed blocks");

        match self.poller.poll(range, self.max_batch_size).await {
            Ok(blocks) => {
                let count = blocks.len();
                for block in blocks {
                    self.handle_block(block).await;
                }
                info!(blocks = count, "✅ Catch-up complete");
            }
            Err(e) => error!(error = %e, "❌ Catch-up poll failed"),
        }
    }
}

fn block_callback<C: ChainApi + ?Sized>(pipeline: Arc<Pipeline<C>>) -> OnBlock {
    Arc::new(move |block: Block| {
        let pipeline = pipeline.clone();
        async move { pipeline.handle_block(block).await }.boxed()
    })
}

// =============================================================================
// Listener
// =============================================================================

/// Orchestrates ingestion for one chain connection.
pub struct Listener<C: ?Sized> {
    options: ListenerOptions,
    api: Arc<C>,
    pipeline: Arc<Pipeline<C>>,
    subscriber: Arc<Subscriber<C>>,
    started: AtomicBool,
}

impl<C: ChainApi + ?Sized> Listener<C> {
    pub fn new(
        api: Arc<C>,
        options: ListenerOptions,
        handlers: HandlerChain,
        range_source: Arc<dyn ReconnectRangeSource>,
    ) -> Self {
        let processor = Arc::new(
            Processor::new(api.clone()).with_enrich_concurrency(options.enrich_concurrency),
        );
        let pipeline = Arc::new(Pipeline {
            chain: options.chain.clone(),
            processor,
            poller: Arc::new(Poller::new(api.clone())),
            handlers,
            range_source,
            max_batch_size: options.max_batch_size,
        });
        Self {
            subscriber: Arc::new(Subscriber::new(api.clone(), options.verbose)),
            options,
            api,
            pipeline,
            started: AtomicBool::new(false),
        }
    }

    pub fn processor(&self) -> &Arc<Processor<C>> {
        &self.pipeline.processor
    }

    pub fn options(&self) -> &ListenerOptions {
        &self.options
    }

    /// Catch up as configured, then follow the chain head.
    ///
    /// Can only be called once.
    #[instrument(skip_all, fields(chain = %self.options.chain))]
    pub async fn start(&self) -> ListenerResult<ListenerHandle> {
        if self.options.max_batch_size == 0 {
            return Err(ListenerError::ConfigError(
                "max_batch_size must be positive".into(),
            ));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadySubscribed);
        }
        info!("⛓️  Starting listener");

        let on_block = block_callback(self.pipeline.clone());

        if self.options.archival {
            let start = self.options.start_block.unwrap_or(0);
            record_catchup("archival");
            info!(start, "📚 Archival mode, replaying chain");
            self.pipeline
                .poller
                .archive(
                    DisconnectedRange::from_block(start),
                    self.options.max_batch_size,
                    Some(on_block.clone()),
                )
                .await;
        } else if self.options.skip_catchup {
            debug!("Catch-up disabled");
        } else {
            self.pipeline.catch_up(CatchUpTrigger::Startup).await;
        }

        let mut reconnections = self.api.reconnections();
        let pipeline = self.pipeline.clone();
        let reconnect_task = tokio::spawn(async move {
            while reconnections.next().await.is_some() {
                info!("🔄 Connection re-established");
                pipeline.catch_up(CatchUpTrigger::Reconnect).await;
            }
        });

        if let Err(e) = self.subscriber.subscribe(on_block).await {
            reconnect_task.abort();
            self.started.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        info!("📡 Listening for new blocks");

        let subscriber: Arc<dyn EventSubscriber> = self.subscriber.clone();
        let processor: Arc<dyn EventProcessor> = self.pipeline.processor.clone();
        Ok(ListenerHandle {
            subscriber,
            processor,
            reconnect_task: reconnect_task.abort_handle(),
        })
    }
}

/// Handle to a running listener.
pub struct ListenerHandle {
    subscriber: Arc<dyn EventSubscriber>,
    processor: Arc<dyn EventProcessor>,
    reconnect_task: AbortHandle,
}

impl ListenerHandle {
    /// Stop following the chain. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.reconnect_task.abort();
        self.subscriber.unsubscribe();
    }

    /// Highest block number processed so far.
    pub fn last_block_number(&self) -> Option<u64> {
        self.processor.last_block_number()
    }
}
