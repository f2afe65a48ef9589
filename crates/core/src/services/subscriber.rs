//! Chain head subscription.
//!
//! Follows new heads, fetches each block's events and extrinsics and hands
//! the assembled [`Block`] to a callback, one block at a time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{ChainError, ChainResult};
use crate::models::{Block, Header, RuntimeVersion};
use crate::ports::{ChainApi, EventSubscriber, HeaderStream, OnBlock, RuntimeVersionStream};

// Exponential backoff for re-subscribing after a dropped stream
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Delivers new blocks as the chain produces them.
pub struct Subscriber<C: ?Sized> {
    api: Arc<C>,
    verbose: bool,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl<C: ChainApi + ?Sized> Subscriber<C> {
    pub fn new(api: Arc<C>, verbose: bool) -> Self {
        Self {
            api,
            verbose,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start delivering blocks to `on_block`.
    ///
    /// Returns once the runtime version is known and the head subscription
    /// is established. Setup failures are returned; later stream drops are
    /// retried in the background until [`Subscriber::unsubscribe`].
    #[instrument(skip_all)]
    pub async fn subscribe(&self, on_block: OnBlock) -> ChainResult<()> {
        let mut versions = self.api.subscribe_runtime_version().await?;
        let current = match versions.next().await {
            Some(version) => version?,
            None => {
                return Err(ChainError::SubscriptionError(
                    "runtime version stream ended before yielding".into(),
                ));
            }
        };
        info!(
            spec = %current.spec_name,
            version = current.spec_version,
            "📜 Runtime version"
        );

        let heads = self.api.subscribe_new_heads().await?;
        debug!("📡 Subscription established");

        let (version_tx, version_rx) = watch::channel(current);
        let version_task = tokio::spawn(track_versions(self.api.clone(), versions, version_tx));
        let heads_task = tokio::spawn(follow_heads(
            self.api.clone(),
            heads,
            version_rx,
            on_block,
            self.verbose,
        ));

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(version_task.abort_handle());
        tasks.push(heads_task.abort_handle());
        Ok(())
    }

    /// Stop delivering blocks. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        if !tasks.is_empty() {
            debug!("Unsubscribing from chain head");
        }
        for task in tasks {
            task.abort();
        }
    }
}

impl<C: ?Sized> Drop for Subscriber<C> {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl<C: ChainApi + ?Sized> EventSubscriber for Subscriber<C> {
    async fn subscribe(&self, on_block: OnBlock) -> ChainResult<()> {
        Subscriber::subscribe(self, on_block).await
    }

    fn unsubscribe(&self) {
        Subscriber::unsubscribe(self)
    }
}

/// Keep `tx` on the latest runtime version, re-subscribing if the stream ends.
async fn track_versions<C: ChainApi + ?Sized>(
    api: Arc<C>,
    mut versions: RuntimeVersionStream,
    tx: watch::Sender<RuntimeVersion>,
) {
    let mut retry_delay = INITIAL_RETRY_DELAY;
    loop {
        while let Some(item) = versions.next().await {
            match item {
                Ok(version) => {
                    if *tx.borrow() != version {
                        info!(
                            spec = %version.spec_name,
                            version = version.spec_version,
                            "⬆️  Runtime upgraded"
                        );
                    }
                    tx.send_replace(version);
                }
                Err(e) => warn!(error = %e, "⚠️  Runtime version subscription error"),
            }
        }

        versions = loop {
            tokio::time::sleep(retry_delay).await;
            retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
            match api.subscribe_runtime_version().await {
                Ok(stream) => break stream,
                Err(e) => warn!(
                    error = %e,
                    retry_in_ms = retry_delay.as_millis(),
                    "⚠️  Failed to subscribe to runtime version, retrying..."
                ),
            }
        };
        retry_delay = INITIAL_RETRY_DELAY;
    }
}

/// Deliver every new head to `on_block`, re-subscribing if the stream ends.
async fn follow_heads<C: ChainApi + ?Sized>(
    api: Arc<C>,
    mut heads: HeaderStream,
    versions: watch::Receiver<RuntimeVersion>,
    on_block: OnBlock,
    verbose: bool,
) {
    let mut retry_delay = INITIAL_RETRY_DELAY;
    loop {
        while let Some(item) = heads.next().await {
            let header = match item {
                Ok(header) => header,
                Err(e) => {
                    warn!(error = %e, "⚠️  Subscription error, reconnecting...");
                    break;
                }
            };
            let number = header.number;
            let runtime_version = versions.borrow().clone();
            match fetch_block(&*api, header, runtime_version).await {
                Ok(block) => {
                    if verbose {
                        info!(block = number, events = block.events.len(), "⛓️  New block");
                    } else {
                        trace!(block = number, events = block.events.len(), "New block");
                    }
                    on_block(block).await;
                }
                Err(e) => error!(block = number, error = %e, "❌ Failed to fetch block"),
            }
        }

        heads = loop {
            tokio::time::sleep(retry_delay).await;
            debug!(retry_delay_ms = retry_delay.as_millis(), "🔄 Reconnecting to chain...");
            retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
            match api.subscribe_new_heads().await {
                Ok(stream) => break stream,
                Err(e) => warn!(
                    error = %e,
                    retry_in_ms = retry_delay.as_millis(),
                    "⚠️  Failed to subscribe, retrying..."
                ),
            }
        };
        debug!("📡 Subscription established");
        retry_delay = INITIAL_RETRY_DELAY;
    }
}

async fn fetch_block<C: ChainApi + ?Sized>(
    api: &C,
    header: Header,
    runtime_version: RuntimeVersion,
) -> ChainResult<Block> {
    let (events, extrinsics) =
        futures::try_join!(api.events(&header.hash), api.extrinsics(&header.hash))?;
    Ok(Block {
        header,
        events,
        extrinsics,
        runtime_version,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use futures::FutureExt;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::testing::{MockChain, record};

    fn collector() -> (OnBlock, mpsc::UnboundedReceiver<Block>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let on_block: OnBlock = Arc::new(move |block: Block| {
            let _ = tx.send(block);
            async {}.boxed()
        });
        (on_block, rx)
    }

    async fn next_block(rx: &mut mpsc::UnboundedReceiver<Block>) -> Block {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a block")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_delivers_blocks_in_order() {
        let api = Arc::new(MockChain::new());
        api.add_events(2, vec![record("staking", "Slash", vec![json!("0x01"), json!("1")])]);
        let subscriber = Subscriber::new(api.clone(), true);
        let (on_block, mut rx) = collector();

        subscriber.subscribe(on_block).await.unwrap();
        api.push_head(1);
        api.push_head(2);

        let first = next_block(&mut rx).await;
        let second = next_block(&mut rx).await;
        assert_eq!(first.number(), 1);
        assert_eq!(second.number(), 2);
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.runtime_version.spec_version, 40);
        subscriber.unsubscribe();
    }

    // Nothing is delivered before the first runtime version arrives
    #[tokio::test]
    async fn test_waits_for_runtime_version() {
        let api = Arc::new(MockChain::new());
        *api.emit_initial_version.lock().unwrap() = false;
        let subscriber = Subscriber::new(api.clone(), false);
        let (on_block, mut rx) = collector();

        let subscribe = subscriber.subscribe(on_block);
        tokio::pin!(subscribe);
        assert!(futures::poll!(&mut subscribe).is_pending());

        api.push_version(RuntimeVersion {
            spec_name: "edgeware".into(),
            spec_version: 41,
        });
        subscribe.await.unwrap();

        api.push_head(3);
        assert_eq!(next_block(&mut rx).await.runtime_version.spec_version, 41);
        subscriber.unsubscribe();
    }

    #[tokio::test]
    async fn test_tracks_runtime_upgrades() {
        let api = Arc::new(MockChain::new());
        let subscriber = Subscriber::new(api.clone(), false);
        let (on_block, mut rx) = collector();
        subscriber.subscribe(on_block).await.unwrap();

        api.push_version(RuntimeVersion {
            spec_name: "edgeware".into(),
            spec_version: 45,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        api.push_head(4);

        assert_eq!(next_block(&mut rx).await.runtime_version.spec_version, 45);
        subscriber.unsubscribe();
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_stops_delivery() {
        let api = Arc::new(MockChain::new());
        let subscriber = Subscriber::new(api.clone(), false);
        let (on_block, mut rx) = collector();
        subscriber.subscribe(on_block).await.unwrap();

        subscriber.unsubscribe();
        subscriber.unsubscribe();
        tokio::task::yield_now().await;
        api.push_head(5);

        let outcome = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(outcome, Ok(Some(_))));
    }

    #[tokio::test]
    async fn test_setup_failure_is_returned() {
        let api = Arc::new(MockChain::new());
        *api.fail_head_subscription.lock().unwrap() = true;
        let subscriber = Subscriber::new(api, false);
        let (on_block, _rx) = collector();

        let result = subscriber.subscribe(on_block).await;
        assert!(matches!(result, Err(ChainError::SubscriptionError(_))));
    }

    // A dropped head stream is re-established after the backoff delay
    #[tokio::test(start_paused = true)]
    async fn test_resubscribes_after_stream_ends() {
        let api = Arc::new(MockChain::new());
        let subscriber = Subscriber::new(api.clone(), false);
        let (on_block, mut rx) = collector();
        subscriber.subscribe(on_block).await.unwrap();
        assert_eq!(api.head_subscriptions.load(Ordering::SeqCst), 1);

        api.close_heads();
        for _ in 0..20 {
            if api.head_subscriptions.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(api.head_subscriptions.load(Ordering::SeqCst), 2);

        api.push_head(6);
        assert_eq!(next_block(&mut rx).await.number(), 6);
        subscriber.unsubscribe();
    }
}
